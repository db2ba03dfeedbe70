//! Reference cells.
//!
//! A [`Ref`] is a single-slot observable box: reading its value tracks the
//! cell, writing triggers the cell's subscribers. Values of observable kind
//! are transparently wrapped on the way in, so a cell holding an object
//! hands out an observable view.
//!
//! A cell can also be *linked* to one field of a record view, reading and
//! writing through the view instead of owning storage. [`to_refs`] explodes
//! a record view into linked cells, which is what makes destructuring a
//! record possible without losing reactivity.

use std::sync::{Arc, RwLock};

use crate::error::dev_warn;
use crate::value::{Key, ObjId, Value};

use super::dep;
use super::registry;
use super::view::View;

enum RefSlot {
    Owned(RwLock<Value>),
    Linked { source: View, key: Key },
}

struct RefInner {
    id: ObjId,
    slot: RefSlot,
}

/// A single-slot observable box.
#[derive(Clone)]
pub struct Ref {
    inner: Arc<RefInner>,
}

impl Ref {
    /// Create a cell holding `value`, wrapping it first if it is of
    /// observable kind.
    pub fn new(value: Value) -> Self {
        Self {
            inner: Arc::new(RefInner {
                id: ObjId::new(),
                slot: RefSlot::Owned(RwLock::new(convert(value))),
            }),
        }
    }

    /// Create a cell reading and writing through one field of a view.
    pub fn linked(source: View, key: impl Into<Key>) -> Self {
        Self {
            inner: Arc::new(RefInner {
                id: ObjId::new(),
                slot: RefSlot::Linked {
                    source,
                    key: key.into(),
                },
            }),
        }
    }

    pub fn id(&self) -> ObjId {
        self.inner.id
    }

    /// Identity comparison between cell handles.
    pub fn ptr_eq(&self, other: &Ref) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read the stored value, tracking the cell.
    pub fn get(&self) -> Value {
        match &self.inner.slot {
            RefSlot::Owned(value) => {
                dep::track(
                    self.inner.id,
                    dep::TrackOp::Get,
                    dep::DepKey::Entry(dep::value_key()),
                );
                value.read().expect("ref value lock poisoned").clone()
            }
            RefSlot::Linked { source, key } => source.get(key_value(key)),
        }
    }

    /// Read the stored value without establishing a dependency.
    pub fn get_untracked(&self) -> Value {
        match &self.inner.slot {
            RefSlot::Owned(value) => value.read().expect("ref value lock poisoned").clone(),
            RefSlot::Linked { source, key } => {
                super::context::untracked(|| source.get(key_value(key)))
            }
        }
    }

    /// Replace the stored value, triggering subscribers when it changed
    /// under same-value equality.
    pub fn set(&self, value: Value) {
        match &self.inner.slot {
            RefSlot::Owned(slot) => {
                let value = convert(value);
                {
                    let mut guard = slot.write().expect("ref value lock poisoned");
                    if guard.same(&value) {
                        return;
                    }
                    *guard = value.clone();
                }
                dep::trigger_cell(self.inner.id, dep::value_key(), Some(value));
            }
            RefSlot::Linked { source, key } => {
                source.set(key_value(key), value);
            }
        }
    }

    /// Update the value with a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&Value) -> Value,
    {
        let next = f(&self.get_untracked());
        self.set(next);
    }
}

impl std::fmt::Debug for Ref {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ref").field("id", &self.inner.id).finish()
    }
}

fn convert(value: Value) -> Value {
    if value.is_observable_kind() {
        registry::observe(value)
    } else {
        value
    }
}

fn key_value(key: &Key) -> Value {
    match key {
        Key::Null => Value::Null,
        Key::Bool(b) => Value::Bool(*b),
        Key::Int(i) => Value::Int(*i),
        Key::Float(bits) => Value::Float(f64::from_bits(*bits)),
        Key::Str(s) => Value::Str(s.clone()),
        // Linked cells address record fields and list slots; object keys
        // never reach here.
        Key::Obj(_) => Value::Null,
    }
}

/// Whether a value is cell-shaped (a reference cell or a memoized effect).
pub fn is_ref(value: &Value) -> bool {
    matches!(value, Value::Ref(_) | Value::Computed(_))
}

/// Explode a record view into one linked cell per field.
///
/// The cells read and write through the source view, so destructuring keeps
/// reactivity. Non-record input warns in debug builds and yields nothing.
pub fn to_refs(value: &Value) -> Vec<(Arc<str>, Ref)> {
    let Some(view) = value.as_view() else {
        dev_warn!("to_refs expects an observable record, got {:?}", value);
        return Vec::new();
    };
    if view.kind() != crate::value::ObjKind::Record {
        dev_warn!("to_refs expects a record target");
        return Vec::new();
    }

    view.target()
        .record_keys()
        .into_iter()
        .map(|name| {
            let cell = Ref::linked(view.clone(), name.clone());
            (name, cell)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::effect;
    use crate::reactive::registry::observe;
    use crate::value::Obj;
    use std::sync::RwLock as StdRwLock;

    #[test]
    fn ref_reads_track_and_writes_trigger() {
        let r = Ref::new(Value::Int(0));
        let log = Arc::new(StdRwLock::new(Vec::new()));

        let r2 = r.clone();
        let log2 = log.clone();
        let _e = effect(move || {
            log2.write().unwrap().push(r2.get());
        });
        assert_eq!(*log.read().unwrap(), vec![Value::Int(0)]);

        // Same value: no change, no re-run.
        r.set(Value::Int(0));
        assert_eq!(log.read().unwrap().len(), 1);

        r.set(Value::Int(1));
        assert_eq!(*log.read().unwrap(), vec![Value::Int(0), Value::Int(1)]);
    }

    #[test]
    fn observable_values_are_wrapped_on_the_way_in() {
        let r = Ref::new(Value::Obj(Obj::record()));
        assert!(r.get_untracked().as_view().is_some());

        let r2 = Ref::new(Value::Int(1));
        r2.set(Value::Obj(Obj::record()));
        assert!(r2.get_untracked().as_view().is_some());
    }

    #[test]
    fn get_untracked_records_no_dependency() {
        let r = Ref::new(Value::Int(0));
        let runs = Arc::new(StdRwLock::new(0));

        let r2 = r.clone();
        let runs2 = runs.clone();
        let _e = effect(move || {
            *runs2.write().unwrap() += 1;
            r2.get_untracked();
        });
        assert_eq!(*runs.read().unwrap(), 1);

        r.set(Value::Int(1));
        assert_eq!(*runs.read().unwrap(), 1);
    }

    #[test]
    fn update_applies_a_function_of_the_current_value() {
        let r = Ref::new(Value::Int(10));
        r.update(|v| Value::Int(v.as_f64() as i64 + 5));
        assert_eq!(r.get_untracked(), Value::Int(15));
    }

    #[test]
    fn record_reads_unwrap_stored_cells() {
        let cell = Ref::new(Value::Int(7));
        let o = observe(Value::Obj(Obj::record_from([(
            "n",
            Value::Ref(cell.clone()),
        )])))
        .as_view()
        .unwrap()
        .clone();

        // The cell unwraps on read.
        assert_eq!(o.get("n"), Value::Int(7));

        // A plain write lands in the cell, and the cell's subscribers see it.
        let log = Arc::new(StdRwLock::new(Vec::new()));
        let log2 = log.clone();
        let cell2 = cell.clone();
        let _e = effect(move || {
            log2.write().unwrap().push(cell2.get());
        });

        o.set("n", 8);
        assert_eq!(cell.get_untracked(), Value::Int(8));
        assert_eq!(*log.read().unwrap(), vec![Value::Int(7), Value::Int(8)]);
    }

    #[test]
    fn to_refs_cells_stay_connected_to_the_source() {
        let o = observe(Value::Obj(Obj::record_from([
            ("a", Value::Int(1)),
            ("b", Value::Int(2)),
        ])));
        let cells = to_refs(&o);
        assert_eq!(cells.len(), 2);

        let a = &cells[0].1;
        assert_eq!(cells[0].0.as_ref(), "a");
        assert_eq!(a.get_untracked(), Value::Int(1));

        // Writing the cell writes the source.
        a.set(Value::Int(10));
        let view = o.as_view().unwrap();
        assert_eq!(view.get("a"), Value::Int(10));

        // Writing the source is visible through the cell, reactively.
        let log = Arc::new(StdRwLock::new(Vec::new()));
        let log2 = log.clone();
        let a2 = a.clone();
        let _e = effect(move || {
            log2.write().unwrap().push(a2.get());
        });
        view.set("a", 11);
        assert_eq!(*log.read().unwrap(), vec![Value::Int(10), Value::Int(11)]);
    }

    #[test]
    fn to_refs_on_non_observable_yields_nothing() {
        assert!(to_refs(&Value::Int(1)).is_empty());
    }
}
