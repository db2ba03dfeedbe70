//! Observable views and the base interceptor.
//!
//! A [`View`] is a transparent facade over exactly one raw object. Every
//! access goes through interception: reads feed [`super::dep::track`],
//! mutations feed [`super::dep::trigger`]. Record and list targets are
//! intercepted here at the property level; container targets delegate to
//! the method-level instrumentation in [`super::collection`].
//!
//! # Modes
//!
//! A view is either mutable or read-only. Read-only views reject mutations
//! while the engine is locked (the default) and delegate to the underlying
//! target when the library has unlocked around a write window of its own.
//! Shallow read-only views return nested reads raw: no re-wrapping and no
//! cell unwrapping.
//!
//! # Nested wrapping
//!
//! Reads that produce a value of observable kind wrap it in a view of the
//! same mode, so deep access stays observed without eagerly walking the
//! object graph. Values written through a view are unwrapped to their raw
//! form first; raw storage never holds views.

use std::fmt::Debug;
use std::sync::Arc;

use crate::error::dev_warn;
use crate::value::{Key, Obj, ObjId, ObjKind, Value};

use super::collection;
use super::context;
use super::dep::{self, DepKey, TrackOp, TriggerOp};
use super::registry;

/// Whether a view permits mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Mutable,
    ReadOnly,
}

pub(crate) struct ViewInner {
    target: Arc<Obj>,
    mode: ViewMode,
    shallow: bool,
}

impl ViewInner {
    pub(crate) fn new(target: Arc<Obj>, mode: ViewMode, shallow: bool) -> Self {
        Self {
            target,
            mode,
            shallow,
        }
    }
}

/// A transparent observable view over a raw object.
///
/// Cheap to clone; all clones share the same identity. At most one view
/// exists per (raw, mode) while any handle to it is held.
#[derive(Clone)]
pub struct View {
    inner: Arc<ViewInner>,
}

impl View {
    pub(crate) fn from_inner(inner: Arc<ViewInner>) -> Self {
        Self { inner }
    }

    /// The raw object behind this view.
    pub fn target(&self) -> &Arc<Obj> {
        &self.inner.target
    }

    /// The kind of the underlying object.
    pub fn kind(&self) -> ObjKind {
        self.inner.target.kind()
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.mode == ViewMode::ReadOnly
    }

    pub fn is_shallow(&self) -> bool {
        self.inner.shallow
    }

    /// Identity comparison between view handles.
    pub fn ptr_eq(&self, other: &View) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn id(&self) -> ObjId {
        self.inner.target.id()
    }

    /// Wrap a read result per this view's mode; shallow views return raw.
    pub(crate) fn wrap(&self, value: Value) -> Value {
        if self.inner.shallow {
            return value;
        }
        registry::wrap_nested(value, self.is_read_only())
    }

    /// Whether a mutation must be rejected: read-only views refuse writes
    /// while the engine is locked.
    pub(crate) fn deny_mutation(&self, op: &str) -> bool {
        if self.is_read_only() && context::is_locked() {
            dev_warn!("{op} operation failed: target is read-only");
            true
        } else {
            false
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read one slot: a record field, a list index, or a container entry.
    ///
    /// Absent slots read as `Null`.
    pub fn get(&self, key: impl Into<Value>) -> Value {
        let key = key.into();
        match self.kind() {
            ObjKind::Record | ObjKind::List => self.base_get(&key),
            _ => collection::get(self, &key),
        }
    }

    fn base_get(&self, key: &Value) -> Value {
        let target = &self.inner.target;
        let res = match target.kind() {
            ObjKind::Record => match key {
                Value::Str(name) => target.record_get(name),
                _ => None,
            },
            _ => match key {
                Value::Int(i) if *i >= 0 => target.list_get(*i as usize),
                _ => None,
            },
        };
        let res = res.unwrap_or(Value::Null);
        let dep_key = DepKey::Entry(key.as_key().unwrap_or(Key::Null));

        if self.inner.shallow {
            dep::track(target.id(), TrackOp::Get, dep_key);
            return res;
        }

        match res {
            // Cell-valued slots unwrap; the cell's own track fires instead.
            Value::Ref(cell) => cell.get(),
            Value::Computed(cell) => cell.get(),
            other => {
                dep::track(target.id(), TrackOp::Get, dep_key);
                self.wrap(other)
            }
        }
    }

    /// Presence test for a key.
    pub fn has(&self, key: impl Into<Value>) -> bool {
        let key = key.into();
        match self.kind() {
            ObjKind::Record | ObjKind::List => {
                let target = &self.inner.target;
                let dep_key = DepKey::Entry(key.as_key().unwrap_or(Key::Null));
                dep::track(target.id(), TrackOp::Has, dep_key);
                match target.kind() {
                    ObjKind::Record => match &key {
                        Value::Str(name) => target.record_has(name),
                        _ => false,
                    },
                    _ => match &key {
                        Value::Int(i) => *i >= 0 && (*i as usize) < target.list_len(),
                        _ => false,
                    },
                }
            }
            _ => collection::has(self, &key),
        }
    }

    /// Number of elements: list length, container size, or record field
    /// count.
    pub fn len(&self) -> usize {
        let target = &self.inner.target;
        match self.kind() {
            ObjKind::List => {
                dep::track(target.id(), TrackOp::Iterate, DepKey::Len);
                target.list_len()
            }
            ObjKind::Record => {
                dep::track(target.id(), TrackOp::Iterate, DepKey::Iterate);
                target.record_keys().len()
            }
            ObjKind::Map | ObjKind::Set => collection::size(self),
            _ => {
                dev_warn!("weak containers have no observable size");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enumerate own keys: record field names, list indices, or container
    /// keys.
    pub fn keys(&self) -> Vec<Value> {
        let target = &self.inner.target;
        match self.kind() {
            ObjKind::Record => {
                dep::track(target.id(), TrackOp::Iterate, DepKey::Iterate);
                target
                    .record_keys()
                    .into_iter()
                    .map(Value::Str)
                    .collect()
            }
            ObjKind::List => {
                dep::track(target.id(), TrackOp::Iterate, DepKey::Len);
                (0..target.list_len()).map(Value::from).collect()
            }
            ObjKind::Map | ObjKind::Set => collection::keys(self),
            _ => {
                dev_warn!("weak containers are not enumerable");
                Vec::new()
            }
        }
    }

    /// Enumerate values, wrapped per mode.
    pub fn values(&self) -> Vec<Value> {
        match self.kind() {
            ObjKind::Record => {
                // Field enumeration plus one tracked read per field, the
                // same dependencies a manual keys-then-get walk records.
                self.keys()
                    .into_iter()
                    .map(|k| self.get(k))
                    .collect()
            }
            ObjKind::List => self.iter().collect(),
            ObjKind::Map | ObjKind::Set => collection::values(self),
            _ => {
                dev_warn!("weak containers are not enumerable");
                Vec::new()
            }
        }
    }

    /// Enumerate (key, value) pairs, both wrapped per mode.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        match self.kind() {
            ObjKind::Record | ObjKind::List => self
                .keys()
                .into_iter()
                .map(|k| {
                    let v = self.get(k.clone());
                    (k, v)
                })
                .collect(),
            ObjKind::Map | ObjKind::Set => collection::entries(self),
            _ => {
                dev_warn!("weak containers are not enumerable");
                Vec::new()
            }
        }
    }

    /// Iterate list elements or set members (a snapshot, wrapped per mode).
    pub fn iter(&self) -> std::vec::IntoIter<Value> {
        let target = &self.inner.target;
        match self.kind() {
            ObjKind::List => {
                dep::track(target.id(), TrackOp::Iterate, DepKey::Len);
                let items = target.list_snapshot();
                for index in 0..items.len() {
                    dep::track(
                        target.id(),
                        TrackOp::Get,
                        DepKey::Entry(Key::Int(index as i64)),
                    );
                }
                items
                    .into_iter()
                    .map(|v| self.wrap(v))
                    .collect::<Vec<_>>()
                    .into_iter()
            }
            ObjKind::Set => collection::values(self).into_iter(),
            _ => {
                dev_warn!("iter is only supported for list and set targets");
                Vec::new().into_iter()
            }
        }
    }

    // ------------------------------------------------------------------
    // List search (identity-sensitive)
    // ------------------------------------------------------------------

    /// Membership test against the raw list with the raw search argument,
    /// so unwrapped values held by user code still match.
    pub fn contains(&self, value: &Value) -> bool {
        self.index_of(value).is_some()
    }

    /// First index of a same-value match in the raw list.
    pub fn index_of(&self, value: &Value) -> Option<usize> {
        if self.kind() != ObjKind::List {
            dev_warn!("index_of is only supported for list targets");
            return None;
        }
        let needle = registry::to_raw(value.clone());
        self.inner
            .target
            .list_snapshot()
            .iter()
            .position(|item| item.same(&needle))
    }

    /// Last index of a same-value match in the raw list.
    pub fn last_index_of(&self, value: &Value) -> Option<usize> {
        if self.kind() != ObjKind::List {
            dev_warn!("last_index_of is only supported for list targets");
            return None;
        }
        let needle = registry::to_raw(value.clone());
        self.inner
            .target
            .list_snapshot()
            .iter()
            .rposition(|item| item.same(&needle))
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Store one slot: a record field, a list index, or a map entry.
    ///
    /// Returns `false` when the write is rejected (read-only view under
    /// lock, or a key the target kind cannot hold).
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> bool {
        let key = key.into();
        let value = value.into();
        match self.kind() {
            ObjKind::Record | ObjKind::List => self.base_set(key, value),
            ObjKind::Map | ObjKind::WeakMap => collection::insert(self, key, value),
            _ => {
                dev_warn!("set containers store members via add");
                false
            }
        }
    }

    fn base_set(&self, key: Value, value: Value) -> bool {
        if self.deny_mutation("set") {
            return false;
        }
        let value = registry::to_raw(value);
        let target = &self.inner.target;

        match target.kind() {
            ObjKind::Record => {
                let Value::Str(name) = &key else {
                    dev_warn!("record fields are keyed by strings, got {:?}", key);
                    return false;
                };

                let old = target.record_get(name);
                if write_into_cell(&old, &value) {
                    return true;
                }

                let dep_key = DepKey::Entry(Key::Str(name.clone()));
                let prior = target.record_set(name.clone(), value.clone());
                match prior {
                    None => dep::trigger(target, TriggerOp::Add, Some(dep_key), Some(value)),
                    Some(prev) => {
                        if !prev.same(&value) {
                            dep::trigger(target, TriggerOp::Set, Some(dep_key), Some(value));
                        }
                    }
                }
                true
            }
            _ => {
                let Value::Int(i) = key else {
                    dev_warn!("list elements are keyed by indices, got {:?}", key);
                    return false;
                };
                if i < 0 {
                    dev_warn!("negative list index {i}");
                    return false;
                }
                let index = i as usize;

                let old = target.list_get(index);
                if write_into_cell(&old, &value) {
                    return true;
                }

                let dep_key = DepKey::Entry(Key::Int(i));
                if index < target.list_len() {
                    let prev = target.list_set(index, value.clone());
                    if let Some(prev) = prev {
                        if !prev.same(&value) {
                            dep::trigger(target, TriggerOp::Set, Some(dep_key), Some(value));
                        }
                    }
                } else {
                    target.list_set(index, value.clone());
                    dep::trigger(target, TriggerOp::Add, Some(dep_key), Some(value));
                }
                true
            }
        }
    }

    /// Delete one slot. Record fields are removed; list slots become `Null`
    /// without shifting the remainder.
    pub fn remove(&self, key: impl Into<Value>) -> bool {
        let key = key.into();
        match self.kind() {
            ObjKind::Record | ObjKind::List => self.base_remove(key),
            _ => collection::remove(self, &key),
        }
    }

    fn base_remove(&self, key: Value) -> bool {
        if self.deny_mutation("delete") {
            return false;
        }
        let target = &self.inner.target;

        match target.kind() {
            ObjKind::Record => {
                let Value::Str(name) = &key else {
                    return false;
                };
                if target.record_remove(name).is_some() {
                    let dep_key = DepKey::Entry(Key::Str(name.clone()));
                    dep::trigger(target, TriggerOp::Delete, Some(dep_key), None);
                    true
                } else {
                    false
                }
            }
            _ => {
                let Value::Int(i) = key else {
                    return false;
                };
                if i < 0 || (i as usize) >= target.list_len() {
                    return false;
                }
                target.list_set(i as usize, Value::Null);
                dep::trigger(
                    target,
                    TriggerOp::Delete,
                    Some(DepKey::Entry(Key::Int(i))),
                    None,
                );
                true
            }
        }
    }

    /// Append to a list.
    pub fn push(&self, value: impl Into<Value>) -> bool {
        if self.kind() != ObjKind::List {
            dev_warn!("push is only supported for list targets");
            return false;
        }
        let len = self.inner.target.list_len();
        self.base_set(Value::from(len), value.into())
    }

    /// Remove and return the last list element (wrapped per mode).
    pub fn pop(&self) -> Value {
        if self.kind() != ObjKind::List {
            dev_warn!("pop is only supported for list targets");
            return Value::Null;
        }
        if self.deny_mutation("pop") {
            return Value::Null;
        }
        let target = &self.inner.target;
        match target.list_pop() {
            Some((index, value)) => {
                dep::trigger(
                    target,
                    TriggerOp::Delete,
                    Some(DepKey::Entry(Key::Int(index as i64))),
                    None,
                );
                self.wrap(value)
            }
            None => Value::Null,
        }
    }

    /// Insert a member into a set container.
    pub fn add(&self, member: impl Into<Value>) -> bool {
        match self.kind() {
            ObjKind::Set | ObjKind::WeakSet => collection::add(self, member.into()),
            _ => {
                dev_warn!("add is only supported for set targets");
                false
            }
        }
    }

    /// Empty a map or set container.
    pub fn clear(&self) -> bool {
        match self.kind() {
            ObjKind::Map | ObjKind::Set => collection::clear(self),
            _ => {
                dev_warn!("clear is only supported for map and set targets");
                false
            }
        }
    }

    /// Visit each container entry with (value, key, view), wrapped per mode.
    pub fn for_each(&self, f: impl FnMut(Value, Value, &View)) {
        match self.kind() {
            ObjKind::Map | ObjKind::Set => collection::for_each(self, f),
            _ => dev_warn!("for_each is only supported for map and set targets"),
        }
    }
}

/// Route a write into a cell-valued slot: assigning a plain value over a
/// stored cell updates the cell instead of replacing the slot (the cell's
/// own trigger fires, not the target's).
fn write_into_cell(old: &Option<Value>, value: &Value) -> bool {
    match old {
        Some(Value::Ref(cell)) if !matches!(value, Value::Ref(_)) => {
            cell.set(value.clone());
            true
        }
        Some(Value::Computed(cell))
            if !matches!(value, Value::Ref(_) | Value::Computed(_)) =>
        {
            cell.set(value.clone());
            true
        }
        _ => false,
    }
}

impl Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("target", &self.id())
            .field("kind", &self.kind())
            .field("mode", &self.inner.mode)
            .field("shallow", &self.inner.shallow)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::effect;
    use crate::reactive::registry::{observe, read_only, shallow_read_only};
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::RwLock;

    fn record_view(fields: Vec<(&str, Value)>) -> View {
        let raw = Obj::record_from(fields);
        observe(Value::Obj(raw)).as_view().unwrap().clone()
    }

    fn list_view(items: Vec<Value>) -> View {
        let raw = Obj::list(items);
        observe(Value::Obj(raw)).as_view().unwrap().clone()
    }

    #[test]
    fn reads_and_writes_pass_through() {
        let o = record_view(vec![("a", Value::Int(1))]);
        assert_eq!(o.get("a"), Value::Int(1));
        assert_eq!(o.get("missing"), Value::Null);

        o.set("a", 2);
        assert_eq!(o.get("a"), Value::Int(2));
    }

    #[test]
    fn writes_rerun_reading_effects() {
        let o = record_view(vec![("a", Value::Int(1))]);
        let seen = Arc::new(RwLock::new(Vec::new()));

        let o2 = o.clone();
        let seen2 = seen.clone();
        let _e = effect(move || {
            seen2.write().unwrap().push(o2.get("a"));
        });
        assert_eq!(*seen.read().unwrap(), vec![Value::Int(1)]);

        o.set("a", 10);
        assert_eq!(*seen.read().unwrap(), vec![Value::Int(1), Value::Int(10)]);
    }

    #[test]
    fn same_value_writes_do_not_trigger() {
        let o = record_view(vec![("a", Value::Float(f64::NAN))]);
        let runs = Arc::new(AtomicI32::new(0));

        let o2 = o.clone();
        let runs2 = runs.clone();
        let _e = effect(move || {
            runs2.fetch_add(1, Ordering::SeqCst);
            o2.get("a");
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        o.set("a", f64::NAN);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        o.set("a", 1.0);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn adding_a_key_reaches_iteration_subscribers_only() {
        let o = record_view(vec![("a", Value::Int(1))]);
        let key_runs = Arc::new(AtomicI32::new(0));
        let iter_runs = Arc::new(AtomicI32::new(0));

        let o_key = o.clone();
        let key_clone = key_runs.clone();
        let _by_key = effect(move || {
            key_clone.fetch_add(1, Ordering::SeqCst);
            o_key.get("a");
        });

        let o_iter = o.clone();
        let iter_clone = iter_runs.clone();
        let _by_iter = effect(move || {
            iter_clone.fetch_add(1, Ordering::SeqCst);
            o_iter.keys();
        });

        o.set("b", 2);
        assert_eq!(key_runs.load(Ordering::SeqCst), 1);
        assert_eq!(iter_runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn deleting_a_key_reruns_direct_readers() {
        let o = record_view(vec![("a", Value::Int(1)), ("b", Value::Int(2))]);
        let seen = Arc::new(RwLock::new(Vec::new()));

        let o2 = o.clone();
        let seen2 = seen.clone();
        let _e = effect(move || {
            seen2.write().unwrap().push(o2.get("b"));
        });

        assert!(o.remove("b"));
        assert_eq!(*seen.read().unwrap(), vec![Value::Int(2), Value::Null]);

        // Deleting an absent key triggers nothing.
        assert!(!o.remove("b"));
        assert_eq!(seen.read().unwrap().len(), 2);
    }

    #[test]
    fn nested_reads_wrap_in_the_same_mode() {
        let inner = Obj::record_from([("x", Value::Int(1))]);
        let o = record_view(vec![("inner", Value::Obj(inner))]);

        let nested = o.get("inner");
        let nested_view = nested.as_view().expect("nested read should wrap");
        assert!(!nested_view.is_read_only());

        let ro = read_only(Value::View(o)).as_view().unwrap().clone();
        let nested_ro = ro.get("inner");
        assert!(nested_ro.as_view().unwrap().is_read_only());
    }

    #[test]
    fn shallow_read_only_returns_nested_values_raw() {
        let inner = Obj::record_from([("x", Value::Int(1))]);
        let raw = Obj::record_from([("inner", Value::Obj(inner.clone()))]);
        let shallow = shallow_read_only(Value::Obj(raw))
            .as_view()
            .unwrap()
            .clone();

        let nested = shallow.get("inner");
        assert!(Arc::ptr_eq(nested.as_obj().expect("raw nested value"), &inner));
    }

    #[test]
    fn locked_read_only_views_reject_writes() {
        let raw = Obj::record_from([("a", Value::Int(1))]);
        let ro = read_only(Value::Obj(raw)).as_view().unwrap().clone();

        assert!(!ro.set("a", 2));
        assert_eq!(ro.get("a"), Value::Int(1));
        assert!(!ro.remove("a"));
        assert!(ro.has("a"));
    }

    #[test]
    fn unlocked_read_only_views_delegate_writes() {
        let raw = Obj::record_from([("a", Value::Int(1))]);
        let ro = read_only(Value::Obj(raw)).as_view().unwrap().clone();

        context::unlock();
        assert!(ro.set("a", 2));
        context::lock();

        assert_eq!(ro.get("a"), Value::Int(2));
    }

    #[test]
    fn list_length_effects_observe_growth() {
        let arr = list_view(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let seen = Arc::new(RwLock::new(Vec::new()));

        let arr2 = arr.clone();
        let seen2 = seen.clone();
        let _e = effect(move || {
            seen2.write().unwrap().push(arr2.len());
        });
        assert_eq!(*seen.read().unwrap(), vec![3]);

        arr.push(4);
        assert_eq!(*seen.read().unwrap(), vec![3, 4]);

        arr.set(10, 9);
        assert_eq!(*seen.read().unwrap(), vec![3, 4, 11]);
    }

    #[test]
    fn pop_notifies_length_subscribers() {
        let arr = list_view(vec![Value::Int(1), Value::Int(2)]);
        let seen = Arc::new(RwLock::new(Vec::new()));

        let arr2 = arr.clone();
        let seen2 = seen.clone();
        let _e = effect(move || {
            seen2.write().unwrap().push(arr2.len());
        });

        assert_eq!(arr.pop(), Value::Int(2));
        assert_eq!(*seen.read().unwrap(), vec![2, 1]);
    }

    #[test]
    fn identity_search_matches_unwrapped_values() {
        let element = Obj::record();
        let arr = list_view(vec![Value::Int(1), Value::Obj(element.clone())]);

        // The wrapped element read back through the view still matches the
        // raw value held by user code.
        let wrapped = arr.get(1);
        assert!(wrapped.as_view().is_some());
        assert!(arr.contains(&Value::Obj(element.clone())));
        assert!(arr.contains(&wrapped));
        assert_eq!(arr.index_of(&Value::Obj(element)), Some(1));
        assert_eq!(arr.index_of(&Value::Int(7)), None);
    }

    #[test]
    fn list_iteration_tracks_elements() {
        let arr = list_view(vec![Value::Int(1), Value::Int(2)]);
        let total = Arc::new(AtomicI32::new(0));

        let arr2 = arr.clone();
        let total2 = total.clone();
        let _e = effect(move || {
            let sum: i64 = arr2.iter().map(|v| v.as_f64() as i64).sum();
            total2.store(sum as i32, Ordering::SeqCst);
        });
        assert_eq!(total.load(Ordering::SeqCst), 3);

        arr.set(0, 10);
        assert_eq!(total.load(Ordering::SeqCst), 12);
    }

    #[test]
    fn record_entries_wrap_values() {
        let inner = Obj::record();
        let o = record_view(vec![("a", Value::Int(1)), ("b", Value::Obj(inner))]);

        let entries = o.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, Value::from("a"));
        assert_eq!(entries[0].1, Value::Int(1));
        assert!(entries[1].1.as_view().is_some());
    }
}
