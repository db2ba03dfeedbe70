//! Memoized effects.
//!
//! A [`Computed`] caches the result of a getter and re-evaluates lazily: a
//! dependency trigger only flips a dirty flag, and the next read recomputes.
//! The inner effect carries the `computed` flag, so the dependency graph
//! runs it (that is, its dirty-flipping scheduler) ahead of ordinary
//! effects; by the time a plain effect re-reads the cell, the stale cache is
//! already invalidated.
//!
//! Reading a computed inside a running effect subscribes that effect to
//! everything the getter read, not merely to the cell, so invalidation of
//! leaf data reaches outer effects directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::dev_warn;
use crate::value::{ObjId, Value};

use super::dep;
use super::effect::{stop, EffectOptions, ReactiveEffect};

struct ComputedInner {
    id: ObjId,
    dirty: Arc<AtomicBool>,
    value: RwLock<Value>,
    runner: Arc<ReactiveEffect>,
    setter: Option<Arc<dyn Fn(Value) + Send + Sync>>,
}

impl Drop for ComputedInner {
    fn drop(&mut self) {
        // Last handle gone: detach the inner effect from the graph.
        stop(&self.runner);
    }
}

/// A lazily-evaluated, cached derived value.
///
/// # Example
///
/// ```rust,ignore
/// let o = observe(Obj::record_from([("n", Value::Int(2))]).into());
/// let view = o.as_view().unwrap().clone();
///
/// let doubled = Computed::new(move || Value::Int(view.get("n").as_f64() as i64 * 2));
/// assert_eq!(doubled.get(), Value::Int(4));
/// ```
#[derive(Clone)]
pub struct Computed {
    inner: Arc<ComputedInner>,
}

impl Computed {
    /// Create a read-only computed from a getter.
    ///
    /// The getter does not run until the first read.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self::build(getter, None)
    }

    /// Create a writable computed from a getter and a setter.
    pub fn with_setter<F, S>(getter: F, setter: S) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
        S: Fn(Value) + Send + Sync + 'static,
    {
        Self::build(getter, Some(Arc::new(setter)))
    }

    fn build<F>(getter: F, setter: Option<Arc<dyn Fn(Value) + Send + Sync>>) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        let dirty = Arc::new(AtomicBool::new(true));

        let scheduler_dirty = Arc::clone(&dirty);
        let runner = ReactiveEffect::new(
            getter,
            EffectOptions {
                lazy: true,
                computed: true,
                // Invalidate only; recomputation waits for the next read.
                scheduler: Some(Arc::new(move |_| {
                    scheduler_dirty.store(true, Ordering::SeqCst);
                })),
                ..Default::default()
            },
        );

        Self {
            inner: Arc::new(ComputedInner {
                id: ObjId::new(),
                dirty,
                value: RwLock::new(Value::Null),
                runner,
                setter,
            }),
        }
    }

    pub fn id(&self) -> ObjId {
        self.inner.id
    }

    /// Identity comparison between computed handles.
    pub fn ptr_eq(&self, other: &Computed) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether the cache is currently invalidated.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    /// Read the value, recomputing first if any dependency changed since
    /// the cache was filled.
    pub fn get(&self) -> Value {
        if self.inner.dirty.swap(false, Ordering::SeqCst) {
            let value = self.inner.runner.run();
            *self
                .inner
                .value
                .write()
                .expect("computed value lock poisoned") = value;
        }

        // An enclosing effect must follow the leaves the getter read, not
        // just this cell.
        dep::extend_active_with(&self.inner.runner);

        self.inner
            .value
            .read()
            .expect("computed value lock poisoned")
            .clone()
    }

    /// Write through the setter; a computed without one warns and ignores
    /// the write.
    pub fn set(&self, value: Value) {
        match &self.inner.setter {
            Some(setter) => setter(value),
            None => dev_warn!("write to a computed without a setter was ignored"),
        }
    }
}

impl std::fmt::Debug for Computed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::effect;
    use crate::reactive::registry::observe;
    use crate::value::Obj;
    use std::sync::atomic::AtomicI32;
    use std::sync::RwLock as StdRwLock;

    fn counter_record(initial: i64) -> crate::reactive::view::View {
        observe(Value::Obj(Obj::record_from([("n", Value::Int(initial))])))
            .as_view()
            .unwrap()
            .clone()
    }

    #[test]
    fn computed_is_lazy_and_cached() {
        let calls = Arc::new(AtomicI32::new(0));
        let calls2 = calls.clone();
        let c = Computed::new(move || {
            calls2.fetch_add(1, Ordering::SeqCst);
            Value::Int(42)
        });

        // Nothing runs until the first read.
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(c.is_dirty());

        assert_eq!(c.get(), Value::Int(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Cached thereafter.
        assert_eq!(c.get(), Value::Int(42));
        assert_eq!(c.get(), Value::Int(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dependency_writes_invalidate_without_recomputing() {
        let view = counter_record(2);
        let calls = Arc::new(AtomicI32::new(0));

        let view2 = view.clone();
        let calls2 = calls.clone();
        let c = Computed::new(move || {
            calls2.fetch_add(1, Ordering::SeqCst);
            Value::Int(view2.get("n").as_f64() as i64 * 2)
        });

        assert_eq!(c.get(), Value::Int(4));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The write only flips the dirty flag.
        view.set("n", 5);
        assert!(c.is_dirty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The next read recomputes.
        assert_eq!(c.get(), Value::Int(10));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn effects_reading_a_computed_see_fresh_values() {
        let view = counter_record(1);

        let view2 = view.clone();
        let c = Computed::new(move || Value::Int(view2.get("n").as_f64() as i64 * 2));

        let render = Arc::new(StdRwLock::new(Vec::new()));
        let render2 = render.clone();
        let c2 = c.clone();
        let _e = effect(move || {
            render2.write().unwrap().push(c2.get());
        });
        assert_eq!(*render.read().unwrap(), vec![Value::Int(2)]);

        // The computed invalidates before the effect re-reads, so the
        // effect never observes the stale cache.
        view.set("n", 3);
        assert_eq!(*render.read().unwrap(), vec![Value::Int(2), Value::Int(6)]);
    }

    #[test]
    fn chained_computeds_propagate() {
        let view = counter_record(1);

        let view2 = view.clone();
        let doubled = Computed::new(move || Value::Int(view2.get("n").as_f64() as i64 * 2));
        let doubled2 = doubled.clone();
        let plus_ten = Computed::new(move || Value::Int(doubled2.get().as_f64() as i64 + 10));

        assert_eq!(plus_ten.get(), Value::Int(12));

        view.set("n", 5);
        assert_eq!(plus_ten.get(), Value::Int(20));
    }

    #[test]
    fn setter_routes_writes_back() {
        let view = counter_record(1);

        let getter_view = view.clone();
        let setter_view = view.clone();
        let c = Computed::with_setter(
            move || Value::Int(getter_view.get("n").as_f64() as i64 * 2),
            move |v| {
                setter_view.set("n", Value::Int(v.as_f64() as i64 / 2));
            },
        );

        assert_eq!(c.get(), Value::Int(2));
        c.set(Value::Int(10));
        assert_eq!(view.get("n"), Value::Int(5));
        assert_eq!(c.get(), Value::Int(10));
    }

    #[test]
    fn stored_computeds_unwrap_on_record_reads() {
        let view = counter_record(3);
        let view2 = view.clone();
        let c = Computed::new(move || Value::Int(view2.get("n").as_f64() as i64 * 2));

        let holder = observe(Value::Obj(Obj::record_from([(
            "doubled",
            Value::Computed(c),
        )])))
        .as_view()
        .unwrap()
        .clone();

        assert_eq!(holder.get("doubled"), Value::Int(6));
    }

    #[test]
    fn dropping_the_last_handle_stops_the_runner() {
        let view = counter_record(1);
        let calls = Arc::new(AtomicI32::new(0));

        let view2 = view.clone();
        let calls2 = calls.clone();
        let c = Computed::new(move || {
            calls2.fetch_add(1, Ordering::SeqCst);
            view2.get("n")
        });
        c.get();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        drop(c);

        // No handle is left to re-read; the write must not revive the getter.
        view.set("n", 9);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
