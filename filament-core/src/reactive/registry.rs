//! Identity registry and observable factory.
//!
//! The registry memoizes observable views per (raw object, mode): wrapping
//! the same raw twice hands back the pointer-identical view, and wrapping a
//! view is idempotent. Caches hold weak references only, so the registry
//! never extends the lifetime of a raw object. The view-to-raw direction
//! needs no map of its own: every view embeds its target.
//!
//! Two marker sets are consulted before wrapping: objects marked read-only
//! always wrap read-only, and objects marked non-reactive are returned
//! unchanged.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock, RwLock, Weak};

use crate::error::dev_warn;
use crate::value::{Obj, ObjId, Value};

use super::view::{View, ViewInner, ViewMode};

static MUTABLE_VIEWS: OnceLock<RwLock<HashMap<ObjId, Weak<ViewInner>>>> = OnceLock::new();
static READONLY_VIEWS: OnceLock<RwLock<HashMap<ObjId, Weak<ViewInner>>>> = OnceLock::new();
static READONLY_MARKS: OnceLock<RwLock<HashSet<ObjId>>> = OnceLock::new();
static NON_REACTIVE_MARKS: OnceLock<RwLock<HashSet<ObjId>>> = OnceLock::new();

fn mutable_views() -> &'static RwLock<HashMap<ObjId, Weak<ViewInner>>> {
    MUTABLE_VIEWS.get_or_init(|| RwLock::new(HashMap::new()))
}

fn readonly_views() -> &'static RwLock<HashMap<ObjId, Weak<ViewInner>>> {
    READONLY_VIEWS.get_or_init(|| RwLock::new(HashMap::new()))
}

fn readonly_marks() -> &'static RwLock<HashSet<ObjId>> {
    READONLY_MARKS.get_or_init(|| RwLock::new(HashSet::new()))
}

fn non_reactive_marks() -> &'static RwLock<HashSet<ObjId>> {
    NON_REACTIVE_MARKS.get_or_init(|| RwLock::new(HashSet::new()))
}

fn is_marked_read_only(id: ObjId) -> bool {
    readonly_marks()
        .read()
        .expect("read-only marks lock poisoned")
        .contains(&id)
}

fn is_marked_non_reactive(id: ObjId) -> bool {
    non_reactive_marks()
        .read()
        .expect("non-reactive marks lock poisoned")
        .contains(&id)
}

/// Create or return the cached mutable view over a raw object.
///
/// Non-observable kinds are returned unchanged; primitives additionally
/// warn in debug builds. Views are fixpoints: observing an observable gives
/// it back. Objects marked read-only wrap read-only instead.
pub fn observe(value: Value) -> Value {
    match value {
        Value::View(view) => Value::View(view),
        Value::Ref(_) | Value::Computed(_) => value,
        Value::Obj(obj) => {
            if is_marked_non_reactive(obj.id()) {
                return Value::Obj(obj);
            }
            if is_marked_read_only(obj.id()) {
                return Value::View(cached_view(&obj, ViewMode::ReadOnly, false));
            }
            Value::View(cached_view(&obj, ViewMode::Mutable, false))
        }
        other => {
            dev_warn!("value cannot be made observable: {:?}", other);
            other
        }
    }
}

/// Create or return the cached read-only view over a raw object.
///
/// A mutable view unwraps to its raw first; a read-only view is returned
/// unchanged.
pub fn read_only(value: Value) -> Value {
    read_only_in(value, false)
}

/// Read-only at the top level only: nested reads hand back raw values
/// without re-wrapping (and without unwrapping nested cells).
pub fn shallow_read_only(value: Value) -> Value {
    read_only_in(value, true)
}

fn read_only_in(value: Value, shallow: bool) -> Value {
    match value {
        Value::View(view) => {
            if view.is_read_only() {
                Value::View(view)
            } else {
                let raw = Arc::clone(view.target());
                Value::View(cached_view(&raw, ViewMode::ReadOnly, shallow))
            }
        }
        Value::Ref(_) | Value::Computed(_) => value,
        Value::Obj(obj) => {
            if is_marked_non_reactive(obj.id()) {
                return Value::Obj(obj);
            }
            Value::View(cached_view(&obj, ViewMode::ReadOnly, shallow))
        }
        other => {
            dev_warn!("value cannot be made read-only: {:?}", other);
            other
        }
    }
}

fn cached_view(obj: &Arc<Obj>, mode: ViewMode, shallow: bool) -> View {
    let cache = match mode {
        ViewMode::Mutable => mutable_views(),
        ViewMode::ReadOnly => readonly_views(),
    };

    {
        let map = cache.read().expect("view cache lock poisoned");
        if let Some(weak) = map.get(&obj.id()) {
            if let Some(inner) = weak.upgrade() {
                return View::from_inner(inner);
            }
        }
    }

    let inner = Arc::new(ViewInner::new(Arc::clone(obj), mode, shallow));
    cache
        .write()
        .expect("view cache lock poisoned")
        .insert(obj.id(), Arc::downgrade(&inner));
    View::from_inner(inner)
}

/// Return the raw object behind a view, or the value itself otherwise.
pub fn to_raw(value: Value) -> Value {
    match value {
        Value::View(view) => Value::Obj(Arc::clone(view.target())),
        other => other,
    }
}

/// Whether the value is a mutable observable view.
pub fn is_observable(value: &Value) -> bool {
    matches!(value, Value::View(v) if !v.is_read_only())
}

/// Whether the value is a read-only observable view.
pub fn is_read_only(value: &Value) -> bool {
    matches!(value, Value::View(v) if v.is_read_only())
}

/// Mark an object so any future wrap of it produces a read-only view.
pub fn mark_read_only(value: &Value) {
    if let Some(id) = raw_id(value) {
        readonly_marks()
            .write()
            .expect("read-only marks lock poisoned")
            .insert(id);
    }
}

/// Mark an object so it is never wrapped by the observable factory.
pub fn mark_non_reactive(value: &Value) {
    if let Some(id) = raw_id(value) {
        non_reactive_marks()
            .write()
            .expect("non-reactive marks lock poisoned")
            .insert(id);
    }
}

fn raw_id(value: &Value) -> Option<ObjId> {
    match value {
        Value::Obj(obj) => Some(obj.id()),
        Value::View(view) => Some(view.target().id()),
        _ => None,
    }
}

/// Wrap a nested read result according to the enclosing view's mode.
pub(crate) fn wrap_nested(value: Value, as_read_only: bool) -> Value {
    if value.is_observable_kind() {
        if as_read_only {
            read_only(value)
        } else {
            observe(value)
        }
    } else {
        value
    }
}
