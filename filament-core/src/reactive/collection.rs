//! Collection interceptor.
//!
//! Container targets (map, set, and their weak variants) cannot be
//! intercepted slot by slot; their operations are methods. The view rebinds
//! those methods to the instrumented versions here.
//!
//! Keys and values unwrap to raw form before touching storage, so a wrapped
//! and an unwrapped handle to the same object address the same entry. Read
//! results wrap per the view's mode; iteration wraps every yielded element,
//! and map iteration wraps both halves of each pair.
//!
//! Weak containers require object keys, carry no size or iteration surface,
//! and hold their keys weakly.

use std::sync::Arc;

use crate::error::{dev_warn, ReactiveError};
use crate::value::{Obj, ObjKind, Value};

use super::dep::{self, DepKey, TrackOp, TriggerOp};
use super::registry;
use super::view::View;

/// The raw object form of a container key, required by weak containers.
fn key_object(key: &Value) -> Option<Arc<Obj>> {
    match key {
        Value::Obj(obj) => Some(Arc::clone(obj)),
        Value::View(view) => Some(Arc::clone(view.target())),
        _ => None,
    }
}

pub(crate) fn get(view: &View, key: &Value) -> Value {
    let target = view.target();
    match target.kind() {
        ObjKind::Map => {
            let Some(hashed) = key.as_key() else {
                return Value::Null;
            };
            dep::track(target.id(), TrackOp::Get, DepKey::Entry(hashed.clone()));
            let res = target.map_get(&hashed).unwrap_or(Value::Null);
            view.wrap(res)
        }
        ObjKind::WeakMap => {
            let Some(obj) = key_object(key) else {
                return Value::Null;
            };
            dep::track(
                target.id(),
                TrackOp::Get,
                DepKey::Entry(Value::Obj(obj.clone()).as_key().expect("object key")),
            );
            let res = target.weak_map_get(&obj).unwrap_or(Value::Null);
            view.wrap(res)
        }
        _ => {
            dev_warn!("get is not supported for set targets");
            Value::Null
        }
    }
}

pub(crate) fn has(view: &View, key: &Value) -> bool {
    let target = view.target();
    match target.kind() {
        ObjKind::Map | ObjKind::Set => {
            let Some(hashed) = key.as_key() else {
                return false;
            };
            dep::track(target.id(), TrackOp::Has, DepKey::Entry(hashed.clone()));
            match target.kind() {
                ObjKind::Map => target.map_has(&hashed),
                _ => target.set_has(&hashed),
            }
        }
        ObjKind::WeakMap | ObjKind::WeakSet => {
            let Some(obj) = key_object(key) else {
                return false;
            };
            dep::track(
                target.id(),
                TrackOp::Has,
                DepKey::Entry(Value::Obj(obj.clone()).as_key().expect("object key")),
            );
            match target.kind() {
                ObjKind::WeakMap => target.weak_map_has(&obj),
                _ => target.weak_set_has(&obj),
            }
        }
        _ => false,
    }
}

/// Container size; tracks the iteration key.
pub(crate) fn size(view: &View) -> usize {
    let target = view.target();
    dep::track(target.id(), TrackOp::Iterate, DepKey::Iterate);
    match target.kind() {
        ObjKind::Map => target.map_len(),
        ObjKind::Set => target.set_len(),
        _ => 0,
    }
}

/// Map-style keyed insert.
pub(crate) fn insert(view: &View, key: Value, value: Value) -> bool {
    if view.deny_mutation("set") {
        return false;
    }
    let key = registry::to_raw(key);
    let value = registry::to_raw(value);
    let target = view.target();

    match target.kind() {
        ObjKind::Map => {
            let Some(hashed) = key.as_key() else {
                return false;
            };
            let dep_key = DepKey::Entry(hashed.clone());
            let prior = target.map_set(hashed, key, value.clone());
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
        ObjKind::WeakMap => {
            let Some(obj) = key_object(&key) else {
                dev_warn!("{}", ReactiveError::InvalidWeakKey);
                return false;
            };
            let dep_key = DepKey::Entry(Value::Obj(obj.clone()).as_key().expect("object key"));
            let prior = target.weak_map_set(&obj, value.clone());
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
        _ => false,
    }
}

/// Set-style member insert; triggers only when the member was absent.
pub(crate) fn add(view: &View, member: Value) -> bool {
    if view.deny_mutation("add") {
        return false;
    }
    let member = registry::to_raw(member);
    let target = view.target();

    match target.kind() {
        ObjKind::Set => {
            let Some(hashed) = member.as_key() else {
                return false;
            };
            if target.set_add(hashed.clone(), member.clone()) {
                dep::trigger(
                    target,
                    TriggerOp::Add,
                    Some(DepKey::Entry(hashed)),
                    Some(member),
                );
                true
            } else {
                false
            }
        }
        ObjKind::WeakSet => {
            let Some(obj) = key_object(&member) else {
                dev_warn!("{}", ReactiveError::InvalidWeakKey);
                return false;
            };
            if target.weak_set_add(&obj) {
                dep::trigger(
                    target,
                    TriggerOp::Add,
                    Some(DepKey::Entry(
                        Value::Obj(obj.clone()).as_key().expect("object key"),
                    )),
                    Some(Value::Obj(obj)),
                );
                true
            } else {
                false
            }
        }
        _ => false,
    }
}

/// Remove a keyed entry or set member; triggers only when present.
pub(crate) fn remove(view: &View, key: &Value) -> bool {
    if view.deny_mutation("delete") {
        return false;
    }
    let target = view.target();

    match target.kind() {
        ObjKind::Map | ObjKind::Set => {
            let Some(hashed) = key.as_key() else {
                return false;
            };
            let had = match target.kind() {
                ObjKind::Map => target.map_remove(&hashed),
                _ => target.set_remove(&hashed),
            };
            if had {
                dep::trigger(target, TriggerOp::Delete, Some(DepKey::Entry(hashed)), None);
            }
            had
        }
        ObjKind::WeakMap | ObjKind::WeakSet => {
            let Some(obj) = key_object(key) else {
                return false;
            };
            let had = match target.kind() {
                ObjKind::WeakMap => target.weak_map_remove(&obj),
                _ => target.weak_set_remove(&obj),
            };
            if had {
                dep::trigger(
                    target,
                    TriggerOp::Delete,
                    Some(DepKey::Entry(
                        Value::Obj(obj).as_key().expect("object key"),
                    )),
                    None,
                );
            }
            had
        }
        _ => false,
    }
}

/// Empty a map or set; triggers `Clear` only when it held entries.
pub(crate) fn clear(view: &View) -> bool {
    if view.deny_mutation("clear") {
        return false;
    }
    let target = view.target();
    let had = target.container_clear();
    if had {
        dep::trigger(target, TriggerOp::Clear, None, None);
    }
    had
}

/// Visit each entry with (wrapped value, wrapped key, view).
pub(crate) fn for_each(view: &View, mut f: impl FnMut(Value, Value, &View)) {
    let target = view.target();
    dep::track(target.id(), TrackOp::Iterate, DepKey::Iterate);
    match target.kind() {
        ObjKind::Map => {
            for (key, value) in target.map_snapshot() {
                f(view.wrap(value), view.wrap(key), view);
            }
        }
        ObjKind::Set => {
            for member in target.set_snapshot() {
                let wrapped = view.wrap(member);
                f(wrapped.clone(), wrapped, view);
            }
        }
        _ => {}
    }
}

pub(crate) fn keys(view: &View) -> Vec<Value> {
    let target = view.target();
    dep::track(target.id(), TrackOp::Iterate, DepKey::Iterate);
    match target.kind() {
        ObjKind::Map => target
            .map_snapshot()
            .into_iter()
            .map(|(key, _)| view.wrap(key))
            .collect(),
        ObjKind::Set => target
            .set_snapshot()
            .into_iter()
            .map(|member| view.wrap(member))
            .collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn values(view: &View) -> Vec<Value> {
    let target = view.target();
    dep::track(target.id(), TrackOp::Iterate, DepKey::Iterate);
    match target.kind() {
        ObjKind::Map => target
            .map_snapshot()
            .into_iter()
            .map(|(_, value)| view.wrap(value))
            .collect(),
        ObjKind::Set => target
            .set_snapshot()
            .into_iter()
            .map(|member| view.wrap(member))
            .collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn entries(view: &View) -> Vec<(Value, Value)> {
    let target = view.target();
    dep::track(target.id(), TrackOp::Iterate, DepKey::Iterate);
    match target.kind() {
        ObjKind::Map => target
            .map_snapshot()
            .into_iter()
            .map(|(key, value)| (view.wrap(key), view.wrap(value)))
            .collect(),
        ObjKind::Set => target
            .set_snapshot()
            .into_iter()
            .map(|member| {
                let wrapped = view.wrap(member);
                (wrapped.clone(), wrapped)
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::effect;
    use crate::reactive::registry::{observe, read_only};
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::RwLock;

    fn map_view() -> View {
        observe(Value::Obj(Obj::map())).as_view().unwrap().clone()
    }

    fn set_view() -> View {
        observe(Value::Obj(Obj::set())).as_view().unwrap().clone()
    }

    #[test]
    fn map_readers_follow_their_key() {
        let m = map_view();
        let log = Arc::new(RwLock::new(Vec::new()));

        let m2 = m.clone();
        let log2 = log.clone();
        let _e = effect(move || {
            log2.write().unwrap().push(m2.get("x"));
        });
        assert_eq!(*log.read().unwrap(), vec![Value::Null]);

        m.set("x", 1);
        assert_eq!(*log.read().unwrap(), vec![Value::Null, Value::Int(1)]);

        // Same value again: no re-run.
        m.set("x", 1);
        assert_eq!(log.read().unwrap().len(), 2);

        m.remove("x");
        assert_eq!(
            *log.read().unwrap(),
            vec![Value::Null, Value::Int(1), Value::Null]
        );

        // Clearing an already-empty map triggers nothing.
        m.clear();
        assert_eq!(log.read().unwrap().len(), 3);
    }

    #[test]
    fn size_observers_see_adds_and_clears() {
        let m = map_view();
        let sizes = Arc::new(RwLock::new(Vec::new()));

        let m2 = m.clone();
        let sizes2 = sizes.clone();
        let _e = effect(move || {
            sizes2.write().unwrap().push(m2.len());
        });
        assert_eq!(*sizes.read().unwrap(), vec![0]);

        m.set("a", 1);
        m.set("b", 2);
        assert_eq!(*sizes.read().unwrap(), vec![0, 1, 2]);

        m.clear();
        assert_eq!(*sizes.read().unwrap(), vec![0, 1, 2, 0]);
    }

    #[test]
    fn set_add_triggers_only_when_absent() {
        let s = set_view();
        let runs = Arc::new(AtomicI32::new(0));

        let s2 = s.clone();
        let runs2 = runs.clone();
        let _e = effect(move || {
            runs2.fetch_add(1, Ordering::SeqCst);
            s2.len();
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        assert!(s.add(1));
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        assert!(!s.add(1));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn wrapped_and_raw_keys_address_the_same_entry() {
        let m = map_view();
        let key_raw = Obj::record();
        let key_view = observe(Value::Obj(key_raw.clone()));

        m.set(Value::Obj(key_raw.clone()), 7);
        assert_eq!(m.get(key_view.clone()), Value::Int(7));
        assert!(m.has(key_view));
        assert!(m.remove(Value::Obj(key_raw)));
    }

    #[test]
    fn iteration_wraps_both_tuple_elements() {
        let m = map_view();
        let key = Obj::record();
        let value = Obj::record();
        m.set(Value::Obj(key), Value::Obj(value));

        let entries = entries(&m);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].0.as_view().is_some());
        assert!(entries[0].1.as_view().is_some());
    }

    #[test]
    fn for_each_receives_wrapped_value_key_and_view() {
        let m = map_view();
        m.set("k", 5);

        let visited = Arc::new(RwLock::new(Vec::new()));
        let visited2 = visited.clone();
        let m2 = m.clone();
        m.for_each(move |value, key, container| {
            assert!(container.ptr_eq(&m2));
            visited2.write().unwrap().push((key, value));
        });

        assert_eq!(
            *visited.read().unwrap(),
            vec![(Value::from("k"), Value::Int(5))]
        );
    }

    #[test]
    fn iteration_effects_rerun_on_membership_change() {
        let s = set_view();
        s.add(1);

        let totals = Arc::new(RwLock::new(Vec::new()));
        let s2 = s.clone();
        let totals2 = totals.clone();
        let _e = effect(move || {
            let sum: i64 = s2.iter().map(|v| v.as_f64() as i64).sum();
            totals2.write().unwrap().push(sum);
        });
        assert_eq!(*totals.read().unwrap(), vec![1]);

        s.add(2);
        assert_eq!(*totals.read().unwrap(), vec![1, 3]);

        s.remove(Value::Int(1));
        assert_eq!(*totals.read().unwrap(), vec![1, 3, 2]);
    }

    #[test]
    fn read_only_collections_refuse_mutations_under_lock() {
        let raw = Obj::map();
        raw.map_set(crate::value::Key::from("a"), Value::from("a"), Value::Int(1));
        let ro = read_only(Value::Obj(raw)).as_view().unwrap().clone();

        assert!(!ro.set("a", 2));
        assert!(!ro.remove("a"));
        assert!(!ro.clear());
        assert_eq!(ro.get("a"), Value::Int(1));
    }

    #[test]
    fn weak_map_requires_object_keys() {
        let wm = observe(Value::Obj(Obj::weak_map()))
            .as_view()
            .unwrap()
            .clone();

        assert!(!wm.set("plain", 1));

        let key = Obj::record();
        assert!(wm.set(Value::Obj(key.clone()), 1));
        assert_eq!(wm.get(Value::Obj(key.clone())), Value::Int(1));

        let runs = Arc::new(AtomicI32::new(0));
        let runs2 = runs.clone();
        let wm2 = wm.clone();
        let key2 = key.clone();
        let _e = effect(move || {
            runs2.fetch_add(1, Ordering::SeqCst);
            wm2.get(Value::Obj(key2.clone()));
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        wm.set(Value::Obj(key), 2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn weak_set_membership_is_tracked() {
        let ws = observe(Value::Obj(Obj::weak_set()))
            .as_view()
            .unwrap()
            .clone();
        let member = Obj::record();

        let present = Arc::new(RwLock::new(Vec::new()));
        let present2 = present.clone();
        let ws2 = ws.clone();
        let member2 = member.clone();
        let _e = effect(move || {
            present2
                .write()
                .unwrap()
                .push(ws2.has(Value::Obj(member2.clone())));
        });
        assert_eq!(*present.read().unwrap(), vec![false]);

        ws.add(Value::Obj(member.clone()));
        assert_eq!(*present.read().unwrap(), vec![false, true]);

        ws.remove(Value::Obj(member));
        assert_eq!(*present.read().unwrap(), vec![false, true, false]);
    }
}
