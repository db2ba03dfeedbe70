//! The dependency graph.
//!
//! A three-level index records which effect observed which key of which
//! target: `target id → dep key → dep-set`. A dep-set is an
//! insertion-ordered set of effect IDs; membership is kept symmetric with
//! each effect's own back-pointer list so that cleaning an effect costs one
//! removal per dependency.
//!
//! Effects are resolved through a registry of weak references, so neither
//! the target map nor any dep-set keeps an effect alive; ownership stays
//! with whoever holds the effect's `Arc`.
//!
//! # Locking discipline
//!
//! No lock is ever held across a call into user code. [`trigger`] snapshots
//! the affected effect IDs first, drops every guard, and only then runs
//! effects; an effect cleaning itself mid-iteration mutates the live
//! dep-sets without disturbing the snapshot.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock, Weak};

use indexmap::{IndexMap, IndexSet};

use crate::value::{Key, Obj, ObjId, ObjKind, Value};

use super::context;
use super::effect::{EffectId, ReactiveEffect, TrackEvent, TriggerEvent};

/// Read-side operations recorded by the interceptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOp {
    Get,
    Has,
    Iterate,
}

/// Write-side operations reported by the interceptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    Set,
    Add,
    Delete,
    Clear,
}

/// A key in the dependency graph.
///
/// `Entry` keys mirror the user key domain. `Len` is the iteration key of
/// list targets; `Iterate` is the shared iteration sentinel for every other
/// target. Both sentinels sit outside the user key domain by construction,
/// so no user-supplied key can collide with them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    Entry(Key),
    Len,
    Iterate,
}

/// The sentinel dep key representing whole-container enumeration.
pub const ITERATE_KEY: DepKey = DepKey::Iterate;

type DepSet = IndexSet<EffectId>;
type TargetDeps = IndexMap<DepKey, DepSet>;

static TARGET_MAP: OnceLock<RwLock<HashMap<ObjId, TargetDeps>>> = OnceLock::new();
static EFFECT_REGISTRY: OnceLock<RwLock<HashMap<EffectId, Weak<ReactiveEffect>>>> = OnceLock::new();

fn target_map() -> &'static RwLock<HashMap<ObjId, TargetDeps>> {
    TARGET_MAP.get_or_init(|| RwLock::new(HashMap::new()))
}

fn effect_registry() -> &'static RwLock<HashMap<EffectId, Weak<ReactiveEffect>>> {
    EFFECT_REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// The dep key of a reference cell's single slot.
pub(crate) fn value_key() -> Key {
    static VALUE: OnceLock<Arc<str>> = OnceLock::new();
    Key::Str(VALUE.get_or_init(|| Arc::from("value")).clone())
}

pub(crate) fn register_effect(effect: &Arc<ReactiveEffect>) {
    effect_registry()
        .write()
        .expect("effect registry lock poisoned")
        .insert(effect.id(), Arc::downgrade(effect));
}

pub(crate) fn unregister_effect(id: EffectId) {
    effect_registry()
        .write()
        .expect("effect registry lock poisoned")
        .remove(&id);
}

/// Remove an effect from the given dep-sets (its back-pointer list).
///
/// Empty dep-sets and target entries are left in place; they are reused on
/// the next track of the same key.
pub(crate) fn remove_effect_from(id: EffectId, deps: &[(ObjId, DepKey)]) {
    let mut map = target_map().write().expect("target map lock poisoned");
    for (target, key) in deps {
        if let Some(target_deps) = map.get_mut(target) {
            if let Some(set) = target_deps.get_mut(key) {
                set.shift_remove(&id);
            }
        }
    }
}

/// Record that the active effect observed `key` on `target`.
///
/// Does nothing when tracking is paused or no effect is running.
pub fn track(target: ObjId, op: TrackOp, key: DepKey) {
    if !context::tracking_enabled() {
        return;
    }
    let Some(effect) = context::active_effect() else {
        return;
    };

    let inserted = {
        let mut map = target_map().write().expect("target map lock poisoned");
        map.entry(target)
            .or_default()
            .entry(key.clone())
            .or_default()
            .insert(effect.id())
    };

    if inserted {
        effect.push_dep((target, key.clone()));
        if let Some(hook) = &effect.options().on_track {
            hook(&TrackEvent {
                effect: effect.id(),
                target,
                op,
                key,
            });
        }
    }
}

/// Report a mutation of `key` on `target` and run the affected effects.
///
/// Memoized effects run before ordinary effects so their invalidation is
/// visible to any dependent that re-reads them. `Add` and `Delete` also
/// reach the target's iteration-key subscribers; `Clear` reaches every
/// subscriber of the target.
pub fn trigger(target: &Arc<Obj>, op: TriggerOp, key: Option<DepKey>, new_value: Option<Value>) {
    let iteration_key = match target.kind() {
        ObjKind::List => DepKey::Len,
        _ => DepKey::Iterate,
    };
    trigger_keyed(target.id(), iteration_key, op, key, new_value);
}

/// Trigger for targets without a raw object (reference cells, memoized
/// effects). The iteration key is irrelevant for their `Set` operations.
pub(crate) fn trigger_cell(target: ObjId, key: Key, new_value: Option<Value>) {
    trigger_keyed(
        target,
        DepKey::Iterate,
        TriggerOp::Set,
        Some(DepKey::Entry(key)),
        new_value,
    );
}

pub(crate) fn trigger_keyed(
    target: ObjId,
    iteration_key: DepKey,
    op: TriggerOp,
    key: Option<DepKey>,
    new_value: Option<Value>,
) {
    // Snapshot the affected effect IDs before running anything (dedup in
    // insertion order), then release every lock.
    let ids: Vec<EffectId> = {
        let map = target_map().read().expect("target map lock poisoned");
        let Some(target_deps) = map.get(&target) else {
            // Nothing ever tracked this target.
            return;
        };

        let mut work: IndexSet<EffectId> = IndexSet::new();
        if op == TriggerOp::Clear {
            for set in target_deps.values() {
                work.extend(set.iter().copied());
            }
        } else {
            if let Some(key) = &key {
                if let Some(set) = target_deps.get(key) {
                    work.extend(set.iter().copied());
                }
            }
            if matches!(op, TriggerOp::Add | TriggerOp::Delete) {
                if let Some(set) = target_deps.get(&iteration_key) {
                    work.extend(set.iter().copied());
                }
            }
        }
        work.into_iter().collect()
    };

    if ids.is_empty() {
        return;
    }

    let runners: Vec<Arc<ReactiveEffect>> = {
        let registry = effect_registry().read().expect("effect registry lock poisoned");
        ids.iter()
            .filter_map(|id| registry.get(id).and_then(Weak::upgrade))
            .collect()
    };

    let (computed_runners, effects): (Vec<_>, Vec<_>) =
        runners.into_iter().partition(|e| e.is_computed());

    for effect in computed_runners.iter().chain(effects.iter()) {
        if let Some(hook) = &effect.options().on_trigger {
            hook(&TriggerEvent {
                effect: effect.id(),
                target,
                op,
                key: key.clone(),
                new_value: new_value.clone(),
            });
        }
        match &effect.options().scheduler {
            Some(scheduler) => scheduler(effect),
            None => {
                effect.run();
            }
        }
    }
}

/// Subscribe the active effect to everything `child` depends on.
///
/// Used when a memoized effect is read inside another effect: the outer
/// effect must see invalidation of the leaf data, not just of the cache.
pub(crate) fn extend_active_with(child: &Arc<ReactiveEffect>) {
    let Some(parent) = context::active_effect() else {
        return;
    };
    if parent.id() == child.id() {
        return;
    }

    let child_deps = child.deps_snapshot();
    if child_deps.is_empty() {
        return;
    }

    let mut added = Vec::new();
    {
        let mut map = target_map().write().expect("target map lock poisoned");
        for (target, key) in child_deps {
            let set = map.entry(target).or_default().entry(key.clone()).or_default();
            if set.insert(parent.id()) {
                added.push((target, key));
            }
        }
    }
    for entry in added {
        parent.push_dep(entry);
    }
}
