//! The reactivity engine.
//!
//! This module implements the core reactive machinery: observable views,
//! access interception, the dependency graph, and the effect runtime.
//!
//! # Concepts
//!
//! ## Observable views
//!
//! [`observe`] wraps a raw object in a transparent [`View`]. Reads through
//! the view record dependencies; writes through it invalidate them. Views
//! are memoized per raw object and mode, so wrapping is idempotent and
//! identity-stable.
//!
//! ## Effects
//!
//! An [`effect`] re-runs automatically whenever observed data it previously
//! read is mutated. Dependencies are discovered by running: whatever the
//! latest run read is exactly what the effect is subscribed to.
//!
//! ## Memoized effects
//!
//! A [`Computed`] caches a derived value and recomputes lazily after
//! invalidation. Computed runners are always notified ahead of ordinary
//! effects, so no effect can observe a stale cache.
//!
//! ## Reference cells
//!
//! A [`Ref`] is a one-slot observable box, the reactive primitive for plain
//! values that are not part of an object graph.
//!
//! # Implementation notes
//!
//! Dependency discovery uses a thread-local stack of running effects: an
//! observed read subscribes the top of the stack. This approach (sometimes
//! called transparent reactivity) is used by SolidJS, Vue 3, and Leptos.

mod collection;
mod computed;
mod context;
mod dep;
mod effect;
mod refs;
mod registry;
mod view;

pub use computed::Computed;
pub use context::{is_locked, lock, pause_tracking, resume_tracking, unlock};
pub use dep::{track, trigger, DepKey, TrackOp, TriggerOp, ITERATE_KEY};
pub use effect::{
    effect, stop, EffectId, EffectOptions, ReactiveEffect, SchedulerFn, StopHook, TrackEvent,
    TrackHook, TriggerEvent, TriggerHook,
};
pub use refs::{is_ref, to_refs, Ref};
pub use registry::{
    is_observable, is_read_only, mark_non_reactive, mark_read_only, observe, read_only,
    shallow_read_only, to_raw,
};
pub use view::{View, ViewMode};
