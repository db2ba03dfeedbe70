//! Filament Core
//!
//! This crate provides the core runtime for the Filament fine-grained
//! reactivity engine. It implements:
//!
//! - Observable wrapping: transparent, memoized views over plain records,
//!   lists, and keyed containers
//! - Access interception feeding a per-property dependency graph
//! - An effect runtime with lazy and memoized (computed) effects
//! - A batched job scheduler with deduplication and runaway protection
//!
//! The crate is a library with no process surface of its own; a renderer or
//! component system sits on top and decides when ticks happen.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: the dynamic object model that gets observed
//! - `reactive`: views, interception, the dependency graph, effects,
//!   reference cells, and computed values
//! - `scheduler`: the batched flush queue
//! - `error`: error types and the pluggable error handler
//!
//! # Example
//!
//! ```rust,ignore
//! use filament_core::{effect, observe, Obj, Value};
//!
//! let state = observe(Obj::record_from([("count", Value::Int(0))]).into());
//! let view = state.as_view().unwrap().clone();
//!
//! // Runs immediately, then again on every mutation of `count`.
//! let watcher = view.clone();
//! effect(move || {
//!     println!("count is {:?}", watcher.get("count"));
//! });
//!
//! view.set("count", 1); // prints: count is 1
//! ```

pub mod error;
pub mod reactive;
pub mod scheduler;
pub mod value;

pub use error::{clear_error_handler, set_error_handler, ErrorHandler, ReactiveError};
pub use reactive::{
    effect, is_locked, is_observable, is_read_only, is_ref, lock, mark_non_reactive,
    mark_read_only, observe, pause_tracking, read_only, resume_tracking, shallow_read_only, stop,
    to_raw, to_refs, unlock, Computed, DepKey, EffectId, EffectOptions, ReactiveEffect, Ref,
    TrackEvent, TrackOp, TriggerEvent, TriggerOp, View, ViewMode, ITERATE_KEY,
};
pub use scheduler::{
    flush_post_flush_cbs, has_pending_flush, next_tick, next_tick_then, queue_job,
    queue_post_flush_cb, queue_post_flush_cbs, Job, RECURSION_LIMIT,
};
pub use value::{Key, MapEntry, Obj, ObjId, ObjKind, Value};
