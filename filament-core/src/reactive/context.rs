//! Execution context for the reactivity engine.
//!
//! The context tracks which effect is currently running. This enables
//! automatic dependency tracking: when an observed read happens, the
//! dependency graph records the top of the effect stack as a subscriber.
//!
//! # Implementation
//!
//! We use a thread-local stack of running effects. Running an effect pushes
//! it; an RAII frame pops it when the run finishes, even on unwind. The
//! *active* effect is always derived from the top of the stack rather than
//! stored separately, so push/pop can never leave the two out of sync.
//!
//! The context also owns two flags consulted on the hot path:
//!
//! - the tracking flag: [`pause_tracking`] / [`resume_tracking`] suppress
//!   all dependency recording (triggering is unaffected);
//! - the locked flag: while locked (the default), read-only views reject
//!   mutations; the library unlocks around windows where it writes through
//!   read-only views itself.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use super::effect::{EffectId, ReactiveEffect};

thread_local! {
    static EFFECT_STACK: RefCell<Vec<Arc<ReactiveEffect>>> = RefCell::new(Vec::new());
    static SHOULD_TRACK: Cell<bool> = Cell::new(true);
    static WRITE_LOCKED: Cell<bool> = Cell::new(true);
}

/// Frame guard that pops the effect stack when dropped.
///
/// This keeps the stack consistent even if the effect body panics.
pub(crate) struct EffectFrame {
    id: EffectId,
}

impl Drop for EffectFrame {
    fn drop(&mut self) {
        EFFECT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Catch mismatched push/pop pairs early.
            if let Some(effect) = popped {
                debug_assert_eq!(
                    effect.id(),
                    self.id,
                    "effect stack mismatch: expected {:?}, got {:?}",
                    self.id,
                    effect.id()
                );
            }
        });
    }
}

/// Push an effect for the duration of one run.
pub(crate) fn push_effect(effect: Arc<ReactiveEffect>) -> EffectFrame {
    let id = effect.id();
    EFFECT_STACK.with(|stack| stack.borrow_mut().push(effect));
    EffectFrame { id }
}

/// The effect currently being tracked, if any (top of the stack).
pub(crate) fn active_effect() -> Option<Arc<ReactiveEffect>> {
    EFFECT_STACK.with(|stack| stack.borrow().last().cloned())
}

/// Whether the given effect is anywhere on the running stack.
pub(crate) fn is_running(id: EffectId) -> bool {
    EFFECT_STACK.with(|stack| stack.borrow().iter().any(|e| e.id() == id))
}

/// Suppress dependency tracking until [`resume_tracking`] is called.
pub fn pause_tracking() {
    SHOULD_TRACK.with(|flag| flag.set(false));
}

/// Re-enable dependency tracking after [`pause_tracking`].
pub fn resume_tracking() {
    SHOULD_TRACK.with(|flag| flag.set(true));
}

pub(crate) fn tracking_enabled() -> bool {
    SHOULD_TRACK.with(|flag| flag.get())
}

/// Run a closure with tracking suppressed, restoring the prior state after.
pub(crate) fn untracked<T>(f: impl FnOnce() -> T) -> T {
    let prior = SHOULD_TRACK.with(|flag| flag.replace(false));
    let result = f();
    SHOULD_TRACK.with(|flag| flag.set(prior));
    result
}

/// Engage read-only enforcement: mutations through read-only views warn and
/// fail. This is the default state.
pub fn lock() {
    WRITE_LOCKED.with(|flag| flag.set(true));
}

/// Release read-only enforcement: mutations through read-only views
/// delegate to the underlying target.
pub fn unlock() {
    WRITE_LOCKED.with(|flag| flag.set(false));
}

/// Whether read-only enforcement is currently engaged.
pub fn is_locked() -> bool {
    WRITE_LOCKED.with(|flag| flag.get())
}
