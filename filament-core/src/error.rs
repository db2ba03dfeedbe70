//! Error types and the pluggable runtime error handler.
//!
//! The core never swallows a failure raised inside user code: jobs executed
//! by the scheduler run under an error-handling context that forwards panics
//! to a handler installed by the host (typically the surrounding component
//! system). With no handler installed the panic propagates unchanged.
//!
//! Misuse diagnostics (observing a primitive, writing a locked read-only
//! view, and the like) are warnings, not errors: they log through `tracing`
//! in debug builds and stay silent in release builds while the operation
//! returns a safe default.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock, RwLock};

use thiserror::Error;

/// Errors surfaced by the reactivity core.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A job was re-queued more than the recursion limit allows within one
    /// flush pass. Almost always caused by mutating reactive state inside a
    /// render, update, or watcher callback.
    #[error(
        "maximum recursive updates exceeded: a job was re-queued more than {0} times in one \
         flush pass; this usually means reactive state is being mutated inside a render, \
         update, or watcher callback"
    )]
    MaxRecursiveUpdates(usize),

    /// Weak containers accept only object keys.
    #[error("invalid key for weak container: weak containers require object keys")]
    InvalidWeakKey,

    /// A scheduled job panicked; carries the panic payload rendered as text.
    #[error("scheduled job panicked: {0}")]
    JobPanic(String),
}

/// Handler invoked with errors raised while running scheduled jobs.
pub type ErrorHandler = Arc<dyn Fn(ReactiveError) + Send + Sync>;

static ERROR_HANDLER: OnceLock<RwLock<Option<ErrorHandler>>> = OnceLock::new();

fn handler_slot() -> &'static RwLock<Option<ErrorHandler>> {
    ERROR_HANDLER.get_or_init(|| RwLock::new(None))
}

/// Install the process-wide error handler for job failures.
pub fn set_error_handler(handler: ErrorHandler) {
    *handler_slot().write().expect("error handler lock poisoned") = Some(handler);
}

/// Remove the installed error handler; subsequent job panics propagate.
pub fn clear_error_handler() {
    *handler_slot().write().expect("error handler lock poisoned") = None;
}

/// Run a scheduled job under the error-handling context.
pub(crate) fn invoke_job(job: &Arc<dyn Fn() + Send + Sync>) {
    let handler = handler_slot()
        .read()
        .expect("error handler lock poisoned")
        .clone();

    match handler {
        Some(handler) => {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| job())) {
                handler(ReactiveError::JobPanic(panic_message(payload)));
            }
        }
        None => job(),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Diagnostic warning emitted in debug builds only.
macro_rules! dev_warn {
    ($($arg:tt)*) => {
        if cfg!(debug_assertions) {
            tracing::warn!($($arg)*);
        }
    };
}

pub(crate) use dev_warn;
