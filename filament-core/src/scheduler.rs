//! Batched job scheduler.
//!
//! Triggers that should not run synchronously enqueue jobs here (an effect
//! whose `scheduler` option is [`queue_job`] is the typical client). Jobs
//! are deduplicated by identity, drained FIFO at the next tick, and followed
//! by a separate queue of post-flush callbacks. Draining repeats until both
//! queues are empty, since callbacks may enqueue further work.
//!
//! The host event loop decides where the tick boundary falls by calling
//! [`next_tick`]; everything queued since the previous tick runs at that
//! point. Jobs run under the error-handling context, so a panicking job is
//! reported to the installed error handler instead of tearing the flush
//! down.
//!
//! A job re-enqueued more than [`RECURSION_LIMIT`] times within one flush
//! pass aborts with a fatal diagnostic; the usual culprit is state mutated
//! from inside a render, update, or watcher callback.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::error::{self, ReactiveError};

/// A schedulable unit of work. Identity (the allocation) is what the
/// deduplication and recursion accounting key on.
pub type Job = Arc<dyn Fn() + Send + Sync>;

/// Maximum number of times one job may be re-enqueued during a single
/// flush pass.
pub const RECURSION_LIMIT: usize = 100;

thread_local! {
    static QUEUE: RefCell<VecDeque<Job>> = RefCell::new(VecDeque::new());
    static POST_FLUSH_CBS: RefCell<Vec<Job>> = RefCell::new(Vec::new());
    static FLUSH_PENDING: Cell<bool> = Cell::new(false);
}

fn job_id(job: &Job) -> usize {
    Arc::as_ptr(job) as *const () as usize
}

/// Enqueue a job for the next tick. A job already waiting in the queue is
/// not enqueued twice.
pub fn queue_job(job: Job) {
    QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        if !queue.iter().any(|queued| Arc::ptr_eq(queued, &job)) {
            queue.push_back(job);
        }
    });
    FLUSH_PENDING.with(|pending| pending.set(true));
}

/// Enqueue a callback to run after the job queue drains.
pub fn queue_post_flush_cb(cb: Job) {
    POST_FLUSH_CBS.with(|cbs| cbs.borrow_mut().push(cb));
    FLUSH_PENDING.with(|pending| pending.set(true));
}

/// Enqueue a batch of post-flush callbacks.
pub fn queue_post_flush_cbs<I: IntoIterator<Item = Job>>(cbs: I) {
    POST_FLUSH_CBS.with(|queue| queue.borrow_mut().extend(cbs));
    FLUSH_PENDING.with(|pending| pending.set(true));
}

/// Whether any queued work is waiting for the next tick.
pub fn has_pending_flush() -> bool {
    FLUSH_PENDING.with(|pending| pending.get())
}

/// Drain the scheduler: queued jobs FIFO, then the deduplicated post-flush
/// callbacks, repeating until both queues are empty.
pub fn next_tick() {
    let mut seen: HashMap<usize, usize> = HashMap::new();
    flush_pass(&mut seen);
    // Work enqueued mid-flush has been drained too.
    FLUSH_PENDING.with(|pending| pending.set(false));
}

/// Drain the scheduler, then invoke `f`.
pub fn next_tick_then<F: FnOnce()>(f: F) {
    next_tick();
    f();
}

/// Drain only the post-flush callback queue.
pub fn flush_post_flush_cbs() {
    let mut seen: HashMap<usize, usize> = HashMap::new();
    flush_post(&mut seen);
}

fn flush_pass(seen: &mut HashMap<usize, usize>) {
    loop {
        while let Some(job) = QUEUE.with(|queue| queue.borrow_mut().pop_front()) {
            check_recursion(seen, &job);
            error::invoke_job(&job);
        }

        flush_post(seen);

        let drained = QUEUE.with(|queue| queue.borrow().is_empty())
            && POST_FLUSH_CBS.with(|cbs| cbs.borrow().is_empty());
        if drained {
            break;
        }
    }
}

fn flush_post(seen: &mut HashMap<usize, usize>) {
    let cbs = POST_FLUSH_CBS.with(|cbs| std::mem::take(&mut *cbs.borrow_mut()));
    if cbs.is_empty() {
        return;
    }

    // Dedupe by identity, preserving first-seen order.
    let mut unique: Vec<Job> = Vec::with_capacity(cbs.len());
    for cb in cbs {
        if !unique.iter().any(|seen_cb| Arc::ptr_eq(seen_cb, &cb)) {
            unique.push(cb);
        }
    }

    for cb in unique {
        check_recursion(seen, &cb);
        error::invoke_job(&cb);
    }
}

fn check_recursion(seen: &mut HashMap<usize, usize>, job: &Job) {
    let count = seen.entry(job_id(job)).or_insert(0);
    *count += 1;
    if *count > RECURSION_LIMIT {
        panic!("{}", ReactiveError::MaxRecursiveUpdates(RECURSION_LIMIT));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::RwLock;

    #[test]
    fn jobs_run_once_per_enqueue_burst() {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let job: Job = Arc::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        queue_job(job.clone());
        queue_job(job.clone());
        queue_job(job);
        assert!(has_pending_flush());

        next_tick();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!has_pending_flush());
    }

    #[test]
    fn jobs_run_in_fifo_order() {
        let order = Arc::new(RwLock::new(Vec::new()));

        let order_a = order.clone();
        let order_b = order.clone();
        queue_job(Arc::new(move || order_a.write().unwrap().push("a")));
        queue_job(Arc::new(move || order_b.write().unwrap().push("b")));

        next_tick();
        assert_eq!(*order.read().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn post_flush_callbacks_run_after_jobs() {
        let order = Arc::new(RwLock::new(Vec::new()));

        let order_cb = order.clone();
        queue_post_flush_cb(Arc::new(move || order_cb.write().unwrap().push("post")));
        let order_job = order.clone();
        queue_job(Arc::new(move || order_job.write().unwrap().push("job")));

        next_tick();
        assert_eq!(*order.read().unwrap(), vec!["job", "post"]);
    }

    #[test]
    fn post_flush_callbacks_are_deduplicated() {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let cb: Job = Arc::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        queue_post_flush_cbs([cb.clone(), cb.clone(), cb]);
        next_tick();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callbacks_enqueueing_jobs_extend_the_pass() {
        let runs = Arc::new(AtomicI32::new(0));

        let runs_inner = runs.clone();
        let late_job: Job = Arc::new(move || {
            runs_inner.fetch_add(1, Ordering::SeqCst);
        });
        queue_post_flush_cb(Arc::new(move || queue_job(late_job.clone())));

        next_tick();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn jobs_queued_mid_flush_run_in_the_same_tick() {
        let runs = Arc::new(AtomicI32::new(0));

        let runs_inner = runs.clone();
        let second: Job = Arc::new(move || {
            runs_inner.fetch_add(1, Ordering::SeqCst);
        });
        queue_job(Arc::new(move || queue_job(second.clone())));

        next_tick();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn next_tick_then_runs_after_the_flush() {
        let order = Arc::new(RwLock::new(Vec::new()));

        let order_job = order.clone();
        queue_job(Arc::new(move || order_job.write().unwrap().push("job")));

        let order_after = order.clone();
        next_tick_then(move || order_after.write().unwrap().push("after"));
        assert_eq!(*order.read().unwrap(), vec!["job", "after"]);
    }

    #[test]
    #[should_panic(expected = "maximum recursive updates")]
    fn runaway_self_requeueing_job_is_fatal() {
        thread_local! {
            static HANDLE: RefCell<Option<Job>> = RefCell::new(None);
        }

        let job: Job = Arc::new(|| {
            HANDLE.with(|handle| {
                if let Some(job) = handle.borrow().as_ref() {
                    queue_job(job.clone());
                }
            });
        });
        HANDLE.with(|handle| *handle.borrow_mut() = Some(job.clone()));

        queue_job(job);
        next_tick();
    }
}
