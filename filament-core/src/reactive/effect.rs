//! Effect implementation.
//!
//! An effect is a user computation that re-runs whenever any observed data
//! it previously read is mutated.
//!
//! # How effects work
//!
//! 1. When created (unless lazy), the effect runs its body immediately to
//!    establish initial dependencies.
//!
//! 2. Before every run, the effect's old dependencies are cleaned: it is
//!    removed from every dep-set it belonged to, so its recorded
//!    dependencies always reflect exactly the latest run's reads.
//!
//! 3. While the body runs, the effect sits on the thread-local effect stack
//!    and every tracked read subscribes it.
//!
//! 4. When a dependency triggers, the effect either re-runs directly or is
//!    handed to its scheduler option.
//!
//! Re-running an effect that is already on the stack is a no-op. An effect
//! that writes a value it also reads therefore terminates instead of
//! retriggering itself.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::value::{ObjId, Value};

use super::context;
use super::dep::{self, DepKey, TrackOp, TriggerOp};

/// Unique identifier for an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId(u64);

impl EffectId {
    /// Generate a new unique effect ID.
    pub fn new() -> Self {
        use std::sync::atomic::AtomicU64;
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

/// Scheduler callback invoked instead of running the effect directly.
pub type SchedulerFn = Arc<dyn Fn(&Arc<ReactiveEffect>) + Send + Sync>;

/// Diagnostic hook fired when an effect records a dependency.
pub type TrackHook = Arc<dyn Fn(&TrackEvent) + Send + Sync>;

/// Diagnostic hook fired when a mutation is about to run an effect.
pub type TriggerHook = Arc<dyn Fn(&TriggerEvent) + Send + Sync>;

/// Diagnostic hook fired when an effect is stopped.
pub type StopHook = Arc<dyn Fn() + Send + Sync>;

/// Options controlling effect creation and scheduling.
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Do not run on creation; the first invocation is manual.
    pub lazy: bool,
    /// Mark as a memoized effect, scheduled ahead of ordinary effects.
    pub computed: bool,
    /// If present, called instead of invoking the effect on trigger.
    pub scheduler: Option<SchedulerFn>,
    pub on_track: Option<TrackHook>,
    pub on_trigger: Option<TriggerHook>,
    pub on_stop: Option<StopHook>,
}

/// Payload of the `on_track` diagnostic hook.
#[derive(Debug, Clone)]
pub struct TrackEvent {
    pub effect: EffectId,
    pub target: ObjId,
    pub op: TrackOp,
    pub key: DepKey,
}

/// Payload of the `on_trigger` diagnostic hook.
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    pub effect: EffectId,
    pub target: ObjId,
    pub op: TriggerOp,
    pub key: Option<DepKey>,
    pub new_value: Option<Value>,
}

/// A computation that re-runs when its observed dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let o = observe(Obj::record_from([("n", Value::Int(1))]).into());
/// let view = o.as_view().unwrap().clone();
///
/// let e = effect(move || {
///     println!("n is {:?}", view.get("n"));
/// });
///
/// view.set("n", Value::Int(2)); // prints: n is 2
/// ```
pub struct ReactiveEffect {
    id: EffectId,
    body: Arc<dyn Fn() -> Value + Send + Sync>,
    active: AtomicBool,
    run_count: AtomicUsize,
    /// Back-pointers to every dep-set this effect currently belongs to.
    /// Kept symmetric with the target map so cleanup is proportional to the
    /// number of dependencies, not the size of the graph.
    deps: RwLock<Vec<(ObjId, DepKey)>>,
    options: EffectOptions,
}

impl ReactiveEffect {
    /// Create an effect from a value-returning body.
    ///
    /// Unless `options.lazy` is set, the effect runs once immediately.
    pub fn new<F>(body: F, options: EffectOptions) -> Arc<Self>
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self::from_shared(Arc::new(body), options)
    }

    /// Create an effect reusing the body of an existing one, with new
    /// options.
    pub fn wrap(source: &Arc<ReactiveEffect>, options: EffectOptions) -> Arc<Self> {
        Self::from_shared(source.body.clone(), options)
    }

    fn from_shared(
        body: Arc<dyn Fn() -> Value + Send + Sync>,
        options: EffectOptions,
    ) -> Arc<Self> {
        let effect = Arc::new(Self {
            id: EffectId::new(),
            body,
            active: AtomicBool::new(true),
            run_count: AtomicUsize::new(0),
            deps: RwLock::new(Vec::new()),
            options,
        });

        dep::register_effect(&effect);

        if !effect.options.lazy {
            effect.run();
        }

        effect
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> EffectId {
        self.id
    }

    /// Whether the effect has been stopped.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of completed runs.
    pub fn run_count(&self) -> usize {
        self.run_count.load(Ordering::SeqCst)
    }

    /// Number of dep-sets the effect currently belongs to.
    pub fn dep_count(&self) -> usize {
        self.deps.read().expect("effect deps lock poisoned").len()
    }

    pub(crate) fn options(&self) -> &EffectOptions {
        &self.options
    }

    pub(crate) fn is_computed(&self) -> bool {
        self.options.computed
    }

    pub(crate) fn push_dep(&self, entry: (ObjId, DepKey)) {
        self.deps
            .write()
            .expect("effect deps lock poisoned")
            .push(entry);
    }

    pub(crate) fn deps_snapshot(&self) -> Vec<(ObjId, DepKey)> {
        self.deps.read().expect("effect deps lock poisoned").clone()
    }

    /// Run the effect body.
    ///
    /// A stopped effect invokes its body untracked. An effect already on the
    /// running stack returns without doing anything, which is what breaks
    /// self-triggering loops.
    pub fn run(self: &Arc<Self>) -> Value {
        if !self.is_active() {
            return (self.body)();
        }
        if context::is_running(self.id) {
            return Value::Null;
        }

        self.cleanup();
        let _frame = context::push_effect(Arc::clone(self));
        let result = (self.body)();
        self.run_count.fetch_add(1, Ordering::SeqCst);
        result
    }

    /// Remove the effect from every dep-set it belongs to and clear its
    /// back-pointer list.
    pub(crate) fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.deps.write().expect("effect deps lock poisoned"));
        if !deps.is_empty() {
            dep::remove_effect_from(self.id, &deps);
        }
    }
}

impl Drop for ReactiveEffect {
    fn drop(&mut self) {
        // Last handle gone: leave no dangling subscriptions behind.
        let deps = std::mem::take(&mut *self.deps.write().expect("effect deps lock poisoned"));
        if !deps.is_empty() {
            dep::remove_effect_from(self.id, &deps);
        }
        dep::unregister_effect(self.id);
    }
}

impl Debug for ReactiveEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .field("computed", &self.options.computed)
            .field("run_count", &self.run_count())
            .field("dep_count", &self.dep_count())
            .finish()
    }
}

/// Create and immediately run an effect from a plain closure.
pub fn effect<F>(f: F) -> Arc<ReactiveEffect>
where
    F: Fn() + Send + Sync + 'static,
{
    ReactiveEffect::new(
        move || {
            f();
            Value::Null
        },
        EffectOptions::default(),
    )
}

/// Stop an effect: clean its dependencies, fire `on_stop`, and deactivate.
///
/// Subsequent triggers never reach a stopped effect; invoking it manually
/// runs the body untracked.
pub fn stop(effect: &Arc<ReactiveEffect>) {
    if effect.active.swap(false, Ordering::SeqCst) {
        effect.cleanup();
        if let Some(hook) = &effect.options.on_stop {
            hook();
        }
    }
}
