//! Effect Implementation
//!
//! An Effect is a re-runnable computation that subscribes to every piece of
//! state it reads while running, and re-runs when that state changes.
//!
//! # How Effects Work
//!
//! 1. Unless created lazily, the effect runs once immediately to establish
//!    its initial dependencies.
//!
//! 2. Every run first leaves all the subscriber sets it joined last time,
//!    then joins fresh ones as reads happen. A run that takes a different
//!    code path therefore drops the dependencies it no longer reads.
//!
//! 3. When a dependency is triggered, the effect either re-runs directly or
//!    is handed to its scheduler, which decides when (or whether) it runs.
//!
//! 4. Stopping an effect leaves every subscriber set for good.
//!
//! # Re-entrancy
//!
//! An effect already on the execution stack is never pushed again: a
//! re-entrant run is skipped and yields `None`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use smallvec::SmallVec;

use super::runtime::WeakRuntime;
use super::subscriber::{AnyEffect, EffectId, EffectRef};
use super::SourceId;
use crate::graph::{Dep, Dispatch, FieldKey, Mutation, Scheduler, TrackOpType, TriggerOpType};

/// A raw effect computation.
pub type RawFn<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Debug hook receiving track / trigger events.
pub type DebugHook = Arc<dyn Fn(&DebuggerEvent) + Send + Sync>;

/// Hook invoked once when an effect is stopped.
pub type StopHook = Arc<dyn Fn() + Send + Sync>;

/// What happened in a [`DebuggerEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugOperation {
    Track(TrackOpType),
    Trigger(TriggerOpType),
}

/// Event passed to `on_track` / `on_trigger` hooks.
///
/// Values are rendered with `Debug` since the core never inspects them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebuggerEvent {
    pub effect: EffectId,
    pub target: SourceId,
    pub operation: DebugOperation,
    pub key: Option<FieldKey>,
    pub new_value: Option<String>,
    pub old_value: Option<String>,
    pub old_target: Option<String>,
}

impl DebuggerEvent {
    pub(crate) fn track(
        effect: EffectId,
        target: SourceId,
        kind: TrackOpType,
        key: FieldKey,
    ) -> Self {
        Self {
            effect,
            target,
            operation: DebugOperation::Track(kind),
            key: Some(key),
            new_value: None,
            old_value: None,
            old_target: None,
        }
    }

    pub(crate) fn trigger(effect: EffectId, target: SourceId, mutation: &Mutation<'_>) -> Self {
        Self {
            effect,
            target,
            operation: DebugOperation::Trigger(mutation.op()),
            key: mutation.key().cloned(),
            new_value: mutation.render_new_value(),
            old_value: mutation.render_old_value(),
            old_target: mutation.render_old_target(),
        }
    }
}

/// Options controlling how an effect is created and dispatched.
#[derive(Clone, Default)]
pub struct EffectOptions {
    lazy: bool,
    allow_recurse: bool,
    scheduler: Option<Scheduler>,
    on_track: Option<DebugHook>,
    on_trigger: Option<DebugHook>,
    on_stop: Option<StopHook>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Do not run the effect on creation.
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Let the effect re-trigger itself while it is running.
    pub fn allow_recurse(mut self, allow: bool) -> Self {
        self.allow_recurse = allow;
        self
    }

    /// Hand triggered runs to `schedule` instead of re-running directly.
    pub fn scheduler<F>(self, schedule: F) -> Self
    where
        F: Fn(&EffectRef) + Send + Sync + 'static,
    {
        self.with_scheduler(Scheduler::new(schedule))
    }

    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn on_track<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DebuggerEvent) + Send + Sync + 'static,
    {
        self.on_track = Some(Arc::new(hook));
        self
    }

    pub fn on_trigger<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DebuggerEvent) + Send + Sync + 'static,
    {
        self.on_trigger = Some(Arc::new(hook));
        self
    }

    pub fn on_stop<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_stop = Some(Arc::new(hook));
        self
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("allow_recurse", &self.allow_recurse)
            .field("scheduler", &self.scheduler.is_some())
            .field("on_track", &self.on_track.is_some())
            .field("on_trigger", &self.on_trigger.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .finish()
    }
}

/// Type-independent effect state: identity, status and reverse index.
pub(crate) struct EffectCore {
    id: EffectId,
    runtime: WeakRuntime,
    active: AtomicBool,
    allow_recurse: bool,
    dispatch: Dispatch,
    /// Subscriber sets this effect belongs to.
    deps: Mutex<SmallVec<[Weak<Dep>; 4]>>,
    on_track: Option<DebugHook>,
    on_trigger: Option<DebugHook>,
    on_stop: Option<StopHook>,
}

impl EffectCore {
    fn new(runtime: WeakRuntime, options: &EffectOptions) -> Self {
        Self {
            id: EffectId::next(),
            runtime,
            active: AtomicBool::new(true),
            allow_recurse: options.allow_recurse,
            dispatch: match &options.scheduler {
                Some(scheduler) => Dispatch::Deferred(scheduler.clone()),
                None => Dispatch::Immediate,
            },
            deps: Mutex::new(SmallVec::new()),
            on_track: options.on_track.clone(),
            on_trigger: options.on_trigger.clone(),
            on_stop: options.on_stop.clone(),
        }
    }

    pub(crate) fn id(&self) -> EffectId {
        self.id
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn allows_recurse(&self) -> bool {
        self.allow_recurse
    }

    pub(crate) fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub(crate) fn on_track(&self) -> Option<&DebugHook> {
        self.on_track.as_ref()
    }

    pub(crate) fn on_trigger(&self) -> Option<&DebugHook> {
        self.on_trigger.as_ref()
    }

    /// Append `dep` to the reverse index.
    pub(crate) fn record(&self, dep: &Arc<Dep>) {
        self.deps.lock().push(Arc::downgrade(dep));
    }

    /// Number of live subscriber sets this effect belongs to.
    pub(crate) fn dependency_count(&self) -> usize {
        self.deps
            .lock()
            .iter()
            .filter(|dep| dep.strong_count() > 0)
            .count()
    }

    /// Leave every subscriber set and clear the reverse index.
    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.deps.lock());
        for dep in deps.iter().filter_map(Weak::upgrade) {
            let removed = dep.remove(self.id);
            drop(removed);
        }
    }

    pub(crate) fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.cleanup();
            tracing::debug!(effect = %self.id, "effect stopped");
            if let Some(on_stop) = &self.on_stop {
                on_stop();
            }
        }
    }
}

struct EffectInner<T: 'static> {
    core: EffectCore,
    raw: RawFn<T>,
}

impl<T: 'static> EffectInner<T> {
    fn run(this: &Arc<Self>) -> Option<T> {
        if !this.core.is_active() {
            return match this.core.dispatch {
                Dispatch::Immediate => Some((this.raw)()),
                Dispatch::Deferred(_) => None,
            };
        }

        let Some(runtime) = this.core.runtime.upgrade() else {
            return Some((this.raw)());
        };
        let context = runtime.context();
        if context.is_running(this.core.id) {
            tracing::trace!(effect = %this.core.id, "skipping re-entrant run");
            return None;
        }

        this.core.cleanup();
        let _guard = context.enter(EffectRef::new(Arc::clone(this) as Arc<dyn AnyEffect>));
        Some((this.raw)())
    }
}

impl<T: 'static> AnyEffect for EffectInner<T> {
    fn core(&self) -> &EffectCore {
        &self.core
    }

    fn run_erased(self: Arc<Self>) {
        let _ = Self::run(&self);
    }
}

/// A computation that re-runs when the state it read changes.
///
/// Cloning the handle shares the same effect.
///
/// # Example
///
/// ```rust,ignore
/// let count = runtime.signal(0);
///
/// let log = count.clone();
/// let effect = runtime.effect(move || println!("count is {}", log.get()), EffectOptions::new());
///
/// count.set(5);   // prints "count is 5"
/// effect.stop();
/// count.set(6);   // prints nothing
/// ```
pub struct ReactiveEffect<T: 'static> {
    inner: Arc<EffectInner<T>>,
}

impl<T: 'static> ReactiveEffect<T> {
    pub(crate) fn new(runtime: WeakRuntime, raw: RawFn<T>, options: &EffectOptions) -> Self {
        let effect = Self {
            inner: Arc::new(EffectInner {
                core: EffectCore::new(runtime, options),
                raw,
            }),
        };
        tracing::debug!(effect = %effect.id(), lazy = options.lazy, "effect created");
        effect
    }

    pub fn id(&self) -> EffectId {
        self.inner.core.id
    }

    /// Run the computation now, re-collecting its dependencies.
    ///
    /// Returns `None` if the run was skipped: the effect is already running
    /// further up the stack, or it was stopped and is scheduler-driven. A
    /// stopped effect without a scheduler still runs, untracked.
    pub fn run(&self) -> Option<T> {
        EffectInner::run(&self.inner)
    }

    /// Leave every subscriber set and disable future tracked runs.
    ///
    /// Invokes the `on_stop` hook the first time. Stopping again is a no-op.
    pub fn stop(&self) {
        self.inner.core.stop();
    }

    pub fn is_active(&self) -> bool {
        self.inner.core.is_active()
    }

    /// Type-erased handle to this effect.
    pub fn handle(&self) -> EffectRef {
        EffectRef::new(Arc::clone(&self.inner) as Arc<dyn AnyEffect>)
    }

    /// The unwrapped computation.
    pub fn raw(&self) -> RawFn<T> {
        Arc::clone(&self.inner.raw)
    }

    /// Number of subscriber sets this effect currently belongs to.
    pub fn dependency_count(&self) -> usize {
        self.inner.core.dependency_count()
    }
}

impl<T: 'static> Clone for ReactiveEffect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for ReactiveEffect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("id", &self.id())
            .field("active", &self.is_active())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

/// Anything an effect can be built from.
///
/// Closures are wrapped as-is. Passing an existing effect reuses its raw
/// computation rather than nesting one effect inside another.
pub trait IntoEffectFn<T> {
    fn into_effect_fn(self) -> RawFn<T>;
}

impl<T, F> IntoEffectFn<T> for F
where
    T: 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    fn into_effect_fn(self) -> RawFn<T> {
        Arc::new(self)
    }
}

impl<T: 'static> IntoEffectFn<T> for ReactiveEffect<T> {
    fn into_effect_fn(self) -> RawFn<T> {
        self.raw()
    }
}

impl<T: 'static> IntoEffectFn<T> for &ReactiveEffect<T> {
    fn into_effect_fn(self) -> RawFn<T> {
        self.raw()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Runtime, Source};
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn effect_runs_on_creation() {
        let runtime = Runtime::new();
        let run_count = Arc::new(AtomicI32::new(0));
        let run_count_clone = run_count.clone();

        let _effect = runtime.effect(
            move || {
                run_count_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::new(),
        );

        // Effect should have run once on creation
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn effect_lazy_does_not_run_on_creation() {
        let runtime = Runtime::new();
        let run_count = Arc::new(AtomicI32::new(0));
        let run_count_clone = run_count.clone();

        let effect = runtime.effect(
            move || run_count_clone.fetch_add(1, Ordering::SeqCst) + 1,
            EffectOptions::new().lazy(true),
        );

        assert_eq!(run_count.load(Ordering::SeqCst), 0);

        // Manually run; the value is handed back
        assert_eq!(effect.run(), Some(1));
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rewrapping_an_effect_reuses_its_raw_computation() {
        let runtime = Runtime::new();
        let first = runtime.effect(|| 7, EffectOptions::new().lazy(true));
        let second = runtime.effect(&first, EffectOptions::new().lazy(true));

        assert_ne!(first.id(), second.id());
        assert!(Arc::ptr_eq(&first.raw(), &second.raw()));
        assert_eq!(second.run(), Some(7));
    }

    #[test]
    fn stopped_effect_runs_untracked_without_scheduler() {
        let runtime = Runtime::new();
        let source = Source::record();
        let rt = runtime.clone();
        let tracked = source.clone();
        let effect = runtime.effect(
            move || rt.track(&tracked, TrackOpType::Get, "a"),
            EffectOptions::new(),
        );
        assert_eq!(effect.dependency_count(), 1);

        effect.stop();
        assert!(!effect.is_active());
        assert_eq!(effect.dependency_count(), 0);

        assert_eq!(effect.run(), Some(()));
        assert_eq!(effect.dependency_count(), 0);
        assert_eq!(runtime.subscriber_count(&source, "a"), 0);
    }

    #[test]
    fn stopped_scheduled_effect_yields_nothing() {
        let runtime = Runtime::new();
        let effect = runtime.effect(|| 3, EffectOptions::new().scheduler(|_| {}));

        assert_eq!(effect.run(), Some(3));
        effect.stop();
        assert_eq!(effect.run(), None);
    }

    #[test]
    fn stop_is_idempotent_and_calls_hook_once() {
        let runtime = Runtime::new();
        let stops = Arc::new(AtomicI32::new(0));
        let stops_clone = stops.clone();
        let effect = runtime.effect(
            || {},
            EffectOptions::new().on_stop(move || {
                stops_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        effect.stop();
        effect.stop();
        effect.handle().stop();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reentrant_run_is_skipped() {
        let runtime = Runtime::new();
        let nested = Arc::new(Mutex::new(None));
        let slot: Arc<Mutex<Option<ReactiveEffect<i32>>>> = Arc::new(Mutex::new(None));

        let slot_clone = slot.clone();
        let nested_clone = nested.clone();
        let effect = runtime.effect(
            move || {
                let me = slot_clone.lock().clone();
                if let Some(me) = me {
                    *nested_clone.lock() = Some(me.run());
                }
                1
            },
            EffectOptions::new().lazy(true),
        );
        *slot.lock() = Some(effect.clone());

        assert_eq!(effect.run(), Some(1));
        assert_eq!(*nested.lock(), Some(None));
        slot.lock().take();
    }

    #[test]
    fn effect_clone_shares_state() {
        let runtime = Runtime::new();
        let effect1 = runtime.effect(|| {}, EffectOptions::new());
        let effect2 = effect1.clone();

        assert_eq!(effect1.id(), effect2.id());

        effect1.stop();
        assert!(!effect2.is_active());
    }

    #[test]
    fn options_debug_hides_callbacks() {
        let options = EffectOptions::new().lazy(true).scheduler(|_| {});
        let rendered = format!("{options:?}");
        assert!(rendered.contains("lazy: true"));
        assert!(rendered.contains("scheduler: true"));
        assert!(options.is_lazy());
    }
}
