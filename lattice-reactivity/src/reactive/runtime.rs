//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects sources, effects,
//! signals and memos. It owns the subscription graph and the execution
//! context, and implements the two core operations:
//!
//! - `track(source, kind, key)`, called on every state read, subscribes the
//!   active effect to `(source, key)`.
//!
//! - `trigger(source, mutation)`, called on every state mutation, collects
//!   the affected effects with key-specific fan-out rules and runs each one
//!   (directly or through its scheduler).
//!
//! # How It Works
//!
//! 1. An effect runs with itself pushed on the execution context.
//!
//! 2. Every read inside it calls `track`, which adds the effect to the
//!    `(source, key)` subscriber set and records that set in the effect's
//!    reverse index.
//!
//! 3. A mutation calls `trigger`. The runtime collects the subscribers of
//!    the affected keys, skipping the effect that is currently running (so
//!    `count += 1` inside an effect does not loop), and dispatches each
//!    collected effect exactly once.
//!
//! # Isolation
//!
//! There is no global state. Each `Runtime` has its own graph and stacks,
//! so independent runtimes (for instance one per test) never interact.
//! Signals, memos and effects hold the runtime weakly; once every `Runtime`
//! handle is dropped they keep working as plain, untracked values.

use std::sync::{Arc, Weak};

use super::context::ExecutionContext;
use super::effect::{DebuggerEvent, EffectOptions, IntoEffectFn, ReactiveEffect};
use super::memo::Memo;
use super::signal::{CustomSignal, SameValue, Signal, SignalHandle};
use super::subscriber::EffectRef;
use super::Source;
use crate::config::RuntimeConfig;
use crate::error::{self, ReactiveError};
use crate::graph::{Dispatch, FieldKey, Mutation, SubscriptionGraph, TrackOpType};

struct RuntimeInner {
    config: RuntimeConfig,
    context: ExecutionContext,
    graph: SubscriptionGraph,
}

/// Handle to a reactive runtime. Cloning shares the same runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the build-mode default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                context: ExecutionContext::new(),
                graph: SubscriptionGraph::new(),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.inner.context
    }

    pub fn graph(&self) -> &SubscriptionGraph {
        &self.inner.graph
    }

    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ------------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------------

    /// Create an effect without running it, regardless of `options.lazy`.
    pub fn create_effect<T, F>(&self, f: F, options: EffectOptions) -> ReactiveEffect<T>
    where
        T: 'static,
        F: IntoEffectFn<T>,
    {
        ReactiveEffect::new(self.downgrade(), f.into_effect_fn(), &options)
    }

    /// Create an effect and, unless it is lazy, run it once.
    pub fn effect<T, F>(&self, f: F, options: EffectOptions) -> ReactiveEffect<T>
    where
        T: 'static,
        F: IntoEffectFn<T>,
    {
        let lazy = options.is_lazy();
        let effect = self.create_effect(f, options);
        if !lazy {
            effect.run();
        }
        effect
    }

    /// Stop `effect`. Equivalent to [`ReactiveEffect::stop`].
    pub fn stop<T: 'static>(&self, effect: &ReactiveEffect<T>) {
        effect.stop();
    }

    // ------------------------------------------------------------------------
    // Tracking suppression
    // ------------------------------------------------------------------------

    pub fn pause_tracking(&self) {
        self.inner.context.pause();
    }

    pub fn enable_tracking(&self) {
        self.inner.context.enable();
    }

    pub fn reset_tracking(&self) {
        self.inner.context.reset();
    }

    /// Run `f` without recording any reads.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _paused = self.inner.context.pause_scope();
        f()
    }

    /// Whether a read right now would subscribe an effect.
    pub fn is_tracking(&self) -> bool {
        self.inner.context.tracking_effect().is_some()
    }

    pub fn active_effect(&self) -> Option<EffectRef> {
        self.inner.context.active_effect()
    }

    // ------------------------------------------------------------------------
    // Track / trigger
    // ------------------------------------------------------------------------

    /// Record that the active effect read `key` on `source`.
    ///
    /// No-op when tracking is paused or no effect is running.
    pub fn track(&self, source: &Source, kind: TrackOpType, key: impl Into<FieldKey>) {
        let Some(effect) = self.inner.context.tracking_effect() else {
            return;
        };
        if !effect.is_active() {
            return;
        }

        let source = source.to_raw();
        let key = key.into();
        let (dep, created) = self.inner.graph.dep_for(&source, key.clone());
        if created {
            source.register_runtime(self.downgrade());
        }
        if !dep.insert(&effect) {
            return;
        }
        effect.core().record(&dep);

        tracing::trace!(effect = %effect.id(), source = %source.id(), %key, %kind, "track");
        if self.inner.config.debug_hooks {
            if let Some(on_track) = effect.core().on_track() {
                on_track(&DebuggerEvent::track(effect.id(), source.id(), kind, key));
            }
        }
    }

    /// Notify the effects affected by `mutation` on `source`.
    ///
    /// Triggering through a readonly view is reported as misuse and ignored.
    pub fn trigger(&self, source: &Source, mutation: Mutation<'_>) {
        if source.is_readonly() {
            error::report(
                &self.inner.config,
                &ReactiveError::ReadonlySource {
                    target: source.id(),
                    key: mutation.key().cloned(),
                    op: mutation.op(),
                },
            );
            return;
        }

        let source = source.to_raw();
        let context = &self.inner.context;
        let running = if context.should_track() {
            context.active_effect_id()
        } else {
            None
        };

        let admit = |effect: &EffectRef| Some(effect.id()) != running || effect.allows_recurse();
        let Some(effects) =
            self.inner.graph.collect(source.id(), source.shape(), &mutation, admit)
        else {
            return;
        };

        tracing::trace!(
            source = %source.id(),
            op = %mutation.op(),
            key = ?mutation.key(),
            fanout = effects.len(),
            "trigger"
        );

        for effect in effects.into_values() {
            if self.inner.config.debug_hooks {
                if let Some(on_trigger) = effect.core().on_trigger() {
                    on_trigger(&DebuggerEvent::trigger(effect.id(), source.id(), &mutation));
                }
            }
            match effect.core().dispatch() {
                Dispatch::Deferred(scheduler) => scheduler.schedule(&effect),
                Dispatch::Immediate => effect.run(),
            }
        }
    }

    /// Number of effects subscribed to `(source, key)`.
    pub fn subscriber_count(&self, source: &Source, key: impl Into<FieldKey>) -> usize {
        self.inner
            .graph
            .dep(source.to_raw().id(), &key.into())
            .map(|dep| dep.len())
            .unwrap_or(0)
    }

    // ------------------------------------------------------------------------
    // Containers
    // ------------------------------------------------------------------------

    pub fn signal<T>(&self, value: T) -> Signal<T>
    where
        T: Clone + SameValue + std::fmt::Debug + Send + Sync + 'static,
    {
        Signal::new(self, value)
    }

    /// A signal whose tracking and triggering are driven by the caller.
    pub fn custom_signal<T, F, G, S>(&self, factory: F) -> CustomSignal<T>
    where
        T: 'static,
        F: FnOnce(SignalHandle) -> (G, S),
        G: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        CustomSignal::new(self, factory)
    }

    /// A readonly memo over `getter`.
    pub fn memo<T, G>(&self, getter: G) -> Memo<T>
    where
        T: Clone + Send + Sync + 'static,
        G: Fn() -> T + Send + Sync + 'static,
    {
        Memo::new(self, getter)
    }

    /// A writable memo: reads go through `getter`, writes to `setter`.
    pub fn memo_with_setter<T, G, S>(&self, getter: G, setter: S) -> Memo<T>
    where
        T: Clone + Send + Sync + 'static,
        G: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        Memo::with_setter(self, getter, setter)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("sources", &self.inner.graph.len())
            .field("depth", &self.inner.context.depth())
            .finish()
    }
}

/// Non-owning handle to a runtime.
#[derive(Clone, Default)]
pub struct WeakRuntime {
    inner: Weak<RuntimeInner>,
}

impl WeakRuntime {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.inner.upgrade().map(|inner| Runtime { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    pub fn ptr_eq(&self, other: &WeakRuntime) -> bool {
        Weak::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for WeakRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakRuntime")
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::FieldKey;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counting_effect(
        runtime: &Runtime,
        source: &Source,
        key: &'static str,
    ) -> (ReactiveEffect<()>, Arc<AtomicI32>) {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let rt = runtime.downgrade();
        let tracked = source.clone();
        let effect = runtime.effect(
            move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                if let Some(rt) = rt.upgrade() {
                    rt.track(&tracked, TrackOpType::Get, key);
                }
            },
            EffectOptions::new(),
        );
        (effect, runs)
    }

    #[test]
    fn track_outside_effect_is_noop() {
        let runtime = Runtime::new();
        let source = Source::record();
        runtime.track(&source, TrackOpType::Get, "a");
        assert!(runtime.graph().is_empty());
        assert!(!runtime.is_tracking());
    }

    #[test]
    fn trigger_reruns_subscribers() {
        let runtime = Runtime::new();
        let source = Source::record();
        let (effect, runs) = counting_effect(&runtime, &source, "a");

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(effect.dependency_count(), 1);

        runtime.trigger(&source, Mutation::set("a"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        runtime.trigger(&source, Mutation::set("b"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn repeated_reads_subscribe_once() {
        let runtime = Runtime::new();
        let source = Source::record();
        let rt = runtime.downgrade();
        let tracked = source.clone();
        let effect = runtime.effect(
            move || {
                if let Some(rt) = rt.upgrade() {
                    rt.track(&tracked, TrackOpType::Get, "a");
                    rt.track(&tracked, TrackOpType::Has, "a");
                }
            },
            EffectOptions::new(),
        );

        assert_eq!(runtime.subscriber_count(&source, "a"), 1);
        assert_eq!(effect.dependency_count(), 1);
    }

    #[test]
    fn paused_tracking_records_nothing() {
        let runtime = Runtime::new();
        let source = Source::record();
        let rt = runtime.downgrade();
        let tracked = source.clone();
        let _effect = runtime.effect(
            move || {
                if let Some(rt) = rt.upgrade() {
                    rt.untracked(|| rt.track(&tracked, TrackOpType::Get, "hidden"));
                    rt.track(&tracked, TrackOpType::Get, "seen");
                }
            },
            EffectOptions::new(),
        );

        assert_eq!(runtime.subscriber_count(&source, "hidden"), 0);
        assert_eq!(runtime.subscriber_count(&source, "seen"), 1);
    }

    #[test]
    fn scheduler_replaces_direct_run() {
        let runtime = Runtime::new();
        let source = Source::record();
        let scheduled = Arc::new(Mutex::new(Vec::new()));
        let scheduled_clone = scheduled.clone();
        let rt = runtime.downgrade();
        let tracked = source.clone();
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();

        let effect = runtime.effect(
            move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                if let Some(rt) = rt.upgrade() {
                    rt.track(&tracked, TrackOpType::Get, "a");
                }
            },
            EffectOptions::new().scheduler(move |effect| scheduled_clone.lock().push(effect.id())),
        );

        runtime.trigger(&source, Mutation::set("a"));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(*scheduled.lock(), vec![effect.id()]);
    }

    #[test]
    fn debug_hooks_receive_events() {
        let runtime = Runtime::with_config(RuntimeConfig {
            debug_hooks: true,
            warn_on_misuse: true,
        });
        let source = Source::record();
        let events = Arc::new(Mutex::new(Vec::new()));
        let on_track = events.clone();
        let on_trigger = events.clone();
        let rt = runtime.downgrade();
        let tracked = source.clone();

        let effect = runtime.effect(
            move || {
                if let Some(rt) = rt.upgrade() {
                    rt.track(&tracked, TrackOpType::Get, "a");
                }
            },
            EffectOptions::new()
                .on_track(move |event| on_track.lock().push(event.clone()))
                .on_trigger(move |event| on_trigger.lock().push(event.clone())),
        );

        runtime.trigger(&source, Mutation::set("a").with_new_value(&2).with_old_value(&1));

        let events = events.lock();
        assert_eq!(events.len(), 3, "track, trigger, re-track");
        assert_eq!(events[0].operation, crate::reactive::DebugOperation::Track(TrackOpType::Get));
        assert_eq!(events[0].effect, effect.id());
        assert_eq!(events[1].key, Some(FieldKey::from("a")));
        assert_eq!(events[1].new_value.as_deref(), Some("2"));
        assert_eq!(events[1].old_value.as_deref(), Some("1"));
        assert_eq!(events[1].target, source.id());
    }

    #[test]
    fn debug_hooks_are_silent_in_production() {
        let runtime = Runtime::with_config(RuntimeConfig::production());
        let source = Source::record();
        let fired = Arc::new(AtomicI32::new(0));
        let fired_track = fired.clone();
        let fired_trigger = fired.clone();
        let rt = runtime.downgrade();
        let tracked = source.clone();

        let _effect = runtime.effect(
            move || {
                if let Some(rt) = rt.upgrade() {
                    rt.track(&tracked, TrackOpType::Get, "a");
                }
            },
            EffectOptions::new()
                .on_track(move |_| {
                    fired_track.fetch_add(1, Ordering::SeqCst);
                })
                .on_trigger(move |_| {
                    fired_trigger.fetch_add(1, Ordering::SeqCst);
                }),
        );
        runtime.trigger(&source, Mutation::set("a"));

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn readonly_view_cannot_trigger() {
        let runtime = Runtime::with_config(RuntimeConfig::development());
        let source = Source::record();
        let (_effect, runs) = counting_effect(&runtime, &source, "a");

        runtime.trigger(&source.readonly(), Mutation::set("a"));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        runtime.trigger(&source.reactive(), Mutation::set("a"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn views_share_the_raw_subscriptions() {
        let runtime = Runtime::new();
        let raw = Source::record();
        let view = raw.reactive();
        let (_effect, runs) = counting_effect(&runtime, &view, "a");

        assert_eq!(runtime.subscriber_count(&raw, "a"), 1);
        runtime.trigger(&raw, Mutation::set("a"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropping_a_source_prunes_its_entries() {
        let runtime = Runtime::new();
        let source = Source::record();
        let (effect, _runs) = counting_effect(&runtime, &source, "a");
        let id = source.id();
        assert!(runtime.graph().contains(id));

        // The effect closure holds a clone; stopping it and dropping the
        // effect releases the last handles.
        effect.stop();
        drop(effect);
        drop(source);
        assert!(!runtime.graph().contains(id));
    }

    #[test]
    fn dropped_runtime_leaves_effects_untracked() {
        let runtime = Runtime::new();
        let effect = runtime.effect(|| 5, EffectOptions::new().lazy(true));
        drop(runtime);
        assert_eq!(effect.run(), Some(5));
    }

    #[test]
    fn runtimes_are_isolated() {
        let first = Runtime::new();
        let second = Runtime::new();
        let source = Source::record();
        let (_effect, runs) = counting_effect(&first, &source, "a");

        second.trigger(&source, Mutation::set("a"));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(second.graph().is_empty());
    }
}
