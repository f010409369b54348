//! Execution Context
//!
//! The execution context tracks which effect is currently running and
//! whether reads should be recorded at all.
//!
//! # Implementation
//!
//! Two stacks live on each [`Runtime`](super::Runtime):
//!
//! - the effect stack: effects currently mid-run. The top is the active
//!   effect, the only one that subscribes to reads happening right now. An
//!   effect appears on it at most once; a re-entrant run is skipped.
//!
//! - the tracking stack: saved enabled/disabled states, so any region of
//!   code can pause tracking and restore whatever was in force before.
//!
//! Both are released through guards, so a panicking computation still
//! leaves the stacks balanced for the next, unrelated effect.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{EffectId, EffectRef};

/// Per-runtime stacks of running effects and tracking states.
#[derive(Debug)]
pub struct ExecutionContext {
    effects: Mutex<Vec<EffectRef>>,
    tracking: Mutex<Vec<bool>>,
    should_track: AtomicBool,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            effects: Mutex::new(Vec::new()),
            tracking: Mutex::new(Vec::new()),
            should_track: AtomicBool::new(true),
        }
    }

    /// The effect whose reads are being recorded, if any.
    pub fn active_effect(&self) -> Option<EffectRef> {
        self.effects.lock().last().cloned()
    }

    pub fn active_effect_id(&self) -> Option<EffectId> {
        self.effects.lock().last().map(EffectRef::id)
    }

    /// Number of effects currently mid-run.
    pub fn depth(&self) -> usize {
        self.effects.lock().len()
    }

    /// Whether `id` is anywhere on the effect stack.
    pub fn is_running(&self, id: EffectId) -> bool {
        self.effects.lock().iter().any(|effect| effect.id() == id)
    }

    /// Whether reads are currently recorded.
    pub fn should_track(&self) -> bool {
        self.should_track.load(Ordering::SeqCst)
    }

    /// The effect a read should subscribe, if tracking is enabled.
    pub(crate) fn tracking_effect(&self) -> Option<EffectRef> {
        if self.should_track() {
            self.active_effect()
        } else {
            None
        }
    }

    /// Save the current state and disable tracking.
    pub fn pause(&self) {
        self.push_state(false);
    }

    /// Save the current state and enable tracking.
    pub fn enable(&self) {
        self.push_state(true);
    }

    /// Restore the last saved state, or enable tracking if none was saved.
    pub fn reset(&self) {
        let last = self.tracking.lock().pop();
        self.should_track.store(last.unwrap_or(true), Ordering::SeqCst);
    }

    fn push_state(&self, enabled: bool) {
        self.tracking.lock().push(self.should_track());
        self.should_track.store(enabled, Ordering::SeqCst);
    }

    /// Pause tracking until the returned guard is dropped.
    pub fn pause_scope(&self) -> PauseGuard<'_> {
        self.pause();
        PauseGuard { context: self }
    }

    /// Make `effect` the active effect with tracking enabled.
    ///
    /// The effect is popped and the previous tracking state restored when
    /// the returned guard is dropped.
    pub(crate) fn enter(&self, effect: EffectRef) -> ContextGuard<'_> {
        let id = effect.id();
        self.enable();
        self.effects.lock().push(effect);
        ContextGuard { context: self, effect: id }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that pops the running effect when dropped.
///
/// This keeps the effect stack balanced even if the computation panics.
pub struct ContextGuard<'a> {
    context: &'a ExecutionContext,
    effect: EffectId,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        let popped = self.context.effects.lock().pop();

        // Verify we're popping the right effect.
        debug_assert_eq!(
            popped.as_ref().map(EffectRef::id),
            Some(self.effect),
            "execution context mismatch"
        );

        self.context.reset();
        drop(popped);
    }
}

/// Guard that restores the previous tracking state when dropped.
pub struct PauseGuard<'a> {
    context: &'a ExecutionContext,
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.context.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{EffectOptions, Runtime};

    fn handle(runtime: &Runtime) -> EffectRef {
        runtime
            .create_effect(|| {}, EffectOptions::new().lazy(true))
            .handle()
    }

    #[test]
    fn context_tracks_active_effect() {
        let runtime = Runtime::new();
        let context = ExecutionContext::new();
        let effect = handle(&runtime);

        assert!(context.active_effect().is_none());

        {
            let _guard = context.enter(effect.clone());
            assert_eq!(context.active_effect_id(), Some(effect.id()));
            assert!(context.is_running(effect.id()));
        }

        // Context should be cleaned up after drop
        assert!(context.active_effect().is_none());
        assert_eq!(context.depth(), 0);
    }

    #[test]
    fn nested_contexts() {
        let runtime = Runtime::new();
        let context = ExecutionContext::new();
        let outer = handle(&runtime);
        let inner = handle(&runtime);

        {
            let _outer = context.enter(outer.clone());
            {
                let _inner = context.enter(inner.clone());
                assert_eq!(context.active_effect_id(), Some(inner.id()));
                assert!(context.is_running(outer.id()));
            }

            // After inner context drops, outer should be current
            assert_eq!(context.active_effect_id(), Some(outer.id()));
        }

        assert!(context.active_effect_id().is_none());
    }

    #[test]
    fn entering_enables_tracking_and_restores_it() {
        let runtime = Runtime::new();
        let context = ExecutionContext::new();
        let effect = handle(&runtime);

        context.pause();
        assert!(context.tracking_effect().is_none());
        {
            let _guard = context.enter(effect.clone());
            assert!(context.should_track());
            assert_eq!(context.tracking_effect().map(|e| e.id()), Some(effect.id()));
        }
        assert!(!context.should_track());
        context.reset();
        assert!(context.should_track());
    }

    #[test]
    fn suppression_nests() {
        let context = ExecutionContext::new();

        context.pause();
        context.enable();
        context.pause();
        assert!(!context.should_track());
        context.reset();
        assert!(context.should_track());
        context.reset();
        assert!(!context.should_track());
        context.reset();
        assert!(context.should_track());

        // Unbalanced reset falls back to enabled.
        context.reset();
        assert!(context.should_track());
    }

    #[test]
    fn pause_scope_restores_on_drop() {
        let context = ExecutionContext::new();
        {
            let _paused = context.pause_scope();
            assert!(!context.should_track());
        }
        assert!(context.should_track());
    }
}
