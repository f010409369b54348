//! Subscriber types for the reactive system.
//!
//! A subscriber is any effect that depends on reactive state. The graph and
//! the execution context store subscribers type-erased as [`EffectRef`], so
//! effects returning different value types can share subscriber sets.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use super::effect::EffectCore;

/// Unique identifier for an effect.
///
/// Ids are allocated from a process-wide monotonic counter, so they also
/// order effects by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EffectId(u64);

impl EffectId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Type-erased view of an effect, implemented by every `ReactiveEffect<T>`.
pub(crate) trait AnyEffect: Send + Sync {
    fn core(&self) -> &EffectCore;

    /// Run the effect and discard its value.
    fn run_erased(self: Arc<Self>);
}

/// Shared, type-erased handle to an effect.
///
/// This is what subscriber sets hold, what schedulers receive, and what the
/// execution context stacks. Equality and hashing use the effect id.
#[derive(Clone)]
pub struct EffectRef {
    inner: Arc<dyn AnyEffect>,
}

impl EffectRef {
    pub(crate) fn new(inner: Arc<dyn AnyEffect>) -> Self {
        Self { inner }
    }

    pub(crate) fn core(&self) -> &EffectCore {
        self.inner.core()
    }

    pub fn id(&self) -> EffectId {
        self.core().id()
    }

    pub fn is_active(&self) -> bool {
        self.core().is_active()
    }

    /// Whether this effect may re-trigger itself while running.
    pub fn allows_recurse(&self) -> bool {
        self.core().allows_recurse()
    }

    /// Run the effect now, discarding its value.
    ///
    /// Schedulers call this when they decide the effect should re-run.
    pub fn run(&self) {
        Arc::clone(&self.inner).run_erased();
    }

    /// Stop the effect. See [`ReactiveEffect::stop`](super::ReactiveEffect::stop).
    pub fn stop(&self) {
        self.core().stop();
    }

    /// Number of subscriber sets this effect currently belongs to.
    pub fn dependency_count(&self) -> usize {
        self.core().dependency_count()
    }
}

impl PartialEq for EffectRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for EffectRef {}

impl Hash for EffectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for EffectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectRef")
            .field("id", &self.id())
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{EffectOptions, Runtime};

    #[test]
    fn effect_ids_are_unique_and_ordered() {
        let id1 = EffectId::next();
        let id2 = EffectId::next();
        let id3 = EffectId::next();

        assert_ne!(id1, id2);
        assert!(id1 < id2);
        assert!(id2 < id3);
    }

    #[test]
    fn handles_compare_by_id() {
        let runtime = Runtime::new();
        let effect = runtime.create_effect(|| 1, EffectOptions::new().lazy(true));
        let other = runtime.create_effect(|| 1, EffectOptions::new().lazy(true));

        assert_eq!(effect.handle(), effect.handle());
        assert_ne!(effect.handle(), other.handle());
        assert_eq!(format!("{}", EffectId(4)), "#4");
    }
}
