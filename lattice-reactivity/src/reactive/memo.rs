//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. Construction wraps the getter in a lazy effect. Nothing is computed
//!    until the first read.
//!
//! 2. A read of a dirty memo runs that effect, caches the result and marks
//!    the memo clean. A read of a clean memo returns the cache.
//!
//! 3. When a dependency changes, the effect's scheduler marks the memo dirty
//!    and triggers the memo's own `"value"` field, so effects reading the
//!    memo re-run and pull the new value. A memo that is already dirty
//!    stays silent.
//!
//! # Why This Matters
//!
//! - A signal changes
//! - 10 memos depend on it
//! - Only the memos actually read again will recompute
//! - Memos that are never read stay dirty (no wasted work)

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::Serialize;

use super::effect::{EffectOptions, ReactiveEffect};
use super::runtime::{Runtime, WeakRuntime};
use super::signal::{SignalGet, VALUE_KEY};
use super::subscriber::EffectRef;
use super::{Source, SourceId};
use crate::config::RuntimeConfig;
use crate::error::{self, ReactiveError};
use crate::graph::{Mutation, TrackOpType};

/// Cache state of a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// The memo must recompute on next read.
    Dirty,
}

type Setter<T> = Arc<dyn Fn(T) + Send + Sync>;

struct MemoInner<T: Clone + Send + Sync + 'static> {
    runtime: WeakRuntime,
    config: RuntimeConfig,
    source: Source,
    effect: ReactiveEffect<T>,
    value: RwLock<Option<T>>,
    dirty: AtomicBool,
    setter: Option<Setter<T>>,
}

impl<T: Clone + Send + Sync + 'static> MemoInner<T> {
    /// Scheduler transition: clean to dirty, notifying readers once.
    fn invalidate(&self) {
        if self.dirty.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::trace!(memo = %self.source.id(), "memo invalidated");
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.trigger(&self.source, Mutation::set(VALUE_KEY));
        }
    }

    /// Recompute a dirty memo.
    ///
    /// A stopped memo evaluates its getter untracked on every read. A read
    /// from inside its own computation falls back to the cache.
    fn refresh(&self) -> Option<T> {
        if !self.effect.is_active() {
            let raw = self.effect.raw();
            return Some(match self.runtime.upgrade() {
                Some(runtime) => runtime.untracked(|| raw()),
                None => raw(),
            });
        }

        match self.effect.run() {
            Some(value) => {
                *self.value.write() = Some(value.clone());
                self.dirty.store(false, Ordering::SeqCst);
                Some(value)
            }
            None => self.value.read().clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for MemoInner<T> {
    fn drop(&mut self) {
        self.effect.stop();
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let count = runtime.signal(2);
///
/// let source = count.clone();
/// let doubled = runtime.memo(move || source.get() * 2);
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Memo<T: Clone + Send + Sync + 'static> {
    inner: Arc<MemoInner<T>>,
}

impl<T: Clone + Send + Sync + 'static> Memo<T> {
    /// Create a readonly memo. The getter runs on first read.
    pub fn new<G>(runtime: &Runtime, getter: G) -> Self
    where
        G: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(runtime, getter, None)
    }

    /// Create a writable memo whose writes are forwarded to `setter`.
    pub fn with_setter<G, S>(runtime: &Runtime, getter: G, setter: S) -> Self
    where
        G: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        Self::build(runtime, getter, Some(Arc::new(setter)))
    }

    fn build<G>(runtime: &Runtime, getter: G, setter: Option<Setter<T>>) -> Self
    where
        G: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|weak: &Weak<MemoInner<T>>| {
            let weak = weak.clone();
            let options = EffectOptions::new().lazy(true).scheduler(move |_| {
                if let Some(inner) = weak.upgrade() {
                    inner.invalidate();
                }
            });
            MemoInner {
                runtime: runtime.downgrade(),
                config: *runtime.config(),
                source: Source::record(),
                effect: runtime.create_effect(getter, options),
                value: RwLock::new(None),
                dirty: AtomicBool::new(true),
                setter,
            }
        });
        Self { inner }
    }

    pub fn id(&self) -> SourceId {
        self.inner.source.id()
    }

    pub fn source(&self) -> &Source {
        &self.inner.source
    }

    /// Current value, recomputing if dirty.
    ///
    /// A memo that reads itself while computing its first value has nothing
    /// to return; that read reports [`ReactiveError::CyclicMemo`].
    pub fn try_get(&self) -> Result<T, ReactiveError> {
        let inner = &self.inner;
        let value = if inner.dirty.load(Ordering::SeqCst) {
            inner.refresh()
        } else {
            inner.value.read().clone()
        };
        if let Some(runtime) = inner.runtime.upgrade() {
            runtime.track(&inner.source, TrackOpType::Get, VALUE_KEY);
        }
        value.ok_or_else(|| {
            let err = ReactiveError::CyclicMemo { memo: self.id() };
            error::report(&inner.config, &err);
            err
        })
    }

    /// Current value, recomputing if dirty.
    ///
    /// A cyclic read before the first value exists yields `T::default()`.
    pub fn get(&self) -> T
    where
        T: Default,
    {
        self.try_get().unwrap_or_default()
    }

    /// Forward `value` to the setter.
    ///
    /// Readonly memos reject the write and keep their state.
    pub fn set(&self, value: T) -> Result<(), ReactiveError> {
        match &self.inner.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => {
                let err = ReactiveError::ReadonlyMemo;
                error::report(&self.inner.config, &err);
                Err(err)
            }
        }
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.setter.is_none()
    }

    pub fn state(&self) -> MemoState {
        if self.inner.dirty.load(Ordering::SeqCst) {
            MemoState::Dirty
        } else {
            MemoState::Clean
        }
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }

    /// The effect computing this memo.
    pub fn effect(&self) -> EffectRef {
        self.inner.effect.handle()
    }

    /// Stop recomputing on dependency changes.
    ///
    /// A clean memo keeps its cached value; a dirty one evaluates its getter
    /// untracked on each read from now on.
    pub fn stop(&self) {
        self.inner.effect.stop();
    }
}

impl<T: Clone + Default + Send + Sync + 'static> SignalGet<T> for Memo<T> {
    fn get(&self) -> T {
        Memo::get(self)
    }

    fn source(&self) -> &Source {
        Memo::source(self)
    }
}

impl<T: Clone + Send + Sync + 'static> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("readonly", &self.is_readonly())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
