//! Signal Implementation
//!
//! A Signal is the single-value reactive container. It holds a value and
//! exposes it through one trackable field, `"value"`, so every container
//! (signals, custom signals, memos) is structurally interchangeable.
//!
//! # How Signals Work
//!
//! 1. Reading a signal inside a running effect subscribes that effect to the
//!    signal's `"value"` field.
//!
//! 2. Writing a signal compares the new value with the old one. A write
//!    that is not observably different is dropped with no side effects.
//!
//! 3. A write that changes the value triggers the `"value"` field, carrying
//!    the new and old values for debug hooks.
//!
//! # Thread Safety
//!
//! The value is protected by a `RwLock`. The lock is never held while
//! tracking or triggering, so effects are free to read the signal they were
//! woken up by.

use std::fmt::{self, Debug};
use std::sync::Arc;

use parking_lot::RwLock;

use super::runtime::{Runtime, WeakRuntime};
use super::{Source, SourceId};
use crate::graph::{Mutation, TrackOpType};

/// Field key shared by every single-value container.
pub const VALUE_KEY: &str = "value";

/// "Not observably different" comparison used to drop no-op writes.
///
/// Every `PartialEq` type compares with `==`, except that a value unequal to
/// itself (a NaN) is considered the same as another such value. Sources
/// compare by raw identity, so a view and the source it wraps are the same
/// value.
pub trait SameValue {
    fn same_value(&self, other: &Self) -> bool;
}

impl<T: PartialEq> SameValue for T {
    #[allow(clippy::eq_op)]
    fn same_value(&self, other: &Self) -> bool {
        self == other || (self != self && other != other)
    }
}

impl SameValue for Source {
    fn same_value(&self, other: &Self) -> bool {
        self.to_raw().id() == other.to_raw().id()
    }
}

/// Read access shared by all single-value containers.
pub trait SignalGet<T> {
    /// Current value, subscribing the active effect.
    fn get(&self) -> T;

    /// The source whose `"value"` field is tracked.
    fn source(&self) -> &Source;

    fn id(&self) -> SourceId {
        self.source().id()
    }
}

struct SignalInner<T> {
    runtime: WeakRuntime,
    source: Source,
    value: RwLock<T>,
}

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```rust,ignore
/// let runtime = Runtime::new();
/// let count = runtime.signal(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T>
where
    T: Clone + SameValue + Debug + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + SameValue + Debug + Send + Sync + 'static,
{
    pub fn new(runtime: &Runtime, value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                runtime: runtime.downgrade(),
                source: Source::record(),
                value: RwLock::new(value),
            }),
        }
    }

    pub fn id(&self) -> SourceId {
        self.inner.source.id()
    }

    pub fn source(&self) -> &Source {
        &self.inner.source
    }

    /// Get the current value.
    ///
    /// If called while an effect is running, that effect is subscribed to
    /// future writes.
    pub fn get(&self) -> T {
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.track(&self.inner.source, TrackOpType::Get, VALUE_KEY);
        }
        self.get_untracked()
    }

    /// Get the current value without subscribing anything.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Store `value` and notify subscribers, unless it is the same value.
    pub fn set(&self, value: T) {
        let new_value = value.clone();
        let old_value = {
            let mut guard = self.inner.value.write();
            if guard.same_value(&value) {
                return;
            }
            std::mem::replace(&mut *guard, value)
        };

        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.trigger(
                &self.inner.source,
                Mutation::set(VALUE_KEY)
                    .with_new_value(&new_value)
                    .with_old_value(&old_value),
            );
        }
    }

    /// Update the value using a function of the current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.get_untracked();
        self.set(f(&current));
    }

    /// Notify subscribers without changing the value.
    ///
    /// Useful after mutating shared interior state the equality check
    /// cannot see.
    pub fn notify(&self) {
        let Some(runtime) = self.inner.runtime.upgrade() else {
            return;
        };
        let current = self.get_untracked();
        runtime.trigger(
            &self.inner.source,
            Mutation::set(VALUE_KEY).with_new_value(&current),
        );
    }
}

impl<T> SignalGet<T> for Signal<T>
where
    T: Clone + SameValue + Debug + Send + Sync + 'static,
{
    fn get(&self) -> T {
        Signal::get(self)
    }

    fn source(&self) -> &Source {
        Signal::source(self)
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + SameValue + Debug + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + SameValue + Debug + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id())
            .field("value", &self.get_untracked())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Custom signals
// ----------------------------------------------------------------------------

/// Handle given to a [`CustomSignal`] factory to drive tracking by hand.
#[derive(Clone, Debug)]
pub struct SignalHandle {
    runtime: WeakRuntime,
    source: Source,
}

impl SignalHandle {
    /// Subscribe the active effect to this signal.
    pub fn track(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.track(&self.source, TrackOpType::Get, VALUE_KEY);
        }
    }

    /// Re-run everything subscribed to this signal.
    pub fn trigger(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.trigger(&self.source, Mutation::set(VALUE_KEY));
        }
    }
}

type Getter<T> = Arc<dyn Fn() -> T + Send + Sync>;
type Setter<T> = Arc<dyn Fn(T) + Send + Sync>;

/// A signal whose read and write behavior is supplied by the caller.
///
/// The factory receives a [`SignalHandle`] and returns a getter and a
/// setter. The getter decides when to call `track`, the setter when to call
/// `trigger`, which is enough to build debounced or filtered values.
///
/// # Example
///
/// ```rust,ignore
/// let stored = Arc::new(Mutex::new(0));
/// let even_only = runtime.custom_signal(|handle| {
///     let (read, write) = (stored.clone(), stored.clone());
///     let on_set = handle.clone();
///     (
///         move || { handle.track(); *read.lock() },
///         move |value: i32| if value % 2 == 0 { *write.lock() = value; on_set.trigger(); },
///     )
/// });
/// ```
pub struct CustomSignal<T: 'static> {
    handle: SignalHandle,
    getter: Getter<T>,
    setter: Setter<T>,
}

impl<T: 'static> CustomSignal<T> {
    pub fn new<F, G, S>(runtime: &Runtime, factory: F) -> Self
    where
        F: FnOnce(SignalHandle) -> (G, S),
        G: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        let handle = SignalHandle {
            runtime: runtime.downgrade(),
            source: Source::record(),
        };
        let (getter, setter) = factory(handle.clone());
        Self {
            handle,
            getter: Arc::new(getter),
            setter: Arc::new(setter),
        }
    }

    pub fn id(&self) -> SourceId {
        self.handle.source.id()
    }

    pub fn source(&self) -> &Source {
        &self.handle.source
    }

    pub fn get(&self) -> T {
        (self.getter)()
    }

    pub fn set(&self, value: T) {
        (self.setter)(value)
    }
}

impl<T: 'static> SignalGet<T> for CustomSignal<T> {
    fn get(&self) -> T {
        CustomSignal::get(self)
    }

    fn source(&self) -> &Source {
        CustomSignal::source(self)
    }
}

impl<T: 'static> Clone for CustomSignal<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            getter: Arc::clone(&self.getter),
            setter: Arc::clone(&self.setter),
        }
    }
}

impl<T: 'static> Debug for CustomSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomSignal").field("id", &self.id()).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
