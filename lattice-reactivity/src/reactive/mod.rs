//! Reactive Primitives
//!
//! This module implements the core reactive system: the runtime, effects,
//! signals, memos and the source flag protocol.
//!
//! # Concepts
//!
//! ## Sources
//!
//! A Source is a trackable identity. Reads of one of its fields subscribe
//! the running effect to that `(source, key)` pair; mutations trigger the
//! effects subscribed to the affected keys. A source may have a reactive
//! and a readonly view, both of which resolve to the same raw source.
//!
//! ## Effects
//!
//! An Effect is a computation that re-runs whenever state it read changes.
//! Its dependencies are re-collected on every run, so they always reflect
//! the most recent execution.
//!
//! ## Signals
//!
//! A Signal is a single-value container tracked through one `"value"`
//! field. Writes that do not change the value are dropped.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only
//! when read after one of its dependencies changed.
//!
//! # Implementation Notes
//!
//! All tracking state lives on an explicit [`Runtime`]. There are no
//! thread-locals or globals, so independent runtimes never observe each
//! other.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod context;
mod effect;
mod flags;
mod memo;
mod runtime;
mod signal;
mod subscriber;

pub use context::{ContextGuard, ExecutionContext, PauseGuard};
pub use effect::{
    DebugHook, DebugOperation, DebuggerEvent, EffectOptions, IntoEffectFn, RawFn, ReactiveEffect,
    StopHook,
};
pub use flags::{Source, SourceId, SourceShape, ViewKind, WeakSource};
pub use memo::{Memo, MemoState};
pub use runtime::{Runtime, WeakRuntime};
pub use signal::{CustomSignal, SameValue, Signal, SignalGet, SignalHandle, VALUE_KEY};
pub use subscriber::{EffectId, EffectRef};
