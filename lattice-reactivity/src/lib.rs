//! Lattice Reactivity
//!
//! This crate provides the dependency-tracking core of the Lattice reactive
//! UI framework. It implements:
//!
//! - An explicit runtime owning the subscription graph and execution stacks
//! - Effects that re-collect their dependencies on every run
//! - Key-level track / trigger with container-aware fan-out
//! - Single-value containers (signals, custom signals) and memos
//! - The source flag protocol used by view-wrapping layers
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: runtime, effects, signals, memos and sources
//! - `graph`: subscription graph, field keys and schedulers
//! - `config`: runtime configuration
//! - `error`: misuse errors
//!
//! # Example
//!
//! ```rust,ignore
//! use lattice_reactivity::{EffectOptions, Runtime};
//!
//! let runtime = Runtime::new();
//!
//! // Create a signal
//! let count = runtime.signal(0);
//!
//! // Create a derived value
//! let source = count.clone();
//! let doubled = runtime.memo(move || source.get() * 2);
//!
//! // Create an effect
//! let (c, d) = (count.clone(), doubled.clone());
//! runtime.effect(
//!     move || println!("Count: {}, Doubled: {}", c.get(), d.get()),
//!     EffectOptions::new(),
//! );
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::RuntimeConfig;
pub use error::ReactiveError;
pub use graph::{FieldKey, JobQueue, Mutation, Scheduler, TrackOpType, TriggerOpType};
pub use reactive::{
    CustomSignal, DebuggerEvent, EffectId, EffectOptions, EffectRef, Memo, MemoState,
    ReactiveEffect, Runtime, Signal, SignalGet, Source, SourceId, SourceShape,
};
