//! Runtime Configuration
//!
//! Controls the development-only parts of the runtime: per-effect debug hooks
//! (`on_track` / `on_trigger`) and misuse warnings. Both default to on in
//! debug builds and off in release builds.
//!
//! No preset turns hooks on in a release build. Setting `debug_hooks: true`
//! by hand is the only way to do that, and is an explicit override.

use serde::{Deserialize, Serialize};

/// Configuration for a [`Runtime`](crate::reactive::Runtime).
///
/// Deserializable so an embedding application can load it alongside its own
/// settings; missing fields fall back to the build-mode defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Invoke `on_track` / `on_trigger` hooks registered on effects.
    pub debug_hooks: bool,

    /// Emit a `tracing` warning when the core is misused.
    pub warn_on_misuse: bool,
}

impl RuntimeConfig {
    /// Warnings enabled regardless of build mode; hooks in debug builds only.
    pub fn development() -> Self {
        Self {
            debug_hooks: cfg!(debug_assertions),
            warn_on_misuse: true,
        }
    }

    /// Hooks and warnings disabled regardless of build mode.
    pub fn production() -> Self {
        Self {
            debug_hooks: false,
            warn_on_misuse: false,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            debug_hooks: cfg!(debug_assertions),
            warn_on_misuse: cfg!(debug_assertions),
        }
    }
}
