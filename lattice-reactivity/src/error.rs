//! Reactive Errors
//!
//! The reactive core has no I/O and no fatal error path. The only errors it
//! produces are misuse errors: writing to a readonly memo, triggering a
//! mutation through a readonly view, or a memo reading itself before it has
//! a value. These are reported as warnings (when
//! enabled in the runtime configuration) and otherwise tolerated, so a single
//! misuse cannot take down an unrelated part of the dependency graph.
//!
//! Errors raised by user computations are not wrapped here. An effect whose
//! computation returns a `Result` hands that value back to the caller of
//! `run()` unmodified, and panics unwind through the runtime after the
//! execution context has been restored.

use thiserror::Error;

use crate::config::RuntimeConfig;
use crate::graph::{FieldKey, TriggerOpType};
use crate::reactive::SourceId;

/// Misuse of the reactive core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A memo constructed from a getter alone was written to.
    #[error("write operation failed: memo value is readonly")]
    ReadonlyMemo,

    /// A mutation was triggered through a readonly view.
    #[error("{op} operation on key {key:?} failed: source {target} is readonly")]
    ReadonlySource {
        /// The readonly view the mutation was attempted on.
        target: SourceId,
        /// The key being mutated, if any.
        key: Option<FieldKey>,
        /// The attempted mutation.
        op: TriggerOpType,
    },

    /// A memo read itself while computing its first value.
    #[error("memo {memo} read itself before producing a value")]
    CyclicMemo { memo: SourceId },
}

/// Report a misuse through the diagnostic channel.
pub(crate) fn report(config: &RuntimeConfig, error: &ReactiveError) {
    if config.warn_on_misuse {
        tracing::warn!(error = %error, "reactive misuse");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing::{Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    #[test]
    fn readonly_source_message_names_the_key() {
        let err = ReactiveError::ReadonlySource {
            target: SourceId::from(7),
            key: Some(FieldKey::from("count")),
            op: TriggerOpType::Set,
        };
        let message = err.to_string();
        assert!(message.contains("set"));
        assert!(message.contains("count"));
        assert!(message.contains("#7"));
    }

    #[derive(Clone, Default)]
    struct WarnCounter {
        warnings: Arc<AtomicUsize>,
    }

    impl<S: Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                self.warnings.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn warnings_from(config: RuntimeConfig, error: &ReactiveError) -> usize {
        let counter = WarnCounter::default();
        let subscriber = tracing_subscriber::registry().with(counter.clone());
        tracing::subscriber::with_default(subscriber, || report(&config, error));
        counter.warnings.load(Ordering::SeqCst)
    }

    #[test]
    fn report_warns_when_enabled() {
        let config = RuntimeConfig {
            debug_hooks: false,
            warn_on_misuse: true,
        };
        assert_eq!(warnings_from(config, &ReactiveError::ReadonlyMemo), 1);
        let cyclic = ReactiveError::CyclicMemo {
            memo: SourceId::from(3),
        };
        assert_eq!(warnings_from(config, &cyclic), 1);
    }

    #[test]
    fn report_is_silent_when_disabled() {
        let config = RuntimeConfig::production();
        assert_eq!(warnings_from(config, &ReactiveError::ReadonlyMemo), 0);
    }
}
