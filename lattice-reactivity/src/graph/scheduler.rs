//! Schedulers
//!
//! By default a triggered effect re-runs synchronously. An effect built with
//! a [`Scheduler`] hands that decision to the scheduler instead: it receives
//! the dirtied effect and may run it now, queue it, or just record that
//! something changed (which is how memos stay lazy).
//!
//! [`JobQueue`] is a ready-made deferring scheduler. Effects that opt into it
//! are queued once no matter how many of their dependencies change, and run
//! together on the next [`JobQueue::flush`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::reactive::{EffectId, EffectRef};

/// Maximum number of times one effect may be re-queued within a single flush.
const RECURSION_LIMIT: usize = 100;

/// Callback that decides when a dirtied effect runs.
#[derive(Clone)]
pub struct Scheduler(Arc<dyn Fn(&EffectRef) + Send + Sync>);

impl Scheduler {
    pub fn new<F>(schedule: F) -> Self
    where
        F: Fn(&EffectRef) + Send + Sync + 'static,
    {
        Self(Arc::new(schedule))
    }

    pub(crate) fn schedule(&self, effect: &EffectRef) {
        (self.0)(effect)
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Scheduler(..)")
    }
}

/// How a triggered effect is dispatched, fixed when the effect is created.
#[derive(Debug, Clone)]
pub(crate) enum Dispatch {
    /// Re-run synchronously inside the trigger.
    Immediate,

    /// Hand the effect to a scheduler.
    Deferred(Scheduler),
}

/// A coalescing queue of dirtied effects.
///
/// # Example
///
/// ```rust,ignore
/// let queue = JobQueue::new();
/// let effect = runtime.effect(|| render(), EffectOptions::new().scheduler(queue.scheduler()));
///
/// state.set(1);
/// state.set(2);
/// queue.flush(); // render runs once
/// ```
#[derive(Debug, Default)]
pub struct JobQueue {
    pending: Mutex<IndexMap<EffectId, EffectRef>>,
}

impl JobQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A scheduler that enqueues into this queue.
    ///
    /// The scheduler holds the queue weakly; once the queue is dropped,
    /// effects using it are simply never run again.
    pub fn scheduler(self: &Arc<Self>) -> Scheduler {
        let queue = Arc::downgrade(self);
        Scheduler::new(move |effect| {
            if let Some(queue) = queue.upgrade() {
                queue.push(effect);
            }
        })
    }

    /// Enqueue `effect`. Returns `false` if it was already pending.
    pub fn push(&self, effect: &EffectRef) -> bool {
        let mut pending = self.pending.lock();
        if pending.contains_key(&effect.id()) {
            return false;
        }
        pending.insert(effect.id(), effect.clone());
        true
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Run every pending effect, ordered by creation (effect id).
    ///
    /// Effects queued while flushing are run in a following pass. An effect
    /// that keeps re-queuing itself is dropped after `RECURSION_LIMIT` runs.
    /// Returns the number of runs performed.
    pub fn flush(&self) -> usize {
        let mut runs = 0;
        let mut counts: HashMap<EffectId, usize> = HashMap::new();

        loop {
            let mut batch: Vec<EffectRef> = std::mem::take(&mut *self.pending.lock())
                .into_values()
                .collect();
            if batch.is_empty() {
                break;
            }
            batch.sort_by_key(EffectRef::id);

            for effect in batch {
                let count = counts.entry(effect.id()).or_insert(0);
                *count += 1;
                if *count > RECURSION_LIMIT {
                    tracing::warn!(
                        effect = %effect.id(),
                        limit = RECURSION_LIMIT,
                        "maximum recursive updates exceeded, dropping job"
                    );
                    continue;
                }
                effect.run();
                runs += 1;
            }
        }

        tracing::trace!(runs, "job queue flushed");
        runs
    }
}
