//! Subscription Graph
//!
//! This module implements the global subscription graph that records which
//! effects depend on which pieces of state.
//!
//! # Overview
//!
//! The graph is a two-level mapping:
//!
//! - source identity -> field key -> [`Dep`] (the set of subscribed effects)
//!
//! Nothing here is static. Entries appear the first time an effect reads a
//! (source, key) pair and effects leave their sets every time they re-run,
//! so the graph always reflects the reads of the latest run.
//!
//! # Ownership
//!
//! 1. The graph holds only a weak handle to each source. A source registers
//!    the runtimes that track it and removes its entry from each of them when
//!    its last handle is dropped.
//!
//! 2. The graph owns the per-key `Dep`s strongly. Effects keep weak
//!    references to the deps they belong to, so a pruned source frees its
//!    subscriber sets without any cooperation from the effects.
//!
//! 3. Locks are never held while user code runs. Every operation that hands
//!    effects back to the runtime clones them out first.

mod dep;
mod key;
mod scheduler;

pub use dep::Dep;
pub use key::{FieldKey, Mutation, TrackOpType, TriggerOpType};
pub use scheduler::{JobQueue, Scheduler};
pub(crate) use scheduler::Dispatch;

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::reactive::{EffectId, EffectRef, Source, SourceId, SourceShape, WeakSource};

/// Subscriptions recorded for one source.
struct SourceEntry {
    source: WeakSource,
    deps: IndexMap<FieldKey, Arc<Dep>>,
}

/// Maps (source, key) pairs to the effects depending on them.
#[derive(Default)]
pub struct SubscriptionGraph {
    entries: Mutex<HashMap<SourceId, SourceEntry>>,
}

impl SubscriptionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create the dep for `(source, key)`.
    ///
    /// The flag is `true` when this call created the source's entry, in
    /// which case the caller must register itself with the source.
    pub(crate) fn dep_for(&self, source: &Source, key: FieldKey) -> (Arc<Dep>, bool) {
        let mut entries = self.entries.lock();
        let mut created = false;
        let entry = entries.entry(source.id()).or_insert_with(|| {
            created = true;
            SourceEntry {
                source: source.downgrade(),
                deps: IndexMap::new(),
            }
        });
        let dep = Arc::clone(entry.deps.entry(key).or_insert_with(|| Arc::new(Dep::new())));
        (dep, created)
    }

    /// The dep for `(source, key)`, if anything ever subscribed to it.
    pub fn dep(&self, source: SourceId, key: &FieldKey) -> Option<Arc<Dep>> {
        self.entries
            .lock()
            .get(&source)
            .and_then(|entry| entry.deps.get(key))
            .cloned()
    }

    /// Whether `source` has any subscription entries.
    pub fn contains(&self, source: SourceId) -> bool {
        self.entries.lock().contains_key(&source)
    }

    /// Number of sources with subscription entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Keys tracked on `source`, in first-tracked order.
    pub fn keys(&self, source: SourceId) -> Vec<FieldKey> {
        self.entries
            .lock()
            .get(&source)
            .map(|entry| entry.deps.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Live sources with subscription entries.
    pub fn sources(&self) -> Vec<Source> {
        let weak: Vec<WeakSource> = self
            .entries
            .lock()
            .values()
            .map(|entry| entry.source.clone())
            .collect();
        weak.iter().filter_map(WeakSource::upgrade).collect()
    }

    /// Drop every entry for `source`.
    pub(crate) fn forget(&self, source: SourceId) {
        let removed = self.entries.lock().remove(&source);
        // Dropping the deps may drop effects, which may drop other sources
        // that call back into this graph.
        drop(removed);
    }

    /// Collect the effects affected by `mutation` on `source`.
    ///
    /// Returns `None` if the source has no entries at all. Effects reachable
    /// through several deps appear once, in order of discovery.
    pub(crate) fn collect<F>(
        &self,
        source: SourceId,
        shape: SourceShape,
        mutation: &Mutation<'_>,
        admit: F,
    ) -> Option<IndexMap<EffectId, EffectRef>>
    where
        F: Fn(&EffectRef) -> bool,
    {
        let entries = self.entries.lock();
        let entry = entries.get(&source)?;
        let mut effects = IndexMap::new();
        let key = mutation.key();

        if mutation.op() == TriggerOpType::Clear {
            for dep in entry.deps.values() {
                dep.collect_into(&mut effects, &admit);
            }
        } else if key == Some(&FieldKey::Length) && shape == SourceShape::Sequence {
            for (tracked, dep) in &entry.deps {
                let affected = match tracked {
                    FieldKey::Length => true,
                    FieldKey::Index(index) => {
                        mutation.new_length().is_some_and(|len| *index >= len)
                    }
                    _ => false,
                };
                if affected {
                    dep.collect_into(&mut effects, &admit);
                }
            }
        } else {
            let mut add = |key: &FieldKey| {
                if let Some(dep) = entry.deps.get(key) {
                    dep.collect_into(&mut effects, &admit);
                }
            };
            if let Some(key) = key {
                add(key);
            }
            match mutation.op() {
                TriggerOpType::Add | TriggerOpType::Delete if shape != SourceShape::Sequence => {
                    add(&FieldKey::Iterate);
                    if shape == SourceShape::Map {
                        add(&FieldKey::MapKeyIterate);
                    }
                }
                TriggerOpType::Add if key.and_then(FieldKey::index).is_some() => {
                    // New index on a sequence changes its length.
                    add(&FieldKey::Length);
                }
                TriggerOpType::Set if shape == SourceShape::Map => {
                    add(&FieldKey::Iterate);
                }
                _ => {}
            }
        }

        Some(effects)
    }
}
