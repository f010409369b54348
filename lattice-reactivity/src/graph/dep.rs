//! Subscriber Sets
//!
//! A `Dep` is the set of effects currently depending on one (source, key)
//! pair. Membership is unique: tracking the same effect twice is a no-op.
//!
//! Effects point back at the deps they belong to (weakly) so that teardown
//! costs O(active dependencies) instead of a scan of the whole graph.

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::reactive::{EffectId, EffectRef};

/// The set of effects subscribed to one (source, key) pair.
///
/// Iteration follows insertion order, so the effects notified by a trigger
/// run in the order they first subscribed.
#[derive(Debug, Default)]
pub struct Dep {
    subscribers: Mutex<IndexMap<EffectId, EffectRef>>,
}

impl Dep {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add `effect`. Returns `false` if it was already a member.
    pub(crate) fn insert(&self, effect: &EffectRef) -> bool {
        let mut subscribers = self.subscribers.lock();
        if subscribers.contains_key(&effect.id()) {
            return false;
        }
        subscribers.insert(effect.id(), effect.clone());
        true
    }

    /// Remove an effect, handing it back so the caller can drop it once no
    /// lock is held.
    pub(crate) fn remove(&self, id: EffectId) -> Option<EffectRef> {
        self.subscribers.lock().shift_remove(&id)
    }

    /// Append every admitted member to `out`, skipping ids already present.
    pub(crate) fn collect_into<F>(&self, out: &mut IndexMap<EffectId, EffectRef>, admit: &F)
    where
        F: Fn(&EffectRef) -> bool,
    {
        for (id, effect) in self.subscribers.lock().iter() {
            if admit(effect) && !out.contains_key(id) {
                out.insert(*id, effect.clone());
            }
        }
    }

    pub fn contains(&self, id: EffectId) -> bool {
        self.subscribers.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.lock().is_empty()
    }

    /// Ids of the current members, in subscription order.
    pub fn subscriber_ids(&self) -> Vec<EffectId> {
        self.subscribers.lock().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{EffectOptions, Runtime};

    fn lazy_effect(runtime: &Runtime) -> EffectRef {
        runtime
            .create_effect(|| {}, EffectOptions::new().lazy(true))
            .handle()
    }

    #[test]
    fn membership_is_unique() {
        let runtime = Runtime::new();
        let effect = lazy_effect(&runtime);
        let dep = Dep::new();

        assert!(dep.insert(&effect));
        assert!(!dep.insert(&effect));
        assert_eq!(dep.len(), 1);
        assert!(dep.contains(effect.id()));
    }

    #[test]
    fn remove_hands_back_the_member() {
        let runtime = Runtime::new();
        let effect = lazy_effect(&runtime);
        let dep = Dep::new();
        dep.insert(&effect);

        let removed = dep.remove(effect.id());
        assert_eq!(removed.map(|e| e.id()), Some(effect.id()));
        assert!(dep.is_empty());
        assert!(dep.remove(effect.id()).is_none());
    }

    #[test]
    fn collect_respects_admission_and_dedup() {
        let runtime = Runtime::new();
        let first = lazy_effect(&runtime);
        let second = lazy_effect(&runtime);
        let dep = Dep::new();
        dep.insert(&first);
        dep.insert(&second);

        let mut out = IndexMap::new();
        dep.collect_into(&mut out, &|e: &EffectRef| e.id() != second.id());
        dep.collect_into(&mut out, &|_: &EffectRef| true);

        assert_eq!(out.keys().copied().collect::<Vec<_>>(), vec![first.id(), second.id()]);
    }
}
