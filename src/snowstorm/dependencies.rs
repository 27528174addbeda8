/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Reverse-dependency index used to defer decisions until dependencies are decided.
//!
//! A [`DependencyIndex`] records, for every *waiter*, the set of dependencies it is still waiting on,
//! and for every dependency, the set of waiters waiting on it. Resolving a dependency is a table walk
//! over the second map.
//!
//! The conflict graph keeps two of these:
//! - **Pending acceptance**: a finalized candidate waits for each undecided dependency to be accepted.
//!   When the last one is [`resolve`](DependencyIndex::resolve)d, the candidate is ready to be accepted.
//!   If any is rejected, the waiter is [dropped](DependencyIndex::drop_dependency) and never accepted.
//! - **Pending rejection**: every candidate waits on its undecided dependencies from the moment it is
//!   added. If any of them is rejected, the waiters are dropped and must themselves be rejected.

use std::collections::{HashMap, HashSet};

use crate::types::data_types::CandidateId;

#[derive(Default)]
pub(crate) struct DependencyIndex {
    waiting_on: HashMap<CandidateId, HashSet<CandidateId>>,
    waiters: HashMap<CandidateId, HashSet<CandidateId>>,
}

impl DependencyIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make `waiter` wait on every one of `dependencies`.
    ///
    /// Returns `true` if `dependencies` is empty, i.e., if `waiter` has nothing to wait on. In that case
    /// nothing is stored.
    pub(crate) fn register(
        &mut self,
        waiter: CandidateId,
        dependencies: impl IntoIterator<Item = CandidateId>,
    ) -> bool {
        let dependencies: HashSet<CandidateId> = dependencies.into_iter().collect();
        if dependencies.is_empty() {
            return true;
        }

        for dependency in &dependencies {
            self.waiters.entry(*dependency).or_default().insert(waiter);
        }
        self.waiting_on
            .entry(waiter)
            .or_default()
            .extend(dependencies);
        false
    }

    /// Mark `dependency` as satisfied for all of its waiters.
    ///
    /// Returns the waiters that no longer wait on anything. These are removed from the index.
    pub(crate) fn resolve(&mut self, dependency: &CandidateId) -> Vec<CandidateId> {
        let mut ready = Vec::new();
        let Some(waiters) = self.waiters.remove(dependency) else {
            return ready;
        };

        for waiter in waiters {
            if let Some(remaining) = self.waiting_on.get_mut(&waiter) {
                remaining.remove(dependency);
                if remaining.is_empty() {
                    self.waiting_on.remove(&waiter);
                    ready.push(waiter);
                }
            }
        }
        ready.sort();
        ready
    }

    /// Remove every waiter that waits on `dependency`, together with all of their other registrations.
    ///
    /// Returns the removed waiters.
    pub(crate) fn drop_dependency(&mut self, dependency: &CandidateId) -> Vec<CandidateId> {
        let Some(waiters) = self.waiters.remove(dependency) else {
            return Vec::new();
        };

        let mut dropped: Vec<CandidateId> = waiters.into_iter().collect();
        dropped.sort();
        for waiter in &dropped {
            self.forget(waiter);
        }
        dropped
    }

    /// Remove all of `waiter`'s registrations, e.g., because it was decided through another path.
    pub(crate) fn forget(&mut self, waiter: &CandidateId) {
        let Some(dependencies) = self.waiting_on.remove(waiter) else {
            return;
        };

        for dependency in dependencies {
            if let Some(waiters) = self.waiters.get_mut(&dependency) {
                waiters.remove(waiter);
                if waiters.is_empty() {
                    self.waiters.remove(&dependency);
                }
            }
        }
    }

    /// Check whether `waiter` is still waiting on at least one dependency.
    pub(crate) fn is_waiting(&self, waiter: &CandidateId) -> bool {
        self.waiting_on.contains_key(waiter)
    }

    /// Get the dependencies `waiter` is still waiting on.
    pub(crate) fn remaining(&self, waiter: &CandidateId) -> Option<&HashSet<CandidateId>> {
        self.waiting_on.get(waiter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> CandidateId {
        CandidateId::new([byte; 32])
    }

    #[test]
    fn register_without_dependencies_is_ready() {
        let mut index = DependencyIndex::new();
        assert!(index.register(id(1), []));
        assert!(!index.is_waiting(&id(1)));
    }

    #[test]
    fn waiter_is_ready_after_last_dependency_resolves() {
        let mut index = DependencyIndex::new();
        assert!(!index.register(id(1), [id(2), id(3)]));

        assert!(index.resolve(&id(2)).is_empty());
        assert_eq!(index.remaining(&id(1)), Some(&HashSet::from([id(3)])));

        assert_eq!(index.resolve(&id(3)), vec![id(1)]);
        assert!(!index.is_waiting(&id(1)));
    }

    #[test]
    fn dropping_a_dependency_removes_its_waiters_everywhere() {
        let mut index = DependencyIndex::new();
        index.register(id(1), [id(2), id(3)]);
        index.register(id(4), [id(3)]);

        assert_eq!(index.drop_dependency(&id(2)), vec![id(1)]);
        assert!(!index.is_waiting(&id(1)));

        // id(1) no longer waits on id(3), but id(4) still does.
        assert_eq!(index.resolve(&id(3)), vec![id(4)]);
    }

    #[test]
    fn forget_cleans_reverse_entries() {
        let mut index = DependencyIndex::new();
        index.register(id(1), [id(2)]);
        index.forget(&id(1));
        assert!(index.resolve(&id(2)).is_empty());
        assert!(index.drop_dependency(&id(2)).is_empty());
    }
}
