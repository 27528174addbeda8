/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A weighted multiset.
//!
//! [`Bag`] is used in two places:
//! 1. As the **sample** of a [poll](crate::poll): a bag of validator [`VerifyingKey`]s, where a validator
//!    that was sampled more than once carries its multiplicity as vote weight.
//! 2. As the **result** of a poll: a bag of [`CandidateId`]s tallying how much weight voted for each
//!    candidate. This is what gets fed to
//!    [`ConflictGraph::record_poll`](crate::snowstorm::ConflictGraph::record_poll).
//!
//! [`VerifyingKey`]: crate::types::crypto_primitives::VerifyingKey
//! [`CandidateId`]: crate::types::data_types::CandidateId

use std::{
    collections::{hash_map, HashMap, HashSet},
    hash::Hash,
};

/// Multiset of `T`s, storing the number of times each element was added.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bag<T: Eq + Hash> {
    counts: HashMap<T, u64>,
    size: u64,
}

impl<T: Eq + Hash> Default for Bag<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash> Bag<T> {
    /// Create an empty bag.
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            size: 0,
        }
    }

    /// Add one occurrence of `element`.
    pub fn add(&mut self, element: T) {
        self.add_count(element, 1)
    }

    /// Add `count` occurrences of `element`. Adding zero occurrences is a no-op.
    pub fn add_count(&mut self, element: T, count: u64) {
        if count == 0 {
            return;
        }
        *self.counts.entry(element).or_insert(0) += count;
        self.size += count;
    }

    /// Get the number of occurrences of `element`.
    pub fn count(&self, element: &T) -> u64 {
        self.counts.get(element).copied().unwrap_or(0)
    }

    /// Remove every occurrence of `element`, returning how many there were.
    pub fn remove(&mut self, element: &T) -> u64 {
        let removed = self.counts.remove(element).unwrap_or(0);
        self.size -= removed;
        removed
    }

    /// Check whether the bag contains at least one occurrence of `element`.
    pub fn contains(&self, element: &T) -> bool {
        self.counts.contains_key(element)
    }

    /// Total number of occurrences across all elements.
    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of distinct elements.
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    /// Iterate through the distinct elements and their counts, in no particular order.
    pub fn iter(&self) -> hash_map::Iter<'_, T, u64> {
        self.counts.iter()
    }

    /// Get the element with the most occurrences, and its count. Ties are broken arbitrarily.
    pub fn mode(&self) -> Option<(&T, u64)> {
        self.counts
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(element, count)| (element, *count))
    }

    /// Get the set of elements that occur at least `min_count` times.
    pub fn threshold(&self, min_count: u64) -> HashSet<&T> {
        self.counts
            .iter()
            .filter(|(_, count)| **count >= min_count)
            .map(|(element, _)| element)
            .collect()
    }
}

impl<T: Eq + Hash> FromIterator<T> for Bag<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut bag = Bag::new();
        for element in iter {
            bag.add(element);
        }
        bag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_size_track_additions() {
        let mut bag = Bag::new();
        bag.add("x");
        bag.add_count("y", 3);
        bag.add_count("z", 0);

        assert_eq!(bag.count(&"x"), 1);
        assert_eq!(bag.count(&"y"), 3);
        assert_eq!(bag.count(&"z"), 0);
        assert!(!bag.contains(&"z"));
        assert_eq!(bag.len(), 4);
        assert_eq!(bag.distinct(), 2);
    }

    #[test]
    fn remove_returns_the_removed_weight() {
        let mut bag: Bag<u8> = [1, 1, 2].into_iter().collect();
        assert_eq!(bag.remove(&1), 2);
        assert_eq!(bag.remove(&1), 0);
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn mode_and_threshold() {
        let bag: Bag<u8> = [7, 7, 7, 3, 3, 9].into_iter().collect();
        assert_eq!(bag.mode(), Some((&7, 3)));
        assert_eq!(bag.threshold(2), HashSet::from([&7, &3]));
        assert!(bag.threshold(4).is_empty());
        assert_eq!(Bag::<u8>::new().mode(), None);
    }
}
