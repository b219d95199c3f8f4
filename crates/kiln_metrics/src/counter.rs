//! Event tallies keyed by static names
//!
//! Storage code counts with `&'static str` keys declared next to the code
//! that increments them, so no key is ever allocated on the hot path.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct Counter {
    tallies: BTreeMap<&'static str, usize>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, key: &'static str, by: usize) {
        let tally = self.tallies.entry(key).or_default();
        *tally = tally.saturating_add(by);
    }

    /// Zero for keys that were never incremented.
    pub fn get(&self, key: &str) -> usize {
        self.tallies.get(key).copied().unwrap_or_default()
    }

    /// Every tally in key order.
    pub fn snapshot(&self) -> Vec<(&'static str, usize)> {
        self.tallies.iter().map(|(&key, &tally)| (key, tally)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_accumulate_per_key() {
        let mut counter = Counter::new();
        counter.increment("reallocations", 1);
        counter.increment("reallocations", 2);
        counter.increment("components_added", 5);

        assert_eq!(counter.get("reallocations"), 3);
        assert_eq!(counter.get("components_added"), 5);
        assert_eq!(counter.get("missing"), 0);
    }

    #[test]
    fn snapshot_is_key_ordered_and_saturates() {
        let mut counter = Counter::new();
        counter.increment("b", usize::MAX);
        counter.increment("b", 1);
        counter.increment("a", 1);
        assert_eq!(counter.snapshot(), vec![("a", 1), ("b", usize::MAX)]);
    }
}
