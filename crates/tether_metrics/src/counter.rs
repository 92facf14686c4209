//! Named event counters

use std::collections::BTreeMap;

/// Running totals keyed by event name. Unknown names read as zero.
#[derive(Debug, Clone, Default)]
pub struct Counter {
    totals: BTreeMap<&'static str, usize>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, name: &'static str, value: usize) {
        *self.totals.entry(name).or_default() += value;
    }

    pub fn get(&self, name: &str) -> usize {
        self.totals.get(name).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_accumulate_per_name() {
        let mut counter = Counter::new();
        counter.increment("wraps", 1);
        counter.increment("wraps", 2);
        counter.increment("rescued", 1);

        assert_eq!(counter.get("wraps"), 3);
        assert_eq!(counter.get("rescued"), 1);
        assert_eq!(counter.get("detached"), 0);
    }
}
