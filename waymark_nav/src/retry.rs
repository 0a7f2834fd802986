// Per-position failure counts.
//
// Each failed movement charges its destination. Once a position has failed
// `max_retries` times the navigator stops trying it: it is marked AVOID in
// the cache overlay so the next search routes around it. Counts never
// exceed the ceiling, so a goal episode can only abandon finitely many
// positions before the search runs out of alternatives.
//
// When the ledger is cleared is a policy choice (`RetryResetPolicy`): by
// default only when the first path for a newly submitted goal is installed.

use crate::types::VoxelCoord;
use rustc_hash::FxHashMap;

#[derive(Clone, Debug)]
pub struct RetryLedger {
    counts: FxHashMap<VoxelCoord, u32>,
    max_retries: u32,
}

impl RetryLedger {
    pub fn new(max_retries: u32) -> Self {
        Self {
            counts: FxHashMap::default(),
            max_retries,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn failures(&self, pos: VoxelCoord) -> u32 {
        self.counts.get(&pos).copied().unwrap_or(0)
    }

    pub fn can_retry(&self, pos: VoxelCoord) -> bool {
        self.failures(pos) < self.max_retries
    }

    /// Charge one failure to `pos` and return its new count.
    pub fn record_failure(&mut self, pos: VoxelCoord) -> u32 {
        let count = self.counts.entry(pos).or_insert(0);
        *count = (*count + 1).min(self.max_retries);
        *count
    }

    /// Positions that have used up their retries.
    pub fn exhausted(&self) -> impl Iterator<Item = VoxelCoord> + '_ {
        self.counts
            .iter()
            .filter(|&(_, &n)| n >= self.max_retries)
            .map(|(&pos, _)| pos)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn reset(&mut self) {
        self.counts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_saturate_at_ceiling() {
        let mut ledger = RetryLedger::new(3);
        let pos = VoxelCoord::new(4, 64, 4);
        assert!(ledger.can_retry(pos));
        assert_eq!(ledger.record_failure(pos), 1);
        assert_eq!(ledger.record_failure(pos), 2);
        assert!(ledger.can_retry(pos));
        assert_eq!(ledger.record_failure(pos), 3);
        assert!(!ledger.can_retry(pos));
        assert_eq!(ledger.record_failure(pos), 3);
        assert_eq!(ledger.exhausted().collect::<Vec<_>>(), vec![pos]);
    }

    #[test]
    fn positions_are_independent() {
        let mut ledger = RetryLedger::new(2);
        let a = VoxelCoord::new(0, 64, 0);
        let b = VoxelCoord::new(1, 64, 0);
        ledger.record_failure(a);
        ledger.record_failure(a);
        assert!(!ledger.can_retry(a));
        assert!(ledger.can_retry(b));
        assert_eq!(ledger.failures(b), 0);
    }

    #[test]
    fn reset_forgets_everything() {
        let mut ledger = RetryLedger::new(1);
        let pos = VoxelCoord::new(0, 64, 0);
        ledger.record_failure(pos);
        ledger.reset();
        assert!(ledger.is_empty());
        assert!(ledger.can_retry(pos));
    }
}
