//! Process-wide tier counters for a migration run.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::tier::Tier;

/// Cache line size on most modern CPUs (64 bytes).
const CACHE_LINE_SIZE: usize = 64;

/// Bytes per tebibyte.
const BYTES_PER_TIB: f64 = (1u64 << 40) as f64;

/// A cache-line-padded atomic counter.
///
/// Every scan unit updates the same handful of counters, so each one gets its
/// own cache line to avoid false sharing between cores.
#[repr(C, align(64))]
#[derive(Debug)]
struct PaddedAtomicU64 {
    value: AtomicU64,
    _padding: [u8; CACHE_LINE_SIZE - std::mem::size_of::<AtomicU64>()],
}

impl Default for PaddedAtomicU64 {
    fn default() -> Self {
        Self {
            value: AtomicU64::new(0),
            _padding: [0; CACHE_LINE_SIZE - std::mem::size_of::<AtomicU64>()],
        }
    }
}

impl PaddedAtomicU64 {
    #[inline]
    fn load(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    #[inline]
    fn add(&self, val: u64) {
        self.value.fetch_add(val, Ordering::Relaxed);
    }
}

/// An object count and its byte total.
#[derive(Debug, Default)]
struct CounterPair {
    count: PaddedAtomicU64,
    bytes: PaddedAtomicU64,
}

impl CounterPair {
    fn add(&self, size_bytes: u64) {
        self.count.add(1);
        self.bytes.add(size_bytes);
    }

    fn totals(&self) -> TierTotals {
        TierTotals {
            count: self.count.load(),
            bytes: self.bytes.load(),
        }
    }
}

/// Additive counters shared by every scan unit of a run.
///
/// All mutation is `fetch_add`; nothing is ever decremented or reset, so
/// concurrent writers never lose updates.
#[derive(Debug, Default)]
pub struct TierCounters {
    total: CounterPair,
    hot: CounterPair,
    cool: CounterPair,
    archive: CounterPair,
    archive_to_hot: CounterPair,
    archive_to_cool: CounterPair,

    batches_submitted: PaddedAtomicU64,
    objects_submitted: PaddedAtomicU64,
    units_completed: PaddedAtomicU64,
}

impl TierCounters {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a block object in the total and in its current tier.
    pub fn record_object(&self, tier: Tier, size_bytes: u64) {
        self.total.add(size_bytes);
        match tier {
            Tier::Hot => self.hot.add(size_bytes),
            Tier::Cool => self.cool.add(size_bytes),
            Tier::Archive => self.archive.add(size_bytes),
        }
    }

    /// Count an archived object already being rehydrated to `target`.
    ///
    /// Returns false when `target` has no pending counter (rehydration to Archive).
    pub fn record_pending_rehydration(&self, target: Tier, size_bytes: u64) -> bool {
        match target {
            Tier::Hot => self.archive_to_hot.add(size_bytes),
            Tier::Cool => self.archive_to_cool.add(size_bytes),
            Tier::Archive => return false,
        }
        true
    }

    /// Count a submitted (or, in preview mode, previewed) batch.
    pub fn record_batch(&self, objects: usize) {
        self.batches_submitted.add(1);
        self.objects_submitted.add(objects as u64);
    }

    /// Count a scan unit that finished its listing.
    pub fn record_unit_completed(&self) {
        self.units_completed.add(1);
    }

    /// Totals for a single tier.
    pub fn tier(&self, tier: Tier) -> TierTotals {
        match tier {
            Tier::Hot => self.hot.totals(),
            Tier::Cool => self.cool.totals(),
            Tier::Archive => self.archive.totals(),
        }
    }

    /// Point-in-time copy of every counter.
    ///
    /// Taken while units are still running, the tier identities may be off by
    /// the objects being counted at that instant.
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            total: self.total.totals(),
            hot: self.hot.totals(),
            cool: self.cool.totals(),
            archive: self.archive.totals(),
            archive_to_hot: self.archive_to_hot.totals(),
            archive_to_cool: self.archive_to_cool.totals(),
            batches_submitted: self.batches_submitted.load(),
            objects_submitted: self.objects_submitted.load(),
            units_completed: self.units_completed.load(),
        }
    }
}

/// Object count and byte total for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTotals {
    pub count: u64,
    pub bytes: u64,
}

impl TierTotals {
    /// Byte total in tebibytes.
    pub fn tib(&self) -> f64 {
        self.bytes as f64 / BYTES_PER_TIB
    }
}

/// A serializable snapshot of [`TierCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountersSnapshot {
    pub total: TierTotals,
    pub hot: TierTotals,
    pub cool: TierTotals,
    pub archive: TierTotals,
    pub archive_to_hot: TierTotals,
    pub archive_to_cool: TierTotals,
    pub batches_submitted: u64,
    pub objects_submitted: u64,
    pub units_completed: u64,
}

impl CountersSnapshot {
    /// Totals for a single tier.
    pub fn tier(&self, tier: Tier) -> TierTotals {
        match tier {
            Tier::Hot => self.hot,
            Tier::Cool => self.cool,
            Tier::Archive => self.archive,
        }
    }

    /// Whether the per-tier counts and bytes add up to the totals.
    pub fn is_consistent(&self) -> bool {
        let tiers = [self.hot, self.cool, self.archive];
        self.total.count == tiers.iter().map(|t| t.count).sum::<u64>()
            && self.total.bytes == tiers.iter().map(|t| t.bytes).sum::<u64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_record_object_updates_total_and_tier() {
        let counters = TierCounters::new();
        counters.record_object(Tier::Hot, 100);
        counters.record_object(Tier::Cool, 200);
        counters.record_object(Tier::Archive, 300);
        counters.record_object(Tier::Archive, 400);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.total, TierTotals { count: 4, bytes: 1000 });
        assert_eq!(snapshot.hot, TierTotals { count: 1, bytes: 100 });
        assert_eq!(snapshot.cool, TierTotals { count: 1, bytes: 200 });
        assert_eq!(snapshot.archive, TierTotals { count: 2, bytes: 700 });
        assert!(snapshot.is_consistent());
    }

    #[test]
    fn test_pending_rehydration_counters() {
        let counters = TierCounters::new();
        assert!(counters.record_pending_rehydration(Tier::Hot, 10));
        assert!(counters.record_pending_rehydration(Tier::Cool, 20));
        assert!(counters.record_pending_rehydration(Tier::Cool, 5));
        assert!(!counters.record_pending_rehydration(Tier::Archive, 99));

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.archive_to_hot, TierTotals { count: 1, bytes: 10 });
        assert_eq!(snapshot.archive_to_cool, TierTotals { count: 2, bytes: 25 });
        // Pending counters are a breakdown, not part of the total
        assert_eq!(snapshot.total.count, 0);
    }

    #[test]
    fn test_batch_counters() {
        let counters = TierCounters::new();
        counters.record_batch(250);
        counters.record_batch(17);
        counters.record_unit_completed();

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.batches_submitted, 2);
        assert_eq!(snapshot.objects_submitted, 267);
        assert_eq!(snapshot.units_completed, 1);
    }

    #[test]
    fn test_tib_conversion() {
        let totals = TierTotals {
            count: 1,
            bytes: 3 * (1u64 << 39),
        };
        assert!((totals.tib() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_no_lost_updates_under_contention() {
        let counters = Arc::new(TierCounters::new());
        let mut handles = vec![];

        for i in 0..8 {
            let counters = Arc::clone(&counters);
            handles.push(thread::spawn(move || {
                let tier = Tier::ALL[i % 3];
                for _ in 0..1000 {
                    counters.record_object(tier, 3);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.total.count, 8000);
        assert_eq!(snapshot.total.bytes, 24000);
        assert!(snapshot.is_consistent());
        assert_eq!(counters.tier(Tier::Hot).count, 3000);
    }

    #[test]
    fn test_padded_atomic_alignment() {
        assert_eq!(std::mem::align_of::<PaddedAtomicU64>(), 64);
        assert_eq!(std::mem::size_of::<PaddedAtomicU64>(), 64);
    }
}
