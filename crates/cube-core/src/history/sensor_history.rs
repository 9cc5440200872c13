extern crate alloc;
use alloc::vec;
use alloc::vec::Vec;

use log::{debug, error};
use serde_json::Value;

use super::{HistoryEntry, PsramBudget, Resolution, RingBuffer, RingMemory, capacity};
use crate::errors::{HistoryError, QueryError};
use crate::samples::{Sample, SensorKind};

/// Fast and slow history rings for one sensor.
///
/// `FAST` and `SLOW` are the ring capacities in entries. Storage is claimed
/// by [`initialize`](Self::initialize); until then every insert is dropped
/// and every query comes back empty.
///
/// ## Range queries
///
/// [`fast_samples`](Self::fast_samples) and
/// [`slow_samples`](Self::slow_samples) scan oldest to newest and copy
/// matching entries into the caller's buffer, stopping silently when it is
/// full. Callers that need the complete result page through it with
/// [`samples_in_range`](Self::samples_in_range) and a running `skip`.
#[derive(Debug, Default)]
pub struct SensorHistory<T, const FAST: usize, const SLOW: usize> {
    fast: RingBuffer<HistoryEntry<T>>,
    slow: RingBuffer<HistoryEntry<T>>,
}

impl<T, const FAST: usize, const SLOW: usize> SensorHistory<T, FAST, SLOW>
where
    T: Copy + Default,
{
    /// Bytes both rings occupy once initialized.
    pub const FOOTPRINT: usize = capacity::footprint::<T>(FAST, SLOW);

    pub fn new() -> Self {
        Self {
            fast: RingBuffer::unallocated(),
            slow: RingBuffer::unallocated(),
        }
    }

    /// Claim both rings from `budget` and allocate them from `memory`.
    ///
    /// On failure the history stays uninitialized and the budget claim is
    /// returned. Calling this on an initialized history is a no-op that
    /// claims nothing.
    pub fn initialize(
        &mut self,
        budget: &mut PsramBudget,
        memory: &dyn RingMemory,
    ) -> Result<usize, HistoryError> {
        if self.is_initialized() {
            return Ok(0);
        }

        budget.reserve(Self::FOOTPRINT)?;

        let rings = RingBuffer::allocate_in(FAST, memory)
            .and_then(|fast| RingBuffer::allocate_in(SLOW, memory).map(|slow| (fast, slow)));

        match rings {
            Ok((fast, slow)) if fast.is_allocated() && slow.is_allocated() => {
                self.fast = fast;
                self.slow = slow;
                Ok(Self::FOOTPRINT)
            }
            Ok(_) => {
                budget.release(Self::FOOTPRINT);
                Err(HistoryError::AllocationFailed { bytes: 0 })
            }
            Err(e) => {
                budget.release(Self::FOOTPRINT);
                error!("History ring allocation failed: {}", e);
                Err(e)
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.fast.is_allocated() && self.slow.is_allocated()
    }

    pub fn add_fast_sample(&mut self, data: T, timestamp: u64) {
        self.fast.push(HistoryEntry::new(timestamp, data));
    }

    pub fn add_slow_sample(&mut self, data: T, timestamp: u64) {
        self.slow.push(HistoryEntry::new(timestamp, data));
    }

    /// Copy fast entries with `from <= timestamp <= to` into `out`,
    /// oldest first. Returns how many were copied.
    pub fn fast_samples(&self, out: &mut [HistoryEntry<T>], from: u64, to: u64) -> usize {
        self.samples_in_range(Resolution::Fast, from, to, 0, out)
    }

    /// Slow-ring counterpart of [`fast_samples`](Self::fast_samples).
    pub fn slow_samples(&self, out: &mut [HistoryEntry<T>], from: u64, to: u64) -> usize {
        self.samples_in_range(Resolution::Slow, from, to, 0, out)
    }

    /// Copy matching entries into `out` after skipping the first `skip`
    /// matches. Stops when `out` is full.
    pub fn samples_in_range(
        &self,
        resolution: Resolution,
        from: u64,
        to: u64,
        skip: usize,
        out: &mut [HistoryEntry<T>],
    ) -> usize {
        let matching = self
            .ring(resolution)
            .iter()
            .filter(|entry| (from..=to).contains(&entry.timestamp))
            .skip(skip);

        let mut copied = 0;
        for (slot, entry) in out.iter_mut().zip(matching) {
            *slot = *entry;
            copied += 1;
        }
        copied
    }

    /// Number of entries with `from <= timestamp <= to`.
    pub fn count_in_range(&self, resolution: Resolution, from: u64, to: u64) -> usize {
        self.ring(resolution)
            .iter()
            .filter(|entry| (from..=to).contains(&entry.timestamp))
            .count()
    }

    pub fn latest_fast(&self) -> Option<HistoryEntry<T>> {
        self.fast.latest().copied()
    }

    pub fn latest_slow(&self) -> Option<HistoryEntry<T>> {
        self.slow.latest().copied()
    }

    pub fn fast_count(&self) -> usize {
        self.fast.len()
    }

    pub fn slow_count(&self) -> usize {
        self.slow.len()
    }

    fn ring(&self, resolution: Resolution) -> &RingBuffer<HistoryEntry<T>> {
        match resolution {
            Resolution::Fast => &self.fast,
            Resolution::Slow => &self.slow,
        }
    }
}

/// Typed insert/lookup access to one sensor's history, independent of its
/// ring capacities.
pub trait SampleStore<T> {
    fn insert(&mut self, resolution: Resolution, timestamp: u64, data: T);

    fn latest(&self, resolution: Resolution) -> Option<HistoryEntry<T>>;
}

impl<T, const FAST: usize, const SLOW: usize> SampleStore<T> for SensorHistory<T, FAST, SLOW>
where
    T: Copy + Default,
{
    fn insert(&mut self, resolution: Resolution, timestamp: u64, data: T) {
        match resolution {
            Resolution::Fast => self.add_fast_sample(data, timestamp),
            Resolution::Slow => self.add_slow_sample(data, timestamp),
        }
    }

    fn latest(&self, resolution: Resolution) -> Option<HistoryEntry<T>> {
        match resolution {
            Resolution::Fast => self.latest_fast(),
            Resolution::Slow => self.latest_slow(),
        }
    }
}

/// Type-erased view of a sensor history, used where the sensor is only
/// known at runtime (client requests, status reports).
pub trait HistorySource {
    fn kind(&self) -> SensorKind;

    fn initialize(
        &mut self,
        budget: &mut PsramBudget,
        memory: &dyn RingMemory,
    ) -> Result<usize, HistoryError>;

    fn is_initialized(&self) -> bool;

    fn count(&self, resolution: Resolution) -> usize;

    /// Ring capacity in entries, whether or not storage is allocated.
    fn capacity(&self, resolution: Resolution) -> usize;

    /// Bytes the rings occupy once initialized.
    fn footprint(&self) -> usize;

    fn count_in_range(&self, resolution: Resolution, from: u64, to: u64) -> usize;

    /// Serialize up to `limit` matching entries, starting after the first
    /// `skip` matches.
    fn page_json(
        &self,
        resolution: Resolution,
        from: u64,
        to: u64,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Value>, QueryError>;
}

impl<T, const FAST: usize, const SLOW: usize> HistorySource for SensorHistory<T, FAST, SLOW>
where
    T: Sample,
{
    fn kind(&self) -> SensorKind {
        T::KIND
    }

    fn initialize(
        &mut self,
        budget: &mut PsramBudget,
        memory: &dyn RingMemory,
    ) -> Result<usize, HistoryError> {
        SensorHistory::initialize(self, budget, memory)
    }

    fn is_initialized(&self) -> bool {
        SensorHistory::is_initialized(self)
    }

    fn count(&self, resolution: Resolution) -> usize {
        self.ring(resolution).len()
    }

    fn capacity(&self, resolution: Resolution) -> usize {
        match resolution {
            Resolution::Fast => FAST,
            Resolution::Slow => SLOW,
        }
    }

    fn footprint(&self) -> usize {
        Self::FOOTPRINT
    }

    fn count_in_range(&self, resolution: Resolution, from: u64, to: u64) -> usize {
        SensorHistory::count_in_range(self, resolution, from, to)
    }

    fn page_json(
        &self,
        resolution: Resolution,
        from: u64,
        to: u64,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Value>, QueryError> {
        let matching = SensorHistory::count_in_range(self, resolution, from, to);
        let len = limit.min(matching.saturating_sub(skip));
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut page = vec![HistoryEntry::<T>::default(); len];
        let copied = self.samples_in_range(resolution, from, to, skip, &mut page);
        page.truncate(copied);
        debug!("{} page: {} entries after skipping {}", T::KIND, copied, skip);

        page.iter()
            .map(|entry| serde_json::to_value(entry).map_err(|_| QueryError::Serialization))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::GlobalMemory;
    use crate::samples::Sht40Data;
    use proptest::prelude::*;

    type Tiny = SensorHistory<Sht40Data, 3, 2>;

    fn reading(temperature: f32) -> Sht40Data {
        Sht40Data {
            temperature,
            valid: true,
            ..Default::default()
        }
    }

    fn ready<const F: usize, const S: usize>() -> SensorHistory<Sht40Data, F, S> {
        let mut history = SensorHistory::new();
        let mut budget = PsramBudget::new(crate::history::HISTORY_MEMORY_BUDGET);
        history.initialize(&mut budget, &GlobalMemory).unwrap();
        history
    }

    fn collect_fast<const F: usize, const S: usize>(
        history: &SensorHistory<Sht40Data, F, S>,
        from: u64,
        to: u64,
    ) -> Vec<(u64, f32)> {
        let mut buf = vec![HistoryEntry::default(); F];
        let n = history.fast_samples(&mut buf, from, to);
        buf[..n]
            .iter()
            .map(|e| (e.timestamp, e.data.temperature))
            .collect()
    }

    #[test]
    fn test_wraparound_keeps_newest_three() {
        let mut history: Tiny = ready();
        for (ts, v) in [(10, 1.0), (20, 2.0), (30, 3.0)] {
            history.add_fast_sample(reading(v), ts);
        }
        assert_eq!(
            collect_fast(&history, 0, 100),
            [(10, 1.0), (20, 2.0), (30, 3.0)]
        );

        history.add_fast_sample(reading(4.0), 40);
        assert_eq!(
            collect_fast(&history, 0, 100),
            [(20, 2.0), (30, 3.0), (40, 4.0)]
        );
    }

    #[test]
    fn test_uninitialized_history_is_inert() {
        let mut history = Tiny::new();
        history.add_fast_sample(reading(1.0), 10);
        history.add_slow_sample(reading(1.0), 10);

        assert!(!history.is_initialized());
        assert_eq!(history.fast_count(), 0);
        assert_eq!(history.slow_count(), 0);
        assert!(history.latest_fast().is_none());
        assert_eq!(collect_fast(&history, 0, u64::MAX), []);
    }

    #[test]
    fn test_initialize_respects_budget() {
        let mut history = Tiny::new();
        let mut budget = PsramBudget::new(Tiny::FOOTPRINT - 1);
        let err = history.initialize(&mut budget, &GlobalMemory).unwrap_err();
        assert!(matches!(err, HistoryError::BudgetExceeded { .. }));
        assert!(!history.is_initialized());
        assert_eq!(budget.used(), 0);

        let mut budget = PsramBudget::new(Tiny::FOOTPRINT);
        assert_eq!(history.initialize(&mut budget, &GlobalMemory), Ok(Tiny::FOOTPRINT));
        assert!(history.is_initialized());

        // A second call claims nothing more
        assert_eq!(history.initialize(&mut budget, &GlobalMemory), Ok(0));
        assert_eq!(budget.used(), Tiny::FOOTPRINT);
    }

    #[test]
    fn test_fast_and_slow_are_independent() {
        let mut history: Tiny = ready();
        history.add_fast_sample(reading(1.0), 10);
        history.add_slow_sample(reading(9.0), 300);

        assert_eq!(history.fast_count(), 1);
        assert_eq!(history.slow_count(), 1);
        assert_eq!(history.latest_slow().unwrap().timestamp, 300);
        assert_eq!(history.latest_fast().unwrap().data.temperature, 1.0);
    }

    #[test]
    fn test_range_query_truncates_at_buffer() {
        let mut history: SensorHistory<Sht40Data, 10, 2> = ready();
        for ts in 1..=10u64 {
            history.add_fast_sample(reading(ts as f32), ts * 10);
        }

        let mut buf = [HistoryEntry::default(); 4];
        let n = history.fast_samples(&mut buf, 25, 95);
        assert_eq!(n, 4);
        let stamps: Vec<u64> = buf.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, [30, 40, 50, 60]);

        assert_eq!(history.count_in_range(Resolution::Fast, 25, 95), 7);

        let n = history.samples_in_range(Resolution::Fast, 25, 95, 4, &mut buf);
        assert_eq!(n, 3);
        assert_eq!(buf[2].timestamp, 90);
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let mut history: Tiny = ready();
        history.add_fast_sample(reading(1.0), 10);
        history.add_fast_sample(reading(2.0), 20);
        assert_eq!(collect_fast(&history, 10, 20).len(), 2);
        assert_eq!(collect_fast(&history, 11, 19).len(), 0);
    }

    #[test]
    fn test_page_json_shape() {
        let mut history: Tiny = ready();
        history.add_fast_sample(reading(21.5), 1_000);
        history.add_fast_sample(reading(22.5), 2_000);

        let page = HistorySource::page_json(&history, Resolution::Fast, 0, 5_000, 1, 20).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0]["timestamp"], 2_000);
        assert_eq!(page[0]["data"]["temperature"], 22.5);
        assert_eq!(page[0]["formattedTime"], "1970-01-01 00:00:02");

        let past_end =
            HistorySource::page_json(&history, Resolution::Fast, 0, 5_000, 5, 20).unwrap();
        assert!(past_end.is_empty());
    }

    proptest! {
        #[test]
        fn prop_count_saturates_and_latest_is_last(
            values in proptest::collection::vec(-50.0f32..50.0, 0..40),
        ) {
            let mut history: SensorHistory<Sht40Data, 7, 2> = ready();
            for (i, v) in values.iter().enumerate() {
                history.add_fast_sample(reading(*v), i as u64);
                let latest = history.latest_fast().unwrap();
                prop_assert_eq!(latest.timestamp, i as u64);
                prop_assert_eq!(latest.data.temperature, *v);
            }
            prop_assert_eq!(history.fast_count(), values.len().min(7));
        }

        #[test]
        fn prop_range_filter_is_exact(
            stamps in proptest::collection::vec(0u64..1_000, 0..30),
            a in 0u64..1_000,
            b in 0u64..1_000,
        ) {
            let (from, to) = if a <= b { (a, b) } else { (b, a) };
            let mut history: SensorHistory<Sht40Data, 16, 2> = ready();
            for ts in &stamps {
                history.add_fast_sample(reading(0.0), *ts);
            }

            let returned = collect_fast(&history, from, to);
            prop_assert!(returned.iter().all(|(ts, _)| (from..=to).contains(ts)));

            // Everything retained in range comes back, in insertion order
            let retained = &stamps[stamps.len().saturating_sub(16)..];
            let expected: Vec<u64> = retained
                .iter()
                .copied()
                .filter(|ts| (from..=to).contains(ts))
                .collect();
            let got: Vec<u64> = returned.iter().map(|(ts, _)| *ts).collect();
            prop_assert_eq!(got, expected);
        }
    }
}
