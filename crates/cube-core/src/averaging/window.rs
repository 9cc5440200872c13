use log::debug;

use crate::samples::Sample;

/// Running sum of valid readings since the last flush.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanAccumulator<T: Sample> {
    sum: T,
    tally: T::Tally,
    readings: u32,
}

impl<T: Sample> MeanAccumulator<T> {
    pub fn new() -> Self {
        Self {
            sum: T::default(),
            tally: T::Tally::default(),
            readings: 0,
        }
    }

    /// Fold one reading in. Readings flagged invalid are skipped and the
    /// call returns `false`.
    pub fn push(&mut self, reading: &T) -> bool {
        if !reading.is_valid() {
            return false;
        }
        self.sum.accumulate(reading, &mut self.tally);
        self.readings += 1;
        true
    }

    /// Number of readings folded in since the last flush.
    pub fn len(&self) -> u32 {
        self.readings
    }

    pub fn is_empty(&self) -> bool {
        self.readings == 0
    }

    /// Mean of everything accumulated, resetting the accumulator.
    /// `None` if nothing valid arrived.
    pub fn take_mean(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let mut mean = self.sum;
        mean.finish(&self.tally);
        *self = Self::new();
        Some(mean)
    }
}

/// One averaging window (fast or slow) for one sensor.
///
/// ```text
/// ACCUMULATING --(period elapsed)--> FLUSH (emit mean, reset) --> ACCUMULATING
/// ```
///
/// The window starts at the first tick it sees. When it elapses with no
/// valid readings, the previous average is emitted again unchanged.
#[derive(Debug, Clone, Copy)]
pub struct AverageWindow<T: Sample> {
    period_ms: u64,
    started_at: Option<u64>,
    accumulator: MeanAccumulator<T>,
    /// Most recently completed average
    last: T,
}

impl<T: Sample> AverageWindow<T> {
    pub fn new(period_ms: u64) -> Self {
        Self {
            period_ms,
            started_at: None,
            accumulator: MeanAccumulator::new(),
            last: T::default(),
        }
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    /// Fold `reading` into the window and flush if the period has elapsed.
    ///
    /// Returns the flushed average, if this tick closed the window.
    pub fn tick(&mut self, now: u64, reading: &T) -> Option<T> {
        let started_at = *self.started_at.get_or_insert(now);
        self.accumulator.push(reading);

        if now.saturating_sub(started_at) < self.period_ms {
            return None;
        }

        let readings = self.accumulator.len();
        match self.accumulator.take_mean() {
            Some(mean) => self.last = mean,
            None => debug!("{} window closed without valid readings", T::KIND),
        }
        self.started_at = Some(now);
        debug!(
            "{} {} ms window flushed over {} reading(s)",
            T::KIND,
            self.period_ms,
            readings
        );
        Some(self.last)
    }

    /// The most recently completed average. Zeroed and invalid until the
    /// first window closes.
    pub fn average(&self) -> T {
        self.last
    }

    /// Readings folded into the open window so far.
    pub fn pending(&self) -> u32 {
        self.accumulator.len()
    }
}

/// Fast and slow averaging windows for one sensor.
#[derive(Debug, Clone, Copy)]
pub struct DualAverage<T: Sample> {
    fast: AverageWindow<T>,
    slow: AverageWindow<T>,
}

/// Averages produced by one [`DualAverage::tick`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Flushed<T> {
    pub fast: Option<T>,
    pub slow: Option<T>,
}

impl<T: Sample> DualAverage<T> {
    pub fn new(fast_period_ms: u64, slow_period_ms: u64) -> Self {
        Self {
            fast: AverageWindow::new(fast_period_ms),
            slow: AverageWindow::new(slow_period_ms),
        }
    }

    pub fn tick(&mut self, now: u64, reading: &T) -> Flushed<T> {
        Flushed {
            fast: self.fast.tick(now, reading),
            slow: self.slow.tick(now, reading),
        }
    }

    pub fn fast_average(&self) -> T {
        self.fast.average()
    }

    pub fn slow_average(&self) -> T {
        self.slow.average()
    }

    pub fn fast_window(&self) -> &AverageWindow<T> {
        &self.fast
    }

    pub fn slow_window(&self) -> &AverageWindow<T> {
        &self.slow
    }
}
