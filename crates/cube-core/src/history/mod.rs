//! Fixed-capacity sensor history held in PSRAM
//!
//! Each sensor keeps two rings of averaged samples:
//!
//! - **Fast**: one entry per fast averaging window (~10 s), about one hour
//! - **Slow**: one entry per slow averaging window (~5 min), about one day
//!
//! All rings are allocated once at boot against [`HISTORY_MEMORY_BUDGET`] and
//! never grow. Nothing here is persisted; a reset empties the history.

pub mod capacity;
mod entry;
mod manager;
mod ring;
mod sensor_history;

pub use capacity::HISTORY_MEMORY_BUDGET;
pub use entry::{FormattedTime, HistoryEntry, format_timestamp};
pub use manager::*;
pub use ring::{GlobalMemory, RingBuffer, RingMemory};
pub use sensor_history::{HistorySource, SampleStore, SensorHistory};

use core::fmt;

use log::error;

use crate::errors::HistoryError;

/// Which of the two retention tiers a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    Fast,
    Slow,
}

impl Resolution {
    /// Name used in requests and responses (`sampleType`).
    pub const fn label(self) -> &'static str {
        match self {
            Resolution::Fast => "fast",
            Resolution::Slow => "slow",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "fast" => Some(Resolution::Fast),
            "slow" => Some(Resolution::Slow),
            _ => None,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Byte accounting for history buffers against a fixed ceiling.
///
/// The ceiling is enforced before touching the allocator, so an
/// over-budget sensor fails without disturbing the PSRAM heap.
#[derive(Debug, Clone, Copy)]
pub struct PsramBudget {
    limit: usize,
    used: usize,
}

impl PsramBudget {
    pub const fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    pub const fn limit(&self) -> usize {
        self.limit
    }

    pub const fn used(&self) -> usize {
        self.used
    }

    pub const fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.used)
    }

    /// Claim `bytes` from the budget.
    pub fn reserve(&mut self, bytes: usize) -> Result<(), HistoryError> {
        let remaining = self.remaining();
        if bytes > remaining {
            error!(
                "History budget exceeded: requested {} bytes, {} of {} remaining",
                bytes, remaining, self.limit
            );
            return Err(HistoryError::BudgetExceeded {
                requested: bytes,
                remaining,
            });
        }
        self.used += bytes;
        Ok(())
    }

    /// Return a claim whose allocation did not go through.
    pub fn release(&mut self, bytes: usize) {
        self.used = self.used.saturating_sub(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_reserve_and_release() {
        let mut budget = PsramBudget::new(100);
        budget.reserve(60).unwrap();
        assert_eq!(budget.remaining(), 40);

        let err = budget.reserve(41).unwrap_err();
        assert_eq!(
            err,
            HistoryError::BudgetExceeded {
                requested: 41,
                remaining: 40
            }
        );
        assert_eq!(budget.used(), 60);

        budget.release(60);
        assert_eq!(budget.used(), 0);
        budget.reserve(100).unwrap();
    }

    #[test]
    fn test_resolution_labels() {
        assert_eq!(Resolution::from_label("fast"), Some(Resolution::Fast));
        assert_eq!(Resolution::from_label("slow"), Some(Resolution::Slow));
        assert_eq!(Resolution::from_label("medium"), None);
    }
}
