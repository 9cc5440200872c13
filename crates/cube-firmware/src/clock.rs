//! Wall-clock time for history timestamps
//!
//! Until the first SNTP answer arrives, [`WallClock::now_ms`] counts from
//! boot. After a sync it returns milliseconds since the Unix epoch.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Instant;
use log::info;

pub struct WallClock {
    /// Epoch milliseconds at boot, once known
    boot_epoch_ms: Mutex<CriticalSectionRawMutex, Cell<Option<u64>>>,
}

impl WallClock {
    pub const fn new() -> Self {
        Self {
            boot_epoch_ms: Mutex::new(Cell::new(None)),
        }
    }

    pub fn uptime_ms() -> u64 {
        Instant::now().as_millis()
    }

    pub fn now_ms(&self) -> u64 {
        let uptime = Self::uptime_ms();
        match self.boot_epoch_ms.lock(|cell| cell.get()) {
            Some(boot) => boot + uptime,
            None => uptime,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.boot_epoch_ms.lock(|cell| cell.get()).is_some()
    }

    /// Anchor the clock to `epoch_ms`, the current time since the epoch.
    pub fn sync(&self, epoch_ms: u64) {
        let boot = epoch_ms.saturating_sub(Self::uptime_ms());
        let first = !self.is_synced();
        self.boot_epoch_ms.lock(|cell| cell.set(Some(boot)));
        if first {
            info!("Clock synced: {} ms since epoch", epoch_ms);
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}
