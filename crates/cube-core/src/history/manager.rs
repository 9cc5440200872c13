use core::fmt;

use log::{error, info, warn};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use super::capacity::*;
use super::{
    GlobalMemory, HistoryEntry, HistorySource, PsramBudget, Resolution, RingMemory, SampleStore,
};
use crate::config::HistoryConfig;
use crate::errors::HistoryError;
use crate::samples::*;

/// Outcome of bringing up the history store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InitState {
    /// History is disabled, not yet initialized, or no enabled sensor got
    /// storage
    #[default]
    Uninitialized,
    /// Every enabled sensor got storage
    Ready,
    /// Some enabled sensors got storage and some did not
    Degraded,
}

/// What [`HistoryManager::initialize`] did, sensor by sensor.
#[derive(Debug, Clone)]
pub struct HistoryInitReport {
    pub state: InitState,
    pub bytes_used: usize,
    pub initialized: heapless::Vec<SensorKind, 12>,
    pub failures: heapless::Vec<(SensorKind, HistoryError), 12>,
}

/// Owns one [`SensorHistory`](super::SensorHistory) per sensor kind.
///
/// Built once at boot and shared by reference between the averaging task
/// (the only writer) and the query handlers (readers). Sensors disabled in
/// configuration keep an uninitialized history that ignores inserts.
///
/// ## Memory Usage
///
/// Every enabled sensor claims `(FAST + SLOW) × size_of::<HistoryEntry<T>>()`
/// bytes from a single [`PsramBudget`] of [`HISTORY_MEMORY_BUDGET`]. With
/// every sensor enabled the total is [`TOTAL_FOOTPRINT`].
#[derive(Debug, Default)]
pub struct HistoryManager {
    /// `enable_history` as seen by the last `initialize`; `None` before it
    enabled: Option<bool>,
    state: InitState,
    bytes_used: usize,
    memory_budget: usize,
    /// Bit per [`SensorKind`] enabled at initialization
    attempted: u16,
    solar: SolarHistory,
    i2c: I2cHistory,
    sps30: Sps30History,
    ips: IpsHistory,
    mcp3424: Mcp3424History,
    ads1110: Ads1110History,
    ina219: Ina219History,
    sht40: Sht40History,
    calibrated: CalibratedHistory,
    hcho: HchoHistory,
    fan: FanHistory,
    battery: BatteryHistory,
}

/// Typed access to the history of sample type `T`.
pub trait HistorySlot<T> {
    fn slot(&self) -> &dyn SampleStore<T>;

    fn slot_mut(&mut self) -> &mut dyn SampleStore<T>;
}

macro_rules! history_slots {
    ($($field:ident: $history:ty => $sample:ty, $kind:ident;)*) => {
        impl HistoryManager {
            $(
                pub fn $field(&self) -> &$history {
                    &self.$field
                }
            )*

            /// Runtime lookup of a sensor's history.
            pub fn source(&self, kind: SensorKind) -> &dyn HistorySource {
                match kind {
                    $(SensorKind::$kind => &self.$field,)*
                }
            }

            fn source_mut(&mut self, kind: SensorKind) -> &mut dyn HistorySource {
                match kind {
                    $(SensorKind::$kind => &mut self.$field,)*
                }
            }
        }

        $(
            impl HistorySlot<$sample> for HistoryManager {
                fn slot(&self) -> &dyn SampleStore<$sample> {
                    &self.$field
                }

                fn slot_mut(&mut self) -> &mut dyn SampleStore<$sample> {
                    &mut self.$field
                }
            }
        )*
    };
}

history_slots! {
    solar: SolarHistory => SolarData, Solar;
    i2c: I2cHistory => I2cSensorData, I2c;
    sps30: Sps30History => Sps30Data, Sps30;
    ips: IpsHistory => IpsData, Ips;
    mcp3424: Mcp3424History => Mcp3424Data, Mcp3424;
    ads1110: Ads1110History => Ads1110Data, Ads1110;
    ina219: Ina219History => Ina219Data, Ina219;
    sht40: Sht40History => Sht40Data, Sht40;
    calibrated: CalibratedHistory => CalibratedData, Calibrated;
    hcho: HchoHistory => HchoData, Hcho;
    fan: FanHistory => FanData, Fan;
    battery: BatteryHistory => BatteryData, Battery;
}

impl HistoryManager {
    /// A manager with no storage. Call [`initialize`](Self::initialize)
    /// before any task starts using it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate histories for every sensor enabled in `config`.
    ///
    /// A sensor whose storage cannot be allocated, or that would overrun
    /// the budget, is logged and left uninitialized; the others carry on.
    pub fn initialize(&mut self, config: &HistoryConfig) -> HistoryInitReport {
        self.initialize_with_budget(config, HISTORY_MEMORY_BUDGET)
    }

    /// [`initialize`](Self::initialize) against a custom byte ceiling.
    pub fn initialize_with_budget(
        &mut self,
        config: &HistoryConfig,
        budget_bytes: usize,
    ) -> HistoryInitReport {
        self.initialize_in(config, budget_bytes, &GlobalMemory)
    }

    /// Allocate every enabled history from `memory` against a byte ceiling.
    ///
    /// The firmware passes a PSRAM-only source here so the rings never
    /// touch internal RAM; a sensor that does not fit is left without
    /// storage rather than falling back to another region.
    pub fn initialize_in(
        &mut self,
        config: &HistoryConfig,
        budget_bytes: usize,
        memory: &dyn RingMemory,
    ) -> HistoryInitReport {
        self.enabled = Some(config.enable_history);
        self.memory_budget = budget_bytes;

        let mut report = HistoryInitReport {
            state: InitState::Uninitialized,
            bytes_used: self.bytes_used,
            initialized: heapless::Vec::new(),
            failures: heapless::Vec::new(),
        };

        if !config.enable_history {
            info!("History disabled in configuration");
            self.state = InitState::Uninitialized;
            return report;
        }

        let mut budget = PsramBudget::new(budget_bytes.saturating_sub(self.bytes_used));

        for kind in SensorKind::ALL {
            if !config.sensors.is_enabled(kind) {
                continue;
            }
            self.attempted |= 1 << kind as u16;

            let history = self.source_mut(kind);
            if history.is_initialized() {
                let _ = report.initialized.push(kind);
                continue;
            }

            match history.initialize(&mut budget, memory) {
                Ok(bytes) => {
                    info!(
                        "{} history: {} bytes ({:.1}% of budget)",
                        kind,
                        bytes,
                        percent(bytes, budget_bytes)
                    );
                    let _ = report.initialized.push(kind);
                }
                Err(e) => {
                    error!("{} history unavailable: {}", kind, e);
                    let _ = report.failures.push((kind, e));
                }
            }
        }

        self.bytes_used += budget.used();
        self.state = match (report.initialized.is_empty(), report.failures.is_empty()) {
            (_, true) => InitState::Ready,
            (false, false) => InitState::Degraded,
            (true, false) => InitState::Uninitialized,
        };

        report.state = self.state;
        report.bytes_used = self.bytes_used;

        match self.state {
            InitState::Ready => info!(
                "History ready: {} bytes of {} ({:.1}%)",
                self.bytes_used,
                budget_bytes,
                percent(self.bytes_used, budget_bytes)
            ),
            InitState::Degraded => warn!(
                "History degraded: {} sensor(s) without storage, {} bytes in use",
                report.failures.len(),
                self.bytes_used
            ),
            InitState::Uninitialized => error!("History not initialized: no sensor got storage"),
        }

        report
    }

    /// False only once `initialize` has seen history switched off in the
    /// configuration.
    pub fn is_enabled(&self) -> bool {
        self.enabled != Some(false)
    }

    pub fn state(&self) -> InitState {
        self.state
    }

    /// True unless history is disabled or no sensor got storage.
    pub fn is_initialized(&self) -> bool {
        self.enabled == Some(true) && self.state != InitState::Uninitialized
    }

    /// Bytes claimed by all initialized histories.
    pub fn total_memory_used(&self) -> usize {
        self.bytes_used
    }

    /// Insert one averaged sample. Dropped if that sensor has no storage.
    pub fn record<T>(&mut self, resolution: Resolution, timestamp: u64, data: T)
    where
        Self: HistorySlot<T>,
    {
        self.slot_mut().insert(resolution, timestamp, data);
    }

    /// Most recent entry of sample type `T` at `resolution`.
    pub fn latest<T>(&self, resolution: Resolution) -> Option<HistoryEntry<T>>
    where
        Self: HistorySlot<T>,
    {
        self.slot().latest(resolution)
    }

    /// Diagnostics snapshot for status reports and `getHistoryInfo`.
    pub fn status(&self) -> HistoryStatus {
        let mut sensors = heapless::Vec::new();
        if self.enabled == Some(true) {
            for kind in SensorKind::ALL {
                let history = self.source(kind);
                // Disabled sensors were never attempted and are left out
                if !history.is_initialized() && !self.attempted(kind) {
                    continue;
                }
                let _ = sensors.push(SensorStatus {
                    kind,
                    initialized: history.is_initialized(),
                    fast_samples: history.count(Resolution::Fast),
                    slow_samples: history.count(Resolution::Slow),
                    fast_capacity: history.capacity(Resolution::Fast),
                    slow_capacity: history.capacity(Resolution::Slow),
                });
            }
        }

        HistoryStatus {
            enabled: self.is_enabled(),
            initialized: self.is_initialized(),
            state: self.state,
            total_memory_used: self.bytes_used,
            memory_budget: self.memory_budget,
            memory_percent: percent(self.bytes_used, self.memory_budget),
            sensors: SensorStatuses(sensors),
        }
    }

    /// Log one line per sensor with its fill level.
    pub fn log_status(&self) {
        let status = self.status();
        info!("{}", status);
        for sensor in status.sensors.0.iter() {
            info!("  {}", sensor);
        }
    }

    fn attempted(&self, kind: SensorKind) -> bool {
        self.attempted & (1 << kind as u16) != 0
    }
}

fn percent(part: usize, whole: usize) -> f32 {
    if whole == 0 {
        return 0.0;
    }
    part as f32 * 100.0 / whole as f32
}

/// Fill level of one sensor's history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorStatus {
    #[serde(skip)]
    pub kind: SensorKind,
    pub initialized: bool,
    pub fast_samples: usize,
    pub slow_samples: usize,
    pub fast_capacity: usize,
    pub slow_capacity: usize,
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.initialized {
            return write!(f, "{}: no storage", self.kind);
        }
        write!(
            f,
            "{}: fast {}/{}, slow {}/{}",
            self.kind, self.fast_samples, self.fast_capacity, self.slow_samples, self.slow_capacity
        )
    }
}

/// Per-sensor statuses, serialized as an object keyed by sensor name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorStatuses(pub heapless::Vec<SensorStatus, 12>);

impl SensorStatuses {
    pub fn get(&self, kind: SensorKind) -> Option<&SensorStatus> {
        self.0.iter().find(|s| s.kind == kind)
    }
}

impl Serialize for SensorStatuses {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for sensor in self.0.iter() {
            map.serialize_entry(sensor.kind.name(), sensor)?;
        }
        map.end()
    }
}

/// Aggregate history diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStatus {
    pub enabled: bool,
    pub initialized: bool,
    pub state: InitState,
    pub total_memory_used: usize,
    pub memory_budget: usize,
    pub memory_percent: f32,
    pub sensors: SensorStatuses,
}

impl fmt::Display for HistoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.enabled {
            return f.write_str("history disabled");
        }
        write!(
            f,
            "history {:?}: {} of {} bytes ({:.1}%), {} sensor(s)",
            self.state,
            self.total_memory_used,
            self.memory_budget,
            self.memory_percent,
            self.sensors.0.len()
        )
    }
}
