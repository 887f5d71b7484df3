//! Device state model.
//!
//! The device state is split into three independent record groups:
//!
//! - [`Status`]: live telemetry (power, warnings, runtime, battery, RSSI)
//! - [`DeviceConfig`]: user settings (smart timings, LED, do-not-disturb)
//! - [`Info`]: identity (device id, serial, firmware, model)
//!
//! Status and config are wrapped in [`Versioned`] so consumers can tell
//! whether a group was ever populated and cheaply detect changes. Updates are
//! expressed as fully decoded patches ([`StatusUpdate`], [`ConfigUpdate`]) and
//! applied in one step, so a group is never left half-written.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::DerivedMetrics;
use crate::product::ProductModel;
use crate::time::MinuteOfDay;

/// Pump power state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    #[default]
    Off,
    On,
}

impl PowerState {
    /// Decodes the wire byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Off),
            1 => Some(Self::On),
            _ => None,
        }
    }

    /// Encodes to the wire byte.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::On => 1,
        }
    }

    /// Returns true when the pump is powered.
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

impl From<bool> for PowerState {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

/// Pump operating mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Continuous pumping.
    #[default]
    Normal,
    /// Intermittent pumping following the smart on/off timings.
    Smart,
}

impl Mode {
    /// Decodes the wire byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Normal),
            2 => Some(Self::Smart),
            _ => None,
        }
    }

    /// Encodes to the wire byte.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Normal => 1,
            Self::Smart => 2,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::Smart => f.write_str("smart"),
        }
    }
}

/// Warning flags reported by the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Warnings {
    /// Pump breakdown.
    pub breakdown: bool,
    /// Reservoir empty.
    pub water_missing: bool,
    /// Filter needs replacement.
    pub filter: bool,
}

impl Warnings {
    /// Returns true if any warning is raised.
    pub fn any(&self) -> bool {
        self.breakdown || self.water_missing || self.filter
    }
}

/// Pump state block, as carried by state queries and full status reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StateReport {
    pub power: PowerState,
    pub mode: Mode,
    /// Do-not-disturb window currently active.
    pub dnd_active: bool,
    pub warnings: Warnings,
    /// Pump currently running (smart mode pauses it periodically).
    pub running: bool,
    /// Lifetime pump runtime.
    pub pump_runtime: Duration,
    /// Remaining filter life as a fraction in `0.0..=1.0`.
    pub filter_remaining: f32,
}

/// Battery block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryReading {
    /// Battery voltage in volts.
    pub voltage: f32,
    /// Charge in percent.
    pub percent: u8,
}

/// Live telemetry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub power: PowerState,
    pub mode: Mode,
    pub dnd_active: bool,
    pub warnings: Warnings,
    pub running: bool,
    pub pump_runtime: Duration,
    pub pump_runtime_today: Option<Duration>,
    pub filter_remaining: f32,
    pub battery_percent: Option<u8>,
    /// Battery voltage in volts.
    pub voltage: Option<f32>,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
}

/// A decoded change to [`Status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusUpdate {
    /// Pump state block.
    State(StateReport),
    /// Runtime since midnight.
    RuntimeToday { runtime: Duration },
    /// Battery block.
    Battery(BatteryReading),
    /// Signal strength sample from the link.
    Rssi { dbm: i16 },
    /// Acknowledged power/mode change.
    Mode { power: PowerState, mode: Mode },
    /// Acknowledged filter reset.
    FilterReset,
}

impl Status {
    /// Applies an update, returning true if any field changed.
    ///
    /// Fields not covered by the update are left untouched, so replaying the
    /// same update is a no-op.
    pub fn apply(&mut self, update: &StatusUpdate) -> bool {
        let before = self.clone();
        match update {
            StatusUpdate::State(report) => {
                self.power = report.power;
                self.mode = report.mode;
                self.dnd_active = report.dnd_active;
                self.warnings = report.warnings;
                self.running = report.running;
                self.pump_runtime = report.pump_runtime;
                self.filter_remaining = report.filter_remaining;
            }
            StatusUpdate::RuntimeToday { runtime } => {
                self.pump_runtime_today = Some(*runtime);
            }
            StatusUpdate::Battery(reading) => {
                self.battery_percent = Some(reading.percent);
                self.voltage = Some(reading.voltage);
            }
            StatusUpdate::Rssi { dbm } => {
                self.rssi = Some(*dbm);
            }
            StatusUpdate::Mode { power, mode } => {
                self.power = *power;
                self.mode = *mode;
            }
            StatusUpdate::FilterReset => {
                self.filter_remaining = 1.0;
                self.warnings.filter = false;
            }
        }
        *self != before
    }
}

/// LED ring settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedSettings {
    pub enabled: bool,
    /// Brightness, 0-100.
    pub brightness: u8,
    /// Start of the LED window.
    pub on: MinuteOfDay,
    /// End of the LED window.
    pub off: MinuteOfDay,
}

/// Do-not-disturb settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DndSettings {
    pub enabled: bool,
    pub start: MinuteOfDay,
    pub end: MinuteOfDay,
}

/// User settings stored on the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Smart mode pumping period, in minutes.
    pub smart_on_minutes: u8,
    /// Smart mode pause period, in minutes.
    pub smart_off_minutes: u8,
    pub led: LedSettings,
    pub do_not_disturb: DndSettings,
    /// Physical buttons locked.
    pub child_lock: bool,
}

/// A decoded change to [`DeviceConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "config", rename_all = "snake_case")]
pub enum ConfigUpdate {
    /// Complete settings block.
    Full(DeviceConfig),
    /// Settings block from a full status report, which does not carry the
    /// child lock; the current lock value is kept.
    WithoutLock(DeviceConfig),
}

impl DeviceConfig {
    /// Applies an update, returning true if any field changed.
    pub fn apply(&mut self, update: &ConfigUpdate) -> bool {
        let before = *self;
        match update {
            ConfigUpdate::Full(config) => *self = *config,
            ConfigUpdate::WithoutLock(config) => {
                *self = DeviceConfig {
                    child_lock: self.child_lock,
                    ..*config
                };
            }
        }
        *self != before
    }
}

/// Firmware revision, shown by the vendor as `hardware.firmware`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub hardware: u8,
    pub firmware: u8,
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.hardware, self.firmware)
    }
}

/// Device identity. Written once after a successful initialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Info {
    /// 48-bit vendor device id.
    pub device_id: u64,
    /// Serial number.
    pub serial: String,
    pub firmware: FirmwareVersion,
    /// Model, when the host could identify it from the advertisement.
    pub model: Option<ProductModel>,
}

/// A record group with a change counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    value: T,
    version: u64,
    #[serde(default)]
    known: bool,
    updated_at: Option<DateTime<Utc>>,
}

impl<T> Versioned<T> {
    /// Wraps an initial value at version 0.
    pub fn new(value: T) -> Self {
        Self {
            value,
            version: 0,
            known: false,
            updated_at: None,
        }
    }

    /// Returns the current value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Number of changes applied so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// When the last change was applied.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Returns true once the device has reported this group, even if the
    /// report matched the initial value.
    pub fn is_known(&self) -> bool {
        self.known
    }

    /// Runs `f` on the value and bumps the version if it reports a change.
    ///
    /// Returns true if the value changed or the group just became known.
    pub fn modify(&mut self, f: impl FnOnce(&mut T) -> bool) -> bool {
        let changed = f(&mut self.value);
        let first = !self.known;
        self.known = true;
        if changed {
            self.version += 1;
        }
        if changed || first {
            self.updated_at = Some(Utc::now());
        }
        changed || first
    }
}

/// Outcome of [`DeviceState::commit_info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoCommit {
    /// First write.
    Written,
    /// Same identity as already recorded.
    Unchanged,
    /// A different identity was offered and ignored.
    Conflict,
}

/// The full latest-known state of one fountain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    status: Versioned<Status>,
    config: Versioned<DeviceConfig>,
    info: Option<Info>,
    model: Option<ProductModel>,
}

impl DeviceState {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty state for a model identified by the host.
    pub fn with_model(model: Option<ProductModel>) -> Self {
        Self {
            model,
            ..Self::default()
        }
    }

    /// Status group.
    pub fn status(&self) -> &Versioned<Status> {
        &self.status
    }

    /// Config group.
    pub fn config(&self) -> &Versioned<DeviceConfig> {
        &self.config
    }

    /// Info group, once initialization has completed.
    pub fn info(&self) -> Option<&Info> {
        self.info.as_ref()
    }

    /// Best known model: from the committed info, else the host hint.
    pub fn model(&self) -> Option<ProductModel> {
        self.info.as_ref().and_then(|info| info.model).or(self.model)
    }

    /// Applies a status patch.
    pub fn apply_status(&mut self, update: &StatusUpdate) -> bool {
        self.status.modify(|status| status.apply(update))
    }

    /// Applies a config patch.
    pub fn apply_config(&mut self, update: &ConfigUpdate) -> bool {
        self.config.modify(|config| config.apply(update))
    }

    /// Records the device identity. The first identity wins.
    pub fn commit_info(&mut self, info: Info) -> InfoCommit {
        match &self.info {
            None => {
                self.info = Some(info);
                InfoCommit::Written
            }
            Some(existing) if *existing == info => InfoCommit::Unchanged,
            Some(_) => InfoCommit::Conflict,
        }
    }

    /// Computes derived metrics from the current status and config.
    pub fn metrics(&self) -> DerivedMetrics {
        DerivedMetrics::compute(self.status.value(), self.config.value(), self.model())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_report() -> StateReport {
        StateReport {
            power: PowerState::On,
            mode: Mode::Smart,
            dnd_active: false,
            warnings: Warnings {
                filter: true,
                ..Warnings::default()
            },
            running: true,
            pump_runtime: Duration::from_secs(3_600),
            filter_remaining: 0.4,
        }
    }

    #[test]
    fn wire_bytes() {
        assert_eq!(PowerState::from_byte(1), Some(PowerState::On));
        assert_eq!(PowerState::from_byte(2), None);
        assert_eq!(Mode::from_byte(2), Some(Mode::Smart));
        assert_eq!(Mode::from_byte(0), None);
        assert_eq!(Mode::Smart.as_byte(), 2);
    }

    #[test]
    fn status_update_is_idempotent() {
        let mut state = DeviceState::new();
        let update = StatusUpdate::State(state_report());

        assert!(state.apply_status(&update));
        assert_eq!(state.status().version(), 1);

        assert!(!state.apply_status(&update));
        assert_eq!(state.status().version(), 1);
    }

    #[test]
    fn status_updates_touch_only_their_fields() {
        let mut status = Status::default();
        status.apply(&StatusUpdate::State(state_report()));
        status.apply(&StatusUpdate::Battery(BatteryReading {
            voltage: 3.9,
            percent: 80,
        }));

        assert_eq!(status.power, PowerState::On);
        assert_eq!(status.battery_percent, Some(80));
        assert_eq!(status.voltage, Some(3.9));
        assert!(status.warnings.filter);
    }

    #[test]
    fn filter_reset_clears_warning() {
        let mut status = Status::default();
        status.apply(&StatusUpdate::State(state_report()));
        assert!(status.apply(&StatusUpdate::FilterReset));
        assert_eq!(status.filter_remaining, 1.0);
        assert!(!status.warnings.filter);
    }

    #[test]
    fn config_without_lock_keeps_lock() {
        let mut config = DeviceConfig {
            child_lock: true,
            ..DeviceConfig::default()
        };
        let incoming = DeviceConfig {
            smart_on_minutes: 3,
            smart_off_minutes: 5,
            child_lock: false,
            ..DeviceConfig::default()
        };

        assert!(config.apply(&ConfigUpdate::WithoutLock(incoming)));
        assert!(config.child_lock);
        assert_eq!(config.smart_on_minutes, 3);

        assert!(config.apply(&ConfigUpdate::Full(incoming)));
        assert!(!config.child_lock);
    }

    #[test]
    fn info_first_write_wins() {
        let mut state = DeviceState::new();
        let info = Info {
            device_id: 42,
            serial: "SN1".into(),
            firmware: FirmwareVersion {
                hardware: 1,
                firmware: 2,
            },
            model: Some(ProductModel::W5),
        };

        assert_eq!(state.commit_info(info.clone()), InfoCommit::Written);
        assert_eq!(state.commit_info(info.clone()), InfoCommit::Unchanged);

        let other = Info {
            serial: "SN2".into(),
            ..info
        };
        assert_eq!(state.commit_info(other), InfoCommit::Conflict);
        assert_eq!(state.info().map(|i| i.serial.as_str()), Some("SN1"));
    }

    #[test]
    fn firmware_display() {
        let fw = FirmwareVersion {
            hardware: 1,
            firmware: 35,
        };
        assert_eq!(fw.to_string(), "1.35");
    }

    #[test]
    fn versioned_known_after_first_report() {
        let mut group = Versioned::new(DeviceConfig::default());
        assert!(!group.is_known());

        assert!(group.modify(|_| false));
        assert!(group.is_known());
        assert_eq!(group.version(), 0);
        assert!(group.updated_at().is_some());

        assert!(!group.modify(|_| false));
        assert!(group.modify(|config| {
            config.child_lock = true;
            true
        }));
        assert_eq!(group.version(), 1);
    }

    #[test]
    fn default_config_block_marks_config_known() {
        let mut state = DeviceState::new();
        assert!(state.apply_config(&ConfigUpdate::Full(DeviceConfig::default())));
        assert!(state.config().is_known());
        assert_eq!(state.config().version(), 0);
        assert_eq!(state.config().value(), &DeviceConfig::default());
    }

    #[test]
    fn status_update_json_shape() {
        let update = StatusUpdate::Mode {
            power: PowerState::On,
            mode: Mode::Smart,
        };
        insta::assert_json_snapshot!(update, @r#"
        {
          "kind": "mode",
          "power": "on",
          "mode": "smart"
        }
        "#);
    }
}
