//! Core types: device state, product catalogue, derived metrics, time

pub mod metrics;
pub mod product;
pub mod state;
pub mod time;
pub mod tracing;

pub use metrics::DerivedMetrics;
pub use product::{is_fountain_name, ProductModel, FOUNTAIN_DEVICE_TYPE};
pub use state::{
    BatteryReading, ConfigUpdate, DeviceConfig, DeviceState, DndSettings, FirmwareVersion, Info,
    InfoCommit, LedSettings, Mode, PowerState, StateReport, Status, StatusUpdate, Versioned,
    Warnings,
};
pub use time::{MinuteOfDay, ParseMinuteError};
pub use self::tracing::{init_tracing, TracingConfig, TracingError, TracingOutputFormat};
