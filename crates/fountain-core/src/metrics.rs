//! Metrics derived from the raw device state.
//!
//! The vendor app estimates filter life, purified water and energy use from
//! pump runtime with per-model constants. The same formulas are reproduced
//! here so host layers do not have to.

use serde::{Deserialize, Serialize};

use crate::product::ProductModel;
use crate::state::{DeviceConfig, Mode, Status};

/// Nominal filter lifetime in days at continuous pumping.
pub const FILTER_LIFETIME_DAYS: f64 = 30.0;

/// Estimates computed from status and config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    /// Days until the filter needs replacement.
    pub filter_days_left: Option<u32>,
    /// Water pumped through the filter over the pump lifetime, in liters.
    pub purified_water_liters: f64,
    /// Water pumped through the filter today, in liters.
    pub purified_water_today_liters: Option<f64>,
    /// Energy used over the pump lifetime, in kWh.
    pub energy_kwh: f64,
}

impl DerivedMetrics {
    /// Computes the estimates.
    pub fn compute(status: &Status, config: &DeviceConfig, model: Option<ProductModel>) -> Self {
        let (on, off) = match status.mode {
            Mode::Normal => (1, 0),
            Mode::Smart => (config.smart_on_minutes, config.smart_off_minutes),
        };

        let runtime = status.pump_runtime.as_secs_f64();
        Self {
            filter_days_left: filter_days_left(status.filter_remaining, on, off),
            purified_water_liters: purified_water_liters(model, runtime),
            purified_water_today_liters: status
                .pump_runtime_today
                .map(|today| purified_water_liters(model, today.as_secs_f64())),
            energy_kwh: energy_kwh(model, runtime),
        }
    }
}

/// Days of filter life left given the remaining fraction and the pump duty
/// cycle. Returns `None` when the pump never runs.
pub fn filter_days_left(remaining: f32, on_minutes: u8, off_minutes: u8) -> Option<u32> {
    if on_minutes == 0 {
        return None;
    }
    let on = f64::from(on_minutes);
    let off = f64::from(off_minutes);
    let days = (f64::from(remaining) * FILTER_LIFETIME_DAYS * (on + off)) / on;
    Some(days.max(0.0).ceil() as u32)
}

/// Liters of water pumped over `runtime_secs` seconds.
pub fn purified_water_liters(model: Option<ProductModel>, runtime_secs: f64) -> f64 {
    let (flow, divisor) = match model.map(ProductModel::alias) {
        Some("W5C") => (1.3, 1.0),
        Some("W4X") => (1.5, 1.8),
        _ => (1.5, 2.0),
    };
    (flow * runtime_secs / 60.0) / divisor
}

/// Energy in kWh used over `runtime_secs` seconds.
///
/// The W5C figure is a fixed value in the vendor app rather than a function
/// of runtime.
pub fn energy_kwh(model: Option<ProductModel>, runtime_secs: f64) -> f64 {
    let watt_seconds = match model {
        Some(ProductModel::W5c) => 0.182,
        _ => 0.75 * runtime_secs,
    };
    watt_seconds / 3_600_000.0
}
