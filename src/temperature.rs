//! Temperature collaborator surface for Auriga
//!
//! Raw probe drivers live outside the core; the engines only pull grouped
//! readings through this trait. All methods are best-effort: an empty
//! vector or `None` field simply means "no reading available".

use serde::{Deserialize, Serialize};

/// Coolant loop temperatures in °C
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CoolantTemperatures {
    pub inlet: Option<f64>,
    pub outlet: Option<f64>,
}

/// Charging hardware temperatures in °C
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ChargingTemperatures {
    pub port: Option<f64>,
    pub connector: Option<f64>,
}

/// Read-only access to the vehicle's temperature probes
pub trait TemperatureProvider: Send + Sync {
    /// Per-group battery cell temperatures in °C; empty when no sensors
    /// are fitted
    fn battery_cell_temperatures(&self) -> Vec<f64>;

    /// Coolant inlet/outlet temperatures
    fn coolant_temperatures(&self) -> CoolantTemperatures;

    /// Charging port and connector temperatures
    fn charging_temperatures(&self) -> ChargingTemperatures;
}

/// Fixed-value provider for simulation and tests
#[derive(Debug, Clone, Default)]
pub struct StaticTemperatureProvider {
    pub cell_groups: Vec<f64>,
    pub coolant: CoolantTemperatures,
    pub charging: ChargingTemperatures,
}

impl TemperatureProvider for StaticTemperatureProvider {
    fn battery_cell_temperatures(&self) -> Vec<f64> {
        self.cell_groups.clone()
    }

    fn coolant_temperatures(&self) -> CoolantTemperatures {
        self.coolant
    }

    fn charging_temperatures(&self) -> ChargingTemperatures {
        self.charging
    }
}
