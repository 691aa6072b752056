//! Battery state engine for Auriga
//!
//! Owns pack and cell measurements, fault/status classification, SOC/SOH
//! estimation, and charge/discharge admission checks. Status is a pure
//! function of the latest sample, re-evaluated on every update, so fault
//! conditions self-heal once the sample improves.

use crate::can::EvCanProtocol;
use crate::config::BatteryConfig;
use crate::logging::get_logger;
use crate::temperature::TemperatureProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sensor index used for the coolant inlet temperature frame
const COOLANT_INLET_SENSOR: u16 = 0xF0;
/// Sensor index used for the coolant outlet temperature frame
const COOLANT_OUTLET_SENSOR: u16 = 0xF1;

/// Battery system status states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryStatus {
    Healthy,
    Warning,
    Critical,
    Charging,
    Discharging,
    Fault,
    Standby,
}

impl BatteryStatus {
    /// Whether this status blocks charge/discharge admission
    pub fn is_fault(self) -> bool {
        matches!(self, BatteryStatus::Fault | BatteryStatus::Critical)
    }
}

/// Current battery state information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatteryState {
    /// Total pack voltage in V
    pub voltage: f64,

    /// Pack current in A (positive = charging, negative = discharging)
    pub current: f64,

    /// Average pack temperature in °C
    pub temperature: f64,

    /// State of charge (0-100%)
    pub soc: f64,

    /// State of health (0-100%)
    pub soh: f64,

    /// Number of cells in the pack
    pub cell_count: usize,

    /// Individual cell voltages
    pub cell_voltages: Vec<f64>,

    /// Individual cell temperatures
    pub cell_temperatures: Vec<f64>,

    /// Temperatures per cell group, when a temperature provider is attached
    pub cell_group_temperatures: Vec<f64>,

    /// Coolant inlet temperature in °C
    pub coolant_inlet_temperature: Option<f64>,

    /// Coolant outlet temperature in °C
    pub coolant_outlet_temperature: Option<f64>,

    /// Classified status
    pub status: BatteryStatus,

    /// Epoch seconds of the last update; never decreases
    pub timestamp: f64,
}

/// Lifetime battery statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatteryStats {
    /// Total energy charged over lifetime in kWh
    pub total_energy_charged_kwh: f64,

    /// Total energy discharged over lifetime in kWh
    pub total_energy_discharged_kwh: f64,

    /// Completed charge cycles
    pub charge_cycles: u64,

    /// Number of times the pack entered FAULT or CRITICAL
    pub fault_count: u64,

    /// Epoch seconds of the last update
    pub last_update: f64,
}

/// One measurement sample; absent fields leave the previous value in place
#[derive(Debug, Clone, Default)]
pub struct BatterySample {
    /// Pack voltage in V
    pub voltage: Option<f64>,

    /// Pack current in A
    pub current: Option<f64>,

    /// Average temperature in °C
    pub temperature: Option<f64>,

    /// Individual cell voltages
    pub cell_voltages: Option<Vec<f64>>,

    /// Individual cell temperatures
    pub cell_temperatures: Option<Vec<f64>>,
}

/// Aggregated health summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub soh: f64,
    pub soc: f64,
    pub status: BatteryStatus,
    pub fault_count: u64,
    pub charge_cycles: u64,
    pub temperature: f64,
    pub min_cell_voltage: f64,
    pub max_cell_voltage: f64,
    pub average_cell_voltage: f64,
}

/// Battery management engine.
///
/// Sole writer of its [`BatteryState`]; everything else receives snapshots.
pub struct BatteryManager {
    config: BatteryConfig,
    state: BatteryState,
    stats: BatteryStats,
    can_protocol: Option<Arc<EvCanProtocol>>,
    temperature_provider: Option<Arc<dyn TemperatureProvider>>,
    logger: crate::logging::StructuredLogger,
}

impl BatteryManager {
    /// Create the engine with an initial standby state
    pub fn new(config: BatteryConfig) -> Self {
        let logger = get_logger("battery");
        let now = now_secs();

        let state = BatteryState {
            voltage: config.nominal_voltage,
            current: 0.0,
            temperature: 25.0,
            soc: 50.0,
            soh: 100.0,
            cell_count: config.cell_count,
            cell_voltages: vec![config.nominal_voltage / config.cell_count as f64; config.cell_count],
            cell_temperatures: vec![25.0; config.cell_count],
            cell_group_temperatures: Vec::new(),
            coolant_inlet_temperature: None,
            coolant_outlet_temperature: None,
            status: BatteryStatus::Standby,
            timestamp: now,
        };

        logger.info(&format!(
            "Battery engine initialized: {}kWh, {} cells",
            config.capacity_kwh, config.cell_count
        ));

        Self {
            config,
            state,
            stats: BatteryStats {
                last_update: now,
                ..BatteryStats::default()
            },
            can_protocol: None,
            temperature_provider: None,
            logger,
        }
    }

    /// Attach a CAN protocol for status frame emission
    pub fn with_can_protocol(mut self, protocol: Arc<EvCanProtocol>) -> Self {
        self.can_protocol = Some(protocol);
        self
    }

    /// Attach an external temperature provider
    pub fn with_temperature_provider(mut self, provider: Arc<dyn TemperatureProvider>) -> Self {
        self.temperature_provider = Some(provider);
        self
    }

    /// Integrate one sample using wall-clock time
    pub fn update(&mut self, sample: BatterySample) {
        self.update_at(now_secs(), sample);
    }

    /// Integrate one sample at an explicit instant (epoch seconds)
    pub fn update_at(&mut self, now: f64, sample: BatterySample) {
        let dt = now - self.state.timestamp;

        // Voltage: explicit value wins, else derive from cell voltages
        if let Some(v) = sample.voltage {
            self.state.voltage = v;
        } else if let Some(cells) = &sample.cell_voltages {
            self.state.voltage = cells.iter().sum();
            self.state.cell_voltages = cells.clone();
        }

        if let Some(i) = sample.current {
            self.state.current = i;
        }

        self.pull_temperatures(&sample);

        // Temperature: explicit value wins over derived cell averages
        if let Some(t) = sample.temperature {
            self.state.temperature = t;
        } else if let Some(cells) = &sample.cell_temperatures {
            self.state.cell_temperatures = cells.clone();
            if !cells.is_empty() {
                self.state.temperature = cells.iter().sum::<f64>() / cells.len() as f64;
            }
        }

        // Coulomb counting
        if dt > 0.0 && self.state.current != 0.0 {
            let energy_wh = self.state.current * self.state.voltage * dt / 3600.0;
            let energy_kwh = energy_wh / 1000.0;

            if self.state.current > 0.0 {
                self.stats.total_energy_charged_kwh += energy_kwh.abs();
            } else {
                self.stats.total_energy_discharged_kwh += energy_kwh.abs();
            }

            let soc_change = (energy_kwh / self.config.capacity_kwh) * 100.0;
            self.state.soc =
                (self.state.soc + soc_change).clamp(self.config.min_soc, self.config.max_soc);
        }

        // Voltage-based SOC fallback when no current is flowing; overwrites
        // the coulomb estimate, never blends with it
        if self.state.current == 0.0 && self.state.voltage > 0.0 {
            let cell_voltage = self.state.voltage / self.config.cell_count as f64;
            let voltage_ratio = (cell_voltage - self.config.min_voltage)
                / (self.config.max_voltage - self.config.min_voltage);
            self.state.soc = (voltage_ratio * 100.0).clamp(0.0, 100.0);
        }

        let previous = self.state.status;
        self.state.status = self.classify();
        if self.state.status.is_fault() && !previous.is_fault() {
            self.stats.fault_count += 1;
            self.logger
                .warn(&format!("Battery entered {:?}", self.state.status));
        }

        self.state.timestamp = now;
        self.stats.last_update = now;

        self.emit_status();
    }

    /// Pull grouped temperatures from the external provider, redistributing
    /// group readings evenly across cells when no per-cell sample was given
    fn pull_temperatures(&mut self, sample: &BatterySample) {
        let Some(provider) = &self.temperature_provider else {
            return;
        };

        let group_temps = provider.battery_cell_temperatures();
        if !group_temps.is_empty() {
            self.state.cell_group_temperatures = group_temps.clone();

            if sample.cell_temperatures.is_none() {
                let cells_per_group = (self.config.cell_count / group_temps.len()).max(1);
                let mut cell_temps = Vec::with_capacity(self.config.cell_count);
                for group_temp in &group_temps {
                    cell_temps.extend(std::iter::repeat_n(*group_temp, cells_per_group));
                }
                cell_temps.truncate(self.config.cell_count);

                if !cell_temps.is_empty() {
                    self.state.temperature =
                        cell_temps.iter().sum::<f64>() / cell_temps.len() as f64;
                }
                self.state.cell_temperatures = cell_temps;
            }
        }

        let coolant = provider.coolant_temperatures();
        if coolant.inlet.is_some() {
            self.state.coolant_inlet_temperature = coolant.inlet;
        }
        if coolant.outlet.is_some() {
            self.state.coolant_outlet_temperature = coolant.outlet;
        }
    }

    /// Priority-ordered status classification; first matching rule wins
    fn classify(&self) -> BatteryStatus {
        let s = &self.state;
        let c = &self.config;

        // Rule 1: SOC extremes are pack-critical
        if s.soc < 5.0 || s.soc > 95.0 {
            return BatteryStatus::Critical;
        }

        // Rule 2: voltage imbalance or a cell outside its window is always
        // FAULT, never CRITICAL
        if !s.cell_voltages.is_empty() {
            let max_cell = s.cell_voltages.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let min_cell = s.cell_voltages.iter().cloned().fold(f64::INFINITY, f64::min);
            if max_cell - min_cell > 0.5 {
                return BatteryStatus::Fault;
            }
            if s.cell_voltages
                .iter()
                .any(|v| *v > c.max_voltage || *v < c.min_voltage)
            {
                return BatteryStatus::Fault;
            }
        }

        let pack_temp_critical = s.temperature > c.max_temperature || s.temperature < c.min_temperature;
        let cell_out_of_range =
            |t: &f64| *t > c.max_temperature || *t < c.min_temperature;

        // Rule 3: pack-critical temperature. A uniform thermal event (all
        // cells out, spread <= 1.0°C) is CRITICAL; a mix of in/out cells is
        // a localized FAULT; all-out with a wide spread falls through.
        if pack_temp_critical {
            if s.cell_temperatures.is_empty() {
                return BatteryStatus::Critical;
            }
            let max_t = s.cell_temperatures.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let min_t = s.cell_temperatures.iter().cloned().fold(f64::INFINITY, f64::min);
            let spread = max_t - min_t;
            let all_out = s.cell_temperatures.iter().all(cell_out_of_range);
            if all_out && spread <= 1.0 {
                return BatteryStatus::Critical;
            }
            let any_out = s.cell_temperatures.iter().any(cell_out_of_range);
            if any_out && !all_out {
                return BatteryStatus::Fault;
            }
        }

        // Rule 4: pack temperature fine but individual cells out of range
        if !pack_temp_critical && s.cell_temperatures.iter().any(cell_out_of_range) {
            return BatteryStatus::Fault;
        }

        // Rule 5: warnings near the limits
        if s.temperature > c.max_temperature * 0.9
            || s.temperature < c.min_temperature * 1.1
            || s.soc < 10.0
            || s.soc > 90.0
        {
            return BatteryStatus::Warning;
        }

        // Rule 6: flow direction
        if s.current > 0.1 {
            return BatteryStatus::Charging;
        }
        if s.current < -0.1 {
            return BatteryStatus::Discharging;
        }

        BatteryStatus::Healthy
    }

    fn emit_status(&self) {
        let Some(protocol) = &self.can_protocol else {
            return;
        };

        if let Err(e) = protocol.send_battery_status(
            self.state.voltage,
            self.state.current,
            self.state.temperature,
            self.state.soc,
        ) {
            protocol.log_send_failure("battery status", &e);
        }

        for (i, temp) in self.state.cell_group_temperatures.iter().enumerate() {
            if let Err(e) = protocol.send_temperature_reading(i as u16, *temp) {
                protocol.log_send_failure("cell group temperature", &e);
            }
        }
        if let Some(inlet) = self.state.coolant_inlet_temperature {
            if let Err(e) = protocol.send_temperature_reading(COOLANT_INLET_SENSOR, inlet) {
                protocol.log_send_failure("coolant inlet temperature", &e);
            }
        }
        if let Some(outlet) = self.state.coolant_outlet_temperature {
            if let Err(e) = protocol.send_temperature_reading(COOLANT_OUTLET_SENSOR, outlet) {
                protocol.log_send_failure("coolant outlet temperature", &e);
            }
        }
    }

    /// Whether the pack accepts charge at the requested power
    pub fn can_charge(&self, requested_power_kw: f64) -> bool {
        if self.state.status.is_fault() {
            return false;
        }
        if requested_power_kw > self.config.max_charge_rate_kw {
            return false;
        }
        if self.state.soc >= self.config.max_soc {
            return false;
        }
        true
    }

    /// Whether the pack can deliver the requested discharge power
    pub fn can_discharge(&self, requested_power_kw: f64) -> bool {
        if self.state.status.is_fault() {
            return false;
        }
        if requested_power_kw > self.config.max_discharge_rate_kw {
            return false;
        }
        if self.state.soc <= self.config.min_soc {
            return false;
        }
        true
    }

    /// Read-only snapshot of the current state
    pub fn state(&self) -> BatteryState {
        self.state.clone()
    }

    /// Battery configuration
    pub fn config(&self) -> &BatteryConfig {
        &self.config
    }

    /// Lifetime statistics
    pub fn statistics(&self) -> BatteryStats {
        self.stats.clone()
    }

    /// Aggregated health summary
    pub fn health_report(&self) -> HealthReport {
        let (min_v, max_v) = if self.state.cell_voltages.is_empty() {
            (0.0, 0.0)
        } else {
            (
                self.state.cell_voltages.iter().cloned().fold(f64::INFINITY, f64::min),
                self.state.cell_voltages.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            )
        };
        let average = if self.config.cell_count > 0 {
            self.state.voltage / self.config.cell_count as f64
        } else {
            0.0
        };

        HealthReport {
            soh: self.state.soh,
            soc: self.state.soc,
            status: self.state.status,
            fault_count: self.stats.fault_count,
            charge_cycles: self.stats.charge_cycles,
            temperature: self.state.temperature,
            min_cell_voltage: min_v,
            max_cell_voltage: max_v,
            average_cell_voltage: average,
        }
    }
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
