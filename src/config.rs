//! Configuration management for Auriga
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. Every engine receives its configuration once
//! at construction; nothing mutates it afterwards.

use crate::error::{AurigaError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_true() -> bool {
    true
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Battery pack parameters and limits
    pub battery: BatteryConfig,

    /// Charging system parameters and safety limits
    pub charging: ChargingConfig,

    /// Vehicle physical limits
    pub vehicle: VehicleConfig,

    /// CAN bus configuration
    pub can: CanConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Control tick interval in milliseconds
    pub tick_interval_ms: u64,
}

/// Battery pack configuration, immutable after construction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    /// Usable pack capacity in kWh
    pub capacity_kwh: f64,

    /// Maximum charge rate in kW
    pub max_charge_rate_kw: f64,

    /// Maximum discharge rate in kW
    pub max_discharge_rate_kw: f64,

    /// Nominal pack voltage in V
    pub nominal_voltage: f64,

    /// Number of cells in the pack
    pub cell_count: usize,

    /// Minimum cell voltage in V
    pub min_voltage: f64,

    /// Maximum cell voltage in V
    pub max_voltage: f64,

    /// Minimum operating temperature in °C
    pub min_temperature: f64,

    /// Maximum operating temperature in °C
    pub max_temperature: f64,

    /// Lower SOC bound in percent
    pub min_soc: f64,

    /// Upper SOC bound in percent
    pub max_soc: f64,
}

/// Charging system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargingConfig {
    /// Maximum AC charging power in kW
    pub ac_max_power_kw: f64,

    /// Maximum DC (fast) charging power in kW
    pub dc_max_power_kw: f64,

    /// Default connector type (CCS1, CCS2, CHAdeMO, Tesla, Type2)
    pub connector_type: String,

    /// Whether DC fast charging is allowed at all
    #[serde(default = "default_true")]
    pub fast_charge_enabled: bool,

    /// Maximum charging temperature in °C
    pub max_temperature_c: f64,

    /// Maximum charging voltage in V
    pub max_voltage_v: f64,

    /// Minimum charging voltage in V
    pub min_voltage_v: f64,
}

/// Vehicle physical limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Maximum speed in km/h
    pub max_speed_kmh: f64,

    /// Maximum acceleration in m/s²
    pub max_acceleration_ms2: f64,

    /// Maximum deceleration in m/s² (negative)
    pub max_deceleration_ms2: f64,

    /// Maximum drive power in kW
    pub max_power_kw: f64,

    /// Energy consumption per km in Wh
    pub efficiency_wh_per_km: f64,

    /// Vehicle mass in kg
    pub weight_kg: f64,
}

/// CAN bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanConfig {
    /// CAN channel name (e.g. can0)
    pub channel: String,

    /// Bitrate in bit/s
    pub bitrate: u32,

    /// Whether status frames are emitted at all
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file or directory
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            capacity_kwh: 75.0,
            max_charge_rate_kw: 150.0,
            max_discharge_rate_kw: 200.0,
            nominal_voltage: 400.0,
            cell_count: 96,
            min_voltage: 3.0,
            max_voltage: 4.2,
            min_temperature: 0.0,
            max_temperature: 45.0,
            min_soc: 0.0,
            max_soc: 100.0,
        }
    }
}

impl Default for ChargingConfig {
    fn default() -> Self {
        Self {
            ac_max_power_kw: 11.0,
            dc_max_power_kw: 150.0,
            connector_type: "CCS2".to_string(),
            fast_charge_enabled: true,
            max_temperature_c: 60.0,
            max_voltage_v: 500.0,
            min_voltage_v: 300.0,
        }
    }
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            max_speed_kmh: 120.0,
            max_acceleration_ms2: 3.0,
            max_deceleration_ms2: -5.0,
            max_power_kw: 150.0,
            efficiency_wh_per_km: 200.0,
            weight_kg: 1500.0,
        }
    }
}

impl Default for CanConfig {
    fn default() -> Self {
        Self {
            channel: "can0".to_string(),
            bitrate: 500_000,
            enabled: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/auriga.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            battery: BatteryConfig::default(),
            charging: ChargingConfig::default(),
            vehicle: VehicleConfig::default(),
            can: CanConfig::default(),
            logging: LoggingConfig::default(),
            tick_interval_ms: 100,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from default locations, falling back to defaults
    pub fn load() -> Result<Self> {
        let default_paths = [
            "auriga_config.yaml",
            "/data/auriga_config.yaml",
            "/etc/auriga/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let b = &self.battery;
        if b.capacity_kwh <= 0.0 {
            return Err(AurigaError::validation(
                "battery.capacity_kwh",
                "Must be positive",
            ));
        }
        if b.cell_count == 0 {
            return Err(AurigaError::validation(
                "battery.cell_count",
                "Must be greater than 0",
            ));
        }
        // Every bound pair must satisfy min < max
        if b.min_voltage >= b.max_voltage {
            return Err(AurigaError::validation(
                "battery.min_voltage",
                "Must be below battery.max_voltage",
            ));
        }
        if b.min_temperature >= b.max_temperature {
            return Err(AurigaError::validation(
                "battery.min_temperature",
                "Must be below battery.max_temperature",
            ));
        }
        if b.min_soc >= b.max_soc {
            return Err(AurigaError::validation(
                "battery.min_soc",
                "Must be below battery.max_soc",
            ));
        }
        if b.max_charge_rate_kw <= 0.0 || b.max_discharge_rate_kw <= 0.0 {
            return Err(AurigaError::validation(
                "battery.max_charge_rate_kw",
                "Rate limits must be positive",
            ));
        }

        let c = &self.charging;
        if c.min_voltage_v >= c.max_voltage_v {
            return Err(AurigaError::validation(
                "charging.min_voltage_v",
                "Must be below charging.max_voltage_v",
            ));
        }
        if c.ac_max_power_kw <= 0.0 || c.dc_max_power_kw <= 0.0 {
            return Err(AurigaError::validation(
                "charging.ac_max_power_kw",
                "Power limits must be positive",
            ));
        }

        let v = &self.vehicle;
        if v.max_speed_kmh <= 0.0 {
            return Err(AurigaError::validation(
                "vehicle.max_speed_kmh",
                "Must be positive",
            ));
        }
        if v.max_acceleration_ms2 <= 0.0 {
            return Err(AurigaError::validation(
                "vehicle.max_acceleration_ms2",
                "Must be positive",
            ));
        }
        if v.max_deceleration_ms2 >= 0.0 {
            return Err(AurigaError::validation(
                "vehicle.max_deceleration_ms2",
                "Must be negative",
            ));
        }
        if v.efficiency_wh_per_km <= 0.0 {
            return Err(AurigaError::validation(
                "vehicle.efficiency_wh_per_km",
                "Must be positive",
            ));
        }

        if self.tick_interval_ms == 0 {
            return Err(AurigaError::validation(
                "tick_interval_ms",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}
