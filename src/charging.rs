//! Charging session engine for Auriga
//!
//! Lifecycle of one charge session: connector plug/unplug, admission
//! checks against the battery and the motor controller, AC/DC power
//! negotiation, pause/resume with replayed session parameters, and
//! ordered safety cutoffs. A cutoff halts power delivery immediately and
//! latches ERROR until the cable is pulled.

use crate::battery::{BatteryManager, BatteryState};
use crate::can::EvCanProtocol;
use crate::config::ChargingConfig;
use crate::error::{AurigaError, Result};
use crate::logging::{get_logger, LogContext, StructuredLogger};
use crate::motor::{MotorState, SharedActuator};
use crate::temperature::TemperatureProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Sensor index for the charging port temperature probe
const CHARGING_PORT_SENSOR: u16 = 0xE0;
/// Sensor index for the connector temperature probe
const CHARGING_CONNECTOR_SENSOR: u16 = 0xE1;

/// Charging session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeState {
    Disconnected,
    Idle,
    Connected,
    ChargingAc,
    ChargingDc,
    Paused,
    Complete,
    Error,
    Fault,
}

impl ChargeState {
    pub fn is_charging(self) -> bool {
        matches!(self, ChargeState::ChargingAc | ChargeState::ChargingDc)
    }
}

/// Physical connector standards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorType {
    Ccs1,
    Ccs2,
    Chademo,
    Tesla,
    Type2,
}

impl ConnectorType {
    /// Whether the connector carries DC fast charging
    pub fn supports_fast_charge(self) -> bool {
        !matches!(self, ConnectorType::Type2)
    }

    /// Parse the config-file spelling of a connector name
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "CCS1" => Ok(ConnectorType::Ccs1),
            "CCS2" => Ok(ConnectorType::Ccs2),
            "CHADEMO" => Ok(ConnectorType::Chademo),
            "TESLA" => Ok(ConnectorType::Tesla),
            "TYPE2" => Ok(ConnectorType::Type2),
            other => Err(AurigaError::config(format!(
                "Unknown connector type: {other}"
            ))),
        }
    }
}

/// Readings pushed into an update cycle. Missing fields are back-filled
/// from the battery snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChargingSample {
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub temperature: Option<f64>,
}

/// One charge session's bookkeeping; parameters are kept so a resume can
/// replay the original admission request
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChargingSession {
    id: Uuid,
    started_at: f64,
    elapsed_s: f64,
    energy_delivered_kwh: f64,
    soc_at_start: f64,
    target_soc: f64,
    power_kw: f64,
    dc: bool,
}

/// Snapshot of the charging system for other engines and telemetry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargingStatus {
    pub state: ChargeState,
    pub connector: ConnectorType,
    pub session_id: Option<Uuid>,
    pub voltage_v: f64,
    pub current_a: f64,
    pub power_kw: f64,
    pub energy_delivered_kwh: f64,
    pub elapsed_s: f64,
    pub soc_at_start: f64,
    pub target_soc: f64,
    pub fast_charge: bool,
    pub temperature_c: f64,
    pub port_temperature_c: Option<f64>,
    pub connector_temperature_c: Option<f64>,
    pub error_code: Option<String>,
    pub timestamp: f64,
}

/// Lifetime charging statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChargingStats {
    pub sessions_started: u64,
    pub sessions_completed: u64,
    pub total_energy_delivered_kwh: f64,
    pub fault_count: u64,
}

/// Charging session engine.
pub struct ChargingSystem {
    config: ChargingConfig,
    state: ChargeState,
    connector: ConnectorType,
    session: Option<ChargingSession>,
    voltage_v: f64,
    current_a: f64,
    power_kw: f64,
    temperature_c: f64,
    port_temperature_c: Option<f64>,
    connector_temperature_c: Option<f64>,
    fast_charge: bool,
    error_code: Option<String>,
    timestamp: f64,
    stats: ChargingStats,
    actuator: Option<SharedActuator>,
    temperature_provider: Option<Arc<dyn TemperatureProvider>>,
    can_protocol: Option<Arc<EvCanProtocol>>,
    logger: StructuredLogger,
}

impl ChargingSystem {
    /// Create the engine unplugged with the configured connector
    pub fn new(config: ChargingConfig) -> Result<Self> {
        let connector = ConnectorType::from_name(&config.connector_type)?;
        let logger = get_logger("charging");
        logger.info(&format!(
            "Charging engine initialized: {:?}, AC {}kW / DC {}kW",
            connector, config.ac_max_power_kw, config.dc_max_power_kw
        ));

        Ok(Self {
            config,
            state: ChargeState::Disconnected,
            connector,
            session: None,
            voltage_v: 0.0,
            current_a: 0.0,
            power_kw: 0.0,
            temperature_c: 0.0,
            port_temperature_c: None,
            connector_temperature_c: None,
            fast_charge: false,
            error_code: None,
            timestamp: now_secs(),
            stats: ChargingStats::default(),
            actuator: None,
            temperature_provider: None,
            can_protocol: None,
            logger,
        })
    }

    /// Attach an external temperature provider for port/connector probes
    pub fn with_temperature_provider(mut self, provider: Arc<dyn TemperatureProvider>) -> Self {
        self.temperature_provider = Some(provider);
        self
    }

    /// Attach a CAN protocol for charger status frame emission
    pub fn with_can_protocol(mut self, protocol: Arc<EvCanProtocol>) -> Self {
        self.can_protocol = Some(protocol);
        self
    }

    /// Attach the motor controller so charging can interlock against it
    pub fn with_actuator(mut self, actuator: SharedActuator) -> Self {
        self.actuator = Some(actuator);
        self
    }

    /// Plug in a cable. Refused while a session is delivering power or
    /// while the motor is running; returns whether the connector was
    /// accepted. Re-plugging an already connected cable is allowed.
    pub fn connect(&mut self, connector: ConnectorType) -> bool {
        if self.state.is_charging() {
            self.logger
                .warn(&format!("Connect rejected in state {:?}", self.state));
            return false;
        }
        if let Some(actuator) = &self.actuator {
            let mut motor = actuator.lock();
            if motor.is_connected()
                && matches!(
                    motor.status().state,
                    MotorState::Running | MotorState::Braking
                )
            {
                drop(motor);
                self.logger
                    .error("Connect rejected: motor is running");
                return false;
            }
        }
        self.connector = connector;
        self.state = ChargeState::Connected;
        self.logger.info(&format!("Connector plugged in: {connector:?}"));
        true
    }

    /// Pull the cable. Halts any active session, clears a latched error,
    /// and drops the last measured readings.
    pub fn disconnect(&mut self) -> bool {
        if self.state == ChargeState::Disconnected {
            return false;
        }
        if self.state.is_charging() || self.state == ChargeState::Paused {
            self.logger.warn("Cable pulled during an active session");
        }
        self.halt_power();
        self.session = None;
        self.error_code = None;
        self.voltage_v = 0.0;
        self.temperature_c = 0.0;
        self.port_temperature_c = None;
        self.connector_temperature_c = None;
        self.fast_charge = false;
        self.state = ChargeState::Disconnected;
        self.logger.info("Connector unplugged");
        self.logger = get_logger("charging");
        true
    }

    /// Begin a session. Admission order: entry state, battery headroom
    /// (BMS_REJECTED on refusal), target already reached, motor health
    /// (MOTOR_FAULT). `power_kw` of `None` resolves to the lower of the
    /// AC/DC limit and the battery's charge rate; an explicit request is
    /// passed to the battery unclamped. `fast` of `None` follows the
    /// config; DC falls back to AC on a connector without fast charge.
    pub fn start_charging(
        &mut self,
        battery: &BatteryManager,
        power_kw: Option<f64>,
        target_soc: f64,
        fast: Option<bool>,
    ) -> bool {
        if !matches!(
            self.state,
            ChargeState::Connected | ChargeState::Idle | ChargeState::Paused
        ) {
            self.logger
                .warn(&format!("Start rejected in state {:?}", self.state));
            return false;
        }

        let fast = fast.unwrap_or(self.config.fast_charge_enabled);
        let dc = fast && self.connector.supports_fast_charge();

        let power_kw = power_kw.unwrap_or_else(|| {
            let limit = if dc {
                self.config.dc_max_power_kw
            } else {
                self.config.ac_max_power_kw
            };
            limit.min(battery.config().max_charge_rate_kw)
        });

        if !battery.can_charge(power_kw) {
            self.halt_power();
            self.state = ChargeState::Error;
            self.error_code = Some("BMS_REJECTED".to_string());
            self.logger
                .error(&format!("Battery refused charging at {power_kw:.1} kW"));
            return false;
        }

        let soc = battery.state().soc;
        if soc >= target_soc {
            self.state = ChargeState::Complete;
            self.logger
                .info(&format!("Battery already at target SOC: {soc:.1}%"));
            return false;
        }

        if let Some(actuator) = &self.actuator {
            let mut motor = actuator.lock();
            if motor.is_connected() && !motor.is_healthy() {
                drop(motor);
                self.halt_power();
                self.state = ChargeState::Error;
                self.error_code = Some("MOTOR_FAULT".to_string());
                self.logger
                    .error("Motor controller unhealthy, cannot start charging");
                return false;
            }
        }

        let resuming = self.state == ChargeState::Paused && self.session.is_some();
        if resuming {
            // Same session id, fresh counters
            if let Some(session) = &mut self.session {
                session.elapsed_s = 0.0;
                session.energy_delivered_kwh = 0.0;
                session.soc_at_start = soc;
                session.target_soc = target_soc;
                session.power_kw = power_kw;
                session.dc = dc;
            }
        } else {
            let session = ChargingSession {
                id: Uuid::new_v4(),
                started_at: now_secs(),
                elapsed_s: 0.0,
                energy_delivered_kwh: 0.0,
                soc_at_start: soc,
                target_soc,
                power_kw,
                dc,
            };
            self.logger = crate::logging::get_logger_with_context(
                LogContext::new("charging").with_session_id(session.id.to_string()),
            );
            self.session = Some(session);
            self.stats.sessions_started += 1;
        }

        self.power_kw = power_kw;
        self.fast_charge = dc;
        self.error_code = None;
        self.state = if dc {
            ChargeState::ChargingDc
        } else {
            ChargeState::ChargingAc
        };
        self.logger.info(&format!(
            "Charging started: {:.1} kW {}, target SOC {:.1}%",
            power_kw,
            if dc { "DC" } else { "AC" },
            target_soc
        ));
        true
    }

    /// Stop delivering power and close the session; returns whether a
    /// session was actually delivering power.
    pub fn stop_charging(&mut self) -> bool {
        if !self.state.is_charging() {
            return false;
        }
        self.halt_power();
        self.state = ChargeState::Connected;
        self.session = None;
        self.logger.info("Charging stopped");
        self.logger = get_logger("charging");
        true
    }

    /// Suspend power delivery while keeping the session open
    pub fn pause_charging(&mut self) -> bool {
        if !self.state.is_charging() {
            return false;
        }
        self.halt_power();
        self.state = ChargeState::Paused;
        self.logger.info("Charging paused");
        true
    }

    /// Re-run admission with the recorded session parameters. The session
    /// keeps its id but its counters start over.
    pub fn resume_charging(&mut self, battery: &BatteryManager) -> bool {
        if self.state != ChargeState::Paused {
            return false;
        }
        let Some(session) = &self.session else {
            self.state = ChargeState::Connected;
            return false;
        };
        let (power_kw, target_soc, dc) = (session.power_kw, session.target_soc, session.dc);
        self.start_charging(battery, Some(power_kw), target_soc, Some(dc))
    }

    /// Advance the session using wall-clock time
    pub fn update(&mut self, sample: ChargingSample, battery: &BatteryState) -> ChargingStatus {
        self.update_at(now_secs(), sample, battery)
    }

    /// Advance the session at an explicit instant (epoch seconds).
    ///
    /// Refreshes the measured readings (explicit sample fields win,
    /// everything else back-fills from the battery snapshot), derives the
    /// delivered power from voltage and current, and while charging
    /// integrates energy, completes at the target SOC, and runs the
    /// safety cutoffs.
    pub fn update_at(
        &mut self,
        now: f64,
        sample: ChargingSample,
        battery: &BatteryState,
    ) -> ChargingStatus {
        let dt = (now - self.timestamp).max(0.0);
        self.timestamp = now;

        self.voltage_v = sample.voltage.unwrap_or(battery.voltage);
        self.current_a = sample.current.unwrap_or(battery.current);
        self.temperature_c = sample.temperature.unwrap_or(battery.temperature);

        if let Some(provider) = &self.temperature_provider {
            let probes = provider.charging_temperatures();
            if probes.port.is_some() {
                self.port_temperature_c = probes.port;
            }
            if probes.connector.is_some() {
                self.connector_temperature_c = probes.connector;
            }
            // The port probe stands in for the charging temperature when
            // no explicit reading arrived
            if sample.temperature.is_none() {
                if let Some(port) = self.port_temperature_c {
                    self.temperature_c = port;
                }
            }
        }

        self.power_kw = (self.voltage_v * self.current_a).abs() / 1000.0;

        if self.state.is_charging() {
            let energy_kwh = self.power_kw * dt / 3600.0;
            self.stats.total_energy_delivered_kwh += energy_kwh;

            let mut completed_kwh = None;
            if let Some(session) = &mut self.session {
                session.energy_delivered_kwh += energy_kwh;
                session.elapsed_s += dt;
                if battery.soc >= session.target_soc {
                    completed_kwh = Some(session.energy_delivered_kwh);
                }
            }
            if let Some(kwh) = completed_kwh {
                self.halt_power();
                self.state = ChargeState::Complete;
                self.stats.sessions_completed += 1;
                self.logger
                    .info(&format!("Charging complete: {kwh:.2} kWh delivered"));
            }

            // A breach overrides a completion reached on the same tick
            if let Some(code) = self.check_cutoffs() {
                self.trip_cutoff(code);
            }
        }

        self.emit_status();
        self.status()
    }

    /// First-breach-wins safety checks against the measured readings,
    /// evaluated in severity order
    fn check_cutoffs(&self) -> Option<&'static str> {
        let max_temp = self.config.max_temperature_c;

        if self.port_temperature_c.is_some_and(|t| t > max_temp) {
            return Some("PORT_OVERTEMPERATURE");
        }
        if self.connector_temperature_c.is_some_and(|t| t > max_temp) {
            return Some("CONNECTOR_OVERTEMPERATURE");
        }
        if self.temperature_c > max_temp {
            return Some("OVERTEMPERATURE");
        }
        if self.voltage_v > self.config.max_voltage_v {
            return Some("OVERVOLTAGE");
        }
        if self.voltage_v > 0.0 && self.voltage_v < self.config.min_voltage_v {
            return Some("UNDERVOLTAGE");
        }
        None
    }

    /// Halt power delivery and latch ERROR with the breach code. Recovery
    /// requires pulling the cable.
    fn trip_cutoff(&mut self, code: &'static str) {
        self.halt_power();
        self.state = ChargeState::Error;
        self.error_code = Some(code.to_string());
        self.stats.fault_count += 1;
        self.logger.error(&format!("Safety cutoff tripped: {code}"));
    }

    /// Report an external hardware fault (actuator or bus failure)
    pub fn declare_fault(&mut self, reason: &str) {
        self.halt_power();
        self.state = ChargeState::Fault;
        self.error_code = Some(reason.to_string());
        self.stats.fault_count += 1;
        self.logger.error(&format!("Hardware fault: {reason}"));
    }

    fn halt_power(&mut self) {
        self.power_kw = 0.0;
        self.current_a = 0.0;
    }

    fn emit_status(&self) {
        let Some(protocol) = &self.can_protocol else {
            return;
        };
        if let Err(e) = protocol.send_charger_status(self.voltage_v, self.current_a) {
            protocol.log_send_failure("charger status", &e);
        }
        if let Some(port) = self.port_temperature_c {
            if let Err(e) = protocol.send_temperature_reading(CHARGING_PORT_SENSOR, port) {
                protocol.log_send_failure("port temperature", &e);
            }
        }
        if let Some(connector) = self.connector_temperature_c {
            if let Err(e) = protocol.send_temperature_reading(CHARGING_CONNECTOR_SENSOR, connector)
            {
                protocol.log_send_failure("connector temperature", &e);
            }
        }
    }

    /// Seconds until the target SOC at the present power, or `None` when
    /// no power is flowing
    pub fn estimate_time_remaining(&self, battery: &BatteryManager) -> Option<f64> {
        if !self.state.is_charging() || self.power_kw <= 0.0 {
            return None;
        }
        let session = self.session.as_ref()?;
        let soc = battery.state().soc;
        if soc >= session.target_soc {
            return Some(0.0);
        }
        let remaining_kwh =
            (session.target_soc - soc) / 100.0 * battery.config().capacity_kwh;
        Some(remaining_kwh / self.power_kw * 3600.0)
    }

    pub fn is_charging(&self) -> bool {
        self.state.is_charging()
    }

    pub fn is_connected(&self) -> bool {
        !matches!(self.state, ChargeState::Disconnected | ChargeState::Idle)
    }

    /// No latched error and the measured readings inside the limits
    pub fn is_healthy(&self) -> bool {
        if matches!(self.state, ChargeState::Error | ChargeState::Fault) {
            return false;
        }
        if self.temperature_c > self.config.max_temperature_c {
            return false;
        }
        if self.voltage_v > self.config.max_voltage_v {
            return false;
        }
        true
    }

    pub fn state(&self) -> ChargeState {
        self.state
    }

    /// Delivered power in kW, derived from the measured readings
    pub fn power_kw(&self) -> f64 {
        self.power_kw
    }

    /// Charge current in A as seen by the battery (positive into the pack)
    pub fn current_a(&self) -> f64 {
        self.current_a
    }

    /// Admission power setpoint of the active session in kW; zero when no
    /// session is delivering power
    pub fn commanded_power_kw(&self) -> f64 {
        if !self.state.is_charging() {
            return 0.0;
        }
        self.session.as_ref().map(|s| s.power_kw).unwrap_or(0.0)
    }

    /// Read-only snapshot for telemetry and the vehicle controller
    pub fn status(&self) -> ChargingStatus {
        ChargingStatus {
            state: self.state,
            connector: self.connector,
            session_id: self.session.as_ref().map(|s| s.id),
            voltage_v: self.voltage_v,
            current_a: self.current_a,
            power_kw: self.power_kw,
            energy_delivered_kwh: self
                .session
                .as_ref()
                .map(|s| s.energy_delivered_kwh)
                .unwrap_or(0.0),
            elapsed_s: self.session.as_ref().map(|s| s.elapsed_s).unwrap_or(0.0),
            soc_at_start: self.session.as_ref().map(|s| s.soc_at_start).unwrap_or(0.0),
            target_soc: self.session.as_ref().map(|s| s.target_soc).unwrap_or(0.0),
            fast_charge: self.fast_charge,
            temperature_c: self.temperature_c,
            port_temperature_c: self.port_temperature_c,
            connector_temperature_c: self.connector_temperature_c,
            error_code: self.error_code.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Lifetime statistics
    pub fn statistics(&self) -> ChargingStats {
        self.stats.clone()
    }
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::{BatteryManager, BatterySample};
    use crate::config::{BatteryConfig, ChargingConfig};
    use crate::motor::{Actuator, MotorLimits, SimulatedActuator};
    use crate::temperature::{ChargingTemperatures, StaticTemperatureProvider};
    use parking_lot::Mutex;

    fn battery_at(soc_voltage: f64) -> BatteryManager {
        // Current held at zero so the voltage fallback pins the SOC
        let mut bms = BatteryManager::new(BatteryConfig::default());
        bms.update_at(
            1.0,
            BatterySample {
                voltage: Some(soc_voltage),
                current: Some(0.0),
                temperature: Some(25.0),
                ..BatterySample::default()
            },
        );
        bms
    }

    fn charger() -> ChargingSystem {
        ChargingSystem::new(ChargingConfig::default()).unwrap()
    }

    fn motor() -> SharedActuator {
        let mut actuator = SimulatedActuator::new(MotorLimits::default());
        actuator.connect();
        Arc::new(Mutex::new(Box::new(actuator) as Box<dyn Actuator>))
    }

    #[test]
    fn test_connector_fast_charge_capability() {
        assert!(ConnectorType::Ccs2.supports_fast_charge());
        assert!(ConnectorType::Chademo.supports_fast_charge());
        assert!(ConnectorType::Tesla.supports_fast_charge());
        assert!(!ConnectorType::Type2.supports_fast_charge());
    }

    #[test]
    fn test_connector_parsing() {
        assert_eq!(
            ConnectorType::from_name("ccs2").unwrap(),
            ConnectorType::Ccs2
        );
        assert!(ConnectorType::from_name("J1772").is_err());
    }

    #[test]
    fn test_session_lifecycle() {
        let bms = battery_at(345.6); // ~50% SOC
        let mut cs = charger();
        assert_eq!(cs.state(), ChargeState::Disconnected);

        assert!(!cs.start_charging(&bms, Some(11.0), 100.0, Some(false))); // not plugged in
        assert!(cs.connect(ConnectorType::Ccs2));
        assert!(cs.start_charging(&bms, Some(11.0), 100.0, Some(false)));
        assert_eq!(cs.state(), ChargeState::ChargingAc);
        assert!(cs.status().session_id.is_some());
        assert!(!cs.status().fast_charge);

        assert!(cs.stop_charging());
        assert_eq!(cs.state(), ChargeState::Connected);
        assert!(!cs.stop_charging()); // idempotent
        assert_eq!(cs.state(), ChargeState::Connected);
    }

    #[test]
    fn test_replug_while_connected_allowed() {
        let mut cs = charger();
        assert!(cs.connect(ConnectorType::Type2));
        assert!(cs.connect(ConnectorType::Ccs2));
        assert_eq!(cs.status().connector, ConnectorType::Ccs2);
    }

    #[test]
    fn test_connect_refused_while_charging() {
        let bms = battery_at(345.6);
        let mut cs = charger();
        cs.connect(ConnectorType::Ccs2);
        assert!(cs.start_charging(&bms, Some(11.0), 100.0, Some(false)));
        assert!(!cs.connect(ConnectorType::Type2));
        assert_eq!(cs.status().connector, ConnectorType::Ccs2);
    }

    #[test]
    fn test_connect_refused_while_motor_running() {
        let actuator = motor();
        assert!(actuator.lock().set_current(50.0));
        assert_eq!(actuator.lock().status().state, MotorState::Running);

        let mut cs = charger().with_actuator(Arc::clone(&actuator));
        assert!(!cs.connect(ConnectorType::Ccs2));
        assert_eq!(cs.state(), ChargeState::Disconnected);

        // Interlock clears once the motor stops
        assert!(actuator.lock().stop());
        assert!(cs.connect(ConnectorType::Ccs2));
    }

    #[test]
    fn test_unhealthy_motor_blocks_start() {
        let mut sim = SimulatedActuator::new(MotorLimits::default());
        sim.connect();
        // Over the motor temperature limit
        sim.inject_measurements(0.0, 350.0, 100.0);
        let actuator: SharedActuator = Arc::new(Mutex::new(Box::new(sim) as Box<dyn Actuator>));

        let bms = battery_at(345.6);
        let mut cs = charger().with_actuator(Arc::clone(&actuator));
        cs.connect(ConnectorType::Ccs2);
        assert!(!cs.start_charging(&bms, Some(11.0), 100.0, Some(false)));
        assert_eq!(cs.state(), ChargeState::Error);
        assert_eq!(cs.status().error_code.as_deref(), Some("MOTOR_FAULT"));
    }

    #[test]
    fn test_bms_rejection_latches_error() {
        let bms = battery_at(403.2); // 4.2 V/cell -> 100% SOC, no headroom
        let mut cs = charger();
        cs.connect(ConnectorType::Ccs2);
        assert!(!cs.start_charging(&bms, Some(11.0), 100.0, Some(false)));
        assert_eq!(cs.state(), ChargeState::Error);
        assert_eq!(cs.status().error_code.as_deref(), Some("BMS_REJECTED"));
    }

    #[test]
    fn test_oversized_request_rejected_by_battery() {
        // Explicit power is not clamped; admission is the battery's call
        let bms = battery_at(345.6);
        let mut cs = charger();
        cs.connect(ConnectorType::Ccs2);
        assert!(!cs.start_charging(&bms, Some(500.0), 100.0, Some(true)));
        assert_eq!(cs.status().error_code.as_deref(), Some("BMS_REJECTED"));
    }

    #[test]
    fn test_target_already_reached_goes_complete() {
        let bms = battery_at(345.6); // ~50% SOC
        let mut cs = charger();
        cs.connect(ConnectorType::Ccs2);
        assert!(!cs.start_charging(&bms, Some(11.0), 40.0, Some(false)));
        assert_eq!(cs.state(), ChargeState::Complete);
    }

    #[test]
    fn test_dc_falls_back_to_ac_on_type2() {
        let bms = battery_at(345.6);
        let mut cs = charger();
        cs.connect(ConnectorType::Type2);
        assert!(cs.start_charging(&bms, Some(11.0), 100.0, Some(true)));
        assert_eq!(cs.state(), ChargeState::ChargingAc);
        assert!(!cs.status().fast_charge);
    }

    #[test]
    fn test_default_power_resolution() {
        let bms = battery_at(345.6);

        // DC: min(dc_max_power_kw, battery charge rate) = 150 kW
        let mut cs = charger();
        cs.connect(ConnectorType::Ccs2);
        assert!(cs.start_charging(&bms, None, 100.0, Some(true)));
        assert_eq!(cs.state(), ChargeState::ChargingDc);
        assert!((cs.commanded_power_kw() - 150.0).abs() < 1e-9);

        // AC: min(ac_max_power_kw, battery charge rate) = 11 kW
        let mut cs = charger();
        cs.connect(ConnectorType::Ccs2);
        assert!(cs.start_charging(&bms, None, 100.0, Some(false)));
        assert!((cs.commanded_power_kw() - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_port_overtemperature_cutoff() {
        let provider = StaticTemperatureProvider {
            charging: ChargingTemperatures {
                port: Some(70.0),
                connector: Some(30.0),
            },
            ..StaticTemperatureProvider::default()
        };
        let bms = battery_at(345.6);
        let mut cs = charger().with_temperature_provider(Arc::new(provider));
        cs.connect(ConnectorType::Ccs2);
        assert!(cs.start_charging(&bms, Some(11.0), 100.0, Some(false)));

        let status = cs.update_at(2.0, ChargingSample::default(), &bms.state());
        assert_eq!(cs.state(), ChargeState::Error);
        assert_eq!(status.error_code.as_deref(), Some("PORT_OVERTEMPERATURE"));
        assert_eq!(status.port_temperature_c, Some(70.0));
        assert_eq!(cs.power_kw(), 0.0);
        assert_eq!(cs.current_a(), 0.0);

        // Latched until the cable is pulled
        assert!(!cs.is_healthy());
        assert!(cs.disconnect());
        assert!(cs.is_healthy());
        assert!(cs.status().error_code.is_none());
    }

    #[test]
    fn test_cutoff_ordering_port_before_overvoltage() {
        let provider = StaticTemperatureProvider {
            charging: ChargingTemperatures {
                port: Some(70.0),
                connector: Some(70.0),
            },
            ..StaticTemperatureProvider::default()
        };
        let bms = battery_at(345.6);
        let mut cs = charger().with_temperature_provider(Arc::new(provider));
        cs.connect(ConnectorType::Ccs2);
        assert!(cs.start_charging(&bms, Some(11.0), 100.0, Some(false)));

        // Overvoltage too, but the port breach is reported
        cs.update_at(
            2.0,
            ChargingSample {
                voltage: Some(600.0),
                ..ChargingSample::default()
            },
            &bms.state(),
        );
        assert_eq!(cs.status().error_code.as_deref(), Some("PORT_OVERTEMPERATURE"));
    }

    #[test]
    fn test_undervoltage_only_when_positive() {
        let bms = battery_at(345.6);
        let mut cs = charger();
        cs.connect(ConnectorType::Ccs2);
        assert!(cs.start_charging(&bms, Some(11.0), 100.0, Some(false)));

        // Zero voltage means no reading, not an undervoltage breach
        cs.update_at(
            2.0,
            ChargingSample {
                voltage: Some(0.0),
                current: Some(1.0),
                ..ChargingSample::default()
            },
            &bms.state(),
        );
        assert!(cs.is_charging());

        cs.update_at(
            3.0,
            ChargingSample {
                voltage: Some(200.0),
                current: Some(1.0),
                ..ChargingSample::default()
            },
            &bms.state(),
        );
        assert_eq!(cs.status().error_code.as_deref(), Some("UNDERVOLTAGE"));
    }

    #[test]
    fn test_measured_readings_back_fill_from_battery() {
        let bms = battery_at(345.6);
        let mut cs = charger();
        cs.connect(ConnectorType::Ccs2);
        assert!(cs.start_charging(&bms, Some(11.0), 100.0, Some(false)));

        // Explicit current, voltage and temperature from the battery
        let status = cs.update_at(
            2.0,
            ChargingSample {
                current: Some(30.0),
                ..ChargingSample::default()
            },
            &bms.state(),
        );
        assert!((status.voltage_v - 345.6).abs() < 1e-9);
        assert!((status.current_a - 30.0).abs() < 1e-9);
        assert!((status.temperature_c - 25.0).abs() < 1e-9);
        assert!((status.power_kw - 345.6 * 30.0 / 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_pause_resume_replays_parameters() {
        let bms = battery_at(345.6);
        let mut cs = charger();
        cs.connect(ConnectorType::Ccs2);
        assert!(cs.start_charging(&bms, Some(150.0), 100.0, Some(true)));
        let original_id = cs.status().session_id;

        assert!(cs.pause_charging());
        assert_eq!(cs.state(), ChargeState::Paused);
        assert_eq!(cs.power_kw(), 0.0);

        assert!(cs.resume_charging(&bms));
        assert_eq!(cs.state(), ChargeState::ChargingDc);
        assert!((cs.commanded_power_kw() - 150.0).abs() < 1e-9);
        assert_eq!(cs.status().session_id, original_id);
        assert_eq!(cs.statistics().sessions_started, 1);
    }

    #[test]
    fn test_energy_integration_and_estimate() {
        let bms = battery_at(345.6);
        let mut cs = charger();
        cs.connect(ConnectorType::Ccs2);
        cs.update_at(1.0, ChargingSample::default(), &bms.state());
        assert!(cs.start_charging(&bms, Some(11.0), 100.0, Some(false)));

        // One hour at the current that makes 11 kW at 345.6 V
        let amps = 11_000.0 / 345.6;
        cs.update_at(
            3601.0,
            ChargingSample {
                current: Some(amps),
                ..ChargingSample::default()
            },
            &bms.state(),
        );
        let status = cs.status();
        assert!((status.energy_delivered_kwh - 11.0).abs() < 0.1);
        assert!((status.elapsed_s - 3600.0).abs() < 1.0);

        // ~50% of 75 kWh left at 11 kW
        let eta = cs.estimate_time_remaining(&bms).unwrap();
        let expected = 0.5 * 75.0 / 11.0 * 3600.0;
        assert!((eta - expected).abs() / expected < 0.02, "eta={eta}");
    }

    #[test]
    fn test_completion_at_target_soc() {
        let mut bms = battery_at(345.6);
        let mut cs = charger();
        cs.connect(ConnectorType::Ccs2);
        cs.update_at(1.0, ChargingSample::default(), &bms.state());
        assert!(cs.start_charging(&bms, Some(11.0), 100.0, Some(false)));

        bms.update_at(
            2.0,
            BatterySample {
                voltage: Some(403.2), // full
                current: Some(0.0),
                temperature: Some(25.0),
                ..BatterySample::default()
            },
        );
        cs.update_at(2.0, ChargingSample::default(), &bms.state());
        assert_eq!(cs.state(), ChargeState::Complete);
        assert_eq!(cs.statistics().sessions_completed, 1);
    }

    #[test]
    fn test_is_healthy_checks_measured_limits() {
        let bms = battery_at(345.6);
        let mut cs = charger();
        cs.connect(ConnectorType::Ccs2);
        assert!(cs.is_healthy());

        cs.update_at(
            2.0,
            ChargingSample {
                temperature: Some(75.0),
                ..ChargingSample::default()
            },
            &bms.state(),
        );
        assert!(!cs.is_healthy());

        cs.update_at(
            3.0,
            ChargingSample {
                voltage: Some(550.0),
                temperature: Some(25.0),
                ..ChargingSample::default()
            },
            &bms.state(),
        );
        assert!(!cs.is_healthy());

        cs.update_at(4.0, ChargingSample::default(), &bms.state());
        assert!(cs.is_healthy());
    }
}
