//! Motor actuator capability for Auriga
//!
//! The drive motor is an external collaborator: the core only needs a thin
//! control surface (duty cycle, current, stop) and a status poll. The trait
//! keeps the engines independent of the concrete speed-controller driver;
//! [`SimulatedActuator`] mirrors the behavior of a VESC-class controller
//! running without hardware attached.

use crate::can::EvCanProtocol;
use crate::logging::get_logger;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Motor controller states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorState {
    Disconnected,
    Idle,
    Running,
    Braking,
    Error,
}

/// Motor status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotorStatus {
    /// Shaft speed in RPM (signed)
    pub speed_rpm: f64,

    /// Motor current in A (negative = braking)
    pub current_a: f64,

    /// Input voltage in V
    pub voltage_v: f64,

    /// Commanded duty cycle in [-1, 1]
    pub duty_cycle: f64,

    /// Controller temperature in °C
    pub temperature_c: f64,

    /// Electrical power in W
    pub power_w: f64,

    /// Controller state
    pub state: MotorState,

    /// Epoch seconds of the last status refresh
    pub timestamp: f64,
}

impl Default for MotorStatus {
    fn default() -> Self {
        Self {
            speed_rpm: 0.0,
            current_a: 0.0,
            voltage_v: 0.0,
            duty_cycle: 0.0,
            temperature_c: 0.0,
            power_w: 0.0,
            state: MotorState::Disconnected,
            timestamp: 0.0,
        }
    }
}

/// Operating limits for the motor controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotorLimits {
    /// Maximum motor current in A
    pub max_current_a: f64,

    /// Maximum torque in N·m
    pub max_torque_nm: f64,

    /// Maximum shaft speed in RPM
    pub max_rpm: f64,

    /// Maximum controller temperature in °C
    pub max_temperature_c: f64,

    /// Minimum input voltage in V
    pub min_voltage_v: f64,

    /// Maximum input voltage in V
    pub max_voltage_v: f64,
}

impl Default for MotorLimits {
    fn default() -> Self {
        Self {
            max_current_a: 200.0,
            max_torque_nm: 320.0,
            max_rpm: 10_000.0,
            max_temperature_c: 80.0,
            min_voltage_v: 300.0,
            max_voltage_v: 500.0,
        }
    }
}

/// Control surface consumed by the charging and vehicle engines.
///
/// Commands are fire-and-forget: a `false` return means "no side effect
/// occurred" and callers decide whether to retry.
pub trait Actuator: Send {
    /// Establish the controller link
    fn connect(&mut self) -> bool;

    /// Whether the controller link is up
    fn is_connected(&self) -> bool;

    /// Command a duty cycle in [-1, 1]; out-of-range values are rejected
    fn set_duty_cycle(&mut self, duty_cycle: f64) -> bool;

    /// Command a motor current in A (negative = braking); clamped to the
    /// configured maximum
    fn set_current(&mut self, current_a: f64) -> bool;

    /// Stop the motor (zero current)
    fn stop(&mut self) -> bool;

    /// Refresh and return the controller status
    fn status(&mut self) -> MotorStatus;

    /// Whether the controller is connected and within its limits
    fn is_healthy(&mut self) -> bool;
}

/// Actuator handle shared between the engines and the driver loop
pub type SharedActuator = Arc<Mutex<Box<dyn Actuator>>>;

/// Software stand-in for a VESC-class motor controller.
pub struct SimulatedActuator {
    limits: MotorLimits,
    connected: bool,
    current_status: MotorStatus,
    can_protocol: Option<Arc<EvCanProtocol>>,
    logger: crate::logging::StructuredLogger,
}

impl SimulatedActuator {
    /// Create a disconnected simulated controller
    pub fn new(limits: MotorLimits) -> Self {
        let logger = get_logger("motor");
        Self {
            limits,
            connected: false,
            current_status: MotorStatus::default(),
            can_protocol: None,
            logger,
        }
    }

    /// Attach a CAN protocol for status frame emission
    pub fn with_can_protocol(mut self, protocol: Arc<EvCanProtocol>) -> Self {
        self.can_protocol = Some(protocol);
        self
    }

    /// Inject measurement values, standing in for hardware telemetry
    pub fn inject_measurements(&mut self, speed_rpm: f64, voltage_v: f64, temperature_c: f64) {
        self.current_status.speed_rpm = speed_rpm;
        self.current_status.voltage_v = voltage_v;
        self.current_status.temperature_c = temperature_c;
        self.current_status.power_w = voltage_v * self.current_status.current_a;
    }

    /// Estimated torque from power and speed: T = P / ω
    fn estimate_torque(&self) -> f64 {
        if self.current_status.speed_rpm.abs() < 1.0 {
            return 0.0;
        }
        let power_w = self.current_status.power_w;
        if power_w <= 0.0 {
            return 0.0;
        }
        let omega = 2.0 * std::f64::consts::PI * self.current_status.speed_rpm / 60.0;
        let torque = if omega > 0.0 { power_w / omega } else { 0.0 };
        torque.clamp(-self.limits.max_torque_nm, self.limits.max_torque_nm)
    }

    fn refresh_state(&mut self) {
        let s = &mut self.current_status;
        if s.temperature_c > self.limits.max_temperature_c {
            s.state = MotorState::Error;
            self.logger.warn(&format!(
                "Motor temperature {:.1}°C exceeds limit",
                s.temperature_c
            ));
        } else if s.voltage_v > 0.0 && s.voltage_v < self.limits.min_voltage_v {
            s.state = MotorState::Error;
            self.logger
                .warn(&format!("Motor voltage {:.1}V below minimum", s.voltage_v));
        } else if s.voltage_v > self.limits.max_voltage_v {
            s.state = MotorState::Error;
            self.logger
                .warn(&format!("Motor voltage {:.1}V above maximum", s.voltage_v));
        } else if s.state != MotorState::Error {
            if s.speed_rpm.abs() < 1.0 && s.current_a.abs() < 0.1 {
                s.state = MotorState::Idle;
            } else if s.current_a < 0.0 {
                s.state = MotorState::Braking;
            } else {
                s.state = MotorState::Running;
            }
        }
    }

    fn emit_status(&self) {
        if let Some(protocol) = &self.can_protocol {
            let result = protocol.send_motor_status(
                self.current_status.speed_rpm,
                self.estimate_torque(),
                self.current_status.temperature_c,
            );
            if let Err(e) = result {
                protocol.log_send_failure("motor status", &e);
            }
        }
    }
}

impl Actuator for SimulatedActuator {
    fn connect(&mut self) -> bool {
        self.connected = true;
        self.current_status.state = MotorState::Idle;
        self.logger.info("Motor controller connected (simulation)");
        true
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn set_duty_cycle(&mut self, duty_cycle: f64) -> bool {
        if !self.connected {
            self.logger
                .error("Cannot set duty cycle: not connected to motor controller");
            return false;
        }
        if duty_cycle.abs() > 1.0 {
            self.logger.error(&format!(
                "Invalid duty cycle: {} (must be in [-1.0, 1.0])",
                duty_cycle
            ));
            return false;
        }

        self.current_status.duty_cycle = duty_cycle;
        self.current_status.state = MotorState::Running;
        self.logger
            .debug(&format!("Set duty cycle to {}", duty_cycle));
        true
    }

    fn set_current(&mut self, current_a: f64) -> bool {
        if !self.connected {
            self.logger
                .error("Cannot set current: not connected to motor controller");
            return false;
        }

        let mut amps = current_a;
        if amps.abs() > self.limits.max_current_a {
            self.logger.warn(&format!(
                "Current {}A exceeds maximum {}A, clamping",
                amps, self.limits.max_current_a
            ));
            amps = amps.clamp(-self.limits.max_current_a, self.limits.max_current_a);
        }

        self.current_status.current_a = amps;
        self.current_status.power_w = self.current_status.voltage_v * amps;
        self.current_status.state = if amps < 0.0 {
            MotorState::Braking
        } else {
            MotorState::Running
        };
        self.logger.debug(&format!("Set current to {}A", amps));
        true
    }

    fn stop(&mut self) -> bool {
        self.set_current(0.0)
    }

    fn status(&mut self) -> MotorStatus {
        if !self.connected {
            return MotorStatus::default();
        }

        self.current_status.timestamp = now_secs();
        self.refresh_state();
        self.emit_status();
        self.current_status.clone()
    }

    fn is_healthy(&mut self) -> bool {
        if !self.connected {
            return false;
        }

        let status = self.status();
        if status.state == MotorState::Error {
            return false;
        }
        if status.temperature_c > self.limits.max_temperature_c {
            return false;
        }
        if status.voltage_v > 0.0
            && (status.voltage_v < self.limits.min_voltage_v
                || status.voltage_v > self.limits.max_voltage_v)
        {
            return false;
        }
        true
    }
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected_actuator() -> SimulatedActuator {
        let mut actuator = SimulatedActuator::new(MotorLimits::default());
        actuator.connect();
        actuator
    }

    #[test]
    fn test_commands_require_connection() {
        let mut actuator = SimulatedActuator::new(MotorLimits::default());
        assert!(!actuator.set_duty_cycle(0.5));
        assert!(!actuator.set_current(10.0));
        assert!(!actuator.is_healthy());
    }

    #[test]
    fn test_duty_cycle_range_rejected() {
        let mut actuator = connected_actuator();
        assert!(!actuator.set_duty_cycle(1.5));
        assert!(actuator.set_duty_cycle(0.8));
        assert_eq!(actuator.status().state, MotorState::Running);
    }

    #[test]
    fn test_current_clamped_to_limit() {
        let mut actuator = connected_actuator();
        assert!(actuator.set_current(500.0));
        assert!((actuator.status().current_a - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_negative_current_is_braking() {
        let mut actuator = connected_actuator();
        actuator.inject_measurements(1000.0, 400.0, 25.0);
        assert!(actuator.set_current(-20.0));
        assert_eq!(actuator.status().state, MotorState::Braking);
    }

    #[test]
    fn test_stop_zeroes_current() {
        let mut actuator = connected_actuator();
        actuator.set_current(50.0);
        assert!(actuator.stop());
        assert!(actuator.status().current_a.abs() < f64::EPSILON);
    }

    #[test]
    fn test_overtemperature_is_unhealthy() {
        let mut actuator = connected_actuator();
        actuator.inject_measurements(0.0, 400.0, 95.0);
        assert_eq!(actuator.status().state, MotorState::Error);
        assert!(!actuator.is_healthy());
    }

    #[test]
    fn test_undervoltage_is_unhealthy() {
        let mut actuator = connected_actuator();
        actuator.inject_measurements(0.0, 250.0, 25.0);
        assert!(!actuator.is_healthy());
    }
}
