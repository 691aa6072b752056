//! Vehicle coordination engine for Auriga
//!
//! Top-level state machine tying the battery, charging, and motor engines
//! together. Enforces the drive/charge mutual exclusion, drives the simple
//! kinematic model behind throttle/brake commands, and escalates subsystem
//! faults into the vehicle state.

use crate::battery::BatteryManager;
use crate::can::EvCanProtocol;
use crate::charging::{ChargeState, ChargingSystem};
use crate::config::VehicleConfig;
use crate::logging::{get_logger, StructuredLogger};
use crate::motor::SharedActuator;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Vehicle operational states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleState {
    Parked,
    Ready,
    Driving,
    Charging,
    Error,
    Fault,
    Emergency,
    Standby,
}

/// Drive modes; each scales the base power/acceleration limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveMode {
    Eco,
    Normal,
    Sport,
    Reverse,
}

impl DriveMode {
    /// Power and acceleration multiplier for this mode
    fn limit_factor(self) -> f64 {
        match self {
            DriveMode::Eco => 0.7,
            DriveMode::Sport => 1.2,
            DriveMode::Normal | DriveMode::Reverse => 1.0,
        }
    }
}

/// Snapshot of the vehicle for telemetry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleStatus {
    pub state: VehicleState,
    pub speed_kmh: f64,
    pub acceleration_ms2: f64,
    pub power_kw: f64,
    pub energy_consumption_kwh: f64,
    pub range_km: f64,
    pub drive_mode: DriveMode,
    pub timestamp: f64,
}

/// Lifetime driving statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VehicleStats {
    pub total_distance_km: f64,
    pub total_energy_consumed_kwh: f64,
    pub driving_time_s: f64,
    pub fault_count: u64,
    pub last_update: f64,
}

/// Vehicle coordination engine.
///
/// Collaborators are optional so the engine stays testable in isolation;
/// the missing subsystem simply skips its checks, the same way a bench
/// harness with no motor wired up would.
pub struct VehicleController {
    /// Mode-independent limits; never mutated after construction
    base_config: VehicleConfig,
    status: VehicleStatus,
    stats: VehicleStats,
    driving_since: Option<f64>,
    last_speed_update: f64,
    battery: Option<Arc<Mutex<BatteryManager>>>,
    charging: Option<Arc<Mutex<ChargingSystem>>>,
    actuator: Option<SharedActuator>,
    can_protocol: Option<Arc<EvCanProtocol>>,
    logger: StructuredLogger,
}

impl VehicleController {
    pub fn new(config: VehicleConfig) -> Self {
        let logger = get_logger("vehicle");
        let now = now_secs();
        logger.info(&format!(
            "Vehicle engine initialized: max {} km/h, {} kW",
            config.max_speed_kmh, config.max_power_kw
        ));

        Self {
            base_config: config,
            status: VehicleStatus {
                state: VehicleState::Parked,
                speed_kmh: 0.0,
                acceleration_ms2: 0.0,
                power_kw: 0.0,
                energy_consumption_kwh: 0.0,
                range_km: 0.0,
                drive_mode: DriveMode::Normal,
                timestamp: now,
            },
            stats: VehicleStats {
                last_update: now,
                ..VehicleStats::default()
            },
            driving_since: None,
            last_speed_update: now,
            battery: None,
            charging: None,
            actuator: None,
            can_protocol: None,
            logger,
        }
    }

    pub fn with_battery(mut self, battery: Arc<Mutex<BatteryManager>>) -> Self {
        self.battery = Some(battery);
        self
    }

    pub fn with_charging(mut self, charging: Arc<Mutex<ChargingSystem>>) -> Self {
        self.charging = Some(charging);
        self
    }

    pub fn with_actuator(mut self, actuator: SharedActuator) -> Self {
        self.actuator = Some(actuator);
        self
    }

    pub fn with_can_protocol(mut self, protocol: Arc<EvCanProtocol>) -> Self {
        self.can_protocol = Some(protocol);
        self
    }

    /// Limits with the active drive mode applied. Computed fresh from the
    /// immutable base so repeated mode changes never compound.
    pub fn effective_config(&self) -> VehicleConfig {
        let factor = self.status.drive_mode.limit_factor();
        VehicleConfig {
            max_power_kw: self.base_config.max_power_kw * factor,
            max_acceleration_ms2: self.base_config.max_acceleration_ms2 * factor,
            ..self.base_config.clone()
        }
    }

    /// Request a state transition; returns whether it was accepted
    pub fn set_state(&mut self, new_state: VehicleState) -> bool {
        self.set_state_at(now_secs(), new_state)
    }

    pub fn set_state_at(&mut self, now: f64, new_state: VehicleState) -> bool {
        if !self.transition_allowed(new_state) {
            self.logger.warn(&format!(
                "Transition refused: {:?} -> {:?}",
                self.status.state, new_state
            ));
            return false;
        }

        let old_state = self.status.state;
        self.status.state = new_state;
        self.status.timestamp = now;

        match new_state {
            VehicleState::Driving => {
                self.driving_since = Some(now);
                self.last_speed_update = now;
            }
            VehicleState::Parked | VehicleState::Ready => {
                if let Some(since) = self.driving_since.take() {
                    self.stats.driving_time_s += now - since;
                }
            }
            VehicleState::Error | VehicleState::Fault | VehicleState::Emergency => {
                self.stats.fault_count += 1;
            }
            _ => {}
        }

        self.logger
            .info(&format!("Vehicle state: {old_state:?} -> {new_state:?}"));
        self.emit_status();
        true
    }

    /// Transition rules, checked in order; the adjacency table only applies
    /// once the escalation and mutual-exclusion rules pass
    fn transition_allowed(&self, new_state: VehicleState) -> bool {
        let current = self.status.state;

        // Escalation is always allowed
        if matches!(new_state, VehicleState::Error | VehicleState::Emergency) {
            return true;
        }

        // Recovery from an escalated state only via PARKED or STANDBY
        if matches!(current, VehicleState::Error | VehicleState::Emergency) {
            return matches!(new_state, VehicleState::Parked | VehicleState::Standby);
        }

        // Drive/charge mutual exclusion
        if new_state == VehicleState::Driving {
            if let Some(charging) = &self.charging {
                if charging.lock().is_charging() {
                    return false;
                }
            }
        }
        if new_state == VehicleState::Charging && current == VehicleState::Driving {
            return false;
        }

        let allowed: &[VehicleState] = match current {
            VehicleState::Parked => &[
                VehicleState::Ready,
                VehicleState::Charging,
                VehicleState::Standby,
            ],
            VehicleState::Ready => &[
                VehicleState::Driving,
                VehicleState::Parked,
                VehicleState::Charging,
            ],
            VehicleState::Driving => &[VehicleState::Ready, VehicleState::Parked],
            VehicleState::Charging => &[VehicleState::Parked, VehicleState::Ready],
            VehicleState::Standby => &[VehicleState::Parked, VehicleState::Ready],
            VehicleState::Fault => &[VehicleState::Parked, VehicleState::Standby],
            _ => &[],
        };
        allowed.contains(&new_state)
    }

    /// Health-gated transition into DRIVING
    pub fn start_driving(&mut self) -> bool {
        self.start_driving_at(now_secs())
    }

    pub fn start_driving_at(&mut self, now: f64) -> bool {
        if let Some(charging) = &self.charging {
            if charging.lock().is_charging() {
                self.logger.error("Cannot start driving while charging");
                return false;
            }
        }

        if let Some(battery) = &self.battery {
            let state = battery.lock().state();
            if state.status.is_fault() {
                self.logger.error("Battery fault, cannot start driving");
                self.set_state_at(now, VehicleState::Error);
                return false;
            }
            if state.soc < 5.0 {
                self.logger.error("Battery SOC too low, cannot start driving");
                self.set_state_at(now, VehicleState::Error);
                return false;
            }
        }

        if let Some(actuator) = &self.actuator {
            let mut motor = actuator.lock();
            if !motor.is_connected() {
                self.logger.error("Motor not connected");
                return false;
            }
            if !motor.is_healthy() {
                drop(motor);
                self.logger.error("Motor unhealthy");
                self.set_state_at(now, VehicleState::Error);
                return false;
            }
        }

        self.set_state_at(now, VehicleState::Driving)
    }

    /// Stop the motor and drop back to READY. Only meaningful in DRIVING.
    pub fn stop_driving(&mut self) -> bool {
        self.stop_driving_at(now_secs())
    }

    pub fn stop_driving_at(&mut self, now: f64) -> bool {
        if self.status.state != VehicleState::Driving {
            self.logger.warn("Not currently driving");
            return false;
        }

        if let Some(actuator) = &self.actuator {
            actuator.lock().stop();
        }

        self.status.speed_kmh = 0.0;
        self.status.acceleration_ms2 = 0.0;
        self.status.power_kw = 0.0;

        self.set_state_at(now, VehicleState::Ready)
    }

    /// Throttle command (0-100%), gated by the battery's discharge headroom
    pub fn accelerate(&mut self, throttle_percent: f64) -> bool {
        self.accelerate_at(now_secs(), throttle_percent)
    }

    pub fn accelerate_at(&mut self, now: f64, throttle_percent: f64) -> bool {
        if self.status.state != VehicleState::Driving {
            self.logger.error("Cannot accelerate: not driving");
            return false;
        }

        let throttle = throttle_percent.clamp(0.0, 100.0);
        let limits = self.effective_config();
        let requested_power_kw = throttle / 100.0 * limits.max_power_kw;

        if let Some(battery) = &self.battery {
            if !battery.lock().can_discharge(requested_power_kw) {
                self.logger.warn(&format!(
                    "Battery refused discharge at {requested_power_kw:.1} kW"
                ));
                return false;
            }
        }

        self.status.acceleration_ms2 =
            (throttle / 100.0 * limits.max_acceleration_ms2).min(limits.max_acceleration_ms2);
        self.status.power_kw = requested_power_kw;

        if let Some(actuator) = &self.actuator {
            actuator.lock().set_duty_cycle(throttle / 100.0);
        }

        self.integrate_speed(now);
        self.integrate_energy(now);
        self.emit_status();
        true
    }

    /// Brake command (0-100%) with regenerative braking up to 50 A
    pub fn brake(&mut self, brake_percent: f64) -> bool {
        self.brake_at(now_secs(), brake_percent)
    }

    pub fn brake_at(&mut self, now: f64, brake_percent: f64) -> bool {
        if self.status.state != VehicleState::Driving {
            self.logger.warn("Cannot brake: not driving");
            return false;
        }

        let brake = brake_percent.clamp(0.0, 100.0);
        self.status.acceleration_ms2 =
            -(brake / 100.0) * self.base_config.max_deceleration_ms2.abs();

        if let Some(actuator) = &self.actuator {
            let regen_current = -(brake / 100.0) * 50.0;
            actuator.lock().set_current(regen_current);
        }

        self.integrate_speed(now);
        self.emit_status();
        true
    }

    /// Select a drive mode; refused while driving
    pub fn set_drive_mode(&mut self, mode: DriveMode) -> bool {
        if self.status.state == VehicleState::Driving {
            self.logger.warn("Cannot change drive mode while driving");
            return false;
        }
        self.status.drive_mode = mode;
        self.logger.info(&format!("Drive mode set to {mode:?}"));
        true
    }

    /// Plug in (if needed) and request a charge session. `power_kw` of
    /// `None` lets the charging engine negotiate the power.
    pub fn start_charging(&mut self, power_kw: Option<f64>, target_soc: f64) -> bool {
        self.start_charging_at(now_secs(), power_kw, target_soc)
    }

    pub fn start_charging_at(&mut self, now: f64, power_kw: Option<f64>, target_soc: f64) -> bool {
        if self.status.state == VehicleState::Driving {
            self.logger.error("Cannot start charging while driving");
            return false;
        }
        let (Some(battery), Some(charging)) = (&self.battery, &self.charging) else {
            self.logger.error("Charging subsystem not available");
            return false;
        };

        let started = {
            let battery = battery.lock();
            let mut charging = charging.lock();
            if !charging.is_connected() {
                let connector = charging.status().connector;
                if !charging.connect(connector) {
                    return false;
                }
            }
            charging.start_charging(&battery, power_kw, target_soc, None)
        };

        if started {
            self.set_state_at(now, VehicleState::Charging);
        }
        started
    }

    /// End the charge session and return to PARKED
    pub fn stop_charging(&mut self) -> bool {
        self.stop_charging_at(now_secs())
    }

    pub fn stop_charging_at(&mut self, now: f64) -> bool {
        let Some(charging) = &self.charging else {
            return false;
        };
        let stopped = charging.lock().stop_charging();
        if stopped {
            self.set_state_at(now, VehicleState::Parked);
        }
        stopped
    }

    /// Refresh the status from subsystem snapshots using wall-clock time
    pub fn update(&mut self) -> VehicleStatus {
        self.update_at(now_secs())
    }

    /// Refresh the status at an explicit instant (epoch seconds).
    ///
    /// Reads one snapshot per subsystem, then reacts: battery faults while
    /// driving escalate to ERROR, a finished charge session parks the
    /// vehicle, and a failed one escalates.
    pub fn update_at(&mut self, now: f64) -> VehicleStatus {
        if let Some(actuator) = &self.actuator {
            let mut motor = actuator.lock();
            if motor.is_connected() {
                let status = motor.status();
                drop(motor);
                // 1 RPM ~ 0.1 km/h with the fixed reduction gear
                self.status.speed_kmh = status.speed_rpm.abs() * 0.1;
                self.status.power_kw = status.power_w.abs() / 1000.0;
            }
        }

        if let Some(battery) = &self.battery {
            let (state, capacity_kwh) = {
                let battery = battery.lock();
                (battery.state(), battery.config().capacity_kwh)
            };

            if state.soc > 0.0 && self.base_config.efficiency_wh_per_km > 0.0 {
                let available_kwh = state.soc / 100.0 * capacity_kwh;
                self.status.range_km =
                    available_kwh * 1000.0 / self.base_config.efficiency_wh_per_km;
            } else {
                self.status.range_km = 0.0;
            }

            if state.status.is_fault() && self.status.state == VehicleState::Driving {
                self.logger.error("Battery fault while driving");
                self.set_state_at(now, VehicleState::Error);
            }
        }

        if let Some(charging) = &self.charging {
            let charge_state = charging.lock().state();
            if charge_state.is_charging() {
                if self.status.state != VehicleState::Charging {
                    self.set_state_at(now, VehicleState::Charging);
                }
            } else if self.status.state == VehicleState::Charging {
                match charge_state {
                    ChargeState::Complete => {
                        self.set_state_at(now, VehicleState::Parked);
                    }
                    ChargeState::Error | ChargeState::Fault => {
                        self.set_state_at(now, VehicleState::Error);
                    }
                    _ => {}
                }
            }
        }

        if self.status.state == VehicleState::Driving && self.driving_since.is_some() {
            let dt = now - self.stats.last_update;
            if dt > 0.0 {
                self.stats.total_distance_km += self.status.speed_kmh * dt / 3600.0;
                self.integrate_energy(now);
            }
        }

        self.status.timestamp = now;
        self.stats.last_update = now;
        self.emit_status();
        self.status.clone()
    }

    /// Halt everything immediately, bypassing the transition table
    pub fn emergency_stop(&mut self) -> bool {
        self.emergency_stop_at(now_secs())
    }

    pub fn emergency_stop_at(&mut self, now: f64) -> bool {
        self.logger.error("EMERGENCY STOP ACTIVATED");

        if let Some(actuator) = &self.actuator {
            actuator.lock().stop();
        }

        if let Some(charging) = &self.charging {
            let mut charging = charging.lock();
            if charging.is_charging() {
                charging.stop_charging();
            }
        }

        self.status.speed_kmh = 0.0;
        self.status.acceleration_ms2 = 0.0;
        self.status.power_kw = 0.0;

        self.set_state_at(now, VehicleState::Emergency)
    }

    /// Vehicle and all attached subsystems free of faults
    pub fn is_healthy(&self) -> bool {
        if matches!(
            self.status.state,
            VehicleState::Error | VehicleState::Fault | VehicleState::Emergency
        ) {
            return false;
        }
        if let Some(battery) = &self.battery {
            if battery.lock().state().status.is_fault() {
                return false;
            }
        }
        if let Some(actuator) = &self.actuator {
            if !actuator.lock().is_healthy() {
                return false;
            }
        }
        if let Some(charging) = &self.charging {
            if !charging.lock().is_healthy() {
                return false;
            }
        }
        true
    }

    /// v = v0 + a*t, clamped to [0, max], with a sub-0.1 km/h snap to zero
    fn integrate_speed(&mut self, now: f64) {
        let dt = now - self.last_speed_update;
        if dt > 0.0 {
            let mut speed_ms = self.status.speed_kmh / 3.6;
            speed_ms += self.status.acceleration_ms2 * dt;
            let max_speed_ms = self.base_config.max_speed_kmh / 3.6;
            speed_ms = speed_ms.clamp(0.0, max_speed_ms);

            self.status.speed_kmh = speed_ms * 3.6;
            if self.status.speed_kmh < 0.1 {
                self.status.speed_kmh = 0.0;
                self.status.acceleration_ms2 = 0.0;
            }
        }
        self.last_speed_update = now;
    }

    fn integrate_energy(&mut self, now: f64) {
        let dt = now - self.stats.last_update;
        if dt > 0.0 && self.status.power_kw > 0.0 {
            let energy_kwh = self.status.power_kw * dt / 3600.0;
            self.stats.total_energy_consumed_kwh += energy_kwh;
            self.status.energy_consumption_kwh = self.stats.total_energy_consumed_kwh;
        }
    }

    fn emit_status(&self) {
        let Some(protocol) = &self.can_protocol else {
            return;
        };
        if let Err(e) =
            protocol.send_vehicle_status(self.status.speed_kmh, self.status.acceleration_ms2)
        {
            protocol.log_send_failure("vehicle status", &e);
        }
    }

    /// Read-only snapshot of the current status
    pub fn status(&self) -> VehicleStatus {
        self.status.clone()
    }

    /// Mode-independent configuration
    pub fn config(&self) -> &VehicleConfig {
        &self.base_config
    }

    /// Lifetime statistics merged with the live status fields
    pub fn statistics(&self) -> serde_json::Value {
        json!({
            "total_distance_km": self.stats.total_distance_km,
            "total_energy_consumed_kwh": self.stats.total_energy_consumed_kwh,
            "driving_time_s": self.stats.driving_time_s,
            "fault_count": self.stats.fault_count,
            "last_update": self.stats.last_update,
            "current_speed_kmh": self.status.speed_kmh,
            "current_range_km": self.status.range_km,
            "state": self.status.state,
            "drive_mode": self.status.drive_mode,
            "power_kw": self.status.power_kw,
        })
    }
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::{BatteryManager, BatterySample};
    use crate::charging::{ChargingSample, ConnectorType};
    use crate::config::{BatteryConfig, ChargingConfig, VehicleConfig};

    fn controller() -> VehicleController {
        VehicleController::new(VehicleConfig::default())
    }

    fn battery_at(soc_voltage: f64) -> Arc<Mutex<BatteryManager>> {
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
        Arc::new(Mutex::new(bms))
    }

    fn charging_system() -> Arc<Mutex<ChargingSystem>> {
        Arc::new(Mutex::new(
            ChargingSystem::new(ChargingConfig::default()).unwrap(),
        ))
    }

    #[test]
    fn test_transition_table() {
        let mut vc = controller();
        assert_eq!(vc.status().state, VehicleState::Parked);

        // PARKED -> DRIVING skips READY
        assert!(!vc.set_state_at(1.0, VehicleState::Driving));
        assert!(vc.set_state_at(1.0, VehicleState::Ready));
        assert!(vc.set_state_at(2.0, VehicleState::Driving));
        assert!(vc.set_state_at(3.0, VehicleState::Ready));
        assert!(vc.set_state_at(4.0, VehicleState::Parked));
    }

    #[test]
    fn test_escalation_always_allowed_and_recovery_restricted() {
        let mut vc = controller();
        assert!(vc.set_state_at(1.0, VehicleState::Emergency));
        assert!(!vc.set_state_at(2.0, VehicleState::Ready));
        assert!(!vc.set_state_at(2.0, VehicleState::Driving));
        assert!(vc.set_state_at(3.0, VehicleState::Parked));
    }

    #[test]
    fn test_cannot_drive_while_charging() {
        let battery = battery_at(345.6);
        let charging = charging_system();
        {
            let mut cs = charging.lock();
            cs.connect(ConnectorType::Ccs2);
            assert!(cs.start_charging(&battery.lock(), Some(11.0), 100.0, Some(false)));
        }

        let mut vc = controller()
            .with_battery(battery)
            .with_charging(charging);
        assert!(vc.set_state_at(1.0, VehicleState::Ready));
        assert!(!vc.start_driving_at(2.0));
        assert_ne!(vc.status().state, VehicleState::Driving);
    }

    #[test]
    fn test_cannot_charge_while_driving() {
        let battery = battery_at(345.6);
        let charging = charging_system();
        let mut vc = controller()
            .with_battery(battery)
            .with_charging(charging);

        assert!(vc.set_state_at(1.0, VehicleState::Ready));
        assert!(vc.start_driving_at(2.0));
        assert!(!vc.start_charging_at(3.0, Some(11.0), 100.0));
        assert_eq!(vc.status().state, VehicleState::Driving);
    }

    #[test]
    fn test_low_soc_blocks_driving() {
        // 3.0 V/cell -> 0% SOC via the voltage fallback
        let battery = battery_at(288.0);
        let mut vc = controller().with_battery(battery);
        assert!(vc.set_state_at(1.0, VehicleState::Ready));
        assert!(!vc.start_driving_at(2.0));
        assert_eq!(vc.status().state, VehicleState::Error);
    }

    #[test]
    fn test_acceleration_kinematics() {
        let mut vc = controller();
        vc.set_state_at(0.0, VehicleState::Ready);
        vc.start_driving_at(0.0);

        // Full throttle for one second: 3 m/s2 -> 10.8 km/h
        assert!(vc.accelerate_at(1.0, 100.0));
        assert!((vc.status().speed_kmh - 10.8).abs() < 1e-6);

        // Brake hard for one second: -5 m/s2 wipes out the 3 m/s
        assert!(vc.brake_at(2.0, 100.0));
        assert_eq!(vc.status().speed_kmh, 0.0);
        assert_eq!(vc.status().acceleration_ms2, 0.0);
    }

    #[test]
    fn test_speed_clamped_to_max() {
        let mut vc = controller();
        vc.set_state_at(0.0, VehicleState::Ready);
        vc.start_driving_at(0.0);

        assert!(vc.accelerate_at(1000.0, 100.0));
        assert!(vc.status().speed_kmh <= 120.0 + 1e-9);
    }

    #[test]
    fn test_drive_mode_limits_do_not_compound() {
        let mut vc = controller();

        assert!(vc.set_drive_mode(DriveMode::Eco));
        let eco = vc.effective_config();
        assert!((eco.max_power_kw - 105.0).abs() < 1e-9);
        assert!((eco.max_acceleration_ms2 - 2.1).abs() < 1e-9);

        // Switch back and forth; SPORT is still exactly 1.2x the base
        assert!(vc.set_drive_mode(DriveMode::Sport));
        assert!(vc.set_drive_mode(DriveMode::Eco));
        assert!(vc.set_drive_mode(DriveMode::Sport));
        let sport = vc.effective_config();
        assert!((sport.max_power_kw - 180.0).abs() < 1e-9);

        assert!(vc.set_drive_mode(DriveMode::Normal));
        assert!((vc.effective_config().max_power_kw - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_drive_mode_locked_while_driving() {
        let mut vc = controller();
        vc.set_state_at(0.0, VehicleState::Ready);
        vc.start_driving_at(0.0);
        assert!(!vc.set_drive_mode(DriveMode::Sport));
        assert_eq!(vc.status().drive_mode, DriveMode::Normal);
    }

    #[test]
    fn test_range_estimate() {
        // 4.2 V/cell would be 100%; use 3.9 V/cell for 75%
        let battery = battery_at(374.4);
        let mut vc = controller().with_battery(battery);
        vc.update_at(2.0);
        // 75% of 75 kWh at 200 Wh/km
        assert!((vc.status().range_km - 281.25).abs() < 1.0);
    }

    #[test]
    fn test_emergency_stop_while_charging() {
        let battery = battery_at(345.6);
        let charging = charging_system();
        let mut vc = controller()
            .with_battery(battery.clone())
            .with_charging(charging.clone());

        assert!(vc.start_charging_at(1.0, Some(11.0), 100.0));
        assert_eq!(vc.status().state, VehicleState::Charging);
        assert!(charging.lock().is_charging());

        assert!(vc.emergency_stop_at(2.0));
        assert_eq!(vc.status().state, VehicleState::Emergency);
        assert_eq!(vc.status().speed_kmh, 0.0);
        assert_eq!(vc.status().power_kw, 0.0);
        assert!(!charging.lock().is_charging());
    }

    #[test]
    fn test_charging_completion_parks_vehicle() {
        let battery = battery_at(345.6);
        let charging = charging_system();
        let mut vc = controller()
            .with_battery(battery.clone())
            .with_charging(charging.clone());

        assert!(vc.start_charging_at(1.0, Some(11.0), 100.0));

        // Battery reaches full; the next charging tick completes the session
        battery.lock().update_at(
            2.0,
            BatterySample {
                voltage: Some(403.2),
                current: Some(0.0),
                temperature: Some(25.0),
                ..BatterySample::default()
            },
        );
        {
            let state = battery.lock().state();
            charging.lock().update_at(2.0, ChargingSample::default(), &state);
        }
        vc.update_at(3.0);
        assert_eq!(vc.status().state, VehicleState::Parked);
    }

    #[test]
    fn test_stop_driving_idempotent() {
        let mut vc = controller();
        vc.set_state_at(0.0, VehicleState::Ready);
        vc.start_driving_at(1.0);
        assert!(vc.stop_driving_at(2.0));
        assert_eq!(vc.status().state, VehicleState::Ready);
        assert!(!vc.stop_driving_at(3.0));
        assert_eq!(vc.status().state, VehicleState::Ready);
    }

    #[test]
    fn test_driving_time_accounting() {
        let mut vc = controller();
        vc.set_state_at(0.0, VehicleState::Ready);
        assert!(vc.start_driving_at(10.0));
        assert!(vc.stop_driving_at(25.0));
        assert!((vc.statistics()["driving_time_s"].as_f64().unwrap() - 15.0).abs() < 1e-6);
    }
}
