//! Main driver orchestration for Auriga
//!
//! Owns the three engines and runs the periodic tick loop. Every tick
//! refreshes the subsystems in a fixed order (battery, then charging, then
//! vehicle) so each engine sees the others' snapshots from the same tick.

use crate::battery::{BatteryManager, BatterySample};
use crate::can::{CanTransport, EvCanProtocol};
use crate::charging::{ChargingSample, ChargingSystem, ConnectorType};
use crate::config::Config;
use crate::error::Result;
use crate::motor::{Actuator, SharedActuator};
use crate::temperature::TemperatureProvider;
use crate::vehicle::{DriveMode, VehicleController};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Duration, interval};

/// Main driver state
#[derive(Debug, Clone)]
pub enum DriverState {
    /// Driver is initializing
    Initializing,
    /// Driver is running normally
    Running,
    /// Driver is in error state
    Error(String),
    /// Driver is shutting down
    ShuttingDown,
}

/// Commands accepted by the driver from external components
#[derive(Debug, Clone)]
pub enum DriverCommand {
    StartDriving,
    StopDriving,
    Accelerate(f64),
    Brake(f64),
    SetDriveMode(DriveMode),
    Connect(ConnectorType),
    Disconnect,
    StartCharging { power_kw: Option<f64>, target_soc: f64 },
    StopCharging,
    PauseCharging,
    ResumeCharging,
    EmergencyStop,
}

/// Main driver for Auriga
pub struct AurigaDriver {
    /// Configuration
    config: Config,

    /// Current driver state
    state: watch::Sender<DriverState>,

    /// Battery state engine
    battery: Arc<Mutex<BatteryManager>>,

    /// Charging session engine
    charging: Arc<Mutex<ChargingSystem>>,

    /// Vehicle coordination engine
    vehicle: VehicleController,

    /// Motor actuator
    actuator: SharedActuator,

    /// Logger with context
    logger: crate::logging::StructuredLogger,

    /// Shutdown signal
    shutdown_tx: mpsc::UnboundedSender<()>,

    /// Shutdown receiver
    shutdown_rx: mpsc::UnboundedReceiver<()>,

    /// Command receiver
    commands_rx: mpsc::UnboundedReceiver<DriverCommand>,

    /// Command sender handle, cloned out to external components
    commands_tx: mpsc::UnboundedSender<DriverCommand>,

    /// Broadcast channel for status snapshots (JSON strings)
    status_tx: broadcast::Sender<String>,
}

impl AurigaDriver {
    /// Wire the engines together from a validated configuration
    pub fn new(
        config: Config,
        actuator: Box<dyn Actuator>,
        can_bus: Box<dyn CanTransport>,
        temperature: Option<Arc<dyn TemperatureProvider>>,
        commands_rx: mpsc::UnboundedReceiver<DriverCommand>,
        commands_tx: mpsc::UnboundedSender<DriverCommand>,
    ) -> Result<Self> {
        config.validate()?;
        let logger = crate::logging::get_logger("driver");

        let protocol = if config.can.enabled {
            Some(Arc::new(EvCanProtocol::new(can_bus)))
        } else {
            None
        };

        let mut battery = BatteryManager::new(config.battery.clone());
        if let Some(p) = &protocol {
            battery = battery.with_can_protocol(Arc::clone(p));
        }
        if let Some(t) = &temperature {
            battery = battery.with_temperature_provider(Arc::clone(t));
        }
        let battery = Arc::new(Mutex::new(battery));

        let actuator: SharedActuator = Arc::new(Mutex::new(actuator));

        let mut charging =
            ChargingSystem::new(config.charging.clone())?.with_actuator(Arc::clone(&actuator));
        if let Some(p) = &protocol {
            charging = charging.with_can_protocol(Arc::clone(p));
        }
        if let Some(t) = &temperature {
            charging = charging.with_temperature_provider(Arc::clone(t));
        }
        let charging = Arc::new(Mutex::new(charging));

        let mut vehicle = VehicleController::new(config.vehicle.clone())
            .with_battery(Arc::clone(&battery))
            .with_charging(Arc::clone(&charging))
            .with_actuator(Arc::clone(&actuator));
        if let Some(p) = &protocol {
            vehicle = vehicle.with_can_protocol(Arc::clone(p));
        }

        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(DriverState::Initializing);
        let (status_tx, _status_rx) = broadcast::channel::<String>(100);

        Ok(Self {
            config,
            state: state_tx,
            battery,
            charging,
            vehicle,
            actuator,
            logger,
            shutdown_tx,
            shutdown_rx,
            commands_rx,
            commands_tx,
            status_tx,
        })
    }

    /// Run the driver main loop
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info("Starting vehicle driver main loop");

        if !self.actuator.lock().connect() {
            let msg = "Motor actuator failed to connect";
            self.logger.error(msg);
            self.state.send(DriverState::Error(msg.to_string())).ok();
            return Err(crate::error::AurigaError::actuator(msg));
        }

        self.state.send(DriverState::Running).ok();

        let mut tick = interval(Duration::from_millis(self.config.tick_interval_ms));

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.tick_cycle();
                }
                Some(cmd) = self.commands_rx.recv() => {
                    self.handle_command(cmd);
                }
                _ = self.shutdown_rx.recv() => {
                    self.logger.info("Shutdown signal received");
                    break;
                }
            }
        }

        self.state.send(DriverState::ShuttingDown).ok();
        self.shutdown();
        Ok(())
    }

    /// Single tick: battery first, then charging against the fresh battery
    /// snapshot, then the vehicle against both
    fn tick_cycle(&mut self) {
        let motor_status = self.actuator.lock().status();

        // Charge current the charger would push at its admitted setpoint,
        // against the pack voltage from the previous tick
        let setpoint_kw = self.charging.lock().commanded_power_kw();
        let pack_voltage = self.battery.lock().state().voltage;
        let charge_current = if pack_voltage > 0.0 {
            setpoint_kw * 1000.0 / pack_voltage
        } else {
            0.0
        };

        // Net pack current: charger inflow minus traction draw
        let pack_current = charge_current - motor_status.current_a.abs();

        self.battery.lock().update(BatterySample {
            current: Some(pack_current),
            ..BatterySample::default()
        });

        let battery_state = self.battery.lock().state();
        self.charging.lock().update(
            ChargingSample {
                current: Some(charge_current),
                ..ChargingSample::default()
            },
            &battery_state,
        );

        let status = self.vehicle.update();

        let snapshot = serde_json::json!({
            "vehicle": status,
            "battery": {
                "soc": battery_state.soc,
                "voltage": battery_state.voltage,
                "current": battery_state.current,
                "temperature": battery_state.temperature,
                "status": battery_state.status,
            },
            "charging": self.charging.lock().status(),
        });
        if let Ok(text) = serde_json::to_string(&snapshot) {
            let _ = self.status_tx.send(text);
        }
    }

    fn handle_command(&mut self, cmd: DriverCommand) {
        self.logger.debug(&format!("Handling command: {cmd:?}"));
        match cmd {
            DriverCommand::StartDriving => {
                self.vehicle.start_driving();
            }
            DriverCommand::StopDriving => {
                self.vehicle.stop_driving();
            }
            DriverCommand::Accelerate(throttle) => {
                self.vehicle.accelerate(throttle);
            }
            DriverCommand::Brake(pct) => {
                self.vehicle.brake(pct);
            }
            DriverCommand::SetDriveMode(mode) => {
                self.vehicle.set_drive_mode(mode);
            }
            DriverCommand::Connect(connector) => {
                self.charging.lock().connect(connector);
            }
            DriverCommand::Disconnect => {
                self.charging.lock().disconnect();
            }
            DriverCommand::StartCharging { power_kw, target_soc } => {
                self.vehicle.start_charging(power_kw, target_soc);
            }
            DriverCommand::StopCharging => {
                self.vehicle.stop_charging();
            }
            DriverCommand::PauseCharging => {
                self.charging.lock().pause_charging();
            }
            DriverCommand::ResumeCharging => {
                let battery = self.battery.lock();
                self.charging.lock().resume_charging(&battery);
            }
            DriverCommand::EmergencyStop => {
                self.vehicle.emergency_stop();
            }
        }
    }

    /// Stop power flow in both directions before exiting
    fn shutdown(&mut self) {
        if !self.actuator.lock().stop() {
            self.logger.warn("Motor stop on shutdown had no effect");
        }
        self.charging.lock().stop_charging();
        self.logger.info("Driver shut down cleanly");
    }

    /// Current driver state snapshot
    pub fn get_state(&self) -> DriverState {
        self.state.borrow().clone()
    }

    /// Request the main loop to exit
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Handle for requesting shutdown from another task
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<()> {
        self.shutdown_tx.clone()
    }

    /// Access the loaded configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle for submitting commands from external components
    pub fn command_sender(&self) -> mpsc::UnboundedSender<DriverCommand> {
        self.commands_tx.clone()
    }

    /// Subscribe to JSON status snapshots, one per tick
    pub fn subscribe_status(&self) -> broadcast::Receiver<String> {
        self.status_tx.subscribe()
    }

    /// Combined statistics from all three engines
    pub fn statistics(&self) -> serde_json::Value {
        serde_json::json!({
            "battery": self.battery.lock().statistics(),
            "charging": self.charging.lock().statistics(),
            "vehicle": self.vehicle.statistics(),
        })
    }
}
