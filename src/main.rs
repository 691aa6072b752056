use anyhow::Result;
use auriga::can::SimulatedCanBus;
use auriga::config::Config;
use auriga::driver::{AurigaDriver, DriverCommand};
use auriga::motor::{MotorLimits, SimulatedActuator};
use auriga::temperature::{StaticTemperatureProvider, TemperatureProvider};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    auriga::logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Auriga EV coordination engine {} starting up",
        env!("APP_VERSION")
    );

    // Simulated hardware until real probe/controller backends are wired in
    let actuator = Box::new(SimulatedActuator::new(MotorLimits::default()));
    let can_bus = Box::new(SimulatedCanBus::new(&config.can.channel));
    let temperature: Arc<dyn TemperatureProvider> = Arc::new(StaticTemperatureProvider {
        cell_groups: vec![25.0; 8],
        ..StaticTemperatureProvider::default()
    });

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<DriverCommand>();
    let mut driver = AurigaDriver::new(
        config,
        actuator,
        can_bus,
        Some(temperature),
        cmd_rx,
        cmd_tx.clone(),
    )
    .map_err(|e| anyhow::anyhow!("Failed to create driver: {}", e))?;

    // Ctrl-C requests a clean shutdown of the main loop
    let shutdown = driver.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            let _ = shutdown.send(());
        }
    });

    match driver.run().await {
        Ok(_) => {
            info!("Driver shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Driver failed with error: {}", e);
            Err(anyhow::anyhow!("Driver error: {}", e))
        }
    }
}
