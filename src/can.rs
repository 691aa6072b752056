//! CAN bus boundary for Auriga
//!
//! Fixed 8-byte frames with little-endian 32-bit float payloads, one message
//! ID per status type. The transport itself is behind a trait so the core
//! engines stay independent of the actual socketcan driver; a simulated bus
//! with statistics is provided for development and tests.

use crate::error::{AurigaError, Result};
use crate::logging::get_logger;
use parking_lot::Mutex;

/// Standard EV CAN message IDs (ISO 11898-style conventions)
pub mod message_id {
    /// Battery Management System status
    pub const BMS_STATUS: u32 = 0x183;
    /// Motor controller status
    pub const MOTOR_STATUS: u32 = 0x203;
    /// Charger status
    pub const CHARGER_STATUS: u32 = 0x280;
    /// Vehicle controller status
    pub const VEHICLE_STATUS: u32 = 0x303;
    /// Per-sensor temperature reading
    pub const TEMPERATURE_SENSOR: u32 = 0x382;
}

/// Maximum classical CAN payload length in bytes
pub const MAX_FRAME_LEN: usize = 8;

/// A single classical CAN data frame
#[derive(Debug, Clone, PartialEq)]
pub struct CanFrame {
    /// Arbitration ID
    pub can_id: u32,

    /// Payload bytes
    pub data: Vec<u8>,

    /// Data Length Code; must equal the payload length
    pub dlc: u8,

    /// Send timestamp, epoch seconds
    pub timestamp: f64,
}

impl CanFrame {
    /// Build a frame, validating the DLC against the payload
    pub fn new(can_id: u32, data: Vec<u8>, timestamp: f64) -> Result<Self> {
        if data.len() > MAX_FRAME_LEN {
            return Err(AurigaError::can(format!(
                "DLC cannot exceed {} bytes (got {})",
                MAX_FRAME_LEN,
                data.len()
            )));
        }
        let dlc = data.len() as u8;
        Ok(Self {
            can_id,
            data,
            dlc,
            timestamp,
        })
    }

    /// Validate a frame received or constructed elsewhere
    pub fn validate(&self) -> Result<()> {
        if usize::from(self.dlc) > MAX_FRAME_LEN {
            return Err(AurigaError::can("DLC cannot exceed 8 bytes".to_string()));
        }
        if self.data.len() != usize::from(self.dlc) {
            return Err(AurigaError::can(format!(
                "Data length ({}) must match DLC ({})",
                self.data.len(),
                self.dlc
            )));
        }
        Ok(())
    }
}

/// Pack numeric fields as little-endian f32 in declaration order,
/// zero-padded to 8 bytes and truncated beyond 8.
pub fn pack_floats(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(MAX_FRAME_LEN);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.truncate(MAX_FRAME_LEN);
    out.resize(MAX_FRAME_LEN, 0);
    out
}

/// Decode a payload back into little-endian f32 fields.
/// Trailing bytes that do not fill a whole float are ignored.
pub fn unpack_floats(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Statistics kept by a CAN transport
#[derive(Debug, Clone, Default)]
pub struct CanBusStats {
    /// Frames successfully sent
    pub frames_sent: u64,

    /// Send errors
    pub errors: u64,

    /// Epoch seconds of the last successful send
    pub last_activity: f64,
}

/// Transport abstraction over the physical CAN interface
pub trait CanTransport: Send {
    /// Send a single frame; the frame is validated before transmission
    fn send_frame(&mut self, frame: &CanFrame) -> Result<()>;

    /// Whether the bus is usable
    fn is_connected(&self) -> bool;

    /// Transport statistics
    fn statistics(&self) -> CanBusStats;
}

/// In-memory CAN bus used in simulation and tests. Records the most recent
/// frames so tests can assert on the wire traffic.
pub struct SimulatedCanBus {
    channel: String,
    connected: bool,
    stats: CanBusStats,
    frames: Vec<CanFrame>,
    max_recorded: usize,
    logger: crate::logging::StructuredLogger,
}

impl SimulatedCanBus {
    /// Create a connected simulated bus
    pub fn new(channel: &str) -> Self {
        let logger = get_logger("can");
        Self {
            channel: channel.to_string(),
            connected: true,
            stats: CanBusStats::default(),
            frames: Vec::new(),
            max_recorded: 256,
            logger,
        }
    }

    /// Disconnect the bus (subsequent sends fail)
    pub fn disconnect(&mut self) {
        self.connected = false;
        self.logger
            .info(&format!("Disconnected from CAN bus {}", self.channel));
    }

    /// Frames recorded so far, oldest first
    pub fn recorded_frames(&self) -> &[CanFrame] {
        &self.frames
    }

    /// The most recent frame with the given arbitration ID
    pub fn last_frame(&self, can_id: u32) -> Option<&CanFrame> {
        self.frames.iter().rev().find(|f| f.can_id == can_id)
    }
}

impl CanTransport for SimulatedCanBus {
    fn send_frame(&mut self, frame: &CanFrame) -> Result<()> {
        if !self.connected {
            self.stats.errors += 1;
            return Err(AurigaError::can(
                "Cannot send frame: not connected to CAN bus".to_string(),
            ));
        }
        if let Err(e) = frame.validate() {
            self.stats.errors += 1;
            return Err(e);
        }

        self.stats.frames_sent += 1;
        self.stats.last_activity = frame.timestamp;
        if self.frames.len() >= self.max_recorded {
            self.frames.remove(0);
        }
        self.frames.push(frame.clone());
        self.logger.trace(&format!(
            "Sent frame: ID={:03X}, DLC={}",
            frame.can_id, frame.dlc
        ));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn statistics(&self) -> CanBusStats {
        self.stats.clone()
    }
}

/// EV status frame encoder on top of a [`CanTransport`].
///
/// Frame transmission is fire-and-forget from the engines' point of view:
/// callers log failures and never propagate them into the state machines.
pub struct EvCanProtocol {
    bus: Mutex<Box<dyn CanTransport>>,
    logger: crate::logging::StructuredLogger,
}

impl EvCanProtocol {
    /// Wrap a transport
    pub fn new(bus: Box<dyn CanTransport>) -> Self {
        let logger = get_logger("can_protocol");
        Self {
            bus: Mutex::new(bus),
            logger,
        }
    }

    fn send(&self, can_id: u32, fields: &[f32]) -> Result<()> {
        let frame = CanFrame::new(can_id, pack_floats(fields), now_secs())?;
        self.bus.lock().send_frame(&frame)
    }

    /// Send battery status: voltage, current, temperature, SOC
    pub fn send_battery_status(
        &self,
        voltage: f64,
        current: f64,
        temperature: f64,
        soc: f64,
    ) -> Result<()> {
        self.send(
            message_id::BMS_STATUS,
            &[voltage as f32, current as f32, temperature as f32, soc as f32],
        )
    }

    /// Send motor status: speed (rpm), torque (N·m), temperature
    pub fn send_motor_status(&self, speed: f64, torque: f64, temperature: f64) -> Result<()> {
        self.send(
            message_id::MOTOR_STATUS,
            &[speed as f32, torque as f32, temperature as f32],
        )
    }

    /// Send charger status: voltage, current
    pub fn send_charger_status(&self, voltage: f64, current: f64) -> Result<()> {
        self.send(
            message_id::CHARGER_STATUS,
            &[voltage as f32, current as f32],
        )
    }

    /// Send vehicle status: speed (km/h), acceleration (m/s²)
    pub fn send_vehicle_status(&self, speed: f64, acceleration: f64) -> Result<()> {
        self.send(
            message_id::VEHICLE_STATUS,
            &[speed as f32, acceleration as f32],
        )
    }

    /// Send a single temperature reading: sensor index, temperature
    pub fn send_temperature_reading(&self, sensor_index: u16, temperature: f64) -> Result<()> {
        self.send(
            message_id::TEMPERATURE_SENSOR,
            &[f32::from(sensor_index), temperature as f32],
        )
    }

    /// Transport statistics
    pub fn statistics(&self) -> CanBusStats {
        self.bus.lock().statistics()
    }

    /// Run `f` against the underlying transport (test hook for the
    /// simulated bus)
    pub fn with_bus<R>(&self, f: impl FnOnce(&dyn CanTransport) -> R) -> R {
        let guard = self.bus.lock();
        f(guard.as_ref())
    }

    /// Log (and swallow) a failed send; used at every emit site
    pub fn log_send_failure(&self, what: &str, err: &AurigaError) {
        self.logger
            .warn(&format!("Failed to send {} to CAN: {}", what, err));
    }
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_floats_pads_to_eight() {
        let data = pack_floats(&[1.0]);
        assert_eq!(data.len(), 8);
        assert_eq!(&data[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&data[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_pack_floats_truncates_beyond_eight() {
        let data = pack_floats(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(data.len(), 8);
        let fields = unpack_floats(&data);
        assert_eq!(fields, vec![1.0, 2.0]);
    }

    #[test]
    fn test_frame_dlc_validation() {
        let frame = CanFrame::new(0x183, vec![0; 8], 0.0).unwrap();
        assert_eq!(frame.dlc, 8);
        assert!(frame.validate().is_ok());

        assert!(CanFrame::new(0x183, vec![0; 9], 0.0).is_err());

        let mut bad = CanFrame::new(0x183, vec![0; 4], 0.0).unwrap();
        bad.dlc = 8;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_simulated_bus_records_frames() {
        let mut bus = SimulatedCanBus::new("vcan0");
        let frame = CanFrame::new(0x280, pack_floats(&[400.0, 50.0]), 1.0).unwrap();
        bus.send_frame(&frame).unwrap();

        assert_eq!(bus.statistics().frames_sent, 1);
        let last = bus.last_frame(0x280).unwrap();
        let fields = unpack_floats(&last.data);
        assert_eq!(fields[0], 400.0);
        assert_eq!(fields[1], 50.0);
    }

    #[test]
    fn test_disconnected_bus_rejects_sends() {
        let mut bus = SimulatedCanBus::new("vcan0");
        bus.disconnect();
        let frame = CanFrame::new(0x303, pack_floats(&[0.0]), 1.0).unwrap();
        assert!(bus.send_frame(&frame).is_err());
        assert_eq!(bus.statistics().errors, 1);
    }

    #[test]
    fn test_protocol_status_frames() {
        let protocol = EvCanProtocol::new(Box::new(SimulatedCanBus::new("vcan0")));
        protocol
            .send_battery_status(400.0, -25.0, 30.0, 80.0)
            .unwrap();
        protocol.send_vehicle_status(60.0, 1.5).unwrap();

        let stats = protocol.statistics();
        assert_eq!(stats.frames_sent, 2);
    }
}
