//! # Auriga - EV Safety Coordination Engine
//!
//! A Rust implementation of the core control stack for a battery-electric
//! vehicle: battery state estimation, charging session management, and
//! high-level vehicle coordination, with CAN bus telemetry.
//!
//! ## Features
//!
//! - **Battery Engine**: coulomb-counting SOC with a voltage fallback,
//!   priority-ordered fault classification, and charge/discharge admission
//! - **Charging Engine**: AC/DC session lifecycle with connector
//!   capability checks, pause/resume, and ordered safety cutoffs
//! - **Vehicle Engine**: drive/charge mutual exclusion, drive modes, and
//!   a kinematic model behind throttle/brake commands
//! - **CAN Telemetry**: fixed-ID status frames with little-endian f32
//!   payloads
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! The application follows a modular architecture with clear separation of concerns:
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `error`: Common error type and result alias
//! - `can`: CAN frame codec, transport trait, and the EV protocol
//! - `motor`: Motor actuator trait and simulated controller
//! - `temperature`: Temperature probe trait
//! - `battery`: Battery state engine
//! - `charging`: Charging session engine
//! - `vehicle`: Vehicle coordination engine
//! - `driver`: Main loop tying the engines together

pub mod battery;
pub mod can;
pub mod charging;
pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod motor;
pub mod temperature;
pub mod vehicle;

// Re-export commonly used types
pub use config::Config;
pub use driver::AurigaDriver;
pub use error::{AurigaError, Result};
