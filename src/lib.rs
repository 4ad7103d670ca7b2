//! # ess-rs - A Rust Crate for ESS Controller Operator Consoles
//!
//! The ess-rs crate implements the device side of an operator console for an
//! Energy Storage System controller attached over a serial port. The controller
//! speaks a line-oriented ASCII protocol: it reports status frames such as
//! `BAT:75,STATE:1,FAULT:0,V1:12300,V2:4500,V3:300,V4:0` and accepts short
//! commands such as `L31` (LED 3 on) or `C2` (fast charge).
//!
//! ## Features
//!
//! - Connect to the controller using a serial port connection
//! - Poll it for status in the background and decode status frames
//! - Keep an authoritative device state and a bounded voltage history
//! - Issue typed commands with immediate local feedback
//! - Deliver state changes and log lines as events to any number of subscribers
//! - Support for logging and error handling
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! ess-rs = "0.1.0"
//! ```
//!
//! ```rust,no_run
//! use ess_rs::{ChargeMode, EngineConfig, EssEngine};
//!
//! # async fn run() -> ess_rs::Result<()> {
//! let mut engine = EssEngine::new(EngineConfig::default());
//! let mut events = engine.subscribe();
//! engine.connect("/dev/ttyUSB0").await?;
//! engine.set_charge_mode(ChargeMode::Fast).await?;
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod ess;
pub mod logging;

pub use crate::config::EngineConfig;
pub use crate::engine::EssEngine;
pub use crate::error::{EssError, Result};
pub use crate::logging::{init_logger, init_logger_with_default, log_info, Direction, LogLine};

// Protocol and state types
pub use ess::{
    format_volts, ChangeEvent, Channel, ChargeMode, Command, CommandEffect, DeviceState,
    EnableSignal, EngineEvent, Fault, FaultFlags, OperatingState, PollerState, RelayAction,
    VoltageHistory, VoltageScale,
};

/// List the serial ports present on this machine.
///
/// # Returns
/// * `Ok(Vec<String>)` - Port names usable with [`EssEngine::connect`]
/// * `Err(EssError)` - Enumeration failed
pub fn list_ports() -> Result<Vec<String>> {
    ess::session::list_ports()
}
