//! ESS Protocol Constants
//!
//! This module defines the constants used by the MicroVer ESS serial protocol
//! and the default timing of the console engine.

use std::time::Duration;

/// Default serial baud rate of the controller's USB CDC link
pub const DEFAULT_BAUDRATE: u32 = 115_200;

/// Default serial read timeout
pub const DEFAULT_SERIAL_TIMEOUT: Duration = Duration::from_secs(1);

/// Line terminator used in both directions
pub const LINE_TERMINATOR: &str = "\r\n";

/// Prefix that marks an inbound line as a status frame
pub const STATUS_PREFIX: &str = "BAT:";

/// Prefix of firmware error reports
pub const DEVICE_ERROR_PREFIX: &str = "ERROR:";

/// Heartbeat: a status request is sent when this much time passed since the last one
pub const STATUS_INTERVAL: Duration = Duration::from_secs(2);

/// Idle wait between polling loop ticks
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Samples kept per voltage channel
pub const HISTORY_CAPACITY: usize = 100;

/// Buffered events per subscriber before slow receivers start lagging
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Largest single read from the link
pub const READ_CHUNK_SIZE: usize = 512;

/// Number of front-panel LEDs
pub const LED_COUNT: usize = 6;

/// Front-panel LED names, by index
pub const LED_NAMES: [&str; LED_COUNT] = [
    "LED 0%",
    "LED 50%",
    "LED 100%",
    "LED Charge",
    "LED Check Charger",
    "Warning LED",
];

/// Highest valid battery percentage
pub const BATTERY_MAX_PERCENT: u32 = 100;

// ----------------------------------------------------------------------------
// Voltage scaling
// ----------------------------------------------------------------------------

/// Millivolt firmware: samples are volts * 1000
pub const MILLIVOLT_FACTOR: f64 = 1.0 / 1000.0;

/// ADC firmware: reference voltage of the converter
pub const ADC_REFERENCE_VOLTS: f64 = 3.3;

/// ADC firmware: full-scale count of the 12-bit converter
pub const ADC_FULL_SCALE: f64 = 4095.0;

/// ADC firmware: gain of the voltage divider in front of the converter
pub const ADC_DIVIDER_GAIN: f64 = 5.0;

// ----------------------------------------------------------------------------
// Wire command letters
// ----------------------------------------------------------------------------

pub const CMD_LED: char = 'L';
pub const CMD_ENABLE_SIGNAL: char = 'E';
pub const CMD_CHARGE_MODE: char = 'C';
pub const CMD_POWER_OUTPUT: char = 'P';
pub const CMD_RELAY: char = 'R';
pub const CMD_STATUS_REQUEST: &str = "S";
