//! Engine configuration.

use crate::constants::{EVENT_CHANNEL_CAPACITY, HISTORY_CAPACITY, POLL_INTERVAL, STATUS_INTERVAL};
use crate::ess::session::SerialConfig;
use crate::ess::voltage::VoltageScale;
use std::time::Duration;

/// Everything the engine needs to know up front.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub serial: SerialConfig,
    /// Heartbeat: send `S` when this much time passed since the last status request.
    pub status_interval: Duration,
    /// Idle wait between polling ticks.
    pub poll_interval: Duration,
    /// Samples kept per voltage channel.
    pub history_capacity: usize,
    /// Raw sample calibration; depends on the firmware generation.
    pub voltage_scale: VoltageScale,
    /// Whether the firmware accepts individual `E` enable-signal commands.
    pub enable_signals: bool,
    /// Event broadcast buffer per subscriber.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            serial: SerialConfig::default(),
            status_interval: STATUS_INTERVAL,
            poll_interval: POLL_INTERVAL,
            history_capacity: HISTORY_CAPACITY,
            voltage_scale: VoltageScale::default(),
            enable_signals: true,
            event_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn with_baudrate(mut self, baudrate: u32) -> Self {
        self.serial.baudrate = baudrate;
        self
    }

    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_voltage_scale(mut self, scale: VoltageScale) -> Self {
        self.voltage_scale = scale;
        self
    }

    pub fn with_enable_signals(mut self, enabled: bool) -> Self {
        self.enable_signals = enabled;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        // broadcast::channel panics on zero
        self.event_capacity = capacity.max(1);
        self
    }
}
