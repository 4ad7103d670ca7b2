//! Device state plus history, mutated as one unit.
//!
//! The engine keeps a single [`DeviceModel`] behind one lock, so the polling
//! task and the command path never interleave half-applied updates.

use crate::ess::command::Command;
use crate::ess::frame::ParsedFrame;
use crate::ess::history::{Sample, VoltageHistory};
use crate::ess::state::{ChangeEvent, CommandEffect, DeviceState};
use crate::ess::voltage::VoltageScale;
use crate::error::Result;
use chrono::{DateTime, Local};

#[derive(Debug, Clone)]
pub struct DeviceModel {
    state: DeviceState,
    history: VoltageHistory,
    scale: VoltageScale,
}

impl DeviceModel {
    pub fn new(with_enable_signals: bool, history_capacity: usize, scale: VoltageScale) -> Self {
        DeviceModel {
            state: DeviceState::new(with_enable_signals),
            history: VoltageHistory::new(history_capacity),
            scale,
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn history(&self) -> &VoltageHistory {
        &self.history
    }

    /// Applies a status frame; every voltage sample is also appended to its history
    /// series under the shared frame timestamp.
    pub fn apply_frame(&mut self, frame: &ParsedFrame, timestamp: DateTime<Local>) -> Vec<ChangeEvent> {
        let events = self.state.apply_frame(frame, &self.scale);
        let mut out = Vec::with_capacity(events.len() * 2);
        for event in events {
            if let ChangeEvent::Voltage { channel, volts } = event {
                let sample = Sample { timestamp, volts };
                self.history.push(channel, sample);
                out.push(event);
                out.push(ChangeEvent::HistoryAppended { channel, sample });
            } else {
                out.push(event);
            }
        }
        out
    }

    pub fn apply_command(&mut self, command: &Command) -> Result<CommandEffect> {
        self.state.apply_command(command)
    }

    /// Session closed: defaults back, history emptied.
    pub fn reset(&mut self) {
        self.state.reset();
        self.history.clear();
    }
}
