//! # ESS Status Frame Decoder
//!
//! This module decodes the controller's inbound text lines. It is protocol-only:
//! no state and no I/O. Raw integers come out; turning them into percentages,
//! operating states, fault sets and volts is the device state model's job.
//!
//! A status frame is a line starting with `BAT:` followed by comma-separated
//! `KEY:value` tokens, e.g.
//!
//! ```text
//! BAT:75,STATE:1,FAULT:0,V1:12300,V2:4500,V3:300,V4:0
//! ```
//!
//! Tokens may come in any order and any subset. A token whose value is not a
//! non-negative integer is dropped on its own; the remaining tokens still decode.
//! Unknown keys are ignored.
//!
//! `EN:<mask>` is a protocol extension, not sent by stock firmware: firmware that
//! echoes its enable signals adds it so the console can confirm them.
//!
//! ## Usage
//!
//! ```rust
//! use ess_rs::ess::frame::{parse_status, ParseOutcome};
//!
//! match parse_status("BAT:10,FAULT:5") {
//!     ParseOutcome::Status(frame) => {
//!         assert_eq!(frame.battery, Some(10));
//!         assert_eq!(frame.fault, Some(5));
//!         assert_eq!(frame.state, None);
//!     }
//!     ParseOutcome::NotAStatusFrame => unreachable!(),
//! }
//! ```

use crate::constants::{DEVICE_ERROR_PREFIX, STATUS_PREFIX};
use crate::ess::voltage::Channel;
use nom::{
    character::complete::{alphanumeric1, char, digit1, space0},
    combinator::{all_consuming, map_res, rest},
    sequence::{delimited, separated_pair},
    IResult,
};
use serde::Serialize;

/// Sparse raw contents of one status frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedFrame {
    /// `BAT`: battery level in percent
    pub battery: Option<u32>,
    /// `STATE`: operating state index
    pub state: Option<u32>,
    /// `FAULT`: fault bitmask
    pub fault: Option<u32>,
    /// `V1`..`V4`: raw voltage samples in [`Channel`] order
    pub voltages: [Option<u32>; 4],
    /// `EN`: enable-signal echo (extension; bit order of the `E` command codes)
    pub enable_mask: Option<u32>,
    /// Recognized keys whose value could not be decoded
    pub rejected: Vec<String>,
}

impl ParsedFrame {
    /// Raw sample for a channel, if the frame carried one.
    pub fn voltage(&self, channel: Channel) -> Option<u32> {
        self.voltages[channel.index()]
    }

    /// True when no field could be extracted.
    pub fn is_empty(&self) -> bool {
        self.battery.is_none()
            && self.state.is_none()
            && self.fault.is_none()
            && self.voltages.iter().all(Option::is_none)
            && self.enable_mask.is_none()
    }

    /// Number of fields present.
    pub fn field_count(&self) -> usize {
        [self.battery, self.state, self.fault, self.enable_mask]
            .iter()
            .chain(self.voltages.iter())
            .filter(|v| v.is_some())
            .count()
    }

    fn slot(&mut self, key: &str) -> Option<&mut Option<u32>> {
        match key {
            "BAT" => Some(&mut self.battery),
            "STATE" => Some(&mut self.state),
            "FAULT" => Some(&mut self.fault),
            "V1" => Some(&mut self.voltages[0]),
            "V2" => Some(&mut self.voltages[1]),
            "V3" => Some(&mut self.voltages[2]),
            "V4" => Some(&mut self.voltages[3]),
            "EN" => Some(&mut self.enable_mask),
            _ => None,
        }
    }
}

/// Result of offering a line to the status decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Status(ParsedFrame),
    /// The line is an echo or free text. Not an error.
    NotAStatusFrame,
}

/// A classified inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundLine {
    Status(ParsedFrame),
    /// `ERROR:<message>` reported by the firmware.
    DeviceError(String),
    Text(String),
}

/// Splits a token into `KEY` and the untouched value text.
fn key_value(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(delimited(space0, alphanumeric1, space0), char(':'), rest)(input)
}

/// A non-negative integer filling the whole value, surrounding blanks allowed.
fn raw_value(input: &str) -> IResult<&str, u32> {
    all_consuming(delimited(space0, map_res(digit1, str::parse::<u32>), space0))(input)
}

/// Decodes a status line.
///
/// Never fails: a `BAT:` line with nothing decodable yields an empty
/// [`ParsedFrame`] which the caller reports as a soft event.
pub fn parse_status(line: &str) -> ParseOutcome {
    if !line.starts_with(STATUS_PREFIX) {
        return ParseOutcome::NotAStatusFrame;
    }

    let mut frame = ParsedFrame::default();
    for token in line.split(',') {
        let Ok((_, (key, value))) = key_value(token) else {
            continue;
        };
        let Some(slot) = frame.slot(key) else {
            continue;
        };
        // First occurrence wins
        if slot.is_some() {
            continue;
        }
        match raw_value(value) {
            Ok((_, raw)) => *slot = Some(raw),
            Err(_) => frame.rejected.push(key.to_string()),
        }
    }

    ParseOutcome::Status(frame)
}

/// Sorts a trimmed inbound line into status frame, device error, or free text.
pub fn classify_line(line: &str) -> InboundLine {
    if let ParseOutcome::Status(frame) = parse_status(line) {
        return InboundLine::Status(frame);
    }
    match line.strip_prefix(DEVICE_ERROR_PREFIX) {
        Some(message) => InboundLine::DeviceError(message.trim().to_string()),
        None => InboundLine::Text(line.to_string()),
    }
}
