//! # ESS Command Encoder
//!
//! Maps typed commands to their exact wire text. The CR-LF terminator is not
//! part of the encoding; the link session appends it.
//!
//! | Command        | Wire      | Arguments                   |
//! |----------------|-----------|-----------------------------|
//! | LED            | `L{i}{v}` | i 0-5, v 0/1                |
//! | Enable signal  | `E{k}{v}` | k see [`EnableSignal::code`] |
//! | Charge mode    | `C{m}`    | 0 off, 1 normal, 2 fast     |
//! | Power output   | `P{v}`    | v 0/1                       |
//! | Latch relay    | `R{a}`    | 0 off, 1 set, 2 reset       |
//! | Status request | `S`       |                             |
//! | Free text      | as given  | not validated               |

use crate::constants::{
    CMD_CHARGE_MODE, CMD_ENABLE_SIGNAL, CMD_LED, CMD_POWER_OUTPUT, CMD_RELAY, CMD_STATUS_REQUEST,
    LED_COUNT, LED_NAMES,
};
use crate::error::{EssError, Result};
use serde::Serialize;
use std::fmt;

/// Individually switchable device-side gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EnableSignal {
    FastCharge,
    Charge,
    Block100A,
    Block200A,
}

impl EnableSignal {
    pub const ALL: [EnableSignal; 4] = [
        EnableSignal::FastCharge,
        EnableSignal::Charge,
        EnableSignal::Block100A,
        EnableSignal::Block200A,
    ];

    /// Wire code, also the bit position in an `EN` echo mask.
    pub fn code(self) -> u8 {
        match self {
            EnableSignal::FastCharge => 0,
            EnableSignal::Charge => 1,
            EnableSignal::Block100A => 2,
            EnableSignal::Block200A => 3,
        }
    }
}

impl fmt::Display for EnableSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnableSignal::FastCharge => "EN_FAST_CHARGE",
            EnableSignal::Charge => "EN_CHARGE",
            EnableSignal::Block100A => "EN_BLOCK_100A",
            EnableSignal::Block200A => "EN_BLOCK_200A",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ChargeMode {
    #[default]
    Off,
    Normal,
    Fast,
}

impl ChargeMode {
    pub fn code(self) -> u8 {
        match self {
            ChargeMode::Off => 0,
            ChargeMode::Normal => 1,
            ChargeMode::Fast => 2,
        }
    }
}

impl fmt::Display for ChargeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChargeMode::Off => "Charge Off",
            ChargeMode::Normal => "Normal Charge",
            ChargeMode::Fast => "Fast Charge",
        };
        f.write_str(name)
    }
}

/// Latch relay actions. The device never echoes the relay state back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum RelayAction {
    #[default]
    Off,
    Set,
    Reset,
}

impl RelayAction {
    pub fn code(self) -> u8 {
        match self {
            RelayAction::Off => 0,
            RelayAction::Set => 1,
            RelayAction::Reset => 2,
        }
    }
}

impl fmt::Display for RelayAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayAction::Off => "Relay Off",
            RelayAction::Set => "Relay Set",
            RelayAction::Reset => "Relay Reset",
        };
        f.write_str(name)
    }
}

/// A command the console can send to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Command {
    Led { index: u8, on: bool },
    EnableSignal { signal: EnableSignal, on: bool },
    ChargeMode(ChargeMode),
    PowerOutput(bool),
    Relay(RelayAction),
    StatusRequest,
    /// Unvalidated passthrough.
    Raw(String),
}

impl Command {
    /// Checks argument ranges. Raw text is never validated.
    pub fn validate(&self) -> Result<()> {
        match self {
            Command::Led { index, .. } if usize::from(*index) >= LED_COUNT => Err(
                EssError::InvalidCommand(format!("LED index {index} out of range 0-{}", LED_COUNT - 1)),
            ),
            _ => Ok(()),
        }
    }

    /// Exact wire text, without the line terminator.
    pub fn encode(&self) -> String {
        match self {
            Command::Led { index, on } => format!("{CMD_LED}{index}{}", u8::from(*on)),
            Command::EnableSignal { signal, on } => {
                format!("{CMD_ENABLE_SIGNAL}{}{}", signal.code(), u8::from(*on))
            }
            Command::ChargeMode(mode) => format!("{CMD_CHARGE_MODE}{}", mode.code()),
            Command::PowerOutput(on) => format!("{CMD_POWER_OUTPUT}{}", u8::from(*on)),
            Command::Relay(action) => format!("{CMD_RELAY}{}", action.code()),
            Command::StatusRequest => CMD_STATUS_REQUEST.to_string(),
            Command::Raw(text) => text.clone(),
        }
    }

    /// Whether sending this command counts as a status request for the heartbeat.
    pub fn is_status_request(&self) -> bool {
        match self {
            Command::StatusRequest => true,
            Command::Raw(text) => text == CMD_STATUS_REQUEST,
            _ => false,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Led { index, on } => {
                let name = LED_NAMES.get(usize::from(*index)).copied().unwrap_or("LED ?");
                write!(f, "{name} {}", if *on { "on" } else { "off" })
            }
            Command::EnableSignal { signal, on } => write!(f, "Set {signal} to {}", u8::from(*on)),
            Command::ChargeMode(mode) => write!(f, "{mode}"),
            Command::PowerOutput(on) => {
                write!(f, "Power output {}", if *on { "enabled" } else { "disabled" })
            }
            Command::Relay(action) => write!(f, "{action}"),
            Command::StatusRequest => f.write_str("Status request"),
            Command::Raw(text) => write!(f, "Raw \"{text}\""),
        }
    }
}
