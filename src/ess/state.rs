//! # Device State Model
//!
//! [`DeviceState`] is the console's authoritative picture of the controller.
//! Status frames refresh it; command calls update commanded flags optimistically
//! at issue time, before the device confirms anything, and enforce the
//! cross-field rules between related controls:
//!
//! - charge mode Normal sets `charge` and clears `fast_charge`, Fast does the
//!   inverse, Off clears both;
//! - power output on sets both blocking MOSFET signals, off clears both.
//!
//! Every mutation reports what changed as a list of [`ChangeEvent`]s.

use crate::constants::{BATTERY_MAX_PERCENT, LED_COUNT};
use crate::error::{EssError, Result};
use crate::ess::command::{ChargeMode, Command, EnableSignal, RelayAction};
use crate::ess::frame::ParsedFrame;
use crate::ess::history::Sample;
use crate::ess::voltage::{Channel, VoltageScale};
use bitflags::bitflags;
use log::{debug, warn};
use serde::Serialize;
use std::fmt;

/// Controller operating state, decoded from the `STATE` index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperatingState {
    Standby,
    Charging,
    Discharging,
    Error,
    /// An index outside the known table.
    Unknown(u32),
}

impl OperatingState {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => OperatingState::Standby,
            1 => OperatingState::Charging,
            2 => OperatingState::Discharging,
            3 => OperatingState::Error,
            n => OperatingState::Unknown(n),
        }
    }
}

impl fmt::Display for OperatingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingState::Standby => f.write_str("Standby"),
            OperatingState::Charging => f.write_str("Charging"),
            OperatingState::Discharging => f.write_str("Discharging"),
            OperatingState::Error => f.write_str("Error"),
            OperatingState::Unknown(n) => write!(f, "Unknown ({n})"),
        }
    }
}

bitflags! {
    /// Fault lines latched by the controller, as sent in `FAULT`.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
    pub struct FaultFlags: u32 {
        const BLOCK_200A  = 0b0001;
        const BLOCK_100A  = 0b0010;
        const CHARGE      = 0b0100;
        const FAST_CHARGE = 0b1000;
    }
}

/// A single named fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Fault {
    Block200A,
    Block100A,
    Charge,
    FastCharge,
}

impl Fault {
    /// All faults in bit order.
    pub const ALL: [Fault; 4] = [Fault::Block200A, Fault::Block100A, Fault::Charge, Fault::FastCharge];

    pub fn flag(self) -> FaultFlags {
        match self {
            Fault::Block200A => FaultFlags::BLOCK_200A,
            Fault::Block100A => FaultFlags::BLOCK_100A,
            Fault::Charge => FaultFlags::CHARGE,
            Fault::FastCharge => FaultFlags::FAST_CHARGE,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Fault::Block200A => "BLOCK_200A",
            Fault::Block100A => "BLOCK_100A",
            Fault::Charge => "CHARGE",
            Fault::FastCharge => "FAST_CHARGE",
        };
        f.write_str(name)
    }
}

impl FaultFlags {
    /// Active faults in bit order.
    pub fn faults(self) -> Vec<Fault> {
        Fault::ALL.into_iter().filter(|f| self.contains(f.flag())).collect()
    }
}

/// The four individually controllable enable signals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnableSignals {
    pub fast_charge: bool,
    pub charge: bool,
    pub block_100a: bool,
    pub block_200a: bool,
}

impl EnableSignals {
    pub fn get(&self, signal: EnableSignal) -> bool {
        match signal {
            EnableSignal::FastCharge => self.fast_charge,
            EnableSignal::Charge => self.charge,
            EnableSignal::Block100A => self.block_100a,
            EnableSignal::Block200A => self.block_200a,
        }
    }

    pub fn set(&mut self, signal: EnableSignal, on: bool) {
        let slot = match signal {
            EnableSignal::FastCharge => &mut self.fast_charge,
            EnableSignal::Charge => &mut self.charge,
            EnableSignal::Block100A => &mut self.block_100a,
            EnableSignal::Block200A => &mut self.block_200a,
        };
        *slot = on;
    }
}

/// A typed notification that part of the device state changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ChangeEvent {
    Battery(u8),
    OperatingState(OperatingState),
    FaultsCleared,
    /// Active faults in bit order.
    Faults(Vec<Fault>),
    Voltage { channel: Channel, volts: f64 },
    HistoryAppended { channel: Channel, sample: Sample },
    Led { index: u8, on: bool },
    EnableSignal { signal: EnableSignal, on: bool },
    ChargeMode(ChargeMode),
    PowerOutput(bool),
    Relay(RelayAction),
    /// `ERROR:` line reported by the firmware.
    DeviceError(String),
}

/// What issuing a command did locally, and what to put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEffect {
    pub events: Vec<ChangeEvent>,
    pub command: Command,
}

impl CommandEffect {
    fn new(command: Command) -> Self {
        CommandEffect {
            events: Vec::new(),
            command,
        }
    }

    /// The exact wire text, without the line terminator.
    pub fn wire(&self) -> String {
        self.command.encode()
    }
}

/// The authoritative device record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub battery_percent: u8,
    /// `None` until the first frame carrying `STATE`.
    pub operating_state: Option<OperatingState>,
    pub faults: FaultFlags,
    /// Volts per channel in [`Channel`] order; `None` until the first sample.
    pub voltages: [Option<f64>; 4],
    pub leds: [bool; LED_COUNT],
    /// `None` for firmware without individual enable commands.
    pub enable_signals: Option<EnableSignals>,
    pub charge_mode: ChargeMode,
    pub power_output: bool,
    pub relay_last_command: RelayAction,
}

impl DeviceState {
    pub fn new(with_enable_signals: bool) -> Self {
        DeviceState {
            battery_percent: 0,
            operating_state: None,
            faults: FaultFlags::empty(),
            voltages: [None; 4],
            leds: [false; LED_COUNT],
            enable_signals: with_enable_signals.then(EnableSignals::default),
            charge_mode: ChargeMode::Off,
            power_output: false,
            relay_last_command: RelayAction::Off,
        }
    }

    /// Back to session-start defaults, keeping the protocol variant.
    pub fn reset(&mut self) {
        *self = DeviceState::new(self.enable_signals.is_some());
    }

    pub fn voltage(&self, channel: Channel) -> Option<f64> {
        self.voltages[channel.index()]
    }

    /// Applies a decoded status frame. Fields absent from the frame are untouched.
    pub fn apply_frame(&mut self, frame: &ParsedFrame, scale: &VoltageScale) -> Vec<ChangeEvent> {
        let mut events = Vec::new();

        if let Some(raw) = frame.battery {
            if raw <= BATTERY_MAX_PERCENT {
                // Bounded by BATTERY_MAX_PERCENT, fits u8
                let percent = raw as u8;
                self.battery_percent = percent;
                events.push(ChangeEvent::Battery(percent));
            } else {
                warn!("Dropping battery level {raw}: outside 0-{BATTERY_MAX_PERCENT}");
            }
        }

        if let Some(raw) = frame.state {
            let state = OperatingState::from_raw(raw);
            self.operating_state = Some(state);
            events.push(ChangeEvent::OperatingState(state));
        }

        if let Some(raw) = frame.fault {
            let faults = FaultFlags::from_bits_truncate(raw);
            if faults.bits() != raw {
                warn!("Ignoring unknown fault bits in {raw:#x}");
            }
            self.faults = faults;
            events.push(if faults.is_empty() {
                ChangeEvent::FaultsCleared
            } else {
                ChangeEvent::Faults(faults.faults())
            });
        }

        for channel in Channel::ALL {
            if let Some(raw) = frame.voltage(channel) {
                let volts = scale.to_volts(raw);
                self.voltages[channel.index()] = Some(volts);
                events.push(ChangeEvent::Voltage { channel, volts });
            }
        }

        // Extension key; stock firmware leaves the optimistic flags unconfirmed
        if let Some(mask) = frame.enable_mask {
            match self.enable_signals.as_mut() {
                Some(signals) => {
                    for signal in EnableSignal::ALL {
                        let on = mask & (1 << signal.code()) != 0;
                        signals.set(signal, on);
                        events.push(ChangeEvent::EnableSignal { signal, on });
                    }
                }
                None => debug!("Ignoring EN:{mask}, enable signals not exposed"),
            }
        }

        events
    }

    pub fn set_led(&mut self, index: u8, on: bool) -> Result<CommandEffect> {
        let command = Command::Led { index, on };
        command.validate()?;
        self.leds[usize::from(index)] = on;
        let mut effect = CommandEffect::new(command);
        effect.events.push(ChangeEvent::Led { index, on });
        Ok(effect)
    }

    pub fn set_enable_signal(&mut self, signal: EnableSignal, on: bool) -> Result<CommandEffect> {
        let signals = self.enable_signals.as_mut().ok_or_else(|| {
            EssError::Unsupported(format!("{signal} cannot be switched individually"))
        })?;
        signals.set(signal, on);
        let mut effect = CommandEffect::new(Command::EnableSignal { signal, on });
        effect.events.push(ChangeEvent::EnableSignal { signal, on });
        Ok(effect)
    }

    pub fn set_charge_mode(&mut self, mode: ChargeMode) -> CommandEffect {
        self.charge_mode = mode;
        let mut effect = CommandEffect::new(Command::ChargeMode(mode));
        effect.events.push(ChangeEvent::ChargeMode(mode));

        let (charge, fast_charge) = match mode {
            ChargeMode::Off => (false, false),
            ChargeMode::Normal => (true, false),
            ChargeMode::Fast => (false, true),
        };
        self.sync_signals(
            &[(EnableSignal::Charge, charge), (EnableSignal::FastCharge, fast_charge)],
            &mut effect.events,
        );
        effect
    }

    pub fn set_power_output(&mut self, on: bool) -> CommandEffect {
        self.power_output = on;
        let mut effect = CommandEffect::new(Command::PowerOutput(on));
        effect.events.push(ChangeEvent::PowerOutput(on));
        self.sync_signals(
            &[(EnableSignal::Block100A, on), (EnableSignal::Block200A, on)],
            &mut effect.events,
        );
        effect
    }

    pub fn set_relay(&mut self, action: RelayAction) -> CommandEffect {
        self.relay_last_command = action;
        let mut effect = CommandEffect::new(Command::Relay(action));
        effect.events.push(ChangeEvent::Relay(action));
        effect
    }

    /// Routes any command through the matching mutator.
    ///
    /// Status requests and raw text leave the state untouched.
    pub fn apply_command(&mut self, command: &Command) -> Result<CommandEffect> {
        match command {
            Command::Led { index, on } => self.set_led(*index, *on),
            Command::EnableSignal { signal, on } => self.set_enable_signal(*signal, *on),
            Command::ChargeMode(mode) => Ok(self.set_charge_mode(*mode)),
            Command::PowerOutput(on) => Ok(self.set_power_output(*on)),
            Command::Relay(action) => Ok(self.set_relay(*action)),
            Command::StatusRequest | Command::Raw(_) => Ok(CommandEffect::new(command.clone())),
        }
    }

    fn sync_signals(&mut self, targets: &[(EnableSignal, bool)], events: &mut Vec<ChangeEvent>) {
        let Some(signals) = self.enable_signals.as_mut() else {
            return;
        };
        for &(signal, on) in targets {
            signals.set(signal, on);
            events.push(ChangeEvent::EnableSignal { signal, on });
        }
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        DeviceState::new(true)
    }
}
