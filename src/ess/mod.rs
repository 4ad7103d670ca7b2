//! The ess module contains the controller protocol: status frame decoding,
//! command encoding, the device state model, and the serial link with its
//! polling loop.

pub mod command;
pub mod event;
pub mod frame;
pub mod history;
pub mod line_buffer;
pub mod model;
pub mod poller;
pub mod serial_mock;
pub mod session;
pub mod state;
pub mod voltage;

pub use command::{ChargeMode, Command, EnableSignal, RelayAction};
pub use event::EngineEvent;
pub use frame::{classify_line, parse_status, InboundLine, ParseOutcome, ParsedFrame};
pub use history::{AlignedRow, HistorySeries, Sample, VoltageHistory};
pub use line_buffer::LineBuffer;
pub use model::DeviceModel;
pub use poller::PollerState;
pub use session::{LinkSession, SerialConfig, Transport};
pub use state::{ChangeEvent, CommandEffect, DeviceState, EnableSignals, Fault, FaultFlags, OperatingState};
pub use voltage::{format_volts, Channel, VoltageScale};

/// Test double for the serial link.
pub use serial_mock::MockSerialPort;
