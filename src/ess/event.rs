//! Events delivered from the engine to the presentation layer.

use crate::ess::state::ChangeEvent;
use crate::logging::LogLine;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EngineEvent {
    /// Part of the device state changed.
    State(ChangeEvent),
    ConnectionOpened { endpoint: String },
    /// The session ended. `reason` is set when it ended on a transport failure.
    ConnectionClosed {
        endpoint: Option<String>,
        reason: Option<String>,
    },
    /// A line for the console's log view.
    Log(LogLine),
}

impl EngineEvent {
    pub fn as_change(&self) -> Option<&ChangeEvent> {
        match self {
            EngineEvent::State(change) => Some(change),
            _ => None,
        }
    }
}
