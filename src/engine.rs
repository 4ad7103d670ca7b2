//! # ESS Engine
//!
//! This module provides the EssEngine struct, the entry point the presentation
//! layer talks to. It owns one link session at a time, the polling task that
//! serves it, and the device model shared between that task and the command
//! path.
//!
//! Commands are fire-and-forget: the engine updates the commanded flags right
//! away, writes the wire line, and returns. The device's next status frame is
//! the only confirmation.

use crate::config::EngineConfig;
use crate::error::{EssError, Result};
use crate::ess::command::{ChargeMode, Command, EnableSignal, RelayAction};
use crate::ess::event::EngineEvent;
use crate::ess::frame::{classify_line, InboundLine};
use crate::ess::history::VoltageHistory;
use crate::ess::model::DeviceModel;
use crate::ess::poller::{PollTiming, Poller, PollerState};
use crate::ess::session::{LinkSession, SessionWriter, Transport};
use crate::ess::state::{ChangeEvent, CommandEffect, DeviceState};
use crate::logging::{log_debug, log_error, log_warn, LogLine};
use chrono::Local;
use log::info;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// State reachable from both the command path and the polling task.
pub(crate) struct EngineShared {
    model: Mutex<DeviceModel>,
    events: broadcast::Sender<EngineEvent>,
    /// Present exactly while a session is open.
    writer: tokio::sync::Mutex<Option<SessionWriter>>,
    endpoint: Mutex<Option<String>>,
    last_status: Mutex<Instant>,
}

impl EngineShared {
    fn new(config: &EngineConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        EngineShared {
            model: Mutex::new(DeviceModel::new(
                config.enable_signals,
                config.history_capacity,
                config.voltage_scale,
            )),
            events,
            writer: tokio::sync::Mutex::new(None),
            endpoint: Mutex::new(None),
            last_status: Mutex::new(Instant::now()),
        }
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn emit_changes(&self, changes: Vec<ChangeEvent>) {
        for change in changes {
            self.emit(EngineEvent::State(change));
        }
    }

    /// Decodes one received line and applies it to the model.
    ///
    /// Only the blank check and the log text see the trimmed line; the status
    /// prefix must start the line as it arrived.
    pub(crate) fn handle_line(&self, line: &str) {
        let text = line.trim();
        if text.is_empty() {
            return;
        }
        log_debug(&format!("< {text}"));
        self.emit(EngineEvent::Log(LogLine::received(text)));

        match classify_line(line) {
            InboundLine::Status(frame) => {
                if frame.is_empty() {
                    log_warn(&format!("Status frame without decodable fields: {text}"));
                    self.emit(EngineEvent::Log(LogLine::info(format!(
                        "Status parsing error: no fields in \"{text}\""
                    ))));
                }
                for key in &frame.rejected {
                    log_warn(&format!("Dropping {key} from status frame: {text}"));
                    self.emit(EngineEvent::Log(LogLine::info(format!(
                        "Status parsing error: bad value for {key}"
                    ))));
                }
                // Publish under the lock so subscribers see changes in apply order
                let mut model = lock(&self.model);
                let changes = model.apply_frame(&frame, Local::now());
                self.emit_changes(changes);
            }
            InboundLine::DeviceError(message) => {
                log_warn(&format!("Device reported error: {message}"));
                self.emit(EngineEvent::State(ChangeEvent::DeviceError(message)));
            }
            InboundLine::Text(_) => {}
        }
    }

    /// Whether the heartbeat should go out now.
    pub(crate) fn status_due(&self, interval: Duration) -> bool {
        lock(&self.last_status).elapsed() > interval
    }

    /// Puts a command on the wire. A status request restarts the heartbeat timer.
    pub(crate) async fn transmit(&self, command: &Command) -> Result<()> {
        let wire = command.encode();
        {
            let mut writer = self.writer.lock().await;
            let writer = writer.as_mut().ok_or(EssError::NotConnected)?;
            writer.write_line(&wire).await?;
        }
        if command.is_status_request() {
            *lock(&self.last_status) = Instant::now();
        }
        log_debug(&format!("> {wire}"));
        self.emit(EngineEvent::Log(LogLine::sent(wire)));
        Ok(())
    }

    /// Ends the session if one is open: closes the writer, resets the model,
    /// and announces the closure. Returns false when there was nothing to close.
    pub(crate) async fn close_session(&self, reason: Option<String>) -> bool {
        let Some(mut writer) = self.writer.lock().await.take() else {
            return false;
        };
        writer.close().await;

        let endpoint = lock(&self.endpoint).take();
        lock(&self.model).reset();

        match &reason {
            Some(reason) => log_error(&format!("Connection lost: {reason}")),
            None => info!("Connection closed"),
        }
        self.emit(EngineEvent::Log(LogLine::info("Connection closed")));
        self.emit(EngineEvent::ConnectionClosed { endpoint, reason });
        true
    }
}

/// The device protocol engine.
pub struct EssEngine {
    config: EngineConfig,
    shared: Arc<EngineShared>,
    poller: Poller,
}

impl EssEngine {
    pub fn new(config: EngineConfig) -> Self {
        let shared = Arc::new(EngineShared::new(&config));
        EssEngine {
            config,
            shared,
            poller: Poller::stopped(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A new receiver for engine events. Events sent before subscribing are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.events.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.shared.endpoint).is_some()
    }

    pub fn endpoint(&self) -> Option<String> {
        lock(&self.shared.endpoint).clone()
    }

    pub fn poller_state(&self) -> PollerState {
        self.poller.state()
    }

    /// Snapshot of the device state.
    pub fn state(&self) -> DeviceState {
        lock(&self.shared.model).state().clone()
    }

    /// Snapshot of the voltage history.
    pub fn history(&self) -> VoltageHistory {
        lock(&self.shared.model).history().clone()
    }

    /// Opens the serial port and starts polling.
    pub async fn connect(&mut self, endpoint: &str) -> Result<()> {
        if let Some(current) = self.endpoint() {
            return Err(EssError::AlreadyConnected(current));
        }
        let session = match LinkSession::open(endpoint, &self.config.serial) {
            Ok(session) => session,
            Err(e) => {
                self.shared.emit(EngineEvent::Log(LogLine::info(format!("Connection error: {e}"))));
                return Err(e);
            }
        };
        self.attach(session).await
    }

    /// Starts a session over an already-open transport.
    pub async fn connect_with_transport(&mut self, endpoint: &str, transport: impl Transport) -> Result<()> {
        if let Some(current) = self.endpoint() {
            return Err(EssError::AlreadyConnected(current));
        }
        self.attach(LinkSession::from_transport(endpoint, transport)).await
    }

    async fn attach(&mut self, session: LinkSession) -> Result<()> {
        // A previous session may have died on its own; reap its task
        self.poller.stop().await;

        let endpoint = session.endpoint().to_string();
        let (reader, writer) = session.into_split();

        lock(&self.shared.model).reset();
        *lock(&self.shared.last_status) = Instant::now();
        *self.shared.writer.lock().await = Some(writer);
        *lock(&self.shared.endpoint) = Some(endpoint.clone());

        info!("Port {endpoint} connection opened");
        self.shared.emit(EngineEvent::Log(LogLine::info(format!(
            "Port {endpoint} connection opened"
        ))));
        self.shared.emit(EngineEvent::ConnectionOpened { endpoint });

        let timing = PollTiming {
            status_interval: self.config.status_interval,
            poll_interval: self.config.poll_interval,
        };
        self.poller = Poller::start(Arc::clone(&self.shared), reader, timing);

        // Refresh right away instead of waiting for the first heartbeat
        self.send_or_close(&Command::StatusRequest).await
    }

    /// Stops polling, then closes the link. Does nothing when already closed.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.poller.stop().await;
        self.shared.close_session(None).await;
        Ok(())
    }

    /// Issues a command: local state first, then the wire.
    ///
    /// Returns the local effect. A write failure closes the session.
    pub async fn issue(&mut self, command: Command) -> Result<CommandEffect> {
        command.validate()?;
        if !self.is_connected() {
            return Err(EssError::NotConnected);
        }

        let effect = {
            let mut model = lock(&self.shared.model);
            let effect = model.apply_command(&command)?;
            if let Command::EnableSignal { .. } = command {
                self.shared.emit(EngineEvent::Log(LogLine::info(command.to_string())));
            }
            // Same lock as the polling path, so a racing frame cannot publish in between
            self.shared.emit_changes(effect.events.clone());
            effect
        };

        self.send_or_close(&effect.command).await?;
        Ok(effect)
    }

    /// Sends free text as-is.
    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.issue(Command::Raw(text.to_string())).await.map(|_| ())
    }

    pub async fn request_status(&mut self) -> Result<()> {
        self.issue(Command::StatusRequest).await.map(|_| ())
    }

    pub async fn set_led(&mut self, index: u8, on: bool) -> Result<CommandEffect> {
        self.issue(Command::Led { index, on }).await
    }

    pub async fn set_enable_signal(&mut self, signal: EnableSignal, on: bool) -> Result<CommandEffect> {
        self.issue(Command::EnableSignal { signal, on }).await
    }

    pub async fn set_charge_mode(&mut self, mode: ChargeMode) -> Result<CommandEffect> {
        self.issue(Command::ChargeMode(mode)).await
    }

    pub async fn set_power_output(&mut self, on: bool) -> Result<CommandEffect> {
        self.issue(Command::PowerOutput(on)).await
    }

    pub async fn set_relay(&mut self, action: RelayAction) -> Result<CommandEffect> {
        self.issue(Command::Relay(action)).await
    }

    async fn send_or_close(&mut self, command: &Command) -> Result<()> {
        match self.shared.transmit(command).await {
            Err(e) if e.is_fatal() => {
                self.shared.emit(EngineEvent::Log(LogLine::info(format!(
                    "Command sending error: {e}"
                ))));
                self.poller.stop().await;
                self.shared.close_session(Some(e.to_string())).await;
                Err(e)
            }
            other => other,
        }
    }
}

impl Default for EssEngine {
    fn default() -> Self {
        EssEngine::new(EngineConfig::default())
    }
}
