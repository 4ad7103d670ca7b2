//! # Status Polling Loop
//!
//! One background task per open session. Each tick it drains whatever bytes the
//! link has ready, reassembles complete lines, hands them to the engine for
//! decoding, and sends the `S` heartbeat when the status interval has elapsed.
//! Between ticks it idles for the poll interval, racing the stop signal so a
//! stop request is seen within one tick.
//!
//! [`Poller::stop`] waits for the task to finish. Only after it returns may the
//! transport be closed; the task owns the read direction until then.

use crate::engine::EngineShared;
use crate::error::EssError;
use crate::ess::command::Command;
use crate::ess::line_buffer::LineBuffer;
use crate::ess::session::SessionReader;
use crate::logging::LogLine;
use crate::ess::event::EngineEvent;
use log::{debug, error, info};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Stopped,
    Running,
    Stopping,
}

impl PollerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => PollerState::Running,
            2 => PollerState::Stopping,
            _ => PollerState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            PollerState::Stopped => 0,
            PollerState::Running => 1,
            PollerState::Stopping => 2,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SharedState(Arc<AtomicU8>);

impl SharedState {
    fn get(&self) -> PollerState {
        PollerState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: PollerState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }
}

/// Timing of the polling loop.
#[derive(Debug, Clone, Copy)]
pub struct PollTiming {
    pub status_interval: Duration,
    pub poll_interval: Duration,
}

/// Handle to the background polling task.
pub struct Poller {
    state: SharedState,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Poller {
    /// Stopped handle with no task behind it.
    pub fn stopped() -> Self {
        Poller {
            state: SharedState::default(),
            shutdown_tx: None,
            task: None,
        }
    }

    /// Spawns the polling task for a freshly opened session.
    pub(crate) fn start(shared: Arc<EngineShared>, reader: SessionReader, timing: PollTiming) -> Self {
        let state = SharedState::default();
        state.set(PollerState::Running);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task_state = state.clone();
        let task = tokio::spawn(async move {
            run(shared, reader, shutdown_rx, &task_state, timing).await;
            task_state.set(PollerState::Stopped);
        });

        Poller {
            state,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }

    pub fn state(&self) -> PollerState {
        self.state.get()
    }

    /// True once the task has ended, whether stopped or failed.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Requests the loop to end and waits until it has.
    ///
    /// Idempotent. When this returns the task no longer touches the link.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        if self.state.get() == PollerState::Running {
            self.state.set(PollerState::Stopping);
        }
        if let Some(tx) = self.shutdown_tx.take() {
            // Already gone if the loop exited by itself
            let _ = tx.send(());
        }
        if let Err(e) = task.await {
            error!("Polling task ended abnormally: {e}");
        }
        self.state.set(PollerState::Stopped);
    }
}

async fn run(
    shared: Arc<EngineShared>,
    mut reader: SessionReader,
    mut shutdown: oneshot::Receiver<()>,
    state: &SharedState,
    timing: PollTiming,
) {
    info!("Polling loop started");
    let mut lines = LineBuffer::new();

    let failure: Option<EssError> = loop {
        if state.get() != PollerState::Running {
            break None;
        }

        match reader.read_available().await {
            Ok(chunk) if !chunk.is_empty() => {
                lines.extend(&chunk);
                for line in lines.drain_lines() {
                    shared.handle_line(&line);
                }
            }
            Ok(_) => {}
            Err(e) => break Some(e),
        }

        if shared.status_due(timing.status_interval) {
            if let Err(e) = shared.transmit(&Command::StatusRequest).await {
                break Some(e);
            }
        }

        tokio::select! {
            // Also fires when the handle is dropped without stop()
            _ = &mut shutdown => break None,
            _ = tokio::time::sleep(timing.poll_interval) => {}
        }
    };

    match failure {
        Some(e) => {
            error!("Polling loop failed: {e}");
            shared.emit(EngineEvent::Log(LogLine::info(format!("Data reading error: {e}"))));
            shared.close_session(Some(e.to_string())).await;
        }
        None => debug!("Polling loop stopped"),
    }
}
