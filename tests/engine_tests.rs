//! Integration tests for the `EssEngine` against a scripted serial port.

use ess_rs::ess::MockSerialPort;
use ess_rs::{
    ChangeEvent, Channel, ChargeMode, Command, DeviceState, EnableSignal, EngineConfig,
    EngineEvent, EssEngine, EssError, OperatingState, PollerState, RelayAction,
};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};

const PORT: &str = "/dev/ttyMOCK0";

fn fast_config() -> EngineConfig {
    EngineConfig::default()
        .with_status_interval(Duration::from_secs(10))
        .with_poll_interval(Duration::from_millis(5))
}

async fn connected(config: EngineConfig) -> (EssEngine, MockSerialPort) {
    let port = MockSerialPort::new();
    let mut engine = EssEngine::new(config);
    engine
        .connect_with_transport(PORT, port.clone())
        .await
        .expect("connect over mock");
    (engine, port)
}

/// Polls `condition` until it holds or a second passes.
async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(1);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(5)).await;
    }
    condition()
}

fn drain(events: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn status_requests(port: &MockSerialPort) -> usize {
    port.sent_lines().iter().filter(|line| *line == "S").count()
}

/// Tests that connecting announces the session and sends `S` right away.
#[tokio::test]
async fn test_connect_requests_status_immediately() {
    let port = MockSerialPort::new();
    let mut engine = EssEngine::new(fast_config());
    let mut events = engine.subscribe();

    engine.connect_with_transport(PORT, port.clone()).await.unwrap();

    assert!(engine.is_connected());
    assert_eq!(engine.endpoint().as_deref(), Some(PORT));
    assert_eq!(engine.poller_state(), PollerState::Running);
    assert_eq!(port.sent_lines(), vec!["S".to_string()]);

    let events = drain(&mut events);
    assert!(events.contains(&EngineEvent::ConnectionOpened { endpoint: PORT.to_string() }));
    assert!(events.iter().any(|e| matches!(e, EngineEvent::Log(line) if line.text == "S")));

    engine.disconnect().await.unwrap();
}

/// Tests that a second connect is refused while a session is open.
#[tokio::test]
async fn test_connect_twice_is_rejected() {
    let (mut engine, _port) = connected(fast_config()).await;
    let result = engine
        .connect_with_transport("/dev/ttyMOCK1", MockSerialPort::new())
        .await;
    assert!(matches!(result, Err(EssError::AlreadyConnected(ref e)) if e == PORT));
    engine.disconnect().await.unwrap();
}

/// Tests that a status frame updates the state and emits typed events.
#[tokio::test]
async fn test_status_frame_updates_state() {
    let (mut engine, port) = connected(fast_config()).await;
    let mut events = engine.subscribe();

    port.queue_line("BAT:75,STATE:1,FAULT:0,V1:12300,V2:4500,V3:300,V4:0");
    assert!(wait_until(|| engine.state().battery_percent == 75).await);

    let state = engine.state();
    assert_eq!(state.operating_state, Some(OperatingState::Charging));
    assert!(state.faults.is_empty());
    assert_eq!(state.voltage(Channel::Load), Some(12.3));
    assert_eq!(state.voltage(Channel::Charge), Some(4.5));
    assert_eq!(state.voltage(Channel::BankA), Some(0.3));
    assert_eq!(state.voltage(Channel::BankB), Some(0.0));

    let changes: Vec<ChangeEvent> = drain(&mut events)
        .iter()
        .filter_map(|e| e.as_change().cloned())
        .collect();
    assert!(changes.contains(&ChangeEvent::Battery(75)));
    assert!(changes.contains(&ChangeEvent::OperatingState(OperatingState::Charging)));
    assert!(changes.contains(&ChangeEvent::FaultsCleared));
    assert!(changes.contains(&ChangeEvent::Voltage { channel: Channel::Load, volts: 12.3 }));

    let history = engine.history();
    for channel in Channel::ALL {
        assert_eq!(history.series(channel).len(), 1);
    }

    engine.disconnect().await.unwrap();
}

/// Tests that a frame split across many reads decodes the same.
#[tokio::test]
async fn test_chunked_frame_is_reassembled() {
    let (mut engine, port) = connected(fast_config()).await;
    port.set_max_read_chunk(3);

    port.queue_line("BAT:42,FAULT:5,V1:13000");
    assert!(wait_until(|| engine.state().battery_percent == 42).await);

    let state = engine.state();
    assert_eq!(state.voltage(Channel::Load), Some(13.0));
    assert_eq!(state.faults.bits(), 5);
    engine.disconnect().await.unwrap();
}

/// Tests that non-status lines are logged but never touch the state.
#[tokio::test]
async fn test_non_status_line_leaves_state_alone() {
    let (mut engine, port) = connected(fast_config()).await;
    let mut events = engine.subscribe();

    port.queue_line("hello world");
    assert!(wait_until(|| port.pending_rx() == 0).await);
    sleep(Duration::from_millis(20)).await;

    assert_eq!(engine.state(), DeviceState::new(true));
    let events = drain(&mut events);
    assert!(events.iter().all(|e| e.as_change().is_none()));
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::Log(line) if line.text == "hello world")));
    engine.disconnect().await.unwrap();
}

/// Tests that `ERROR:` lines surface as device errors and the session survives.
#[tokio::test]
async fn test_device_error_line() {
    let (mut engine, port) = connected(fast_config()).await;
    let mut events = engine.subscribe();

    port.queue_line("ERROR:overcurrent");
    let mut seen = Vec::new();
    assert!(
        wait_until(|| {
            seen.extend(drain(&mut events));
            seen.contains(&EngineEvent::State(ChangeEvent::DeviceError("overcurrent".into())))
        })
        .await
    );
    assert!(engine.is_connected());
    engine.disconnect().await.unwrap();
}

/// Tests that the heartbeat goes out periodically, not on every tick.
#[tokio::test]
async fn test_heartbeat_is_rate_limited() {
    let config = fast_config().with_status_interval(Duration::from_millis(50));
    let (mut engine, port) = connected(config).await;

    sleep(Duration::from_millis(180)).await;
    engine.disconnect().await.unwrap();

    let sent = status_requests(&port);
    assert!(sent >= 2, "expected heartbeats, got {sent}");
    assert!(sent <= 6, "heartbeat not rate limited: {sent}");
}

/// Tests that charge mode commands go out and sync the enable flags.
#[tokio::test]
async fn test_charge_mode_syncs_enable_signals() {
    let (mut engine, port) = connected(fast_config()).await;

    let effect = engine.set_charge_mode(ChargeMode::Fast).await.unwrap();
    assert_eq!(effect.wire(), "C2");
    assert!(effect.events.contains(&ChangeEvent::ChargeMode(ChargeMode::Fast)));
    assert_eq!(port.sent_lines().last().map(String::as_str), Some("C2"));

    let signals = engine.state().enable_signals.unwrap();
    assert!(signals.fast_charge);
    assert!(!signals.charge);
    assert_eq!(engine.state().charge_mode, ChargeMode::Fast);

    engine.set_charge_mode(ChargeMode::Off).await.unwrap();
    let signals = engine.state().enable_signals.unwrap();
    assert!(!signals.fast_charge);
    assert!(!signals.charge);

    engine.disconnect().await.unwrap();
}

/// Tests that power output switches both block signals.
#[tokio::test]
async fn test_power_output_syncs_block_signals() {
    let (mut engine, port) = connected(fast_config()).await;

    engine.set_power_output(true).await.unwrap();
    assert_eq!(port.sent_lines().last().map(String::as_str), Some("P1"));

    let state = engine.state();
    assert!(state.power_output);
    let signals = state.enable_signals.unwrap();
    assert!(signals.block_100a);
    assert!(signals.block_200a);

    engine.disconnect().await.unwrap();
}

/// Tests the remaining typed commands and raw passthrough on the wire.
#[tokio::test]
async fn test_command_wire_format() {
    let (mut engine, port) = connected(fast_config()).await;

    engine.set_led(3, true).await.unwrap();
    engine.set_enable_signal(EnableSignal::Block100A, true).await.unwrap();
    engine.set_relay(RelayAction::Reset).await.unwrap();
    engine.send_raw("X9").await.unwrap();

    assert_eq!(port.sent_lines(), vec!["S", "L31", "E21", "R2", "X9"]);
    let state = engine.state();
    assert!(state.leds[3]);
    assert_eq!(state.relay_last_command, RelayAction::Reset);
    engine.disconnect().await.unwrap();
}

/// Tests that argument checks come before the connection check.
#[tokio::test]
async fn test_command_errors() {
    let mut engine = EssEngine::new(fast_config());

    let result = engine.set_led(6, true).await;
    assert!(matches!(result, Err(EssError::InvalidCommand(_))));

    let result = engine.set_led(0, true).await;
    assert!(matches!(result, Err(EssError::NotConnected)));
    assert!(matches!(engine.request_status().await, Err(EssError::NotConnected)));
}

/// Tests that firmware without enable commands refuses them and syncs nothing.
#[tokio::test]
async fn test_variant_without_enable_signals() {
    let (mut engine, port) = connected(fast_config().with_enable_signals(false)).await;

    let result = engine.set_enable_signal(EnableSignal::Charge, true).await;
    assert!(matches!(result, Err(EssError::Unsupported(_))));
    assert_eq!(port.sent_lines(), vec!["S"]);

    let effect = engine.set_charge_mode(ChargeMode::Normal).await.unwrap();
    assert_eq!(effect.events, vec![ChangeEvent::ChargeMode(ChargeMode::Normal)]);
    assert_eq!(engine.state().enable_signals, None);
    engine.disconnect().await.unwrap();
}

/// Tests that an `EN` field in a status frame overrides the optimistic flags.
#[tokio::test]
async fn test_status_frame_overrides_enable_signals() {
    let (mut engine, port) = connected(fast_config()).await;

    engine.set_charge_mode(ChargeMode::Fast).await.unwrap();
    port.queue_line("BAT:50,EN:2");
    assert!(wait_until(|| engine.state().battery_percent == 50).await);

    let signals = engine.state().enable_signals.unwrap();
    assert!(signals.charge);
    assert!(!signals.fast_charge);
    assert!(!signals.block_100a);
    engine.disconnect().await.unwrap();
}

/// Tests that a manual `S` goes out as a normal command.
#[tokio::test]
async fn test_manual_status_request() {
    let (mut engine, port) = connected(fast_config()).await;
    engine.request_status().await.unwrap();
    engine.send_raw("S").await.unwrap();
    assert_eq!(status_requests(&port), 3);
    engine.disconnect().await.unwrap();
}

/// Tests that after disconnect returns the loop no longer touches the port.
#[tokio::test]
async fn test_disconnect_stops_polling() {
    let config = fast_config().with_status_interval(Duration::from_millis(20));
    let (mut engine, port) = connected(config).await;
    let mut events = engine.subscribe();
    sleep(Duration::from_millis(30)).await;

    engine.disconnect().await.unwrap();
    assert_eq!(engine.poller_state(), PollerState::Stopped);
    assert!(!engine.is_connected());

    let reads = port.read_calls();
    let writes = port.write_calls();
    sleep(Duration::from_millis(60)).await;
    assert_eq!(port.read_calls(), reads);
    assert_eq!(port.write_calls(), writes);

    let events = drain(&mut events);
    assert!(events.contains(&EngineEvent::ConnectionClosed {
        endpoint: Some(PORT.to_string()),
        reason: None,
    }));
}

/// Tests that disconnect can be called repeatedly and before any connect.
#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let mut engine = EssEngine::new(fast_config());
    engine.disconnect().await.unwrap();

    let port = MockSerialPort::new();
    engine.connect_with_transport(PORT, port).await.unwrap();
    let mut events = engine.subscribe();
    engine.disconnect().await.unwrap();
    engine.disconnect().await.unwrap();

    let closed = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::ConnectionClosed { .. }))
        .count();
    assert_eq!(closed, 1);
}

/// Tests that a read failure ends the session and resets the state.
#[tokio::test]
async fn test_read_error_closes_session() {
    let (mut engine, port) = connected(fast_config()).await;
    let mut events = engine.subscribe();

    port.queue_line("BAT:80,STATE:2");
    assert!(wait_until(|| engine.state().battery_percent == 80).await);

    port.set_next_read_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"));
    assert!(wait_until(|| !engine.is_connected()).await);

    assert_eq!(engine.state(), DeviceState::new(true));
    assert!(engine.history().series(Channel::Load).is_empty());
    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::ConnectionClosed { reason: Some(reason), .. } if reason.contains("unplugged")
    )));

    // The dead session can be replaced
    engine.disconnect().await.unwrap();
    engine.connect_with_transport(PORT, MockSerialPort::new()).await.unwrap();
    assert!(engine.is_connected());
    engine.disconnect().await.unwrap();
}

/// Tests that a write failure on the command path is fatal to the session.
#[tokio::test]
async fn test_write_error_closes_session() {
    let (mut engine, port) = connected(fast_config()).await;

    port.set_next_write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"));
    let result = engine.issue(Command::PowerOutput(true)).await;

    assert!(matches!(result, Err(EssError::Transport(_))));
    assert!(!engine.is_connected());
    assert_eq!(engine.poller_state(), PollerState::Stopped);
    assert!(!engine.state().power_output);
}

/// Tests that a status line is only applied when `BAT:` starts the line as received.
#[tokio::test]
async fn test_indented_status_line_is_not_applied() {
    let (mut engine, port) = connected(fast_config()).await;
    let mut events = engine.subscribe();

    port.queue_line("  BAT:10,STATE:2");
    port.queue_line("BAT:20");
    assert!(wait_until(|| engine.state().battery_percent == 20).await);

    assert_eq!(engine.state().operating_state, None);
    let events = drain(&mut events);
    assert!(!events.contains(&EngineEvent::State(ChangeEvent::Battery(10))));
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::Log(line) if line.text == "BAT:10,STATE:2")));
    engine.disconnect().await.unwrap();
}

/// Tests that undecodable frames and fields are reported and the session survives.
#[tokio::test]
async fn test_soft_parse_errors_are_logged() {
    let (mut engine, port) = connected(fast_config()).await;
    let mut events = engine.subscribe();

    port.queue_line("BAT:");
    port.queue_line("BAT:x,STATE:1");
    assert!(wait_until(|| engine.state().operating_state.is_some()).await);

    let state = engine.state();
    assert_eq!(state.operating_state, Some(OperatingState::Charging));
    assert_eq!(state.battery_percent, 0);
    assert!(engine.is_connected());

    let logs: Vec<String> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::Log(line) => Some(line.text),
            _ => None,
        })
        .collect();
    assert!(logs.contains(&"Status parsing error: no fields in \"BAT:\"".to_string()));
    assert!(logs.contains(&"Status parsing error: bad value for BAT".to_string()));
    engine.disconnect().await.unwrap();
}

/// Tests that the last published enable-signal events agree with the state
/// when a command and a status frame interleave.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_published_signals_match_state() {
    let config = fast_config()
        .with_poll_interval(Duration::from_millis(1))
        .with_event_capacity(4096);
    let (mut engine, port) = connected(config).await;
    let mut events = engine.subscribe();

    for round in 0..20 {
        port.queue_line(&format!("BAT:{round},EN:2"));
        engine.set_charge_mode(ChargeMode::Fast).await.unwrap();
    }
    assert!(wait_until(|| engine.state().battery_percent == 19).await);
    sleep(Duration::from_millis(20)).await;

    let mut last_fast = None;
    let mut last_charge = None;
    for event in drain(&mut events) {
        match event {
            EngineEvent::State(ChangeEvent::EnableSignal { signal: EnableSignal::FastCharge, on }) => {
                last_fast = Some(on)
            }
            EngineEvent::State(ChangeEvent::EnableSignal { signal: EnableSignal::Charge, on }) => {
                last_charge = Some(on)
            }
            _ => {}
        }
    }
    let signals = engine.state().enable_signals.unwrap();
    assert_eq!(last_fast, Some(signals.fast_charge));
    assert_eq!(last_charge, Some(signals.charge));
    engine.disconnect().await.unwrap();
}
