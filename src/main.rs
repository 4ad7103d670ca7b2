use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ess_rs::{
    init_logger_with_default, list_ports, log_info, ChargeMode, Command, EnableSignal,
    EngineConfig, EngineEvent, EssEngine, RelayAction, VoltageScale,
};
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(name = "ess-cli")]
#[command(about = "CLI tool for ESS controllers")]
struct Cli {
    #[arg(short, long, global = true, default_value = "115200")]
    baudrate: u32,
    /// How raw V1-V4 samples convert to volts
    #[arg(long, global = true, value_enum, default_value = "millivolt")]
    scale: Scale,
    /// Firmware without individual enable-signal commands
    #[arg(long, global = true)]
    no_enable_signals: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports
    Ports,
    /// Connect and print events
    Monitor {
        port: String,
        #[arg(short, long, default_value = "10")]
        seconds: u64,
        /// One JSON object per event
        #[arg(long)]
        json: bool,
    },
    /// Send one command and print what follows
    Send {
        port: String,
        #[command(subcommand)]
        command: SendCommand,
        /// How long to keep listening after sending
        #[arg(short, long, default_value = "3")]
        seconds: u64,
    },
}

#[derive(Subcommand)]
enum SendCommand {
    Led { index: u8, state: Switch },
    Enable { signal: Signal, state: Switch },
    Charge { mode: Mode },
    Power { state: Switch },
    Relay { action: Relay },
    Status,
    Raw { text: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Scale {
    Millivolt,
    Adc,
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

#[derive(Clone, Copy, ValueEnum)]
enum Signal {
    FastCharge,
    Charge,
    Block100a,
    Block200a,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Off,
    Normal,
    Fast,
}

#[derive(Clone, Copy, ValueEnum)]
enum Relay {
    Off,
    Set,
    Reset,
}

impl SendCommand {
    fn into_command(self) -> Command {
        let on = |s: Switch| matches!(s, Switch::On);
        match self {
            SendCommand::Led { index, state } => Command::Led { index, on: on(state) },
            SendCommand::Enable { signal, state } => Command::EnableSignal {
                signal: match signal {
                    Signal::FastCharge => EnableSignal::FastCharge,
                    Signal::Charge => EnableSignal::Charge,
                    Signal::Block100a => EnableSignal::Block100A,
                    Signal::Block200a => EnableSignal::Block200A,
                },
                on: on(state),
            },
            SendCommand::Charge { mode } => Command::ChargeMode(match mode {
                Mode::Off => ChargeMode::Off,
                Mode::Normal => ChargeMode::Normal,
                Mode::Fast => ChargeMode::Fast,
            }),
            SendCommand::Power { state } => Command::PowerOutput(on(state)),
            SendCommand::Relay { action } => Command::Relay(match action {
                Relay::Off => RelayAction::Off,
                Relay::Set => RelayAction::Set,
                Relay::Reset => RelayAction::Reset,
            }),
            SendCommand::Status => Command::StatusRequest,
            SendCommand::Raw { text } => Command::Raw(text),
        }
    }
}

fn engine_config(cli: &Cli) -> EngineConfig {
    let scale = match cli.scale {
        Scale::Millivolt => VoltageScale::MILLIVOLTS,
        Scale::Adc => VoltageScale::stock_adc(),
    };
    EngineConfig::default()
        .with_baudrate(cli.baudrate)
        .with_voltage_scale(scale)
        .with_enable_signals(!cli.no_enable_signals)
}

fn print_event(event: &EngineEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match event {
        EngineEvent::Log(line) => println!("{line}"),
        EngineEvent::State(change) => println!("  {change:?}"),
        EngineEvent::ConnectionOpened { endpoint } => println!("Connected to {endpoint}"),
        EngineEvent::ConnectionClosed { reason: Some(reason), .. } => {
            println!("Connection lost: {reason}")
        }
        EngineEvent::ConnectionClosed { .. } => println!("Disconnected"),
    }
    Ok(())
}

/// Prints events until `duration` elapses or the session ends.
async fn follow(events: &mut broadcast::Receiver<EngineEvent>, duration: Duration, json: bool) -> Result<()> {
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => return Ok(()),
            received = events.recv() => match received {
                Ok(event) => {
                    print_event(&event, json)?;
                    if let EngineEvent::ConnectionClosed { .. } = event {
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log_info(&format!("Skipped {skipped} events"));
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger_with_default("info");

    let cli = Cli::parse();
    let config = engine_config(&cli);

    match cli.command {
        Commands::Ports => {
            for port in list_ports().context("listing serial ports")? {
                println!("{port}");
            }
        }
        Commands::Monitor { port, seconds, json } => {
            let mut engine = EssEngine::new(config);
            let mut events = engine.subscribe();
            engine
                .connect(&port)
                .await
                .with_context(|| format!("connecting to {port}"))?;
            follow(&mut events, Duration::from_secs(seconds), json).await?;
            if json {
                println!("{}", serde_json::to_string(&engine.state())?);
            }
            engine.disconnect().await?;
        }
        Commands::Send { port, command, seconds } => {
            let mut engine = EssEngine::new(config);
            let mut events = engine.subscribe();
            engine
                .connect(&port)
                .await
                .with_context(|| format!("connecting to {port}"))?;
            let command = command.into_command();
            let effect = engine
                .issue(command.clone())
                .await
                .with_context(|| format!("sending {command}"))?;
            log_info(&format!("Sent {}", effect.wire()));
            follow(&mut events, Duration::from_secs(seconds), false).await?;
            engine.disconnect().await?;
        }
    }

    Ok(())
}
