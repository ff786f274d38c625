use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tokio::runtime::Runtime;
use tokio::time::Instant;

use serial_joystick::logging;
use serial_joystick::{
    AxisConfig, ChannelSink, ConnectionManager, ConnectionState, Event, JoystickConfig,
    SerialConnector, WireFormat,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    /// X:<int> Y:<int> BTN:<0|1>
    Tagged,
    /// <int>,<int>,<0|1>
    Delimited,
}

impl From<FormatArg> for WireFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Tagged => WireFormat::Tagged,
            FormatArg::Delimited => WireFormat::Delimited,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "joystick-monitor",
    about = "Connect to a serial joystick and print normalized readings"
)]
struct Args {
    /// Serial device (e.g., /dev/ttyUSB0 or COM3)
    port: String,
    /// TOML file with baud_rate, wire_format and an optional [axis] table
    #[arg(long)]
    config: Option<PathBuf>,
    /// Baud rate of the device firmware (commonly 9600 or 115200)
    #[arg(long)]
    baud: Option<u32>,
    /// Wire format of the device firmware
    #[arg(long, value_enum)]
    format: Option<FormatArg>,
    /// Full-scale raw axis value [default: 1024]
    #[arg(long)]
    axis_max: Option<u32>,
    /// Deadzone in percent of half-travel [default: 10]
    #[arg(long)]
    deadzone: Option<f32>,
    /// Print one JSON object per event
    #[arg(long)]
    json: bool,
    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<u64>,
    /// Log level (overrides JOYSTICK_LOG / RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    logging::init_logging_with(args.log_level.as_deref());

    let config = resolve_config(&args)?;
    let rt = Runtime::new().context("tokio runtime init failed")?;
    rt.block_on(monitor(&args, config))
}

/// Merge the config file (if any) with command-line overrides.
fn resolve_config(args: &Args) -> Result<JoystickConfig> {
    let file = match &args.config {
        Some(path) => Some(
            JoystickConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
        ),
        None => None,
    };

    let baud_rate = match (args.baud, &file) {
        (Some(baud), _) => baud,
        (None, Some(file)) => file.baud_rate,
        (None, None) => bail!("baud rate not set: pass --baud or --config"),
    };
    let wire_format = match (args.format, &file) {
        (Some(format), _) => format.into(),
        (None, Some(file)) => file.wire_format,
        (None, None) => bail!("wire format not set: pass --format or --config"),
    };

    let base = file.map(|f| f.axis).unwrap_or_default();
    let axis = AxisConfig::new(
        args.axis_max.unwrap_or(base.device_axis_max()),
        args.deadzone.unwrap_or(base.deadzone()),
    )?;

    let config = JoystickConfig::new(baud_rate, wire_format, axis);
    config.validate()?;
    Ok(config)
}

async fn monitor(args: &Args, config: JoystickConfig) -> Result<()> {
    let (sink, mut events) = ChannelSink::new();
    let mut manager = ConnectionManager::new(SerialConnector::new(&args.port), Arc::new(sink));

    println!(
        "Connecting to {} ({} baud, {:?} frames)...",
        args.port, config.baud_rate, config.wire_format
    );
    manager.connect(&config).await?;

    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let stop_after = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(stop_after, interrupted);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if !print_event(&event, args.json)? {
                    break;
                }
            }
            _ = &mut interrupted => {
                println!("Interrupted.");
                break;
            }
            _ = &mut stop_after => break,
        }
    }

    let stats = manager.stats();
    println!("Stopping...");
    manager.disconnect().await?;
    println!(
        "Done. frames={}, malformed={}",
        stats.frames, stats.malformed
    );
    Ok(())
}

/// Print one event; returns `false` once the session is over.
fn print_event(event: &Event, json: bool) -> Result<bool> {
    if json {
        println!("{}", serde_json::to_string(event)?);
    } else {
        match event {
            Event::Reading(r) => println!(
                "x: {:7.2} | y: {:7.2} | btn: {} | {}",
                r.pos_x,
                r.pos_y,
                if r.button { "PRESSED" } else { "released" },
                if r.active { "active" } else { "idle" }
            ),
            Event::StateChange { state } => println!("[state] {:?}", state),
            Event::Error { kind, message } => eprintln!("[{:?} error] {}", kind, message),
        }
    }

    Ok(!matches!(
        event,
        Event::StateChange {
            state: ConnectionState::Idle | ConnectionState::Faulted
        }
    ))
}
