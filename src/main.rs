//! grblink command-line front end

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use grblink::{
    init_logging, list_ports, load_program, program_bounds, BoundingBox, Config, Connection,
    DeviceEvent, JogDirection, JogRequest, LogFormat, MockTransport, SerialTransport,
    StreamEvent, StreamingEngine, Transport,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

/// Status line the dry-run device answers every query with
const DRY_RUN_STATUS: &str = "<Idle|MPos:0.000,0.000,0.000|FS:0,0>";

#[derive(Parser)]
#[command(name = "grblink")]
#[command(version, about = "Stream G-code to GRBL controllers", long_about = None)]
struct Cli {
    /// Configuration file (.toml or .json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LinkArgs {
    /// Serial port, e.g. /dev/ttyUSB0 or COM3
    #[arg(long)]
    port: Option<String>,

    /// Baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Talk to a simulated idle controller instead of a serial port
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports that look like CNC controllers
    Ports,

    /// Connect and print status reports
    Status {
        #[command(flatten)]
        link: LinkArgs,

        /// Number of reports to print
        #[arg(long, default_value_t = 1)]
        count: usize,
    },

    /// Stream a G-code file; Ctrl-C stops the job
    Stream {
        #[command(flatten)]
        link: LinkArgs,

        /// G-code file
        file: PathBuf,
    },

    /// Trace a rectangle at low power; Ctrl-C stops
    Frame {
        #[command(flatten)]
        link: LinkArgs,

        /// Frame the extent of this G-code file instead of given corners
        #[arg(long, conflicts_with_all = ["x1", "y1", "x2", "y2"])]
        file: Option<PathBuf>,

        #[arg(long, allow_hyphen_values = true, required_unless_present = "file")]
        x1: Option<f64>,
        #[arg(long, allow_hyphen_values = true, required_unless_present = "file")]
        y1: Option<f64>,
        #[arg(long, allow_hyphen_values = true, required_unless_present = "file")]
        x2: Option<f64>,
        #[arg(long, allow_hyphen_values = true, required_unless_present = "file")]
        y2: Option<f64>,

        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
    },

    /// Send a single jog (N, S, E, W, NE, NW, SE, SW, Zup, Zdown, Home, Abort)
    Jog {
        #[command(flatten)]
        link: LinkArgs,

        direction: JogDirection,

        /// Distance in mm (defaults to the configured step)
        #[arg(long)]
        distance: Option<f64>,

        /// Feed rate in mm/min (defaults to the configured jog feed)
        #[arg(long)]
        feed: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_logging(format)?;

    let config = Config::load_or_default(cli.config.as_deref()).context("failed to load config")?;

    match cli.command {
        Commands::Ports => ports(),
        Commands::Status { link, count } => status(&config, &link, count).await,
        Commands::Stream { link, file } => stream(&config, &link, file).await,
        Commands::Frame {
            link,
            file,
            x1,
            y1,
            x2,
            y2,
            seconds,
        } => {
            let bounds = match (file, x1, y1, x2, y2) {
                (Some(file), ..) => {
                    let program = load_program(&file)?;
                    program_bounds(&program).with_context(|| {
                        format!("{} has no moves in X or Y", file.display())
                    })?
                }
                (None, Some(x1), Some(y1), Some(x2), Some(y2)) => {
                    BoundingBox::new(x1, y1, x2, y2)
                }
                _ => anyhow::bail!("give --file or all of --x1 --y1 --x2 --y2"),
            };
            frame(&config, &link, bounds, seconds.map(Duration::from_secs)).await
        }
        Commands::Jog {
            link,
            direction,
            distance,
            feed,
        } => {
            let request = JogRequest::new(
                direction,
                distance.unwrap_or(config.jog.step_mm),
                feed.unwrap_or(config.jog.feed_rate),
            );
            jog(&config, &link, request).await
        }
    }
}

fn ports() -> Result<()> {
    let ports = list_ports().context("failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No controller ports found");
    }
    for port in ports {
        println!("{:<24} {}", port.port_name, port.description);
    }
    Ok(())
}

async fn open(config: &Config, link: &LinkArgs) -> Result<Arc<Connection>> {
    let mut conn_config = config.connection_config();
    let transport: Arc<dyn Transport> = if link.dry_run {
        conn_config.settle_delay = Duration::ZERO;
        Arc::new(MockTransport::simulated_device(DRY_RUN_STATUS))
    } else {
        Arc::new(SerialTransport::new())
    };

    let port = match (&link.port, link.dry_run) {
        (Some(port), _) => port.clone(),
        (None, true) => "dry-run".to_string(),
        (None, false) if !config.connection.port.is_empty() => config.connection.port.clone(),
        (None, false) => anyhow::bail!("no serial port given; use --port or set connection.port"),
    };
    let baud = link.baud.unwrap_or(config.connection.baud_rate);

    let conn = Arc::new(Connection::new(transport, conn_config));
    conn.connect(&port, baud)
        .await
        .with_context(|| format!("failed to connect to {}", port))?;
    Ok(conn)
}

async fn status(config: &Config, link: &LinkArgs, count: usize) -> Result<()> {
    let conn = open(config, link).await?;
    let mut rx = conn.events().receiver();
    let wait = config.connection_config().poll_interval * 8;

    let mut printed = 0;
    while printed < count {
        match tokio::time::timeout(wait, rx.recv()).await {
            Ok(Ok(DeviceEvent::Telemetry(report))) => {
                println!(
                    "{:<8} MPos {}  WPos {}  F{} S{}",
                    report.state,
                    report.machine_position,
                    report.work_position,
                    report.feed_rate,
                    report.power
                );
                if report.machine_state().is_error() {
                    eprintln!("Controller needs attention: {}", report.state);
                }
                printed += 1;
            }
            Ok(Ok(_)) | Ok(Err(RecvError::Lagged(_))) => {}
            Ok(Err(RecvError::Closed)) => break,
            Err(_) => {
                conn.disconnect().await;
                anyhow::bail!("no status report within {:?}", wait);
            }
        }
    }

    conn.disconnect().await;
    Ok(())
}

async fn stream(config: &Config, link: &LinkArgs, file: PathBuf) -> Result<()> {
    let program = load_program(&file)?;
    let conn = open(config, link).await?;
    let engine = StreamingEngine::new(conn.clone(), config.streaming_config());
    let mut rx = conn.events().receiver();

    engine.start(program)?;
    let outcome = follow_session(&engine, &mut rx, None).await;
    engine.wait().await;
    conn.disconnect().await;

    match outcome {
        Some(StreamEvent::Failed { index, error }) => {
            anyhow::bail!("stream failed at line {}: {}", index + 1, error)
        }
        _ => Ok(()),
    }
}

async fn frame(
    config: &Config,
    link: &LinkArgs,
    bounds: BoundingBox,
    limit: Option<Duration>,
) -> Result<()> {
    let conn = open(config, link).await?;
    let engine = StreamingEngine::new(conn.clone(), config.streaming_config())
        .with_framing_config(config.framing_config());
    let mut rx = conn.events().receiver();

    engine.start_framing(bounds)?;
    follow_session(&engine, &mut rx, limit).await;
    engine.wait().await;
    conn.disconnect().await;
    Ok(())
}

async fn jog(config: &Config, link: &LinkArgs, request: JogRequest) -> Result<()> {
    let conn = open(config, link).await?;
    let result = conn.jog(&request);
    conn.disconnect().await;
    result.with_context(|| format!("jog {} failed", request.direction))
}

/// Print session events until the session ends.
///
/// Ctrl-C or the optional time limit stops the session. Returns the event
/// that ended it.
async fn follow_session(
    engine: &StreamingEngine,
    rx: &mut broadcast::Receiver<DeviceEvent>,
    limit: Option<Duration>,
) -> Option<StreamEvent> {
    let deadline = async {
        match limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let mut stopping = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c(), if !stopping => {
                println!("Stopping...");
                engine.stop();
                stopping = true;
            }
            _ = &mut deadline, if !stopping => {
                engine.stop();
                stopping = true;
            }
            event = rx.recv() => match event {
                Ok(DeviceEvent::Stream(event)) => {
                    println!("{}", DeviceEvent::Stream(event.clone()).description());
                    if matches!(
                        event,
                        StreamEvent::Completed { .. }
                            | StreamEvent::Cancelled { .. }
                            | StreamEvent::Failed { .. }
                            | StreamEvent::FramingStopped { .. }
                    ) {
                        return Some(event);
                    }
                }
                Ok(DeviceEvent::Error(error)) => eprintln!("{}", error.message),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Dropped {} events", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
