//! # grblink
//!
//! Connects to GRBL controllers over a serial link and streams G-code to
//! them with pause, resume, stop, and a low-power framing mode.
//!
//! ## Architecture
//!
//! grblink is organized as a workspace with multiple crates:
//!
//! 1. **grblink-core** - Device state types, errors, the event bus
//! 2. **grblink-communication** - Transports, the connection, GRBL protocol,
//!    the streaming engine
//! 3. **grblink-settings** - Configuration file handling
//! 4. **grblink** - Command-line front end that ties the crates together

pub use grblink_communication::{communication, firmware, streaming};
pub use grblink_core::{data, event_bus};

pub use grblink_core::{
    BoundingBox, ConnectionError, ConnectionEvent, ConnectionState, ConsoleEvent,
    ControllerError, DeviceEvent, Error, ErrorEvent, ErrorSource, EventBus, EventCategory,
    EventFilter, MachineState, Position, Result, StatusReport, StreamEvent,
};

pub use grblink_communication::{
    format_jog, is_skippable, list_ports, Connection, ConnectionConfig, ConnectionParams,
    FixedDelayPacing, FramingConfig, JogDirection, JogRequest, MockTransport, PacingPolicy,
    RealtimeCommand, SerialPortInfo, SerialTransport, SessionKind, StatusParser,
    StreamingConfig, StreamingEngine, Transport,
};

pub use grblink_settings::Config;

use anyhow::Context;
use std::path::Path;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Initialize logging
///
/// Logs go to stderr so stdout stays free for command output. `RUST_LOG`
/// overrides the default `info` level. Calling this twice is harmless.
pub fn init_logging(format: LogFormat) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match format {
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_line_number(true);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
        }
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
        }
    };

    if let Err(e) = result {
        tracing::debug!("Logging already initialized: {}", e);
    }
    Ok(())
}

/// Split program text into streamable entries.
///
/// Lines are kept one-to-one with the source so progress indices match
/// line numbers; blank and comment lines are skipped by the engine.
pub fn program_lines(text: &str) -> Vec<String> {
    text.trim_start_matches('\u{feff}')
        .lines()
        .map(|line| line.trim_end().to_string())
        .collect()
}

/// Read a G-code file into streamable entries
pub fn load_program(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read program {}", path.display()))?;
    let lines = program_lines(&text);
    if lines.iter().all(|line| is_skippable(line)) {
        anyhow::bail!("program {} has no commands", path.display());
    }
    Ok(lines)
}

/// Extent in X and Y of the moves in a program.
///
/// Follows G90/G91 distance mode and the modal motion group. Arcs contribute
/// their end points only. Returns `None` when nothing moves in X or Y.
pub fn program_bounds<S: AsRef<str>>(lines: &[S]) -> Option<BoundingBox> {
    let mut position = (0.0_f64, 0.0_f64);
    let mut relative = false;
    let mut moving = false;
    let mut points = Vec::new();

    for line in lines {
        let line = line.as_ref();
        if is_skippable(line) {
            continue;
        }

        let mut target = (None, None);
        for (letter, value) in gcode_words(line) {
            match letter {
                'G' => match value as i64 {
                    0..=3 if value.fract() == 0.0 => moving = true,
                    80 => moving = false,
                    90 if value.fract() == 0.0 => relative = false,
                    91 if value.fract() == 0.0 => relative = true,
                    _ => {}
                },
                'X' => target.0 = Some(value),
                'Y' => target.1 = Some(value),
                _ => {}
            }
        }

        if !moving || (target.0.is_none() && target.1.is_none()) {
            continue;
        }
        let axis = |current: f64, word: Option<f64>| match word {
            Some(v) if relative => current + v,
            Some(v) => v,
            None => current,
        };
        position = (axis(position.0, target.0), axis(position.1, target.1));
        points.push(position);
    }

    BoundingBox::from_points(points)
}

/// Letter and value pairs of a line, with comments removed
fn gcode_words(line: &str) -> Vec<(char, f64)> {
    let code = line.split(';').next().unwrap_or_default();
    let mut words = Vec::new();
    let mut chars = code.chars().peekable();
    let mut in_comment = false;

    while let Some(c) = chars.next() {
        match c {
            '(' => in_comment = true,
            ')' => in_comment = false,
            _ if in_comment => {}
            c if c.is_ascii_alphabetic() => {
                let mut number = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || matches!(d, '.' | '-' | '+') {
                        number.push(d);
                        chars.next();
                    } else if d == ' ' && number.is_empty() {
                        chars.next();
                    } else {
                        break;
                    }
                }
                if let Ok(value) = number.parse::<f64>() {
                    words.push((c.to_ascii_uppercase(), value));
                }
            }
            _ => {}
        }
    }
    words
}
