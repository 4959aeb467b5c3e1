//! Command streaming
//!
//! [`StreamingEngine`] pushes a command sequence through a [`Connection`]
//! from its own task, pausable and cancellable from the caller. The framing
//! loop is a second kind of session that traces a bounding box at low power
//! until stopped.
//!
//! [`Connection`]: crate::communication::Connection

mod engine;
mod framing;
mod pacing;
mod session;

use crate::firmware::MOTION_OFF_COMMAND;
use std::time::Duration;

pub use engine::StreamingEngine;
pub use pacing::{FixedDelayPacing, PacingPolicy};
pub use session::SessionKind;

/// Streaming loop settings
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Delay after each sent command when no other pacing policy is given
    pub command_delay: Duration,
    /// Publish progress every this many entries, and on the last one
    pub progress_interval: usize,
    /// Sent on pause, on stop, and when framing ends
    pub motion_off_command: String,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            command_delay: Duration::from_millis(20),
            progress_interval: 10,
            motion_off_command: MOTION_OFF_COMMAND.to_string(),
        }
    }
}

/// Framing loop settings
#[derive(Debug, Clone)]
pub struct FramingConfig {
    /// Laser/spindle power while tracing (`S` word)
    pub power: u32,
    /// Feed rate along the rectangle edges, mm/min
    pub feed_rate: f64,
    /// Pause at each corner
    pub corner_delay: Duration,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            power: 10,
            feed_rate: 3000.0,
            corner_delay: Duration::from_millis(250),
        }
    }
}

/// True for entries the loop skips without sending
pub fn is_skippable(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.starts_with(';') || line.starts_with('(')
}
