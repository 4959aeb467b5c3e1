//! Event type definitions for the event bus.
//!
//! This module defines all device events organized by category.
//! Events are designed to be cloneable and serializable for logging/replay.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::data::{BoundingBox, ConnectionState, StatusReport};

/// Root event enum for everything a connection or streaming engine publishes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeviceEvent {
    /// Connection lifecycle events
    Connection(ConnectionEvent),
    /// Decoded status reports, in wire order
    Telemetry(StatusReport),
    /// Raw traffic for console logging
    Console(ConsoleEvent),
    /// Streaming and framing progress
    Stream(StreamEvent),
    /// Errors raised by background loops or transport writes
    Error(ErrorEvent),
}

impl DeviceEvent {
    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            DeviceEvent::Connection(_) => EventCategory::Connection,
            DeviceEvent::Telemetry(_) => EventCategory::Telemetry,
            DeviceEvent::Console(_) => EventCategory::Console,
            DeviceEvent::Stream(_) => EventCategory::Stream,
            DeviceEvent::Error(_) => EventCategory::Error,
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            DeviceEvent::Connection(e) => e.description(),
            DeviceEvent::Telemetry(r) => format!(
                "{} MPos: {} WPos: {}",
                r.state, r.machine_position, r.work_position
            ),
            DeviceEvent::Console(e) => e.description(),
            DeviceEvent::Stream(e) => e.description(),
            DeviceEvent::Error(e) => e.description(),
        }
    }
}

/// Event category for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Connection lifecycle events.
    Connection,
    /// Status report events.
    Telemetry,
    /// Raw line traffic.
    Console,
    /// Streaming and framing events.
    Stream,
    /// Error events.
    Error,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::Connection => write!(f, "Connection"),
            EventCategory::Telemetry => write!(f, "Telemetry"),
            EventCategory::Console => write!(f, "Console"),
            EventCategory::Stream => write!(f, "Stream"),
            EventCategory::Error => write!(f, "Error"),
        }
    }
}

/// Connection-related events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConnectionEvent {
    /// Starting connection attempt.
    Connecting {
        /// Port or address being connected to.
        port: String,
    },
    /// Successfully connected.
    Connected {
        /// Port or address that was connected.
        port: String,
    },
    /// Connection attempt failed; the connection is back to Disconnected.
    ConnectionFailed {
        /// Port or address that failed to connect.
        port: String,
        /// Error message describing the failure.
        error: String,
    },
    /// Disconnected from device.
    Disconnected {
        /// Port or address that was disconnected.
        port: String,
    },
    /// Lifecycle state changed.
    StateChanged {
        /// The new state.
        state: ConnectionState,
    },
}

impl ConnectionEvent {
    fn description(&self) -> String {
        match self {
            ConnectionEvent::Connecting { .. } => "Connecting…".to_string(),
            ConnectionEvent::Connected { .. } => "Connected".to_string(),
            ConnectionEvent::ConnectionFailed { .. } => "Connection failed".to_string(),
            ConnectionEvent::Disconnected { .. } => "Disconnected".to_string(),
            ConnectionEvent::StateChanged { state } => format!("Connection state: {}", state),
        }
    }
}

/// Raw line traffic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConsoleEvent {
    /// A trimmed line received from the device.
    Received {
        /// The line, without terminator.
        line: String,
    },
    /// A text command written to the device.
    Sent {
        /// The command, without terminator.
        line: String,
    },
}

impl ConsoleEvent {
    fn description(&self) -> String {
        match self {
            ConsoleEvent::Received { line } => format!("<< {}", line),
            ConsoleEvent::Sent { line } => format!(">> {}", line),
        }
    }
}

/// Streaming session events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Stream started.
    Started {
        /// Total number of entries in the sequence.
        total_lines: usize,
    },
    /// Stream progress update.
    Progress {
        /// Index of the entry just processed.
        index: usize,
        /// Total number of entries in the sequence.
        total_lines: usize,
    },
    /// Stream paused.
    Paused {
        /// Index the loop will resume from.
        index: usize,
    },
    /// Stream resumed.
    Resumed {
        /// Index the loop resumes at.
        index: usize,
    },
    /// Every entry was processed.
    Completed {
        /// Total number of entries in the sequence.
        total_lines: usize,
        /// Wall time from start to completion.
        duration: Duration,
    },
    /// Stream cancelled by stop or disconnect.
    Cancelled {
        /// Index at which the loop stopped.
        index: usize,
    },
    /// A send failed and the stream was aborted.
    Failed {
        /// Index of the entry that failed to send.
        index: usize,
        /// Error message.
        error: String,
    },
    /// Framing loop started.
    FramingStarted {
        /// Rectangle being traced.
        bounds: BoundingBox,
    },
    /// Framing loop exited and motion-off was attempted.
    FramingStopped {
        /// Complete laps traced.
        laps: usize,
    },
}

impl StreamEvent {
    fn description(&self) -> String {
        match self {
            StreamEvent::Started { total_lines } => {
                format!("Stream started ({} lines)", total_lines)
            }
            StreamEvent::Progress { index, total_lines } => {
                format!("Stream progress: {}/{}", index + 1, total_lines)
            }
            StreamEvent::Paused { index } => format!("Stream paused at {}", index),
            StreamEvent::Resumed { index } => format!("Stream resumed at {}", index),
            StreamEvent::Completed {
                total_lines,
                duration,
            } => format!(
                "Stream completed: {} lines in {:.1}s",
                total_lines,
                duration.as_secs_f64()
            ),
            StreamEvent::Cancelled { index } => format!("Stream cancelled at {}", index),
            StreamEvent::Failed { index, error } => {
                format!("Stream failed at {}: {}", index, error)
            }
            StreamEvent::FramingStarted { bounds } => format!(
                "Framing {:.3}x{:.3} at ({:.3}, {:.3})",
                bounds.width(),
                bounds.height(),
                bounds.min_x,
                bounds.min_y
            ),
            StreamEvent::FramingStopped { laps } => {
                format!("Framing stopped after {} laps", laps)
            }
        }
    }
}

/// Where an error was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSource {
    /// The receive loop
    Receive,
    /// The status-poll loop
    Poll,
    /// A `send` or `send_immediate` write
    Transport,
    /// Opening or configuring the link
    Connect,
    /// Tearing down the link
    Disconnect,
    /// A streaming or framing session
    Stream,
}

/// Error and diagnostic events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// Where the error was raised.
    pub source: ErrorSource,
    /// Error message.
    pub message: String,
}

impl ErrorEvent {
    /// Create a new error event
    pub fn new(source: ErrorSource, message: impl Into<String>) -> Self {
        Self {
            source,
            message: message.into(),
        }
    }

    fn description(&self) -> String {
        format!("{:?} error: {}", self.source, self.message)
    }
}
