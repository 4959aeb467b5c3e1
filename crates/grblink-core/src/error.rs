//! Error handling for grblink
//!
//! Provides the error taxonomy shared by every layer of the engine:
//! - Controller errors (caller preconditions: connect twice, stream twice, bad jog)
//! - Connection errors (transport open/read/write failures)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Controller error type
///
/// Precondition violations surfaced synchronously to the caller. None of these
/// are retried by the engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    /// Controller is not connected
    #[error("Controller not connected")]
    NotConnected,

    /// Controller is already connected
    #[error("Controller already connected")]
    AlreadyConnected,

    /// A streaming or framing session is already active
    #[error("A streaming session is already running")]
    AlreadyRunning,

    /// No streaming session is active
    #[error("No streaming session is running")]
    NotRunning,

    /// Pause requested while already paused
    #[error("Streaming session is already paused")]
    AlreadyPaused,

    /// Resume requested while not paused
    #[error("Streaming session is not paused")]
    NotPaused,

    /// Jog direction cannot be turned into a motion command
    #[error("Invalid jog direction: {direction}")]
    InvalidDirection {
        /// The rejected direction.
        direction: String,
    },

    /// Jog distance or feed rate out of range
    #[error("Invalid jog request: {reason}")]
    InvalidJog {
        /// Why the request was rejected.
        reason: String,
    },
}

/// Connection error type
///
/// Represents failures of the byte transport underneath a connection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Read timed out without a complete line
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Connection lost
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Serial port error
    #[error("Serial port error: {reason}")]
    SerialError {
        /// The reason for the serial port error.
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {reason}")]
    IoError {
        /// The reason for the I/O error.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

/// Main error type for grblink
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a timeout error
    ///
    /// Timeouts from the transport mean "no complete line yet" and are never
    /// surfaced by the receive loop.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Connection(ConnectionError::ConnectionTimeout { .. }) => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Io(_))
    }

    /// Check if this is a caller precondition error
    pub fn is_controller_error(&self) -> bool {
        matches!(self, Error::Controller(_))
    }

    /// Returns the precondition error, if this is one
    pub fn as_controller_error(&self) -> Option<&ControllerError> {
        match self {
            Error::Controller(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
