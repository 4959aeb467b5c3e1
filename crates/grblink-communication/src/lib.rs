//! # grblink Communication
//!
//! Device link and command streaming for GRBL controllers.
//!
//! - [`communication`]: the transport contract, serial and mock transports,
//!   and [`Connection`] with its receive and status-poll loops
//! - [`firmware`]: GRBL status decoding, jog formatting and realtime bytes
//! - [`streaming`]: the pausable, cancellable [`StreamingEngine`] and the
//!   framing loop

pub mod communication;
pub mod firmware;
pub mod streaming;

pub use communication::{
    list_ports, Connection, ConnectionConfig, ConnectionParams, MockTransport, SerialParity,
    SerialPortInfo, SerialTransport, Transport,
};

pub use firmware::{
    format_jog, JogDirection, JogRequest, RealtimeCommand, StatusParser, WorkOffsetTracker,
    MOTION_OFF_COMMAND,
};

pub use streaming::{
    is_skippable, FixedDelayPacing, FramingConfig, PacingPolicy, SessionKind, StreamingConfig,
    StreamingEngine,
};
