//! Firmware protocol implementations
//!
//! Only the GRBL dialect is supported.

pub mod grbl;

pub use grbl::{
    format_jog, JogDirection, JogRequest, RealtimeCommand, StatusParser, WorkOffsetTracker,
    MOTION_OFF_COMMAND,
};
