//! GRBL firmware protocol
//!
//! Status report decoding, jog formatting, realtime command bytes, and
//! response classification for GRBL 1.1-class firmware.

pub mod jog;
pub mod status_parser;
pub mod utils;

pub use jog::{format_jog, JogDirection, JogRequest, HOMING_COMMAND};
pub use status_parser::{StatusParser, WorkOffsetTracker};
pub use utils::{decode_alarm, decode_error, GrblResponse};

/// Program-stop motion-off command (laser/spindle off)
pub const MOTION_OFF_COMMAND: &str = "M5";

/// Single-byte realtime commands, acted on by the firmware outside the
/// normal command queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RealtimeCommand {
    /// Feed hold `!`
    FeedHold,
    /// Cycle start / resume `~`
    CycleResume,
    /// Soft reset Ctrl-X
    SoftReset,
    /// Status report query `?`
    StatusQuery,
    /// Cancel an active jog
    JogCancel,
}

impl RealtimeCommand {
    /// Wire byte for this command
    pub fn as_byte(&self) -> u8 {
        match self {
            RealtimeCommand::FeedHold => 0x21,
            RealtimeCommand::CycleResume => 0x7E,
            RealtimeCommand::SoftReset => 0x18,
            RealtimeCommand::StatusQuery => 0x3F,
            RealtimeCommand::JogCancel => 0x85,
        }
    }
}
