//! grblink Settings Crate
//!
//! File-backed configuration. Values are loaded once and converted into the
//! runtime config structs handed to `Connection` and `StreamingEngine`.

pub mod config;

pub use config::{Config, ConnectionSettings, FramingSettings, JogSettings, StreamingSettings};
