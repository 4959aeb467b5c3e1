//! # grblink Core
//!
//! Core types shared by the grblink crates: the error taxonomy, the data
//! model for connection state and telemetry, and the event bus that carries
//! notifications from background loops to their consumers.

pub mod data;
pub mod error;
pub mod event_bus;

pub use data::{
    BoundingBox, ConnectionState, MachineState, Position, StatusReport, WorkPositionSource,
};

pub use error::{ConnectionError, ControllerError, Error, Result};

pub use event_bus::{
    ConnectionEvent, ConsoleEvent, DeviceEvent, ErrorEvent, ErrorSource, EventBus,
    EventBusConfig, EventCategory, EventFilter, StreamEvent, SubscriptionId,
};
