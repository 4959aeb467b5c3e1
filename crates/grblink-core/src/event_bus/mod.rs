//! # Event Bus Module
//!
//! Decoupled notification between the background loops of a connection and
//! whichever context consumes them (CLI, UI, tests).
//!
//! ## Overview
//!
//! - Publishers emit typed `DeviceEvent`s without knowing subscribers
//! - Subscribers either register a filtered callback or take a broadcast
//!   receiver and poll it from their own task
//! - Events from one publisher are observed in publish order
//!
//! ## Usage
//!
//! ```rust,ignore
//! use grblink_core::event_bus::{DeviceEvent, EventBus, EventCategory, EventFilter};
//!
//! let bus = EventBus::new();
//! let id = bus.subscribe(
//!     EventFilter::Categories(vec![EventCategory::Telemetry]),
//!     |event| {
//!         if let DeviceEvent::Telemetry(report) = event {
//!             println!("{} at {}", report.state, report.work_position);
//!         }
//!     },
//! );
//! bus.unsubscribe(id);
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
