//! Data models for connection state, telemetry, and job geometry
//!
//! This module provides:
//! - Connection lifecycle state
//! - Machine state classification from the firmware's state token
//! - Three-axis positions and decoded status reports
//! - Bounding boxes traced by the framing loop

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a device connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No transport open, no background loops running
    #[default]
    Disconnected,
    /// Transport is being configured and opened
    Connecting,
    /// Transport open, receive and poll loops running
    Connected,
    /// Loops are being stopped and the transport closed
    Disconnecting,
}

impl ConnectionState {
    /// Check if commands may be written in this state
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Check if a transition from this state to `target` is valid.
    ///
    /// Disconnected -> Connecting -> Connected -> Disconnecting -> Disconnected.
    /// A failed connect goes Connecting -> Disconnecting -> Disconnected.
    pub fn can_transition_to(&self, target: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, target),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnecting)
                | (Connected, Disconnecting)
                | (Disconnecting, Disconnected)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// Machine state as reported in the first token of a status report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineState {
    /// Ready for commands
    Idle,
    /// Executing motion
    Run,
    /// Feed hold active
    Hold,
    /// Jogging
    Jog,
    /// Alarm lock, requires unlock or reset
    Alarm,
    /// Safety door open
    Door,
    /// Check (dry-run) mode
    Check,
    /// Homing cycle
    Home,
    /// Sleep mode
    Sleep,
    /// Token not recognised
    Unknown,
}

impl MachineState {
    /// Classify a raw state token. Sub-states (`Hold:0`, `Door:1`) are accepted.
    pub fn from_token(token: &str) -> Self {
        let name = token.split(':').next().unwrap_or("").trim();
        match name {
            "Idle" => Self::Idle,
            "Run" => Self::Run,
            "Hold" => Self::Hold,
            "Jog" => Self::Jog,
            "Alarm" => Self::Alarm,
            "Door" => Self::Door,
            "Check" => Self::Check,
            "Home" => Self::Home,
            "Sleep" => Self::Sleep,
            _ => Self::Unknown,
        }
    }

    /// Check if this state indicates an error condition
    pub fn is_error(&self) -> bool {
        matches!(self, MachineState::Alarm | MachineState::Door)
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Run => write!(f, "Run"),
            Self::Hold => write!(f, "Hold"),
            Self::Jog => write!(f, "Jog"),
            Self::Alarm => write!(f, "Alarm"),
            Self::Door => write!(f, "Door"),
            Self::Check => write!(f, "Check"),
            Self::Home => write!(f, "Home"),
            Self::Sleep => write!(f, "Sleep"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Three-axis position in millimeters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
}

impl Position {
    /// Create a new position
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// True when every axis is exactly zero
    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }

    /// Component-wise difference `self - other`
    pub fn minus(&self, other: &Position) -> Position {
        Position::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    /// Component-wise sum `self + other`
    pub fn plus(&self, other: &Position) -> Position {
        Position::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X{:.3} Y{:.3} Z{:.3}", self.x, self.y, self.z)
    }
}

/// Where a report's work position came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkPositionSource {
    /// Reported directly in a `WPos:` field
    Reported,
    /// Derived as machine position minus a work coordinate offset
    FromOffset,
    /// No work information available; mirrors machine position
    MachineOnly,
}

/// Immutable snapshot decoded from one status report line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Raw state token, e.g. `Idle`, `Run`, `Hold:0`
    pub state: String,
    /// Machine-space position
    pub machine_position: Position,
    /// Work-space position
    pub work_position: Position,
    /// Work coordinate offset carried by this line, if any
    pub work_offset: Option<Position>,
    /// Current feed rate (units/min)
    pub feed_rate: f64,
    /// Current spindle speed or laser power
    pub power: f64,
    /// Provenance of `work_position`
    pub work_position_source: WorkPositionSource,
}

impl StatusReport {
    /// Classified machine state
    pub fn machine_state(&self) -> MachineState {
        MachineState::from_token(&self.state)
    }
}

/// Axis-aligned rectangle in work coordinates traced by the framing loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum X
    pub min_x: f64,
    /// Minimum Y
    pub min_y: f64,
    /// Maximum X
    pub max_x: f64,
    /// Maximum Y
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a bounding box, normalising swapped corners
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            min_x: x1.min(x2),
            min_y: y1.min(y2),
            max_x: x1.max(x2),
            max_y: y1.max(y2),
        }
    }

    /// Smallest box containing every point, or `None` for an empty iterator
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        points.into_iter().fold(None, |acc, (x, y)| match acc {
            None => Some(Self::new(x, y, x, y)),
            Some(b) => Some(Self {
                min_x: b.min_x.min(x),
                min_y: b.min_y.min(y),
                max_x: b.max_x.max(x),
                max_y: b.max_y.max(y),
            }),
        })
    }

    /// Width along X
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height along Y
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Closed loop of corners: (min,min) (max,min) (max,max) (min,max) (min,min)
    pub fn corners(&self) -> [(f64, f64); 5] {
        [
            (self.min_x, self.min_y),
            (self.max_x, self.min_y),
            (self.max_x, self.max_y),
            (self.min_x, self.max_y),
            (self.min_x, self.min_y),
        ]
    }
}
