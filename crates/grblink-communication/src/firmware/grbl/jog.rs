//! GRBL jog command formatting
//!
//! Turns an operator jog request into a single `$J=` line. Moves are relative
//! (`G91`) and only the axes the direction implies are emitted.

use grblink_core::{ControllerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Homing cycle command
pub const HOMING_COMMAND: &str = "$H";

/// Jog command prefix: jog in relative positioning
const JOG_PREFIX: &str = "$J=G91";

/// Jog direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JogDirection {
    /// +Y
    N,
    /// -Y
    S,
    /// +X
    E,
    /// -X
    W,
    /// +X +Y
    NE,
    /// -X +Y
    NW,
    /// +X -Y
    SE,
    /// -X -Y
    SW,
    /// +Z
    ZUp,
    /// -Z
    ZDown,
    /// Run the homing cycle
    Home,
    /// Cancel an active jog (realtime, not a line command)
    Abort,
}

impl JogDirection {
    /// Unit step per axis (X, Y, Z), or `None` for non-motion directions
    pub fn axis_signs(&self) -> Option<(i8, i8, i8)> {
        match self {
            JogDirection::N => Some((0, 1, 0)),
            JogDirection::S => Some((0, -1, 0)),
            JogDirection::E => Some((1, 0, 0)),
            JogDirection::W => Some((-1, 0, 0)),
            JogDirection::NE => Some((1, 1, 0)),
            JogDirection::NW => Some((-1, 1, 0)),
            JogDirection::SE => Some((1, -1, 0)),
            JogDirection::SW => Some((-1, -1, 0)),
            JogDirection::ZUp => Some((0, 0, 1)),
            JogDirection::ZDown => Some((0, 0, -1)),
            JogDirection::Home | JogDirection::Abort => None,
        }
    }
}

impl fmt::Display for JogDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JogDirection::N => "N",
            JogDirection::S => "S",
            JogDirection::E => "E",
            JogDirection::W => "W",
            JogDirection::NE => "NE",
            JogDirection::NW => "NW",
            JogDirection::SE => "SE",
            JogDirection::SW => "SW",
            JogDirection::ZUp => "Zup",
            JogDirection::ZDown => "Zdown",
            JogDirection::Home => "Home",
            JogDirection::Abort => "Abort",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for JogDirection {
    type Err = ControllerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "n" => Ok(JogDirection::N),
            "s" => Ok(JogDirection::S),
            "e" => Ok(JogDirection::E),
            "w" => Ok(JogDirection::W),
            "ne" => Ok(JogDirection::NE),
            "nw" => Ok(JogDirection::NW),
            "se" => Ok(JogDirection::SE),
            "sw" => Ok(JogDirection::SW),
            "zup" | "z+" => Ok(JogDirection::ZUp),
            "zdown" | "z-" => Ok(JogDirection::ZDown),
            "home" => Ok(JogDirection::Home),
            "abort" => Ok(JogDirection::Abort),
            _ => Err(ControllerError::InvalidDirection {
                direction: s.to_string(),
            }),
        }
    }
}

/// Operator-initiated relative move
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JogRequest {
    /// Direction of travel
    pub direction: JogDirection,
    /// Distance in mm, non-negative
    pub distance: f64,
    /// Feed rate in mm/min, positive
    pub feed_rate: f64,
}

impl JogRequest {
    /// Create a new jog request
    pub fn new(direction: JogDirection, distance: f64, feed_rate: f64) -> Self {
        Self {
            direction,
            distance,
            feed_rate,
        }
    }

    /// Format this request as a wire command
    pub fn to_command(&self) -> Result<String> {
        format_jog(self.direction, self.distance, self.feed_rate)
    }
}

/// Format a jog as a single wire command.
///
/// `Home` yields the homing cycle. `Abort` has no line form and is rejected
/// with `InvalidDirection`; it is sent as the jog-cancel realtime byte instead.
pub fn format_jog(direction: JogDirection, distance: f64, feed_rate: f64) -> Result<String> {
    if direction == JogDirection::Home {
        return Ok(HOMING_COMMAND.to_string());
    }

    let (sx, sy, sz) = direction
        .axis_signs()
        .ok_or_else(|| ControllerError::InvalidDirection {
            direction: direction.to_string(),
        })?;

    if !distance.is_finite() || distance < 0.0 {
        return Err(ControllerError::InvalidJog {
            reason: format!("distance must be non-negative, got {}", distance),
        }
        .into());
    }
    if !feed_rate.is_finite() || feed_rate <= 0.0 {
        return Err(ControllerError::InvalidJog {
            reason: format!("feed rate must be positive, got {}", feed_rate),
        }
        .into());
    }

    let mut cmd = String::from(JOG_PREFIX);
    for (axis, sign) in [('X', sx), ('Y', sy), ('Z', sz)] {
        let delta = f64::from(sign) * distance;
        if delta != 0.0 {
            cmd.push_str(&format!("{}{:.3}", axis, delta));
        }
    }
    cmd.push_str(&format!("F{}", feed_rate));

    Ok(cmd)
}
