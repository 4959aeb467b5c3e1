//! GRBL Status Report Parsing
//!
//! Decodes `<STATE|MPos:x,y,z|WPos:x,y,z|FS:feed,power|WCO:x,y,z>` lines into
//! [`StatusReport`] snapshots. Field order is free apart from the state token,
//! and any subset of the position/feed fields may be present.
//!
//! The parser is stateless. GRBL only sends `WCO:` every few reports, so the
//! last known offset is carried across lines by a [`WorkOffsetTracker`] owned
//! by whoever consumes the reports.

use grblink_core::{Position, StatusReport, WorkPositionSource};

/// Stateless status line decoder
pub struct StatusParser;

impl StatusParser {
    /// Decode one status line.
    ///
    /// Returns `None` unless the line is wrapped in `<` ... `>` and carries a
    /// non-empty state token. Unknown fields are ignored; a value that fails
    /// to parse decodes as 0 without rejecting the rest of the report.
    pub fn parse(line: &str) -> Option<StatusReport> {
        let body = line.trim().strip_prefix('<')?.strip_suffix('>')?;

        let mut tokens = body.split('|');
        let state = tokens.next()?.trim();
        if state.is_empty() {
            return None;
        }

        let mut mpos: Option<Position> = None;
        let mut wpos: Option<Position> = None;
        let mut wco: Option<Position> = None;
        let mut feed_rate = 0.0;
        let mut power = 0.0;

        for field in tokens {
            let Some((key, value)) = field.split_once(':') else {
                continue;
            };
            match key.trim() {
                "MPos" => mpos = Some(Self::parse_position(value)),
                "WPos" => wpos = Some(Self::parse_position(value)),
                "WCO" => wco = Some(Self::parse_position(value)),
                "FS" => {
                    let mut values = value.split(',');
                    feed_rate = Self::parse_number(values.next());
                    power = Self::parse_number(values.next());
                }
                // Builds without variable spindle report feed alone
                "F" => feed_rate = Self::parse_number(Some(value)),
                _ => {}
            }
        }

        let offset = wco.filter(|o| !o.is_zero());

        let machine_position = match (mpos, wpos, offset) {
            (Some(m), _, _) => m,
            (None, Some(w), Some(o)) => w.plus(&o),
            _ => Position::default(),
        };

        let (work_position, work_position_source) = match (offset, wpos) {
            // Without WPos the offset applies to the machine position, even a defaulted one
            (Some(o), _) if mpos.is_some() || wpos.is_none() => {
                (machine_position.minus(&o), WorkPositionSource::FromOffset)
            }
            (_, Some(w)) => (w, WorkPositionSource::Reported),
            _ => (machine_position, WorkPositionSource::MachineOnly),
        };

        Some(StatusReport {
            state: state.to_string(),
            machine_position,
            work_position,
            work_offset: wco,
            feed_rate,
            power,
            work_position_source,
        })
    }

    /// Parse `x,y[,z]`; missing or malformed components are 0
    fn parse_position(value: &str) -> Position {
        let mut values = value.split(',');
        let x = Self::parse_number(values.next());
        let y = Self::parse_number(values.next());
        let z = Self::parse_number(values.next());
        Position::new(x, y, z)
    }

    fn parse_number(value: Option<&str>) -> f64 {
        value
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }
}

/// Carries the last reported work coordinate offset across status reports.
///
/// An explicit `WCO:` field always replaces the remembered offset, including
/// an all-zero one, which clears it.
#[derive(Debug, Clone, Default)]
pub struct WorkOffsetTracker {
    offset: Option<Position>,
}

impl WorkOffsetTracker {
    /// Create a tracker with no known offset
    pub fn new() -> Self {
        Self::default()
    }

    /// Last known non-zero offset
    pub fn offset(&self) -> Option<Position> {
        self.offset
    }

    /// Forget the remembered offset (e.g. after a soft reset)
    pub fn reset(&mut self) {
        self.offset = None;
    }

    /// Record this report's offset, and derive work position for reports that
    /// carry only machine position.
    pub fn apply(&mut self, mut report: StatusReport) -> StatusReport {
        if let Some(o) = report.work_offset {
            self.offset = (!o.is_zero()).then_some(o);
            return report;
        }

        if report.work_position_source == WorkPositionSource::MachineOnly {
            if let Some(o) = self.offset {
                report.work_position = report.machine_position.minus(&o);
                report.work_position_source = WorkPositionSource::FromOffset;
            }
        }
        report
    }
}
