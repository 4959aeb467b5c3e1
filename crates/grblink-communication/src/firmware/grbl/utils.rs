//! GRBL response classification and code lookup
//!
//! Used by the receive loop to give console lines a readable meaning in the
//! log. None of this feeds back into command pacing.

/// Kind of a line received from GRBL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrblResponse {
    /// `ok`
    Ok,
    /// `error:N`
    Error(u8),
    /// `ALARM:N`
    Alarm(u8),
    /// `<...>` status report
    Status,
    /// `Grbl 1.1h ['$' for help]` welcome banner
    Welcome(String),
    /// `[MSG:...]`, `[GC:...]` and other bracketed feedback
    Feedback(String),
    /// `$N=value` setting line
    Setting(String),
    /// Anything else
    Other(String),
}

impl GrblResponse {
    /// Classify a trimmed line
    pub fn classify(line: &str) -> Self {
        let trimmed = line.trim();

        if trimmed.eq_ignore_ascii_case("ok") {
            return GrblResponse::Ok;
        }

        if let Some(code) = strip_prefix_ignore_case(trimmed, "error:") {
            if let Ok(code) = code.trim().parse::<u8>() {
                return GrblResponse::Error(code);
            }
        }

        if let Some(code) = strip_prefix_ignore_case(trimmed, "alarm:") {
            if let Ok(code) = code.trim().parse::<u8>() {
                return GrblResponse::Alarm(code);
            }
        }

        if trimmed.starts_with('<') && trimmed.ends_with('>') {
            return GrblResponse::Status;
        }

        if trimmed.starts_with("Grbl ") {
            return GrblResponse::Welcome(trimmed.to_string());
        }

        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            return GrblResponse::Feedback(trimmed[1..trimmed.len() - 1].to_string());
        }

        if trimmed.starts_with('$') && trimmed.contains('=') {
            return GrblResponse::Setting(trimmed.to_string());
        }

        GrblResponse::Other(trimmed.to_string())
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s.is_char_boundary(prefix.len()) {
        let (head, tail) = s.split_at(prefix.len());
        if head.eq_ignore_ascii_case(prefix) {
            return Some(tail);
        }
    }
    None
}

/// Decode GRBL error code to human-readable message
pub fn decode_error(code: u8) -> &'static str {
    match code {
        1 => "Expected command letter",
        2 => "Bad number format",
        3 => "Invalid '$' statement",
        4 => "Negative value",
        5 => "Homing not enabled",
        6 => "Step pulse too short",
        7 => "EEPROM read failed",
        8 => "'$' command requires Idle",
        9 => "G-code locked during alarm or jog",
        10 => "Soft limits require homing",
        11 => "Line overflow",
        12 => "Step rate exceeded",
        13 => "Safety door open",
        14 => "Startup line too long",
        15 => "Jog target exceeds travel",
        16 => "Invalid jog command",
        17 => "Laser mode requires PWM output",
        20 => "Unsupported command",
        21 => "Modal group violation",
        22 => "Undefined feed rate",
        23 => "Command requires integer value",
        24 => "Multiple axis commands in block",
        25 => "Repeated word in block",
        26 => "No axis words in block",
        27 => "Invalid line number",
        28 => "Missing P or L value",
        29 => "Unsupported work coordinate system",
        30 => "G53 requires G0 or G1",
        31 => "Unused axis words",
        32 => "No axis words in arc plane",
        33 => "Invalid motion target",
        34 => "Arc radius error",
        35 => "Missing arc offset word",
        36 => "Unused words in block",
        37 => "Tool length offset axis error",
        38 => "Tool number too large",
        _ => "Unknown error",
    }
}

/// Decode GRBL alarm code to human-readable message
pub fn decode_alarm(code: u8) -> &'static str {
    match code {
        1 => "Hard limit triggered",
        2 => "Soft limit exceeded",
        3 => "Reset while in motion",
        4 => "Probe fail: initial state",
        5 => "Probe fail: no contact",
        6 => "Homing fail: reset during cycle",
        7 => "Homing fail: door opened",
        8 => "Homing fail: pull-off failed",
        9 => "Homing fail: switch not found",
        _ => "Unknown alarm",
    }
}
