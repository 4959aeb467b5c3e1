//! In-memory transport
//!
//! A scriptable [`Transport`] that records every write and serves queued
//! inbound lines. It stands in for a controller in tests and in the CLI's
//! dry-run mode, where it answers status queries with a canned report.

use super::{ConnectionParams, Transport};
use grblink_core::{ConnectionError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;

#[derive(Default)]
struct MockState {
    params: Option<ConnectionParams>,
    open: bool,
    inbound: VecDeque<String>,
    writes: Vec<Vec<u8>>,
    open_failure: Option<String>,
    write_failure: Option<String>,
    failing_command: Option<String>,
    read_failure: Option<String>,
    status_reply: Option<String>,
    acknowledge_lines: bool,
}

/// Scriptable in-memory transport
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    /// Create a closed mock transport
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock that behaves like an idle controller: every `?` is answered
    /// with `status_line` and every text line with `ok`
    pub fn simulated_device(status_line: impl Into<String>) -> Self {
        let mock = Self::new();
        {
            let mut state = mock.state.lock();
            state.status_reply = Some(status_line.into());
            state.acknowledge_lines = true;
        }
        mock
    }

    /// Queue a line for the receive side
    pub fn push_line(&self, line: impl Into<String>) {
        self.state.lock().inbound.push_back(line.into());
    }

    /// Make the next `open` fail with `reason`
    pub fn fail_next_open(&self, reason: impl Into<String>) {
        self.state.lock().open_failure = Some(reason.into());
    }

    /// Make every write fail with `reason` until cleared with `None`
    pub fn set_write_failure(&self, reason: Option<String>) {
        self.state.lock().write_failure = reason;
    }

    /// Fail writes of this exact text command (terminator excluded)
    pub fn fail_command(&self, command: impl Into<String>) {
        self.state.lock().failing_command = Some(command.into());
    }

    /// Make the next read fail with a non-timeout error
    pub fn fail_next_read(&self, reason: impl Into<String>) {
        self.state.lock().read_failure = Some(reason.into());
    }

    /// Parameters passed to the last `configure`
    pub fn params(&self) -> Option<ConnectionParams> {
        self.state.lock().params.clone()
    }

    /// Every write, in order, as raw bytes
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().writes.clone()
    }

    /// Text commands written, terminators stripped, realtime bytes excluded
    pub fn sent_lines(&self) -> Vec<String> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|w| w.ends_with(b"\n"))
            .map(|w| String::from_utf8_lossy(w).trim_end().to_string())
            .collect()
    }

    /// Single-byte writes, in order
    pub fn realtime_bytes(&self) -> Vec<u8> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|w| w.len() == 1 && w[0] != b'\n')
            .map(|w| w[0])
            .collect()
    }

    /// Forget recorded writes
    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }
}

impl Transport for MockTransport {
    fn configure(&self, params: &ConnectionParams) -> Result<()> {
        self.state.lock().params = Some(params.clone());
        Ok(())
    }

    fn open(&self) -> Result<()> {
        let mut state = self.state.lock();
        let port = state
            .params
            .as_ref()
            .map(|p| p.port.clone())
            .unwrap_or_default();
        if let Some(reason) = state.open_failure.take() {
            return Err(ConnectionError::FailedToOpen { port, reason }.into());
        }
        if state.open {
            return Err(ConnectionError::FailedToOpen {
                port,
                reason: "already open".to_string(),
            }
            .into());
        }
        state.open = true;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.state.lock().open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn has_data_available(&self) -> Result<bool> {
        let state = self.state.lock();
        if !state.open {
            return Err(ConnectionError::ConnectionLost {
                reason: "port closed".to_string(),
            }
            .into());
        }
        Ok(!state.inbound.is_empty() || state.read_failure.is_some())
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(ConnectionError::ConnectionLost {
                reason: "port closed".to_string(),
            }
            .into());
        }
        if let Some(reason) = state.write_failure.clone() {
            return Err(ConnectionError::IoError { reason }.into());
        }

        let text = String::from_utf8_lossy(data);
        if let Some(failing) = &state.failing_command {
            if text.trim_end() == failing {
                return Err(ConnectionError::IoError {
                    reason: format!("write of '{}' failed", failing),
                }
                .into());
            }
        }

        let is_line = data.ends_with(b"\n");
        state.writes.push(data.to_vec());

        if data == b"?" {
            if let Some(reply) = state.status_reply.clone() {
                state.inbound.push_back(reply);
            }
        } else if is_line && state.acknowledge_lines {
            state.inbound.push_back("ok".to_string());
        }
        Ok(())
    }

    fn read_line(&self) -> Result<String> {
        let mut state = self.state.lock();
        if let Some(reason) = state.read_failure.take() {
            return Err(ConnectionError::ConnectionLost { reason }.into());
        }
        state.inbound.pop_front().ok_or_else(|| {
            ConnectionError::ConnectionTimeout {
                timeout_ms: state.params.as_ref().map(|p| p.timeout_ms).unwrap_or(0),
            }
            .into()
        })
    }

    fn name(&self) -> String {
        "mock".to_string()
    }
}
