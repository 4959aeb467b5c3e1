//! Device connection
//!
//! Owns the transport for one device link and runs two background loops while
//! connected:
//! - the receive loop, which reads lines, decodes status reports and publishes
//!   them in wire order
//! - the status-poll loop, which writes the status query byte on a fixed
//!   interval
//!
//! Both loops share one cancellation token per link. `disconnect` cancels it,
//! waits a bounded time for each loop, then closes the transport. Streaming
//! sessions run on child tokens of the same link, so disconnecting also ends
//! them without waiting on their pause gate.

use super::{ConnectionParams, SerialTransport, Transport};
use crate::firmware::grbl::utils::{decode_alarm, decode_error, GrblResponse};
use crate::firmware::grbl::{JogDirection, JogRequest, RealtimeCommand};
use crate::firmware::{StatusParser, WorkOffsetTracker};
use grblink_core::{
    ConnectionEvent, ConnectionState, ConsoleEvent, ControllerError, DeviceEvent, ErrorEvent,
    ErrorSource, EventBus, EventBusConfig, Result, StatusReport,
};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Timing and channel settings for a connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Delay after opening the transport before the loops start
    pub settle_delay: Duration,
    /// Interval between status queries
    pub poll_interval: Duration,
    /// Back-off after a failed status query
    pub poll_error_backoff: Duration,
    /// Sleep when no data is available to read
    pub idle_backoff: Duration,
    /// How long `disconnect` waits for each loop to exit
    pub join_timeout: Duration,
    /// Transport read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Run the status-poll loop
    pub status_polling: bool,
    /// Broadcast capacity of the event bus
    pub event_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(250),
            poll_error_backoff: Duration::from_millis(1000),
            idle_backoff: Duration::from_millis(10),
            join_timeout: Duration::from_secs(3),
            read_timeout_ms: 50,
            status_polling: true,
            event_capacity: 1024,
        }
    }
}

/// Background loop handles for one open link
struct LinkTasks {
    cancel: CancellationToken,
    receive: Option<JoinHandle<()>>,
    poll: Option<JoinHandle<()>>,
}

/// Marks a connection as carrying a streaming session; released on drop
pub(crate) struct StreamClaim {
    flag: Arc<AtomicBool>,
}

impl Drop for StreamClaim {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// One logical link to a GRBL device
pub struct Connection {
    transport: Arc<dyn Transport>,
    config: ConnectionConfig,
    events: EventBus,
    state: RwLock<ConnectionState>,
    port: RwLock<String>,
    link: Mutex<Option<LinkTasks>>,
    /// Serializes connect and disconnect
    lifecycle: tokio::sync::Mutex<()>,
    stream_claimed: Arc<AtomicBool>,
    last_report: Arc<RwLock<Option<StatusReport>>>,
}

impl Connection {
    /// Create a disconnected connection over `transport`
    pub fn new(transport: Arc<dyn Transport>, config: ConnectionConfig) -> Self {
        let events = EventBus::with_config(EventBusConfig {
            channel_capacity: config.event_capacity,
        });
        Self {
            transport,
            config,
            events,
            state: RwLock::new(ConnectionState::Disconnected),
            port: RwLock::new(String::new()),
            link: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            stream_claimed: Arc::new(AtomicBool::new(false)),
            last_report: Arc::new(RwLock::new(None)),
        }
    }

    /// Create a disconnected connection over a serial port
    pub fn serial(config: ConnectionConfig) -> Self {
        Self::new(Arc::new(SerialTransport::new()), config)
    }

    /// Event bus carrying this connection's notifications
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// True while the transport is open
    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Most recent status report, with work offset reconciled
    pub fn last_status(&self) -> Option<StatusReport> {
        self.last_report.read().clone()
    }

    /// Connection settings
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Port or address of the current or last link
    pub fn port(&self) -> String {
        self.port.read().clone()
    }

    /// True while a streaming or framing session holds this connection
    pub fn is_streaming(&self) -> bool {
        self.stream_claimed.load(Ordering::Acquire)
    }

    /// Open the link and start the background loops.
    ///
    /// On any failure the connection is torn down before the error is
    /// returned, leaving it Disconnected.
    pub async fn connect(&self, address: &str, baud_rate: u32) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        if self.transport.is_open() || self.state() != ConnectionState::Disconnected {
            return Err(ControllerError::AlreadyConnected.into());
        }

        *self.port.write() = address.to_string();
        self.set_state(ConnectionState::Connecting);
        self.events
            .publish(DeviceEvent::Connection(ConnectionEvent::Connecting {
                port: address.to_string(),
            }));
        tracing::info!("Connecting to {} at {} baud", address, baud_rate);

        match self.establish(address, baud_rate).await {
            Ok(()) => {
                self.set_state(ConnectionState::Connected);
                self.events
                    .publish(DeviceEvent::Connection(ConnectionEvent::Connected {
                        port: address.to_string(),
                    }));
                tracing::info!("Connected to {}", address);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Connection to {} failed: {}", address, e);
                self.teardown().await;
                self.events.publish(DeviceEvent::Error(ErrorEvent::new(
                    ErrorSource::Connect,
                    e.to_string(),
                )));
                self.events
                    .publish(DeviceEvent::Connection(ConnectionEvent::ConnectionFailed {
                        port: address.to_string(),
                        error: e.to_string(),
                    }));
                Err(e)
            }
        }
    }

    async fn establish(&self, address: &str, baud_rate: u32) -> Result<()> {
        let params = ConnectionParams {
            timeout_ms: self.config.read_timeout_ms,
            ..ConnectionParams::serial(address, baud_rate)
        };
        self.transport.configure(&params)?;
        self.transport.open()?;

        tokio::time::sleep(self.config.settle_delay).await;

        self.start_loops();
        self.send_realtime(RealtimeCommand::SoftReset)?;
        Ok(())
    }

    /// Stop the loops and close the transport.
    ///
    /// Idempotent and infallible: errors are logged and published on the
    /// event bus. Safe to call when never connected.
    pub async fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.teardown().await;
    }

    async fn teardown(&self) {
        let tasks = self.link.lock().take();

        if tasks.is_none()
            && !self.transport.is_open()
            && self.state() == ConnectionState::Disconnected
        {
            tracing::debug!("Disconnect requested while already disconnected");
            return;
        }

        self.set_state(ConnectionState::Disconnecting);

        if let Some(mut tasks) = tasks {
            tasks.cancel.cancel();
            if let Some(handle) = tasks.receive.take() {
                self.join_loop("receive", handle).await;
            }
            if let Some(handle) = tasks.poll.take() {
                self.join_loop("status poll", handle).await;
            }
        }

        if let Err(e) = self.transport.close() {
            tracing::warn!("Error closing transport: {}", e);
            self.events.publish(DeviceEvent::Error(ErrorEvent::new(
                ErrorSource::Disconnect,
                e.to_string(),
            )));
        }

        self.set_state(ConnectionState::Disconnected);
        self.events
            .publish(DeviceEvent::Connection(ConnectionEvent::Disconnected {
                port: self.port(),
            }));
        tracing::info!("Disconnected from {}", self.port());
    }

    async fn join_loop(&self, name: &str, mut handle: JoinHandle<()>) {
        match tokio::time::timeout(self.config.join_timeout, &mut handle).await {
            Ok(Ok(())) => tracing::debug!("{} loop stopped", name),
            Ok(Err(e)) => tracing::warn!("{} loop ended abnormally: {}", name, e),
            Err(_) => {
                tracing::warn!(
                    "{} loop did not stop within {:?}, aborting",
                    name,
                    self.config.join_timeout
                );
                handle.abort();
            }
        }
    }

    fn start_loops(&self) {
        let cancel = CancellationToken::new();

        let receive = tokio::spawn(receive_loop(
            self.loop_context(&cancel),
            self.last_report.clone(),
            self.config.idle_backoff,
        ));

        let poll = self.config.status_polling.then(|| {
            tokio::spawn(poll_loop(
                self.loop_context(&cancel),
                self.config.poll_interval,
                self.config.poll_error_backoff,
            ))
        });

        *self.link.lock() = Some(LinkTasks {
            cancel,
            receive: Some(receive),
            poll,
        });
    }

    fn loop_context(&self, cancel: &CancellationToken) -> LoopContext {
        LoopContext {
            transport: self.transport.clone(),
            events: self.events.clone(),
            cancel: cancel.clone(),
        }
    }

    fn set_state(&self, new_state: ConnectionState) {
        let old_state = std::mem::replace(&mut *self.state.write(), new_state);
        if old_state == new_state {
            return;
        }
        if !old_state.can_transition_to(new_state) {
            tracing::warn!(
                "Unexpected connection transition {} -> {}",
                old_state,
                new_state
            );
        }
        tracing::debug!("Connection state {} -> {}", old_state, new_state);
        self.events
            .publish(DeviceEvent::Connection(ConnectionEvent::StateChanged {
                state: new_state,
            }));
    }

    /// Write a text command, appending a line terminator if absent
    pub fn send(&self, command: &str) -> Result<()> {
        if !self.transport.is_open() {
            return Err(ControllerError::NotConnected.into());
        }

        let mut line = command.to_string();
        if !line.ends_with('\n') {
            line.push('\n');
        }

        if let Err(e) = self.transport.write(line.as_bytes()) {
            tracing::error!("Failed to send '{}': {}", command.trim(), e);
            self.events.publish(DeviceEvent::Error(ErrorEvent::new(
                ErrorSource::Transport,
                e.to_string(),
            )));
            return Err(e);
        }

        let sent = line.trim_end().to_string();
        tracing::debug!(">> {}", sent);
        self.events
            .publish(DeviceEvent::Console(ConsoleEvent::Sent { line: sent }));
        Ok(())
    }

    /// Write a single control byte without a terminator
    pub fn send_immediate(&self, byte: u8) -> Result<()> {
        if !self.transport.is_open() {
            return Err(ControllerError::NotConnected.into());
        }

        if let Err(e) = self.transport.write(&[byte]) {
            tracing::error!("Failed to send realtime byte 0x{:02X}: {}", byte, e);
            self.events.publish(DeviceEvent::Error(ErrorEvent::new(
                ErrorSource::Transport,
                e.to_string(),
            )));
            return Err(e);
        }
        tracing::trace!(">> 0x{:02X}", byte);
        Ok(())
    }

    /// Write a realtime command
    pub fn send_realtime(&self, command: RealtimeCommand) -> Result<()> {
        self.send_immediate(command.as_byte())
    }

    /// Send a jog. `Abort` cancels an active jog with the realtime byte.
    pub fn jog(&self, request: &JogRequest) -> Result<()> {
        if request.direction == JogDirection::Abort {
            return self.send_realtime(RealtimeCommand::JogCancel);
        }
        let command = request.to_command()?;
        self.send(&command)
    }

    /// Cancellation token of the current link, if connected
    pub(crate) fn link_token(&self) -> Option<CancellationToken> {
        self.link.lock().as_ref().map(|tasks| tasks.cancel.clone())
    }

    /// Claim the connection for a streaming session
    pub(crate) fn claim_stream(&self) -> Option<StreamClaim> {
        self.stream_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| StreamClaim {
                flag: self.stream_claimed.clone(),
            })
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(tasks) = self.link.get_mut().take() {
            tasks.cancel.cancel();
        }
    }
}

/// Shared handles passed into each background loop
struct LoopContext {
    transport: Arc<dyn Transport>,
    events: EventBus,
    cancel: CancellationToken,
}

impl LoopContext {
    /// Sleep for `duration` unless cancelled first; returns false if cancelled
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    fn report(&self, source: ErrorSource, message: String) {
        self.events
            .publish(DeviceEvent::Error(ErrorEvent::new(source, message)));
    }
}

/// Read lines until cancelled or the transport fails.
///
/// Transport reads are short and bounded by the read timeout, so they run
/// inline on the task.
async fn receive_loop(
    ctx: LoopContext,
    last_report: Arc<RwLock<Option<StatusReport>>>,
    idle_backoff: Duration,
) {
    tracing::debug!("Receive loop started");
    let mut tracker = WorkOffsetTracker::new();

    while !ctx.cancel.is_cancelled() {
        match ctx.transport.has_data_available() {
            Ok(true) => match ctx.transport.read_line() {
                Ok(line) => {
                    handle_line(&ctx, &mut tracker, &last_report, &line);
                    tokio::task::yield_now().await;
                }
                Err(e) if e.is_timeout() => {
                    if !ctx.pause(idle_backoff).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Receive loop stopped: {}", e);
                    ctx.report(ErrorSource::Receive, e.to_string());
                    break;
                }
            },
            Ok(false) => {
                if !ctx.pause(idle_backoff).await {
                    break;
                }
            }
            Err(e) if e.is_timeout() => {
                if !ctx.pause(idle_backoff).await {
                    break;
                }
            }
            Err(e) => {
                if ctx.cancel.is_cancelled() {
                    break;
                }
                tracing::error!("Receive loop stopped: {}", e);
                ctx.report(ErrorSource::Receive, e.to_string());
                break;
            }
        }
    }
    tracing::debug!("Receive loop exited");
}

fn handle_line(
    ctx: &LoopContext,
    tracker: &mut WorkOffsetTracker,
    last_report: &RwLock<Option<StatusReport>>,
    raw: &str,
) {
    let line = raw.trim();

    if line.starts_with('<') && line.ends_with('>') {
        match StatusParser::parse(line) {
            Some(report) => {
                let report = tracker.apply(report);
                *last_report.write() = Some(report.clone());
                ctx.events.publish(DeviceEvent::Telemetry(report));
            }
            None => tracing::debug!("Discarded malformed status line: {}", line),
        }
    } else {
        match GrblResponse::classify(line) {
            GrblResponse::Error(code) => {
                tracing::warn!("GRBL error {}: {}", code, decode_error(code))
            }
            GrblResponse::Alarm(code) => {
                tracing::warn!("GRBL alarm {}: {}", code, decode_alarm(code))
            }
            GrblResponse::Welcome(banner) => {
                // A banner follows every reset, which clears the firmware's offsets
                tracker.reset();
                tracing::info!("Controller ready: {}", banner)
            }
            _ => tracing::debug!("<< {}", line),
        }
    }

    ctx.events.publish(DeviceEvent::Console(ConsoleEvent::Received {
        line: line.to_string(),
    }));
}

/// Query status every `interval` until cancelled. Failures back off and retry.
async fn poll_loop(ctx: LoopContext, interval: Duration, error_backoff: Duration) {
    tracing::debug!("Status poll loop started");
    let query = [RealtimeCommand::StatusQuery.as_byte()];

    loop {
        if !ctx.pause(interval).await {
            break;
        }
        if !ctx.transport.is_open() {
            continue;
        }
        if let Err(e) = ctx.transport.write(&query) {
            tracing::warn!("Status query failed: {}", e);
            ctx.report(ErrorSource::Poll, e.to_string());
            if !ctx.pause(error_backoff).await {
                break;
            }
        }
    }
    tracing::debug!("Status poll loop exited");
}
