//! Streaming engine and the command streaming loop

use super::framing::run_framing;
use super::pacing::{FixedDelayPacing, PacingPolicy};
use super::session::{SessionControl, SessionKind};
use super::{is_skippable, FramingConfig, StreamingConfig};
use crate::communication::connection::StreamClaim;
use crate::communication::Connection;
use crate::firmware::RealtimeCommand;
use grblink_core::{BoundingBox, ControllerError, DeviceEvent, Error, Result, StreamEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Runs streaming and framing sessions against one connection.
///
/// At most one session runs at a time, and the connection itself refuses a
/// second session even from another engine. `pause`, `resume` and `stop` are
/// serialized, so each one's flag change, writes and gate change are seen as
/// a unit by the others.
pub struct StreamingEngine {
    connection: Arc<Connection>,
    config: StreamingConfig,
    framing: FramingConfig,
    pacing: Arc<dyn PacingPolicy>,
    session: Mutex<Option<Arc<SessionControl>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    /// Held across each pause, resume and stop
    control: Mutex<()>,
}

/// Everything a session task owns
pub(crate) struct RunContext {
    pub(crate) connection: Arc<Connection>,
    pub(crate) session: Arc<SessionControl>,
    pub(crate) config: StreamingConfig,
    claim: Option<StreamClaim>,
}

impl RunContext {
    /// Release the connection and mark the session finished
    pub(crate) fn finish(&mut self) {
        self.claim.take();
        self.session.finish();
    }

    pub(crate) fn publish(&self, event: StreamEvent) {
        self.connection.events().publish(DeviceEvent::Stream(event));
    }
}

enum StreamOutcome {
    Completed,
    Cancelled(usize),
    Failed(usize, Error),
}

impl StreamingEngine {
    /// Engine with fixed-delay pacing from `config.command_delay`
    pub fn new(connection: Arc<Connection>, config: StreamingConfig) -> Self {
        let pacing = Arc::new(FixedDelayPacing::new(config.command_delay));
        Self::with_pacing(connection, config, pacing)
    }

    /// Engine with a custom pacing policy
    pub fn with_pacing(
        connection: Arc<Connection>,
        config: StreamingConfig,
        pacing: Arc<dyn PacingPolicy>,
    ) -> Self {
        Self {
            connection,
            config,
            framing: FramingConfig::default(),
            pacing,
            session: Mutex::new(None),
            task: Mutex::new(None),
            control: Mutex::new(()),
        }
    }

    /// Replace the framing settings
    pub fn with_framing_config(mut self, framing: FramingConfig) -> Self {
        self.framing = framing;
        self
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Start streaming `commands` on a background task.
    ///
    /// Fails with `AlreadyRunning` if a session is active and `NotConnected`
    /// if the connection is not open. Returns without waiting for the first
    /// send.
    pub fn start(&self, commands: Vec<String>) -> Result<()> {
        let mut slot = self.session.lock();
        let (session, claim, runtime) =
            self.begin(&slot, SessionKind::Stream, commands.len(), None)?;

        let ctx = RunContext {
            connection: self.connection.clone(),
            session: session.clone(),
            config: self.config.clone(),
            claim: Some(claim),
        };
        let pacing = self.pacing.clone();
        *slot = Some(session);
        *self.task.lock() = Some(runtime.spawn(run_stream(ctx, commands, pacing)));
        Ok(())
    }

    /// Start tracing `bounds` until stopped
    pub fn start_framing(&self, bounds: BoundingBox) -> Result<()> {
        let mut slot = self.session.lock();
        let (session, claim, runtime) =
            self.begin(&slot, SessionKind::Framing, 0, Some(bounds))?;

        let ctx = RunContext {
            connection: self.connection.clone(),
            session: session.clone(),
            config: self.config.clone(),
            claim: Some(claim),
        };
        let framing = self.framing.clone();
        *slot = Some(session);
        *self.task.lock() = Some(runtime.spawn(run_framing(ctx, framing)));
        Ok(())
    }

    fn begin(
        &self,
        current: &Option<Arc<SessionControl>>,
        kind: SessionKind,
        total: usize,
        bounds: Option<BoundingBox>,
    ) -> Result<(Arc<SessionControl>, StreamClaim, Handle)> {
        if current.as_ref().is_some_and(|s| s.is_running()) {
            return Err(ControllerError::AlreadyRunning.into());
        }
        if !self.connection.state().is_connected() || !self.connection.is_open() {
            return Err(ControllerError::NotConnected.into());
        }
        let link = self
            .connection
            .link_token()
            .ok_or(ControllerError::NotConnected)?;
        let runtime = Handle::try_current()
            .map_err(|e| Error::other(format!("streaming needs a Tokio runtime: {}", e)))?;
        let claim = self
            .connection
            .claim_stream()
            .ok_or(ControllerError::AlreadyRunning)?;

        let session = Arc::new(SessionControl::new(
            kind,
            total,
            link.child_token(),
            bounds,
        ));
        tracing::info!("Starting {:?} session ({} entries)", kind, total);
        Ok((session, claim, runtime))
    }

    fn active_session(&self) -> Option<Arc<SessionControl>> {
        self.session
            .lock()
            .as_ref()
            .filter(|s| s.is_running())
            .cloned()
    }

    /// Replace the rectangle traced by the running framing session
    pub fn update_frame_bounds(&self, bounds: BoundingBox) -> Result<()> {
        let session = self
            .active_session()
            .filter(|s| s.kind() == SessionKind::Framing)
            .ok_or(ControllerError::NotRunning)?;
        session.set_bounds(bounds);
        tracing::debug!("Frame bounds updated to {:?}", bounds);
        Ok(())
    }

    /// Park the session before its next entry and hold the machine.
    ///
    /// The paused flag and gate change before anything is written, so the
    /// session is paused even if a hold write fails.
    pub fn pause(&self) -> Result<()> {
        let _control = self.control.lock();
        let session = self.active_session().ok_or(ControllerError::NotRunning)?;
        if !session.enter_pause() {
            return Err(ControllerError::AlreadyPaused.into());
        }

        let index = session.index();
        tracing::info!("Session paused at {}", index);
        self.connection
            .events()
            .publish(DeviceEvent::Stream(StreamEvent::Paused { index }));

        self.connection.send_realtime(RealtimeCommand::FeedHold)?;
        self.connection.send(&self.config.motion_off_command)?;
        Ok(())
    }

    /// Release a paused session. The gate opens even if cycle-resume fails.
    pub fn resume(&self) -> Result<()> {
        let _control = self.control.lock();
        let session = self.active_session().ok_or(ControllerError::NotRunning)?;
        if !session.leave_pause() {
            return Err(ControllerError::NotPaused.into());
        }

        let sent = self.connection.send_realtime(RealtimeCommand::CycleResume);
        session.release_gate();

        let index = session.index();
        tracing::info!("Session resumed at {}", index);
        self.connection
            .events()
            .publish(DeviceEvent::Stream(StreamEvent::Resumed { index }));
        sent
    }

    /// Cancel the running session, paused or not. No-op when idle.
    pub fn stop(&self) {
        let _control = self.control.lock();
        let Some(session) = self.active_session() else {
            tracing::debug!("Stop requested with no active session");
            return;
        };
        if !session.request_stop() {
            return;
        }
        tracing::info!("Stopping {:?} session at {}", session.kind(), session.index());

        if !self.connection.is_open() {
            return;
        }
        if let Err(e) = self.connection.send_realtime(RealtimeCommand::FeedHold) {
            tracing::warn!("Feed hold on stop failed: {}", e);
        }
        if let Err(e) = self.connection.send(&self.config.motion_off_command) {
            tracing::warn!("Motion off on stop failed: {}", e);
        }
    }

    /// Wait for the current session task to exit
    pub async fn wait(&self) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!("Session task ended abnormally: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.active_session().is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.active_session().is_some_and(|s| s.is_paused())
    }

    /// Kind of the running session
    pub fn session_kind(&self) -> Option<SessionKind> {
        self.active_session().map(|s| s.kind())
    }

    /// `(next index, total entries)` of the running session
    pub fn progress(&self) -> Option<(usize, usize)> {
        self.active_session().map(|s| (s.index(), s.total()))
    }
}

impl Drop for StreamingEngine {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            if session.is_running() {
                session.request_stop();
            }
        }
    }
}

async fn run_stream(mut ctx: RunContext, commands: Vec<String>, pacing: Arc<dyn PacingPolicy>) {
    let started = Instant::now();
    let total = commands.len();
    let interval = ctx.config.progress_interval.max(1);
    ctx.publish(StreamEvent::Started { total_lines: total });

    let mut outcome = StreamOutcome::Completed;
    for (index, command) in commands.iter().enumerate() {
        if ctx.session.should_stop() {
            outcome = StreamOutcome::Cancelled(index);
            break;
        }
        if !ctx.session.wait_for_gate().await || ctx.session.should_stop() {
            outcome = StreamOutcome::Cancelled(index);
            break;
        }

        let is_last = index + 1 == total;
        let line = command.trim();
        if is_skippable(line) {
            tracing::trace!("Skipping entry {}", index);
            ctx.session.set_index(index + 1);
            if is_last {
                ctx.publish(StreamEvent::Progress { index, total_lines: total });
            }
            continue;
        }

        if let Err(e) = ctx.connection.send(line) {
            outcome = StreamOutcome::Failed(index, e);
            break;
        }
        ctx.session.set_index(index + 1);

        if (index + 1) % interval == 0 || is_last {
            ctx.publish(StreamEvent::Progress { index, total_lines: total });
        }

        tokio::select! {
            biased;
            _ = ctx.session.cancel_token().cancelled() => {
                outcome = StreamOutcome::Cancelled(index + 1);
                break;
            }
            _ = pacing.wait_for_next_send(index, line) => {}
        }
    }

    ctx.finish();
    match outcome {
        StreamOutcome::Completed => {
            let duration = started.elapsed();
            tracing::info!("Stream completed: {} entries in {:?}", total, duration);
            ctx.publish(StreamEvent::Completed {
                total_lines: total,
                duration,
            });
        }
        StreamOutcome::Cancelled(index) => {
            tracing::info!("Stream cancelled at {}/{}", index, total);
            ctx.publish(StreamEvent::Cancelled { index });
        }
        StreamOutcome::Failed(index, error) => {
            tracing::error!("Stream aborted at {}: {}", index, error);
            ctx.publish(StreamEvent::Failed {
                index,
                error: error.to_string(),
            });
        }
    }
}
