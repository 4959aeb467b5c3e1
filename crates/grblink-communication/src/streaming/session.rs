//! Shared control state for one streaming or framing run
//!
//! The caller side (pause, resume, stop) and the loop task share a
//! [`SessionControl`] through an `Arc`. Flags are atomics; the pause gate is a
//! `watch` channel that holds `true` while open, so a parked loop wakes as soon
//! as the gate opens or the session token is cancelled.

use grblink_core::BoundingBox;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// What a session is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// A command sequence
    Stream,
    /// The bounding-box trace
    Framing,
}

pub(crate) struct SessionControl {
    kind: SessionKind,
    running: AtomicBool,
    paused: AtomicBool,
    stopping: AtomicBool,
    resumed: AtomicBool,
    /// Next index the loop will process
    index: AtomicUsize,
    total: usize,
    gate: watch::Sender<bool>,
    cancel: CancellationToken,
    bounds: RwLock<Option<BoundingBox>>,
}

impl SessionControl {
    pub(crate) fn new(
        kind: SessionKind,
        total: usize,
        cancel: CancellationToken,
        bounds: Option<BoundingBox>,
    ) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            kind,
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            resumed: AtomicBool::new(false),
            index: AtomicUsize::new(0),
            total,
            gate,
            cancel,
            bounds: RwLock::new(bounds),
        }
    }

    pub(crate) fn kind(&self) -> SessionKind {
        self.kind
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub(crate) fn index(&self) -> usize {
        self.index.load(Ordering::Acquire)
    }

    pub(crate) fn set_index(&self, index: usize) {
        self.index.store(index, Ordering::Release);
    }

    pub(crate) fn total(&self) -> usize {
        self.total
    }

    pub(crate) fn bounds(&self) -> Option<BoundingBox> {
        *self.bounds.read()
    }

    pub(crate) fn set_bounds(&self, bounds: BoundingBox) {
        *self.bounds.write() = Some(bounds);
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// True once stop was requested or the link went away
    pub(crate) fn should_stop(&self) -> bool {
        self.stopping.load(Ordering::Acquire) || self.cancel.is_cancelled()
    }

    /// Mark paused and close the gate. False if already paused.
    pub(crate) fn enter_pause(&self) -> bool {
        if self
            .paused
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.gate.send_replace(false);
        true
    }

    /// Clear the paused flag. The gate stays closed until
    /// [`Self::release_gate`]. False if not paused.
    pub(crate) fn leave_pause(&self) -> bool {
        let left = self
            .paused
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if left {
            self.resumed.store(true, Ordering::Release);
        }
        left
    }

    /// True once per resume, for loops that must re-arm after a hold
    pub(crate) fn take_resumed(&self) -> bool {
        self.resumed.swap(false, Ordering::AcqRel)
    }

    /// Open the gate unless the session is paused again.
    /// Returns true if the gate is open afterwards.
    pub(crate) fn release_gate(&self) -> bool {
        self.gate.send_if_modified(|open| {
            if *open || self.paused.load(Ordering::Acquire) {
                return false;
            }
            *open = true;
            true
        });
        *self.gate.borrow()
    }

    /// Request stop: clear pause and open the gate so a parked loop can
    /// observe the request, then cancel. Returns false if stop was already
    /// requested.
    pub(crate) fn request_stop(&self) -> bool {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.paused.store(false, Ordering::Release);
        self.gate.send_replace(true);
        self.cancel.cancel();
        true
    }

    pub(crate) fn finish(&self) {
        self.paused.store(false, Ordering::Release);
        self.running.store(false, Ordering::Release);
    }

    /// Park until the gate is open. False if cancelled while waiting.
    pub(crate) async fn wait_for_gate(&self) -> bool {
        let mut gate = self.gate.subscribe();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            open = async { gate.wait_for(|open| *open).await.is_ok() } => open,
        }
    }

    /// Sleep unless cancelled first. False if cancelled.
    pub(crate) async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
