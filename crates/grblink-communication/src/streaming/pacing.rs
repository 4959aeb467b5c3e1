//! Send pacing
//!
//! The streaming loop waits on a [`PacingPolicy`] after every command it
//! sends. The default policy is a fixed delay; it does not track the
//! controller's planner buffer.

use async_trait::async_trait;
use std::time::Duration;

/// Decides when the streaming loop may send its next command
#[async_trait]
pub trait PacingPolicy: Send + Sync {
    /// Wait after `command` at `index` was sent.
    ///
    /// The loop races this against cancellation, so an implementation may
    /// wait indefinitely.
    async fn wait_for_next_send(&self, index: usize, command: &str);
}

/// Waits a fixed delay between commands
#[derive(Debug, Clone, Copy)]
pub struct FixedDelayPacing {
    delay: Duration,
}

impl FixedDelayPacing {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for FixedDelayPacing {
    fn default() -> Self {
        Self::new(Duration::from_millis(20))
    }
}

#[async_trait]
impl PacingPolicy for FixedDelayPacing {
    async fn wait_for_next_send(&self, _index: usize, _command: &str) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}
