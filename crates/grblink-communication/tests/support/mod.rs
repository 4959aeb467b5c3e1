//! Helpers shared by the integration test binaries

#![allow(dead_code)]

use grblink_communication::{Connection, ConnectionConfig, MockTransport};
use grblink_core::DeviceEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

pub const MOCK_PORT: &str = "mock0";

/// Connection timings short enough for tests
pub fn test_config(status_polling: bool) -> ConnectionConfig {
    ConnectionConfig {
        settle_delay: Duration::ZERO,
        poll_interval: Duration::from_millis(20),
        poll_error_backoff: Duration::from_millis(40),
        idle_backoff: Duration::from_millis(1),
        join_timeout: Duration::from_millis(500),
        status_polling,
        ..Default::default()
    }
}

pub fn mock_connection(status_polling: bool) -> (Arc<MockTransport>, Arc<Connection>) {
    let mock = Arc::new(MockTransport::new());
    let conn = Arc::new(Connection::new(mock.clone(), test_config(status_polling)));
    (mock, conn)
}

pub async fn connected(status_polling: bool) -> (Arc<MockTransport>, Arc<Connection>) {
    let (mock, conn) = mock_connection(status_polling);
    conn.connect(MOCK_PORT, 115200).await.unwrap();
    (mock, conn)
}

/// Wait for the first event `select` maps to `Some`
pub async fn next_event<T>(
    rx: &mut broadcast::Receiver<DeviceEvent>,
    mut select: impl FnMut(DeviceEvent) -> Option<T>,
) -> T {
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(value) = select(event) {
                        return value;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Poll `condition` every few milliseconds until it holds
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(3), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}
