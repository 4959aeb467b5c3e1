use crate::support::{connected, eventually, next_event};
use grblink_communication::{
    Connection, FramingConfig, MockTransport, SessionKind, StreamingConfig, StreamingEngine,
};
use grblink_core::{BoundingBox, ControllerError, DeviceEvent, StreamEvent};
use std::sync::Arc;
use std::time::Duration;

async fn framing_setup() -> (Arc<MockTransport>, Arc<Connection>, StreamingEngine) {
    let (mock, conn) = connected(false).await;
    mock.clear_writes();
    let engine = StreamingEngine::new(conn.clone(), StreamingConfig::default())
        .with_framing_config(FramingConfig {
            power: 10,
            feed_rate: 3000.0,
            corner_delay: Duration::from_millis(2),
        });
    (mock, conn, engine)
}

fn moves(mock: &MockTransport) -> Vec<String> {
    mock.sent_lines()
        .into_iter()
        .filter(|l| l.starts_with("G1"))
        .collect()
}

#[tokio::test]
async fn test_framing_traces_rectangle() {
    let (mock, conn, engine) = framing_setup().await;
    let mut rx = conn.events().receiver();

    engine.start_framing(BoundingBox::new(0.0, 0.0, 10.0, 5.0)).unwrap();
    assert_eq!(engine.session_kind(), Some(SessionKind::Framing));
    eventually(|| moves(&mock).len() >= 8).await;

    engine.stop();
    engine.wait().await;

    let lines = mock.sent_lines();
    assert_eq!(&lines[..3], &["G90", "G0 X0.000 Y0.000", "M3 S10"]);
    assert_eq!(
        &moves(&mock)[..4],
        &[
            "G1 X10.000 Y0.000 F3000",
            "G1 X10.000 Y5.000 F3000",
            "G1 X0.000 Y5.000 F3000",
            "G1 X0.000 Y0.000 F3000",
        ]
    );
    assert_eq!(lines.last().map(String::as_str), Some("M5"));

    let laps = next_event(&mut rx, |e| match e {
        DeviceEvent::Stream(StreamEvent::FramingStopped { laps }) => Some(laps),
        _ => None,
    })
    .await;
    assert!(laps >= 2);
    assert!(!engine.is_running());
}

#[tokio::test]
async fn test_frame_bounds_update_applies_next_lap() {
    let (mock, _conn, engine) = framing_setup().await;

    let err = engine
        .update_frame_bounds(BoundingBox::new(0.0, 0.0, 1.0, 1.0))
        .unwrap_err();
    assert_eq!(err.as_controller_error(), Some(&ControllerError::NotRunning));

    engine.start_framing(BoundingBox::new(0.0, 0.0, 10.0, 10.0)).unwrap();
    eventually(|| !moves(&mock).is_empty()).await;

    engine
        .update_frame_bounds(BoundingBox::new(20.0, 20.0, 5.0, 5.0))
        .unwrap();
    eventually(|| moves(&mock).contains(&"G1 X20.000 Y20.000 F3000".to_string())).await;
    assert!(moves(&mock).contains(&"G1 X5.000 Y5.000 F3000".to_string()));

    engine.stop();
    engine.wait().await;
}

#[tokio::test]
async fn test_framing_failure_still_turns_motion_off() {
    let (mock, conn, engine) = framing_setup().await;
    let mut rx = conn.events().receiver();
    mock.fail_command("M3 S10");

    engine.start_framing(BoundingBox::new(0.0, 0.0, 10.0, 5.0)).unwrap();
    let laps = next_event(&mut rx, |e| match e {
        DeviceEvent::Stream(StreamEvent::FramingStopped { laps }) => Some(laps),
        _ => None,
    })
    .await;
    engine.wait().await;

    assert_eq!(laps, 0);
    assert!(moves(&mock).is_empty());
    assert_eq!(mock.sent_lines().last().map(String::as_str), Some("M5"));
}

#[tokio::test]
async fn test_framing_pause_rearms_laser() {
    let (mock, _conn, engine) = framing_setup().await;

    engine.start_framing(BoundingBox::new(0.0, 0.0, 10.0, 5.0)).unwrap();
    eventually(|| moves(&mock).len() >= 2).await;

    engine.pause().unwrap();
    let at_pause = moves(&mock).len();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(moves(&mock).len(), at_pause);

    mock.clear_writes();
    engine.resume().unwrap();
    eventually(|| !moves(&mock).is_empty()).await;
    assert_eq!(mock.sent_lines().first().map(String::as_str), Some("M3 S10"));

    engine.stop();
    engine.wait().await;
}

#[tokio::test]
async fn test_framing_blocks_streaming() {
    let (_mock, _conn, engine) = framing_setup().await;

    engine.start_framing(BoundingBox::new(0.0, 0.0, 1.0, 1.0)).unwrap();
    let err = engine.start(vec!["G0 X0".to_string()]).unwrap_err();
    assert_eq!(err.as_controller_error(), Some(&ControllerError::AlreadyRunning));

    engine.stop();
    engine.wait().await;
}
