use crate::support::{connected, eventually, mock_connection, next_event, MOCK_PORT};
use grblink_communication::{JogDirection, JogRequest, RealtimeCommand, Transport};
use grblink_core::{
    ConnectionEvent, ConnectionState, ConsoleEvent, ControllerError, DeviceEvent, ErrorSource,
    EventCategory, EventFilter, Position,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_disconnect_when_never_connected() {
    let (_mock, conn) = mock_connection(true);
    conn.disconnect().await;
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert!(!conn.is_open());
}

#[tokio::test]
async fn test_disconnect_twice() {
    let (mock, conn) = connected(true).await;
    assert_eq!(conn.state(), ConnectionState::Connected);

    conn.disconnect().await;
    conn.disconnect().await;

    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert!(!mock.is_open());
}

#[tokio::test]
async fn test_connect_configures_and_resets() {
    let (mock, conn) = connected(false).await;

    let params = mock.params().unwrap();
    assert_eq!(params.port, MOCK_PORT);
    assert_eq!(params.baud_rate, 115200);
    assert_eq!(
        mock.realtime_bytes().first(),
        Some(&RealtimeCommand::SoftReset.as_byte())
    );
    assert_eq!(conn.port(), MOCK_PORT);

    conn.disconnect().await;
}

#[tokio::test]
async fn test_connect_publishes_phases() {
    let (_mock, conn) = mock_connection(false);
    let mut rx = conn.events().receiver();

    conn.connect(MOCK_PORT, 115200).await.unwrap();

    let first = next_event(&mut rx, |e| match e {
        DeviceEvent::Connection(ConnectionEvent::Connecting { port }) => Some(port),
        _ => None,
    })
    .await;
    assert_eq!(first, MOCK_PORT);
    next_event(&mut rx, |e| match e {
        DeviceEvent::Connection(ConnectionEvent::Connected { .. }) => Some(()),
        _ => None,
    })
    .await;

    conn.disconnect().await;
    next_event(&mut rx, |e| match e {
        DeviceEvent::Connection(ConnectionEvent::Disconnected { .. }) => Some(()),
        _ => None,
    })
    .await;
}

#[tokio::test]
async fn test_connect_failure_leaves_disconnected() {
    let (mock, conn) = mock_connection(true);
    let mut rx = conn.events().receiver();
    mock.fail_next_open("port busy");

    let err = conn.connect(MOCK_PORT, 115200).await.unwrap_err();
    assert!(err.is_connection_error());
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert!(!conn.is_open());

    let reason = next_event(&mut rx, |e| match e {
        DeviceEvent::Connection(ConnectionEvent::ConnectionFailed { error, .. }) => Some(error),
        _ => None,
    })
    .await;
    assert!(reason.contains("port busy"));

    // A fresh connect works after the failure
    conn.connect(MOCK_PORT, 115200).await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Connected);
    conn.disconnect().await;
}

#[tokio::test]
async fn test_connect_failure_after_open_closes_transport() {
    let (mock, conn) = mock_connection(true);
    mock.set_write_failure(Some("cable unplugged".to_string()));

    assert!(conn.connect(MOCK_PORT, 115200).await.is_err());
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert!(!mock.is_open());
}

#[tokio::test]
async fn test_connect_twice_is_rejected() {
    let (_mock, conn) = connected(false).await;
    let err = conn.connect(MOCK_PORT, 115200).await.unwrap_err();
    assert_eq!(
        err.as_controller_error(),
        Some(&ControllerError::AlreadyConnected)
    );
    assert_eq!(conn.state(), ConnectionState::Connected);
    conn.disconnect().await;
}

#[tokio::test]
async fn test_send_requires_connection() {
    let (_mock, conn) = mock_connection(false);
    let err = conn.send("G0 X0").unwrap_err();
    assert_eq!(err.as_controller_error(), Some(&ControllerError::NotConnected));
    let err = conn.send_immediate(b'!').unwrap_err();
    assert_eq!(err.as_controller_error(), Some(&ControllerError::NotConnected));
}

#[tokio::test]
async fn test_send_appends_terminator_once() {
    let (mock, conn) = connected(false).await;
    mock.clear_writes();

    conn.send("G0 X0").unwrap();
    conn.send("G1 X1 F100\n").unwrap();
    conn.send_realtime(RealtimeCommand::FeedHold).unwrap();

    assert_eq!(
        mock.writes(),
        vec![b"G0 X0\n".to_vec(), b"G1 X1 F100\n".to_vec(), vec![b'!']]
    );
    conn.disconnect().await;
}

#[tokio::test]
async fn test_send_failure_is_reported_and_returned() {
    let (mock, conn) = connected(false).await;
    let mut rx = conn.events().receiver();
    mock.set_write_failure(Some("write failed".to_string()));

    assert!(conn.send("G0 X0").is_err());
    let source = next_event(&mut rx, |e| match e {
        DeviceEvent::Error(err) => Some(err.source),
        _ => None,
    })
    .await;
    assert_eq!(source, ErrorSource::Transport);
    assert_eq!(conn.state(), ConnectionState::Connected);

    mock.set_write_failure(None);
    conn.disconnect().await;
}

#[tokio::test]
async fn test_status_reports_arrive_in_wire_order() {
    let (mock, conn) = connected(false).await;
    let mut rx = conn.events().receiver();

    for x in 1..=5 {
        mock.push_line(format!("<Run|MPos:{}.000,0.000,0.000|FS:500,0>", x));
    }

    let mut seen = Vec::new();
    while seen.len() < 5 {
        let x = next_event(&mut rx, |e| match e {
            DeviceEvent::Telemetry(report) => Some(report.machine_position.x),
            _ => None,
        })
        .await;
        seen.push(x);
    }
    assert_eq!(seen, vec![1.0, 2.0, 3.0, 4.0, 5.0]);

    conn.disconnect().await;
}

#[tokio::test]
async fn test_every_line_is_echoed_to_console() {
    let (mock, conn) = connected(false).await;
    let mut rx = conn.events().receiver();

    mock.push_line("ok");
    mock.push_line("  <Idle|MPos:0,0,0>  ");
    mock.push_line("not a <report");
    mock.push_line("error:22");

    let mut lines = Vec::new();
    while lines.len() < 4 {
        let line = next_event(&mut rx, |e| match e {
            DeviceEvent::Console(ConsoleEvent::Received { line }) => Some(line),
            _ => None,
        })
        .await;
        lines.push(line);
    }
    assert_eq!(
        lines,
        vec!["ok", "<Idle|MPos:0,0,0>", "not a <report", "error:22"]
    );

    conn.disconnect().await;
}

#[tokio::test]
async fn test_blank_lines_are_echoed_to_console() {
    let (mock, conn) = connected(false).await;
    let mut rx = conn.events().receiver();

    mock.push_line("");
    mock.push_line("ok");

    let mut lines = Vec::new();
    while lines.len() < 2 {
        let line = next_event(&mut rx, |e| match e {
            DeviceEvent::Console(ConsoleEvent::Received { line }) => Some(line),
            _ => None,
        })
        .await;
        lines.push(line);
    }
    assert_eq!(lines, vec!["", "ok"]);

    conn.disconnect().await;
}

#[tokio::test]
async fn test_malformed_status_is_discarded() {
    let (mock, conn) = connected(false).await;
    let mut rx = conn.events().receiver();

    mock.push_line("<>");
    mock.push_line("<Idle|MPos:7,0,0>");

    let x = next_event(&mut rx, |e| match e {
        DeviceEvent::Telemetry(report) => Some(report.machine_position.x),
        _ => None,
    })
    .await;
    assert_eq!(x, 7.0);
    assert_eq!(conn.state(), ConnectionState::Connected);

    conn.disconnect().await;
}

#[tokio::test]
async fn test_work_offset_is_carried_across_reports() {
    let (mock, conn) = connected(false).await;

    mock.push_line("<Idle|MPos:5,5,0|WCO:1,1,0>");
    mock.push_line("<Idle|MPos:6,6,0>");

    eventually(|| {
        conn.last_status()
            .is_some_and(|r| r.machine_position == Position::new(6.0, 6.0, 0.0))
    })
    .await;
    let report = conn.last_status().unwrap();
    assert_eq!(report.work_position, Position::new(5.0, 5.0, 0.0));

    conn.disconnect().await;
}

#[tokio::test]
async fn test_reset_banner_forgets_work_offset() {
    let (mock, conn) = connected(false).await;

    mock.push_line("<Idle|MPos:5,5,0|WCO:1,1,0>");
    mock.push_line("Grbl 1.1h ['$' for help]");
    mock.push_line("<Idle|MPos:6,6,0>");

    eventually(|| {
        conn.last_status()
            .is_some_and(|r| r.machine_position == Position::new(6.0, 6.0, 0.0))
    })
    .await;
    let report = conn.last_status().unwrap();
    assert_eq!(report.work_position, Position::new(6.0, 6.0, 0.0));

    conn.disconnect().await;
}

#[tokio::test]
async fn test_poll_loop_queries_status() {
    let (mock, conn) = connected(true).await;
    let query = RealtimeCommand::StatusQuery.as_byte();

    eventually(|| mock.realtime_bytes().iter().filter(|&&b| b == query).count() >= 2).await;

    conn.disconnect().await;
    let polls = mock.realtime_bytes().len();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(mock.realtime_bytes().len(), polls);
}

#[tokio::test]
async fn test_poll_failures_back_off_and_recover() {
    let (mock, conn) = connected(true).await;
    let mut rx = conn.events().receiver();
    mock.set_write_failure(Some("transient".to_string()));

    let source = next_event(&mut rx, |e| match e {
        DeviceEvent::Error(err) => Some(err.source),
        _ => None,
    })
    .await;
    assert_eq!(source, ErrorSource::Poll);
    assert_eq!(conn.state(), ConnectionState::Connected);

    mock.set_write_failure(None);
    mock.clear_writes();
    let query = RealtimeCommand::StatusQuery.as_byte();
    eventually(|| mock.realtime_bytes().contains(&query)).await;

    conn.disconnect().await;
}

#[tokio::test]
async fn test_read_failure_ends_receive_loop() {
    let (mock, conn) = connected(false).await;
    let mut rx = conn.events().receiver();
    mock.fail_next_read("device vanished");

    let message = next_event(&mut rx, |e| match e {
        DeviceEvent::Error(err) if err.source == ErrorSource::Receive => Some(err.message),
        _ => None,
    })
    .await;
    assert!(message.contains("device vanished"));

    // Disconnect still completes and cleans up
    conn.disconnect().await;
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_jog_dispatch() {
    let (mock, conn) = connected(false).await;
    mock.clear_writes();

    conn.jog(&JogRequest::new(JogDirection::NE, 5.0, 1000.0))
        .unwrap();
    conn.jog(&JogRequest::new(JogDirection::Home, 0.0, 0.0))
        .unwrap();
    conn.jog(&JogRequest::new(JogDirection::Abort, 0.0, 0.0))
        .unwrap();

    assert_eq!(mock.sent_lines(), vec!["$J=G91X5.000Y5.000F1000", "$H"]);
    assert_eq!(
        mock.realtime_bytes(),
        vec![RealtimeCommand::JogCancel.as_byte()]
    );

    let err = conn
        .jog(&JogRequest::new(JogDirection::E, -1.0, 1000.0))
        .unwrap_err();
    assert!(matches!(
        err.as_controller_error(),
        Some(ControllerError::InvalidJog { .. })
    ));

    conn.disconnect().await;
}

#[tokio::test]
async fn test_filtered_subscriber_sees_only_its_category() {
    let (mock, conn) = connected(false).await;
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let sink = seen.clone();
    let id = conn.events().subscribe(
        EventFilter::Categories(vec![EventCategory::Telemetry]),
        move |event| sink.lock().push(event.category()),
    );

    mock.push_line("ok");
    mock.push_line("<Idle|MPos:0,0,0>");
    eventually(|| !seen.lock().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(seen.lock().iter().all(|c| *c == EventCategory::Telemetry));
    assert!(conn.events().unsubscribe(id));

    conn.disconnect().await;
}
