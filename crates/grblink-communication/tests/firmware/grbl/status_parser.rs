use grblink_communication::firmware::grbl::{StatusParser, WorkOffsetTracker};
use grblink_core::{MachineState, Position, WorkPositionSource};
use proptest::prelude::*;

#[test]
fn test_parse_idle_machine_position() {
    let report = StatusParser::parse("<Idle|MPos:1.000,2.000,0.000|FS:0,0>").unwrap();
    assert_eq!(report.state, "Idle");
    assert_eq!(report.machine_state(), MachineState::Idle);
    assert_eq!(report.machine_position, Position::new(1.0, 2.0, 0.0));
}

#[test]
fn test_parse_offset_overrides_work_position() {
    let report = StatusParser::parse("<Idle|MPos:5,5,0|WCO:1,1,0>").unwrap();
    assert_eq!(report.work_position, Position::new(4.0, 4.0, 0.0));

    let report = StatusParser::parse("<Idle|WPos:0,0,0|MPos:5,5,0|WCO:1,1,0>").unwrap();
    assert_eq!(report.work_position, Position::new(4.0, 4.0, 0.0));
    assert_eq!(report.work_position_source, WorkPositionSource::FromOffset);
}

#[test]
fn test_parse_zero_offset_keeps_reported_work_position() {
    let report = StatusParser::parse("<Idle|MPos:5,5,0|WPos:2,2,0|WCO:0,0,0>").unwrap();
    assert_eq!(report.work_position, Position::new(2.0, 2.0, 0.0));
    assert_eq!(report.work_position_source, WorkPositionSource::Reported);
}

#[test]
fn test_parse_rejects_malformed() {
    assert!(StatusParser::parse("not a report").is_none());
    assert!(StatusParser::parse("").is_none());
    assert!(StatusParser::parse("<Idle|MPos:0,0,0").is_none());
    assert!(StatusParser::parse("Idle|MPos:0,0,0>").is_none());
    assert!(StatusParser::parse("<>").is_none());
}

#[test]
fn test_parse_tolerates_bad_numbers_and_unknown_fields() {
    let report =
        StatusParser::parse("<Hold:0|MPos:abc,2.5|Bf:15,128|Ov:100,100,100|FS:1200,x>").unwrap();
    assert_eq!(report.machine_state(), MachineState::Hold);
    assert_eq!(report.machine_position, Position::new(0.0, 2.5, 0.0));
    assert_eq!(report.feed_rate, 1200.0);
    assert_eq!(report.power, 0.0);
}

#[test]
fn test_parse_feed_and_power() {
    let report = StatusParser::parse("<Run|MPos:10.000,5.000,0.000|FS:1500,250>").unwrap();
    assert_eq!(report.machine_state(), MachineState::Run);
    assert_eq!(report.feed_rate, 1500.0);
    assert_eq!(report.power, 250.0);
}

#[test]
fn test_tracker_carries_offset_between_reports() {
    let mut tracker = WorkOffsetTracker::new();

    let first = tracker.apply(StatusParser::parse("<Idle|MPos:5,5,0|WCO:1,2,0>").unwrap());
    assert_eq!(first.work_position, Position::new(4.0, 3.0, 0.0));
    assert_eq!(tracker.offset(), Some(Position::new(1.0, 2.0, 0.0)));

    let next = tracker.apply(StatusParser::parse("<Run|MPos:6,6,0>").unwrap());
    assert_eq!(next.work_position, Position::new(5.0, 4.0, 0.0));
    assert_eq!(next.work_position_source, WorkPositionSource::FromOffset);

    tracker.apply(StatusParser::parse("<Idle|MPos:6,6,0|WCO:0,0,0>").unwrap());
    assert_eq!(tracker.offset(), None);
    let cleared = tracker.apply(StatusParser::parse("<Idle|MPos:6,6,0>").unwrap());
    assert_eq!(cleared.work_position, Position::new(6.0, 6.0, 0.0));
}

#[test]
fn test_tracker_does_not_touch_reported_work_position() {
    let mut tracker = WorkOffsetTracker::new();
    tracker.apply(StatusParser::parse("<Idle|MPos:5,5,0|WCO:1,1,0>").unwrap());
    let report = tracker.apply(StatusParser::parse("<Idle|WPos:3,3,0>").unwrap());
    assert_eq!(report.work_position, Position::new(3.0, 3.0, 0.0));
    assert_eq!(report.work_position_source, WorkPositionSource::Reported);
}

proptest! {
    #[test]
    fn prop_parse_never_panics(line in "\\PC*") {
        let _ = StatusParser::parse(&line);
    }

    #[test]
    fn prop_parse_never_panics_on_report_shapes(
        state in "[A-Za-z:0-9]{0,8}",
        fields in proptest::collection::vec("[A-Za-z]{1,4}:[-0-9.,a-z]{0,20}", 0..6),
    ) {
        let line = format!("<{}|{}>", state, fields.join("|"));
        let _ = StatusParser::parse(&line);
    }

    #[test]
    fn prop_machine_position_round_trips(
        x in -1000.0f64..1000.0,
        y in -1000.0f64..1000.0,
        z in -100.0f64..100.0,
    ) {
        let line = format!("<Idle|MPos:{:.3},{:.3},{:.3}|FS:0,0>", x, y, z);
        let report = StatusParser::parse(&line).unwrap();
        prop_assert!((report.machine_position.x - x).abs() < 0.001);
        prop_assert!((report.machine_position.y - y).abs() < 0.001);
        prop_assert!((report.machine_position.z - z).abs() < 0.001);
    }
}
