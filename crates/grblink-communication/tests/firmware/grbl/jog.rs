use grblink_communication::firmware::grbl::{format_jog, JogDirection, JogRequest};
use grblink_core::ControllerError;
use proptest::prelude::*;

#[test]
fn test_jog_northeast() {
    let request = JogRequest::new(JogDirection::NE, 5.0, 1000.0);
    assert_eq!(request.to_command().unwrap(), "$J=G91X5.000Y5.000F1000");
}

#[test]
fn test_jog_north_omits_x() {
    assert_eq!(
        format_jog(JogDirection::N, 3.0, 500.0).unwrap(),
        "$J=G91Y3.000F500"
    );
}

#[test]
fn test_jog_fractional_feed() {
    assert_eq!(
        format_jog(JogDirection::ZUp, 0.1, 150.5).unwrap(),
        "$J=G91Z0.100F150.5"
    );
}

#[test]
fn test_home_and_abort() {
    assert_eq!(format_jog(JogDirection::Home, 10.0, 1000.0).unwrap(), "$H");
    let err = format_jog(JogDirection::Abort, 10.0, 1000.0).unwrap_err();
    assert!(matches!(
        err.as_controller_error(),
        Some(ControllerError::InvalidDirection { .. })
    ));
}

#[test]
fn test_invalid_jog_values() {
    let err = format_jog(JogDirection::S, -2.0, 1000.0).unwrap_err();
    assert!(matches!(
        err.as_controller_error(),
        Some(ControllerError::InvalidJog { .. })
    ));
    let err = format_jog(JogDirection::S, 2.0, -5.0).unwrap_err();
    assert!(matches!(
        err.as_controller_error(),
        Some(ControllerError::InvalidJog { .. })
    ));
}

#[test]
fn test_direction_round_trips_through_text() {
    for direction in [
        JogDirection::N,
        JogDirection::S,
        JogDirection::E,
        JogDirection::W,
        JogDirection::NE,
        JogDirection::NW,
        JogDirection::SE,
        JogDirection::SW,
        JogDirection::ZUp,
        JogDirection::ZDown,
        JogDirection::Home,
        JogDirection::Abort,
    ] {
        assert_eq!(direction.to_string().parse::<JogDirection>().unwrap(), direction);
    }
}

fn motion_direction() -> impl Strategy<Value = JogDirection> {
    prop_oneof![
        Just(JogDirection::N),
        Just(JogDirection::S),
        Just(JogDirection::E),
        Just(JogDirection::W),
        Just(JogDirection::NE),
        Just(JogDirection::NW),
        Just(JogDirection::SE),
        Just(JogDirection::SW),
        Just(JogDirection::ZUp),
        Just(JogDirection::ZDown),
    ]
}

proptest! {
    #[test]
    fn prop_jog_emits_only_implied_axes(
        direction in motion_direction(),
        distance in 0.001f64..500.0,
        feed in 1u32..10_000,
    ) {
        let cmd = format_jog(direction, distance, f64::from(feed)).unwrap();
        let (sx, sy, sz) = direction.axis_signs().unwrap();

        prop_assert!(cmd.starts_with("$J=G91"));
        let expected_feed = format!("F{}", feed);
        prop_assert!(cmd.ends_with(&expected_feed));
        prop_assert_eq!(cmd.contains('X'), sx != 0);
        prop_assert_eq!(cmd.contains('Y'), sy != 0);
        prop_assert_eq!(cmd.contains('Z'), sz != 0);
        prop_assert!(!cmd.contains(' '));
    }
}
