//! Tests for `src/decoder.rs`.

use radarwatch::decoder::{decode_line, DecodeError, LineEvent, SensorFrame};

fn frame(angle: i32, distance: i32, motion1: bool, motion2: bool) -> LineEvent {
    LineEvent::Frame(SensorFrame {
        angle,
        distance,
        motion1,
        motion2,
    })
}

// ---------------------------------------------------------------------------
// Well-formed frames
// ---------------------------------------------------------------------------

#[test]
fn decodes_well_formed_frames_exactly() {
    let cases = [
        ("0,50,0,0.", frame(0, 50, false, false)),
        ("90,100,1,0.", frame(90, 100, true, false)),
        ("179,12,0,1.", frame(179, 12, false, true)),
        ("45,400,1,1.", frame(45, 400, true, true)),
    ];
    for (line, expected) in cases {
        assert_eq!(decode_line(line), Ok(expected), "line {line:?}");
    }
}

#[test]
fn values_pass_through_without_range_checks() {
    assert_eq!(decode_line("720,-3,0,0."), Ok(frame(720, -3, false, false)));
}

#[test]
fn nonzero_motion_values_count_as_motion() {
    assert_eq!(decode_line("10,60,2,0."), Ok(frame(10, 60, true, false)));
}

#[test]
fn surrounding_whitespace_is_ignored() {
    assert_eq!(decode_line("  30,70,0,0.\r\n"), Ok(frame(30, 70, false, false)));
    assert_eq!(decode_line("30, 70 ,0,0."), Ok(frame(30, 70, false, false)));
}

// ---------------------------------------------------------------------------
// Non-frames
// ---------------------------------------------------------------------------

#[test]
fn blank_lines_are_empty_not_errors() {
    assert_eq!(decode_line(""), Ok(LineEvent::Empty));
    assert_eq!(decode_line("   \r\n"), Ok(LineEvent::Empty));
}

#[test]
fn missing_terminator_is_rejected() {
    assert_eq!(decode_line("10,20,0,0"), Err(DecodeError::NotAFrame));
}

#[test]
fn missing_separator_is_rejected() {
    assert_eq!(decode_line("hello."), Err(DecodeError::NotAFrame));
}

#[test]
fn wrong_field_count_is_rejected() {
    assert_eq!(
        decode_line("10,20,0."),
        Err(DecodeError::FieldCount { found: 3 })
    );
    assert_eq!(
        decode_line("10,20,0,0,1."),
        Err(DecodeError::FieldCount { found: 5 })
    );
}

#[test]
fn non_integer_field_is_rejected_with_position() {
    assert_eq!(
        decode_line("10,far,0,0."),
        Err(DecodeError::InvalidField {
            index: 1,
            value: "far".to_owned()
        })
    );
    assert_eq!(
        decode_line("10,20,0,1.5."),
        Err(DecodeError::InvalidField {
            index: 3,
            value: "1.5".to_owned()
        })
    );
}

#[test]
fn float_field_is_not_an_integer() {
    assert!(matches!(
        decode_line("10.5,20,0,0."),
        Err(DecodeError::InvalidField { index: 0, .. })
    ));
}

#[test]
fn danger_banner_is_classified_separately() {
    assert_eq!(
        decode_line("DANGER! Object too close"),
        Ok(LineEvent::DangerText("DANGER! Object too close".to_owned()))
    );
}

#[test]
fn malformed_frame_with_danger_keyword_is_danger_text() {
    assert_eq!(
        decode_line("DANGER!,12."),
        Ok(LineEvent::DangerText("DANGER!,12.".to_owned()))
    );
}

#[test]
fn decoding_never_panics_on_garbage() {
    let inputs = [
        ",",
        ".",
        ",.",
        ",,,.",
        "\u{fffd}\u{fffd},.",
        "99999999999999999999,1,0,0.",
        "-,-,-,-.",
        "\0\0\0",
    ];
    for input in inputs {
        let result = decode_line(input);
        assert!(
            !matches!(result, Ok(LineEvent::Frame(_))),
            "garbage decoded as frame: {input:?}"
        );
    }
}
