//! Sweep line decoding.
//!
//! The rig prints one line per servo step:
//!
//! ```text
//! <angle>,<distance>,<motion1>,<motion2>.
//! ```
//!
//! ASCII decimal integers, exactly four fields, terminated by a literal `.`
//! before the newline. The firmware also prints free-form `DANGER!` banners
//! which are surfaced as [`LineEvent::DangerText`] but carry no frame.
//!
//! Decoding is deliberately lenient about values: angles outside `[0, 360)`
//! and negative distances pass through untouched.

use std::fmt;

/// Character that terminates every frame line.
pub const FRAME_TERMINATOR: char = '.';

/// Separator between frame fields.
pub const FIELD_SEPARATOR: char = ',';

/// Number of fields in a frame line.
pub const FIELD_COUNT: usize = 4;

/// Keyword the firmware prints when its own proximity check trips.
pub const DANGER_KEYWORD: &str = "DANGER!";

/// One decoded sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorFrame {
    /// Servo angle in degrees, as reported.
    pub angle: i32,
    /// Ultrasonic distance in centimeters, as reported.
    pub distance: i32,
    /// First PIR motion sensor.
    pub motion1: bool,
    /// Second PIR motion sensor.
    pub motion2: bool,
}

impl fmt::Display for SensorFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.angle,
            self.distance,
            u8::from(self.motion1),
            u8::from(self.motion2)
        )
    }
}

/// Outcome of successfully classifying a raw line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A well-formed frame.
    Frame(SensorFrame),
    /// Blank line; nothing to do.
    Empty,
    /// A `DANGER!` banner that is not a frame. Logged only.
    DangerText(String),
}

/// Why a line could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The line has no field separator or no terminator.
    #[error("not a frame line")]
    NotAFrame,

    /// The line had the frame shape but the wrong number of fields.
    #[error("expected {FIELD_COUNT} fields, found {found}")]
    FieldCount {
        /// Number of fields present.
        found: usize,
    },

    /// A field was not a decimal integer.
    #[error("field {index} is not an integer: {value:?}")]
    InvalidField {
        /// Zero-based field position.
        index: usize,
        /// The offending text.
        value: String,
    },
}

/// Classify one raw line from the device.
///
/// Never panics. Blank lines decode to [`LineEvent::Empty`]; a line that
/// fails frame decoding but contains [`DANGER_KEYWORD`] decodes to
/// [`LineEvent::DangerText`].
///
/// # Errors
///
/// Returns a [`DecodeError`] describing the first deviation from the frame
/// format.
pub fn decode_line(raw: &str) -> Result<LineEvent, DecodeError> {
    let line = raw.trim();
    if line.is_empty() {
        return Ok(LineEvent::Empty);
    }

    match decode_frame(line) {
        Ok(frame) => Ok(LineEvent::Frame(frame)),
        Err(_) if line.contains(DANGER_KEYWORD) => Ok(LineEvent::DangerText(line.to_owned())),
        Err(e) => Err(e),
    }
}

/// Decode a trimmed, non-empty line as a frame.
fn decode_frame(line: &str) -> Result<SensorFrame, DecodeError> {
    let body = match line.strip_suffix(FRAME_TERMINATOR) {
        Some(body) if line.contains(FIELD_SEPARATOR) => body,
        _ => return Err(DecodeError::NotAFrame),
    };

    let fields: Vec<&str> = body.split(FIELD_SEPARATOR).collect();
    if fields.len() != FIELD_COUNT {
        return Err(DecodeError::FieldCount {
            found: fields.len(),
        });
    }

    let mut values = [0_i32; FIELD_COUNT];
    for (index, (slot, field)) in values.iter_mut().zip(&fields).enumerate() {
        let field = field.trim();
        *slot = field.parse().map_err(|_| DecodeError::InvalidField {
            index,
            value: field.to_owned(),
        })?;
    }

    let [angle, distance, motion1, motion2] = values;
    Ok(SensorFrame {
        angle,
        distance,
        motion1: motion1 != 0,
        motion2: motion2 != 0,
    })
}
