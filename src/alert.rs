//! Proximity alert gating.
//!
//! A frame is alert-worthy when something is closer than
//! [`PROXIMITY_THRESHOLD_CM`] or either PIR sensor fired. Dispatch is then
//! rate-limited by a cooldown so a person standing in front of the rig does
//! not produce a message per servo step.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::decoder::SensorFrame;

/// Distance below which a frame counts as an obstruction.
pub const PROXIMITY_THRESHOLD_CM: i32 = 50;

/// Default minimum gap between two dispatched alerts.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);

/// Planar position of a detection relative to the rig.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    /// Centimeters along the 0° axis.
    pub x: f64,
    /// Centimeters along the 90° axis.
    pub y: f64,
}

/// An alert ready to hand to the notifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    /// The frame that raised the alert.
    pub frame: SensorFrame,
    /// Position derived from the frame.
    pub coordinate: Coordinate,
    /// Human-readable notification text.
    pub message: String,
    /// When the gate let the alert through.
    pub raised_at: DateTime<Utc>,
}

/// Convert a polar reading into rounded Cartesian coordinates.
pub fn polar_to_cartesian(angle_deg: i32, distance_cm: i32) -> Coordinate {
    let radians = f64::from(angle_deg).to_radians();
    let distance = f64::from(distance_cm);
    Coordinate {
        x: round2(distance * radians.cos()),
        y: round2(distance * radians.sin()),
    }
}

/// Round to two decimals, folding `-0.0` into `0.0`.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0 + 0.0
}

/// Whether the frame meets the alert condition, ignoring cooldown.
pub fn is_triggered(frame: &SensorFrame) -> bool {
    frame.distance < PROXIMITY_THRESHOLD_CM || frame.motion1 || frame.motion2
}

/// Render the operator-facing alert text.
pub fn format_alert(frame: &SensorFrame, coordinate: &Coordinate) -> String {
    format!(
        "\u{26a0}\u{fe0f} Obstruction Detected!\n\
         Angle: {angle}\u{b0}\n\
         Distance: {distance}cm\n\
         Coordinates: ({x:.2}, {y:.2})\n\
         PIR1: {pir1}, PIR2: {pir2}",
        angle = frame.angle,
        distance = frame.distance,
        x = coordinate.x,
        y = coordinate.y,
        pir1 = u8::from(frame.motion1),
        pir2 = u8::from(frame.motion2),
    )
}

/// Trigger predicate plus cooldown, with the last dispatch time as owned state.
///
/// `evaluate` reads and updates the timestamp under `&mut self`, so two
/// frames can never both observe an expired cooldown.
#[derive(Debug, Clone)]
pub struct AlertGate {
    cooldown: chrono::Duration,
    last_alert_time: Option<DateTime<Utc>>,
}

impl Default for AlertGate {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl AlertGate {
    /// Create a gate that has never alerted.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown: chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::MAX),
            last_alert_time: None,
        }
    }

    /// When the last alert was let through, if ever.
    pub fn last_alert_time(&self) -> Option<DateTime<Utc>> {
        self.last_alert_time
    }

    /// Whether the cooldown has elapsed at `now`.
    pub fn cooldown_elapsed(&self, now: DateTime<Utc>) -> bool {
        match self.last_alert_time {
            None => true,
            Some(last) => now.signed_duration_since(last) > self.cooldown,
        }
    }

    /// Decide whether `frame` produces an alert at `now`.
    ///
    /// Returns `None` when the frame is not alert-worthy or the cooldown is
    /// still running. On `Some`, the cooldown restarts at `now`.
    pub fn evaluate(&mut self, frame: &SensorFrame, now: DateTime<Utc>) -> Option<Alert> {
        if !is_triggered(frame) {
            return None;
        }
        if !self.cooldown_elapsed(now) {
            debug!(angle = frame.angle, distance = frame.distance, "alert in cooldown, skipping");
            return None;
        }

        let coordinate = polar_to_cartesian(frame.angle, frame.distance);
        let message = format_alert(frame, &coordinate);
        self.last_alert_time = Some(now);

        Some(Alert {
            frame: *frame,
            coordinate,
            message,
            raised_at: now,
        })
    }
}
