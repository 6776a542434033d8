//! Radarwatch: serial radar bridge.
//!
//! Reads sweep frames from an Arduino-style scanning rig over serial,
//! forwards every frame to a local visualizer over TCP, and pushes
//! rate-limited proximity alerts to Telegram recipients.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Proximity alert gating and message formatting.
pub mod alert;
/// Configuration loading and validation.
pub mod config;
/// Sweep line decoding.
pub mod decoder;
/// Downstream frame forwarding.
pub mod forwarder;
/// The ingest loop and its lifecycle.
pub mod ingest;
/// Structured logging setup.
pub mod logging;
/// Telegram notifications and recipient registry.
pub mod notify;
/// Upstream line sources.
pub mod source;
/// Persisted key-value store.
pub mod store;
