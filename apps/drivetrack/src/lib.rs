//! # drivetrack
//!
//! Server and CLI over `drivetrack-core`.

pub mod api;
pub mod cli;
pub mod config;

use drivetrack_core::Timestamp;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// This is the only place the clock is read; everything below takes the
/// result as an argument.
#[must_use]
pub fn now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| Timestamp::from_millis(d.as_millis() as i64))
        .unwrap_or_default()
}
