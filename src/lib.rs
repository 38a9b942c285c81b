//! # Group Season
//!
//! Season lifecycle and ranking aggregation for recurring sports groups.
//!
//! ## Architecture
//!
//! - **models**: Group document, rankings, seasons and matches
//! - **calculate**: Score formula, standings points and tie-breaks
//! - **storage**: Versioned document store and append-only match log
//! - **directory**: Player profile and team roster lookups
//! - **notify**: Notification transports
//! - **engine**: Match aggregation, season state machine, finalization and countdown
//! - **api**: REST API endpoints
//! - **config**: Configuration loading and validation

pub mod api;
pub mod calculate;
pub mod config;
pub mod directory;
pub mod engine;
pub mod models;
pub mod notify;
pub mod storage;

pub use models::*;

use std::time::Duration;

/// Parse a human-friendly duration string (e.g., "7d", "6h", "30m", "90s").
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix('d') {
        (n, 86_400)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3600)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1)
    } else {
        // Default to seconds
        (s, 1)
    };

    let num: u64 = num_str.parse().ok()?;
    Some(Duration::from_secs(num.checked_mul(multiplier)?))
}
