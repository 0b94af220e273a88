//! Common helper functions for Sidelink.

use std::str::FromStr;

/// Parse an environment variable, ignoring (and logging) malformed values.
pub fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("ignoring malformed {}={:?}", name, raw);
            None
        }
    }
}
