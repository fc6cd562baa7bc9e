//! Database model modules - extends Database with domain-specific methods
//!
//! Each module adds `impl Database` blocks with methods for a specific table group.

mod pending_connections; // wallet_connect_pending_connections (pairing attempts, TTL)
mod wallet_sessions;     // wallet_connect_sessions (approved session registry)
mod session_operations;  // wallet_connect_session_operations (bounded operation ledger)

use chrono::{DateTime, TimeZone, Utc};

/// Epoch millis to a UTC timestamp
pub(crate) fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub(crate) fn parse_rfc3339(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
