//! Database methods for wallet_connect_pending_connections
//!
//! Rows live for PENDING_TTL_SECONDS. There is no background sweeper: every
//! lookup first deletes all expired rows, so a stale attempt never blocks a
//! fresh pairing for the same topic.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{OptionalExtension, Result as SqliteResult};

use super::{millis_to_datetime, parse_rfc3339};
use crate::db::Database;
use crate::models::{PendingConnection, PendingConnectionRecord, PENDING_TTL_SECONDS};

impl Database {
    /// Upsert a pending connection with its expiry refreshed to now + TTL.
    pub fn set_pending_connection(
        &self,
        pairing_topic: &str,
        record: &PendingConnectionRecord,
    ) -> SqliteResult<()> {
        self.set_pending_connection_at(pairing_topic, record, Utc::now())
    }

    pub(crate) fn set_pending_connection_at(
        &self,
        pairing_topic: &str,
        record: &PendingConnectionRecord,
        now: DateTime<Utc>,
    ) -> SqliteResult<()> {
        let conn = self.conn()?;
        let expires_at = now + Duration::seconds(PENDING_TTL_SECONDS);

        conn.execute(
            "INSERT INTO wallet_connect_pending_connections
                (pairing_topic, owner, default_chain_id, expires_at_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(pairing_topic) DO UPDATE SET
                owner = excluded.owner,
                default_chain_id = excluded.default_chain_id,
                expires_at_ms = excluded.expires_at_ms",
            rusqlite::params![
                pairing_topic,
                record.owner,
                record.default_chain_id as i64,
                expires_at.timestamp_millis(),
                now.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;
        Ok(())
    }

    /// Sweep expired rows, then return the unexpired row for the topic.
    pub fn get_pending_connection(&self, pairing_topic: &str) -> SqliteResult<Option<PendingConnection>> {
        self.get_pending_connection_at(pairing_topic, Utc::now())
    }

    pub(crate) fn get_pending_connection_at(
        &self,
        pairing_topic: &str,
        now: DateTime<Utc>,
    ) -> SqliteResult<Option<PendingConnection>> {
        let conn = self.conn()?;
        let now_ms = now.timestamp_millis();

        let swept = conn.execute(
            "DELETE FROM wallet_connect_pending_connections WHERE expires_at_ms <= ?1",
            [now_ms],
        )?;
        if swept > 0 {
            log::debug!("[walletconnect] Swept {} expired pending connections", swept);
        }

        conn.query_row(
            "SELECT pairing_topic, owner, default_chain_id, expires_at_ms, created_at
             FROM wallet_connect_pending_connections
             WHERE pairing_topic = ?1 AND expires_at_ms > ?2",
            rusqlite::params![pairing_topic, now_ms],
            |row| {
                let created_at: String = row.get(4)?;
                Ok(PendingConnection {
                    pairing_topic: row.get(0)?,
                    owner: row.get(1)?,
                    default_chain_id: row.get::<_, i64>(2)? as u64,
                    expires_at: millis_to_datetime(row.get(3)?),
                    created_at: parse_rfc3339(&created_at),
                })
            },
        )
        .optional()
    }

    /// Unconditionally remove the pending row for a topic.
    pub fn delete_pending_connection(&self, pairing_topic: &str) -> SqliteResult<bool> {
        let conn = self.conn()?;
        let affected = conn.execute(
            "DELETE FROM wallet_connect_pending_connections WHERE pairing_topic = ?1",
            [pairing_topic],
        )?;
        Ok(affected > 0)
    }

    /// Raw row count, including rows that have expired but not been swept.
    pub fn count_pending_connections(&self) -> SqliteResult<i64> {
        let conn = self.conn()?;
        conn.query_row("SELECT COUNT(*) FROM wallet_connect_pending_connections", [], |row| row.get(0))
    }
}
