//! Database methods for wallet_connect_session_operations
//!
//! The ledger is idempotent on (topic, request_id) and bounded: every append
//! trims the table to the newest MAX_OPERATION_RECORDS rows globally and per
//! topic, inside the same transaction as the write.

use chrono::{SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Result as SqliteResult, Row};
use serde_json::Value;
use std::str::FromStr;

use crate::db::Database;
use crate::models::{OperationRecord, OperationStatus, SessionOperation, MAX_OPERATION_RECORDS};

fn json_column(row: &Row, idx: usize) -> rusqlite::Result<Value> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_operation(row: &Row) -> rusqlite::Result<SessionOperation> {
    let status: String = row.get(6)?;
    let status = OperationStatus::from_str(&status)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    let result = match row.get::<_, Option<String>>(8)? {
        Some(_) => Some(json_column(row, 8)?),
        None => None,
    };

    Ok(SessionOperation {
        id: row.get(0)?,
        request_id: row.get(1)?,
        topic: row.get(2)?,
        method: row.get(3)?,
        chain_id: row.get(4)?,
        params: json_column(row, 5)?,
        status,
        timestamp: row.get(7)?,
        result,
        error: row.get(9)?,
    })
}

impl Database {
    /// Upsert a ledger entry and enforce both retention caps atomically.
    /// Returns the ledger id of the entry.
    pub fn append_session_operation(&self, record: &OperationRecord) -> SqliteResult<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let result = record.result.as_ref().map(|v| v.to_string());

        tx.execute(
            "INSERT INTO wallet_connect_session_operations
                (request_id, topic, method, chain_id, params, status, timestamp_ms, result, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(topic, request_id) DO UPDATE SET
                method = excluded.method,
                chain_id = excluded.chain_id,
                params = excluded.params,
                status = excluded.status,
                timestamp_ms = excluded.timestamp_ms,
                result = excluded.result,
                error = excluded.error",
            rusqlite::params![
                record.request_id,
                record.topic,
                record.method,
                record.chain_id,
                record.params.to_string(),
                record.status.as_ref(),
                record.timestamp,
                result,
                record.error,
                Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;

        let id: i64 = tx.query_row(
            "SELECT id FROM wallet_connect_session_operations WHERE topic = ?1 AND request_id = ?2",
            rusqlite::params![record.topic, record.request_id],
            |row| row.get(0),
        )?;

        let cap = MAX_OPERATION_RECORDS as i64;

        let trimmed_global = tx.execute(
            "DELETE FROM wallet_connect_session_operations
             WHERE id IN (
                SELECT id FROM wallet_connect_session_operations
                ORDER BY id DESC LIMIT -1 OFFSET ?1
             )",
            [cap],
        )?;

        let trimmed_topic = tx.execute(
            "DELETE FROM wallet_connect_session_operations
             WHERE id IN (
                SELECT id FROM wallet_connect_session_operations
                WHERE topic = ?1
                ORDER BY id DESC LIMIT -1 OFFSET ?2
             )",
            rusqlite::params![record.topic, cap],
        )?;

        tx.commit()?;

        if trimmed_global + trimmed_topic > 0 {
            log::debug!(
                "[walletconnect] Ledger trimmed {} global / {} topic rows",
                trimmed_global,
                trimmed_topic
            );
        }

        Ok(id)
    }

    /// Ledger entries newest first, capped at MAX_OPERATION_RECORDS.
    /// The owner filter joins through the session registry.
    pub fn list_session_operations(
        &self,
        owner: Option<&str>,
        topic: Option<&str>,
    ) -> SqliteResult<Vec<SessionOperation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT o.id, o.request_id, o.topic, o.method, o.chain_id, o.params,
                    o.status, o.timestamp_ms, o.result, o.error
             FROM wallet_connect_session_operations o
             LEFT JOIN wallet_connect_sessions s ON s.topic = o.topic
             WHERE (?1 IS NULL OR s.owner = ?1)
               AND (?2 IS NULL OR o.topic = ?2)
             ORDER BY o.id DESC
             LIMIT ?3",
        )?;

        let operations = stmt
            .query_map(
                rusqlite::params![owner, topic, MAX_OPERATION_RECORDS as i64],
                row_to_operation,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(operations)
    }

    /// Row count, optionally for one topic
    pub fn count_session_operations(&self, topic: Option<&str>) -> SqliteResult<i64> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM wallet_connect_session_operations WHERE (?1 IS NULL OR topic = ?1)",
            [topic],
            |row| row.get(0),
        )
    }
}
