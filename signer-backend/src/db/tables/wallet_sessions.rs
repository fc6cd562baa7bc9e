//! Database methods for wallet_connect_sessions

use chrono::{SecondsFormat, Utc};
use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use super::parse_rfc3339;
use crate::db::Database;
use crate::models::{SessionSignerRecord, WalletSession};

fn row_to_session(row: &Row) -> rusqlite::Result<WalletSession> {
    let created_at: String = row.get(5)?;
    Ok(WalletSession {
        topic: row.get(0)?,
        owner: row.get(1)?,
        address: row.get(2)?,
        domain: row.get(3)?,
        default_chain_id: row.get::<_, i64>(4)? as u64,
        created_at: parse_rfc3339(&created_at),
    })
}

impl Database {
    /// Insert or overwrite the signer binding for a session topic.
    /// Re-delivered approvals keep the original created_at.
    pub fn upsert_wallet_session(&self, topic: &str, record: &SessionSignerRecord) -> SqliteResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO wallet_connect_sessions
                (topic, owner, address, domain, default_chain_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(topic) DO UPDATE SET
                owner = excluded.owner,
                address = excluded.address,
                domain = excluded.domain,
                default_chain_id = excluded.default_chain_id",
            rusqlite::params![
                topic,
                record.owner,
                record.address,
                record.domain,
                record.default_chain_id as i64,
                Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;
        Ok(())
    }

    pub fn get_wallet_session(&self, topic: &str) -> SqliteResult<Option<WalletSession>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT topic, owner, address, domain, default_chain_id, created_at
             FROM wallet_connect_sessions WHERE topic = ?1",
            [topic],
            row_to_session,
        )
        .optional()
    }

    pub fn delete_wallet_session(&self, topic: &str) -> SqliteResult<bool> {
        let conn = self.conn()?;
        let affected = conn.execute("DELETE FROM wallet_connect_sessions WHERE topic = ?1", [topic])?;
        Ok(affected > 0)
    }

    /// Sessions newest first, optionally restricted to one owner
    pub fn list_wallet_sessions(&self, owner: Option<&str>) -> SqliteResult<Vec<WalletSession>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT topic, owner, address, domain, default_chain_id, created_at
             FROM wallet_connect_sessions
             WHERE (?1 IS NULL OR owner = ?1)
             ORDER BY created_at DESC, rowid DESC",
        )?;

        let sessions = stmt
            .query_map([owner], row_to_session)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(owner: &str, address: &str, chain: u64) -> SessionSignerRecord {
        SessionSignerRecord {
            owner: owner.to_string(),
            address: address.to_string(),
            domain: Some("app.example".to_string()),
            default_chain_id: chain,
        }
    }

    #[test]
    fn test_upsert_and_get() {
        let db = Database::new(":memory:").unwrap();
        db.upsert_wallet_session("session-1", &signer("0xOwner", "0xA", 1)).unwrap();

        let session = db.get_wallet_session("session-1").unwrap().expect("session");
        assert_eq!(session.owner, "0xOwner");
        assert_eq!(session.address, "0xA");
        assert_eq!(session.domain.as_deref(), Some("app.example"));
        assert_eq!(session.default_chain_id, 1);
        assert!(db.get_wallet_session("missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_approval_overwrites_but_keeps_created_at() {
        let db = Database::new(":memory:").unwrap();
        db.upsert_wallet_session("session-1", &signer("0xOwner", "0xA", 1)).unwrap();
        let first = db.get_wallet_session("session-1").unwrap().unwrap();

        let mut record = signer("0xOwner", "0xB", 137);
        record.domain = None;
        db.upsert_wallet_session("session-1", &record).unwrap();

        let second = db.get_wallet_session("session-1").unwrap().unwrap();
        assert_eq!(second.address, "0xB");
        assert_eq!(second.default_chain_id, 137);
        assert!(second.domain.is_none());
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(db.list_wallet_sessions(None).unwrap().len(), 1);
    }

    #[test]
    fn test_list_filters_by_owner() {
        let db = Database::new(":memory:").unwrap();
        db.upsert_wallet_session("s1", &signer("0xAlice", "0xA", 1)).unwrap();
        db.upsert_wallet_session("s2", &signer("0xBob", "0xB", 1)).unwrap();
        db.upsert_wallet_session("s3", &signer("0xAlice", "0xA", 10)).unwrap();

        let alice = db.list_wallet_sessions(Some("0xAlice")).unwrap();
        assert_eq!(alice.len(), 2);
        assert!(alice.iter().all(|s| s.owner == "0xAlice"));
        assert_eq!(alice[0].topic, "s3");

        assert_eq!(db.list_wallet_sessions(None).unwrap().len(), 3);
    }

    #[test]
    fn test_delete() {
        let db = Database::new(":memory:").unwrap();
        db.upsert_wallet_session("s1", &signer("0xOwner", "0xA", 1)).unwrap();

        assert!(db.delete_wallet_session("s1").unwrap());
        assert!(!db.delete_wallet_session("s1").unwrap());
        assert!(db.get_wallet_session("s1").unwrap().is_none());
    }
}
