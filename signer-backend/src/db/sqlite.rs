use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Result as SqliteResult;
use std::path::Path;
use std::time::Duration;

pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Max pooled connections for on-disk databases
const POOL_MAX_SIZE: u32 = 8;

/// How long a writer waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open (or create) the database. `":memory:"` gives a private in-memory
    /// database backed by a single pooled connection.
    pub fn new(database_url: &str) -> SqliteResult<Self> {
        let in_memory = database_url == ":memory:";

        let manager = if in_memory {
            SqliteConnectionManager::memory()
        } else {
            // Create parent directory if it doesn't exist
            if let Some(parent) = Path::new(database_url).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).ok();
                }
            }
            SqliteConnectionManager::file(database_url)
        };

        let manager = manager.with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        });

        let pool = Pool::builder()
            .max_size(if in_memory { 1 } else { POOL_MAX_SIZE })
            .build(manager)
            .map_err(pool_error)?;

        let db = Self { pool };
        db.init()?;
        Ok(db)
    }

    /// Check a connection out of the pool
    pub fn conn(&self) -> SqliteResult<DbConn> {
        self.pool.get().map_err(pool_error)
    }

    fn init(&self) -> SqliteResult<()> {
        let conn = self.conn()?;

        if let Err(e) = conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(())) {
            log::debug!("WAL journal mode unavailable: {}", e);
        }

        // In-flight pairing attempts, keyed by pairing topic
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS wallet_connect_pending_connections (
                pairing_topic TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                default_chain_id INTEGER NOT NULL,
                expires_at_ms INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS wallet_connect_pending_connections_expires_at_idx
                ON wallet_connect_pending_connections (expires_at_ms);",
        )?;

        // Approved sessions, keyed by session topic
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS wallet_connect_sessions (
                topic TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                address TEXT NOT NULL,
                domain TEXT,
                default_chain_id INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS wallet_connect_sessions_owner_idx
                ON wallet_connect_sessions (owner);",
        )?;

        // Operation ledger. AUTOINCREMENT keeps ids monotonic across trims.
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS wallet_connect_session_operations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id INTEGER NOT NULL,
                topic TEXT NOT NULL,
                method TEXT NOT NULL,
                chain_id TEXT NOT NULL,
                params TEXT NOT NULL,
                status TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                result TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                UNIQUE(topic, request_id)
            );
            CREATE INDEX IF NOT EXISTS wallet_connect_session_operations_topic_id_idx
                ON wallet_connect_session_operations (topic, id);",
        )?;

        Ok(())
    }
}

/// Pool failures surface as SQLite errors so table code keeps one error type
fn pool_error(e: r2d2::Error) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(e))
}
