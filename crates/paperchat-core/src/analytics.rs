//! Append-only analytics sink for individual chat messages.

use chrono::{DateTime, Utc};
use log::info;
use paperchat_store::Role;
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use std::path::Path;
use thiserror::Error;

/// One analytics row: a single message as seen by the service.
#[derive(Debug, Clone)]
pub struct MessageLogRecord {
    pub client_id: String,
    pub paper_id: String,
    pub role: Role,
    pub content: String,
    /// Best-effort token estimate, not an exact count.
    pub token_count: usize,
    /// Client source address when the transport knows it.
    pub source_addr: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Errors returned by the analytics sink.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Write-only message log. Failures must never fail the chat request;
/// the service logs and continues.
pub trait MessageLog: Send + Sync {
    /// Append one message record.
    fn record(&self, record: &MessageLogRecord) -> Result<(), AnalyticsError>;
}

/// SQLite-backed message log.
pub struct SqliteMessageLog {
    conn: Mutex<Connection>,
}

impl SqliteMessageLog {
    /// Open (or create) the analytics database and ensure the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AnalyticsError> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS chat_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                paper_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                ip_address TEXT,
                timestamp TEXT NOT NULL
            )",
            [],
        )?;
        info!(
            "opened analytics message log (path={})",
            path.as_ref().display()
        );
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl MessageLog for SqliteMessageLog {
    fn record(&self, record: &MessageLogRecord) -> Result<(), AnalyticsError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO chat_messages
                (session_id, paper_id, role, content, token_count, ip_address, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.client_id,
                record.paper_id,
                record.role.as_str(),
                record.content,
                record.token_count as i64,
                record.source_addr,
                record.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

/// Discards every record; used when analytics are disabled.
pub struct NoopMessageLog;

impl MessageLog for NoopMessageLog {
    fn record(&self, _record: &MessageLogRecord) -> Result<(), AnalyticsError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{MessageLog, MessageLogRecord, SqliteMessageLog};
    use chrono::Utc;
    use paperchat_store::Role;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn sqlite_log_appends_rows() {
        let root = tempdir().expect("tempdir");
        let log = SqliteMessageLog::open(root.path().join("analytics.db")).expect("open");

        let record = MessageLogRecord {
            client_id: "c1".to_string(),
            paper_id: "paper-42".to_string(),
            role: Role::User,
            content: "What dataset did the authors use?".to_string(),
            token_count: 9,
            source_addr: Some("203.0.113.7".to_string()),
            timestamp: Utc::now(),
        };
        log.record(&record).expect("record");
        log.record(&record).expect("record");

        let conn = log.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chat_messages", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 2);
        let role: String = conn
            .query_row("SELECT role FROM chat_messages LIMIT 1", [], |row| {
                row.get(0)
            })
            .expect("role");
        assert_eq!(role, "user");
    }
}
