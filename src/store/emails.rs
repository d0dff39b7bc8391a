//! ClassificationStore — append-only logs of classified emails and the
//! processing cursor.
//!
//! Both tables are write-once: rows are inserted and never updated or
//! deleted. The most recent `cursor_log` row is the authoritative resume
//! point; older rows are retained as history.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::category::Category;
use crate::error::StoreError;

use super::db::Database;

/// One processed message, as stored.
#[derive(Debug, Clone)]
pub struct ClassifiedEmail {
    pub id: i64,
    pub subject: String,
    pub category: String,
    pub link: String,
    pub processed_at: DateTime<Utc>,
}

/// Durable record of classifications and processing progress.
pub struct ClassificationStore {
    db: Arc<Database>,
}

impl ClassificationStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a classification record. Returns the row id.
    pub fn record_classification(
        &self,
        subject: &str,
        category: &Category,
        link: &str,
    ) -> Result<i64, StoreError> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO emails (subject, category, link, processed_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                subject,
                category.to_string(),
                link,
                Utc::now().to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, subject, "Classification recorded");
        Ok(id)
    }

    /// Append a cursor entry marking this message id as processed.
    pub fn append_cursor(&self, message_id: &str) -> Result<(), StoreError> {
        self.db.conn().execute(
            "INSERT INTO cursor_log (message_id) VALUES (?1)",
            rusqlite::params![message_id],
        )?;
        debug!(message_id, "Cursor advanced");
        Ok(())
    }

    /// The most recently appended cursor value, if any.
    pub fn latest_cursor(&self) -> Result<Option<String>, StoreError> {
        let conn = self.db.conn();
        let mut stmt =
            conn.prepare("SELECT message_id FROM cursor_log ORDER BY id DESC LIMIT 1")?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Whether a message id already has a cursor entry.
    ///
    /// Used as a watermark guard so a stale continuation token cannot
    /// cause duplicate records.
    pub fn is_processed(&self, message_id: &str) -> Result<bool, StoreError> {
        let count: i64 = self.db.conn().query_row(
            "SELECT COUNT(*) FROM cursor_log WHERE message_id = ?1",
            rusqlite::params![message_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Most recent classifications, newest first. Read-only inspection.
    pub fn recent_classifications(
        &self,
        limit: usize,
    ) -> Result<Vec<ClassifiedEmail>, StoreError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, subject, category, link, processed_at
             FROM emails ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![limit as i64], row_to_email)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

fn row_to_email(row: &rusqlite::Row<'_>) -> Result<ClassifiedEmail, rusqlite::Error> {
    let processed_str: String = row.get(4)?;
    Ok(ClassifiedEmail {
        id: row.get(0)?,
        subject: row.get(1)?,
        category: row.get(2)?,
        link: row.get(3)?,
        processed_at: DateTime::parse_from_rfc3339(&processed_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC),
    })
}

// ── Tests ───────────────────────────────────────────────────────────
