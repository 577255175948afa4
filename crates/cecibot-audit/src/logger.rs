//! Buffered, monthly-rotated request logger.

use chrono::{DateTime, Datelike, Utc};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::migrations::run_migrations;
use crate::MigrationError;

/// Errors that can occur while logging a request.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The base directory could not be created.
    #[error("failed to create audit directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A SQLite operation failed.
    #[error("audit database operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Migrating a freshly opened month file failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// The identifier could not be serialised to JSON text.
    #[error("failed to encode identifier: {0}")]
    Identifier(#[from] serde_json::Error),
}

/// A buffered row, timestamped at `log()` time (not at flush time).
struct PendingRow {
    received_on: i64,
    url: String,
    medium: String,
    identifier_version: u32,
    identifier: String,
}

struct OpenDb {
    /// `(year, month)` this handle writes to.
    month: (i32, u32),
    conn: Connection,
}

/// Append-only audit log of received requests.
///
/// Rows are buffered in memory and flushed in one transaction once
/// `flush_threshold` rows accumulate (threshold 1 makes every `log` call
/// synchronous). The backing file is partitioned by calendar month,
/// `requests_<YEAR>-<MONTH>.sqlite3`, opened lazily on the first flush that
/// falls inside the month. A logger is single-writer by construction: it
/// owns its connection and is not `Clone`.
pub struct RequestLogger {
    base_dir: PathBuf,
    flush_threshold: usize,
    buffer: Vec<PendingRow>,
    open: Option<OpenDb>,
}

impl RequestLogger {
    /// Creates a logger writing under `base_dir`. A `flush_threshold` of 0
    /// is treated as 1.
    pub fn new(base_dir: impl Into<PathBuf>, flush_threshold: usize) -> Self {
        Self {
            base_dir: base_dir.into(),
            flush_threshold: flush_threshold.max(1),
            buffer: Vec::new(),
            open: None,
        }
    }

    /// The conventional base directory for a component:
    /// `<HOME>/.cecibot/<component>/` (falling back to the working directory
    /// when `HOME` is unset).
    pub fn default_base_dir(component: &str) -> PathBuf {
        let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
        home.join(".cecibot").join(component)
    }

    /// Records one received request.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` when the identifier cannot be encoded or a due
    /// flush fails. Callers log the error and continue; an audit failure
    /// never aborts the request it describes.
    pub fn log(
        &mut self,
        url: &str,
        medium: &str,
        identifier_version: u32,
        identifier: &serde_json::Value,
    ) -> Result<(), AuditError> {
        self.buffer.push(PendingRow {
            received_on: Utc::now().timestamp(),
            url: url.to_string(),
            medium: medium.to_string(),
            identifier_version,
            identifier: serde_json::to_string(identifier)?,
        });

        if self.buffer.len() >= self.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes all buffered rows in one transaction.
    pub fn flush(&mut self) -> Result<(), AuditError> {
        self.flush_at(Utc::now())
    }

    fn flush_at(&mut self, now: DateTime<Utc>) -> Result<(), AuditError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        self.ensure_open(now)?;

        {
            let Some(open) = self.open.as_ref() else {
                // ensure_open either opened a handle or returned an error.
                unreachable!("flush without an open database");
            };
            let tx = open.conn.unchecked_transaction()?;
            {
                let mut insert = tx.prepare_cached(
                    "INSERT INTO requests (received_on, url, medium, identifier_version, identifier)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for row in &self.buffer {
                    insert.execute(params![
                        row.received_on,
                        row.url,
                        row.medium,
                        row.identifier_version,
                        row.identifier,
                    ])?;
                }
            }
            tx.commit()?;
        }

        self.buffer.clear();
        Ok(())
    }

    /// Opens (and migrates) the month file for `now`, rotating away from a
    /// previous month's handle if needed.
    fn ensure_open(&mut self, now: DateTime<Utc>) -> Result<(), AuditError> {
        let month = (now.year(), now.month());
        if self.open.as_ref().map(|o| o.month) == Some(month) {
            return Ok(());
        }

        std::fs::create_dir_all(&self.base_dir).map_err(|source| AuditError::CreateDir {
            path: self.base_dir.clone(),
            source,
        })?;

        let path = month_file(&self.base_dir, month);
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;

        let applied = run_migrations(&conn)?;
        if applied > 0 {
            tracing::info!(path = %path.display(), count = applied, "initialised audit database");
        }

        // Dropping the previous month's Connection closes it.
        self.open = Some(OpenDb { month, conn });
        Ok(())
    }
}

impl Drop for RequestLogger {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::error!(error = %e, "failed to flush audit log on shutdown");
        }
    }
}

fn month_file(base_dir: &Path, (year, month): (i32, u32)) -> PathBuf {
    base_dir.join(format!("requests_{year:04}-{month:02}.sqlite3"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn count_rows(path: &Path) -> i64 {
        let conn = Connection::open(path).expect("open for counting");
        conn.query_row("SELECT COUNT(*) FROM requests", [], |row| row.get(0))
            .expect("count")
    }

    #[test]
    fn threshold_one_flushes_every_row() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut logger = RequestLogger::new(dir.path(), 1);

        logger
            .log(
                "https://example.com/a",
                "telegram",
                1,
                &json!({"user_id": 1}),
            )
            .expect("log");

        let now = Utc::now();
        let path = month_file(dir.path(), (now.year(), now.month()));
        assert_eq!(count_rows(&path), 1);
    }

    #[test]
    fn higher_threshold_buffers_until_reached() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut logger = RequestLogger::new(dir.path(), 3);

        for i in 0..2 {
            logger
                .log(
                    &format!("https://example.com/{i}"),
                    "email",
                    1,
                    &json!({"address": "a@example.com"}),
                )
                .expect("log");
        }

        let now = Utc::now();
        let path = month_file(dir.path(), (now.year(), now.month()));
        assert!(!path.exists(), "nothing should be written below threshold");

        logger
            .log(
                "https://example.com/2",
                "email",
                1,
                &json!({"address": "a@example.com"}),
            )
            .expect("log");
        assert_eq!(count_rows(&path), 3);
    }

    #[test]
    fn explicit_flush_drains_the_buffer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut logger = RequestLogger::new(dir.path(), 100);

        logger
            .log("https://example.com/", "telegram", 1, &json!({"user_id": 9}))
            .expect("log");
        logger.flush().expect("flush");

        let now = Utc::now();
        let path = month_file(dir.path(), (now.year(), now.month()));
        assert_eq!(count_rows(&path), 1);

        // A second flush with an empty buffer is a no-op.
        logger.flush().expect("flush");
        assert_eq!(count_rows(&path), 1);
    }

    #[test]
    fn rotation_opens_one_file_per_month() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut logger = RequestLogger::new(dir.path(), 1);

        let july = Utc.with_ymd_and_hms(2026, 7, 31, 23, 59, 0).unwrap();
        let august = Utc.with_ymd_and_hms(2026, 8, 1, 0, 1, 0).unwrap();

        logger.buffer.push(PendingRow {
            received_on: july.timestamp(),
            url: "https://example.com/july".to_string(),
            medium: "telegram".to_string(),
            identifier_version: 1,
            identifier: "{}".to_string(),
        });
        logger.flush_at(july).expect("flush july");

        logger.buffer.push(PendingRow {
            received_on: august.timestamp(),
            url: "https://example.com/august".to_string(),
            medium: "telegram".to_string(),
            identifier_version: 1,
            identifier: "{}".to_string(),
        });
        logger.flush_at(august).expect("flush august");

        assert_eq!(count_rows(&month_file(dir.path(), (2026, 7))), 1);
        assert_eq!(count_rows(&month_file(dir.path(), (2026, 8))), 1);
    }

    #[test]
    fn reopening_an_existing_month_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");

        {
            let mut logger = RequestLogger::new(dir.path(), 1);
            logger
                .log("https://example.com/1", "email", 1, &json!({"a": 1}))
                .expect("log");
        }
        {
            let mut logger = RequestLogger::new(dir.path(), 1);
            logger
                .log("https://example.com/2", "email", 1, &json!({"a": 2}))
                .expect("log");
        }

        let now = Utc::now();
        let path = month_file(dir.path(), (now.year(), now.month()));
        assert_eq!(count_rows(&path), 2);
    }
}
