//! Embedded SQL migration runner for audit databases.
//!
//! Migrations are SQL files embedded at compile time, tracked by SQLite's
//! `user_version` pragma. They run sequentially on first connection; a
//! database already at the latest version is left untouched. Steps marked
//! FROZEN in their SQL header are immutable — a change to the schema means a
//! new step, never an edit to an applied one.

use rusqlite::Connection;
use thiserror::Error;

/// A single embedded migration step.
struct Migration {
    /// The `user_version` a database reaches after this step.
    version: i64,
    sql: &'static str,
}

/// All steps in order. New steps are appended here.
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("migrations/001_requests.sql"),
}];

/// The `user_version` of a fully migrated database.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Errors that can occur during migration execution.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A SQL statement within a step failed.
    #[error("migration to version {version} failed: {source}")]
    ExecutionFailed {
        version: i64,
        source: rusqlite::Error,
    },

    /// Failed to read or update `user_version`.
    #[error("failed to query migration state: {0}")]
    StateQuery(rusqlite::Error),

    /// The database reports a version newer than this binary knows.
    #[error("database is at user_version {found}, newer than supported {supported}")]
    FromTheFuture { found: i64, supported: i64 },
}

/// Runs all pending steps against the given connection.
///
/// Returns the number of steps applied (0 for an up-to-date database).
///
/// # Errors
///
/// Returns `MigrationError` if a step fails, the version pragma cannot be
/// read or written, or the database is newer than this binary.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    let current: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(MigrationError::StateQuery)?;

    if current > latest_version() {
        return Err(MigrationError::FromTheFuture {
            found: current,
            supported: latest_version(),
        });
    }

    let mut applied = 0;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        tracing::info!(version = migration.version, "applying audit migration");

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| MigrationError::ExecutionFailed {
                version: migration.version,
                source: e,
            })?;

        tx.execute_batch(migration.sql)
            .map_err(|e| MigrationError::ExecutionFailed {
                version: migration.version,
                source: e,
            })?;

        // PRAGMA does not support bound parameters; version is a literal
        // from the embedded table above.
        tx.pragma_update(None, "user_version", migration.version)
            .map_err(|e| MigrationError::ExecutionFailed {
                version: migration.version,
                source: e,
            })?;

        tx.commit().map_err(|e| MigrationError::ExecutionFailed {
            version: migration.version,
            source: e,
        })?;

        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn run_migrations_on_fresh_db() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let applied = run_migrations(&conn).expect("migrations should succeed");
        assert_eq!(applied, 1);

        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .expect("should read user_version");
        assert_eq!(version, latest_version());
    }

    #[test]
    fn run_migrations_is_a_noop_at_latest_version() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");

        let first = run_migrations(&conn).expect("first run should succeed");
        assert_eq!(first, 1);

        let second = run_migrations(&conn).expect("second run should succeed");
        assert_eq!(second, 0, "no new steps to apply");
    }

    #[test]
    fn newer_database_is_rejected() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        conn.pragma_update(None, "user_version", 99)
            .expect("should set user_version");

        let err = run_migrations(&conn).expect_err("future version should be rejected");
        match err {
            MigrationError::FromTheFuture { found, .. } => assert_eq!(found, 99),
            other => panic!("unexpected error type: {other:?}"),
        }
    }

    #[test]
    fn base_schema_enforces_row_constraints() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        run_migrations(&conn).expect("migrations should succeed");

        // A well-formed row is accepted.
        conn.execute(
            "INSERT INTO requests (url, medium, identifier_version, identifier)
             VALUES ('https://example.com/', 'telegram', 1, '{\"user_id\": 1}')",
            [],
        )
        .expect("valid row should insert");

        // Too-short URL.
        assert!(conn
            .execute(
                "INSERT INTO requests (url, medium, identifier_version, identifier)
                 VALUES ('http:', 'telegram', 1, '{}')",
                [],
            )
            .is_err());

        // Empty medium.
        assert!(conn
            .execute(
                "INSERT INTO requests (url, medium, identifier_version, identifier)
                 VALUES ('https://example.com/', '', 1, '{}')",
                [],
            )
            .is_err());

        // Non-positive identifier version.
        assert!(conn
            .execute(
                "INSERT INTO requests (url, medium, identifier_version, identifier)
                 VALUES ('https://example.com/', 'telegram', 0, '{}')",
                [],
            )
            .is_err());

        // Identifier that is not JSON.
        assert!(conn
            .execute(
                "INSERT INTO requests (url, medium, identifier_version, identifier)
                 VALUES ('https://example.com/', 'telegram', 1, 'not json')",
                [],
            )
            .is_err());

        // Timestamp before the project epoch.
        assert!(conn
            .execute(
                "INSERT INTO requests (received_on, url, medium, identifier_version, identifier)
                 VALUES (100, 'https://example.com/', 'telegram', 1, '{}')",
                [],
            )
            .is_err());
    }
}
