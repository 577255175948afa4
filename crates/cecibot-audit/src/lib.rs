//! Audit log for the cecibot platform.
//!
//! Every request a frontend admits is mirrored into an append-only SQLite
//! file, one file per calendar month, so operators can answer "who asked for
//! what, when" without touching the live queues. The schema is versioned
//! through the `user_version` pragma; applied steps are frozen.
//!
//! The log is advisory: a failure to record a request is reported to the
//! caller (who logs it and moves on) and never blocks the request itself.

mod logger;
mod migrations;

pub use logger::{AuditError, RequestLogger};
pub use migrations::{latest_version, run_migrations, MigrationError};
