//! SQLite backend
//!
//! The target is a database path. Sessions are plain autocommit connections
//! with a busy timeout, so concurrent workers contend on the database lock the
//! way independent clients would.

use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tracing::{debug, trace};

use super::{Backend, BackendError, Operation, Row, Target};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Backend that runs operations against a SQLite database file
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    busy_timeout: Duration,
}

impl Default for SqliteBackend {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

impl SqliteBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

impl Backend for SqliteBackend {
    type Connection = Connection;

    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn connect(&self, target: &Target) -> Result<Connection, BackendError> {
        let connect_err = |e: rusqlite::Error| BackendError::Connect {
            target: target.redacted(),
            message: e.to_string(),
        };

        let conn = Connection::open(target.as_str()).map_err(connect_err)?;
        conn.busy_timeout(self.busy_timeout).map_err(connect_err)?;

        if !conn.is_autocommit() {
            return Err(BackendError::Connect {
                target: target.redacted(),
                message: "connection did not start in autocommit mode".to_string(),
            });
        }

        trace!(endpoint = %target, "Opened sqlite connection");
        Ok(conn)
    }

    fn close(&self, conn: Connection) -> Result<(), BackendError> {
        conn.close().map_err(|(_, e)| BackendError::Close(e.to_string()))
    }

    fn execute(&self, conn: &mut Connection, op: &Operation) -> Result<Row, BackendError> {
        // The statement is finalized when it goes out of scope, on every path
        let mut stmt = conn.prepare(op.sql())?;
        let columns = stmt.column_count();
        let mut rows = stmt.query([])?;

        let row = match rows.next()? {
            Some(row) => row,
            None => {
                debug!(operation = %op.summary(), "Operation produced no rows");
                return Err(BackendError::NoRows);
            }
        };

        let mut values = Vec::with_capacity(columns);
        for index in 0..columns {
            values.push(render_value(row.get_ref(index)?));
        }
        Ok(values)
    }
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(text) => String::from_utf8_lossy(text).into_owned(),
        ValueRef::Blob(blob) => format!("<{} bytes>", blob.len()),
    }
}
