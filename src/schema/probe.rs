use std::cell::Cell;

use log::{debug, error, warn};
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use super::booking_status::{CREATE_STATUS_TABLE_SQL, STATUS_TABLE};

/// Answers questions about the booking status table.
///
/// The existence check is a catalog query, so the answer is cached for the
/// lifetime of the probe. `table_exists(true)` re-queries and replaces the
/// cached value. A probe without a relational handle reports the table as
/// missing.
pub struct SchemaProbe<'a> {
    conn: Option<&'a Connection>,
    cached_exists: Cell<Option<bool>>,
}

impl<'a> SchemaProbe<'a> {
    pub fn new(conn: Option<&'a Connection>) -> Self {
        Self {
            conn,
            cached_exists: Cell::new(None),
        }
    }

    pub fn table_exists(&self, force_refresh: bool) -> bool {
        if !force_refresh {
            if let Some(exists) = self.cached_exists.get() {
                return exists;
            }
        }

        let exists = self.query_table_exists();
        self.cached_exists.set(Some(exists));
        exists
    }

    /// Runs the IF NOT EXISTS DDL and reports whether the table exists afterwards.
    pub fn create_table_if_missing(&self) -> bool {
        let Some(conn) = self.conn else {
            warn!("No database handle available - cannot create {STATUS_TABLE}");
            self.cached_exists.set(Some(false));
            return false;
        };

        if let Err(e) = conn.execute_batch(CREATE_STATUS_TABLE_SQL) {
            error!("Failed to create {STATUS_TABLE}: {e}");
        }

        self.table_exists(true)
    }

    /// SHA-256 of the table's stored DDL, with whitespace collapsed.
    /// `None` when the table (or the database handle) is missing.
    pub fn ddl_fingerprint(&self) -> Option<String> {
        let conn = self.conn?;
        let sql: Option<String> = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [STATUS_TABLE],
                |row| row.get(0),
            )
            .optional()
            .unwrap_or_else(|e| {
                warn!("Failed to read DDL for {STATUS_TABLE}: {e}");
                None
            });

        sql.map(|sql| {
            let normalized = sql.split_whitespace().collect::<Vec<_>>().join(" ");
            hex::encode(Sha256::digest(normalized.as_bytes()))
        })
    }

    fn query_table_exists(&self) -> bool {
        let Some(conn) = self.conn else {
            return false;
        };

        match conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [STATUS_TABLE],
            |row| row.get::<_, i64>(0),
        ) {
            Ok(count) => {
                debug!("{STATUS_TABLE} exists: {}", count > 0);
                count > 0
            }
            Err(e) => {
                warn!("Catalog query for {STATUS_TABLE} failed: {e}");
                false
            }
        }
    }
}
