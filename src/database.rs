use std::fs;
use std::path::Path;

use log::info;
use rusqlite::Connection;

use crate::error::BookingError;
use crate::schema::CREATE_BASE_SCHEMA_SQL;

pub const DB_FILENAME: &str = "tablebook.db";

/// Owns the SQLite connection shared by the options store, the scheduler and
/// the booking tables.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self, BookingError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path).map_err(BookingError::DatabaseError)?;
        info!("Database opened at: {}", db_path.display());

        let db = Self { conn };
        db.ensure_base_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, BookingError> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.ensure_base_schema()?;
        Ok(db)
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn ensure_base_schema(&self) -> Result<(), BookingError> {
        self.conn.execute_batch(CREATE_BASE_SCHEMA_SQL)?;
        Ok(())
    }
}
