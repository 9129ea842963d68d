use std::fmt;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::BookingError;

/// Where an option lives. Network options are shared by every site of a
/// multi-site deployment; site options belong to one site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionScope {
    Network,
    Site(i64),
}

impl fmt::Display for OptionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionScope::Network => write!(f, "network"),
            OptionScope::Site(id) => write!(f, "site:{}", id),
        }
    }
}

/// Key-value settings storage provided by the host platform.
pub trait OptionStore {
    fn get_option(&self, scope: OptionScope, key: &str) -> Result<Option<String>, BookingError>;

    fn set_option(&self, scope: OptionScope, key: &str, value: &str) -> Result<(), BookingError>;

    fn delete_option(&self, scope: OptionScope, key: &str) -> Result<(), BookingError>;
}

/// `OptionStore` over the `options` table.
pub struct SqliteOptionStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteOptionStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl OptionStore for SqliteOptionStore<'_> {
    fn get_option(&self, scope: OptionScope, key: &str) -> Result<Option<String>, BookingError> {
        let value = self
            .conn
            .query_row(
                "SELECT option_value FROM options WHERE scope = ?1 AND option_key = ?2",
                params![scope.to_string(), key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_option(&self, scope: OptionScope, key: &str, value: &str) -> Result<(), BookingError> {
        self.conn.execute(
            "INSERT INTO options (scope, option_key, option_value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope, option_key) DO UPDATE SET option_value = excluded.option_value",
            params![scope.to_string(), key, value],
        )?;
        Ok(())
    }

    fn delete_option(&self, scope: OptionScope, key: &str) -> Result<(), BookingError> {
        self.conn.execute(
            "DELETE FROM options WHERE scope = ?1 AND option_key = ?2",
            params![scope.to_string(), key],
        )?;
        Ok(())
    }
}
