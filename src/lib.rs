pub mod backfill;
pub mod booking_status;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod hooks;
pub mod options;
pub mod scheduler;
pub mod schema;
pub mod upgrade;
pub mod version_store;

#[cfg(test)]
mod test_support;
