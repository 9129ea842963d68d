//! Fixtures shared by the unit tests.

use std::cell::RefCell;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use semver::Version;

use crate::backfill::LEGACY_STATUS_META_KEY;
use crate::database::Database;
use crate::hooks::UpgradeHooks;
use crate::options::SqliteOptionStore;
use crate::scheduler::SqliteScheduler;
use crate::schema::SchemaProbe;
use crate::upgrade::{
    Collaborators, MigrationContext, MigrationRegistry, UpgradeManager, UpgradeSettings,
};
use crate::version_store::VersionStore;

/// Inserts one legacy booking per id, with an optional legacy status attribute.
pub fn seed_legacy_bookings<I, F>(conn: &Connection, ids: I, status_for: F)
where
    I: IntoIterator<Item = i64>,
    F: Fn(i64) -> Option<&'static str>,
{
    for id in ids {
        conn.execute(
            "INSERT INTO bookings (booking_id, party, created_at) VALUES (?1, 2, 0)",
            [id],
        )
        .unwrap();
        if let Some(status) = status_for(id) {
            conn.execute(
                "INSERT INTO booking_meta (booking_id, meta_key, meta_value) VALUES (?1, ?2, ?3)",
                params![id, LEGACY_STATUS_META_KEY, status],
            )
            .unwrap();
        }
    }
}

pub fn status_of(conn: &Connection, booking_id: i64) -> Option<String> {
    conn.query_row(
        "SELECT status FROM booking_status WHERE booking_id = ?1",
        [booking_id],
        |row| row.get(0),
    )
    .optional()
    .unwrap()
}

pub fn status_row_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT count(*) FROM booking_status", [], |row| row.get(0))
        .unwrap()
}

/// Records every hook call; reports both caches as flushed.
#[derive(Default)]
pub struct RecordingHooks {
    events: RefCell<Vec<String>>,
}

impl RecordingHooks {
    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    fn push(&self, event: String) {
        self.events.borrow_mut().push(event);
    }
}

impl UpgradeHooks for RecordingHooks {
    fn before_upgrade(&self, previous: &Version, current: &Version) {
        self.push(format!("before:{}->{}", previous, current));
    }

    fn after_upgrade(&self, previous: &Version, current: &Version) {
        self.push(format!("after:{}->{}", previous, current));
    }

    fn flush_object_cache(&self) -> bool {
        self.push("flush_object_cache".to_owned());
        true
    }

    fn flush_opcode_cache(&self) -> bool {
        self.push("flush_opcode_cache".to_owned());
        true
    }

    fn verify_schema(&self, fingerprint: Option<&str>) {
        let seen = if fingerprint.is_some() { "some" } else { "none" };
        self.push(format!("verify_schema:{}", seen));
    }
}

/// SQLite-backed collaborators over one database.
pub struct Harness<'a> {
    conn: &'a Connection,
    options: SqliteOptionStore<'a>,
    scheduler: SqliteScheduler<'a>,
    pub hooks: RecordingHooks,
    settings: UpgradeSettings,
}

impl<'a> Harness<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            conn: db.conn(),
            options: SqliteOptionStore::new(db.conn()),
            scheduler: SqliteScheduler::new(db.conn()),
            hooks: RecordingHooks::default(),
            settings: UpgradeSettings::default(),
        }
    }

    pub fn conn(&self) -> &'a Connection {
        self.conn
    }

    pub fn options(&self) -> &SqliteOptionStore<'a> {
        &self.options
    }

    pub fn scheduler(&self) -> &SqliteScheduler<'a> {
        &self.scheduler
    }

    pub fn with_context<R>(&self, f: impl FnOnce(&MigrationContext<'_>) -> R) -> R {
        self.run_in_context(Some(self.conn), f)
    }

    /// Context without a relational handle.
    pub fn with_detached_context<R>(&self, f: impl FnOnce(&MigrationContext<'_>) -> R) -> R {
        self.run_in_context(None, f)
    }

    pub fn manager(
        &self,
        registry: MigrationRegistry,
        current: &str,
        signature: &str,
    ) -> UpgradeManager<'_> {
        self.build_manager(Some(self.conn), registry, current, signature)
    }

    pub fn detached_manager(
        &self,
        registry: MigrationRegistry,
        current: &str,
        signature: &str,
    ) -> UpgradeManager<'_> {
        self.build_manager(None, registry, current, signature)
    }

    fn run_in_context<R>(
        &self,
        conn: Option<&Connection>,
        f: impl FnOnce(&MigrationContext<'_>) -> R,
    ) -> R {
        let versions = VersionStore::new(&self.options);
        let probe = SchemaProbe::new(conn);
        let ctx = MigrationContext {
            conn,
            options: &self.options,
            versions: &versions,
            probe: &probe,
            scheduler: &self.scheduler,
            hooks: &self.hooks,
            settings: &self.settings,
            now: Utc::now(),
        };
        f(&ctx)
    }

    fn build_manager(
        &self,
        conn: Option<&'a Connection>,
        registry: MigrationRegistry,
        current: &str,
        signature: &str,
    ) -> UpgradeManager<'_> {
        UpgradeManager::new(
            Collaborators {
                conn,
                options: &self.options,
                scheduler: &self.scheduler,
                hooks: &self.hooks,
            },
            registry,
            Version::parse(current).unwrap(),
            signature.to_owned(),
            self.settings,
        )
    }
}
