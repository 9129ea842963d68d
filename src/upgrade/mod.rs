mod registry;
pub mod v1_4_0;
pub mod v1_6_0;
pub mod v1_7_0;

use std::cell::Cell;
use std::fmt;

use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::Connection;
use semver::Version;

use crate::backfill::DEFAULT_PAGE_SIZE;
use crate::error::BookingError;
use crate::hooks::UpgradeHooks;
use crate::options::{OptionScope, OptionStore};
use crate::scheduler::Scheduler;
use crate::schema::SchemaProbe;
use crate::version_store::VersionStore;

pub use registry::{Migration, MigrationFn, MigrationRegistry};

/// Site option caching configuration derived from the stored settings.
/// Dropped on every completed upgrade.
pub const DERIVED_CONFIG_KEY: &str = "rtb_derived_config";

pub const DEFAULT_REFRESH_HOUR_UTC: u32 = 6;

/// Version of the running code.
pub fn current_version() -> Result<Version, BookingError> {
    Ok(Version::parse(env!("CARGO_PKG_VERSION"))?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeSettings {
    pub page_size: usize,
    pub refresh_hour_utc: u32,
    pub site_scope: OptionScope,
}

impl Default for UpgradeSettings {
    fn default() -> Self {
        UpgradeSettings {
            page_size: DEFAULT_PAGE_SIZE,
            refresh_hour_utc: DEFAULT_REFRESH_HOUR_UTC,
            site_scope: OptionScope::Site(1),
        }
    }
}

/// Everything a migration routine may touch.
pub struct MigrationContext<'a> {
    pub conn: Option<&'a Connection>,
    pub options: &'a dyn OptionStore,
    pub versions: &'a VersionStore<'a>,
    pub probe: &'a SchemaProbe<'a>,
    pub scheduler: &'a dyn Scheduler,
    pub hooks: &'a dyn UpgradeHooks,
    pub settings: &'a UpgradeSettings,
    pub now: DateTime<Utc>,
}

/// Host collaborators the manager is composed from at boot.
pub struct Collaborators<'a> {
    pub conn: Option<&'a Connection>,
    pub options: &'a dyn OptionStore,
    pub scheduler: &'a dyn Scheduler,
    pub hooks: &'a dyn UpgradeHooks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    Idle,
    Checking,
    RunningMigrations,
    Finalizing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// This manager already ran during the current process.
    AlreadyRan,
    UpToDate { signature_refreshed: bool },
    Upgraded {
        from: Version,
        to: Version,
        applied: Vec<Version>,
    },
}

impl fmt::Display for UpgradeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpgradeOutcome::AlreadyRan => write!(f, "Upgrade check already ran"),
            UpgradeOutcome::UpToDate {
                signature_refreshed: true,
            } => write!(f, "Schema up to date (build signature refreshed)"),
            UpgradeOutcome::UpToDate {
                signature_refreshed: false,
            } => write!(f, "Schema up to date"),
            UpgradeOutcome::Upgraded { from, to, applied } => write!(
                f,
                "Upgraded {} -> {} ({} migrations applied)",
                from,
                to,
                applied.len()
            ),
        }
    }
}

/// Brings stored schema and data up to the running version.
///
/// One manager is built per process at boot. `run_pending_upgrades` does its
/// work on the first call only. There is no cross-process lock: concurrent
/// boots may both run the due migrations, so every routine must be
/// idempotent.
pub struct UpgradeManager<'a> {
    conn: Option<&'a Connection>,
    options: &'a dyn OptionStore,
    scheduler: &'a dyn Scheduler,
    hooks: &'a dyn UpgradeHooks,
    versions: VersionStore<'a>,
    probe: SchemaProbe<'a>,
    registry: MigrationRegistry,
    settings: UpgradeSettings,
    current_version: Version,
    build_signature: String,
    state: Cell<UpgradeState>,
    has_run: Cell<bool>,
}

impl<'a> UpgradeManager<'a> {
    pub fn new(
        collaborators: Collaborators<'a>,
        registry: MigrationRegistry,
        current_version: Version,
        build_signature: String,
        settings: UpgradeSettings,
    ) -> Self {
        Self {
            conn: collaborators.conn,
            options: collaborators.options,
            scheduler: collaborators.scheduler,
            hooks: collaborators.hooks,
            versions: VersionStore::new(collaborators.options),
            probe: SchemaProbe::new(collaborators.conn),
            registry,
            settings,
            current_version,
            build_signature,
            state: Cell::new(UpgradeState::Idle),
            has_run: Cell::new(false),
        }
    }

    pub fn state(&self) -> UpgradeState {
        self.state.get()
    }

    pub fn current_version(&self) -> &Version {
        &self.current_version
    }

    /// Probe shared with code that needs to know whether booking statuses
    /// are available.
    pub fn probe(&self) -> &SchemaProbe<'a> {
        &self.probe
    }

    pub fn versions(&self) -> &VersionStore<'a> {
        &self.versions
    }

    /// Boot-time entry point. A failing migration aborts the run and its
    /// error is returned; the stored version is left untouched so the next
    /// boot retries.
    pub fn run_pending_upgrades(&self) -> Result<UpgradeOutcome, BookingError> {
        if self.has_run.replace(true) {
            debug!("Upgrade check already ran in this process");
            return Ok(UpgradeOutcome::AlreadyRan);
        }

        self.state.set(UpgradeState::Checking);
        let result = self.check_and_upgrade();
        self.state.set(UpgradeState::Idle);
        result
    }

    fn check_and_upgrade(&self) -> Result<UpgradeOutcome, BookingError> {
        let stored = self.versions.stored_version()?;
        let current = &self.current_version;

        if stored >= *current {
            let signature_refreshed = self.refresh_signature()?;
            return Ok(UpgradeOutcome::UpToDate {
                signature_refreshed,
            });
        }

        info!("Stored version {} is behind {} - upgrading", stored, current);
        self.hooks.before_upgrade(&stored, current);

        self.state.set(UpgradeState::RunningMigrations);
        let ctx = MigrationContext {
            conn: self.conn,
            options: self.options,
            versions: &self.versions,
            probe: &self.probe,
            scheduler: self.scheduler,
            hooks: self.hooks,
            settings: &self.settings,
            now: Utc::now(),
        };

        let mut applied = Vec::new();
        for migration in self.registry.due(&stored, current) {
            info!("Running migration {} ({})", migration.name, migration.target);
            (migration.routine)(&ctx, &stored)?;
            applied.push(migration.target.clone());
        }

        self.state.set(UpgradeState::Finalizing);
        self.finalize(&stored)?;

        Ok(UpgradeOutcome::Upgraded {
            from: stored,
            to: current.clone(),
            applied,
        })
    }

    fn finalize(&self, previous: &Version) -> Result<(), BookingError> {
        self.options
            .delete_option(self.settings.site_scope, DERIVED_CONFIG_KEY)?;

        if !self.hooks.flush_object_cache() {
            debug!("No object cache to flush");
        }
        if !self.hooks.flush_opcode_cache() {
            debug!("No opcode cache to flush");
        }

        self.versions.set_version(&self.current_version)?;
        self.versions.set_signature(&self.build_signature)?;
        self.versions.set_upgraded_at(Utc::now())?;

        self.hooks.after_upgrade(previous, &self.current_version);
        info!("Upgrade to {} complete", self.current_version);
        Ok(())
    }

    /// Stores the running build signature if it drifted. Returns true if updated.
    fn refresh_signature(&self) -> Result<bool, BookingError> {
        if self.versions.stored_signature()? == self.build_signature {
            return Ok(false);
        }
        info!("Build signature changed without a version bump - refreshing");
        self.versions.set_signature(&self.build_signature)?;
        Ok(true)
    }
}
