use std::path::PathBuf;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use log::info;

use crate::config::Config;
use crate::database::Database;
use crate::error::BookingError;
use crate::hooks::LoggingHooks;
use crate::options::SqliteOptionStore;
use crate::scheduler::{Scheduler, SqliteScheduler, STATUS_REFRESH_HOOK};
use crate::upgrade::{current_version, Collaborators, MigrationRegistry, UpgradeManager};
use crate::version_store::BuildSignature;

#[derive(Parser)]
#[command(
    name = "tablebook",
    version,
    about = "Tablebook: restaurant booking core and schema upgrader"
)]
pub struct Cli {
    /// Database file (default: from config, else the project data directory)
    #[arg(long = "db", short = 'd', global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run pending upgrades (default if no command specified)
    Upgrade,
    /// Show stored upgrade markers and the status table state
    Status,
}

impl Cli {
    pub fn handle_command_line(
        project_dirs: &ProjectDirs,
        config: &Config,
    ) -> Result<(), BookingError> {
        let args = Cli::parse();
        let db_path = args
            .db
            .clone()
            .unwrap_or_else(|| config.database_path(project_dirs));
        let db = Database::open(&db_path)?;

        match args.command.unwrap_or(Command::Upgrade) {
            Command::Upgrade => Self::upgrade(&db, config),
            Command::Status => Self::status(&db, config),
        }
    }

    fn upgrade(db: &Database, config: &Config) -> Result<(), BookingError> {
        let options = SqliteOptionStore::new(db.conn());
        let scheduler = SqliteScheduler::new(db.conn());
        let manager = Self::build_manager(db, &options, &scheduler, config)?;

        let outcome = manager.run_pending_upgrades()?;
        info!("{}", outcome);
        println!("{}", outcome);
        Ok(())
    }

    fn status(db: &Database, config: &Config) -> Result<(), BookingError> {
        let options = SqliteOptionStore::new(db.conn());
        let scheduler = SqliteScheduler::new(db.conn());
        let manager = Self::build_manager(db, &options, &scheduler, config)?;
        let versions = manager.versions();

        println!("Running version:  {}", manager.current_version());
        println!("Stored version:   {}", versions.stored_version()?);
        println!("Build signature:  {}", or_none(versions.stored_signature()?));
        match versions.upgraded_at()? {
            Some(at) => println!("Upgraded at:      {}", at.to_rfc3339()),
            None => println!("Upgraded at:      (never)"),
        }
        match manager.probe().ddl_fingerprint() {
            Some(fp) => println!("Status table:     present ({})", fp),
            None => println!("Status table:     missing"),
        }
        match scheduler.next_scheduled(STATUS_REFRESH_HOOK)? {
            Some(next) => println!("Status refresh:   next run at {}", next),
            None => println!("Status refresh:   not scheduled"),
        }
        Ok(())
    }

    fn build_manager<'a>(
        db: &'a Database,
        options: &'a SqliteOptionStore<'a>,
        scheduler: &'a SqliteScheduler<'a>,
        config: &Config,
    ) -> Result<UpgradeManager<'a>, BookingError> {
        let version = current_version()?;
        let signature = BuildSignature::for_running_binary(&version);

        Ok(UpgradeManager::new(
            Collaborators {
                conn: Some(db.conn()),
                options,
                scheduler,
                hooks: &LoggingHooks,
            },
            MigrationRegistry::standard()?,
            version,
            signature,
            config.upgrade.settings(),
        ))
    }
}

fn or_none(value: String) -> String {
    if value.is_empty() {
        "(none)".to_owned()
    } else {
        value
    }
}
