use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::backfill::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::database::DB_FILENAME;
use crate::options::OptionScope;
use crate::upgrade::{UpgradeSettings, DEFAULT_REFRESH_HOUR_UTC};

pub const CONFIG_FILENAME: &str = "config.toml";
pub const ENV_PREFIX: &str = "TABLEBOOK_";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub tablebook: String,
}

impl LoggingConfig {
    const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    const TABLEBOOK_LEVEL: &str = "info";

    fn default() -> Self {
        LoggingConfig {
            tablebook: Self::TABLEBOOK_LEVEL.to_string(),
        }
    }

    fn ensure_valid(&mut self) {
        let str_original = self.tablebook.clone();
        self.tablebook = self.tablebook.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&self.tablebook.as_str()) {
            eprintln!(
                "Config error: tablebook log level of '{}' is invalid - using default of '{}'",
                str_original,
                Self::TABLEBOOK_LEVEL
            );
            self.tablebook = Self::TABLEBOOK_LEVEL.to_owned();
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct DatabaseConfig {
    /// Explicit database file. Defaults to the project data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UpgradeConfig {
    pub page_size: usize,
    pub refresh_hour_utc: u32,
    pub site_id: i64,
}

impl UpgradeConfig {
    fn default() -> Self {
        UpgradeConfig {
            page_size: DEFAULT_PAGE_SIZE,
            refresh_hour_utc: DEFAULT_REFRESH_HOUR_UTC,
            site_id: 1,
        }
    }

    fn ensure_valid(&mut self) {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            eprintln!(
                "Config error: page_size of {} is invalid - using default of {}",
                self.page_size, DEFAULT_PAGE_SIZE
            );
            self.page_size = DEFAULT_PAGE_SIZE;
        }

        if self.refresh_hour_utc > 23 {
            eprintln!(
                "Config error: refresh_hour_utc of {} is invalid - using default of {}",
                self.refresh_hour_utc, DEFAULT_REFRESH_HOUR_UTC
            );
            self.refresh_hour_utc = DEFAULT_REFRESH_HOUR_UTC;
        }

        if self.site_id < 1 {
            eprintln!(
                "Config error: site_id of {} is invalid - using default of 1",
                self.site_id
            );
            self.site_id = 1;
        }
    }

    pub fn settings(&self) -> UpgradeSettings {
        UpgradeSettings {
            page_size: self.page_size,
            refresh_hour_utc: self.refresh_hour_utc,
            site_scope: OptionScope::Site(self.site_id),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub logging: LoggingConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub upgrade: UpgradeConfig,
}

impl Config {
    pub fn default_config() -> Self {
        Config {
            logging: LoggingConfig::default(),
            database: DatabaseConfig::default(),
            upgrade: UpgradeConfig::default(),
        }
    }

    /// Loads the configuration from a TOML file located in the app's data directory.
    /// Writes the default config to disk if no file exists.
    pub fn load_config(project_dirs: &ProjectDirs) -> Self {
        Self::load_from(&project_dirs.data_local_dir().join(CONFIG_FILENAME))
    }

    /// Defaults, then the TOML file, then `TABLEBOOK_*` environment variables
    /// (`TABLEBOOK_UPGRADE__PAGE_SIZE=500`). If the result fails to parse,
    /// defaults are used.
    pub fn load_from(config_path: &Path) -> Self {
        let default_config = Self::default_config();

        if !config_path.exists() {
            Self::write_default(config_path, &default_config);
        }

        let figment = Figment::from(Serialized::defaults(default_config.clone()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config = figment.extract().unwrap_or_else(|err| {
            eprintln!(
                "Could not load config file {}: {}. Using default configuration.",
                config_path.display(),
                err
            );
            default_config
        });

        config.ensure_valid();

        config
    }

    pub fn database_path(&self, project_dirs: &ProjectDirs) -> PathBuf {
        match &self.database.path {
            Some(path) => PathBuf::from(path),
            None => project_dirs.data_local_dir().join(DB_FILENAME),
        }
    }

    fn write_default(config_path: &Path, default_config: &Config) {
        if let Some(parent) = config_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!(
                    "Failed to create configuration directory {}: {}",
                    parent.display(),
                    e
                );
            }
        }
        match toml::to_string_pretty(default_config) {
            Ok(toml_string) => {
                if let Err(e) = fs::write(config_path, toml_string) {
                    eprintln!(
                        "Failed to write default config to {}: {}",
                        config_path.display(),
                        e
                    );
                }
            }
            Err(_) => eprintln!("Failed to serialize default config."),
        }
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
        self.upgrade.ensure_valid();
    }
}
