use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, warn};
use semver::Version;
use sha2::{Digest, Sha256};

use crate::error::BookingError;
use crate::options::{OptionScope, OptionStore};

pub const DB_VERSION_KEY: &str = "rtb_db_version";
pub const BUILD_SIGNATURE_KEY: &str = "rtb_build_signature";
pub const UPGRADED_AT_KEY: &str = "rtb_upgraded_at";

pub const DEFAULT_VERSION: &str = "0.0.0";

/// Persisted upgrade markers: installed version, build signature and the
/// time of the last completed upgrade.
///
/// Markers live in the network scope so every site of a multi-site
/// deployment agrees on whether the shared schema is current.
pub struct VersionStore<'a> {
    options: &'a dyn OptionStore,
    scope: OptionScope,
}

impl<'a> VersionStore<'a> {
    pub fn new(options: &'a dyn OptionStore) -> Self {
        Self {
            options,
            scope: OptionScope::Network,
        }
    }

    pub fn get(&self, key: &str, default: &str) -> Result<String, BookingError> {
        Ok(self
            .options
            .get_option(self.scope, key)?
            .unwrap_or_else(|| default.to_owned()))
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), BookingError> {
        self.options.set_option(self.scope, key, value)
    }

    pub fn clear(&self, key: &str) -> Result<(), BookingError> {
        self.options.delete_option(self.scope, key)
    }

    /// Installed version. Text that does not parse as semver is treated as
    /// 0.0.0 so that every migration is re-attempted.
    pub fn stored_version(&self) -> Result<Version, BookingError> {
        let raw = self.get(DB_VERSION_KEY, DEFAULT_VERSION)?;
        match Version::parse(raw.trim()) {
            Ok(version) => Ok(version),
            Err(e) => {
                warn!(
                    "Stored version '{}' is invalid ({}) - treating as {}",
                    raw, e, DEFAULT_VERSION
                );
                Ok(Version::new(0, 0, 0))
            }
        }
    }

    pub fn set_version(&self, version: &Version) -> Result<(), BookingError> {
        self.set(DB_VERSION_KEY, &version.to_string())
    }

    pub fn stored_signature(&self) -> Result<String, BookingError> {
        self.get(BUILD_SIGNATURE_KEY, "")
    }

    pub fn set_signature(&self, signature: &str) -> Result<(), BookingError> {
        self.set(BUILD_SIGNATURE_KEY, signature)
    }

    pub fn upgraded_at(&self) -> Result<Option<DateTime<Utc>>, BookingError> {
        let raw = self.get(UPGRADED_AT_KEY, "")?;
        if raw.is_empty() {
            return Ok(None);
        }
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(ts) => Ok(Some(ts.with_timezone(&Utc))),
            Err(e) => {
                warn!("Stored upgrade timestamp '{}' is invalid: {}", raw, e);
                Ok(None)
            }
        }
    }

    pub fn set_upgraded_at(&self, at: DateTime<Utc>) -> Result<(), BookingError> {
        self.set(UPGRADED_AT_KEY, &at.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

/// Fingerprint of the deployed code.
///
/// Hashes the package name, the running version and the contents of the
/// given code files. Files that cannot be read are skipped.
pub struct BuildSignature;

impl BuildSignature {
    pub fn compute(version: &Version, files: &[PathBuf]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(env!("CARGO_PKG_NAME").as_bytes());
        hasher.update(b"\0");
        hasher.update(version.to_string().as_bytes());

        for path in files {
            match Self::hash_file(path) {
                Ok(digest) => {
                    hasher.update(b"\0");
                    hasher.update(digest);
                }
                Err(e) => debug!("Skipping {} in build signature: {}", path.display(), e),
            }
        }

        hex::encode(hasher.finalize())
    }

    fn hash_file(path: &Path) -> io::Result<Vec<u8>> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut hasher = Sha256::new();
        let mut buffer = [0; 8192]; // Read in 8KB chunks

        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hasher.finalize().to_vec())
    }

    /// Signature over the running executable.
    pub fn for_running_binary(version: &Version) -> String {
        let files: Vec<PathBuf> = std::env::current_exe().into_iter().collect();
        Self::compute(version, &files)
    }
}
