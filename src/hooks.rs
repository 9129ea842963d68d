use log::{debug, info};
use semver::Version;

/// Lifecycle and cache collaborators notified by the upgrade manager.
///
/// Every method has a no-op default; cache flushes return false when the
/// host has no such cache.
pub trait UpgradeHooks {
    fn before_upgrade(&self, _previous: &Version, _current: &Version) {}

    fn after_upgrade(&self, _previous: &Version, _current: &Version) {}

    fn flush_object_cache(&self) -> bool {
        false
    }

    fn flush_opcode_cache(&self) -> bool {
        false
    }

    /// Called after the status table is (re)created, with its DDL fingerprint.
    fn verify_schema(&self, _fingerprint: Option<&str>) {}
}

pub struct NoopHooks;

impl UpgradeHooks for NoopHooks {}

/// Writes each lifecycle event to the log.
pub struct LoggingHooks;

impl UpgradeHooks for LoggingHooks {
    fn before_upgrade(&self, previous: &Version, current: &Version) {
        info!("Booking schema upgrade starting: {} -> {}", previous, current);
    }

    fn after_upgrade(&self, previous: &Version, current: &Version) {
        info!("Booking schema upgrade finished: {} -> {}", previous, current);
    }

    fn verify_schema(&self, fingerprint: Option<&str>) {
        match fingerprint {
            Some(fp) => debug!("booking_status DDL fingerprint: {}", fp),
            None => debug!("booking_status DDL fingerprint unavailable"),
        }
    }
}
