use semver::Version;

use super::{v1_4_0, v1_6_0, v1_7_0, MigrationContext};
use crate::error::BookingError;

/// Migration routine. Receives the version that was installed before this
/// upgrade run started.
pub type MigrationFn = fn(&MigrationContext<'_>, &Version) -> Result<(), BookingError>;

pub struct Migration {
    pub target: Version,
    pub name: &'static str,
    pub routine: MigrationFn,
}

/// Migrations ordered by target version, ascending.
#[derive(Default)]
pub struct MigrationRegistry {
    entries: Vec<Migration>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every migration shipped with this release.
    pub fn standard() -> Result<Self, BookingError> {
        let mut registry = Self::new();
        registry.register("1.4.0", "upgrade_to_140", v1_4_0::upgrade_to_140)?;
        registry.register("1.6.0", "upgrade_to_160", v1_6_0::upgrade_to_160)?;
        registry.register("1.7.0", "upgrade_to_170", v1_7_0::upgrade_to_170)?;
        Ok(registry)
    }

    pub fn register(
        &mut self,
        target: &str,
        name: &'static str,
        routine: MigrationFn,
    ) -> Result<(), BookingError> {
        let target = Version::parse(target)?;
        if self.entries.iter().any(|m| m.target == target) {
            return Err(BookingError::Error(format!(
                "Migration for {} is already registered",
                target
            )));
        }

        let pos = self.entries.partition_point(|m| m.target < target);
        self.entries.insert(
            pos,
            Migration {
                target,
                name,
                routine,
            },
        );
        Ok(())
    }

    pub fn ordered_entries(&self) -> &[Migration] {
        &self.entries
    }

    /// Migrations with `stored < target <= current`, in order.
    pub fn due<'r>(
        &'r self,
        stored: &'r Version,
        current: &'r Version,
    ) -> impl Iterator<Item = &'r Migration> + 'r {
        self.entries
            .iter()
            .filter(move |m| *stored < m.target && m.target <= *current)
    }
}
