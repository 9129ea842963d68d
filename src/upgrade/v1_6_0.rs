use log::{info, warn};
use semver::Version;
use serde::{Deserialize, Serialize};

use super::MigrationContext;
use crate::error::BookingError;

/// Site option holding booking capacity limits.
pub const CAPACITY_KEY: &str = "rtb_capacity";

/// Capacity limits. Zero means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacitySettings {
    pub max_people: u32,
    pub max_bookings: u32,
    pub party_size_min: u32,
    pub party_size_max: u32,
}

impl Default for CapacitySettings {
    fn default() -> Self {
        CapacitySettings {
            max_people: 0,
            max_bookings: 0,
            party_size_min: 1,
            party_size_max: 12,
        }
    }
}

/// Upgrade to 1.6.0
///
/// Capacity tracking arrives in 1.6.0. Seeds the default limits for sites
/// that have none; existing settings are never overwritten.
pub fn upgrade_to_160(ctx: &MigrationContext<'_>, _previous: &Version) -> Result<(), BookingError> {
    let scope = ctx.settings.site_scope;
    if let Some(existing) = ctx.options.get_option(scope, CAPACITY_KEY)? {
        if serde_json::from_str::<CapacitySettings>(&existing).is_err() {
            warn!("Existing capacity settings are unreadable - leaving them in place");
        }
        return Ok(());
    }

    let defaults = serde_json::to_string(&CapacitySettings::default())?;
    ctx.options.set_option(scope, CAPACITY_KEY, &defaults)?;
    info!("Seeded default capacity settings for {}", scope);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::options::{OptionScope, OptionStore};
    use crate::test_support::Harness;

    #[test]
    fn test_seeds_defaults_once() {
        let db = Database::open_in_memory().unwrap();
        let harness = Harness::new(&db);
        harness.with_context(|ctx| upgrade_to_160(ctx, &Version::new(1, 4, 0)).unwrap());

        let raw = harness
            .options()
            .get_option(OptionScope::Site(1), CAPACITY_KEY)
            .unwrap()
            .unwrap();
        let settings: CapacitySettings = serde_json::from_str(&raw).unwrap();
        assert_eq!(settings, CapacitySettings::default());
    }

    #[test]
    fn test_existing_settings_kept() {
        let db = Database::open_in_memory().unwrap();
        let harness = Harness::new(&db);
        let custom = r#"{"max_people":40,"max_bookings":10,"party_size_min":2,"party_size_max":8}"#;
        harness
            .options()
            .set_option(OptionScope::Site(1), CAPACITY_KEY, custom)
            .unwrap();

        harness.with_context(|ctx| upgrade_to_160(ctx, &Version::new(1, 4, 0)).unwrap());
        assert_eq!(
            harness
                .options()
                .get_option(OptionScope::Site(1), CAPACITY_KEY)
                .unwrap()
                .as_deref(),
            Some(custom)
        );
    }
}
