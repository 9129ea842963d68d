use std::collections::BTreeSet;

use chrono::NaiveDate;
use log::{info, warn};
use semver::Version;

use super::MigrationContext;
use crate::error::BookingError;

/// Site option listing the days the restaurant is closed.
pub const SCHEDULE_CLOSED_KEY: &str = "rtb_schedule_closed";

/// Upgrade to 1.4.0
///
/// Closed calendar days used to be stored as a comma (or newline) separated
/// list of `YYYY-MM-DD` dates. From 1.4.0 they are a sorted JSON array of
/// unique ISO dates. Entries that are not valid dates are dropped. A value
/// that is already a JSON array is left alone, which makes the routine safe
/// to re-run.
pub fn upgrade_to_140(ctx: &MigrationContext<'_>, _previous: &Version) -> Result<(), BookingError> {
    let scope = ctx.settings.site_scope;
    let Some(raw) = ctx.options.get_option(scope, SCHEDULE_CLOSED_KEY)? else {
        return Ok(());
    };

    let trimmed = raw.trim();
    if trimmed.starts_with('[') && serde_json::from_str::<Vec<String>>(trimmed).is_ok() {
        return Ok(());
    }

    let mut days = BTreeSet::new();
    for entry in trimmed.split([',', '\n']).map(str::trim).filter(|e| !e.is_empty()) {
        match NaiveDate::parse_from_str(entry, "%Y-%m-%d") {
            Ok(day) => {
                days.insert(day);
            }
            Err(_) => warn!("Dropping invalid closed day '{}'", entry),
        }
    }

    let days: Vec<String> = days.iter().map(|d| d.format("%Y-%m-%d").to_string()).collect();
    ctx.options
        .set_option(scope, SCHEDULE_CLOSED_KEY, &serde_json::to_string(&days)?)?;
    info!("Converted {} closed days to the 1.4.0 format", days.len());
    Ok(())
}
