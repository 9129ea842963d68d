use log::{info, warn};
use semver::Version;

use super::MigrationContext;
use crate::backfill::BackfillEngine;
use crate::error::BookingError;
use crate::scheduler::{ensure_daily_task, STATUS_REFRESH_HOOK};

/// Upgrade to 1.7.0
///
/// Booking statuses move from scattered legacy attributes into the dedicated
/// `booking_status` table:
///   - Creates the table (IF NOT EXISTS, safe under concurrent boots).
///   - Backfills it from legacy attributes, then refreshes the probe cache and
///     hands the new DDL fingerprint to schema verification.
///   - Ensures the daily status refresh task is scheduled.
///
/// Without a database handle the table cannot be created; the status
/// feature stays unavailable and the routine still completes.
pub fn upgrade_to_170(ctx: &MigrationContext<'_>, previous: &Version) -> Result<(), BookingError> {
    if ctx.probe.create_table_if_missing() {
        if let Some(conn) = ctx.conn {
            let report =
                BackfillEngine::new(conn, ctx.probe, ctx.versions, ctx.settings.page_size).run()?;
            info!(
                "Migration {}→1.7.0: status backfill {:?}, {} rows",
                previous, report.outcome, report.rows_written
            );
        }

        ctx.probe.table_exists(true);
        ctx.hooks.verify_schema(ctx.probe.ddl_fingerprint().as_deref());
    } else {
        warn!("booking_status table unavailable - booking statuses disabled until a later upgrade");
    }

    ensure_daily_task(
        ctx.scheduler,
        STATUS_REFRESH_HOOK,
        ctx.now.timestamp(),
        ctx.settings.refresh_hour_utc,
    )?;

    Ok(())
}
