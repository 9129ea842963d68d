use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::BookingError;

/// Hook name of the daily booking status refresh.
pub const STATUS_REFRESH_HOOK: &str = "rtb_status_refresh";

pub const DAY_SECONDS: i64 = 86400;

/// Scheduled-task facility provided by the host platform.
pub trait Scheduler {
    /// Next run time (Unix timestamp, UTC) of the task, if one is scheduled.
    fn next_scheduled(&self, hook: &str) -> Result<Option<i64>, BookingError>;

    fn schedule_recurring(
        &self,
        hook: &str,
        first_run: i64,
        interval_secs: i64,
    ) -> Result<(), BookingError>;
}

/// `Scheduler` over the `scheduled_events` table. One row per hook.
pub struct SqliteScheduler<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteScheduler<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl Scheduler for SqliteScheduler<'_> {
    fn next_scheduled(&self, hook: &str) -> Result<Option<i64>, BookingError> {
        let next_run = self
            .conn
            .query_row(
                "SELECT next_run FROM scheduled_events WHERE hook = ?1",
                [hook],
                |row| row.get(0),
            )
            .optional()?;
        Ok(next_run)
    }

    fn schedule_recurring(
        &self,
        hook: &str,
        first_run: i64,
        interval_secs: i64,
    ) -> Result<(), BookingError> {
        self.conn.execute(
            "INSERT INTO scheduled_events (hook, next_run, interval_secs) VALUES (?1, ?2, ?3)
             ON CONFLICT(hook) DO UPDATE SET
                next_run = excluded.next_run,
                interval_secs = excluded.interval_secs",
            params![hook, first_run, interval_secs],
        )?;
        Ok(())
    }
}

/// Next occurrence of `hour_utc`:00 strictly after `from_time`.
/// Returns None for an hour outside 0-23 or an unrepresentable timestamp.
pub fn next_daily_slot(from_time: i64, hour_utc: u32) -> Option<i64> {
    let from = DateTime::<Utc>::from_timestamp(from_time, 0)?;
    let today_at_hour = from.date_naive().and_hms_opt(hour_utc, 0, 0)?.and_utc();

    let next_occurrence = if today_at_hour.timestamp() > from_time {
        today_at_hour
    } else {
        today_at_hour + Duration::days(1)
    };

    Some(next_occurrence.timestamp())
}

/// Schedules `hook` daily unless a future run already exists.
///
/// The first run lands on the next `hour_utc` slot, or 24 hours from `now`
/// when no slot can be computed. Returns true if a task was scheduled.
pub fn ensure_daily_task(
    scheduler: &dyn Scheduler,
    hook: &str,
    now: i64,
    hour_utc: u32,
) -> Result<bool, BookingError> {
    if let Some(next_run) = scheduler.next_scheduled(hook)? {
        if next_run > now {
            debug!("{} already scheduled for {}", hook, next_run);
            return Ok(false);
        }
        warn!("{} is overdue (next run {}) - rescheduling", hook, next_run);
    }

    let first_run = next_daily_slot(now, hour_utc).unwrap_or_else(|| {
        warn!(
            "Cannot compute {:02}:00 UTC slot for {} - scheduling 24 hours from now",
            hour_utc, hook
        );
        now + DAY_SECONDS
    });

    scheduler.schedule_recurring(hook, first_run, DAY_SECONDS)?;
    info!("Scheduled {} daily, first run at {}", hook, first_run);
    Ok(true)
}
