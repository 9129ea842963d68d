use chrono::Utc;
use log::{info, warn, Level};
use logging_timer::timer;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};

use crate::booking_status::BookingStatus;
use crate::error::BookingError;
use crate::schema::SchemaProbe;
use crate::version_store::VersionStore;

pub const DEFAULT_PAGE_SIZE: usize = 200;

/// Largest page a single upsert can carry (5 bound values per row) under
/// SQLite's default limit of 32766 variables.
pub const MAX_PAGE_SIZE: usize = 5000;

/// Legacy attribute key holding a booking's status.
pub const LEGACY_STATUS_META_KEY: &str = "rtb_status";

/// Last legacy booking id committed by a backfill that has not finished.
pub const BACKFILL_CURSOR_KEY: &str = "rtb_status_backfill_cursor";

/// Set to "1" once a backfill has drained every page.
pub const BACKFILL_COMPLETE_KEY: &str = "rtb_status_backfill_complete";

const SYSTEM_ACTOR: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillOutcome {
    TableMissing,
    AlreadyComplete,
    TableNotEmpty,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillReport {
    pub outcome: BackfillOutcome,
    /// Legacy rows read per non-empty page.
    pub pages: Vec<usize>,
    pub rows_written: usize,
    pub resumed_from: Option<i64>,
}

impl BackfillReport {
    fn skipped(outcome: BackfillOutcome) -> Self {
        Self {
            outcome,
            pages: Vec::new(),
            rows_written: 0,
            resumed_from: None,
        }
    }
}

struct LegacyRecord {
    booking_id: i64,
    raw_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub booking_id: i64,
    pub status: BookingStatus,
    pub note: Option<String>,
    pub updated_at: i64,
    pub updated_by: i64,
}

/// Projects legacy per-booking status attributes into `booking_status`.
///
/// Pages are read in booking id order using the last seen id as the lower
/// bound. After each page is upserted the id is stored as a cursor, so an
/// interrupted run resumes where it stopped on the next boot. The coarse
/// "table already has rows" guard only applies when no cursor exists.
pub struct BackfillEngine<'a> {
    conn: &'a Connection,
    probe: &'a SchemaProbe<'a>,
    markers: &'a VersionStore<'a>,
    page_size: usize,
}

impl<'a> BackfillEngine<'a> {
    pub fn new(
        conn: &'a Connection,
        probe: &'a SchemaProbe<'a>,
        markers: &'a VersionStore<'a>,
        page_size: usize,
    ) -> Self {
        Self {
            conn,
            probe,
            markers,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn run(&self) -> Result<BackfillReport, BookingError> {
        if !self.probe.table_exists(false) {
            warn!("booking_status table missing - skipping status backfill");
            return Ok(BackfillReport::skipped(BackfillOutcome::TableMissing));
        }

        let row_count = self.status_row_count()?;
        let complete = self.markers.get(BACKFILL_COMPLETE_KEY, "")? == "1";
        if complete && row_count > 0 {
            return Ok(BackfillReport::skipped(BackfillOutcome::AlreadyComplete));
        }

        // An empty table was recreated or restored; markers from earlier runs no longer apply
        let cursor = if row_count == 0 {
            if complete || !self.markers.get(BACKFILL_CURSOR_KEY, "")?.is_empty() {
                info!("booking_status is empty - restarting status backfill from the beginning");
                self.markers.clear(BACKFILL_COMPLETE_KEY)?;
                self.markers.clear(BACKFILL_CURSOR_KEY)?;
            }
            None
        } else {
            self.load_cursor()?
        };
        if cursor.is_none() && row_count > 0 {
            info!("booking_status already populated - skipping status backfill");
            return Ok(BackfillReport::skipped(BackfillOutcome::TableNotEmpty));
        }

        let mut report = BackfillReport {
            outcome: BackfillOutcome::Completed,
            pages: Vec::new(),
            rows_written: 0,
            resumed_from: cursor,
        };
        if let Some(id) = cursor {
            info!("Resuming status backfill after booking {}", id);
        }

        let now = Utc::now().timestamp();
        let mut last_seen = cursor.unwrap_or(i64::MIN);

        loop {
            let page = self.read_page(last_seen)?;
            let Some(last) = page.last() else {
                break;
            };
            last_seen = last.booking_id;

            let rows = project_page(&page, now);
            self.write_page(&rows)?;
            self.markers.set(BACKFILL_CURSOR_KEY, &last_seen.to_string())?;

            report.pages.push(page.len());
            report.rows_written += rows.len();
        }

        self.markers.set(BACKFILL_COMPLETE_KEY, "1")?;
        self.markers.clear(BACKFILL_CURSOR_KEY)?;

        info!(
            "Status backfill complete: {} rows in {} pages",
            report.rows_written,
            report.pages.len()
        );
        Ok(report)
    }

    fn load_cursor(&self) -> Result<Option<i64>, BookingError> {
        let raw = self.markers.get(BACKFILL_CURSOR_KEY, "")?;
        if raw.is_empty() {
            return Ok(None);
        }
        match raw.parse::<i64>() {
            Ok(id) => Ok(Some(id)),
            Err(_) => {
                warn!("Ignoring invalid backfill cursor '{}'", raw);
                Ok(None)
            }
        }
    }

    fn status_row_count(&self) -> Result<i64, BookingError> {
        let count = self
            .conn
            .query_row("SELECT count(*) FROM booking_status", [], |row| row.get(0))?;
        Ok(count)
    }

    fn read_page(&self, after_id: i64) -> Result<Vec<LegacyRecord>, BookingError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT b.booking_id,
                    (SELECT m.meta_value FROM booking_meta m
                     WHERE m.booking_id = b.booking_id AND m.meta_key = ?1
                     ORDER BY m.meta_id DESC LIMIT 1)
             FROM bookings b
             WHERE b.booking_id > ?2
             ORDER BY b.booking_id ASC
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(
            params![LEGACY_STATUS_META_KEY, after_id, self.page_size as i64],
            |row| {
                Ok(LegacyRecord {
                    booking_id: row.get(0)?,
                    raw_status: row.get(1)?,
                })
            },
        )?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(BookingError::DatabaseError)
    }

    /// One multi-row upsert per page. A conflicting booking id takes the new
    /// status, note, timestamp and actor.
    fn write_page(&self, rows: &[StatusRow]) -> Result<(), BookingError> {
        if rows.is_empty() {
            return Ok(());
        }
        let _tmr = timer!(Level::Trace; "BackfillEngine.write_page", "{}", rows.len());

        let placeholders = vec!["(?, ?, ?, ?, ?)"; rows.len()].join(", ");
        let sql = format!(
            "INSERT INTO booking_status (booking_id, status, note, updated_at, updated_by)
             VALUES {}
             ON CONFLICT(booking_id) DO UPDATE SET
                status = excluded.status,
                note = excluded.note,
                updated_at = excluded.updated_at,
                updated_by = excluded.updated_by",
            placeholders
        );

        let mut values: Vec<Value> = Vec::with_capacity(rows.len() * 5);
        for row in rows {
            values.push(Value::Integer(row.booking_id));
            values.push(Value::Text(row.status.as_str().to_owned()));
            values.push(row.note.clone().map_or(Value::Null, Value::Text));
            values.push(Value::Integer(row.updated_at));
            values.push(Value::Integer(row.updated_by));
        }

        self.conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }
}

/// Non-positive ids are dropped; missing or invalid statuses become `Confirmed`.
fn project_page(page: &[LegacyRecord], now: i64) -> Vec<StatusRow> {
    page.iter()
        .filter(|record| record.booking_id > 0)
        .map(|record| StatusRow {
            booking_id: record.booking_id,
            status: record
                .raw_status
                .as_deref()
                .map(BookingStatus::normalize_or_default)
                .unwrap_or_default(),
            note: None,
            updated_at: now,
            updated_by: SYSTEM_ACTOR,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::options::SqliteOptionStore;
    use crate::test_support::{seed_legacy_bookings, status_of, status_row_count};

    fn run_backfill(db: &Database, page_size: usize) -> Result<BackfillReport, BookingError> {
        let options = SqliteOptionStore::new(db.conn());
        let markers = VersionStore::new(&options);
        let probe = SchemaProbe::new(Some(db.conn()));
        probe.create_table_if_missing();
        BackfillEngine::new(db.conn(), &probe, &markers, page_size).run()
    }

    #[test]
    fn test_missing_table_short_circuits() {
        let db = Database::open_in_memory().unwrap();
        seed_legacy_bookings(db.conn(), 1..=3, |_| Some("pending"));

        let options = SqliteOptionStore::new(db.conn());
        let markers = VersionStore::new(&options);
        let probe = SchemaProbe::new(Some(db.conn()));
        let report = BackfillEngine::new(db.conn(), &probe, &markers, 200)
            .run()
            .unwrap();
        assert_eq!(report.outcome, BackfillOutcome::TableMissing);
    }

    #[test]
    fn test_pages_of_200() {
        let db = Database::open_in_memory().unwrap();
        seed_legacy_bookings(db.conn(), 1..=450, |_| Some("confirmed"));

        let report = run_backfill(&db, DEFAULT_PAGE_SIZE).unwrap();
        assert_eq!(report.outcome, BackfillOutcome::Completed);
        assert_eq!(report.pages, vec![200, 200, 50]);
        assert_eq!(report.rows_written, 450);
        assert_eq!(status_row_count(db.conn()), 450);
    }

    #[test]
    fn test_statuses_are_normalized() {
        let db = Database::open_in_memory().unwrap();
        seed_legacy_bookings(db.conn(), 1..=4, |id| match id {
            1 => Some("pending"),
            2 => Some("cancelled"),
            3 => None,
            _ => Some("No-Show"),
        });

        run_backfill(&db, DEFAULT_PAGE_SIZE).unwrap();
        assert_eq!(status_of(db.conn(), 1).as_deref(), Some("pending"));
        assert_eq!(status_of(db.conn(), 2).as_deref(), Some("confirmed"));
        assert_eq!(status_of(db.conn(), 3).as_deref(), Some("confirmed"));
        assert_eq!(status_of(db.conn(), 4).as_deref(), Some("no_show"));
    }

    #[test]
    fn test_latest_legacy_status_wins() {
        let db = Database::open_in_memory().unwrap();
        seed_legacy_bookings(db.conn(), 1..=1, |_| Some("pending"));
        db.conn()
            .execute(
                "INSERT INTO booking_meta (booking_id, meta_key, meta_value) VALUES (1, ?1, 'arrived')",
                [LEGACY_STATUS_META_KEY],
            )
            .unwrap();

        run_backfill(&db, DEFAULT_PAGE_SIZE).unwrap();
        assert_eq!(status_of(db.conn(), 1).as_deref(), Some("arrived"));
    }

    #[test]
    fn test_non_positive_ids_are_discarded() {
        let db = Database::open_in_memory().unwrap();
        seed_legacy_bookings(db.conn(), -2..=3, |_| Some("pending"));

        let report = run_backfill(&db, 2).unwrap();
        assert_eq!(report.pages, vec![2, 2, 2]);
        assert_eq!(report.rows_written, 3);
        assert_eq!(status_row_count(db.conn()), 3);
        assert_eq!(status_of(db.conn(), 0), None);
    }

    #[test]
    fn test_rerun_does_not_modify_existing_rows() {
        let db = Database::open_in_memory().unwrap();
        seed_legacy_bookings(db.conn(), 1..=5, |_| Some("pending"));
        run_backfill(&db, DEFAULT_PAGE_SIZE).unwrap();

        db.conn()
            .execute("UPDATE booking_status SET status = 'arrived', updated_by = 9 WHERE booking_id = 2", [])
            .unwrap();

        let report = run_backfill(&db, DEFAULT_PAGE_SIZE).unwrap();
        assert_eq!(report.outcome, BackfillOutcome::AlreadyComplete);
        assert_eq!(status_of(db.conn(), 2).as_deref(), Some("arrived"));
    }

    #[test]
    fn test_recreated_empty_table_is_backfilled_again() {
        let db = Database::open_in_memory().unwrap();
        seed_legacy_bookings(db.conn(), 1..=5, |_| Some("pending"));
        run_backfill(&db, DEFAULT_PAGE_SIZE).unwrap();

        db.conn().execute_batch("DROP TABLE booking_status;").unwrap();

        let report = run_backfill(&db, DEFAULT_PAGE_SIZE).unwrap();
        assert_eq!(report.outcome, BackfillOutcome::Completed);
        assert_eq!(report.rows_written, 5);
        assert_eq!(status_row_count(db.conn()), 5);
    }

    #[test]
    fn test_stale_cursor_on_empty_table_restarts_from_beginning() {
        let db = Database::open_in_memory().unwrap();
        seed_legacy_bookings(db.conn(), 1..=6, |_| Some("pending"));
        let options = SqliteOptionStore::new(db.conn());
        VersionStore::new(&options)
            .set(BACKFILL_CURSOR_KEY, "4")
            .unwrap();

        let report = run_backfill(&db, DEFAULT_PAGE_SIZE).unwrap();
        assert_eq!(report.resumed_from, None);
        assert_eq!(status_row_count(db.conn()), 6);
    }

    #[test]
    fn test_oversized_page_is_clamped() {
        let db = Database::open_in_memory().unwrap();
        seed_legacy_bookings(db.conn(), 1..=(MAX_PAGE_SIZE as i64 + 10), |_| None);

        let report = run_backfill(&db, 10_000).unwrap();
        assert_eq!(report.pages, vec![MAX_PAGE_SIZE, 10]);
        assert_eq!(status_row_count(db.conn()), MAX_PAGE_SIZE as i64 + 10);
    }

    #[test]
    fn test_populated_table_without_cursor_is_skipped() {
        let db = Database::open_in_memory().unwrap();
        seed_legacy_bookings(db.conn(), 1..=5, |_| Some("pending"));
        let probe = SchemaProbe::new(Some(db.conn()));
        probe.create_table_if_missing();
        db.conn()
            .execute(
                "INSERT INTO booking_status (booking_id, status, updated_at) VALUES (3, 'declined', 0)",
                [],
            )
            .unwrap();

        let report = run_backfill(&db, DEFAULT_PAGE_SIZE).unwrap();
        assert_eq!(report.outcome, BackfillOutcome::TableNotEmpty);
        assert_eq!(status_row_count(db.conn()), 1);
        assert_eq!(status_of(db.conn(), 3).as_deref(), Some("declined"));
    }

    #[test]
    fn test_interrupted_backfill_resumes_from_cursor() {
        let db = Database::open_in_memory().unwrap();
        seed_legacy_bookings(db.conn(), 1..=10, |_| Some("pending"));

        // Simulate a run killed after committing ids 1-4
        let probe = SchemaProbe::new(Some(db.conn()));
        probe.create_table_if_missing();
        db.conn()
            .execute_batch(
                "INSERT INTO booking_status (booking_id, status, updated_at)
                 VALUES (1, 'pending', 0), (2, 'pending', 0), (3, 'pending', 0), (4, 'arrived', 0);",
            )
            .unwrap();
        let options = SqliteOptionStore::new(db.conn());
        VersionStore::new(&options)
            .set(BACKFILL_CURSOR_KEY, "4")
            .unwrap();

        let report = run_backfill(&db, 4).unwrap();
        assert_eq!(report.outcome, BackfillOutcome::Completed);
        assert_eq!(report.resumed_from, Some(4));
        assert_eq!(report.pages, vec![4, 2]);
        assert_eq!(status_row_count(db.conn()), 10);
        assert_eq!(status_of(db.conn(), 4).as_deref(), Some("arrived"));

        let markers = VersionStore::new(&options);
        assert_eq!(markers.get(BACKFILL_CURSOR_KEY, "").unwrap(), "");
        assert_eq!(markers.get(BACKFILL_COMPLETE_KEY, "").unwrap(), "1");
    }

    #[test]
    fn test_page_write_failure_keeps_committed_pages() {
        let db = Database::open_in_memory().unwrap();
        seed_legacy_bookings(db.conn(), 1..=6, |_| Some("pending"));
        let probe = SchemaProbe::new(Some(db.conn()));
        probe.create_table_if_missing();
        // Reject writes for booking 5 onwards
        db.conn()
            .execute_batch(
                "CREATE TRIGGER reject_late BEFORE INSERT ON booking_status
                 WHEN NEW.booking_id >= 5 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let result = run_backfill(&db, 2);
        assert!(matches!(result, Err(BookingError::DatabaseError(_))));
        assert_eq!(status_row_count(db.conn()), 4);

        let options = SqliteOptionStore::new(db.conn());
        let markers = VersionStore::new(&options);
        assert_eq!(markers.get(BACKFILL_CURSOR_KEY, "").unwrap(), "4");
        assert_eq!(markers.get(BACKFILL_COMPLETE_KEY, "").unwrap(), "");

        db.conn().execute_batch("DROP TRIGGER reject_late;").unwrap();
        let report = run_backfill(&db, 2).unwrap();
        assert_eq!(report.outcome, BackfillOutcome::Completed);
        assert_eq!(status_row_count(db.conn()), 6);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let options = SqliteOptionStore::new(db.conn());
        let markers = VersionStore::new(&options);
        let probe = SchemaProbe::new(Some(db.conn()));
        probe.create_table_if_missing();
        let engine = BackfillEngine::new(db.conn(), &probe, &markers, 200);

        let rows: Vec<StatusRow> = (1..=3)
            .map(|id| StatusRow {
                booking_id: id,
                status: BookingStatus::Pending,
                note: None,
                updated_at: 100,
                updated_by: 0,
            })
            .collect();
        engine.write_page(&rows).unwrap();
        engine.write_page(&rows).unwrap();

        assert_eq!(status_row_count(db.conn()), 3);
        let distinct: i64 = db
            .conn()
            .query_row("SELECT count(DISTINCT booking_id) FROM booking_status", [], |row| row.get(0))
            .unwrap();
        assert_eq!(distinct, 3);
    }
}
