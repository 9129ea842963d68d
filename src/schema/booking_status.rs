/// Name of the dedicated booking status table.
pub const STATUS_TABLE: &str = "booking_status";

/// Idempotent DDL for the booking status table. Safe to run from parallel
/// processes: every statement is IF NOT EXISTS.
///
/// The CHECK list must stay in sync with `BookingStatus`.
pub const CREATE_STATUS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS booking_status (
    booking_id INTEGER PRIMARY KEY CHECK (booking_id > 0),
    status TEXT NOT NULL DEFAULT 'confirmed'
        CHECK (status IN ('pending', 'confirmed', 'arrived', 'completed', 'no_show', 'declined')),
    note TEXT DEFAULT NULL,
    updated_at INTEGER NOT NULL,       -- Unix timestamp (UTC)
    updated_by INTEGER NOT NULL DEFAULT 0  -- Actor id, 0 = system
);

CREATE INDEX IF NOT EXISTS idx_booking_status_status ON booking_status (status);
"#;
