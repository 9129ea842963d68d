/// Platform tables the booking core relies on: the key-value options store,
/// the scheduled event table and the legacy booking records with their
/// scattered attribute rows.
pub const CREATE_BASE_SCHEMA_SQL: &str = r#"
BEGIN TRANSACTION;

-- Key-value settings, scoped per site or network-wide ('network')
CREATE TABLE IF NOT EXISTS options (
    scope TEXT NOT NULL,               -- 'network' or 'site:<id>'
    option_key TEXT NOT NULL,
    option_value TEXT NOT NULL,
    PRIMARY KEY (scope, option_key)
);

-- Recurring maintenance tasks, one row per hook
CREATE TABLE IF NOT EXISTS scheduled_events (
    hook TEXT PRIMARY KEY,
    next_run INTEGER NOT NULL,         -- Unix timestamp (UTC)
    interval_secs INTEGER NOT NULL
);

-- Legacy booking records
CREATE TABLE IF NOT EXISTS bookings (
    booking_id INTEGER PRIMARY KEY,
    booked_for INTEGER DEFAULT NULL,   -- Reservation time, Unix timestamp (UTC)
    party INTEGER NOT NULL DEFAULT 1,
    guest_name TEXT DEFAULT NULL,
    created_at INTEGER NOT NULL DEFAULT 0
);

-- Legacy per-record attributes (status, notes, contact details)
CREATE TABLE IF NOT EXISTS booking_meta (
    meta_id INTEGER PRIMARY KEY AUTOINCREMENT,
    booking_id INTEGER NOT NULL,
    meta_key TEXT NOT NULL,
    meta_value TEXT DEFAULT NULL
);

CREATE INDEX IF NOT EXISTS idx_booking_meta_booking_key ON booking_meta (booking_id, meta_key);

COMMIT;
"#;
