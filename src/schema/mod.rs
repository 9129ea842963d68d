mod base;
mod booking_status;
mod probe;

pub use base::CREATE_BASE_SCHEMA_SQL;
pub use booking_status::{CREATE_STATUS_TABLE_SQL, STATUS_TABLE};
pub use probe::SchemaProbe;
