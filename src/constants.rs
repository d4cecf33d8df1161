// Constants used in the project. These are "convention over configuration" for now.

pub const DATABASE_DIR: &str = "./data/db";
pub const DATABASE_FILE: &str = "tables.sqlite";

/// Columns that the engine adds in front of the user columns of every table,
/// in this exact order.
pub const GENERATED_COLUMNS: &[&str] = &[ID_COLUMN, CREATED_AT_COLUMN, UPDATED_AT_COLUMN];
pub const ID_COLUMN: &str = "id";
pub const CREATED_AT_COLUMN: &str = "created_at";
pub const UPDATED_AT_COLUMN: &str = "updated_at";

/// Number of records returned by a record listing when the request has no `limit`.
pub const DEFAULT_RECORD_LIMIT: i64 = 500;

/// Suffix of the temporary table used while SQLite tables are being rebuilt.
pub const REBUILD_TABLE_SUFFIX: &str = "__tablepod_rebuild";
