use crate::api_model::ReferentialAction;
use crate::constants::REBUILD_TABLE_SUFFIX;
use crate::database_ddl::quote_identifier;
use crate::database_ddl::ColumnChange;
use crate::database_ddl::CreateTable;
use crate::database_ddl::DdlStatement;
use crate::database_ddl_parse::parse_create_table;
use crate::database_model::ColumnReference;
use crate::database_model::ColumnSnapshot;
use crate::database_model::TableSnapshot;
use crate::error::Error;
use crate::error::ErrorContext;
use crate::error::ErrorKind;
use crate::error::Result;
use crate::relational_backend::RelationalBackend;
use log::debug;
use log::error;
use log::info;
use r2d2::ManageConnection;
use r2d2::Pool;
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::ffi;
use rusqlite::params;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OptionalExtension;
use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

pub type SqlitePool = Pool<ForeignKeysManager>;
pub type SqliteConnection = PooledConnection<ForeignKeysManager>;

/// Connection manager that only hands out connections enforcing foreign keys.
/// A connection that lost enforcement (a table rebuild that could not switch it
/// back on) fails the check-out test and is replaced by a fresh one.
pub struct ForeignKeysManager(SqliteConnectionManager);

impl ManageConnection for ForeignKeysManager {
    type Connection = Connection;
    type Error = rusqlite::Error;

    fn connect(&self) -> std::result::Result<Connection, rusqlite::Error> {
        self.0.connect()
    }

    fn is_valid(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        if foreign_keys_enabled(conn)? {
            Ok(())
        } else {
            Err(rusqlite::Error::SqliteFailure(
                ffi::Error::new(ffi::SQLITE_MISUSE),
                Some("foreign key enforcement is off".to_string()),
            ))
        }
    }

    fn has_broken(&self, conn: &mut Connection) -> bool {
        self.0.has_broken(conn)
    }
}

fn foreign_keys_enabled(conn: &Connection) -> rusqlite::Result<bool> {
    conn.query_row("PRAGMA foreign_keys;", params![], |row| row.get(0))
}

/// SQLite database behind an r2d2 connection pool.
///
/// Cloning is cheap, all clones share the same pool.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

fn with_pragmas(manager: SqliteConnectionManager) -> ForeignKeysManager {
    ForeignKeysManager(manager.with_init(|c| {
        c.busy_timeout(Duration::from_secs(5))?;
        c.execute_batch("PRAGMA foreign_keys = ON;")
    }))
}

impl SqliteBackend {
    pub fn open_file(path: &Path, pool_size: u32) -> Result<SqliteBackend> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|err| Error {
                kind: ErrorKind::BackendUnavailable,
                msg: format!("Failed to create database directory {:?}, {}", dir, err),
            })?;
        }
        info!("Opening SQLite database {:?} with {} connections", path, pool_size);
        let manager = with_pragmas(SqliteConnectionManager::file(path));
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .context(|| format!("Failed to open database {:?}", path))?;
        Ok(SqliteBackend { pool })
    }

    /// Private in-memory database. The pool holds exactly one connection
    /// that lives as long as the pool, so the data does too.
    pub fn open_in_memory() -> Result<SqliteBackend> {
        let manager = with_pragmas(SqliteConnectionManager::memory());
        let pool = Pool::builder()
            .max_size(1)
            .max_lifetime(None)
            .idle_timeout(None)
            .build(manager)?;
        Ok(SqliteBackend { pool })
    }

    pub fn connection(&self) -> Result<SqliteConnection> {
        self.pool.get().map_err(|e| e.into())
    }
}

impl RelationalBackend for SqliteBackend {
    fn execute_ddl(&self, statement: &DdlStatement) -> Result<()> {
        let mut conn = self.connection()?;
        match statement {
            DdlStatement::AlterColumn {
                table,
                column,
                change,
            } => alter_column(&mut conn, table, column, change),
            other => {
                let sql = other.to_sql();
                debug!("Executing DDL: {}", sql);
                conn.execute_batch(&sql)
                    .map_err(|err| statement_failed(&sql, err))
            }
        }
    }

    fn introspect(&self) -> Result<Vec<TableSnapshot>> {
        let conn = self.connection()?;
        introspect_tables(&conn)
    }
}

fn statement_failed(sql: &str, err: rusqlite::Error) -> Error {
    rejected_statement(ErrorKind::SchemaMutationFailed, sql, err)
}

/// Wrap an error of an executed statement. Problems with the database itself
/// (I/O, locking, corruption) stay `BackendUnavailable`,
/// everything else is reported with the given kind.
pub fn rejected_statement(rejected: ErrorKind, sql: &str, err: rusqlite::Error) -> Error {
    let code = match &err {
        rusqlite::Error::SqliteFailure(failure, _) => Some(failure.code),
        _ => None,
    };
    let kind = match code {
        Some(ErrorCode::SystemIoFailure)
        | Some(ErrorCode::CannotOpen)
        | Some(ErrorCode::DatabaseBusy)
        | Some(ErrorCode::DatabaseLocked)
        | Some(ErrorCode::DatabaseCorrupt)
        | Some(ErrorCode::NotADatabase)
        | Some(ErrorCode::OutOfMemory)
        | Some(ErrorCode::DiskFull) => ErrorKind::BackendUnavailable,
        _ => rejected,
    };
    Error {
        kind,
        msg: format!("Database rejected `{}`: {}", sql, err),
    }
}

pub fn introspect_tables(conn: &Connection) -> Result<Vec<TableSnapshot>> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT name, sql FROM sqlite_master \
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
            ORDER BY name;",
        )
        .context_str("Failed to prepare SQL table listing")?;
    let mut rows = stmt.query(params![])?;
    let mut tables: Vec<(String, Option<String>)> = Vec::new();
    while let Some(row) = rows.next()? {
        tables.push((row.get(0)?, row.get(1)?));
    }
    let mut result = Vec::with_capacity(tables.len());
    for (name, sql) in tables {
        let columns = table_columns(conn, &name, sql.as_deref().unwrap_or(""))?;
        result.push(TableSnapshot { name, columns });
    }
    Ok(result)
}

fn table_columns(conn: &Connection, table: &str, sql: &str) -> Result<Vec<ColumnSnapshot>> {
    let mut references = foreign_keys(conn, table)?;
    let unique = unique_columns(conn, table)?;
    let has_autoincrement = sql.to_uppercase().contains("AUTOINCREMENT");

    let mut stmt = conn.prepare_cached(
        "SELECT name, type, \"notnull\", dflt_value, pk \
        FROM pragma_table_info(?) ORDER BY cid;",
    )?;
    let mut rows = stmt.query(params![table])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        let name: String = row.get(0)?;
        let data_type: String = row.get(1)?;
        let not_null: bool = row.get(2)?;
        let default_value: Option<String> = row.get(3)?;
        let primary_key: i64 = row.get(4)?;
        let is_primary_key = primary_key > 0;
        columns.push(ColumnSnapshot {
            is_nullable: !not_null && !is_primary_key,
            is_primary_key,
            is_auto_incrementing: is_primary_key
                && has_autoincrement
                && data_type.eq_ignore_ascii_case("INTEGER"),
            has_default_value: default_value.is_some(),
            default_value,
            is_unique: unique.contains(&name),
            references: references.remove(&name),
            data_type,
            name,
        });
    }
    Ok(columns)
}

fn foreign_keys(conn: &Connection, table: &str) -> Result<HashMap<String, ColumnReference>> {
    let mut stmt = conn.prepare_cached(
        "SELECT \"from\", \"table\", \"to\", on_update, on_delete \
        FROM pragma_foreign_key_list(?) ORDER BY id, seq;",
    )?;
    let mut rows = stmt.query(params![table])?;
    let mut result = HashMap::new();
    while let Some(row) = rows.next()? {
        let from: String = row.get(0)?;
        let target_table: String = row.get(1)?;
        let target_column: Option<String> = row.get(2)?;
        let on_update: String = row.get(3)?;
        let on_delete: String = row.get(4)?;
        result.insert(
            from,
            ColumnReference {
                table: target_table,
                column: target_column.unwrap_or_default(),
                on_delete: ReferentialAction::from_sql(&on_delete),
                on_update: ReferentialAction::from_sql(&on_update),
            },
        );
    }
    Ok(result)
}

/// Columns covered by a single-column UNIQUE constraint
fn unique_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT name FROM pragma_index_list(?) WHERE \"unique\" = 1 AND origin = 'u';",
    )?;
    let mut rows = stmt.query(params![table])?;
    let mut indexes: Vec<String> = Vec::new();
    while let Some(row) = rows.next()? {
        indexes.push(row.get(0)?);
    }
    let mut result = HashSet::new();
    let mut stmt = conn.prepare_cached("SELECT name FROM pragma_index_info(?);")?;
    for index in indexes {
        let mut rows = stmt.query(params![index])?;
        let mut columns: Vec<String> = Vec::new();
        while let Some(row) = rows.next()? {
            columns.push(row.get(0)?);
        }
        if columns.len() == 1 {
            result.extend(columns);
        }
    }
    Ok(result)
}

/// SQLite has no ALTER COLUMN. Change the stored table definition
/// and rebuild the table from it, see https://www.sqlite.org/lang_altertable.html#otheralter
fn alter_column(conn: &mut Connection, table: &str, column: &str, change: &ColumnChange) -> Result<()> {
    let sql: Option<String> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?;",
            params![table],
            |row| row.get(0),
        )
        .optional()?;
    let sql = sql.ok_or_else(|| Error {
        kind: ErrorKind::SchemaMutationFailed,
        msg: format!("Cannot alter column {}, no such table: {}", column, table),
    })?;
    let mut definition = parse_create_table(&sql).map_err(|reason| Error {
        kind: ErrorKind::SchemaMutationFailed,
        msg: format!(
            "Cannot alter column {} of table {}, its definition is not supported: {}",
            column, table, reason
        ),
    })?;
    let target = definition.column_mut(column).ok_or_else(|| Error {
        kind: ErrorKind::SchemaMutationFailed,
        msg: format!("No such column: {}.{}", table, column),
    })?;
    match change {
        ColumnChange::SetDataType(data_type) => target.data_type = *data_type,
        ColumnChange::DropNotNull => target.not_null = false,
        ColumnChange::SetNotNull => target.not_null = true,
        ColumnChange::SetDefault(default) => target.default = Some(default.clone()),
    }
    rebuild_table(conn, &definition)
}

fn rebuild_table(conn: &mut Connection, definition: &CreateTable) -> Result<()> {
    let check_keys = foreign_keys_enabled(conn)?;
    // Has no effect inside a transaction, so it is switched before starting one.
    conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
    let result = rebuild_table_tx(conn, definition, check_keys);
    if check_keys {
        // The rebuild outcome is reported first. A connection left without enforcement
        // is discarded by the pool on its next check-out.
        if let Err(err) = conn.execute_batch("PRAGMA foreign_keys = ON;") {
            error!("Failed to re-enable foreign keys after rebuilding {}: {}", definition.name, err);
            return result.and(Err(err.into()));
        }
    }
    result
}

fn rebuild_table_tx(conn: &mut Connection, definition: &CreateTable, check_keys: bool) -> Result<()> {
    let temporary = format!("{}{}", definition.name, REBUILD_TABLE_SUFFIX);
    let mut replacement = definition.clone();
    replacement.name = temporary.clone();
    let columns: Vec<String> = definition
        .columns
        .iter()
        .map(|c| quote_identifier(&c.name))
        .collect();
    let columns = columns.join(", ");
    let statements = [
        replacement.to_sql(),
        format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            quote_identifier(&temporary),
            columns,
            columns,
            quote_identifier(&definition.name)
        ),
        DdlStatement::DropTable {
            table: definition.name.clone(),
        }
        .to_sql(),
        DdlStatement::RenameTable {
            table: temporary,
            new_name: definition.name.clone(),
        }
        .to_sql(),
    ];

    let tx = conn.transaction()?;
    for sql in &statements {
        debug!("Rebuilding table {}: {}", definition.name, sql);
        tx.execute_batch(sql)
            .map_err(|err| statement_failed(sql, err))?;
    }
    if check_keys {
        check_foreign_keys(&tx, &definition.name)?;
    }
    tx.commit()?;
    Ok(())
}

fn check_foreign_keys(conn: &Connection, table: &str) -> Result<()> {
    let sql = format!("PRAGMA foreign_key_check({});", quote_identifier(table));
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![])?;
    if rows.next()?.is_some() {
        Err(Error {
            kind: ErrorKind::SchemaMutationFailed,
            msg: format!(
                "Rebuilding table {} would violate its foreign key constraints",
                table
            ),
        })
    } else {
        Ok(())
    }
}
