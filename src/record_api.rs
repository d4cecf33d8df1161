//! Generic CRUD on user tables, keyed by table name and `id`.
//!
//! Table and column names are checked against a fresh snapshot of the table
//! and always quoted, values are always bound as parameters.

use crate::api_model::RecordQuery;
use crate::constants::ID_COLUMN;
use crate::constants::UPDATED_AT_COLUMN;
use crate::database_api::rejected_statement;
use crate::database_api::SqliteBackend;
use crate::database_ddl::quote_identifier;
use crate::database_model::TableSnapshot;
use crate::error::Error;
use crate::error::ErrorKind;
use crate::error::Result;
use crate::schema::validate_user_column_name;
use crate::schema_engine;
use crate::sql_converters::borrow_sql_params;
use crate::sql_converters::fields_mapping_to_owned_sql_params;
use crate::sql_converters::sqlite_rows_to_json;
use log::debug;
use rusqlite::params;
use rusqlite::Connection;
use rusqlite::ToSql;
use serde_json::json;
use serde_json::Map;
use serde_json::Value;

pub type RecordId = i64;

fn table_snapshot(backend: &SqliteBackend, table: &str) -> Result<TableSnapshot> {
    schema_engine::get_by_name(backend, table)
}

fn check_column(snapshot: &TableSnapshot, column: &str) -> Result<()> {
    if snapshot.column(column).is_none() {
        return Err(Error {
            kind: ErrorKind::InvalidRequest,
            msg: format!("Table {} has no column {}", snapshot.name, column),
        });
    }
    Ok(())
}

/// Payload columns must exist and must not be one of the generated columns.
fn check_payload(snapshot: &TableSnapshot, fields: &Map<String, Value>) -> Result<()> {
    for column in fields.keys() {
        validate_user_column_name(column)?;
        check_column(snapshot, column)?;
    }
    Ok(())
}

fn record_rejected(sql: &str, err: rusqlite::Error) -> Error {
    rejected_statement(ErrorKind::InvalidRequest, sql, err)
}

fn record_not_found(table: &str, id: RecordId) -> Error {
    Error {
        kind: ErrorKind::NotFound,
        msg: format!("Record {} not found in table {}", id, table),
    }
}

fn select_by_id(conn: &Connection, table: &str, id: RecordId) -> Result<Option<Value>> {
    let sql = format!(
        "SELECT * FROM {} WHERE {} = ?;",
        quote_identifier(table),
        quote_identifier(ID_COLUMN)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query(params![id])?;
    Ok(sqlite_rows_to_json(rows)?.into_iter().next())
}

pub fn insert(backend: &SqliteBackend, table: &str, fields: &Map<String, Value>) -> Result<Value> {
    let snapshot = table_snapshot(backend, table)?;
    check_payload(&snapshot, fields)?;
    let sql = if fields.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES;", quote_identifier(table))
    } else {
        let columns: Vec<String> = fields.keys().map(|c| quote_identifier(c)).collect();
        let values: Vec<String> = fields.keys().map(|c| format!(":{}", c)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({});",
            quote_identifier(table),
            columns.join(", "),
            values.join(", ")
        )
    };
    let sql_params = fields_mapping_to_owned_sql_params(fields)?;
    let sql_params = borrow_sql_params(&sql_params);

    let conn = backend.connection()?;
    debug!("Inserting record: {}", sql);
    let mut stmt = conn.prepare(&sql).map_err(|err| record_rejected(&sql, err))?;
    let id = stmt
        .insert(sql_params.as_slice())
        .map_err(|err| record_rejected(&sql, err))?;
    select_by_id(&conn, table, id)?.ok_or_else(|| Error {
        kind: ErrorKind::IntegrityViolation,
        msg: format!("Record {} was inserted into {} but cannot be read back", id, table),
    })
}

/// Records in `id` order. Without explicit columns all columns are returned.
pub fn list(backend: &SqliteBackend, table: &str, query: &RecordQuery) -> Result<Vec<Value>> {
    query.validate()?;
    let snapshot = table_snapshot(backend, table)?;
    let projection = if query.columns.is_empty() {
        "*".to_string()
    } else {
        for column in &query.columns {
            check_column(&snapshot, column)?;
        }
        let columns: Vec<String> = query.columns.iter().map(|c| quote_identifier(c)).collect();
        columns.join(", ")
    };
    let sql = format!(
        "SELECT {} FROM {} ORDER BY {} LIMIT ?;",
        projection,
        quote_identifier(table),
        quote_identifier(ID_COLUMN)
    );
    let conn = backend.connection()?;
    debug!("Listing records: {}", sql);
    let mut stmt = conn.prepare(&sql).map_err(|err| record_rejected(&sql, err))?;
    let rows = stmt.query(params![query.limit])?;
    sqlite_rows_to_json(rows)
}

pub fn get(backend: &SqliteBackend, table: &str, id: RecordId) -> Result<Value> {
    table_snapshot(backend, table)?;
    let conn = backend.connection()?;
    select_by_id(&conn, table, id)?.ok_or_else(|| record_not_found(table, id))
}

pub fn update(
    backend: &SqliteBackend,
    table: &str,
    id: RecordId,
    fields: &Map<String, Value>,
) -> Result<Value> {
    let snapshot = table_snapshot(backend, table)?;
    check_payload(&snapshot, fields)?;
    let mut assignments: Vec<String> = fields
        .keys()
        .map(|c| format!("{} = :{}", quote_identifier(c), c))
        .collect();
    assignments.push(format!(
        "{} = CURRENT_TIMESTAMP",
        quote_identifier(UPDATED_AT_COLUMN)
    ));
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = :{};",
        quote_identifier(table),
        assignments.join(", "),
        quote_identifier(ID_COLUMN),
        ID_COLUMN
    );
    let id_param = format!(":{}", ID_COLUMN);
    let sql_params = fields_mapping_to_owned_sql_params(fields)?;
    let mut sql_params = borrow_sql_params(&sql_params);
    sql_params.push((id_param.as_str(), &id as &dyn ToSql));

    let conn = backend.connection()?;
    debug!("Updating record {}: {}", id, sql);
    let mut stmt = conn.prepare(&sql).map_err(|err| record_rejected(&sql, err))?;
    let changed = stmt
        .execute(sql_params.as_slice())
        .map_err(|err| record_rejected(&sql, err))?;
    if changed == 0 {
        return Err(record_not_found(table, id));
    }
    select_by_id(&conn, table, id)?.ok_or_else(|| record_not_found(table, id))
}

pub fn delete(backend: &SqliteBackend, table: &str, id: RecordId) -> Result<Value> {
    table_snapshot(backend, table)?;
    let sql = format!(
        "DELETE FROM {} WHERE {} = ?;",
        quote_identifier(table),
        quote_identifier(ID_COLUMN)
    );
    let conn = backend.connection()?;
    debug!("Deleting record {}: {}", id, sql);
    let changed = conn
        .execute(&sql, params![id])
        .map_err(|err| record_rejected(&sql, err))?;
    if changed == 0 {
        return Err(record_not_found(table, id));
    }
    Ok(json!({"message": "record deleted successfully"}))
}
