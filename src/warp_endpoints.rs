use crate::api_model::AlterTable;
use crate::api_model::RecordQuery;
use crate::api_model::RenameTable;
use crate::api_model::TableDescriptor;
use crate::database_api::SqliteBackend;
use crate::database_model::TableSnapshot;
use crate::error::Result;
use crate::record_api;
use crate::record_api::RecordId;
use crate::schema::validate_identifier;
use crate::schema_engine;
use crate::schema_engine::AlterReport;
use bytes::Bytes;
use log::debug;
use serde::de::DeserializeOwned;
use serde_json::json;
use serde_json::Map;
use serde_json::Value;

/// Version as described by git at build time, or the Cargo version
/// when the sources were built outside of a git checkout.
pub fn get_project_version() -> String {
    debug!("Returning API version...");
    match option_env!("GIT_DESCRIBE").map(str::trim) {
        Some(describe) if !describe.is_empty() => describe.to_string(),
        _ => env!("CARGO_PKG_VERSION").to_string(),
    }
}

/// Decode a JSON body, errors name the path of the offending field.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let deserializer = &mut serde_json::Deserializer::from_slice(body);
    let value = serde_path_to_error::deserialize(deserializer)?;
    Ok(value)
}

pub fn create_table(backend: &SqliteBackend, body: Bytes) -> Result<TableSnapshot> {
    let descriptor: TableDescriptor = parse_body(&body)?;
    descriptor.validate()?;
    schema_engine::create(backend, &descriptor)
}

pub fn list_tables(backend: &SqliteBackend) -> Result<Vec<TableSnapshot>> {
    schema_engine::list_all(backend)
}

pub fn get_table(backend: &SqliteBackend, name: String) -> Result<TableSnapshot> {
    schema_engine::get_by_name(backend, &name)
}

pub fn rename_table(backend: &SqliteBackend, name: String, body: Bytes) -> Result<TableSnapshot> {
    validate_identifier("Table", &name)?;
    let rename: RenameTable = parse_body(&body)?;
    rename.validate()?;
    schema_engine::rename(backend, &name, &rename.new_name)
}

pub fn alter_table(backend: &SqliteBackend, name: String, body: Bytes) -> Result<AlterReport> {
    validate_identifier("Table", &name)?;
    let alter: AlterTable = parse_body(&body)?;
    alter.validate()?;
    schema_engine::alter(backend, &name, &alter.columns)
}

pub fn drop_table(backend: &SqliteBackend, name: String) -> Result<Value> {
    validate_identifier("Table", &name)?;
    schema_engine::drop(backend, &name)?;
    Ok(json!({ "message": format!("table {} dropped successfully", name) }))
}

pub fn insert_record(backend: &SqliteBackend, table: String, body: Bytes) -> Result<Value> {
    let fields: Map<String, Value> = parse_body(&body)?;
    record_api::insert(backend, &table, &fields)
}

/// The query is optional, an empty body lists with the default limit.
pub fn list_records(backend: &SqliteBackend, table: String, body: Bytes) -> Result<Vec<Value>> {
    let query = if body.iter().all(u8::is_ascii_whitespace) {
        RecordQuery::default()
    } else {
        parse_body(&body)?
    };
    record_api::list(backend, &table, &query)
}

pub fn get_record(backend: &SqliteBackend, table: String, id: RecordId) -> Result<Value> {
    record_api::get(backend, &table, id)
}

pub fn update_record(
    backend: &SqliteBackend,
    table: String,
    id: RecordId,
    body: Bytes,
) -> Result<Value> {
    let fields: Map<String, Value> = parse_body(&body)?;
    record_api::update(backend, &table, id, &fields)
}

pub fn delete_record(backend: &SqliteBackend, table: String, id: RecordId) -> Result<Value> {
    record_api::delete(backend, &table, id)
}
