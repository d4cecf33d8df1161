use crate::error::Error;
use crate::error::ErrorKind;
use crate::error::Result;
use rusqlite::types::ToSqlOutput;
use rusqlite::types::ValueRef;
use rusqlite::Rows;
use rusqlite::ToSql;
use serde_json::Map;
use serde_json::Value;

/// Convert an SQLite result set into array of JSON objects
pub fn sqlite_rows_to_json(mut rows: Rows) -> Result<Vec<Value>> {
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        let mut json_object = Map::new();
        for i in 0..row.column_count() {
            let name = row.column_name(i)?.to_string();
            json_object.insert(name, sqlite_value_to_json(row.get_raw(i)));
        }
        result.push(Value::from(json_object));
    }
    Ok(result)
}

/// BLOBs have no JSON counterpart and are returned as lowercase hex.
pub fn sqlite_value_to_json(value: ValueRef) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::from(hex::encode(b)),
    }
}

/// Named SQL parameters (`:field`) for every field of a JSON object.
pub fn fields_mapping_to_owned_sql_params(
    fields_map: &Map<String, Value>,
) -> Result<Vec<(String, ToSqlOutput)>> {
    let mut sql_params = Vec::with_capacity(fields_map.len());
    for (field, value) in fields_map {
        let param = json_value_to_sqlite_parameter(value).map_err(|err| Error {
            kind: err.kind,
            msg: format!("{} (field {})", err.msg, field),
        })?;
        sql_params.push((format!(":{}", field), param));
    }
    Ok(sql_params)
}

pub fn borrow_sql_params<'a>(
    sql_params: &'a [(String, ToSqlOutput)],
) -> Vec<(&'a str, &'a dyn ToSql)> {
    sql_params
        .iter()
        .map(|(field, value)| (field.as_str(), value as &dyn ToSql))
        .collect()
}

pub fn json_value_to_sqlite_parameter(json: &Value) -> Result<ToSqlOutput<'_>> {
    let value = match json {
        Value::Null => ValueRef::Null,
        Value::String(s) => ValueRef::Text(s.as_bytes()),
        Value::Number(n) => {
            if let Some(int) = n.as_i64() {
                ValueRef::Integer(int)
            } else if let Some(float) = n.as_f64() {
                ValueRef::Real(float)
            } else {
                return Err(Error {
                    kind: ErrorKind::InvalidRequest,
                    msg: format!("Unsupported number precision of JSON value {}", n),
                });
            }
        }
        Value::Bool(b) => ValueRef::Integer(if *b { 1 } else { 0 }),
        Value::Array(_) | Value::Object(_) => {
            return Err(Error {
                kind: ErrorKind::InvalidRequest,
                msg: "Cannot store a JSON array or object in a column".to_string(),
            })
        }
    };
    Ok(ToSqlOutput::Borrowed(value))
}
