//! Request payloads of the HTTP API.
//!
//! These are the write intents sent by clients. They are validated once,
//! right after decoding, and never persisted by themselves: the database
//! catalog is the only source of truth (see `database_model`).

use crate::constants::DEFAULT_RECORD_LIMIT;
use crate::error::Error;
use crate::error::ErrorKind;
use crate::error::Result;
use crate::schema::is_generated_column;
use crate::schema::validate_identifier;
use crate::schema::validate_user_column_name;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

/// Storage type of a column.
///
/// Clients can only declare the four native SQLite storage classes,
/// `Timestamp` is reserved for the automatically added `created_at` and `updated_at`.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Text,
    Real,
    Blob,
    #[serde(skip_deserializing)]
    Timestamp,
}

impl ColumnType {
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Text => "TEXT",
            ColumnType::Real => "REAL",
            ColumnType::Blob => "BLOB",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }

    pub fn from_sql_name(name: &str) -> Option<ColumnType> {
        match name.to_lowercase().as_ref() {
            "integer" => Some(ColumnType::Integer),
            "text" => Some(ColumnType::Text),
            "real" => Some(ColumnType::Real),
            "blob" => Some(ColumnType::Blob),
            "timestamp" => Some(ColumnType::Timestamp),
            _ => None,
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.sql_name())
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReferentialAction {
    #[serde(rename = "no action", alias = "no-action")]
    NoAction,
    #[serde(rename = "restrict")]
    Restrict,
    #[serde(rename = "cascade")]
    Cascade,
    #[serde(rename = "set null", alias = "set-null")]
    SetNull,
    #[serde(rename = "set default", alias = "set-default")]
    SetDefault,
}

impl ReferentialAction {
    pub fn sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }

    /// Parse the action as SQLite spells it, e.g. in `pragma_foreign_key_list`.
    pub fn from_sql(action: &str) -> Option<ReferentialAction> {
        match action.to_uppercase().as_ref() {
            "NO ACTION" => Some(ReferentialAction::NoAction),
            "RESTRICT" => Some(ReferentialAction::Restrict),
            "CASCADE" => Some(ReferentialAction::Cascade),
            "SET NULL" => Some(ReferentialAction::SetNull),
            "SET DEFAULT" => Some(ReferentialAction::SetDefault),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
    pub on_delete: Option<ReferentialAction>,
    pub on_update: Option<ReferentialAction>,
}

/// Default value of a column: either a JSON scalar (`1`, `"abc"`, `true`, `null`)
/// or a raw SQL expression given as `{"expression": "..."}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum DefaultValue {
    Expression { expression: String },
    Literal(Value),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ColumnConstraints {
    pub primary_key: Option<bool>,
    pub unique: Option<bool>,
    pub not_null: Option<bool>,
    pub default: Option<DefaultValue>,
    pub check: Option<String>,
    pub references: Option<ForeignKeyRef>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: ColumnType,
    pub constraints: Option<ColumnConstraints>,
}

/// Body of `POST /table`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    pub fn validate(&self) -> Result<()> {
        validate_identifier("Table", &self.name)?;
        let mut seen = HashSet::new();
        for column in &self.columns {
            validate_user_column_name(&column.name)?;
            if !seen.insert(column.name.to_lowercase()) {
                return Err(Error {
                    kind: ErrorKind::InvalidRequest,
                    msg: format!(
                        "Column {} is declared more than once in table {}",
                        column.name, self.name
                    ),
                });
            }
            if let Some(references) = column
                .constraints
                .as_ref()
                .and_then(|c| c.references.as_ref())
            {
                validate_identifier("Table", &references.table)?;
                validate_identifier("Column", &references.column)?;
            }
        }
        Ok(())
    }
}

/// Body of `PATCH /table/rename/{name}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenameTable {
    pub new_name: String,
}

impl RenameTable {
    pub fn validate(&self) -> Result<()> {
        validate_identifier("Table", &self.new_name)
    }
}

/// Constraint part of a column edit. Foreign keys cannot be changed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintChanges {
    pub primary_key: Option<bool>,
    pub unique: Option<bool>,
    pub not_null: Option<bool>,
    pub default: Option<DefaultValue>,
    pub check: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ColumnUpdate {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub data_type: Option<ColumnType>,
    pub constraints: Option<ConstraintChanges>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ColumnEdit {
    #[serde(rename = "colName")]
    pub column: String,
    #[serde(rename = "updatedValues", default)]
    pub update: ColumnUpdate,
}

/// Body of `PUT /table/{name}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AlterTable {
    pub columns: Vec<ColumnEdit>,
}

impl AlterTable {
    pub fn validate(&self) -> Result<()> {
        for edit in &self.columns {
            if is_generated_column(&edit.column) {
                return Err(Error {
                    kind: ErrorKind::InvalidRequest,
                    msg: format!(
                        "Column {} is managed automatically and cannot be altered",
                        edit.column
                    ),
                });
            }
            if let Some(new_name) = &edit.update.name {
                validate_user_column_name(new_name)?;
            }
        }
        Ok(())
    }
}

fn default_record_limit() -> i64 {
    DEFAULT_RECORD_LIMIT
}

/// Optional body of `GET /record/{table}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecordQuery {
    #[serde(default = "default_record_limit")]
    pub limit: i64,
    #[serde(default)]
    pub columns: Vec<String>,
}

impl Default for RecordQuery {
    fn default() -> Self {
        RecordQuery {
            limit: DEFAULT_RECORD_LIMIT,
            columns: Vec::new(),
        }
    }
}

impl RecordQuery {
    pub fn validate(&self) -> Result<()> {
        if self.limit < 0 {
            return Err(Error {
                kind: ErrorKind::InvalidRequest,
                msg: format!("Record limit must not be negative, got {}", self.limit),
            });
        }
        for column in &self.columns {
            validate_identifier("Column", column)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_table_descriptor() -> Result<()> {
        let json = json!({
            "name": "sample_post",
            "columns": [{
                "name": "user_id",
                "type": "integer",
                "constraints": {
                    "notNull": true,
                    "references": {"table": "users", "column": "id", "onDelete": "cascade"}
                }
            }, {
                "name": "rating",
                "type": "real",
                "constraints": {"default": 0.5}
            }, {
                "name": "slug",
                "type": "text",
                "constraints": {"default": {"expression": "lower(hex(randomblob(4)))"}}
            }]
        });
        let descriptor: TableDescriptor = serde_json::from_value(json)?;
        descriptor.validate()?;
        let references = descriptor.columns[0]
            .constraints
            .as_ref()
            .and_then(|c| c.references.clone())
            .unwrap();
        assert_eq!(references.on_delete, Some(ReferentialAction::Cascade));
        assert_eq!(references.on_update, None);
        assert_eq!(
            descriptor.columns[1].constraints.as_ref().unwrap().default,
            Some(DefaultValue::Literal(json!(0.5)))
        );
        assert_eq!(
            descriptor.columns[2].constraints.as_ref().unwrap().default,
            Some(DefaultValue::Expression {
                expression: "lower(hex(randomblob(4)))".to_string()
            })
        );
        Ok(())
    }

    #[test]
    fn test_timestamp_is_not_a_user_type() {
        let json = json!({"name": "t1", "columns": [{"name": "at", "type": "timestamp"}]});
        assert!(serde_json::from_value::<TableDescriptor>(json).is_err());
    }

    #[test]
    fn test_action_aliases() {
        let action: ReferentialAction = serde_json::from_value(json!("set-null")).unwrap();
        assert_eq!(action, ReferentialAction::SetNull);
        let action: ReferentialAction = serde_json::from_value(json!("no action")).unwrap();
        assert_eq!(action.sql(), "NO ACTION");
        assert_eq!(
            ReferentialAction::from_sql("set default"),
            Some(ReferentialAction::SetDefault)
        );
    }

    #[test]
    fn test_descriptor_rejects_reserved_and_duplicate_columns() {
        let reserved: TableDescriptor = serde_json::from_value(
            json!({"name": "t1", "columns": [{"name": "created_at", "type": "text"}]}),
        )
        .unwrap();
        assert_eq!(
            reserved.validate().unwrap_err().kind,
            ErrorKind::InvalidRequest
        );

        let duplicate: TableDescriptor = serde_json::from_value(json!({
            "name": "t1",
            "columns": [{"name": "title", "type": "text"}, {"name": "Title", "type": "text"}]
        }))
        .unwrap();
        assert!(duplicate.validate().is_err());
    }

    #[test]
    fn test_alter_payload() -> Result<()> {
        let alter: AlterTable = serde_json::from_value(json!({
            "columns": [
                {"colName": "age", "updatedValues": {"type": "real"}},
                {"colName": "name", "updatedValues": {"constraints": {"notNull": false}}},
                {"colName": "price"}
            ]
        }))?;
        alter.validate()?;
        assert_eq!(alter.columns[0].update.data_type, Some(ColumnType::Real));
        assert_eq!(
            alter.columns[1]
                .update
                .constraints
                .as_ref()
                .and_then(|c| c.not_null),
            Some(false)
        );
        assert_eq!(alter.columns[2].update, ColumnUpdate::default());

        let rename_to_reserved: AlterTable = serde_json::from_value(json!({
            "columns": [{"colName": "age", "updatedValues": {"name": "id"}}]
        }))?;
        assert!(rename_to_reserved.validate().is_err());
        Ok(())
    }

    #[test]
    fn test_record_query_defaults() -> Result<()> {
        let query: RecordQuery = serde_json::from_value(json!({}))?;
        assert_eq!(query, RecordQuery::default());
        assert_eq!(query.limit, 500);
        let negative: RecordQuery = serde_json::from_value(json!({"limit": -1}))?;
        assert!(negative.validate().is_err());
        Ok(())
    }
}
