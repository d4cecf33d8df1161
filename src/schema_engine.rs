//! Structural operations on user tables.
//!
//! Every operation reads the live catalog through the backend, nothing is cached
//! between calls. Results are always re-read after a mutation, so callers see
//! what the database actually holds rather than what was requested.

use crate::api_model::ColumnEdit;
use crate::api_model::TableDescriptor;
use crate::database_ddl::create_table_statement;
use crate::database_ddl::render_default;
use crate::database_ddl::ColumnChange;
use crate::database_ddl::DdlStatement;
use crate::database_model::TableSnapshot;
use crate::error::Error;
use crate::error::ErrorKind;
use crate::error::Result;
use crate::relational_backend::RelationalBackend;
use log::debug;
use log::info;
use log::warn;
use serde::Serialize;

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlterReport {
    pub table: TableSnapshot,
    pub edits: Vec<EditOutcome>,
    /// A column rename stopped the request, later edits were not looked at.
    pub terminated_early: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EditOutcome {
    pub column: String,
    pub status: EditStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EditStatus {
    Applied,
    Skipped,
    Unsupported,
}

pub fn list_all(backend: &dyn RelationalBackend) -> Result<Vec<TableSnapshot>> {
    backend.introspect()
}

pub fn get_by_name(backend: &dyn RelationalBackend, name: &str) -> Result<TableSnapshot> {
    find_table(backend, name)?.ok_or_else(|| Error {
        kind: ErrorKind::NotFound,
        msg: format!("Table {} not found", name),
    })
}

fn find_table(backend: &dyn RelationalBackend, name: &str) -> Result<Option<TableSnapshot>> {
    Ok(list_all(backend)?.into_iter().find(|t| t.name == name))
}

/// Read back a table that a successful mutation must have left behind.
fn expect_table(backend: &dyn RelationalBackend, name: &str, action: &str) -> Result<TableSnapshot> {
    find_table(backend, name)?.ok_or_else(|| Error {
        kind: ErrorKind::IntegrityViolation,
        msg: format!(
            "Table {} was {} successfully but cannot be found afterwards",
            name, action
        ),
    })
}

/// Create a table with the generated `id`, `created_at` and `updated_at` columns
/// followed by the requested ones.
///
/// The existence check only gives a friendlier error. A concurrent creator can still win
/// the race, the database then rejects the statement and that is reported as a duplicate too.
pub fn create(backend: &dyn RelationalBackend, descriptor: &TableDescriptor) -> Result<TableSnapshot> {
    let exists = list_all(backend)?
        .iter()
        .any(|t| t.name.eq_ignore_ascii_case(&descriptor.name));
    if exists {
        return Err(Error {
            kind: ErrorKind::DuplicateTable,
            msg: format!("Table {} already exists", descriptor.name),
        });
    }
    let statement = DdlStatement::CreateTable(create_table_statement(descriptor)?);
    info!("Creating table {}", descriptor.name);
    backend.execute_ddl(&statement).map_err(|err| {
        if err.kind == ErrorKind::SchemaMutationFailed && err.msg.contains("already exists") {
            Error {
                kind: ErrorKind::DuplicateTable,
                msg: err.msg,
            }
        } else {
            err
        }
    })?;
    expect_table(backend, &descriptor.name, "created")
}

pub fn rename(backend: &dyn RelationalBackend, old_name: &str, new_name: &str) -> Result<TableSnapshot> {
    get_by_name(backend, old_name)?;
    info!("Renaming table {} to {}", old_name, new_name);
    backend.execute_ddl(&DdlStatement::RenameTable {
        table: old_name.to_string(),
        new_name: new_name.to_string(),
    })?;
    expect_table(backend, new_name, "renamed")
}

/// Apply column edits one by one, each as its own statement.
///
/// A failing statement aborts the request and leaves the earlier edits applied.
/// Renaming a column ends the request, edits after it are not looked at.
pub fn alter(backend: &dyn RelationalBackend, name: &str, edits: &[ColumnEdit]) -> Result<AlterReport> {
    let table = get_by_name(backend, name)?;
    let mut outcomes = Vec::with_capacity(edits.len());
    let mut terminated_early = false;
    for edit in edits {
        let column = &edit.column;
        if table.column(column).is_none() {
            warn!("Alter table {}: no column {}, edit skipped", name, column);
            outcomes.push(outcome(edit, EditStatus::Skipped, Some("column not found")));
            continue;
        }

        let update = &edit.update;
        if let Some(new_name) = update.name.as_ref().filter(|n| *n != column) {
            info!("Renaming column {}.{} to {}", name, column, new_name);
            backend.execute_ddl(&DdlStatement::RenameColumn {
                table: name.to_string(),
                column: column.clone(),
                new_name: new_name.clone(),
            })?;
            outcomes.push(outcome(edit, EditStatus::Applied, None));
            terminated_early = true;
            break;
        }

        let constraints = update.constraints.as_ref();
        let change = if let Some(data_type) = update.data_type {
            Some(ColumnChange::SetDataType(data_type))
        } else if let Some(not_null) = constraints.and_then(|c| c.not_null) {
            Some(if not_null {
                ColumnChange::SetNotNull
            } else {
                ColumnChange::DropNotNull
            })
        } else if let Some(default) = constraints.and_then(|c| c.default.as_ref()) {
            Some(ColumnChange::SetDefault(render_default(default)?))
        } else {
            None
        };

        match change {
            Some(change) => {
                info!("Altering column {}.{}: {:?}", name, column, change);
                backend.execute_ddl(&DdlStatement::AlterColumn {
                    table: name.to_string(),
                    column: column.clone(),
                    change,
                })?;
                outcomes.push(outcome(edit, EditStatus::Applied, None));
            }
            None if constraints.is_none() => {
                debug!("Alter table {}: nothing to change for column {}", name, column);
                outcomes.push(outcome(edit, EditStatus::Skipped, Some("nothing to change")));
            }
            None => {
                let err = Error {
                    kind: ErrorKind::UnsupportedAlteration,
                    msg: format!(
                        "Only the type, notNull and default of column {} can be changed",
                        column
                    ),
                };
                warn!("Alter table {}: {}", name, err);
                outcomes.push(outcome(edit, EditStatus::Unsupported, Some(&err.msg)));
            }
        }
    }
    let table = expect_table(backend, name, "altered")?;
    Ok(AlterReport {
        table,
        edits: outcomes,
        terminated_early,
    })
}

fn outcome(edit: &ColumnEdit, status: EditStatus, message: Option<&str>) -> EditOutcome {
    EditOutcome {
        column: edit.column.clone(),
        status,
        message: message.map(|m| m.to_string()),
    }
}

/// Drop a table. There is no existence check, dropping a missing table
/// fails in the database.
pub fn drop(backend: &dyn RelationalBackend, name: &str) -> Result<()> {
    info!("Dropping table {}", name);
    backend.execute_ddl(&DdlStatement::DropTable {
        table: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_model::ColumnSnapshot;
    use serde_json::json;
    use std::cell::RefCell;

    /// Keeps tables in memory and records every statement it is asked to run.
    #[derive(Default)]
    struct RecordingBackend {
        tables: RefCell<Vec<TableSnapshot>>,
        executed: RefCell<Vec<DdlStatement>>,
        reject_with: Option<String>,
        forget_changes: bool,
    }

    fn column_snapshot(name: &str, data_type: &str) -> ColumnSnapshot {
        ColumnSnapshot {
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_nullable: true,
            is_primary_key: false,
            is_auto_incrementing: false,
            has_default_value: false,
            default_value: None,
            is_unique: false,
            references: None,
        }
    }

    impl RelationalBackend for RecordingBackend {
        fn execute_ddl(&self, statement: &DdlStatement) -> Result<()> {
            self.executed.borrow_mut().push(statement.clone());
            if let Some(msg) = &self.reject_with {
                return Err(Error::new(ErrorKind::SchemaMutationFailed, msg.clone()));
            }
            if self.forget_changes {
                return Ok(());
            }
            let mut tables = self.tables.borrow_mut();
            let position = tables.iter().position(|t| t.name == statement.table());
            match (statement, position) {
                (DdlStatement::CreateTable(create), None) => tables.push(TableSnapshot {
                    name: create.name.clone(),
                    columns: create
                        .columns
                        .iter()
                        .map(|c| column_snapshot(&c.name, c.data_type.sql_name()))
                        .collect(),
                }),
                (DdlStatement::RenameTable { new_name, .. }, Some(i)) => {
                    tables[i].name = new_name.clone()
                }
                (DdlStatement::RenameColumn { column, new_name, .. }, Some(i)) => {
                    for c in tables[i].columns.iter_mut().filter(|c| &c.name == column) {
                        c.name = new_name.clone();
                    }
                }
                (DdlStatement::AlterColumn { column, change, .. }, Some(i)) => {
                    for c in tables[i].columns.iter_mut().filter(|c| &c.name == column) {
                        match change {
                            ColumnChange::SetDataType(t) => c.data_type = t.sql_name().to_string(),
                            ColumnChange::DropNotNull => c.is_nullable = true,
                            ColumnChange::SetNotNull => c.is_nullable = false,
                            ColumnChange::SetDefault(d) => c.default_value = Some(d.clone()),
                        }
                    }
                }
                (DdlStatement::DropTable { .. }, Some(i)) => {
                    tables.remove(i);
                }
                (other, _) => {
                    return Err(Error::new(
                        ErrorKind::SchemaMutationFailed,
                        format!("cannot run {}", other.to_sql()),
                    ))
                }
            }
            Ok(())
        }

        fn introspect(&self) -> Result<Vec<TableSnapshot>> {
            let mut tables = self.tables.borrow().clone();
            tables.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(tables)
        }
    }

    fn descriptor(value: serde_json::Value) -> TableDescriptor {
        serde_json::from_value(value).unwrap()
    }

    fn edits(value: serde_json::Value) -> Vec<ColumnEdit> {
        serde_json::from_value(value).unwrap()
    }

    fn backend_with_items() -> RecordingBackend {
        let backend = RecordingBackend::default();
        create(
            &backend,
            &descriptor(json!({"name": "items", "columns": [
                {"name": "label", "type": "text"},
                {"name": "amount", "type": "integer"}
            ]})),
        )
        .unwrap();
        backend.executed.borrow_mut().clear();
        backend
    }

    #[test]
    fn test_create_orders_columns() -> Result<()> {
        let backend = RecordingBackend::default();
        let table = create(
            &backend,
            &descriptor(json!({"name": "sample_table", "columns": [
                {"name": "zeta", "type": "text"},
                {"name": "alpha", "type": "blob"}
            ]})),
        )?;
        assert_eq!(
            table.column_names(),
            vec!["id", "created_at", "updated_at", "zeta", "alpha"]
        );
        assert_eq!(get_by_name(&backend, "sample_table")?, table);
        Ok(())
    }

    #[test]
    fn test_duplicate_create_issues_no_ddl() {
        let backend = backend_with_items();
        let err = create(&backend, &descriptor(json!({"name": "items"}))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateTable);
        let err = create(&backend, &descriptor(json!({"name": "ITEMS"}))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateTable);
        assert!(backend.executed.borrow().is_empty());
    }

    #[test]
    fn test_lost_create_race_is_duplicate() {
        let backend = RecordingBackend {
            reject_with: Some("table \"items\" already exists".to_string()),
            ..Default::default()
        };
        let err = create(&backend, &descriptor(json!({"name": "items"}))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateTable);
    }

    #[test]
    fn test_vanished_table_is_integrity_violation() {
        let backend = RecordingBackend {
            forget_changes: true,
            ..Default::default()
        };
        let err = create(&backend, &descriptor(json!({"name": "items"}))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IntegrityViolation);
        assert_eq!(backend.executed.borrow().len(), 1);
    }

    #[test]
    fn test_rename() -> Result<()> {
        let backend = backend_with_items();
        let table = rename(&backend, "items", "things")?;
        assert_eq!(table.name, "things");
        assert_eq!(get_by_name(&backend, "items").unwrap_err().kind, ErrorKind::NotFound);
        let err = rename(&backend, "missing", "other").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(backend.executed.borrow().len(), 1);
        Ok(())
    }

    #[test]
    fn test_alter_rename_terminates_request() -> Result<()> {
        let backend = backend_with_items();
        let report = alter(
            &backend,
            "items",
            &edits(json!([
                {"colName": "label", "updatedValues": {"name": "title"}},
                {"colName": "amount", "updatedValues": {"type": "real"}}
            ])),
        )?;
        assert!(report.terminated_early);
        assert_eq!(report.edits.len(), 1);
        assert_eq!(backend.executed.borrow().len(), 1);
        assert!(report.table.column("title").is_some());
        assert_eq!(report.table.column("amount").unwrap().data_type, "INTEGER");
        Ok(())
    }

    #[test]
    fn test_alter_branches() -> Result<()> {
        let backend = backend_with_items();
        let report = alter(
            &backend,
            "items",
            &edits(json!([
                {"colName": "missing", "updatedValues": {"type": "text"}},
                {"colName": "label", "updatedValues": {"name": "label"}},
                {"colName": "amount", "updatedValues": {"type": "real", "constraints": {"notNull": true}}},
                {"colName": "label", "updatedValues": {"constraints": {"notNull": true}}},
                {"colName": "label", "updatedValues": {"constraints": {"notNull": false}}},
                {"colName": "label", "updatedValues": {"constraints": {"default": "none"}}},
                {"colName": "label", "updatedValues": {"constraints": {"unique": true}}}
            ])),
        )?;
        let statuses: Vec<EditStatus> = report.edits.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                EditStatus::Skipped,
                EditStatus::Skipped,
                EditStatus::Applied,
                EditStatus::Applied,
                EditStatus::Applied,
                EditStatus::Applied,
                EditStatus::Unsupported,
            ]
        );
        assert!(!report.terminated_early);

        let changes: Vec<ColumnChange> = backend
            .executed
            .borrow()
            .iter()
            .filter_map(|s| match s {
                DdlStatement::AlterColumn { change, .. } => Some(change.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            changes,
            vec![
                ColumnChange::SetDataType(crate::api_model::ColumnType::Real),
                ColumnChange::SetNotNull,
                ColumnChange::DropNotNull,
                ColumnChange::SetDefault("'none'".to_string()),
            ]
        );
        // the notNull of the type edit was ignored
        let amount = report.table.column("amount").unwrap();
        assert_eq!(amount.data_type, "REAL");
        assert!(amount.is_nullable);
        Ok(())
    }

    #[test]
    fn test_alter_missing_table() {
        let backend = RecordingBackend::default();
        let err = alter(&backend, "items", &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_drop() -> Result<()> {
        let backend = backend_with_items();
        drop(&backend, "items")?;
        assert!(list_all(&backend)?.is_empty());
        let err = drop(&backend, "items").unwrap_err();
        assert_eq!(err.kind, ErrorKind::SchemaMutationFailed);
        Ok(())
    }
}
