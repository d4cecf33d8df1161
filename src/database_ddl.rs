//! Typed DDL statements and their SQL text.
//!
//! Every identifier is quoted and every literal escaped when rendered.
//! Raw SQL fragments coming from clients (`check` expressions and default
//! expressions) are only accepted when they parse as exactly one SQL
//! expression, and they are always wrapped in parentheses.

use crate::api_model::ColumnDescriptor;
use crate::api_model::ColumnType;
use crate::api_model::DefaultValue;
use crate::api_model::ReferentialAction;
use crate::api_model::TableDescriptor;
use crate::constants::CREATED_AT_COLUMN;
use crate::constants::ID_COLUMN;
use crate::constants::UPDATED_AT_COLUMN;
use crate::database_ddl_parse::check_single_expression;
use crate::error::Error;
use crate::error::ErrorKind;
use crate::error::Result;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: ColumnType,
    pub not_null: bool,
    pub primary_key: bool,
    pub autoincrement: bool,
    pub unique: bool,
    /// Default value, already rendered as SQL
    pub default: Option<String>,
    /// Check expression without the surrounding parentheses
    pub check: Option<String>,
}

impl ColumnDef {
    pub fn new(name: &str, data_type: ColumnType) -> ColumnDef {
        ColumnDef {
            name: name.to_string(),
            data_type,
            not_null: false,
            primary_key: false,
            autoincrement: false,
            unique: false,
            default: None,
            check: None,
        }
    }

    /// Constraint clauses are always written in the same order
    /// so that the generated DDL is reproducible.
    pub fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", quote_identifier(&self.name), self.data_type);
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
            if self.autoincrement {
                sql.push_str(" AUTOINCREMENT");
            }
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        if let Some(check) = &self.check {
            sql.push_str(" CHECK (");
            sql.push_str(check);
            sql.push(')');
        }
        sql
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyDef {
    pub name: String,
    pub column: String,
    pub target_table: String,
    pub target_column: String,
    pub on_delete: Option<ReferentialAction>,
    pub on_update: Option<ReferentialAction>,
}

impl ForeignKeyDef {
    pub fn to_sql(&self) -> String {
        let mut sql = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            quote_identifier(&self.name),
            quote_identifier(&self.column),
            quote_identifier(&self.target_table),
            quote_identifier(&self.target_column),
        );
        if let Some(action) = self.on_delete {
            sql.push_str(" ON DELETE ");
            sql.push_str(action.sql());
        }
        if let Some(action) = self.on_update {
            sql.push_str(" ON UPDATE ");
            sql.push_str(action.sql());
        }
        sql
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub foreign_keys: Vec<ForeignKeyDef>,
}

impl CreateTable {
    pub fn to_sql(&self) -> String {
        let definitions: Vec<String> = self
            .columns
            .iter()
            .map(ColumnDef::to_sql)
            .chain(self.foreign_keys.iter().map(ForeignKeyDef::to_sql))
            .collect();
        format!(
            "CREATE TABLE {} ({})",
            quote_identifier(&self.name),
            definitions.join(", ")
        )
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut ColumnDef> {
        self.columns.iter_mut().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnChange {
    SetDataType(ColumnType),
    DropNotNull,
    SetNotNull,
    /// New default value, already rendered as SQL
    SetDefault(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DdlStatement {
    CreateTable(CreateTable),
    RenameTable {
        table: String,
        new_name: String,
    },
    RenameColumn {
        table: String,
        column: String,
        new_name: String,
    },
    AlterColumn {
        table: String,
        column: String,
        change: ColumnChange,
    },
    DropTable {
        table: String,
    },
}

impl DdlStatement {
    /// Name of the table the statement operates on.
    pub fn table(&self) -> &str {
        match self {
            DdlStatement::CreateTable(create) => &create.name,
            DdlStatement::RenameTable { table, .. }
            | DdlStatement::RenameColumn { table, .. }
            | DdlStatement::AlterColumn { table, .. }
            | DdlStatement::DropTable { table } => table,
        }
    }

    /// Standard SQL text of the statement.
    ///
    /// Note that SQLite does not understand `ALTER COLUMN`,
    /// the SQLite backend executes those statements differently.
    pub fn to_sql(&self) -> String {
        match self {
            DdlStatement::CreateTable(create) => create.to_sql(),
            DdlStatement::RenameTable { table, new_name } => format!(
                "ALTER TABLE {} RENAME TO {}",
                quote_identifier(table),
                quote_identifier(new_name)
            ),
            DdlStatement::RenameColumn {
                table,
                column,
                new_name,
            } => format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                quote_identifier(table),
                quote_identifier(column),
                quote_identifier(new_name)
            ),
            DdlStatement::AlterColumn {
                table,
                column,
                change,
            } => {
                let action = match change {
                    ColumnChange::SetDataType(data_type) => format!("SET DATA TYPE {}", data_type),
                    ColumnChange::DropNotNull => "DROP NOT NULL".to_string(),
                    ColumnChange::SetNotNull => "SET NOT NULL".to_string(),
                    ColumnChange::SetDefault(default) => format!("SET DEFAULT {}", default),
                };
                format!(
                    "ALTER TABLE {} ALTER COLUMN {} {}",
                    quote_identifier(table),
                    quote_identifier(column),
                    action
                )
            }
            DdlStatement::DropTable { table } => {
                format!("DROP TABLE {}", quote_identifier(table))
            }
        }
    }
}

/// Columns that every table starts with: `id`, `created_at`, `updated_at`.
pub fn generated_columns() -> Vec<ColumnDef> {
    let mut id = ColumnDef::new(ID_COLUMN, ColumnType::Integer);
    id.primary_key = true;
    id.autoincrement = true;
    let timestamp = |name: &str| {
        let mut column = ColumnDef::new(name, ColumnType::Timestamp);
        column.not_null = true;
        column.default = Some("(CURRENT_TIMESTAMP)".to_string());
        column
    };
    vec![id, timestamp(CREATED_AT_COLUMN), timestamp(UPDATED_AT_COLUMN)]
}

/// Translate a (validated) table descriptor into a `CREATE TABLE` statement.
pub fn create_table_statement(descriptor: &TableDescriptor) -> Result<CreateTable> {
    let mut columns = generated_columns();
    let mut foreign_keys = Vec::new();
    for column in &descriptor.columns {
        columns.push(column_definition(column)?);
        if let Some(references) = column
            .constraints
            .as_ref()
            .and_then(|c| c.references.as_ref())
        {
            foreign_keys.push(ForeignKeyDef {
                name: foreign_key_name(&descriptor.name, &column.name),
                column: column.name.clone(),
                target_table: references.table.clone(),
                target_column: references.column.clone(),
                on_delete: references.on_delete,
                on_update: references.on_update,
            });
        }
    }
    Ok(CreateTable {
        name: descriptor.name.clone(),
        columns,
        foreign_keys,
    })
}

fn column_definition(column: &ColumnDescriptor) -> Result<ColumnDef> {
    let mut def = ColumnDef::new(&column.name, column.data_type);
    if let Some(constraints) = &column.constraints {
        def.not_null = constraints.not_null.unwrap_or(false);
        def.primary_key = constraints.primary_key.unwrap_or(false);
        def.unique = constraints.unique.unwrap_or(false);
        if let Some(default) = &constraints.default {
            def.default = Some(render_default(default)?);
        }
        if let Some(check) = &constraints.check {
            check_single_expression(check)?;
            def.check = Some(check.trim().to_string());
        }
    }
    Ok(def)
}

/// Name of the foreign key constraint created for a referencing column.
pub fn foreign_key_name(table: &str, column: &str) -> String {
    format!("{}_{}_fk_key", table, column)
}

pub fn render_default(default: &DefaultValue) -> Result<String> {
    match default {
        DefaultValue::Expression { expression } => {
            check_single_expression(expression)?;
            Ok(format!("({})", expression.trim()))
        }
        DefaultValue::Literal(Value::Null) => Ok("NULL".to_string()),
        DefaultValue::Literal(Value::Bool(b)) => Ok(if *b { "1" } else { "0" }.to_string()),
        DefaultValue::Literal(Value::Number(n)) => Ok(n.to_string()),
        DefaultValue::Literal(Value::String(s)) => Ok(quote_literal(s)),
        DefaultValue::Literal(other) => Err(Error {
            kind: ErrorKind::InvalidRequest,
            msg: format!(
                "Default value {} is not supported, use a JSON scalar or {{\"expression\": \"...\"}}",
                other
            ),
        }),
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
