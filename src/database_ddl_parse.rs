//! Reading SQL text back with `sqlparser`: validation of raw client
//! expressions, and the `CREATE TABLE` statements that `database_ddl` writes.
//!
//! SQLite cannot alter a column in place, so the SQLite backend reads the
//! stored table definition, changes it and recreates the table.
//! Only the subset of the grammar produced by `database_ddl` is understood,
//! anything else is reported as unsupported.

use crate::api_model::ColumnType;
use crate::api_model::ReferentialAction;
use crate::database_ddl::ColumnDef;
use crate::database_ddl::CreateTable;
use crate::database_ddl::ForeignKeyDef;
use crate::error::Error;
use crate::error::ErrorKind;
use crate::error::Result;
use sqlparser::ast;
use sqlparser::ast::ColumnOption;
use sqlparser::ast::Expr;
use sqlparser::ast::Ident;
use sqlparser::ast::ObjectName;
use sqlparser::ast::Statement;
use sqlparser::ast::TableConstraint;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;
use sqlparser::tokenizer::Tokenizer;
use sqlparser::tokenizer::Whitespace;

const DIALECT: SQLiteDialect = SQLiteDialect {};

/// Check that a raw SQL fragment is exactly one expression:
/// no statement separators, no comments and nothing after the expression.
pub fn check_single_expression(expression: &str) -> Result<()> {
    parse_single_expression(expression)
        .map(|_| ())
        .map_err(|reason| Error {
            kind: ErrorKind::InvalidRequest,
            msg: format!("Invalid SQL expression {:?}: {}", expression, reason),
        })
}

fn parse_single_expression(expression: &str) -> std::result::Result<Expr, String> {
    let tokens = Tokenizer::new(&DIALECT, expression)
        .tokenize()
        .map_err(|err| err.to_string())?;
    let has_comment = tokens.iter().any(|token| {
        matches!(
            token,
            Token::Whitespace(Whitespace::SingleLineComment { .. })
                | Token::Whitespace(Whitespace::MultiLineComment(_))
        )
    });
    if has_comment {
        return Err("SQL comments are not allowed".to_string());
    }
    if tokens.iter().all(|token| matches!(token, Token::Whitespace(_))) {
        return Err("expression is empty".to_string());
    }
    let mut parser = Parser::new(&DIALECT).with_tokens(tokens);
    let expr = parser.parse_expr().map_err(|err| err.to_string())?;
    match parser.peek_token().token {
        Token::EOF => Ok(expr),
        rest => Err(format!("unexpected `{}` after the expression", rest)),
    }
}

/// Read a `CREATE TABLE` statement as stored in `sqlite_master`.
pub fn parse_create_table(sql: &str) -> std::result::Result<CreateTable, String> {
    let statements = Parser::parse_sql(&DIALECT, sql).map_err(|err| err.to_string())?;
    let statement = match statements.as_slice() {
        [statement] => statement,
        _ => {
            return Err(format!(
                "Expected one table definition, found {} statements",
                statements.len()
            ))
        }
    };
    match statement {
        Statement::CreateTable {
            name,
            columns,
            constraints,
            without_rowid,
            query,
            ..
        } => {
            if *without_rowid || query.is_some() {
                return Err(format!("Table options of {} are not supported", name));
            }
            let columns = columns.iter().map(column).collect::<std::result::Result<_, _>>()?;
            let foreign_keys = constraints
                .iter()
                .map(foreign_key)
                .collect::<std::result::Result<_, _>>()?;
            Ok(CreateTable {
                name: object_name(name)?,
                columns,
                foreign_keys,
            })
        }
        _ => Err("Expected a CREATE TABLE statement".to_string()),
    }
}

fn object_name(name: &ObjectName) -> std::result::Result<String, String> {
    match name.0.as_slice() {
        [ident] => Ok(ident.value.clone()),
        _ => Err(format!("Qualified table name {} is not supported", name)),
    }
}

fn column(def: &ast::ColumnDef) -> std::result::Result<ColumnDef, String> {
    let name = &def.name.value;
    let type_name = def.data_type.to_string();
    let data_type = ColumnType::from_sql_name(&type_name).ok_or_else(|| {
        format!("Column type {} of column {} is not supported", type_name, name)
    })?;
    if let Some(collation) = &def.collation {
        return Err(format!("Collation {} of column {} is not supported", collation, name));
    }
    let mut column = ColumnDef::new(name, data_type);
    for option in &def.options {
        match &option.option {
            ColumnOption::Null => (),
            ColumnOption::NotNull => column.not_null = true,
            ColumnOption::Unique {
                is_primary: true, ..
            } => column.primary_key = true,
            ColumnOption::Unique { .. } => column.unique = true,
            ColumnOption::Default(expr) => column.default = Some(expr.to_string()),
            ColumnOption::Check(expr) => column.check = Some(expr.to_string()),
            ColumnOption::DialectSpecific(tokens) if is_autoincrement(tokens) => {
                column.autoincrement = true
            }
            other => {
                return Err(format!(
                    "Column constraint `{}` of column {} is not supported",
                    other, name
                ))
            }
        }
    }
    Ok(column)
}

fn is_autoincrement(tokens: &[Token]) -> bool {
    match tokens {
        [Token::Word(word)] => word.value.eq_ignore_ascii_case("AUTOINCREMENT"),
        _ => false,
    }
}

fn foreign_key(constraint: &TableConstraint) -> std::result::Result<ForeignKeyDef, String> {
    match constraint {
        TableConstraint::ForeignKey {
            name,
            columns,
            foreign_table,
            referred_columns,
            on_delete,
            on_update,
            ..
        } => {
            let column = single_column(columns)?;
            Ok(ForeignKeyDef {
                name: match name {
                    Some(name) => name.value.clone(),
                    None => format!("{}_fk", column),
                },
                column,
                target_table: object_name(foreign_table)?,
                target_column: single_column(referred_columns)?,
                on_delete: on_delete.as_ref().map(referential_action).transpose()?,
                on_update: on_update.as_ref().map(referential_action).transpose()?,
            })
        }
        other => Err(format!("Table constraint `{}` is not supported", other)),
    }
}

fn single_column(columns: &[Ident]) -> std::result::Result<String, String> {
    match columns {
        [column] => Ok(column.value.clone()),
        _ => Err("Only single column keys are supported".to_string()),
    }
}

fn referential_action(
    action: &ast::ReferentialAction,
) -> std::result::Result<ReferentialAction, String> {
    let action = action.to_string();
    ReferentialAction::from_sql(&action)
        .ok_or_else(|| format!("Unsupported referential action {}", action))
}
