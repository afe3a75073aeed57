//! Migration lowering: each `migration` block becomes an ordered list of SQL
//! statements for the external migration runner.

use serde::Serialize;

use super::dialect::Dialect;
use super::statements::create_table;
use super::validate::ValueKind;
use super::writer::{js_string, CodeWriter};
use super::EmitError;
use crate::dsl::ast::{MigrationDecl, MigrationOp, SyntaxTree};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoweredMigration {
    pub version: String,
    pub statements: Vec<String>,
}

/// `createTable` takes its columns from the schema of the same name, so the
/// tree is needed to lower it.
pub fn lower_migration(
    migration: &MigrationDecl,
    tree: &SyntaxTree,
    dialect: Dialect,
) -> Result<LoweredMigration, EmitError> {
    let sql = dialect.sql();
    let mut statements = Vec::with_capacity(migration.operations.len());

    for op in &migration.operations {
        let table = sql.quote_ident(op.table());
        let statement = match op {
            MigrationOp::AddColumn { column, type_name, .. } => format!(
                "ALTER TABLE {table} ADD COLUMN {} {}",
                sql.quote_ident(column),
                sql.column_type(ValueKind::from_type_name(type_name))
            ),
            MigrationOp::DropColumn { column, .. } => {
                format!("ALTER TABLE {table} DROP COLUMN {}", sql.quote_ident(column))
            }
            MigrationOp::CreateTable { table: name } => {
                let schema = tree.schema(name).ok_or_else(|| EmitError::UnknownTable {
                    version: migration.version.clone(),
                    table: name.clone(),
                })?;
                create_table(schema, sql)
            }
            MigrationOp::DropTable { .. } => format!("DROP TABLE IF EXISTS {table}"),
        };
        statements.push(statement);
    }

    Ok(LoweredMigration {
        version: migration.version.clone(),
        statements,
    })
}

/// `export const migrations = Object.freeze([...]);`
pub fn render_migrations(migrations: &[LoweredMigration], w: &mut CodeWriter) {
    if migrations.is_empty() {
        w.line("export const migrations = Object.freeze([]);");
        return;
    }
    w.open("export const migrations = Object.freeze([");
    for migration in migrations {
        w.open("{");
        w.line(format!("version: {},", js_string(&migration.version)));
        w.open("statements: [");
        for statement in &migration.statements {
            w.line(format!("{},", js_string(statement)));
        }
        w.close("],");
        w.close("},");
    }
    w.close("]);");
}
