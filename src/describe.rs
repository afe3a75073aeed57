use crate::dsl::ast::{ArgValue, FieldDecl, MigrationOp, PipelineStep, SyntaxTree};

/// Human-readable summary of a merged tree: schemas, actions, routes, migrations.
pub fn describe_tree(tree: &SyntaxTree) -> String {
    let mut lines = Vec::new();

    // Schemas
    lines.push(format!("Schemas ({})", tree.schemas.len()));
    for schema in &tree.schemas {
        lines.push(format!("  - {} (line {}, {} fields)", schema.name, schema.line, schema.fields.len()));
        for field in &schema.fields {
            lines.push(format!("      {}", describe_field(field)));
        }
    }

    // Actions
    lines.push(format!("\nActions ({})", tree.actions.len()));
    for action in &tree.actions {
        lines.push(format!(
            "  - {}({}) (line {}, {} body lines)",
            action.name,
            action.params.join(", "),
            action.line,
            action.body.lines().count()
        ));
    }

    // Routes
    lines.push(format!("\nRoutes ({})", tree.routes.len()));
    for route in &tree.routes {
        let steps: Vec<String> = route
            .pipeline
            .iter()
            .map(|step| match step {
                PipelineStep::Auth => "auth".to_string(),
                PipelineStep::Validate { schema } => format!("validate({schema})"),
                PipelineStep::Action { name } => name.clone(),
            })
            .collect();
        lines.push(format!("  - {} {} => {}", route.verb, route.path, steps.join(" -> ")));
    }

    // Migrations
    if !tree.migrations.is_empty() {
        lines.push(format!("\nMigrations ({})", tree.migrations.len()));
        for migration in &tree.migrations {
            lines.push(format!("  - {} ({} ops)", migration.version, migration.operations.len()));
            for op in &migration.operations {
                let text = match op {
                    MigrationOp::AddColumn {
                        table,
                        column,
                        type_name,
                    } => format!("add column {table}.{column}: {type_name}"),
                    MigrationOp::DropColumn { table, column } => format!("drop column {table}.{column}"),
                    MigrationOp::CreateTable { table } => format!("create table {table}"),
                    MigrationOp::DropTable { table } => format!("drop table {table}"),
                };
                lines.push(format!("      {text}"));
            }
        }
    }

    lines.join("\n")
}

fn describe_field(field: &FieldDecl) -> String {
    let mut text = format!("{}: {}", field.name, field.type_name);
    if !field.args.is_empty() {
        let args: Vec<String> = field
            .args
            .iter()
            .map(|(key, value)| match value {
                ArgValue::Number(n) => format!("{key}={n}"),
                ArgValue::Text(s) => format!("{key}={s:?}"),
                ArgValue::List(values) => format!("{key}={}", values.join("|")),
            })
            .collect();
        text.push_str(&format!(" ({})", args.join(", ")));
    }
    if field.optional {
        text.push_str(" [optional]");
    }
    text
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dsl::parser::parse;
    use pretty_assertions::assert_eq;

    #[test]
    fn describes_every_block_kind() {
        let tree = parse(
            r#"data User { username: String(min: 3), role: Enum(admin|editor), bio: Text? }
do createUser(input, ctx) {
  return input;
}
route { POST "/users" => auth, validate(User), createUser }
migration "001" { createTable "User" addColumn "User" age Int }"#,
        )
        .unwrap();

        assert_eq!(
            describe_tree(&tree),
            r#"Schemas (1)
  - User (line 1, 3 fields)
      username: String (min=3)
      role: Enum (enum=admin|editor)
      bio: Text [optional]

Actions (1)
  - createUser(input, ctx) (line 2, 1 body lines)

Routes (1)
  - POST /users => auth -> validate(User) -> createUser

Migrations (1)
  - 001 (2 ops)
      create table User
      add column User.age: Int"#
        );
    }

    #[test]
    fn empty_tree() {
        assert_eq!(describe_tree(&SyntaxTree::default()), "Schemas (0)\n\nActions (0)\n\nRoutes (0)");
    }
}
