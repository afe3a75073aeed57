//! Route/server emitter: assembles validators, statements, actions and route
//! handlers into one ES module.
//!
//! The module keeps no registered-routes state. `createHandlers(db)` returns
//! a fresh handler array each call and the serving shell decides what to do
//! with it.

use super::migrations::{lower_migration, render_migrations};
use super::statements::{lower_statements, statements_name};
use super::validate::{lower_validation, validator_name};
use super::writer::{js_string, CodeWriter};
use super::{EmitError, EmitOptions, GENERATED_HEADER};
use crate::dsl::ast::{ActionDecl, HttpVerb, PipelineStep, RouteDecl, SyntaxTree};

/// Names the generated module imports from the runtime contract.
pub const RUNTIME_IMPORTS: [&str; 4] = ["tableAccess", "authGate", "normalizeError", "ValidationFailure"];

pub const HEALTH_PATH: &str = "/health";

pub fn emit_server(tree: &SyntaxTree, options: &EmitOptions) -> Result<String, EmitError> {
    let mut w = CodeWriter::new();
    w.line(GENERATED_HEADER);
    w.line(format!(
        "import {{ {} }} from {};",
        RUNTIME_IMPORTS.join(", "),
        js_string(&options.runtime_module)
    ));

    for schema in &tree.schemas {
        w.blank();
        w.line(format!("// ── {} ──", schema.name));
        w.blank();
        lower_validation(schema)?.render(&mut w);
        w.blank();
        lower_statements(schema, options.dialect).render(&mut w);
    }

    if !tree.actions.is_empty() {
        w.blank();
        w.line("// ── Actions ──");
        for action in &tree.actions {
            w.blank();
            render_action(action, &mut w);
        }
    }

    w.blank();
    let lowered = tree
        .migrations
        .iter()
        .map(|m| lower_migration(m, tree, options.dialect))
        .collect::<Result<Vec<_>, _>>()?;
    render_migrations(&lowered, &mut w);

    w.blank();
    render_prepare_tables(tree, &mut w);

    w.blank();
    render_handlers(tree, &mut w);

    Ok(w.finish())
}

/// The body is copied exactly as written, without re-indentation.
fn render_action(action: &ActionDecl, w: &mut CodeWriter) {
    w.line(format!("// line {}", action.line));
    w.line(format!("async function {}({}) {{", action.name, action.params.join(", ")));
    w.verbatim(&action.body);
    w.line("}");
}

fn render_prepare_tables(tree: &SyntaxTree, w: &mut CodeWriter) {
    w.open("export function prepareTables(db) {");
    if tree.schemas.is_empty() {
        w.line("return Object.freeze({});");
    } else {
        w.open("return Object.freeze({");
        for schema in &tree.schemas {
            w.line(format!(
                "{}: tableAccess(db, {}, {}),",
                schema.name,
                js_string(&schema.name),
                statements_name(&schema.name)
            ));
        }
        w.close("});");
    }
    w.close("}");
}

fn render_handlers(tree: &SyntaxTree, w: &mut CodeWriter) {
    w.open("export function createHandlers(db) {");
    w.line("const tables = prepareTables(db);");
    w.open("return [");

    let user_health = tree
        .routes
        .iter()
        .any(|r| r.verb == HttpVerb::Get && r.path == HEALTH_PATH);
    if !user_health {
        w.open("{");
        w.line("method: \"GET\",");
        w.line(format!("path: {},", js_string(HEALTH_PATH)));
        w.open("async handle(req) {")
            .line("return { status: 200, body: { status: \"ok\" } };")
            .close("},");
        w.close("},");
    }

    for route in &tree.routes {
        render_route(route, w);
    }

    w.close("];");
    w.close("}");
}

/// Steps run strictly in pipeline order. Each action receives the previous
/// step's output; a step that returns nothing yields `{ success: true }`.
fn render_route(route: &RouteDecl, w: &mut CodeWriter) {
    w.open("{");
    w.line(format!("method: {},", js_string(route.verb.as_str())));
    w.line(format!("path: {},", js_string(&route.path)));
    w.open("async handle(req) {");
    w.line("const ctx = { user: null, params: req.params ?? {}, query: req.query ?? {}, tables };");
    w.open("try {");
    w.line("let data = { ...ctx.query, ...(req.body ?? {}), ...ctx.params };");
    for step in &route.pipeline {
        match step {
            PipelineStep::Auth => {
                w.line("ctx.user = await authGate(req);");
            }
            PipelineStep::Validate { schema } => {
                w.line(format!("data = {}(data);", validator_name(schema)));
            }
            PipelineStep::Action { name } => {
                w.line(format!("data = await {name}(data, ctx);"));
                w.line("if (data === undefined) data = { success: true };");
            }
        }
    }
    w.line("return { status: 200, body: data };");
    w.reopen("} catch (err) {");
    w.line("const failure = normalizeError(err);");
    w.line("return { status: failure.status, body: { error: failure.message } };");
    w.close("}");
    w.close("},");
    w.close("},");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::codegen::Dialect;
    use crate::dsl::parser::parse;
    use pretty_assertions::assert_eq;

    const APP: &str = r#"
data User { username: String(min: 3, max: 50), role: Enum(admin|editor|viewer) }

do createUser(input, ctx) {
  const row = await ctx.tables.User.insert(input);
  if (row.note === '}') {
    return { ...input, id: row.id };
  }
  return { ...input, id: row.id };
}

do audit(input, ctx) {
  console.log(`created ${input.id}`);
}

route users {
  POST "/users" => auth, validate(User), createUser, audit
  GET "/users/:id" => createUser
}

migration "001" { createTable "User" }
"#;

    fn emit_app(dialect: Dialect) -> String {
        let tree = parse(APP).unwrap();
        let options = EmitOptions {
            dialect,
            ..EmitOptions::default()
        };
        emit_server(&tree, &options).unwrap()
    }

    #[test]
    fn module_imports_runtime_contract() {
        let js = emit_app(Dialect::Sqlite);
        let mut lines = js.lines();
        assert_eq!(lines.next(), Some(GENERATED_HEADER));
        assert_eq!(
            lines.next(),
            Some("import { tableAccess, authGate, normalizeError, ValidationFailure } from \"blocksmith/runtime\";")
        );
    }

    #[test]
    fn pipeline_steps_run_in_order() {
        let js = emit_app(Dialect::Sqlite);
        let start = js.find("path: \"/users\",").unwrap();
        let handler = &js[start..];
        let auth = handler.find("ctx.user = await authGate(req);").unwrap();
        let validate = handler.find("data = validateUser(data);").unwrap();
        let create = handler.find("data = await createUser(data, ctx);").unwrap();
        let audit = handler.find("data = await audit(data, ctx);").unwrap();
        assert!(auth < validate && validate < create && create < audit);
    }

    #[test]
    fn action_bodies_are_verbatim() {
        let js = emit_app(Dialect::Sqlite);
        let tree = parse(APP).unwrap();
        for action in &tree.actions {
            assert!(js.contains(&action.body), "body of {} missing", action.name);
        }
        assert!(js.contains("async function createUser(input, ctx) {\nconst row = await ctx.tables.User.insert(input);\n"));
    }

    #[test]
    fn health_route_is_added_once() {
        let js = emit_app(Dialect::Sqlite);
        assert_eq!(js.matches("path: \"/health\",").count(), 1);

        let tree = parse("do ping() { return 'pong'; }\nroute { GET \"/health\" => ping }").unwrap();
        let js = emit_server(&tree, &EmitOptions::default()).unwrap();
        assert_eq!(js.matches("path: \"/health\",").count(), 1);
        assert!(!js.contains("status: \"ok\""));
    }

    #[test]
    fn handlers_are_built_fresh() {
        let js = emit_app(Dialect::Sqlite);
        assert!(js.contains("export function createHandlers(db) {\n  const tables = prepareTables(db);\n  return [\n"));
        assert!(js.contains("    User: tableAccess(db, \"User\", UserStatements),\n"));
        assert!(!js.contains("registerRoute"));
    }

    #[test]
    fn errors_are_normalized_per_request() {
        let js = emit_app(Dialect::Sqlite);
        assert!(js.contains(
            "        } catch (err) {\n          const failure = normalizeError(err);\n          return { status: failure.status, body: { error: failure.message } };\n        }\n"
        ));
    }

    #[test]
    fn dialect_changes_statements_only() {
        let sqlite = emit_app(Dialect::Sqlite);
        let pg = emit_app(Dialect::Postgres);
        assert!(sqlite.contains(r#"VALUES (?,?)"#));
        assert!(pg.contains(r#"VALUES ($1,$2) RETURNING id"#));
        assert!(pg.contains("id SERIAL PRIMARY KEY"));
        let tail = |js: &str| js[js.find("export function createHandlers").unwrap()..].to_string();
        assert_eq!(tail(&sqlite), tail(&pg));
    }

    #[test]
    fn custom_runtime_module() {
        let tree = parse(APP).unwrap();
        let options = EmitOptions {
            runtime_module: "./runtime.js".into(),
            ..EmitOptions::default()
        };
        let js = emit_server(&tree, &options).unwrap();
        assert!(js.contains("from \"./runtime.js\";"));
    }
}
