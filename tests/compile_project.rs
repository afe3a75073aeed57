#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use blocksmith::codegen::Dialect;
use blocksmith::dsl::resolver::ResolveError;
use blocksmith::error::BuildError;
use blocksmith::project::{build_project, compile_project};
use blocksmith::settings::{load_config, ProjectConfig};

fn write(root: &Path, name: &str, text: &str) {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, text).unwrap();
}

fn sample_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(
        root,
        "blocksmith.json",
        r#"{ "version": 1, "entry": "app/main.bs", "dialect": "postgres", "out_dir": "dist" }"#,
    );
    write(
        root,
        "app/main.bs",
        r#"import "./models"
import "/shared/tasks.bs"

route api {
  POST "/tasks" => auth, validate(Task), createTask
  GET "/tasks" => [listTasks]
  DELETE "/tasks/:id" => auth, deleteTask
}
"#,
    );
    write(
        root,
        "app/models.bs",
        r#"// Task storage
data Task {
  title: String(min: 1, max: 120)
  status: Enum(todo | doing | done)
  estimate: Int(min: 0)?
}

migration "001_tasks" {
  createTable "Task"
}
"#,
    );
    write(
        root,
        "shared/tasks.bs",
        r#"import "../app/models.bs"

do createTask(input, ctx) {
  // don't trust the client's braces: '{'
  const row = await ctx.tables.Task.insert(input);
  return { ...input, id: row.id };
}

do listTasks(input, ctx) {
  const { sql, values } = listTaskQuery({}, { field: "title", direction: "asc" });
  return ctx.tables.Task.rawSelect(sql, values);
}

do deleteTask(input, ctx) {
  await ctx.tables.Task.delete(ctx.params.id);
}
"#,
    );
    dir
}

#[test]
fn builds_a_multi_file_project() {
    let dir = sample_project();
    let config = load_config(dir.path()).unwrap();
    assert_eq!(config.dialect, Dialect::Postgres);

    let report = build_project(dir.path(), &config).unwrap();
    assert_eq!(
        (report.schemas, report.actions, report.routes, report.migrations),
        (1, 3, 3, 1)
    );

    let server = fs::read_to_string(dir.path().join("dist/server.js")).unwrap();
    assert!(server.contains(r#"insert: "INSERT INTO \"Task\" (\"title\",\"status\",\"estimate\") VALUES ($1,$2,$3) RETURNING id","#));
    assert!(server.contains("export function validateTask(input) {"));
    assert!(server.contains("// don't trust the client's braces: '{'\n"));
    assert!(server.contains("path: \"/health\","));
    assert!(server.contains("path: \"/tasks/:id\","));
    assert!(server.contains("CREATE TABLE IF NOT EXISTS \\\"Task\\\" (id SERIAL PRIMARY KEY"));

    let types = fs::read_to_string(dir.path().join("dist/types.d.ts")).unwrap();
    assert!(types.contains("  status: \"todo\" | \"doing\" | \"done\";\n"));
    assert!(types.contains("  estimate?: number | null;\n"));
}

#[test]
fn rebuilding_is_byte_identical() {
    let dir = sample_project();
    let config = load_config(dir.path()).unwrap();
    let (_, first) = compile_project(dir.path(), &config).unwrap();
    let (_, second) = compile_project(dir.path(), &config).unwrap();
    assert_eq!(first, second);
}

#[test]
fn sqlite_dialect_uses_sequential_placeholders() {
    let dir = sample_project();
    let config = ProjectConfig {
        dialect: Dialect::Sqlite,
        ..load_config(dir.path()).unwrap()
    };
    let (_, artifacts) = compile_project(dir.path(), &config).unwrap();
    assert!(artifacts.server_source.contains("VALUES (?,?,?)\","));
    assert!(!artifacts.server_source.contains("RETURNING"));
}

#[test]
fn import_cycle_fails_the_build() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "main.bs", "import \"./a.bs\"");
    write(dir.path(), "a.bs", "import \"./b.bs\"");
    write(dir.path(), "b.bs", "import \"./a.bs\"");

    let err = build_project(dir.path(), &ProjectConfig::default()).unwrap_err();
    match err {
        BuildError::Resolve(ResolveError::CircularImport { cycle }) => {
            let names: Vec<_> = cycle
                .iter()
                .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
                .collect();
            assert_eq!(names, vec!["a.bs", "b.bs", "a.bs"]);
        }
        other => panic!("expected a cycle, got {other}"),
    }
    assert!(!dir.path().join("generated").exists());
}

#[test]
fn unbalanced_action_body_fails_the_build() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "main.bs", "do broken(input) {\n  if (input) {\n    return 1;\n");
    let err = build_project(dir.path(), &ProjectConfig::default()).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("main.bs"), "{message}");
    assert!(message.contains("never closed"), "{message}");
}
