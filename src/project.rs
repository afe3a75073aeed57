use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};

use serde::Serialize;
use tracing::info;

use crate::codegen::validate::lower_validation;
use crate::codegen::{emit, Artifacts};
use crate::dsl::ast::SyntaxTree;
use crate::dsl::resolver::resolve_modules;
use crate::error::BuildError;
use crate::paths;
use crate::settings::ProjectConfig;

// ── File helpers ────────────────────────────────────────────────────

/// Per-file mutex map to serialize concurrent writes to the same path.
static FILE_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = LazyLock::new(|| Mutex::new(HashMap::new()));

/// Atomically write bytes to a file using write-to-temp-then-rename.
///
/// 1. Acquires a per-file mutex so concurrent builds don't race on the `.tmp` file
/// 2. Writes data to a `.tmp` sibling file
/// 3. Calls `fsync` to flush to disk
/// 4. Renames the `.tmp` file over the target path
///
/// A failed build never leaves a half-written artifact behind.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let lock = file_lock(path)?;
    let _guard = lock.lock().map_err(|e| io::Error::other(e.to_string()))?;

    let tmp_path = write_tmp(path, data)?;
    fs::rename(&tmp_path, path)
}

/// Like [`atomic_write`] for several files at once: every `.tmp` sibling is
/// written and flushed before the first rename, so a failure while writing
/// leaves all targets untouched. Returns the path that failed.
pub fn atomic_write_all(files: &[(PathBuf, &[u8])]) -> Result<(), (PathBuf, io::Error)> {
    // Locks are taken in path order so concurrent callers cannot deadlock.
    let unique: BTreeSet<&PathBuf> = files.iter().map(|(path, _)| path).collect();
    let mut locks = Vec::with_capacity(unique.len());
    for path in &unique {
        locks.push(file_lock(path).map_err(|e| ((*path).clone(), e))?);
    }
    let mut guards = Vec::with_capacity(locks.len());
    for (lock, path) in locks.iter().zip(&unique) {
        guards.push(lock.lock().map_err(|e| ((*path).clone(), io::Error::other(e.to_string())))?);
    }

    let mut staged = Vec::with_capacity(files.len());
    for (path, data) in files {
        match write_tmp(path, data) {
            Ok(tmp_path) => staged.push((tmp_path, path)),
            Err(e) => {
                for (tmp_path, _) in &staged {
                    let _ = fs::remove_file(tmp_path);
                }
                return Err((path.clone(), e));
            }
        }
    }
    for (tmp_path, path) in staged {
        fs::rename(&tmp_path, path).map_err(|e| (path.clone(), e))?;
    }
    Ok(())
}

fn file_lock(path: &Path) -> io::Result<Arc<Mutex<()>>> {
    let mut locks = FILE_LOCKS.lock().map_err(|e| io::Error::other(e.to_string()))?;
    Ok(locks
        .entry(path.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone())
}

/// Write and fsync the `.tmp` sibling of `path`.
fn write_tmp(path: &Path, data: &[u8]) -> io::Result<PathBuf> {
    let tmp_path = paths::tmp_path(path);
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(tmp_path)
}

#[derive(Debug)]
pub enum JsonFileError {
    Io(io::Error),
    Json(serde_json::Error),
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, JsonFileError> {
    let data = fs::read_to_string(path).map_err(JsonFileError::Io)?;
    serde_json::from_str(&data).map_err(JsonFileError::Json)
}

// ── Build ───────────────────────────────────────────────────────────

/// What a build produced, for the CLI summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub schemas: usize,
    pub actions: usize,
    pub routes: usize,
    pub migrations: usize,
    pub files_written: Vec<PathBuf>,
}

/// Resolve the entry file and lower the merged tree, without touching disk.
pub fn compile_project(project_root: &Path, config: &ProjectConfig) -> Result<(SyntaxTree, Artifacts), BuildError> {
    let entry = project_root.join(&config.entry);
    let tree = resolve_modules(&entry, project_root)?;
    let artifacts = emit(&tree, &config.emit_options())?;
    Ok((tree, artifacts))
}

/// Compile the project and write its artifacts under the output directory.
/// Both artifacts are produced before anything is written, and replaced
/// together.
pub fn build_project(project_root: &Path, config: &ProjectConfig) -> Result<BuildReport, BuildError> {
    let (tree, artifacts) = compile_project(project_root, config)?;

    let out_dir = paths::out_dir(project_root, &config.out_dir);
    fs::create_dir_all(&out_dir).map_err(|source| BuildError::Write {
        path: out_dir.clone(),
        source,
    })?;

    let mut outputs = vec![(out_dir.join(&config.server_file), artifacts.server_source.as_bytes())];
    if config.emit_types {
        outputs.push((out_dir.join(&config.types_file), artifacts.type_declarations.as_bytes()));
    }

    atomic_write_all(&outputs).map_err(|(path, source)| BuildError::Write { path, source })?;
    let mut files_written = Vec::with_capacity(outputs.len());
    for (path, contents) in outputs {
        info!(path = %path.display(), bytes = contents.len(), "wrote artifact");
        files_written.push(path);
    }

    Ok(BuildReport {
        schemas: tree.schemas.len(),
        actions: tree.actions.len(),
        routes: tree.routes.len(),
        migrations: tree.migrations.len(),
        files_written,
    })
}

/// Run a schema's validator in-process over a JSON sample file. Returns the
/// sanitized record; a validation failure is reported as `BuildError::Sample`.
pub fn check_sample(
    tree: &SyntaxTree,
    schema_name: &str,
    sample: &Path,
) -> Result<serde_json::Map<String, serde_json::Value>, BuildError> {
    let schema = tree
        .schema(schema_name)
        .ok_or_else(|| BuildError::UnknownSchema(schema_name.to_string()))?;
    let plan = lower_validation(schema)?;
    let value: serde_json::Value = read_json(sample).map_err(|e| BuildError::Sample {
        path: sample.to_path_buf(),
        message: match e {
            JsonFileError::Io(e) => e.to_string(),
            JsonFileError::Json(e) => e.to_string(),
        },
    })?;
    plan.apply(&value).map_err(|failure| BuildError::Sample {
        path: sample.to_path_buf(),
        message: format!("{} ({})", failure.message, failure.status),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, text) in files {
            fs::write(dir.path().join(name), text).unwrap();
        }
        dir
    }

    #[test]
    fn atomic_write_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.js");
        atomic_write(&path, b"one").unwrap();
        atomic_write(&path, b"two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
        assert!(!paths::tmp_path(&path).exists());
    }

    #[test]
    fn failed_staging_leaves_every_target_untouched() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("server.js");
        let second = dir.path().join("types.d.ts");
        fs::write(&first, "old").unwrap();
        // A directory where the second temp file should go makes its write fail.
        fs::create_dir(paths::tmp_path(&second)).unwrap();

        let (failed, _) = atomic_write_all(&[(first.clone(), b"new".as_slice()), (second.clone(), b"new".as_slice())])
            .unwrap_err();
        assert_eq!(failed, second);
        assert_eq!(fs::read_to_string(&first).unwrap(), "old");
        assert!(!paths::tmp_path(&first).exists());
        assert!(!second.exists());
    }

    #[test]
    fn build_writes_both_artifacts() {
        let dir = project(&[(
            "main.bs",
            "data Task { title: String }\ndo list(input, ctx) { return []; }\nroute { GET \"/tasks\" => list }",
        )]);
        let report = build_project(dir.path(), &ProjectConfig::default()).unwrap();
        assert_eq!((report.schemas, report.actions, report.routes), (1, 1, 1));
        assert_eq!(report.files_written.len(), 2);
        let server = fs::read_to_string(dir.path().join("generated/server.js")).unwrap();
        assert!(server.contains("export function validateTask(input)"));
        assert!(dir.path().join("generated/types.d.ts").exists());
    }

    #[test]
    fn failed_build_writes_nothing() {
        let dir = project(&[("main.bs", "route { GET \"/x\" => missing }")]);
        let err = build_project(dir.path(), &ProjectConfig::default()).unwrap_err();
        assert!(matches!(err, BuildError::Emit(_)));
        assert!(!dir.path().join("generated").exists());
    }

    #[test]
    fn samples_are_validated_in_process() {
        let dir = project(&[
            ("main.bs", "data User { username: String(min: 3), role: Enum(admin|editor) }"),
            ("good.json", r#"{ "username": "abc", "role": "admin", "extra": 1 }"#),
            ("bad.json", r#"{ "username": "ab", "role": "admin" }"#),
        ]);
        let (tree, _) = compile_project(dir.path(), &ProjectConfig::default()).unwrap();

        let ok = check_sample(&tree, "User", &dir.path().join("good.json")).unwrap();
        assert_eq!(ok.len(), 2);

        let err = check_sample(&tree, "User", &dir.path().join("bad.json")).unwrap_err();
        assert!(err.to_string().contains("username is too short (min 3) (400)"));

        let err = check_sample(&tree, "Nope", &dir.path().join("good.json")).unwrap_err();
        assert!(matches!(err, BuildError::UnknownSchema(_)));
    }

    #[test]
    fn types_can_be_skipped() {
        let dir = project(&[("main.bs", "data Task { title: String }")]);
        let config = ProjectConfig {
            emit_types: false,
            ..ProjectConfig::default()
        };
        let report = build_project(dir.path(), &config).unwrap();
        assert_eq!(report.files_written.len(), 1);
        assert!(!dir.path().join("generated/types.d.ts").exists());
    }
}
