//! Multi-file loading: follows `import` declarations from an entry file,
//! rejects cycles and merges every file's declarations into one tree.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::ast::{HttpVerb, SyntaxTree};
use super::error::SyntaxError;
use super::parser::parse;
use crate::paths::SOURCE_EXTENSION;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("[resolver] circular import: {}", DisplayCycle(cycle))]
    CircularImport { cycle: Vec<PathBuf> },

    #[error("[resolver] {}: cannot resolve import \"{import}\" (looked for {})", from.display(), resolved.display())]
    UnresolvedImport {
        from: PathBuf,
        import: String,
        resolved: PathBuf,
    },

    #[error("[resolver] failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: {}", path.display(), error.format_with_source(source_text))]
    Parse {
        path: PathBuf,
        error: SyntaxError,
        source_text: String,
    },
}

struct DisplayCycle<'a>(&'a [PathBuf]);

impl fmt::Display for DisplayCycle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, path) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}", path.display())?;
        }
        Ok(())
    }
}

/// Load `entry` and everything it imports, then merge into one tree.
///
/// Relative imports resolve against the importing file's directory; imports
/// starting with `/` resolve against `root`. An import without an extension
/// gets `.bs` appended. Duplicate schema and action names, and duplicate
/// `(verb, path)` routes, keep the first declaration in load order (the
/// importing file's own declarations before its imports, imports in source
/// order). Migrations are concatenated.
pub fn resolve_modules(entry: &Path, root: &Path) -> Result<SyntaxTree, ResolveError> {
    let mut loader = Loader {
        root,
        loading: Vec::new(),
        resolved: HashMap::new(),
        order: Vec::new(),
    };
    let entry = loader.canonical(entry, None, None)?;
    loader.load(&entry)?;

    let merged = merge(loader.order.iter().filter_map(|p| loader.resolved.get(p).map(|t| (p, t))));
    info!(
        files = loader.order.len(),
        schemas = merged.schemas.len(),
        actions = merged.actions.len(),
        routes = merged.routes.len(),
        migrations = merged.migrations.len(),
        "resolved modules"
    );
    Ok(merged)
}

struct Loader<'a> {
    root: &'a Path,
    /// Files currently being loaded, entry first.
    loading: Vec<PathBuf>,
    resolved: HashMap<PathBuf, SyntaxTree>,
    /// Pre-order of first visits.
    order: Vec<PathBuf>,
}

impl Loader<'_> {
    fn load(&mut self, path: &Path) -> Result<(), ResolveError> {
        if let Some(start) = self.loading.iter().position(|p| p == path) {
            let mut cycle: Vec<PathBuf> = self.loading.iter().skip(start).cloned().collect();
            cycle.push(path.to_path_buf());
            return Err(ResolveError::CircularImport { cycle });
        }
        if self.resolved.contains_key(path) {
            return Ok(());
        }

        debug!(path = %path.display(), "loading module");
        let source_text = std::fs::read_to_string(path).map_err(|source| ResolveError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let tree = parse(&source_text).map_err(|error| ResolveError::Parse {
            path: path.to_path_buf(),
            error,
            source_text: source_text.clone(),
        })?;

        self.loading.push(path.to_path_buf());
        self.order.push(path.to_path_buf());
        for import in &tree.imports {
            let target = self.canonical(Path::new(&import.path), Some(path), Some(&import.path))?;
            self.load(&target)?;
        }
        self.loading.pop();

        self.resolved.insert(path.to_path_buf(), tree);
        Ok(())
    }

    /// Normalised absolute path of an import (or of the entry when `from` is
    /// `None`). A missing file is an unresolved import.
    fn canonical(&self, raw: &Path, from: Option<&Path>, import: Option<&str>) -> Result<PathBuf, ResolveError> {
        let mut candidate = match (from, import) {
            (Some(_), Some(text)) if text.starts_with('/') => self.root.join(text.trim_start_matches('/')),
            (Some(from), _) => from.parent().unwrap_or_else(|| Path::new(".")).join(raw),
            (None, _) => raw.to_path_buf(),
        };
        if candidate.extension().is_none() {
            candidate.set_extension(SOURCE_EXTENSION);
        }

        match candidate.canonicalize() {
            Ok(path) => Ok(path),
            Err(source) if source.kind() == io::ErrorKind::NotFound => match (from, import) {
                (Some(from), Some(import)) => Err(ResolveError::UnresolvedImport {
                    from: from.to_path_buf(),
                    import: import.to_string(),
                    resolved: candidate,
                }),
                _ => Err(ResolveError::Io { path: candidate, source }),
            },
            Err(source) => Err(ResolveError::Io { path: candidate, source }),
        }
    }
}

/// Merge trees in the given order, first declaration of each key wins.
fn merge<'a>(trees: impl Iterator<Item = (&'a PathBuf, &'a SyntaxTree)>) -> SyntaxTree {
    let mut merged = SyntaxTree::default();
    let mut schema_names = HashSet::new();
    let mut action_names = HashSet::new();
    let mut route_keys: HashSet<(HttpVerb, &str)> = HashSet::new();

    for (path, tree) in trees {
        for schema in &tree.schemas {
            if schema_names.insert(schema.name.clone()) {
                merged.schemas.push(schema.clone());
            } else {
                warn!(file = %path.display(), schema = %schema.name, "duplicate schema ignored");
            }
        }
        for action in &tree.actions {
            if action_names.insert(action.name.clone()) {
                merged.actions.push(action.clone());
            } else {
                warn!(file = %path.display(), action = %action.name, "duplicate action ignored");
            }
        }
        for route in &tree.routes {
            if route_keys.insert(route.key()) {
                merged.routes.push(route.clone());
            } else {
                warn!(file = %path.display(), route = %format!("{} {}", route.verb, route.path), "duplicate route ignored");
            }
        }
        merged.migrations.extend(tree.migrations.iter().cloned());
    }

    merged
}
