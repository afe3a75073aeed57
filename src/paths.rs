//! Centralized path definitions for project files and build outputs.
//!
//! This module is the single source of truth for leaf filenames and directory
//! names. No other module should hard-code these strings.

use std::path::{Path, PathBuf};

// ── Leaf filenames ───────────────────────────────────────────────

pub const CONFIG_FILE: &str = "blocksmith.json";
pub const DEFAULT_ENTRY_FILE: &str = "main.bs";
pub const DEFAULT_SERVER_FILE: &str = "server.js";
pub const DEFAULT_TYPES_FILE: &str = "types.d.ts";

/// Extension of DSL sources, without the dot.
pub const SOURCE_EXTENSION: &str = "bs";

// ── Directory names ──────────────────────────────────────────────

pub const DEFAULT_OUT_DIR: &str = "generated";

/// Suffix for the temporary sibling used by atomic writes.
pub const TMP_SUFFIX: &str = "tmp";

// ── Project-root functions ───────────────────────────────────────

pub fn config_path(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_FILE)
}

pub fn out_dir(project_root: &Path, out_dir: &Path) -> PathBuf {
    project_root.join(out_dir)
}

pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(TMP_SUFFIX);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tmp_path_keeps_extension() {
        assert_eq!(tmp_path(Path::new("out/server.js")), PathBuf::from("out/server.js.tmp"));
    }
}
