//! Indented text listing of a project tree, used as spatial context in prompts.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Result, bail};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Extensions of compiled bytecode that never go into a listing.
const BYTECODE_EXTENSIONS: [&str; 3] = ["pyc", "pyo", "class"];

const INDENT: &str = "    ";

/// Render `root` as an indented tree.
///
/// ```text
/// /path/to/project
/// Files:
/// project/
///     main.go
///     pkg/
///         util.go
/// ```
///
/// Hidden entries (name starts with `.`) are skipped at every depth, along
/// with everything below a hidden directory. Compiled bytecode files are
/// skipped too. Entries are sorted by name within each directory.
pub fn describe_directory(root: &Path) -> Result<String> {
    if !root.is_dir() {
        bail!("describe {}: not a directory", root.display());
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", root.display());
    out.push_str("Files:\n");

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    let mut entries = 0usize;
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(err = %err, "skipping unreadable entry");
                continue;
            }
        };
        let indent = INDENT.repeat(entry.depth());
        if entry.file_type().is_dir() {
            let name = if entry.depth() == 0 {
                root_name(root)
            } else {
                entry.file_name().to_string_lossy().into_owned()
            };
            let _ = writeln!(out, "{indent}{name}/");
        } else if !is_bytecode(&entry) {
            let _ = writeln!(out, "{indent}{}", entry.file_name().to_string_lossy());
            entries += 1;
        }
    }

    debug!(root = %root.display(), files = entries, "described directory");
    Ok(out)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn is_bytecode(entry: &DirEntry) -> bool {
    entry
        .path()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| BYTECODE_EXTENSIONS.contains(&ext))
}

fn root_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string())
}
