//! Where the decompiler leaves each object's artifacts.

use std::fs;
use std::path::{Path, PathBuf};

use crate::facts::FactsError;

/// Artifact paths the decompiler leaves for one object file.
///
/// This is derived from the work directory and the object path. It does *not*
/// perform any IO itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLayout {
    /// Module name (the object's file name, e.g. `crypto.o`).
    pub name: String,
    /// The object file the artifacts were produced from.
    pub object_path: PathBuf,
    /// Work directory holding the decompiler outputs.
    pub bb_dir: PathBuf,
    /// Structural call graph (`<obj>.c.cg.dot`).
    pub call_graph_path: PathBuf,
    /// Module facts (`<obj>.config.json`).
    pub facts_path: PathBuf,
    /// Optional global-reference facts (`<obj>.refs.json`).
    pub references_path: PathBuf,
}

impl ModuleLayout {
    pub fn new(bb_dir: impl AsRef<Path>, object_path: impl AsRef<Path>) -> Self {
        let bb_dir = bb_dir.as_ref().to_path_buf();
        let object_path = object_path.as_ref().to_path_buf();
        let name = Self::module_name(&object_path);
        let base = bb_dir.join(&name);
        let with_suffix = |suffix: &str| PathBuf::from(format!("{}{suffix}", base.display()));

        Self {
            call_graph_path: with_suffix(".c.cg.dot"),
            facts_path: with_suffix(".config.json"),
            references_path: with_suffix(".refs.json"),
            name,
            object_path,
            bb_dir,
        }
    }

    /// Name the artifacts of `object_path` are keyed by: its file name.
    pub fn module_name(object_path: &Path) -> String {
        object_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| object_path.display().to_string())
    }
}

/// Collect `*.o` files from the given directories, sorted by path.
pub fn discover_objects(dirs: &[PathBuf]) -> Result<Vec<PathBuf>, FactsError> {
    let mut objects = Vec::new();
    for dir in dirs {
        let entries =
            fs::read_dir(dir).map_err(|source| FactsError::Io { path: dir.clone(), source })?;
        for entry in entries {
            let entry = entry.map_err(|source| FactsError::Io { path: dir.clone(), source })?;
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("o") {
                objects.push(path);
            }
        }
    }
    objects.sort();
    Ok(objects)
}
