//! Loading resource definitions from files and directories.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::CrdError;
use crate::internal::CustomResourceDefinition;

const EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Load every definition in a single file.
pub fn load_file(path: &Path) -> Result<Vec<CustomResourceDefinition>, CrdError> {
    let bytes = std::fs::read(path).map_err(|source| CrdError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    crate::load_all(&bytes).map_err(|e| CrdError::File {
        path: path.to_path_buf(),
        source: Box::new(e),
    })
}

/// Load every definition file below `dir`, in path order.
pub fn load_dir(dir: &Path) -> Result<Vec<CustomResourceDefinition>, CrdError> {
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry?;
        if entry.file_type().is_file() && has_definition_extension(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();

    let mut definitions = Vec::new();
    for file in &files {
        let loaded = load_file(file)?;
        debug!(path = %file.display(), count = loaded.len(), "Loaded resource definitions");
        definitions.extend(loaded);
    }
    Ok(definitions)
}

/// Load definitions from a list of files or directories.
///
/// Fails if a path does not exist or two documents share a name.
pub fn load_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<CustomResourceDefinition>, CrdError> {
    let mut definitions = Vec::new();

    for path in paths {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|source| CrdError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if metadata.is_dir() {
            definitions.extend(load_dir(path)?);
        } else {
            definitions.extend(load_file(path)?);
        }
    }

    let mut seen = BTreeSet::new();
    for crd in &definitions {
        if !seen.insert(crd.name.as_str()) {
            return Err(CrdError::Duplicate(crd.name.clone()));
        }
    }

    Ok(definitions)
}

fn has_definition_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.contains(&ext))
}
