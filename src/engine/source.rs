//! Where handler manifests come from.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::LoadError;

/// Identifier of one loadable unit (for directories, the file name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A bare file name: no separators, no `.` or `..`.
    pub fn is_plain(&self) -> bool {
        Path::new(&self.0).file_name().and_then(|n| n.to_str()) == Some(self.0.as_str())
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A set of handler manifests addressable by unit id.
pub trait HandlerSource: Send + Sync {
    /// All units currently present, sorted.
    fn units(&self) -> Result<Vec<UnitId>, LoadError>;

    /// Manifest text of one unit; [`LoadError::NotFound`] if it is gone.
    fn read(&self, unit: &UnitId) -> Result<String, LoadError>;

    /// Map a changed filesystem path back to its unit, if it is one.
    fn unit_for_path(&self, _path: &Path) -> Option<UnitId> {
        None
    }

    /// Directory to watch for changes, if the source lives on disk.
    fn watch_root(&self) -> Option<&Path> {
        None
    }
}

/// One `*.toml` manifest per unit in a flat directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn is_manifest(path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "toml")
    }
}

impl HandlerSource for DirectorySource {
    fn units(&self) -> Result<Vec<UnitId>, LoadError> {
        let mut units = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() || !Self::is_manifest(&path) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                units.push(UnitId::new(name));
            }
        }
        units.sort();
        Ok(units)
    }

    fn read(&self, unit: &UnitId) -> Result<String, LoadError> {
        // Units never leave the handlers directory.
        if !unit.is_plain() {
            return Err(LoadError::NotFound { unit: unit.clone() });
        }
        match std::fs::read_to_string(self.dir.join(unit.as_str())) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(LoadError::NotFound { unit: unit.clone() }),
            Err(e) => Err(LoadError::Io(e)),
        }
    }

    fn unit_for_path(&self, path: &Path) -> Option<UnitId> {
        if !Self::is_manifest(path) {
            return None;
        }
        path.file_name()
            .and_then(|n| n.to_str())
            .map(UnitId::new)
    }

    fn watch_root(&self) -> Option<&Path> {
        Some(&self.dir)
    }
}
