//! Destination targets.
//!
//! A destination target is a named output directory. Several steps may write
//! into the same target; a later write to the same path replaces the earlier
//! one.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::asset::Bundle;

/// Named output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationTarget {
    /// Human-readable name (e.g., "css")
    pub name: String,
    /// Absolute directory written to
    pub dir: PathBuf,
}

/// A failed destination write.
#[derive(Debug)]
pub struct WriteFailure {
    pub path: PathBuf,
    pub source: io::Error,
}

impl DestinationTarget {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), dir: dir.into() }
    }

    /// Where an entry with this relative path lands.
    ///
    /// Parent and root components are dropped so entries cannot escape the
    /// target directory.
    pub fn output_path(&self, relative: &Path) -> PathBuf {
        let mut out = self.dir.clone();
        for component in relative.components() {
            if let Component::Normal(part) = component {
                out.push(part);
            }
        }
        out
    }

    /// Write every bundle entry, creating directories as needed.
    ///
    /// Returns the written paths in bundle order.
    pub fn write(&self, bundle: &Bundle) -> Result<Vec<PathBuf>, WriteFailure> {
        let mut written = Vec::with_capacity(bundle.len());
        for asset in bundle.entries() {
            let path = self.output_path(&asset.path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|source| WriteFailure { path: parent.to_path_buf(), source })?;
            }
            fs::write(&path, &asset.contents)
                .map_err(|source| WriteFailure { path: path.clone(), source })?;
            written.push(path);
        }
        Ok(written)
    }
}

impl std::fmt::Display for DestinationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.dir.display())
    }
}
