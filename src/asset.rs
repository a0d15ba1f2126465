//! In-memory file bundles flowing through transform chains.

use std::path::{Path, PathBuf};

/// One file in a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Output path relative to the step's destination
    pub path: PathBuf,
    /// File contents
    pub contents: Vec<u8>,
    /// Absolute source file this entry was read from, if any
    pub origin: Option<PathBuf>,
}

impl Asset {
    /// Create an entry with no source file.
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self { path: path.into(), contents: contents.into(), origin: None }
    }

    /// Create an entry read from `origin`.
    pub fn from_source(
        path: impl Into<PathBuf>,
        contents: impl Into<Vec<u8>>,
        origin: impl Into<PathBuf>,
    ) -> Self {
        Self { path: path.into(), contents: contents.into(), origin: Some(origin.into()) }
    }

    /// Contents as text, replacing invalid UTF-8.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.contents)
    }

    /// Lowercased file extension.
    pub fn extension(&self) -> Option<String> {
        self.path.extension().map(|e| e.to_string_lossy().to_lowercase())
    }

    /// Directory used to resolve relative references in this file.
    pub fn base_dir(&self) -> Option<&Path> {
        self.origin.as_deref().and_then(Path::parent)
    }

    /// Whether the file name marks a Sass-style partial (`_name.scss`).
    pub fn is_partial(&self) -> bool {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with('_'))
            .unwrap_or(false)
    }

    /// Replace the contents, keeping path and origin.
    pub fn with_contents(mut self, contents: impl Into<Vec<u8>>) -> Self {
        self.contents = contents.into();
        self
    }
}

/// An ordered list of assets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle {
    entries: Vec<Asset>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, asset: Asset) {
        self.entries.push(asset);
    }

    pub fn entries(&self) -> &[Asset] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Asset> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by its relative path.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<&Asset> {
        let path = path.as_ref();
        self.entries.iter().find(|a| a.path == path)
    }

    /// Apply a fallible function to every entry, keeping order.
    pub fn try_map<E>(self, mut f: impl FnMut(Asset) -> Result<Asset, E>) -> Result<Self, E> {
        let entries = self.entries.into_iter().map(&mut f).collect::<Result<Vec<_>, E>>()?;
        Ok(Self { entries })
    }
}

impl FromIterator<Asset> for Bundle {
    fn from_iter<I: IntoIterator<Item = Asset>>(iter: I) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

impl IntoIterator for Bundle {
    type Item = Asset;
    type IntoIter = std::vec::IntoIter<Asset>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
