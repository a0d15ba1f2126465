//! Plain-text adapters: concatenation, renaming and HTML tidying.

use std::path::PathBuf;

use super::types::{Transform, TransformError};
use crate::asset::{Asset, Bundle};

/// Merge every entry into one file, in bundle order.
#[derive(Debug, Clone)]
pub struct Concat {
    name: String,
    output: PathBuf,
}

impl Concat {
    pub fn new(output: impl Into<String>) -> Self {
        let output = output.into();
        Self { name: format!("concat:{}", output), output: PathBuf::from(output) }
    }
}

impl Transform for Concat {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, bundle: Bundle) -> Result<Bundle, TransformError> {
        if bundle.is_empty() {
            return Ok(bundle);
        }

        let mut contents = Vec::new();
        let mut origin = None;
        for (i, asset) in bundle.into_iter().enumerate() {
            if i > 0 {
                contents.push(b'\n');
            }
            if origin.is_none() {
                origin = asset.origin;
            }
            contents.extend_from_slice(&asset.contents);
        }

        let mut merged = Asset::new(self.output.clone(), contents);
        // The first source stands in for relative lookups in later transforms
        merged.origin = origin;
        Ok(std::iter::once(merged).collect())
    }
}

/// Swap every entry's extension.
#[derive(Debug, Clone)]
pub struct Rename {
    name: String,
    extension: String,
}

impl Rename {
    pub fn new(extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self { name: format!("rename:{}", extension), extension }
    }
}

impl Transform for Rename {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, bundle: Bundle) -> Result<Bundle, TransformError> {
        Ok(bundle
            .into_iter()
            .map(|mut asset| {
                asset.path.set_extension(&self.extension);
                asset
            })
            .collect())
    }
}

/// Normalise markup whitespace after template expansion.
///
/// Converts line endings to `\n`, strips trailing whitespace, collapses runs
/// of blank lines to one and ends the file with a single newline.
#[derive(Debug, Clone, Default)]
pub struct Beautify;

impl Beautify {
    pub fn new() -> Self {
        Self
    }
}

/// Tidy one document.
pub fn beautify_markup(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 || out.is_empty() {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }

    while out.ends_with("\n\n") {
        out.pop();
    }
    out
}

impl Transform for Beautify {
    fn name(&self) -> &str {
        "beautify"
    }

    fn apply(&self, bundle: Bundle) -> Result<Bundle, TransformError> {
        bundle.try_map(|asset| {
            let tidy = beautify_markup(&asset.text());
            Ok(asset.with_contents(tidy))
        })
    }
}
