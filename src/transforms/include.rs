//! Partial inclusion for HTML pages
//!
//! Supports the `@@include('path')` directive, optionally with a JSON context:
//! `@@include('header.html', {"title": "About"})`. Context values replace
//! `@@key` markers inside the included file. Paths are resolved against the
//! partials directory first, then the including file's directory.

use regex::{Captures, Regex};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

use super::types::{Transform, TransformError};
use crate::asset::Bundle;

/// Nesting limit for includes inside includes
const MAX_INCLUDE_DEPTH: usize = 32;

/// Error type for include resolution failures.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum IncludeError {
    /// Circular include detected
    #[error("Circular include detected: {}", .0.display())]
    CircularInclude(PathBuf),
    /// File not found in any search directory
    #[error("Include file not found: {0}")]
    FileNotFound(String),
    /// Context argument was not a JSON object
    #[error("Invalid include context for '{0}': {1}")]
    InvalidContext(String, String),
    /// IO error reading file
    #[error("Error reading include file '{}': {1}", .0.display())]
    IoError(PathBuf, String),
    /// Too many nested includes
    #[error("Includes nested deeper than {} levels", MAX_INCLUDE_DEPTH)]
    TooDeep,
}

fn include_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"@@include\(\s*(?:'([^']*)'|"([^"]*)")\s*(?:,\s*(\{(?s:.*?)\}))?\s*\)"#,
        )
        .expect("include directive pattern is valid")
    })
}

/// Template includer adapter.
#[derive(Debug, Clone)]
pub struct FileInclude {
    partials: PathBuf,
}

impl FileInclude {
    /// Create an includer resolving paths against `partials`.
    pub fn new(partials: impl Into<PathBuf>) -> Self {
        Self { partials: partials.into() }
    }

    /// Find an include target.
    fn locate(&self, include: &str, current_dir: Option<&Path>) -> Option<PathBuf> {
        let mut candidates = vec![self.partials.join(include)];
        if let Some(dir) = current_dir {
            candidates.push(dir.join(include));
        }
        candidates.into_iter().find(|p| p.is_file())
    }

    /// Expand every directive in `text`.
    ///
    /// `stack` holds the files currently being expanded, outermost first.
    pub fn expand(
        &self,
        text: &str,
        current_dir: Option<&Path>,
        stack: &mut Vec<PathBuf>,
    ) -> Result<String, IncludeError> {
        if stack.len() > MAX_INCLUDE_DEPTH {
            return Err(IncludeError::TooDeep);
        }

        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for caps in include_pattern().captures_iter(text) {
            let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
            out.push_str(&text[last..whole.start]);
            last = whole.end;

            let include = directive_path(&caps);
            let found = self
                .locate(include, current_dir)
                .ok_or_else(|| IncludeError::FileNotFound(include.to_string()))?;

            if stack.contains(&found) {
                return Err(IncludeError::CircularInclude(found));
            }

            let mut body = fs::read_to_string(&found)
                .map_err(|e| IncludeError::IoError(found.clone(), e.to_string()))?;

            if let Some(context) = caps.get(3) {
                body = apply_context(&body, include, context.as_str())?;
            }

            stack.push(found.clone());
            let expanded = self.expand(&body, found.parent(), stack)?;
            stack.pop();

            out.push_str(&expanded);
        }

        out.push_str(&text[last..]);
        Ok(out)
    }
}

fn directive_path<'t>(caps: &Captures<'t>) -> &'t str {
    caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or_default()
}

/// Replace `@@key` markers with values from a JSON object.
fn apply_context(body: &str, include: &str, context: &str) -> Result<String, IncludeError> {
    let value: Value = serde_json::from_str(context)
        .map_err(|e| IncludeError::InvalidContext(include.to_string(), e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(IncludeError::InvalidContext(
            include.to_string(),
            "expected a JSON object".to_string(),
        ));
    };

    // Longest keys first so `@@title` does not clobber `@@titleSuffix`
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort_by_key(|k| std::cmp::Reverse(k.len()));

    let mut result = body.to_string();
    for key in keys {
        let replacement = match &map[key.as_str()] {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        result = result.replace(&format!("@@{}", key), &replacement);
    }
    Ok(result)
}

impl Transform for FileInclude {
    fn name(&self) -> &str {
        "file_include"
    }

    fn apply(&self, bundle: Bundle) -> Result<Bundle, TransformError> {
        bundle.try_map(|asset| {
            let mut stack: Vec<PathBuf> = asset.origin.iter().cloned().collect();
            let expanded = self
                .expand(&asset.text(), asset.base_dir(), &mut stack)
                .map_err(|e| TransformError::new("file_include", e.to_string()).at(&asset.path))?;
            Ok(asset.with_contents(expanded))
        })
    }
}
