//! Core transform types and error definitions
//!
//! Every external tool the pipeline drives is adapted to the single
//! [`Transform`] shape: a bundle in, a bundle out.

use std::path::PathBuf;

use crate::asset::Bundle;

/// Errors from parsing a transform identifier such as `concat:style.css`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SpecError {
    /// Unknown transform operation
    #[error("unknown transform operation: {0}")]
    UnknownOperation(String),

    /// Invalid parameter value
    #[error("invalid parameter for {op}: {message}")]
    InvalidParameter { op: String, message: String },

    /// Missing required parameter
    #[error("missing required parameter for {op}: {param}")]
    MissingParameter { op: String, param: String },
}

/// One tool failed on one bundle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{transform}: {}{message}", path_prefix(.path))]
pub struct TransformError {
    /// Identifier of the failing transform
    pub transform: String,
    /// Entry being processed when the failure happened, if known
    pub path: Option<PathBuf>,
    pub message: String,
}

fn path_prefix(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!("{}: ", p.display()),
        None => String::new(),
    }
}

impl TransformError {
    pub fn new(transform: impl Into<String>, message: impl Into<String>) -> Self {
        Self { transform: transform.into(), path: None, message: message.into() }
    }

    /// Attach the entry path the error refers to.
    pub fn at(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Capability interface implemented by every tool adapter.
pub trait Transform: Send + Sync {
    /// Identifier used in logs and errors
    fn name(&self) -> &str;

    /// Transform a bundle. May merge, rename, add or drop entries.
    fn apply(&self, bundle: Bundle) -> Result<Bundle, TransformError>;
}

impl std::fmt::Debug for dyn Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Transform({})", self.name())
    }
}
