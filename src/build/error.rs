//! Build error taxonomy.
//!
//! Failures are local first: a [`StepError`] marks one step failed and the
//! rest of the graph keeps going. Only configuration errors (bad pattern) and
//! destination write failures are fatal.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::transforms::TransformError;

/// A task name was not registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown task '{name}'")]
pub struct UnknownTaskError {
    pub name: String,
}

impl UnknownTaskError {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

fn join_errors(errors: &[TransformError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Why a single pipeline step failed.
#[derive(Debug, Error)]
pub enum StepError {
    /// One or more transforms failed
    #[error("{step}: {}", join_errors(.errors))]
    Transform { step: String, errors: Vec<TransformError> },

    /// A matched source file could not be read
    #[error("{step}: cannot read {}: {source}", .path.display())]
    Source {
        step: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A source pattern does not compile
    #[error("{step}: invalid pattern '{pattern}': {message}")]
    Pattern { step: String, pattern: String, message: String },

    /// The destination could not be written
    #[error("{step}: cannot write {}: {source}", .path.display())]
    Destination {
        step: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StepError {
    /// Name of the failing step.
    pub fn step(&self) -> &str {
        match self {
            StepError::Transform { step, .. }
            | StepError::Source { step, .. }
            | StepError::Pattern { step, .. }
            | StepError::Destination { step, .. } => step,
        }
    }

    /// Whether this failure must abort the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StepError::Pattern { .. } | StepError::Destination { .. })
    }

    /// Source files implicated in this failure.
    pub fn files(&self) -> Vec<PathBuf> {
        match self {
            StepError::Transform { errors, .. } => {
                errors.iter().filter_map(|e| e.path.clone()).collect()
            }
            StepError::Source { path, .. } => vec![path.clone()],
            StepError::Pattern { .. } | StepError::Destination { .. } => vec![],
        }
    }
}

fn describe(errors: &[StepError]) -> String {
    let mut text = format!(
        "{} step{} failed:",
        errors.len(),
        if errors.len() == 1 { "" } else { "s" }
    );
    for error in errors {
        text.push_str(&format!("\n  - {}", error));
    }
    text
}

/// Every step failure of one graph run.
#[derive(Debug, Error)]
#[error("{}", describe(.errors))]
pub struct AggregateError {
    pub errors: Vec<StepError>,
}

impl AggregateError {
    pub fn new(errors: Vec<StepError>) -> Self {
        Self { errors }
    }

    /// Whether any collected failure is fatal.
    pub fn is_fatal(&self) -> bool {
        self.errors.iter().any(StepError::is_fatal)
    }
}
