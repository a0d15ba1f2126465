//! Build result types.
//!
//! Contains types for representing the outcome of build operations.

use std::path::PathBuf;
use std::time::Duration;

use super::error::{AggregateError, StepError};

/// Status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Step ran and wrote its outputs
    Success,
    /// No source matched; nothing was written
    Empty,
    /// Step failed
    Failed,
    /// Step did not run because an earlier fatal error aborted the run
    Skipped,
}

impl StepStatus {
    /// Check if the status indicates success.
    pub fn is_success(&self) -> bool {
        matches!(self, StepStatus::Success | StepStatus::Empty)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Success => write!(f, "success"),
            StepStatus::Empty => write!(f, "empty"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// What a successful step run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    /// Number of source files matched
    pub sources: usize,
    /// Files written, in bundle order
    pub written: Vec<PathBuf>,
}

impl StepOutput {
    pub fn is_empty(&self) -> bool {
        self.sources == 0
    }
}

/// Result of running a single step.
#[derive(Debug)]
pub struct StepResult {
    /// Step name
    pub step: String,
    pub status: StepStatus,
    /// Output files produced
    pub outputs: Vec<PathBuf>,
    pub duration: Duration,
    /// Failure, when `status` is `Failed`
    pub error: Option<StepError>,
}

impl StepResult {
    /// Build a result from a step run.
    pub fn from_run(step: String, run: Result<StepOutput, StepError>, duration: Duration) -> Self {
        match run {
            Ok(output) => Self {
                step,
                status: if output.is_empty() { StepStatus::Empty } else { StepStatus::Success },
                outputs: output.written,
                duration,
                error: None,
            },
            Err(error) => Self {
                step,
                status: StepStatus::Failed,
                outputs: vec![],
                duration,
                error: Some(error),
            },
        }
    }

    /// A step that never ran.
    pub fn skipped(step: String) -> Self {
        Self {
            step,
            status: StepStatus::Skipped,
            outputs: vec![],
            duration: Duration::ZERO,
            error: None,
        }
    }

    /// Check if this result is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Result of a complete graph run.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// One result per step, in declared order
    pub results: Vec<StepResult>,
    /// Total build duration
    pub total_duration: Duration,
    /// Whether a fatal error stopped the run early
    pub aborted: bool,
}

impl BuildReport {
    /// Create a new empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step result.
    pub fn add_result(&mut self, result: StepResult) {
        self.results.push(result);
    }

    fn count(&self, status: StepStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn success_count(&self) -> usize {
        self.count(StepStatus::Success)
    }

    pub fn empty_count(&self) -> usize {
        self.count(StepStatus::Empty)
    }

    pub fn failed_count(&self) -> usize {
        self.count(StepStatus::Failed)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(StepStatus::Skipped)
    }

    /// Check if the overall run succeeded (no failures, not aborted).
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0 && !self.aborted
    }

    /// Whether any failure is fatal.
    pub fn is_fatal(&self) -> bool {
        self.errors().any(StepError::is_fatal)
    }

    /// Get all outputs produced.
    pub fn all_outputs(&self) -> Vec<&PathBuf> {
        self.results.iter().flat_map(|r| r.outputs.iter()).collect()
    }

    /// Step errors, in declared order.
    pub fn errors(&self) -> impl Iterator<Item = &StepError> {
        self.results.iter().filter_map(|r| r.error.as_ref())
    }

    /// Get failed step results.
    pub fn failures(&self) -> Vec<&StepResult> {
        self.results.iter().filter(|r| r.status == StepStatus::Failed).collect()
    }

    /// Convert into `Ok(self)` when nothing failed.
    pub fn into_result(mut self) -> Result<Self, AggregateError> {
        let errors: Vec<StepError> =
            self.results.iter_mut().filter_map(|r| r.error.take()).collect();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(AggregateError::new(errors))
        }
    }

    /// Format a summary of the run.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        let success = self.success_count();
        let empty = self.empty_count();
        let failed = self.failed_count();
        let skipped = self.skipped_count();
        let total = self.results.len();

        if self.is_success() {
            lines.push(format!(
                "Build succeeded: {} built, {} empty ({} total) in {:?}",
                success, empty, total, self.total_duration
            ));
        } else {
            lines.push(format!(
                "Build failed: {} succeeded, {} empty, {} failed, {} skipped ({} total)",
                success, empty, failed, skipped, total
            ));
            for result in self.failures() {
                if let Some(error) = &result.error {
                    lines.push(format!("  - {}", error));
                }
            }
            if self.aborted {
                lines.push("  Run aborted after a fatal error".to_string());
            }
        }

        lines.join("\n")
    }
}
