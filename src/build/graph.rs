//! Build graphs: ordered sequences of steps and parallel step sets.
//!
//! Ordering is declared, never inferred. Entries run top to bottom and each
//! entry finishes completely before the next starts.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use super::error::AggregateError;
use super::parallel::{run_parallel, run_step};
use super::progress::{ProgressEvent, ProgressReporter};
use super::result::{BuildReport, StepResult};
use super::step::PipelineStep;

/// One entry of a graph.
#[derive(Debug, Clone)]
pub enum GraphEntry {
    Step(Arc<PipelineStep>),
    /// Steps with no ordering between them
    Parallel(Vec<Arc<PipelineStep>>),
}

impl GraphEntry {
    /// Steps in this entry, in declared order.
    pub fn steps(&self) -> &[Arc<PipelineStep>] {
        match self {
            GraphEntry::Step(step) => std::slice::from_ref(step),
            GraphEntry::Parallel(steps) => steps,
        }
    }
}

/// An ordered sequence of graph entries.
#[derive(Debug, Clone, Default)]
pub struct BuildGraph {
    entries: Vec<GraphEntry>,
}

impl BuildGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// A graph with a single step.
    pub fn single(step: Arc<PipelineStep>) -> Self {
        Self { entries: vec![GraphEntry::Step(step)] }
    }

    pub fn from_entries(entries: Vec<GraphEntry>) -> Self {
        Self { entries }
    }

    /// Append a sequential step.
    pub fn then(mut self, step: Arc<PipelineStep>) -> Self {
        self.entries.push(GraphEntry::Step(step));
        self
    }

    /// Append a parallel set.
    pub fn then_parallel(mut self, steps: Vec<Arc<PipelineStep>>) -> Self {
        self.entries.push(GraphEntry::Parallel(steps));
        self
    }

    /// Append another graph's entries.
    pub fn extend(&mut self, other: BuildGraph) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[GraphEntry] {
        &self.entries
    }

    /// Every step, in declared order.
    pub fn steps(&self) -> impl Iterator<Item = &Arc<PipelineStep>> {
        self.entries.iter().flat_map(GraphEntry::steps)
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps().map(|s| s.name()).collect()
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.steps().any(|s| s.name() == name)
    }

    /// Concatenate two graphs, dropping steps already present.
    ///
    /// Parallel sets emptied by deduplication disappear; a set left with one
    /// member becomes a plain step.
    pub fn union(&self, other: &BuildGraph) -> BuildGraph {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for entry in self.entries.iter().chain(&other.entries) {
            let fresh: Vec<Arc<PipelineStep>> = entry
                .steps()
                .iter()
                .filter(|s| seen.insert(s.name().to_string()))
                .cloned()
                .collect();
            match (entry, fresh.len()) {
                (_, 0) => {}
                (GraphEntry::Step(_), _) | (GraphEntry::Parallel(_), 1) => {
                    entries.extend(fresh.into_iter().map(GraphEntry::Step));
                }
                (GraphEntry::Parallel(_), _) => entries.push(GraphEntry::Parallel(fresh)),
            }
        }

        BuildGraph { entries }
    }

    /// Run every entry, collecting one result per step.
    ///
    /// Non-fatal failures never stop the run. A fatal failure lets the
    /// current entry finish, then marks every later step skipped.
    pub fn execute(&self, progress: &dyn ProgressReporter) -> BuildReport {
        let start = Instant::now();
        let mut report = BuildReport::new();
        progress.report(ProgressEvent::BuildStarted { total_steps: self.len() });

        for entry in &self.entries {
            if report.aborted {
                for step in entry.steps() {
                    report.add_result(StepResult::skipped(step.name().to_string()));
                }
                continue;
            }

            let results = match entry {
                GraphEntry::Step(step) => vec![run_step(step, progress)],
                GraphEntry::Parallel(steps) => run_parallel(steps, progress),
            };

            let fatal = results.iter().filter_map(|r| r.error.as_ref()).find(|e| e.is_fatal());
            if let Some(error) = fatal {
                tracing::error!("aborting run: {}", error);
                progress.report(ProgressEvent::Error {
                    step: Some(error.step().to_string()),
                    message: format!("aborting run: {}", error),
                });
                report.aborted = true;
            }

            for result in results {
                report.add_result(result);
            }
        }

        report.total_duration = start.elapsed();
        progress.report(ProgressEvent::BuildCompleted {
            success: report.is_success(),
            duration_ms: report.total_duration.as_millis() as u64,
            succeeded: report.success_count(),
            empty: report.empty_count(),
            failed: report.failed_count(),
            skipped: report.skipped_count(),
        });
        report
    }

    /// Run every entry and fail with every step error collected.
    pub fn run(&self, progress: &dyn ProgressReporter) -> Result<BuildReport, AggregateError> {
        self.execute(progress).into_result()
    }
}
