//! Step execution, alone or as a concurrent set.
//!
//! Members of a parallel set run on the rayon pool; the call returns only
//! when every member has finished, which is the join barrier between graph
//! entries. Results keep declaration order regardless of completion order.

use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;

use super::progress::{ProgressEvent, ProgressReporter};
use super::result::StepResult;
use super::step::PipelineStep;

/// Run one step, reporting its start and outcome.
pub fn run_step(step: &PipelineStep, progress: &dyn ProgressReporter) -> StepResult {
    progress.report(ProgressEvent::StepStarted { step: step.name().to_string() });
    let start = Instant::now();
    let run = step.run();
    let duration = start.elapsed();

    if let Err(e) = &run {
        if e.is_fatal() {
            tracing::error!("{}", e);
        } else {
            tracing::warn!("{}", e);
        }
    }

    let result = StepResult::from_run(step.name().to_string(), run, duration);
    progress.report(ProgressEvent::StepCompleted {
        step: result.step.clone(),
        status: result.status,
        outputs: result.outputs.len(),
        duration_ms: duration.as_millis() as u64,
        error: result.error.as_ref().map(ToString::to_string),
    });
    result
}

/// Run a set of steps concurrently and wait for all of them.
///
/// Failures never cancel siblings.
pub fn run_parallel(steps: &[Arc<PipelineStep>], progress: &dyn ProgressReporter) -> Vec<StepResult> {
    match steps {
        [] => vec![],
        [single] => vec![run_step(single, progress)],
        _ => steps.par_iter().map(|step| run_step(step, progress)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::discovery::SourceSet;
    use crate::build::progress::NullProgress;
    use crate::build::result::StepStatus;
    use crate::build::target::DestinationTarget;
    use crate::transforms::MinifyJs;
    use std::fs;
    use std::io;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn copy_step(root: &std::path::Path, name: &str, pattern: &str) -> Arc<PipelineStep> {
        Arc::new(
            PipelineStep::new(
                name,
                SourceSet::new(name, root.join("src"), [pattern]),
                DestinationTarget::new("out", root.join("dest").join(name)),
            )
            .with_transform(Arc::new(MinifyJs::new())),
        )
    }

    #[test]
    fn test_parallel_keeps_declared_order_and_isolates_failures() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/good.js"), "var a = 1;").unwrap();
        fs::write(temp.path().join("src/bad.js"), "var s = 'open;").unwrap();

        let steps = vec![
            copy_step(temp.path(), "bad", "bad.js"),
            copy_step(temp.path(), "good", "good.js"),
            copy_step(temp.path(), "none", "missing.js"),
        ];
        let results = run_parallel(&steps, &NullProgress::new());

        let names: Vec<&str> = results.iter().map(|r| r.step.as_str()).collect();
        assert_eq!(names, vec!["bad", "good", "none"]);
        assert_eq!(results[0].status, StepStatus::Failed);
        assert_eq!(results[1].status, StepStatus::Success);
        assert_eq!(results[2].status, StepStatus::Empty);
        assert_eq!(
            fs::read_to_string(temp.path().join("dest/good/good.js")).unwrap(),
            "var a=1;"
        );
    }

    /// Log sink for a scoped subscriber.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_step_failure_logged_once() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/bad.js"), "var s = 'open;").unwrap();
        let step = copy_step(temp.path(), "bad", "bad.js");

        let logs = Captured::default();
        let sink = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .finish();
        let result = tracing::subscriber::with_default(subscriber, || run_step(&step, &NullProgress::new()));

        assert_eq!(result.status, StepStatus::Failed);
        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text.matches("WARN").count(), 1, "logs: {}", text);
        assert!(text.contains("bad"));
    }

    #[test]
    fn test_empty_set() {
        assert!(run_parallel(&[], &NullProgress::new()).is_empty());
    }
}
