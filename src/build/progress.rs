//! Build progress reporting.
//!
//! The side channel through which step outcomes and failures reach the user:
//! coloured console lines, JSON lines for tooling, or nothing.

use serde_json::{json, Value};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::result::StepStatus;

/// Events that can be reported during a build or watch session.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A graph run started
    BuildStarted {
        /// Total number of steps in the graph
        total_steps: usize,
    },
    /// A step started
    StepStarted { step: String },
    /// A step finished
    StepCompleted {
        step: String,
        status: StepStatus,
        /// Number of files written
        outputs: usize,
        duration_ms: u64,
        /// Failure message, when the step failed
        error: Option<String>,
    },
    /// A graph run finished
    BuildCompleted {
        success: bool,
        duration_ms: u64,
        succeeded: usize,
        empty: usize,
        failed: usize,
        skipped: usize,
    },
    /// The watcher is subscribed and idle
    Watching { roots: Vec<PathBuf> },
    /// Watched files changed
    Changed { paths: Vec<PathBuf> },
    /// A file that failed in an earlier cycle now builds
    Fixed { path: PathBuf },
    /// Browsers were told to reload
    Reloaded {
        /// `full` or `inject`
        kind: String,
        /// Injected stylesheets, empty for a full reload
        files: Vec<PathBuf>,
    },
    /// A warning was generated
    Warning { step: Option<String>, message: String },
    /// An error occurred
    Error { step: Option<String>, message: String },
}

/// Trait for progress reporters.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event.
    fn report(&self, event: ProgressEvent);

    /// Check if this reporter wants verbose output.
    fn is_verbose(&self) -> bool {
        false
    }
}

/// A progress reporter that discards all events.
#[derive(Debug, Default)]
pub struct NullProgress;

impl NullProgress {
    pub fn new() -> Self {
        Self
    }
}

impl ProgressReporter for NullProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Line-oriented writer shared by the reporters.
struct Sink(Mutex<Box<dyn Write + Send>>);

impl Sink {
    fn stderr() -> Self {
        Sink::to(std::io::stderr())
    }

    fn to<W: Write + Send + 'static>(output: W) -> Self {
        Sink(Mutex::new(Box::new(output)))
    }

    fn line(&self, text: impl std::fmt::Display) {
        if let Ok(mut out) = self.0.lock() {
            let _ = writeln!(out, "{}", text);
        }
    }
}

/// ANSI styles used by the console reporter.
#[derive(Clone, Copy)]
enum Paint {
    Ok,
    Notice,
    Fail,
    Tag,
    Strong,
}

impl Paint {
    fn code(self) -> &'static str {
        match self {
            Paint::Ok => "\x1b[32m",
            Paint::Notice => "\x1b[33m",
            Paint::Fail => "\x1b[31m",
            Paint::Tag => "\x1b[36m",
            Paint::Strong => "\x1b[1m",
        }
    }
}

/// Human-readable progress lines, coloured on a terminal.
pub struct ConsoleProgress {
    sink: Sink,
    colored: bool,
    verbose: bool,
    /// Steps finished in the current run
    done: AtomicUsize,
    planned: AtomicUsize,
}

impl std::fmt::Debug for ConsoleProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleProgress")
            .field("colored", &self.colored)
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

impl ConsoleProgress {
    /// Reporter writing to stderr, coloured when stderr is a terminal.
    pub fn new() -> Self {
        Self::from_sink(Sink::stderr(), atty::is(atty::Stream::Stderr))
    }

    /// Uncoloured reporter writing to `output`.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self::from_sink(Sink::to(output), false)
    }

    fn from_sink(sink: Sink, colored: bool) -> Self {
        Self { sink, colored, verbose: false, done: AtomicUsize::new(0), planned: AtomicUsize::new(0) }
    }

    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.colored = use_colors;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn paint(&self, text: &str, paint: Paint) -> String {
        if self.colored {
            format!("{}{}\x1b[0m", paint.code(), text)
        } else {
            text.to_string()
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn plural(count: usize, one: &'static str, many: &'static str) -> &'static str {
    if count == 1 {
        one
    } else {
        many
    }
}

fn step_prefix(step: Option<String>) -> String {
    step.map(|s| format!("{}: ", s)).unwrap_or_default()
}

impl ProgressReporter for ConsoleProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::BuildStarted { total_steps } => {
                self.planned.store(total_steps, Ordering::SeqCst);
                self.done.store(0, Ordering::SeqCst);
                if total_steps > 0 {
                    self.sink.line(&format!(
                        "{} Running {} step{}...",
                        self.paint("[build]", Paint::Tag),
                        total_steps,
                        plural(total_steps, "", "s")
                    ));
                }
            }
            ProgressEvent::StepStarted { step } => {
                if self.verbose {
                    self.sink.line(&format!("{} Starting {}...", self.paint("[build]", Paint::Tag), step));
                }
            }
            ProgressEvent::StepCompleted { step, status, outputs, duration_ms, error } => {
                let current = self.done.fetch_add(1, Ordering::SeqCst) + 1;
                let total = self.planned.load(Ordering::SeqCst);

                let status_str = match status {
                    StepStatus::Success => self.paint("ok", Paint::Ok),
                    StepStatus::Empty => self.paint("empty", Paint::Notice),
                    StepStatus::Skipped => self.paint("skipped", Paint::Notice),
                    StepStatus::Failed => self.paint("FAILED", Paint::Fail),
                };
                let files = match status {
                    StepStatus::Success => {
                        format!(", {} file{}", outputs, plural(outputs, "", "s"))
                    }
                    _ => String::new(),
                };

                self.sink.line(&format!(
                    "{} [{}/{}] {} {} ({}{})",
                    self.paint("[build]", Paint::Tag),
                    current,
                    total,
                    status_str,
                    step,
                    format_duration(duration_ms),
                    files
                ));

                if let Some(err) = error {
                    self.sink.line(&format!("        {}", self.paint(&err, Paint::Fail)));
                }
            }
            ProgressEvent::BuildCompleted { success, duration_ms, succeeded, empty, failed, skipped } => {
                let duration_str = format_duration(duration_ms);
                if success {
                    let total = succeeded + empty;
                    self.sink.line(&format!(
                        "{} {} {} done, {} empty in {}",
                        self.paint("[done]", Paint::Ok),
                        self.paint(&total.to_string(), Paint::Strong),
                        plural(total, "step", "steps"),
                        empty,
                        duration_str
                    ));
                } else {
                    self.sink.line(&format!(
                        "{} Build failed: {} succeeded, {} {}, {} skipped in {}",
                        self.paint("[error]", Paint::Fail),
                        succeeded + empty,
                        failed,
                        plural(failed, "failure", "failures"),
                        skipped,
                        duration_str
                    ));
                }
            }
            ProgressEvent::Watching { roots } => {
                let roots: Vec<String> = roots.iter().map(|r| r.display().to_string()).collect();
                self.sink.line(&format!(
                    "{} Watching {} for changes (Ctrl+C to stop)",
                    self.paint("[watch]", Paint::Tag),
                    roots.join(", ")
                ));
            }
            ProgressEvent::Changed { paths } => {
                for path in paths {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string());
                    self.sink.line(&format!("{} Changed: {}", self.paint("[watch]", Paint::Tag), name));
                }
            }
            ProgressEvent::Fixed { path } => {
                self.sink.line(&format!("{} Fixed: {}", self.paint("[watch]", Paint::Ok), path.display()));
            }
            ProgressEvent::Reloaded { kind, files } => {
                if files.is_empty() {
                    self.sink.line(&format!("{} {} reload", self.paint("[reload]", Paint::Tag), kind));
                } else {
                    let names: Vec<String> = files.iter().map(|f| f.display().to_string()).collect();
                    self.sink.line(&format!("{} {} {}", self.paint("[reload]", Paint::Tag), kind, names.join(", ")));
                }
            }
            ProgressEvent::Warning { step, message } => {
                self.sink.line(&format!("{} {}{}", self.paint("[warn]", Paint::Notice), step_prefix(step), message));
            }
            ProgressEvent::Error { step, message } => {
                self.sink.line(&format!("{} {}{}", self.paint("[error]", Paint::Fail), step_prefix(step), message));
            }
        }
    }

    fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// One JSON object per event, for editors and CI.
pub struct JsonProgress {
    sink: Sink,
}

impl std::fmt::Debug for JsonProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonProgress")
    }
}

impl JsonProgress {
    /// Reporter writing to stderr.
    pub fn new() -> Self {
        Self { sink: Sink::stderr() }
    }

    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self { sink: Sink::to(output) }
    }
}

impl Default for JsonProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn paths_json(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|p| p.display().to_string()).collect()
}

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let value = match event {
            ProgressEvent::BuildStarted { total_steps } => {
                json!({ "event": "build_started", "total_steps": total_steps })
            }
            ProgressEvent::StepStarted { step } => json!({ "event": "step_started", "step": step }),
            ProgressEvent::StepCompleted { step, status, outputs, duration_ms, error } => {
                let mut value = json!({
                    "event": "step_completed",
                    "step": step,
                    "status": status.to_string(),
                    "outputs": outputs,
                    "duration_ms": duration_ms,
                });
                if let Some(err) = error {
                    value["error"] = Value::String(err);
                }
                value
            }
            ProgressEvent::BuildCompleted { success, duration_ms, succeeded, empty, failed, skipped } => {
                json!({
                    "event": "build_completed",
                    "success": success,
                    "duration_ms": duration_ms,
                    "succeeded": succeeded,
                    "empty": empty,
                    "failed": failed,
                    "skipped": skipped,
                })
            }
            ProgressEvent::Watching { roots } => {
                json!({ "event": "watching", "roots": paths_json(&roots) })
            }
            ProgressEvent::Changed { paths } => {
                json!({ "event": "changed", "paths": paths_json(&paths) })
            }
            ProgressEvent::Fixed { path } => {
                json!({ "event": "fixed", "path": path.display().to_string() })
            }
            ProgressEvent::Reloaded { kind, files } => {
                json!({ "event": "reloaded", "kind": kind, "files": paths_json(&files) })
            }
            ProgressEvent::Warning { step, message } => {
                json!({ "event": "warning", "step": step, "message": message })
            }
            ProgressEvent::Error { step, message } => {
                json!({ "event": "error", "step": step, "message": message })
            }
        };
        self.sink.line(value);
    }
}

/// `250ms`, `1.5s` or `2m 5s`.
pub fn format_duration(ms: u64) -> String {
    match ms {
        0..=999 => format!("{}ms", ms),
        1_000..=59_999 => format!("{:.1}s", ms as f64 / 1000.0),
        _ => format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1000),
    }
}
