//! Watch mode for automatic rebuilds on file changes
//!
//! A debounced file system watcher feeds change batches into a bounded
//! channel. A single scheduler loop drains the channel, coalesces bursts of
//! events, maps the changed paths to the watch bindings they match, runs the
//! union of those bindings' tasks and then signals connected browsers once.

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;
use thiserror::Error;

use crate::build::{
    fold_roots, BuildContext, BuildGraph, BuildReport, ProgressEvent, ProgressReporter,
    RegistryError, SourceSet, StepStatus, TaskRegistry, STYLE_STEPS,
};
use crate::config::ReloadMode;
use crate::reload::{ReloadEvent, ReloadNotifier, StyleSheet};

/// Capacity of the watcher → scheduler channel.
pub const CHANNEL_CAPACITY: usize = 64;

/// Error during watch mode
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Failed to initialize file watcher: {0}")]
    WatcherInit(#[source] notify::Error),

    #[error("Failed to watch {}: {source}", .path.display())]
    WatchPath {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Source directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Initial build aborted: {0}")]
    InitialBuildAborted(String),
}

/// Maps a group of source files to the tasks they feed.
#[derive(Debug, Clone)]
pub struct WatchBinding {
    pub name: String,
    pub sources: SourceSet,
    /// Tasks rerun when a matching file changes
    pub tasks: Vec<String>,
    pub reload: ReloadMode,
}

impl WatchBinding {
    pub fn new(
        name: impl Into<String>,
        sources: SourceSet,
        tasks: impl IntoIterator<Item = impl Into<String>>,
        reload: ReloadMode,
    ) -> Self {
        Self {
            name: name.into(),
            sources,
            tasks: tasks.into_iter().map(Into::into).collect(),
            reload,
        }
    }

    /// Whether a changed path belongs to this binding.
    pub fn matches(&self, path: &Path) -> bool {
        self.sources.matches(path)
    }
}

/// Watch bindings for a project: `[[watch.bindings]]` when declared,
/// otherwise the stock page and style bindings.
pub fn project_bindings(ctx: &BuildContext) -> Vec<WatchBinding> {
    let declared = &ctx.config().watch.bindings;
    if declared.is_empty() {
        return default_bindings(ctx);
    }

    declared
        .iter()
        .map(|b| {
            let sources = SourceSet::new(b.name.as_str(), ctx.src_dir(), b.paths.iter().cloned())
                .with_exclude(b.exclude.iter().cloned());
            WatchBinding::new(b.name.as_str(), sources, b.tasks.iter().cloned(), b.reload)
        })
        .collect()
}

/// Page edits reload the page; stylesheet edits are injected.
pub fn default_bindings(ctx: &BuildContext) -> Vec<WatchBinding> {
    let layout = &ctx.config().layout;

    let mut pages = layout.html.clone();
    pages.push(format!("{}/**/*", layout.partials.to_string_lossy().trim_end_matches('/')));
    for group in [&layout.css, &layout.fonts, &layout.images, &layout.js, &layout.media, &layout.php] {
        pages.extend(group.iter().cloned());
    }

    vec![
        WatchBinding::new(
            "pages",
            SourceSet::new("pages", ctx.src_dir(), pages),
            ["html", "assets", "plugins_css", "vendor_css", "plugins_js", "vendor_js", "main_js"],
            ReloadMode::Full,
        ),
        WatchBinding::new(
            "styles",
            SourceSet::new("styles", ctx.src_dir(), layout.scss.iter().cloned()),
            STYLE_STEPS,
            ReloadMode::Inject,
        ),
    ]
}

/// Check every binding names registered tasks and has well-formed globs.
pub fn validate_bindings(registry: &TaskRegistry, bindings: &[WatchBinding]) -> Result<(), RegistryError> {
    for binding in bindings {
        binding
            .sources
            .validate()
            .map_err(|source| RegistryError::Pattern { task: binding.name.clone(), source })?;
        registry.resolve_subgraph(&binding.tasks)?;
    }
    Ok(())
}

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching,
    Rebuilding,
    Stopped,
}

/// Messages consumed by the scheduler loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerMessage {
    Changed(Vec<PathBuf>),
    Shutdown,
}

/// Strongest reload asked for by a set of bindings: full beats inject
/// beats none.
pub fn combine_reload(modes: impl IntoIterator<Item = ReloadMode>) -> ReloadMode {
    modes.into_iter().fold(ReloadMode::None, |acc, mode| match (acc, mode) {
        (ReloadMode::Full, _) | (_, ReloadMode::Full) => ReloadMode::Full,
        (ReloadMode::Inject, _) | (_, ReloadMode::Inject) => ReloadMode::Inject,
        _ => ReloadMode::None,
    })
}

/// The signal to send after a cycle.
///
/// Injection carries every `.css` file the cycle wrote.
pub fn reload_event(mode: ReloadMode, report: &BuildReport, dest_root: &Path) -> Option<ReloadEvent> {
    match mode {
        ReloadMode::Full => Some(ReloadEvent::FullReload),
        ReloadMode::Inject => {
            let sheets = report
                .all_outputs()
                .into_iter()
                .filter(|p| p.extension().is_some_and(|e| e.eq_ignore_ascii_case("css")))
                .map(|p| StyleSheet::from_output(dest_root, p))
                .collect();
            Some(ReloadEvent::StyleInject(sheets))
        }
        ReloadMode::None => None,
    }
}

/// Tracks failures across cycles for recovery detection.
///
/// A failure is keyed by its step and source file. A failure clears only
/// when its step runs again without reporting it.
#[derive(Debug, Default)]
pub struct ErrorTracker {
    failing: HashSet<(String, Option<PathBuf>)>,
}

impl ErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cycle's failures, returning what is now fixed: the source
    /// file, or the step name when no file was known.
    pub fn update(&mut self, report: &BuildReport) -> Vec<PathBuf> {
        let mut current = HashSet::new();
        for error in report.errors() {
            let files = error.files();
            if files.is_empty() {
                current.insert((error.step().to_string(), None));
            }
            for file in files {
                current.insert((error.step().to_string(), Some(file)));
            }
        }

        let ran: HashSet<&str> = report
            .results
            .iter()
            .filter(|r| r.status != StepStatus::Skipped)
            .map(|r| r.step.as_str())
            .collect();
        let (fixed, still): (HashSet<_>, HashSet<_>) = self
            .failing
            .drain()
            .partition(|key| ran.contains(key.0.as_str()) && !current.contains(key));
        self.failing = still;
        self.failing.extend(current);

        let mut fixed: Vec<PathBuf> = fixed
            .into_iter()
            .map(|(step, file)| file.unwrap_or_else(|| PathBuf::from(step)))
            .collect();
        fixed.sort();
        fixed.dedup();
        fixed
    }

    pub fn has_errors(&self) -> bool {
        !self.failing.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.failing.len()
    }
}

/// Clear the terminal screen
fn clear_screen() {
    // ANSI escape code to clear screen and move cursor to top-left
    eprint!("\x1B[2J\x1B[1;1H");
}

/// What one rebuild cycle did.
#[derive(Debug)]
pub struct CycleOutcome {
    /// Bindings the changed paths matched
    pub bindings: Vec<String>,
    pub report: BuildReport,
    pub reload: Option<ReloadEvent>,
    pub fixed: Vec<PathBuf>,
}

/// Runs rebuild cycles for batches of changed paths.
pub struct Scheduler<'a> {
    registry: &'a TaskRegistry,
    bindings: Vec<WatchBinding>,
    notifier: &'a dyn ReloadNotifier,
    progress: &'a dyn ProgressReporter,
    dest_root: PathBuf,
    debounce: Duration,
    clear_screen: bool,
    state: WatchState,
    tracker: ErrorTracker,
    cycles: usize,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        registry: &'a TaskRegistry,
        bindings: Vec<WatchBinding>,
        notifier: &'a dyn ReloadNotifier,
        progress: &'a dyn ProgressReporter,
        dest_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            bindings,
            notifier,
            progress,
            dest_root: dest_root.into(),
            debounce: Duration::from_millis(100),
            clear_screen: false,
            state: WatchState::Idle,
            tracker: ErrorTracker::new(),
            cycles: 0,
        }
    }

    /// Set the coalescing window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_clear_screen(mut self, clear_screen: bool) -> Self {
        self.clear_screen = clear_screen;
        self
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn bindings(&self) -> &[WatchBinding] {
        &self.bindings
    }

    /// Completed rebuild cycles.
    pub fn cycles(&self) -> usize {
        self.cycles
    }

    /// Bindings matched by any of the paths, in declaration order.
    pub fn matching(&self, paths: &[PathBuf]) -> Vec<&WatchBinding> {
        self.bindings.iter().filter(|b| paths.iter().any(|p| b.matches(p))).collect()
    }

    /// Run a graph outside the watch loop (the startup build) and seed the
    /// error tracker with its failures.
    pub fn run_initial(&mut self, graph: &BuildGraph) -> BuildReport {
        let report = graph.execute(self.progress);
        self.tracker.update(&report);
        report
    }

    /// Rebuild for one coalesced batch.
    ///
    /// Returns `None` when no binding matches.
    pub fn run_cycle(&mut self, paths: &[PathBuf]) -> Result<Option<CycleOutcome>, RegistryError> {
        let matched = self.matching(paths);
        if matched.is_empty() {
            tracing::debug!(paths = paths.len(), "no watch binding matches");
            return Ok(None);
        }

        let names: Vec<String> = matched.iter().map(|b| b.name.clone()).collect();
        let mode = combine_reload(matched.iter().map(|b| b.reload));
        let mut tasks: Vec<&str> = Vec::new();
        for binding in &matched {
            tasks.extend(binding.tasks.iter().map(String::as_str));
        }
        let graph = self.registry.resolve_subgraph(&tasks)?;

        if self.clear_screen {
            clear_screen();
        }
        self.progress.report(ProgressEvent::Changed { paths: paths.to_vec() });
        tracing::debug!(bindings = ?names, steps = ?graph.step_names(), "rebuilding");

        self.state = WatchState::Rebuilding;
        let report = graph.execute(self.progress);
        self.state = WatchState::Watching;
        self.cycles += 1;

        if report.aborted {
            tracing::error!("rebuild aborted, still watching");
            self.progress.report(ProgressEvent::Warning {
                step: None,
                message: "rebuild aborted, still watching".to_string(),
            });
        }

        let fixed = self.tracker.update(&report);
        for path in &fixed {
            self.progress.report(ProgressEvent::Fixed { path: path.clone() });
        }

        let reload = reload_event(mode, &report, &self.dest_root);
        if let Some(event) = &reload {
            self.notifier.notify(event);
            let files = match event {
                ReloadEvent::FullReload => vec![],
                ReloadEvent::StyleInject(sheets) => sheets.iter().map(|s| s.path.clone()).collect(),
            };
            self.progress.report(ProgressEvent::Reloaded { kind: event.kind().to_string(), files });
        }

        Ok(Some(CycleOutcome { bindings: names, report, reload, fixed }))
    }

    /// Drain further messages until the window passes quietly.
    ///
    /// Returns the deduplicated paths and whether shutdown was requested. A
    /// shutdown inside the window drops the batch gathered so far; it is
    /// never rebuilt.
    fn coalesce(&self, first: Vec<PathBuf>, rx: &Receiver<SchedulerMessage>) -> (Vec<PathBuf>, bool) {
        let mut seen = HashSet::new();
        let mut paths = Vec::new();
        let mut add = |batch: Vec<PathBuf>, paths: &mut Vec<PathBuf>| {
            for path in batch {
                if seen.insert(path.clone()) {
                    paths.push(path);
                }
            }
        };
        add(first, &mut paths);

        loop {
            match rx.recv_timeout(self.debounce) {
                Ok(SchedulerMessage::Changed(batch)) => add(batch, &mut paths),
                Ok(SchedulerMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                    return (paths, true)
                }
                Err(RecvTimeoutError::Timeout) => return (paths, false),
            }
        }
    }

    /// Consume messages until shutdown.
    ///
    /// Returns the number of rebuild cycles run.
    pub fn run(&mut self, rx: &Receiver<SchedulerMessage>) -> usize {
        self.state = WatchState::Watching;

        while let Ok(message) = rx.recv() {
            let first = match message {
                SchedulerMessage::Changed(paths) => paths,
                SchedulerMessage::Shutdown => break,
            };

            let (paths, shutdown) = self.coalesce(first, rx);
            if shutdown {
                break;
            }
            if let Err(e) = self.run_cycle(&paths) {
                tracing::error!("{}", e);
                self.progress.report(ProgressEvent::Error { step: None, message: e.to_string() });
            }
        }

        self.state = WatchState::Stopped;
        tracing::debug!(cycles = self.cycles, "scheduler stopped");
        self.cycles
    }
}

/// Directories to subscribe to for a set of bindings.
pub fn watch_roots(bindings: &[WatchBinding]) -> Vec<PathBuf> {
    fold_roots(bindings.iter().flat_map(|b| b.sources.watch_roots()).collect())
}

/// Forward Ctrl+C to the scheduler as a shutdown message.
fn install_shutdown_handler(tx: SyncSender<SchedulerMessage>, progress: &dyn ProgressReporter) {
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = tx.send(SchedulerMessage::Shutdown);
    }) {
        tracing::warn!("cannot install Ctrl+C handler: {}", e);
        progress.report(ProgressEvent::Warning {
            step: None,
            message: format!("cannot install Ctrl+C handler: {}", e),
        });
    }
}

/// Message for the first fatal failure of an aborted run.
fn abort_reason(report: &BuildReport) -> String {
    report
        .errors()
        .find(|e| e.is_fatal())
        .map(ToString::to_string)
        .unwrap_or_else(|| "a step failed fatally".to_string())
}

/// Run the startup build, then watch and rebuild until Ctrl+C.
///
/// A fatal failure in the startup build ends the session before the loop
/// starts. Later rebuild failures never do.
pub fn watch_and_rebuild(
    ctx: &BuildContext,
    registry: &TaskRegistry,
    bindings: Vec<WatchBinding>,
    notifier: &dyn ReloadNotifier,
    progress: &dyn ProgressReporter,
) -> Result<(), WatchError> {
    let src_dir = ctx.src_dir();
    if !src_dir.exists() {
        return Err(WatchError::SourceNotFound(src_dir));
    }
    validate_bindings(registry, &bindings)?;

    let roots = watch_roots(&bindings);
    if roots.is_empty() {
        return Err(WatchError::SourceNotFound(src_dir));
    }

    let watch = &ctx.config().watch;
    let debounce = Duration::from_millis(u64::from(watch.debounce_ms));
    let (tx, rx) = sync_channel(CHANNEL_CAPACITY);

    let events_tx = tx.clone();
    let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| match result {
        Ok(events) => {
            let paths: Vec<PathBuf> = events
                .into_iter()
                .filter(|e| matches!(e.kind, DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous))
                .map(|e| e.path)
                .collect();
            if !paths.is_empty() && events_tx.send(SchedulerMessage::Changed(paths)).is_err() {
                tracing::debug!("scheduler gone, dropping change batch");
            }
        }
        // Backend errors are logged; watching continues
        Err(error) => tracing::warn!("watch error: {:?}", error),
    })
    .map_err(WatchError::WatcherInit)?;

    for root in &roots {
        debouncer
            .watcher()
            .watch(root, RecursiveMode::Recursive)
            .map_err(|source| WatchError::WatchPath { path: root.clone(), source })?;
        tracing::debug!(root = %root.display(), "watching");
    }
    let mut scheduler = Scheduler::new(registry, bindings, notifier, progress, ctx.dest_dir())
        .with_debounce(debounce)
        .with_clear_screen(watch.clear_screen);

    if watch.clear_screen {
        clear_screen();
    }
    let graph = registry.resolve_graph("build")?;
    let report = scheduler.run_initial(&graph);
    if report.aborted {
        return Err(WatchError::InitialBuildAborted(abort_reason(&report)));
    }
    install_shutdown_handler(tx, progress);

    let shown: Vec<String> = roots.iter().map(|r| r.display().to_string()).collect();
    tracing::info!("watching {} for changes", shown.join(", "));
    progress.report(ProgressEvent::Watching { roots: roots.clone() });

    let cycles = scheduler.run(&rx);
    drop(debouncer);
    tracing::info!(cycles, "watch stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{DestinationTarget, NullProgress, PipelineStep, StepError, StepResult};
    use crate::reload::ChannelNotifier;
    use crate::transforms::TransformError;
    use std::fs;
    use std::sync::mpsc::channel;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn binding(root: &Path, name: &str, patterns: &[&str], tasks: &[&str], reload: ReloadMode) -> WatchBinding {
        WatchBinding::new(
            name,
            SourceSet::new(name, root, patterns.iter().copied()),
            tasks.iter().copied(),
            reload,
        )
    }

    #[test]
    fn test_binding_matches() {
        let b = WatchBinding::new(
            "styles",
            SourceSet::new("styles", "/site/src", ["assets/scss/**/*"])
                .with_exclude(["assets/scss/vendor/**/*"]),
            ["style_css"],
            ReloadMode::Inject,
        );
        assert!(b.matches(Path::new("/site/src/assets/scss/style.scss")));
        assert!(b.matches(Path::new("/site/src/assets/scss/base/_type.scss")));
        assert!(!b.matches(Path::new("/site/src/assets/scss/vendor/x.scss")));
        assert!(!b.matches(Path::new("/site/src/assets/js/main.js")));
    }

    #[test]
    fn test_combine_reload() {
        assert_eq!(combine_reload([]), ReloadMode::None);
        assert_eq!(combine_reload([ReloadMode::None, ReloadMode::Inject]), ReloadMode::Inject);
        assert_eq!(combine_reload([ReloadMode::Inject, ReloadMode::Full]), ReloadMode::Full);
        assert_eq!(combine_reload([ReloadMode::Full, ReloadMode::None]), ReloadMode::Full);
    }

    #[test]
    fn test_reload_event_collects_css() {
        let mut report = BuildReport::new();
        report.add_result(StepResult::from_run(
            "style".to_string(),
            Ok(crate::build::StepOutput {
                sources: 1,
                written: vec![
                    PathBuf::from("/d/assets/css/style.css"),
                    PathBuf::from("/d/assets/css/style.css.map"),
                    PathBuf::from("/d/index.html"),
                ],
            }),
            Duration::ZERO,
        ));

        let event = reload_event(ReloadMode::Inject, &report, Path::new("/d")).unwrap();
        let ReloadEvent::StyleInject(sheets) = event else {
            panic!("expected inject");
        };
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets[0].url, "assets/css/style.css");

        assert_eq!(reload_event(ReloadMode::Full, &report, Path::new("/d")), Some(ReloadEvent::FullReload));
        assert_eq!(reload_event(ReloadMode::None, &report, Path::new("/d")), None);
    }

    fn failure(step: &str, file: Option<&str>) -> StepResult {
        let mut error = TransformError::new("scss:expanded", "boom");
        if let Some(file) = file {
            error = error.at(file);
        }
        StepResult::from_run(
            step.to_string(),
            Err(StepError::Transform { step: step.to_string(), errors: vec![error] }),
            Duration::ZERO,
        )
    }

    fn success(step: &str) -> StepResult {
        StepResult::from_run(step.to_string(), Ok(Default::default()), Duration::ZERO)
    }

    #[test]
    fn test_error_tracker_detects_fixed_files() {
        let mut tracker = ErrorTracker::new();

        let mut first = BuildReport::new();
        first.add_result(failure("style_css", Some("/s/a.scss")));
        first.add_result(failure("main_js", Some("/s/main.js")));
        assert!(tracker.update(&first).is_empty());
        assert_eq!(tracker.error_count(), 2);

        let mut second = BuildReport::new();
        second.add_result(success("style_css"));
        second.add_result(failure("main_js", Some("/s/main.js")));
        assert_eq!(tracker.update(&second), vec![PathBuf::from("/s/a.scss")]);
        assert_eq!(tracker.error_count(), 1);
    }

    #[test]
    fn test_error_tracker_step_keys_need_a_rerun() {
        let mut tracker = ErrorTracker::new();
        let mut first = BuildReport::new();
        first.add_result(failure("vendor_js", None));
        tracker.update(&first);

        let mut unrelated = BuildReport::new();
        unrelated.add_result(success("style_css"));
        assert!(tracker.update(&unrelated).is_empty());
        assert!(tracker.has_errors());

        let mut rerun = BuildReport::new();
        rerun.add_result(success("vendor_js"));
        assert_eq!(tracker.update(&rerun), vec![PathBuf::from("vendor_js")]);
        assert!(!tracker.has_errors());
    }

    struct Fixture {
        temp: TempDir,
        registry: TaskRegistry,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("css")).unwrap();
        fs::create_dir_all(src.join("pages")).unwrap();
        fs::write(src.join("css/a.css"), "a { color: red }").unwrap();
        fs::write(src.join("pages/index.html"), "<p>hi</p>").unwrap();

        let mut registry = TaskRegistry::new();
        registry.register(
            "css",
            PipelineStep::new(
                "css",
                SourceSet::new("css", &src, ["css/*.css"]),
                DestinationTarget::new("css", temp.path().join("dest/css")),
            ),
        );
        registry.register(
            "pages",
            PipelineStep::new(
                "pages",
                SourceSet::new("pages", &src, ["pages/*.html"]),
                DestinationTarget::new("root", temp.path().join("dest")),
            ),
        );
        Fixture { temp, registry }
    }

    fn bindings(root: &Path) -> Vec<WatchBinding> {
        vec![
            binding(root, "pages", &["pages/**/*"], &["pages"], ReloadMode::Full),
            binding(root, "styles", &["css/**/*"], &["css"], ReloadMode::Inject),
        ]
    }

    #[test]
    fn test_run_cycle_inject_vs_full() {
        let f = fixture();
        let src = f.temp.path().join("src");
        let (tx, rx) = channel();
        let notifier = ChannelNotifier::new(tx);
        let progress = NullProgress::new();
        let mut scheduler =
            Scheduler::new(&f.registry, bindings(&src), &notifier, &progress, f.temp.path().join("dest"));

        let outcome = scheduler.run_cycle(&[src.join("css/a.css")]).unwrap().unwrap();
        assert_eq!(outcome.bindings, vec!["styles"]);
        assert_eq!(outcome.report.results.len(), 1);
        let ReloadEvent::StyleInject(sheets) = rx.try_recv().unwrap() else {
            panic!("expected inject");
        };
        assert_eq!(sheets[0].url, "css/a.css");

        scheduler.run_cycle(&[src.join("css/a.css"), src.join("pages/index.html")]).unwrap();
        assert_eq!(rx.try_recv().unwrap(), ReloadEvent::FullReload);
        assert!(rx.try_recv().is_err());

        assert!(scheduler.run_cycle(&[src.join("README.md")]).unwrap().is_none());
        assert!(rx.try_recv().is_err());
        assert_eq!(scheduler.cycles(), 2);
    }

    #[test]
    fn test_scheduler_coalesces_burst() {
        let f = fixture();
        let src = f.temp.path().join("src");
        let (reload_tx, reload_rx) = channel();
        let notifier = ChannelNotifier::new(reload_tx);
        let progress = NullProgress::new();
        let mut scheduler =
            Scheduler::new(&f.registry, bindings(&src), &notifier, &progress, f.temp.path().join("dest"))
                .with_debounce(Duration::from_millis(200));

        let (tx, rx) = sync_channel(CHANNEL_CAPACITY);
        let changed = src.join("pages/index.html");
        let producer = thread::spawn(move || {
            for _ in 0..5 {
                tx.send(SchedulerMessage::Changed(vec![changed.clone()])).unwrap();
                thread::sleep(Duration::from_millis(10));
            }
            thread::sleep(Duration::from_millis(600));
            tx.send(SchedulerMessage::Shutdown).unwrap();
        });

        assert_eq!(scheduler.state(), WatchState::Idle);
        let cycles = scheduler.run(&rx);
        producer.join().unwrap();

        assert_eq!(cycles, 1);
        assert_eq!(scheduler.state(), WatchState::Stopped);
        assert_eq!(reload_rx.try_recv().unwrap(), ReloadEvent::FullReload);
        assert!(reload_rx.try_recv().is_err());
    }

    #[test]
    fn test_shutdown_inside_window_drops_pending_batch() {
        let f = fixture();
        let src = f.temp.path().join("src");
        let (reload_tx, reload_rx) = channel();
        let notifier = ChannelNotifier::new(reload_tx);
        let progress = NullProgress::new();
        let mut scheduler =
            Scheduler::new(&f.registry, bindings(&src), &notifier, &progress, f.temp.path().join("dest"))
                .with_debounce(Duration::from_secs(5));

        let (tx, rx) = sync_channel(CHANNEL_CAPACITY);
        tx.send(SchedulerMessage::Changed(vec![src.join("pages/index.html")])).unwrap();
        tx.send(SchedulerMessage::Shutdown).unwrap();

        assert_eq!(scheduler.run(&rx), 0);
        assert!(reload_rx.try_recv().is_err());
        assert!(!f.temp.path().join("dest/pages/index.html").exists());
    }

    #[test]
    fn test_scheduler_stops_when_channel_closes() {
        let f = fixture();
        let notifier = crate::reload::LogNotifier::new();
        let progress = NullProgress::new();
        let mut scheduler = Scheduler::new(&f.registry, vec![], &notifier, &progress, "/dest");

        let (tx, rx) = sync_channel::<SchedulerMessage>(1);
        drop(tx);
        assert_eq!(scheduler.run(&rx), 0);
        assert_eq!(scheduler.state(), WatchState::Stopped);
    }

    #[test]
    fn test_validate_bindings_reports_unknown_task() {
        let f = fixture();
        let src = f.temp.path().join("src");
        assert!(validate_bindings(&f.registry, &bindings(&src)).is_ok());

        let bad = vec![binding(&src, "x", &["**/*"], &["deploy"], ReloadMode::Full)];
        assert!(matches!(
            validate_bindings(&f.registry, &bad),
            Err(RegistryError::UnknownTask(_))
        ));
    }

    #[test]
    fn test_validate_bindings_reports_malformed_pattern() {
        let f = fixture();
        let src = f.temp.path().join("src");
        let bad = vec![binding(&src, "styles", &["css/[scss"], &["css"], ReloadMode::Inject)];
        let Err(RegistryError::Pattern { task, .. }) = validate_bindings(&f.registry, &bad) else {
            panic!("expected a pattern error");
        };
        assert_eq!(task, "styles");

        let bad_exclude = vec![WatchBinding::new(
            "pages",
            SourceSet::new("pages", &src, ["pages/**/*"]).with_exclude(["pages/[draft"]),
            ["pages"],
            ReloadMode::Full,
        )];
        assert!(matches!(
            validate_bindings(&f.registry, &bad_exclude),
            Err(RegistryError::Pattern { .. })
        ));
    }

    #[derive(Default)]
    struct Recorder(std::sync::Mutex<Vec<ProgressEvent>>);

    impl ProgressReporter for Recorder {
        fn report(&self, event: ProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[test]
    fn test_aborted_rebuild_warns_and_keeps_watching() {
        let f = fixture();
        let src = f.temp.path().join("src");
        fs::write(f.temp.path().join("dest"), "not a directory").unwrap();
        let notifier = crate::reload::LogNotifier::new();
        let progress = Recorder::default();
        let mut scheduler =
            Scheduler::new(&f.registry, bindings(&src), &notifier, &progress, f.temp.path().join("dest"));

        let outcome = scheduler.run_cycle(&[src.join("pages/index.html")]).unwrap().unwrap();
        assert!(outcome.report.aborted);
        assert_eq!(scheduler.state(), WatchState::Watching);

        let events = progress.0.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            ProgressEvent::Warning { step: None, message } if message.contains("aborted")
        )));
    }

    #[test]
    fn test_watch_roots_fold() {
        let f = fixture();
        let src = f.temp.path().join("src");
        let roots = watch_roots(&bindings(&src));
        assert_eq!(roots, vec![src.join("css"), src.join("pages")]);
    }

    #[test]
    fn test_default_bindings() {
        let ctx = BuildContext::new(crate::config::default_config(), PathBuf::from("/site"));
        let defaults = project_bindings(&ctx);
        assert_eq!(defaults.len(), 2);
        assert_eq!(defaults[0].reload, ReloadMode::Full);
        assert!(defaults[0].matches(Path::new("/site/src/partials/header.html")));
        assert!(defaults[0].matches(Path::new("/site/src/html/index.html")));
        assert!(!defaults[0].matches(Path::new("/site/src/assets/scss/style.scss")));
        assert_eq!(defaults[1].tasks, STYLE_STEPS);
        assert!(defaults[1].matches(Path::new("/site/src/assets/scss/_vars.scss")));
    }
}
