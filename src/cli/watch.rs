//! Watch command implementation

use std::process::ExitCode;

use super::{load_project, make_progress, ProjectArgs, EXIT_ERROR, EXIT_STARTUP, EXIT_SUCCESS};
use crate::build::{project_registry, BuildContext, ProgressEvent, ProgressReporter};
use crate::config::CliOverrides;
use crate::reload::{LogNotifier, ReloadNotifier};
use crate::watch::{project_bindings, validate_bindings, watch_and_rebuild};

/// Pick the reload transport: the dev server when enabled and it starts,
/// otherwise log-only.
#[cfg(feature = "serve")]
fn notifier(ctx: &BuildContext, progress: &dyn ProgressReporter) -> Box<dyn ReloadNotifier> {
    let serve = &ctx.config().serve;
    if !serve.enabled {
        return Box::new(LogNotifier::new());
    }
    match crate::serve::start(ctx.dest_dir(), serve.port) {
        Ok(notifier) => {
            println!("Serving {} at http://127.0.0.1:{}", ctx.dest_dir().display(), serve.port);
            Box::new(notifier)
        }
        Err(e) => {
            tracing::error!("{}", e);
            progress.report(ProgressEvent::Warning {
                step: None,
                message: format!("{}; continuing without the dev server", e),
            });
            Box::new(LogNotifier::new())
        }
    }
}

#[cfg(not(feature = "serve"))]
fn notifier(ctx: &BuildContext, _progress: &dyn ProgressReporter) -> Box<dyn ReloadNotifier> {
    if ctx.config().serve.enabled {
        tracing::warn!("built without the `serve` feature, reloads are only logged");
    }
    Box::new(LogNotifier::new())
}

/// Run the full build, then watch until Ctrl+C.
pub fn run_watch(args: &ProjectArgs, overrides: CliOverrides) -> ExitCode {
    let ctx = match load_project(args, overrides) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    let registry = match project_registry(&ctx) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    let bindings = project_bindings(&ctx);
    if let Err(e) = validate_bindings(&registry, &bindings) {
        eprintln!("Error: {}", e);
        return ExitCode::from(EXIT_STARTUP);
    }

    let progress = make_progress(args.progress, args.verbose);
    let notifier = notifier(&ctx, progress.as_ref());

    match watch_and_rebuild(&ctx, &registry, bindings, notifier.as_ref(), progress.as_ref()) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("Watch error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
