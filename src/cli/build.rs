//! Build command implementations (build, run, clean)

use std::fs;
use std::process::ExitCode;

use super::{load_project, make_progress, ProjectArgs, EXIT_ERROR, EXIT_STARTUP, EXIT_SUCCESS};
use crate::build::project_registry;
use crate::config::CliOverrides;

/// Run a task (the `build` graph by default) once.
pub fn run_build(args: &ProjectArgs, task: &str) -> ExitCode {
    let ctx = match load_project(args, CliOverrides::default()) {
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

    let graph = match registry.resolve_graph(task) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Run 'spipe tasks' to list available tasks");
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    let src_dir = ctx.src_dir();
    if !src_dir.exists() {
        eprintln!("Error: Source directory not found: {}", src_dir.display());
        eprintln!("Create the directory or specify a different path with --src");
        return ExitCode::from(EXIT_STARTUP);
    }

    let progress = make_progress(args.progress, args.verbose);
    match graph.run(progress.as_ref()) {
        Ok(report) => {
            tracing::info!("{}", report.summary());
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            if e.is_fatal() {
                eprintln!("Build aborted: {}", e);
            } else {
                eprintln!("{}", e);
            }
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Remove the destination directory.
pub fn run_clean(args: &ProjectArgs) -> ExitCode {
    let ctx = match load_project(args, CliOverrides::default()) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    let dest = ctx.dest_dir();
    if dest == ctx.project_root() || ctx.project_root().starts_with(&dest) {
        eprintln!("Error: refusing to remove {}, it contains the project", dest.display());
        return ExitCode::from(EXIT_STARTUP);
    }
    if !dest.exists() {
        println!("Nothing to clean: {} does not exist", dest.display());
        return ExitCode::from(EXIT_SUCCESS);
    }

    match fs::remove_dir_all(&dest) {
        Ok(()) => {
            println!("Removed {}", dest.display());
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: cannot remove {}: {}", dest.display(), e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
