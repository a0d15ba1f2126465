//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;
mod info;
mod watch;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::build::{BuildContext, ConsoleProgress, JsonProgress, NullProgress, ProgressReporter};
use crate::config::{
    default_config, find_config, load_config, merge_cli_overrides, project_root, CliOverrides,
    ConfigError,
};

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_STARTUP: u8 = 2;

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "SITEPIPE_LOG";

/// Sitepipe - front-end asset build pipeline
#[derive(Parser)]
#[command(name = "spipe")]
#[command(about = "Sitepipe - build HTML, styles, scripts and images into a deployable site")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// How build progress is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ProgressFormat {
    #[default]
    Console,
    Json,
    Quiet,
}

/// Options shared by every command that loads a project
#[derive(Debug, Clone, Args)]
pub struct ProjectArgs {
    /// Path to sitepipe.toml (default: search upward from the current directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override source directory
    #[arg(long)]
    pub src: Option<PathBuf>,

    /// Override destination directory
    #[arg(long)]
    pub dest: Option<PathBuf>,

    /// Progress output format
    #[arg(long, value_enum, default_value = "console")]
    pub progress: ProgressFormat,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the build graph once
    Build {
        #[command(flatten)]
        project: ProjectArgs,

        /// Run this task instead of `build`
        #[arg(long)]
        task: Option<String>,
    },

    /// Build, then rebuild on changes and live-reload browsers
    Watch {
        #[command(flatten)]
        project: ProjectArgs,

        /// Do not start the dev server
        #[arg(long)]
        no_serve: bool,

        /// Dev server port
        #[arg(long)]
        port: Option<u16>,

        /// Coalescing window in milliseconds
        #[arg(long)]
        debounce: Option<u32>,
    },

    /// Run a single named task
    Run {
        /// Task name (see `spipe tasks`)
        task: String,

        #[command(flatten)]
        project: ProjectArgs,
    },

    /// Remove the destination directory
    Clean {
        #[command(flatten)]
        project: ProjectArgs,
    },

    /// List registered tasks
    Tasks {
        #[command(flatten)]
        project: ProjectArgs,
    },

    /// Write a starter sitepipe.toml
    Init {
        /// Project directory (default: current directory)
        path: Option<PathBuf>,

        /// Project name (default: directory name)
        #[arg(long)]
        name: Option<String>,

        /// Overwrite an existing sitepipe.toml
        #[arg(long)]
        force: bool,
    },
}

/// Install the global `tracing` subscriber.
///
/// `SITEPIPE_LOG` wins; otherwise `-v` selects debug and the default is warn.
pub fn init_tracing(verbose: bool) {
    let fallback = if verbose { "sitepipe=debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

/// Build the progress reporter for a format.
pub(crate) fn make_progress(format: ProgressFormat, verbose: bool) -> Box<dyn ProgressReporter> {
    match format {
        ProgressFormat::Console => Box::new(ConsoleProgress::new().with_verbose(verbose)),
        ProgressFormat::Json => Box::new(JsonProgress::new()),
        ProgressFormat::Quiet => Box::new(NullProgress::new()),
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map(|cwd| cwd.join(path)).unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Load the configuration and resolve the project root.
///
/// The root is the directory holding sitepipe.toml, or the current
/// directory when none is found.
pub(crate) fn load_project(
    args: &ProjectArgs,
    extra: CliOverrides,
) -> Result<BuildContext, ConfigError> {
    let config_path = match &args.config {
        Some(path) => Some(absolute(path)),
        None => find_config(),
    };

    let (mut config, project_root) = match config_path {
        Some(path) => {
            tracing::debug!(config = %path.display(), "using config");
            let config = load_config(Some(&path))?;
            let root = project_root(&path)
                .map(Path::to_path_buf)
                .unwrap_or_else(|| absolute(Path::new(".")));
            (config, root)
        }
        None => {
            tracing::debug!("no sitepipe.toml found, using defaults");
            (default_config(), absolute(Path::new(".")))
        }
    };

    let overrides = CliOverrides { src: args.src.clone(), dest: args.dest.clone(), ..extra };
    merge_cli_overrides(&mut config, &overrides);

    // Overrides bypass file validation
    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    Ok(BuildContext::new(config, project_root))
}

/// Parse arguments and run the selected command.
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let verbose = match &cli.command {
        Commands::Build { project, .. }
        | Commands::Watch { project, .. }
        | Commands::Run { project, .. }
        | Commands::Clean { project }
        | Commands::Tasks { project } => project.verbose,
        Commands::Init { .. } => false,
    };
    init_tracing(verbose);

    match cli.command {
        Commands::Build { project, task } => {
            build::run_build(&project, task.as_deref().unwrap_or("build"))
        }
        Commands::Run { task, project } => build::run_build(&project, &task),
        Commands::Watch { project, no_serve, port, debounce } => {
            let overrides = CliOverrides { port, no_serve, debounce_ms: debounce, ..Default::default() };
            watch::run_watch(&project, overrides)
        }
        Commands::Clean { project } => build::run_clean(&project),
        Commands::Tasks { project } => info::run_tasks(&project),
        Commands::Init { path, name, force } => info::run_init(path.as_deref(), name.as_deref(), force),
    }
}
