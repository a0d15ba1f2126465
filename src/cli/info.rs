//! Info command implementations (tasks, init)

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use super::{load_project, ProjectArgs, EXIT_ERROR, EXIT_STARTUP, EXIT_SUCCESS};
use crate::build::{project_registry, GraphDecl, Task};
use crate::config::{starter_config, CliOverrides, CONFIG_FILE};

/// One listing line for a task.
pub(crate) fn describe_task(name: &str, task: &Task) -> String {
    match task {
        Task::Step(step) => {
            let transforms = step.transform_names();
            let chain = if transforms.is_empty() { "copy".to_string() } else { transforms.join(" → ") };
            format!(
                "{:<16} step   {} [{}] → {}",
                name,
                step.sources().patterns().join(", "),
                chain,
                step.dest().dir.display()
            )
        }
        Task::Graph(entries) => {
            let parts: Vec<String> = entries
                .iter()
                .map(|entry| match entry {
                    GraphDecl::Task(member) => member.clone(),
                    GraphDecl::Parallel(members) => format!("{{{}}}", members.join(", ")),
                })
                .collect();
            format!("{:<16} graph  {}", name, parts.join(" → "))
        }
    }
}

/// Execute the tasks command
pub fn run_tasks(args: &ProjectArgs) -> ExitCode {
    let ctx = match load_project(args, CliOverrides::default()) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    match project_registry(&ctx) {
        Ok(registry) => {
            println!("Tasks ({}):", registry.len());
            for (name, task) in registry.tasks() {
                println!("  {}", describe_task(name, task));
            }
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_STARTUP)
        }
    }
}

/// Execute the init command
pub fn run_init(path: Option<&Path>, name: Option<&str>, force: bool) -> ExitCode {
    let project_path = match path {
        Some(p) => p.to_path_buf(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };

    let project_name = name
        .map(|n| n.to_string())
        .or_else(|| project_path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "site".to_string());

    let config_path = project_path.join(CONFIG_FILE);
    if config_path.exists() && !force {
        eprintln!("Error: {} already exists", config_path.display());
        eprintln!("Use --force to overwrite it");
        return ExitCode::from(EXIT_ERROR);
    }

    if let Err(e) = fs::create_dir_all(&project_path) {
        eprintln!("Error: cannot create {}: {}", project_path.display(), e);
        return ExitCode::from(EXIT_ERROR);
    }

    match fs::write(&config_path, starter_config(&project_name)) {
        Ok(()) => {
            println!("Created {} for '{}'", config_path.display(), project_name);
            println!();
            println!("Next steps:");
            println!("  put pages in src/html, partials in src/partials, assets in src/assets");
            println!("  spipe build");
            println!("  spipe watch");
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: cannot write {}: {}", config_path.display(), e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
