//! Build pipeline for sitepipe
//!
//! Turns a source tree into the deployable output tree by running named
//! pipeline steps in a declared order.
//!
//! # Overview
//!
//! The build pipeline consists of:
//! - **Discovery**: Glob each step's source set from the source root
//! - **Steps**: Read sources, apply the transform chain, write the destination
//! - **Graphs**: Run steps in sequence or as parallel sets
//! - **Registry**: Look tasks up by name, stock ones and `[tasks]` declarations
//!
//! # Example
//!
//! ```ignore
//! use sitepipe::build::{project_registry, BuildContext, ConsoleProgress};
//! use sitepipe::config::load_config;
//!
//! let config = load_config(None)?;
//! let context = BuildContext::new(config, project_root);
//! let registry = project_registry(&context)?;
//!
//! let report = registry.resolve_graph("build")?.execute(&ConsoleProgress::new());
//! println!("{}", report.summary());
//! ```

pub mod context;
pub mod defaults;
pub mod discovery;
pub mod error;
pub mod graph;
pub mod parallel;
pub mod progress;
pub mod registry;
pub mod result;
pub mod step;
pub mod target;

pub use context::*;
pub use defaults::*;
pub use discovery::*;
pub use error::*;
pub use graph::*;
pub use parallel::*;
pub use progress::*;
pub use registry::*;
pub use result::*;
pub use step::*;
pub use target::*;
