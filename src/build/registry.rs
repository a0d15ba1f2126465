//! Named task storage.
//!
//! A task is either a single [`PipelineStep`] or a graph declaration: an
//! ordered list of task names and parallel sets of step names. Graph members
//! are looked up when the graph is resolved, so tasks can be registered in
//! any order and overriding a step also changes every graph that names it.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

use super::discovery::DiscoveryError;
use super::error::UnknownTaskError;
use super::graph::{BuildGraph, GraphEntry};
use super::step::PipelineStep;
use crate::transforms::SpecError;

/// One entry of a declared graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphDecl {
    /// A step or another graph, run in sequence
    Task(String),
    /// Steps that may run concurrently
    Parallel(Vec<String>),
}

/// A registered task.
#[derive(Debug, Clone)]
pub enum Task {
    Step(Arc<PipelineStep>),
    Graph(Vec<GraphDecl>),
}

impl Task {
    /// Short kind label for listings.
    pub fn kind(&self) -> &'static str {
        match self {
            Task::Step(_) => "step",
            Task::Graph(_) => "graph",
        }
    }
}

impl From<PipelineStep> for Task {
    fn from(step: PipelineStep) -> Self {
        Task::Step(Arc::new(step))
    }
}

/// Errors while turning task names into a runnable graph.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    UnknownTask(#[from] UnknownTaskError),

    #[error("Task '{0}' includes itself")]
    Cycle(String),

    #[error("Parallel set in '{graph}' names graph '{member}'; only steps can run in parallel")]
    GraphInParallel { graph: String, member: String },

    #[error("Task '{task}': {source}")]
    Transform {
        task: String,
        #[source]
        source: SpecError,
    },

    #[error("Task '{task}': {source}")]
    Pattern {
        task: String,
        #[source]
        source: DiscoveryError,
    },
}

/// Lookup table of named tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. An existing task with the same name is replaced.
    pub fn register(&mut self, name: impl Into<String>, task: impl Into<Task>) {
        let name = name.into();
        if self.tasks.insert(name.clone(), task.into()).is_some() {
            tracing::debug!(task = %name, "task redefined, last definition wins");
        }
    }

    /// Register a graph declaration.
    pub fn register_graph(&mut self, name: impl Into<String>, entries: Vec<GraphDecl>) {
        self.register(name, Task::Graph(entries));
    }

    /// Look up a task by name.
    pub fn resolve(&self, name: &str) -> Result<&Task, UnknownTaskError> {
        self.tasks.get(name).ok_or_else(|| UnknownTaskError::new(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tasks.keys().map(String::as_str).collect()
    }

    /// All tasks, sorted by name.
    pub fn tasks(&self) -> impl Iterator<Item = (&String, &Task)> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Resolve a task into a runnable graph.
    ///
    /// A step becomes a one-entry graph; a graph's named members are expanded
    /// recursively.
    pub fn resolve_graph(&self, name: &str) -> Result<BuildGraph, RegistryError> {
        let mut stack = Vec::new();
        self.expand(name, &mut stack)
    }

    fn expand(&self, name: &str, stack: &mut Vec<String>) -> Result<BuildGraph, RegistryError> {
        if stack.iter().any(|n| n == name) {
            return Err(RegistryError::Cycle(name.to_string()));
        }

        let decls = match self.resolve(name)? {
            Task::Step(step) => return Ok(BuildGraph::single(Arc::clone(step))),
            Task::Graph(decls) => decls,
        };

        stack.push(name.to_string());
        let mut graph = BuildGraph::new();
        for decl in decls {
            match decl {
                GraphDecl::Task(member) => graph.extend(self.expand(member, stack)?),
                GraphDecl::Parallel(members) => {
                    let mut steps = Vec::with_capacity(members.len());
                    for member in members {
                        match self.resolve(member)? {
                            Task::Step(step) => steps.push(Arc::clone(step)),
                            Task::Graph(_) => {
                                return Err(RegistryError::GraphInParallel {
                                    graph: name.to_string(),
                                    member: member.clone(),
                                })
                            }
                        }
                    }
                    graph = graph.then_parallel(steps);
                }
            }
        }
        stack.pop();

        Ok(graph)
    }

    /// Union of several tasks' graphs, first occurrence wins.
    pub fn resolve_subgraph<S: AsRef<str>>(&self, names: &[S]) -> Result<BuildGraph, RegistryError> {
        let mut graph = BuildGraph::new();
        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name.as_ref()) {
                continue;
            }
            graph = graph.union(&self.resolve_graph(name.as_ref())?);
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::discovery::SourceSet;
    use crate::build::target::DestinationTarget;

    fn step(name: &str) -> PipelineStep {
        PipelineStep::new(
            name,
            SourceSet::new(name, "/site/src", [format!("{}/**/*", name)]),
            DestinationTarget::new("dest", "/site/dest"),
        )
    }

    fn registry() -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        for name in ["html", "assets", "style_css", "main_js"] {
            registry.register(name, step(name));
        }
        registry.register_graph(
            "build",
            vec![
                GraphDecl::Task("html".into()),
                GraphDecl::Task("assets".into()),
                GraphDecl::Parallel(vec!["style_css".into(), "main_js".into()]),
            ],
        );
        registry
    }

    #[test]
    fn test_resolve_and_unknown() {
        let registry = registry();
        assert_eq!(registry.resolve("html").unwrap().kind(), "step");
        assert_eq!(registry.resolve("build").unwrap().kind(), "graph");
        assert_eq!(registry.resolve("deploy").unwrap_err(), UnknownTaskError::new("deploy"));
    }

    #[test]
    fn test_last_write_wins() {
        let mut registry = registry();
        registry.register("html", step("pages"));
        let Task::Step(html) = registry.resolve("html").unwrap() else {
            panic!("expected a step");
        };
        assert_eq!(html.name(), "pages");
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_names_are_sorted() {
        assert_eq!(registry().names(), vec!["assets", "build", "html", "main_js", "style_css"]);
    }

    #[test]
    fn test_resolve_graph() {
        let registry = registry();
        let graph = registry.resolve_graph("build").unwrap();
        assert_eq!(graph.step_names(), vec!["html", "assets", "style_css", "main_js"]);
        assert_eq!(graph.entries().len(), 3);
        assert!(matches!(graph.entries()[2], GraphEntry::Parallel(_)));

        let single = registry.resolve_graph("main_js").unwrap();
        assert_eq!(single.step_names(), vec!["main_js"]);
    }

    #[test]
    fn test_nested_graph_and_unknown_member() {
        let mut registry = registry();
        registry.register_graph(
            "release",
            vec![GraphDecl::Task("build".into()), GraphDecl::Task("main_js".into())],
        );
        let graph = registry.resolve_graph("release").unwrap();
        assert_eq!(graph.len(), 5);

        registry.register_graph("broken", vec![GraphDecl::Task("nope".into())]);
        assert!(matches!(registry.resolve_graph("broken"), Err(RegistryError::UnknownTask(_))));
    }

    #[test]
    fn test_cycle_and_graph_in_parallel() {
        let mut registry = registry();
        registry.register_graph("loop", vec![GraphDecl::Task("loop".into())]);
        assert!(matches!(registry.resolve_graph("loop"), Err(RegistryError::Cycle(_))));

        registry.register_graph("wide", vec![GraphDecl::Parallel(vec!["build".into()])]);
        assert!(matches!(
            registry.resolve_graph("wide"),
            Err(RegistryError::GraphInParallel { .. })
        ));
    }

    #[test]
    fn test_resolve_subgraph_unions() {
        let registry = registry();
        let graph = registry.resolve_subgraph(&["main_js", "build", "main_js"]).unwrap();
        assert_eq!(graph.step_names(), vec!["main_js", "html", "assets", "style_css"]);
    }
}
