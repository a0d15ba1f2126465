//! The stock task set and `[tasks]` declarations from sitepipe.toml.

use super::context::BuildContext;
use super::discovery::SourceSet;
use super::registry::{GraphDecl, RegistryError, TaskRegistry};
use super::step::PipelineStep;
use super::target::DestinationTarget;
use crate::config::{GraphEntryConfig, TaskConfig};
use crate::transforms::{build_chain, TransformContext};

/// Steps of the `styles` graph.
pub const STYLE_STEPS: [&str; 4] = ["style_css", "style_min_css", "custom_css", "custom_min_css"];

/// Steps of the `scripts` graph.
pub const SCRIPT_STEPS: [&str; 3] = ["plugins_js", "vendor_js", "main_js"];

/// Build the registry for a project: stock tasks first, then every
/// `[tasks.NAME]` declaration, which may override a stock task.
pub fn project_registry(ctx: &BuildContext) -> Result<TaskRegistry, RegistryError> {
    let mut registry = TaskRegistry::new();
    register_defaults(&mut registry, ctx)?;
    register_config_tasks(&mut registry, ctx)?;
    Ok(registry)
}

struct StepFactory<'a> {
    ctx: &'a BuildContext,
    transforms: TransformContext,
}

impl StepFactory<'_> {
    fn step(
        &self,
        name: &str,
        patterns: &[String],
        exclude: &[String],
        chain: &[&str],
        dest: DestinationTarget,
    ) -> Result<PipelineStep, RegistryError> {
        let transforms = build_chain(chain, &self.transforms)
            .map_err(|source| RegistryError::Transform { task: name.to_string(), source })?;
        let sources = SourceSet::new(name, self.ctx.src_dir(), patterns.iter().cloned())
            .with_exclude(exclude.iter().cloned());
        sources
            .validate()
            .map_err(|source| RegistryError::Pattern { task: name.to_string(), source })?;
        Ok(PipelineStep::new(name, sources, dest).with_transforms(transforms))
    }

    fn dest(&self, name: &str, relative: &std::path::Path) -> DestinationTarget {
        DestinationTarget::new(name, self.ctx.dest_path(relative))
    }
}

/// Register the stock pages/styles/scripts/images tasks and the `styles`,
/// `scripts` and `build` graphs.
pub fn register_defaults(registry: &mut TaskRegistry, ctx: &BuildContext) -> Result<(), RegistryError> {
    let layout = &ctx.config().layout;
    let factory = StepFactory { ctx, transforms: ctx.transform_context() };

    let root = DestinationTarget::new("root", ctx.dest_dir());
    let assets = factory.dest("assets", &layout.dest_assets);
    let css = factory.dest("css", &layout.dest_css);
    let js = factory.dest("js", &layout.dest_js);
    let images = factory.dest("images", &layout.dest_images);

    let steps = [
        factory.step("html", &layout.html, &[], &["file_include", "beautify"], root)?,
        factory.step("assets", &layout.assets, &layout.assets_exclude, &[], assets)?,
        factory.step(
            "plugins_css",
            &layout.plugins_css,
            &[],
            &["concat:plugins.min.css", "minify_css"],
            css.clone(),
        )?,
        factory.step(
            "vendor_css",
            &layout.vendor_css,
            &[],
            &["concat:vendor.min.css", "minify_css"],
            css.clone(),
        )?,
        factory.step(
            "style_css",
            &layout.style,
            &[],
            &["scss:expanded", "concat:style.css", "autoprefix"],
            css.clone(),
        )?,
        factory.step(
            "style_min_css",
            &layout.style,
            &[],
            &["scss:compressed", "concat:style.min.css", "autoprefix"],
            css.clone(),
        )?,
        factory.step(
            "custom_css",
            &layout.custom,
            &[],
            &["scss:expanded", "concat:custom.css", "autoprefix"],
            css.clone(),
        )?,
        factory.step(
            "custom_min_css",
            &layout.custom,
            &[],
            &["scss:compressed", "concat:custom.min.css", "autoprefix"],
            css,
        )?,
        factory.step(
            "plugins_js",
            &layout.plugins_js,
            &[],
            &["concat:plugins.min.js", "minify_js"],
            js.clone(),
        )?,
        factory.step(
            "vendor_js",
            &layout.vendor_js,
            &[],
            &["concat:vendor.min.js", "minify_js"],
            js.clone(),
        )?,
        factory.step("main_js", &layout.main_js, &[], &["concat:main.min.js", "minify_js"], js)?,
        factory.step("image_optimize", &layout.images, &[], &["optimize_images"], images)?,
    ];
    for step in steps {
        registry.register(step.name().to_string(), step);
    }

    let names = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    registry.register_graph("styles", vec![GraphDecl::Parallel(names(&STYLE_STEPS))]);
    registry.register_graph("scripts", vec![GraphDecl::Parallel(names(&SCRIPT_STEPS))]);

    let mut compile = names(&["plugins_css", "vendor_css"]);
    compile.extend(names(&STYLE_STEPS));
    compile.extend(names(&SCRIPT_STEPS));
    registry.register_graph(
        "build",
        vec![
            GraphDecl::Task("html".to_string()),
            GraphDecl::Task("assets".to_string()),
            GraphDecl::Parallel(compile),
        ],
    );

    Ok(())
}

/// Register every `[tasks.NAME]` declaration, overriding stock tasks.
pub fn register_config_tasks(
    registry: &mut TaskRegistry,
    ctx: &BuildContext,
) -> Result<(), RegistryError> {
    let factory = StepFactory { ctx, transforms: ctx.transform_context() };

    for (name, task) in &ctx.config().tasks {
        match &task.graph {
            Some(entries) => registry.register_graph(name.clone(), graph_decls(entries)),
            None => registry.register(name.clone(), config_step(&factory, name, task)?),
        }
    }
    Ok(())
}

fn config_step(factory: &StepFactory<'_>, name: &str, task: &TaskConfig) -> Result<PipelineStep, RegistryError> {
    let chain: Vec<&str> = task.transforms.iter().map(String::as_str).collect();
    let dest = match &task.dest {
        Some(dir) => factory.dest(name, dir),
        None => DestinationTarget::new(name, factory.ctx.dest_dir()),
    };
    factory.step(name, &task.sources, &task.exclude, &chain, dest)
}

fn graph_decls(entries: &[GraphEntryConfig]) -> Vec<GraphDecl> {
    entries
        .iter()
        .map(|entry| match entry {
            GraphEntryConfig::Task(name) => GraphDecl::Task(name.clone()),
            GraphEntryConfig::Parallel(names) => GraphDecl::Parallel(names.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::discovery::DiscoveryError;
    use crate::build::registry::Task;
    use crate::config::parse_config;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    fn step_of(registry: &TaskRegistry, name: &str) -> Option<Arc<PipelineStep>> {
        match registry.resolve(name).ok()? {
            Task::Step(step) => Some(Arc::clone(step)),
            Task::Graph(_) => None,
        }
    }

    fn context(toml: &str) -> BuildContext {
        BuildContext::new(parse_config(toml).unwrap(), PathBuf::from("/site"))
    }

    #[test]
    fn test_default_build_graph() {
        let registry = project_registry(&context("[project]\nname = \"demo\"\n")).unwrap();
        let graph = registry.resolve_graph("build").unwrap();
        assert_eq!(
            graph.step_names(),
            vec![
                "html",
                "assets",
                "plugins_css",
                "vendor_css",
                "style_css",
                "style_min_css",
                "custom_css",
                "custom_min_css",
                "plugins_js",
                "vendor_js",
                "main_js",
            ]
        );
        assert_eq!(graph.entries().len(), 3);
        // Images are optimised on demand only
        assert!(!graph.contains("image_optimize"));
        assert!(registry.contains("image_optimize"));
    }

    #[test]
    fn test_default_step_wiring() {
        let registry = project_registry(&context("[project]\nname = \"demo\"\n")).unwrap();

        let style = step_of(&registry, "style_min_css").unwrap();
        assert_eq!(
            style.transform_names(),
            vec!["scss:compressed", "concat:style.min.css", "autoprefix"]
        );
        assert_eq!(style.dest().dir, Path::new("/site/dest/assets/css"));
        assert_eq!(style.sources().root(), Path::new("/site/src"));

        let html = step_of(&registry, "html").unwrap();
        assert_eq!(html.dest().dir, Path::new("/site/dest"));

        let assets = step_of(&registry, "assets").unwrap();
        assert_eq!(assets.sources().exclude(), &["assets/scss/**/*".to_string()]);
        assert!(assets.transform_names().is_empty());
    }

    #[test]
    fn test_config_tasks_add_and_override() {
        let registry = project_registry(&context(
            r#"
[project]
name = "demo"

[tasks.main_js]
sources = ["assets/js/app.js"]
transforms = ["minify_js"]
dest = "assets/js"

[tasks.docs]
sources = ["docs/*.txt"]
transforms = ["concat:docs.txt"]
dest = "docs"

[tasks.release]
graph = ["build", ["docs", "image_optimize"]]
"#,
        ))
        .unwrap();

        let main = step_of(&registry, "main_js").unwrap();
        assert_eq!(main.transform_names(), vec!["minify_js"]);
        assert_eq!(main.sources().patterns(), &["assets/js/app.js".to_string()]);

        let docs = step_of(&registry, "docs").unwrap();
        assert_eq!(docs.dest().dir, Path::new("/site/dest/docs"));

        let release = registry.resolve_graph("release").unwrap();
        let names = release.step_names();
        assert_eq!(names.last(), Some(&"image_optimize"));
        assert_eq!(names.len(), 13);
    }

    #[test]
    fn test_malformed_task_pattern_rejected_at_registration() {
        let result = project_registry(&context(
            r#"
[project]
name = "demo"

[tasks.fonts]
sources = ["assets/[fonts/*.woff2"]
dest = "fonts"
"#,
        ));
        let Err(RegistryError::Pattern { task, source }) = result else {
            panic!("expected a pattern error, got {:?}", result.map(|r| r.len()));
        };
        assert_eq!(task, "fonts");
        let DiscoveryError::InvalidPattern { pattern, .. } = source;
        assert_eq!(pattern, "assets/[fonts/*.woff2");
    }

    #[test]
    fn test_malformed_exclude_rejected_at_registration() {
        let result = project_registry(&context(
            "[project]\nname = \"demo\"\n\n[tasks.docs]\nsources = [\"docs/*.txt\"]\nexclude = [\"docs/[draft\"]\n",
        ));
        assert!(matches!(result, Err(RegistryError::Pattern { ref task, .. }) if task == "docs"));
    }
}
