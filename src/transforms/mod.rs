//! Tool adapters applied by pipeline steps
//!
//! Every tool is wrapped behind the [`Transform`] trait and named in task
//! declarations with the `op` / `op:arg` identifier syntax parsed by
//! [`TransformSpec`].
//!
//! # Module Structure
//!
//! - [`types`] - Transform trait and error definitions
//! - [`parsing`] - Transform identifier parsing
//! - [`include`] - `@@include` partial expansion for pages
//! - [`text`] - Concatenation, renaming and markup tidying
//! - [`style`] - SCSS compilation, autoprefixing, CSS minification
//! - [`script`] - JavaScript minification
//! - [`images`] - Image re-encoding

pub mod images;
pub mod include;
pub mod parsing;
pub mod script;
pub mod style;
pub mod text;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::BrowsersConfig;

pub use images::{OptimizeImages, DEFAULT_JPEG_QUALITY};
pub use include::{FileInclude, IncludeError};
pub use parsing::{parse_chain, OutputStyle, TransformSpec};
pub use script::{minify_js, MinifyJs, ScriptError};
pub use style::{css_targets, minify_css, Autoprefix, MinifyCss, ScssCompile, StyleError};
pub use text::{beautify_markup, Beautify, Concat, Rename};
pub use types::{SpecError, Transform, TransformError};

/// Settings shared by the adapters a project builds.
#[derive(Debug, Clone)]
pub struct TransformContext {
    /// Directory searched first by `file_include`
    pub partials_dir: PathBuf,
    /// Extra `@import` search directories for `scss`
    pub scss_load_paths: Vec<PathBuf>,
    pub browsers: BrowsersConfig,
    pub jpeg_quality: u8,
}

impl Default for TransformContext {
    fn default() -> Self {
        Self {
            partials_dir: PathBuf::from("partials"),
            scss_load_paths: vec![],
            browsers: BrowsersConfig::legacy(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Instantiate the adapter for a parsed identifier.
pub fn build_transform(spec: &TransformSpec, ctx: &TransformContext) -> Arc<dyn Transform> {
    match spec {
        TransformSpec::FileInclude => Arc::new(FileInclude::new(&ctx.partials_dir)),
        TransformSpec::Beautify => Arc::new(Beautify::new()),
        TransformSpec::Scss(style) => Arc::new(
            ScssCompile::new(*style, ctx.browsers.clone())
                .with_load_paths(ctx.scss_load_paths.clone()),
        ),
        TransformSpec::Autoprefix => Arc::new(Autoprefix::new(ctx.browsers.clone())),
        TransformSpec::MinifyCss => Arc::new(MinifyCss::new()),
        TransformSpec::MinifyJs => Arc::new(MinifyJs::new()),
        TransformSpec::Concat(name) => Arc::new(Concat::new(name.clone())),
        TransformSpec::OptimizeImages => Arc::new(OptimizeImages::new(ctx.jpeg_quality)),
        TransformSpec::Rename(ext) => Arc::new(Rename::new(ext.clone())),
    }
}

/// Parse and instantiate a whole chain.
pub fn build_chain<S: AsRef<str>>(
    specs: &[S],
    ctx: &TransformContext,
) -> Result<Vec<Arc<dyn Transform>>, SpecError> {
    Ok(parse_chain(specs)?.iter().map(|spec| build_transform(spec, ctx)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_transform_names() {
        let ctx = TransformContext::default();
        let chain = build_chain(&["scss:compressed", "concat:style.min.css", "autoprefix"], &ctx)
            .unwrap();
        let names: Vec<&str> = chain.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["scss:compressed", "concat:style.min.css", "autoprefix"]);
    }

    #[test]
    fn test_build_chain_rejects_unknown() {
        let ctx = TransformContext::default();
        assert!(matches!(
            build_chain(&["file_include", "sourcemaps"], &ctx),
            Err(SpecError::UnknownOperation(_))
        ));
    }
}
