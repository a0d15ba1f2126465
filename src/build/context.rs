//! Build context containing configuration and resolved paths for a build.

use crate::build::discovery::glob_base;
use crate::config::{resolve_path, SiteConfig};
use crate::transforms::TransformContext;
use std::path::{Path, PathBuf};

/// Build context containing configuration and paths for a build operation.
///
/// Everything the registry needs to construct steps is derived from here;
/// there is no global state.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// The loaded configuration
    config: SiteConfig,
    /// Project root directory (where sitepipe.toml is located)
    project_root: PathBuf,
}

impl BuildContext {
    /// Create a new build context.
    pub fn new(config: SiteConfig, project_root: PathBuf) -> Self {
        Self { config, project_root }
    }

    /// Get the configuration.
    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// Get the project root directory.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Source root, resolved to an absolute path.
    pub fn src_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.src)
    }

    /// Destination root, resolved to an absolute path.
    pub fn dest_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.dest)
    }

    /// Resolve a layout path under the source root.
    pub fn src_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        let relative = relative.as_ref();
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.src_dir().join(relative)
        }
    }

    /// Resolve a layout path under the destination root.
    pub fn dest_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        let relative = relative.as_ref();
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.dest_dir().join(relative)
        }
    }

    /// Directory `@@include` paths are resolved against.
    pub fn partials_dir(&self) -> PathBuf {
        self.src_path(&self.config.layout.partials)
    }

    /// Anchor a relative path at the project root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        resolve_path(&self.project_root, path)
    }

    /// Adapter settings derived from the configuration.
    pub fn transform_context(&self) -> TransformContext {
        TransformContext {
            partials_dir: self.partials_dir(),
            scss_load_paths: self
                .config
                .layout
                .scss
                .iter()
                .map(|pattern| self.src_path(glob_base(pattern)))
                .collect(),
            browsers: self.config.css.browsers.clone(),
            jpeg_quality: self.config.images.jpeg_quality,
        }
    }
}
