//! Configuration schema types for `sitepipe.toml`
//!
//! Defines the structure and validation rules for a site project: where the
//! sources live, where output goes, extra task declarations and watch
//! bindings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::transforms::TransformSpec;

/// What a watch binding asks connected browsers to do after its rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReloadMode {
    /// Full page reload
    #[default]
    Full,
    /// Push rebuilt stylesheets for hot injection
    Inject,
    /// Rebuild silently
    None,
}

impl std::fmt::Display for ReloadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReloadMode::Full => write!(f, "full"),
            ReloadMode::Inject => write!(f, "inject"),
            ReloadMode::None => write!(f, "none"),
        }
    }
}

/// Project metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (required)
    pub name: String,
    /// Source tree root
    #[serde(default = "default_src")]
    pub src: PathBuf,
    /// Output tree root
    #[serde(default = "default_dest")]
    pub dest: PathBuf,
}

fn default_src() -> PathBuf {
    PathBuf::from("src")
}

fn default_dest() -> PathBuf {
    PathBuf::from("dest")
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Source and destination layout.
///
/// Source patterns are relative to `project.src`, destination directories to
/// `project.dest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub html: Vec<String>,
    /// Directory `@@include` paths are resolved against
    pub partials: PathBuf,
    pub assets: Vec<String>,
    /// Patterns removed from the `assets` copy
    pub assets_exclude: Vec<String>,
    pub css: Vec<String>,
    pub plugins_css: Vec<String>,
    pub vendor_css: Vec<String>,
    pub fonts: Vec<String>,
    pub images: Vec<String>,
    pub js: Vec<String>,
    pub plugins_js: Vec<String>,
    /// Vendor scripts, concatenated in this order
    pub vendor_js: Vec<String>,
    pub main_js: Vec<String>,
    pub media: Vec<String>,
    pub php: Vec<String>,
    pub scss: Vec<String>,
    pub style: Vec<String>,
    pub custom: Vec<String>,

    pub dest_assets: PathBuf,
    pub dest_css: PathBuf,
    pub dest_js: PathBuf,
    pub dest_images: PathBuf,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            html: strings(&["html/*.html"]),
            partials: PathBuf::from("partials"),
            assets: strings(&["assets/**/*"]),
            assets_exclude: strings(&["assets/scss/**/*"]),
            css: strings(&["assets/css/**/*"]),
            plugins_css: strings(&["assets/css/plugins/**/*"]),
            vendor_css: strings(&["assets/css/vendor/**/*"]),
            fonts: strings(&["assets/fonts/**/*"]),
            images: strings(&["assets/images/**/*"]),
            js: strings(&["assets/js/**/*"]),
            plugins_js: strings(&["assets/js/plugins/**/*"]),
            vendor_js: strings(&[
                "assets/js/vendor/modernizr-3.11.2.min.js",
                "assets/js/vendor/jquery-3.5.1.min.js",
                "assets/js/vendor/jquery-migrate-3.3.0.min.js",
                "assets/js/vendor/bootstrap.bundle.min.js",
            ]),
            main_js: strings(&["assets/js/main.js"]),
            media: strings(&["assets/media/**/*"]),
            php: strings(&["assets/php/**/*"]),
            scss: strings(&["assets/scss/**/*"]),
            style: strings(&["assets/scss/style.scss"]),
            custom: strings(&["assets/scss/custom.scss"]),
            dest_assets: PathBuf::from("assets"),
            dest_css: PathBuf::from("assets/css"),
            dest_js: PathBuf::from("assets/js"),
            dest_images: PathBuf::from("assets/images"),
        }
    }
}

/// Minimum browser versions used for prefixing and syntax lowering.
///
/// Versions are `"major"`, `"major.minor"` or `"major.minor.patch"` strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowsersConfig {
    pub android: Option<String>,
    pub chrome: Option<String>,
    pub edge: Option<String>,
    pub firefox: Option<String>,
    pub ie: Option<String>,
    pub ios_saf: Option<String>,
    pub opera: Option<String>,
    pub safari: Option<String>,
    pub samsung: Option<String>,
}

impl BrowsersConfig {
    /// The browser floor shipped by default
    pub fn legacy() -> Self {
        Self {
            android: Some("4".to_string()),
            chrome: Some("34".to_string()),
            edge: None,
            firefox: Some("30".to_string()),
            ie: Some("9".to_string()),
            ios_saf: Some("7".to_string()),
            opera: Some("23".to_string()),
            safari: Some("7".to_string()),
            samsung: None,
        }
    }

    /// All configured `(browser, version)` pairs
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        let fields: [(&'static str, &Option<String>); 9] = [
            ("android", &self.android),
            ("chrome", &self.chrome),
            ("edge", &self.edge),
            ("firefox", &self.firefox),
            ("ie", &self.ie),
            ("ios_saf", &self.ios_saf),
            ("opera", &self.opera),
            ("safari", &self.safari),
            ("samsung", &self.samsung),
        ];
        fields.into_iter().filter_map(|(name, v)| v.as_deref().map(|v| (name, v))).collect()
    }
}

/// Stylesheet tooling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CssConfig {
    /// Browser targets for autoprefixing and nesting lowering
    #[serde(default = "BrowsersConfig::legacy")]
    pub browsers: BrowsersConfig,
}

impl Default for CssConfig {
    fn default() -> Self {
        Self { browsers: BrowsersConfig::legacy() }
    }
}

/// Image optimization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// JPEG re-encode quality (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_jpeg_quality() -> u8 {
    80
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self { jpeg_quality: default_jpeg_quality() }
    }
}

/// An entry of a declared graph: a task name, or a set of task names that
/// may run concurrently
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GraphEntryConfig {
    Task(String),
    Parallel(Vec<String>),
}

/// A task declared in `[tasks.NAME]`.
///
/// Either a step (`sources` + `dest`, optional `transforms`) or a graph
/// (`graph`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<Vec<GraphEntryConfig>>,
}

impl TaskConfig {
    /// Whether this declaration describes a graph rather than a step
    pub fn is_graph(&self) -> bool {
        self.graph.is_some()
    }
}

/// A watch binding declared in `[[watch.bindings]]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchBindingConfig {
    pub name: String,
    /// Patterns relative to `project.src`
    pub paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    /// Tasks rerun when a matching file changes
    pub tasks: Vec<String>,
    #[serde(default)]
    pub reload: ReloadMode,
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Coalescing window in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
    /// Clear terminal between rebuilds
    #[serde(default)]
    pub clear_screen: bool,
    /// Bindings; empty means the default page/style bindings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<WatchBindingConfig>,
}

fn default_debounce_ms() -> u32 {
    100
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: default_debounce_ms(), clear_screen: false, bindings: vec![] }
    }
}

/// Live-reload dev server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    3000
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self { enabled: true, port: default_port() }
    }
}

/// Complete sitepipe.toml configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Project metadata (required)
    pub project: ProjectConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub css: CssConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    /// Extra or overriding task declarations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tasks: BTreeMap<String, TaskConfig>,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub serve: ServeConfig,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "tasks.banner.dest")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sitepipe.toml: '{}' {}", self.field, self.message)
    }
}

/// Parse a `major[.minor[.patch]]` browser version into lightningcss' packed form.
pub fn parse_browser_version(version: &str) -> Option<u32> {
    let mut parts = version.trim().split('.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next().map(|p| p.parse().ok()).unwrap_or(Some(0))?;
    let patch: u32 = parts.next().map(|p| p.parse().ok()).unwrap_or(Some(0))?;
    if parts.next().is_some() || major > 0xFFFF || minor > 0xFF || patch > 0xFF {
        return None;
    }
    Some((major << 16) | (minor << 8) | patch)
}

impl SiteConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let mut error = |field: String, message: &str| {
            errors.push(ConfigValidationError { field, message: message.to_string() });
        };

        if self.project.name.is_empty() {
            error("project.name".to_string(), "must be a non-empty string");
        }

        for (browser, version) in self.css.browsers.entries() {
            if parse_browser_version(version).is_none() {
                error(format!("css.browsers.{}", browser), "must be a version like \"9\" or \"7.1\"");
            }
        }

        if self.images.jpeg_quality == 0 || self.images.jpeg_quality > 100 {
            error("images.jpeg_quality".to_string(), "must be between 1 and 100");
        }

        if self.watch.debounce_ms == 0 {
            error("watch.debounce_ms".to_string(), "must be a positive integer");
        }

        for (name, task) in &self.tasks {
            match &task.graph {
                Some(graph) => {
                    if !task.sources.is_empty() || task.dest.is_some() {
                        error(format!("tasks.{}", name), "cannot declare both a graph and a step");
                    }
                    if graph.is_empty() {
                        error(format!("tasks.{}.graph", name), "must contain at least one entry");
                    }
                    for entry in graph {
                        if let GraphEntryConfig::Parallel(set) = entry {
                            if set.is_empty() {
                                error(format!("tasks.{}.graph", name), "parallel sets must not be empty");
                            }
                        }
                    }
                }
                None => {
                    if task.sources.is_empty() {
                        error(
                            format!("tasks.{}.sources", name),
                            "must contain at least one glob pattern",
                        );
                    }
                    if task.dest.is_none() {
                        error(format!("tasks.{}.dest", name), "is required for a step");
                    }
                    for (i, spec) in task.transforms.iter().enumerate() {
                        if let Err(e) = spec.parse::<TransformSpec>() {
                            error(format!("tasks.{}.transforms[{}]", name, i), &e.to_string());
                        }
                    }
                }
            }
        }

        for (i, binding) in self.watch.bindings.iter().enumerate() {
            if binding.paths.is_empty() {
                error(format!("watch.bindings[{}].paths", i), "must contain at least one pattern");
            }
            if binding.tasks.is_empty() {
                error(format!("watch.bindings[{}].tasks", i), "must name at least one task");
            }
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}
