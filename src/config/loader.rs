//! Finding, reading and overriding `sitepipe.toml`.

use super::schema::{
    CssConfig, ImagesConfig, LayoutConfig, ProjectConfig, ServeConfig, SiteConfig, WatchConfig,
};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the project configuration file
pub const CONFIG_FILE: &str = "sitepipe.toml";

/// Why a configuration could not be loaded.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse sitepipe.toml: {0}")]
    Parse(#[from] toml::de::Error),

    /// Every rule the file breaks, one message each
    #[error("Invalid configuration:{}", .0.iter().map(|e| format!("\n  - {}", e)).collect::<String>())]
    Validation(Vec<String>),
}

/// Command-line flags that take precedence over the file.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub src: Option<PathBuf>,
    pub dest: Option<PathBuf>,
    pub port: Option<u16>,
    /// `--no-serve`
    pub no_serve: bool,
    pub debounce_ms: Option<u32>,
}

/// Search the current directory and its ancestors for sitepipe.toml.
pub fn find_config() -> Option<PathBuf> {
    env::current_dir().ok().and_then(find_config_from)
}

/// Search `start` and its ancestors for sitepipe.toml.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    start.ancestors().map(|dir| dir.join(CONFIG_FILE)).find(|candidate| candidate.is_file())
}

/// Load the given file, or the discovered one, or fall back to defaults.
pub fn load_config(path: Option<&Path>) -> Result<SiteConfig, ConfigError> {
    match path.map(Path::to_path_buf).or_else(find_config) {
        Some(file) => parse_config(&fs::read_to_string(file)?),
        None => Ok(default_config()),
    }
}

/// Parse TOML text and reject it unless it validates.
pub fn parse_config(contents: &str) -> Result<SiteConfig, ConfigError> {
    let config: SiteConfig = toml::from_str(contents)?;
    match config.validate() {
        errors if errors.is_empty() => Ok(config),
        errors => Err(ConfigError::Validation(errors.iter().map(ToString::to_string).collect())),
    }
}

/// Configuration used when no sitepipe.toml exists, named after the
/// current directory.
pub fn default_config() -> SiteConfig {
    let name = env::current_dir()
        .ok()
        .and_then(|dir| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "site".to_string());

    SiteConfig {
        project: ProjectConfig { name, src: PathBuf::from("src"), dest: PathBuf::from("dest") },
        layout: LayoutConfig::default(),
        css: CssConfig::default(),
        images: ImagesConfig::default(),
        tasks: BTreeMap::new(),
        watch: WatchConfig::default(),
        serve: ServeConfig::default(),
    }
}

/// Apply command-line flags on top of a loaded configuration.
pub fn merge_cli_overrides(config: &mut SiteConfig, overrides: &CliOverrides) {
    if let Some(src) = &overrides.src {
        config.project.src = src.clone();
    }
    if let Some(dest) = &overrides.dest {
        config.project.dest = dest.clone();
    }
    if let Some(port) = overrides.port {
        config.serve.port = port;
    }
    if let Some(debounce_ms) = overrides.debounce_ms {
        config.watch.debounce_ms = debounce_ms;
    }
    config.serve.enabled &= !overrides.no_serve;
}

/// Directory holding a config file.
pub fn project_root(config_path: &Path) -> Option<&Path> {
    config_path.parent()
}

/// Anchor `path` at `project_root` unless it is already absolute.
pub fn resolve_path(project_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}

/// Render a starter sitepipe.toml for `spipe init`.
pub fn starter_config(name: &str) -> String {
    let mut config = default_config();
    config.project.name = name.to_string();
    let project = toml::to_string(&config.project).unwrap_or_default();
    let watch = format!("debounce_ms = {}\nclear_screen = false\n", config.watch.debounce_ms);
    let serve = format!("enabled = true\nport = {}\n", config.serve.port);
    format!(
        "[project]\n{}\n[watch]\n{}\n[serve]\n{}\n\
         # Extra tasks, e.g.\n\
         # [tasks.docs]\n\
         # sources = [\"docs/**/*.txt\"]\n\
         # transforms = [\"concat:docs.txt\"]\n\
         # dest = \"docs\"\n",
        project, watch, serve
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn project_with_config(text: &str) -> (TempDir, PathBuf) {
        let temp = TempDir::new().expect("should create temp dir");
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, text).expect("should write config");
        (temp, path)
    }

    /// Run `f` with the working directory set to `dir`.
    fn in_dir<T>(dir: &Path, f: impl FnOnce() -> T) -> T {
        let previous = env::current_dir().expect("should read current dir");
        env::set_current_dir(dir).expect("should change dir");
        let value = f();
        env::set_current_dir(previous).expect("should restore dir");
        value
    }

    #[test]
    fn test_discovery_walks_ancestors() {
        let (temp, path) = project_with_config("[project]\nname = \"walk\"\n");
        assert_eq!(find_config_from(temp.path().to_path_buf()), Some(path.clone()));

        let deep = temp.path().join("src/html/blog");
        fs::create_dir_all(&deep).expect("should create subdirectories");
        assert_eq!(find_config_from(deep), Some(path));
    }

    #[test]
    fn test_discovery_ignores_directories_named_like_config() {
        let temp = TempDir::new().expect("should create temp dir");
        fs::create_dir(temp.path().join(CONFIG_FILE)).expect("should create dir");
        assert_eq!(find_config_from(temp.path().to_path_buf()), None);
    }

    #[test]
    fn test_load_explicit_file() {
        let (_temp, path) = project_with_config(
            r#"
[project]
name = "agency"
dest = "public"

[watch]
debounce_ms = 25
"#,
        );

        let config = load_config(Some(&path)).expect("should load valid config");
        assert_eq!(config.project.name, "agency");
        assert_eq!(config.project.src, PathBuf::from("src"));
        assert_eq!(config.project.dest, PathBuf::from("public"));
        assert_eq!(config.watch.debounce_ms, 25);
    }

    #[test]
    fn test_load_errors_by_kind() {
        let temp = TempDir::new().expect("should create temp dir");
        let missing = load_config(Some(&temp.path().join("absent.toml")));
        assert!(matches!(missing, Err(ConfigError::Io(_))));

        assert!(matches!(parse_config("[project\nname ="), Err(ConfigError::Parse(_))));

        let Err(ConfigError::Validation(errors)) =
            parse_config("[project]\nname = \"\"\n\n[watch]\ndebounce_ms = 0\n")
        else {
            panic!("expected validation failure");
        };
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_validation_message_lists_each_problem() {
        let err = ConfigError::Validation(vec!["first".into(), "second".into()]);
        assert_eq!(err.to_string(), "Invalid configuration:\n  - first\n  - second");
    }

    #[test]
    fn test_overrides_take_precedence() {
        let (_temp, path) = project_with_config("[project]\nname = \"o\"\n\n[serve]\nport = 8080\n");
        let mut config = load_config(Some(&path)).expect("should load");

        merge_cli_overrides(
            &mut config,
            &CliOverrides {
                src: Some(PathBuf::from("site")),
                dest: Some(PathBuf::from("dist")),
                port: Some(4000),
                no_serve: true,
                debounce_ms: Some(10),
            },
        );
        assert_eq!(config.project.src, PathBuf::from("site"));
        assert_eq!(config.project.dest, PathBuf::from("dist"));
        assert_eq!(config.serve.port, 4000);
        assert!(!config.serve.enabled);
        assert_eq!(config.watch.debounce_ms, 10);
    }

    #[test]
    fn test_no_overrides_is_a_no_op() {
        let (_temp, path) = project_with_config("[project]\nname = \"o\"\n\n[serve]\nport = 8080\n");
        let mut config = load_config(Some(&path)).expect("should load");
        merge_cli_overrides(&mut config, &CliOverrides::default());
        assert_eq!(config.serve.port, 8080);
        assert!(config.serve.enabled);
        assert_eq!(config.project.dest, PathBuf::from("dest"));
    }

    #[test]
    fn test_path_helpers() {
        let config_path = Path::new("/work/site/sitepipe.toml");
        let root = project_root(config_path).expect("has a parent");
        assert_eq!(root, Path::new("/work/site"));
        assert_eq!(resolve_path(root, Path::new("/elsewhere")), PathBuf::from("/elsewhere"));
        assert_eq!(resolve_path(root, Path::new("src/html")), PathBuf::from("/work/site/src/html"));
    }

    #[test]
    fn test_starter_config_parses() {
        let config = parse_config(&starter_config("brochure")).expect("starter config should be valid");
        assert_eq!(config.project.name, "brochure");
        assert_eq!(config.serve.port, 3000);
        assert!(config.tasks.is_empty());
    }

    #[test]
    #[serial]
    fn test_load_config_searches_from_current_dir() {
        let (temp, _) = project_with_config("[project]\nname = \"found\"\n");
        let nested = temp.path().join("src/assets");
        fs::create_dir_all(&nested).expect("should create subdirectories");

        let config = in_dir(&nested, || load_config(None)).expect("should load found config");
        assert_eq!(config.project.name, "found");
    }

    #[test]
    #[serial]
    fn test_default_config_named_after_current_dir() {
        let temp = TempDir::new().expect("should create temp dir");
        let project = temp.path().join("landing-page");
        fs::create_dir_all(&project).expect("should create project dir");

        let config = in_dir(&project, default_config);
        assert_eq!(config.project.name, "landing-page");
        assert!(config.is_valid());
    }
}
