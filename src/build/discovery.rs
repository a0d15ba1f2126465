//! Source file discovery for pipeline steps.
//!
//! A [`SourceSet`] is a named, ordered list of glob patterns (plus exclude
//! patterns) relative to a root directory. Each matched file keeps its path
//! relative to the *glob base* of the pattern that found it, the leading
//! components without glob metacharacters, so `assets/**/*` yields
//! `css/a.css` for `assets/css/a.css`.

use glob::{glob_with, MatchOptions, Pattern};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Error during source discovery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    /// Invalid glob pattern
    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A file found by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path on disk
    pub path: PathBuf,
    /// Path relative to the glob base of the matching pattern
    pub relative: PathBuf,
}

fn has_glob_meta(part: &str) -> bool {
    part.contains(['*', '?', '[', '{'])
}

/// Leading components of `pattern` that contain no glob metacharacters.
///
/// A pattern without metacharacters names a single file, whose parent
/// directory is its base.
pub fn glob_base(pattern: &str) -> PathBuf {
    let path = Path::new(pattern);
    let mut base = PathBuf::new();
    let mut literal = true;

    for component in path.components() {
        if let Component::Normal(part) = component {
            if has_glob_meta(&part.to_string_lossy()) {
                literal = false;
                break;
            }
        }
        base.push(component);
    }

    if literal {
        base.pop();
    }
    base
}

/// Named group of glob patterns identifying input files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSet {
    name: String,
    root: PathBuf,
    patterns: Vec<String>,
    exclude: Vec<String>,
}

impl SourceSet {
    /// Create a source set with patterns relative to `root`.
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        root: impl Into<PathBuf>,
        patterns: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            patterns: patterns.into_iter().map(Into::into).collect(),
            exclude: vec![],
        }
    }

    /// Add exclude patterns, also relative to the root.
    pub fn with_exclude<S: Into<String>>(mut self, exclude: impl IntoIterator<Item = S>) -> Self {
        self.exclude = exclude.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    /// Absolute pattern string with the root escaped.
    fn absolute_pattern(&self, pattern: &str) -> String {
        let root = Pattern::escape(&self.root.to_string_lossy());
        if root.is_empty() {
            pattern.to_string()
        } else {
            format!("{}/{}", root.trim_end_matches('/'), pattern)
        }
    }

    fn compile(&self, pattern: &str) -> Result<Pattern, DiscoveryError> {
        Pattern::new(&self.absolute_pattern(pattern)).map_err(|e| DiscoveryError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.msg.to_string(),
        })
    }

    fn compiled_excludes(&self) -> Result<Vec<Pattern>, DiscoveryError> {
        self.exclude.iter().map(|p| self.compile(p)).collect()
    }

    /// Check every pattern compiles.
    pub fn validate(&self) -> Result<(), DiscoveryError> {
        for pattern in self.patterns.iter().chain(&self.exclude) {
            self.compile(pattern)?;
        }
        Ok(())
    }

    /// Glob the file system.
    ///
    /// Files are returned in declared pattern order, sorted within each
    /// pattern, without duplicates. Directories are skipped.
    pub fn discover(&self) -> Result<Vec<SourceFile>, DiscoveryError> {
        let excludes = self.compiled_excludes()?;
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for pattern in &self.patterns {
            let full = self.absolute_pattern(pattern);
            let entries = glob_with(&full, MATCH_OPTIONS).map_err(|e| {
                DiscoveryError::InvalidPattern { pattern: pattern.clone(), message: e.msg.to_string() }
            })?;
            let base = self.root.join(glob_base(pattern));

            let mut matched = Vec::new();
            for entry in entries {
                match entry {
                    Ok(path) => {
                        if path.is_file()
                            && !excludes.iter().any(|ex| ex.matches_path_with(&path, MATCH_OPTIONS))
                        {
                            matched.push(path);
                        }
                    }
                    Err(e) => tracing::warn!("error reading path: {}", e),
                }
            }
            matched.sort();

            for path in matched {
                if !seen.insert(path.clone()) {
                    continue;
                }
                let relative = path
                    .strip_prefix(&base)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| path.file_name().map(PathBuf::from).unwrap_or_default());
                files.push(SourceFile { path, relative });
            }
        }

        Ok(files)
    }

    /// Whether `path` (absolute) matches an include pattern and no exclude.
    pub fn matches(&self, path: &Path) -> bool {
        let hit = |patterns: &[String]| {
            patterns.iter().any(|p| {
                self.compile(p).map(|pat| pat.matches_path_with(path, MATCH_OPTIONS)).unwrap_or(false)
            })
        };
        hit(&self.patterns) && !hit(&self.exclude)
    }

    /// Directories to subscribe to for change notifications.
    ///
    /// Each pattern contributes the nearest existing ancestor of its glob
    /// base; nested roots are folded into their parents.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = Vec::new();
        for pattern in &self.patterns {
            let mut dir = self.root.join(glob_base(pattern));
            while !dir.is_dir() {
                match dir.parent() {
                    Some(parent) if parent != dir => dir = parent.to_path_buf(),
                    _ => break,
                }
            }
            if dir.is_dir() {
                roots.push(dir);
            }
        }
        fold_roots(roots)
    }
}

/// Drop duplicates and directories nested inside another entry.
pub fn fold_roots(mut roots: Vec<PathBuf>) -> Vec<PathBuf> {
    roots.sort();
    roots.dedup();
    let mut folded: Vec<PathBuf> = Vec::new();
    for root in roots {
        if !folded.iter().any(|kept| root.starts_with(kept)) {
            folded.push(root);
        }
    }
    folded
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel).unwrap();
    }

    fn relatives(files: &[SourceFile]) -> Vec<String> {
        files.iter().map(|f| f.relative.to_string_lossy().replace('\\', "/")).collect()
    }

    #[test]
    fn test_glob_base() {
        assert_eq!(glob_base("assets/**/*"), PathBuf::from("assets"));
        assert_eq!(glob_base("assets/css/plugins/**/*"), PathBuf::from("assets/css/plugins"));
        assert_eq!(glob_base("html/*.html"), PathBuf::from("html"));
        assert_eq!(glob_base("assets/js/main.js"), PathBuf::from("assets/js"));
        assert_eq!(glob_base("*.css"), PathBuf::new());
    }

    #[test]
    fn test_discover_relative_to_glob_base() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "assets/css/a.css");
        touch(temp.path(), "assets/js/b.js");

        let set = SourceSet::new("assets", temp.path(), ["assets/**/*"]);
        let files = set.discover().unwrap();
        assert_eq!(relatives(&files), vec!["css/a.css", "js/b.js"]);
        assert_eq!(files[0].path, temp.path().join("assets/css/a.css"));
    }

    #[test]
    fn test_discover_keeps_declared_order_and_dedups() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "js/vendor/z.min.js");
        touch(temp.path(), "js/vendor/a.min.js");

        let set = SourceSet::new(
            "vendor",
            temp.path(),
            ["js/vendor/z.min.js", "js/vendor/*.js", "js/vendor/missing.js"],
        );
        let files = set.discover().unwrap();
        assert_eq!(relatives(&files), vec!["z.min.js", "a.min.js"]);
    }

    #[test]
    fn test_discover_exclude() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "assets/css/a.css");
        touch(temp.path(), "assets/scss/style.scss");

        let set = SourceSet::new("assets", temp.path(), ["assets/**/*"])
            .with_exclude(["assets/scss/**/*"]);
        assert_eq!(relatives(&set.discover().unwrap()), vec!["css/a.css"]);
    }

    #[test]
    fn test_discover_zero_matches() {
        let temp = TempDir::new().unwrap();
        let set = SourceSet::new("none", temp.path(), ["nothing/**/*.css"]);
        assert!(set.discover().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_pattern() {
        let set = SourceSet::new("bad", "/tmp", ["css/[.css"]);
        assert!(matches!(set.validate(), Err(DiscoveryError::InvalidPattern { .. })));
        assert!(set.discover().is_err());
    }

    #[test]
    fn test_matches_path() {
        let set = SourceSet::new("styles", "/site/src", ["assets/scss/**/*"])
            .with_exclude(["assets/scss/**/*.bak"]);
        assert!(set.matches(Path::new("/site/src/assets/scss/style.scss")));
        assert!(set.matches(Path::new("/site/src/assets/scss/parts/_nav.scss")));
        assert!(!set.matches(Path::new("/site/src/assets/scss/old.bak")));
        assert!(!set.matches(Path::new("/site/src/html/index.html")));
    }

    #[test]
    fn test_watch_roots_fold_nested() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "assets/css/a.css");
        touch(temp.path(), "html/index.html");

        let set = SourceSet::new(
            "pages",
            temp.path(),
            ["html/*.html", "assets/css/**/*", "assets/**/*", "partials/**/*"],
        );
        let roots = set.watch_roots();
        // partials/ does not exist, so the source root itself is watched
        assert_eq!(roots, vec![temp.path().to_path_buf()]);
    }

    #[test]
    fn test_fold_roots() {
        let roots = fold_roots(vec![
            PathBuf::from("/a/b"),
            PathBuf::from("/a"),
            PathBuf::from("/c"),
            PathBuf::from("/a/b"),
        ]);
        assert_eq!(roots, vec![PathBuf::from("/a"), PathBuf::from("/c")]);
    }
}
