//! Stylesheet adapters: SCSS compilation, autoprefixing and minification.
//!
//! The SCSS front end handles the subset the page templates use: `//`
//! comments, `@import` of partials and `$variables`. Nesting, vendor
//! prefixing and minification are done by lightningcss for the configured
//! browser targets.

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

use super::parsing::OutputStyle;
use super::types::{Transform, TransformError};
use crate::asset::{Asset, Bundle};
use crate::config::{parse_browser_version, BrowsersConfig};

/// Stylesheet compilation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StyleError {
    #[error("cannot find stylesheet to import: '{0}'")]
    ImportNotFound(String),
    #[error("circular import of {}", .0.display())]
    CircularImport(PathBuf),
    #[error("line {line}: undefined variable ${name}")]
    UndefinedVariable { name: String, line: usize },
    #[error("line {line}: {message}")]
    Unbalanced { line: usize, message: String },
    #[error("{0}")]
    Css(String),
    #[error("error reading '{}': {1}", .0.display())]
    Io(PathBuf, String),
}

/// Build lightningcss targets from the configured browser floor.
pub fn css_targets(browsers: &BrowsersConfig) -> Targets {
    let version = |v: &Option<String>| v.as_deref().and_then(parse_browser_version);
    Targets::from(Browsers {
        android: version(&browsers.android),
        chrome: version(&browsers.chrome),
        edge: version(&browsers.edge),
        firefox: version(&browsers.firefox),
        ie: version(&browsers.ie),
        ios_saf: version(&browsers.ios_saf),
        opera: version(&browsers.opera),
        safari: version(&browsers.safari),
        samsung: version(&browsers.samsung),
    })
}

/// Parse, optionally minify, and print a stylesheet.
fn process_css(
    code: &str,
    filename: &str,
    browsers: Option<&BrowsersConfig>,
    minify: bool,
    error_recovery: bool,
) -> Result<String, StyleError> {
    let targets = || browsers.map(css_targets).unwrap_or_default();
    let options = ParserOptions {
        filename: filename.to_string(),
        error_recovery,
        ..ParserOptions::default()
    };

    let mut sheet =
        StyleSheet::parse(code, options).map_err(|e| StyleError::Css(e.to_string()))?;
    sheet
        .minify(MinifyOptions { targets: targets(), ..MinifyOptions::default() })
        .map_err(|e| StyleError::Css(e.to_string()))?;
    let printed = sheet
        .to_css(PrinterOptions { minify, targets: targets(), ..PrinterOptions::default() })
        .map_err(|e| StyleError::Css(e.to_string()))?;
    Ok(printed.code)
}

fn variable_decl_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*\$([A-Za-z_][\w-]*)[ \t]*:[ \t]*([^;]*?)[ \t]*(!default)?[ \t]*;[ \t]*\n?")
            .expect("variable declaration pattern is valid")
    })
}

fn variable_use_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$([A-Za-z_][\w-]*)").expect("variable use pattern is valid")
    })
}

fn import_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"@import\s+([^;]+);").expect("import pattern is valid"))
}

/// Remove `//` line comments, leaving strings, `url(...)` and block comments alone.
pub fn strip_line_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut quote: Option<char> = None;
    let mut in_block = false;
    let mut in_url = false;
    let mut prev = '\0';

    while let Some(c) = chars.next() {
        if in_block {
            out.push(c);
            if prev == '*' && c == '/' {
                in_block = false;
            }
        } else if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
                prev = '\0';
                continue;
            }
            if c == q {
                quote = None;
            }
        } else if in_url {
            out.push(c);
            if c == ')' {
                in_url = false;
            }
        } else if c == '/' && chars.peek() == Some(&'/') {
            for skipped in chars.by_ref() {
                if skipped == '\n' {
                    out.push('\n');
                    break;
                }
            }
            prev = '\n';
            continue;
        } else if c == '/' && chars.peek() == Some(&'*') {
            in_block = true;
            out.push(c);
            out.push('*');
            chars.next();
            prev = '\0';
            continue;
        } else {
            if c == '"' || c == '\'' {
                quote = Some(c);
            } else if c == '(' && out.to_ascii_lowercase().ends_with("url") {
                in_url = true;
            }
            out.push(c);
        }
        prev = c;
    }
    out
}

/// Line number (1-based) of a byte offset.
fn line_of(text: &str, offset: usize) -> usize {
    text[..offset.min(text.len())].matches('\n').count() + 1
}

/// Substitute `$variables`, reading declarations in document order.
pub fn substitute_variables(text: &str) -> Result<String, StyleError> {
    let mut vars: HashMap<String, String> = HashMap::new();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    let substitute = |segment: &str, offset: usize, vars: &HashMap<String, String>| {
        let mut result = String::with_capacity(segment.len());
        let mut seg_last = 0;
        for caps in variable_use_pattern().captures_iter(segment) {
            let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
            let name = &caps[1];
            let value = vars.get(name).ok_or_else(|| StyleError::UndefinedVariable {
                name: name.to_string(),
                line: line_of(text, offset + whole.start),
            })?;
            result.push_str(&segment[seg_last..whole.start]);
            result.push_str(value);
            seg_last = whole.end;
        }
        result.push_str(&segment[seg_last..]);
        Ok::<String, StyleError>(result)
    };

    for caps in variable_decl_pattern().captures_iter(text) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        out.push_str(&substitute(&text[last..whole.start], last, &vars)?);
        last = whole.end;

        let name = caps[1].to_string();
        let is_default = caps.get(3).is_some();
        if is_default && vars.contains_key(&name) {
            continue;
        }
        let value_offset = caps.get(2).map(|m| m.start()).unwrap_or(whole.start);
        let value = substitute(&caps[2], value_offset, &vars)?;
        vars.insert(name, value);
    }

    out.push_str(&substitute(&text[last..], last, &vars)?);
    Ok(out)
}

/// Check that braces balance outside strings and comments.
pub fn check_braces(text: &str) -> Result<(), StyleError> {
    let mut depth: i64 = 0;
    let mut line = 1;
    let mut open_lines = Vec::new();
    let mut quote: Option<char> = None;
    let mut in_block = false;
    let mut chars = text.chars().peekable();
    let mut prev = '\0';

    while let Some(c) = chars.next() {
        if c == '\n' {
            line += 1;
        }
        if in_block {
            if prev == '*' && c == '/' {
                in_block = false;
            }
        } else if let Some(q) = quote {
            if c == '\\' {
                chars.next();
                prev = '\0';
                continue;
            }
            if c == q || c == '\n' {
                quote = None;
            }
        } else {
            match c {
                '"' | '\'' => quote = Some(c),
                '/' if chars.peek() == Some(&'*') => {
                    in_block = true;
                    chars.next();
                    prev = '\0';
                    continue;
                }
                '{' => {
                    depth += 1;
                    open_lines.push(line);
                }
                '}' => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(StyleError::Unbalanced {
                            line,
                            message: "unexpected '}'".to_string(),
                        });
                    }
                    open_lines.pop();
                }
                _ => {}
            }
        }
        prev = c;
    }

    match open_lines.first() {
        Some(&opened) => Err(StyleError::Unbalanced {
            line: opened,
            message: "unclosed block '{'".to_string(),
        }),
        None => Ok(()),
    }
}

/// Split an `@import` argument list into quoted names.
fn import_names(args: &str) -> Option<Vec<String>> {
    args.split(',')
        .map(|part| {
            let part = part.trim();
            let quoted = (part.starts_with('"') && part.ends_with('"'))
                || (part.starts_with('\'') && part.ends_with('\''));
            if quoted && part.len() >= 2 {
                Some(part[1..part.len() - 1].to_string())
            } else {
                None
            }
        })
        .collect()
}

/// Plain CSS imports are left for the browser.
fn is_css_import(name: &str) -> bool {
    name.ends_with(".css") || name.starts_with("http://") || name.starts_with("https://")
}

/// SCSS compiler adapter.
#[derive(Debug, Clone)]
pub struct ScssCompile {
    name: String,
    style: OutputStyle,
    load_paths: Vec<PathBuf>,
    browsers: BrowsersConfig,
}

impl ScssCompile {
    pub fn new(style: OutputStyle, browsers: BrowsersConfig) -> Self {
        let name = match style {
            OutputStyle::Expanded => "scss:expanded",
            OutputStyle::Compressed => "scss:compressed",
        };
        Self { name: name.to_string(), style, load_paths: vec![], browsers }
    }

    /// Extra directories searched for `@import`.
    pub fn with_load_paths(mut self, load_paths: Vec<PathBuf>) -> Self {
        self.load_paths = load_paths;
        self
    }

    fn locate_import(&self, name: &str, current_dir: Option<&Path>) -> Option<PathBuf> {
        let relative = Path::new(name);
        let file_name = relative.file_name()?.to_string_lossy().into_owned();
        let parent = relative.parent().unwrap_or(Path::new(""));

        let mut variants = vec![
            parent.join(format!("_{}.scss", file_name)),
            parent.join(format!("{}.scss", file_name)),
        ];
        if relative.extension().is_some() {
            variants.push(parent.join(format!("_{}", file_name)));
            variants.push(relative.to_path_buf());
        }

        current_dir
            .into_iter()
            .chain(self.load_paths.iter().map(PathBuf::as_path))
            .flat_map(|dir| variants.iter().map(move |v| dir.join(v)))
            .find(|p| p.is_file())
    }

    /// Strip comments and inline imports, recursively.
    fn inline_imports(
        &self,
        text: &str,
        current_dir: Option<&Path>,
        stack: &mut Vec<PathBuf>,
    ) -> Result<String, StyleError> {
        let text = strip_line_comments(text);
        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for caps in import_pattern().captures_iter(&text) {
            let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
            let Some(names) = import_names(&caps[1]) else {
                continue;
            };
            if names.iter().all(|n| is_css_import(n)) {
                continue;
            }

            out.push_str(&text[last..whole.start]);
            last = whole.end;

            for name in names {
                if is_css_import(&name) {
                    out.push_str(&format!("@import \"{}\";\n", name));
                    continue;
                }
                let found = self
                    .locate_import(&name, current_dir)
                    .ok_or_else(|| StyleError::ImportNotFound(name.clone()))?;
                if stack.contains(&found) {
                    return Err(StyleError::CircularImport(found));
                }
                let body = fs::read_to_string(&found)
                    .map_err(|e| StyleError::Io(found.clone(), e.to_string()))?;
                stack.push(found.clone());
                let inlined = self.inline_imports(&body, found.parent(), stack)?;
                stack.pop();
                out.push_str(&inlined);
                out.push('\n');
            }
        }

        out.push_str(&text[last..]);
        Ok(out)
    }

    /// Compile one SCSS source to CSS.
    pub fn compile(&self, source: &str, origin: Option<&Path>) -> Result<String, StyleError> {
        let mut stack: Vec<PathBuf> = origin.iter().map(|p| p.to_path_buf()).collect();
        let inlined = self.inline_imports(source, origin.and_then(Path::parent), &mut stack)?;
        let substituted = substitute_variables(&inlined)?;
        check_braces(&substituted)?;

        let filename = origin.map(|p| p.display().to_string()).unwrap_or_default();
        let minify = self.style == OutputStyle::Compressed;
        process_css(&substituted, &filename, Some(&self.browsers), minify, false)
    }
}

impl Transform for ScssCompile {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, bundle: Bundle) -> Result<Bundle, TransformError> {
        let mut out = Bundle::new();
        for asset in bundle {
            if asset.is_partial() {
                continue;
            }
            let css = self
                .compile(&asset.text(), asset.origin.as_deref())
                .map_err(|e| TransformError::new(self.name(), e.to_string()).at(&asset.path))?;
            let mut compiled = asset.with_contents(css);
            compiled.path.set_extension("css");
            out.push(compiled);
        }
        Ok(out)
    }
}

/// Vendor prefixing for the configured browser targets.
///
/// Entries named `*.min.css` stay minified.
#[derive(Debug, Clone)]
pub struct Autoprefix {
    browsers: BrowsersConfig,
}

impl Autoprefix {
    pub fn new(browsers: BrowsersConfig) -> Self {
        Self { browsers }
    }
}

fn is_minified_name(asset: &Asset) -> bool {
    asset.path.file_name().map(|n| n.to_string_lossy().contains(".min.")).unwrap_or(false)
}

impl Transform for Autoprefix {
    fn name(&self) -> &str {
        "autoprefix"
    }

    fn apply(&self, bundle: Bundle) -> Result<Bundle, TransformError> {
        bundle.try_map(|asset| {
            let filename = asset.path.display().to_string();
            let css = process_css(
                &asset.text(),
                &filename,
                Some(&self.browsers),
                is_minified_name(&asset),
                true,
            )
            .map_err(|e| TransformError::new("autoprefix", e.to_string()).at(&asset.path))?;
            Ok(asset.with_contents(css))
        })
    }
}

/// Whitespace and syntax minification, no browser lowering.
#[derive(Debug, Clone, Default)]
pub struct MinifyCss;

impl MinifyCss {
    pub fn new() -> Self {
        Self
    }
}

/// Minify one stylesheet.
pub fn minify_css(code: &str) -> Result<String, StyleError> {
    process_css(code, "", None, true, true)
}

impl Transform for MinifyCss {
    fn name(&self) -> &str {
        "minify_css"
    }

    fn apply(&self, bundle: Bundle) -> Result<Bundle, TransformError> {
        bundle.try_map(|asset| {
            let css = minify_css(&asset.text())
                .map_err(|e| TransformError::new("minify_css", e.to_string()).at(&asset.path))?;
            Ok(asset.with_contents(css))
        })
    }
}
