//! JavaScript minification
//!
//! A conservative whitespace and comment stripper. It never renames or
//! rewrites code: string, template and regex literals pass through untouched,
//! `/*! ... */` banners are kept, and a line break survives wherever dropping
//! it could change automatic semicolon insertion.

use thiserror::Error;

use super::types::{Transform, TransformError};
use crate::asset::Bundle;

/// Minification failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ScriptError {
    pub line: usize,
    pub message: String,
}

/// Keywords after which a `/` starts a regex literal
const REGEX_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "case", "do", "else", "in", "of", "new", "delete", "void",
    "throw", "yield", "await",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gap {
    None,
    Space,
    Newline,
}

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || !c.is_ascii()
}

fn is_line_break(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

struct Minifier<'a> {
    chars: &'a [char],
    pos: usize,
    out: String,
    gap: Gap,
}

impl<'a> Minifier<'a> {
    fn error(&self, at: usize, message: &str) -> ScriptError {
        let line = self.chars[..at.min(self.chars.len())].iter().filter(|&&c| c == '\n').count() + 1;
        ScriptError { line, message: message.to_string() }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    /// Resolve pending whitespace in front of `next`.
    fn flush_gap(&mut self, next: char) {
        let gap = std::mem::replace(&mut self.gap, Gap::None);
        let Some(prev) = self.out.chars().last() else {
            return;
        };
        match gap {
            Gap::None => {}
            Gap::Newline => {
                let joinable = matches!(prev, '{' | ';' | ',' | '(' | '[')
                    || matches!(next, '}' | ')' | ']' | ',' | ';');
                if !joinable {
                    self.out.push('\n');
                }
            }
            Gap::Space => {
                let needed = (is_ident(prev) && is_ident(next))
                    || (prev == next && (prev == '+' || prev == '-'))
                    || (prev == '/' && (next == '/' || next == '*'))
                    || (prev.is_ascii_digit() && next == '.');
                if needed {
                    self.out.push(' ');
                }
            }
        }
    }

    fn emit(&mut self, c: char) {
        self.flush_gap(c);
        self.out.push(c);
    }

    /// Whether a `/` at this point opens a regex literal.
    fn regex_allowed(&self) -> bool {
        let Some(prev) = self.out.chars().last() else {
            return true;
        };
        if is_ident(prev) {
            let word: String = self
                .out
                .chars()
                .rev()
                .take_while(|&c| is_ident(c))
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            return REGEX_KEYWORDS.contains(&word.as_str());
        }
        !matches!(prev, ')' | ']' | '"' | '\'' | '`')
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek(0) {
            if is_line_break(c) {
                break;
            }
            self.pos += 1;
        }
    }

    fn block_comment(&mut self) -> Result<(), ScriptError> {
        let start = self.pos;
        let banner = self.peek(2) == Some('!');
        let mut end = None;
        let mut i = self.pos + 2;
        while i + 1 < self.chars.len() {
            if self.chars[i] == '*' && self.chars[i + 1] == '/' {
                end = Some(i + 2);
                break;
            }
            i += 1;
        }
        let end = end.ok_or_else(|| self.error(start, "unterminated comment"))?;
        let body = &self.chars[start..end];
        self.pos = end;

        if banner {
            self.flush_gap('/');
            self.out.extend(body.iter());
            self.gap = Gap::Newline;
        } else if body.iter().any(|&c| is_line_break(c)) {
            self.gap = Gap::Newline;
        } else if self.gap == Gap::None {
            self.gap = Gap::Space;
        }
        Ok(())
    }

    fn string(&mut self, quote: char) -> Result<(), ScriptError> {
        let start = self.pos;
        self.emit(quote);
        self.pos += 1;
        while let Some(c) = self.peek(0) {
            self.pos += 1;
            if c == '\\' {
                self.out.push(c);
                if let Some(escaped) = self.peek(0) {
                    self.out.push(escaped);
                    self.pos += 1;
                }
                continue;
            }
            if is_line_break(c) {
                break;
            }
            self.out.push(c);
            if c == quote {
                return Ok(());
            }
        }
        Err(self.error(start, "unterminated string literal"))
    }

    fn template(&mut self) -> Result<(), ScriptError> {
        let start = self.pos;
        self.emit('`');
        self.pos += 1;
        let mut depth = 0usize;
        while let Some(c) = self.peek(0) {
            self.pos += 1;
            self.out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = self.peek(0) {
                        self.out.push(escaped);
                        self.pos += 1;
                    }
                }
                '$' if self.peek(0) == Some('{') => {
                    self.out.push('{');
                    self.pos += 1;
                    depth += 1;
                }
                '{' if depth > 0 => depth += 1,
                '}' if depth > 0 => depth -= 1,
                '`' if depth == 0 => return Ok(()),
                _ => {}
            }
        }
        Err(self.error(start, "unterminated template literal"))
    }

    fn regex(&mut self) -> Result<(), ScriptError> {
        let start = self.pos;
        self.emit('/');
        self.pos += 1;
        let mut in_class = false;
        loop {
            let Some(c) = self.peek(0) else {
                return Err(self.error(start, "unterminated regex literal"));
            };
            if is_line_break(c) {
                return Err(self.error(start, "unterminated regex literal"));
            }
            self.pos += 1;
            self.out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = self.peek(0) {
                        self.out.push(escaped);
                        self.pos += 1;
                    }
                }
                '[' => in_class = true,
                ']' => in_class = false,
                '/' if !in_class => break,
                _ => {}
            }
        }
        while let Some(flag) = self.peek(0).filter(|c| c.is_ascii_alphabetic()) {
            self.out.push(flag);
            self.pos += 1;
        }
        Ok(())
    }

    fn run(mut self) -> Result<String, ScriptError> {
        while let Some(c) = self.peek(0) {
            match c {
                c if is_line_break(c) => {
                    self.gap = Gap::Newline;
                    self.pos += 1;
                }
                c if c.is_whitespace() => {
                    if self.gap == Gap::None {
                        self.gap = Gap::Space;
                    }
                    self.pos += 1;
                }
                '/' if self.peek(1) == Some('/') => self.skip_line_comment(),
                '/' if self.peek(1) == Some('*') => self.block_comment()?,
                '/' if self.regex_allowed() => self.regex()?,
                '"' | '\'' => self.string(c)?,
                '`' => self.template()?,
                _ => {
                    self.emit(c);
                    self.pos += 1;
                }
            }
        }
        Ok(self.out)
    }
}

/// Minify one script.
pub fn minify_js(source: &str) -> Result<String, ScriptError> {
    let chars: Vec<char> = source.chars().collect();
    Minifier { chars: &chars, pos: 0, out: String::with_capacity(source.len()), gap: Gap::None }
        .run()
}

/// Script minifier adapter.
#[derive(Debug, Clone, Default)]
pub struct MinifyJs;

impl MinifyJs {
    pub fn new() -> Self {
        Self
    }
}

impl Transform for MinifyJs {
    fn name(&self) -> &str {
        "minify_js"
    }

    fn apply(&self, bundle: Bundle) -> Result<Bundle, TransformError> {
        bundle.try_map(|asset| {
            let code = minify_js(&asset.text())
                .map_err(|e| TransformError::new("minify_js", e.to_string()).at(&asset.path))?;
            Ok(asset.with_contents(code))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Asset;

    #[test]
    fn test_strips_comments_and_whitespace() {
        let input = "// header\nvar a = 1;  /* note */\nvar b = a + 1;\n";
        assert_eq!(minify_js(input).unwrap(), "var a=1;var b=a+1;");
    }

    #[test]
    fn test_keeps_banner_comment() {
        let input = "/*! lib v1 (c) */\nvar x = 1;";
        assert_eq!(minify_js(input).unwrap(), "/*! lib v1 (c) */\nvar x=1;");
    }

    #[test]
    fn test_preserves_string_contents() {
        let input = "var s = \"a  //  b\";\nvar t = 'it\\'s  /* here */';";
        assert_eq!(minify_js(input).unwrap(), "var s=\"a  //  b\";var t='it\\'s  /* here */';");
    }

    #[test]
    fn test_preserves_template_literal() {
        let input = "const t = `x  ${ y + `inner` }  z`;";
        assert_eq!(minify_js(input).unwrap(), "const t=`x  ${ y + `inner` }  z`;");
    }

    #[test]
    fn test_regex_versus_division() {
        assert_eq!(
            minify_js("var r = /ab+c\\/[/]/gi.test(x) ? 1 : 2;").unwrap(),
            "var r=/ab+c\\/[/]/gi.test(x)?1:2;"
        );
        assert_eq!(minify_js("var d = a / b / c;").unwrap(), "var d=a/b/c;");
        assert_eq!(minify_js("return /re/.test(s)").unwrap(), "return/re/.test(s)");
    }

    #[test]
    fn test_keeps_line_breaks_for_asi() {
        assert_eq!(minify_js("let a = 1\nlet b = 2\n").unwrap(), "let a=1\nlet b=2");
        assert_eq!(minify_js("f(\n  a,\n  b\n)\n").unwrap(), "f(a,b)");
    }

    #[test]
    fn test_keeps_space_between_unary_operators() {
        assert_eq!(minify_js("a + +b; c - -d; e + f").unwrap(), "a+ +b;c- -d;e+f");
    }

    #[test]
    fn test_unterminated_string() {
        let err = minify_js("var ok = 1;\nvar s = \"abc\n;").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("string"));
    }

    #[test]
    fn test_unterminated_comment() {
        assert!(minify_js("var a; /* open").is_err());
    }

    #[test]
    fn test_minify_is_idempotent() {
        let once = minify_js("function f(a, b) {\n  return a * b; // product\n}\nf(2, 3)\n").unwrap();
        assert_eq!(minify_js(&once).unwrap(), once);
    }

    #[test]
    fn test_transform_names_failing_file() {
        let bundle: Bundle = std::iter::once(Asset::new("main.js", "alert('x)")).collect();
        let err = MinifyJs::new().apply(bundle).unwrap_err();
        assert_eq!(err.transform, "minify_js");
        assert_eq!(err.path, Some(std::path::PathBuf::from("main.js")));
    }
}
