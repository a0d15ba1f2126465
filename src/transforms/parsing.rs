//! Transform identifier parsing
//!
//! Parses the `op` / `op:arg` syntax used in task declarations:
//! `"file_include"`, `"scss:compressed"`, `"concat:style.min.css"`.

use std::fmt;
use std::str::FromStr;

use super::types::SpecError;

/// Output style for the stylesheet compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputStyle {
    #[default]
    Expanded,
    Compressed,
}

/// A parsed transform identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformSpec {
    FileInclude,
    Beautify,
    Scss(OutputStyle),
    Autoprefix,
    MinifyCss,
    MinifyJs,
    Concat(String),
    OptimizeImages,
    /// Change every entry's extension
    Rename(String),
}

impl FromStr for TransformSpec {
    type Err = SpecError;

    /// # Alias Resolution
    /// - `include`, `file-include` → `FileInclude`
    /// - `sass` → `Scss`
    /// - `clean_css`, `cssmin` → `MinifyCss`
    /// - `uglify`, `jsmin` → `MinifyJs`
    /// - `imagemin` → `OptimizeImages`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (op, param) = match s.split_once(':') {
            Some((op, param)) => (op, Some(param.trim())),
            None => (s, None),
        };
        let op = op.trim().to_lowercase().replace('-', "_");

        let required = |name: &str| -> Result<String, SpecError> {
            match param {
                Some(p) if !p.is_empty() => Ok(p.to_string()),
                _ => Err(SpecError::MissingParameter { op: op.clone(), param: name.to_string() }),
            }
        };

        match op.as_str() {
            "file_include" | "include" => Ok(TransformSpec::FileInclude),
            "beautify" => Ok(TransformSpec::Beautify),
            "scss" | "sass" => match param.map(str::to_lowercase).as_deref() {
                None | Some("") | Some("expanded") => Ok(TransformSpec::Scss(OutputStyle::Expanded)),
                Some("compressed") => Ok(TransformSpec::Scss(OutputStyle::Compressed)),
                Some(other) => Err(SpecError::InvalidParameter {
                    op,
                    message: format!("unknown output style '{}'", other),
                }),
            },
            "autoprefix" | "autoprefixer" => Ok(TransformSpec::Autoprefix),
            "minify_css" | "clean_css" | "cssmin" => Ok(TransformSpec::MinifyCss),
            "minify_js" | "uglify" | "jsmin" => Ok(TransformSpec::MinifyJs),
            "concat" => {
                let name = required("file name")?;
                if name.contains("..") {
                    return Err(SpecError::InvalidParameter {
                        op,
                        message: "output name must stay inside the destination".to_string(),
                    });
                }
                Ok(TransformSpec::Concat(name))
            }
            "optimize_images" | "imagemin" => Ok(TransformSpec::OptimizeImages),
            "rename" => {
                let ext = required("extension")?;
                Ok(TransformSpec::Rename(ext.trim_start_matches('.').to_string()))
            }
            _ => Err(SpecError::UnknownOperation(s.to_string())),
        }
    }
}

impl fmt::Display for TransformSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformSpec::FileInclude => write!(f, "file_include"),
            TransformSpec::Beautify => write!(f, "beautify"),
            TransformSpec::Scss(OutputStyle::Expanded) => write!(f, "scss:expanded"),
            TransformSpec::Scss(OutputStyle::Compressed) => write!(f, "scss:compressed"),
            TransformSpec::Autoprefix => write!(f, "autoprefix"),
            TransformSpec::MinifyCss => write!(f, "minify_css"),
            TransformSpec::MinifyJs => write!(f, "minify_js"),
            TransformSpec::Concat(name) => write!(f, "concat:{}", name),
            TransformSpec::OptimizeImages => write!(f, "optimize_images"),
            TransformSpec::Rename(ext) => write!(f, "rename:{}", ext),
        }
    }
}

/// Parse a list of identifiers, stopping at the first invalid one.
pub fn parse_chain<S: AsRef<str>>(specs: &[S]) -> Result<Vec<TransformSpec>, SpecError> {
    specs.iter().map(|s| s.as_ref().parse()).collect()
}
