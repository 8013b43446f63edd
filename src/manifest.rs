//! Dependency manifest parsing
//!
//! The manifest is a flat, declarative list of dependency specifiers, one per
//! line (the interpreter ecosystem's `requirements.txt` convention):
//!
//! ```text
//! # comment
//! yt-dlp
//! openai-whisper==20231117
//! moviepy>=1.0,<2.0
//! requests[socks]~=2.31
//! ```
//!
//! Parsing is strict: an invalid line aborts with its file and line number,
//! and two exact pins of the same package to different versions conflict.
//! Whitespace around version operators and constraint commas is tolerated.
//! There is no partial-install recovery downstream, so errors must surface
//! here, before any installer runs.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{StevedoreError, StevedoreResult};

/// Comparison operators accepted in a version constraint, longest first
const OPERATORS: [&str; 7] = ["==", ">=", "<=", "~=", "!=", "<", ">"];

/// A single version constraint, e.g. `>=1.0`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub op: String,
    pub version: String,
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.op, self.version)
    }
}

/// A parsed dependency specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    /// Normalized package name (lowercase, `_`/`.` folded to `-`)
    pub name: String,
    /// Optional extras, e.g. `requests[socks]`
    pub extras: Vec<String>,
    /// Version constraints, possibly empty
    pub constraints: Vec<Constraint>,
    /// Original line as written
    pub raw: String,
    /// 1-based line number in the manifest
    pub line: usize,
}

impl Specifier {
    /// The exact pin (`==` constraint), if one exists
    pub fn exact_pin(&self) -> Option<&str> {
        self.constraints
            .iter()
            .find(|c| c.op == "==")
            .map(|c| c.version.as_str())
    }
}

/// A parsed dependency manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub path: PathBuf,
    pub specifiers: Vec<Specifier>,
}

impl Manifest {
    /// Load and parse a manifest file.
    ///
    /// A missing manifest is a hard error: the build is all-or-nothing.
    pub fn load(path: &Path) -> StevedoreResult<Self> {
        if !path.exists() {
            return Err(StevedoreError::ManifestNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path)?;
        Self::parse(path, &content)
    }

    /// Parse manifest content.
    pub fn parse(path: &Path, content: &str) -> StevedoreResult<Self> {
        let mut specifiers = Vec::new();
        let mut pins: HashMap<String, Specifier> = HashMap::new();

        for (index, raw_line) in content.lines().enumerate() {
            let line_no = index + 1;
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }

            let spec = parse_specifier(line, path, line_no)?;

            if let Some(previous) = pins.get(&spec.name) {
                let conflict = match (previous.exact_pin(), spec.exact_pin()) {
                    (Some(a), Some(b)) => a != b,
                    _ => false,
                };
                if conflict {
                    return Err(StevedoreError::ConflictingSpecifier {
                        name: spec.name.clone(),
                        file: path.to_path_buf(),
                        first: previous.raw.clone(),
                        second: spec.raw.clone(),
                    });
                }
            } else {
                pins.insert(spec.name.clone(), spec.clone());
            }

            specifiers.push(spec);
        }

        Ok(Self {
            path: path.to_path_buf(),
            specifiers,
        })
    }

    /// Number of declared specifiers
    pub fn len(&self) -> usize {
        self.specifiers.len()
    }

    /// True when the manifest declares nothing
    pub fn is_empty(&self) -> bool {
        self.specifiers.is_empty()
    }
}

/// Strip a trailing comment. A `#` opens a comment at line start or when
/// preceded by whitespace; `name#tag` stays intact.
fn strip_comment(line: &str) -> &str {
    if line.trim_start().starts_with('#') {
        return "";
    }
    let bytes = line.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'#' && i > 0 && bytes[i - 1].is_ascii_whitespace() {
            return &line[..i];
        }
    }
    line
}

/// Normalize a package name: lowercase, runs of `-`, `_`, `.` become `-`.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_sep = false;
    for ch in name.chars() {
        if ch == '-' || ch == '_' || ch == '.' {
            if !last_sep {
                out.push('-');
            }
            last_sep = true;
        } else {
            out.push(ch.to_ascii_lowercase());
            last_sep = false;
        }
    }
    out
}

fn parse_specifier(line: &str, file: &Path, line_no: usize) -> StevedoreResult<Specifier> {
    let invalid = |reason: &str| StevedoreError::InvalidSpecifier {
        spec: line.to_string(),
        file: file.to_path_buf(),
        line: line_no,
        reason: reason.to_string(),
    };

    if line.starts_with('-') {
        return Err(invalid("installer options are not allowed in a flat manifest"));
    }
    if line.contains(';') {
        return Err(invalid("environment markers are not supported"));
    }

    // Split off the constraint part at the first operator character.
    // Whitespace around the operator and between clauses is tolerated,
    // matching what installers accept.
    let op_start = line.find(['=', '>', '<', '~', '!']);
    let (name_part, constraint_part) = match op_start {
        Some(idx) => (line[..idx].trim_end(), &line[idx..]),
        None => (line, ""),
    };

    // Extras: name[a,b]
    let (bare_name, extras) = match name_part.find('[') {
        Some(open) => {
            let close = name_part
                .rfind(']')
                .ok_or_else(|| invalid("unclosed extras bracket"))?;
            if close != name_part.len() - 1 || close < open {
                return Err(invalid("malformed extras"));
            }
            let extras: Vec<String> = name_part[open + 1..close]
                .split(',')
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect();
            (name_part[..open].trim_end(), extras)
        }
        None => (name_part, Vec::new()),
    };

    if bare_name.is_empty() {
        return Err(invalid("missing package name"));
    }
    if !is_valid_name(bare_name) {
        return Err(invalid("invalid package name"));
    }

    let mut constraints = Vec::new();
    if !constraint_part.is_empty() {
        for clause in constraint_part.split(',') {
            let clause = clause.trim();
            let op = OPERATORS
                .iter()
                .find(|op| clause.starts_with(**op))
                .ok_or_else(|| invalid("invalid version operator"))?;
            let version = clause[op.len()..].trim();
            if version.is_empty() || !is_valid_version(version) {
                return Err(invalid("invalid version"));
            }
            constraints.push(Constraint {
                op: (*op).to_string(),
                version: version.to_string(),
            });
        }
    }

    Ok(Specifier {
        name: normalize_name(bare_name),
        extras,
        constraints,
        raw: line.to_string(),
        line: line_no,
    })
}

fn is_valid_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    let first_ok = bytes.first().is_some_and(|b| b.is_ascii_alphanumeric());
    let last_ok = bytes.last().is_some_and(|b| b.is_ascii_alphanumeric());
    first_ok
        && last_ok
        && bytes
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

fn is_valid_version(version: &str) -> bool {
    version
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'*' | b'+' | b'!' | b'-' | b'_'))
}
