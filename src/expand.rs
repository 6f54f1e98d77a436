//! Turning carve patterns into concrete file paths.
//!
//! Patterns are plain paths with two wildcards:
//!
//! - `%` matches any run of characters inside one path component
//! - `%%` matches any run of characters across components, so `/var/log/%%`
//!   is every file below `/var/log`
//!
//! Only regular files come out of expansion; directories are walked but
//! never carved themselves.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};

use log::{debug, warn};
use regex::Regex;
use walkdir::WalkDir;

use crate::error::CarveError;

const WILDCARD: char = '%';

/// Resolves carve patterns into the set of files to carve.
pub trait PathExpander: Send + Sync {
    fn expand(&self, patterns: &[String]) -> Result<BTreeSet<PathBuf>, CarveError>;
}

/// [`PathExpander`] for the `%` / `%%` pattern syntax.
#[derive(Debug, Clone, Default)]
pub struct PatternExpander {
    follow_links: bool,
}

impl PatternExpander {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descend into symlinked directories while walking.
    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    fn expand_one(&self, pattern: &str, out: &mut BTreeSet<PathBuf>) -> Result<(), CarveError> {
        let pattern = absolutize(Path::new(pattern))?;
        let text = pattern.to_string_lossy().to_string();

        if !text.contains(WILDCARD) {
            if pattern.is_file() {
                out.insert(pattern);
            } else {
                debug!("Pattern {} is not a regular file", pattern.display());
            }
            return Ok(());
        }

        let (base, rest) = split_literal_prefix(&pattern);
        let recursive = text.contains("%%");
        let regex = pattern_regex(&text)?;

        let mut walker = WalkDir::new(&base).min_depth(1).follow_links(self.follow_links);
        if !recursive {
            walker = walker.max_depth(rest);
        }

        let before = out.len();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry while expanding {}: {}", text, e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if regex.is_match(&entry.path().to_string_lossy()) {
                out.insert(entry.into_path());
            }
        }
        debug!("Pattern {} matched {} file(s)", text, out.len() - before);
        Ok(())
    }
}

impl PathExpander for PatternExpander {
    fn expand(&self, patterns: &[String]) -> Result<BTreeSet<PathBuf>, CarveError> {
        let mut paths = BTreeSet::new();
        for pattern in patterns {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                continue;
            }
            self.expand_one(pattern, &mut paths)?;
        }
        Ok(paths)
    }
}

fn absolutize(path: &Path) -> Result<PathBuf, CarveError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| CarveError::io("Failed to resolve current directory", e))?;
    Ok(cwd.join(path))
}

/// Split a pattern into the deepest wildcard-free directory and the number
/// of components left after it.
fn split_literal_prefix(pattern: &Path) -> (PathBuf, usize) {
    let mut base = PathBuf::new();
    let mut rest = 0;
    let mut in_wildcards = false;
    for component in pattern.components() {
        let is_wild = matches!(component, Component::Normal(name) if name.to_string_lossy().contains(WILDCARD));
        if is_wild {
            in_wildcards = true;
        }
        if in_wildcards {
            rest += 1;
        } else {
            base.push(component);
        }
    }
    (base, rest)
}

/// Compile a pattern into an anchored regex over the full path.
fn pattern_regex(pattern: &str) -> Result<Regex, CarveError> {
    let separator = regex::escape(&MAIN_SEPARATOR.to_string());
    let mut expr = String::from("^");
    let mut literal = String::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        if c != WILDCARD {
            literal.push(c);
            continue;
        }
        expr.push_str(&regex::escape(&literal));
        literal.clear();
        if chars.peek() == Some(&WILDCARD) {
            chars.next();
            expr.push_str(".*");
        } else {
            expr.push_str(&format!("[^{}]*", separator));
        }
    }
    expr.push_str(&regex::escape(&literal));
    expr.push('$');

    Regex::new(&expr).map_err(|e| CarveError::Config(format!("invalid carve pattern {}: {}", pattern, e)))
}
