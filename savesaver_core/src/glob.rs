//! Glob expansion of a subsection's include/exclude patterns.
//!
//! Includes and negated excludes are compiled, in that order, into one
//! gitignore-style override set anchored at the filesystem root. The last
//! matching glob decides, so an exclude always vetoes an include. Walking
//! starts from the literal prefix of each include pattern.

use crate::error::{Error, Result};
use crate::source::PathSpec;
use ignore::overrides::{Override, OverrideBuilder};
use ignore::{Walk, WalkBuilder};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const GLOB_ROOT: &str = "/";
const META_CHARS: &[char] = &['*', '?', '[', ']', '{', '}'];

/// Options for [`resolve`].
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Directory relative patterns are resolved against (defaults to the
    /// process working directory).
    pub cwd: Option<PathBuf>,
    /// Follow symbolic links while walking.
    pub follow_links: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            follow_links: true,
        }
    }
}

/// A pattern that could not be compiled and was left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPattern {
    pub pattern: String,
    pub reason: String,
}

/// The compiled form of a [`PathSpec`].
///
/// Iterating is lazy and can be repeated; each pass walks the filesystem
/// again. Entries of a directory are yielded in file name order.
#[derive(Debug)]
pub struct FileSet {
    roots: Vec<PathBuf>,
    overrides: Option<Override>,
    follow_links: bool,
    skipped: Vec<SkippedPattern>,
}

/// Compile a subsection's patterns.
///
/// Malformed patterns are logged and reported through
/// [`FileSet::skipped_patterns`]; they never fail the whole resolution.
pub fn resolve(spec: &PathSpec, options: &ResolveOptions) -> Result<FileSet> {
    let cwd = match &options.cwd {
        Some(cwd) => cwd.clone(),
        None => std::env::current_dir()?,
    };

    let mut builder = OverrideBuilder::new(GLOB_ROOT);
    let mut skipped = Vec::new();
    let mut roots = Vec::new();

    for raw in &spec.include {
        let pattern = normalize(raw, &cwd);
        match check_pattern(&pattern) {
            Ok(()) => {
                builder.add(&pattern)?;
                // A directory stands for everything below it
                if let Some(dir) = directory_pattern(raw, &pattern) {
                    builder.add(&format!("{}/**", dir))?;
                }
                roots.push(literal_base(&pattern));
            }
            Err(err) => skip(&mut skipped, raw, err),
        }
    }
    for raw in &spec.exclude {
        let pattern = format!("!{}", normalize(raw, &cwd));
        match check_pattern(&pattern) {
            Ok(()) => {
                builder.add(&pattern)?;
            }
            Err(err) => skip(&mut skipped, raw, err),
        }
    }

    let overrides = if roots.is_empty() {
        None
    } else {
        Some(builder.build()?)
    };

    Ok(FileSet {
        roots: prune_nested(roots),
        overrides,
        follow_links: options.follow_links,
        skipped,
    })
}

/// Compile a single pattern on its own, failing with `Glob` if it is malformed.
pub fn check_pattern(pattern: &str) -> Result<()> {
    OverrideBuilder::new(GLOB_ROOT)
        .add(pattern)
        .map(|_| ())
        .map_err(|e| Error::glob(pattern, e.to_string()))
}

fn skip(skipped: &mut Vec<SkippedPattern>, raw: &str, err: Error) {
    tracing::warn!(pattern = %raw, error = %err, "Skipping malformed glob pattern");
    let reason = match err {
        Error::Glob { reason, .. } => reason,
        other => other.to_string(),
    };
    skipped.push(SkippedPattern {
        pattern: raw.to_string(),
        reason,
    });
}

/// Canonical form: `/` separators, absolute.
///
/// Relative patterns are anchored at `cwd`, whose name is escaped so that
/// brackets or braces in a parent directory are matched literally.
fn normalize(pattern: &str, cwd: &Path) -> String {
    let pattern = pattern.replace('\\', "/");
    if pattern.starts_with('/') {
        return pattern;
    }
    anchor_pattern(&pattern, cwd)
}

/// Join a relative, `/`-separated pattern onto an escaped `cwd`.
pub fn anchor_pattern(pattern: &str, cwd: &Path) -> String {
    let base = escape_glob(&cwd.to_string_lossy().replace('\\', "/"));
    let rel = pattern.trim_start_matches("./");
    format!("{}/{}", base.trim_end_matches('/'), rel)
}

/// Escape glob metacharacters so `text` only matches itself.
pub fn escape_glob(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if META_CHARS.contains(&c) {
            escaped.push('[');
            escaped.push(c);
            escaped.push(']');
        } else {
            escaped.push(c);
        }
    }
    escaped
}

/// The literal text of one pattern component, or `None` if it contains
/// unescaped glob syntax.
fn literal_component(component: &str) -> Option<String> {
    let mut literal = String::with_capacity(component.len());
    let mut chars = component.chars();
    while let Some(c) = chars.next() {
        match c {
            '[' => {
                // Only the single-character class `[x]` is a literal
                let inner = chars.next()?;
                if inner == '!' || inner == '^' || chars.next()? != ']' {
                    return None;
                }
                literal.push(inner);
            }
            '\\' => literal.push(chars.next()?),
            c if META_CHARS.contains(&c) => return None,
            c => literal.push(c),
        }
    }
    Some(literal)
}

/// The longest leading run of literal components.
fn literal_base(pattern: &str) -> PathBuf {
    let mut base = PathBuf::from(GLOB_ROOT);
    for component in pattern.split('/').filter(|c| !c.is_empty()) {
        match literal_component(component) {
            Some(literal) => base.push(literal),
            None => break,
        }
    }
    base
}

/// The pattern of a directory include, without its trailing slash.
///
/// An include names a directory when it ends in `/` or when it is fully
/// literal and an existing directory.
fn directory_pattern<'a>(raw: &str, pattern: &'a str) -> Option<&'a str> {
    let trimmed = pattern.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    if raw.ends_with('/') || raw.ends_with('\\') {
        return Some(trimmed);
    }
    let all_literal = trimmed
        .split('/')
        .filter(|c| !c.is_empty())
        .all(|c| literal_component(c).is_some());
    (all_literal && literal_base(trimmed).is_dir()).then_some(trimmed)
}

/// Drop roots that live under another root.
fn prune_nested(mut roots: Vec<PathBuf>) -> Vec<PathBuf> {
    roots.sort();
    roots.dedup();
    let mut kept: Vec<PathBuf> = Vec::new();
    for root in roots {
        if !kept.iter().any(|k| root.starts_with(k)) {
            kept.push(root);
        }
    }
    kept
}

impl FileSet {
    /// Lazily yield every matching regular file, absolute, each once.
    pub fn iter(&self) -> Files<'_> {
        Files {
            set: self,
            roots: self.roots.iter(),
            walk: None,
            seen: HashSet::new(),
        }
    }

    /// Patterns that were left out because they could not be compiled.
    pub fn skipped_patterns(&self) -> &[SkippedPattern] {
        &self.skipped
    }

    fn matches(&self, path: &Path) -> bool {
        self.overrides
            .as_ref()
            .is_some_and(|ov| ov.matched(path, false).is_whitelist())
    }

    fn walker(&self, root: &Path) -> Option<Walk> {
        let overrides = self.overrides.clone()?;
        Some(
            WalkBuilder::new(root)
                .standard_filters(false)
                .follow_links(self.follow_links)
                .overrides(overrides)
                .sort_by_file_name(|a, b| a.cmp(b))
                .build(),
        )
    }
}

impl<'a> IntoIterator for &'a FileSet {
    type Item = PathBuf;
    type IntoIter = Files<'a>;

    fn into_iter(self) -> Files<'a> {
        self.iter()
    }
}

/// Iterator over the files of a [`FileSet`].
pub struct Files<'a> {
    set: &'a FileSet,
    roots: std::slice::Iter<'a, PathBuf>,
    walk: Option<Walk>,
    seen: HashSet<PathBuf>,
}

impl Iterator for Files<'_> {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            let Some(walk) = self.walk.as_mut() else {
                let root = self.roots.next()?;
                if !root.exists() {
                    tracing::debug!(root = %root.display(), "Glob root does not exist");
                    continue;
                }
                self.walk = self.set.walker(root);
                continue;
            };

            match walk.next() {
                Some(Ok(entry)) => {
                    let is_file = entry.file_type().is_some_and(|t| t.is_file());
                    // The walker never filters its root entry, so match here too
                    if is_file && self.set.matches(entry.path()) {
                        let path = entry.into_path();
                        if self.seen.insert(path.clone()) {
                            return Some(path);
                        }
                    }
                }
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "Skipping unreadable path during glob expansion");
                }
                None => self.walk = None,
            }
        }
    }
}
