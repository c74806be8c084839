//! Source definitions: named sets of glob patterns grouped into subsections.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Subsection used when the caller does not name one.
pub const DEFAULT_SUBPATH: &str = "data";

/// Include/exclude glob patterns for one subsection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSpec {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl PathSpec {
    /// A spec with a single include pattern.
    pub fn include(pattern: impl Into<String>) -> Self {
        Self {
            include: vec![pattern.into()],
            exclude: Vec::new(),
        }
    }

    /// Add an exclude pattern.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }
}

/// A named, reusable definition of which files belong to a backup-able unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    pub paths: BTreeMap<String, PathSpec>,
}

impl Source {
    /// Create a source with no aliases and no subsections.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: BTreeSet::new(),
            paths: BTreeMap::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into());
        self
    }

    pub fn with_subsection(mut self, name: impl Into<String>, spec: PathSpec) -> Self {
        self.paths.insert(name.into(), spec);
        self
    }

    /// Look up a subsection's patterns.
    pub fn subsection(&self, subpath: &str) -> Result<&PathSpec> {
        self.paths
            .get(subpath)
            .ok_or_else(|| Error::not_found("Subsection", format!("{}/{}", self.name, subpath)))
    }

    /// True if `identifier` is this source's name or one of its aliases.
    pub fn answers_to(&self, identifier: &str) -> bool {
        self.name == identifier || self.aliases.contains(identifier)
    }

    /// The name followed by every alias.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}
