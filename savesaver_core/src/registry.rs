//! Source registry: every known Source, in insertion order.

use crate::error::{Error, Result};
use crate::source::Source;
use crate::validate::{EntityKind, Validator};
use regex::Regex;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Name filter for [`SourceRegistry::list`].
///
/// Patterns are regular expressions. A name is listed when it matches every
/// include pattern and none of the exclude patterns.
#[derive(Debug, Clone, Default)]
pub struct SourceFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

/// All Sources, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Sources in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    /// Look up a source by exact name, then by alias.
    pub fn get(&self, identifier: &str) -> Result<&Source> {
        self.position(identifier)
            .map(|i| &self.sources[i])
            .ok_or_else(|| Error::not_found("Source", identifier))
    }

    fn position(&self, identifier: &str) -> Option<usize> {
        self.sources
            .iter()
            .position(|s| s.name == identifier)
            .or_else(|| {
                self.sources
                    .iter()
                    .position(|s| s.aliases.contains(identifier))
            })
    }

    /// Insert a source, replacing any record with the same name.
    ///
    /// Returns the replaced record. Fails with `InvalidValue` when the source
    /// fails schema validation or when its name or an alias is already taken
    /// by a different source.
    pub fn upsert(&mut self, source: Source, validator: &dyn Validator) -> Result<Option<Source>> {
        let value = serde_json::to_value(&source)?;
        if !validator.validate(EntityKind::SourceObject, &value) {
            return Err(Error::invalid_value(format!(
                "source {:?} is not a valid {}",
                source.name,
                EntityKind::SourceObject
            )));
        }
        if source.paths.is_empty() {
            return Err(Error::invalid_value(format!(
                "source {:?} has no subsections",
                source.name
            )));
        }

        for other in self.sources.iter().filter(|s| s.name != source.name) {
            if let Some(taken) = source.identifiers().find(|id| other.answers_to(id)) {
                return Err(Error::invalid_value(format!(
                    "identifier {:?} is already used by source {:?}",
                    taken, other.name
                )));
            }
        }

        match self.sources.iter_mut().find(|s| s.name == source.name) {
            Some(existing) => Ok(Some(std::mem::replace(existing, source))),
            None => {
                tracing::debug!(source = %source.name, "Added source");
                self.sources.push(source);
                Ok(None)
            }
        }
    }

    /// Remove a source by name or alias.
    pub fn remove(&mut self, identifier: &str) -> Result<Source> {
        let index = self
            .position(identifier)
            .ok_or_else(|| Error::not_found("Source", identifier))?;
        Ok(self.sources.remove(index))
    }

    /// Strip every alias from a source, keeping the source itself.
    pub fn remove_aliases(&mut self, identifier: &str) -> Result<Vec<String>> {
        let index = self
            .position(identifier)
            .ok_or_else(|| Error::not_found("Source", identifier))?;
        let aliases = std::mem::take(&mut self.sources[index].aliases);
        Ok(aliases.into_iter().collect())
    }

    /// Names of the sources passing `filter`, in insertion order or reversed.
    pub fn list(&self, filter: &SourceFilter, invert: bool) -> Result<Vec<&str>> {
        let include = compile(&filter.include)?;
        let exclude = compile(&filter.exclude)?;

        let mut names: Vec<&str> = self
            .sources
            .iter()
            .map(|s| s.name.as_str())
            .filter(|name| !exclude.iter().any(|re| re.is_match(name)))
            .filter(|name| include.iter().all(|re| re.is_match(name)))
            .collect();
        if invert {
            names.reverse();
        }
        Ok(names)
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(Error::from))
        .collect()
}

// Serialized as a name -> Source map that keeps insertion order.

impl Serialize for SourceRegistry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sources.len()))?;
        for source in &self.sources {
            map.serialize_entry(&source.name, source)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SourceRegistry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RegistryVisitor;

        impl<'de> Visitor<'de> for RegistryVisitor {
            type Value = SourceRegistry;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of source name to source")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut sources: Vec<Source> = Vec::new();
                while let Some((name, source)) = access.next_entry::<String, Source>()? {
                    if name != source.name {
                        return Err(serde::de::Error::custom(format!(
                            "source stored under {:?} is named {:?}",
                            name, source.name
                        )));
                    }
                    // Later duplicates win, as with a plain JSON object
                    sources.retain(|s| s.name != name);
                    sources.push(source);
                }
                Ok(SourceRegistry { sources })
            }
        }

        deserializer.deserialize_map(RegistryVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::PathSpec;
    use crate::validate::{AcceptAll, SchemaValidator};

    fn source(name: &str) -> Source {
        Source::new(name).with_subsection("data", PathSpec::include("*.sav"))
    }

    fn registry(names: &[&str]) -> SourceRegistry {
        let mut registry = SourceRegistry::new();
        for name in names {
            registry.upsert(source(name), &SchemaValidator).unwrap();
        }
        registry
    }

    #[test]
    fn test_get_by_alias() {
        let mut registry = registry(&["other"]);
        registry
            .upsert(source("NewSource").with_alias("ns"), &SchemaValidator)
            .unwrap();

        assert_eq!(registry.get("ns").unwrap().name, "NewSource");
        assert_eq!(registry.get("NewSource").unwrap().name, "NewSource");
        assert!(registry.get("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_uniqueness_checked_without_schema() {
        let mut registry = SourceRegistry::new();
        registry
            .upsert(source("first").with_alias("shared"), &AcceptAll)
            .unwrap();
        // AcceptAll skips schema checks but not the uniqueness rule
        assert!(registry.upsert(source("shared"), &AcceptAll).is_err());
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut registry = registry(&["a", "b", "c"]);
        let replacement = Source::new("b").with_subsection("config", PathSpec::include("*.ini"));
        let old = registry.upsert(replacement, &SchemaValidator).unwrap();

        assert!(old.unwrap().paths.contains_key("data"));
        assert!(registry.get("b").unwrap().paths.contains_key("config"));
        assert_eq!(registry.list(&SourceFilter::default(), false).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_upsert_rejects_invalid() {
        let mut registry = SourceRegistry::new();
        let err = registry
            .upsert(Source::new("no-paths"), &SchemaValidator)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));

        let err = registry.upsert(source("bad name"), &SchemaValidator).unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_upsert_rejects_alias_collision() {
        let mut registry = registry(&["game"]);
        let err = registry
            .upsert(source("other").with_alias("game"), &SchemaValidator)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
    }

    #[test]
    fn test_list_filters() {
        let registry = registry(&["saveA", "savegame2", "other"]);
        let filter = SourceFilter {
            include: vec!["^save".to_string()],
            exclude: vec!["^savegame2$".to_string()],
        };
        assert_eq!(registry.list(&filter, false).unwrap(), vec!["saveA"]);
    }

    #[test]
    fn test_list_requires_all_includes() {
        let registry = registry(&["saveA", "savegame2", "other"]);
        let filter = SourceFilter {
            include: vec!["^save".to_string(), "2$".to_string()],
            exclude: vec![],
        };
        assert_eq!(registry.list(&filter, false).unwrap(), vec!["savegame2"]);
    }

    #[test]
    fn test_list_invert_and_bad_regex() {
        let registry = registry(&["a", "b", "c"]);
        assert_eq!(
            registry.list(&SourceFilter::default(), true).unwrap(),
            vec!["c", "b", "a"]
        );
        let filter = SourceFilter {
            include: vec!["(".to_string()],
            exclude: vec![],
        };
        assert!(matches!(
            registry.list(&filter, false).unwrap_err(),
            Error::InvalidArgument { .. }
        ));
    }

    #[test]
    fn test_remove_and_remove_aliases() {
        let mut registry = SourceRegistry::new();
        registry
            .upsert(source("game").with_alias("g").with_alias("gm"), &SchemaValidator)
            .unwrap();

        let mut removed = registry.remove_aliases("g").unwrap();
        removed.sort();
        assert_eq!(removed, vec!["g", "gm"]);
        assert!(registry.get("g").is_err());

        registry.remove("game").unwrap();
        assert!(registry.is_empty());
        assert!(registry.remove("game").unwrap_err().is_not_found());
    }

    #[test]
    fn test_serde_keeps_insertion_order() {
        let registry = registry(&["zeta", "alpha", "mid"]);
        let json = serde_json::to_string(&registry).unwrap();
        let restored: SourceRegistry = serde_json::from_str(&json).unwrap();
        assert_eq!(
            restored.list(&SourceFilter::default(), false).unwrap(),
            vec!["zeta", "alpha", "mid"]
        );
    }

    #[test]
    fn test_deserialize_rejects_mismatched_name() {
        let json = r#"{"a": {"name": "b", "paths": {"data": {"include": ["*"]}}}}"#;
        assert!(serde_json::from_str::<SourceRegistry>(json).is_err());
    }

    use proptest::prelude::*;

    proptest! {
        /// Exclude always wins over include.
        #[test]
        fn prop_exclude_takes_precedence(names in prop::collection::btree_set("[a-z]{1,8}", 1..10)) {
            let mut registry = SourceRegistry::new();
            for name in &names {
                registry.upsert(source(name), &SchemaValidator)?;
            }
            let filter = SourceFilter {
                include: vec![".*".to_string()],
                exclude: vec![".*".to_string()],
            };
            prop_assert!(registry.list(&filter, false)?.is_empty());
        }
    }
}
