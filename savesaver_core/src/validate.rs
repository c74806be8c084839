//! Schema validation capability.
//!
//! Validation is consumed as a black box: `validate(kind, value) -> bool`.
//! [`SchemaValidator`] is the built-in implementation of the entity schemas;
//! hosts with their own schema machinery plug in through [`Validator`].

use crate::hash::ContentKey;
use serde_json::Value;
use std::fmt;

/// Entity kinds that have a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    SourceObject,
    BackupObject,
    SourcesDocument,
    BackupsDocument,
}

impl EntityKind {
    /// Schema name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::SourceObject => "source-object",
            EntityKind::BackupObject => "backup-object",
            EntityKind::SourcesDocument => "sources-document",
            EntityKind::BackupsDocument => "backups-document",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates JSON values against the schema of an entity kind.
pub trait Validator: Send + Sync {
    fn validate(&self, kind: EntityKind, value: &Value) -> bool;
}

/// Accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Validator for AcceptAll {
    fn validate(&self, _kind: EntityKind, _value: &Value) -> bool {
        true
    }
}

/// Built-in schemas for every entity kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl Validator for SchemaValidator {
    fn validate(&self, kind: EntityKind, value: &Value) -> bool {
        match kind {
            EntityKind::SourceObject => source_object(value),
            EntityKind::BackupObject => backup_object(value),
            EntityKind::SourcesDocument => sources_document(value),
            EntityKind::BackupsDocument => backups_document(value),
        }
    }
}

/// Names and aliases are URL-safe: letters, digits, `.`, `_` and `-`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn string_array(value: &Value) -> Option<&Vec<Value>> {
    value
        .as_array()
        .filter(|items| items.iter().all(Value::is_string))
}

fn path_spec(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    let include_ok = obj
        .get("include")
        .and_then(string_array)
        .is_some_and(|items| !items.is_empty());
    let exclude_ok = obj.get("exclude").is_none_or(|v| string_array(v).is_some());
    include_ok && exclude_ok
}

fn source_object(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    let name_ok = obj
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(is_valid_name);
    let aliases_ok = obj.get("aliases").is_none_or(|v| {
        string_array(v).is_some_and(|items| items.iter().filter_map(Value::as_str).all(is_valid_name))
    });
    let paths_ok = obj
        .get("paths")
        .and_then(Value::as_object)
        .is_some_and(|paths| {
            !paths.is_empty() && paths.iter().all(|(k, v)| is_valid_name(k) && path_spec(v))
        });
    name_ok && aliases_ok && paths_ok
}

fn file_entry(value: &Value) -> bool {
    match value {
        Value::String(path) => !path.is_empty(),
        Value::Array(_) => {
            string_array(value).is_some_and(|items| !items.is_empty())
        }
        _ => false,
    }
}

fn backup_object(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    let non_empty = |field: &str| {
        obj.get(field)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty())
    };
    let date_ok = obj
        .get("date")
        .and_then(Value::as_str)
        .is_some_and(|d| chrono::DateTime::parse_from_rfc3339(d).is_ok());
    let message_ok = obj.get("message").is_some_and(Value::is_string);
    let files_ok = obj.get("files").and_then(Value::as_object).is_some_and(|files| {
        files
            .iter()
            .all(|(key, entry)| ContentKey::parse(key).is_ok() && file_entry(entry))
    });
    non_empty("uid") && non_empty("source") && non_empty("subpath") && date_ok && message_ok && files_ok
}

fn sources_document(value: &Value) -> bool {
    value
        .get("sources")
        .and_then(Value::as_object)
        .is_some_and(|sources| {
            sources.iter().all(|(name, source)| {
                source_object(source) && source.get("name").and_then(Value::as_str) == Some(name)
            })
        })
}

fn backups_document(value: &Value) -> bool {
    let Some(by_source) = value.as_object() else {
        return false;
    };
    by_source.values().all(|by_subpath| {
        by_subpath.as_object().is_some_and(|subpaths| {
            subpaths.values().all(|backups| {
                backups
                    .as_array()
                    .is_some_and(|items| items.iter().all(backup_object))
            })
        })
    })
}
