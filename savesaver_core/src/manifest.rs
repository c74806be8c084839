//! Manifest persistence: the Sources and Backups JSON documents.
//!
//! Both documents are read whole, validated, and written back atomically
//! through a temporary file in the same directory. A missing document loads
//! as empty.

use crate::backup::Backup;
use crate::error::{Error, Result};
use crate::registry::SourceRegistry;
use crate::validate::{EntityKind, Validator};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

/// Shape of `Sources.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesDocument {
    pub sources: SourceRegistry,
}

/// Every Backup record, grouped by source name then subsection.
///
/// Serialized as `Backups.json`: `{ source: { subpath: [Backup, ...] } }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackupIndex {
    by_source: BTreeMap<String, BTreeMap<String, Vec<Backup>>>,
}

impl BackupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Record a completed backup.
    pub fn insert(&mut self, backup: Backup) {
        self.by_source
            .entry(backup.source.clone())
            .or_default()
            .entry(backup.subpath.clone())
            .or_default()
            .push(backup);
    }

    /// Every record, grouped by source and subsection.
    pub fn iter(&self) -> impl Iterator<Item = &Backup> {
        self.by_source.values().flat_map(|subs| subs.values().flatten())
    }

    pub fn find(&self, uid: &str) -> Result<&Backup> {
        self.iter()
            .find(|b| b.uid == uid)
            .ok_or_else(|| Error::not_found("Backup", uid))
    }

    /// Backups of one source, newest first unless `oldest_first`.
    ///
    /// `subpath` narrows to one subsection; `count` caps the result.
    pub fn list(
        &self,
        source: &str,
        subpath: Option<&str>,
        oldest_first: bool,
        count: Option<usize>,
    ) -> Vec<&Backup> {
        let mut backups: Vec<&Backup> = self
            .by_source
            .get(source)
            .into_iter()
            .flat_map(|subs| subs.iter())
            .filter(|(name, _)| subpath.is_none_or(|s| s == name.as_str()))
            .flat_map(|(_, backups)| backups.iter())
            .collect();

        backups.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.uid.cmp(&b.uid)));
        if !oldest_first {
            backups.reverse();
        }
        if let Some(count) = count {
            backups.truncate(count);
        }
        backups
    }

    /// Remove a record by uid.
    pub fn remove(&mut self, uid: &str) -> Result<Backup> {
        for subs in self.by_source.values_mut() {
            for backups in subs.values_mut() {
                if let Some(index) = backups.iter().position(|b| b.uid == uid) {
                    let removed = backups.remove(index);
                    self.prune();
                    return Ok(removed);
                }
            }
        }
        Err(Error::not_found("Backup", uid))
    }

    /// Remove every record of a source.
    pub fn remove_source(&mut self, source: &str) -> Vec<Backup> {
        self.by_source
            .remove(source)
            .map(|subs| subs.into_values().flatten().collect())
            .unwrap_or_default()
    }

    fn prune(&mut self) {
        for subs in self.by_source.values_mut() {
            subs.retain(|_, backups| !backups.is_empty());
        }
        self.by_source.retain(|_, subs| !subs.is_empty());
    }
}

/// Read and validate a document, or `None` if the file does not exist.
fn read_document<T: DeserializeOwned>(
    path: &Path,
    kind: EntityKind,
    validator: &dyn Validator,
) -> Result<Option<T>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io_at(path, e)),
    };
    let text = text.replace("\r\n", "\n");

    let value: serde_json::Value = serde_json::from_str(&text)?;
    if !validator.validate(kind, &value) {
        return Err(Error::invalid_value(format!(
            "{} is not a valid {}",
            path.display(),
            kind
        )));
    }
    Ok(Some(serde_json::from_value(value)?))
}

/// Write a document as pretty JSON, replacing the old file atomically.
fn write_document<T: Serialize>(path: &Path, document: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| Error::io_at(dir, e))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io_at(dir, e))?;
    serde_json::to_writer_pretty(&mut temp_file, document)?;
    temp_file.write_all(b"\n")?;
    temp_file.flush()?;
    temp_file.persist(path)?;
    Ok(())
}

pub fn load_sources(path: &Path, validator: &dyn Validator) -> Result<SourceRegistry> {
    let document: Option<SourcesDocument> =
        read_document(path, EntityKind::SourcesDocument, validator)?;
    Ok(document.map(|d| d.sources).unwrap_or_default())
}

pub fn save_sources(path: &Path, sources: &SourceRegistry) -> Result<()> {
    #[derive(Serialize)]
    struct Borrowed<'a> {
        sources: &'a SourceRegistry,
    }
    write_document(path, &Borrowed { sources })
}

pub fn load_backups(path: &Path, validator: &dyn Validator) -> Result<BackupIndex> {
    let index: Option<BackupIndex> = read_document(path, EntityKind::BackupsDocument, validator)?;
    Ok(index.unwrap_or_default())
}

pub fn save_backups(path: &Path, index: &BackupIndex) -> Result<()> {
    write_document(path, index)
}

/// Both documents, loaded and shared.
///
/// Readers share a read lock. Updates run under the single writer lock,
/// apply to a copy, and only replace the in-memory state once the document
/// is saved.
pub struct Manifest {
    sources_path: PathBuf,
    backups_path: PathBuf,
    validator: Arc<dyn Validator>,
    sources: RwLock<SourceRegistry>,
    backups: RwLock<BackupIndex>,
}

impl Manifest {
    /// Load both documents; missing files start out empty.
    pub fn open(
        sources_path: impl Into<PathBuf>,
        backups_path: impl Into<PathBuf>,
        validator: Arc<dyn Validator>,
    ) -> Result<Self> {
        let sources_path = sources_path.into();
        let backups_path = backups_path.into();
        let sources = load_sources(&sources_path, validator.as_ref())?;
        let backups = load_backups(&backups_path, validator.as_ref())?;
        tracing::debug!(
            sources = sources.len(),
            backups = backups.len(),
            path = %sources_path.display(),
            "Loaded manifest"
        );
        Ok(Self {
            sources_path,
            backups_path,
            validator,
            sources: RwLock::new(sources),
            backups: RwLock::new(backups),
        })
    }

    pub fn sources_path(&self) -> &Path {
        &self.sources_path
    }

    pub fn backups_path(&self) -> &Path {
        &self.backups_path
    }

    pub fn validator(&self) -> &dyn Validator {
        self.validator.as_ref()
    }

    pub fn sources(&self) -> RwLockReadGuard<'_, SourceRegistry> {
        self.sources.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn backups(&self) -> RwLockReadGuard<'_, BackupIndex> {
        self.backups.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to the registry and save it.
    ///
    /// If `f` or the save fails, the registry is left unchanged.
    pub fn update_sources<T>(
        &self,
        f: impl FnOnce(&mut SourceRegistry) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        let out = f(&mut next)?;
        save_sources(&self.sources_path, &next)?;
        *guard = next;
        Ok(out)
    }

    /// Apply `f` to the backup index and save it.
    ///
    /// If `f` or the save fails, the index is left unchanged.
    pub fn update_backups<T>(&self, f: impl FnOnce(&mut BackupIndex) -> Result<T>) -> Result<T> {
        let mut guard = self.backups.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        let out = f(&mut next)?;
        save_backups(&self.backups_path, &next)?;
        *guard = next;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::FileEntry;
    use crate::hash::Hasher;
    use crate::source::{PathSpec, Source};
    use crate::validate::{AcceptAll, SchemaValidator};
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;

    fn backup(uid: &str, source: &str, subpath: &str, minutes: i64) -> Backup {
        let key = Hasher::default().digest_bytes(uid.as_bytes());
        Backup {
            uid: uid.into(),
            date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes),
            message: String::new(),
            source: source.into(),
            subpath: subpath.into(),
            algorithm: Default::default(),
            files: BTreeMap::from([(key, FileEntry::Single(format!("/{}", uid).into()))]),
        }
    }

    fn index() -> BackupIndex {
        let mut index = BackupIndex::new();
        index.insert(backup("b2", "game1", "data", 2));
        index.insert(backup("b1", "game1", "data", 1));
        index.insert(backup("b3", "game1", "config", 3));
        index.insert(backup("o1", "other", "data", 0));
        index
    }

    #[test]
    fn test_list_order_and_count() {
        let index = index();
        let uids = |list: Vec<&Backup>| list.iter().map(|b| b.uid.clone()).collect::<Vec<_>>();

        assert_eq!(uids(index.list("game1", None, false, None)), vec!["b3", "b2", "b1"]);
        assert_eq!(uids(index.list("game1", None, true, None)), vec!["b1", "b2", "b3"]);
        assert_eq!(uids(index.list("game1", Some("data"), false, Some(1))), vec!["b2"]);
        assert!(index.list("missing", None, false, None).is_empty());
    }

    #[test]
    fn test_find_and_remove() {
        let mut index = index();
        assert_eq!(index.find("b3").unwrap().subpath, "config");
        assert_eq!(index.remove("b3").unwrap().uid, "b3");
        assert!(index.find("b3").unwrap_err().is_not_found());
        assert!(index.remove("b3").unwrap_err().is_not_found());
        assert_eq!(index.len(), 3);

        let removed = index.remove_source("game1");
        assert_eq!(removed.len(), 2);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_remove_prunes_empty_groups() {
        let mut index = BackupIndex::new();
        index.insert(backup("only", "game1", "data", 0));
        index.remove("only").unwrap();
        assert_eq!(serde_json::to_value(&index).unwrap(), serde_json::json!({}));
    }

    #[test]
    fn test_missing_documents_load_empty() {
        let temp_dir = TempDir::new().unwrap();
        let sources = load_sources(&temp_dir.path().join("Sources.json"), &SchemaValidator).unwrap();
        let backups = load_backups(&temp_dir.path().join("Backups.json"), &SchemaValidator).unwrap();
        assert!(sources.is_empty());
        assert!(backups.is_empty());
    }

    #[test]
    fn test_sources_round_trip_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("Sources.json");
        let mut registry = SourceRegistry::new();
        registry
            .upsert(
                Source::new("game1").with_subsection("data", PathSpec::include("save/*")),
                &SchemaValidator,
            )
            .unwrap();

        save_sources(&path, &registry).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\n  \"sources\": {"));
        assert_eq!(load_sources(&path, &SchemaValidator).unwrap(), registry);
    }

    #[test]
    fn test_crlf_is_normalized() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("Sources.json");
        let text = "{\r\n  \"sources\": {\r\n    \"g\": {\r\n      \"name\": \"g\",\r\n      \"paths\": {\"data\": {\"include\": [\"a\\r\\nb\"]}}\r\n    }\r\n  }\r\n}\r\n";
        fs::write(&path, text).unwrap();
        let registry = load_sources(&path, &SchemaValidator).unwrap();
        assert_eq!(registry.get("g").unwrap().paths["data"].include, vec!["a\r\nb"]);
    }

    #[test]
    fn test_invalid_document_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("Backups.json");
        fs::write(&path, r#"{ "game1": [] }"#).unwrap();
        assert!(matches!(
            load_backups(&path, &SchemaValidator),
            Err(Error::InvalidValue { .. })
        ));

        fs::write(&path, "not json").unwrap();
        assert!(matches!(load_backups(&path, &AcceptAll), Err(Error::Json { .. })));
    }

    #[test]
    fn test_manifest_updates_persist() {
        let temp_dir = TempDir::new().unwrap();
        let sources_path = temp_dir.path().join("Sources.json");
        let backups_path = temp_dir.path().join("Backups.json");
        let manifest = Manifest::open(&sources_path, &backups_path, Arc::new(SchemaValidator)).unwrap();

        manifest
            .update_sources(|registry| {
                registry.upsert(
                    Source::new("game1").with_subsection("data", PathSpec::include("*")),
                    &SchemaValidator,
                )
            })
            .unwrap();
        manifest
            .update_backups(|index| {
                index.insert(backup("b1", "game1", "data", 0));
                Ok(())
            })
            .unwrap();

        let reopened = Manifest::open(&sources_path, &backups_path, Arc::new(SchemaValidator)).unwrap();
        assert_eq!(reopened.sources().len(), 1);
        assert_eq!(reopened.backups().find("b1").unwrap().source, "game1");
    }

    #[test]
    fn test_failed_update_leaves_state() {
        let temp_dir = TempDir::new().unwrap();
        let manifest = Manifest::open(
            temp_dir.path().join("Sources.json"),
            temp_dir.path().join("Backups.json"),
            Arc::new(SchemaValidator),
        )
        .unwrap();

        let result = manifest.update_sources(|registry| {
            registry.upsert(
                Source::new("game1").with_subsection("data", PathSpec::include("*")),
                &SchemaValidator,
            )?;
            registry.remove("missing")
        });
        assert!(result.is_err());
        assert!(manifest.sources().is_empty());
        assert!(!manifest.sources_path().exists());
    }
}
