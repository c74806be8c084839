//! Backup records and the backup orchestrator.
//!
//! A backup run moves through `Resolving -> Hashing & Storing -> Recording`.
//! The Source is snapshotted while resolving, so later registry edits never
//! affect a run in flight. Per-file failures are logged and reported in
//! [`BackupReport::skipped`]; the run only fails when nothing could be stored.

use crate::error::{Error, Result};
use crate::glob::{self, ResolveOptions, SkippedPattern};
use crate::hash::{Algorithm, ContentKey, Hasher};
use crate::pool::{CancelFlag, WorkerPool};
use crate::registry::SourceRegistry;
use crate::source::DEFAULT_SUBPATH;
use crate::store::ContentStore;
use crate::validate::{EntityKind, SchemaValidator, Validator};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Original location(s) of one piece of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileEntry {
    Single(PathBuf),
    Multiple(Vec<PathBuf>),
}

impl FileEntry {
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            FileEntry::Single(path) => std::slice::from_ref(path),
            FileEntry::Multiple(paths) => paths,
        }
    }

    /// Record another path with the same content.
    pub fn push(&mut self, path: PathBuf) {
        match self {
            FileEntry::Single(first) => {
                let first = std::mem::take(first);
                *self = FileEntry::Multiple(vec![first, path]);
            }
            FileEntry::Multiple(paths) => paths.push(path),
        }
    }
}

/// An immutable record of one backup run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    pub uid: String,
    pub date: DateTime<Utc>,
    pub message: String,
    pub source: String,
    pub subpath: String,
    /// Algorithm the keys were computed with.
    #[serde(default)]
    pub algorithm: Algorithm,
    pub files: BTreeMap<ContentKey, FileEntry>,
}

impl Backup {
    /// Parse a record, rejecting it with `InvalidValue` if it fails the
    /// backup-object schema.
    pub fn from_value(value: serde_json::Value, validator: &dyn Validator) -> Result<Self> {
        if !validator.validate(EntityKind::BackupObject, &value) {
            return Err(Error::invalid_value(format!(
                "not a valid {}",
                EntityKind::BackupObject
            )));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Check the record against the backup-object schema.
    pub fn validate(&self, validator: &dyn Validator) -> Result<()> {
        let value = serde_json::to_value(self)?;
        if validator.validate(EntityKind::BackupObject, &value) {
            Ok(())
        } else {
            Err(Error::invalid_value(format!(
                "backup {} is not a valid {}",
                self.uid,
                EntityKind::BackupObject
            )))
        }
    }

    /// Every `(key, original path)` pair, one per recorded path.
    pub fn entries(&self) -> impl Iterator<Item = (&ContentKey, &Path)> {
        self.files
            .iter()
            .flat_map(|(key, entry)| entry.paths().iter().map(move |p| (key, p.as_path())))
    }

    /// Number of original files recorded.
    pub fn file_count(&self) -> usize {
        self.files.values().map(|e| e.paths().len()).sum()
    }
}

/// Options for one backup run.
#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub subpath: String,
    pub message: String,
    pub cancel: Option<CancelFlag>,
    pub resolve: ResolveOptions,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            subpath: DEFAULT_SUBPATH.to_string(),
            message: String::new(),
            cancel: None,
            resolve: ResolveOptions::default(),
        }
    }
}

/// A file left out of a backup, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a successful backup run.
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub backup: Backup,
    pub skipped: Vec<SkippedFile>,
    pub skipped_patterns: Vec<SkippedPattern>,
}

/// Result of re-hashing a backup's stored objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub checked: usize,
    pub missing: Vec<ContentKey>,
    pub corrupted: Vec<ContentKey>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.missing.is_empty() && self.corrupted.is_empty()
    }
}

/// Creates and verifies backups against one content store.
#[derive(Clone)]
pub struct BackupEngine {
    store: ContentStore,
    hasher: Hasher,
    validator: Arc<dyn Validator>,
    pool: WorkerPool,
}

impl BackupEngine {
    pub fn new(store: ContentStore, pool: WorkerPool) -> Self {
        Self {
            store,
            hasher: Hasher::default(),
            validator: Arc::new(SchemaValidator),
            pool,
        }
    }

    pub fn with_hasher(mut self, hasher: Hasher) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Back up one subsection of a Source.
    ///
    /// Fails with `InvalidValue` if `identifier` names no Source or the Source
    /// fails validation, `NotFound` if the subsection does not exist,
    /// `Cancelled` if the cancel flag was raised, and `BackupFailed` if no
    /// file could be stored.
    pub fn create_backup(
        &self,
        registry: &SourceRegistry,
        identifier: &str,
        options: &BackupOptions,
    ) -> Result<BackupReport> {
        // Resolving
        let source = registry
            .get(identifier)
            .map_err(|_| Error::invalid_value(format!("no source named {:?}", identifier)))?
            .clone();
        let value = serde_json::to_value(&source)?;
        if !self.validator.validate(EntityKind::SourceObject, &value) {
            return Err(Error::invalid_value(format!(
                "source {:?} is not a valid {}",
                source.name,
                EntityKind::SourceObject
            )));
        }
        let spec = source.subsection(&options.subpath)?;
        let uid = self.fresh_uid(&source.name, &options.subpath)?;

        tracing::info!(
            source = %source.name,
            subpath = %options.subpath,
            uid = %uid,
            "Starting backup"
        );

        // Hashing & Storing
        let set = glob::resolve(spec, &options.resolve)?;
        let paths: Vec<PathBuf> = set.iter().collect();
        if paths.is_empty() {
            return Err(Error::backup_failed(
                &source.name,
                &options.subpath,
                "no files matched",
            ));
        }

        let cancel = options.cancel.as_ref();
        let results: Vec<Result<ContentKey>> = self.pool.install(|| {
            paths
                .par_iter()
                .map(|path| {
                    if let Some(flag) = cancel {
                        flag.check()?;
                    }
                    let stored =
                        self.store
                            .put(&source.name, &options.subpath, &uid, path, &self.hasher)?;
                    tracing::debug!(
                        path = %path.display(),
                        key = %stored.key,
                        written = stored.written,
                        "Stored file"
                    );
                    Ok(stored.key)
                })
                .collect()
        });

        if cancel.is_some_and(CancelFlag::is_cancelled) {
            tracing::warn!(uid = %uid, "Backup cancelled, partial directory left for gc");
            return Err(Error::Cancelled);
        }

        // Recording, in resolved order
        let (files, skipped) = record(paths, results);

        if files.is_empty() {
            return Err(Error::backup_failed(
                &source.name,
                &options.subpath,
                format!("all {} files failed", skipped.len()),
            ));
        }

        let backup = Backup {
            uid,
            date: Utc::now(),
            message: options.message.clone(),
            source: source.name,
            subpath: options.subpath.clone(),
            algorithm: self.hasher.algorithm(),
            files,
        };
        tracing::info!(
            uid = %backup.uid,
            files = backup.file_count(),
            objects = backup.files.len(),
            skipped = skipped.len(),
            "Backup complete"
        );

        Ok(BackupReport {
            backup,
            skipped,
            skipped_patterns: set.skipped_patterns().to_vec(),
        })
    }

    /// Re-hash every stored object of a backup.
    pub fn verify(&self, backup: &Backup) -> Result<VerifyReport> {
        let hasher = Hasher::new(backup.algorithm);
        let keys: Vec<&ContentKey> = backup.files.keys().collect();

        let outcomes: Vec<Result<Option<bool>>> = self.pool.install(|| {
            keys.par_iter()
                .map(|key| {
                    let path = match self.store.get(&backup.source, &backup.subpath, &backup.uid, key) {
                        Ok(path) => path,
                        Err(err) if err.is_not_found() => return Ok(None),
                        Err(err) => return Err(err),
                    };
                    Ok(Some(hasher.digest(&path)? == **key))
                })
                .collect()
        });

        let mut report = VerifyReport::default();
        for (key, outcome) in keys.into_iter().zip(outcomes) {
            report.checked += 1;
            match outcome? {
                Some(true) => {}
                Some(false) => {
                    tracing::warn!(uid = %backup.uid, key = %key, "Stored object does not match its key");
                    report.corrupted.push(key.clone());
                }
                None => {
                    tracing::warn!(uid = %backup.uid, key = %key, "Stored object is missing");
                    report.missing.push(key.clone());
                }
            }
        }
        Ok(report)
    }

    fn fresh_uid(&self, source: &str, subpath: &str) -> Result<String> {
        loop {
            let uid = uuid::Uuid::now_v7().to_string();
            if !self.store.backup_dir(source, subpath, &uid)?.exists() {
                return Ok(uid);
            }
        }
    }
}

/// Fold per-file outcomes into the `files` map, in resolved order.
///
/// Paths with the same key share one entry; failed paths are logged and
/// returned separately.
fn record(
    paths: Vec<PathBuf>,
    results: Vec<Result<ContentKey>>,
) -> (BTreeMap<ContentKey, FileEntry>, Vec<SkippedFile>) {
    let mut files: BTreeMap<ContentKey, FileEntry> = BTreeMap::new();
    let mut skipped = Vec::new();
    for (path, result) in paths.into_iter().zip(results) {
        match result {
            Ok(key) => match files.get_mut(&key) {
                Some(entry) => entry.push(path),
                None => {
                    files.insert(key, FileEntry::Single(path));
                }
            },
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Skipping file");
                skipped.push(SkippedFile {
                    path,
                    reason: err.to_string(),
                });
            }
        }
    }
    (files, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{PathSpec, Source};
    use crate::validate::AcceptAll;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        engine: BackupEngine,
        registry: SourceRegistry,
    }

    impl Fixture {
        fn new(spec: PathSpec) -> Self {
            let dir = TempDir::new().unwrap();
            fs::create_dir_all(dir.path().join("save")).unwrap();
            let store = ContentStore::init(dir.path().join("Backups")).unwrap();
            let engine = BackupEngine::new(store, WorkerPool::new(4).unwrap());
            let mut registry = SourceRegistry::new();
            registry
                .upsert(
                    Source::new("game1").with_alias("g1").with_subsection("data", spec),
                    &SchemaValidator,
                )
                .unwrap();
            Self {
                dir,
                engine,
                registry,
            }
        }

        fn write(&self, rel: &str, data: &[u8]) -> PathBuf {
            let path = self.dir.path().join(rel);
            fs::write(&path, data).unwrap();
            path
        }

        fn options(&self) -> BackupOptions {
            BackupOptions {
                message: "test".into(),
                resolve: ResolveOptions {
                    cwd: Some(self.dir.path().to_path_buf()),
                    ..ResolveOptions::default()
                },
                ..BackupOptions::default()
            }
        }
    }

    #[test]
    fn test_identical_files_collapse() {
        let fx = Fixture::new(PathSpec::include("save/*.dat"));
        let one = fx.write("save/1.dat", b"X");
        let two = fx.write("save/2.dat", b"X");

        let report = fx.engine.create_backup(&fx.registry, "game1", &fx.options()).unwrap();
        let backup = report.backup;
        assert_eq!(backup.files.len(), 1);
        assert_eq!(backup.file_count(), 2);
        assert_eq!(backup.message, "test");
        assert_eq!(backup.source, "game1");

        let (key, entry) = backup.files.iter().next().unwrap();
        assert_eq!(entry.paths(), &[one, two]);
        let stored = fx.engine.store().get("game1", "data", &backup.uid, key).unwrap();
        assert_eq!(fs::read(stored).unwrap(), b"X");
    }

    #[test]
    fn test_backup_by_alias_records_name() {
        let fx = Fixture::new(PathSpec::include("save/*"));
        fx.write("save/a", b"a");
        let report = fx.engine.create_backup(&fx.registry, "g1", &fx.options()).unwrap();
        assert_eq!(report.backup.source, "game1");
        assert!(report.skipped.is_empty());
        assert!(report.backup.validate(&SchemaValidator).is_ok());
    }

    #[test]
    fn test_unknown_source_and_subsection() {
        let fx = Fixture::new(PathSpec::include("save/*"));
        let err = fx
            .engine
            .create_backup(&fx.registry, "missing", &fx.options())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));

        let options = BackupOptions {
            subpath: "config".into(),
            ..fx.options()
        };
        let err = fx.engine.create_backup(&fx.registry, "game1", &options).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_no_matches_fails() {
        let fx = Fixture::new(PathSpec::include("save/*.dat"));
        let err = fx
            .engine
            .create_backup(&fx.registry, "game1", &fx.options())
            .unwrap_err();
        assert!(matches!(err, Error::BackupFailed { .. }));
    }

    #[test]
    fn test_failed_files_are_skipped() {
        let hasher = Hasher::default();
        let paths: Vec<PathBuf> = ["/s/a", "/s/b", "/s/c", "/s/d"].map(PathBuf::from).into();
        let results = vec![
            Ok(hasher.digest_bytes(b"same")),
            Err(Error::io_at("/s/b", std::io::ErrorKind::PermissionDenied.into())),
            Ok(hasher.digest_bytes(b"same")),
            Ok(hasher.digest_bytes(b"other")),
        ];

        let (files, skipped) = record(paths, results);
        assert_eq!(files.len(), 2);
        assert_eq!(
            files[&hasher.digest_bytes(b"same")],
            FileEntry::Multiple(vec!["/s/a".into(), "/s/c".into()])
        );
        assert_eq!(files[&hasher.digest_bytes(b"other")], FileEntry::Single("/s/d".into()));
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].path, PathBuf::from("/s/b"));
        assert!(skipped[0].reason.contains("/s/b"));
    }

    #[test]
    fn test_every_file_failing_fails_the_backup() {
        let fx = Fixture::new(PathSpec::include("save/*.dat"));
        fx.write("save/1.dat", b"1");
        fx.write("save/2.dat", b"2");

        // A store rooted at a regular file cannot create any backup directory
        let root = fx.write("not-a-dir", b"");
        let engine = BackupEngine::new(ContentStore::new(&root), WorkerPool::new(2).unwrap());
        let err = engine
            .create_backup(&fx.registry, "game1", &fx.options())
            .unwrap_err();
        match err {
            Error::BackupFailed { reason, .. } => assert_eq!(reason, "all 2 files failed"),
            other => panic!("expected BackupFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_each_run_gets_a_fresh_uid() {
        let fx = Fixture::new(PathSpec::include("save/*"));
        fx.write("save/a", b"a");
        let first = fx.engine.create_backup(&fx.registry, "game1", &fx.options()).unwrap();
        let second = fx.engine.create_backup(&fx.registry, "game1", &fx.options()).unwrap();
        assert_ne!(first.backup.uid, second.backup.uid);
        assert_eq!(first.backup.files.keys().collect::<Vec<_>>(), second.backup.files.keys().collect::<Vec<_>>());
    }

    #[test]
    fn test_cancelled_backup() {
        let fx = Fixture::new(PathSpec::include("save/*"));
        fx.write("save/a", b"a");
        let cancel = CancelFlag::new();
        cancel.cancel();
        let options = BackupOptions {
            cancel: Some(cancel),
            ..fx.options()
        };
        let err = fx.engine.create_backup(&fx.registry, "game1", &options).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_blake3_backup_records_algorithm() {
        let mut fx = Fixture::new(PathSpec::include("save/*"));
        fx.engine = fx.engine.clone().with_hasher(Hasher::new(Algorithm::Blake3));
        fx.write("save/a", b"a");
        let report = fx.engine.create_backup(&fx.registry, "game1", &fx.options()).unwrap();
        assert_eq!(report.backup.algorithm, Algorithm::Blake3);
        assert!(fx.engine.verify(&report.backup).unwrap().is_ok());
    }

    #[test]
    fn test_verify_detects_damage() {
        let fx = Fixture::new(PathSpec::include("save/*"));
        fx.write("save/a", b"aaa");
        fx.write("save/b", b"bbb");
        let backup = fx
            .engine
            .create_backup(&fx.registry, "game1", &fx.options())
            .unwrap()
            .backup;
        assert!(fx.engine.verify(&backup).unwrap().is_ok());

        let mut keys = backup.files.keys();
        let (first, second) = (keys.next().unwrap(), keys.next().unwrap());
        let store = fx.engine.store();
        fs::write(store.get("game1", "data", &backup.uid, first).unwrap(), b"tampered").unwrap();
        fs::remove_file(store.get("game1", "data", &backup.uid, second).unwrap()).unwrap();

        let report = fx.engine.verify(&backup).unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.corrupted, vec![first.clone()]);
        assert_eq!(report.missing, vec![second.clone()]);
    }

    #[test]
    fn test_file_entry_push() {
        let mut entry = FileEntry::Single(PathBuf::from("/a"));
        entry.push(PathBuf::from("/b"));
        entry.push(PathBuf::from("/c"));
        assert_eq!(
            entry,
            FileEntry::Multiple(vec!["/a".into(), "/b".into(), "/c".into()])
        );
    }

    #[test]
    fn test_backup_serde_shape() {
        let key = Hasher::default().digest_bytes(b"X");
        let other = Hasher::default().digest_bytes(b"Y");
        let json = serde_json::json!({
            "uid": "u1",
            "date": "2000-12-30T23:59:59.999Z",
            "message": "",
            "source": "game1",
            "subpath": "data",
            "files": {
                key.as_str(): "/input/a",
                other.as_str(): ["/input/b", "/input/c"]
            }
        });
        let backup = Backup::from_value(json.clone(), &SchemaValidator).unwrap();
        assert_eq!(backup.algorithm, Algorithm::Sha256);
        assert_eq!(backup.files[&key], FileEntry::Single("/input/a".into()));
        assert_eq!(backup.file_count(), 3);

        let mut bad = json;
        bad["date"] = serde_json::json!("not a date");
        assert!(matches!(
            Backup::from_value(bad.clone(), &SchemaValidator),
            Err(Error::InvalidValue { .. })
        ));
        // AcceptAll defers to serde, which still rejects the date
        assert!(Backup::from_value(bad, &AcceptAll).is_err());
    }
}
