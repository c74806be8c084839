//! Restore orchestrator: copy a backup's stored objects back to disk.

use crate::backup::Backup;
use crate::error::{Error, Result};
use crate::hash::ContentKey;
use crate::pool::{CancelFlag, WorkerPool};
use crate::store::ContentStore;
use crate::validate::{SchemaValidator, Validator};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Options for one restore run.
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Restore under this directory instead of the original locations.
    pub dest_root: Option<PathBuf>,
    pub cancel: Option<CancelFlag>,
}

/// An entry that could not be restored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRestore {
    pub key: ContentKey,
    /// None when the whole entry failed before any copy was attempted.
    pub destination: Option<PathBuf>,
    pub reason: String,
}

/// Outcome of a restore run: a partial success count plus what failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub restored: usize,
    pub failed: Vec<FailedRestore>,
}

impl RestoreReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

struct CopyJob<'a> {
    key: &'a ContentKey,
    stored: PathBuf,
    destination: PathBuf,
}

/// Restores backups out of one content store.
#[derive(Clone)]
pub struct RestoreEngine {
    store: ContentStore,
    validator: Arc<dyn Validator>,
    pool: WorkerPool,
}

impl RestoreEngine {
    pub fn new(store: ContentStore, pool: WorkerPool) -> Self {
        Self {
            store,
            validator: Arc::new(SchemaValidator),
            pool,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    /// Copy every file of `backup` to its original location, or under
    /// `options.dest_root` with the same layout.
    ///
    /// A stored object that is missing is reported as `MissingContent` for
    /// its entry; the remaining entries are still restored.
    pub fn restore(&self, backup: &Backup, options: &RestoreOptions) -> Result<RestoreReport> {
        backup.validate(self.validator.as_ref())?;

        let mut report = RestoreReport::default();
        let mut jobs = Vec::new();
        for (key, entry) in &backup.files {
            match self.store.get(&backup.source, &backup.subpath, &backup.uid, key) {
                Ok(stored) => {
                    for original in entry.paths() {
                        jobs.push(CopyJob {
                            key,
                            stored: stored.clone(),
                            destination: destination(original, options.dest_root.as_deref()),
                        });
                    }
                }
                Err(err) if err.is_not_found() => {
                    let err = Error::missing_content(key.as_str());
                    tracing::warn!(uid = %backup.uid, key = %key, "Stored object is missing");
                    report.failed.push(FailedRestore {
                        key: key.clone(),
                        destination: None,
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        let cancel = options.cancel.as_ref();
        let results: Vec<Result<()>> = self.pool.install(|| {
            jobs.par_iter()
                .map(|job| {
                    if let Some(flag) = cancel {
                        flag.check()?;
                    }
                    copy_file(&job.stored, &job.destination)
                })
                .collect()
        });

        if cancel.is_some_and(CancelFlag::is_cancelled) {
            tracing::warn!(uid = %backup.uid, "Restore cancelled");
            return Err(Error::Cancelled);
        }

        for (job, result) in jobs.into_iter().zip(results) {
            match result {
                Ok(()) => {
                    tracing::debug!(key = %job.key, path = %job.destination.display(), "Restored file");
                    report.restored += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        key = %job.key,
                        path = %job.destination.display(),
                        error = %err,
                        "Failed to restore file"
                    );
                    report.failed.push(FailedRestore {
                        key: job.key.clone(),
                        destination: Some(job.destination),
                        reason: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            uid = %backup.uid,
            restored = report.restored,
            failed = report.failed.len(),
            "Restore complete"
        );
        Ok(report)
    }
}

/// Where an original path lands: itself, or `root` joined with the path's
/// normal components.
pub fn destination(original: &Path, root: Option<&Path>) -> PathBuf {
    match root {
        None => original.to_path_buf(),
        Some(root) => original
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part),
                _ => None,
            })
            .fold(root.to_path_buf(), |acc, part| acc.join(part)),
    }
}

/// Replace `dest` with the bytes of `stored` without exposing a partial file.
fn copy_file(stored: &Path, dest: &Path) -> Result<()> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;

    let mut input = fs::File::open(stored).map_err(|e| Error::io_at(stored, e))?;
    let mut temp_file = tempfile::NamedTempFile::new_in(parent).map_err(|e| Error::io_at(parent, e))?;
    io::copy(&mut input, &mut temp_file).map_err(|e| Error::io_at(dest, e))?;
    temp_file.flush()?;
    temp_file.persist(dest)?;
    Ok(())
}
