//! Orphan sweep.
//!
//! A backup directory `root/{source}/{subpath}/{uid}` belongs to exactly one
//! Backup record. Directories without a record are left behind by failed or
//! cancelled runs and can be reclaimed. A backup that is still running also
//! has a directory but no record yet, so directories touched within the
//! grace period are left alone.

use crate::error::{Error, Result};
use crate::manifest::BackupIndex;
use crate::store::{ContentStore, dir_size};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Default age a directory must reach before it can be swept.
pub const DEFAULT_GC_GRACE: Duration = Duration::from_secs(60 * 60);

/// Options for [`ContentStore::gc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcOptions {
    /// Report what would be deleted without deleting.
    pub dry_run: bool,
    /// Keep unrecorded directories modified more recently than this.
    pub grace: Duration,
}

impl Default for GcOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            grace: DEFAULT_GC_GRACE,
        }
    }
}

/// Statistics from a sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GcStats {
    /// Number of backup directories deleted.
    pub directories_deleted: usize,
    /// Bytes freed.
    pub bytes_freed: u64,
    /// Unrecorded directories kept because they were modified recently.
    pub directories_recent: usize,
}

impl ContentStore {
    /// Delete every backup directory that no record in `index` refers to.
    pub fn gc(&self, index: &BackupIndex, options: &GcOptions) -> Result<GcStats> {
        let live = mark(index);
        self.sweep(&live, options)
    }

    fn sweep(&self, live: &HashSet<(&str, &str, &str)>, options: &GcOptions) -> Result<GcStats> {
        let mut stats = GcStats::default();
        if !self.root().exists() {
            return Ok(stats);
        }
        let cutoff = SystemTime::now()
            .checked_sub(options.grace)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        for source_dir in subdirs(self.root())? {
            for subpath_dir in subdirs(&source_dir)? {
                for uid_dir in subdirs(&subpath_dir)? {
                    let (Some(source), Some(subpath), Some(uid)) =
                        (file_name(&source_dir), file_name(&subpath_dir), file_name(&uid_dir))
                    else {
                        continue;
                    };
                    if live.contains(&(source, subpath, uid)) {
                        continue;
                    }
                    if last_modified(&uid_dir)? > cutoff {
                        tracing::debug!(path = %uid_dir.display(), "Keeping recent unrecorded backup directory");
                        stats.directories_recent += 1;
                        continue;
                    }

                    let size = dir_size(&uid_dir)?;
                    tracing::info!(
                        path = %uid_dir.display(),
                        bytes = size,
                        dry_run = options.dry_run,
                        "Sweeping orphaned backup directory"
                    );
                    if !options.dry_run {
                        self.remove_backup_dir(source, subpath, uid)?;
                    }
                    stats.directories_deleted += 1;
                    stats.bytes_freed += size;
                }
            }
        }
        Ok(stats)
    }
}

/// Mark phase: every `(source, subpath, uid)` that has a record.
fn mark(index: &BackupIndex) -> HashSet<(&str, &str, &str)> {
    index
        .iter()
        .map(|b| (b.source.as_str(), b.subpath.as_str(), b.uid.as_str()))
        .collect()
}

fn subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::io_at(dir, e))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// Newest modification time of a backup directory and its entries.
///
/// In-progress temporary files count, so a long copy keeps its run alive.
fn last_modified(dir: &Path) -> Result<SystemTime> {
    let mut newest = fs::metadata(dir)
        .and_then(|m| m.modified())
        .map_err(|e| Error::io_at(dir, e))?;
    for entry in fs::read_dir(dir).map_err(|e| Error::io_at(dir, e))? {
        let modified = entry?.metadata()?.modified()?;
        newest = newest.max(modified);
    }
    Ok(newest)
}
