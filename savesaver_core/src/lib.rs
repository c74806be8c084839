//! # Save Saver Core
//!
//! Back up and restore named sets of files into a content-addressed store.
//!
//! A [`Source`] names a set of files through include/exclude glob patterns,
//! grouped into subsections. Backing up a subsection hashes every matching
//! file and copies it into a backup-scoped directory of the
//! [`ContentStore`], keyed by its [`ContentKey`]. The resulting [`Backup`]
//! record maps each key to the original path(s) so it can be restored later.
//!
//! ## Features
//!
//! - URL-safe SHA-256 (or BLAKE3) content keys, computed block by block
//! - Write-once object store with atomic, no-clobber commits
//! - Identical files collapse into one stored object
//! - Parallel hashing and copying on a bounded worker pool
//! - JSON manifests (`Sources.json`, `Backups.json`) with schema validation
//! - Sweep of backup directories left behind by failed runs
//!
//! ## Example
//!
//! ```no_run
//! use savesaver_core::{
//!     BackupEngine, BackupOptions, ContentStore, PathSpec, RestoreEngine, RestoreOptions,
//!     SchemaValidator, Source, SourceRegistry, WorkerPool,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = SourceRegistry::new();
//! registry.upsert(
//!     Source::new("game1").with_subsection("data", PathSpec::include("save/*.dat")),
//!     &SchemaValidator,
//! )?;
//!
//! let store = ContentStore::init("./save-saver-data/Backups")?;
//! let pool = WorkerPool::new(4)?;
//!
//! // Back up the "data" subsection
//! let engine = BackupEngine::new(store.clone(), pool.clone());
//! let report = engine.create_backup(&registry, "game1", &BackupOptions::default())?;
//! println!("Backed up {} files", report.backup.file_count());
//!
//! // Put everything back where it came from
//! let restored = RestoreEngine::new(store, pool).restore(&report.backup, &RestoreOptions::default())?;
//! println!("Restored {} files", restored.restored);
//! # Ok(())
//! # }
//! ```

mod backup;
mod config;
mod error;
mod gc;
mod glob;
mod hash;
mod manifest;
mod pool;
mod registry;
mod restore;
mod source;
mod store;
mod validate;

pub use backup::{
    Backup, BackupEngine, BackupOptions, BackupReport, FileEntry, SkippedFile, VerifyReport,
};
pub use config::{BACKUPS_DIR, BACKUPS_FILE, CONFIG_FILE, Config, SOURCES_FILE};
pub use error::{Error, Result};
pub use gc::{DEFAULT_GC_GRACE, GcOptions, GcStats};
pub use glob::{
    FileSet, Files, ResolveOptions, SkippedPattern, anchor_pattern, check_pattern, escape_glob,
    resolve,
};
pub use hash::{Algorithm, BlockReader, ContentKey, DEFAULT_BLOCK_SIZE, DIGEST_SIZE, Hasher};
pub use manifest::{
    BackupIndex, Manifest, SourcesDocument, load_backups, load_sources, save_backups,
    save_sources,
};
pub use pool::{CancelFlag, WorkerPool};
pub use registry::{SourceFilter, SourceRegistry};
pub use restore::{FailedRestore, RestoreEngine, RestoreOptions, RestoreReport, destination};
pub use source::{DEFAULT_SUBPATH, PathSpec, Source};
pub use store::{ContentStore, StoredObject};
pub use validate::{AcceptAll, EntityKind, SchemaValidator, Validator, is_valid_name};
