//! Backup-scoped content store and object I/O.

use crate::error::{Error, Result};
use crate::hash::{ContentKey, Hasher};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A content-addressed copy of a file inside one backup's directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: ContentKey,
    /// Absolute location of the stored bytes.
    pub path: PathBuf,
    /// False when the object was already present and the copy was skipped.
    pub written: bool,
}

/// A content store rooted at a backups directory.
///
/// Objects live at `root/{source}/{subpath}/{uid}/{key}` and are write-once:
/// an existing object is never replaced.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Create a store handle without touching the filesystem.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Create the root directory if needed and return a handle to it.
    pub fn init<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| Error::io_at(&root, e))?;
        Ok(Self { root })
    }

    /// Get the root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every object of one backup.
    ///
    /// Returns: `{root}/{source}/{subpath}/{uid}`
    pub fn backup_dir(&self, source: &str, subpath: &str, uid: &str) -> Result<PathBuf> {
        Ok(self
            .root
            .join(component(source)?)
            .join(component(subpath)?)
            .join(component(uid)?))
    }

    /// Location of one stored object.
    pub fn object_path(
        &self,
        source: &str,
        subpath: &str,
        uid: &str,
        key: &ContentKey,
    ) -> Result<PathBuf> {
        Ok(self.backup_dir(source, subpath, uid)?.join(key.as_str()))
    }

    /// Copy `source_path` into a backup's directory under its content key.
    ///
    /// The file is read once: every block is hashed and written to a
    /// temporary file in the destination directory, which is then committed
    /// under the resulting key with a no-clobber rename. The stored bytes
    /// always match their key, concurrent puts of the same content land
    /// exactly one copy, and a partial object is never exposed.
    pub fn put(
        &self,
        source: &str,
        subpath: &str,
        uid: &str,
        source_path: &Path,
        hasher: &Hasher,
    ) -> Result<StoredObject> {
        let dir = self.backup_dir(source, subpath, uid)?;
        fs::create_dir_all(&dir).map_err(|e| Error::io_at(&dir, e))?;

        let mut temp_file = tempfile::NamedTempFile::new_in(&dir)?;
        let key = hasher.digest_into(source_path, &mut temp_file)?;
        temp_file.flush()?;

        let obj_path = dir.join(key.as_str());
        if obj_path.exists() {
            return Ok(StoredObject {
                key,
                path: obj_path,
                written: false,
            });
        }

        match temp_file.persist_noclobber(&obj_path) {
            Ok(_) => Ok(StoredObject {
                key,
                path: obj_path,
                written: true,
            }),
            // Lost the race to another writer of the same key
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => Ok(StoredObject {
                key,
                path: obj_path,
                written: false,
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Absolute path of a stored object.
    pub fn get(&self, source: &str, subpath: &str, uid: &str, key: &ContentKey) -> Result<PathBuf> {
        let obj_path = self.object_path(source, subpath, uid, key)?;
        if !obj_path.is_file() {
            return Err(Error::not_found("Stored object", key.as_str()));
        }
        Ok(obj_path)
    }

    /// Delete a backup's directory and everything in it.
    ///
    /// Returns the number of bytes freed; a missing directory frees nothing.
    pub fn remove_backup_dir(&self, source: &str, subpath: &str, uid: &str) -> Result<u64> {
        let dir = self.backup_dir(source, subpath, uid)?;
        if !dir.exists() {
            return Ok(0);
        }
        let freed = dir_size(&dir)?;
        fs::remove_dir_all(&dir).map_err(|e| Error::io_at(&dir, e))?;

        // Drop now-empty parents, but never the store root
        for parent in [dir.parent(), dir.parent().and_then(Path::parent)]
            .into_iter()
            .flatten()
        {
            if parent != self.root && fs::remove_dir(parent).is_err() {
                break;
            }
        }
        Ok(freed)
    }
}

/// Validate a single path component - no traversal, no separators.
fn component(name: &str) -> Result<&str> {
    if name.is_empty() {
        return Err(Error::invalid_argument("path component cannot be empty"));
    }
    if name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return Err(Error::invalid_argument(format!(
            "invalid path component: {} (must not be . or .. or contain path separators)",
            name
        )));
    }
    Ok(name)
}

/// Total size of the regular files below `dir`.
pub(crate) fn dir_size(dir: &Path) -> Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(dir).map_err(|e| Error::io_at(dir, e))? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += metadata.len();
        }
    }
    Ok(total)
}
