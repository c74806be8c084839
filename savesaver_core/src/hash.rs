//! Streaming content hashing and content keys.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

/// Digest size in bytes (both algorithms produce 256-bit digests).
pub const DIGEST_SIZE: usize = 32;

/// Block size used when the filesystem does not report one.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Upper bound on a single block read.
const MAX_BLOCK_SIZE: usize = 1024 * 1024;

/// Supported hash algorithms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// SHA-256.
    #[default]
    Sha256,
    /// BLAKE3 with 256-bit output.
    Blake3,
}

impl Algorithm {
    /// Returns the string representation of the algorithm (for config files).
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Blake3 => "blake3",
        }
    }

    /// Parse algorithm from string.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Algorithm::Sha256),
            "blake3" | "blake3-256" => Ok(Algorithm::Blake3),
            _ => Err(Error::unsupported_algorithm(s)),
        }
    }

    fn digester(&self) -> Digester {
        match self {
            Algorithm::Sha256 => Digester::Sha256(sha2::Sha256::new()),
            Algorithm::Blake3 => Digester::Blake3(Box::new(blake3::Hasher::new())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incremental digest accumulator.
enum Digester {
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl Digester {
    fn update(&mut self, block: &[u8]) {
        match self {
            Digester::Sha256(h) => h.update(block),
            Digester::Blake3(h) => {
                h.update(block);
            }
        }
    }

    fn finalize(self) -> [u8; DIGEST_SIZE] {
        match self {
            Digester::Sha256(h) => h.finalize().into(),
            Digester::Blake3(h) => *h.finalize().as_bytes(),
        }
    }
}

/// Encoded digest of a file's full byte stream.
///
/// Rendered as URL-safe base64 (`-` and `_` instead of `+` and `/`) with the
/// encoding's natural `=` padding, so a 32-byte digest is 44 characters.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentKey(String);

impl ContentKey {
    /// Encode raw digest bytes.
    pub fn from_digest(digest: &[u8; DIGEST_SIZE]) -> Self {
        ContentKey(URL_SAFE.encode(digest))
    }

    /// Parse and validate an encoded key.
    pub fn parse(s: &str) -> Result<Self> {
        let bytes = URL_SAFE
            .decode(s)
            .map_err(|e| Error::invalid_value(format!("invalid content key {:?}: {}", s, e)))?;
        if bytes.len() != DIGEST_SIZE {
            return Err(Error::invalid_value(format!(
                "invalid content key {:?}: expected {} digest bytes, got {}",
                s,
                DIGEST_SIZE,
                bytes.len()
            )));
        }
        Ok(ContentKey(s.to_string()))
    }

    /// The encoded key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContentKey {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        ContentKey::parse(&s)
    }
}

impl From<ContentKey> for String {
    fn from(key: ContentKey) -> Self {
        key.0
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentKey({})", self.0)
    }
}

/// Reads a file as successive fixed-size blocks.
///
/// The byte count is fixed when the reader is created; the last block is
/// sized to whatever remains. A file that shrinks underneath the reader
/// surfaces as an `UnexpectedEof` error. Restartable only by opening a new
/// reader.
pub struct BlockReader<R> {
    reader: R,
    remaining: u64,
    buf: Vec<u8>,
}

impl<R: Read> BlockReader<R> {
    /// Wrap a reader that is expected to yield exactly `len` bytes.
    pub fn new(reader: R, len: u64, block_size: usize) -> Self {
        let block_size = block_size.clamp(1, MAX_BLOCK_SIZE);
        Self {
            reader,
            remaining: len,
            buf: vec![0u8; block_size],
        }
    }

    /// Read the next block, or `None` once every byte has been read.
    pub fn next_block(&mut self) -> io::Result<Option<&[u8]>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let want = self.buf.len().min(self.remaining as usize);
        self.reader.read_exact(&mut self.buf[..want])?;
        self.remaining -= want as u64;
        Ok(Some(&self.buf[..want]))
    }
}

impl BlockReader<File> {
    /// Open a file, using its size and the filesystem's preferred block size.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let metadata = file.metadata()?;
        let block_size = preferred_block_size(&metadata);
        Ok(Self::new(file, metadata.len(), block_size))
    }
}

#[cfg(unix)]
fn preferred_block_size(metadata: &std::fs::Metadata) -> usize {
    use std::os::unix::fs::MetadataExt;
    match metadata.blksize() {
        0 => DEFAULT_BLOCK_SIZE,
        n => n as usize,
    }
}

#[cfg(not(unix))]
fn preferred_block_size(_metadata: &std::fs::Metadata) -> usize {
    DEFAULT_BLOCK_SIZE
}

/// Computes content keys for files.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hasher {
    algorithm: Algorithm,
    block_size: Option<usize>,
}

impl Hasher {
    /// Create a hasher for the given algorithm.
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            block_size: None,
        }
    }

    /// Force a block size instead of the filesystem's preferred one.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = Some(block_size);
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Digest a file's full contents, block by block.
    pub fn digest(&self, path: &Path) -> Result<ContentKey> {
        self.digest_into(path, &mut io::sink())
    }

    /// Digest a file while copying every block to `out`.
    ///
    /// The key always describes exactly the bytes written, even if the file
    /// changes on disk afterwards.
    pub fn digest_into<W: Write>(&self, path: &Path, out: &mut W) -> Result<ContentKey> {
        let mut blocks = match self.block_size {
            Some(size) => {
                let file = File::open(path).map_err(|e| Error::io_at(path, e))?;
                let len = file.metadata().map_err(|e| Error::io_at(path, e))?.len();
                BlockReader::new(file, len, size)
            }
            None => BlockReader::open(path).map_err(|e| Error::io_at(path, e))?,
        };

        let mut digester = self.algorithm.digester();
        while let Some(block) = blocks.next_block().map_err(|e| Error::io_at(path, e))? {
            digester.update(block);
            out.write_all(block)?;
        }
        Ok(ContentKey::from_digest(&digester.finalize()))
    }

    /// Digest an in-memory buffer in one shot.
    pub fn digest_bytes(&self, data: &[u8]) -> ContentKey {
        let mut digester = self.algorithm.digester();
        digester.update(data);
        ContentKey::from_digest(&digester.finalize())
    }
}
