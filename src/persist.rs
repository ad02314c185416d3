//! Walks `(path, metadata)` traversal entries, chunks regular files,
//! hashes and deduplicates their blocks, and yields manifest entries once
//! each file's blocks have been enqueued.

use crate::errors::{Error, Result};
use crate::fs::FileSystem;
use crate::hash::{self, BlockDigest};
use crate::manifest::ManifestEntry;
use crate::metadata::FileMetadata;
use crate::queue::{StorageOperation, StorageQueue};
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Digests already known to be present in the destination backend,
/// consulted to avoid redundant PUTs. Typically seeded from a prior
/// manifest's digest lists.
#[derive(Debug, Default, Clone)]
pub struct SkipSet(HashSet<BlockDigest>);

impl SkipSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, digest: &BlockDigest) -> bool {
        self.0.contains(digest)
    }

    pub fn insert(&mut self, digest: BlockDigest) -> bool {
        self.0.insert(digest)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Seed a skip-set from every digest already referenced by a manifest.
    #[must_use]
    pub fn from_manifest(entries: &[ManifestEntry]) -> Self {
        let mut set = HashSet::new();
        for entry in entries {
            set.extend(entry.digests.iter().cloned());
        }
        Self(set)
    }
}

/// Placeholder for a future incremental-persist optimization: referencing
/// a prior snapshot to skip unchanged files by ctime. Never constructible
/// in this version, so its presence on [`persist`]'s signature costs
/// nothing at the call site.
pub type Incremental = std::convert::Infallible;

/// Consume `entries` (in traversal order, as produced by
/// [`crate::fs::traverse`]), persisting each regular file's content blocks
/// to `queue` and returning the ordered sequence of [`ManifestEntry`]
/// values needed to write a manifest.
///
/// `base` is the traversal root; every yielded path is relative to it. The
/// returned iterator is lazy — nothing is read, hashed, or enqueued until
/// polled. Callers MUST fully drain it and then call `queue.wait()` before
/// writing a manifest from the results, so that every block PUT is
/// durable first.
///
/// # Errors
/// Each item is `Err` if the path does not start with `base`, the file
/// cannot be opened/read, or the queue has been poisoned by an earlier
/// failure.
pub fn persist<'a>(
    fs: &'a dyn FileSystem,
    base: &'a Path,
    entries: impl IntoIterator<Item = (PathBuf, FileMetadata)> + 'a,
    queue: &'a StorageQueue,
    blocksize: usize,
    skip_set: &'a mut SkipSet,
    _incremental: Option<Incremental>,
) -> impl Iterator<Item = Result<ManifestEntry>> + 'a {
    let mut entries = entries.into_iter();
    std::iter::from_fn(move || {
        let (path, metadata) = entries.next()?;
        Some(persist_one(fs, base, &path, metadata, queue, blocksize, skip_set))
    })
}

fn persist_one(
    fs: &dyn FileSystem,
    base: &Path,
    path: &Path,
    metadata: FileMetadata,
    queue: &StorageQueue,
    blocksize: usize,
    skip_set: &mut SkipSet,
) -> Result<ManifestEntry> {
    let relpath = path.strip_prefix(base).map_err(|_| {
        Error::Config(format!("traversal path {} does not start with base {}", path.display(), base.display()))
    })?;
    let relpath_string = relpath.to_string_lossy().replace('\\', "/");

    if !metadata.is_regular() {
        return Ok(ManifestEntry { path: relpath_string, metadata, digests: Vec::new() });
    }

    let mut reader = fs.open_read(path)?;
    let mut digests = Vec::new();
    let mut buf = vec![0u8; blocksize];
    loop {
        let n = read_up_to(&mut reader, &mut buf)?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];
        let digest = hash::hash(chunk);
        if !skip_set.contains(&digest) {
            queue
                .enqueue(StorageOperation::put(digest.object_name(), chunk.to_vec()))
                .map_err(|e| Error::QueueFailed(e.0))?;
            skip_set.insert(digest.clone());
        }
        digests.push(digest);
        if n < blocksize {
            break;
        }
    }

    Ok(ManifestEntry { path: relpath_string, metadata, digests })
}

/// Fill `buf` from `reader`, short only at EOF (unlike a single `read()`
/// call, which may return short reads for other reasons on some readers).
fn read_up_to(reader: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
