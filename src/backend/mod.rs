//! The backend contract: PUT/GET/LIST/DELETE against a named object store,
//! plus one-shot EXISTS/CREATE lifecycle hooks.
//!
//! Distinct `Backend` instances must be safely usable from distinct
//! threads concurrently; a single instance is used by at most one operation
//! at a time (enforced by [`crate::queue::StorageQueue`], not by this
//! trait).

mod cipher;
mod directory;
mod memory;

pub use cipher::CipherBackend;
pub use directory::DirectoryBackend;
pub use memory::MemoryBackend;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend not initialized (call create() first): {0}")]
    NotInitialized(String),

    #[error("cipher error: {0}")]
    Cipher(String),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// A stateful handle to an object store, identified by a URL/path/bucket
/// string at construction time.
///
/// # Errors
/// Every operation may fail with a [`BackendError`]; on failure, no partial
/// object must become visible to later `get`/`list` calls.
pub trait Backend: Send {
    /// Atomic write: either the full `data` becomes visible under `name`,
    /// or the object is left exactly as it was. If two `put`s race on the
    /// same name, the last to complete wins.
    fn put(&mut self, name: &str, data: &[u8]) -> BackendResult<()>;

    /// Returns the full bytes last `put` under `name`.
    /// Fails with [`BackendError::NotFound`] if absent.
    fn get(&mut self, name: &str) -> BackendResult<Vec<u8>>;

    /// Returns all current names. May be eventually consistent on
    /// eventually-consistent stores.
    fn list(&mut self) -> BackendResult<Vec<String>>;

    /// Makes `name` absent for future `get`/`list`. Idempotent: deleting an
    /// already-absent name is not itself an error at this layer (callers
    /// decide whether a miss is acceptable for their use case).
    fn delete(&mut self, name: &str) -> BackendResult<()>;

    /// Whether the backing storage already exists. Lifecycle-only; may
    /// race if called concurrently — callers invoke it once before
    /// concurrent use.
    fn exists(&mut self) -> BackendResult<bool>;

    /// Create the backing storage. Only called if `exists()` returned
    /// false. Not required to be thread-safe.
    fn create(&mut self) -> BackendResult<()>;
}

/// Construct a concrete backend from a `scheme:identifier` URI.
/// Supported schemes: `mem:<label>` and `dir:<path>`.
///
/// # Errors
/// Returns [`crate::errors::Error::UnknownBackendScheme`] for any other
/// scheme (an S3-style backend is a named extension point, not vendored in
/// this crate — see DESIGN.md).
pub fn open(uri: &str) -> crate::errors::Result<Box<dyn Backend>> {
    let (scheme, rest) = uri
        .split_once(':')
        .ok_or_else(|| crate::errors::Error::UnknownBackendScheme(uri.to_string()))?;
    match scheme {
        "mem" => Ok(Box::new(MemoryBackend::new(rest))),
        "dir" => Ok(Box::new(DirectoryBackend::new(rest)?)),
        _ => Err(crate::errors::Error::UnknownBackendScheme(uri.to_string())),
    }
}

/// As [`open`], additionally wrapping the result in a [`CipherBackend`]
/// when `crypto_key` is present (the `--crypto-key` CLI flag, see
/// `crate::cli`).
///
/// # Errors
/// As [`open`], plus a [`BackendError::Cipher`]-wrapped error if key
/// derivation fails.
pub fn open_with_key(uri: &str, crypto_key: Option<&str>) -> crate::errors::Result<Box<dyn Backend>> {
    let inner = open(uri)?;
    match crypto_key {
        Some(key) => Ok(Box::new(CipherBackend::new(inner, key.as_bytes())?)),
        None => Ok(inner),
    }
}

/// Blanket forwarding impl so a boxed trait object can itself be used
/// anywhere a `Backend` is expected — in particular, so [`CipherBackend`]
/// can wrap the `Box<dyn Backend>` that [`open`] returns without callers
/// needing to know the concrete backend type.
impl Backend for Box<dyn Backend> {
    fn put(&mut self, name: &str, data: &[u8]) -> BackendResult<()> {
        (**self).put(name, data)
    }

    fn get(&mut self, name: &str) -> BackendResult<Vec<u8>> {
        (**self).get(name)
    }

    fn list(&mut self) -> BackendResult<Vec<String>> {
        (**self).list()
    }

    fn delete(&mut self, name: &str) -> BackendResult<()> {
        (**self).delete(name)
    }

    fn exists(&mut self) -> BackendResult<bool> {
        (**self).exists()
    }

    fn create(&mut self) -> BackendResult<()> {
        (**self).create()
    }
}
