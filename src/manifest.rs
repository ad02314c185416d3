//! Manifest codec: the human-readable text format describing a snapshot as
//! an ordered sequence of `(path, metadata, digests)` entries.
//!
//! [`crate::pathcodec`] never produces a bare `|`, so paths can never
//! collide with the ` | ` field separator used below. A symlink entry's
//! digest-list field carries a single synthetic `link,<encoded-target>`
//! entry rather than being left empty, so the link target round-trips
//! losslessly (see DESIGN.md).

use crate::errors::{Error, Result};
use crate::hash::BlockDigest;
use crate::metadata::FileMetadata;
use crate::pathcodec::{spdecode, spencode};
use std::io::{BufRead, BufReader, Write};

/// First line of every manifest.
const MAGIC: &str = "cairn";
/// Only format version this crate writes or reads.
const VERSION: u32 = 1;

/// One line of a manifest: a relative path, its metadata, and the ordered
/// digests of its content blocks (empty for directories, symlinks, and
/// zero-length files).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub path: String,
    pub metadata: FileMetadata,
    pub digests: Vec<BlockDigest>,
}

/// Serialize `entries` as a manifest and write it to `w`.
///
/// # Errors
/// Returns [`Error::Io`] if writing fails.
pub fn write_manifest<W: Write>(w: &mut W, entries: &[ManifestEntry]) -> Result<()> {
    writeln!(w, "{MAGIC}")?;
    writeln!(w, "version {VERSION}")?;
    writeln!(w, "end")?;
    for entry in entries {
        let digest_list = if let Some(target) = entry.metadata.symlink_target() {
            // The plain `<algo>,<hex>` digest-list shape has no room for a
            // symlink target. Reuse the same field as a single synthetic
            // `link,<encoded-target>` entry instead.
            format!("link,{}", spencode(target))
        } else {
            entry.digests.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
        };
        writeln!(
            w,
            "{} | {} | {}",
            entry.metadata.to_field_string(),
            spencode(&entry.path),
            digest_list
        )?;
    }
    Ok(())
}

/// Parse a complete manifest from `r`.
///
/// # Errors
/// Returns [`Error::Io`] on a read failure, or [`Error::ManifestParse`] if
/// the header is malformed or any entry line fails to parse; the error
/// names the offending 1-indexed line number and its raw text.
pub fn read_manifest<R: std::io::Read>(r: R) -> Result<Vec<ManifestEntry>> {
    let mut lines = BufReader::new(r).lines();

    let line1 = read_required_line(&mut lines, 1)?;
    if line1 != MAGIC {
        return Err(Error::ManifestParse {
            line: 1,
            text: line1,
            reason: format!("expected header magic {MAGIC:?}"),
        });
    }

    let line2 = read_required_line(&mut lines, 2)?;
    let version_str = line2.strip_prefix("version ").ok_or_else(|| Error::ManifestParse {
        line: 2,
        text: line2.clone(),
        reason: "expected a 'version N' line".to_string(),
    })?;
    let version: u32 = version_str.trim().parse().map_err(|_| Error::ManifestParse {
        line: 2,
        text: line2.clone(),
        reason: format!("invalid version number {version_str:?}"),
    })?;
    if version != VERSION {
        return Err(Error::ManifestParse {
            line: 2,
            text: line2,
            reason: format!("unsupported manifest version {version} (expected {VERSION})"),
        });
    }

    let line3 = read_required_line(&mut lines, 3)?;
    if line3 != "end" {
        return Err(Error::ManifestParse {
            line: 3,
            text: line3,
            reason: "expected 'end' to terminate the header".to_string(),
        });
    }

    let mut entries = Vec::new();
    let mut lineno = 3;
    for line in lines {
        lineno += 1;
        let line = line.map_err(Error::Io)?;
        entries.push(parse_entry_line(&line, lineno)?);
    }
    Ok(entries)
}

fn read_required_line<R: std::io::Read>(
    lines: &mut std::io::Lines<BufReader<R>>,
    lineno: usize,
) -> Result<String> {
    match lines.next() {
        Some(line) => line.map_err(Error::Io),
        None => Err(Error::ManifestParse {
            line: lineno,
            text: String::new(),
            reason: "unexpected end of manifest while reading header".to_string(),
        }),
    }
}

fn parse_entry_line(line: &str, lineno: usize) -> Result<ManifestEntry> {
    let parse_err = |reason: String| Error::ManifestParse { line: lineno, text: line.to_string(), reason };

    let mut parts = line.splitn(3, '|').map(str::trim);
    let fields = parts.next().ok_or_else(|| parse_err("missing metadata field".to_string()))?;
    let encoded_path = parts.next().ok_or_else(|| parse_err("missing path field".to_string()))?;
    let digest_list = parts.next().ok_or_else(|| parse_err("missing digest-list field".to_string()))?;

    let path = spdecode(encoded_path).map_err(parse_err)?;

    let is_symlink_type = fields.split_whitespace().next().is_some_and(|m| m.starts_with('l'));

    let (digests, symlink_target) = if is_symlink_type {
        let (algo, encoded_target) = digest_list
            .split_once(',')
            .filter(|(algo, _)| *algo == "link")
            .ok_or_else(|| parse_err(format!("symlink entry missing link target: {digest_list:?}")))?;
        let _ = algo;
        let target = spdecode(encoded_target).map_err(parse_err)?;
        (Vec::new(), Some(target))
    } else if digest_list.is_empty() {
        (Vec::new(), None)
    } else {
        let digests = digest_list
            .split_whitespace()
            .map(|pair| {
                let (algo, hex) = pair
                    .split_once(',')
                    .ok_or_else(|| parse_err(format!("malformed digest pair {pair:?}")))?;
                Ok(BlockDigest::new(algo, hex))
            })
            .collect::<Result<Vec<_>>>()?;
        (digests, None)
    };

    let metadata = FileMetadata::from_field_string(fields, symlink_target).map_err(parse_err)?;

    Ok(ManifestEntry { path, metadata, digests })
}

/// Manifest object names must not contain `.` (reserved for future
/// extensions).
///
/// # Errors
/// Returns [`Error::InvalidManifestName`] if `name` contains a `.`.
pub fn check_manifest_name(name: &str) -> Result<()> {
    if name.contains('.') {
        return Err(Error::InvalidManifestName(name.to_string()));
    }
    Ok(())
}

/// Serialize and store `entries` under `name` via `backend`.
///
/// # Errors
/// Returns [`Error::InvalidManifestName`] if `name` is invalid, or
/// [`Error::Backend`] if the underlying PUT fails.
pub fn store_manifest(
    backend: &mut dyn crate::backend::Backend,
    name: &str,
    entries: &[ManifestEntry],
) -> Result<()> {
    check_manifest_name(name)?;
    let mut buf = Vec::new();
    write_manifest(&mut buf, entries)?;
    backend.put(name, &buf)?;
    Ok(())
}

/// Fetch and parse the manifest stored under `name`.
///
/// # Errors
/// Returns [`Error::Backend`] if the GET fails, or [`Error::ManifestParse`]
/// if the stored content is malformed.
pub fn load_manifest(backend: &mut dyn crate::backend::Backend, name: &str) -> Result<Vec<ManifestEntry>> {
    let bytes = backend.get(name)?;
    read_manifest(&bytes[..])
}

/// List manifest names known to `backend`.
///
/// # Errors
/// Returns [`Error::Backend`] if the underlying LIST fails.
pub fn list_manifests(backend: &mut dyn crate::backend::Backend) -> Result<Vec<String>> {
    Ok(backend.list()?)
}

/// Delete the manifest stored under `name`.
///
/// # Errors
/// Returns [`Error::Backend`] if the underlying DELETE fails.
pub fn delete_manifest(backend: &mut dyn crate::backend::Backend, name: &str) -> Result<()> {
    backend.delete(name)?;
    Ok(())
}
