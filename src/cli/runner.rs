//! Dispatches a parsed [`crate::cli::Command`] against real backends and
//! the local filesystem, formatting results per [`OutputMode`].

use super::command::Command;
use super::util::{parse_composite, DEFAULT_CONCURRENCY};
use crate::backend::{open_with_key, Backend};
use crate::errors::{Error, Result};
use crate::fs::NativeFileSystem;
use crate::hash;
use crate::manifest;
use crate::persist::SkipSet;
use crate::queue::StorageQueue;
use std::collections::HashSet;
use std::io::Write as _;

/// How subcommand results are rendered to stdout.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputMode {
    Human,
    Plain,
    Json,
}

fn queue_for(data_uri: String, crypto_key: Option<String>) -> StorageQueue {
    StorageQueue::new(
        move || open_with_key(&data_uri, crypto_key.as_deref()).expect("backend factory: failed to open backend"),
        DEFAULT_CONCURRENCY,
    )
}

/// Execute `cmd`, printing its result to stdout per `mode`.
///
/// # Errors
/// Propagates the first I/O, backend, or queue failure encountered; for
/// `GarbageCollect`, always returns [`Error::FeatureNotImplemented`].
pub fn run(cmd: Command, mode: OutputMode) -> Result<()> {
    match cmd {
        Command::Persist { src_path, dst_uri, block_size, crypto_key } => {
            persist(&src_path, &dst_uri, block_size, crypto_key, mode)
        }
        Command::Materialize { src_uri, dst_path, crypto_key } => materialize(&src_uri, &dst_path, crypto_key, mode),
        Command::ListManifest { uri, crypto_key } => list_manifest(&uri, crypto_key, mode),
        Command::CommonBlocks { uri, manifests, crypto_key } => common_blocks(&uri, &manifests, crypto_key, mode),
        Command::GetBlock { uri, block, local, crypto_key } => get_block(&uri, &block, local, crypto_key),
        Command::Verify { uri, crypto_key } => verify(&uri, crypto_key, mode),
        Command::TestBackend { uri, crypto_key } => test_backend(&uri, crypto_key, mode),
        Command::GarbageCollect => Err(Error::FeatureNotImplemented("garbage-collect")),
    }
}

fn persist(
    src_path: &std::path::Path,
    dst_uri: &str,
    block_size: usize,
    crypto_key: Option<String>,
    mode: OutputMode,
) -> Result<()> {
    let (manifest_uri, label, data_uri) = parse_composite(dst_uri).map_err(Error::Config)?;
    manifest::check_manifest_name(&label)?;

    let fs = NativeFileSystem;
    let entries = crate::fs::traverse(&fs, src_path)?;

    let queue = queue_for(data_uri, crypto_key.clone());
    let mut skip_set = SkipSet::new();
    let manifest_entries: Vec<_> =
        crate::persist::persist(&fs, src_path, entries, &queue, block_size, &mut skip_set, None)
            .collect::<Result<_>>()?;
    queue.wait().map_err(|e| Error::QueueFailed(e.0))?;

    let mut manifest_backend = open_with_key(&manifest_uri, crypto_key.as_deref())?;
    manifest::store_manifest(manifest_backend.as_mut(), &label, &manifest_entries)?;

    match mode {
        OutputMode::Json => {
            let json = serde_json::json!({
                "action": "persist",
                "manifest": label,
                "entries": manifest_entries.len(),
                "blocks_written": skip_set.len(),
            });
            println!("{json}");
        }
        OutputMode::Plain => println!("{label} {} {}", manifest_entries.len(), skip_set.len()),
        OutputMode::Human => {
            println!(
                "persisted {} entries ({} unique blocks) as manifest {label:?}",
                manifest_entries.len(),
                skip_set.len()
            );
        }
    }
    Ok(())
}

fn materialize(src_uri: &str, dst_path: &std::path::Path, crypto_key: Option<String>, mode: OutputMode) -> Result<()> {
    let (manifest_uri, label, data_uri) = parse_composite(src_uri).map_err(Error::Config)?;

    let mut manifest_backend = open_with_key(&manifest_uri, crypto_key.as_deref())?;
    let entries = manifest::load_manifest(manifest_backend.as_mut(), &label)?;

    let fs = NativeFileSystem;
    let queue = queue_for(data_uri, crypto_key);
    crate::materialize::materialize(&fs, dst_path, &entries, &queue)?;

    match mode {
        OutputMode::Json => {
            let json = serde_json::json!({"action": "materialize", "manifest": label, "entries": entries.len()});
            println!("{json}");
        }
        OutputMode::Plain => println!("{} {}", label, entries.len()),
        OutputMode::Human => println!("materialized {} entries from manifest {label:?}", entries.len()),
    }
    Ok(())
}

fn list_manifest(uri: &str, crypto_key: Option<String>, mode: OutputMode) -> Result<()> {
    let mut backend = open_with_key(uri, crypto_key.as_deref())?;
    let mut names = manifest::list_manifests(backend.as_mut())?;
    names.sort();
    match mode {
        OutputMode::Json => println!("{}", serde_json::json!(names)),
        _ => {
            for n in &names {
                println!("{n}");
            }
        }
    }
    Ok(())
}

fn common_blocks(uri: &str, manifest_names: &[String], crypto_key: Option<String>, mode: OutputMode) -> Result<()> {
    let mut backend = open_with_key(uri, crypto_key.as_deref())?;
    let mut sets: Vec<HashSet<String>> = Vec::with_capacity(manifest_names.len());
    for name in manifest_names {
        let entries = manifest::load_manifest(backend.as_mut(), name)?;
        let digests: HashSet<String> =
            entries.iter().flat_map(|e| e.digests.iter()).map(|d| d.hex().to_string()).collect();
        sets.push(digests);
    }

    let mut common: Vec<String> = match sets.split_first() {
        Some((first, rest)) => {
            let mut acc = first.clone();
            for s in rest {
                acc.retain(|h| s.contains(h));
            }
            acc.into_iter().collect()
        }
        None => Vec::new(),
    };
    common.sort();

    match mode {
        OutputMode::Json => println!("{}", serde_json::json!(common)),
        _ => {
            for h in &common {
                println!("{h}");
            }
        }
    }
    Ok(())
}

fn get_block(uri: &str, block: &str, local: Option<std::path::PathBuf>, crypto_key: Option<String>) -> Result<()> {
    let mut backend = open_with_key(uri, crypto_key.as_deref())?;
    let data = backend.get(block)?;
    match local {
        Some(path) => {
            std::fs::write(&path, &data)?;
        }
        None => {
            std::io::stdout().write_all(&data)?;
        }
    }
    Ok(())
}

fn verify(uri: &str, crypto_key: Option<String>, mode: OutputMode) -> Result<()> {
    let (manifest_uri, label, data_uri) = parse_composite(uri).map_err(Error::Config)?;
    let mut manifest_backend = open_with_key(&manifest_uri, crypto_key.as_deref())?;
    let entries = manifest::load_manifest(manifest_backend.as_mut(), &label)?;
    let mut data_backend = open_with_key(&data_uri, crypto_key.as_deref())?;

    let mut checked = 0usize;
    let mut mismatches = Vec::new();
    for entry in &entries {
        for digest in &entry.digests {
            checked += 1;
            match data_backend.get(digest.object_name()) {
                Ok(bytes) => {
                    let actual = hash::hash(&bytes);
                    if actual.hex() != digest.hex() {
                        mismatches.push(format!("{}: digest mismatch (expected {}, got {})", entry.path, digest.hex(), actual.hex()));
                    }
                }
                Err(e) => mismatches.push(format!("{}: block {} unreadable: {e}", entry.path, digest.hex())),
            }
        }
    }

    match mode {
        OutputMode::Json => {
            let json = serde_json::json!({"checked": checked, "mismatches": mismatches});
            println!("{json}");
        }
        _ => {
            println!("checked {checked} blocks, {} mismatches", mismatches.len());
            for m in &mismatches {
                println!("  {m}");
            }
        }
    }

    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!("{} block(s) failed verification", mismatches.len())))
    }
}

fn test_backend(uri: &str, crypto_key: Option<String>, mode: OutputMode) -> Result<()> {
    let mut backend = open_with_key(uri, crypto_key.as_deref())?;
    if !backend.exists()? {
        backend.create()?;
    }
    let probe_name = "cairn-test-backend-probe";
    let probe_value = b"cairn round-trip probe";
    backend.put(probe_name, probe_value)?;
    let got = backend.get(probe_name)?;
    if got != probe_value {
        return Err(Error::Config("backend returned different bytes than were put".to_string()));
    }
    if !backend.list()?.iter().any(|n| n == probe_name) {
        return Err(Error::Config("backend list() did not include the just-written probe object".to_string()));
    }
    backend.delete(probe_name)?;

    match mode {
        OutputMode::Json => println!("{}", serde_json::json!({"ok": true})),
        _ => println!("backend ok: {uri}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    #[test]
    fn persist_then_materialize_round_trips_through_runner() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir(src.path().join("sub")).unwrap();
        std::fs::write(src.path().join("sub/file.txt"), b"hello from runner test").unwrap();

        let label = "test-runner-roundtrip";
        MemoryBackend::reset(label);
        run(
            Command::Persist {
                src_path: src.path().to_path_buf(),
                dst_uri: format!("mem:{label},snap,mem:{label}"),
                block_size: 8,
                crypto_key: None,
            },
            OutputMode::Plain,
        )
        .unwrap();

        let dst = tempfile::tempdir().unwrap();
        run(
            Command::Materialize {
                src_uri: format!("mem:{label},snap,mem:{label}"),
                dst_path: dst.path().to_path_buf(),
                crypto_key: None,
            },
            OutputMode::Plain,
        )
        .unwrap();

        let out = std::fs::read(dst.path().join("sub/file.txt")).unwrap();
        assert_eq!(out, b"hello from runner test");
    }

    #[test]
    fn test_backend_round_trips_on_memory_backend() {
        let label = "test-runner-testbackend";
        MemoryBackend::reset(label);
        run(Command::TestBackend { uri: format!("mem:{label}"), crypto_key: None }, OutputMode::Plain).unwrap();
    }

    #[test]
    fn garbage_collect_is_not_implemented() {
        let err = run(Command::GarbageCollect, OutputMode::Plain).unwrap_err();
        assert!(matches!(err, Error::FeatureNotImplemented(_)));
    }

    #[test]
    fn common_blocks_finds_shared_digest() {
        let label = "test-runner-commonblocks";
        MemoryBackend::reset(label);
        let mut backend = MemoryBackend::new(label);

        let shared = hash::hash(b"shared content");
        let only_a = hash::hash(b"only in a");

        let entry_shared_a = crate::manifest::ManifestEntry {
            path: "a".to_string(),
            metadata: crate::metadata::FileMetadata::new(
                crate::metadata::FileType::Regular,
                crate::metadata::Permissions { user_read: true, ..Default::default() },
                0,
                0,
                0,
                0,
                0,
                0,
                None,
            ),
            digests: vec![shared.clone(), only_a.clone()],
        };
        let entry_shared_b = crate::manifest::ManifestEntry {
            path: "b".to_string(),
            metadata: entry_shared_a.metadata.clone(),
            digests: vec![shared.clone()],
        };

        crate::manifest::store_manifest(&mut backend, "mf-a", &[entry_shared_a]).unwrap();
        crate::manifest::store_manifest(&mut backend, "mf-b", &[entry_shared_b]).unwrap();

        common_blocks(&format!("mem:{label}"), &["mf-a".to_string(), "mf-b".to_string()], None, OutputMode::Plain)
            .unwrap();
    }

    #[test]
    fn get_block_writes_to_local_path() {
        let label = "test-runner-getblock";
        MemoryBackend::reset(label);
        let mut backend = MemoryBackend::new(label);
        backend.put("blockname", b"block bytes").unwrap();

        let out = tempfile::NamedTempFile::new().unwrap();
        get_block(&format!("mem:{label}"), "blockname", Some(out.path().to_path_buf()), None).unwrap();
        assert_eq!(std::fs::read(out.path()).unwrap(), b"block bytes");
    }

    #[test]
    fn verify_detects_tampered_block() {
        let label = "test-runner-verify-tamper";
        MemoryBackend::reset(label);
        let mut backend = MemoryBackend::new(label);

        let digest = hash::hash(b"original content");
        backend.put(digest.object_name(), b"original content").unwrap();
        let entry = crate::manifest::ManifestEntry {
            path: "f".to_string(),
            metadata: crate::metadata::FileMetadata::new(
                crate::metadata::FileType::Regular,
                crate::metadata::Permissions { user_read: true, ..Default::default() },
                0,
                0,
                0,
                0,
                0,
                0,
                None,
            ),
            digests: vec![digest.clone()],
        };
        crate::manifest::store_manifest(&mut backend, "mf", &[entry]).unwrap();

        // Verification succeeds while the block is untouched.
        verify(&format!("mem:{label},mf,mem:{label}"), None, OutputMode::Plain).unwrap();

        // Tamper with the stored bytes directly; verification must now fail.
        backend.put(digest.object_name(), b"tampered!!!!!!!!!").unwrap();
        let err = verify(&format!("mem:{label},mf,mem:{label}"), None, OutputMode::Plain).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
