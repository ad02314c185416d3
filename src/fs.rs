//! File-system abstraction and tree traversal.
//!
//! Wrapping file-system access behind a trait keeps the persist and
//! materialize pipelines testable without touching a real disk, and
//! isolates the one genuinely platform-sensitive part of this crate
//! (uid/gid/mode) behind `NativeFileSystem`.

use crate::metadata::{FileMetadata, FileType, Permissions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// A writable file handle that can also be flushed durably to storage.
/// Plain `Write` has no `sync`, and the last block of a materialized file
/// needs one.
pub trait WriteSync: Write + Send {
    fn sync(&mut self) -> io::Result<()>;
}

impl WriteSync for std::fs::File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Abstract file-system access: everything the Persistor and Materializer
/// need, and nothing else (no rename, no seek — ordering guarantees come
/// from the caller, not from this trait).
pub trait FileSystem: Send + Sync {
    /// Metadata of `path` itself, not following a trailing symlink.
    fn lstat(&self, path: &Path) -> io::Result<FileMetadata>;

    /// Entry names directly under `path`, in arbitrary order (callers sort).
    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>>;

    fn is_dir(&self, path: &Path) -> bool;
    fn is_symlink(&self, path: &Path) -> bool;

    /// The target of a symlink at `path`.
    fn read_link(&self, path: &Path) -> io::Result<String>;

    fn mkdir(&self, path: &Path) -> io::Result<()>;
    fn create_symlink(&self, target: &str, link: &Path) -> io::Result<()>;

    /// Open an existing regular file for sequential reading.
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    /// Create (or truncate) a regular file for sequential writing.
    fn create_file(&self, path: &Path) -> io::Result<Box<dyn WriteSync>>;

    /// Apply `meta`'s permission bits, ownership, and timestamps to `path`.
    /// Best-effort on platforms or entry types that do not support a given
    /// facet (e.g. ownership outside a privileged process).
    fn set_metadata(&self, path: &Path, meta: &FileMetadata) -> io::Result<()>;
}

/// `FileSystem` backed by the real, local file system.
pub struct NativeFileSystem;

impl FileSystem for NativeFileSystem {
    fn lstat(&self, path: &Path) -> io::Result<FileMetadata> {
        let meta = std::fs::symlink_metadata(path)?;
        native_metadata_to_file_metadata(path, &meta)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(path)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn is_dir(&self, path: &Path) -> bool {
        std::fs::symlink_metadata(path).map(|m| m.is_dir()).unwrap_or(false)
    }

    fn is_symlink(&self, path: &Path) -> bool {
        std::fs::symlink_metadata(path).map(|m| m.file_type().is_symlink()).unwrap_or(false)
    }

    fn read_link(&self, path: &Path) -> io::Result<String> {
        Ok(std::fs::read_link(path)?.to_string_lossy().into_owned())
    }

    fn mkdir(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir(path)
    }

    fn create_symlink(&self, target: &str, link: &Path) -> io::Result<()> {
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(target, link)
        }
        #[cfg(not(unix))]
        {
            let _ = (target, link);
            Err(io::Error::other("symlink creation is not supported on this platform"))
        }
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(std::fs::File::open(path)?))
    }

    fn create_file(&self, path: &Path) -> io::Result<Box<dyn WriteSync>> {
        Ok(Box::new(std::fs::File::create(path)?))
    }

    fn set_metadata(&self, path: &Path, meta: &FileMetadata) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if !meta.is_symlink() {
                let mode = unix_mode_bits(meta);
                std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
            }
            // uid/gid changes require privileges most test/CI environments
            // lack; best-effort, ignore EPERM.
            let _ = std::os::unix::fs::chown(path, Some(meta.uid()), Some(meta.gid()));
            let _ = filetime::set_file_times(
                path,
                filetime::FileTime::from_unix_time(meta.atime(), 0),
                filetime::FileTime::from_unix_time(meta.mtime(), 0),
            );
            Ok(())
        }
        #[cfg(not(unix))]
        {
            let _ = (path, meta);
            Ok(())
        }
    }
}

#[cfg(unix)]
fn unix_mode_bits(meta: &FileMetadata) -> u32 {
    let p = meta.permissions();
    let mut m = 0u32;
    if p.user_read {
        m |= 0o400;
    }
    if p.user_write {
        m |= 0o200;
    }
    if p.user_execute {
        m |= 0o100;
    }
    if p.group_read {
        m |= 0o040;
    }
    if p.group_write {
        m |= 0o020;
    }
    if p.group_execute {
        m |= 0o010;
    }
    if p.other_read {
        m |= 0o004;
    }
    if p.other_write {
        m |= 0o002;
    }
    if p.other_execute {
        m |= 0o001;
    }
    if p.setuid {
        m |= 0o4000;
    }
    if p.setgid {
        m |= 0o2000;
    }
    if p.sticky {
        m |= 0o1000;
    }
    m
}

#[cfg(unix)]
fn native_metadata_to_file_metadata(path: &Path, meta: &std::fs::Metadata) -> io::Result<FileMetadata> {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    let ft = meta.file_type();
    let file_type = if ft.is_symlink() {
        FileType::Symlink
    } else if ft.is_dir() {
        FileType::Directory
    } else if ft.is_file() {
        FileType::Regular
    } else {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;
            if ft.is_block_device() {
                FileType::BlockDevice
            } else if ft.is_char_device() {
                FileType::CharacterDevice
            } else if ft.is_fifo() {
                FileType::Fifo
            } else {
                FileType::Regular
            }
        }
        #[cfg(not(unix))]
        FileType::Regular
    };

    let mode = meta.permissions().mode();
    let perms = Permissions {
        user_read: mode & 0o400 != 0,
        user_write: mode & 0o200 != 0,
        user_execute: mode & 0o100 != 0,
        group_read: mode & 0o040 != 0,
        group_write: mode & 0o020 != 0,
        group_execute: mode & 0o010 != 0,
        other_read: mode & 0o004 != 0,
        other_write: mode & 0o002 != 0,
        other_execute: mode & 0o001 != 0,
        setuid: mode & 0o4000 != 0,
        setgid: mode & 0o2000 != 0,
        sticky: mode & 0o1000 != 0,
    };

    let symlink_target =
        if file_type == FileType::Symlink { Some(std::fs::read_link(path)?.to_string_lossy().into_owned()) } else { None };

    Ok(FileMetadata::new(
        file_type,
        perms,
        meta.uid(),
        meta.gid(),
        if file_type == FileType::Regular { meta.size() } else { 0 },
        meta.atime(),
        meta.mtime(),
        meta.ctime(),
        symlink_target,
    ))
}

#[cfg(not(unix))]
fn native_metadata_to_file_metadata(_path: &Path, _meta: &std::fs::Metadata) -> io::Result<FileMetadata> {
    Err(io::Error::other("native metadata extraction is only implemented for unix"))
}

/// Traverse the tree rooted at `path`, depth-first, visiting each
/// directory's children in sorted order, matching the traversal order the
/// manifest format requires.
///
/// # Errors
/// Returns an error if `path` does not exist, is not a directory (and not
/// itself a symlink standing in for one), or any nested `list_dir`/`lstat`
/// call fails.
pub fn traverse(fs: &dyn FileSystem, path: &Path) -> io::Result<Vec<(PathBuf, FileMetadata)>> {
    if !fs.is_dir(path) || fs.is_symlink(path) {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("{} is not a directory", path.display())));
    }

    let mut out = Vec::new();
    out.push((path.to_path_buf(), fs.lstat(path)?));
    traverse_dir(fs, path, &mut out)?;
    Ok(out)
}

fn traverse_dir(fs: &dyn FileSystem, dir: &Path, out: &mut Vec<(PathBuf, FileMetadata)>) -> io::Result<()> {
    let mut names = fs.list_dir(dir)?;
    names.sort();
    for name in names {
        let child_path = dir.join(&name);
        let child_meta = fs.lstat(&child_path)?;
        let is_real_dir = child_meta.is_directory() && !child_meta.is_symlink();
        out.push((child_path.clone(), child_meta));
        if is_real_dir {
            traverse_dir(fs, &child_path, out)?;
        }
    }
    Ok(())
}

/// In-memory `FileSystem`, primarily for tests: a nested-map tree of
/// directories, files, and symlinks rooted at `/`.
pub mod memory {
    use super::{FileMetadata, FileSystem, FileType, Permissions, WriteSync};
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::io::{self, Read, Write};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    enum Node {
        Dir(BTreeMap<String, Node>),
        File(Vec<u8>),
        Symlink(String),
    }

    /// A fully in-memory file system, rooted at `/`, requiring no real
    /// disk access — useful for fast, hermetic tests of traversal,
    /// persistence, and materialization.
    pub struct MemoryFileSystem {
        root: Arc<Mutex<Node>>,
    }

    impl Default for MemoryFileSystem {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MemoryFileSystem {
        #[must_use]
        pub fn new() -> Self {
            Self { root: Arc::new(Mutex::new(Node::Dir(BTreeMap::new()))) }
        }

        fn components(path: &Path) -> Vec<String> {
            path.components()
                .filter_map(|c| match c {
                    std::path::Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect()
        }

        fn with_node<T>(&self, path: &Path, f: impl FnOnce(&Node) -> io::Result<T>) -> io::Result<T> {
            let root = self.root.lock();
            let comps = Self::components(path);
            let mut cur = &*root;
            for c in &comps {
                match cur {
                    Node::Dir(children) => {
                        cur = children.get(c).ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))?;
                    }
                    _ => return Err(io::Error::new(io::ErrorKind::Other, format!("{} is not a directory", path.display()))),
                }
            }
            f(cur)
        }

        fn with_parent_mut<T>(
            &self,
            path: &Path,
            f: impl FnOnce(&mut BTreeMap<String, Node>, &str) -> io::Result<T>,
        ) -> io::Result<T> {
            let mut root = self.root.lock();
            let mut comps = Self::components(path);
            let leaf = comps.pop().ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty path"))?;
            let mut cur = &mut *root;
            for c in &comps {
                match cur {
                    Node::Dir(children) => {
                        cur = children
                            .get_mut(c)
                            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))?;
                    }
                    _ => return Err(io::Error::new(io::ErrorKind::Other, "not a directory")),
                }
            }
            match cur {
                Node::Dir(children) => f(children, &leaf),
                _ => Err(io::Error::new(io::ErrorKind::Other, "parent is not a directory")),
            }
        }
    }

    fn placeholder_metadata(file_type: FileType, size: u64, symlink_target: Option<String>) -> FileMetadata {
        let perms = match file_type {
            FileType::Directory => {
                Permissions { user_read: true, user_write: true, user_execute: true, group_read: true, group_execute: true, other_read: true, other_execute: true, ..Default::default() }
            }
            _ => Permissions { user_read: true, user_write: true, ..Default::default() },
        };
        FileMetadata::new(file_type, perms, 0, 0, size, 0, 0, 0, symlink_target)
    }

    impl FileSystem for MemoryFileSystem {
        fn lstat(&self, path: &Path) -> io::Result<FileMetadata> {
            if path == Path::new("/") || Self::components(path).is_empty() {
                return Ok(placeholder_metadata(FileType::Directory, 0, None));
            }
            self.with_node(path, |node| {
                Ok(match node {
                    Node::Dir(_) => placeholder_metadata(FileType::Directory, 0, None),
                    Node::File(data) => placeholder_metadata(FileType::Regular, data.len() as u64, None),
                    Node::Symlink(target) => placeholder_metadata(FileType::Symlink, 0, Some(target.clone())),
                })
            })
        }

        fn list_dir(&self, path: &Path) -> io::Result<Vec<String>> {
            if path == Path::new("/") || Self::components(path).is_empty() {
                let root = self.root.lock();
                return match &*root {
                    Node::Dir(children) => Ok(children.keys().cloned().collect()),
                    _ => unreachable!("root is always a directory"),
                };
            }
            self.with_node(path, |node| match node {
                Node::Dir(children) => Ok(children.keys().cloned().collect()),
                _ => Err(io::Error::new(io::ErrorKind::Other, "not a directory")),
            })
        }

        fn is_dir(&self, path: &Path) -> bool {
            if path == Path::new("/") || Self::components(path).is_empty() {
                return true;
            }
            self.with_node(path, |node| Ok(matches!(node, Node::Dir(_)))).unwrap_or(false)
        }

        fn is_symlink(&self, path: &Path) -> bool {
            self.with_node(path, |node| Ok(matches!(node, Node::Symlink(_)))).unwrap_or(false)
        }

        fn read_link(&self, path: &Path) -> io::Result<String> {
            self.with_node(path, |node| match node {
                Node::Symlink(target) => Ok(target.clone()),
                _ => Err(io::Error::new(io::ErrorKind::Other, "not a symlink")),
            })
        }

        fn mkdir(&self, path: &Path) -> io::Result<()> {
            self.with_parent_mut(path, |children, leaf| {
                if children.contains_key(leaf) {
                    return Err(io::Error::new(io::ErrorKind::AlreadyExists, leaf.to_string()));
                }
                children.insert(leaf.to_string(), Node::Dir(BTreeMap::new()));
                Ok(())
            })
        }

        fn create_symlink(&self, target: &str, link: &Path) -> io::Result<()> {
            self.with_parent_mut(link, |children, leaf| {
                children.insert(leaf.to_string(), Node::Symlink(target.to_string()));
                Ok(())
            })
        }

        fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
            let data = self.with_node(path, |node| match node {
                Node::File(data) => Ok(data.clone()),
                _ => Err(io::Error::new(io::ErrorKind::Other, "not a regular file")),
            })?;
            Ok(Box::new(io::Cursor::new(data)))
        }

        fn create_file(&self, path: &Path) -> io::Result<Box<dyn WriteSync>> {
            self.with_parent_mut(path, |children, leaf| {
                children.insert(leaf.to_string(), Node::File(Vec::new()));
                Ok(())
            })?;
            Ok(Box::new(MemoryFileHandle { fs_root: PathBuf::from(path), root: self.root.clone() }))
        }

        fn set_metadata(&self, _path: &Path, _meta: &FileMetadata) -> io::Result<()> {
            // Metadata is synthesized on lstat(); nothing persists here.
            Ok(())
        }
    }

    /// A writable handle into a file already created by `create_file`,
    /// sharing ownership of the tree via `Arc` so it outlives the
    /// `MemoryFileSystem` reference that produced it.
    struct MemoryFileHandle {
        fs_root: PathBuf,
        root: Arc<Mutex<Node>>,
    }

    impl Write for MemoryFileHandle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut root = self.root.lock();
            let comps = MemoryFileSystem::components(&self.fs_root);
            let mut cur = &mut *root;
            for c in &comps {
                match cur {
                    Node::Dir(children) => {
                        cur = children.get_mut(c).expect("path created by create_file must still exist")
                    }
                    _ => return Err(io::Error::new(io::ErrorKind::Other, "not a directory")),
                }
            }
            match cur {
                Node::File(data) => {
                    data.extend_from_slice(buf);
                    Ok(buf.len())
                }
                _ => Err(io::Error::new(io::ErrorKind::Other, "not a regular file")),
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl WriteSync for MemoryFileHandle {
        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn mkdir_and_list() {
            let fs = MemoryFileSystem::new();
            fs.mkdir(Path::new("/a")).unwrap();
            fs.mkdir(Path::new("/a/b")).unwrap();
            assert!(fs.is_dir(Path::new("/a/b")));
            assert_eq!(fs.list_dir(Path::new("/a")).unwrap(), vec!["b".to_string()]);
        }

        #[test]
        fn write_then_read_round_trips() {
            let fs = MemoryFileSystem::new();
            {
                let mut w = fs.create_file(Path::new("/f")).unwrap();
                w.write_all(b"hello ").unwrap();
                w.write_all(b"world").unwrap();
            }
            let mut r = fs.open_read(Path::new("/f")).unwrap();
            let mut buf = Vec::new();
            r.read_to_end(&mut buf).unwrap();
            assert_eq!(buf, b"hello world");
        }

        #[test]
        fn symlink_read_link_round_trips() {
            let fs = MemoryFileSystem::new();
            fs.create_symlink("target", Path::new("/link")).unwrap();
            assert!(fs.is_symlink(Path::new("/link")));
            assert_eq!(fs.read_link(Path::new("/link")).unwrap(), "target");
        }
    }
}

pub use memory::MemoryFileSystem;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::memory::MemoryFileSystem;
    use std::io::Write as _;

    #[test]
    fn traverse_orders_depth_first_sorted() {
        let fs = MemoryFileSystem::new();
        fs.mkdir(Path::new("/testdir")).unwrap();
        fs.create_file(Path::new("/testdir/testfile")).unwrap();
        {
            let mut w = fs.create_file(Path::new("/testdir/testfile2")).unwrap();
            w.write_all(b"this is the body of testfile2").unwrap();
        }
        fs.create_symlink("testfile2", Path::new("/testdir/testfile2-symlink")).unwrap();
        {
            let mut w = fs.create_file(Path::new("/testdir/testfile3")).unwrap();
            w.write_all(b"testfile3 body").unwrap();
        }

        let entries = traverse(&fs, Path::new("/testdir")).unwrap();
        let names: Vec<String> = entries.iter().map(|(p, _)| p.to_string_lossy().into_owned()).collect();
        assert_eq!(
            names,
            vec![
                "/testdir".to_string(),
                "/testdir/testfile".to_string(),
                "/testdir/testfile2".to_string(),
                "/testdir/testfile2-symlink".to_string(),
                "/testdir/testfile3".to_string(),
            ]
        );
    }

    #[test]
    fn traverse_rejects_non_directory_root() {
        let fs = MemoryFileSystem::new();
        fs.create_file(Path::new("/f")).unwrap();
        assert!(traverse(&fs, Path::new("/f")).is_err());
    }

    #[test]
    fn traverse_empty_directory_yields_only_root() {
        let fs = MemoryFileSystem::new();
        fs.mkdir(Path::new("/empty")).unwrap();
        let entries = traverse(&fs, Path::new("/empty")).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, Path::new("/empty"));
    }
}
