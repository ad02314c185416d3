//! File metadata: type flags, permission bits, ownership, and timestamps,
//! plus the `ls -l`-style mode-string codec used by the manifest format.

/// One of the mutually-exclusive file types a `FileMetadata` can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    BlockDevice,
    CharacterDevice,
    Fifo,
}

/// Read-only permission bit-set: the nine `rwx` triplets plus setuid,
/// setgid and sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions {
    pub user_read: bool,
    pub user_write: bool,
    pub user_execute: bool,
    pub group_read: bool,
    pub group_write: bool,
    pub group_execute: bool,
    pub other_read: bool,
    pub other_write: bool,
    pub other_execute: bool,
    pub setuid: bool,
    pub setgid: bool,
    pub sticky: bool,
}

/// Construct-once, read-only file metadata record. Every field is set
/// before the record is exposed; there are no public setters, so mutation
/// requires building a new instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    file_type: FileType,
    perms: Permissions,
    uid: u32,
    gid: u32,
    size: u64,
    atime: i64,
    mtime: i64,
    ctime: i64,
    symlink_target: Option<String>,
}

impl FileMetadata {
    /// Construct a complete metadata record. `symlink_target` must be
    /// `Some` iff `file_type` is `FileType::Symlink`.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        file_type: FileType,
        perms: Permissions,
        uid: u32,
        gid: u32,
        size: u64,
        atime: i64,
        mtime: i64,
        ctime: i64,
        symlink_target: Option<String>,
    ) -> Self {
        debug_assert_eq!(
            matches!(file_type, FileType::Symlink),
            symlink_target.is_some(),
            "symlink_target must be set iff file_type is Symlink"
        );
        Self { file_type, perms, uid, gid, size, atime, mtime, ctime, symlink_target }
    }

    #[must_use]
    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }

    #[must_use]
    pub fn is_regular(&self) -> bool {
        self.file_type == FileType::Regular
    }

    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.file_type == FileType::Symlink
    }

    #[must_use]
    pub fn permissions(&self) -> Permissions {
        self.perms
    }

    #[must_use]
    pub fn uid(&self) -> u32 {
        self.uid
    }

    #[must_use]
    pub fn gid(&self) -> u32 {
        self.gid
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn atime(&self) -> i64 {
        self.atime
    }

    #[must_use]
    pub fn mtime(&self) -> i64 {
        self.mtime
    }

    #[must_use]
    pub fn ctime(&self) -> i64 {
        self.ctime
    }

    #[must_use]
    pub fn symlink_target(&self) -> Option<&str> {
        self.symlink_target.as_deref()
    }

    /// `MODESTR uid gid size atime mtime ctime`, the text line segment
    /// used by the manifest codec (everything before the first ` | `).
    #[must_use]
    pub fn to_field_string(&self) -> String {
        format!(
            "{} {} {} {} {} {} {}",
            mode_to_str(self.file_type, self.perms),
            self.uid,
            self.gid,
            self.size,
            self.atime,
            self.mtime,
            self.ctime
        )
    }

    /// Parse the `MODESTR uid gid size atime mtime ctime` segment.
    /// `symlink_target` must be supplied by the caller separately (the
    /// manifest line format does not embed it verbatim; see
    /// [`crate::manifest`] for how it is recovered).
    ///
    /// # Errors
    /// Returns a descriptive error string if the field count or mode
    /// string is malformed.
    pub fn from_field_string(
        s: &str,
        symlink_target: Option<String>,
    ) -> Result<Self, String> {
        let comps: Vec<&str> = s.split_whitespace().collect();
        if comps.len() != 7 {
            return Err(format!("expected 7 whitespace-separated fields, got {}", comps.len()));
        }
        let (file_type, perms) = str_to_mode(comps[0])?;
        let uid = comps[1].parse().map_err(|_| "invalid uid".to_string())?;
        let gid = comps[2].parse().map_err(|_| "invalid gid".to_string())?;
        let size = comps[3].parse().map_err(|_| "invalid size".to_string())?;
        let atime = comps[4].parse().map_err(|_| "invalid atime".to_string())?;
        let mtime = comps[5].parse().map_err(|_| "invalid mtime".to_string())?;
        let ctime = comps[6].parse().map_err(|_| "invalid ctime".to_string())?;
        if file_type == FileType::Symlink && symlink_target.is_none() {
            return Err("symlink entry missing link target".to_string());
        }
        Ok(Self::new(file_type, perms, uid, gid, size, atime, mtime, ctime, symlink_target))
    }
}

/// Encode type + permission bits as a 10-character `ls -l`-style string:
/// `[-bcdlp][r-][w-][x-sS][r-][w-][x-sS][r-][w-][x-tT]`.
#[must_use]
pub fn mode_to_str(file_type: FileType, p: Permissions) -> String {
    let mut s = String::with_capacity(10);
    s.push(match file_type {
        FileType::Regular => '-',
        FileType::BlockDevice => 'b',
        FileType::CharacterDevice => 'c',
        FileType::Directory => 'd',
        FileType::Symlink => 'l',
        FileType::Fifo => 'p',
    });
    s.push(if p.user_read { 'r' } else { '-' });
    s.push(if p.user_write { 'w' } else { '-' });
    s.push(match (p.user_execute, p.setuid) {
        (true, true) => 's',
        (true, false) => 'x',
        (false, true) => 'S',
        (false, false) => '-',
    });
    s.push(if p.group_read { 'r' } else { '-' });
    s.push(if p.group_write { 'w' } else { '-' });
    s.push(match (p.group_execute, p.setgid) {
        (true, true) => 's',
        (true, false) => 'x',
        (false, true) => 'S',
        (false, false) => '-',
    });
    s.push(if p.other_read { 'r' } else { '-' });
    s.push(if p.other_write { 'w' } else { '-' });
    s.push(match (p.other_execute, p.sticky) {
        (true, true) => 't',
        (true, false) => 'x',
        (false, true) => 'T',
        (false, false) => '-',
    });
    s
}

/// Inverse of [`mode_to_str`].
///
/// # Errors
/// Returns a descriptive error if the string is not exactly 10 characters
/// or contains a character outside the expected position-specific set.
pub fn str_to_mode(s: &str) -> Result<(FileType, Permissions), String> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() != 10 {
        return Err(format!("mode string must be exactly 10 chars, got {}: {s:?}", chars.len()));
    }
    let file_type = match chars[0] {
        '-' => FileType::Regular,
        'b' => FileType::BlockDevice,
        'c' => FileType::CharacterDevice,
        'd' => FileType::Directory,
        'l' => FileType::Symlink,
        'p' => FileType::Fifo,
        c => return Err(format!("invalid type char {c:?}")),
    };

    let user_read = parse_flag(chars[1], 'r', '-')?;
    let user_write = parse_flag(chars[2], 'w', '-')?;
    let (user_execute, setuid) = parse_exec(chars[3], 's', 'S')?;
    let group_read = parse_flag(chars[4], 'r', '-')?;
    let group_write = parse_flag(chars[5], 'w', '-')?;
    let (group_execute, setgid) = parse_exec(chars[6], 's', 'S')?;
    let other_read = parse_flag(chars[7], 'r', '-')?;
    let other_write = parse_flag(chars[8], 'w', '-')?;
    let (other_execute, sticky) = parse_exec(chars[9], 't', 'T')?;

    Ok((
        file_type,
        Permissions {
            user_read,
            user_write,
            user_execute,
            group_read,
            group_write,
            group_execute,
            other_read,
            other_write,
            other_execute,
            setuid,
            setgid,
            sticky,
        },
    ))
}

fn parse_flag(c: char, set: char, unset: char) -> Result<bool, String> {
    if c == set {
        Ok(true)
    } else if c == unset {
        Ok(false)
    } else {
        Err(format!("expected {set:?} or {unset:?}, got {c:?}"))
    }
}

/// Parses one of `x`, `-`, the "both set" char, or the "bit set, exec
/// unset" char, returning `(execute, special_bit)`.
fn parse_exec(c: char, both: char, special_only: char) -> Result<(bool, bool), String> {
    match c {
        'x' => Ok((true, false)),
        '-' => Ok((false, false)),
        c2 if c2 == both => Ok((true, true)),
        c2 if c2 == special_only => Ok((false, true)),
        c => Err(format!("invalid exec/special char {c:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_perm_combinations() -> Vec<Permissions> {
        let mut out = Vec::new();
        for bits in 0u32..(1 << 12) {
            out.push(Permissions {
                user_read: bits & 1 != 0,
                user_write: bits & 2 != 0,
                user_execute: bits & 4 != 0,
                group_read: bits & 8 != 0,
                group_write: bits & 16 != 0,
                group_execute: bits & 32 != 0,
                other_read: bits & 64 != 0,
                other_write: bits & 128 != 0,
                other_execute: bits & 256 != 0,
                setuid: bits & 512 != 0,
                setgid: bits & 1024 != 0,
                sticky: bits & 2048 != 0,
            });
        }
        out
    }

    #[test]
    fn mode_bijection_forward_then_back() {
        for file_type in
            [FileType::Regular, FileType::Directory, FileType::Symlink, FileType::Fifo, FileType::BlockDevice, FileType::CharacterDevice]
        {
            for p in all_perm_combinations() {
                let s = mode_to_str(file_type, p);
                let (ft2, p2) = str_to_mode(&s).unwrap();
                assert_eq!(ft2, file_type);
                assert_eq!(p2, p);
            }
        }
    }

    #[test]
    fn mode_bijection_back_then_forward() {
        // every syntactically valid 10-char string round-trips to itself
        for t in ['-', 'b', 'c', 'd', 'l', 'p'] {
            for e1 in ['x', 's', 'S', '-'] {
                for e2 in ['x', 's', 'S', '-'] {
                    for e3 in ['x', 't', 'T', '-'] {
                        let candidate = format!("{t}rw{e1}rw{e2}rw{e3}");
                        let (ft, p) = str_to_mode(&candidate).unwrap();
                        let back = mode_to_str(ft, p);
                        assert_eq!(back, candidate);
                    }
                }
            }
        }
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(str_to_mode("short").is_err());
    }

    #[test]
    fn field_string_round_trip() {
        let meta = FileMetadata::new(
            FileType::Regular,
            Permissions { user_read: true, user_write: true, ..Default::default() },
            1000,
            1000,
            29,
            111,
            222,
            333,
            None,
        );
        let s = meta.to_field_string();
        let parsed = FileMetadata::from_field_string(&s, None).unwrap();
        assert_eq!(parsed, meta);
    }
}
