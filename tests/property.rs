use cairn::metadata::{mode_to_str, str_to_mode, FileType, Permissions};
use cairn::pathcodec::{spdecode, spencode};
use proptest::prelude::*;

fn file_type_for(tag: u8) -> FileType {
    match tag % 6 {
        0 => FileType::Regular,
        1 => FileType::Directory,
        2 => FileType::Symlink,
        3 => FileType::BlockDevice,
        4 => FileType::CharacterDevice,
        _ => FileType::Fifo,
    }
}

proptest! {
    #[test]
    fn prop_path_codec_round_trips_any_string(s in ".*") {
        let encoded = spencode(&s);
        let decoded = spdecode(&encoded).unwrap();
        prop_assert_eq!(decoded, s);
    }

    #[test]
    fn prop_path_codec_never_emits_a_bare_pipe(s in ".*") {
        let encoded = spencode(&s);
        prop_assert!(!encoded.contains('|'));
    }

    #[test]
    fn prop_mode_str_round_trips_any_permission_bits(bits in 0u16..4096, type_tag in 0u8..6) {
        let perms = Permissions {
            user_read: bits & 0o400 != 0,
            user_write: bits & 0o200 != 0,
            user_execute: bits & 0o100 != 0,
            group_read: bits & 0o040 != 0,
            group_write: bits & 0o020 != 0,
            group_execute: bits & 0o010 != 0,
            other_read: bits & 0o004 != 0,
            other_write: bits & 0o002 != 0,
            other_execute: bits & 0o001 != 0,
            setuid: bits & 0o4000 != 0,
            setgid: bits & 0o2000 != 0,
            sticky: bits & 0o1000 != 0,
        };
        let file_type = file_type_for(type_tag);
        let s = mode_to_str(file_type, perms);
        prop_assert_eq!(s.len(), 10);
        let (parsed_type, parsed_perms) = str_to_mode(&s).unwrap();
        prop_assert_eq!(parsed_type, file_type);
        prop_assert_eq!(parsed_perms, perms);
    }
}
