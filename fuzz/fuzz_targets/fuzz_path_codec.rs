#![no_main]
use cairn::pathcodec::{spdecode, spencode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|s: String| {
    let encoded = spencode(&s);
    match spdecode(&encoded) {
        Ok(decoded) => assert_eq!(decoded, s),
        Err(e) => panic!("round trip of {s:?} failed to decode its own encoding {encoded:?}: {e}"),
    }
});
