#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 65536 {
        return;
    }
    // Any byte string must either parse or return a ManifestParse error;
    // it must never panic.
    let _ = cairn::manifest::read_manifest(data);
});
