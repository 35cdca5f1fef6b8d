#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // All three tiers must be panic-free on arbitrary text.
        let _ = fatturapa::parser::parse(s);
    }
});
