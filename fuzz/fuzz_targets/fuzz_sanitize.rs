#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Sanitization is total and idempotent — a second pass must be a
    // no-op and must record no repairs.
    let once = fatturapa::sanitize::sanitize(data);
    let twice = fatturapa::sanitize::sanitize(&once.bytes);
    assert_eq!(once.bytes, twice.bytes);
    assert!(twice.repairs.is_empty());
});
