#![no_main]

use libfuzzer_sys::fuzz_target;

use fatturapa::core::PipelineConfig;

fuzz_target!(|data: &[u8]| {
    let config = PipelineConfig {
        openssl_path: "/nonexistent/openssl".into(),
        ..PipelineConfig::default()
    };
    // Every input must yield a report: imported, skipped, or an error
    // entry with diagnostics — never a panic, never an empty report.
    let report = fatturapa::pipeline::ingest_bytes("fuzz.bin", data, &config);
    assert!(!report.entries.is_empty());
});
