#![no_main]

use libfuzzer_sys::fuzz_target;

use fatturapa::core::PipelineConfig;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as envelope input — errors are fine, panics are
    // bugs. The bogus binary path keeps the fuzzer off the process
    // spawn path.
    let config = PipelineConfig {
        openssl_path: "/nonexistent/openssl".into(),
        ..PipelineConfig::default()
    };
    let _ = fatturapa::envelope::extract(data, &config);
});
