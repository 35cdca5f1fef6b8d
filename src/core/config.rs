use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Pipeline configuration.
///
/// The defaults are suitable for unattended batch imports; every knob
/// exists because the underlying behavior is not fully pinned down by
/// the FatturaPA technical rules (rounding tolerance) or depends on the
/// host (openssl location, dump directory).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Tolerance for reconciling the declared document total against
    /// the recomputed one. Mismatches beyond this produce a
    /// [`ConformanceWarning`](crate::core::ConformanceWarning), never a
    /// rejection.
    pub rounding_epsilon: Decimal,

    /// Hard timeout for the external signature-verification process.
    /// On expiry the process is killed and extraction falls through to
    /// the pure decoder.
    #[serde(with = "duration_secs")]
    pub verify_timeout: Duration,

    /// Binary used for best-effort CAdES verification of `.p7m`
    /// envelopes. Verification is not required — payload extraction is —
    /// so a missing binary is not an error.
    pub openssl_path: PathBuf,

    /// Where to dump undecodable buffers for manual inspection.
    /// `None` disables dumping.
    pub dump_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rounding_epsilon: Decimal::new(1, 2), // 0.01
            verify_timeout: Duration::from_secs(10),
            openssl_path: PathBuf::from("openssl"),
            dump_dir: None,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
