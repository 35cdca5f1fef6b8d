//! Envelope detection and XML payload extraction.
//!
//! Raw SDI input arrives as plain XML, as a binary CAdES-BES (PKCS#7)
//! envelope, or as that envelope re-wrapped in base64. The strategies
//! run in a fixed order and the first success short-circuits the rest;
//! when every strategy fails the error carries per-strategy detail.

mod detect;
mod p7m;

pub use detect::{detect, extract, scan_xml_slice};
pub use p7m::{VerifyOutput, verify_via_process};

use crate::core::{EnvelopeKind, ExtractionMethod};

/// Result of a successful extraction.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// The extracted XML payload.
    pub xml: Vec<u8>,
    /// How the input was classified.
    pub kind: EnvelopeKind,
    /// Which strategy produced the payload.
    pub method: ExtractionMethod,
    /// True when the payload needed a synthetic root closure — the
    /// document must be flagged non-conformant downstream.
    pub forced_close: bool,
}
