use thiserror::Error;

/// Errors that abort processing of a single input file.
///
/// None of these ever crosses a file boundary: batch processing catches
/// them per file and reports the file as `Outcome::Error`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IngestError {
    /// No extraction strategy located a decodable XML payload.
    #[error(
        "no XML payload extracted ({size} bytes, head: {head:?}): {}",
        attempts.join("; ")
    )]
    Extraction {
        /// First bytes of the input, lossily decoded for diagnostics.
        head: String,
        /// Total input size in bytes.
        size: usize,
        /// Per-strategy failure detail, in attempt order.
        attempts: Vec<String>,
    },

    /// No attempted text encoding produced well-formed XML.
    #[error("undecodable text ({attempted:?} all failed)")]
    Encoding {
        /// Encoding attempts, in order, with their failure reasons.
        attempted: Vec<String>,
    },

    /// Well-decoded text is structurally invalid even under the lenient tier.
    #[error("unparseable document: {0}")]
    Parse(String),

    /// Structurally valid, but a required field has no defined fallback.
    #[error("mapping failed: {0}")]
    Mapping(String),

    /// Reading the input file itself failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// The pipeline stage this error belongs to.
    pub fn stage(&self) -> crate::core::Stage {
        use crate::core::Stage;
        match self {
            Self::Extraction { .. } => Stage::Extraction,
            Self::Encoding { .. } => Stage::Encoding,
            Self::Parse(_) => Stage::Parsing,
            Self::Mapping(_) => Stage::Mapping,
            Self::Io(_) => Stage::Extraction,
        }
    }
}

/// A recoverable deviation from the FatturaPA technical rules.
///
/// Warnings accumulate on the produced record and never abort
/// processing; a document carrying any becomes `ImportedWithWarning`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConformanceWarning {
    /// Dot-separated path to the offending field (e.g. "supplier.name").
    pub field: String,
    /// Human-readable description of the deviation.
    pub message: String,
}

impl ConformanceWarning {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConformanceWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
