//! Root-element classification and per-document outcome derivation.
//!
//! SDI delivery folders mix invoices with metadata and notification
//! sidecar files that carry no economic content. Classification keys on
//! the root element's local name, lowercased, so it is stable across
//! namespace prefixes and case variants seen in the wild.

use crate::core::{DocumentBody, Outcome};

/// Roots of SDI per-file metadata sidecars.
const METADATA_ROOTS: &[&str] = &["metadatifattura", "metadatinotifica", "metadato", "metadati"];

/// Roots of SDI delivery/outcome notifications.
const NOTIFICATION_ROOTS: &[&str] = &[
    "ricevutaconsegna",
    "notificadecorrenzatermini",
    "notificaesitocommittente",
    "notificamancataconsegna",
    "notificascarto",
    "attestazionetrasmissionefattura",
];

/// Roots that carry invoice content and must be parsed.
const INVOICE_ROOTS: &[&str] = &[
    "fatturaelettronica",
    "fatturaelettronicabody",
    "fatturaelettronicasemplificata",
];

/// Document classes a root element can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    /// An invoice file; proceeds through parsing and mapping.
    Invoice,
    /// An SDI metadata or notification sidecar; skipped without error.
    Sidecar,
    /// Neither recognized class; treated as an invoice attempt so that
    /// the failure surfaces as an error rather than a silent skip.
    Unknown,
}

/// Classify a document by the local name of its first start tag.
pub fn classify_root(text: &str) -> FileClass {
    match root_local_name(text) {
        Some(root) => {
            let root = root.to_ascii_lowercase();
            if INVOICE_ROOTS.contains(&root.as_str()) || root.starts_with("fatturaelettronica") {
                FileClass::Invoice
            } else if METADATA_ROOTS.contains(&root.as_str())
                || NOTIFICATION_ROOTS.contains(&root.as_str())
                || root.starts_with("notificafile")
            {
                FileClass::Sidecar
            } else {
                FileClass::Unknown
            }
        }
        None => FileClass::Unknown,
    }
}

/// Local name of the first element start tag, prolog and comments
/// skipped, namespace prefix stripped.
pub fn root_local_name(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut pos = 0;
    while let Some(off) = text[pos..].find('<') {
        let start = pos + off;
        match bytes.get(start + 1) {
            Some(b'?') => {
                pos = start + text[start..].find('>').map_or(text.len() - start, |e| e + 1);
            }
            Some(b'!') => {
                pos = start + text[start..].find('>').map_or(text.len() - start, |e| e + 1);
            }
            Some(_) => {
                let rest = &text[start + 1..];
                let end = rest
                    .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
                    .unwrap_or(rest.len());
                let qname = &rest[..end];
                let local = qname.rsplit(':').next().unwrap_or(qname);
                return (!local.is_empty()).then_some(local);
            }
            None => return None,
        }
    }
    None
}

/// Derive the per-document outcome from its accumulated warnings.
pub fn outcome_for(document: &DocumentBody) -> Outcome {
    if document.warnings.is_empty() {
        Outcome::Imported
    } else {
        Outcome::ImportedWithWarning
    }
}
