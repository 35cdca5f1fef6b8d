use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use super::{Extraction, p7m};
use crate::core::{EnvelopeKind, ExtractionMethod, IngestError, PipelineConfig, RawEnvelope};

/// Root element marker present in every FatturaPA payload, with or
/// without a namespace prefix.
const ROOT_MARKER: &[u8] = b"FatturaElettronica";

/// Classify raw bytes without extracting anything.
pub fn detect(bytes: &[u8]) -> RawEnvelope {
    let kind = if bytes.first() == Some(&0x30) && !starts_like_xml(bytes) {
        EnvelopeKind::P7mDer
    } else if decode_whole_base64(bytes)
        .map(|blob| contains(&blob, ROOT_MARKER))
        .unwrap_or(false)
    {
        EnvelopeKind::P7mBase64
    } else {
        EnvelopeKind::Plain
    };
    RawEnvelope {
        bytes: bytes.to_vec(),
        kind,
    }
}

/// Run the ordered extraction strategy chain over raw input bytes.
///
/// Strategies: (a) whole-buffer base64 decode containing the root
/// marker; (b) DER envelope unwrapping — external verification process
/// first, pure byte scan as fallback; (c) direct scan of the raw bytes.
/// The first success wins; exhausting all of them raises
/// [`IngestError::Extraction`] with per-strategy detail.
pub fn extract(bytes: &[u8], config: &PipelineConfig) -> Result<Extraction, IngestError> {
    let mut attempts: Vec<String> = Vec::new();

    // (a) base64-wrapped envelope
    match decode_whole_base64(bytes) {
        Some(blob) if contains(&blob, ROOT_MARKER) => {
            let inner = if blob.first() == Some(&0x30) && !starts_like_xml(&blob) {
                extract_from_der(&blob, config, &mut attempts)
            } else {
                scan_xml_slice(&blob).map(|(xml, forced)| (xml, ExtractionMethod::Base64Decode, forced))
            };
            match inner {
                Ok((xml, method, forced_close)) => {
                    return Ok(Extraction {
                        xml,
                        kind: EnvelopeKind::P7mBase64,
                        method,
                        forced_close,
                    });
                }
                Err(e) => attempts.push(format!("base64: decoded but inner extraction failed: {e}")),
            }
        }
        Some(_) => attempts.push("base64: decoded blob has no root marker".into()),
        None => attempts.push("base64: not a base64 buffer".into()),
    }

    // (b) binary DER envelope
    if bytes.first() == Some(&0x30) && !starts_like_xml(bytes) {
        match extract_from_der(bytes, config, &mut attempts) {
            Ok((xml, method, forced_close)) => {
                return Ok(Extraction {
                    xml,
                    kind: EnvelopeKind::P7mDer,
                    method,
                    forced_close,
                });
            }
            Err(e) => attempts.push(format!("der: {e}")),
        }
    } else {
        attempts.push("der: no PKCS#7 leading byte".into());
    }

    // (c) direct scan of raw bytes
    match scan_xml_slice(bytes) {
        Ok((xml, forced_close)) => {
            return Ok(Extraction {
                xml,
                kind: EnvelopeKind::Plain,
                method: ExtractionMethod::DirectScan,
                forced_close,
            });
        }
        Err(e) => attempts.push(format!("scan: {e}")),
    }

    Err(IngestError::Extraction {
        head: String::from_utf8_lossy(&bytes[..bytes.len().min(32)]).into_owned(),
        size: bytes.len(),
        attempts,
    })
}

/// DER envelope: delegated verification process first, byte scan second.
fn extract_from_der(
    der: &[u8],
    config: &PipelineConfig,
    attempts: &mut Vec<String>,
) -> Result<(Vec<u8>, ExtractionMethod, bool), String> {
    match p7m::verify_via_process(der, config) {
        Ok(out) => {
            if !out.exit_ok {
                tracing::warn!(
                    stderr = %out.stderr.trim(),
                    "signature verification failed, payload accepted anyway"
                );
            }
            match scan_xml_slice(&out.payload) {
                Ok((xml, forced)) => return Ok((xml, ExtractionMethod::SignatureProcess, forced)),
                Err(e) => attempts.push(format!("openssl: payload had no usable XML: {e}")),
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "verification process unavailable, falling back to byte scan");
            attempts.push(format!("openssl: {e}"));
        }
    }

    scan_xml_slice(der).map(|(xml, forced)| (xml, ExtractionMethod::DerScan, forced))
}

/// Scan bytes for an XML document and slice it out.
///
/// Candidate starts are every `<?xml` prolog and every element start
/// tag; the first candidate that closes validly wins. Which roots are
/// worth keeping is a semantic call made later by classification, so
/// SDI sidecars without a prolog still come out of here. A candidate
/// that never closes is truncated: the slice runs to the end of the
/// buffer and a synthetic root closure is reported (`forced == true`).
pub fn scan_xml_slice(bytes: &[u8]) -> Result<(Vec<u8>, bool), String> {
    let candidates = candidate_starts(bytes);
    if candidates.is_empty() {
        return Err("no XML prolog or root marker found".to_string());
    }

    for &start in &candidates {
        if let Some(end) = closing_offset(bytes, start) {
            return Ok((bytes[start..end].to_vec(), false));
        }
    }

    // Truncated buffer: take the first candidate and close it by hand.
    let start = candidates[0];
    let root = root_qname(&bytes[start..]).ok_or("candidate start has no element name")?;
    let mut xml = bytes[start..].to_vec();
    if tag_left_open(&xml) {
        xml.push(b'>');
    }
    xml.extend_from_slice(b"</");
    xml.extend_from_slice(&root);
    xml.push(b'>');
    Ok((xml, true))
}

/// Offsets of every plausible document start, in order.
fn candidate_starts(bytes: &[u8]) -> Vec<usize> {
    let mut out = Vec::new();
    for i in 0..bytes.len() {
        if bytes[i] != b'<' {
            continue;
        }
        let prolog = bytes[i..].starts_with(b"<?xml");
        let element = matches!(bytes.get(i + 1), Some(&c) if c.is_ascii_alphabetic() || c == b'_');
        if prolog || element {
            out.push(i);
        }
    }
    out
}

/// End offset (exclusive) of the document starting at `start`, if its
/// root element closes anywhere after it.
fn closing_offset(bytes: &[u8], start: usize) -> Option<usize> {
    let root = root_qname(&bytes[start..])?;
    let close: Vec<u8> = [b"</", root.as_slice(), b">"].concat();
    let rel = find(&bytes[start..], &close)?;
    Some(start + rel + close.len())
}

/// Qualified name of the first start tag at or after the slice start.
fn root_qname(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'<' {
            match bytes.get(i + 1) {
                Some(&b'?') | Some(&b'!') => {
                    while i < bytes.len() && bytes[i] != b'>' {
                        i += 1;
                    }
                }
                Some(&c) if c.is_ascii_alphabetic() || c == b'_' => {
                    let name_start = i + 1;
                    let mut end = name_start;
                    while end < bytes.len() && is_name_byte(bytes[end]) {
                        end += 1;
                    }
                    return Some(bytes[name_start..end].to_vec());
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b':' | b'_' | b'-' | b'.')
}

fn tag_left_open(bytes: &[u8]) -> bool {
    for &b in bytes.iter().rev() {
        match b {
            b'>' => return false,
            b'<' => return true,
            _ => {}
        }
    }
    false
}

fn starts_like_xml(bytes: &[u8]) -> bool {
    let trimmed = skip_bom_and_ws(bytes);
    trimmed.starts_with(b"<")
}

fn skip_bom_and_ws(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
    let first = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[first..]
}

/// Decode the whole buffer as base64, tolerating line wrapping.
fn decode_whole_base64(bytes: &[u8]) -> Option<Vec<u8>> {
    let compact: Vec<u8> = bytes
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if compact.len() < 4 {
        return None;
    }
    BASE64.decode(&compact).ok()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find(haystack, needle).is_some()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
