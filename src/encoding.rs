//! Text encoding resolution via an ordered fallback chain.
//!
//! SDI relay output regularly declares UTF-8 while carrying
//! Windows-1252 byte sequences. The chain tries a strict UTF-8 decode
//! first, then Windows-1252, then Latin-1, re-validating XML
//! well-formedness after each attempt. Characters are never silently
//! substituted; when every attempt fails the caller dumps the buffer
//! for manual inspection and the file errors out.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::core::{DocumentEncoding, IngestError, SanitizedDocument};

/// Decoded text plus the encoding that produced it.
#[derive(Debug, Clone)]
pub struct DecodedDocument {
    pub text: String,
    pub encoding: DocumentEncoding,
}

impl DecodedDocument {
    /// True when a non-UTF-8 fallback was used — surfaces as a
    /// conformance warning on the produced document.
    pub fn used_fallback(&self) -> bool {
        self.encoding != DocumentEncoding::Utf8
    }
}

/// Resolve the text encoding of a sanitized buffer.
pub fn resolve(doc: &SanitizedDocument) -> Result<DecodedDocument, IngestError> {
    let mut attempted: Vec<String> = Vec::new();

    // Strict UTF-8 first. Structural problems in otherwise valid UTF-8
    // are the parser tiers' business, not an encoding failure.
    match std::str::from_utf8(&doc.bytes) {
        Ok(text) => {
            return Ok(DecodedDocument {
                text: text.to_string(),
                encoding: DocumentEncoding::Utf8,
            });
        }
        Err(e) => attempted.push(format!("UTF-8: {e}")),
    }

    if let Some(declared) = declared_encoding(&doc.bytes) {
        if !declared.eq_ignore_ascii_case("utf-8") {
            tracing::warn!(declared, "prolog declares non-UTF-8 encoding, running fallback chain");
        }
    }

    // Well-formedness gate first, relaxed (mismatched end tags allowed)
    // second — the recovery parse tier covers the rest.
    for strict_names in [true, false] {
        for (name, decoded) in [
            ("windows-1252", decode_windows_1252(&doc.bytes)),
            ("ISO-8859-1", Some(decode_latin1(&doc.bytes))),
        ] {
            let Some(text) = decoded else {
                attempted.push(format!("{name}: undefined byte position"));
                continue;
            };
            match well_formed(&text, strict_names) {
                Ok(()) => {
                    let encoding = if name == "windows-1252" {
                        DocumentEncoding::Windows1252
                    } else {
                        DocumentEncoding::Latin1
                    };
                    tracing::warn!(encoding = name, "encoding fallback applied");
                    return Ok(DecodedDocument {
                        text,
                        encoding,
                    });
                }
                Err(e) => attempted.push(format!(
                    "{name}{}: {e}",
                    if strict_names { "" } else { " (relaxed)" }
                )),
            }
        }
    }

    Err(IngestError::Encoding { attempted })
}

/// `encoding` pseudo-attribute of the XML prolog, if declared.
pub fn declared_encoding(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(256)];
    let text = String::from_utf8_lossy(head);
    let prolog_end = text.find("?>")?;
    let prolog = &text[..prolog_end];
    let idx = prolog.find("encoding")?;
    let rest = &prolog[idx + "encoding".len()..];
    let quote_start = rest.find(['"', '\''])?;
    let quote = rest.as_bytes()[quote_start] as char;
    let value = &rest[quote_start + 1..];
    let end = value.find(quote)?;
    Some(value[..end].to_string())
}

/// Scan the text with quick-xml and report the first structural error.
fn well_formed(text: &str, check_end_names: bool) -> Result<(), String> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().check_end_names = check_end_names;
    loop {
        match reader.read_event() {
            Ok(Event::Eof) => return Ok(()),
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
    }
}

/// Windows-1252 high-half mapping for 0x80..=0x9F. `None` marks the
/// five positions the code page leaves undefined; hitting one fails the
/// strict decode.
const CP1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'), // 0x80 €
    None,             // 0x81
    Some('\u{201A}'), // 0x82 ‚
    Some('\u{0192}'), // 0x83 ƒ
    Some('\u{201E}'), // 0x84 „
    Some('\u{2026}'), // 0x85 …
    Some('\u{2020}'), // 0x86 †
    Some('\u{2021}'), // 0x87 ‡
    Some('\u{02C6}'), // 0x88 ˆ
    Some('\u{2030}'), // 0x89 ‰
    Some('\u{0160}'), // 0x8A Š
    Some('\u{2039}'), // 0x8B ‹
    Some('\u{0152}'), // 0x8C Œ
    None,             // 0x8D
    Some('\u{017D}'), // 0x8E Ž
    None,             // 0x8F
    None,             // 0x90
    Some('\u{2018}'), // 0x91 '
    Some('\u{2019}'), // 0x92 '
    Some('\u{201C}'), // 0x93 "
    Some('\u{201D}'), // 0x94 "
    Some('\u{2022}'), // 0x95 •
    Some('\u{2013}'), // 0x96 –
    Some('\u{2014}'), // 0x97 —
    Some('\u{02DC}'), // 0x98 ˜
    Some('\u{2122}'), // 0x99 ™
    Some('\u{0161}'), // 0x9A š
    Some('\u{203A}'), // 0x9B ›
    Some('\u{0153}'), // 0x9C œ
    None,             // 0x9D
    Some('\u{017E}'), // 0x9E ž
    Some('\u{0178}'), // 0x9F Ÿ
];

fn decode_windows_1252(bytes: &[u8]) -> Option<String> {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        let c = match b {
            0x00..=0x7F => b as char,
            0x80..=0x9F => CP1252_HIGH[(b - 0x80) as usize]?,
            _ => b as char, // 0xA0..=0xFF matches Latin-1
        };
        out.push(c);
    }
    Some(out)
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::sanitize;

    #[test]
    fn clean_utf8_passes_through() {
        let doc = sanitize("<a>perché</a>".as_bytes());
        let decoded = resolve(&doc).unwrap();
        assert_eq!(decoded.encoding, DocumentEncoding::Utf8);
        assert!(!decoded.used_fallback());
        assert!(decoded.text.contains("perché"));
    }

    #[test]
    fn cp1252_euro_sign_falls_back() {
        // 0x80 is € in cp1252 and invalid as a UTF-8 start byte.
        let doc = sanitize(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?><a>10 \x80</a>");
        let decoded = resolve(&doc).unwrap();
        assert_eq!(decoded.encoding, DocumentEncoding::Windows1252);
        assert!(decoded.text.contains('\u{20AC}'));
    }

    #[test]
    fn latin1_accented_byte_falls_back() {
        // 0xE8 (è in Latin-1/cp1252) is invalid standalone UTF-8.
        let doc = sanitize(b"<a>perch\xe8</a>");
        let decoded = resolve(&doc).unwrap();
        assert!(decoded.used_fallback());
        assert!(decoded.text.contains('è'));
    }

    #[test]
    fn declared_encoding_extraction() {
        assert_eq!(
            declared_encoding(b"<?xml version=\"1.0\" encoding=\"windows-1252\"?><a/>").as_deref(),
            Some("windows-1252")
        );
        assert_eq!(declared_encoding(b"<a/>"), None);
    }
}
