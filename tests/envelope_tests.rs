use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use fatturapa::core::*;
use fatturapa::envelope;

const PLAIN: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>",
    "<p:FatturaElettronica versione=\"FPR12\" xmlns:p=\"urn:fatturapa\">",
    "<FatturaElettronicaHeader/><FatturaElettronicaBody/>",
    "</p:FatturaElettronica>",
);

fn config() -> PipelineConfig {
    // Nonexistent binary keeps DER handling on the pure byte-scan path.
    PipelineConfig {
        openssl_path: "/nonexistent/openssl".into(),
        ..PipelineConfig::default()
    }
}

// --- Plain XML ---

#[test]
fn plain_xml_passes_through_untouched() {
    let out = envelope::extract(PLAIN.as_bytes(), &config()).unwrap();
    assert_eq!(out.kind, EnvelopeKind::Plain);
    assert_eq!(out.method, ExtractionMethod::DirectScan);
    assert_eq!(out.xml, PLAIN.as_bytes());
    assert!(!out.forced_close);
}

#[test]
fn bom_and_leading_whitespace_do_not_confuse_detection() {
    let mut bytes = b"\xef\xbb\xbf\n  ".to_vec();
    bytes.extend_from_slice(PLAIN.as_bytes());
    assert_eq!(envelope::detect(&bytes).kind, EnvelopeKind::Plain);
    let out = envelope::extract(&bytes, &config()).unwrap();
    assert_eq!(out.xml, PLAIN.as_bytes());
}

// --- Base64-wrapped envelopes ---

#[test]
fn base64_wrapped_xml_is_unwrapped() {
    let wrapped = BASE64.encode(PLAIN.as_bytes());
    let out = envelope::extract(wrapped.as_bytes(), &config()).unwrap();
    assert_eq!(out.kind, EnvelopeKind::P7mBase64);
    assert_eq!(out.method, ExtractionMethod::Base64Decode);
    assert_eq!(out.xml, PLAIN.as_bytes());
}

#[test]
fn line_wrapped_base64_still_decodes() {
    let raw = BASE64.encode(PLAIN.as_bytes());
    let wrapped: String = raw
        .as_bytes()
        .chunks(64)
        .map(|c| std::str::from_utf8(c).unwrap())
        .collect::<Vec<_>>()
        .join("\r\n");
    let out = envelope::extract(wrapped.as_bytes(), &config()).unwrap();
    assert_eq!(out.kind, EnvelopeKind::P7mBase64);
    assert_eq!(out.xml, PLAIN.as_bytes());
}

// --- DER envelopes ---

#[test]
fn der_envelope_falls_back_to_byte_scan() {
    // A fake PKCS#7 shell: DER SEQUENCE header, garbage, the XML, a
    // trailing signature blob.
    let mut der = vec![0x30, 0x82, 0x06, 0x00, 0x02, 0x01, 0x01];
    der.extend_from_slice(PLAIN.as_bytes());
    der.extend_from_slice(&[0x04, 0x82, 0x00, 0x10, 0xaa, 0xbb]);

    let out = envelope::extract(&der, &config()).unwrap();
    assert_eq!(out.kind, EnvelopeKind::P7mDer);
    assert_eq!(out.method, ExtractionMethod::DerScan);
    assert_eq!(out.xml, PLAIN.as_bytes());
}

#[test]
fn truncated_der_payload_gets_synthetic_close() {
    let mut der = vec![0x30, 0x82, 0x01, 0x00];
    der.extend_from_slice(b"<FatturaElettronica><Numero>7</Numero>");
    let out = envelope::extract(&der, &config()).unwrap();
    assert!(out.forced_close);
    assert!(out.xml.ends_with(b"</FatturaElettronica>"));
}

// --- Exhaustion ---

#[test]
fn unrecognizable_input_reports_every_strategy() {
    let err = envelope::extract(b"\x00\x01\x02 definitely not an invoice", &config()).unwrap_err();
    match err {
        IngestError::Extraction { attempts, head, size } => {
            assert_eq!(size, 29);
            assert!(!head.is_empty());
            assert!(attempts.iter().any(|a| a.starts_with("base64:")));
            assert!(attempts.iter().any(|a| a.starts_with("der:")));
            assert!(attempts.iter().any(|a| a.starts_with("scan:")));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        envelope::extract(b"", &config()).unwrap_err().stage(),
        Stage::Extraction
    );
}
