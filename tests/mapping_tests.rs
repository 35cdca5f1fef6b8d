use fatturapa::core::*;
use fatturapa::mapping;
use fatturapa::parser::*;
use rust_decimal_macros::dec;

fn supplier() -> RawParty {
    RawParty {
        denominazione: Some("Fornitore Srl".into()),
        vat_number: Some("01234567890".into()),
        ..Default::default()
    }
}

fn body() -> RawBody {
    RawBody {
        tipo_documento: Some("TD01".into()),
        numero: Some("42".into()),
        data: Some("2024-06-15".into()),
        divisa: Some("EUR".into()),
        importo_totale: Some("122.00".into()),
        riepiloghi: vec![RawVat {
            aliquota_iva: Some("22.00".into()),
            imponibile: Some("100.00".into()),
            imposta: Some("22.00".into()),
            natura: None,
        }],
        ..Default::default()
    }
}

fn file_with(bodies: Vec<RawBody>) -> ParsedFile {
    ParsedFile {
        supplier: Some(supplier()),
        bodies,
        ..Default::default()
    }
}

// --- Totals ---

#[test]
fn declared_total_matching_summary_is_clean() {
    let mapped = mapping::map_file(&file_with(vec![body()]), &PipelineConfig::default()).unwrap();
    let doc = &mapped.documents[0];
    assert_eq!(doc.total, Some(dec!(122.00)));
    assert_eq!(doc.taxable_total, Some(dec!(100.00)));
    assert_eq!(doc.vat_total, Some(dec!(22.00)));
    assert!(!doc.non_conformant);
    assert!(doc.warnings.is_empty(), "unexpected: {:?}", doc.warnings);
}

#[test]
fn declared_total_mismatch_beyond_epsilon_warns() {
    let mut b = body();
    b.importo_totale = Some("130.00".into());
    let mapped = mapping::map_file(&file_with(vec![b]), &PipelineConfig::default()).unwrap();
    let doc = &mapped.documents[0];
    // Declared value wins; the discrepancy is flagged, not corrected.
    assert_eq!(doc.total, Some(dec!(130.00)));
    assert!(doc.non_conformant);
    assert!(doc.warnings.iter().any(|w| w.field == "total"));
}

#[test]
fn mismatch_within_epsilon_is_tolerated() {
    let mut b = body();
    b.importo_totale = Some("122.01".into());
    let mapped = mapping::map_file(&file_with(vec![b]), &PipelineConfig::default()).unwrap();
    assert!(mapped.documents[0].warnings.is_empty());
    assert!(!mapped.documents[0].non_conformant);
}

#[test]
fn missing_declared_total_uses_summary_with_rounding() {
    let mut b = body();
    b.importo_totale = None;
    b.arrotondamento = Some("-0.02".into());
    let mapped = mapping::map_file(&file_with(vec![b]), &PipelineConfig::default()).unwrap();
    assert_eq!(mapped.documents[0].total, Some(dec!(121.98)));
    assert!(!mapped.documents[0].non_conformant);
}

#[test]
fn total_reconstructed_from_lines_when_everything_else_missing() {
    let mut b = body();
    b.importo_totale = None;
    b.riepiloghi.clear();
    b.lines = vec![
        RawLine {
            prezzo_totale: Some("60.00".into()),
            ..Default::default()
        },
        RawLine {
            prezzo_totale: Some("40.00".into()),
            ..Default::default()
        },
    ];
    let mapped = mapping::map_file(&file_with(vec![b]), &PipelineConfig::default()).unwrap();
    let doc = &mapped.documents[0];
    assert_eq!(doc.total, Some(dec!(100.00)));
    assert!(doc.non_conformant);
    assert!(doc.warnings.iter().any(|w| w.field == "total"));
}

// --- Conformance warnings ---

#[test]
fn zero_rate_without_natura_warns() {
    let mut b = body();
    b.importo_totale = None;
    b.riepiloghi = vec![RawVat {
        aliquota_iva: Some("0.00".into()),
        imponibile: Some("100.00".into()),
        imposta: Some("0.00".into()),
        natura: None,
    }];
    let mapped = mapping::map_file(&file_with(vec![b]), &PipelineConfig::default()).unwrap();
    assert!(
        mapped.documents[0]
            .warnings
            .iter()
            .any(|w| w.field.contains("nature"))
    );
}

#[test]
fn zero_rate_with_natura_is_fine() {
    let mut b = body();
    b.importo_totale = None;
    b.riepiloghi = vec![RawVat {
        aliquota_iva: Some("0.00".into()),
        imponibile: Some("100.00".into()),
        imposta: Some("0.00".into()),
        natura: Some("N2.2".into()),
    }];
    let mapped = mapping::map_file(&file_with(vec![b]), &PipelineConfig::default()).unwrap();
    assert!(mapped.documents[0].warnings.is_empty());
}

#[test]
fn pec_with_wrong_channel_code_warns() {
    let mut file = file_with(vec![body()]);
    file.transmission.codice_destinatario = Some("ABC1234".into());
    file.transmission.pec_destinatario = Some("x@pec.it".into());
    let mapped = mapping::map_file(&file, &PipelineConfig::default()).unwrap();
    assert!(
        mapped.documents[0]
            .warnings
            .iter()
            .any(|w| w.field == "transmission.recipient_pec")
    );
}

#[test]
fn pec_with_zero_channel_code_is_fine() {
    let mut file = file_with(vec![body()]);
    file.transmission.codice_destinatario = Some("0000000".into());
    file.transmission.pec_destinatario = Some("x@pec.it".into());
    let mapped = mapping::map_file(&file, &PipelineConfig::default()).unwrap();
    assert!(mapped.documents[0].warnings.is_empty());
}

#[test]
fn multi_body_files_warn_on_every_document() {
    let mapped =
        mapping::map_file(&file_with(vec![body(), body()]), &PipelineConfig::default()).unwrap();
    assert_eq!(mapped.documents.len(), 2);
    for doc in &mapped.documents {
        assert!(doc.warnings.iter().any(|w| w.field == "body"));
    }
}

#[test]
fn attachment_without_payload_warns() {
    let mut b = body();
    b.allegati = vec![RawAttachment {
        nome: Some("doc.pdf".into()),
        ..Default::default()
    }];
    let mapped = mapping::map_file(&file_with(vec![b]), &PipelineConfig::default()).unwrap();
    let doc = &mapped.documents[0];
    assert_eq!(doc.attachments.len(), 1);
    assert!(doc.warnings.iter().any(|w| w.field.starts_with("attachments")));
}

#[test]
fn incomplete_vat_row_is_dropped_with_warning() {
    let mut b = body();
    b.riepiloghi.push(RawVat {
        aliquota_iva: Some("10.00".into()),
        imponibile: None,
        imposta: Some("5.00".into()),
        natura: None,
    });
    let mapped = mapping::map_file(&file_with(vec![b]), &PipelineConfig::default()).unwrap();
    let doc = &mapped.documents[0];
    assert_eq!(doc.vat_breakdown.len(), 1);
    assert!(doc.warnings.iter().any(|w| w.field.starts_with("vat_breakdown")));
}

// --- Field defaults and parsing ---

#[test]
fn currency_defaults_to_eur() {
    let mut b = body();
    b.divisa = None;
    let mapped = mapping::map_file(&file_with(vec![b]), &PipelineConfig::default()).unwrap();
    assert_eq!(mapped.documents[0].currency, "EUR");
}

#[test]
fn due_date_is_earliest_payment_deadline() {
    let mut b = body();
    b.pagamenti = vec![
        RawPayment {
            data_scadenza: Some("2024-08-01".into()),
            importo: Some("61.00".into()),
            ..Default::default()
        },
        RawPayment {
            data_scadenza: Some("2024-07-01".into()),
            importo: Some("61.00".into()),
            ..Default::default()
        },
    ];
    let mapped = mapping::map_file(&file_with(vec![b]), &PipelineConfig::default()).unwrap();
    let doc = &mapped.documents[0];
    assert_eq!(
        doc.due_date,
        chrono::NaiveDate::from_ymd_opt(2024, 7, 1)
    );
    assert_eq!(doc.payments.len(), 2);
}

#[test]
fn document_kind_codes_round_trip() {
    for (code, wants_other) in [("TD01", false), ("TD04", false), ("TD20", false), ("TD99", true)] {
        let kind = DocumentKind::from_code(code);
        assert_eq!(kind.code(), code);
        assert_eq!(matches!(kind, DocumentKind::Other(_)), wants_other);
    }
}

#[test]
fn missing_supplier_aborts_the_file() {
    let file = ParsedFile {
        bodies: vec![body()],
        ..Default::default()
    };
    let err = mapping::map_file(&file, &PipelineConfig::default()).unwrap_err();
    assert_eq!(err.stage(), Stage::Mapping);
}
