//! Field resolution: parsed string-level trees into domain records via
//! a fixed catalog of deterministic fallback rules.
//!
//! Mapping is a pure function — identical input tree, identical output
//! records. Recoverable deviations become [`ConformanceWarning`]s on
//! the produced document; only a required field with no defined
//! fallback (a party with no identifier at all) aborts the file.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::core::{
    Attachment, ConformanceWarning, DeliveryReference, DocumentBody, DocumentKind, IngestError,
    LineItem, Party, PaymentTerm, PipelineConfig, TransmissionFormat, TransmissionHeader,
    VatBreakdown,
};
use crate::parser::{ParsedFile, RawBody, RawParty};

/// Recipient channel code that routes delivery over PEC; the only code
/// under which `PECDestinatario` is meaningful.
const PEC_CHANNEL_CODE: &str = "0000000";

/// One shared header plus N independent documents.
#[derive(Debug, Clone)]
pub struct MappedFile {
    pub header: TransmissionHeader,
    pub documents: Vec<DocumentBody>,
}

/// Map a parsed file into domain records.
pub fn map_file(parsed: &ParsedFile, config: &PipelineConfig) -> Result<MappedFile, IngestError> {
    let header = map_header(parsed);

    let supplier_raw = parsed
        .supplier
        .as_ref()
        .ok_or_else(|| IngestError::Mapping("CedentePrestatore missing".to_string()))?;
    let (supplier, supplier_warnings) = map_party(supplier_raw, "supplier")
        .map_err(IngestError::Mapping)?;

    // The customer is optional; one present but unresolvable degrades to
    // a warning rather than aborting the file.
    let mut customer = None;
    let mut customer_warnings = Vec::new();
    if let Some(raw) = parsed.customer.as_ref() {
        match map_party(raw, "customer") {
            Ok((party, warnings)) => {
                customer = Some(party);
                customer_warnings = warnings;
            }
            Err(msg) => customer_warnings.push(ConformanceWarning::new("customer", msg)),
        }
    }

    let body_count = parsed.bodies.len();
    let mut documents = Vec::with_capacity(body_count);
    for (idx, raw) in parsed.bodies.iter().enumerate() {
        let mut doc = map_body(raw, &header, supplier.clone(), customer.clone(), config)?;
        let mut warnings = supplier_warnings.clone();
        warnings.extend(customer_warnings.iter().cloned());
        warnings.append(&mut doc.warnings);
        if body_count > 1 {
            warnings.push(ConformanceWarning::new(
                "body",
                format!("multiple bodies in file: body {}/{body_count}", idx + 1),
            ));
        }
        doc.warnings = warnings;
        documents.push(doc);
    }

    Ok(MappedFile { header, documents })
}

fn map_header(parsed: &ParsedFile) -> TransmissionHeader {
    let t = &parsed.transmission;
    TransmissionHeader {
        transmitter_country: t.id_paese.clone(),
        transmitter_code: t.id_codice.clone(),
        progressive_id: t.progressivo_invio.clone(),
        format: t.formato.as_deref().map(TransmissionFormat::from_code),
        recipient_code: t.codice_destinatario.clone(),
        recipient_pec: t.pec_destinatario.clone(),
    }
}

/// Resolve a party. Display name falls back from `Denominazione` to
/// `Nome` + `Cognome` to `None` with a warning; the identity key has no
/// fallback past the tax-registration number.
fn map_party(raw: &RawParty, role: &str) -> Result<(Party, Vec<ConformanceWarning>), String> {
    let mut warnings = Vec::new();

    let name = match (&raw.denominazione, &raw.nome, &raw.cognome) {
        (Some(d), _, _) => Some(d.trim().to_string()),
        (None, None, None) => {
            warnings.push(ConformanceWarning::new(
                format!("{role}.name"),
                "Denominazione and Nome/Cognome all missing",
            ));
            None
        }
        (None, nome, cognome) => {
            let joined = [nome.as_deref(), cognome.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            Some(joined.trim().to_string()).filter(|s| !s.is_empty())
        }
    };

    let identity_key = normalize_identifier(raw.fiscal_code.as_deref())
        .or_else(|| normalize_identifier(raw.vat_number.as_deref()))
        .ok_or_else(|| format!("{role} has neither CodiceFiscale nor IdFiscaleIVA"))?;

    Ok((
        Party {
            name,
            vat_number: raw.vat_number.clone(),
            fiscal_code: raw.fiscal_code.clone(),
            address: raw.indirizzo.clone(),
            postal_code: raw.cap.clone(),
            city: raw.comune.clone(),
            province: raw.provincia.clone(),
            country: raw.nazione.clone(),
            email: raw.email.clone(),
            pec: raw.pec.clone(),
            identity_key,
        },
        warnings,
    ))
}

/// Strip non-alphanumerics and uppercase; empty results resolve to `None`.
fn normalize_identifier(raw: Option<&str>) -> Option<String> {
    let normalized: String = raw?
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    (!normalized.is_empty()).then_some(normalized)
}

fn map_body(
    raw: &RawBody,
    header: &TransmissionHeader,
    supplier: Party,
    customer: Option<Party>,
    config: &PipelineConfig,
) -> Result<DocumentBody, IngestError> {
    let mut warnings = Vec::new();
    let mut non_conformant = false;

    let kind = match raw.tipo_documento.as_deref() {
        Some(code) => DocumentKind::from_code(code),
        None => {
            warnings.push(ConformanceWarning::new(
                "kind",
                "TipoDocumento missing, assumed TD01",
            ));
            DocumentKind::Invoice
        }
    };

    // PECDestinatario is only valid on the PEC delivery channel.
    if header.recipient_pec.is_some()
        && header.recipient_code.as_deref() != Some(PEC_CHANNEL_CODE)
    {
        warnings.push(ConformanceWarning::new(
            "transmission.recipient_pec",
            format!("PECDestinatario present but CodiceDestinatario is not {PEC_CHANNEL_CODE}"),
        ));
    }

    let lines = map_lines(raw);
    let vat_breakdown = map_vat(raw, &mut warnings);
    let (payments, due_date) = map_payments(raw);
    let delivery_refs = map_ddt(raw);
    let attachments = map_attachments(raw, &mut warnings);

    // Natura is required exactly when the applicable rate is zero.
    for (i, row) in vat_breakdown.iter().enumerate() {
        if row.rate.is_zero() && row.nature.is_none() {
            warnings.push(ConformanceWarning::new(
                format!("vat_breakdown[{i}].nature"),
                "Natura missing for zero-rate summary",
            ));
        }
    }

    let declared_total = to_decimal(raw.importo_totale.as_deref());
    let rounding = to_decimal(raw.arrotondamento.as_deref());
    let (taxable_total, vat_total) = if vat_breakdown.is_empty() {
        (None, None)
    } else {
        (
            Some(vat_breakdown.iter().map(|r| r.taxable_amount).sum::<Decimal>()),
            Some(vat_breakdown.iter().map(|r| r.tax_amount).sum::<Decimal>()),
        )
    };

    let summary_total = match (taxable_total, vat_total) {
        (Some(taxable), Some(vat)) => Some(taxable + vat + rounding.unwrap_or_default()),
        _ => None,
    };

    let total = match (declared_total, summary_total) {
        (Some(declared), Some(computed)) => {
            let diff = (declared - computed).abs();
            if diff > config.rounding_epsilon {
                warnings.push(ConformanceWarning::new(
                    "total",
                    format!(
                        "declared total {declared} differs from computed {computed} by {diff}"
                    ),
                ));
                non_conformant = true;
            }
            Some(declared)
        }
        (Some(declared), None) => Some(declared),
        (None, Some(computed)) => Some(computed),
        (None, None) => {
            // No declared total and no VAT summary: reconstruct from
            // the line items and send the document to manual review.
            let reconstructed: Decimal = lines
                .iter()
                .filter_map(|l| l.line_total)
                .sum();
            warnings.push(ConformanceWarning::new(
                "total",
                "ImportoTotaleDocumento and DatiRiepilogo missing, total reconstructed from lines",
            ));
            non_conformant = true;
            Some(reconstructed)
        }
    };

    Ok(DocumentBody {
        kind,
        number: raw.numero.clone(),
        issue_date: to_date(raw.data.as_deref()),
        currency: raw
            .divisa
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("EUR")
            .to_string(),
        supplier,
        customer,
        taxable_total,
        vat_total,
        rounding,
        declared_total,
        total,
        due_date,
        non_conformant,
        lines,
        vat_breakdown,
        payments,
        delivery_refs,
        attachments,
        warnings,
    })
}

fn map_lines(raw: &RawBody) -> Vec<LineItem> {
    raw.lines
        .iter()
        .map(|l| LineItem {
            line_number: l.numero_linea.as_deref().and_then(|s| s.trim().parse().ok()),
            description: l.descrizione.clone(),
            quantity: to_decimal(l.quantita.as_deref()),
            unit: l.unita_misura.clone(),
            unit_price: to_decimal(l.prezzo_unitario.as_deref()),
            discount_percent: to_decimal(l.sconto_percentuale.as_deref()),
            discount_amount: to_decimal(l.sconto_importo.as_deref()),
            vat_rate: to_decimal(l.aliquota_iva.as_deref()),
            line_total: to_decimal(l.prezzo_totale.as_deref()),
            item_code: l.codice_articolo.clone(),
        })
        .collect()
}

/// Rows missing any essential amount are dropped so they cannot poison
/// the totals; each drop is surfaced as a warning.
fn map_vat(raw: &RawBody, warnings: &mut Vec<ConformanceWarning>) -> Vec<VatBreakdown> {
    let mut rows = Vec::new();
    for (i, r) in raw.riepiloghi.iter().enumerate() {
        let rate = to_decimal(r.aliquota_iva.as_deref());
        let taxable = to_decimal(r.imponibile.as_deref());
        let tax = to_decimal(r.imposta.as_deref());
        match (rate, taxable, tax) {
            (Some(rate), Some(taxable_amount), Some(tax_amount)) => rows.push(VatBreakdown {
                rate,
                taxable_amount,
                tax_amount,
                nature: r.natura.clone(),
            }),
            _ => warnings.push(ConformanceWarning::new(
                format!("vat_breakdown[{i}]"),
                "DatiRiepilogo row dropped: AliquotaIVA/ImponibileImporto/Imposta incomplete",
            )),
        }
    }
    rows
}

fn map_payments(raw: &RawBody) -> (Vec<PaymentTerm>, Option<NaiveDate>) {
    let mut payments = Vec::new();
    let mut main_due: Option<NaiveDate> = None;

    for p in &raw.pagamenti {
        let due_date = to_date(p.data_scadenza.as_deref());
        if let Some(d) = due_date {
            main_due = Some(main_due.map_or(d, |m| m.min(d)));
        }
        payments.push(PaymentTerm {
            due_date,
            amount: to_decimal(p.importo.as_deref()),
            terms_code: p.condizioni.clone(),
            method_code: p.modalita.clone(),
        });
    }

    (payments, main_due)
}

fn map_ddt(raw: &RawBody) -> Vec<DeliveryReference> {
    raw.ddt
        .iter()
        .map(|d| DeliveryReference {
            number: d.numero.clone(),
            date: to_date(d.data.as_deref()),
            line_refs: d
                .line_refs
                .iter()
                .filter_map(|s| s.trim().parse().ok())
                .collect(),
        })
        .collect()
}

fn map_attachments(raw: &RawBody, warnings: &mut Vec<ConformanceWarning>) -> Vec<Attachment> {
    raw.allegati
        .iter()
        .enumerate()
        .map(|(i, a)| {
            if a.attachment.is_none() {
                warnings.push(ConformanceWarning::new(
                    format!("attachments[{i}]"),
                    "Allegati present without base64 content",
                ));
            }
            Attachment {
                filename: a.nome.clone(),
                description: a.descrizione.clone(),
                format: a.formato.clone(),
                compression: a.compressione.clone(),
                data_base64: a.attachment.clone(),
            }
        })
        .collect()
}

/// Tolerant decimal conversion: trims, accepts comma decimal separators.
fn to_decimal(value: Option<&str>) -> Option<Decimal> {
    let s = value?.trim().replace(',', ".");
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(&s).ok()
}

/// `YYYY-MM-DD`, tolerating a trailing time component.
fn to_date(value: Option<&str>) -> Option<NaiveDate> {
    let s = value?.trim();
    let date_part = s.split('T').next().unwrap_or(s);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}
