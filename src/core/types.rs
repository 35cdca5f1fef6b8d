use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::core::ConformanceWarning;

/// Pipeline stage, in execution order. A [`Diagnostic`] records the
/// last stage reached before success or failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Extraction,
    Sanitization,
    Encoding,
    Parsing,
    Mapping,
}

/// How the raw input bytes were classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeKind {
    /// Plain FatturaPA XML, no cryptographic wrapper.
    Plain,
    /// CAdES-BES PKCS#7 envelope in binary DER form.
    P7mDer,
    /// DER envelope additionally wrapped in base64 (common SDI relay output).
    P7mBase64,
}

/// Which extraction strategy produced the XML payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionMethod {
    /// Whole-buffer base64 decode contained the root marker.
    Base64Decode,
    /// External `openssl smime` process unwrapped the envelope.
    SignatureProcess,
    /// Pure byte scan over the DER content located the payload.
    DerScan,
    /// Direct scan of the raw bytes for prolog/root marker.
    DirectScan,
}

/// Raw input bytes plus their detected kind — the extractor's working unit.
#[derive(Debug, Clone)]
pub struct RawEnvelope {
    pub bytes: Vec<u8>,
    pub kind: EnvelopeKind,
}

/// A single repair applied by the byte sanitizer, in application order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Repair {
    /// NUL or control bytes (other than tab/newline/CR) removed.
    StrippedControlBytes,
    /// Non-ASCII bytes embedded inside an element name removed.
    StrippedNonAsciiName,
    /// A known truncated element name rewritten from the fixed table.
    RepairedTruncatedName(String),
    /// Stray whitespace inside a closing tag collapsed.
    CollapsedClosingTag,
    /// Bare `<` or `&` in text content escaped.
    EscapedBareMarkup,
    /// Synthetic close appended for an unterminated root element.
    ClosedUnterminatedRoot,
}

/// Cleaned byte buffer plus the ordered list of repairs applied.
#[derive(Debug, Clone)]
pub struct SanitizedDocument {
    pub bytes: Vec<u8>,
    pub repairs: Vec<Repair>,
}

/// Text encoding that produced well-formed XML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentEncoding {
    Utf8,
    Windows1252,
    Latin1,
}

impl DocumentEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Windows1252 => "windows-1252",
            Self::Latin1 => "ISO-8859-1",
        }
    }
}

/// Which parsing tier produced the document bodies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseTier {
    /// Schema-aware decode of the expected FatturaPA structure.
    #[default]
    Strict,
    /// Namespace-agnostic traversal matching elements by local name.
    Lenient,
    /// Lenient traversal with forcible tag-mismatch repair — last resort.
    Recovered,
}

/// FatturaPA transmission format (`FormatoTrasmissione`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransmissionFormat {
    /// FPR12 — ordinary invoice to private parties.
    Fpr12,
    /// FPA12 — invoice to public administration.
    Fpa12,
    /// FSM10 — simplified invoice.
    Fsm10,
    /// Unrecognized code, passed through.
    Other(String),
}

impl TransmissionFormat {
    pub fn from_code(code: &str) -> Self {
        match code.to_ascii_uppercase().as_str() {
            "FPR12" => Self::Fpr12,
            "FPA12" => Self::Fpa12,
            "FSM10" | "VFSM10" => Self::Fsm10,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Fpr12 => "FPR12",
            Self::Fpa12 => "FPA12",
            Self::Fsm10 => "FSM10",
            Self::Other(c) => c,
        }
    }
}

/// `DatiTrasmissione` — exactly one per input file, shared by all bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmissionHeader {
    /// `IdTrasmittente/IdPaese` — transmitter country code.
    pub transmitter_country: Option<String>,
    /// `IdTrasmittente/IdCodice` — transmitter identifier.
    pub transmitter_code: Option<String>,
    /// `ProgressivoInvio` — transmission progressive number.
    pub progressive_id: Option<String>,
    /// `FormatoTrasmissione`.
    pub format: Option<TransmissionFormat>,
    /// `CodiceDestinatario` — recipient channel code ("0000000" = PEC delivery).
    pub recipient_code: Option<String>,
    /// `PECDestinatario` — only meaningful with recipient code "0000000".
    pub recipient_pec: Option<String>,
}

/// Shared party shape for both supplier (`CedentePrestatore`) and
/// customer (`CessionarioCommittente`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    /// `Denominazione`, or `Nome` + `Cognome` concatenated.
    pub name: Option<String>,
    /// `IdFiscaleIVA/IdCodice` — VAT registration number.
    pub vat_number: Option<String>,
    /// `CodiceFiscale` — fiscal identifier.
    pub fiscal_code: Option<String>,
    /// `Sede/Indirizzo`.
    pub address: Option<String>,
    /// `Sede/CAP`.
    pub postal_code: Option<String>,
    /// `Sede/Comune`.
    pub city: Option<String>,
    /// `Sede/Provincia`.
    pub province: Option<String>,
    /// `Sede/Nazione`.
    pub country: Option<String>,
    /// `Contatti/Email`.
    pub email: Option<String>,
    /// PEC contact address, where present.
    pub pec: Option<String>,
    /// Normalized matching key: fiscal code preferred, VAT number
    /// fallback. Always resolved — mapping fails otherwise.
    pub identity_key: String,
}

/// Document subtype (`TipoDocumento`, TD codes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentKind {
    /// TD01 — invoice.
    Invoice,
    /// TD02 — advance on invoice.
    AdvanceInvoice,
    /// TD03 — advance on fee note.
    AdvanceFee,
    /// TD04 — credit note.
    CreditNote,
    /// TD05 — debit note.
    DebitNote,
    /// TD06 — fee note (parcella).
    FeeNote,
    /// TD07 — simplified invoice.
    SimplifiedInvoice,
    /// TD08 — simplified credit note.
    SimplifiedCreditNote,
    /// TD09 — simplified debit note.
    SimplifiedDebitNote,
    /// TD20 — self-billed invoice (autofattura).
    SelfBilled,
    /// Any other TD code, passed through.
    Other(String),
}

impl DocumentKind {
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "TD01" => Self::Invoice,
            "TD02" => Self::AdvanceInvoice,
            "TD03" => Self::AdvanceFee,
            "TD04" => Self::CreditNote,
            "TD05" => Self::DebitNote,
            "TD06" => Self::FeeNote,
            "TD07" => Self::SimplifiedInvoice,
            "TD08" => Self::SimplifiedCreditNote,
            "TD09" => Self::SimplifiedDebitNote,
            "TD20" => Self::SelfBilled,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Invoice => "TD01",
            Self::AdvanceInvoice => "TD02",
            Self::AdvanceFee => "TD03",
            Self::CreditNote => "TD04",
            Self::DebitNote => "TD05",
            Self::FeeNote => "TD06",
            Self::SimplifiedInvoice => "TD07",
            Self::SimplifiedCreditNote => "TD08",
            Self::SimplifiedDebitNote => "TD09",
            Self::SelfBilled => "TD20",
            Self::Other(c) => c,
        }
    }
}

/// One economic document — 1:1 with a parsed `FatturaElettronicaBody`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentBody {
    /// Document subtype.
    pub kind: DocumentKind,
    /// `Numero` — document number.
    pub number: Option<String>,
    /// `Data` — issue date.
    pub issue_date: Option<NaiveDate>,
    /// `Divisa` — ISO 4217 currency code, defaulted to "EUR".
    pub currency: String,
    /// Supplier party (issuer), shared across all bodies of the file.
    pub supplier: Party,
    /// Customer party (recipient), where present.
    pub customer: Option<Party>,
    /// Sum of `ImponibileImporto` over all VAT summaries.
    pub taxable_total: Option<Decimal>,
    /// Sum of `Imposta` over all VAT summaries.
    pub vat_total: Option<Decimal>,
    /// `Arrotondamento` — document-level rounding adjustment.
    pub rounding: Option<Decimal>,
    /// `ImportoTotaleDocumento` as declared, if present.
    pub declared_total: Option<Decimal>,
    /// Resolved total: declared, else taxable + tax + rounding, else
    /// reconstructed from line items (flagged non-conformant).
    pub total: Option<Decimal>,
    /// Earliest payment due date across all payment terms.
    pub due_date: Option<NaiveDate>,
    /// Set when the document deviated enough to need manual review
    /// (reconstructed totals, forced envelope closure, excess mismatch).
    pub non_conformant: bool,
    /// `DettaglioLinee`.
    pub lines: Vec<LineItem>,
    /// `DatiRiepilogo`.
    pub vat_breakdown: Vec<VatBreakdown>,
    /// `DettaglioPagamento`.
    pub payments: Vec<PaymentTerm>,
    /// `DatiDDT` — delivery note references.
    pub delivery_refs: Vec<DeliveryReference>,
    /// `Allegati`.
    pub attachments: Vec<Attachment>,
    /// Accumulated conformance warnings, in detection order.
    pub warnings: Vec<ConformanceWarning>,
}

/// One invoice line (`DettaglioLinee`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    /// `NumeroLinea`.
    pub line_number: Option<u32>,
    /// `Descrizione`.
    pub description: Option<String>,
    /// `Quantita`.
    pub quantity: Option<Decimal>,
    /// `UnitaMisura`.
    pub unit: Option<String>,
    /// `PrezzoUnitario`.
    pub unit_price: Option<Decimal>,
    /// `ScontoMaggiorazione/Percentuale`.
    pub discount_percent: Option<Decimal>,
    /// `ScontoMaggiorazione/Importo`.
    pub discount_amount: Option<Decimal>,
    /// `AliquotaIVA`.
    pub vat_rate: Option<Decimal>,
    /// `PrezzoTotale` — the line taxable amount.
    pub line_total: Option<Decimal>,
    /// `CodiceArticolo/CodiceValore`.
    pub item_code: Option<String>,
}

/// One VAT summary row (`DatiRiepilogo`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VatBreakdown {
    /// `AliquotaIVA` — rate percentage.
    pub rate: Decimal,
    /// `ImponibileImporto`.
    pub taxable_amount: Decimal,
    /// `Imposta`.
    pub tax_amount: Decimal,
    /// `Natura` — exemption nature code, required when the rate is zero.
    pub nature: Option<String>,
}

/// One payment installment (`DettaglioPagamento`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTerm {
    /// `DataScadenzaPagamento`.
    pub due_date: Option<NaiveDate>,
    /// `ImportoPagamento`.
    pub amount: Option<Decimal>,
    /// `CondizioniPagamento` (TP01 installments, TP02 lump sum, TP03 advance).
    pub terms_code: Option<String>,
    /// `ModalitaPagamento` (MP01 cash, MP05 transfer, …).
    pub method_code: Option<String>,
}

/// One delivery note reference (`DatiDDT`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReference {
    /// `NumeroDDT`.
    pub number: Option<String>,
    /// `DataDDT`.
    pub date: Option<NaiveDate>,
    /// `RiferimentoNumeroLinea` — lines this delivery covers.
    pub line_refs: Vec<u32>,
}

/// One embedded attachment (`Allegati`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// `NomeAttachment`.
    pub filename: Option<String>,
    /// `DescrizioneAttachment`.
    pub description: Option<String>,
    /// `FormatoAttachment`.
    pub format: Option<String>,
    /// `AlgoritmoCompressione`.
    pub compression: Option<String>,
    /// `Attachment` — base64 payload, kept encoded.
    pub data_base64: Option<String>,
}

/// Final classification of one candidate document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Clean import, zero warnings.
    Imported,
    /// Imported despite recoverable deviations.
    ImportedWithWarning,
    /// Not an invoice at all (SDI metadata or delivery notification) —
    /// a semantic judgment about content, never a symptom of corruption.
    Skipped,
    /// A pipeline stage failed; raw artifacts preserved.
    Error,
}

/// Per-file processing trace handed to the import orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Last stage reached.
    pub stage: Option<Stage>,
    /// Detected envelope kind.
    pub envelope: Option<EnvelopeKind>,
    /// Strategy that yielded the XML payload.
    pub method: Option<ExtractionMethod>,
    /// Repairs applied by the sanitizer, in order.
    pub repairs: Vec<Repair>,
    /// Encoding that produced well-formed text.
    pub encoding: Option<DocumentEncoding>,
    /// Parsing tier that produced the bodies.
    pub tier: Option<ParseTier>,
    /// Warnings accumulated across all stages.
    pub warnings: Vec<ConformanceWarning>,
    /// SHA-256 of the extracted XML, for orchestrator-side deduplication.
    /// Falls back to the raw input bytes when extraction never succeeded.
    pub content_hash: Option<String>,
    /// Dumped artifact for manual inspection, on failure.
    pub dump_ref: Option<PathBuf>,
    /// Stage error message, on failure.
    pub error: Option<String>,
}
