//! Two-tier structural parsing of decoded FatturaPA text.
//!
//! Tier 1 ([`strict`]) is a schema-aware serde decode of the expected
//! node structure. Tier 2 ([`lenient`]) traverses the tree matching
//! elements purely by local name, tolerant of namespace prefixes and
//! missing or reordered optional nodes. An error-recovering mode
//! (forcible tag-mismatch repair) runs only as an absolute last resort
//! and is logged distinctly.
//!
//! The tiers form an ordered chain: the first one that yields at least
//! one body short-circuits the rest. Both produce the same string-level
//! [`ParsedFile`]; numeric and date conversion happens in the mapper.

mod lenient;
mod strict;

use crate::core::{IngestError, ParseTier};

/// Parse decoded text through the tier chain.
pub fn parse(text: &str) -> Result<ParsedFile, IngestError> {
    match strict::parse(text) {
        Ok(file) if !file.bodies.is_empty() => return Ok(file),
        Ok(_) => tracing::warn!("strict tier yielded zero bodies, trying lenient tier"),
        Err(e) => tracing::warn!(error = %e, "strict tier failed, trying lenient tier"),
    }

    match lenient::parse(text, false) {
        Ok(file) if !file.bodies.is_empty() => return Ok(file),
        Ok(_) => tracing::warn!("lenient tier yielded zero bodies"),
        Err(e) => tracing::warn!(error = %e, "lenient tier failed"),
    }

    // Last resort: forcible tag-mismatch repair.
    tracing::warn!("entering recovery parse (tag-mismatch repair forced)");
    let mut file = lenient::parse(text, true).map_err(IngestError::Parse)?;
    if file.bodies.is_empty() {
        return Err(IngestError::Parse(
            "no FatturaElettronicaBody found by any tier".to_string(),
        ));
    }
    file.tier = ParseTier::Recovered;
    Ok(file)
}

/// String-level parse result: one shared header, N bodies.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub transmission: RawTransmission,
    pub supplier: Option<RawParty>,
    pub customer: Option<RawParty>,
    pub bodies: Vec<RawBody>,
    pub tier: ParseTier,
}

/// `DatiTrasmissione`, raw.
#[derive(Debug, Clone, Default)]
pub struct RawTransmission {
    pub id_paese: Option<String>,
    pub id_codice: Option<String>,
    pub progressivo_invio: Option<String>,
    pub formato: Option<String>,
    pub codice_destinatario: Option<String>,
    pub pec_destinatario: Option<String>,
}

/// `CedentePrestatore` / `CessionarioCommittente`, raw.
#[derive(Debug, Clone, Default)]
pub struct RawParty {
    pub denominazione: Option<String>,
    pub nome: Option<String>,
    pub cognome: Option<String>,
    pub vat_number: Option<String>,
    pub fiscal_code: Option<String>,
    pub indirizzo: Option<String>,
    pub cap: Option<String>,
    pub comune: Option<String>,
    pub provincia: Option<String>,
    pub nazione: Option<String>,
    pub email: Option<String>,
    pub pec: Option<String>,
}

/// One `FatturaElettronicaBody`, raw.
#[derive(Debug, Clone, Default)]
pub struct RawBody {
    pub tipo_documento: Option<String>,
    pub numero: Option<String>,
    pub data: Option<String>,
    pub divisa: Option<String>,
    pub importo_totale: Option<String>,
    pub arrotondamento: Option<String>,
    pub lines: Vec<RawLine>,
    pub riepiloghi: Vec<RawVat>,
    pub pagamenti: Vec<RawPayment>,
    pub ddt: Vec<RawDdt>,
    pub allegati: Vec<RawAttachment>,
}

/// One `DettaglioLinee`, raw.
#[derive(Debug, Clone, Default)]
pub struct RawLine {
    pub numero_linea: Option<String>,
    pub descrizione: Option<String>,
    pub quantita: Option<String>,
    pub unita_misura: Option<String>,
    pub prezzo_unitario: Option<String>,
    pub sconto_percentuale: Option<String>,
    pub sconto_importo: Option<String>,
    pub prezzo_totale: Option<String>,
    pub aliquota_iva: Option<String>,
    pub codice_articolo: Option<String>,
}

/// One `DatiRiepilogo`, raw.
#[derive(Debug, Clone, Default)]
pub struct RawVat {
    pub aliquota_iva: Option<String>,
    pub imponibile: Option<String>,
    pub imposta: Option<String>,
    pub natura: Option<String>,
}

/// One `DettaglioPagamento`, raw, with the terms code of its enclosing
/// `DatiPagamento` group.
#[derive(Debug, Clone, Default)]
pub struct RawPayment {
    pub condizioni: Option<String>,
    pub data_scadenza: Option<String>,
    pub importo: Option<String>,
    pub modalita: Option<String>,
}

/// One `DatiDDT`, raw.
#[derive(Debug, Clone, Default)]
pub struct RawDdt {
    pub numero: Option<String>,
    pub data: Option<String>,
    pub line_refs: Vec<String>,
}

/// One `Allegati`, raw.
#[derive(Debug, Clone, Default)]
pub struct RawAttachment {
    pub nome: Option<String>,
    pub descrizione: Option<String>,
    pub formato: Option<String>,
    pub compressione: Option<String>,
    pub attachment: Option<String>,
}
