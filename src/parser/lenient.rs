//! Tier 2: namespace-agnostic fallback parse.
//!
//! Walks the event stream matching elements purely by local name, so
//! prefixed, reordered, or partially missing structures still yield
//! bodies. With `recover` set, end-tag name checking is disabled and a
//! hard reader error terminates the walk instead of failing it — the
//! absolute last resort for mangled input.

use quick_xml::Reader;
use quick_xml::events::Event;

use super::{
    ParsedFile, RawAttachment, RawBody, RawDdt, RawLine, RawParty, RawPayment, RawVat,
};
use crate::core::ParseTier;

pub fn parse(text: &str, recover: bool) -> Result<ParsedFile, String> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    reader.config_mut().check_end_names = !recover;

    let mut p = LenientParsed::default();
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = local_name(e.name().as_ref());
                p.handle_start(&name);
                path.push(name);
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default().trim().to_string();
                if !text.is_empty() {
                    p.handle_text(&path, &text);
                }
            }
            Ok(Event::End(ref e)) => {
                // With check_end_names off the end tag may not match the
                // top of the stack; pop by name so commits still fire.
                let ended = local_name(e.name().as_ref());
                if let Some(pos) = path.iter().rposition(|n| *n == ended) {
                    path.truncate(pos);
                } else {
                    path.pop();
                }
                p.handle_end(&ended);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                if recover {
                    tracing::warn!(error = %e, "recovery parse stopped at reader error");
                    break;
                }
                return Err(format!("XML parse error: {e}"));
            }
        }
    }

    Ok(p.finish(if recover {
        ParseTier::Recovered
    } else {
        ParseTier::Lenient
    }))
}

fn local_name(qname: &[u8]) -> String {
    let name = std::str::from_utf8(qname).unwrap_or("");
    name.rsplit(':').next().unwrap_or(name).to_string()
}

#[derive(Default)]
struct LenientParsed {
    file: ParsedFile,
    current_body: Option<RawBody>,
    current_line: Option<RawLine>,
    current_vat: Option<RawVat>,
    current_payment: Option<RawPayment>,
    current_condizioni: Option<String>,
    current_ddt: Option<RawDdt>,
    current_attachment: Option<RawAttachment>,
}

/// First value wins, matching first-match XPath semantics.
fn set(slot: &mut Option<String>, text: &str) {
    if slot.is_none() {
        *slot = Some(text.to_string());
    }
}

impl LenientParsed {
    fn handle_start(&mut self, name: &str) {
        match name {
            "FatturaElettronicaBody" => {
                self.commit_body();
                self.current_body = Some(RawBody::default());
            }
            // Wrapper-less bodies: some producers emit the general data
            // directly under the root.
            "DatiGenerali" | "DatiBeniServizi" if self.current_body.is_none() => {
                self.current_body = Some(RawBody::default());
            }
            "DettaglioLinee" => self.current_line = Some(RawLine::default()),
            "DatiRiepilogo" => self.current_vat = Some(RawVat::default()),
            "DettaglioPagamento" => {
                self.current_payment = Some(RawPayment {
                    condizioni: self.current_condizioni.clone(),
                    ..Default::default()
                });
            }
            "DatiDDT" => self.current_ddt = Some(RawDdt::default()),
            "Allegati" => self.current_attachment = Some(RawAttachment::default()),
            _ => {}
        }
    }

    fn handle_end(&mut self, name: &str) {
        match name {
            "FatturaElettronicaBody" => self.commit_body(),
            "DettaglioLinee" => {
                if let (Some(line), Some(body)) = (self.current_line.take(), self.current_body.as_mut())
                {
                    body.lines.push(line);
                }
            }
            "DatiRiepilogo" => {
                if let (Some(vat), Some(body)) = (self.current_vat.take(), self.current_body.as_mut())
                {
                    body.riepiloghi.push(vat);
                }
            }
            "DettaglioPagamento" => {
                if let (Some(pay), Some(body)) =
                    (self.current_payment.take(), self.current_body.as_mut())
                {
                    body.pagamenti.push(pay);
                }
            }
            "DatiPagamento" => self.current_condizioni = None,
            "DatiDDT" => {
                if let (Some(ddt), Some(body)) = (self.current_ddt.take(), self.current_body.as_mut())
                {
                    body.ddt.push(ddt);
                }
            }
            "Allegati" => {
                if let (Some(att), Some(body)) =
                    (self.current_attachment.take(), self.current_body.as_mut())
                {
                    body.allegati.push(att);
                }
            }
            _ => {}
        }
    }

    fn handle_text(&mut self, path: &[String], text: &str) {
        let leaf = path.last().map(String::as_str).unwrap_or("");
        let parent = if path.len() >= 2 {
            path[path.len() - 2].as_str()
        } else {
            ""
        };
        let in_path = |name: &str| path.iter().any(|n| n == name);

        // --- DatiTrasmissione ---
        if in_path("DatiTrasmissione") {
            let t = &mut self.file.transmission;
            match leaf {
                "IdPaese" if parent == "IdTrasmittente" => set(&mut t.id_paese, text),
                "IdCodice" if parent == "IdTrasmittente" => set(&mut t.id_codice, text),
                "ProgressivoInvio" => set(&mut t.progressivo_invio, text),
                "FormatoTrasmissione" => set(&mut t.formato, text),
                "CodiceDestinatario" => set(&mut t.codice_destinatario, text),
                "PECDestinatario" => set(&mut t.pec_destinatario, text),
                _ => {}
            }
            return;
        }

        // --- Parties ---
        if in_path("CedentePrestatore") {
            party_text(self.file.supplier.get_or_insert_with(Default::default), leaf, parent, text);
            return;
        }
        if in_path("CessionarioCommittente") {
            party_text(self.file.customer.get_or_insert_with(Default::default), leaf, parent, text);
            return;
        }

        // --- Line detail ---
        if let Some(line) = self.current_line.as_mut() {
            match leaf {
                "NumeroLinea" => set(&mut line.numero_linea, text),
                "Descrizione" => set(&mut line.descrizione, text),
                "Quantita" => set(&mut line.quantita, text),
                "UnitaMisura" => set(&mut line.unita_misura, text),
                "PrezzoUnitario" => set(&mut line.prezzo_unitario, text),
                "Percentuale" if parent == "ScontoMaggiorazione" => {
                    set(&mut line.sconto_percentuale, text)
                }
                "Importo" if parent == "ScontoMaggiorazione" => set(&mut line.sconto_importo, text),
                "PrezzoTotale" => set(&mut line.prezzo_totale, text),
                "AliquotaIVA" => set(&mut line.aliquota_iva, text),
                "CodiceValore" if parent == "CodiceArticolo" => set(&mut line.codice_articolo, text),
                _ => {}
            }
            return;
        }

        // --- VAT summary ---
        if let Some(vat) = self.current_vat.as_mut() {
            match leaf {
                "AliquotaIVA" => set(&mut vat.aliquota_iva, text),
                "ImponibileImporto" => set(&mut vat.imponibile, text),
                "Imposta" => set(&mut vat.imposta, text),
                "Natura" => set(&mut vat.natura, text),
                _ => {}
            }
            return;
        }

        // --- Payments ---
        if leaf == "CondizioniPagamento" {
            self.current_condizioni = Some(text.to_string());
            return;
        }
        if let Some(pay) = self.current_payment.as_mut() {
            match leaf {
                "ModalitaPagamento" => set(&mut pay.modalita, text),
                "DataScadenzaPagamento" => set(&mut pay.data_scadenza, text),
                "ImportoPagamento" => set(&mut pay.importo, text),
                _ => {}
            }
            return;
        }

        // --- Delivery notes ---
        if let Some(ddt) = self.current_ddt.as_mut() {
            match leaf {
                "NumeroDDT" => set(&mut ddt.numero, text),
                "DataDDT" => set(&mut ddt.data, text),
                "RiferimentoNumeroLinea" => ddt.line_refs.push(text.to_string()),
                _ => {}
            }
            return;
        }

        // --- Attachments ---
        if let Some(att) = self.current_attachment.as_mut() {
            match leaf {
                "NomeAttachment" => set(&mut att.nome, text),
                "DescrizioneAttachment" => set(&mut att.descrizione, text),
                "FormatoAttachment" => set(&mut att.formato, text),
                "AlgoritmoCompressione" => set(&mut att.compressione, text),
                "Attachment" => set(&mut att.attachment, text),
                _ => {}
            }
            return;
        }

        // --- Document general data ---
        if let Some(body) = self.current_body.as_mut() {
            if parent == "DatiGeneraliDocumento" || in_path("DatiGeneraliDocumento") {
                match leaf {
                    "TipoDocumento" => set(&mut body.tipo_documento, text),
                    "Divisa" => set(&mut body.divisa, text),
                    "Data" => set(&mut body.data, text),
                    "Numero" => set(&mut body.numero, text),
                    "ImportoTotaleDocumento" => set(&mut body.importo_totale, text),
                    "Arrotondamento" => set(&mut body.arrotondamento, text),
                    _ => {}
                }
            }
        }
    }

    fn commit_body(&mut self) {
        if let Some(body) = self.current_body.take() {
            self.file.bodies.push(body);
        }
    }

    fn finish(mut self, tier: ParseTier) -> ParsedFile {
        self.commit_body();
        self.file.tier = tier;
        self.file
    }
}

fn party_text(party: &mut RawParty, leaf: &str, parent: &str, text: &str) {
    match leaf {
        "Denominazione" => set(&mut party.denominazione, text),
        "Nome" => set(&mut party.nome, text),
        "Cognome" => set(&mut party.cognome, text),
        "IdCodice" if parent == "IdFiscaleIVA" => set(&mut party.vat_number, text),
        "CodiceFiscale" => set(&mut party.fiscal_code, text),
        "Indirizzo" => set(&mut party.indirizzo, text),
        "CAP" => set(&mut party.cap, text),
        "Comune" => set(&mut party.comune, text),
        "Provincia" => set(&mut party.provincia, text),
        "Nazione" => set(&mut party.nazione, text),
        "Email" => set(&mut party.email, text),
        "PEC" => set(&mut party.pec, text),
        _ => {}
    }
}
