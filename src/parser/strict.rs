//! Tier 1: schema-aware decode of the FatturaPA node structure.
//!
//! The serde model mirrors the official schema's element names; the
//! deserializer matches on local names, so namespace prefixes are fine
//! here. Structurally degenerate files (duplicated scalar elements, a
//! missing body wrapper) fall through to the lenient tier. Every leaf
//! stays a string — conversion is the mapper's job.

use serde::Deserialize;

use super::{
    ParsedFile, RawAttachment, RawBody, RawDdt, RawLine, RawParty, RawPayment, RawTransmission,
    RawVat,
};
use crate::core::ParseTier;

pub fn parse(text: &str) -> Result<ParsedFile, String> {
    let doc: XmlFattura = quick_xml::de::from_str(text).map_err(|e| e.to_string())?;
    Ok(doc.into_parsed())
}

#[derive(Debug, Deserialize)]
struct XmlFattura {
    #[serde(rename = "FatturaElettronicaHeader")]
    header: Option<XmlHeader>,
    #[serde(rename = "FatturaElettronicaBody", default)]
    bodies: Vec<XmlBody>,
}

#[derive(Debug, Deserialize)]
struct XmlHeader {
    #[serde(rename = "DatiTrasmissione")]
    trasmissione: Option<XmlTrasmissione>,
    #[serde(rename = "CedentePrestatore")]
    cedente: Option<XmlParty>,
    #[serde(rename = "CessionarioCommittente")]
    cessionario: Option<XmlParty>,
}

#[derive(Debug, Deserialize)]
struct XmlTrasmissione {
    #[serde(rename = "IdTrasmittente")]
    id_trasmittente: Option<XmlIdFiscale>,
    #[serde(rename = "ProgressivoInvio")]
    progressivo_invio: Option<String>,
    #[serde(rename = "FormatoTrasmissione")]
    formato_trasmissione: Option<String>,
    #[serde(rename = "CodiceDestinatario")]
    codice_destinatario: Option<String>,
    #[serde(rename = "PECDestinatario")]
    pec_destinatario: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlIdFiscale {
    #[serde(rename = "IdPaese")]
    id_paese: Option<String>,
    #[serde(rename = "IdCodice")]
    id_codice: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlParty {
    #[serde(rename = "DatiAnagrafici")]
    dati_anagrafici: Option<XmlDatiAnagrafici>,
    #[serde(rename = "Sede")]
    sede: Option<XmlSede>,
    #[serde(rename = "Contatti")]
    contatti: Option<XmlContatti>,
}

#[derive(Debug, Deserialize)]
struct XmlDatiAnagrafici {
    #[serde(rename = "IdFiscaleIVA")]
    id_fiscale_iva: Option<XmlIdFiscale>,
    #[serde(rename = "CodiceFiscale")]
    codice_fiscale: Option<String>,
    #[serde(rename = "Anagrafica")]
    anagrafica: Option<XmlAnagrafica>,
}

#[derive(Debug, Deserialize)]
struct XmlAnagrafica {
    #[serde(rename = "Denominazione")]
    denominazione: Option<String>,
    #[serde(rename = "Nome")]
    nome: Option<String>,
    #[serde(rename = "Cognome")]
    cognome: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlSede {
    #[serde(rename = "Indirizzo")]
    indirizzo: Option<String>,
    #[serde(rename = "CAP")]
    cap: Option<String>,
    #[serde(rename = "Comune")]
    comune: Option<String>,
    #[serde(rename = "Provincia")]
    provincia: Option<String>,
    #[serde(rename = "Nazione")]
    nazione: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlContatti {
    #[serde(rename = "Email")]
    email: Option<String>,
    #[serde(rename = "PEC")]
    pec: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlBody {
    #[serde(rename = "DatiGenerali")]
    dati_generali: Option<XmlDatiGenerali>,
    #[serde(rename = "DatiBeniServizi")]
    dati_beni_servizi: Option<XmlBeniServizi>,
    #[serde(rename = "DatiPagamento", default)]
    dati_pagamento: Vec<XmlDatiPagamento>,
    #[serde(rename = "Allegati", default)]
    allegati: Vec<XmlAllegato>,
}

#[derive(Debug, Deserialize)]
struct XmlDatiGenerali {
    #[serde(rename = "DatiGeneraliDocumento")]
    documento: Option<XmlDatiGeneraliDocumento>,
    #[serde(rename = "DatiDDT", default)]
    ddt: Vec<XmlDdt>,
}

#[derive(Debug, Deserialize)]
struct XmlDatiGeneraliDocumento {
    #[serde(rename = "TipoDocumento")]
    tipo_documento: Option<String>,
    #[serde(rename = "Divisa")]
    divisa: Option<String>,
    #[serde(rename = "Data")]
    data: Option<String>,
    #[serde(rename = "Numero")]
    numero: Option<String>,
    #[serde(rename = "ImportoTotaleDocumento")]
    importo_totale_documento: Option<String>,
    #[serde(rename = "Arrotondamento")]
    arrotondamento: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlDdt {
    #[serde(rename = "NumeroDDT")]
    numero: Option<String>,
    #[serde(rename = "DataDDT")]
    data: Option<String>,
    #[serde(rename = "RiferimentoNumeroLinea", default)]
    line_refs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct XmlBeniServizi {
    #[serde(rename = "DettaglioLinee", default)]
    linee: Vec<XmlLinea>,
    #[serde(rename = "DatiRiepilogo", default)]
    riepiloghi: Vec<XmlRiepilogo>,
}

#[derive(Debug, Deserialize)]
struct XmlLinea {
    #[serde(rename = "NumeroLinea")]
    numero_linea: Option<String>,
    #[serde(rename = "CodiceArticolo")]
    codice_articolo: Option<XmlCodiceArticolo>,
    #[serde(rename = "Descrizione")]
    descrizione: Option<String>,
    #[serde(rename = "Quantita")]
    quantita: Option<String>,
    #[serde(rename = "UnitaMisura")]
    unita_misura: Option<String>,
    #[serde(rename = "PrezzoUnitario")]
    prezzo_unitario: Option<String>,
    #[serde(rename = "ScontoMaggiorazione")]
    sconto: Option<XmlSconto>,
    #[serde(rename = "PrezzoTotale")]
    prezzo_totale: Option<String>,
    #[serde(rename = "AliquotaIVA")]
    aliquota_iva: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlCodiceArticolo {
    #[serde(rename = "CodiceValore")]
    codice_valore: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlSconto {
    #[serde(rename = "Percentuale")]
    percentuale: Option<String>,
    #[serde(rename = "Importo")]
    importo: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlRiepilogo {
    #[serde(rename = "AliquotaIVA")]
    aliquota_iva: Option<String>,
    #[serde(rename = "Natura")]
    natura: Option<String>,
    #[serde(rename = "ImponibileImporto")]
    imponibile_importo: Option<String>,
    #[serde(rename = "Imposta")]
    imposta: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlDatiPagamento {
    #[serde(rename = "CondizioniPagamento")]
    condizioni: Option<String>,
    #[serde(rename = "DettaglioPagamento", default)]
    dettagli: Vec<XmlDettaglioPagamento>,
}

#[derive(Debug, Deserialize)]
struct XmlDettaglioPagamento {
    #[serde(rename = "ModalitaPagamento")]
    modalita: Option<String>,
    #[serde(rename = "DataScadenzaPagamento")]
    data_scadenza: Option<String>,
    #[serde(rename = "ImportoPagamento")]
    importo: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlAllegato {
    #[serde(rename = "NomeAttachment")]
    nome: Option<String>,
    #[serde(rename = "AlgoritmoCompressione")]
    compressione: Option<String>,
    #[serde(rename = "FormatoAttachment")]
    formato: Option<String>,
    #[serde(rename = "DescrizioneAttachment")]
    descrizione: Option<String>,
    #[serde(rename = "Attachment")]
    attachment: Option<String>,
}

impl XmlFattura {
    fn into_parsed(self) -> ParsedFile {
        let mut out = ParsedFile {
            tier: ParseTier::Strict,
            ..Default::default()
        };

        if let Some(header) = self.header {
            if let Some(t) = header.trasmissione {
                out.transmission = RawTransmission {
                    id_paese: t.id_trasmittente.as_ref().and_then(|i| i.id_paese.clone()),
                    id_codice: t.id_trasmittente.as_ref().and_then(|i| i.id_codice.clone()),
                    progressivo_invio: t.progressivo_invio,
                    formato: t.formato_trasmissione,
                    codice_destinatario: t.codice_destinatario,
                    pec_destinatario: t.pec_destinatario,
                };
            }
            out.supplier = header.cedente.map(XmlParty::into_raw);
            out.customer = header.cessionario.map(XmlParty::into_raw);
        }

        out.bodies = self.bodies.into_iter().map(XmlBody::into_raw).collect();
        out
    }
}

impl XmlParty {
    fn into_raw(self) -> RawParty {
        let mut raw = RawParty::default();
        if let Some(da) = self.dati_anagrafici {
            raw.vat_number = da.id_fiscale_iva.and_then(|i| i.id_codice);
            raw.fiscal_code = da.codice_fiscale;
            if let Some(a) = da.anagrafica {
                raw.denominazione = a.denominazione;
                raw.nome = a.nome;
                raw.cognome = a.cognome;
            }
        }
        if let Some(s) = self.sede {
            raw.indirizzo = s.indirizzo;
            raw.cap = s.cap;
            raw.comune = s.comune;
            raw.provincia = s.provincia;
            raw.nazione = s.nazione;
        }
        if let Some(c) = self.contatti {
            raw.email = c.email;
            raw.pec = c.pec;
        }
        raw
    }
}

impl XmlBody {
    fn into_raw(self) -> RawBody {
        let mut raw = RawBody::default();

        if let Some(dg) = self.dati_generali {
            if let Some(doc) = dg.documento {
                raw.tipo_documento = doc.tipo_documento;
                raw.divisa = doc.divisa;
                raw.data = doc.data;
                raw.numero = doc.numero;
                raw.importo_totale = doc.importo_totale_documento;
                raw.arrotondamento = doc.arrotondamento;
            }
            raw.ddt = dg
                .ddt
                .into_iter()
                .map(|d| RawDdt {
                    numero: d.numero,
                    data: d.data,
                    line_refs: d.line_refs,
                })
                .collect();
        }

        if let Some(bs) = self.dati_beni_servizi {
            raw.lines = bs
                .linee
                .into_iter()
                .map(|l| RawLine {
                    numero_linea: l.numero_linea,
                    descrizione: l.descrizione,
                    quantita: l.quantita,
                    unita_misura: l.unita_misura,
                    prezzo_unitario: l.prezzo_unitario,
                    sconto_percentuale: l.sconto.as_ref().and_then(|s| s.percentuale.clone()),
                    sconto_importo: l.sconto.as_ref().and_then(|s| s.importo.clone()),
                    prezzo_totale: l.prezzo_totale,
                    aliquota_iva: l.aliquota_iva,
                    codice_articolo: l.codice_articolo.and_then(|c| c.codice_valore),
                })
                .collect();
            raw.riepiloghi = bs
                .riepiloghi
                .into_iter()
                .map(|r| RawVat {
                    aliquota_iva: r.aliquota_iva,
                    imponibile: r.imponibile_importo,
                    imposta: r.imposta,
                    natura: r.natura,
                })
                .collect();
        }

        for dp in self.dati_pagamento {
            for det in dp.dettagli {
                raw.pagamenti.push(RawPayment {
                    condizioni: dp.condizioni.clone(),
                    data_scadenza: det.data_scadenza,
                    importo: det.importo,
                    modalita: det.modalita,
                });
            }
        }

        raw.allegati = self
            .allegati
            .into_iter()
            .map(|a| RawAttachment {
                nome: a.nome,
                descrizione: a.descrizione,
                formato: a.formato,
                compressione: a.compressione,
                attachment: a.attachment,
            })
            .collect();

        raw
    }
}
