//! End-to-end ingestion: extraction, sanitization, decoding, parsing,
//! mapping, and outcome classification for one file or a whole batch.
//!
//! Per-file isolation is the core contract: a file that fails at any
//! stage produces an `Error` entry with diagnostics (and optionally a
//! quarantine dump) and never affects the files around it.

use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::classify::{self, FileClass};
use crate::core::{
    ConformanceWarning, Diagnostic, DocumentBody, IngestError, Outcome, PipelineConfig, Repair,
    Stage, TransmissionHeader,
};
use crate::diagnostics::{DumpSink, content_hash};
use crate::{encoding, envelope, mapping, parser, sanitize};

/// One outcome-bearing entry: a file yields one entry per document
/// body, or a single entry when it is skipped or fails.
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub outcome: Outcome,
    pub document: Option<DocumentBody>,
    pub diagnostic: Diagnostic,
}

/// Everything produced for one input file.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub file_name: String,
    /// The file's shared `DatiTrasmissione` header; `None` for skipped
    /// and failed files.
    pub header: Option<TransmissionHeader>,
    pub entries: Vec<ReportEntry>,
}

impl FileReport {
    /// True when any entry failed outright.
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|e| e.outcome == Outcome::Error)
    }
}

/// Ingest a single in-memory payload.
pub fn ingest_bytes(file_name: &str, bytes: &[u8], config: &PipelineConfig) -> FileReport {
    let _span = tracing::info_span!("ingest", file = file_name).entered();

    let mut diag = Diagnostic {
        content_hash: Some(content_hash(bytes)),
        envelope: Some(envelope::detect(bytes).kind),
        ..Diagnostic::default()
    };

    let extraction = match envelope::extract(bytes, config) {
        Ok(e) => e,
        Err(err) => return failed(file_name, bytes, diag, err, config),
    };
    diag.stage = Some(Stage::Extraction);
    diag.envelope = Some(extraction.kind);
    diag.method = Some(extraction.method);
    // Dedup key for the orchestrator: the payload, not the wrapper, so
    // the same invoice re-delivered under a fresh signature still matches.
    diag.content_hash = Some(content_hash(&extraction.xml));

    let sanitized = sanitize::sanitize(&extraction.xml);
    diag.stage = Some(Stage::Sanitization);
    diag.repairs = sanitized.repairs.clone();

    let decoded = match encoding::resolve(&sanitized) {
        Ok(d) => d,
        Err(err) => return failed(file_name, bytes, diag, err, config),
    };
    diag.stage = Some(Stage::Encoding);
    diag.encoding = Some(decoded.encoding);

    match classify::classify_root(&decoded.text) {
        FileClass::Invoice => {}
        FileClass::Sidecar => {
            debug!(
                root = classify::root_local_name(&decoded.text),
                "metadata or notification sidecar, skipping"
            );
            return FileReport {
                file_name: file_name.to_string(),
                header: None,
                entries: vec![ReportEntry {
                    outcome: Outcome::Skipped,
                    document: None,
                    diagnostic: diag,
                }],
            };
        }
        // Unknown roots fall through to the parser so the failure is
        // reported as an error instead of a silent skip.
        FileClass::Unknown => {}
    }

    let parsed = match parser::parse(&decoded.text) {
        Ok(p) => p,
        Err(err) => return failed(file_name, bytes, diag, err, config),
    };
    diag.stage = Some(Stage::Parsing);
    diag.tier = Some(parsed.tier);

    let mapped = match mapping::map_file(&parsed, config) {
        Ok(m) => m,
        Err(err) => return failed(file_name, bytes, diag, err, config),
    };
    diag.stage = Some(Stage::Mapping);

    let pipeline_warnings = pipeline_warnings(&sanitized.repairs, &decoded, extraction.forced_close);
    let degrade = extraction.forced_close;

    let entries = mapped
        .documents
        .into_iter()
        .map(|mut document| {
            document.warnings.extend(pipeline_warnings.iter().cloned());
            if degrade {
                document.non_conformant = true;
            }
            let outcome = classify::outcome_for(&document);
            let mut diagnostic = diag.clone();
            diagnostic.warnings = document.warnings.clone();
            ReportEntry {
                outcome,
                document: Some(document),
                diagnostic,
            }
        })
        .collect::<Vec<_>>();

    info!(
        documents = entries.len(),
        tier = ?parsed.tier,
        "file ingested"
    );

    FileReport {
        file_name: file_name.to_string(),
        header: Some(mapped.header),
        entries,
    }
}

/// Ingest one file from disk.
pub fn ingest_file(path: impl AsRef<Path>, config: &PipelineConfig) -> FileReport {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    match fs::read(path) {
        Ok(bytes) => ingest_bytes(&file_name, &bytes, config),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "read failed");
            let err = IngestError::Io(err);
            let diag = Diagnostic {
                stage: Some(err.stage()),
                error: Some(err.to_string()),
                ..Diagnostic::default()
            };
            FileReport {
                file_name,
                header: None,
                entries: vec![ReportEntry {
                    outcome: Outcome::Error,
                    document: None,
                    diagnostic: diag,
                }],
            }
        }
    }
}

/// Ingest many files in parallel. Reports come back in input order and
/// every file is isolated from its neighbors' failures.
pub fn ingest_batch(paths: &[PathBuf], config: &PipelineConfig) -> Vec<FileReport> {
    paths
        .par_iter()
        .map(|path| ingest_file(path, config))
        .collect()
}

/// Recursively collect ingestible files (`.xml`, `.p7m`, any case)
/// under `dir`, sorted for deterministic batch order.
pub fn scan_source_dir(dir: impl AsRef<Path>) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir.as_ref()) {
        let entry = entry.map_err(std::io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let eligible = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("xml") || e.eq_ignore_ascii_case("p7m"));
        if eligible {
            paths.push(entry.into_path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Warnings that originate from pipeline stages rather than field
/// mapping, attached to every document of the file.
fn pipeline_warnings(
    repairs: &[Repair],
    decoded: &encoding::DecodedDocument,
    forced_close: bool,
) -> Vec<ConformanceWarning> {
    let mut warnings = Vec::new();
    if decoded.used_fallback() {
        warnings.push(ConformanceWarning::new(
            "encoding",
            format!("document decoded via {} fallback", decoded.encoding.name()),
        ));
    }
    if forced_close {
        warnings.push(ConformanceWarning::new(
            "envelope",
            "root element was unterminated and closed synthetically",
        ));
    }
    if !repairs.is_empty() {
        warnings.push(ConformanceWarning::new(
            "sanitizer",
            format!("{} byte-level repair(s) applied", repairs.len()),
        ));
    }
    warnings
}

/// Build the error entry for a failed file, dumping the original bytes
/// when a dump directory is configured.
fn failed(
    file_name: &str,
    bytes: &[u8],
    mut diag: Diagnostic,
    err: IngestError,
    config: &PipelineConfig,
) -> FileReport {
    warn!(stage = ?err.stage(), error = %err, "ingestion failed");
    diag.stage = Some(err.stage());
    diag.error = Some(err.to_string());
    if let Some(dir) = &config.dump_dir {
        match DumpSink::new(dir).and_then(|sink| sink.dump(file_name, bytes)) {
            Ok(path) => diag.dump_ref = Some(path),
            Err(io_err) => warn!(error = %io_err, "failed to write quarantine dump"),
        }
    }
    FileReport {
        file_name: file_name.to_string(),
        header: None,
        entries: vec![ReportEntry {
            outcome: Outcome::Error,
            document: None,
            diagnostic: diag,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_invoice() -> &'static str {
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>",
            "<p:FatturaElettronica versione=\"FPR12\" xmlns:p=\"urn:fatturapa\">",
            "<FatturaElettronicaHeader><DatiTrasmissione>",
            "<IdTrasmittente><IdPaese>IT</IdPaese><IdCodice>01234567890</IdCodice></IdTrasmittente>",
            "<ProgressivoInvio>00001</ProgressivoInvio><FormatoTrasmissione>FPR12</FormatoTrasmissione>",
            "<CodiceDestinatario>ABC1234</CodiceDestinatario></DatiTrasmissione>",
            "<CedentePrestatore><DatiAnagrafici>",
            "<IdFiscaleIVA><IdPaese>IT</IdPaese><IdCodice>01234567890</IdCodice></IdFiscaleIVA>",
            "<Anagrafica><Denominazione>Fornitore Srl</Denominazione></Anagrafica>",
            "</DatiAnagrafici></CedentePrestatore>",
            "<CessionarioCommittente><DatiAnagrafici>",
            "<CodiceFiscale>RSSMRA80A01H501U</CodiceFiscale>",
            "<Anagrafica><Nome>Mario</Nome><Cognome>Rossi</Cognome></Anagrafica>",
            "</DatiAnagrafici></CessionarioCommittente>",
            "</FatturaElettronicaHeader>",
            "<FatturaElettronicaBody><DatiGenerali><DatiGeneraliDocumento>",
            "<TipoDocumento>TD01</TipoDocumento><Divisa>EUR</Divisa>",
            "<Data>2024-06-15</Data><Numero>42</Numero>",
            "<ImportoTotaleDocumento>122.00</ImportoTotaleDocumento>",
            "</DatiGeneraliDocumento></DatiGenerali>",
            "<DatiBeniServizi><DettaglioLinee><NumeroLinea>1</NumeroLinea>",
            "<Descrizione>Consulenza</Descrizione><PrezzoUnitario>100.00</PrezzoUnitario>",
            "<PrezzoTotale>100.00</PrezzoTotale><AliquotaIVA>22.00</AliquotaIVA></DettaglioLinee>",
            "<DatiRiepilogo><AliquotaIVA>22.00</AliquotaIVA>",
            "<ImponibileImporto>100.00</ImponibileImporto><Imposta>22.00</Imposta>",
            "</DatiRiepilogo></DatiBeniServizi>",
            "</FatturaElettronicaBody></p:FatturaElettronica>",
        )
    }

    #[test]
    fn clean_invoice_imports_without_warnings() {
        let report = ingest_bytes(
            "fattura.xml",
            sample_invoice().as_bytes(),
            &PipelineConfig::default(),
        );
        assert_eq!(report.entries.len(), 1);
        let entry = &report.entries[0];
        assert_eq!(entry.outcome, Outcome::Imported);
        let doc = entry.document.as_ref().unwrap();
        assert!(doc.warnings.is_empty(), "unexpected: {:?}", doc.warnings);
        // Identity keys carry IdCodice alone; IdPaese is not prefixed.
        assert_eq!(doc.supplier.identity_key, "01234567890");
        assert_eq!(entry.diagnostic.stage, Some(Stage::Mapping));
    }

    #[test]
    fn sidecar_is_skipped_not_errored() {
        let report = ingest_bytes(
            "IT123_MT_001.xml",
            b"<?xml version=\"1.0\"?><MetadatiFattura><NomeFile>x</NomeFile></MetadatiFattura>",
            &PipelineConfig::default(),
        );
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].outcome, Outcome::Skipped);
        assert!(report.entries[0].diagnostic.error.is_none());
        // Skipped files carry the furthest stage they reached.
        assert_eq!(report.entries[0].diagnostic.stage, Some(Stage::Encoding));
    }

    #[test]
    fn garbage_bytes_error_with_diagnostics() {
        let report = ingest_bytes("junk.bin", &[0xde, 0xad, 0xbe, 0xef], &PipelineConfig::default());
        assert!(report.has_errors());
        let diag = &report.entries[0].diagnostic;
        assert!(diag.error.is_some());
        assert!(diag.content_hash.is_some());
    }
}
