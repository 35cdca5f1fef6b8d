//! # fatturapa
//!
//! Ingestion pipeline for Italian electronic invoices (FatturaPA):
//! raw bytes — plain XML or CAdES-BES `.p7m` signed envelopes — in,
//! validated [`DocumentBody`](core::DocumentBody) records out.
//!
//! Inputs from the SDI (Sistema di Interscambio) are adversarial in
//! practice: mis-declared encodings, bytes stripped mid-transfer,
//! non-ASCII garbage inside element names, truncated buffers. The
//! pipeline therefore favours maximal recoverability over strict
//! conformance rejection: every repair and fallback is recorded on the
//! per-file [`Diagnostic`](core::Diagnostic), and documents that deviate
//! from the Agenzia delle Entrate technical rules are imported with
//! warnings rather than refused.
//!
//! All monetary values use [`rust_decimal::Decimal`] — never floating
//! point.
//!
//! ## Stages
//!
//! ```text
//! bytes -> envelope -> sanitize -> encoding -> parser (strict|lenient) -> mapping -> classify
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use fatturapa::core::PipelineConfig;
//! use fatturapa::pipeline::ingest_file;
//!
//! let config = PipelineConfig::default();
//! let report = ingest_file("IT01234567890_00001.xml", &config);
//! for entry in &report.entries {
//!     println!("{:?} {:?}", entry.outcome, entry.document.as_ref().map(|d| &d.number));
//! }
//! ```

pub mod classify;
pub mod core;
pub mod diagnostics;
pub mod encoding;
pub mod envelope;
pub mod mapping;
pub mod parser;
pub mod pipeline;
pub mod sanitize;

pub use crate::core::*;
