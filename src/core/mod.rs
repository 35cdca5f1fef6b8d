//! Shared record types, error taxonomy, and pipeline configuration.
//!
//! Everything here is created fresh per input file, never mutated after
//! the pipeline hands it over — no state survives across files.

mod config;
mod error;
mod types;

pub use config::*;
pub use error::*;
pub use types::*;
