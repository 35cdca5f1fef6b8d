//! Diagnostic plumbing: content hashing and the failure dump sink.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// SHA-256 of the raw input bytes, lowercase hex. Computed before any
/// sanitization so identical inputs always hash identically.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{digest:x}")
}

/// Writes failed payloads to a quarantine directory for offline triage.
///
/// File names embed a content-hash prefix, so re-ingesting the same
/// broken file overwrites its previous dump instead of accumulating
/// duplicates, while distinct contents under one source name never
/// collide.
#[derive(Debug, Clone)]
pub struct DumpSink {
    dir: PathBuf,
}

impl DumpSink {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Persist `bytes` and return the dump path.
    pub fn dump(&self, source_name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let stem = sanitize_stem(source_name);
        let prefix = &content_hash(bytes)[..12];
        let path = self.dir.join(format!("{stem}.{prefix}.dump"));
        fs::write(&path, bytes)?;
        Ok(path)
    }
}

/// Reduce an arbitrary source name to a safe file stem.
fn sanitize_stem(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "payload".to_string());
    let mut stem: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        stem.push_str("payload");
    }
    stem
}
