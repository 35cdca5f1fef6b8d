//! Best-effort CAdES envelope unwrapping via an external `openssl`
//! process, behind a narrow interface so the pipeline stays fully
//! testable without the binary present.
//!
//! Verification is not required — payload extraction is. The caller
//! falls through to a pure byte-scan decoder when this path fails, so
//! every failure here is reported as a plain string, never an abort.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::time::Instant;

use crate::core::PipelineConfig;

/// Outcome of the external verification process.
#[derive(Debug)]
pub struct VerifyOutput {
    /// Payload written to stdout.
    pub payload: Vec<u8>,
    /// Whether the process exited successfully (signature verified).
    pub exit_ok: bool,
    /// Captured stderr, for diagnostics.
    pub stderr: String,
}

/// Run `openssl smime -verify -noverify -inform DER` over the envelope
/// bytes under a hard timeout. On expiry the process is killed so a
/// hung subprocess can never stall a batch.
pub fn verify_via_process(der: &[u8], config: &PipelineConfig) -> Result<VerifyOutput, String> {
    let mut child = Command::new(&config.openssl_path)
        .args(["smime", "-verify", "-noverify", "-inform", "DER"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("spawn {}: {e}", config.openssl_path.display()))?;

    // Pipes are drained on separate threads; a payload larger than the
    // pipe buffer would otherwise deadlock the child against the poll
    // loop below.
    let mut stdin = child.stdin.take().ok_or("no stdin handle")?;
    let input = der.to_vec();
    let writer = std::thread::spawn(move || {
        let _ = stdin.write_all(&input);
    });

    let mut stdout = child.stdout.take().ok_or("no stdout handle")?;
    let out_reader = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stdout.read_to_end(&mut buf);
        buf
    });

    let mut stderr = child.stderr.take().ok_or("no stderr handle")?;
    let err_reader = std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = stderr.read_to_string(&mut buf);
        buf
    });

    let deadline = Instant::now() + config.verify_timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = writer.join();
                    let _ = out_reader.join();
                    let _ = err_reader.join();
                    return Err(format!(
                        "verification process timed out after {:?} and was killed",
                        config.verify_timeout
                    ));
                }
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
            Err(e) => return Err(format!("wait failed: {e}")),
        }
    };

    let _ = writer.join();
    let payload = out_reader.join().unwrap_or_default();
    let captured_stderr = err_reader.join().unwrap_or_default();

    if payload.is_empty() {
        return Err(format!(
            "process produced no payload (exit: {status}, stderr: {})",
            captured_stderr.trim()
        ));
    }

    Ok(VerifyOutput {
        payload,
        exit_ok: status.success(),
        stderr: captured_stderr,
    })
}
