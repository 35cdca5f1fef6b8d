//! Byte-level repair of malformed FatturaPA markup, applied before any
//! parse attempt.
//!
//! The rules run in a fixed order and the whole pass is idempotent:
//! `sanitize(sanitize(x)) == sanitize(x)` for every byte buffer `x`.
//! Each rule that changed the buffer is recorded as a [`Repair`] so the
//! diagnostic trail shows exactly what was touched.

use crate::core::{Repair, SanitizedDocument};

/// Known truncated element names seen in SDI relay output, with their
/// repaired forms. Patterns include the closing `>` so an already-correct
/// name can never match.
const TRUNCATED_NAMES: &[(&[u8], &[u8])] = &[
    (b"</FatturaElettronic>", b"</FatturaElettronica>"),
    (b"</FatturaElettronicaBod>", b"</FatturaElettronicaBody>"),
    (b"</FatturaElettronicaHeade>", b"</FatturaElettronicaHeader>"),
    (b"</DatiRiepilog>", b"</DatiRiepilogo>"),
    (b"</DettaglioLine>", b"</DettaglioLinee>"),
    (b"</DatiBeniServiz>", b"</DatiBeniServizi>"),
    (b"</DatiPagament>", b"</DatiPagamento>"),
];

/// Run the full ordered repair chain over a raw byte buffer.
///
/// One repair can expose another (whitespace stripped from a closing
/// tag can reveal a truncated name), so the chain iterates until the
/// buffer stops changing. Every rule either shrinks the buffer or
/// rewrites a pattern it can no longer match, so the loop always
/// settles; real inputs do so within two passes. The cap is a last
/// resort that should never trip.
pub fn sanitize(input: &[u8]) -> SanitizedDocument {
    let mut repairs: Vec<Repair> = Vec::new();
    let mut bytes = input.to_vec();

    let mut passes = 0usize;
    loop {
        let mut pass_repairs = Vec::new();
        let out = run_rules(bytes.clone(), &mut pass_repairs);
        let settled = out == bytes;
        bytes = out;
        for repair in pass_repairs {
            if !repairs.contains(&repair) {
                repairs.push(repair);
            }
        }
        if settled {
            break;
        }
        passes += 1;
        if passes >= 16 {
            tracing::debug!(passes, "sanitizer did not settle, giving up");
            break;
        }
    }

    SanitizedDocument { bytes, repairs }
}

fn run_rules(bytes: Vec<u8>, repairs: &mut Vec<Repair>) -> Vec<u8> {
    let bytes = strip_control_bytes(bytes, repairs);
    let bytes = strip_non_ascii_names(bytes, repairs);
    let bytes = collapse_closing_tags(bytes, repairs);
    let bytes = repair_truncated_names(bytes, repairs);
    let bytes = escape_bare_markup(bytes, repairs);
    close_unterminated_root(bytes, repairs)
}

/// Strip NUL and control bytes, keeping tab, newline and CR.
fn strip_control_bytes(bytes: Vec<u8>, repairs: &mut Vec<Repair>) -> Vec<u8> {
    let cleaned: Vec<u8> = bytes
        .iter()
        .copied()
        .filter(|&b| b >= 0x20 || b == b'\t' || b == b'\n' || b == b'\r')
        .collect();
    if cleaned.len() != bytes.len() {
        repairs.push(Repair::StrippedControlBytes);
    }
    cleaned
}

/// Element names must be pure ASCII; drop high bytes that appear in the
/// name portion of a tag (between `<` and the first whitespace or the
/// closing `>`). Attribute values and text content are left alone.
fn strip_non_ascii_names(bytes: Vec<u8>, repairs: &mut Vec<Repair>) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut in_name = false;
    let mut in_tag = false;
    let mut changed = false;

    for &b in &bytes {
        match b {
            b'<' if !in_tag => {
                in_tag = true;
                in_name = true;
            }
            b'>' if in_tag => {
                in_tag = false;
                in_name = false;
            }
            _ if in_name && b.is_ascii_whitespace() => in_name = false,
            _ if in_name && !b.is_ascii() => {
                changed = true;
                continue;
            }
            _ => {}
        }
        out.push(b);
    }

    if changed {
        repairs.push(Repair::StrippedNonAsciiName);
    }
    out
}

/// Apply the fixed truncated-name substitution table.
///
/// A closing tag is only repaired when the matching full start tag is
/// present in the buffer; a document whose start tag is truncated the
/// same way is internally consistent and left alone.
fn repair_truncated_names(bytes: Vec<u8>, repairs: &mut Vec<Repair>) -> Vec<u8> {
    let mut out = bytes;
    for (broken, fixed) in TRUNCATED_NAMES {
        if !has_start_tag(&out, fixed) {
            continue;
        }
        let mut replaced = Vec::with_capacity(out.len());
        let mut i = 0;
        let mut hit = false;
        while i < out.len() {
            if out[i..].starts_with(broken) {
                replaced.extend_from_slice(fixed);
                i += broken.len();
                hit = true;
            } else {
                replaced.push(out[i]);
                i += 1;
            }
        }
        if hit {
            let name = String::from_utf8_lossy(fixed)
                .trim_matches(['<', '/', '>'])
                .to_string();
            repairs.push(Repair::RepairedTruncatedName(name));
        }
        out = replaced;
    }
    out
}

/// True when the buffer has a start tag exactly matching the element
/// name of a `</Name>` pattern (boundary-checked, so `<Name>` matches
/// but `<NameHeader>` does not).
fn has_start_tag(bytes: &[u8], close_pattern: &[u8]) -> bool {
    let name = &close_pattern[2..close_pattern.len() - 1];
    let mut i = 0;
    while i + 1 + name.len() < bytes.len() {
        if bytes[i] == b'<' && bytes[i + 1..].starts_with(name) {
            let after = bytes[i + 1 + name.len()];
            if after.is_ascii_whitespace() || after == b'>' || after == b'/' {
                return true;
            }
        }
        i += 1;
    }
    false
}

/// Collapse stray whitespace inside closing tags: `</ Foo >` → `</Foo>`.
fn collapse_closing_tags(bytes: Vec<u8>, repairs: &mut Vec<Repair>) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let mut changed = false;

    while i < bytes.len() {
        if bytes[i] == b'<' && i + 1 < bytes.len() && bytes[i + 1] == b'/' {
            // Copy "</", then everything up to ">" minus whitespace.
            out.extend_from_slice(b"</");
            i += 2;
            while i < bytes.len() && bytes[i] != b'>' {
                if bytes[i].is_ascii_whitespace() {
                    changed = true;
                } else {
                    out.push(bytes[i]);
                }
                i += 1;
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    if changed {
        repairs.push(Repair::CollapsedClosingTag);
    }
    out
}

/// Escape bare `<` and `&` in text content, never inside tag syntax.
///
/// A `<` followed by a name-start character, `/`, `!` or `?` is treated
/// as tag syntax; an `&` that begins a well-formed entity reference is
/// left alone, so the rule is stable under repeated application.
fn escape_bare_markup(bytes: Vec<u8>, repairs: &mut Vec<Repair>) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut in_tag = false;
    let mut changed = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'<' if !in_tag => {
                if opens_tag(&bytes[i + 1..]) {
                    in_tag = true;
                    out.push(b);
                } else {
                    out.extend_from_slice(b"&lt;");
                    changed = true;
                }
            }
            b'>' if in_tag => {
                in_tag = false;
                out.push(b);
            }
            b'&' if !in_tag => {
                if starts_entity(&bytes[i..]) {
                    out.push(b);
                } else {
                    out.extend_from_slice(b"&amp;");
                    changed = true;
                }
            }
            _ => out.push(b),
        }
        i += 1;
    }

    if changed {
        repairs.push(Repair::EscapedBareMarkup);
    }
    out
}

fn opens_tag(rest: &[u8]) -> bool {
    matches!(
        rest.first(),
        Some(&c) if c.is_ascii_alphabetic() || matches!(c, b'_' | b'/' | b'!' | b'?')
    )
}

/// True when the slice starting at `&` is a well-formed entity
/// reference: named (`&amp;` …), decimal or hex character reference.
fn starts_entity(rest: &[u8]) -> bool {
    let Some(semi) = rest.iter().take(12).position(|&b| b == b';') else {
        return false;
    };
    let body = &rest[1..semi];
    match body {
        b"amp" | b"lt" | b"gt" | b"apos" | b"quot" => true,
        [b'#', b'x', hex @ ..] => !hex.is_empty() && hex.iter().all(u8::is_ascii_hexdigit),
        [b'#', digits @ ..] => !digits.is_empty() && digits.iter().all(u8::is_ascii_digit),
        _ => false,
    }
}

/// Append a synthetic close for the root element when the buffer ends
/// mid-document.
fn close_unterminated_root(bytes: Vec<u8>, repairs: &mut Vec<Repair>) -> Vec<u8> {
    let Some(root) = root_name(&bytes) else {
        return bytes;
    };

    let close: Vec<u8> = [b"</", root.as_slice(), b">"].concat();
    if contains(&bytes, &close) {
        return bytes;
    }

    let mut out = bytes;
    // A buffer cut off inside a tag would glue the close onto it.
    if tag_left_open(&out) {
        out.push(b'>');
    }
    out.extend_from_slice(&close);
    repairs.push(Repair::ClosedUnterminatedRoot);
    out
}

/// Qualified name of the first start tag, skipping prolog and comments.
fn root_name(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'<' {
            match bytes.get(i + 1) {
                Some(&b'?') | Some(&b'!') => {
                    // Skip to the end of the prolog/comment.
                    while i < bytes.len() && bytes[i] != b'>' {
                        i += 1;
                    }
                }
                Some(&c) if c.is_ascii_alphabetic() || c == b'_' => {
                    let start = i + 1;
                    let mut end = start;
                    while end < bytes.len() && is_name_byte(bytes[end]) {
                        end += 1;
                    }
                    return Some(bytes[start..end].to_vec());
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b':' | b'_' | b'-' | b'.')
}

fn tag_left_open(bytes: &[u8]) -> bool {
    for &b in bytes.iter().rev() {
        match b {
            b'>' => return false,
            b'<' => return true,
            _ => {}
        }
    }
    false
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
