//! Post-processing: deterministic cleanup of model output.
//!
//! Vision models transcribing a page and text models asked for JSON both
//! add artefacts the prompt told them not to: code fences around the
//! answer, CRLF line endings, zero-width characters copied from the PDF's
//! text layer. These rules remove them without touching content.

use once_cell::sync::Lazy;
use regex::Regex;

/// Clean one page transcript.
///
/// Rules (applied in order):
/// 1. Strip outer code fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Trim each line and drop blank lines
///
/// The result has one text line per output line and no trailing newline,
/// the shape the extractor expects when pages are joined with `\n`.
pub fn clean_transcript(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = normalise_line_endings(s);
    let s = remove_invisible_chars(&s);
    drop_blank_lines(&s)
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

/// Remove a single pair of fences wrapping the whole reply, if present.
pub fn strip_code_fences(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps.get(1).map_or(trimmed, |m| m.as_str()),
        None => trimmed,
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ──────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Drop blank lines ─────────────────────────────────────────────

fn drop_blank_lines(input: &str) -> String {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
