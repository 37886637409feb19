//! Prompts for the two model-backed capabilities.
//!
//! Keeping every prompt here means wording changes touch one file and unit
//! tests can inspect the exact text sent to a model without a live endpoint.

/// Instructions for extracting the Confirmation Note schema from OCR text.
///
/// Field order and JSON keys match [`crate::fields::CnField::ALL`].
pub const EXTRACTION_PROMPT: &str = r#"Extract the following fields from this Confirmation Note (CN) document:

- Is it a CN?: Boolean - Is this a Confirmation Note? (Yes/No/True/False)
- Operation Type: Type of transaction operation (e.g., Purchase, Redemption, Switch, Subscription)
- Is it a Multiseries?: Boolean - Is this a multiseries transaction? (Yes/No/True/False)
- Currency: Transaction currency code (e.g., USD, EUR, GBP, CHF)
- Gross Amount: Gross transaction amount (numeric value)
- Net Amount: Net transaction amount (numeric value)
- Units: Number of units/shares (numeric value)
- Equalization: Equalization amount (numeric value)
- Fees: Total fees charged (numeric value)
- NAV price: Net Asset Value price per unit (numeric value)
- NAV date: NAV date (format: YYYY-MM-DD or DD/MM/YYYY)
- Settlement Date: Settlement date (format: YYYY-MM-DD or DD/MM/YYYY)"#;

/// System prompt for page transcription by a vision model.
pub const OCR_SYSTEM_PROMPT: &str = r#"You are an OCR engine. Transcribe every piece of text visible in the page image.

Rules:
- Output plain text only, one visual line per output line, in reading order
- Keep numbers, currency codes, dates and punctuation exactly as printed
- Keep table cells on the same line separated by two spaces
- Do NOT summarise, translate, explain or add any text of your own
- Output nothing for a blank page"#;

/// Cut `text` to at most `max_chars` characters, on a character boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Build the full extraction prompt for one document.
///
/// `schema` lists the JSON keys the reply must contain; `text` is truncated
/// to `max_chars` characters.
pub fn extraction_prompt(text: &str, schema: &[&str], max_chars: usize) -> String {
    format!(
        "{EXTRACTION_PROMPT}\n\n\
Return as JSON with keys: {keys}\n\n\
If a field is not found, use null.\n\n\
Document text:\n---\n{body}\n---\n\n\
Respond with ONLY valid JSON, no other text:",
        keys = schema.join(", "),
        body = truncate_chars(text, max_chars),
    )
}

/// Per-page user instruction naming the expected languages.
pub fn ocr_user_prompt(languages: &[String]) -> String {
    if languages.is_empty() {
        "Transcribe this page.".to_string()
    } else {
        format!(
            "Transcribe this page. Expected language(s): {}.",
            languages.join(", ")
        )
    }
}
