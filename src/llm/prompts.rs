//! Default LLM prompts.

/// Prompt for turning a noisy candidate (or a page of OCR text) into one
/// mailing address. `{content}` is replaced with the payload.
pub const DEFAULT_ADDRESS_PROMPT: &str = r#"You are reading text produced by OCR of a scanned lien or lis pendens filing. Find the street address of the property the filing concerns.

Rules:
- Return exactly one line in the form: STREET, CITY, STATE ZIP
- Leave out person names, lender names, lot/block/plat references, book and page numbers.
- Correct obvious OCR mistakes in street suffixes and city names only.
- If there is no property address in the text, return an empty response.

Text:
{content}

Respond with ONLY the address line or nothing. No formatting or preamble."#;
