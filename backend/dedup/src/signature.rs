//! Question fingerprints for near-duplicate detection.
//!
//! A signature is not a cryptographic identity: two questions that differ only
//! in hex literals or numbers collapse onto the same value.

use once_cell::sync::Lazy;
use regex::Regex;

/// Length of a signature in hex characters.
pub const SIGNATURE_LEN: usize = 12;

static HEX_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"0x[a-fA-F0-9]+").unwrap());
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
/// Everything except CJK ideographs, word characters and whitespace.
static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\x{4e00}-\x{9fa5}\w\s]").unwrap());

/// Hex digits in an address literal.
const ADDRESS_DIGITS: usize = 40;
/// Hex digits in a transaction hash literal.
const TX_HASH_DIGITS: usize = 64;

/// Normalize a question and hash it to a short fixed-width identifier.
pub fn signature_of(text: &str) -> String {
    let normalized = normalize(text);
    let digest = md5::compute(normalized.as_bytes());
    let mut hex = format!("{digest:x}");
    hex.truncate(SIGNATURE_LEN);
    hex
}

/// The text that gets hashed: parameters replaced by placeholders and
/// punctuation stripped.
pub fn normalize(text: &str) -> String {
    let cleaned = HEX_LITERAL.replace_all(text, "[ADDRESS]");
    let cleaned = DIGITS.replace_all(&cleaned, "[NUMBER]");
    let cleaned = PUNCTUATION.replace_all(&cleaned, "");
    cleaned.trim().to_string()
}

/// Hex literals with exactly `digits` hex digits. Whole literals are
/// measured, so a hash never yields an address.
fn hex_literals(text: &str, digits: usize) -> Vec<String> {
    HEX_LITERAL
        .find_iter(text)
        .filter(|m| m.as_str().len() == digits + 2)
        .map(|m| m.as_str().to_string())
        .collect()
}

pub fn extract_addresses(text: &str) -> Vec<String> {
    hex_literals(text, ADDRESS_DIGITS)
}

pub fn extract_tx_hashes(text: &str) -> Vec<String> {
    hex_literals(text, TX_HASH_DIGITS)
}
