//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod retry;

use regex::Regex;
use std::sync::OnceLock;

/// Normalize a postal/location code for lookup and storage
///
/// Trims, removes inner whitespace and uppercases ASCII letters so that
/// `" sw1a 1aa"` and `"SW1A1AA"` resolve to the same key.
pub fn normalize_location_code(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Check that a location code is plausible (2-10 alphanumerics, dashes allowed)
pub fn is_valid_location_code(code: &str) -> bool {
    static LOCATION_RE: OnceLock<Regex> = OnceLock::new();

    let re = LOCATION_RE
        .get_or_init(|| Regex::new(r"^[A-Z0-9][A-Z0-9-]{1,9}$").expect("Invalid regex pattern"));

    re.is_match(&normalize_location_code(code))
}

/// Loose email shape check (`local@domain.tld`)
pub fn is_valid_email(email: &str) -> bool {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

    let re = EMAIL_RE.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]{2,}$").expect("Invalid regex pattern")
    });

    re.is_match(email.trim())
}

/// Extract the digits of a phone number, or `None` if it contains other symbols
///
/// Accepts the usual separators: `+ - . ( )` and spaces.
pub fn phone_digits(phone: &str) -> Option<String> {
    let mut digits = String::with_capacity(phone.len());
    for c in phone.trim().chars() {
        match c {
            '0'..='9' => digits.push(c),
            '+' | '-' | '.' | '(' | ')' | ' ' => {}
            _ => return None,
        }
    }
    Some(digits)
}

/// Truncate text to a maximum number of characters
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
