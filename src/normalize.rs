//! Phone and email canonicalization.
//!
//! Two contacts are duplicates under a dimension when their normalized
//! values are equal. Input that does not normalize simply has no key and
//! is left out of that dimension's grouping; nothing here returns an error.
//!
//! # Phone rules
//!
//! 1. Strip every non-digit character (`+`, spaces, dashes, parentheses).
//! 2. A 12-digit value starting with the `91` country code loses the prefix.
//! 3. The result must be exactly 10 digits starting with 6, 7, 8 or 9
//!    (Indian mobile range).
//!
//! | Raw | Key |
//! |-----|-----|
//! | `+91 98765-43210` | `9876543210` |
//! | `919876543210` | `9876543210` |
//! | `5876543210` | none |
//! | `12345` | none |

use crate::models::{Contact, DuplicateKind, NormalizedKey};

const COUNTRY_CODE: &str = "91";

/// Canonical 10-digit mobile number, or `None` when the input is not one.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    let local = if digits.len() == 12 && digits.starts_with(COUNTRY_CODE) {
        &digits[COUNTRY_CODE.len()..]
    } else {
        digits.as_str()
    };

    let valid = local.len() == 10 && matches!(local.as_bytes()[0], b'6'..=b'9');
    valid.then(|| local.to_string())
}

/// Trimmed, lowercased email, or `None` when blank.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    (!email.is_empty()).then_some(email)
}

/// The contact's key for `kind`, if its field normalizes.
pub fn normalized_key(contact: &Contact, kind: DuplicateKind) -> Option<NormalizedKey> {
    let value = match kind {
        DuplicateKind::Phone => contact.phone.as_deref().and_then(normalize_phone),
        DuplicateKind::Email => contact.email.as_deref().and_then(normalize_email),
    }?;
    Some(NormalizedKey { kind, value })
}

/// Spellings a mobile number is commonly stored under in the CRM.
///
/// The CRM's search filter matches the stored string exactly, so looking a
/// number up means searching each variant. Returns an empty list when `raw`
/// does not normalize.
pub fn phone_search_variants(raw: &str) -> Vec<String> {
    let Some(n) = normalize_phone(raw) else {
        return Vec::new();
    };
    let (head, tail) = n.split_at(5);

    let mut variants = vec![
        n.clone(),
        format!("91{n}"),
        format!("+91{n}"),
        format!("+91 {n}"),
        format!("+91-{n}"),
        format!("91-{n}"),
        format!("91 {n}"),
        format!("0{n}"),
        format!("{head}-{tail}"),
        format!("+91 {head}-{tail}"),
        format!("91-{head}-{tail}"),
        format!("+91-{head}-{tail}"),
    ];
    variants.sort();
    variants.dedup();
    variants
}
