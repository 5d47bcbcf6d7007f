//! Naming and content-hash helpers

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

/// SHA-256 content hash, hex encoded.
pub type Checksum = String;

static SIMPLE_IDENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z_][a-z0-9_]*$").unwrap_or_else(|e| panic!("invalid ident regex: {e}"))
});

/// Compute the lowercase hex SHA-256 of content.
pub fn compute_checksum(content: &[u8]) -> Checksum {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Derive a default table name from a type name: `ProductReview` -> `product_review`.
pub fn snake_case(type_name: &str) -> String {
    let mut out = String::with_capacity(type_name.len() + 4);
    let chars: Vec<char> = type_name.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let prev_upper = i > 0 && chars[i - 1].is_uppercase();
            if i > 0 && (prev_lower || (prev_upper && next_lower)) && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// True if the identifier can be emitted without quoting.
pub fn is_simple_identifier(ident: &str) -> bool {
    SIMPLE_IDENT.is_match(ident)
}
