//! Content-addressed idempotency keys for news records.
//!
//! A DOI is the strongest natural key (it survives URL churn); URL+date is
//! the fallback for non-journal sources. The digest is truncated to 16 hex
//! characters: ~2^-64 collision probability, a deliberate, bounded risk in
//! exchange for compact storage.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Input is a tagged union on purpose: DOI-shaped input can never fall back
/// to URL hashing, and vice versa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdInput<'a> {
    Doi(&'a str),
    UrlDate { url: &'a str, news_date: &'a str },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UniqueIdError {
    #[error("invalid input: neither a usable DOI nor a usable URL was provided")]
    InvalidInput,
}

const DIGEST_LEN: usize = 16;

/// Derive the stable unique id for an item.
///
/// DOI path: trim, lowercase, strip a leading `doi:` prefix, hash, prefix
/// `doi-`. URL path: trim, lowercase, join with the news date using a
/// literal `|`, hash, prefix `url-`. Deterministic under whitespace and
/// casing variation of the inputs.
pub fn generate(input: IdInput<'_>) -> Result<String, UniqueIdError> {
    match input {
        IdInput::Doi(doi) => {
            let norm = normalize_doi(doi);
            if norm.is_empty() {
                return Err(UniqueIdError::InvalidInput);
            }
            Ok(format!("doi-{}", short_digest(&norm)))
        }
        IdInput::UrlDate { url, news_date } => {
            let u = url.trim().to_ascii_lowercase();
            if u.is_empty() {
                return Err(UniqueIdError::InvalidInput);
            }
            let keyed = format!("{}|{}", u, news_date.trim());
            Ok(format!("url-{}", short_digest(&keyed)))
        }
    }
}

fn normalize_doi(doi: &str) -> String {
    let t = doi.trim().to_ascii_lowercase();
    t.strip_prefix("doi:").unwrap_or(&t).trim().to_string()
}

fn short_digest(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..DIGEST_LEN].to_string()
}
