//! Utility functions for domain processing and validation.
//!
//! This module contains helper functions for domain name validation,
//! normalization and TLD extraction used throughout the library.

use crate::error::BotError;
use regex::Regex;

lazy_static::lazy_static! {
    /// One or more `label.` groups followed by an alphabetic TLD.
    static ref DOMAIN_RE: Regex =
        Regex::new(r"^([a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,63}$")
            .expect("domain regex is valid");
}

/// Check whether a string is syntactically a domain name.
///
/// Every label is 1-63 ASCII letters, digits or hyphens and may not start or
/// end with a hyphen. The final label (the TLD) is alphabetic and at least
/// two characters long. Matching is case-insensitive.
pub fn is_valid_domain(domain: &str) -> bool {
    DOMAIN_RE.is_match(domain)
}

/// Trim and lower-case raw user input.
pub fn normalize_domain(input: &str) -> String {
    input.trim().to_lowercase()
}

/// Validate a domain, returning a descriptive error for malformed input.
pub fn validate_domain(domain: &str) -> Result<(), BotError> {
    if domain.trim().is_empty() {
        return Err(BotError::invalid_domain(
            domain,
            "Domain name cannot be empty",
        ));
    }

    if !domain.contains('.') {
        return Err(BotError::invalid_domain(domain, "Domain name has no TLD"));
    }

    if !is_valid_domain(domain) {
        return Err(BotError::invalid_domain(
            domain,
            "Domain name contains invalid labels",
        ));
    }

    Ok(())
}

/// Extract the TLD from a domain: everything after the last dot.
///
/// Returns an empty string when the domain has no dot.
pub fn extract_tld(domain: &str) -> String {
    match domain.rsplit_once('.') {
        Some((_, tld)) => tld.to_lowercase(),
        None => String::new(),
    }
}
