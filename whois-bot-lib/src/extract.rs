//! Line-based field extraction from WHOIS replies.
//!
//! WHOIS has no common schema, so extraction keeps every trimmed, non-blank
//! line that carries one of a few well-known field cues.

use regex::RegexSet;

/// Shown when no expiry line is present.
pub const NO_EXPIRY_FOUND: &str = "No expiration date information found in the WHOIS data.";

/// Shown when no name-server line is present.
pub const NO_DNS_FOUND: &str = "No DNS server information found in the WHOIS data.";

lazy_static::lazy_static! {
    static ref EXPIRY_CUES: RegexSet = RegexSet::new([
        r"(?i)expir(y|ation|es).*?date",
        r"(?i)registry\s?expiry\s?date",
        r"(?i)paid-till",
        r"(?i)valid\s?until",
        r"(?i)expiry",
        r"(?i)expires\s?on",
    ])
    .expect("expiry cues are valid");

    static ref DNS_CUES: RegexSet = RegexSet::new([
        r"(?i)name\s?servers?",
        r"(?i)nserver",
        r"(?i)dns",
    ])
    .expect("dns cues are valid");
}

/// Lines extracted from a reply, in original order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLines {
    pub lines: Vec<String>,
    placeholder: &'static str,
}

impl ExtractedLines {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The matched lines, or the "not found" placeholder when nothing matched.
    pub fn display_lines(&self) -> Vec<String> {
        if self.lines.is_empty() {
            vec![self.placeholder.to_string()]
        } else {
            self.lines.clone()
        }
    }
}

/// Extract expiration-date lines.
pub fn extract_expiry(text: &str) -> ExtractedLines {
    ExtractedLines {
        lines: matching_lines(text, &EXPIRY_CUES),
        placeholder: NO_EXPIRY_FOUND,
    }
}

/// Extract name-server lines.
pub fn extract_dns(text: &str) -> ExtractedLines {
    ExtractedLines {
        lines: matching_lines(text, &DNS_CUES),
        placeholder: NO_DNS_FOUND,
    }
}

fn matching_lines(text: &str, cues: &RegexSet) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && cues.is_match(line))
        .map(str::to_string)
        .collect()
}
