//! Core data types shared across the library.
//!
//! This module defines the lookup-side data (WHOIS records, verdicts,
//! recent searches) and the classifier policy that tunes ambiguous verdicts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw WHOIS text returned by a fetcher.
///
/// The text is opaque: it may be a registry reply or a human-readable error
/// produced by the fetcher itself. Downstream code treats both the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhoisRecord {
    /// The domain this record was fetched for
    pub domain: String,

    /// Raw multi-line text
    pub text: String,

    /// Set when the text describes a fetch failure rather than a registry reply.
    /// Only used for logging.
    pub transport_error: bool,
}

impl WhoisRecord {
    /// Record holding a registry reply.
    pub fn reply<D: Into<String>, T: Into<String>>(domain: D, text: T) -> Self {
        Self {
            domain: domain.into(),
            text: text.into(),
            transport_error: false,
        }
    }

    /// Record holding a fetch failure rendered as text.
    pub fn failure<D: Into<String>, T: Into<String>>(domain: D, text: T) -> Self {
        Self {
            domain: domain.into(),
            text: text.into(),
            transport_error: true,
        }
    }
}

/// Presumed registration status of a domain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Domain appears to be free for registration
    #[serde(rename = "available")]
    Available,

    /// Domain appears to be registered
    #[serde(rename = "registered")]
    Registered,

    /// Status could not be determined
    #[serde(rename = "unknown")]
    Unknown,
}

impl Verdict {
    pub fn is_available(self) -> bool {
        self == Verdict::Available
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Available => write!(f, "AVAILABLE"),
            Verdict::Registered => write!(f, "REGISTERED"),
            Verdict::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl std::str::FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "available" | "free" => Ok(Verdict::Available),
            "registered" | "taken" => Ok(Verdict::Registered),
            "unknown" => Ok(Verdict::Unknown),
            other => Err(format!(
                "invalid verdict '{}', use available/registered/unknown",
                other
            )),
        }
    }
}

/// Verdicts the classifier falls back to when no rule is conclusive.
///
/// The defaults reproduce the long-standing behavior: optimistic for ambiguous
/// `.com`/`.net` replies, pessimistic for every other TLD, and registry errors
/// never reported as available.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassifierPolicy {
    /// Verdict for a `.com`/`.net` reply that matched no rule
    pub com_net_default: Verdict,

    /// Verdict for a reply of any other TLD that matched no rule
    pub other_default: Verdict,

    /// Verdict when a non-`.com`/`.net` reply looks like an error or rate limit
    pub on_error: Verdict,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            com_net_default: Verdict::Available,
            other_default: Verdict::Registered,
            on_error: Verdict::Registered,
        }
    }
}

/// One entry in the recent-search log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecentSearch {
    pub user_id: i64,
    pub domain: String,
    pub timestamp: DateTime<Utc>,
}

/// Format a timestamp the way every bot message shows it.
pub fn display_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}
