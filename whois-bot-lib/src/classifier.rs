//! Availability classification of free-text WHOIS replies.
//!
//! Registries answer in wildly different formats, so the classifier runs a
//! TLD-dependent cascade of phrase checks. Rule groups are evaluated in order
//! and the first match decides the verdict.
//!
//! `.com` and `.net` get their own branch: Verisign replies for free domains
//! are terse, and ambiguous replies there are treated optimistically. Every
//! other TLD is treated pessimistically, and anything that looks like a
//! registry error or rate limit is never reported as available. The fallback
//! verdicts are configurable through [`ClassifierPolicy`].

use crate::types::{ClassifierPolicy, Verdict};
use crate::utils::extract_tld;
use std::fmt;
use tracing::debug;

/// Phrases that mean "free" in `.com`/`.net` replies.
const COM_NET_AVAILABLE_PATTERNS: &[&str] = &[
    "no match for",
    "domain not found",
    "not found: ",
    "no data found",
    "no match found for",
    "not found in database",
    "not registered",
    "no entries found",
];

/// Field markers that mean "registered" in `.com`/`.net` replies.
const COM_NET_REGISTERED_PATTERNS: &[&str] = &[
    "registrar:",
    "registration date:",
    "creation date:",
    "name server:",
];

const AVAILABLE_PATTERNS: &[&str] = &[
    "no match",
    "not found",
    "no entries found",
    "no data found",
    "domain not found",
    "domain name is not registered",
    "domain is available",
    "domain not registered",
    "domain status: available",
    "status: free",
    "status: available",
    "no object found",
    "domain not exist",
    "domain available",
    "available for registration",
    "availability: available",
    "query: no match",
];

const REGISTERED_PATTERNS: &[&str] = &[
    "creation date",
    "created:",
    "registrar:",
    "registrant",
    "registered on",
    "domain status: ok",
    "domain status: active",
    "status: ok",
    "status: active",
    "name server:",
];

/// Registry errors and rate limits. These must never read as "available".
const ERROR_PATTERNS: &[&str] = &[
    "quota exceeded",
    "too many requests",
    "connection refused",
    "timeout",
    "error",
];

const DOMAIN_NAME_FIELD: &str = "domain name: ";
const DOMAIN_STATUS_FIELD: &str = "domain status:";

/// Trimmed `.com`/`.net` replies shorter than this are treated as "free".
const COM_NET_SHORT_REPLY: usize = 100;

/// Trimmed replies of other TLDs shorter than this are treated as "free".
const SHORT_REPLY: usize = 50;

/// Replies of other TLDs with fewer non-blank lines are treated as "free".
const FEW_LINES: usize = 5;

/// The rule that decided a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// An "available" phrase was found
    AvailablePhrase(&'static str),
    /// A `domain name:` field names some other domain
    ForeignDomainNameField,
    /// A `domain name:` field names the queried domain
    ExactDomainNameField,
    /// A `domain status:` field without free/available wording
    ActiveDomainStatus,
    /// A "registered" phrase or field marker was found
    RegisteredPhrase(&'static str),
    /// An error or rate-limit phrase was found
    ErrorPhrase(&'static str),
    /// The trimmed reply is shorter than the branch threshold
    ShortReply { chars: usize },
    /// The reply has very few non-blank lines
    FewLines { lines: usize },
    /// Nothing matched; the policy fallback applied
    Fallback,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::AvailablePhrase(p) => write!(f, "available phrase '{}'", p),
            Rule::ForeignDomainNameField => write!(f, "domain name field for another domain"),
            Rule::ExactDomainNameField => write!(f, "domain name field for the queried domain"),
            Rule::ActiveDomainStatus => write!(f, "domain status field"),
            Rule::RegisteredPhrase(p) => write!(f, "registered phrase '{}'", p),
            Rule::ErrorPhrase(p) => write!(f, "error phrase '{}'", p),
            Rule::ShortReply { chars } => write!(f, "short reply ({} chars)", chars),
            Rule::FewLines { lines } => write!(f, "few lines ({})", lines),
            Rule::Fallback => write!(f, "no rule matched"),
        }
    }
}

/// A verdict together with the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub verdict: Verdict,
    pub rule: Rule,
}

impl Classification {
    fn new(verdict: Verdict, rule: Rule) -> Self {
        Self { verdict, rule }
    }
}

/// Classifier for WHOIS replies.
#[derive(Debug, Clone, Copy, Default)]
pub struct AvailabilityClassifier {
    policy: ClassifierPolicy,
}

impl AvailabilityClassifier {
    /// Create a classifier with the default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a classifier with a custom fallback policy.
    pub fn with_policy(policy: ClassifierPolicy) -> Self {
        Self { policy }
    }

    /// Decide whether `domain` is registered, given its raw WHOIS reply.
    pub fn classify(&self, whois_text: &str, domain: &str) -> Verdict {
        self.explain(whois_text, domain).verdict
    }

    /// Like [`classify`](Self::classify), also reporting which rule decided.
    pub fn explain(&self, whois_text: &str, domain: &str) -> Classification {
        let text = whois_text.to_lowercase();
        let domain = domain.to_lowercase();
        let tld = extract_tld(&domain);

        let classification = if tld == "com" || tld == "net" {
            self.classify_com_net(whois_text, &text, &domain)
        } else {
            self.classify_generic(whois_text, &text)
        };

        debug!(
            domain = %domain,
            tld = %tld,
            verdict = %classification.verdict,
            rule = %classification.rule,
            "Classified WHOIS reply"
        );
        classification
    }

    fn classify_com_net(&self, raw: &str, text: &str, domain: &str) -> Classification {
        if let Some(pattern) = first_match(text, COM_NET_AVAILABLE_PATTERNS) {
            return Classification::new(Verdict::Available, Rule::AvailablePhrase(pattern));
        }
        if has_foreign_domain_name_field(text, domain) {
            return Classification::new(Verdict::Available, Rule::ForeignDomainNameField);
        }

        if text.contains(&format!("{}{}", DOMAIN_NAME_FIELD, domain)) {
            return Classification::new(Verdict::Registered, Rule::ExactDomainNameField);
        }
        if has_active_domain_status(text) {
            return Classification::new(Verdict::Registered, Rule::ActiveDomainStatus);
        }
        if let Some(pattern) = first_match(text, COM_NET_REGISTERED_PATTERNS) {
            return Classification::new(Verdict::Registered, Rule::RegisteredPhrase(pattern));
        }

        let chars = raw.trim().chars().count();
        if chars < COM_NET_SHORT_REPLY {
            return Classification::new(Verdict::Available, Rule::ShortReply { chars });
        }

        Classification::new(self.policy.com_net_default, Rule::Fallback)
    }

    fn classify_generic(&self, raw: &str, text: &str) -> Classification {
        if let Some(pattern) = first_match(text, ERROR_PATTERNS) {
            return Classification::new(self.policy.on_error, Rule::ErrorPhrase(pattern));
        }

        if let Some(pattern) = first_match(text, AVAILABLE_PATTERNS) {
            return Classification::new(Verdict::Available, Rule::AvailablePhrase(pattern));
        }

        if let Some(pattern) = first_match(text, REGISTERED_PATTERNS) {
            return Classification::new(Verdict::Registered, Rule::RegisteredPhrase(pattern));
        }

        let chars = raw.trim().chars().count();
        if chars < SHORT_REPLY {
            return Classification::new(Verdict::Available, Rule::ShortReply { chars });
        }

        let lines = text.split('\n').filter(|l| !l.trim().is_empty()).count();
        if lines < FEW_LINES {
            return Classification::new(Verdict::Available, Rule::FewLines { lines });
        }

        Classification::new(self.policy.other_default, Rule::Fallback)
    }
}

/// Classify with the default policy.
pub fn classify(whois_text: &str, domain: &str) -> Verdict {
    AvailabilityClassifier::new().classify(whois_text, domain)
}

fn first_match(text: &str, patterns: &[&'static str]) -> Option<&'static str> {
    patterns.iter().copied().find(|p| text.contains(p))
}

/// True if some `domain name: ` field is not followed by the queried domain.
fn has_foreign_domain_name_field(text: &str, domain: &str) -> bool {
    text.match_indices(DOMAIN_NAME_FIELD)
        .any(|(idx, field)| !text[idx + field.len()..].starts_with(domain))
}

/// True if some `domain status:` field has no free/available wording on its line.
fn has_active_domain_status(text: &str) -> bool {
    text.match_indices(DOMAIN_STATUS_FIELD).any(|(idx, field)| {
        let rest = &text[idx + field.len()..];
        let line = rest.split('\n').next().unwrap_or("");
        !(line.contains("free") || line.contains("available"))
    })
}
