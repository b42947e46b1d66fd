//! Button payloads.
//!
//! Inline buttons carry a short string back to the bot when pressed. The
//! wire format is `<action>_<domain>` for domain actions and a bare keyword
//! for the static help buttons. Parsing splits on the first underscore only
//! and re-validates the domain, so a payload can never smuggle an arbitrary
//! string into a lookup.

use std::fmt;

use crate::utils::is_valid_domain;

/// Telegram rejects callback data longer than this many bytes.
pub const MAX_CALLBACK_BYTES: usize = 64;

/// Action requested for a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainAction {
    /// Show the option menu for the domain
    Options,
    /// Show the full WHOIS record
    Whois,
    /// Show name-server lines
    Dns,
    /// Show expiry lines
    Expiry,
    /// Show only the availability verdict
    Check,
}

impl DomainAction {
    fn prefix(self) -> &'static str {
        match self {
            DomainAction::Options => "domain",
            DomainAction::Whois => "whois",
            DomainAction::Dns => "dns",
            DomainAction::Expiry => "expiry",
            DomainAction::Check => "check",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "domain" => Some(DomainAction::Options),
            "whois" => Some(DomainAction::Whois),
            "dns" => Some(DomainAction::Dns),
            "expiry" => Some(DomainAction::Expiry),
            "check" => Some(DomainAction::Check),
            _ => None,
        }
    }
}

/// Decoded button payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackData {
    HowToUse,
    AboutWhois,
    Domain { action: DomainAction, domain: String },
}

impl CallbackData {
    pub fn domain<D: Into<String>>(action: DomainAction, domain: D) -> Self {
        CallbackData::Domain {
            action,
            domain: domain.into(),
        }
    }

    /// Serialize to the wire format.
    pub fn encode(&self) -> String {
        match self {
            CallbackData::HowToUse => "how_to_use".to_string(),
            CallbackData::AboutWhois => "about_whois".to_string(),
            CallbackData::Domain { action, domain } => format!("{}_{}", action.prefix(), domain),
        }
    }

    /// Parse a wire payload. Unknown actions and invalid domains yield `None`.
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "how_to_use" => return Some(CallbackData::HowToUse),
            "about_whois" => return Some(CallbackData::AboutWhois),
            _ => {}
        }

        let (prefix, domain) = data.split_once('_')?;
        let action = DomainAction::from_prefix(prefix)?;
        if !is_valid_domain(domain) {
            return None;
        }
        Some(CallbackData::domain(action, domain.to_lowercase()))
    }

    /// Whether the encoded payload fits Telegram's size limit.
    pub fn fits_limit(&self) -> bool {
        self.encode().len() <= MAX_CALLBACK_BYTES
    }
}

impl fmt::Display for CallbackData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
