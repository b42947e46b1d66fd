//! Lookup backends.
//!
//! The bot only speaks to registries through the system `whois` tool; this
//! module hosts the client that runs it locally or on a remote host.

/// WHOIS tool invocation
pub mod whois;

pub use whois::{WhoisClient, WhoisFetcher, DEFAULT_WHOIS_TIMEOUT};
