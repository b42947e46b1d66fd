//! # WHOIS Bot Library
//!
//! The core of a chat bot that looks up WHOIS records and tells users whether
//! a domain can still be registered.
//!
//! The library is transport-agnostic: the chat platform is reached through
//! the [`ChatTransport`] trait and WHOIS text comes from a [`WhoisFetcher`],
//! by default the system `whois` tool run locally or over SSH.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use whois_bot_lib::{classify, Verdict, WhoisClient, WhoisFetcher};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = WhoisClient::local();
//!     let record = client.fetch_whois("example.com").await;
//!
//!     match classify(&record.text, "example.com") {
//!         Verdict::Available => println!("example.com is available"),
//!         verdict => println!("example.com: {}", verdict),
//!     }
//! }
//! ```
//!
//! ## Features
//!
//! - **Availability classifier**: TLD-aware heuristics over free-text replies
//! - **Field extraction**: expiry and name-server lines
//! - **Chat routing**: commands, buttons and the admin broadcast flow
//! - **Persistence**: JSON user registry and configuration map

// Re-export main public API types and functions
pub use callback::{CallbackData, DomainAction, MAX_CALLBACK_BYTES};
pub use classifier::{classify, AvailabilityClassifier, Classification, Rule};
pub use config::{
    load_env_config, load_env_config_from, merge_configs, parse_duration_string, BotConfig,
    ConfigManager, EnvConfig, FileConfig, WhoisMode, WhoisSettings, DEFAULT_REGISTER_URL,
};
pub use conversation::{ConversationKey, ConversationState, Conversations};
pub use error::BotError;
pub use extract::{extract_dns, extract_expiry, ExtractedLines};
pub use format::{
    chunk_message, escape_html, format_block, non_blank_lines, retrieved_footer,
    MESSAGE_CHUNK_LIMIT,
};
pub use protocols::{WhoisClient, WhoisFetcher, DEFAULT_WHOIS_TIMEOUT};
pub use router::{
    BotSettings, BroadcastReport, Button, ChatTransport, ChatUser, Command, Incoming, MessageRef,
    OutgoingMessage, ParseMode, WhoisBot,
};
pub use store::{
    JsonConfigStore, JsonUserStore, MemorySearchLog, MemoryUserStore, SearchLog, UserStore,
};
pub use types::{display_time, ClassifierPolicy, RecentSearch, Verdict, WhoisRecord};
pub use utils::{extract_tld, is_valid_domain, normalize_domain, validate_domain};

// Internal modules - reached through the re-exports above
mod callback;
mod classifier;
mod config;
mod conversation;
mod error;
mod extract;
mod format;
mod protocols;
mod router;
mod store;
mod types;
mod utils;

// Type alias for convenience
pub type Result<T> = std::result::Result<T, BotError>;

// Library version and metadata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
