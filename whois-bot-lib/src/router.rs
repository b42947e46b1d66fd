//! Command and button routing.
//!
//! [`WhoisBot`] turns inbound chat events into replies. It owns the stores
//! and the per-chat conversation state, and talks to the chat platform only
//! through the [`ChatTransport`] trait, so the whole flow can be driven by a
//! recording transport in tests.
//!
//! Every handler is fail-soft: lookup problems are rendered as chat text and
//! transport errors are logged by [`WhoisBot::dispatch`] without stopping the
//! caller's event loop.

use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::callback::{CallbackData, DomainAction};
use crate::classifier::AvailabilityClassifier;
use crate::config::{BotConfig, DEFAULT_REGISTER_URL};
use crate::conversation::{ConversationKey, Conversations, DEFAULT_BROADCAST_TIMEOUT};
use crate::error::BotError;
use crate::extract::{extract_dns, extract_expiry};
use crate::format::{
    chunk_message, escape_html, format_block, non_blank_lines, retrieved_footer,
    MESSAGE_CHUNK_LIMIT,
};
use crate::protocols::WhoisFetcher;
use crate::store::{
    JsonConfigStore, MemorySearchLog, MemoryUserStore, SearchLog, UserStore, DEFAULT_RECENT_LIMIT,
};
use crate::types::{display_time, ClassifierPolicy, RecentSearch, Verdict};
use crate::utils::{is_valid_domain, normalize_domain};

/// Broadcast messages in flight at once.
pub const BROADCAST_CONCURRENCY: usize = 8;

/// The user who sent an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    pub id: i64,
    pub first_name: String,
}

/// A message already delivered to a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

/// An inbound chat event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A text message (command or free text)
    Message {
        chat_id: i64,
        from: ChatUser,
        text: String,
    },

    /// A press on an inline button
    Callback {
        id: String,
        from: ChatUser,
        message: Option<MessageRef>,
        data: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Html,
    Plain,
}

/// An inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Button {
    Callback { text: String, data: CallbackData },
    Url { text: String, url: String },
}

impl Button {
    pub fn callback<T: Into<String>>(text: T, data: CallbackData) -> Self {
        Button::Callback {
            text: text.into(),
            data,
        }
    }

    pub fn url<T: Into<String>, U: Into<String>>(text: T, url: U) -> Self {
        Button::Url {
            text: text.into(),
            url: url.into(),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Button::Callback { text, .. } | Button::Url { text, .. } => text,
        }
    }
}

/// A message to send or to replace an existing message with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub parse_mode: ParseMode,
    /// Rows of inline buttons; empty for none
    pub keyboard: Vec<Vec<Button>>,
}

impl OutgoingMessage {
    pub fn html<T: Into<String>>(text: T) -> Self {
        Self {
            text: text.into(),
            parse_mode: ParseMode::Html,
            keyboard: Vec::new(),
        }
    }

    pub fn plain<T: Into<String>>(text: T) -> Self {
        Self {
            text: text.into(),
            parse_mode: ParseMode::Plain,
            keyboard: Vec::new(),
        }
    }

    pub fn with_keyboard(mut self, keyboard: Vec<Vec<Button>>) -> Self {
        self.keyboard = keyboard;
        self
    }
}

/// The chat platform, as seen by the router.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(
        &self,
        chat_id: i64,
        message: &OutgoingMessage,
    ) -> Result<MessageRef, BotError>;

    async fn edit_message(&self, target: MessageRef, message: &OutgoingMessage)
        -> Result<(), BotError>;

    /// Acknowledge a button press so the client stops its spinner.
    async fn answer_callback(&self, callback_id: &str) -> Result<(), BotError>;
}

/// Bot commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    About,
    Recent,
    Stats,
    Broadcast,
    Cancel,
}

impl Command {
    /// Parse the command word of a message such as `/help` or `/help@MyBot`.
    ///
    /// Returns `None` for free text, for unknown commands and for commands
    /// addressed to a bot other than `bot_username`. Without a known username
    /// every `@` suffix is accepted.
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let word = text.trim().split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let name = match name.split_once('@') {
            Some((name, target)) => {
                if let Some(own) = bot_username {
                    if !target.eq_ignore_ascii_case(own.trim_start_matches('@')) {
                        return None;
                    }
                }
                name
            }
            None => name,
        };
        match name.to_lowercase().as_str() {
            "start" => Some(Command::Start),
            "help" => Some(Command::Help),
            "about" => Some(Command::About),
            "recent" => Some(Command::Recent),
            "stats" => Some(Command::Stats),
            "broadcast" => Some(Command::Broadcast),
            "cancel" => Some(Command::Cancel),
            _ => None,
        }
    }
}

/// Behavior knobs for [`WhoisBot`].
#[derive(Debug, Clone, PartialEq)]
pub struct BotSettings {
    pub admin_user_id: Option<i64>,
    pub register_url: String,
    pub max_recent_searches: usize,
    pub broadcast_timeout: std::time::Duration,
    pub classifier: ClassifierPolicy,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            admin_user_id: None,
            register_url: DEFAULT_REGISTER_URL.to_string(),
            max_recent_searches: DEFAULT_RECENT_LIMIT,
            broadcast_timeout: DEFAULT_BROADCAST_TIMEOUT,
            classifier: ClassifierPolicy::default(),
        }
    }
}

impl From<&BotConfig> for BotSettings {
    fn from(config: &BotConfig) -> Self {
        Self {
            admin_user_id: config.admin_user_id,
            register_url: config.register_url.clone(),
            max_recent_searches: config.max_recent_searches,
            broadcast_timeout: config.broadcast_timeout,
            classifier: config.classifier,
        }
    }
}

/// Outcome of a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub total: usize,
}

/// The WHOIS bot: stores, conversation state and handlers.
pub struct WhoisBot<F> {
    fetcher: F,
    settings: BotSettings,
    classifier: AvailabilityClassifier,
    users: Mutex<Box<dyn UserStore>>,
    searches: Mutex<Box<dyn SearchLog>>,
    config_map: Mutex<Option<JsonConfigStore>>,
    conversations: Mutex<Conversations>,
    username: Option<String>,
}

const HELP_TEXT: &str = "📚 <b>WHOIS Bot Commands</b>\n\n\
    • Send any domain name (e.g., <code>example.com</code>) to see available options\n\
    • /start - Start the bot and see welcome message\n\
    • /help - Show this help message\n\
    • /recent - Show your recent WHOIS lookups\n\
    • /about - Learn more about this bot\n\n\
    You can check domain information or verify if a domain is available for registration. \
    If a domain is available, you'll get a link to register it immediately!";

const ADMIN_HELP_TEXT: &str = "\n\n<b>Admin Commands:</b>\n\
    • /stats - Show bot statistics\n\
    • /broadcast - Send a message to all users\n";

const ABOUT_TEXT: &str = "🤖 <b>About WHOIS Bot</b>\n\n\
    This bot allows you to quickly look up domain registration information (WHOIS data) \
    for any domain name and check if domains are available for registration.\n\n\
    WHOIS data typically includes:\n\
    • Domain registrar information\n\
    • Registration and expiration dates\n\
    • Name servers\n\
    • Registrant information (when available)\n\n\
    For available domains, the bot provides a direct link to register them.\n\n\
    The bot uses the server's WHOIS command for accurate, up-to-date results.";

const HOW_TO_USE_TEXT: &str = "<b>📝 How to use this bot:</b>\n\n\
    1. Simply type a domain name like <code>example.com</code>\n\
    2. The bot will show you buttons to check:\n   \
    • WHOIS information\n   \
    • DNS information\n   \
    • Expiration date\n   \
    • Domain availability\n\
    3. Click on any button to see the specific information\n\n\
    If a domain is available for registration, you'll get a direct link to register it.\n\n\
    Try it now by sending a domain name!";

const ABOUT_WHOIS_TEXT: &str = "<b>🔍 What is WHOIS?</b>\n\n\
    WHOIS is a query and response protocol used for querying databases that store \
    the registered users of an Internet resource, such as a domain name or IP address.\n\n\
    When you search for a domain, you can see details like:\n\
    • Who registered the domain\n\
    • When it was registered\n\
    • When it expires\n\
    • DNS servers\n\
    • Contact information (when public)\n\n\
    The bot can also tell you if a domain is available for registration.";

const ADMIN_ONLY_TEXT: &str = "Sorry, this command is only available to administrators.";
const INVALID_DOMAIN_TEXT: &str = "⚠️ Please enter a valid domain name (e.g., example.com)";

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl DomainAction {
    fn progress_text(self, domain: &str) -> String {
        match self {
            DomainAction::Options => format!("Loading options for {}...", domain),
            DomainAction::Whois => format!("Looking up WHOIS for {}...", domain),
            DomainAction::Dns => format!("Fetching DNS information for {}...", domain),
            DomainAction::Expiry => format!("Fetching expiration date for {}...", domain),
            DomainAction::Check => format!("Checking availability for {}...", domain),
        }
    }

    fn error_label(self) -> &'static str {
        match self {
            DomainAction::Options => "Error showing options",
            DomainAction::Whois => "Error getting WHOIS information",
            DomainAction::Dns => "Error getting DNS information",
            DomainAction::Expiry => "Error getting expiration date",
            DomainAction::Check => "Error checking domain availability",
        }
    }
}

impl<F: WhoisFetcher> WhoisBot<F> {
    /// Bot with in-memory stores.
    pub fn new(fetcher: F, settings: BotSettings) -> Self {
        let classifier = AvailabilityClassifier::with_policy(settings.classifier);
        let conversations = Conversations::new(settings.broadcast_timeout);
        let searches = MemorySearchLog::new(settings.max_recent_searches);
        Self {
            fetcher,
            settings,
            classifier,
            users: Mutex::new(Box::new(MemoryUserStore::new())),
            searches: Mutex::new(Box::new(searches)),
            config_map: Mutex::new(None),
            conversations: Mutex::new(conversations),
            username: None,
        }
    }

    /// The bot's own username, used to skip commands meant for other bots.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_user_store(mut self, store: Box<dyn UserStore>) -> Self {
        self.users = Mutex::new(store);
        self
    }

    pub fn with_search_log(mut self, log: Box<dyn SearchLog>) -> Self {
        self.searches = Mutex::new(log);
        self
    }

    pub fn with_config_store(mut self, store: JsonConfigStore) -> Self {
        self.config_map = Mutex::new(Some(store));
        self
    }

    pub fn settings(&self) -> &BotSettings {
        &self.settings
    }

    pub fn user_count(&self) -> usize {
        lock(&self.users).len()
    }

    pub fn total_searches(&self) -> usize {
        lock(&self.searches).total_searches()
    }

    pub fn recent_searches(&self, user_id: i64) -> Vec<RecentSearch> {
        lock(&self.searches).list_recent(user_id)
    }

    fn is_admin(&self, user_id: i64) -> bool {
        self.settings.admin_user_id == Some(user_id)
    }

    /// Registration link target; the persisted config map may override it.
    fn register_url(&self) -> String {
        let config_map = lock(&self.config_map);
        let url = config_map
            .as_ref()
            .and_then(|store| store.get_str("register_url"))
            .unwrap_or(self.settings.register_url.as_str())
            .to_string();
        url
    }

    fn register_user(&self, user_id: i64) {
        let result = lock(&self.users).register_user(user_id);
        match result {
            Ok(true) => info!(user_id, "New user registered"),
            Ok(false) => {}
            Err(e) => error!(user_id, error = %e, "Failed to persist user registry"),
        }
    }

    /// Drop broadcast prompts that timed out.
    pub fn prune_conversations(&self) {
        let active = lock(&self.conversations).prune(Instant::now());
        if active > 0 {
            debug!(active, "Broadcast prompts pending");
        }
    }

    /// Flush persistent stores. Called on shutdown.
    pub fn shutdown(&self) -> Result<(), BotError> {
        lock(&self.users).save()?;
        if let Some(store) = lock(&self.config_map).as_ref() {
            store.save()?;
        }
        Ok(())
    }

    /// Handle one event, logging any error instead of returning it.
    pub async fn dispatch(&self, transport: &dyn ChatTransport, incoming: Incoming) {
        if let Err(e) = self.handle(transport, incoming).await {
            error!(error = %e, "Failed to handle chat event");
        }
    }

    /// Handle one event.
    pub async fn handle(
        &self,
        transport: &dyn ChatTransport,
        incoming: Incoming,
    ) -> Result<(), BotError> {
        match incoming {
            Incoming::Message {
                chat_id,
                from,
                text,
            } => self.handle_message(transport, chat_id, &from, &text).await,
            Incoming::Callback {
                id,
                from,
                message,
                data,
            } => {
                self.handle_callback(transport, &id, &from, message, &data)
                    .await
            }
        }
    }

    async fn handle_message(
        &self,
        transport: &dyn ChatTransport,
        chat_id: i64,
        from: &ChatUser,
        text: &str,
    ) -> Result<(), BotError> {
        if text.trim_start().starts_with('/') {
            return match Command::parse(text, self.username.as_deref()) {
                Some(command) => {
                    debug!(?command, user_id = from.id, "Command received");
                    self.handle_command(transport, chat_id, from, command).await
                }
                None => {
                    debug!(text = %text.trim(), "Ignoring unknown command");
                    Ok(())
                }
            };
        }

        let key = ConversationKey::new(chat_id, from.id);
        let awaiting = lock(&self.conversations).take_broadcast(key, Instant::now());
        if awaiting && self.is_admin(from.id) {
            self.run_broadcast(transport, chat_id, text).await?;
            return Ok(());
        }

        self.handle_domain(transport, chat_id, from, text).await
    }

    async fn handle_command(
        &self,
        transport: &dyn ChatTransport,
        chat_id: i64,
        from: &ChatUser,
        command: Command,
    ) -> Result<(), BotError> {
        let reply = match command {
            Command::Start => {
                self.register_user(from.id);
                let welcome = format!(
                    "👋 Hello, {}!\n\n\
                     Welcome to the Domain WHOIS Bot. I can help you look up WHOIS information \
                     for any domain and check if domains are available for registration.\n\n\
                     Simply send me a domain name like 'example.com' and I'll provide options \
                     to check its details or verify if it's available for registration.\n\n\
                     Type /help to see all available commands.",
                    from.first_name
                );
                OutgoingMessage::plain(welcome).with_keyboard(vec![
                    vec![Button::callback("🔍 How to use", CallbackData::HowToUse)],
                    vec![Button::callback("ℹ️ About WHOIS", CallbackData::AboutWhois)],
                ])
            }
            Command::Help => {
                let mut text = HELP_TEXT.to_string();
                if self.is_admin(from.id) {
                    text.push_str(ADMIN_HELP_TEXT);
                }
                OutgoingMessage::html(text)
            }
            Command::About => OutgoingMessage::html(ABOUT_TEXT),
            Command::Recent => self.recent_reply(from.id),
            Command::Stats => {
                if !self.is_admin(from.id) {
                    OutgoingMessage::plain(ADMIN_ONLY_TEXT)
                } else {
                    self.stats_reply()
                }
            }
            Command::Broadcast => {
                if !self.is_admin(from.id) {
                    OutgoingMessage::plain(ADMIN_ONLY_TEXT)
                } else {
                    let key = ConversationKey::new(chat_id, from.id);
                    lock(&self.conversations).begin_broadcast(key, Instant::now());
                    info!(chat_id, "Awaiting broadcast text");
                    OutgoingMessage::plain(
                        "Please enter the message you want to send to all users:\n\n\
                         Type /cancel to cancel the broadcast.",
                    )
                }
            }
            Command::Cancel => {
                let key = ConversationKey::new(chat_id, from.id);
                let cancelled = lock(&self.conversations).cancel(key, Instant::now());
                if cancelled {
                    OutgoingMessage::plain("Operation canceled.")
                } else {
                    OutgoingMessage::plain("Nothing to cancel.")
                }
            }
        };

        transport.send_message(chat_id, &reply).await?;
        Ok(())
    }

    fn recent_reply(&self, user_id: i64) -> OutgoingMessage {
        let recent = self.recent_searches(user_id);
        if recent.is_empty() {
            return OutgoingMessage::plain("You haven't made any WHOIS lookups yet.");
        }

        let mut text = "🕒 <b>Your Recent Lookups</b>\n\n".to_string();
        let mut keyboard = Vec::new();
        for search in &recent {
            text.push_str(&format!(
                "• <code>{}</code> - {}\n",
                escape_html(&search.domain),
                display_time(search.timestamp)
            ));
            let data = CallbackData::domain(DomainAction::Options, search.domain.as_str());
            if data.fits_limit() {
                keyboard.push(vec![Button::callback(format!("🔍 {}", search.domain), data)]);
            }
        }

        OutgoingMessage::html(text).with_keyboard(keyboard)
    }

    fn stats_reply(&self) -> OutgoingMessage {
        let broadcasts = lock(&self.config_map)
            .as_ref()
            .and_then(|store| store.get_u64("broadcast_count"))
            .unwrap_or(0);

        OutgoingMessage::html(format!(
            "📊 <b>Bot Statistics</b>\n\n\
             • Total users: {}\n\
             • Total searches: {}\n\
             • Broadcasts sent: {}\n\n\
             <i>Last updated: {} UTC</i>",
            self.user_count(),
            self.total_searches(),
            broadcasts,
            display_time(Utc::now())
        ))
    }

    async fn handle_domain(
        &self,
        transport: &dyn ChatTransport,
        chat_id: i64,
        from: &ChatUser,
        text: &str,
    ) -> Result<(), BotError> {
        self.register_user(from.id);

        let domain = normalize_domain(text);
        if !is_valid_domain(&domain) {
            let reply = OutgoingMessage::plain(INVALID_DOMAIN_TEXT).with_keyboard(vec![vec![
                Button::callback("See examples", CallbackData::HowToUse),
            ]]);
            transport.send_message(chat_id, &reply).await?;
            return Ok(());
        }

        if !CallbackData::domain(DomainAction::Expiry, domain.as_str()).fits_limit() {
            let reply = OutgoingMessage::html(format!(
                "⚠️ <b>{}</b> is too long to look up with buttons.",
                escape_html(&domain)
            ));
            transport.send_message(chat_id, &reply).await?;
            return Ok(());
        }

        lock(&self.searches).record_search(from.id, &domain, Utc::now());
        info!(user_id = from.id, domain = %domain, "Domain submitted");

        transport
            .send_message(chat_id, &options_message(&domain))
            .await?;
        Ok(())
    }

    async fn handle_callback(
        &self,
        transport: &dyn ChatTransport,
        callback_id: &str,
        from: &ChatUser,
        message: Option<MessageRef>,
        data: &str,
    ) -> Result<(), BotError> {
        if let Err(e) = transport.answer_callback(callback_id).await {
            warn!(error = %e, "Failed to answer callback query");
        }

        let target = match message {
            Some(target) => target,
            None => {
                warn!(data = %data, "Callback without a message to edit");
                return Ok(());
            }
        };

        let callback = match CallbackData::parse(data) {
            Some(callback) => callback,
            None => {
                warn!(data = %data, user_id = from.id, "Ignoring malformed callback data");
                return Ok(());
            }
        };
        debug!(callback = %callback, user_id = from.id, "Button pressed");

        match callback {
            CallbackData::HowToUse => {
                transport
                    .edit_message(target, &OutgoingMessage::html(HOW_TO_USE_TEXT))
                    .await
            }
            CallbackData::AboutWhois => {
                transport
                    .edit_message(target, &OutgoingMessage::html(ABOUT_WHOIS_TEXT))
                    .await
            }
            CallbackData::Domain {
                action: DomainAction::Options,
                domain,
            } => transport.edit_message(target, &options_message(&domain)).await,
            CallbackData::Domain { action, domain } => {
                self.handle_lookup(transport, target, action, &domain).await
            }
        }
    }

    async fn handle_lookup(
        &self,
        transport: &dyn ChatTransport,
        target: MessageRef,
        action: DomainAction,
        domain: &str,
    ) -> Result<(), BotError> {
        transport
            .edit_message(target, &OutgoingMessage::plain(action.progress_text(domain)))
            .await?;

        if let Err(e) = self.render_lookup(transport, target, action, domain).await {
            error!(domain = %domain, ?action, error = %e, "Failed to deliver lookup result");
            let notice = OutgoingMessage::plain(format!("{}: {}", action.error_label(), e));
            transport.edit_message(target, &notice).await?;
        }
        Ok(())
    }

    async fn render_lookup(
        &self,
        transport: &dyn ChatTransport,
        target: MessageRef,
        action: DomainAction,
        domain: &str,
    ) -> Result<(), BotError> {
        let record = self.fetcher.fetch_whois(domain).await;
        let verdict = self.classifier.classify(&record.text, domain);
        info!(domain = %domain, ?action, verdict = %verdict, "Lookup classified");

        if verdict.is_available() {
            let reply = available_message(domain, &self.register_url());
            return transport.edit_message(target, &reply).await;
        }

        let now = Utc::now();
        let block = match action {
            DomainAction::Whois => {
                let title = format!("🌐 WHOIS Information for {}", domain);
                format_block(&title, &non_blank_lines(&record.text))
            }
            DomainAction::Dns => {
                let title = format!("🌐 DNS Information for {}", domain);
                format_block(&title, &extract_dns(&record.text).display_lines())
            }
            DomainAction::Expiry => {
                let title = format!("📅 Expiration Date for {}", domain);
                format_block(&title, &extract_expiry(&record.text).display_lines())
            }
            DomainAction::Check | DomainAction::Options => {
                let reply = not_available_message(domain, verdict);
                return transport.edit_message(target, &reply).await;
            }
        };

        let text = format!("{}{}", block, retrieved_footer(now));
        let mut chunks = chunk_message(&text, MESSAGE_CHUNK_LIMIT).into_iter();
        let first = chunks.next().unwrap_or_default();
        transport
            .edit_message(
                target,
                &OutgoingMessage::html(first).with_keyboard(back_keyboard(domain)),
            )
            .await?;

        for chunk in chunks {
            transport
                .send_message(target.chat_id, &OutgoingMessage::html(chunk))
                .await?;
        }
        Ok(())
    }

    async fn run_broadcast(
        &self,
        transport: &dyn ChatTransport,
        chat_id: i64,
        text: &str,
    ) -> Result<BroadcastReport, BotError> {
        let recipients = lock(&self.users).users();
        let total = recipients.len();

        transport
            .send_message(
                chat_id,
                &OutgoingMessage::plain(format!("Sending message to {} users...", total)),
            )
            .await?;

        let announcement = OutgoingMessage::html(format!(
            "📢 <b>Announcement from WHOIS Bot</b>\n\n{}",
            escape_html(text)
        ));
        let announcement = &announcement;

        let delivered = stream::iter(recipients)
            .map(|user_id| async move {
                match transport.send_message(user_id, announcement).await {
                    Ok(_) => true,
                    Err(e) => {
                        error!(user_id, error = %e, "Failed to deliver broadcast");
                        false
                    }
                }
            })
            .buffer_unordered(BROADCAST_CONCURRENCY)
            .filter(|ok| futures::future::ready(*ok))
            .count()
            .await;

        let report = BroadcastReport { delivered, total };
        info!(delivered, total, "Broadcast finished");
        self.record_broadcast();

        transport
            .send_message(
                chat_id,
                &OutgoingMessage::plain(format!(
                    "✅ Message sent to {} out of {} users.",
                    report.delivered, report.total
                )),
            )
            .await?;
        Ok(report)
    }

    fn record_broadcast(&self) {
        let mut config_map = lock(&self.config_map);
        if let Some(store) = config_map.as_mut() {
            let result = store
                .increment("broadcast_count")
                .and_then(|_| store.set("last_broadcast_at", Utc::now().to_rfc3339()));
            if let Err(e) = result {
                warn!(error = %e, "Failed to record broadcast in config map");
            }
        }
    }
}

fn options_message(domain: &str) -> OutgoingMessage {
    let data = |action| CallbackData::domain(action, domain);
    OutgoingMessage::html(format!(
        "What would you like to know about <b>{}</b>?",
        escape_html(domain)
    ))
    .with_keyboard(vec![
        vec![Button::callback("🔎 View WHOIS", data(DomainAction::Whois))],
        vec![
            Button::callback("🌐 View DNS Info", data(DomainAction::Dns)),
            Button::callback("📅 View Expiry Date", data(DomainAction::Expiry)),
        ],
        vec![Button::callback("✅ Check Availability", data(DomainAction::Check))],
    ])
}

fn back_keyboard(domain: &str) -> Vec<Vec<Button>> {
    vec![
        vec![Button::callback(
            "◀️ Back to options",
            CallbackData::domain(DomainAction::Options, domain),
        )],
        vec![Button::callback(
            "🔍 Search another domain",
            CallbackData::HowToUse,
        )],
    ]
}

fn available_message(domain: &str, register_url: &str) -> OutgoingMessage {
    let mut keyboard = vec![vec![Button::url(
        "🛒 Register This Domain",
        format!("{}?domain={}", register_url, domain),
    )]];
    keyboard.extend(back_keyboard(domain));

    OutgoingMessage::html(format!(
        "✅ <b>Good news!</b> The domain <b>{}</b> appears to be available for registration.\n\n\
         You can register it by clicking the button below.",
        escape_html(domain)
    ))
    .with_keyboard(keyboard)
}

fn not_available_message(domain: &str, verdict: Verdict) -> OutgoingMessage {
    let mut keyboard = vec![vec![Button::callback(
        "🔎 View WHOIS Details",
        CallbackData::domain(DomainAction::Whois, domain),
    )]];
    keyboard.extend(back_keyboard(domain));

    let text = match verdict {
        Verdict::Unknown => format!(
            "❔ Could not determine whether <b>{}</b> is available.\n\n\
             You can view the WHOIS details to judge for yourself.",
            escape_html(domain)
        ),
        _ => format!(
            "❌ The domain <b>{}</b> is already registered.\n\n\
             You can view the WHOIS details to see more information.",
            escape_html(domain)
        ),
    };
    OutgoingMessage::html(text).with_keyboard(keyboard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WhoisRecord;
    use std::collections::{HashMap, HashSet};

    const REGISTERED_COM: &str = "Domain Name: EXAMPLE.COM\n\
        Registrar: Foo\n\
        Creation Date: 2020-01-01\n\
        Registry Expiry Date: 2030-01-01\n\
        Name Server: NS1.EXAMPLE.COM\n\
        Name Server: NS2.EXAMPLE.COM\n";

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Message(i64, OutgoingMessage),
        Edit(MessageRef, OutgoingMessage),
        Answer(String),
    }

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Sent>>,
        failing_chats: HashSet<i64>,
    }

    impl RecordingTransport {
        fn failing_for<I: IntoIterator<Item = i64>>(chats: I) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failing_chats: chats.into_iter().collect(),
            }
        }

        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn last_message_text(&self) -> String {
            self.sent()
                .iter()
                .rev()
                .find_map(|s| match s {
                    Sent::Message(_, m) | Sent::Edit(_, m) => Some(m.text.clone()),
                    Sent::Answer(_) => None,
                })
                .unwrap_or_default()
        }

        fn last_edit(&self) -> OutgoingMessage {
            self.sent()
                .iter()
                .rev()
                .find_map(|s| match s {
                    Sent::Edit(_, m) => Some(m.clone()),
                    _ => None,
                })
                .expect("an edit was sent")
        }
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn send_message(
            &self,
            chat_id: i64,
            message: &OutgoingMessage,
        ) -> Result<MessageRef, BotError> {
            if self.failing_chats.contains(&chat_id) {
                return Err(BotError::transport("Forbidden: bot was blocked by the user"));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push(Sent::Message(chat_id, message.clone()));
            Ok(MessageRef {
                chat_id,
                message_id: sent.len() as i64,
            })
        }

        async fn edit_message(
            &self,
            target: MessageRef,
            message: &OutgoingMessage,
        ) -> Result<(), BotError> {
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Edit(target, message.clone()));
            Ok(())
        }

        async fn answer_callback(&self, callback_id: &str) -> Result<(), BotError> {
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Answer(callback_id.to_string()));
            Ok(())
        }
    }

    struct CannedFetcher {
        replies: HashMap<String, String>,
    }

    impl CannedFetcher {
        fn new(replies: &[(&str, &str)]) -> Self {
            Self {
                replies: replies
                    .iter()
                    .map(|(d, t)| (d.to_string(), t.to_string()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl WhoisFetcher for CannedFetcher {
        async fn fetch_whois(&self, domain: &str) -> WhoisRecord {
            match self.replies.get(domain) {
                Some(text) => WhoisRecord::reply(domain, text.as_str()),
                None => WhoisRecord::reply(domain, "No match for domain"),
            }
        }
    }

    const ADMIN: i64 = 1000;

    fn bot() -> WhoisBot<CannedFetcher> {
        let fetcher = CannedFetcher::new(&[("example.com", REGISTERED_COM)]);
        let settings = BotSettings {
            admin_user_id: Some(ADMIN),
            ..Default::default()
        };
        WhoisBot::new(fetcher, settings)
    }

    fn user(id: i64) -> ChatUser {
        ChatUser {
            id,
            first_name: "Ada".to_string(),
        }
    }

    fn message(id: i64, text: &str) -> Incoming {
        Incoming::Message {
            chat_id: id,
            from: user(id),
            text: text.to_string(),
        }
    }

    fn press(id: i64, data: &str) -> Incoming {
        Incoming::Callback {
            id: "cb-1".to_string(),
            from: user(id),
            message: Some(MessageRef {
                chat_id: id,
                message_id: 77,
            }),
            data: data.to_string(),
        }
    }

    fn group_message(chat_id: i64, user_id: i64, text: &str) -> Incoming {
        Incoming::Message {
            chat_id,
            from: user(user_id),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("/start", None), Some(Command::Start));
        assert_eq!(
            Command::parse("  /help@WhoisBot extra", None),
            Some(Command::Help)
        );
        assert_eq!(Command::parse("/CANCEL", None), Some(Command::Cancel));
        assert_eq!(Command::parse("/unknown", None), None);
        assert_eq!(Command::parse("example.com", None), None);
    }

    #[test]
    fn test_command_parse_checks_addressee() {
        let own = Some("WhoisBot");
        assert_eq!(Command::parse("/stats@whoisbot", own), Some(Command::Stats));
        assert_eq!(Command::parse("/stats", own), Some(Command::Stats));
        assert_eq!(Command::parse("/stats@OtherBot", own), None);
        assert_eq!(
            Command::parse("/stats@OtherBot", None),
            Some(Command::Stats)
        );
    }

    #[tokio::test]
    async fn test_command_for_other_bot_ignored() {
        let bot = bot().with_username("WhoisBot");
        let transport = RecordingTransport::default();

        bot.handle(&transport, message(ADMIN, "/stats@OtherBot"))
            .await
            .unwrap();
        assert!(transport.sent().is_empty());

        bot.handle(&transport, message(ADMIN, "/stats@WhoisBot"))
            .await
            .unwrap();
        assert!(transport.last_message_text().contains("Total users"));
    }

    #[tokio::test]
    async fn test_start_registers_user() {
        let bot = bot();
        let transport = RecordingTransport::default();

        bot.handle(&transport, message(5, "/start")).await.unwrap();

        assert_eq!(bot.user_count(), 1);
        match &transport.sent()[0] {
            Sent::Message(5, m) => {
                assert!(m.text.starts_with("👋 Hello, Ada!"));
                assert_eq!(m.parse_mode, ParseMode::Plain);
                assert_eq!(m.keyboard.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_domain_submission_shows_options() {
        let bot = bot();
        let transport = RecordingTransport::default();

        bot.handle(&transport, message(5, "  Example.COM ")).await.unwrap();

        let recent = bot.recent_searches(5);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].domain, "example.com");

        match &transport.sent()[0] {
            Sent::Message(5, m) => {
                assert_eq!(m.text, "What would you like to know about <b>example.com</b>?");
                assert_eq!(
                    m.keyboard[0][0],
                    Button::callback(
                        "🔎 View WHOIS",
                        CallbackData::domain(DomainAction::Whois, "example.com")
                    )
                );
                assert_eq!(m.keyboard[1].len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_domain_reply() {
        let bot = bot();
        let transport = RecordingTransport::default();

        bot.handle(&transport, message(5, "not a domain")).await.unwrap();

        assert_eq!(transport.last_message_text(), INVALID_DOMAIN_TEXT);
        assert_eq!(bot.total_searches(), 0);
        // The sender is still counted as a user.
        assert_eq!(bot.user_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_command_ignored() {
        let bot = bot();
        let transport = RecordingTransport::default();

        bot.handle(&transport, message(5, "/frobnicate")).await.unwrap();
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_check_registered() {
        let bot = bot();
        let transport = RecordingTransport::default();

        bot.handle(&transport, press(5, "check_example.com")).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent[0], Sent::Answer("cb-1".to_string()));
        match &sent[1] {
            Sent::Edit(_, m) => assert_eq!(m.text, "Checking availability for example.com..."),
            other => panic!("unexpected {:?}", other),
        }
        let last = transport.last_edit();
        assert!(last.text.contains("is already registered"));
        assert_eq!(last.keyboard.len(), 3);
    }

    #[tokio::test]
    async fn test_check_available_has_register_button() {
        let bot = bot();
        let transport = RecordingTransport::default();

        bot.handle(&transport, press(5, "check_free-name.org")).await.unwrap();

        let last = transport.last_edit();
        assert!(last.text.contains("appears to be available"));
        assert_eq!(
            last.keyboard[0][0],
            Button::url(
                "🛒 Register This Domain",
                format!("{}?domain=free-name.org", DEFAULT_REGISTER_URL)
            )
        );
    }

    #[tokio::test]
    async fn test_dns_and_expiry_extract_lines() {
        let bot = bot();
        let transport = RecordingTransport::default();

        bot.handle(&transport, press(5, "dns_example.com")).await.unwrap();
        let dns = transport.last_edit();
        assert!(dns.text.starts_with("<b>🌐 DNS Information for example.com</b>"));
        assert!(dns.text.contains("Name Server: NS1.EXAMPLE.COM"));
        assert!(!dns.text.contains("Registrar"));
        assert!(dns.text.contains("<i>Retrieved at "));

        bot.handle(&transport, press(5, "expiry_example.com")).await.unwrap();
        let expiry = transport.last_edit();
        assert!(expiry.text.contains("Registry Expiry Date: 2030-01-01"));
        assert!(!expiry.text.contains("Name Server"));
    }

    #[tokio::test]
    async fn test_long_whois_is_chunked() {
        let long_reply: String = (0..400)
            .map(|i| format!("Domain Status: clientTransferProhibited line {:04}\n", i))
            .collect();
        let fetcher = CannedFetcher::new(&[("big.org", long_reply.as_str())]);
        let bot = WhoisBot::new(fetcher, BotSettings::default());
        let transport = RecordingTransport::default();

        bot.handle(&transport, press(5, "whois_big.org")).await.unwrap();

        let sent = transport.sent();
        let followups: Vec<&OutgoingMessage> = sent
            .iter()
            .filter_map(|s| match s {
                Sent::Message(5, m) => Some(m),
                _ => None,
            })
            .collect();
        assert!(!followups.is_empty());
        assert!(followups.iter().all(|m| m.text.chars().count() <= MESSAGE_CHUNK_LIMIT));
        assert!(followups.iter().all(|m| m.keyboard.is_empty()));
        assert_eq!(transport.last_edit().keyboard, back_keyboard("big.org"));
    }

    #[tokio::test]
    async fn test_malformed_callback_only_answered() {
        let bot = bot();
        let transport = RecordingTransport::default();

        bot.handle(&transport, press(5, "whois_rm -rf")).await.unwrap();
        bot.handle(&transport, press(5, "bogus_example.com")).await.unwrap();

        assert!(transport
            .sent()
            .iter()
            .all(|s| matches!(s, Sent::Answer(_))));
    }

    #[tokio::test]
    async fn test_recent_lists_newest_first() {
        let bot = bot();
        let transport = RecordingTransport::default();

        bot.handle(&transport, message(5, "/recent")).await.unwrap();
        assert_eq!(
            transport.last_message_text(),
            "You haven't made any WHOIS lookups yet."
        );

        for domain in ["a.com", "b.com", "c.com", "d.com", "e.com", "f.com"] {
            bot.handle(&transport, message(5, domain)).await.unwrap();
        }
        bot.handle(&transport, message(5, "/recent")).await.unwrap();

        match transport.sent().last() {
            Some(Sent::Message(_, m)) => {
                assert_eq!(m.keyboard.len(), 5);
                assert_eq!(m.keyboard[0][0].text(), "🔍 f.com");
                assert!(!m.text.contains("a.com"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_admin_commands_refuse_non_admins() {
        let bot = bot();
        let transport = RecordingTransport::default();

        bot.handle(&transport, message(5, "/stats")).await.unwrap();
        assert_eq!(transport.last_message_text(), ADMIN_ONLY_TEXT);

        bot.handle(&transport, message(5, "/broadcast")).await.unwrap();
        assert_eq!(transport.last_message_text(), ADMIN_ONLY_TEXT);

        bot.handle(&transport, message(5, "/help")).await.unwrap();
        assert!(!transport.last_message_text().contains("Admin Commands"));

        bot.handle(&transport, message(ADMIN, "/help")).await.unwrap();
        assert!(transport.last_message_text().contains("Admin Commands"));
    }

    #[tokio::test]
    async fn test_stats_for_admin() {
        let bot = bot();
        let transport = RecordingTransport::default();

        bot.handle(&transport, message(5, "example.com")).await.unwrap();
        bot.handle(&transport, message(ADMIN, "/stats")).await.unwrap();

        let text = transport.last_message_text();
        assert!(text.contains("Total users: 1"));
        assert!(text.contains("Total searches: 1"));
    }

    #[tokio::test]
    async fn test_broadcast_tallies_failures() {
        let bot = bot().with_user_store(Box::new(MemoryUserStore::with_users([ADMIN, 1, 2, 3])));
        let transport = RecordingTransport::failing_for([2]);

        bot.handle(&transport, message(ADMIN, "/broadcast")).await.unwrap();
        bot.handle(&transport, message(ADMIN, "Maintenance <tonight>"))
            .await
            .unwrap();

        let sent = transport.sent();
        let announcements: Vec<i64> = sent
            .iter()
            .filter_map(|s| match s {
                Sent::Message(chat, m) if m.text.starts_with("📢") => Some(*chat),
                _ => None,
            })
            .collect();
        assert_eq!(announcements.len(), 3);
        assert!(sent.iter().any(|s| matches!(
            s,
            Sent::Message(_, m) if m.text.contains("Maintenance &lt;tonight&gt;")
        )));
        assert_eq!(
            transport.last_message_text(),
            "✅ Message sent to 3 out of 4 users."
        );

        // The next free text is a normal domain submission again.
        bot.handle(&transport, message(ADMIN, "example.com")).await.unwrap();
        assert!(transport.last_message_text().starts_with("What would you like"));
    }

    #[tokio::test]
    async fn test_group_member_does_not_consume_pending_broadcast() {
        let bot = bot().with_user_store(Box::new(MemoryUserStore::with_users([ADMIN, 7, 8])));
        let transport = RecordingTransport::default();
        let group = -500;

        bot.handle(&transport, group_message(group, ADMIN, "/broadcast"))
            .await
            .unwrap();
        bot.handle(&transport, group_message(group, 7, "example.com"))
            .await
            .unwrap();
        assert!(transport.last_message_text().starts_with("What would you like"));

        bot.handle(&transport, group_message(group, 7, "/cancel"))
            .await
            .unwrap();
        assert_eq!(transport.last_message_text(), "Nothing to cancel.");

        bot.handle(&transport, group_message(group, ADMIN, "Maintenance tonight"))
            .await
            .unwrap();

        let announcements = transport
            .sent()
            .iter()
            .filter(|s| matches!(s, Sent::Message(_, m) if m.text.starts_with("📢")))
            .count();
        assert_eq!(announcements, 3);
        assert_eq!(
            transport.last_message_text(),
            "✅ Message sent to 3 out of 3 users."
        );
    }

    #[tokio::test]
    async fn test_broadcast_cancel() {
        let bot = bot();
        let transport = RecordingTransport::default();

        bot.handle(&transport, message(ADMIN, "/cancel")).await.unwrap();
        assert_eq!(transport.last_message_text(), "Nothing to cancel.");

        bot.handle(&transport, message(ADMIN, "/broadcast")).await.unwrap();
        bot.handle(&transport, message(ADMIN, "/cancel")).await.unwrap();
        assert_eq!(transport.last_message_text(), "Operation canceled.");

        bot.handle(&transport, message(ADMIN, "example.com")).await.unwrap();
        assert!(transport.last_message_text().starts_with("What would you like"));
    }

    #[tokio::test]
    async fn test_config_map_overrides_register_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonConfigStore::empty(dir.path().join("config.json"));
        store
            .set("register_url", "https://registrar.example/search")
            .unwrap();
        let bot = bot().with_config_store(store);
        let transport = RecordingTransport::default();

        bot.handle(&transport, press(5, "whois_free-name.net")).await.unwrap();

        assert_eq!(
            transport.last_edit().keyboard[0][0],
            Button::url(
                "🛒 Register This Domain",
                "https://registrar.example/search?domain=free-name.net"
            )
        );
    }
}
