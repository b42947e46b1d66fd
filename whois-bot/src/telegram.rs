//! Telegram Bot API adapter.
//!
//! Implements [`ChatTransport`] over the HTTP Bot API with `reqwest`, and
//! runs the long-polling loop that feeds updates into a [`WhoisBot`]. Only
//! the handful of methods and fields the bot uses are modelled.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use whois_bot_lib::{
    BotError, Button, ChatTransport, ChatUser, Incoming, MessageRef, OutgoingMessage, ParseMode,
    WhoisBot, WhoisFetcher, VERSION,
};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Extra time on top of the long-poll timeout before the HTTP request gives up.
const HTTP_GRACE: Duration = Duration::from_secs(10);

/// Client for the Telegram Bot API.
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    poll_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Serialize)]
struct GetUpdatesParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'static [&'static str],
}

#[derive(Debug, Serialize)]
struct SendMessageParams<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup>,
    disable_web_page_preview: bool,
}

#[derive(Debug, Serialize)]
struct EditMessageTextParams<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup>,
    disable_web_page_preview: bool,
}

#[derive(Debug, Serialize)]
struct AnswerCallbackQueryParams<'a> {
    callback_query_id: &'a str,
}

#[derive(Debug, Serialize, PartialEq)]
struct InlineKeyboardMarkup {
    inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Serialize, PartialEq)]
struct InlineKeyboardButton {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

/// Sent message as returned by `sendMessage`.
#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
    chat: Chat,
}

impl Update {
    /// Convert to the router's event type. Updates the bot does not handle
    /// (edits, channel posts, messages from other bots) yield `None`.
    pub fn into_incoming(self) -> Option<Incoming> {
        if let Some(query) = self.callback_query {
            let message = query.message.as_ref().map(|m| MessageRef {
                chat_id: m.chat.id,
                message_id: m.message_id,
            });
            return Some(Incoming::Callback {
                id: query.id,
                from: chat_user(&query.from),
                message,
                data: query.data.unwrap_or_default(),
            });
        }

        let message = self.message?;
        let from = message.from.as_ref().filter(|u| !u.is_bot)?;
        Some(Incoming::Message {
            chat_id: message.chat.id,
            from: chat_user(from),
            text: message.text?,
        })
    }
}

fn chat_user(user: &User) -> ChatUser {
    ChatUser {
        id: user.id,
        first_name: user.first_name.clone(),
    }
}

fn parse_mode(mode: ParseMode) -> Option<&'static str> {
    match mode {
        ParseMode::Html => Some("HTML"),
        ParseMode::Plain => None,
    }
}

fn reply_markup(keyboard: &[Vec<Button>]) -> Option<InlineKeyboardMarkup> {
    if keyboard.is_empty() {
        return None;
    }

    let inline_keyboard = keyboard
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| match button {
                    Button::Callback { text, data } => InlineKeyboardButton {
                        text: text.clone(),
                        callback_data: Some(data.encode()),
                        url: None,
                    },
                    Button::Url { text, url } => InlineKeyboardButton {
                        text: text.clone(),
                        callback_data: None,
                        url: Some(url.clone()),
                    },
                })
                .collect()
        })
        .collect();

    Some(InlineKeyboardMarkup { inline_keyboard })
}

/// Overall HTTP timeout for a long poll of `poll_timeout`.
fn http_timeout(poll_timeout: Duration) -> Duration {
    poll_timeout.saturating_add(HTTP_GRACE)
}

/// Convert a request failure. The URL carries the bot token, so it is stripped.
fn request_error(method: &str, err: reqwest::Error, timeout: Duration) -> BotError {
    if err.is_timeout() {
        return BotError::timeout(method, timeout);
    }
    BotError::transport_with_source(
        format!("{} request failed", method),
        err.without_url().to_string(),
    )
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str, poll_timeout: Duration) -> Result<Self, BotError> {
        let http = reqwest::Client::builder()
            .timeout(http_timeout(poll_timeout))
            .user_agent(format!("whois-bot/{}", VERSION))
            .build()
            .map_err(|e| {
                BotError::config(format!("Failed to build HTTP client: {}", e.without_url()))
            })?;

        Ok(Self {
            http,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            poll_timeout,
        })
    }

    async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, BotError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, method);
        let timeout = http_timeout(self.poll_timeout);

        let response = self
            .http
            .post(&url)
            .json(params)
            .send()
            .await
            .map_err(|e| request_error(method, e, timeout))?;

        let body: ApiResponse<R> = response
            .json()
            .await
            .map_err(|e| request_error(method, e, timeout))?;

        if body.ok {
            return body
                .result
                .ok_or_else(|| BotError::internal(format!("{} returned no result", method)));
        }

        let description = body.description.unwrap_or_default();
        match body.error_code {
            Some(401) | Some(404) => Err(BotError::config(format!(
                "Telegram rejected the bot token ({}): {}",
                method, description
            ))),
            code => Err(BotError::transport_with_source(
                format!("{} failed", method),
                format!("HTTP {}: {}", code.unwrap_or_default(), description),
            )),
        }
    }

    /// Check the token and return the bot's username.
    pub async fn get_me(&self) -> Result<String, BotError> {
        let me: User = self.call("getMe", &serde_json::json!({})).await?;
        Ok(me.username.unwrap_or(me.first_name))
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, BotError> {
        let params = GetUpdatesParams {
            offset,
            timeout: self.poll_timeout.as_secs(),
            allowed_updates: &["message", "callback_query"],
        };
        self.call("getUpdates", &params).await
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_message(
        &self,
        chat_id: i64,
        message: &OutgoingMessage,
    ) -> Result<MessageRef, BotError> {
        let params = SendMessageParams {
            chat_id,
            text: &message.text,
            parse_mode: parse_mode(message.parse_mode),
            reply_markup: reply_markup(&message.keyboard),
            disable_web_page_preview: true,
        };
        let sent: SentMessage = self.call("sendMessage", &params).await?;
        Ok(MessageRef {
            chat_id: sent.chat.id,
            message_id: sent.message_id,
        })
    }

    async fn edit_message(
        &self,
        target: MessageRef,
        message: &OutgoingMessage,
    ) -> Result<(), BotError> {
        let params = EditMessageTextParams {
            chat_id: target.chat_id,
            message_id: target.message_id,
            text: &message.text,
            parse_mode: parse_mode(message.parse_mode),
            reply_markup: reply_markup(&message.keyboard),
            disable_web_page_preview: true,
        };
        match self.call::<_, serde_json::Value>("editMessageText", &params).await {
            Ok(_) => Ok(()),
            // Pressing the same button twice re-renders identical content.
            Err(BotError::TransportError {
                source: Some(source),
                ..
            }) if source.contains("message is not modified") => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), BotError> {
        let params = AnswerCallbackQueryParams {
            callback_query_id: callback_id,
        };
        let _: bool = self.call("answerCallbackQuery", &params).await?;
        Ok(())
    }
}

/// Poll for updates until `shutdown` resolves, handling each in its own task.
pub async fn run_polling<F, S>(
    bot: Arc<WhoisBot<F>>,
    client: Arc<TelegramClient>,
    shutdown: S,
) -> Result<(), BotError>
where
    F: WhoisFetcher + 'static,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut offset: Option<i64> = None;
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let result = tokio::select! {
            _ = &mut shutdown => break,
            result = client.get_updates(offset) => result,
        };

        match result {
            Ok(updates) => {
                backoff = INITIAL_BACKOFF;
                if !updates.is_empty() {
                    debug!(count = updates.len(), "Received updates");
                }

                for update in updates {
                    offset = Some(update.update_id + 1);
                    let Some(incoming) = update.into_incoming() else {
                        continue;
                    };

                    let bot = Arc::clone(&bot);
                    let client = Arc::clone(&client);
                    tokio::spawn(async move {
                        bot.dispatch(client.as_ref(), incoming).await;
                    });
                }
                bot.prune_conversations();
            }
            Err(e) if e.is_retryable() => {
                warn!(error = %e, retry_in = ?backoff, "Polling failed");
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            Err(e) => {
                error!(error = %e, "Polling stopped");
                return Err(e);
            }
        }
    }

    info!("Shutdown requested, polling stopped");
    Ok(())
}
