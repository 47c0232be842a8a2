//! Minimal Telegram Bot API client: long polling, messages and inline keyboards.

use std::{fmt, time::Duration};

use color_eyre::{
    eyre::{eyre, Context},
    Result,
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Seconds `getUpdates` holds the connection open.
pub const POLL_TIMEOUT: u64 = 60;

#[derive(Clone)]
pub struct Telegram {
    http: Client,
    base: Url,
    token: SecretString,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub reply_to_message: Option<Box<Message>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Serialize)]
struct GetUpdates<'a> {
    offset: i64,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to_message_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboardMarkup>,
}

#[derive(Debug, Serialize)]
struct EditMessageText<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboardMarkup>,
}

#[derive(Debug, Serialize)]
struct AnswerCallbackQuery<'a> {
    callback_query_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

impl Telegram {
    pub fn new(base: Url, token: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT + 15))
            .build()
            .wrap_err("Build telegram http client")?;
        Ok(Self { http, base, token })
    }

    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", &serde_json::json!({})).await
    }

    /// Long-polls for updates with ids at or after `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let req = GetUpdates {
            offset,
            timeout: POLL_TIMEOUT,
            allowed_updates: &["message", "callback_query"],
        };
        self.call("getUpdates", &req).await
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to_message_id: Option<i64>,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message> {
        let req = SendMessage {
            chat_id,
            text,
            reply_to_message_id,
            reply_markup,
        };
        self.call("sendMessage", &req).await
    }

    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<()> {
        let req = EditMessageText {
            chat_id,
            message_id,
            text,
            reply_markup,
        };
        // result is the edited message, or `true` for inline messages
        self.call::<serde_json::Value>("editMessageText", &req)
            .await?;
        Ok(())
    }

    pub async fn answer_callback_query(&self, id: &str, text: Option<&str>) -> Result<()> {
        let req = AnswerCallbackQuery {
            callback_query_id: id,
            text,
        };
        self.call::<bool>("answerCallbackQuery", &req).await?;
        Ok(())
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &impl Serialize) -> Result<T> {
        // the token is part of the path, so the url itself is never logged
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| eyre!("telegram api url cannot be a base: {}", self.base))?
            .pop_if_empty()
            .push(&format!("bot{}", self.token.expose_secret()))
            .push(method);
        debug!(%method, "POST");

        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .wrap_err_with(|| format!("telegram {method}"))?;
        let status = resp.status();
        let body = resp.bytes().await?;
        trace!(%method, %status, body = %String::from_utf8_lossy(&body));

        let resp: ApiResponse<T> = serde_json::from_slice(&body)
            .wrap_err_with(|| format!("Decode telegram {method} response; status: {status}"))?;
        if !resp.ok {
            return Err(eyre!(
                "telegram {method} failed; status: {status}; description: {:?}",
                resp.description.unwrap_or_default()
            ));
        }
        resp.result
            .ok_or_else(|| eyre!("telegram {method} returned no result"))
    }
}

impl InlineKeyboardMarkup {
    /// One row per chunk of `per_row` buttons.
    pub fn rows(buttons: Vec<InlineKeyboardButton>, per_row: usize) -> Self {
        let inline_keyboard = buttons
            .chunks(per_row.max(1))
            .map(<[InlineKeyboardButton]>::to_vec)
            .collect();
        Self { inline_keyboard }
    }
}

impl CallbackQuery {
    /// Sender of the command this callback's message answers, else the clicker.
    pub fn requester(&self) -> i64 {
        self.message
            .as_ref()
            .and_then(|m| m.reply_to_message.as_ref())
            .and_then(|m| m.from.as_ref())
            .map(|u| u.id)
            .unwrap_or(self.from.id)
    }
}

impl fmt::Debug for Telegram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telegram")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}
