//! Minimal Telegram Bot API client.
//!
//! Implements [`Messenger`] for the engine plus the few calls the command
//! router needs (`getUpdates`, `answerCallbackQuery`, inline keyboards).

use std::path::Path;
use std::time::Duration;

use reqwest::{Body, Client};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use telestory_core::{ChatId, Language, MediaKind, MessageRef, Messenger, MessengerError, RemoteMedia, UserProfile};
use tokio_util::io::ReaderStream;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<TelegramUser>,
    pub text: Option<String>,
    #[serde(default)]
    pub photo: Vec<FileRef>,
    pub video: Option<FileRef>,
    pub animation: Option<FileRef>,
    pub document: Option<FileRef>,
}

impl Message {
    pub fn reference(&self) -> MessageRef {
        MessageRef { chat: ChatId(self.chat.id), message_id: self.message_id }
    }

    /// Durable id of the media this message carries, if any. Photos come in
    /// several sizes; the last one is the largest.
    fn media_file_id(&self) -> Option<&str> {
        self.photo
            .last()
            .or(self.video.as_ref())
            .or(self.animation.as_ref())
            .or(self.document.as_ref())
            .map(|f| f.file_id.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileRef {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    #[serde(default)]
    pub is_premium: bool,
}

impl From<&TelegramUser> for UserProfile {
    fn from(user: &TelegramUser) -> Self {
        UserProfile {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone().unwrap_or_default(),
            username: user.username.clone().unwrap_or_default(),
            is_telegram_premium: user.is_premium,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TelegramUser,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Serialize)]
struct InlineButton {
    text: &'static str,
    callback_data: String,
}

/// Callback payload for a language button, e.g. `lang|uz`.
pub fn language_callback(language: Language) -> String {
    format!("lang|{language}")
}

#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base: String,
}

impl TelegramClient {
    /// Every call is bounded by `call_timeout` except `getUpdates`, which
    /// sets its own limit around the long-poll window.
    pub fn new(api_url: &str, token: &str, call_timeout: Duration) -> Result<Self, MessengerError> {
        let client = Client::builder()
            .user_agent(telestory_fetch::catalog::USER_AGENT)
            .timeout(call_timeout)
            .build()
            .map_err(|e| MessengerError::Transport(e.to_string()))?;
        Ok(Self::with_client(api_url, token, client))
    }

    pub fn with_client(api_url: &str, token: &str, client: Client) -> Self {
        Self {
            client,
            base: format!("{}/bot{token}", api_url.trim_end_matches('/')),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T, MessengerError> {
        let resp = self
            .client
            .post(format!("{}/{method}", self.base))
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        unwrap_response(method, resp).await
    }

    async fn call_multipart<T: DeserializeOwned>(&self, method: &str, form: Form) -> Result<T, MessengerError> {
        let resp = self
            .client
            .post(format!("{}/{method}", self.base))
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        unwrap_response(method, resp).await
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: i64, poll: Duration) -> Result<Vec<Update>, MessengerError> {
        let resp = self
            .client
            .post(format!("{}/getUpdates", self.base))
            .json(&json!({
                "offset": offset,
                "timeout": poll.as_secs(),
                "allowed_updates": ["message", "callback_query"],
            }))
            .timeout(poll + Duration::from_secs(10))
            .send()
            .await
            .map_err(transport)?;
        unwrap_response("getUpdates", resp).await
    }

    pub async fn answer_callback_query(&self, id: &str) -> Result<(), MessengerError> {
        let _: bool = self
            .call("answerCallbackQuery", &json!({ "callback_query_id": id }))
            .await?;
        Ok(())
    }

    /// Send `text` with one button per supported language.
    pub async fn send_language_menu(&self, chat: ChatId, text: &str) -> Result<MessageRef, MessengerError> {
        let row: Vec<InlineButton> = Language::ALL
            .iter()
            .map(|&lang| InlineButton {
                text: lang.button_label(),
                callback_data: language_callback(lang),
            })
            .collect();
        let message: Message = self
            .call(
                "sendMessage",
                &json!({
                    "chat_id": chat.0,
                    "text": text,
                    "reply_markup": { "inline_keyboard": [row] },
                }),
            )
            .await?;
        Ok(message.reference())
    }

    pub async fn send_markdown(&self, chat: ChatId, text: &str) -> Result<MessageRef, MessengerError> {
        let message: Message = self
            .call(
                "sendMessage",
                &json!({ "chat_id": chat.0, "text": text, "parse_mode": "Markdown" }),
            )
            .await?;
        Ok(message.reference())
    }
}

fn transport(err: reqwest::Error) -> MessengerError {
    // Never echo the request URL: it carries the bot token.
    MessengerError::Transport(err.without_url().to_string())
}

async fn unwrap_response<T: DeserializeOwned>(
    method: &str,
    resp: reqwest::Response,
) -> Result<T, MessengerError> {
    let status = resp.status();
    let body = resp.bytes().await.map_err(transport)?;
    let parsed: ApiResponse<T> = serde_json::from_slice(&body)
        .map_err(|e| MessengerError::Protocol(format!("{method} returned {status}: {e}")))?;

    if !parsed.ok {
        return Err(MessengerError::Api {
            method: method.to_owned(),
            description: parsed.description.unwrap_or_else(|| status.to_string()),
        });
    }
    parsed
        .result
        .ok_or_else(|| MessengerError::Protocol(format!("{method} returned no result")))
}

fn media_method(kind: MediaKind) -> (&'static str, &'static str) {
    match kind {
        MediaKind::Photo => ("sendPhoto", "photo"),
        MediaKind::Video => ("sendVideo", "video"),
    }
}

impl Messenger for TelegramClient {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageRef, MessengerError> {
        let message: Message = self
            .call("sendMessage", &json!({ "chat_id": chat.0, "text": text }))
            .await?;
        Ok(message.reference())
    }

    async fn edit_text(&self, message: MessageRef, text: &str) -> Result<(), MessengerError> {
        // The result is the edited message, or `true` for inline messages.
        let _: Value = self
            .call(
                "editMessageText",
                &json!({ "chat_id": message.chat.0, "message_id": message.message_id, "text": text }),
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, message: MessageRef) -> Result<(), MessengerError> {
        let _: bool = self
            .call(
                "deleteMessage",
                &json!({ "chat_id": message.chat.0, "message_id": message.message_id }),
            )
            .await?;
        Ok(())
    }

    async fn resolve_channel(&self, id: i64) -> Result<ChatId, MessengerError> {
        let chat: Chat = self.call("getChat", &json!({ "chat_id": id })).await?;
        Ok(ChatId(chat.id))
    }

    async fn upload_media(
        &self,
        chat: ChatId,
        kind: MediaKind,
        path: &Path,
        caption: &str,
    ) -> Result<RemoteMedia, MessengerError> {
        let (method, field) = media_method(kind);
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("story")
            .to_owned();
        debug!(%method, file = %file_name, size, "uploading media");

        let body = Body::wrap_stream(ReaderStream::new(file));
        let form = Form::new()
            .text("chat_id", chat.0.to_string())
            .text("caption", caption.to_owned())
            .part(field, Part::stream_with_length(body, size).file_name(file_name));
        let message: Message = self.call_multipart(method, form).await?;

        let file_id = message
            .media_file_id()
            .ok_or_else(|| MessengerError::Protocol(format!("{method} returned no media")))?;
        Ok(RemoteMedia { kind, file_id: file_id.to_owned() })
    }

    async fn send_media(
        &self,
        chat: ChatId,
        media: &RemoteMedia,
        caption: &str,
    ) -> Result<MessageRef, MessengerError> {
        let (method, field) = media_method(media.kind);
        let message: Message = self
            .call(
                method,
                &json!({ "chat_id": chat.0, field: media.file_id, "caption": caption }),
            )
            .await?;
        Ok(message.reference())
    }
}
