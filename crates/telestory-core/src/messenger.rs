//! Capabilities the engine needs from the messaging transport.
//!
//! [`Messenger`] is implemented by the Telegram client in the server crate
//! and by a recording fake in tests. All trait methods use `impl Future` in
//! their signatures, like the repository traits.

use std::future::Future;
use std::path::Path;

use strum::Display;
use thiserror::Error;

/// A user, group, or channel the transport can deliver to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// A message previously sent by the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat: ChatId,
    pub message_id: i64,
}

/// Extensions routed to the video upload path. Everything else is a photo.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "webm", "mkv", "avi"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// Classify by file extension (without the dot), case-insensitively.
    pub fn from_extension(extension: Option<&str>) -> Self {
        match extension {
            Some(ext) if VIDEO_EXTENSIONS.iter().any(|v| v.eq_ignore_ascii_case(ext)) => {
                MediaKind::Video
            }
            _ => MediaKind::Photo,
        }
    }
}

/// Durable reference to media already stored by the transport.
///
/// Sending by reference re-uses the stored copy instead of uploading the
/// bytes again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMedia {
    pub kind: MediaKind,
    pub file_id: String,
}

#[derive(Debug, Error)]
pub enum MessengerError {
    /// The request never got a usable answer (network, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The API answered but refused the call.
    #[error("{method} rejected: {description}")]
    Api { method: String, description: String },

    /// The API answered with something we could not interpret.
    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait Messenger: Send + Sync + 'static {
    fn send_text(
        &self,
        chat: ChatId,
        text: &str,
    ) -> impl Future<Output = Result<MessageRef, MessengerError>> + Send;

    fn edit_text(
        &self,
        message: MessageRef,
        text: &str,
    ) -> impl Future<Output = Result<(), MessengerError>> + Send;

    fn delete(&self, message: MessageRef) -> impl Future<Output = Result<(), MessengerError>> + Send;

    /// Look up a channel by numeric id, confirming the bot can reach it.
    fn resolve_channel(&self, id: i64) -> impl Future<Output = Result<ChatId, MessengerError>> + Send;

    /// Upload a local file to `chat` and return the durable reference.
    fn upload_media(
        &self,
        chat: ChatId,
        kind: MediaKind,
        path: &Path,
        caption: &str,
    ) -> impl Future<Output = Result<RemoteMedia, MessengerError>> + Send;

    /// Send previously uploaded media by reference.
    fn send_media(
        &self,
        chat: ChatId,
        media: &RemoteMedia,
        caption: &str,
    ) -> impl Future<Output = Result<MessageRef, MessengerError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_extension() {
        assert_eq!(MediaKind::from_extension(Some("mp4")), MediaKind::Video);
        assert_eq!(MediaKind::from_extension(Some("MOV")), MediaKind::Video);
        assert_eq!(MediaKind::from_extension(Some("jpg")), MediaKind::Photo);
        assert_eq!(MediaKind::from_extension(Some("webp")), MediaKind::Photo);
        assert_eq!(MediaKind::from_extension(None), MediaKind::Photo);
    }
}
