//! In-process [`Messenger`] that records every call.

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use crate::messenger::{ChatId, MediaKind, MessageRef, Messenger, MessengerError, RemoteMedia};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SendText { chat: ChatId, text: String },
    EditText { message: MessageRef, text: String },
    Delete { message: MessageRef },
    Upload { chat: ChatId, kind: MediaKind, caption: String, file_existed: bool },
    SendMedia { chat: ChatId, file_id: String, caption: String },
}

#[derive(Debug, Default)]
pub struct RecordingMessenger {
    calls: Mutex<Vec<Call>>,
    next_message: AtomicI64,
    next_file: AtomicI64,
    fail_uploads: Option<String>,
    fail_sends: Option<String>,
    upload_delay: Option<Duration>,
    unreachable_channel: bool,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject uploads whose caption contains `needle`.
    pub fn fail_uploads_containing(mut self, needle: &str) -> Self {
        self.fail_uploads = Some(needle.to_owned());
        self
    }

    /// Reject media sends whose caption contains `needle`.
    pub fn fail_sends_containing(mut self, needle: &str) -> Self {
        self.fail_sends = Some(needle.to_owned());
        self
    }

    pub fn slow_uploads(mut self, delay: Duration) -> Self {
        self.upload_delay = Some(delay);
        self
    }

    pub fn without_channel(mut self) -> Self {
        self.unreachable_channel = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Bodies of plain text messages, in order.
    pub fn texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SendText { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Bodies of message edits, in order.
    pub fn edits(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::EditText { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn uploads(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Upload { .. })).count()
    }

    pub fn media_sent(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::SendMedia { .. })).count()
    }

    pub fn deletes(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Delete { .. })).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn rejects(rule: &Option<String>, caption: &str) -> bool {
        rule.as_deref().is_some_and(|needle| caption.contains(needle))
    }
}

impl Messenger for RecordingMessenger {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageRef, MessengerError> {
        self.record(Call::SendText { chat, text: text.to_owned() });
        let message_id = self.next_message.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MessageRef { chat, message_id })
    }

    async fn edit_text(&self, message: MessageRef, text: &str) -> Result<(), MessengerError> {
        self.record(Call::EditText { message, text: text.to_owned() });
        Ok(())
    }

    async fn delete(&self, message: MessageRef) -> Result<(), MessengerError> {
        self.record(Call::Delete { message });
        Ok(())
    }

    async fn resolve_channel(&self, id: i64) -> Result<ChatId, MessengerError> {
        if self.unreachable_channel {
            return Err(MessengerError::Api {
                method: "getChat".to_owned(),
                description: "Bad Request: chat not found".to_owned(),
            });
        }
        Ok(ChatId(id))
    }

    async fn upload_media(
        &self,
        chat: ChatId,
        kind: MediaKind,
        path: &Path,
        caption: &str,
    ) -> Result<RemoteMedia, MessengerError> {
        self.record(Call::Upload {
            chat,
            kind,
            caption: caption.to_owned(),
            file_existed: path.exists(),
        });
        if let Some(delay) = self.upload_delay {
            tokio::time::sleep(delay).await;
        }
        if Self::rejects(&self.fail_uploads, caption) {
            return Err(MessengerError::Transport("upload refused".to_owned()));
        }
        let n = self.next_file.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RemoteMedia { kind, file_id: format!("file-{n}") })
    }

    async fn send_media(
        &self,
        chat: ChatId,
        media: &RemoteMedia,
        caption: &str,
    ) -> Result<MessageRef, MessengerError> {
        self.record(Call::SendMedia {
            chat,
            file_id: media.file_id.clone(),
            caption: caption.to_owned(),
        });
        if Self::rejects(&self.fail_sends, caption) {
            return Err(MessengerError::Api {
                method: "sendPhoto".to_owned(),
                description: "Forbidden: bot was blocked by the user".to_owned(),
            });
        }
        let message_id = self.next_message.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MessageRef { chat, message_id })
    }
}
