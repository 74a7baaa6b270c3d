//! Sequential archive-then-relay of fetched items.
//!
//! Each item is uploaded to the archive channel first; the requester then
//! receives it by the archive's durable reference, so the bytes are uploaded
//! exactly once. Scratch files are consumed as they are processed and the
//! rest are dropped (and deleted) when the loop ends for any reason.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use telestory_fetch::{CatalogItem, FetchOutcome, ScratchFile, bounded};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::caption::{archive_caption, requester_caption};
use crate::error::CoreError;
use crate::i18n::{Text, render};
use crate::messenger::{ChatId, MediaKind, Messenger, MessengerError};
use crate::model::User;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// Items the requester actually received.
    pub relayed: usize,
    /// Items that had a scratch file and were handed to the archive.
    pub attempted: usize,
    /// Catalog size, including items that failed to download.
    pub total: usize,
    /// The request was cancelled or hit its deadline mid-loop.
    pub interrupted: bool,
}

impl RelayReport {
    pub fn is_complete(&self) -> bool {
        self.relayed == self.total
    }
}

/// Run a messenger call under the request token and the per-call timeout.
pub(crate) async fn call_bounded<T, F>(
    cancel: &CancellationToken,
    timeout: Duration,
    call: F,
) -> Result<T, CoreError>
where
    F: Future<Output = Result<T, MessengerError>>,
{
    Ok(bounded(cancel, timeout, call).await??)
}

pub struct RelayPipeline<M> {
    messenger: Arc<M>,
    archive: ChatId,
    call_timeout: Duration,
}

impl<M: Messenger> RelayPipeline<M> {
    pub fn new(messenger: Arc<M>, archive: ChatId, call_timeout: Duration) -> Self {
        Self { messenger, archive, call_timeout }
    }

    pub async fn relay(
        &self,
        mut outcomes: Vec<FetchOutcome>,
        user: &User,
        input: &str,
        cancel: &CancellationToken,
    ) -> RelayReport {
        outcomes.sort_by_key(|o| o.index);
        let mut report = RelayReport { total: outcomes.len(), ..Default::default() };

        let mut pending = outcomes.into_iter();
        for outcome in pending.by_ref() {
            if cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }
            let Some(file) = outcome.file else {
                continue;
            };
            report.attempted += 1;
            if self.relay_one(outcome.index, file, &outcome.item, user, input, cancel).await {
                report.relayed += 1;
            }
        }
        // Whatever was not reached still owns its scratch file.
        drop(pending);
        if cancel.is_cancelled() {
            report.interrupted = true;
        }

        info!(
            user_id = user.id,
            relayed = report.relayed,
            attempted = report.attempted,
            total = report.total,
            interrupted = report.interrupted,
            "relay finished"
        );

        if report.relayed < report.total {
            self.send_partial_notice(user, &report).await;
        }
        report
    }

    /// Archive one item and forward it. Returns whether the requester got it.
    async fn relay_one(
        &self,
        index: usize,
        file: ScratchFile,
        item: &CatalogItem,
        user: &User,
        input: &str,
        cancel: &CancellationToken,
    ) -> bool {
        let kind = MediaKind::from_extension(file.extension().as_deref());
        let caption = archive_caption(user, input, item.timestamp, &item.caption);

        let uploaded = call_bounded(
            cancel,
            self.call_timeout,
            self.messenger.upload_media(self.archive, kind, file.path(), &caption),
        )
        .await;
        file.remove().await;

        let media = match uploaded {
            Ok(media) => media,
            Err(e) => {
                warn!(user_id = user.id, index, %kind, error = %e, "archive upload failed");
                return false;
            }
        };
        debug!(user_id = user.id, index, file_id = %media.file_id, "item archived");

        let caption = requester_caption(user.language, input, item.timestamp, &item.caption);
        match call_bounded(
            cancel,
            self.call_timeout,
            self.messenger.send_media(ChatId(user.id), &media, &caption),
        )
        .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(user_id = user.id, index, error = %e, "relay to requester failed");
                false
            }
        }
    }

    async fn send_partial_notice(&self, user: &User, report: &RelayReport) {
        let notice = render(
            user.language,
            Text::Partial,
            &[("relayed", &report.relayed), ("total", &report.total)],
        );
        // The request token may already be cancelled; the notice still goes out.
        let detached = CancellationToken::new();
        if let Err(e) = call_bounded(
            &detached,
            self.call_timeout,
            self.messenger.send_text(ChatId(user.id), &notice),
        )
        .await
        {
            warn!(user_id = user.id, error = %e, "failed to send partial notice");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use chrono::{TimeZone, Utc};
    use tracing_test::traced_test;

    use super::*;
    use crate::model::Role;
    use crate::testing::{Call, RecordingMessenger};

    const ARCHIVE: ChatId = ChatId(-100_777);

    fn user() -> User {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        User {
            id: 11,
            first_name: "Sam".to_owned(),
            last_name: String::new(),
            username: "sam".to_owned(),
            language: None,
            is_telegram_premium: false,
            premium_expires_at: None,
            role: Role::User,
            created_at: t,
            updated_at: t,
            last_active_at: None,
        }
    }

    fn item(caption: &str) -> CatalogItem {
        CatalogItem {
            path: "s.jpg".to_owned(),
            timestamp: 1_700_000_000,
            caption: caption.to_owned(),
        }
    }

    fn fetched(dir: &Path, index: usize, name: &str, caption: &str) -> (FetchOutcome, PathBuf) {
        let path = dir.join(name);
        std::fs::write(&path, b"data").unwrap();
        let outcome = FetchOutcome::fetched(index, item(caption), ScratchFile::adopt(path.clone()));
        (outcome, path)
    }

    fn pipeline(messenger: &Arc<RecordingMessenger>) -> RelayPipeline<RecordingMessenger> {
        RelayPipeline::new(Arc::clone(messenger), ARCHIVE, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn archives_then_relays_by_reference() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = Arc::new(RecordingMessenger::new());
        let (a, a_path) = fetched(dir.path(), 0, "a.MP4", "first");
        let (b, b_path) = fetched(dir.path(), 1, "b.jpg", "");

        let report = pipeline(&messenger)
            .relay(vec![b, a], &user(), "@alice", &CancellationToken::new())
            .await;

        assert_eq!(report, RelayReport { relayed: 2, attempted: 2, total: 2, interrupted: false });
        assert!(!a_path.exists() && !b_path.exists());

        let calls = messenger.calls();
        assert_eq!(calls.len(), 4);
        match &calls[0] {
            Call::Upload { chat, kind, caption, file_existed } => {
                assert_eq!(*chat, ARCHIVE);
                assert_eq!(*kind, MediaKind::Video);
                assert!(caption.starts_with("📥 Requested by: Sam (@sam)"));
                assert!(file_existed);
            }
            other => panic!("unexpected call {other:?}"),
        }
        match &calls[1] {
            Call::SendMedia { chat, file_id, caption } => {
                assert_eq!(*chat, ChatId(11));
                assert_eq!(file_id, "file-1");
                assert_eq!(caption, "first\n\n📅 2023-11-14 22:13 UTC");
            }
            other => panic!("unexpected call {other:?}"),
        }
        match &calls[3] {
            Call::SendMedia { caption, .. } => assert!(caption.starts_with("Story from @alice")),
            other => panic!("unexpected call {other:?}"),
        }
        assert!(messenger.texts().is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn failures_are_tallied_and_noticed_once() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = Arc::new(RecordingMessenger::new().fail_uploads_containing("broken"));
        let (ok, _) = fetched(dir.path(), 0, "ok.jpg", "fine");
        let (bad, bad_path) = fetched(dir.path(), 2, "bad.jpg", "broken");
        let missing = FetchOutcome::failed(1, item("never"), "404");

        let report = pipeline(&messenger)
            .relay(vec![ok, missing, bad], &user(), "@alice", &CancellationToken::new())
            .await;

        assert_eq!(report, RelayReport { relayed: 1, attempted: 2, total: 3, interrupted: false });
        assert!(!bad_path.exists());
        assert_eq!(
            messenger.texts(),
            vec!["⚠️ Delivered 1 of 3 stories. The rest could not be delivered.".to_owned()]
        );
        assert!(logs_contain("archive upload failed"));
    }

    #[tokio::test]
    async fn blocked_requester_is_not_counted_as_relayed() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = Arc::new(RecordingMessenger::new().fail_sends_containing("second"));
        let (a, _) = fetched(dir.path(), 0, "a.jpg", "first");
        let (b, b_path) = fetched(dir.path(), 1, "b.jpg", "second");

        let report = pipeline(&messenger)
            .relay(vec![a, b], &user(), "@alice", &CancellationToken::new())
            .await;

        assert_eq!(report, RelayReport { relayed: 1, attempted: 2, total: 2, interrupted: false });
        assert_eq!(messenger.uploads(), 2);
        assert!(!b_path.exists());
        assert_eq!(messenger.texts().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_request_stops_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = Arc::new(RecordingMessenger::new());
        let (a, a_path) = fetched(dir.path(), 0, "a.jpg", "x");
        let (b, b_path) = fetched(dir.path(), 1, "b.jpg", "y");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = pipeline(&messenger).relay(vec![a, b], &user(), "@alice", &cancel).await;

        assert_eq!(report, RelayReport { relayed: 0, attempted: 0, total: 2, interrupted: true });
        assert!(!a_path.exists() && !b_path.exists());
        assert_eq!(messenger.texts().len(), 1, "partial notice still goes out");
        assert_eq!(messenger.uploads(), 0);
    }
}
