//! Concurrent media downloads into scratch storage.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::{CatalogItem, USER_AGENT};
use crate::deadline::bounded;
use crate::error::FetchError;
use crate::scratch::ScratchFile;

/// Extension used when the media path carries none. Stories are mostly video.
pub const DEFAULT_EXTENSION: &str = ".mp4";

/// Result of downloading one catalog item.
#[derive(Debug)]
pub struct FetchOutcome {
    /// Position of the item in the catalog.
    pub index: usize,
    pub item: CatalogItem,
    /// Present only when the download succeeded.
    pub file: Option<ScratchFile>,
    /// Present only when the download failed.
    pub error: Option<String>,
}

impl FetchOutcome {
    pub fn fetched(index: usize, item: CatalogItem, file: ScratchFile) -> Self {
        Self {
            index,
            item,
            file: Some(file),
            error: None,
        }
    }

    pub fn failed(index: usize, item: CatalogItem, reason: impl Into<String>) -> Self {
        Self {
            index,
            item,
            file: None,
            error: Some(reason.into()),
        }
    }

    pub fn is_fetched(&self) -> bool {
        self.file.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct MediaFetcherConfig {
    /// Directory for scratch files. Must exist.
    pub scratch_dir: PathBuf,
    /// Upper bound on simultaneous downloads for one request.
    pub max_parallel: usize,
    /// Upper bound for a single download, body included.
    pub timeout: Duration,
}

/// Downloads every item of a catalog, tolerating individual failures.
#[derive(Debug, Clone)]
pub struct MediaFetcher {
    client: Client,
    scratch_dir: PathBuf,
    max_parallel: usize,
    timeout: Duration,
}

impl MediaFetcher {
    pub fn new(config: MediaFetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: MediaFetcherConfig, client: Client) -> Self {
        Self {
            client,
            scratch_dir: config.scratch_dir,
            max_parallel: config.max_parallel.max(1),
            timeout: config.timeout,
        }
    }

    /// Download all `items` relative to `base_url`.
    ///
    /// Never fails as a whole: every item yields exactly one outcome, and the
    /// returned outcomes are sorted by catalog index. Returns only after every
    /// download has finished.
    pub async fn fetch_all(
        &self,
        base_url: &str,
        items: Vec<CatalogItem>,
        cancel: &CancellationToken,
    ) -> Vec<FetchOutcome> {
        let total = items.len();
        if total == 0 {
            return Vec::new();
        }

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let nonce = Uuid::new_v4().simple().to_string();
        let nonce = &nonce[..8];
        let permits = Arc::new(Semaphore::new(self.max_parallel));

        info!(total, max_parallel = self.max_parallel, "starting media downloads");

        let mut tasks = JoinSet::new();
        for (index, item) in items.iter().enumerate() {
            let permits = Arc::clone(&permits);
            let client = self.client.clone();
            let cancel = cancel.clone();
            let timeout = self.timeout;
            let item = item.clone();
            let url = join_media_url(base_url, &item.path);
            let dest = self.scratch_dir.join(scratch_file_name(
                stamp,
                nonce,
                index,
                &media_extension(&item.path),
            ));
            let has_base = !base_url.is_empty();

            tasks.spawn(async move {
                if !has_base {
                    return FetchOutcome::failed(index, item, "base URL is empty");
                }
                if item.path.trim().is_empty() {
                    warn!(index, "item has no media path");
                    return FetchOutcome::failed(index, item, "media path is empty");
                }
                let Ok(_permit) = permits.acquire_owned().await else {
                    return FetchOutcome::failed(index, item, "download pool closed");
                };

                debug!(index, %url, "downloading item");
                let result = bounded(&cancel, timeout, download_to(&client, &url, dest))
                    .await
                    .map_err(FetchError::from)
                    .and_then(|r| r);

                match result {
                    Ok(file) => {
                        debug!(index, path = %file.path().display(), "item downloaded");
                        FetchOutcome::fetched(index, item, file)
                    }
                    Err(e) => {
                        warn!(index, %url, error = %e, "item download failed");
                        FetchOutcome::failed(index, item, e.to_string())
                    }
                }
            });
        }

        let mut slots: Vec<Option<FetchOutcome>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    let index = outcome.index;
                    slots[index] = Some(outcome);
                }
                Err(e) => warn!(error = %e, "download task did not complete"),
            }
        }

        let outcomes: Vec<FetchOutcome> = slots
            .into_iter()
            .zip(items)
            .enumerate()
            .map(|(index, (slot, item))| {
                slot.unwrap_or_else(|| FetchOutcome::failed(index, item, "download task aborted"))
            })
            .collect();

        let fetched = outcomes.iter().filter(|o| o.is_fetched()).count();
        info!(fetched, total, "media downloads finished");
        outcomes
    }
}

/// Stream `url` into a freshly created file at `dest`.
///
/// The scratch handle is created right after the file, so any failure (or the
/// future being dropped on timeout) removes the partial file.
async fn download_to(client: &Client, url: &str, dest: PathBuf) -> Result<ScratchFile, FetchError> {
    let resp = client.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            status,
            url: url.to_owned(),
        });
    }

    let mut out = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&dest)
        .await?;
    let file = ScratchFile::adopt(dest);

    let mut body = resp.bytes_stream();
    while let Some(chunk) = body.next().await {
        out.write_all(&chunk?).await?;
    }
    out.flush().await?;

    Ok(file)
}

/// Join a base URL and a relative media path with exactly one `/` between
/// them when neither side supplies it.
pub fn join_media_url(base_url: &str, path: &str) -> String {
    if base_url.ends_with('/') || path.starts_with('/') {
        format!("{base_url}{path}")
    } else {
        format!("{base_url}/{path}")
    }
}

/// File extension (with dot) of a media path, ignoring any query string.
pub fn media_extension(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{e}"))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_owned())
}

/// Scratch file name unique across items of one request and across requests.
pub fn scratch_file_name(stamp: u64, nonce: &str, index: usize, extension: &str) -> String {
    format!("telestory-{stamp}-{nonce}-{index}{extension}")
}
