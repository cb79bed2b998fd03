// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Downloading every new episode through a bounded worker pool.

use std::path::{Path, PathBuf};

use crate::config::{Config, TagOverride};
use crate::episode::{DownloadContext, download_episode, download_path, is_downloaded};
use crate::error::StoreError;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::store::{Episode, Store};
use crate::tags::apply_tags;

/// What happened to one episode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadStatus {
    Downloaded { bytes: u64 },
    /// The local file already matched the remote size
    AlreadyPresent,
    /// Nothing was downloaded; the episode is retried on the next run
    Failed(String),
    /// The file was downloaded but retagging it failed
    TagFailed(String),
}

#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub episode: Episode,
    pub status: DownloadStatus,
}

/// Result of a download batch, one outcome per new episode in order
#[derive(Debug, Clone, Default)]
pub struct DownloadSummary {
    pub outcomes: Vec<DownloadOutcome>,
}

impl DownloadSummary {
    pub fn downloaded(&self) -> usize {
        self.count(|s| matches!(s, DownloadStatus::Downloaded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, DownloadStatus::AlreadyPresent))
    }

    /// Downloads that failed plus downloads whose tagging failed
    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, DownloadStatus::Failed(_) | DownloadStatus::TagFailed(_)))
    }

    fn count(&self, pred: impl Fn(&DownloadStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Download every episode still flagged new
///
/// Episodes whose local file is already complete are skipped. At most
/// `max_concurrent` downloads run at once; a failing download is reported
/// and leaves its siblings alone. No database state changes here: the new
/// flag is only cleared by sync and mark-old.
pub async fn download_all_new<C: HttpClient + Clone + 'static>(
    client: &C,
    store: &Store,
    config: &Config,
    download_dir: &Path,
    max_concurrent: usize,
    reporter: SharedProgressReporter,
) -> Result<DownloadSummary, StoreError> {
    let episodes = store.new_episodes()?;
    let total_to_download = episodes.len();
    let max_concurrent = max_concurrent.max(1);

    // The slot pool limits concurrency and hands out stable slot IDs
    let (slot_tx, mut slot_rx) = tokio::sync::mpsc::channel(max_concurrent);
    for slot in 0..max_concurrent {
        let _ = slot_tx.send(slot).await;
    }

    let mut handles = Vec::with_capacity(total_to_download);

    for (episode_index, episode) in episodes.into_iter().enumerate() {
        // Acquire a slot before spawning so episodes start in order
        let Some(download_id) = slot_rx.recv().await else {
            break;
        };

        let slot_tx = slot_tx.clone();
        let client = client.clone();
        let reporter = reporter.clone();
        let download_dir = download_dir.to_path_buf();
        let overrides = config.tag_override(episode.podcast_id).cloned();

        let handle = tokio::spawn(async move {
            let context = DownloadContext {
                download_id,
                episode_index,
                total_to_download,
            };

            let status =
                process_episode(&client, &episode, &download_dir, overrides, &context, &reporter)
                    .await;

            let _ = slot_tx.send(download_id).await;

            DownloadOutcome { episode, status }
        });

        handles.push(handle);
    }

    let mut summary = DownloadSummary::default();
    for handle in handles {
        match handle.await {
            Ok(outcome) => summary.outcomes.push(outcome),
            Err(e) => tracing::error!(error = %e, "download task panicked"),
        }
    }

    reporter.report(ProgressEvent::DownloadsCompleted {
        downloaded_count: summary.downloaded(),
        skipped_count: summary.skipped(),
        failed_count: summary.failed(),
    });

    Ok(summary)
}

async fn process_episode<C: HttpClient>(
    client: &C,
    episode: &Episode,
    download_dir: &Path,
    overrides: Option<TagOverride>,
    context: &DownloadContext,
    reporter: &SharedProgressReporter,
) -> DownloadStatus {
    let fail = |error: String| {
        tracing::warn!(episode = %episode.title, %error, "download failed");
        reporter.report(ProgressEvent::DownloadFailed {
            download_id: context.download_id,
            episode_title: episode.title.clone(),
            error: error.clone(),
        });
        DownloadStatus::Failed(error)
    };

    let path = match download_path(download_dir, &episode.enclosure) {
        Ok(path) => path,
        Err(e) => return fail(e.to_string()),
    };

    if is_downloaded(client, &episode.enclosure, &path).await {
        reporter.report(ProgressEvent::AlreadyDownloaded {
            episode_title: episode.title.clone(),
        });
        return DownloadStatus::AlreadyPresent;
    }

    let bytes = match download_episode(
        client,
        &episode.enclosure,
        &episode.title,
        &path,
        context,
        reporter,
    )
    .await
    {
        Ok(bytes) => bytes,
        Err(e) => return fail(e.to_string()),
    };

    match retag(path, overrides, episode.clone()).await {
        Ok(()) => DownloadStatus::Downloaded { bytes },
        Err(error) => {
            tracing::warn!(episode = %episode.title, %error, "tagging failed");
            reporter.report(ProgressEvent::TagFailed {
                episode_title: episode.title.clone(),
                error: error.clone(),
            });
            DownloadStatus::TagFailed(error)
        }
    }
}

async fn retag(
    path: PathBuf,
    overrides: Option<TagOverride>,
    episode: Episode,
) -> Result<(), String> {
    if overrides.is_none() {
        return Ok(());
    }

    tokio::task::spawn_blocking(move || apply_tags(&path, overrides.as_ref(), &episode))
        .await
        .map_err(|e| format!("tagging task failed: {e}"))?
        .map(|_| ())
        .map_err(|e| e.to_string())
}
