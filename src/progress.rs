// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

/// Events emitted while podkeep works, for user-facing output
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A podcast's feed is being fetched
    FetchingFeed { podcast_title: String },

    /// A podcast's feed could not be fetched or parsed
    FeedFailed { podcast_title: String, error: String },

    /// A feed entry without an enclosure was skipped
    EntrySkipped {
        podcast_title: String,
        entry_title: String,
    },

    /// The resolver stored a new episode
    NewEpisode {
        podcast_title: String,
        episode_title: String,
        published: DateTime<Utc>,
        summary: Option<String>,
    },

    /// Refresh of all podcasts finished
    RefreshCompleted {
        podcast_count: usize,
        new_episodes: usize,
        failed_count: usize,
    },

    /// A download is starting
    DownloadStarting {
        /// Identifies the download slot (0 to max_concurrent-1)
        download_id: usize,
        episode_title: String,
        /// Index of this episode in the download queue
        episode_index: usize,
        /// Total number of episodes to download
        total_to_download: usize,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    /// Download progress update
    DownloadProgress {
        download_id: usize,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// A download completed successfully
    DownloadCompleted {
        download_id: usize,
        episode_title: String,
        bytes_downloaded: u64,
    },

    /// A download failed
    DownloadFailed {
        download_id: usize,
        episode_title: String,
        error: String,
    },

    /// Local file already matches the remote size
    AlreadyDownloaded { episode_title: String },

    /// The file was downloaded but its tags could not be rewritten
    TagFailed { episode_title: String, error: String },

    /// All downloads of a batch finished
    DownloadsCompleted {
        downloaded_count: usize,
        skipped_count: usize,
        failed_count: usize,
    },

    /// Sync skipped an episode that has not been downloaded
    NotDownloadedYet { file_name: String },

    /// An episode is being copied to the player
    Copying {
        episode_title: String,
        destination: PathBuf,
    },

    /// Copying an episode failed
    CopyFailed { episode_title: String, error: String },

    /// Sync finished
    SyncCompleted {
        copied_count: usize,
        skipped_count: usize,
        failed_count: usize,
    },

    /// An episode's new flag was cleared by mark-old
    MarkedOld { episode_title: String },

    /// An aged-out file was deleted
    FileRemoved { path: PathBuf },

    /// An aged-out file could not be deleted
    RemoveFailed { path: PathBuf, error: String },

    /// An unmount attempt failed and will be retried
    UnmountRetry { attempt: u32, error: String },

    /// The player was unmounted
    Ejected { point: PathBuf },
}

/// Trait for reporting progress events.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

/// Keeps every event it receives
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of the events seen so far
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
