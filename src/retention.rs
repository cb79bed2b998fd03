// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Aging out episodes: clearing stale new flags and deleting old files.

use std::collections::{HashMap, HashSet};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::episode::podcast_folder_name;
use crate::error::{RetentionError, StoreError};
use crate::lock::LOCK_FILE_NAME;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::store::{Episode, Store};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Which copy of the media files to prune
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Location {
    /// The flat download folder
    Local,
    /// The sync target, one subdirectory per podcast
    Player,
}

/// Retention windows in days
#[derive(Debug, Clone, Default)]
pub struct RetentionPolicy {
    pub default_days: u32,
    /// Per-podcast windows keyed by podcast id
    pub overrides: HashMap<i64, u32>,
    /// Files never removed, however old (canonical paths)
    kept: HashSet<PathBuf>,
}

impl RetentionPolicy {
    /// Windows from the `default_age` and `podcast_age` settings
    pub fn from_config(config: &Config) -> Self {
        let overrides = config
            .podcast_age
            .iter()
            .filter_map(|(key, &days)| match key.parse::<i64>() {
                Ok(id) => Some((id, days)),
                Err(_) => {
                    tracing::warn!(key = %key, "ignoring podcast_age entry with non-numeric id");
                    None
                }
            })
            .collect();

        let mut policy = Self {
            default_days: config.default_age,
            overrides,
            kept: HashSet::new(),
        };
        // The download folder defaults to the executable's directory, which
        // may also hold the database
        policy.keep(&config.db);
        policy
    }

    /// Never remove `path`, even when it is past retention
    pub fn keep(&mut self, path: &Path) {
        self.kept.insert(canonical(path));
    }

    pub fn is_kept(&self, path: &Path) -> bool {
        self.kept.contains(&canonical(path))
    }

    /// Whether a file of `age_days` is past retention
    ///
    /// A file goes once it is older than the global window or older than the
    /// podcast's own window, whichever is shorter.
    pub fn is_expired(&self, age_days: u64, podcast_id: Option<i64>) -> bool {
        let past_default = age_days > u64::from(self.default_days);
        let past_override = podcast_id
            .and_then(|id| self.overrides.get(&id))
            .is_some_and(|&days| age_days > u64::from(days));
        past_default || past_override
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Files removed by a delete-old run
#[derive(Debug, Clone, Default)]
pub struct DeleteResult {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Clear the new flag on episodes published more than `days` ago
///
/// With `podcast_id`, only that podcast's episodes are considered.
pub fn mark_old(
    store: &Store,
    days: u32,
    podcast_id: Option<i64>,
    now: DateTime<Utc>,
    reporter: &SharedProgressReporter,
) -> Result<Vec<Episode>, StoreError> {
    if let Some(id) = podcast_id
        && store.podcast(id)?.is_none()
    {
        return Err(StoreError::PodcastNotFound(id));
    }

    // A window reaching past the earliest representable date marks nothing
    let cutoff = chrono::Duration::try_days(i64::from(days))
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let marked = store.mark_old(cutoff, podcast_id)?;

    for episode in &marked {
        reporter.report(ProgressEvent::MarkedOld {
            episode_title: episode.title.clone(),
        });
    }

    Ok(marked)
}

/// Whole days since a file was created
///
/// Falls back to the modification time where the platform does not record
/// creation times. Timestamps in the future count as age zero.
pub fn file_age_days(metadata: &Metadata, now: SystemTime) -> u64 {
    let stamp = metadata
        .created()
        .or_else(|_| metadata.modified())
        .unwrap_or(now);

    now.duration_since(stamp)
        .unwrap_or(Duration::ZERO)
        .as_secs()
        / SECONDS_PER_DAY
}

/// Delete expired files directly inside the download folder
pub fn delete_old_local(
    download_dir: &Path,
    policy: &RetentionPolicy,
    now: SystemTime,
    reporter: &SharedProgressReporter,
) -> Result<DeleteResult, RetentionError> {
    let mut result = DeleteResult::default();
    prune_directory(download_dir, policy, None, now, reporter, &mut result)?;
    Ok(result)
}

/// Delete expired files on the player
///
/// Each subdirectory is matched back to a podcast by its folder name so the
/// podcast's own retention window applies. Files at the top level use the
/// global window only.
pub fn delete_old_player(
    store: &Store,
    sync_root: &Path,
    policy: &RetentionPolicy,
    now: SystemTime,
    reporter: &SharedProgressReporter,
) -> Result<DeleteResult, RetentionError> {
    let folders: HashMap<String, i64> = store
        .podcasts()?
        .into_iter()
        .map(|podcast| (podcast_folder_name(&podcast.title), podcast.id))
        .collect();

    let mut result = DeleteResult::default();
    prune_directory(sync_root, policy, None, now, reporter, &mut result)?;

    for entry in read_dir(sync_root)? {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let podcast_id = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| folders.get(name))
            .copied();
        if podcast_id.is_none() {
            tracing::debug!(dir = %path.display(), "no podcast matches folder, using default age");
        }

        prune_directory(&path, policy, podcast_id, now, reporter, &mut result)?;
    }

    Ok(result)
}

fn read_dir(dir: &Path) -> Result<Vec<std::fs::DirEntry>, RetentionError> {
    if !dir.is_dir() {
        return Err(RetentionError::DirectoryNotFound(dir.to_path_buf()));
    }

    let read_failed = |e| RetentionError::ReadDirectoryFailed {
        path: dir.to_path_buf(),
        source: e,
    };

    std::fs::read_dir(dir)
        .map_err(read_failed)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_failed)
}

/// Remove expired regular files in `dir`, without descending
fn prune_directory(
    dir: &Path,
    policy: &RetentionPolicy,
    podcast_id: Option<i64>,
    now: SystemTime,
    reporter: &SharedProgressReporter,
    result: &mut DeleteResult,
) -> Result<(), RetentionError> {
    for entry in read_dir(dir)? {
        if entry.file_name() == LOCK_FILE_NAME {
            continue;
        }

        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }

        let age = file_age_days(&metadata, now);
        if !policy.is_expired(age, podcast_id) {
            continue;
        }

        let path = entry.path();
        if policy.is_kept(&path) {
            tracing::debug!(path = %path.display(), "kept despite its age");
            continue;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), age, "removed");
                reporter.report(ProgressEvent::FileRemoved { path: path.clone() });
                result.removed.push(path);
            }
            Err(e) => {
                reporter.report(ProgressEvent::RemoveFailed {
                    path: path.clone(),
                    error: e.to_string(),
                });
                result.failed.push((path, e.to_string()));
            }
        }
    }

    Ok(())
}
