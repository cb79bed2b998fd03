// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::episode::{download_path, podcast_folder_name};
use crate::error::SyncError;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::store::{Episode, Store};

/// Where and how episodes are copied
#[derive(Debug, Clone)]
pub struct SyncTarget {
    pub root: PathBuf,
    /// Copy into one subdirectory per podcast
    pub folder_mode: bool,
}

impl SyncTarget {
    /// Destination directory for a podcast's files
    pub fn directory_for(&self, podcast_title: &str) -> PathBuf {
        if self.folder_mode {
            self.root.join(podcast_folder_name(podcast_title))
        } else {
            self.root.clone()
        }
    }
}

/// Result of a sync operation
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    /// Episodes copied and acknowledged, with their destination
    pub copied: Vec<(Episode, PathBuf)>,
    /// Episodes skipped because they are not downloaded yet
    pub not_downloaded: Vec<Episode>,
    /// Episodes whose copy failed (episode, error message)
    pub failed: Vec<(Episode, String)>,
}

/// Copy every new, downloaded episode to the sync target
///
/// Each copied episode is marked not new. Episodes without a local file are
/// skipped with a warning and stay new, as do episodes whose copy fails.
pub fn sync_new(
    store: &Store,
    download_dir: &Path,
    target: &SyncTarget,
    reporter: &SharedProgressReporter,
) -> Result<SyncResult, SyncError> {
    if !target.root.is_dir() {
        return Err(SyncError::TargetMissing(target.root.clone()));
    }

    let titles: HashMap<i64, String> = store
        .podcasts()?
        .into_iter()
        .map(|podcast| (podcast.id, podcast.title))
        .collect();

    let mut result = SyncResult::default();

    for episode in store.new_episodes()? {
        let source = match download_path(download_dir, &episode.enclosure) {
            Ok(path) if path.is_file() => path,
            Ok(path) => {
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                tracing::warn!(episode = %episode.title, "not downloaded yet");
                reporter.report(ProgressEvent::NotDownloadedYet { file_name });
                result.not_downloaded.push(episode);
                continue;
            }
            Err(e) => {
                reporter.report(ProgressEvent::NotDownloadedYet {
                    file_name: e.to_string(),
                });
                result.not_downloaded.push(episode);
                continue;
            }
        };

        let podcast_title = titles
            .get(&episode.podcast_id)
            .map(String::as_str)
            .unwrap_or_default();

        match copy_episode(&source, &target.directory_for(podcast_title)) {
            Ok(destination) => {
                reporter.report(ProgressEvent::Copying {
                    episode_title: episode.title.clone(),
                    destination: destination.clone(),
                });
                store.mark_not_new(episode.id)?;
                let mut episode = episode;
                episode.new = false;
                result.copied.push((episode, destination));
            }
            Err(e) => {
                tracing::warn!(episode = %episode.title, error = %e, "copy failed");
                reporter.report(ProgressEvent::CopyFailed {
                    episode_title: episode.title.clone(),
                    error: e.to_string(),
                });
                result.failed.push((episode, e.to_string()));
            }
        }
    }

    reporter.report(ProgressEvent::SyncCompleted {
        copied_count: result.copied.len(),
        skipped_count: result.not_downloaded.len(),
        failed_count: result.failed.len(),
    });

    Ok(result)
}

/// Copy `source` into `directory`, creating it on demand
fn copy_episode(source: &Path, directory: &Path) -> Result<PathBuf, SyncError> {
    std::fs::create_dir_all(directory).map_err(|e| SyncError::CreateDirectoryFailed {
        path: directory.to_path_buf(),
        source: e,
    })?;

    let destination = directory.join(source.file_name().unwrap_or_default());
    std::fs::copy(source, &destination).map_err(|e| SyncError::CopyFailed {
        from: source.to_path_buf(),
        to: destination.clone(),
        source: e,
    })?;

    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopReporter;
    use crate::store::{AddOutcome, NewEpisode};
    use chrono::Utc;
    use tempfile::tempdir;

    fn setup(enclosures: &[&str]) -> Store {
        let store = Store::open_in_memory().unwrap();
        let podcast = match store
            .add_podcast("https://example.com/feed", "Morning: News")
            .unwrap()
        {
            AddOutcome::Added(p) | AddOutcome::AlreadyExists(p) => p,
        };
        let episodes: Vec<_> = enclosures
            .iter()
            .map(|url| NewEpisode {
                title: url.to_string(),
                published: Utc::now(),
                enclosure: url.to_string(),
                summary: None,
            })
            .collect();
        store.insert_episodes(podcast.id, &episodes).unwrap();
        store
    }

    #[test]
    fn flat_mode_copies_to_root() {
        let downloads = tempdir().unwrap();
        let player = tempdir().unwrap();
        std::fs::write(downloads.path().join("a.mp3"), b"audio a").unwrap();
        let store = setup(&["https://example.com/a.mp3"]);

        let target = SyncTarget {
            root: player.path().to_path_buf(),
            folder_mode: false,
        };
        let result = sync_new(&store, downloads.path(), &target, &NoopReporter::shared()).unwrap();

        assert_eq!(result.copied.len(), 1);
        assert_eq!(
            std::fs::read(player.path().join("a.mp3")).unwrap(),
            b"audio a"
        );
        assert!(store.new_episodes().unwrap().is_empty());
    }

    #[test]
    fn folder_mode_copies_into_podcast_directory() {
        let downloads = tempdir().unwrap();
        let player = tempdir().unwrap();
        std::fs::write(downloads.path().join("a.mp3"), b"audio a").unwrap();
        let store = setup(&["https://example.com/a.mp3"]);

        let target = SyncTarget {
            root: player.path().to_path_buf(),
            folder_mode: true,
        };
        let result = sync_new(&store, downloads.path(), &target, &NoopReporter::shared()).unwrap();

        let expected = player.path().join("Morning News").join("a.mp3");
        assert_eq!(result.copied[0].1, expected);
        assert!(expected.exists());
        assert!(!result.copied[0].0.new);
        assert!(store.new_episodes().unwrap().is_empty());
    }

    #[test]
    fn missing_download_is_skipped_and_stays_new() {
        let downloads = tempdir().unwrap();
        let player = tempdir().unwrap();
        std::fs::write(downloads.path().join("have.mp3"), b"audio").unwrap();
        let store = setup(&["https://example.com/have.mp3", "https://example.com/later.mp3"]);

        let target = SyncTarget {
            root: player.path().to_path_buf(),
            folder_mode: false,
        };
        let result = sync_new(&store, downloads.path(), &target, &NoopReporter::shared()).unwrap();

        assert_eq!(result.copied.len(), 1);
        assert_eq!(result.not_downloaded.len(), 1);

        let still_new = store.new_episodes().unwrap();
        assert_eq!(still_new.len(), 1);
        assert_eq!(still_new[0].enclosure, "https://example.com/later.mp3");
        assert!(!player.path().join("later.mp3").exists());
    }

    #[test]
    fn missing_target_is_an_error() {
        let downloads = tempdir().unwrap();
        let store = setup(&["https://example.com/a.mp3"]);

        let target = SyncTarget {
            root: downloads.path().join("not-mounted"),
            folder_mode: false,
        };
        let result = sync_new(&store, downloads.path(), &target, &NoopReporter::shared());

        assert!(matches!(result, Err(SyncError::TargetMissing(_))));
        assert_eq!(store.new_episodes().unwrap().len(), 1);
    }
}
