// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The command surface: one method per user-facing operation.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;

use crate::config::Config;
use crate::downloads::{DownloadSummary, download_all_new};
use crate::eject::{CommandUnmounter, RetryPolicy, Unmounter, eject};
use crate::error::Error;
use crate::feed::fetch_feed;
use crate::http::{HttpClient, ReqwestClient};
use crate::lock::MediaLock;
use crate::progress::SharedProgressReporter;
use crate::refresh::{RefreshResult, refresh_all};
use crate::retention::{self, DeleteResult, Location, RetentionPolicy};
use crate::store::{AddOutcome, Episode, Podcast, Store};
use crate::sync::{SyncResult, SyncTarget, sync_new};

/// Everything a command needs, built once per invocation
pub struct App<C = ReqwestClient> {
    config: Config,
    store: Store,
    download_dir: PathBuf,
    client: C,
    reporter: SharedProgressReporter,
    /// Files delete-old must never remove
    kept_files: Vec<PathBuf>,
}

impl App<ReqwestClient> {
    /// Prepare the download folder and open the database named in `config`
    pub fn from_config(config: Config, reporter: SharedProgressReporter) -> Result<Self, Error> {
        let download_dir = config.prepare_download_dir()?;
        let store = Store::open(&config.db)?;
        tracing::debug!(db = %config.db.display(), download_dir = %download_dir.display(), "app ready");

        let app = Self::new(
            config,
            store,
            download_dir,
            ReqwestClient::new(),
            reporter,
        );
        Ok(match std::env::current_exe() {
            Ok(exe) => app.keep_file(&exe),
            Err(_) => app,
        })
    }
}

impl<C: HttpClient + Clone + 'static> App<C> {
    pub fn new(
        config: Config,
        store: Store,
        download_dir: PathBuf,
        client: C,
        reporter: SharedProgressReporter,
    ) -> Self {
        Self {
            config,
            store,
            download_dir,
            client,
            reporter,
            kept_files: Vec::new(),
        }
    }

    /// Protect `path` from delete-old, e.g. the config file
    pub fn keep_file(mut self, path: &Path) -> Self {
        self.kept_files.push(path.to_path_buf());
        self
    }

    /// Subscribe to a feed and return the full subscription list
    ///
    /// The feed is fetched once to learn its title. Subscribing twice to the
    /// same URL leaves the existing subscription untouched and fetches nothing.
    pub async fn add_podcast(&self, url: &str) -> Result<(AddOutcome, Vec<Podcast>), Error> {
        if let Some(existing) = self.store.podcast_by_feed(url)? {
            tracing::info!(id = existing.id, "already subscribed");
            return Ok((AddOutcome::AlreadyExists(existing), self.store.podcasts()?));
        }

        let feed = fetch_feed(&self.client, url).await?;
        let title = if feed.title.trim().is_empty() {
            url
        } else {
            feed.title.trim()
        };

        let outcome = self.store.add_podcast(url, title)?;
        match &outcome {
            AddOutcome::Added(podcast) => {
                tracing::info!(id = podcast.id, title = %podcast.title, "subscribed");
            }
            AddOutcome::AlreadyExists(podcast) => {
                tracing::info!(id = podcast.id, "already subscribed");
            }
        }

        Ok((outcome, self.store.podcasts()?))
    }

    pub async fn refresh(&self) -> Result<RefreshResult, Error> {
        Ok(refresh_all(&self.client, &self.store, self.reporter.clone()).await?)
    }

    /// Download every new episode, holding the media lock throughout
    pub async fn download(&self, max_concurrent: usize) -> Result<DownloadSummary, Error> {
        let _lock = MediaLock::acquire(&self.download_dir)?;

        Ok(download_all_new(
            &self.client,
            &self.store,
            &self.config,
            &self.download_dir,
            max_concurrent,
            self.reporter.clone(),
        )
        .await?)
    }

    /// New episodes paired with their podcast's title
    pub fn list_new(&self) -> Result<Vec<(String, Episode)>, Error> {
        let podcasts = self.store.podcasts()?;
        let episodes = self.store.new_episodes()?;

        Ok(episodes
            .into_iter()
            .map(|episode| {
                let title = podcasts
                    .iter()
                    .find(|p| p.id == episode.podcast_id)
                    .map(|p| p.title.clone())
                    .unwrap_or_default();
                (title, episode)
            })
            .collect())
    }

    pub fn list_podcasts(&self) -> Result<Vec<Podcast>, Error> {
        Ok(self.store.podcasts()?)
    }

    /// Copy new downloaded episodes to the player
    pub fn sync(&self) -> Result<SyncResult, Error> {
        let target = SyncTarget {
            root: self.sync_root()?.to_path_buf(),
            folder_mode: self.config.folder_mode,
        };

        let _lock = MediaLock::acquire(&self.download_dir)?;
        Ok(sync_new(
            &self.store,
            &self.download_dir,
            &target,
            &self.reporter,
        )?)
    }

    /// Unsubscribe; the podcast's episodes go with it
    pub fn delete_podcast(&self, podcast_id: i64) -> Result<Podcast, Error> {
        let podcast = self.store.delete_podcast(podcast_id)?;
        tracing::info!(id = podcast.id, title = %podcast.title, "unsubscribed");
        Ok(podcast)
    }

    /// Delete media files past retention, judged against `now`
    pub fn delete_old(&self, location: Location, now: SystemTime) -> Result<DeleteResult, Error> {
        let mut policy = RetentionPolicy::from_config(&self.config);
        for path in &self.kept_files {
            policy.keep(path);
        }
        let _lock = MediaLock::acquire(&self.download_dir)?;

        let result = match location {
            Location::Local => {
                retention::delete_old_local(&self.download_dir, &policy, now, &self.reporter)?
            }
            Location::Player => retention::delete_old_player(
                &self.store,
                self.sync_root()?,
                &policy,
                now,
                &self.reporter,
            )?,
        };

        Ok(result)
    }

    /// Clear the new flag on episodes older than `days`
    pub fn mark_old(&self, days: u32, podcast_id: Option<i64>) -> Result<Vec<Episode>, Error> {
        Ok(retention::mark_old(
            &self.store,
            days,
            podcast_id,
            Utc::now(),
            &self.reporter,
        )?)
    }

    /// Unmount the player with the configured command
    pub async fn eject(&self) -> Result<u32, Error> {
        let unmounter = CommandUnmounter::new(&self.config.eject_command)?;
        self.eject_with(&unmounter).await
    }

    pub async fn eject_with(&self, unmounter: &dyn Unmounter) -> Result<u32, Error> {
        let point = self
            .config
            .eject_point
            .as_deref()
            .ok_or(Error::MissingSetting("eject_point"))?;

        let policy = RetryPolicy {
            delay: Duration::from_secs(self.config.eject_retry_delay_secs),
            max_attempts: self.config.eject_max_attempts,
        };

        Ok(eject(unmounter, point, policy, &self.reporter).await?)
    }

    fn sync_root(&self) -> Result<&Path, Error> {
        self.config
            .sync_to
            .as_deref()
            .ok_or(Error::MissingSetting("sync_to"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloads::DownloadStatus;
    use crate::error::{EjectError, LockError};
    use crate::http::mock::{MockHttpClient, Route};
    use crate::progress::NoopReporter;
    use async_trait::async_trait;
    use tempfile::{TempDir, tempdir};

    const FEED_URL: &str = "https://example.com/feed.xml";

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Kitchen Radio</title>
    <item>
      <title>Bread</title>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://cdn.example.com/audio/bread%20basics.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    struct Fixture {
        app: App<MockHttpClient>,
        downloads: TempDir,
        player: TempDir,
    }

    fn fixture(extra_config: &str) -> Fixture {
        let downloads = tempdir().unwrap();
        let player = tempdir().unwrap();
        let config = Config::from_json(&format!(
            r#"{{"db": "unused.db", "sync_to": {:?}, "folder_mode": true{extra_config}}}"#,
            player.path().display().to_string()
        ))
        .unwrap();

        let client = MockHttpClient::new()
            .route(FEED_URL, Route::ok(FEED))
            .route(
                "https://cdn.example.com/audio/bread%20basics.mp3",
                Route::ok(&b"crust"[..]),
            );

        let app = App::new(
            config,
            Store::open_in_memory().unwrap(),
            downloads.path().to_path_buf(),
            client,
            NoopReporter::shared(),
        );

        Fixture {
            app,
            downloads,
            player,
        }
    }

    #[tokio::test]
    async fn add_uses_feed_title_and_lists_subscriptions() {
        let f = fixture("");

        let (outcome, all) = f.app.add_podcast(FEED_URL).await.unwrap();
        assert!(matches!(outcome, AddOutcome::Added(ref p) if p.title == "Kitchen Radio"));
        assert_eq!(all.len(), 1);

        let (again, all) = f.app.add_podcast(FEED_URL).await.unwrap();
        assert!(matches!(again, AddOutcome::AlreadyExists(_)));
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn re_adding_skips_fetch() {
        let f = fixture("");
        f.app.store.add_podcast("https://down.example/feed", "Down").unwrap();

        let (outcome, all) = f.app.add_podcast("https://down.example/feed").await.unwrap();

        assert!(matches!(outcome, AddOutcome::AlreadyExists(ref p) if p.title == "Down"));
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn add_fails_for_unreachable_feed() {
        let f = fixture("");
        let result = f.app.add_podcast("https://nowhere.example/feed").await;

        assert!(matches!(result, Err(Error::Feed(_))));
        assert!(f.app.list_podcasts().unwrap().is_empty());
    }

    #[tokio::test]
    async fn refresh_download_and_sync() {
        let f = fixture("");
        f.app.add_podcast(FEED_URL).await.unwrap();

        let refreshed = f.app.refresh().await.unwrap();
        assert_eq!(refreshed.new_episodes.len(), 1);

        let listed = f.app.list_new().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, "Kitchen Radio");

        let downloaded = f.app.download(3).await.unwrap();
        assert!(matches!(
            downloaded.outcomes[0].status,
            DownloadStatus::Downloaded { bytes: 5 }
        ));
        assert!(f.downloads.path().join("bread basics.mp3").exists());

        let synced = f.app.sync().unwrap();
        assert_eq!(synced.copied.len(), 1);
        assert!(
            f.player
                .path()
                .join("Kitchen Radio")
                .join("bread basics.mp3")
                .exists()
        );
        assert!(f.app.list_new().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_podcast() {
        let f = fixture("");
        f.app.add_podcast(FEED_URL).await.unwrap();
        f.app.refresh().await.unwrap();
        let id = f.app.list_podcasts().unwrap()[0].id;

        f.app.delete_podcast(id).unwrap();

        assert!(f.app.list_podcasts().unwrap().is_empty());
        assert!(f.app.list_new().unwrap().is_empty());
        assert!(matches!(
            f.app.delete_podcast(id),
            Err(Error::Store(crate::error::StoreError::PodcastNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn media_operations_wait_for_lock() {
        let f = fixture("");
        let _held = MediaLock::acquire(f.downloads.path()).unwrap();

        assert!(matches!(
            f.app.download(1).await,
            Err(Error::Lock(LockError::Busy(_)))
        ));
        assert!(matches!(f.app.sync(), Err(Error::Lock(LockError::Busy(_)))));
        assert!(matches!(
            f.app.delete_old(Location::Local, SystemTime::now()),
            Err(Error::Lock(LockError::Busy(_)))
        ));
    }

    #[test]
    fn delete_old_spares_kept_files() {
        let mut f = fixture("");
        let config_file = f.downloads.path().join("podkeep.json");
        std::fs::write(&config_file, b"{}").unwrap();
        f.app = f.app.keep_file(&config_file);

        let later = SystemTime::now() + Duration::from_secs(100 * 24 * 60 * 60);
        let result = f.app.delete_old(Location::Local, later).unwrap();

        assert!(result.removed.is_empty());
        assert!(config_file.exists());
    }

    #[test]
    fn delete_old_local_uses_default_age() {
        let f = fixture(r#", "default_age": 14"#);
        let file = f.downloads.path().join("old.mp3");
        std::fs::write(&file, b"x").unwrap();

        let later = SystemTime::now() + Duration::from_secs(15 * 24 * 60 * 60);
        let result = f.app.delete_old(Location::Local, later).unwrap();

        assert_eq!(result.removed, vec![file]);
    }

    struct AlwaysUnmounts;

    #[async_trait]
    impl Unmounter for AlwaysUnmounts {
        async fn unmount(&self, _point: &Path) -> Result<(), EjectError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn eject_requires_mount_point() {
        let f = fixture("");
        assert!(matches!(
            f.app.eject_with(&AlwaysUnmounts).await,
            Err(Error::MissingSetting("eject_point"))
        ));

        let f = fixture(r#", "eject_point": "/mnt/player""#);
        assert_eq!(f.app.eject_with(&AlwaysUnmounts).await.unwrap(), 1);
    }
}
