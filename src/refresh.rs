// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Feed refresh: fetch every subscription concurrently, then record new
//! episodes from a single writer.

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::feed::{FeedDocument, fetch_feed};
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::store::{Episode, NewEpisode, Podcast, Store};

/// Result of refreshing all podcasts
#[derive(Debug, Clone, Default)]
pub struct RefreshResult {
    /// Episodes stored by this refresh, grouped by podcast in feed order
    pub new_episodes: Vec<Episode>,
    /// Entries skipped because they had no enclosure
    pub skipped_entries: usize,
    /// Podcasts whose feed could not be fetched (title, error message)
    pub failed_podcasts: Vec<(String, String)>,
}

/// Record the new entries of one fetched feed
///
/// Entries without an enclosure are skipped with a warning; entries whose
/// enclosure is already stored for the podcast are ignored, so refreshing an
/// unchanged feed stores nothing. Entries without a usable date are stamped
/// with `now`.
pub fn resolve_entries(
    store: &Store,
    podcast: &Podcast,
    feed: &FeedDocument,
    now: DateTime<Utc>,
    reporter: &SharedProgressReporter,
) -> Result<(Vec<Episode>, usize), StoreError> {
    let mut candidates = Vec::new();
    let mut skipped = 0;

    for entry in &feed.entries {
        let Some(enclosure) = &entry.enclosure else {
            tracing::warn!(podcast = %podcast.title, entry = %entry.title, "entry has no enclosure");
            reporter.report(ProgressEvent::EntrySkipped {
                podcast_title: podcast.title.clone(),
                entry_title: entry.title.clone(),
            });
            skipped += 1;
            continue;
        };

        if store.has_episode(podcast.id, enclosure)? {
            continue;
        }

        candidates.push(NewEpisode {
            title: entry.title.clone(),
            published: entry
                .published
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(now),
            enclosure: enclosure.clone(),
            summary: entry.summary.clone(),
        });
    }

    let inserted = store.insert_episodes(podcast.id, &candidates)?;

    for episode in &inserted {
        reporter.report(ProgressEvent::NewEpisode {
            podcast_title: podcast.title.clone(),
            episode_title: episode.title.clone(),
            published: episode.published,
            summary: episode.summary.clone(),
        });
    }

    Ok((inserted, skipped))
}

/// Refresh every subscribed podcast
///
/// One fetch task per podcast runs concurrently; the join barrier collects
/// each task's result before anything is written. A failing feed is
/// reported and does not affect the others.
pub async fn refresh_all<C: HttpClient + Clone + 'static>(
    client: &C,
    store: &Store,
    reporter: SharedProgressReporter,
) -> Result<RefreshResult, StoreError> {
    let podcasts = store.podcasts()?;

    let handles: Vec<_> = podcasts
        .iter()
        .cloned()
        .map(|podcast| {
            let client = client.clone();
            let reporter = reporter.clone();
            tokio::spawn(async move {
                reporter.report(ProgressEvent::FetchingFeed {
                    podcast_title: podcast.title.clone(),
                });
                fetch_feed(&client, &podcast.feed).await
            })
        })
        .collect();

    let fetched = futures::future::join_all(handles).await;

    let now = Utc::now();
    let mut result = RefreshResult::default();

    for (podcast, joined) in podcasts.iter().zip(fetched) {
        let feed: Result<FeedDocument, String> = match joined {
            Ok(Ok(feed)) => Ok(feed),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(format!("fetch task failed: {e}")),
        };

        match feed {
            Ok(feed) => {
                let (inserted, skipped) = resolve_entries(store, podcast, &feed, now, &reporter)?;
                tracing::info!(podcast = %podcast.title, new = inserted.len(), "refreshed");
                result.new_episodes.extend(inserted);
                result.skipped_entries += skipped;
            }
            Err(error) => {
                tracing::warn!(podcast = %podcast.title, %error, "refresh failed");
                reporter.report(ProgressEvent::FeedFailed {
                    podcast_title: podcast.title.clone(),
                    error: error.clone(),
                });
                result.failed_podcasts.push((podcast.title.clone(), error));
            }
        }
    }

    reporter.report(ProgressEvent::RefreshCompleted {
        podcast_count: podcasts.len(),
        new_episodes: result.new_episodes.len(),
        failed_count: result.failed_podcasts.len(),
    });

    Ok(result)
}
