// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

use super::{Episode, NewEpisode, Store};
use crate::error::StoreError;

const EPISODE_COLUMNS: &str = "id, podcast_id, title, published, enclosure, summary, new";

fn episode_from_row(row: &Row<'_>) -> rusqlite::Result<Episode> {
    Ok(Episode {
        id: row.get(0)?,
        podcast_id: row.get(1)?,
        title: row.get(2)?,
        published: row.get(3)?,
        enclosure: row.get(4)?,
        summary: row.get(5)?,
        new: row.get(6)?,
    })
}

fn query_episodes(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Episode>, StoreError> {
    let sql = format!("SELECT {EPISODE_COLUMNS} FROM episode {filter} ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params, episode_from_row)?;

    let mut episodes = Vec::new();
    for episode in rows {
        episodes.push(episode?);
    }
    Ok(episodes)
}

impl Store {
    pub fn episodes_for(&self, podcast_id: i64) -> Result<Vec<Episode>, StoreError> {
        let conn = self.lock()?;
        query_episodes(&conn, "WHERE podcast_id = ?1", params![podcast_id])
    }

    /// Episodes not yet synced, oldest insert first
    pub fn new_episodes(&self) -> Result<Vec<Episode>, StoreError> {
        let conn = self.lock()?;
        query_episodes(&conn, "WHERE new = 1", [])
    }

    pub fn has_episode(&self, podcast_id: i64, enclosure: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM episode WHERE podcast_id = ?1 AND enclosure = ?2",
            params![podcast_id, enclosure],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Insert episodes marked new, in one transaction
    ///
    /// Enclosures already stored for the podcast (or repeated within the
    /// batch) are skipped. Returns the rows actually inserted, in input order.
    pub fn insert_episodes(
        &self,
        podcast_id: i64,
        episodes: &[NewEpisode],
    ) -> Result<Vec<Episode>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut inserted = Vec::new();

        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO episode
                    (podcast_id, title, published, enclosure, summary, new)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1)",
            )?;

            for episode in episodes {
                let changed = stmt.execute(params![
                    podcast_id,
                    episode.title,
                    episode.published,
                    episode.enclosure,
                    episode.summary,
                ])?;

                if changed == 1 {
                    inserted.push(Episode {
                        id: tx.last_insert_rowid(),
                        podcast_id,
                        title: episode.title.clone(),
                        published: episode.published,
                        enclosure: episode.enclosure.clone(),
                        summary: episode.summary.clone(),
                        new: true,
                    });
                }
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    pub fn mark_not_new(&self, episode_id: i64) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE episode SET new = 0 WHERE id = ?1",
            params![episode_id],
        )?;
        Ok(())
    }

    /// Clear the new flag on episodes published before `cutoff`
    ///
    /// Restricted to one podcast when `podcast_id` is given. Returns the
    /// episodes that changed.
    pub fn mark_old(
        &self,
        cutoff: DateTime<Utc>,
        podcast_id: Option<i64>,
    ) -> Result<Vec<Episode>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let candidates = match podcast_id {
            Some(id) => query_episodes(&tx, "WHERE new = 1 AND podcast_id = ?1", params![id])?,
            None => query_episodes(&tx, "WHERE new = 1", [])?,
        };

        let mut marked = Vec::new();
        for mut episode in candidates {
            if episode.published < cutoff {
                tx.execute(
                    "UPDATE episode SET new = 0 WHERE id = ?1",
                    params![episode.id],
                )?;
                episode.new = false;
                marked.push(episode);
            }
        }

        tx.commit()?;
        Ok(marked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AddOutcome;
    use chrono::Duration;

    fn store_with_podcast(feed: &str) -> (Store, i64) {
        let store = Store::open_in_memory().unwrap();
        let id = match store.add_podcast(feed, "Podcast").unwrap() {
            AddOutcome::Added(p) => p.id,
            AddOutcome::AlreadyExists(p) => p.id,
        };
        (store, id)
    }

    fn episode(enclosure: &str, days_ago: i64) -> NewEpisode {
        NewEpisode {
            title: format!("Episode {enclosure}"),
            published: Utc::now() - Duration::days(days_ago),
            enclosure: enclosure.to_string(),
            summary: Some("About things".to_string()),
        }
    }

    #[test]
    fn insert_marks_episodes_new() {
        let (store, podcast) = store_with_podcast("https://example.com/feed");

        let inserted = store
            .insert_episodes(podcast, &[episode("https://example.com/1.mp3", 1)])
            .unwrap();

        assert_eq!(inserted.len(), 1);
        assert!(inserted[0].new);
        assert_eq!(store.new_episodes().unwrap(), inserted);
    }

    #[test]
    fn duplicate_enclosure_is_inserted_once() {
        let (store, podcast) = store_with_podcast("https://example.com/feed");
        let ep = episode("https://example.com/1.mp3", 1);

        let first = store.insert_episodes(podcast, &[ep.clone(), ep.clone()]).unwrap();
        let second = store.insert_episodes(podcast, &[ep]).unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(store.episodes_for(podcast).unwrap().len(), 1);
    }

    #[test]
    fn same_enclosure_allowed_across_podcasts() {
        let (store, a) = store_with_podcast("https://a.example/feed");
        let b = match store.add_podcast("https://b.example/feed", "B").unwrap() {
            AddOutcome::Added(p) => p.id,
            AddOutcome::AlreadyExists(p) => p.id,
        };
        let shared = episode("https://cdn.example/shared.mp3", 1);

        store.insert_episodes(a, &[shared.clone()]).unwrap();
        store.insert_episodes(b, &[shared]).unwrap();

        assert!(store.has_episode(a, "https://cdn.example/shared.mp3").unwrap());
        assert!(store.has_episode(b, "https://cdn.example/shared.mp3").unwrap());
    }

    #[test]
    fn published_round_trips() {
        let (store, podcast) = store_with_podcast("https://example.com/feed");
        let ep = episode("https://example.com/1.mp3", 3);

        store.insert_episodes(podcast, &[ep.clone()]).unwrap();
        let stored = &store.episodes_for(podcast).unwrap()[0];

        assert_eq!(stored.published, ep.published);
        assert_eq!(stored.summary, ep.summary);
    }

    #[test]
    fn mark_not_new_clears_flag() {
        let (store, podcast) = store_with_podcast("https://example.com/feed");
        let inserted = store
            .insert_episodes(podcast, &[episode("https://example.com/1.mp3", 1)])
            .unwrap();

        store.mark_not_new(inserted[0].id).unwrap();

        assert!(store.new_episodes().unwrap().is_empty());
        assert!(!store.episodes_for(podcast).unwrap()[0].new);
    }

    #[test]
    fn mark_old_only_touches_episodes_before_cutoff() {
        let (store, podcast) = store_with_podcast("https://example.com/feed");
        store
            .insert_episodes(
                podcast,
                &[
                    episode("https://example.com/old.mp3", 10),
                    episode("https://example.com/recent.mp3", 2),
                ],
            )
            .unwrap();

        let marked = store
            .mark_old(Utc::now() - Duration::days(7), None)
            .unwrap();

        assert_eq!(marked.len(), 1);
        assert_eq!(marked[0].enclosure, "https://example.com/old.mp3");

        let still_new = store.new_episodes().unwrap();
        assert_eq!(still_new.len(), 1);
        assert_eq!(still_new[0].enclosure, "https://example.com/recent.mp3");
    }

    #[test]
    fn mark_old_can_be_restricted_to_one_podcast() {
        let (store, a) = store_with_podcast("https://a.example/feed");
        let b = match store.add_podcast("https://b.example/feed", "B").unwrap() {
            AddOutcome::Added(p) => p.id,
            AddOutcome::AlreadyExists(p) => p.id,
        };
        store.insert_episodes(a, &[episode("https://a.example/old.mp3", 30)]).unwrap();
        store.insert_episodes(b, &[episode("https://b.example/old.mp3", 30)]).unwrap();

        let marked = store
            .mark_old(Utc::now() - Duration::days(7), Some(a))
            .unwrap();

        assert_eq!(marked.len(), 1);
        assert_eq!(marked[0].podcast_id, a);
        assert!(store.episodes_for(b).unwrap()[0].new);
    }
}
