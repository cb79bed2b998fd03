// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use rusqlite::{OptionalExtension, Row, params};

use super::{Podcast, Store};
use crate::error::StoreError;

/// Result of subscribing to a feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added(Podcast),
    /// The feed URL was already subscribed; nothing changed
    AlreadyExists(Podcast),
}

fn podcast_from_row(row: &Row<'_>) -> rusqlite::Result<Podcast> {
    Ok(Podcast {
        id: row.get(0)?,
        feed: row.get(1)?,
        title: row.get(2)?,
    })
}

impl Store {
    /// Subscribe to a feed; re-adding an existing feed is a no-op
    pub fn add_podcast(&self, feed: &str, title: &str) -> Result<AddOutcome, StoreError> {
        let conn = self.lock()?;

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO podcast (feed, title) VALUES (?1, ?2)",
            params![feed, title],
        )?;

        let podcast = conn.query_row(
            "SELECT id, feed, title FROM podcast WHERE feed = ?1",
            params![feed],
            podcast_from_row,
        )?;

        if inserted == 0 {
            Ok(AddOutcome::AlreadyExists(podcast))
        } else {
            Ok(AddOutcome::Added(podcast))
        }
    }

    pub fn podcasts(&self) -> Result<Vec<Podcast>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, feed, title FROM podcast ORDER BY id")?;
        let rows = stmt.query_map([], podcast_from_row)?;

        let mut podcasts = Vec::new();
        for podcast in rows {
            podcasts.push(podcast?);
        }
        Ok(podcasts)
    }

    pub fn podcast(&self, id: i64) -> Result<Option<Podcast>, StoreError> {
        let conn = self.lock()?;
        let podcast = conn
            .query_row(
                "SELECT id, feed, title FROM podcast WHERE id = ?1",
                params![id],
                podcast_from_row,
            )
            .optional()?;
        Ok(podcast)
    }

    pub fn podcast_by_feed(&self, feed: &str) -> Result<Option<Podcast>, StoreError> {
        let conn = self.lock()?;
        let podcast = conn
            .query_row(
                "SELECT id, feed, title FROM podcast WHERE feed = ?1",
                params![feed],
                podcast_from_row,
            )
            .optional()?;
        Ok(podcast)
    }

    /// Unsubscribe; the podcast's episodes go with it
    pub fn delete_podcast(&self, id: i64) -> Result<Podcast, StoreError> {
        let conn = self.lock()?;
        let podcast = conn
            .query_row(
                "SELECT id, feed, title FROM podcast WHERE id = ?1",
                params![id],
                podcast_from_row,
            )
            .optional()?
            .ok_or(StoreError::PodcastNotFound(id))?;

        conn.execute("DELETE FROM podcast WHERE id = ?1", params![id])?;
        Ok(podcast)
    }
}
