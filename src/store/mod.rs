// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SQLite-backed podcast and episode store.
//!
//! The connection sits behind a mutex: every method holds the lock for its
//! own duration, and multi-row writes run in an explicit transaction.

mod episodes;
mod podcasts;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::StoreError;

pub use podcasts::AddOutcome;

/// A subscribed feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Podcast {
    pub id: i64,
    pub feed: String,
    pub title: String,
}

/// An episode discovered in a podcast's feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Episode {
    pub id: i64,
    pub podcast_id: i64,
    pub title: String,
    pub published: DateTime<Utc>,
    /// Media URL; unique within one podcast
    pub enclosure: String,
    pub summary: Option<String>,
    /// Not yet synced or acknowledged
    pub new: bool,
}

/// Episode data ready to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEpisode {
    pub title: String,
    pub published: DateTime<Utc>,
    pub enclosure: String,
    pub summary: Option<String>,
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database file and bring its schema up to date
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_connection(conn)
    }

    /// Open a throwaway in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        store.migrate()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS podcast (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                feed TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS episode (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                podcast_id INTEGER NOT NULL
                    REFERENCES podcast(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                published TEXT NOT NULL,
                enclosure TEXT NOT NULL,
                summary TEXT,
                new INTEGER NOT NULL DEFAULT 1,
                UNIQUE(podcast_id, enclosure)
            );
            CREATE INDEX IF NOT EXISTS episode_new ON episode(new);",
        )?;
        Ok(())
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;

        // Databases created before summaries were stored lack the column
        let mut stmt = conn.prepare("PRAGMA table_info(episode)")?;
        let columns = stmt.query_map([], |row| row.get::<_, String>(1))?;
        let mut has_summary = false;
        for col in columns {
            if col? == "summary" {
                has_summary = true;
                break;
            }
        }
        drop(stmt);

        if !has_summary {
            tracing::info!("adding summary column to episode table");
            conn.execute("ALTER TABLE episode ADD COLUMN summary TEXT", [])?;
        }

        Ok(())
    }
}
