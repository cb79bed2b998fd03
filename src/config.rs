// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration file for podkeep.
//!
//! A single JSON document, read once at startup. Podcast ids in `id3_edit`
//! and `podcast_age` are the database ids, written as strings because JSON
//! object keys must be strings.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "podkeep.json";

/// Retention window applied when a podcast has no override
pub const DEFAULT_AGE_DAYS: u32 = 14;

const DEFAULT_MAX_CONCURRENT: usize = 3;
const DEFAULT_EJECT_RETRY_DELAY_SECS: u64 = 5;

/// Raw config file schema
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the SQLite database file
    pub db: PathBuf,
    /// Download folder, absolute or relative to the executable
    #[serde(default)]
    pub download_folder: Option<PathBuf>,
    /// Root directory of the player to sync to
    #[serde(default)]
    pub sync_to: Option<PathBuf>,
    /// Sync each podcast into its own subdirectory
    #[serde(default)]
    pub folder_mode: bool,
    /// Mount point unmounted by `eject`
    #[serde(default)]
    pub eject_point: Option<PathBuf>,
    #[serde(default)]
    pub id3_edit: HashMap<String, TagOverride>,
    /// Per-podcast retention windows in days
    #[serde(default)]
    pub podcast_age: HashMap<String, u32>,
    #[serde(default = "default_age")]
    pub default_age: u32,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_eject_command")]
    pub eject_command: Vec<String>,
    #[serde(default = "default_eject_retry_delay")]
    pub eject_retry_delay_secs: u64,
    /// Unbounded when absent
    #[serde(default)]
    pub eject_max_attempts: Option<u32>,
}

/// Tag values forced onto every download of one podcast
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TagOverride {
    pub album: String,
    pub artist: String,
    #[serde(default, deserialize_with = "deserialize_title_policy")]
    pub title: Option<TitlePolicy>,
}

/// How the title tag is derived, when it is rewritten at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitlePolicy {
    /// Use the episode title from the feed
    CopyItem,
    /// `"<dd/mm>-<album>"` from the publish date
    DateAlbum,
}

fn deserialize_title_policy<'de, D>(deserializer: D) -> Result<Option<TitlePolicy>, D::Error>
where
    D: Deserializer<'de>,
{
    // Any value other than "copy_item" selects the dated title
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.map(|v| match v.as_str() {
        Some("copy_item") => TitlePolicy::CopyItem,
        _ => TitlePolicy::DateAlbum,
    }))
}

fn default_age() -> u32 {
    DEFAULT_AGE_DAYS
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_eject_retry_delay() -> u64 {
    DEFAULT_EJECT_RETRY_DELAY_SECS
}

fn default_eject_command() -> Vec<String> {
    if cfg!(target_os = "macos") {
        vec!["diskutil".to_string(), "unmount".to_string()]
    } else {
        vec!["umount".to_string()]
    }
}

impl Config {
    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::from_json(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Tag override configured for a podcast, if any
    pub fn tag_override(&self, podcast_id: i64) -> Option<&TagOverride> {
        self.id3_edit.get(&podcast_id.to_string())
    }

    /// Resolve the download folder against the executable's directory
    pub fn resolve_download_dir(&self, exe_dir: &Path) -> PathBuf {
        match &self.download_folder {
            Some(folder) if folder.is_absolute() => folder.clone(),
            Some(folder) => exe_dir.join(folder),
            None => exe_dir.to_path_buf(),
        }
    }

    /// Resolve the download folder for the running executable and create it
    pub fn prepare_download_dir(&self) -> Result<PathBuf, ConfigError> {
        let exe = std::env::current_exe()
            .and_then(|p| p.canonicalize())
            .map_err(ConfigError::ExecutableNotFound)?;
        let exe_dir = exe.parent().unwrap_or(Path::new("."));

        let dir = self.resolve_download_dir(exe_dir);
        std::fs::create_dir_all(&dir).map_err(|e| ConfigError::CreateDownloadFolderFailed {
            path: dir.clone(),
            source: e,
        })?;
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const FULL_CONFIG: &str = r#"{
        "db": "podcasts.db",
        "download_folder": "downloads",
        "sync_to": "/Volumes/PLAYER/Podcasts",
        "folder_mode": true,
        "eject_point": "/Volumes/PLAYER",
        "id3_edit": {
            "3": {"album": "Show", "artist": "Host", "title": "copy_item"},
            "4": {"album": "Other", "artist": "Someone", "title": true},
            "5": {"album": "Plain", "artist": "Nobody"}
        },
        "podcast_age": {"3": 30}
    }"#;

    #[test]
    fn parses_full_config() {
        let config = Config::from_json(FULL_CONFIG).unwrap();

        assert_eq!(config.db, PathBuf::from("podcasts.db"));
        assert!(config.folder_mode);
        assert_eq!(config.sync_to, Some(PathBuf::from("/Volumes/PLAYER/Podcasts")));
        assert_eq!(config.eject_point, Some(PathBuf::from("/Volumes/PLAYER")));
        assert_eq!(config.podcast_age.get("3"), Some(&30));
        assert_eq!(config.podcast_age.get("4"), None);
    }

    #[test]
    fn title_policy_variants() {
        let config = Config::from_json(FULL_CONFIG).unwrap();

        assert_eq!(
            config.tag_override(3).unwrap().title,
            Some(TitlePolicy::CopyItem)
        );
        assert_eq!(
            config.tag_override(4).unwrap().title,
            Some(TitlePolicy::DateAlbum)
        );
        assert_eq!(config.tag_override(5).unwrap().title, None);
        assert!(config.tag_override(6).is_none());
    }

    #[test]
    fn applies_defaults_for_optional_keys() {
        let config = Config::from_json(r#"{"db": "x.db"}"#).unwrap();

        assert_eq!(config.default_age, DEFAULT_AGE_DAYS);
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.eject_retry_delay_secs, 5);
        assert!(config.eject_max_attempts.is_none());
        assert!(!config.eject_command.is_empty());
        assert!(!config.folder_mode);
        assert!(config.id3_edit.is_empty());
    }

    #[test]
    fn download_dir_relative_to_executable() {
        let config = Config::from_json(r#"{"db": "x.db", "download_folder": "media"}"#).unwrap();
        assert_eq!(
            config.resolve_download_dir(Path::new("/opt/podkeep")),
            PathBuf::from("/opt/podkeep/media")
        );
    }

    #[test]
    fn download_dir_absolute_is_kept() {
        let config =
            Config::from_json(r#"{"db": "x.db", "download_folder": "/srv/media"}"#).unwrap();
        assert_eq!(
            config.resolve_download_dir(Path::new("/opt/podkeep")),
            PathBuf::from("/srv/media")
        );
    }

    #[test]
    fn download_dir_defaults_to_executable_dir() {
        let config = Config::from_json(r#"{"db": "x.db"}"#).unwrap();
        assert_eq!(
            config.resolve_download_dir(Path::new("/opt/podkeep")),
            PathBuf::from("/opt/podkeep")
        );
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempdir().unwrap();
        let result = Config::load(&dir.path().join("missing.json"));
        assert!(matches!(result, Err(ConfigError::ReadFailed { .. })));
    }

    #[test]
    fn load_reports_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("podkeep.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = Config::load(&path);
        assert!(matches!(result, Err(ConfigError::ParseFailed { .. })));
    }
}
