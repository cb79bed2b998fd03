// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rewriting of audio tags on downloaded episodes.

use std::path::Path;

use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::prelude::Accessor;
use lofty::read_from_path;
use lofty::tag::Tag;

use crate::config::{TagOverride, TitlePolicy};
use crate::error::TagError;
use crate::store::Episode;

/// Genre written on every retagged episode
pub const PODCAST_GENRE: &str = "Podcast";

/// Tag values computed for one episode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagValues {
    pub album: String,
    pub artist: String,
    pub genre: String,
    pub title: Option<String>,
}

impl TagValues {
    pub fn for_episode(overrides: &TagOverride, episode: &Episode) -> Self {
        let title = overrides.title.map(|policy| match policy {
            TitlePolicy::CopyItem => episode.title.clone(),
            TitlePolicy::DateAlbum => format!(
                "{}-{}",
                episode.published.format("%d/%m"),
                overrides.album
            ),
        });

        Self {
            album: overrides.album.clone(),
            artist: overrides.artist.clone(),
            genre: PODCAST_GENRE.to_string(),
            title,
        }
    }
}

/// Apply the configured tag override to a downloaded file
///
/// A `None` override leaves the file untouched. Returns whether the file
/// was rewritten.
pub fn apply_tags(
    path: &Path,
    overrides: Option<&TagOverride>,
    episode: &Episode,
) -> Result<bool, TagError> {
    let Some(overrides) = overrides else {
        return Ok(false);
    };

    write_tags(path, &TagValues::for_episode(overrides, episode))?;
    Ok(true)
}

/// Write tag values, creating the file's primary tag if it has none
pub fn write_tags(path: &Path, values: &TagValues) -> Result<(), TagError> {
    let mut tagged_file = read_from_path(path).map_err(|e| TagError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let tag_type = tagged_file.primary_tag_type();
    if tagged_file.tag(tag_type).is_none() {
        tagged_file.insert_tag(Tag::new(tag_type));
    }

    let tag = tagged_file
        .tag_mut(tag_type)
        .ok_or_else(|| TagError::NoWritableTag(path.to_path_buf()))?;

    tag.set_album(values.album.clone());
    tag.set_artist(values.artist.clone());
    tag.set_genre(values.genre.clone());
    if let Some(title) = &values.title {
        tag.set_title(title.clone());
    }

    tagged_file
        .save_to_path(path, WriteOptions::default())
        .map_err(|e| TagError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tracing::debug!(path = %path.display(), album = %values.album, "rewrote tags");
    Ok(())
}

/// A handful of silent MPEG-1 Layer III frames (128 kbit/s, 44.1 kHz)
#[cfg(test)]
pub(crate) fn silent_mp3() -> Vec<u8> {
    let mut data = Vec::new();
    for _ in 0..20 {
        let mut frame = vec![0u8; 417];
        frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x64]);
        data.extend_from_slice(&frame);
    }
    data
}
