// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset};

use crate::error::FeedError;

use super::summary::clean_summary;

/// A parsed podcast feed
#[derive(Debug, Clone)]
pub struct FeedDocument {
    pub title: String,
    /// Entries in feed order
    pub entries: Vec<FeedEntry>,
}

/// A single item of a feed
#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub title: String,
    /// Media URL, if the item carries one
    pub enclosure: Option<String>,
    pub published: Option<DateTime<FixedOffset>>,
    /// Plain-text summary
    pub summary: Option<String>,
}

/// Parse RSS feed XML bytes
pub fn parse_feed(xml_bytes: &[u8]) -> Result<FeedDocument, FeedError> {
    let channel = rss::Channel::read_from(xml_bytes)?;

    Ok(FeedDocument {
        title: channel.title().trim().to_string(),
        entries: channel.items().iter().map(parse_entry).collect(),
    })
}

fn parse_entry(item: &rss::Item) -> FeedEntry {
    let title = item
        .title()
        .map(|t| t.trim().to_string())
        .unwrap_or_else(|| "Untitled Episode".to_string());

    let enclosure = item
        .enclosure()
        .map(|enclosure| enclosure.url().trim())
        .filter(|url| !url.is_empty())
        .map(String::from);

    let published = item.pub_date().and_then(|date_str| {
        DateTime::parse_from_rfc2822(date_str.trim())
            .ok()
            .or_else(|| parse_relaxed_date(date_str.trim()))
    });

    let summary = item
        .description()
        .or_else(|| item.itunes_ext().and_then(|ext| ext.summary()))
        .or_else(|| item.content())
        .and_then(clean_summary);

    FeedEntry {
        title,
        enclosure,
        published,
        summary,
    }
}

/// Try to parse dates that don't strictly conform to RFC 2822
fn parse_relaxed_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    let formats = [
        "%a, %d %b %Y %H:%M:%S %z",
        "%a, %d %b %Y %H:%M %z",
        "%d %b %Y %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S %z",
    ];

    formats
        .iter()
        .find_map(|format| DateTime::parse_from_str(date_str, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(date_str).ok())
}
