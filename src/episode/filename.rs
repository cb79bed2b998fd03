// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use url::Url;

use crate::error::DownloadError;

/// Folder name used for podcasts whose title sanitizes to nothing
const UNTITLED_FOLDER: &str = "Untitled Podcast";

/// Local file name for an enclosure URL
///
/// The last path segment of the URL, percent-decoded and made safe for the
/// filesystem. Query strings and fragments are ignored.
pub fn local_filename(enclosure: &str) -> Result<String, DownloadError> {
    let no_name = || DownloadError::NoFileName(enclosure.to_string());

    let url = Url::parse(enclosure).map_err(|_| no_name())?;
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .ok_or_else(no_name)?;

    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());

    let sanitized = sanitize_filename::sanitize(decoded.trim());
    if sanitized.is_empty() {
        return Err(no_name());
    }

    Ok(sanitized)
}

/// Full download path for an enclosure inside the download folder
pub fn download_path(download_dir: &Path, enclosure: &str) -> Result<PathBuf, DownloadError> {
    Ok(download_dir.join(local_filename(enclosure)?))
}

/// Subdirectory name for a podcast in folder mode
pub fn podcast_folder_name(title: &str) -> String {
    let sanitized = sanitize_filename::sanitize(title.trim());
    if sanitized.trim().is_empty() {
        UNTITLED_FOLDER.to_string()
    } else {
        sanitized
    }
}

/// Path of the temporary file a download streams into
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}
