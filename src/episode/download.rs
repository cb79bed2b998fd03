// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::DownloadError;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

use super::filename::partial_path;

/// Context for tracking a download in concurrent scenarios
#[derive(Debug, Clone)]
pub struct DownloadContext {
    /// Slot ID (0 to max_concurrent-1) for progress bar management
    pub download_id: usize,
    /// Index of this episode in the download queue
    pub episode_index: usize,
    /// Total number of episodes to download
    pub total_to_download: usize,
}

/// Check whether `path` already holds the complete remote file
///
/// Compares the local size against the remote Content-Length from a HEAD
/// request. A local file at least as large as the remote one is complete;
/// retagging grows a file past its remote size. A HEAD request that fails,
/// at the transport or HTTP level, counts as downloaded so an unreachable
/// host is not hammered on every run. A HEAD response without a
/// Content-Length counts as not downloaded.
pub async fn is_downloaded<C: HttpClient + ?Sized>(client: &C, url: &str, path: &Path) -> bool {
    let local_size = match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => metadata.len(),
        _ => return false,
    };

    match client.head(url).await {
        Ok(head) if head.status >= 400 => {
            tracing::warn!(url, status = head.status, "size check failed, keeping local file");
            true
        }
        Ok(head) => match head.content_length {
            Some(remote_size) => {
                tracing::debug!(url, local_size, remote_size, "compared sizes");
                local_size >= remote_size
            }
            None => false,
        },
        Err(e) => {
            tracing::warn!(url, error = %e, "size check failed, keeping local file");
            true
        }
    }
}

/// Download `url` to `output_path`
///
/// Streams the response body into a `.partial` sibling, reporting progress
/// through the reporter, and moves it into place once complete. On failure
/// the partial file is removed and any existing file at `output_path` is
/// left alone. Returns the number of bytes downloaded.
pub async fn download_episode<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    episode_title: &str,
    output_path: &Path,
    context: &DownloadContext,
    reporter: &SharedProgressReporter,
) -> Result<u64, DownloadError> {
    let partial = partial_path(output_path);

    let result = stream_to_file(client, url, episode_title, &partial, context, reporter).await;

    let bytes_downloaded = match result {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
    };

    if let Err(e) = tokio::fs::rename(&partial, output_path).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(DownloadError::FileWriteFailed {
            path: output_path.to_path_buf(),
            source: e,
        });
    }

    reporter.report(ProgressEvent::DownloadCompleted {
        download_id: context.download_id,
        episode_title: episode_title.to_string(),
        bytes_downloaded,
    });

    Ok(bytes_downloaded)
}

async fn stream_to_file<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    episode_title: &str,
    path: &Path,
    context: &DownloadContext,
    reporter: &SharedProgressReporter,
) -> Result<u64, DownloadError> {
    let response = client
        .get_stream(url)
        .await
        .map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if response.status >= 400 {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    reporter.report(ProgressEvent::DownloadStarting {
        download_id: context.download_id,
        episode_title: episode_title.to_string(),
        episode_index: context.episode_index,
        total_to_download: context.total_to_download,
        content_length: response.content_length,
    });

    let mut file = File::create(path)
        .await
        .map_err(|e| DownloadError::FileCreateFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    let mut bytes_downloaded: u64 = 0;
    let mut stream = response.body;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        bytes_downloaded += chunk.len() as u64;

        reporter.report(ProgressEvent::DownloadProgress {
            download_id: context.download_id,
            bytes_downloaded,
            total_bytes: response.content_length,
        });
    }

    file.flush()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(bytes_downloaded)
}
