// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fs::{File, OpenOptions};
use std::path::Path;

use fs2::FileExt;

use crate::error::LockError;

/// Name of the lock file kept in the download folder
pub const LOCK_FILE_NAME: &str = ".podkeep.lock";

/// Exclusive hold on the media folders
///
/// Taken before downloading, syncing or pruning files so that two runs never
/// touch the same files. Released when dropped.
#[derive(Debug)]
pub struct MediaLock {
    file: File,
}

impl MediaLock {
    /// Take the lock in `download_dir` without waiting
    pub fn acquire(download_dir: &Path) -> Result<Self, LockError> {
        let path = download_dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| LockError::OpenFailed {
                path: path.clone(),
                source: e,
            })?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "media lock taken");
                Ok(Self { file })
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Err(LockError::Busy(path)),
            Err(e) => Err(LockError::OpenFailed { path, source: e }),
        }
    }
}

impl Drop for MediaLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_holder_is_busy() {
        let dir = tempdir().unwrap();
        let first = MediaLock::acquire(dir.path()).unwrap();

        let second = MediaLock::acquire(dir.path());
        assert!(matches!(second, Err(LockError::Busy(_))));

        drop(first);
        assert!(MediaLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn lock_file_lives_in_download_dir() {
        let dir = tempdir().unwrap();
        let _lock = MediaLock::acquire(dir.path()).unwrap();

        assert!(dir.path().join(LOCK_FILE_NAME).is_file());
    }

    #[test]
    fn missing_directory_fails_to_open() {
        let dir = tempdir().unwrap();
        let result = MediaLock::acquire(&dir.path().join("nope"));
        assert!(matches!(result, Err(LockError::OpenFailed { .. })));
    }
}
