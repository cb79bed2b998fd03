// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::EjectError;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Something that can unmount a mount point
#[async_trait]
pub trait Unmounter: Send + Sync {
    async fn unmount(&self, point: &Path) -> Result<(), EjectError>;
}

/// Unmounts by running an external command with the mount point appended
#[derive(Debug, Clone)]
pub struct CommandUnmounter {
    program: String,
    args: Vec<String>,
}

impl CommandUnmounter {
    pub fn new(command: &[String]) -> Result<Self, EjectError> {
        let (program, args) = command.split_first().ok_or(EjectError::NoCommand)?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl Unmounter for CommandUnmounter {
    async fn unmount(&self, point: &Path) -> Result<(), EjectError> {
        tracing::debug!(program = %self.program, point = %point.display(), "running unmount");

        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(point)
            .status()
            .await
            .map_err(|e| EjectError::SpawnFailed {
                program: self.program.clone(),
                source: e,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(EjectError::CommandFailed {
                program: self.program.clone(),
                status: status.to_string(),
            })
        }
    }
}

/// How often to retry a failing unmount
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// Give up after this many attempts; `None` keeps trying
    pub max_attempts: Option<u32>,
}

/// Unmount `point`, retrying with a fixed delay until it succeeds
///
/// Returns the number of attempts it took. A command that cannot be started
/// at all is not retried.
pub async fn eject(
    unmounter: &dyn Unmounter,
    point: &Path,
    policy: RetryPolicy,
    reporter: &SharedProgressReporter,
) -> Result<u32, EjectError> {
    let mut attempt = 0;

    loop {
        attempt += 1;

        match unmounter.unmount(point).await {
            Ok(()) => {
                tracing::info!(point = %point.display(), attempt, "ejected");
                reporter.report(ProgressEvent::Ejected {
                    point: point.to_path_buf(),
                });
                return Ok(attempt);
            }
            Err(e @ (EjectError::SpawnFailed { .. } | EjectError::NoCommand)) => return Err(e),
            Err(e) => {
                tracing::warn!(point = %point.display(), attempt, error = %e, "unmount failed");

                if policy.max_attempts.is_some_and(|max| attempt >= max) {
                    return Err(EjectError::GaveUp {
                        point: point.to_path_buf(),
                        attempts: attempt,
                    });
                }

                reporter.report(ProgressEvent::UnmountRetry {
                    attempt,
                    error: e.to_string(),
                });
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}
