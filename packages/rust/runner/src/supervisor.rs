//! Supervised execution of one work item.
//!
//! The runner owns the work item for its whole lifetime: it prepares a fresh
//! working directory, runs the command with stdout and stderr sharing one log
//! file (so the combined stream keeps its order), classifies the result,
//! reports it through the status callback, and finally removes the working
//! directory.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::Utc;
use tokio::process::Command;
use tracing::{info, instrument, warn};

use geoasset_shared::{ChangeLog, GeoAssetError, JobId, Result, StatusUpdate};

use crate::callback::CallbackClient;
use crate::classify::{Outcome, classify};
use crate::redact::{Redactor, truncate_tail};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One supervised execution.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub job_id: JobId,
    /// Program followed by its arguments.
    pub command: Vec<String>,
    /// Working directory, created fresh and removed afterwards.
    pub work_dir: PathBuf,
}

/// Immutable runner settings, resolved from config and flags by the caller.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Bytes of redacted output kept for the callback detail.
    pub detail_limit_bytes: usize,
    /// Directory receiving `{job_id}.log` with the full, unredacted output.
    pub log_dir: PathBuf,
    pub redactor: Redactor,
    /// `None` skips the callback.
    pub callback: Option<CallbackClient>,
}

/// What happened during one supervised run.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub outcome: Outcome,
    /// `None` when the process was killed by a signal or never started.
    pub exit_code: Option<i32>,
    /// The entry sent (or that would have been sent) to the callback.
    pub change_log: ChangeLog,
    pub callback_delivered: bool,
    pub log_path: PathBuf,
}

impl StepReport {
    /// Process exit code for the runner itself.
    pub fn process_exit_code(&self) -> u8 {
        if self.outcome.is_success() { 0 } else { 1 }
    }
}

// ---------------------------------------------------------------------------
// StepRunner
// ---------------------------------------------------------------------------

/// Supervisor wrapping one unit of work.
pub struct StepRunner {
    settings: RunnerSettings,
}

impl StepRunner {
    pub fn new(settings: RunnerSettings) -> Self {
        Self { settings }
    }

    /// Run `item` to completion.
    ///
    /// Only an empty command or an unusable work directory are returned as
    /// errors. Once the work directory exists every problem, including a
    /// command that fails or cannot start and an unwritable log, yields a
    /// failed report; the callback is still sent and the directory removed.
    #[instrument(skip_all, fields(job_id = %item.job_id))]
    pub async fn run(&self, item: &WorkItem) -> Result<StepReport> {
        if item.command.is_empty() {
            return Err(GeoAssetError::validation("no command to run"));
        }
        let escaped = shell_words::join(&item.command);

        prepare_work_dir(&item.work_dir).await?;
        let log_path = self.settings.log_dir.join(format!("{}.log", item.job_id));

        info!(command = %escaped, work_dir = %item.work_dir.display(), "starting command");
        let (exit_code, output) = match self.capture(item, &log_path).await {
            Ok(captured) => captured,
            Err(e) => {
                warn!(error = %e, "command could not be supervised");
                (None, format!("{e}\n"))
            }
        };
        let outcome = classify(exit_code, &output);
        info!(?exit_code, ?outcome, "command finished");

        let change_log = self.change_log(outcome, &escaped, &output);

        let callback_delivered = match &self.settings.callback {
            Some(client) => {
                match client
                    .send(&item.job_id, &StatusUpdate::single(change_log.clone()))
                    .await
                {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, "status callback failed");
                        false
                    }
                }
            }
            None => {
                warn!("status callback not configured, skipping");
                false
            }
        };

        if let Err(e) = tokio::fs::remove_dir_all(&item.work_dir).await {
            warn!(path = %item.work_dir.display(), error = %e, "failed to remove work directory");
        }

        Ok(StepReport {
            outcome,
            exit_code,
            change_log,
            callback_delivered,
            log_path,
        })
    }

    async fn capture(&self, item: &WorkItem, log_path: &Path) -> Result<(Option<i32>, String)> {
        tokio::fs::create_dir_all(&self.settings.log_dir)
            .await
            .map_err(|e| GeoAssetError::io(&self.settings.log_dir, e))?;
        execute(&item.command, &item.work_dir, log_path).await
    }

    fn change_log(&self, outcome: Outcome, escaped: &str, output: &str) -> ChangeLog {
        let (message, detail) = match outcome {
            Outcome::Success => (format!("Successfully ran {escaped}"), String::new()),
            Outcome::Failure => {
                let redacted = self.settings.redactor.redact(output);
                let detail = truncate_tail(&redacted, self.settings.detail_limit_bytes).to_string();
                (format!("Command {escaped} failed"), detail)
            }
        };

        ChangeLog {
            date_time: Utc::now(),
            status: outcome.status(),
            message,
            detail,
        }
    }
}

/// Remove any leftover directory and create an empty one.
async fn prepare_work_dir(dir: &Path) -> Result<()> {
    if tokio::fs::try_exists(dir).await.unwrap_or(false) {
        warn!(path = %dir.display(), "removing leftover work directory");
        tokio::fs::remove_dir_all(dir)
            .await
            .map_err(|e| GeoAssetError::io(dir, e))?;
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| GeoAssetError::io(dir, e))
}

/// Run the command with both output streams appended to `log_path`.
///
/// Returns the exit code and the captured combined output. A spawn failure
/// is written to the log and returned as output with no exit code.
async fn execute(command: &[String], work_dir: &Path, log_path: &Path) -> Result<(Option<i32>, String)> {
    let log = std::fs::File::create(log_path).map_err(|e| GeoAssetError::io(log_path, e))?;
    let stderr_log = log.try_clone().map_err(|e| GeoAssetError::io(log_path, e))?;

    let spawned = Command::new(&command[0])
        .args(&command[1..])
        .current_dir(work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(stderr_log))
        .spawn();

    let exit_code = match spawned {
        Ok(mut child) => {
            let status = child
                .wait()
                .await
                .map_err(|e| GeoAssetError::Process(format!("failed to wait for {}: {e}", command[0])))?;
            status.code()
        }
        Err(e) => {
            let message = format!("failed to start {}: {e}\n", command[0]);
            warn!(error = %e, "command could not be started");
            tokio::fs::write(log_path, &message)
                .await
                .map_err(|e| GeoAssetError::io(log_path, e))?;
            None
        }
    };

    let bytes = tokio::fs::read(log_path)
        .await
        .map_err(|e| GeoAssetError::io(log_path, e))?;
    Ok((exit_code, String::from_utf8_lossy(&bytes).into_owned()))
}
