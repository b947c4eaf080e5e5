//! Core domain types shared by the runner and the workflows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// Identifier of one supervised job.
///
/// Usually supplied by the scheduler (e.g. the batch job ID); a fresh
/// time-sortable UUID is used when running outside a scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new time-sortable job identifier.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// ChangeLog
// ---------------------------------------------------------------------------

/// Status carried by a change log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeLogStatus {
    Success,
    Failed,
}

/// One entry of a job's audit trail, as delivered by the status callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLog {
    /// When the entry was produced.
    pub date_time: DateTime<Utc>,
    pub status: ChangeLogStatus,
    /// Human-readable summary naming the command that ran.
    pub message: String,
    /// Redacted, truncated output (empty on success).
    pub detail: String,
}

/// Body of the `PATCH {status_url}/{job_id}` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub change_log: Vec<ChangeLog>,
}

impl StatusUpdate {
    pub fn single(entry: ChangeLog) -> Self {
        Self {
            change_log: vec![entry],
        }
    }
}
