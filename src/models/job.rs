//! Job Models
//!
//! Status updates and terminal outcomes for asynchronous remote jobs
//! (planning and execution), as delivered over the push channel or the
//! pull status endpoint.

use serde::{Deserialize, Serialize};

/// Remote job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    /// Is this a terminal status (no further updates expected)?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Error => write!(f, "error"),
        }
    }
}

/// A single tick from the job status channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusUpdate {
    /// Job this update belongs to
    pub job_id: String,
    /// Position in the remote queue (0 when processing)
    #[serde(default)]
    pub position: u32,
    /// Total jobs in the remote queue
    #[serde(default)]
    pub total: u32,
    /// Current status
    pub status: JobStatus,
    /// Inline success payload, present only on some terminal updates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Inline error message, present only on some terminal updates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response of the pull status endpoint for a single job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub status: JobStatus,
    #[serde(default)]
    pub position: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobSnapshot {
    /// Resolve the snapshot into a terminal outcome, if the job is done.
    ///
    /// A `completed` status without a payload resolves to a null success
    /// payload; an `error` status without a message gets a generic one.
    pub fn outcome(&self) -> Option<JobOutcome> {
        match self.status {
            JobStatus::Completed => {
                if let Some(error) = &self.error {
                    Some(JobOutcome::Failure(error.clone()))
                } else {
                    Some(JobOutcome::from_payload(
                        self.result.clone().unwrap_or(serde_json::Value::Null),
                    ))
                }
            }
            JobStatus::Error => Some(JobOutcome::Failure(
                self.error
                    .clone()
                    .unwrap_or_else(|| "Job failed without an error message".to_string()),
            )),
            JobStatus::Queued | JobStatus::Processing => None,
        }
    }
}

/// Resolved terminal payload of a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// The job finished and produced a payload (possibly null)
    Success(serde_json::Value),
    /// The job finished with an error message
    Failure(String),
}

impl JobOutcome {
    /// Classify a result payload. A job can report `completed` at the
    /// transport level while the payload itself carries `success: false`;
    /// that is a failure to everyone downstream.
    pub fn from_payload(value: serde_json::Value) -> JobOutcome {
        if let Some(obj) = value.as_object() {
            if obj.get("success").and_then(|v| v.as_bool()) == Some(false) {
                let message = obj
                    .get("error")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Analysis failed")
                    .to_string();
                return JobOutcome::Failure(message);
            }
        }
        JobOutcome::Success(value)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success(_))
    }
}

/// How a job's completion was delivered.
///
/// The channel can deliver the terminal payload inline on a status update,
/// or close the stream before the result is durably stored server-side, in
/// which case one confirmatory fetch of the pull endpoint is required. All
/// call sites resolve the distinction through [`JobCompletion::from_update`]
/// rather than re-deriving the branching.
#[derive(Debug, Clone, PartialEq)]
pub enum JobCompletion {
    /// Terminal payload arrived inline with the update
    InlineResult(JobOutcome),
    /// Terminal status without a payload; confirm via the pull endpoint
    RequiresConfirmFetch,
}

impl JobCompletion {
    /// Classify a status update. Returns `None` while the job is still live.
    pub fn from_update(update: &JobStatusUpdate) -> Option<JobCompletion> {
        if let Some(error) = &update.error {
            return Some(JobCompletion::InlineResult(JobOutcome::Failure(
                error.clone(),
            )));
        }
        if let Some(result) = &update.result {
            return Some(JobCompletion::InlineResult(JobOutcome::from_payload(
                result.clone(),
            )));
        }
        if update.status.is_terminal() {
            return Some(JobCompletion::RequiresConfirmFetch);
        }
        None
    }
}

/// Acknowledgement of a job submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmission {
    /// Server-assigned job identifier to subscribe on
    pub job_id: String,
}
