//! Session Models
//!
//! The workflow step enumeration and the persisted session snapshot that
//! lets an analysis survive process restarts.

use serde::{Deserialize, Serialize};

use super::plan::PlanData;

/// Current schema version for persisted sessions. Bump when the snapshot
/// shape changes; older records are discarded on restore, not migrated.
pub const SESSION_SCHEMA_VERSION: u32 = 3;

/// Phase of the analysis workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    /// Entering a query
    Input,
    /// Waiting on a planning job (single or batch)
    CreatingPlan,
    /// Reviewing a single plan
    Preview,
    /// Reviewing generated batch plans
    PreviewBatch,
    /// Waiting on a single execution job, then showing its result
    Executing,
    /// Waiting on a batch execution job
    ExecutingQueue,
    /// Managing the task queue
    QueueManagement,
    /// Viewing batch results
    QueueResults,
}

impl WorkflowStep {
    /// Steps the user can act on directly, as opposed to loading steps.
    pub fn is_interactive(self) -> bool {
        !self.is_loading()
    }

    /// Steps that represent waiting on a remote job.
    pub fn is_loading(self) -> bool {
        matches!(
            self,
            WorkflowStep::CreatingPlan | WorkflowStep::ExecutingQueue
        )
    }

    /// Where to land when the job driving this step fails terminally.
    /// Never leaves the UI stuck on a loading step.
    pub fn failure_fallback(self, queue_mode: bool) -> WorkflowStep {
        match self {
            WorkflowStep::CreatingPlan if queue_mode => WorkflowStep::QueueManagement,
            WorkflowStep::CreatingPlan => WorkflowStep::Input,
            WorkflowStep::Executing => WorkflowStep::Preview,
            WorkflowStep::ExecutingQueue => WorkflowStep::PreviewBatch,
            other => other,
        }
    }
}

impl Default for WorkflowStep {
    fn default() -> Self {
        WorkflowStep::Input
    }
}

impl std::fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStep::Input => write!(f, "input"),
            WorkflowStep::CreatingPlan => write!(f, "creating_plan"),
            WorkflowStep::Preview => write!(f, "preview"),
            WorkflowStep::PreviewBatch => write!(f, "preview_batch"),
            WorkflowStep::Executing => write!(f, "executing"),
            WorkflowStep::ExecutingQueue => write!(f, "executing_queue"),
            WorkflowStep::QueueManagement => write!(f, "queue_management"),
            WorkflowStep::QueueResults => write!(f, "queue_results"),
        }
    }
}

/// Persisted snapshot of workflow state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSession {
    /// Schema version this record was written with
    pub version: u32,
    /// The query being analyzed
    #[serde(default)]
    pub query: String,
    /// Step the workflow was on at save time
    pub current_step: WorkflowStep,
    /// Plan under review, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_data: Option<PlanData>,
    /// In-flight job, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Completed execution result, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Whether the session is in multi-task queue mode
    #[serde(default)]
    pub is_queue_mode: bool,
    /// Save timestamp (ISO 8601)
    pub timestamp: String,
}

impl WorkflowSession {
    /// Create a snapshot stamped with the current schema version and time.
    pub fn new(current_step: WorkflowStep) -> Self {
        Self {
            version: SESSION_SCHEMA_VERSION,
            query: String::new(),
            current_step,
            plan_data: None,
            job_id: None,
            result: None,
            is_queue_mode: false,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// A session with nothing worth resuming. Such a session is never
    /// written; queue mode counts as non-empty because it is only entered
    /// after a task was successfully queued.
    pub fn is_empty(&self) -> bool {
        self.query.trim().is_empty()
            && self.job_id.is_none()
            && self.plan_data.is_none()
            && self.result.is_none()
            && !self.is_queue_mode
    }
}
