//! Task Models
//!
//! One queued query within queue mode. Task state advances monotonically
//! through planning and execution; a task never re-enters an earlier state
//! except by removal and recreation.

use serde::{Deserialize, Serialize};

use super::plan::PlanData;

/// Lifecycle state of a queued analysis task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Planning,
    Planned,
    Executing,
    Completed,
    Failed,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    /// Does this task still need a plan generated?
    pub fn is_pending(self) -> bool {
        matches!(self, TaskState::Pending)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::Planning => write!(f, "planning"),
            TaskState::Planned => write!(f, "planned"),
            TaskState::Executing => write!(f, "executing"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Failed => write!(f, "failed"),
        }
    }
}

/// One query awaiting processing inside queue mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisTask {
    /// Server-assigned task identifier
    pub id: String,
    /// The research query
    pub query: String,
    /// Current lifecycle state
    pub state: TaskState,
    /// Generated plan, once planning succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanData>,
    /// Opaque success payload, once execution completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error message, once planning or execution failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Creation timestamp (ISO 8601)
    pub created_at: String,
    /// Last update timestamp (ISO 8601)
    pub updated_at: String,
    /// Completion timestamp (ISO 8601), terminal states only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl AnalysisTask {
    /// Create a fresh pending task. Used by tests and in-memory services;
    /// production tasks come from the queue service already populated.
    pub fn new(id: impl Into<String>, query: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: id.into(),
            query: query.into(),
            state: TaskState::Pending,
            plan: None,
            result: None,
            error: None,
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
        }
    }
}
