//! Plan Models
//!
//! A plan is a server-computed execution strategy and cost estimate for a
//! research query, identified by a stable plan ID. Adjusting the case limit
//! updates the cost fields in place and never issues a new ID.

use serde::{Deserialize, Serialize};

/// Maximum number of preview rows kept on a plan.
pub const PREVIEW_MAX_ROWS: usize = 3;

/// A costed execution strategy for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanData {
    /// Stable plan identifier
    pub plan_id: String,
    /// Number of cases the plan will analyze
    pub total_cases: u32,
    /// Number of processing chunks
    pub total_chunks: u32,
    /// Estimated wall-clock time in seconds
    pub estimated_time_seconds: u64,
    /// Small sample of matching cases (at most [`PREVIEW_MAX_ROWS`] rows)
    #[serde(default)]
    pub preview_data: Vec<serde_json::Value>,
    /// Free-text summary of the chosen strategy
    #[serde(default)]
    pub strategy_summary: String,
    /// Case count at plan creation; set once, never changed by mutation
    pub original_total_cases: u32,
    /// Names of strategies the planner combined (diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategies_used: Option<Vec<String>>,
    /// Per-strategy case breakdown (diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_breakdown: Option<serde_json::Value>,
}

impl PlanData {
    /// Parse a plan out of a job result payload, trimming oversized previews.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let mut plan: PlanData = serde_json::from_value(value)?;
        plan.truncate_preview();
        Ok(plan)
    }

    /// Enforce the preview row cap.
    pub fn truncate_preview(&mut self) {
        self.preview_data.truncate(PREVIEW_MAX_ROWS);
    }

    /// Apply a mutation response in place. The plan ID and the original
    /// case count are immutable.
    pub fn apply_update(&mut self, update: &PlanUpdate) {
        self.total_cases = update.total_cases;
        self.total_chunks = update.total_chunks;
        self.estimated_time_seconds = update.estimated_time_seconds;
    }
}

/// Response of the remote plan-update endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanUpdate {
    pub total_cases: u32,
    pub total_chunks: u32,
    pub estimated_time_seconds: u64,
    /// Echoed back by the server; informational only
    pub original_total_cases: u32,
}

/// Notification preferences attached to an execution request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPrefs {
    /// Email to notify on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Whether to send a completion notification at all
    #[serde(default)]
    pub notify_on_completion: bool,
}
