//! Remote Analysis Services
//!
//! Trait seams for the opaque remote collaborators: the planning and
//! execution services, the job status channel, and the queue service.
//! The orchestrator only ever talks to these traits; the bundled HTTP
//! implementation lives in [`http`].

pub mod http;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::models::job::{JobSnapshot, JobStatusUpdate, JobSubmission};
use crate::models::plan::{NotificationPrefs, PlanUpdate};
use crate::models::task::AnalysisTask;
use crate::utils::error::AppResult;

pub use http::HttpAnalysisApi;

/// One event on the push side of the job status channel.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A status tick for the subscribed job
    Status(JobStatusUpdate),
    /// The channel signalled end-of-stream
    Closed,
    /// Transport-level failure; the job itself may still be running
    TransportError(String),
}

/// Plan creation and mutation.
#[async_trait]
pub trait PlanningService: Send + Sync {
    /// Submit a planning job for a query. Rejections surface as `Err`.
    async fn create_plan(&self, query: &str) -> AppResult<JobSubmission>;

    /// Adjust an existing plan's case count. Updates in place server-side;
    /// the plan ID never changes.
    async fn update_plan(&self, plan_id: &str, case_count: u32) -> AppResult<PlanUpdate>;
}

/// Plan execution.
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Submit an execution job for a previously created plan.
    async fn execute_plan(
        &self,
        plan_id: &str,
        prefs: Option<&NotificationPrefs>,
    ) -> AppResult<JobSubmission>;
}

/// Push/pull access to job status.
#[async_trait]
pub trait JobStatusChannel: Send + Sync {
    /// Open the push side for a job. Events arrive on the returned receiver
    /// until the job terminates or the receiver is dropped.
    async fn open(&self, job_id: &str) -> AppResult<mpsc::Receiver<ChannelEvent>>;

    /// Pull the current status once. Used for the confirmatory fetch after
    /// stream close and for reload-time reconciliation.
    async fn get_status(&self, job_id: &str) -> AppResult<JobSnapshot>;
}

/// Server-held task queue for multi-task batch runs.
#[async_trait]
pub trait QueueService: Send + Sync {
    /// Add a task to the queue.
    async fn add_task(&self, query: &str) -> AppResult<AnalysisTask>;

    /// Remove a task from the queue.
    async fn remove_task(&self, task_id: &str) -> AppResult<()>;

    /// Fetch the authoritative task list.
    async fn get_queue(&self) -> AppResult<Vec<AnalysisTask>>;

    /// Submit one batch planning job covering all pending tasks.
    async fn generate_plans_batch(&self) -> AppResult<String>;

    /// Submit one batch execution job over all planned tasks.
    async fn execute_queue(
        &self,
        notification_email: Option<&str>,
        terms_accepted: bool,
    ) -> AppResult<String>;
}
