//! Lexflow - Legal Research Analysis Orchestrator
//!
//! This library drives a natural-language legal research query through an
//! asynchronous analysis workflow:
//! - Plan creation, preview and debounced cost adjustment
//! - Single-query and multi-task batch execution against remote services
//! - Job status subscriptions over a push/poll channel
//! - Versioned session persistence that survives restarts
//!
//! The presentation layer consumes the workflow controller's read-only
//! state projection; rendering is out of scope here.

pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

// Re-export the workflow surface
pub use services::{
    ChannelEvent, ExecutionService, HttpAnalysisApi, JobEventHandler, JobStatusChannel,
    JobSubscription, PlanMutator, PlanningService, QueueService, SessionPersistence,
    SessionStore, SubscriptionHandle, TaskQueueManager, WorkflowConfig, WorkflowController,
    WorkflowEvent, WorkflowSnapshot,
};
// Re-export models
pub use models::job::{JobCompletion, JobOutcome, JobSnapshot, JobStatus, JobStatusUpdate};
pub use models::plan::{NotificationPrefs, PlanData, PlanUpdate};
pub use models::session::{WorkflowSession, WorkflowStep, SESSION_SCHEMA_VERSION};
pub use models::settings::{AppConfig, SettingsUpdate};
pub use models::task::{AnalysisTask, TaskState};
pub use state::AppState;
pub use utils::error::{AppError, AppResult};
