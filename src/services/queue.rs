//! Task Queue Manager
//!
//! CRUD over the server-held task list plus batch submission, with a cached
//! mirror of the last-fetched list. The server list is authoritative; the
//! cache only exists so the presentation layer has a snapshot to render
//! between refreshes.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::models::task::AnalysisTask;
use crate::services::remote::QueueService;
use crate::utils::error::{AppError, AppResult};

/// Manager over the remote queue service.
#[derive(Clone)]
pub struct TaskQueueManager {
    service: Arc<dyn QueueService>,
    cache: Arc<RwLock<Vec<AnalysisTask>>>,
}

impl TaskQueueManager {
    pub fn new(service: Arc<dyn QueueService>) -> Self {
        Self {
            service,
            cache: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Add a task for a non-empty query. The cache is not touched; callers
    /// refresh afterwards to pick up the authoritative list.
    pub async fn add_task(&self, query: &str) -> AppResult<AnalysisTask> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(AppError::validation("Task query must not be empty"));
        }
        self.service.add_task(trimmed).await
    }

    /// Remove a task by id.
    pub async fn remove_task(&self, task_id: &str) -> AppResult<()> {
        self.service.remove_task(task_id).await
    }

    /// Re-pull the task list and replace the cache.
    pub async fn refresh(&self) -> AppResult<Vec<AnalysisTask>> {
        let tasks = self.service.get_queue().await?;
        debug!("queue refreshed: {} tasks", tasks.len());
        *self.cache.write().await = tasks.clone();
        Ok(tasks)
    }

    /// Snapshot of the last-fetched task list.
    pub async fn tasks(&self) -> Vec<AnalysisTask> {
        self.cache.read().await.clone()
    }

    /// Number of cached tasks still awaiting a plan.
    pub async fn pending_count(&self) -> usize {
        self.cache
            .read()
            .await
            .iter()
            .filter(|t| t.state.is_pending())
            .count()
    }

    /// Drop the cached list. Server-side tasks are unaffected.
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    /// Submit one batch planning job covering all pending tasks.
    pub async fn generate_plans_batch(&self) -> AppResult<String> {
        if self.cache.read().await.is_empty() {
            return Err(AppError::validation("The task queue is empty"));
        }
        self.service.generate_plans_batch().await
    }

    /// Submit one batch execution job. Terms must be accepted first.
    pub async fn execute_queue(
        &self,
        notification_email: Option<&str>,
        terms_accepted: bool,
    ) -> AppResult<String> {
        if !terms_accepted {
            return Err(AppError::validation(
                "Terms must be accepted before executing the queue",
            ));
        }
        self.service
            .execute_queue(notification_email, terms_accepted)
            .await
    }
}
