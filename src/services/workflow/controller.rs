//! Workflow Controller
//!
//! The top-level state machine driving a research query through plan
//! creation, preview, execution and the multi-task queue flow. Composes the
//! job subscription, plan mutator, queue manager and session persistence;
//! exposes a read-only snapshot to the presentation layer.
//!
//! Hard invariant: at most one job subscription is live at any instant.
//! Opening a new one always closes the previous handle first; two
//! subscriptions racing to mutate the same phase state would produce
//! undefined behavior downstream.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::models::job::{JobOutcome, JobStatusUpdate};
use crate::models::plan::{NotificationPrefs, PlanData};
use crate::models::session::{WorkflowSession, WorkflowStep};
use crate::models::task::AnalysisTask;
use crate::services::plan_mutator::{PlanMutator, DEFAULT_QUIET_PERIOD_MS};
use crate::services::queue::TaskQueueManager;
use crate::services::remote::{
    ExecutionService, JobStatusChannel, PlanningService, QueueService,
};
use crate::services::session::SessionPersistence;
use crate::services::subscription::{JobEventHandler, JobSubscription, SubscriptionHandle};
use crate::utils::error::{AppError, AppResult};

use super::transitions::{next_step, WorkflowEvent};

/// Tuning knobs for the controller.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Quiet period for case-limit adjustments
    pub case_limit_quiet_period: Duration,
    /// Fallback notification email when a request does not carry one
    pub default_notification_email: Option<String>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            case_limit_quiet_period: Duration::from_millis(DEFAULT_QUIET_PERIOD_MS),
            default_notification_email: None,
        }
    }
}

/// What kind of job a subscription is watching. Determines how its terminal
/// outcome maps onto workflow transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    Plan,
    Execute,
    BatchPlan,
    BatchExecute,
}

/// Mutable controller state behind the lock.
#[derive(Debug, Default)]
struct ControllerState {
    step: WorkflowStep,
    query: String,
    job_id: Option<String>,
    result: Option<serde_json::Value>,
    error: Option<String>,
    is_queue_mode: bool,
    queue_run_complete: bool,
}

/// Read-only projection of workflow state for the presentation layer.
#[derive(Debug, Clone)]
pub struct WorkflowSnapshot {
    pub step: WorkflowStep,
    pub query: String,
    pub plan: Option<PlanData>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub is_queue_mode: bool,
    pub queue_run_complete: bool,
    pub is_busy: bool,
    pub is_updating_plan: bool,
    pub tasks: Vec<AnalysisTask>,
}

struct WorkflowInner {
    planning: Arc<dyn PlanningService>,
    execution: Arc<dyn ExecutionService>,
    channel: Arc<dyn JobStatusChannel>,
    queue: TaskQueueManager,
    persistence: SessionPersistence,
    state: RwLock<ControllerState>,
    /// Shared with the plan mutator, which updates it in place
    plan: Arc<RwLock<Option<PlanData>>>,
    /// The single live subscription slot
    subscription: Mutex<Option<SubscriptionHandle>>,
}

impl WorkflowInner {
    /// Close any prior subscription and open one for the given job.
    async fn watch_job(inner: &Arc<WorkflowInner>, job_id: &str, kind: JobKind) -> AppResult<()> {
        let mut slot = inner.subscription.lock().await;
        if let Some(prev) = slot.take() {
            debug!("closing subscription for job {}", prev.job_id());
            prev.close();
        }

        let handler: Arc<dyn JobEventHandler> = Arc::new(WorkflowJobHandler {
            inner: Arc::clone(inner),
            kind,
        });
        match JobSubscription::open(Arc::clone(&inner.channel), job_id, handler).await {
            Ok(handle) => {
                *slot = Some(handle);
                Ok(())
            }
            Err(e) => {
                drop(slot);
                // The job was submitted but cannot be watched. Fall back to
                // an interactive step so the UI is not stuck loading; the
                // persisted job id lets a later resume reconcile it.
                let mut state = inner.state.write().await;
                state.step = state.step.failure_fallback(state.is_queue_mode);
                state.error = Some(e.to_string());
                drop(state);
                inner.persist().await;
                Err(e)
            }
        }
    }

    /// Record a terminal outcome: clear the job, surface the error if any,
    /// apply the transition and mirror the session.
    async fn finish_job(&self, event: WorkflowEvent, error: Option<String>) {
        {
            let mut state = self.state.write().await;
            state.job_id = None;
            state.error = error;
            if let Some(next) = next_step(state.step, &event) {
                state.step = next;
            }
        }
        self.persist().await;
    }

    /// Surface an error inline without a phase transition.
    async fn set_error(&self, message: String) {
        self.state.write().await.error = Some(message);
    }

    /// Mirror the current state to session persistence.
    async fn persist(&self) {
        let session = self.session_snapshot().await;
        if let Err(e) = self.persistence.save(&session) {
            warn!("failed to persist session: {}", e);
        }
    }

    async fn session_snapshot(&self) -> WorkflowSession {
        let state = self.state.read().await;
        let mut session = WorkflowSession::new(state.step);
        session.query = state.query.clone();
        session.plan_data = self.plan.read().await.clone();
        session.job_id = state.job_id.clone();
        session.result = state.result.clone();
        session.is_queue_mode = state.is_queue_mode;
        session
    }
}

/// Routes a subscribed job's events into workflow transitions. One type for
/// all four job kinds so the completion handling is not re-derived per call
/// site.
struct WorkflowJobHandler {
    inner: Arc<WorkflowInner>,
    kind: JobKind,
}

#[async_trait]
impl JobEventHandler for WorkflowJobHandler {
    async fn on_status(&self, update: &JobStatusUpdate) {
        debug!(
            "job {} status {} ({}/{})",
            update.job_id, update.status, update.position, update.total
        );
        // During batch runs every tick refreshes the cached task list so
        // per-task states become visible mid-flight. Read-only and
        // idempotent; a failed refresh just keeps the previous snapshot.
        if matches!(self.kind, JobKind::BatchPlan | JobKind::BatchExecute) {
            if let Err(e) = self.inner.queue.refresh().await {
                debug!("mid-flight queue refresh failed: {}", e);
            }
        }
    }

    async fn on_terminal(&self, outcome: JobOutcome) {
        match self.kind {
            JobKind::Plan => match outcome {
                JobOutcome::Success(value) => match PlanData::from_value(value) {
                    Ok(plan) => {
                        info!("plan {} ready ({} cases)", plan.plan_id, plan.total_cases);
                        *self.inner.plan.write().await = Some(plan);
                        self.inner.finish_job(WorkflowEvent::PlanReady, None).await;
                    }
                    Err(e) => {
                        self.inner
                            .finish_job(
                                WorkflowEvent::PlanFailed,
                                Some(format!("Malformed plan payload: {}", e)),
                            )
                            .await;
                    }
                },
                JobOutcome::Failure(message) => {
                    self.inner
                        .finish_job(WorkflowEvent::PlanFailed, Some(message))
                        .await;
                }
            },
            JobKind::Execute => match outcome {
                JobOutcome::Success(value) => {
                    self.inner.state.write().await.result = Some(value);
                    self.inner
                        .finish_job(WorkflowEvent::ExecutionCompleted, None)
                        .await;
                }
                JobOutcome::Failure(message) => {
                    self.inner
                        .finish_job(WorkflowEvent::ExecutionFailed, Some(message))
                        .await;
                }
            },
            JobKind::BatchPlan => {
                if let Err(e) = self.inner.queue.refresh().await {
                    warn!("queue refresh after batch planning failed: {}", e);
                }
                match outcome {
                    JobOutcome::Success(_) => {
                        self.inner
                            .finish_job(WorkflowEvent::BatchPlanningFinished, None)
                            .await;
                    }
                    JobOutcome::Failure(message) => {
                        self.inner
                            .finish_job(WorkflowEvent::BatchPlanningFailed, Some(message))
                            .await;
                    }
                }
            }
            JobKind::BatchExecute => {
                if let Err(e) = self.inner.queue.refresh().await {
                    warn!("queue refresh after batch execution failed: {}", e);
                }
                match outcome {
                    JobOutcome::Success(_) => {
                        // No auto-advance: the user must explicitly request
                        // the results step.
                        self.inner.state.write().await.queue_run_complete = true;
                        self.inner
                            .finish_job(WorkflowEvent::BatchExecutionFinished, None)
                            .await;
                    }
                    JobOutcome::Failure(message) => {
                        self.inner
                            .finish_job(WorkflowEvent::BatchExecutionFailed, Some(message))
                            .await;
                    }
                }
            }
        }
    }
}

/// The workflow state machine.
pub struct WorkflowController {
    inner: Arc<WorkflowInner>,
    mutator: PlanMutator,
    config: WorkflowConfig,
}

impl WorkflowController {
    /// Create a controller with default tuning.
    pub fn new(
        planning: Arc<dyn PlanningService>,
        execution: Arc<dyn ExecutionService>,
        channel: Arc<dyn JobStatusChannel>,
        queue_service: Arc<dyn QueueService>,
        persistence: SessionPersistence,
    ) -> Self {
        Self::with_config(
            planning,
            execution,
            channel,
            queue_service,
            persistence,
            WorkflowConfig::default(),
        )
    }

    /// Create a controller with explicit tuning.
    pub fn with_config(
        planning: Arc<dyn PlanningService>,
        execution: Arc<dyn ExecutionService>,
        channel: Arc<dyn JobStatusChannel>,
        queue_service: Arc<dyn QueueService>,
        persistence: SessionPersistence,
        config: WorkflowConfig,
    ) -> Self {
        let plan = Arc::new(RwLock::new(None));
        let mutator = PlanMutator::with_quiet_period(
            Arc::clone(&planning),
            Arc::clone(&plan),
            config.case_limit_quiet_period,
        );
        let inner = Arc::new(WorkflowInner {
            planning,
            execution,
            channel,
            queue: TaskQueueManager::new(queue_service),
            persistence,
            state: RwLock::new(ControllerState::default()),
            plan,
            subscription: Mutex::new(None),
        });

        Self {
            inner,
            mutator,
            config,
        }
    }

    /// Reject the action if the event does not apply to the current step.
    async fn guard_event(&self, event: WorkflowEvent) -> AppResult<()> {
        let state = self.inner.state.read().await;
        if next_step(state.step, &event).is_none() {
            return Err(AppError::validation(format!(
                "Action not available on step {}",
                state.step
            )));
        }
        Ok(())
    }

    /// Submit a planning job for a query and start watching it.
    pub async fn create_plan(&self, query: &str) -> AppResult<()> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(AppError::validation("Query must not be empty"));
        }
        self.guard_event(WorkflowEvent::PlanSubmitted).await?;

        let submission = match self.inner.planning.create_plan(trimmed).await {
            Ok(s) => s,
            Err(e) => {
                // Submission rejection: surfaced inline, no phase change
                self.inner.set_error(e.to_string()).await;
                return Err(e);
            }
        };
        info!("planning job {} submitted", submission.job_id);

        {
            let mut state = self.inner.state.write().await;
            state.query = trimmed.to_string();
            state.error = None;
            state.result = None;
            state.job_id = Some(submission.job_id.clone());
            if let Some(next) = next_step(state.step, &WorkflowEvent::PlanSubmitted) {
                state.step = next;
            }
        }
        *self.inner.plan.write().await = None;

        WorkflowInner::watch_job(&self.inner, &submission.job_id, JobKind::Plan).await?;
        self.inner.persist().await;
        Ok(())
    }

    /// Submit an execution job for the previewed plan and start watching it.
    pub async fn execute_plan(
        &self,
        plan_id: &str,
        prefs: Option<NotificationPrefs>,
    ) -> AppResult<()> {
        {
            let plan = self.inner.plan.read().await;
            match plan.as_ref() {
                Some(p) if p.plan_id == plan_id => {}
                Some(_) => {
                    return Err(AppError::validation(format!("No plan with id {}", plan_id)))
                }
                None => return Err(AppError::validation("No plan to execute")),
            }
        }
        self.guard_event(WorkflowEvent::ExecutionSubmitted).await?;

        let prefs = prefs.or_else(|| {
            self.config
                .default_notification_email
                .clone()
                .map(|email| NotificationPrefs {
                    email: Some(email),
                    notify_on_completion: true,
                })
        });

        let submission = match self
            .inner
            .execution
            .execute_plan(plan_id, prefs.as_ref())
            .await
        {
            Ok(s) => s,
            Err(e) => {
                self.inner.set_error(e.to_string()).await;
                return Err(e);
            }
        };
        info!("execution job {} submitted", submission.job_id);

        {
            let mut state = self.inner.state.write().await;
            state.error = None;
            state.result = None;
            state.job_id = Some(submission.job_id.clone());
            if let Some(next) = next_step(state.step, &WorkflowEvent::ExecutionSubmitted) {
                state.step = next;
            }
        }

        WorkflowInner::watch_job(&self.inner, &submission.job_id, JobKind::Execute).await?;
        self.inner.persist().await;
        Ok(())
    }

    /// Debounced case-limit adjustment on the previewed plan.
    pub async fn adjust_case_limit(&self, new_value: u32) -> AppResult<()> {
        self.mutator.adjust_case_limit(new_value).await
    }

    /// Add a task to the queue and enter queue mode.
    pub async fn add_to_queue(&self, query: &str) -> AppResult<AnalysisTask> {
        self.guard_event(WorkflowEvent::TaskQueued).await?;

        let task = self.inner.queue.add_task(query).await?;
        if let Err(e) = self.inner.queue.refresh().await {
            warn!("queue refresh after add failed: {}", e);
        }

        {
            let mut state = self.inner.state.write().await;
            state.is_queue_mode = true;
            state.error = None;
            if let Some(next) = next_step(state.step, &WorkflowEvent::TaskQueued) {
                state.step = next;
            }
        }
        self.inner.persist().await;
        Ok(task)
    }

    /// Remove a task from the queue.
    pub async fn remove_from_queue(&self, task_id: &str) -> AppResult<()> {
        self.inner.queue.remove_task(task_id).await?;
        if let Err(e) = self.inner.queue.refresh().await {
            warn!("queue refresh after remove failed: {}", e);
        }
        Ok(())
    }

    /// Submit one batch planning job covering all pending tasks.
    pub async fn generate_all_plans(&self) -> AppResult<()> {
        self.guard_event(WorkflowEvent::BatchPlanningSubmitted).await?;

        let job_id = match self.inner.queue.generate_plans_batch().await {
            Ok(id) => id,
            Err(e) => {
                self.inner.set_error(e.to_string()).await;
                return Err(e);
            }
        };
        info!("batch planning job {} submitted", job_id);

        {
            let mut state = self.inner.state.write().await;
            state.error = None;
            state.job_id = Some(job_id.clone());
            state.queue_run_complete = false;
            if let Some(next) = next_step(state.step, &WorkflowEvent::BatchPlanningSubmitted) {
                state.step = next;
            }
        }

        WorkflowInner::watch_job(&self.inner, &job_id, JobKind::BatchPlan).await?;
        self.inner.persist().await;
        Ok(())
    }

    /// Submit one batch execution job over the planned tasks.
    pub async fn execute_queue(
        &self,
        notification_email: Option<&str>,
        terms_accepted: bool,
    ) -> AppResult<()> {
        self.guard_event(WorkflowEvent::BatchExecutionSubmitted)
            .await?;

        let email = notification_email
            .map(str::to_string)
            .or_else(|| self.config.default_notification_email.clone());
        let job_id = match self
            .inner
            .queue
            .execute_queue(email.as_deref(), terms_accepted)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                self.inner.set_error(e.to_string()).await;
                return Err(e);
            }
        };
        info!("batch execution job {} submitted", job_id);

        {
            let mut state = self.inner.state.write().await;
            state.error = None;
            state.job_id = Some(job_id.clone());
            state.queue_run_complete = false;
            if let Some(next) = next_step(state.step, &WorkflowEvent::BatchExecutionSubmitted) {
                state.step = next;
            }
        }

        WorkflowInner::watch_job(&self.inner, &job_id, JobKind::BatchExecute).await?;
        self.inner.persist().await;
        Ok(())
    }

    /// Explicitly advance to the batch results step. Only valid once the
    /// batch run reached a terminal state; there is no auto-advance.
    pub async fn view_queue_results(&self) -> AppResult<()> {
        {
            let mut state = self.inner.state.write().await;
            if !state.queue_run_complete {
                return Err(AppError::validation(
                    "Batch execution has not finished yet",
                ));
            }
            match next_step(state.step, &WorkflowEvent::ResultsRequested) {
                Some(next) => state.step = next,
                None => {
                    return Err(AppError::validation(format!(
                        "Action not available on step {}",
                        state.step
                    )))
                }
            }
        }
        self.inner.persist().await;
        Ok(())
    }

    /// Return from batch results to queue management.
    pub async fn back_to_queue(&self) -> AppResult<()> {
        self.guard_event(WorkflowEvent::QueueOpened).await?;
        {
            let mut state = self.inner.state.write().await;
            if let Some(next) = next_step(state.step, &WorkflowEvent::QueueOpened) {
                state.step = next;
            }
        }
        self.inner.persist().await;
        Ok(())
    }

    /// Start over from the input step, discarding all workflow state.
    pub async fn start_new_analysis(&self) -> AppResult<()> {
        self.reset(false).await
    }

    /// Dismiss the workflow. Cancels the subscription and the pending
    /// debounce timer and discards in-memory and persisted state. Server
    /// side jobs keep running and can be reconciled on a later resume.
    pub async fn close_session(&self) -> AppResult<()> {
        self.reset(false).await
    }

    /// Dismiss the workflow and also drop the cached task list.
    pub async fn clear_and_close_queue(&self) -> AppResult<()> {
        self.reset(true).await
    }

    async fn reset(&self, clear_queue_cache: bool) -> AppResult<()> {
        {
            let mut slot = self.inner.subscription.lock().await;
            if let Some(prev) = slot.take() {
                prev.close();
            }
        }
        self.mutator.cancel().await;

        *self.inner.state.write().await = ControllerState::default();
        *self.inner.plan.write().await = None;
        if clear_queue_cache {
            self.inner.queue.clear_cache().await;
        }
        self.inner.persistence.clear()?;
        Ok(())
    }

    /// Restore a persisted session, reconciling any in-flight job against
    /// the pull status endpoint before resuming. Returns whether a session
    /// was found.
    pub async fn resume(&self) -> AppResult<bool> {
        let Some(session) = self.inner.persistence.restore()? else {
            return Ok(false);
        };
        info!("resuming session on step {}", session.current_step);

        {
            let mut state = self.inner.state.write().await;
            state.query = session.query.clone();
            state.result = session.result.clone();
            state.is_queue_mode = session.is_queue_mode;
            state.job_id = session.job_id.clone();
            state.step = session.current_step;
            state.error = None;
            state.queue_run_complete = false;
        }
        *self.inner.plan.write().await = session.plan_data.clone();

        if session.is_queue_mode {
            if let Err(e) = self.inner.queue.refresh().await {
                warn!("queue refresh during resume failed: {}", e);
            }
        }

        let Some(job_id) = session.job_id else {
            return Ok(true);
        };

        let kind = match (session.current_step, session.is_queue_mode) {
            (WorkflowStep::CreatingPlan, true) => JobKind::BatchPlan,
            (WorkflowStep::CreatingPlan, false) => JobKind::Plan,
            (WorkflowStep::ExecutingQueue, _) => JobKind::BatchExecute,
            _ => JobKind::Execute,
        };

        match self.inner.channel.get_status(&job_id).await {
            Ok(snapshot) => match snapshot.outcome() {
                Some(outcome) => {
                    // Already terminal: deliver through the same path as a
                    // live completion, landing directly on the display step
                    // or the interactive fallback, never a loading step.
                    let handler = WorkflowJobHandler {
                        inner: Arc::clone(&self.inner),
                        kind,
                    };
                    handler.on_terminal(outcome).await;
                }
                None => {
                    // Still pending: resubscribe and stay on the persisted
                    // step.
                    WorkflowInner::watch_job(&self.inner, &job_id, kind).await?;
                }
            },
            Err(e) => {
                warn!("reconciliation fetch for job {} failed: {}", job_id, e);
                WorkflowInner::watch_job(&self.inner, &job_id, kind).await?;
            }
        }

        Ok(true)
    }

    /// Current workflow step.
    pub async fn current_step(&self) -> WorkflowStep {
        self.inner.state.read().await.step
    }

    /// Snapshot of the cached task list.
    pub async fn tasks(&self) -> Vec<AnalysisTask> {
        self.inner.queue.tasks().await
    }

    /// Re-pull the task list on demand.
    pub async fn refresh_queue(&self) -> AppResult<Vec<AnalysisTask>> {
        self.inner.queue.refresh().await
    }

    /// Read-only projection for the presentation layer.
    pub async fn snapshot(&self) -> WorkflowSnapshot {
        let state = self.inner.state.read().await;
        WorkflowSnapshot {
            step: state.step,
            query: state.query.clone(),
            plan: self.inner.plan.read().await.clone(),
            result: state.result.clone(),
            error: state.error.clone(),
            is_queue_mode: state.is_queue_mode,
            queue_run_complete: state.queue_run_complete,
            // Busy means a job is in flight; a terminal batch run parked on
            // the executing_queue step is not busy.
            is_busy: state.job_id.is_some(),
            is_updating_plan: self.mutator.is_updating(),
            tasks: self.inner.queue.tasks().await,
        }
    }
}
