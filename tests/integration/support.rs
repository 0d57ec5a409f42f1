//! Shared Test Support
//!
//! Scripted implementations of the remote service traits plus a harness
//! that wires them into a workflow controller backed by in-memory SQLite.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};

use lexflow::models::job::{JobSnapshot, JobStatus, JobStatusUpdate, JobSubmission};
use lexflow::models::plan::{NotificationPrefs, PlanData, PlanUpdate};
use lexflow::models::session::WorkflowStep;
use lexflow::models::task::{AnalysisTask, TaskState};
use lexflow::services::remote::{
    ChannelEvent, ExecutionService, JobStatusChannel, PlanningService, QueueService,
};
use lexflow::services::session::SessionPersistence;
use lexflow::services::workflow::{WorkflowConfig, WorkflowController, WorkflowSnapshot};
use lexflow::storage::Database;
use lexflow::utils::error::{AppError, AppResult};

// ============================================================================
// Planning / execution mocks
// ============================================================================

#[derive(Default)]
pub struct MockPlanning {
    pub reject_submissions: AtomicBool,
    pub submissions: Mutex<Vec<String>>,
    pub updates: Mutex<Vec<(String, u32)>>,
    counter: AtomicUsize,
}

#[async_trait]
impl PlanningService for MockPlanning {
    async fn create_plan(&self, query: &str) -> AppResult<JobSubmission> {
        if self.reject_submissions.load(Ordering::SeqCst) {
            return Err(AppError::job("planning rejected"));
        }
        self.submissions.lock().await.push(query.to_string());
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(JobSubmission {
            job_id: format!("plan-job-{}", n),
        })
    }

    async fn update_plan(&self, plan_id: &str, case_count: u32) -> AppResult<PlanUpdate> {
        self.updates
            .lock()
            .await
            .push((plan_id.to_string(), case_count));
        Ok(PlanUpdate {
            total_cases: case_count,
            total_chunks: (case_count / 10).max(1),
            estimated_time_seconds: u64::from(case_count) * 2,
            original_total_cases: 50,
        })
    }
}

#[derive(Default)]
pub struct MockExecution {
    pub reject_submissions: AtomicBool,
    pub submissions: Mutex<Vec<String>>,
    pub prefs_seen: Mutex<Vec<Option<NotificationPrefs>>>,
    counter: AtomicUsize,
}

#[async_trait]
impl ExecutionService for MockExecution {
    async fn execute_plan(
        &self,
        plan_id: &str,
        prefs: Option<&NotificationPrefs>,
    ) -> AppResult<JobSubmission> {
        if self.reject_submissions.load(Ordering::SeqCst) {
            return Err(AppError::job("execution rejected"));
        }
        self.submissions.lock().await.push(plan_id.to_string());
        self.prefs_seen.lock().await.push(prefs.cloned());
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(JobSubmission {
            job_id: format!("exec-job-{}", n),
        })
    }
}

// ============================================================================
// Scripted status channel
// ============================================================================

struct Script {
    events: Vec<ChannelEvent>,
    hold_open: bool,
}

/// Status channel fed from per-job scripts. Jobs without a script stay open
/// with no events, modeling a stream that never delivers.
#[derive(Default)]
pub struct ScriptedChannel {
    scripts: Mutex<HashMap<String, Script>>,
    pub snapshots: Mutex<HashMap<String, JobSnapshot>>,
    pub open_count: AtomicUsize,
    held: Mutex<HashMap<String, mpsc::Sender<ChannelEvent>>>,
}

impl ScriptedChannel {
    /// Script events for a job; the stream drops after the last event.
    pub async fn script(&self, job_id: &str, events: Vec<ChannelEvent>) {
        self.scripts.lock().await.insert(
            job_id.to_string(),
            Script {
                events,
                hold_open: false,
            },
        );
    }

    /// Script events for a job and keep the stream open afterwards.
    pub async fn script_hold(&self, job_id: &str, events: Vec<ChannelEvent>) {
        self.scripts.lock().await.insert(
            job_id.to_string(),
            Script {
                events,
                hold_open: true,
            },
        );
    }

    /// Set the pull-endpoint snapshot for a job.
    pub async fn set_snapshot(&self, job_id: &str, snapshot: JobSnapshot) {
        self.snapshots
            .lock()
            .await
            .insert(job_id.to_string(), snapshot);
    }

    /// Push a late event into a held-open stream.
    pub async fn push(&self, job_id: &str, event: ChannelEvent) {
        let held = self.held.lock().await;
        let tx = held.get(job_id).expect("job stream is not held open");
        let _ = tx.send(event).await;
    }
}

#[async_trait]
impl JobStatusChannel for ScriptedChannel {
    async fn open(&self, job_id: &str) -> AppResult<mpsc::Receiver<ChannelEvent>> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().await.remove(job_id).unwrap_or(Script {
            events: Vec::new(),
            hold_open: true,
        });

        let (tx, rx) = mpsc::channel(script.events.len().max(1) + 4);
        for event in script.events {
            tx.try_send(event).expect("script exceeded channel capacity");
        }
        if script.hold_open {
            self.held.lock().await.insert(job_id.to_string(), tx);
        }
        Ok(rx)
    }

    async fn get_status(&self, job_id: &str) -> AppResult<JobSnapshot> {
        self.snapshots
            .lock()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| AppError::transport("status endpoint unreachable"))
    }
}

// ============================================================================
// Queue mock
// ============================================================================

#[derive(Default)]
pub struct MockQueue {
    pub tasks: Mutex<Vec<AnalysisTask>>,
    pub executions: Mutex<Vec<(Option<String>, bool)>>,
    task_counter: AtomicUsize,
    batch_counter: AtomicUsize,
}

impl MockQueue {
    /// Mark a task planned with a plan derived from its query.
    pub async fn mark_planned(&self, task_id: &str) {
        let mut tasks = self.tasks.lock().await;
        let task = tasks.iter_mut().find(|t| t.id == task_id).unwrap();
        task.state = TaskState::Planned;
        task.plan = Some(plan_data(&format!("plan-{}", task_id), 10, 10));
    }

    /// Mark a task failed with an error message.
    pub async fn mark_failed(&self, task_id: &str, error: &str) {
        let mut tasks = self.tasks.lock().await;
        let task = tasks.iter_mut().find(|t| t.id == task_id).unwrap();
        task.state = TaskState::Failed;
        task.error = Some(error.to_string());
    }
}

#[async_trait]
impl QueueService for MockQueue {
    async fn add_task(&self, query: &str) -> AppResult<AnalysisTask> {
        let n = self.task_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let task = AnalysisTask::new(format!("task-{}", n), query);
        self.tasks.lock().await.push(task.clone());
        Ok(task)
    }

    async fn remove_task(&self, task_id: &str) -> AppResult<()> {
        let mut tasks = self.tasks.lock().await;
        let before = tasks.len();
        tasks.retain(|t| t.id != task_id);
        if tasks.len() == before {
            return Err(AppError::not_found(format!("Task {} not found", task_id)));
        }
        Ok(())
    }

    async fn get_queue(&self) -> AppResult<Vec<AnalysisTask>> {
        Ok(self.tasks.lock().await.clone())
    }

    async fn generate_plans_batch(&self) -> AppResult<String> {
        let n = self.batch_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("batch-plan-{}", n))
    }

    async fn execute_queue(
        &self,
        notification_email: Option<&str>,
        terms_accepted: bool,
    ) -> AppResult<String> {
        self.executions
            .lock()
            .await
            .push((notification_email.map(str::to_string), terms_accepted));
        let n = self.batch_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("batch-exec-{}", n))
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct TestHarness {
    pub planning: Arc<MockPlanning>,
    pub execution: Arc<MockExecution>,
    pub channel: Arc<ScriptedChannel>,
    pub queue: Arc<MockQueue>,
    pub db: Database,
    pub persistence: SessionPersistence,
}

impl TestHarness {
    pub fn new() -> Self {
        let db = Database::new_in_memory().expect("Failed to create in-memory test database");
        let persistence = SessionPersistence::new(Arc::new(db.clone()));
        Self {
            planning: Arc::new(MockPlanning::default()),
            execution: Arc::new(MockExecution::default()),
            channel: Arc::new(ScriptedChannel::default()),
            queue: Arc::new(MockQueue::default()),
            db,
            persistence,
        }
    }

    /// Build a controller over this harness's services. Multiple controllers
    /// share the same mocks and session store, which is how reload-time
    /// resume is exercised.
    pub fn controller(&self) -> WorkflowController {
        WorkflowController::with_config(
            self.planning.clone(),
            self.execution.clone(),
            self.channel.clone(),
            self.queue.clone(),
            self.persistence.clone(),
            WorkflowConfig {
                case_limit_quiet_period: Duration::from_millis(20),
                default_notification_email: None,
            },
        )
    }
}

// ============================================================================
// Event and payload builders
// ============================================================================

pub fn status_event(job_id: &str, status: JobStatus) -> ChannelEvent {
    ChannelEvent::Status(JobStatusUpdate {
        job_id: job_id.to_string(),
        position: 0,
        total: 1,
        status,
        result: None,
        error: None,
    })
}

pub fn inline_success(job_id: &str, result: Value) -> ChannelEvent {
    ChannelEvent::Status(JobStatusUpdate {
        job_id: job_id.to_string(),
        position: 0,
        total: 1,
        status: JobStatus::Completed,
        result: Some(result),
        error: None,
    })
}

pub fn inline_failure(job_id: &str, error: &str) -> ChannelEvent {
    ChannelEvent::Status(JobStatusUpdate {
        job_id: job_id.to_string(),
        position: 0,
        total: 1,
        status: JobStatus::Error,
        result: None,
        error: Some(error.to_string()),
    })
}

pub fn snapshot_completed(result: Value) -> JobSnapshot {
    JobSnapshot {
        status: JobStatus::Completed,
        position: 0,
        total: 0,
        result: Some(result),
        error: None,
    }
}

pub fn snapshot_processing() -> JobSnapshot {
    JobSnapshot {
        status: JobStatus::Processing,
        position: 1,
        total: 3,
        result: None,
        error: None,
    }
}

pub fn plan_data(plan_id: &str, total_cases: u32, original: u32) -> PlanData {
    PlanData {
        plan_id: plan_id.to_string(),
        total_cases,
        total_chunks: (total_cases / 10).max(1),
        estimated_time_seconds: u64::from(total_cases) * 2,
        preview_data: vec![json!({"caption": "Smith v. Jones"})],
        strategy_summary: "citation graph traversal".to_string(),
        original_total_cases: original,
        strategies_used: None,
        strategy_breakdown: None,
    }
}

pub fn plan_payload(plan_id: &str, total_cases: u32) -> Value {
    serde_json::to_value(plan_data(plan_id, total_cases, total_cases)).unwrap()
}

// ============================================================================
// Waiting helpers
// ============================================================================

pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}

/// Poll the controller until the snapshot satisfies a condition.
pub async fn wait_until<F>(controller: &WorkflowController, mut cond: F, what: &str)
where
    F: FnMut(&WorkflowSnapshot) -> bool,
{
    for _ in 0..200 {
        let snap = controller.snapshot().await;
        if cond(&snap) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Drive a fresh controller to the preview step with a 50-case plan.
pub async fn drive_to_preview(h: &TestHarness, controller: &WorkflowController) {
    h.channel
        .script(
            "plan-job-1",
            vec![
                status_event("plan-job-1", JobStatus::Processing),
                inline_success("plan-job-1", plan_payload("plan-1", 50)),
            ],
        )
        .await;
    controller
        .create_plan("precedent for software patent claims")
        .await
        .unwrap();
    wait_until(controller, |s| s.step == WorkflowStep::Preview, "preview step").await;
}
