//! HTTP Remote Services
//!
//! reqwest-backed implementations of the remote service traits against the
//! analysis backend's REST surface. The push side of the status channel is
//! realized as a polling loop over the pull endpoint; swapping in a true
//! streaming transport only requires another `JobStatusChannel` impl.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use url::Url;

use crate::models::job::{JobSnapshot, JobStatusUpdate, JobSubmission};
use crate::models::plan::{NotificationPrefs, PlanUpdate};
use crate::models::settings::AppConfig;
use crate::models::task::AnalysisTask;
use crate::utils::error::{AppError, AppResult};

use super::{ChannelEvent, ExecutionService, JobStatusChannel, PlanningService, QueueService};

/// Buffered events per open status channel.
const CHANNEL_CAPACITY: usize = 32;

/// HTTP client for the remote analysis services.
///
/// One instance implements all four service traits so a single configured
/// client can be shared across the orchestrator.
#[derive(Clone)]
pub struct HttpAnalysisApi {
    http: reqwest::Client,
    base: Url,
    poll_interval: Duration,
}

impl HttpAnalysisApi {
    /// Build a client from application config.
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let mut base = config
            .service_base_url
            .parse::<Url>()
            .map_err(|e| AppError::config(format!("Invalid service base URL: {}", e)))?;

        // Url::join drops the last path segment without a trailing slash
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    fn endpoint(&self, path: &str) -> AppResult<Url> {
        self.base
            .join(path)
            .map_err(|e| AppError::config(format!("Invalid endpoint path {}: {}", path, e)))
    }
}

/// Generic submission envelope returned by job-creating endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitEnvelope {
    success: bool,
    job_id: Option<String>,
    error: Option<String>,
}

impl SubmitEnvelope {
    fn into_submission(self) -> AppResult<JobSubmission> {
        if !self.success {
            return Err(AppError::job(
                self.error
                    .unwrap_or_else(|| "Submission rejected".to_string()),
            ));
        }
        match self.job_id {
            Some(job_id) => Ok(JobSubmission { job_id }),
            None => Err(AppError::job("Submission succeeded without a job id")),
        }
    }
}

/// Envelope returned by the plan-update endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanUpdateEnvelope {
    success: bool,
    error: Option<String>,
    total_cases: Option<u32>,
    total_chunks: Option<u32>,
    estimated_time_seconds: Option<u64>,
    original_total_cases: Option<u32>,
}

/// Envelope returned by the queue task endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskEnvelope {
    success: bool,
    error: Option<String>,
    task: Option<AnalysisTask>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueEnvelope {
    success: bool,
    error: Option<String>,
    #[serde(default)]
    tasks: Vec<AnalysisTask>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AckEnvelope {
    success: bool,
    error: Option<String>,
}

fn reject(error: Option<String>) -> AppError {
    AppError::job(error.unwrap_or_else(|| "Request rejected".to_string()))
}

#[async_trait]
impl PlanningService for HttpAnalysisApi {
    async fn create_plan(&self, query: &str) -> AppResult<JobSubmission> {
        let url = self.endpoint("api/analysis/plan")?;
        let envelope: SubmitEnvelope = self
            .http
            .post(url)
            .json(&json!({ "query": query }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        envelope.into_submission()
    }

    async fn update_plan(&self, plan_id: &str, case_count: u32) -> AppResult<PlanUpdate> {
        let url = self.endpoint(&format!("api/analysis/plan/{}", plan_id))?;
        let envelope: PlanUpdateEnvelope = self
            .http
            .patch(url)
            .json(&json!({ "caseCount": case_count }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !envelope.success {
            return Err(reject(envelope.error));
        }

        match (
            envelope.total_cases,
            envelope.total_chunks,
            envelope.estimated_time_seconds,
            envelope.original_total_cases,
        ) {
            (Some(total_cases), Some(total_chunks), Some(estimated), Some(original)) => {
                Ok(PlanUpdate {
                    total_cases,
                    total_chunks,
                    estimated_time_seconds: estimated,
                    original_total_cases: original,
                })
            }
            _ => Err(AppError::job("Plan update response missing cost fields")),
        }
    }
}

#[async_trait]
impl ExecutionService for HttpAnalysisApi {
    async fn execute_plan(
        &self,
        plan_id: &str,
        prefs: Option<&NotificationPrefs>,
    ) -> AppResult<JobSubmission> {
        let url = self.endpoint("api/analysis/execute")?;
        let envelope: SubmitEnvelope = self
            .http
            .post(url)
            .json(&json!({ "planId": plan_id, "notificationPrefs": prefs }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        envelope.into_submission()
    }
}

#[async_trait]
impl QueueService for HttpAnalysisApi {
    async fn add_task(&self, query: &str) -> AppResult<AnalysisTask> {
        let url = self.endpoint("api/queue/tasks")?;
        let envelope: TaskEnvelope = self
            .http
            .post(url)
            .json(&json!({ "query": query }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !envelope.success {
            return Err(reject(envelope.error));
        }
        envelope
            .task
            .ok_or_else(|| AppError::job("Queue add response missing the task"))
    }

    async fn remove_task(&self, task_id: &str) -> AppResult<()> {
        let url = self.endpoint(&format!("api/queue/tasks/{}", task_id))?;
        let envelope: AckEnvelope = self
            .http
            .delete(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !envelope.success {
            return Err(reject(envelope.error));
        }
        Ok(())
    }

    async fn get_queue(&self) -> AppResult<Vec<AnalysisTask>> {
        let url = self.endpoint("api/queue/tasks")?;
        let envelope: QueueEnvelope = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !envelope.success {
            return Err(reject(envelope.error));
        }
        Ok(envelope.tasks)
    }

    async fn generate_plans_batch(&self) -> AppResult<String> {
        let url = self.endpoint("api/queue/plans")?;
        let envelope: SubmitEnvelope = self
            .http
            .post(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(envelope.into_submission()?.job_id)
    }

    async fn execute_queue(
        &self,
        notification_email: Option<&str>,
        terms_accepted: bool,
    ) -> AppResult<String> {
        let url = self.endpoint("api/queue/execute")?;
        let envelope: SubmitEnvelope = self
            .http
            .post(url)
            .json(&json!({
                "notificationEmail": notification_email,
                "termsAccepted": terms_accepted,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(envelope.into_submission()?.job_id)
    }
}

#[async_trait]
impl JobStatusChannel for HttpAnalysisApi {
    async fn open(&self, job_id: &str) -> AppResult<mpsc::Receiver<ChannelEvent>> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let api = self.clone();
        let job_id = job_id.to_string();

        tokio::spawn(async move {
            loop {
                match JobStatusChannel::get_status(&api, &job_id).await {
                    Ok(snapshot) => {
                        let terminal = snapshot.status.is_terminal();
                        let update = JobStatusUpdate {
                            job_id: job_id.clone(),
                            position: snapshot.position,
                            total: snapshot.total,
                            status: snapshot.status,
                            result: snapshot.result,
                            error: snapshot.error,
                        };
                        if tx.send(ChannelEvent::Status(update)).await.is_err() {
                            break;
                        }
                        if terminal {
                            let _ = tx.send(ChannelEvent::Closed).await;
                            break;
                        }
                    }
                    Err(e) => {
                        // Keep polling; the job is independent of our
                        // connection and the next tick may recover.
                        if tx
                            .send(ChannelEvent::TransportError(e.to_string()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
                tokio::time::sleep(api.poll_interval).await;
            }
        });

        Ok(rx)
    }

    async fn get_status(&self, job_id: &str) -> AppResult<JobSnapshot> {
        let url = self.endpoint(&format!("api/jobs/{}/status", job_id))?;
        let snapshot: JobSnapshot = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(snapshot)
    }
}
