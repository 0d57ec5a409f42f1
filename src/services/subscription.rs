//! Job Status Subscription
//!
//! Wraps the push side of the job status channel into a uniform handler
//! interface and owns the forwarding task's lifecycle. Terminal payloads can
//! arrive inline on a status update or require a confirmatory fetch after
//! the stream closes; both paths resolve through `JobCompletion` and deliver
//! exactly one `on_terminal` call.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::job::{JobCompletion, JobOutcome, JobStatusUpdate};
use crate::services::remote::{ChannelEvent, JobStatusChannel};
use crate::utils::error::AppResult;

/// Callbacks for a subscribed job.
#[async_trait]
pub trait JobEventHandler: Send + Sync {
    /// A status tick arrived. Fires zero or more times.
    async fn on_status(&self, _update: &JobStatusUpdate) {}

    /// The job reached a terminal outcome. Fires at most once.
    async fn on_terminal(&self, outcome: JobOutcome);

    /// Transport-level failure. The server-side job is independent of our
    /// connection, so this is informational; a later tick or the
    /// confirmatory fetch can still recover the result.
    async fn on_transport_error(&self, message: &str) {
        warn!("job status transport error: {}", message);
    }
}

/// Handle to a live subscription.
#[derive(Debug)]
pub struct SubscriptionHandle {
    job_id: String,
    token: CancellationToken,
}

impl SubscriptionHandle {
    /// The job this subscription watches.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Stop forwarding events. Idempotent; calling after the subscription
    /// already self-closed is a no-op.
    pub fn close(&self) {
        self.token.cancel();
    }

    /// Whether the handle has been closed.
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Subscription factory over a [`JobStatusChannel`].
pub struct JobSubscription;

impl JobSubscription {
    /// Open the channel for a job and spawn the forwarding task.
    pub async fn open(
        channel: Arc<dyn JobStatusChannel>,
        job_id: &str,
        handler: Arc<dyn JobEventHandler>,
    ) -> AppResult<SubscriptionHandle> {
        let mut rx = channel.open(job_id).await?;
        let token = CancellationToken::new();
        let task_token = token.clone();
        let job_id = job_id.to_string();
        let task_job_id = job_id.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => {
                        debug!("subscription for job {} closed", task_job_id);
                        break;
                    }
                    event = rx.recv() => {
                        match event {
                            Some(ChannelEvent::Status(update)) => {
                                handler.on_status(&update).await;
                                match JobCompletion::from_update(&update) {
                                    None => {}
                                    Some(JobCompletion::InlineResult(outcome)) => {
                                        handler.on_terminal(outcome).await;
                                        task_token.cancel();
                                        break;
                                    }
                                    Some(JobCompletion::RequiresConfirmFetch) => {
                                        confirm_fetch(&channel, &task_job_id, &handler).await;
                                        task_token.cancel();
                                        break;
                                    }
                                }
                            }
                            Some(ChannelEvent::TransportError(message)) => {
                                handler.on_transport_error(&message).await;
                            }
                            Some(ChannelEvent::Closed) | None => {
                                confirm_fetch(&channel, &task_job_id, &handler).await;
                                task_token.cancel();
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(SubscriptionHandle { job_id, token })
    }
}

/// One pull of the status endpoint after the stream ended without an inline
/// terminal payload. Covers the race where the stream closes before the
/// result is durably stored server-side.
async fn confirm_fetch(
    channel: &Arc<dyn JobStatusChannel>,
    job_id: &str,
    handler: &Arc<dyn JobEventHandler>,
) {
    match channel.get_status(job_id).await {
        Ok(snapshot) => match snapshot.outcome() {
            Some(outcome) => handler.on_terminal(outcome).await,
            None => {
                warn!(
                    "stream for job {} closed while still pending; leaving for reconciliation",
                    job_id
                );
            }
        },
        Err(e) => handler.on_transport_error(&e.to_string()).await,
    }
}
