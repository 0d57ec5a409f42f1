//! Plan Mutation
//!
//! Debounced adjustment of a plan's case-count parameter. Calls within the
//! quiet period coalesce into a single remote update carrying the last
//! clamped value; the pending timer is an explicit cancellable resource so
//! controller teardown can abort it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::plan::PlanData;
use crate::services::remote::PlanningService;
use crate::utils::error::{AppError, AppResult};

/// Default quiet period before a case-limit change is committed.
pub const DEFAULT_QUIET_PERIOD_MS: u64 = 500;

/// Debounced mutator over the plan shared with the workflow controller.
#[derive(Clone)]
pub struct PlanMutator {
    planning: Arc<dyn PlanningService>,
    plan: Arc<RwLock<Option<PlanData>>>,
    quiet_period: Duration,
    is_updating: Arc<AtomicBool>,
    last_error: Arc<RwLock<Option<String>>>,
    /// Token of the pending quiet-period timer, if any
    pending: Arc<Mutex<Option<CancellationToken>>>,
}

impl PlanMutator {
    /// Create a mutator with the default quiet period.
    pub fn new(planning: Arc<dyn PlanningService>, plan: Arc<RwLock<Option<PlanData>>>) -> Self {
        Self::with_quiet_period(
            planning,
            plan,
            Duration::from_millis(DEFAULT_QUIET_PERIOD_MS),
        )
    }

    /// Create a mutator with an explicit quiet period.
    pub fn with_quiet_period(
        planning: Arc<dyn PlanningService>,
        plan: Arc<RwLock<Option<PlanData>>>,
        quiet_period: Duration,
    ) -> Self {
        Self {
            planning,
            plan,
            quiet_period,
            is_updating: Arc::new(AtomicBool::new(false)),
            last_error: Arc::new(RwLock::new(None)),
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Request a case-limit change.
    ///
    /// The value is clamped into `[min(1, original), original]`. A clamped
    /// value equal to the current count, or a plan with no cases at all,
    /// produces no network call. Otherwise the quiet-period timer restarts;
    /// when it fires, the remote update runs and the plan's cost fields are
    /// overwritten in place. The plan ID never changes.
    pub async fn adjust_case_limit(&self, new_value: u32) -> AppResult<()> {
        let (plan_id, current, original) = {
            let guard = self.plan.read().await;
            match guard.as_ref() {
                Some(plan) => (plan.plan_id.clone(), plan.total_cases, plan.original_total_cases),
                None => return Err(AppError::validation("No plan available to adjust")),
            }
        };

        if original == 0 {
            return Ok(());
        }

        let min_cases = original.min(1);
        let clamped = new_value.clamp(min_cases, original);
        if clamped == current {
            return Ok(());
        }

        let token = CancellationToken::new();
        {
            let mut pending = self.pending.lock().await;
            if let Some(prev) = pending.take() {
                prev.cancel();
            }
            *pending = Some(token.clone());
        }

        let mutator = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("case limit change to {} superseded", clamped);
                }
                _ = tokio::time::sleep(mutator.quiet_period) => {
                    mutator.commit(&plan_id, clamped).await;
                }
            }
        });

        Ok(())
    }

    /// Commit the clamped value to the planning service.
    async fn commit(&self, plan_id: &str, case_count: u32) {
        self.is_updating.store(true, Ordering::SeqCst);

        match self.planning.update_plan(plan_id, case_count).await {
            Ok(update) => {
                let mut guard = self.plan.write().await;
                if let Some(plan) = guard.as_mut() {
                    if plan.plan_id == plan_id {
                        plan.apply_update(&update);
                    }
                }
                *self.last_error.write().await = None;
            }
            Err(e) => {
                // The displayed slider value stays where the user left it;
                // only the error message surfaces.
                warn!("case limit update failed: {}", e);
                *self.last_error.write().await = Some(e.to_string());
            }
        }

        self.is_updating.store(false, Ordering::SeqCst);
    }

    /// Abort any pending quiet-period timer. Safe to call at any time.
    pub async fn cancel(&self) {
        let mut pending = self.pending.lock().await;
        if let Some(token) = pending.take() {
            token.cancel();
        }
    }

    /// Whether a remote update is currently in flight.
    pub fn is_updating(&self) -> bool {
        self.is_updating.load(Ordering::SeqCst)
    }

    /// The error from the most recent failed update, if any.
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }
}
