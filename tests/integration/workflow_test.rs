//! Single-Query Workflow Tests
//!
//! Drives the controller through plan creation, preview, case-limit
//! adjustment and execution, including the rollback paths for submission
//! rejections and terminal job failures.

use std::sync::atomic::Ordering;

use serde_json::json;

use lexflow::models::job::JobStatus;
use lexflow::models::session::WorkflowStep;

use crate::support::*;

#[tokio::test]
async fn test_empty_query_performs_no_submission() {
    let h = TestHarness::new();
    let controller = h.controller();

    let err = controller.create_plan("   ").await.unwrap_err();
    assert!(err.to_string().contains("Query must not be empty"));

    assert_eq!(controller.current_step().await, WorkflowStep::Input);
    assert!(h.planning.submissions.lock().await.is_empty());
    assert_eq!(h.channel.open_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_create_plan_with_inline_result() {
    let h = TestHarness::new();
    let controller = h.controller();

    h.channel
        .script(
            "plan-job-1",
            vec![
                status_event("plan-job-1", JobStatus::Queued),
                status_event("plan-job-1", JobStatus::Processing),
                inline_success("plan-job-1", plan_payload("plan-1", 50)),
            ],
        )
        .await;

    controller.create_plan("fair use doctrine").await.unwrap();
    wait_until(&controller, |s| s.step == WorkflowStep::Preview, "preview step").await;

    let snap = controller.snapshot().await;
    assert_eq!(snap.query, "fair use doctrine");
    assert_eq!(snap.plan.as_ref().unwrap().plan_id, "plan-1");
    assert_eq!(snap.plan.as_ref().unwrap().total_cases, 50);
    assert!(snap.error.is_none());
    assert!(!snap.is_busy);
}

#[tokio::test]
async fn test_create_plan_via_confirmatory_fetch() {
    let h = TestHarness::new();
    let controller = h.controller();

    // The stream closes without an inline payload; the result is only
    // available from the pull endpoint.
    h.channel
        .script(
            "plan-job-1",
            vec![status_event("plan-job-1", JobStatus::Processing)],
        )
        .await;
    h.channel
        .set_snapshot("plan-job-1", snapshot_completed(plan_payload("plan-1", 50)))
        .await;

    controller.create_plan("adverse possession").await.unwrap();
    wait_until(&controller, |s| s.step == WorkflowStep::Preview, "preview step").await;

    let snap = controller.snapshot().await;
    assert_eq!(snap.plan.as_ref().unwrap().plan_id, "plan-1");
}

#[tokio::test]
async fn test_submission_rejection_keeps_step() {
    let h = TestHarness::new();
    let controller = h.controller();
    h.planning.reject_submissions.store(true, Ordering::SeqCst);

    let err = controller.create_plan("some query").await.unwrap_err();
    assert!(err.to_string().contains("planning rejected"));

    // Inline error, no phase transition, no subscription opened
    let snap = controller.snapshot().await;
    assert_eq!(snap.step, WorkflowStep::Input);
    assert!(snap.error.unwrap().contains("planning rejected"));
    assert_eq!(h.channel.open_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_plan_job_failure_returns_to_input() {
    let h = TestHarness::new();
    let controller = h.controller();

    h.channel
        .script(
            "plan-job-1",
            vec![
                status_event("plan-job-1", JobStatus::Processing),
                inline_failure("plan-job-1", "no matching corpus"),
            ],
        )
        .await;

    controller.create_plan("obscure query").await.unwrap();
    wait_until(&controller, |s| s.step == WorkflowStep::Input, "fallback to input").await;

    let snap = controller.snapshot().await;
    assert_eq!(snap.error.as_deref(), Some("no matching corpus"));
    assert!(snap.plan.is_none());
    assert!(!snap.is_busy);
}

#[tokio::test]
async fn test_execute_plan_stores_result() {
    let h = TestHarness::new();
    let controller = h.controller();
    drive_to_preview(&h, &controller).await;

    h.channel
        .script(
            "exec-job-1",
            vec![
                status_event("exec-job-1", JobStatus::Processing),
                inline_success("exec-job-1", json!({"success": true, "documents": 12})),
            ],
        )
        .await;

    controller.execute_plan("plan-1", None).await.unwrap();
    wait_until(&controller, |s| s.result.is_some(), "execution result").await;

    let snap = controller.snapshot().await;
    // Results render on the executing step; no auto-advance elsewhere
    assert_eq!(snap.step, WorkflowStep::Executing);
    assert_eq!(snap.result.unwrap()["documents"], 12);
    assert!(!snap.is_busy);
    assert_eq!(h.execution.submissions.lock().await.as_slice(), ["plan-1"]);
}

#[tokio::test]
async fn test_execution_failure_returns_to_preview() {
    let h = TestHarness::new();
    let controller = h.controller();
    drive_to_preview(&h, &controller).await;

    h.channel
        .script(
            "exec-job-1",
            vec![inline_failure("exec-job-1", "execution backend down")],
        )
        .await;

    controller.execute_plan("plan-1", None).await.unwrap();
    wait_until(&controller, |s| s.step == WorkflowStep::Preview, "back to preview").await;

    let snap = controller.snapshot().await;
    assert_eq!(snap.error.as_deref(), Some("execution backend down"));
    // The plan survives so the user can retry
    assert_eq!(snap.plan.unwrap().plan_id, "plan-1");
}

#[tokio::test]
async fn test_execute_requires_matching_plan() {
    let h = TestHarness::new();
    let controller = h.controller();
    drive_to_preview(&h, &controller).await;

    assert!(controller.execute_plan("bogus-plan", None).await.is_err());
    assert!(h.execution.submissions.lock().await.is_empty());
    assert_eq!(controller.current_step().await, WorkflowStep::Preview);
}

#[tokio::test]
async fn test_case_limit_adjustments_coalesce() {
    let h = TestHarness::new();
    let controller = h.controller();
    drive_to_preview(&h, &controller).await;

    // Three calls inside the quiet period produce exactly one remote
    // update carrying the last clamped value.
    controller.adjust_case_limit(10).await.unwrap();
    controller.adjust_case_limit(20).await.unwrap();
    controller.adjust_case_limit(30).await.unwrap();
    settle().await;

    assert_eq!(
        h.planning.updates.lock().await.as_slice(),
        [("plan-1".to_string(), 30)]
    );
    let snap = controller.snapshot().await;
    assert_eq!(snap.plan.as_ref().unwrap().total_cases, 30);
    assert_eq!(snap.plan.as_ref().unwrap().original_total_cases, 50);
}

#[tokio::test]
async fn test_case_limit_clamps_to_plan_bounds() {
    let h = TestHarness::new();
    let controller = h.controller();
    drive_to_preview(&h, &controller).await;

    controller.adjust_case_limit(0).await.unwrap();
    settle().await;
    assert_eq!(
        h.planning.updates.lock().await.as_slice(),
        [("plan-1".to_string(), 1)]
    );

    // 1000 clamps to the original 50
    controller.adjust_case_limit(1000).await.unwrap();
    settle().await;
    assert_eq!(
        h.planning.updates.lock().await.as_slice(),
        [("plan-1".to_string(), 1), ("plan-1".to_string(), 50)]
    );

    // Equal to the current value: no further call
    controller.adjust_case_limit(50).await.unwrap();
    settle().await;
    assert_eq!(h.planning.updates.lock().await.len(), 2);
}

#[tokio::test]
async fn test_close_session_cancels_subscription() {
    let h = TestHarness::new();
    let controller = h.controller();

    // The planning job never terminates on its own
    h.channel
        .script_hold(
            "plan-job-1",
            vec![status_event("plan-job-1", JobStatus::Processing)],
        )
        .await;

    controller.create_plan("long running query").await.unwrap();
    assert_eq!(controller.current_step().await, WorkflowStep::CreatingPlan);

    controller.close_session().await.unwrap();
    assert_eq!(controller.current_step().await, WorkflowStep::Input);
    assert!(h.persistence.restore().unwrap().is_none());

    // A late terminal event on the cancelled subscription changes nothing
    h.channel
        .push(
            "plan-job-1",
            inline_success("plan-job-1", plan_payload("plan-1", 50)),
        )
        .await;
    settle().await;

    let snap = controller.snapshot().await;
    assert_eq!(snap.step, WorkflowStep::Input);
    assert!(snap.plan.is_none());
}

#[tokio::test]
async fn test_at_most_one_live_subscription() {
    let h = TestHarness::new();
    let controller = h.controller();

    h.channel.script_hold("plan-job-1", vec![]).await;
    controller.create_plan("first query").await.unwrap();
    controller.close_session().await.unwrap();

    h.channel.script_hold("plan-job-2", vec![]).await;
    controller.create_plan("second query").await.unwrap();
    assert_eq!(h.channel.open_count.load(Ordering::SeqCst), 2);

    // Only the second subscription is live: events for the first job are
    // dropped, events for the second drive the workflow.
    h.channel
        .push(
            "plan-job-1",
            inline_success("plan-job-1", plan_payload("stale-plan", 10)),
        )
        .await;
    settle().await;
    assert_eq!(controller.current_step().await, WorkflowStep::CreatingPlan);

    h.channel
        .push(
            "plan-job-2",
            inline_success("plan-job-2", plan_payload("plan-2", 25)),
        )
        .await;
    wait_until(&controller, |s| s.step == WorkflowStep::Preview, "preview step").await;
    assert_eq!(
        controller.snapshot().await.plan.unwrap().plan_id,
        "plan-2"
    );
}

#[tokio::test]
async fn test_new_analysis_resets_from_results() {
    let h = TestHarness::new();
    let controller = h.controller();
    drive_to_preview(&h, &controller).await;

    h.channel
        .script(
            "exec-job-1",
            vec![inline_success("exec-job-1", json!({"success": true}))],
        )
        .await;
    controller.execute_plan("plan-1", None).await.unwrap();
    wait_until(&controller, |s| s.result.is_some(), "execution result").await;

    controller.start_new_analysis().await.unwrap();
    let snap = controller.snapshot().await;
    assert_eq!(snap.step, WorkflowStep::Input);
    assert!(snap.query.is_empty());
    assert!(snap.plan.is_none());
    assert!(snap.result.is_none());
}
