//! Workflow Transition Table
//!
//! The canonical `{step, event} -> next step` mapping for the analysis
//! workflow, kept pure so it can be tested exhaustively. The controller
//! consults this table before performing side effects; `None` means the
//! event is not valid from the given step.

use crate::models::session::WorkflowStep;

/// Events that drive the workflow between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowEvent {
    /// A single planning job was accepted
    PlanSubmitted,
    /// The planning job delivered a plan
    PlanReady,
    /// The planning job failed terminally
    PlanFailed,
    /// A single execution job was accepted
    ExecutionSubmitted,
    /// The execution job delivered a result
    ExecutionCompleted,
    /// The execution job failed terminally
    ExecutionFailed,
    /// A task was added to the queue
    TaskQueued,
    /// A batch planning job was accepted
    BatchPlanningSubmitted,
    /// The batch planning job reached a terminal state
    BatchPlanningFinished,
    /// The batch planning job itself failed
    BatchPlanningFailed,
    /// A batch execution job was accepted
    BatchExecutionSubmitted,
    /// The batch execution job reached a terminal state; the workflow stays
    /// put until results are explicitly requested
    BatchExecutionFinished,
    /// The batch execution job itself failed
    BatchExecutionFailed,
    /// The user explicitly asked to view batch results
    ResultsRequested,
    /// The user returned to queue management
    QueueOpened,
    /// The user started over
    NewAnalysisRequested,
    /// The workflow was dismissed
    SessionClosed,
}

/// Resolve the next step for an event, or `None` if the event does not
/// apply to the current step.
pub fn next_step(step: WorkflowStep, event: &WorkflowEvent) -> Option<WorkflowStep> {
    use WorkflowEvent::*;
    use WorkflowStep::*;

    match (step, event) {
        // Single-query flow
        (Input, PlanSubmitted) => Some(CreatingPlan),
        (CreatingPlan, PlanReady) => Some(Preview),
        (CreatingPlan, PlanFailed) => Some(Input),
        (Preview, ExecutionSubmitted) => Some(Executing),
        // Results render on the executing step; no step change
        (Executing, ExecutionCompleted) => Some(Executing),
        (Executing, ExecutionFailed) => Some(Preview),

        // Entering queue mode is allowed from any interactive single-query
        // step as well as from queue management itself
        (Input | Preview | QueueManagement, TaskQueued) => Some(QueueManagement),

        // Batch flow
        (QueueManagement, BatchPlanningSubmitted) => Some(CreatingPlan),
        (CreatingPlan, BatchPlanningFinished) => Some(PreviewBatch),
        (CreatingPlan, BatchPlanningFailed) => Some(QueueManagement),
        (PreviewBatch, BatchExecutionSubmitted) => Some(ExecutingQueue),
        // Terminal state reached; manual confirmation moves to results
        (ExecutingQueue, BatchExecutionFinished) => Some(ExecutingQueue),
        (ExecutingQueue, BatchExecutionFailed) => Some(PreviewBatch),
        (ExecutingQueue, ResultsRequested) => Some(QueueResults),
        (QueueResults, QueueOpened) => Some(QueueManagement),

        // Loop back to input from anywhere
        (_, NewAnalysisRequested) => Some(Input),
        (_, SessionClosed) => Some(Input),

        _ => None,
    }
}
