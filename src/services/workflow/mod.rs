//! Analysis Workflow
//!
//! The workflow state machine: a pure transition table plus the controller
//! that performs side effects (job submission, subscriptions, persistence)
//! around it.

pub mod controller;
pub mod transitions;

pub use controller::{WorkflowConfig, WorkflowController, WorkflowSnapshot};
pub use transitions::{next_step, WorkflowEvent};
