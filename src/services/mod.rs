//! Services
//!
//! Business logic services for the orchestrator. Services compose the
//! remote collaborators and are consumed by the presentation layer through
//! the workflow controller's projection.

pub mod plan_mutator;
pub mod queue;
pub mod remote;
pub mod session;
pub mod subscription;
pub mod workflow;

pub use plan_mutator::PlanMutator;
pub use queue::TaskQueueManager;
pub use remote::{
    ChannelEvent, ExecutionService, HttpAnalysisApi, JobStatusChannel, PlanningService,
    QueueService,
};
pub use session::{SessionPersistence, SessionStore, DEFAULT_SESSION_KEY};
pub use subscription::{JobEventHandler, JobSubscription, SubscriptionHandle};
pub use workflow::{WorkflowConfig, WorkflowController, WorkflowEvent, WorkflowSnapshot};
