pub mod events;
pub mod executor;
pub mod gates;
pub mod idempotency;
pub mod pipeline;
pub mod retry;
pub mod state;
pub mod steps;
pub mod store;
pub mod transitions;

pub use events::{automation_event_for, EventBus, StepEvent};
pub use executor::{TransitionExecutor, TransitionOutcome};
pub use gates::{ArticleGenerationGate, Gate, GateResult, GateStatus, SeedApprovalGate, TopicApprovalGate};
pub use idempotency::{ApplyOutcome, CompletionEffect, IdempotencyLedger, MemoryLedger};
pub use pipeline::{
    CompletedSection, CompletionMonitor, Document, DocumentStatus, Researcher, Section,
    SectionPipeline, SectionStatus, Writer,
};
pub use retry::{run_with_retry, RetryPolicy, RetrySuccess};
pub use state::{Phase, TransitionEvent, WorkflowRecord, WorkflowState};
pub use steps::{PhaseWorker, StepKind, StepOutcome, StepRuntime};
pub use store::{ApprovalStore, DocumentStore, MemoryStore, UsageStore, WorkflowStore};
pub use transitions::next_state;
