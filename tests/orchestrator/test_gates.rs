use async_trait::async_trait;
use chrono::Utc;
use draftmill::core::error::AppError;
use draftmill::core::types::ErrorCategory;
use draftmill::core::workflow::gates::{
    ArticleGenerationGate, Gate, GateStatus, SeedApprovalGate, TopicApprovalGate,
};
use draftmill::core::workflow::state::{
    ApprovalDecision, ApprovalKind, ApprovalRecord, WorkflowRecord, WorkflowState,
};
use draftmill::core::workflow::store::{ApprovalStore, MemoryStore, WorkflowStore};
use std::sync::Arc;
use uuid::Uuid;

/// Wraps a working workflow store with an approval lookup that always fails,
/// simulating an unreachable coordination backend.
struct BrokenApprovals {
    workflows: Arc<MemoryStore>,
}

#[async_trait]
impl WorkflowStore for BrokenApprovals {
    async fn get(&self, id: Uuid) -> Result<Option<WorkflowRecord>, AppError> {
        self.workflows.get(id).await
    }

    async fn insert(&self, record: WorkflowRecord) -> Result<(), AppError> {
        self.workflows.insert(record).await
    }

    async fn compare_and_swap_state(
        &self,
        id: Uuid,
        expected: WorkflowState,
        next: WorkflowState,
    ) -> Result<bool, AppError> {
        self.workflows.compare_and_swap_state(id, expected, next).await
    }
}

#[async_trait]
impl ApprovalStore for BrokenApprovals {
    async fn find_approval(
        &self,
        _workflow_id: Uuid,
        _kind: ApprovalKind,
    ) -> Result<Option<ApprovalRecord>, AppError> {
        Err(AppError::new(
            ErrorCategory::TransientError,
            "approval backend unreachable",
        ))
    }

    async fn record_approval(&self, _approval: ApprovalRecord) -> Result<(), AppError> {
        Err(AppError::new(
            ErrorCategory::TransientError,
            "approval backend unreachable",
        ))
    }
}

async fn workflow_in(state: WorkflowState) -> (Arc<MemoryStore>, Uuid) {
    let store = Arc::new(MemoryStore::new());
    let mut record = WorkflowRecord::new(Uuid::new_v4());
    record.state = state;
    let id = record.id;
    store.insert(record).await.unwrap();
    (store, id)
}

#[tokio::test]
async fn test_broken_approval_backend_fails_open() {
    let (inner, id) = workflow_in(WorkflowState::KeywordsReady).await;
    let broken = Arc::new(BrokenApprovals { workflows: inner });
    let gate = SeedApprovalGate::new(broken.clone(), broken, true);

    let result = gate.validate(id).await;
    assert!(result.allowed);
    assert_eq!(result.status, GateStatus::Error);
    assert_eq!(result.reason_code, "gate_evaluation_error");
}

#[tokio::test]
async fn test_broken_approval_backend_fails_closed_when_configured() {
    let (inner, id) = workflow_in(WorkflowState::KeywordsReady).await;
    let broken = Arc::new(BrokenApprovals { workflows: inner });
    let gate = SeedApprovalGate::new(broken.clone(), broken, false);

    let result = gate.validate(id).await;
    assert!(!result.allowed);
    assert_eq!(result.status, GateStatus::Error);
    assert!(result.required_action.is_some());
    assert!(result.blocked_at.is_some());
}

#[tokio::test]
async fn test_topic_gate_blocks_generation_until_approved() {
    let (store, id) = workflow_in(WorkflowState::ClustersReady).await;
    let gate = TopicApprovalGate::new(store.clone(), store.clone(), true);

    let result = gate.validate(id).await;
    assert!(!result.allowed);
    assert_eq!(result.reason_code, "approval_pending");

    store
        .record_approval(ApprovalRecord {
            workflow_id: id,
            kind: ApprovalKind::TopicClusters,
            decision: ApprovalDecision::Approved,
            feedback: None,
            decided_at: Utc::now(),
        })
        .await
        .unwrap();

    let result = gate.validate(id).await;
    assert!(result.allowed);
    assert_eq!(result.status, GateStatus::Allowed);
}

#[tokio::test]
async fn test_topic_gate_window_passes_once_generation_started() {
    let (store, id) = workflow_in(WorkflowState::GeneratingArticles).await;
    let gate = TopicApprovalGate::new(store.clone(), store, true);

    let result = gate.validate(id).await;
    assert!(result.allowed);
    assert_eq!(result.status, GateStatus::NotApplicable);
    assert_eq!(result.workflow_state, Some(WorkflowState::GeneratingArticles));
}

#[tokio::test]
async fn test_generation_gate_names_the_missing_phase() {
    let (store, id) = workflow_in(WorkflowState::KeywordsReady).await;
    let gate = ArticleGenerationGate::new(store, true);

    let result = gate.validate(id).await;
    assert!(!result.allowed);
    assert!(result
        .required_action
        .as_deref()
        .unwrap()
        .contains("longtail research has not completed"));
}

#[tokio::test]
async fn test_gates_are_independent() {
    // A rejected seed approval does not poison the topic gate; each gate
    // consults only its own decision record.
    let (store, id) = workflow_in(WorkflowState::ClustersReady).await;
    store
        .record_approval(ApprovalRecord {
            workflow_id: id,
            kind: ApprovalKind::SeedKeywords,
            decision: ApprovalDecision::Rejected,
            feedback: Some("start over".to_string()),
            decided_at: Utc::now(),
        })
        .await
        .unwrap();
    store
        .record_approval(ApprovalRecord {
            workflow_id: id,
            kind: ApprovalKind::TopicClusters,
            decision: ApprovalDecision::Approved,
            feedback: None,
            decided_at: Utc::now(),
        })
        .await
        .unwrap();

    let topic = TopicApprovalGate::new(store.clone(), store.clone(), true);
    let result = topic.validate(id).await;
    assert!(result.allowed);

    // The seed gate's window already passed by ClustersReady.
    let seed = SeedApprovalGate::new(store.clone(), store, true);
    let result = seed.validate(id).await;
    assert_eq!(result.status, GateStatus::NotApplicable);
}
