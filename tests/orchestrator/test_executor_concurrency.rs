use draftmill::core::types::ErrorCategory;
use draftmill::core::workflow::events::EventBus;
use draftmill::core::workflow::executor::{TransitionExecutor, TransitionOutcome};
use draftmill::core::workflow::state::{TransitionEvent, WorkflowRecord, WorkflowState};
use draftmill::core::workflow::store::{MemoryStore, WorkflowStore};
use std::sync::Arc;
use tokio_test::assert_ok;
use uuid::Uuid;

async fn harness() -> (TransitionExecutor, Arc<MemoryStore>, Uuid) {
    let store = Arc::new(MemoryStore::new());
    let (bus, _rx) = EventBus::channel();
    let executor = TransitionExecutor::new(store.clone(), bus);
    let record = WorkflowRecord::new(Uuid::new_v4());
    let id = record.id;
    store.insert(record).await.unwrap();
    (executor, store, id)
}

async fn race(n: usize) -> (usize, usize) {
    let (executor, store, id) = harness().await;
    let mut handles = Vec::new();
    for _ in 0..n {
        let executor = executor.clone();
        handles.push(tokio::spawn(async move {
            executor
                .transition(id, WorkflowState::Pending, TransitionEvent::Start)
                .await
        }));
    }

    let mut applied = 0;
    let mut not_applied = 0;
    for joined in futures::future::join_all(handles).await {
        match joined.unwrap().unwrap() {
            TransitionOutcome::Applied { new_state } => {
                assert_eq!(new_state, WorkflowState::ResearchingKeywords);
                applied += 1;
            }
            TransitionOutcome::NotApplied => not_applied += 1,
        }
    }

    // Whoever lost, the record holds exactly the single committed state.
    let state = store.get(id).await.unwrap().unwrap().state;
    assert_eq!(state, WorkflowState::ResearchingKeywords);
    (applied, not_applied)
}

#[tokio::test]
async fn test_three_racers_single_winner() {
    let (applied, not_applied) = race(3).await;
    assert_eq!(applied, 1);
    assert_eq!(not_applied, 2);
}

#[tokio::test]
async fn test_twenty_racers_single_winner() {
    let (applied, not_applied) = race(20).await;
    assert_eq!(applied, 1);
    assert_eq!(not_applied, 19);
}

#[tokio::test]
async fn test_losers_do_not_error() {
    // NotApplied is an outcome, not an error; none of the racers may see Err.
    let (executor, _store, id) = harness().await;
    let mut outcomes = Vec::new();
    for _ in 0..5 {
        let outcome = tokio_test::assert_ok!(
            executor
                .transition(id, WorkflowState::Pending, TransitionEvent::Start)
                .await
        );
        outcomes.push(outcome);
    }
    assert_eq!(outcomes.iter().filter(|o| o.applied()).count(), 1);
}

#[tokio::test]
async fn test_distinct_workflows_do_not_interfere() {
    let store = Arc::new(MemoryStore::new());
    let (bus, _rx) = EventBus::channel();
    let executor = TransitionExecutor::new(store.clone(), bus);

    let mut ids = Vec::new();
    for _ in 0..4 {
        let record = WorkflowRecord::new(Uuid::new_v4());
        ids.push(record.id);
        store.insert(record).await.unwrap();
    }

    let mut handles = Vec::new();
    for id in &ids {
        let executor = executor.clone();
        let id = *id;
        handles.push(tokio::spawn(async move {
            executor
                .transition(id, WorkflowState::Pending, TransitionEvent::Start)
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().applied());
    }
}

#[tokio::test]
async fn test_undefined_pair_rejected_before_store_access() {
    let (executor, store, id) = harness().await;
    let err = executor
        .transition(id, WorkflowState::Pending, TransitionEvent::Succeed)
        .await
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::ValidationError);
    assert_eq!(store.get(id).await.unwrap().unwrap().state, WorkflowState::Pending);
}

#[tokio::test]
async fn test_unknown_workflow_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let (bus, _rx) = EventBus::channel();
    let executor = TransitionExecutor::new(store, bus);
    let err = executor
        .transition(Uuid::new_v4(), WorkflowState::Pending, TransitionEvent::Start)
        .await
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::NotFoundError);
}
