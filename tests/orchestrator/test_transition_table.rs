use draftmill::core::workflow::state::{TransitionEvent, WorkflowState};
use draftmill::core::workflow::transitions::next_state;

const ALL_STATES: [WorkflowState; 14] = [
    WorkflowState::Pending,
    WorkflowState::ResearchingKeywords,
    WorkflowState::KeywordsReady,
    WorkflowState::ResearchingLongtails,
    WorkflowState::LongtailsReady,
    WorkflowState::Clustering,
    WorkflowState::ClustersReady,
    WorkflowState::GeneratingArticles,
    WorkflowState::ArticlesQueued,
    WorkflowState::Completed,
    WorkflowState::KeywordResearchFailed,
    WorkflowState::LongtailResearchFailed,
    WorkflowState::ClusteringFailed,
    WorkflowState::GenerationFailed,
];

const ALL_EVENTS: [TransitionEvent; 4] = [
    TransitionEvent::Start,
    TransitionEvent::Succeed,
    TransitionEvent::Fail,
    TransitionEvent::Complete,
];

#[test]
fn test_happy_path_walk() {
    let walk = [
        (WorkflowState::Pending, TransitionEvent::Start, WorkflowState::ResearchingKeywords),
        (WorkflowState::ResearchingKeywords, TransitionEvent::Succeed, WorkflowState::KeywordsReady),
        (WorkflowState::KeywordsReady, TransitionEvent::Start, WorkflowState::ResearchingLongtails),
        (WorkflowState::ResearchingLongtails, TransitionEvent::Succeed, WorkflowState::LongtailsReady),
        (WorkflowState::LongtailsReady, TransitionEvent::Start, WorkflowState::Clustering),
        (WorkflowState::Clustering, TransitionEvent::Succeed, WorkflowState::ClustersReady),
        (WorkflowState::ClustersReady, TransitionEvent::Start, WorkflowState::GeneratingArticles),
        (WorkflowState::GeneratingArticles, TransitionEvent::Succeed, WorkflowState::ArticlesQueued),
        (WorkflowState::ArticlesQueued, TransitionEvent::Complete, WorkflowState::Completed),
    ];
    for (from, event, to) in walk {
        assert_eq!(next_state(from, event), Some(to), "{:?} on {:?}", from, event);
    }
}

#[test]
fn test_each_processing_state_can_fail() {
    assert_eq!(
        next_state(WorkflowState::ResearchingKeywords, TransitionEvent::Fail),
        Some(WorkflowState::KeywordResearchFailed)
    );
    assert_eq!(
        next_state(WorkflowState::ResearchingLongtails, TransitionEvent::Fail),
        Some(WorkflowState::LongtailResearchFailed)
    );
    assert_eq!(
        next_state(WorkflowState::Clustering, TransitionEvent::Fail),
        Some(WorkflowState::ClusteringFailed)
    );
    assert_eq!(
        next_state(WorkflowState::GeneratingArticles, TransitionEvent::Fail),
        Some(WorkflowState::GenerationFailed)
    );
}

#[test]
fn test_failure_states_restart_into_their_phase() {
    let restarts = [
        (WorkflowState::KeywordResearchFailed, WorkflowState::ResearchingKeywords),
        (WorkflowState::LongtailResearchFailed, WorkflowState::ResearchingLongtails),
        (WorkflowState::ClusteringFailed, WorkflowState::Clustering),
        (WorkflowState::GenerationFailed, WorkflowState::GeneratingArticles),
    ];
    for (failed, processing) in restarts {
        assert_eq!(next_state(failed, TransitionEvent::Start), Some(processing));
    }
}

#[test]
fn test_completed_has_no_outgoing_edges() {
    for event in ALL_EVENTS {
        assert_eq!(next_state(WorkflowState::Completed, event), None);
    }
}

#[test]
fn test_undefined_pairs_yield_none() {
    // A ready state cannot succeed or fail; only Start moves it.
    for state in [
        WorkflowState::KeywordsReady,
        WorkflowState::LongtailsReady,
        WorkflowState::ClustersReady,
    ] {
        assert_eq!(next_state(state, TransitionEvent::Succeed), None);
        assert_eq!(next_state(state, TransitionEvent::Fail), None);
        assert_eq!(next_state(state, TransitionEvent::Complete), None);
    }
    // Complete applies to the queued state only.
    for state in ALL_STATES {
        let completes = next_state(state, TransitionEvent::Complete).is_some();
        assert_eq!(completes, state == WorkflowState::ArticlesQueued);
    }
}

#[test]
fn test_every_target_is_reachable_from_the_table() {
    let mut reachable: Vec<WorkflowState> = vec![WorkflowState::Pending];
    for state in ALL_STATES {
        for event in ALL_EVENTS {
            if let Some(target) = next_state(state, event) {
                if !reachable.contains(&target) {
                    reachable.push(target);
                }
            }
        }
    }
    for state in ALL_STATES {
        assert!(reachable.contains(&state), "{:?} unreachable", state);
    }
}

#[test]
fn test_terminal_classification() {
    assert!(WorkflowState::Completed.is_terminal());
    assert!(WorkflowState::KeywordResearchFailed.is_terminal());
    assert!(WorkflowState::GenerationFailed.is_terminal());
    assert!(!WorkflowState::Pending.is_terminal());
    assert!(!WorkflowState::ArticlesQueued.is_terminal());
    assert!(!WorkflowState::GeneratingArticles.is_terminal());
}
