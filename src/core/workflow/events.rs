use crate::core::workflow::state::WorkflowState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Automation event emitted when a transition commits. Consumed by the
/// background trigger layer; each payload carries at minimum the workflow id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepEvent {
    pub workflow_id: Uuid,
    /// Event name, e.g. `clustering.start`, `clustering.success`,
    /// `clustering.failed`, or the final `workflow.completed`.
    pub name: String,
    pub emitted_at: DateTime<Utc>,
}

impl StepEvent {
    pub fn new(workflow_id: Uuid, name: impl Into<String>) -> Self {
        StepEvent {
            workflow_id,
            name: name.into(),
            emitted_at: Utc::now(),
        }
    }
}

/// The automation event announced by arriving in a given state, if any.
/// Entering a processing state announces `<phase>.start`; arriving in a
/// ready/queued state announces the previous phase's `.success`.
pub fn automation_event_for(state: WorkflowState) -> Option<&'static str> {
    match state {
        WorkflowState::Pending => None,
        WorkflowState::ResearchingKeywords => Some("keyword_research.start"),
        WorkflowState::KeywordsReady => Some("keyword_research.success"),
        WorkflowState::KeywordResearchFailed => Some("keyword_research.failed"),
        WorkflowState::ResearchingLongtails => Some("longtail_research.start"),
        WorkflowState::LongtailsReady => Some("longtail_research.success"),
        WorkflowState::LongtailResearchFailed => Some("longtail_research.failed"),
        WorkflowState::Clustering => Some("clustering.start"),
        WorkflowState::ClustersReady => Some("clustering.success"),
        WorkflowState::ClusteringFailed => Some("clustering.failed"),
        WorkflowState::GeneratingArticles => Some("article_generation.start"),
        WorkflowState::ArticlesQueued => Some("article_generation.success"),
        WorkflowState::GenerationFailed => Some("article_generation.failed"),
        WorkflowState::Completed => Some("workflow.completed"),
    }
}

/// Error types for automation event publishing.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("automation event channel is closed")]
    ChannelClosed,
}

/// Sender half of the automation event bus. Cloned into the transition
/// executor so "moved to X" and "announced X" commit together.
#[derive(Clone)]
pub struct EventBus {
    event_tx: mpsc::UnboundedSender<StepEvent>,
}

impl EventBus {
    /// Create a bus plus the receiver the dispatcher (or a test) drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StepEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (Self { event_tx }, event_rx)
    }

    pub fn publish(&self, event: StepEvent) -> Result<(), PublishError> {
        tracing::debug!(
            workflow_id = %event.workflow_id,
            event = %event.name,
            "publishing automation event"
        );
        self.event_tx
            .send(event)
            .map_err(|_| PublishError::ChannelClosed)
    }
}
