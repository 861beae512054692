#![allow(clippy::result_large_err)] // Executor returns AppError to preserve structured diagnostic context.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow::events::{automation_event_for, EventBus, StepEvent};
use crate::core::workflow::state::{TransitionEvent, WorkflowState};
use crate::core::workflow::store::WorkflowStore;
use crate::core::workflow::transitions::next_state;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of an attempted transition. `NotApplied` is the expected outcome
/// for all-but-one concurrent racer and must be treated as a no-op by the
/// caller, never retried blindly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied { new_state: WorkflowState },
    NotApplied,
}

impl TransitionOutcome {
    pub fn applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }
}

/// The single writer of workflow state. Every mutation funnels through
/// `transition`, which performs one conditional update against the store and
/// announces the committed state on the event bus before returning.
#[derive(Clone)]
pub struct TransitionExecutor {
    store: Arc<dyn WorkflowStore>,
    events: EventBus,
}

impl TransitionExecutor {
    pub fn new(store: Arc<dyn WorkflowStore>, events: EventBus) -> Self {
        Self { store, events }
    }

    /// Apply `event` iff the record's state still equals `expected`.
    ///
    /// An undefined `(expected, event)` pair is a programming error and fails
    /// fast with `ValidationError`, distinct from the `NotApplied` outcome of
    /// losing the compare-and-swap race.
    pub async fn transition(
        &self,
        id: Uuid,
        expected: WorkflowState,
        event: TransitionEvent,
    ) -> Result<TransitionOutcome, AppError> {
        let target = next_state(expected, event).ok_or_else(|| {
            AppError::new(
                ErrorCategory::ValidationError,
                format!(
                    "no transition defined for state '{}' on event '{}'",
                    expected,
                    event.as_str()
                ),
            )
            .with_code("WF-FSM-001")
        })?;

        let applied = self.store.compare_and_swap_state(id, expected, target).await?;
        if !applied {
            info!(
                workflow_id = %id,
                expected = %expected,
                event = event.as_str(),
                "transition not applied, lost compare-and-swap race"
            );
            return Ok(TransitionOutcome::NotApplied);
        }

        info!(
            workflow_id = %id,
            from = %expected,
            to = %target,
            event = event.as_str(),
            "workflow transition committed"
        );
        if let Some(name) = automation_event_for(target) {
            // The dispatcher shutting down must not roll back a committed
            // state change; the event loss is logged instead.
            if let Err(err) = self.events.publish(StepEvent::new(id, name)) {
                warn!(workflow_id = %id, event = name, error = %err, "automation event dropped");
            }
        }

        Ok(TransitionOutcome::Applied { new_state: target })
    }
}
