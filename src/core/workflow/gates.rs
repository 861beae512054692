use crate::core::workflow::state::{ApprovalDecision, ApprovalKind, WorkflowState};
use crate::core::workflow::store::{ApprovalStore, WorkflowStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Four-way gate outcome. `NotApplicable` and `Error` (under fail-open)
/// still carry `allowed = true` so forward progress is never blocked by a
/// gate whose window has passed or whose data source is down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Allowed,
    Blocked,
    NotApplicable,
    Error,
}

/// Outcome of one prerequisite check. Computed fresh per invocation and
/// never persisted; the caller may log it for audit.
#[derive(Debug, Clone, Serialize)]
pub struct GateResult {
    pub allowed: bool,
    pub status: GateStatus,
    pub reason_code: String,
    pub required_action: Option<String>,
    pub workflow_state: Option<WorkflowState>,
    pub blocked_at: Option<DateTime<Utc>>,
}

impl GateResult {
    pub fn allowed(reason_code: impl Into<String>) -> Self {
        GateResult {
            allowed: true,
            status: GateStatus::Allowed,
            reason_code: reason_code.into(),
            required_action: None,
            workflow_state: None,
            blocked_at: None,
        }
    }

    pub fn blocked(
        reason_code: impl Into<String>,
        required_action: impl Into<String>,
        workflow_state: Option<WorkflowState>,
    ) -> Self {
        GateResult {
            allowed: false,
            status: GateStatus::Blocked,
            reason_code: reason_code.into(),
            required_action: Some(required_action.into()),
            workflow_state,
            blocked_at: Some(Utc::now()),
        }
    }

    pub fn not_applicable(workflow_state: Option<WorkflowState>) -> Self {
        GateResult {
            allowed: true,
            status: GateStatus::NotApplicable,
            reason_code: "gate_window_passed".to_string(),
            required_action: None,
            workflow_state,
            blocked_at: None,
        }
    }

    fn evaluation_error(gate: &str, fail_open: bool, detail: &str) -> Self {
        warn!(
            gate = gate,
            fail_open = fail_open,
            detail = detail,
            "gate evaluation error"
        );
        GateResult {
            allowed: fail_open,
            status: GateStatus::Error,
            reason_code: "gate_evaluation_error".to_string(),
            required_action: if fail_open {
                None
            } else {
                Some("retry once the coordination store is reachable".to_string())
            },
            workflow_state: None,
            blocked_at: if fail_open { None } else { Some(Utc::now()) },
        }
    }
}

/// A named prerequisite check for one workflow phase. Gates are independent
/// and composable; a step handler may consult more than one.
#[async_trait]
pub trait Gate: Send + Sync {
    fn name(&self) -> &'static str;
    async fn validate(&self, workflow_id: Uuid) -> GateResult;
}

/// Position of a state along the pipeline, used to decide whether a gate's
/// window has already passed. Failure variants rank with their phase.
fn progress_rank(state: WorkflowState) -> u8 {
    match state {
        WorkflowState::Pending => 0,
        WorkflowState::ResearchingKeywords | WorkflowState::KeywordResearchFailed => 1,
        WorkflowState::KeywordsReady => 2,
        WorkflowState::ResearchingLongtails | WorkflowState::LongtailResearchFailed => 3,
        WorkflowState::LongtailsReady => 4,
        WorkflowState::Clustering | WorkflowState::ClusteringFailed => 5,
        WorkflowState::ClustersReady => 6,
        WorkflowState::GeneratingArticles | WorkflowState::GenerationFailed => 7,
        WorkflowState::ArticlesQueued => 8,
        WorkflowState::Completed => 9,
    }
}

/// Shared evaluation for the two human-approval gates: the seed keyword
/// decision gating longtail research, and the topic cluster decision gating
/// article generation.
struct ApprovalGate {
    gate_name: &'static str,
    kind: ApprovalKind,
    /// Rank past which the gated phase has already started; the gate no
    /// longer applies from there on.
    window_closes_after: u8,
    required_action: &'static str,
    workflows: Arc<dyn WorkflowStore>,
    approvals: Arc<dyn ApprovalStore>,
    fail_open: bool,
}

impl ApprovalGate {
    async fn evaluate(&self, workflow_id: Uuid) -> GateResult {
        let record = match self.workflows.get(workflow_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return GateResult::evaluation_error(
                    self.gate_name,
                    self.fail_open,
                    "workflow record missing",
                )
            }
            Err(err) => {
                return GateResult::evaluation_error(
                    self.gate_name,
                    self.fail_open,
                    &err.to_string(),
                )
            }
        };

        if progress_rank(record.state) > self.window_closes_after {
            return GateResult::not_applicable(Some(record.state));
        }

        match self.approvals.find_approval(workflow_id, self.kind).await {
            Ok(Some(approval)) if approval.decision == ApprovalDecision::Approved => {
                GateResult::allowed("approval_granted")
            }
            Ok(Some(_)) => GateResult::blocked(
                "approval_rejected",
                self.required_action,
                Some(record.state),
            ),
            Ok(None) => GateResult::blocked(
                "approval_pending",
                self.required_action,
                Some(record.state),
            ),
            Err(err) => {
                GateResult::evaluation_error(self.gate_name, self.fail_open, &err.to_string())
            }
        }
    }
}

/// Seed keywords must be approved before longtail research may start.
pub struct SeedApprovalGate {
    inner: ApprovalGate,
}

impl SeedApprovalGate {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        approvals: Arc<dyn ApprovalStore>,
        fail_open: bool,
    ) -> Self {
        Self {
            inner: ApprovalGate {
                gate_name: "seed_approval",
                kind: ApprovalKind::SeedKeywords,
                window_closes_after: progress_rank(WorkflowState::KeywordsReady),
                required_action: "approve or reject the seed keyword set",
                workflows,
                approvals,
                fail_open,
            },
        }
    }
}

#[async_trait]
impl Gate for SeedApprovalGate {
    fn name(&self) -> &'static str {
        "seed_approval"
    }

    async fn validate(&self, workflow_id: Uuid) -> GateResult {
        self.inner.evaluate(workflow_id).await
    }
}

/// Topic clusters must be approved before article generation may start.
pub struct TopicApprovalGate {
    inner: ApprovalGate,
}

impl TopicApprovalGate {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        approvals: Arc<dyn ApprovalStore>,
        fail_open: bool,
    ) -> Self {
        Self {
            inner: ApprovalGate {
                gate_name: "topic_approval",
                kind: ApprovalKind::TopicClusters,
                window_closes_after: progress_rank(WorkflowState::ClustersReady),
                required_action: "approve or reject the topic clusters",
                workflows,
                approvals,
                fail_open,
            },
        }
    }
}

#[async_trait]
impl Gate for TopicApprovalGate {
    fn name(&self) -> &'static str {
        "topic_approval"
    }

    async fn validate(&self, workflow_id: Uuid) -> GateResult {
        self.inner.evaluate(workflow_id).await
    }
}

/// Article generation requires the longtail and clustering phases to both
/// have completed, i.e. the workflow reached `ClustersReady`.
pub struct ArticleGenerationGate {
    workflows: Arc<dyn WorkflowStore>,
    fail_open: bool,
}

impl ArticleGenerationGate {
    pub fn new(workflows: Arc<dyn WorkflowStore>, fail_open: bool) -> Self {
        Self {
            workflows,
            fail_open,
        }
    }
}

#[async_trait]
impl Gate for ArticleGenerationGate {
    fn name(&self) -> &'static str {
        "article_generation"
    }

    async fn validate(&self, workflow_id: Uuid) -> GateResult {
        let record = match self.workflows.get(workflow_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return GateResult::evaluation_error(
                    self.name(),
                    self.fail_open,
                    "workflow record missing",
                )
            }
            Err(err) => {
                return GateResult::evaluation_error(self.name(), self.fail_open, &err.to_string())
            }
        };

        let reached = progress_rank(record.state);
        if reached > progress_rank(WorkflowState::ClustersReady) {
            return GateResult::not_applicable(Some(record.state));
        }
        if reached >= progress_rank(WorkflowState::ClustersReady) {
            return GateResult::allowed("prerequisite_phases_completed");
        }

        let missing = if reached < progress_rank(WorkflowState::LongtailsReady) {
            "longtail research has not completed"
        } else {
            "clustering has not completed"
        };
        GateResult::blocked(
            "prerequisite_phase_incomplete",
            format!("{}; run the preceding step first", missing),
            Some(record.state),
        )
    }
}
