#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow::executor::{TransitionExecutor, TransitionOutcome};
use crate::core::workflow::gates::{Gate, GateStatus};
use crate::core::workflow::idempotency::{step_completion_key, IdempotencyLedger};
use crate::core::workflow::pipeline::{CompletionMonitor, DocumentStatus, SectionPipeline};
use crate::core::workflow::retry::{run_with_retry, RetryPolicy};
use crate::core::workflow::state::{Phase, TransitionEvent, WorkflowState};
use crate::core::workflow::store::{DocumentStore, UsageRecord, UsageStore, WorkflowStore};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

/// Externally triggerable steps, addressed by name in the HTTP boundary and
/// by the background event dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    KeywordResearch,
    LongtailResearch,
    Clustering,
    ArticleGeneration,
    Complete,
}

impl StepKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "keyword_research" => Some(StepKind::KeywordResearch),
            "longtail_research" => Some(StepKind::LongtailResearch),
            "clustering" => Some(StepKind::Clustering),
            "article_generation" => Some(StepKind::ArticleGeneration),
            "complete" => Some(StepKind::Complete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::KeywordResearch => "keyword_research",
            StepKind::LongtailResearch => "longtail_research",
            StepKind::Clustering => "clustering",
            StepKind::ArticleGeneration => "article_generation",
            StepKind::Complete => "complete",
        }
    }

    /// The processing state this step's `Start` transition must land in.
    fn processing_state(&self) -> Option<WorkflowState> {
        match self {
            StepKind::KeywordResearch => Some(WorkflowState::ResearchingKeywords),
            StepKind::LongtailResearch => Some(WorkflowState::ResearchingLongtails),
            StepKind::Clustering => Some(WorkflowState::Clustering),
            StepKind::ArticleGeneration => Some(WorkflowState::GeneratingArticles),
            StepKind::Complete => None,
        }
    }

    fn phase(&self) -> Option<Phase> {
        match self {
            StepKind::KeywordResearch => Some(Phase::KeywordResearch),
            StepKind::LongtailResearch => Some(Phase::LongtailResearch),
            StepKind::Clustering => Some(Phase::Clustering),
            StepKind::ArticleGeneration => Some(Phase::ArticleGeneration),
            StepKind::Complete => None,
        }
    }
}

/// Opaque business-logic collaborator for the research and clustering
/// phases. Inputs/outputs and failure modes only; the algorithms live
/// elsewhere.
#[async_trait]
pub trait PhaseWorker: Send + Sync {
    async fn run(&self, workflow_id: Uuid, phase: Phase) -> Result<Value, AppError>;
}

/// Successful step result surfaced to the trigger boundary.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub workflow_id: Uuid,
    pub step: StepKind,
    pub new_state: WorkflowState,
    pub retry_count: u32,
    pub payload: Value,
}

/// Everything a step handler needs, wired once at startup.
pub struct StepRuntime {
    workflows: Arc<dyn WorkflowStore>,
    documents: Arc<dyn DocumentStore>,
    usage: Arc<dyn UsageStore>,
    ledger: Arc<dyn IdempotencyLedger>,
    executor: TransitionExecutor,
    seed_gate: Arc<dyn Gate>,
    topic_gate: Arc<dyn Gate>,
    generation_gate: Arc<dyn Gate>,
    phase_worker: Arc<dyn PhaseWorker>,
    pipeline: Arc<SectionPipeline>,
    monitor: Arc<CompletionMonitor>,
    retry_policy: RetryPolicy,
    work_timeout: Duration,
    // Per-workflow serialization of in-process attempts. An optimization
    // only; the CAS in the executor is the correctness mechanism.
    locks: DashMap<Uuid, Arc<tokio::sync::Mutex<()>>>,
}

#[allow(clippy::too_many_arguments)]
impl StepRuntime {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        documents: Arc<dyn DocumentStore>,
        usage: Arc<dyn UsageStore>,
        ledger: Arc<dyn IdempotencyLedger>,
        executor: TransitionExecutor,
        seed_gate: Arc<dyn Gate>,
        topic_gate: Arc<dyn Gate>,
        generation_gate: Arc<dyn Gate>,
        phase_worker: Arc<dyn PhaseWorker>,
        pipeline: Arc<SectionPipeline>,
        monitor: Arc<CompletionMonitor>,
        retry_policy: RetryPolicy,
        work_timeout: Duration,
    ) -> Self {
        Self {
            workflows,
            documents,
            usage,
            ledger,
            executor,
            seed_gate,
            topic_gate,
            generation_gate,
            phase_worker,
            pipeline,
            monitor,
            retry_policy,
            work_timeout,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, workflow_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .entry(workflow_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn gates_for(&self, step: StepKind) -> Vec<Arc<dyn Gate>> {
        match step {
            StepKind::LongtailResearch => vec![self.seed_gate.clone()],
            StepKind::ArticleGeneration => {
                vec![self.generation_gate.clone(), self.topic_gate.clone()]
            }
            _ => Vec::new(),
        }
    }

    /// Number of workflows currently holding an in-process lock entry.
    pub fn active_workflow_locks(&self) -> usize {
        self.locks.len()
    }

    /// Execute one step end to end: gate check, CAS into the processing
    /// state, unit of work under retry, CAS to the terminal state. A failure
    /// path always commits the failed state before the error escapes.
    pub async fn run_step(
        &self,
        workflow_id: Uuid,
        step: StepKind,
    ) -> Result<StepOutcome, AppError> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;
        let result = self.run_step_locked(workflow_id, step).await;

        // A workflow that reached a terminal state will not be triggered
        // again except by a manual restart, which re-creates the entry; drop
        // it so the table stays bounded by the number of live workflows.
        let terminal = match &result {
            Ok(outcome) => outcome.new_state.is_terminal(),
            // Pre-transition rejections leave the workflow where it was.
            Err(err) => !matches!(
                err.category,
                ErrorCategory::NotFoundError
                    | ErrorCategory::ValidationError
                    | ErrorCategory::GateBlockedError
                    | ErrorCategory::ConflictError
            ),
        };
        if terminal {
            self.locks.remove(&workflow_id);
        }
        result
    }

    async fn run_step_locked(
        &self,
        workflow_id: Uuid,
        step: StepKind,
    ) -> Result<StepOutcome, AppError> {
        let record = self.workflows.get(workflow_id).await?.ok_or_else(|| {
            AppError::new(
                ErrorCategory::NotFoundError,
                format!("workflow {} does not exist", workflow_id),
            )
            .with_code("WF-STEP-404")
        })?;

        for gate in self.gates_for(step) {
            let result = gate.validate(workflow_id).await;
            if !result.allowed {
                let mut err = AppError::new(
                    ErrorCategory::GateBlockedError,
                    format!("step '{}' blocked by gate '{}'", step.as_str(), gate.name()),
                )
                .with_code("WF-GATE-423");
                err.add_context("gate", gate.name());
                err.add_context(
                    "gate_status",
                    match result.status {
                        GateStatus::Blocked => "blocked",
                        GateStatus::Error => "error",
                        GateStatus::Allowed => "allowed",
                        GateStatus::NotApplicable => "not_applicable",
                    },
                );
                err.add_context("workflow_status", record.state.as_str());
                if let Some(action) = &result.required_action {
                    err.add_context("required_action", action);
                }
                if let Some(blocked_at) = result.blocked_at {
                    err.add_context("blocked_at", &blocked_at.to_rfc3339());
                }
                return Err(err);
            }
        }

        if step == StepKind::Complete {
            return self.run_completion_step(workflow_id, record.state).await;
        }

        let Some(processing) = step.processing_state() else {
            return Err(AppError::new(
                ErrorCategory::InternalError,
                format!("step '{}' has no processing state", step.as_str()),
            ));
        };
        let target = crate::core::workflow::transitions::next_state(
            record.state,
            TransitionEvent::Start,
        );
        if target != Some(processing) {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!(
                    "step '{}' is not applicable while workflow is '{}'",
                    step.as_str(),
                    record.state
                ),
            )
            .with_code("WF-STEP-400"));
        }

        match self
            .executor
            .transition(workflow_id, record.state, TransitionEvent::Start)
            .await?
        {
            TransitionOutcome::Applied { .. } => {}
            TransitionOutcome::NotApplied => {
                let mut err = AppError::new(
                    ErrorCategory::ConflictError,
                    format!(
                        "step '{}' lost the transition race for workflow {}",
                        step.as_str(),
                        workflow_id
                    ),
                )
                .with_code("WF-STEP-409");
                err.add_context("workflow_status", record.state.as_str());
                return Err(err);
            }
        }

        match self.execute_work(workflow_id, record.organization_id, step, processing).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                // The failed state must be durable even if the caller crashes
                // after the propagation.
                let failed = self
                    .executor
                    .transition(workflow_id, processing, TransitionEvent::Fail)
                    .await;
                if let Err(transition_err) = failed {
                    warn!(
                        workflow_id = %workflow_id,
                        error = %transition_err,
                        "failed to commit failure state"
                    );
                }
                Err(err)
            }
        }
    }

    async fn execute_work(
        &self,
        workflow_id: Uuid,
        organization_id: Uuid,
        step: StepKind,
        processing: WorkflowState,
    ) -> Result<StepOutcome, AppError> {
        let (payload, retry_count) = match step {
            StepKind::ArticleGeneration => self.generate_articles(workflow_id).await?,
            _ => {
                let Some(phase) = step.phase() else {
                    return Err(AppError::new(
                        ErrorCategory::InternalError,
                        format!("step '{}' carries no phase", step.as_str()),
                    ));
                };
                let success = run_with_retry(&self.retry_policy, |_| {
                    self.bounded(self.phase_worker.run(workflow_id, phase))
                })
                .await?;
                (success.value, success.retry_count)
            }
        };

        // Completion effect is applied at most once per workflow/step even
        // under duplicate triggers; already-applied is success. The claim
        // commits with the write: a failed usage record releases the key so
        // a later retry still meters the step.
        let key = step_completion_key(workflow_id, step.as_str());
        let usage = self.usage.clone();
        let usage_record = UsageRecord {
            organization_id,
            workflow_id,
            step: step.as_str().to_string(),
            recorded_at: Utc::now(),
        };
        self.ledger
            .apply_once(
                &key,
                Box::pin(async move { usage.record_usage(usage_record).await }),
            )
            .await?;

        let outcome = self
            .executor
            .transition(workflow_id, processing, TransitionEvent::Succeed)
            .await?;
        let new_state = match outcome {
            TransitionOutcome::Applied { new_state } => new_state,
            TransitionOutcome::NotApplied => {
                // Someone else already moved the record on; the work stands.
                warn!(workflow_id = %workflow_id, step = step.as_str(), "success transition already applied elsewhere");
                self.workflows
                    .get(workflow_id)
                    .await?
                    .map(|r| r.state)
                    .unwrap_or(processing)
            }
        };

        if step == StepKind::ArticleGeneration {
            self.monitor.on_document_completed(workflow_id).await?;
        }

        info!(
            workflow_id = %workflow_id,
            step = step.as_str(),
            new_state = %new_state,
            retry_count = retry_count,
            "step completed"
        );
        Ok(StepOutcome {
            workflow_id,
            step,
            new_state,
            retry_count,
            payload,
        })
    }

    async fn generate_articles(&self, workflow_id: Uuid) -> Result<(Value, u32), AppError> {
        let documents = self.documents.list_documents(workflow_id).await?;
        if documents.is_empty() {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!("workflow {} has no documents queued", workflow_id),
            )
            .with_code("WF-STEP-400"));
        }

        let mut summaries = Vec::new();
        for document in &documents {
            if document.status == DocumentStatus::Completed {
                continue;
            }
            let summary = self.pipeline.run_document(document.id).await?;
            summaries.push(summary);
            self.monitor.on_document_completed(workflow_id).await?;
        }

        Ok((
            json!({
                "documents": documents.len(),
                "runs": summaries,
            }),
            0,
        ))
    }

    async fn run_completion_step(
        &self,
        workflow_id: Uuid,
        current: WorkflowState,
    ) -> Result<StepOutcome, AppError> {
        if current == WorkflowState::Completed {
            // Duplicate trigger; the completion effect already ran.
            return Ok(StepOutcome {
                workflow_id,
                step: StepKind::Complete,
                new_state: current,
                retry_count: 0,
                payload: json!({ "already_completed": true }),
            });
        }
        if current != WorkflowState::ArticlesQueued {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!(
                    "step 'complete' is not applicable while workflow is '{}'",
                    current
                ),
            )
            .with_code("WF-STEP-400"));
        }

        let completed = self.monitor.on_document_completed(workflow_id).await?;
        if !completed {
            let state = self
                .workflows
                .get(workflow_id)
                .await?
                .map(|r| r.state)
                .unwrap_or(current);
            if state == WorkflowState::Completed {
                // Duplicate trigger after another caller finished; a no-op.
                return Ok(StepOutcome {
                    workflow_id,
                    step: StepKind::Complete,
                    new_state: state,
                    retry_count: 0,
                    payload: json!({ "already_completed": true }),
                });
            }
            let mut err = AppError::new(
                ErrorCategory::ConflictError,
                format!(
                    "workflow {} is not ready to complete: incomplete documents remain",
                    workflow_id
                ),
            )
            .with_code("WF-STEP-409");
            err.add_context("workflow_status", state.as_str());
            return Err(err);
        }

        Ok(StepOutcome {
            workflow_id,
            step: StepKind::Complete,
            new_state: WorkflowState::Completed,
            retry_count: 0,
            payload: json!({ "completed": true }),
        })
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        match timeout(self.work_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::new(
                ErrorCategory::TimeoutError,
                format!(
                    "unit of work timed out after {}ms",
                    self.work_timeout.as_millis()
                ),
            )
            .with_code("WF-STEP-408")),
        }
    }
}
