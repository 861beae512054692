#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow::executor::TransitionExecutor;
use crate::core::workflow::idempotency::{step_completion_key, ApplyOutcome, IdempotencyLedger};
use crate::core::workflow::retry::{run_with_retry, RetryPolicy};
use crate::core::workflow::state::{TransitionEvent, WorkflowState};
use crate::core::workflow::store::{DocumentStore, WorkflowStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

/// Section status for persisted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionStatus {
    Pending,
    Researching,
    Researched,
    Writing,
    Completed,
    Failed,
}

/// One ordered sub-unit of a generated document. Owned exclusively by the
/// pipeline for the duration of generation; persisted incrementally so a
/// later run can resume by skipping sections already completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: Uuid,
    pub order: u32,
    pub header: String,
    pub status: SectionStatus,
    pub research_payload: Option<Value>,
    pub content: Option<String>,
    pub error_details: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Section {
    pub fn new(order: u32, header: impl Into<String>) -> Self {
        Section {
            id: Uuid::new_v4(),
            order,
            header: header.into(),
            status: SectionStatus::Pending,
            research_payload: None,
            content: None,
            error_details: None,
            completed_at: None,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

/// One article to be generated, owning an ordered list of sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub title: String,
    pub status: DocumentStatus,
    pub error_details: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(workflow_id: Uuid, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Document {
            id: Uuid::new_v4(),
            workflow_id,
            title: title.into(),
            status: DocumentStatus::Pending,
            error_details: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Prior completed section handed to later stages as accumulated context.
/// Rebuilt from persisted state on every run, never held only in memory.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedSection {
    pub order: u32,
    pub header: String,
    pub content: String,
}

/// Opaque research collaborator. Failure modes are reported through
/// `AppError` categories so the retry policy can classify them.
#[async_trait]
pub trait Researcher: Send + Sync {
    async fn research(
        &self,
        document: &Document,
        section: &Section,
        prior: &[CompletedSection],
    ) -> Result<Value, AppError>;
}

/// Opaque drafting collaborator.
#[async_trait]
pub trait Writer: Send + Sync {
    async fn write(
        &self,
        document: &Document,
        section: &Section,
        research: &Value,
        prior: &[CompletedSection],
    ) -> Result<String, AppError>;
}

/// Summary of one document run.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRunSummary {
    pub document_id: Uuid,
    pub sections_completed: usize,
    pub sections_skipped: usize,
}

/// Drives a document's ordered sections through research → write → persist.
///
/// Persistence happens immediately after every stage, so a crash mid-document
/// loses at most the in-flight section. The first section failure (after the
/// retry budget) halts the document; completed sections stay completed.
pub struct SectionPipeline {
    documents: Arc<dyn DocumentStore>,
    researcher: Arc<dyn Researcher>,
    writer: Arc<dyn Writer>,
    retry_policy: RetryPolicy,
    work_timeout: Duration,
}

impl SectionPipeline {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        researcher: Arc<dyn Researcher>,
        writer: Arc<dyn Writer>,
        retry_policy: RetryPolicy,
        work_timeout: Duration,
    ) -> Self {
        Self {
            documents,
            researcher,
            writer,
            retry_policy,
            work_timeout,
        }
    }

    pub async fn run_document(&self, document_id: Uuid) -> Result<DocumentRunSummary, AppError> {
        let document = self
            .documents
            .get_document(document_id)
            .await?
            .ok_or_else(|| {
                AppError::new(
                    ErrorCategory::NotFoundError,
                    format!("document {} does not exist", document_id),
                )
            })?;

        if document.status == DocumentStatus::Completed {
            let sections = self.documents.list_sections(document_id).await?;
            return Ok(DocumentRunSummary {
                document_id,
                sections_completed: 0,
                sections_skipped: sections.len(),
            });
        }

        self.documents
            .update_document_status(document_id, DocumentStatus::Generating, None)
            .await?;

        let sections = self.documents.list_sections(document_id).await?;
        let mut prior: Vec<CompletedSection> = Vec::new();
        let mut completed = 0usize;
        let mut skipped = 0usize;

        for mut section in sections {
            if section.status == SectionStatus::Completed {
                skipped += 1;
                prior.push(CompletedSection {
                    order: section.order,
                    header: section.header.clone(),
                    content: section.content.clone().unwrap_or_default(),
                });
                continue;
            }

            match self.run_section(&document, &mut section, &prior).await {
                Ok(()) => {
                    completed += 1;
                    prior.push(CompletedSection {
                        order: section.order,
                        header: section.header.clone(),
                        content: section.content.clone().unwrap_or_default(),
                    });
                }
                Err(err) => {
                    section.status = SectionStatus::Failed;
                    section.error_details = Some(err.to_string());
                    section.updated_at = Utc::now();
                    self.documents
                        .update_section(document_id, section.clone())
                        .await?;
                    self.documents
                        .update_document_status(
                            document_id,
                            DocumentStatus::Failed,
                            Some(format!(
                                "section {} ('{}') failed: {}",
                                section.order, section.header, err.message
                            )),
                        )
                        .await?;
                    warn!(
                        document_id = %document_id,
                        section = section.order,
                        error = %err,
                        "section failed, halting document"
                    );
                    // Later sections are not attempted; the failure escapes to
                    // the owning step handler after the failed state is durable.
                    return Err(err);
                }
            }
        }

        self.documents
            .update_document_status(document_id, DocumentStatus::Completed, None)
            .await?;
        info!(
            document_id = %document_id,
            completed = completed,
            skipped = skipped,
            "document generation completed"
        );
        Ok(DocumentRunSummary {
            document_id,
            sections_completed: completed,
            sections_skipped: skipped,
        })
    }

    async fn run_section(
        &self,
        document: &Document,
        section: &mut Section,
        prior: &[CompletedSection],
    ) -> Result<(), AppError> {
        section.status = SectionStatus::Researching;
        section.updated_at = Utc::now();
        self.documents
            .update_section(document.id, section.clone())
            .await?;

        let research = run_with_retry(&self.retry_policy, |_| {
            self.bounded(
                "research",
                self.researcher.research(document, section, prior),
            )
        })
        .await?
        .value;

        section.research_payload = Some(research.clone());
        section.status = SectionStatus::Researched;
        section.updated_at = Utc::now();
        self.documents
            .update_section(document.id, section.clone())
            .await?;

        section.status = SectionStatus::Writing;
        section.updated_at = Utc::now();
        self.documents
            .update_section(document.id, section.clone())
            .await?;

        let content = run_with_retry(&self.retry_policy, |_| {
            self.bounded(
                "write",
                self.writer.write(document, section, &research, prior),
            )
        })
        .await?
        .value;

        section.content = Some(content);
        section.status = SectionStatus::Completed;
        section.completed_at = Some(Utc::now());
        section.updated_at = Utc::now();
        self.documents
            .update_section(document.id, section.clone())
            .await?;
        Ok(())
    }

    /// Bound one collaborator call by the hard per-call timeout. A timeout
    /// classifies as retryable, distinct from the retry policy's own budget.
    async fn bounded<T>(
        &self,
        stage: &str,
        fut: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        match timeout(self.work_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::new(
                ErrorCategory::TimeoutError,
                format!(
                    "{} stage timed out after {}ms",
                    stage,
                    self.work_timeout.as_millis()
                ),
            )
            .with_code("WF-PIPE-408")),
        }
    }
}

/// Re-entrant-safe completion check, invoked once per completed document.
/// Acts only when zero incomplete documents remain and the workflow sits in
/// the queued state; the idempotency ledger keeps duplicate invocations from
/// double-driving the terminal transition.
pub struct CompletionMonitor {
    workflows: Arc<dyn WorkflowStore>,
    documents: Arc<dyn DocumentStore>,
    executor: TransitionExecutor,
    ledger: Arc<dyn IdempotencyLedger>,
}

impl CompletionMonitor {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        documents: Arc<dyn DocumentStore>,
        executor: TransitionExecutor,
        ledger: Arc<dyn IdempotencyLedger>,
    ) -> Self {
        Self {
            workflows,
            documents,
            executor,
            ledger,
        }
    }

    /// Returns true when this invocation drove the workflow to `Completed`.
    pub async fn on_document_completed(&self, workflow_id: Uuid) -> Result<bool, AppError> {
        let incomplete = self.documents.count_incomplete_documents(workflow_id).await?;
        if incomplete > 0 {
            return Ok(false);
        }

        let record = self.workflows.get(workflow_id).await?.ok_or_else(|| {
            AppError::new(
                ErrorCategory::NotFoundError,
                format!("workflow {} does not exist", workflow_id),
            )
        })?;
        if record.state != WorkflowState::ArticlesQueued {
            return Ok(false);
        }

        // The terminal transition is the guarded effect itself: if it fails,
        // the key is released and a later check may drive it again.
        let key = step_completion_key(workflow_id, "workflow.completed");
        let executor = self.executor.clone();
        let outcome = self
            .ledger
            .apply_once(
                &key,
                Box::pin(async move {
                    executor
                        .transition(
                            workflow_id,
                            WorkflowState::ArticlesQueued,
                            TransitionEvent::Complete,
                        )
                        .await
                        .map(|_| ())
                }),
            )
            .await?;
        Ok(outcome == ApplyOutcome::Applied)
    }
}
