#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow::pipeline::{Document, DocumentStatus, Section};
use crate::core::workflow::state::{ApprovalKind, ApprovalRecord, WorkflowRecord, WorkflowState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Durable storage contract for workflow instance rows.
///
/// `compare_and_swap_state` is the only write path for `state`: it must
/// apply the update iff the stored state still equals `expected`, as one
/// atomic operation, so that exactly one of N concurrent callers wins.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<WorkflowRecord>, AppError>;
    async fn insert(&self, record: WorkflowRecord) -> Result<(), AppError>;
    async fn compare_and_swap_state(
        &self,
        id: Uuid,
        expected: WorkflowState,
        next: WorkflowState,
    ) -> Result<bool, AppError>;
}

/// Read-only view of human approval decisions. Written by the approval
/// collaborator; the orchestration engine only consumes them.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn find_approval(
        &self,
        workflow_id: Uuid,
        kind: ApprovalKind,
    ) -> Result<Option<ApprovalRecord>, AppError>;
    async fn record_approval(&self, approval: ApprovalRecord) -> Result<(), AppError>;
}

/// Storage for generated documents and their ordered sections. Section rows
/// are persisted incrementally so a later run can resume by skipping
/// completed work.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_document(&self, document: Document) -> Result<(), AppError>;
    async fn get_document(&self, id: Uuid) -> Result<Option<Document>, AppError>;
    async fn list_documents(&self, workflow_id: Uuid) -> Result<Vec<Document>, AppError>;
    async fn update_document_status(
        &self,
        id: Uuid,
        status: DocumentStatus,
        error_details: Option<String>,
    ) -> Result<(), AppError>;
    async fn insert_section(&self, document_id: Uuid, section: Section) -> Result<(), AppError>;
    /// Sections ordered strictly by their `order` field.
    async fn list_sections(&self, document_id: Uuid) -> Result<Vec<Section>, AppError>;
    async fn update_section(&self, document_id: Uuid, section: Section) -> Result<(), AppError>;
    async fn count_incomplete_documents(&self, workflow_id: Uuid) -> Result<usize, AppError>;
}

/// Metered usage entry recorded once per completed step.
#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub organization_id: Uuid,
    pub workflow_id: Uuid,
    pub step: String,
    pub recorded_at: DateTime<Utc>,
}

/// Billable/metered effect sink. Writes are guarded by the idempotency
/// ledger upstream; the store itself just appends.
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn record_usage(&self, usage: UsageRecord) -> Result<(), AppError>;
    async fn usage_count(&self, workflow_id: Uuid, step: &str) -> Result<usize, AppError>;
}

/// In-process store over dashmap. The CAS holds the shard lock for the whole
/// read-compare-write, which gives single-winner semantics under concurrency.
#[derive(Default)]
pub struct MemoryStore {
    workflows: DashMap<Uuid, WorkflowRecord>,
    approvals: DashMap<(Uuid, ApprovalKind), ApprovalRecord>,
    documents: DashMap<Uuid, Document>,
    sections: DashMap<Uuid, Vec<Section>>,
    usage: Mutex<Vec<UsageRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<WorkflowRecord>, AppError> {
        Ok(self.workflows.get(&id).map(|entry| entry.clone()))
    }

    async fn insert(&self, record: WorkflowRecord) -> Result<(), AppError> {
        self.workflows.insert(record.id, record);
        Ok(())
    }

    async fn compare_and_swap_state(
        &self,
        id: Uuid,
        expected: WorkflowState,
        next: WorkflowState,
    ) -> Result<bool, AppError> {
        match self.workflows.get_mut(&id) {
            Some(mut entry) => {
                if entry.state != expected {
                    return Ok(false);
                }
                entry.state = next;
                entry.updated_at = Utc::now();
                Ok(true)
            }
            None => Err(AppError::new(
                ErrorCategory::NotFoundError,
                format!("workflow {} does not exist", id),
            )
            .with_code("WF-STORE-404")),
        }
    }
}

#[async_trait]
impl ApprovalStore for MemoryStore {
    async fn find_approval(
        &self,
        workflow_id: Uuid,
        kind: ApprovalKind,
    ) -> Result<Option<ApprovalRecord>, AppError> {
        Ok(self
            .approvals
            .get(&(workflow_id, kind))
            .map(|entry| entry.clone()))
    }

    async fn record_approval(&self, approval: ApprovalRecord) -> Result<(), AppError> {
        self.approvals
            .insert((approval.workflow_id, approval.kind), approval);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_document(&self, document: Document) -> Result<(), AppError> {
        self.sections.entry(document.id).or_default();
        self.documents.insert(document.id, document);
        Ok(())
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>, AppError> {
        Ok(self.documents.get(&id).map(|entry| entry.clone()))
    }

    async fn list_documents(&self, workflow_id: Uuid) -> Result<Vec<Document>, AppError> {
        let mut documents: Vec<Document> = self
            .documents
            .iter()
            .filter(|entry| entry.workflow_id == workflow_id)
            .map(|entry| entry.clone())
            .collect();
        documents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(documents)
    }

    async fn update_document_status(
        &self,
        id: Uuid,
        status: DocumentStatus,
        error_details: Option<String>,
    ) -> Result<(), AppError> {
        match self.documents.get_mut(&id) {
            Some(mut entry) => {
                entry.status = status;
                entry.error_details = error_details;
                entry.updated_at = Utc::now();
                Ok(())
            }
            None => Err(AppError::new(
                ErrorCategory::NotFoundError,
                format!("document {} does not exist", id),
            )
            .with_code("WF-STORE-404")),
        }
    }

    async fn insert_section(&self, document_id: Uuid, section: Section) -> Result<(), AppError> {
        let mut sections = self.sections.entry(document_id).or_default();
        sections.push(section);
        sections.sort_by_key(|s| s.order);
        Ok(())
    }

    async fn list_sections(&self, document_id: Uuid) -> Result<Vec<Section>, AppError> {
        let mut sections = self
            .sections
            .get(&document_id)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        sections.sort_by_key(|s| s.order);
        Ok(sections)
    }

    async fn update_section(&self, document_id: Uuid, section: Section) -> Result<(), AppError> {
        let mut sections = self.sections.entry(document_id).or_default();
        match sections.iter_mut().find(|s| s.id == section.id) {
            Some(existing) => {
                *existing = section;
                Ok(())
            }
            None => Err(AppError::new(
                ErrorCategory::NotFoundError,
                format!("section {} does not exist", section.id),
            )
            .with_code("WF-STORE-404")),
        }
    }

    async fn count_incomplete_documents(&self, workflow_id: Uuid) -> Result<usize, AppError> {
        Ok(self
            .documents
            .iter()
            .filter(|entry| {
                entry.workflow_id == workflow_id && entry.status != DocumentStatus::Completed
            })
            .count())
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn record_usage(&self, usage: UsageRecord) -> Result<(), AppError> {
        self.usage
            .lock()
            .map_err(|_| {
                AppError::new(ErrorCategory::InternalError, "usage store lock poisoned")
            })?
            .push(usage);
        Ok(())
    }

    async fn usage_count(&self, workflow_id: Uuid, step: &str) -> Result<usize, AppError> {
        Ok(self
            .usage
            .lock()
            .map_err(|_| {
                AppError::new(ErrorCategory::InternalError, "usage store lock poisoned")
            })?
            .iter()
            .filter(|record| record.workflow_id == workflow_id && record.step == step)
            .count())
    }
}
