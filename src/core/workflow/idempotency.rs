use crate::core::error::AppError;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use sha2::{Digest, Sha256};

/// Outcome of claiming an idempotency key. `AlreadyApplied` is success from
/// the caller's perspective; the guarded effect is simply skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    AlreadyApplied,
}

/// The side effect guarded by an idempotency key.
pub type CompletionEffect = BoxFuture<'static, Result<(), AppError>>;

/// At-most-once guard for side-effecting completions (usage recording,
/// terminal transitions). The claim commits together with the effect it
/// guards: a failed effect must not leave the key claimed, or a later retry
/// would skip the effect forever.
#[async_trait]
pub trait IdempotencyLedger: Send + Sync {
    /// Runs `effect` iff the key is unclaimed; the claim persists only when
    /// the effect succeeds. Callers racing an in-flight winner observe
    /// `AlreadyApplied`; per-workflow serialization upstream keeps that
    /// window closed in practice.
    async fn apply_once(
        &self,
        key: &str,
        effect: CompletionEffect,
    ) -> Result<ApplyOutcome, AppError>;
}

/// Canonical key for one logical step completion.
pub fn step_completion_key(workflow_id: uuid::Uuid, step: &str) -> String {
    format!("{}:{}", workflow_id, step)
}

/// Digest form for stores that cap key length.
pub fn key_digest(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// In-process ledger. The dashmap entry API makes the claim atomic under the
/// shard lock, closing the window between two callers both believing they
/// are first; a failed effect releases the claim.
#[derive(Default)]
pub struct MemoryLedger {
    applied: DashMap<String, ()>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyLedger for MemoryLedger {
    async fn apply_once(
        &self,
        key: &str,
        effect: CompletionEffect,
    ) -> Result<ApplyOutcome, AppError> {
        let digest = key_digest(key);
        match self.applied.entry(digest.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Ok(ApplyOutcome::AlreadyApplied)
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(());
            }
        }
        if let Err(err) = effect.await {
            self.applied.remove(&digest);
            return Err(err);
        }
        Ok(ApplyOutcome::Applied)
    }
}
