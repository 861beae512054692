use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline phases a workflow moves through, in nominal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    KeywordResearch,
    LongtailResearch,
    Clustering,
    ArticleGeneration,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::KeywordResearch => "keyword_research",
            Phase::LongtailResearch => "longtail_research",
            Phase::Clustering => "clustering",
            Phase::ArticleGeneration => "article_generation",
        }
    }
}

/// Workflow state enumeration. The single source of truth for "what phase
/// are we in"; mutated exclusively through the transition executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    #[default]
    Pending,
    ResearchingKeywords,
    /// Seed keywords generated, paused awaiting human approval.
    KeywordsReady,
    ResearchingLongtails,
    LongtailsReady,
    Clustering,
    /// Clusters generated, paused awaiting topic approval.
    ClustersReady,
    GeneratingArticles,
    /// All documents queued or written; awaiting the completion check.
    ArticlesQueued,
    Completed,
    KeywordResearchFailed,
    LongtailResearchFailed,
    ClusteringFailed,
    GenerationFailed,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Pending => "pending",
            WorkflowState::ResearchingKeywords => "researching_keywords",
            WorkflowState::KeywordsReady => "keywords_ready",
            WorkflowState::ResearchingLongtails => "researching_longtails",
            WorkflowState::LongtailsReady => "longtails_ready",
            WorkflowState::Clustering => "clustering",
            WorkflowState::ClustersReady => "clusters_ready",
            WorkflowState::GeneratingArticles => "generating_articles",
            WorkflowState::ArticlesQueued => "articles_queued",
            WorkflowState::Completed => "completed",
            WorkflowState::KeywordResearchFailed => "keyword_research_failed",
            WorkflowState::LongtailResearchFailed => "longtail_research_failed",
            WorkflowState::ClusteringFailed => "clustering_failed",
            WorkflowState::GenerationFailed => "generation_failed",
        }
    }

    /// Terminal states stop progressing; failure variants may still be
    /// re-entered through a manual `Start`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Completed
                | WorkflowState::KeywordResearchFailed
                | WorkflowState::LongtailResearchFailed
                | WorkflowState::ClusteringFailed
                | WorkflowState::GenerationFailed
        )
    }

    /// The phase a processing or phase-failed state belongs to.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            WorkflowState::ResearchingKeywords | WorkflowState::KeywordResearchFailed => {
                Some(Phase::KeywordResearch)
            }
            WorkflowState::ResearchingLongtails | WorkflowState::LongtailResearchFailed => {
                Some(Phase::LongtailResearch)
            }
            WorkflowState::Clustering | WorkflowState::ClusteringFailed => Some(Phase::Clustering),
            WorkflowState::GeneratingArticles | WorkflowState::GenerationFailed => {
                Some(Phase::ArticleGeneration)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named signal consumed transiently by the transition executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionEvent {
    Start,
    Succeed,
    Fail,
    Complete,
}

impl TransitionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionEvent::Start => "start",
            TransitionEvent::Succeed => "succeed",
            TransitionEvent::Fail => "fail",
            TransitionEvent::Complete => "complete",
        }
    }
}

/// One workflow instance row. `state` is only ever written through the
/// transition executor's compare-and-swap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub state: WorkflowState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRecord {
    pub fn new(organization_id: Uuid) -> Self {
        let now = Utc::now();
        WorkflowRecord {
            id: Uuid::new_v4(),
            organization_id,
            state: WorkflowState::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// External approval decision consumed by gate validators; written by a
/// human-approval collaborator, read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub workflow_id: Uuid,
    pub kind: ApprovalKind,
    pub decision: ApprovalDecision,
    pub feedback: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    SeedKeywords,
    TopicClusters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}
