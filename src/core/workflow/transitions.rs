use crate::core::workflow::state::{TransitionEvent, WorkflowState};

/// Static transition table: `(current, event) -> next`.
///
/// `None` means the pair has no defined successor and the caller made a
/// programming or sequencing error, which is distinct from losing a
/// compare-and-swap race. Phase failure states accept `Start` again so a
/// manual retry re-enters the processing state through the same choke point.
pub fn next_state(current: WorkflowState, event: TransitionEvent) -> Option<WorkflowState> {
    use TransitionEvent::*;
    use WorkflowState::*;

    match (current, event) {
        (Pending, Start) => Some(ResearchingKeywords),
        (ResearchingKeywords, Succeed) => Some(KeywordsReady),
        (ResearchingKeywords, Fail) => Some(KeywordResearchFailed),
        (KeywordResearchFailed, Start) => Some(ResearchingKeywords),

        (KeywordsReady, Start) => Some(ResearchingLongtails),
        (ResearchingLongtails, Succeed) => Some(LongtailsReady),
        (ResearchingLongtails, Fail) => Some(LongtailResearchFailed),
        (LongtailResearchFailed, Start) => Some(ResearchingLongtails),

        (LongtailsReady, Start) => Some(Clustering),
        (Clustering, Succeed) => Some(ClustersReady),
        (Clustering, Fail) => Some(ClusteringFailed),
        (ClusteringFailed, Start) => Some(Clustering),

        (ClustersReady, Start) => Some(GeneratingArticles),
        (GeneratingArticles, Succeed) => Some(ArticlesQueued),
        (GeneratingArticles, Fail) => Some(GenerationFailed),
        (GenerationFailed, Start) => Some(GeneratingArticles),

        // Two-step completion protocol: queued first, terminal on the
        // separate completion trigger.
        (ArticlesQueued, Complete) => Some(Completed),

        _ => None,
    }
}
