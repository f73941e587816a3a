pub mod scoring;
pub mod weights;

use std::cmp::Ordering;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::StructuralModel;
use crate::store::{StorageBackend, StoreError, Template, TemplateStore};
use crate::types::cancel::CancelFlag;
pub use scoring::{Scorer, SignalBreakdown, SimilarityEngine, SimilarityScore};
pub use weights::{MatchWeights, WeightsError};

/// Pools at least this large are scored on several threads.
const PARALLEL_THRESHOLD: usize = 64;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("No templates available to match against (category: {category:?})")]
    NoTemplatesAvailable { category: Option<String> },
    #[error("Invalid top_k: {0}")]
    InvalidTopK(usize),
    #[error("Matching cancelled")]
    Cancelled,
    #[error("A scoring worker panicked")]
    WorkerFailed,
    #[error("Template store error: {0}")]
    Store(#[from] StoreError),
}

/// A stored template together with its similarity to the candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateMatch {
    pub template: Template,
    pub similarity: SimilarityScore,
}

impl TemplateMatch {
    pub fn score(&self) -> f64 {
        self.similarity.score
    }
}

pub struct TemplateMatcher<S = SimilarityEngine> {
    scorer: S,
}

impl Default for TemplateMatcher<SimilarityEngine> {
    fn default() -> Self {
        Self {
            scorer: SimilarityEngine::default(),
        }
    }
}

impl<S> TemplateMatcher<S>
where
    S: Scorer + Sync,
{
    pub fn new(scorer: S) -> Self {
        Self { scorer }
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    /// Rank the store's latest active templates against `candidate`.
    pub fn find_similar<B: StorageBackend>(
        &self,
        store: &TemplateStore<B>,
        candidate: &StructuralModel,
        category: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<TemplateMatch>, MatchError> {
        self.find_similar_with_cancel(store, candidate, category, top_k, None)
    }

    pub fn find_similar_with_cancel<B: StorageBackend>(
        &self,
        store: &TemplateStore<B>,
        candidate: &StructuralModel,
        category: Option<&str>,
        top_k: usize,
        cancel: Option<&CancelFlag>,
    ) -> Result<Vec<TemplateMatch>, MatchError> {
        // Snapshot: later writes do not affect this ranking.
        let pool = store.list(category)?;
        self.rank(pool, candidate, category, top_k, cancel)
    }

    /// Score every template in `pool` and return the best `top_k`.
    ///
    /// Ordering: score descending, then version descending, then name,
    /// category and id ascending, so equal inputs always rank identically.
    pub fn rank(
        &self,
        pool: Vec<Template>,
        candidate: &StructuralModel,
        category: Option<&str>,
        top_k: usize,
        cancel: Option<&CancelFlag>,
    ) -> Result<Vec<TemplateMatch>, MatchError> {
        if top_k == 0 {
            return Err(MatchError::InvalidTopK(top_k));
        }
        if pool.is_empty() {
            return Err(MatchError::NoTemplatesAvailable {
                category: category.map(str::to_string),
            });
        }

        let pool_size = pool.len();
        let scores = self.score_pool(&pool, candidate, category, cancel)?;

        let mut matches: Vec<TemplateMatch> = pool
            .into_iter()
            .zip(scores)
            .map(|(template, similarity)| TemplateMatch { template, similarity })
            .collect();

        matches.sort_by(compare_matches);

        debug_assert!(matches
            .windows(2)
            .all(|w| compare_matches(&w[0], &w[1]) != Ordering::Greater));

        matches.truncate(top_k);

        tracing::debug!(
            pool = pool_size,
            returned = matches.len(),
            top_score = matches.first().map(TemplateMatch::score),
            "template matching completed"
        );

        Ok(matches)
    }

    fn score_pool(
        &self,
        pool: &[Template],
        candidate: &StructuralModel,
        category: Option<&str>,
        cancel: Option<&CancelFlag>,
    ) -> Result<Vec<SimilarityScore>, MatchError> {
        let workers = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);

        if pool.len() < PARALLEL_THRESHOLD || workers < 2 {
            return self.score_chunk(pool, candidate, category, cancel);
        }

        let chunk_size = pool.len().div_ceil(workers);
        let results: Vec<Result<Vec<SimilarityScore>, MatchError>> = std::thread::scope(|scope| {
            let handles: Vec<_> = pool
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(move || self.score_chunk(chunk, candidate, category, cancel)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or(Err(MatchError::WorkerFailed)))
                .collect()
        });

        // Chunks come back in pool order, so concatenation keeps alignment.
        let mut scores = Vec::with_capacity(pool.len());
        for chunk in results {
            scores.extend(chunk?);
        }
        Ok(scores)
    }

    fn score_chunk(
        &self,
        chunk: &[Template],
        candidate: &StructuralModel,
        category: Option<&str>,
        cancel: Option<&CancelFlag>,
    ) -> Result<Vec<SimilarityScore>, MatchError> {
        let mut scores = Vec::with_capacity(chunk.len());
        for template in chunk {
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                return Err(MatchError::Cancelled);
            }
            scores.push(self.scorer.compare(candidate, template, category));
        }
        Ok(scores)
    }
}

fn compare_matches(a: &TemplateMatch, b: &TemplateMatch) -> Ordering {
    b.score()
        .partial_cmp(&a.score())
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.template.version.cmp(&a.template.version))
        .then_with(|| a.template.name.cmp(&b.template.name))
        .then_with(|| a.template.category.cmp(&b.template.category))
        .then_with(|| a.template.template_id.cmp(&b.template.template_id))
}
