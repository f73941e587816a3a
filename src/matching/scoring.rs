use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::weights::{MatchWeights, WeightsError};
use crate::document::StructuralModel;
use crate::store::Template;

/// Per-signal similarities, each in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalBreakdown {
    pub structural: f64,
    pub placeholder_overlap: f64,
    pub length: f64,
    /// Only present when a filter category was requested.
    pub category_bonus: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityScore {
    pub score: f64,
    pub breakdown: SignalBreakdown,
}

pub trait Scorer {
    fn compare(
        &self,
        candidate: &StructuralModel,
        template: &Template,
        requested_category: Option<&str>,
    ) -> SimilarityScore;
}

/// Weighted multi-signal comparison of structural models.
///
/// Score = Σ wᵢ·sᵢ / Σ wᵢ over the signals that apply. The category signal
/// only applies when a category was requested, so `compare(A, A)` is exactly
/// 1.0 with or without a filter.
#[derive(Debug, Clone, Default)]
pub struct SimilarityEngine {
    weights: MatchWeights,
}

impl SimilarityEngine {
    pub fn new(weights: MatchWeights) -> Result<Self, WeightsError> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &MatchWeights {
        &self.weights
    }

    /// Compare two models directly, without a category signal.
    pub fn compare_models(&self, candidate: &StructuralModel, reference: &StructuralModel) -> SimilarityScore {
        self.score(candidate, reference, None)
    }

    fn score(
        &self,
        candidate: &StructuralModel,
        reference: &StructuralModel,
        category_match: Option<bool>,
    ) -> SimilarityScore {
        let w = &self.weights;
        let a = candidate.format_profile();
        let b = reference.format_profile();

        let structural = sequence_similarity(&a.heading_depths, &b.heading_depths);
        let placeholder_overlap = jaccard(candidate, reference);
        let length = (ratio_similarity(candidate.section_count() as f64, reference.section_count() as f64)
            + ratio_similarity(a.average_section_length, b.average_section_length))
            / 2.0;

        let mut weighted = w.structural * structural + w.placeholder * placeholder_overlap + w.length * length;
        let mut total = w.structural + w.placeholder + w.length;

        let category_bonus = category_match.map(|matched| if matched { 1.0 } else { 0.0 });
        if let Some(bonus) = category_bonus {
            weighted += w.category * bonus;
            total += w.category;
        }

        let score = if total > 0.0 {
            (weighted / total).clamp(0.0, 1.0)
        } else {
            0.0
        };
        debug_assert!((0.0..=1.0).contains(&score), "score {score} out of range [0.0, 1.0]");

        SimilarityScore {
            score,
            breakdown: SignalBreakdown {
                structural,
                placeholder_overlap,
                length,
                category_bonus,
            },
        }
    }
}

impl Scorer for SimilarityEngine {
    fn compare(
        &self,
        candidate: &StructuralModel,
        template: &Template,
        requested_category: Option<&str>,
    ) -> SimilarityScore {
        let category_match = requested_category.map(|c| template.category == c.trim());
        self.score(candidate, &template.structural_model, category_match)
    }
}

/// `1 - levenshtein(a, b) / max(|a|, |b|)`; two empty sequences are identical.
pub fn sequence_similarity(a: &[u8], b: &[u8]) -> f64 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

fn levenshtein(a: &[u8], b: &[u8]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, x) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, y) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(x != y);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Jaccard index of the placeholder-name sets; two empty sets score 1.0.
fn jaccard(a: &StructuralModel, b: &StructuralModel) -> f64 {
    let left: BTreeSet<&str> = a.placeholder_names().collect();
    let right: BTreeSet<&str> = b.placeholder_names().collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 1.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}

/// `1 - |a - b| / max(a, b)` for non-negative values; equal values score 1.0.
fn ratio_similarity(a: f64, b: f64) -> f64 {
    if a == b {
        return 1.0;
    }
    let largest = a.max(b);
    if largest <= 0.0 {
        return 1.0;
    }
    (1.0 - (a - b).abs() / largest).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein(&[1, 2, 2], &[1, 2, 2]), 0);
        assert_eq!(levenshtein(&[2, 2], &[2, 2, 2]), 1);
        assert_eq!(levenshtein(&[], &[1, 2]), 2);
        assert_eq!(levenshtein(&[1, 2, 3], &[3, 2, 1]), 2);
    }

    #[test]
    fn sequence_similarity_gives_partial_credit() {
        let s = sequence_similarity(&[2, 2], &[2, 2, 2]);
        assert!(s > 0.0 && s < 1.0);
        assert!((s - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn ratio_similarity_bounds() {
        assert_eq!(ratio_similarity(0.0, 0.0), 1.0);
        assert_eq!(ratio_similarity(0.0, 10.0), 0.0);
        assert_eq!(ratio_similarity(5.0, 10.0), 0.5);
    }
}
