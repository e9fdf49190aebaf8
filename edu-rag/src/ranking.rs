//! Distance-to-relevance conversion and significance filtering.

use crate::config::DEFAULT_SIMILARITY_THRESHOLD;
use crate::document::RetrievalResult;

/// Convert a normalized distance into a relevance score in `[0, 1]`.
///
/// `0` maps to `1`, anything at or beyond `1` maps to `0`. A NaN distance is
/// treated as unrelated.
pub fn to_relevance(distance: f32) -> f32 {
    if distance.is_nan() {
        return 0.0;
    }
    (1.0 - distance).clamp(0.0, 1.0)
}

/// Scores retrieval results and decides which are significant.
///
/// Ranking keeps the store's native order; there is no secondary sort key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceRanker {
    threshold: f32,
}

impl Default for RelevanceRanker {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl RelevanceRanker {
    /// Create a ranker whose significance cut-off is `threshold` (exclusive).
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// The significance cut-off.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Whether `relevance` clears the threshold.
    pub fn is_significant(&self, relevance: f32) -> bool {
        relevance > self.threshold
    }

    /// Fill in `relevance_score` for every result, preserving order.
    pub fn rank(&self, mut results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
        for result in &mut results {
            result.relevance_score = to_relevance(result.distance);
        }
        results
    }

    /// Keep only significant results, preserving order.
    pub fn significant<'a>(
        &'a self,
        results: &'a [RetrievalResult],
    ) -> impl Iterator<Item = &'a RetrievalResult> + 'a {
        results.iter().filter(|r| self.is_significant(r.relevance_score))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn anchors() {
        assert_eq!(to_relevance(0.0), 1.0);
        assert_eq!(to_relevance(1.0), 0.0);
        assert_eq!(to_relevance(1.7), 0.0);
        assert_eq!(to_relevance(f32::NAN), 0.0);
        assert!((to_relevance(0.1) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn threshold_is_exclusive() {
        let ranker = RelevanceRanker::new(0.7);
        assert!(!ranker.is_significant(0.7));
        assert!(ranker.is_significant(0.71));
        assert!(RelevanceRanker::new(0.5).is_significant(0.6));
    }

    proptest! {
        #[test]
        fn bounded_and_non_increasing(a in -2.0f32..5.0, b in -2.0f32..5.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let (r_lo, r_hi) = (to_relevance(lo), to_relevance(hi));
            prop_assert!((0.0..=1.0).contains(&r_lo));
            prop_assert!((0.0..=1.0).contains(&r_hi));
            prop_assert!(r_lo >= r_hi);
        }
    }
}
