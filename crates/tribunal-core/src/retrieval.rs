//! Retrieval scoring.
//!
//! Vector-index distances are converted to a bounded relevance and filtered.

use crate::types::RetrievedChunk;

/// A retrieved chunk with its relevance.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: RetrievedChunk,
    /// Relevance (0.0 - 1.0]
    pub relevance: f64,
}

/// Convert a distance to a relevance in (0, 1].
///
/// Negative distances are treated as zero.
pub fn score(distance: f64) -> f64 {
    if distance.is_nan() {
        return 0.0;
    }
    (-distance.max(0.0)).exp()
}

/// Score chunks, keep those at or above `floor`, best first, at most `max` of them.
pub fn score_chunks(chunks: Vec<RetrievedChunk>, floor: f64, max: usize) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = chunks
        .into_iter()
        .map(|chunk| {
            let relevance = score(chunk.distance);
            ScoredChunk { chunk, relevance }
        })
        .filter(|s| s.relevance >= floor)
        .collect();

    // Stable sort keeps index order for equal relevance
    scored.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
    scored.truncate(max);
    scored
}
