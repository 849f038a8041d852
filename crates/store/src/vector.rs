//! Vector similarity and ranking utilities.
//!
//! Pure-Rust implementations of:
//! - Cosine similarity
//! - Filtered nearest-neighbour scan over corpus entries
//! - Best-score merge of several ranked hit lists

use std::collections::HashMap;

use deepdive_core::evidence::{ChunkId, EvidenceChunk};
use deepdive_core::round::RoundFilters;

use crate::corpus::CorpusEntry;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the lengths differ or either vector is empty or zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a.iter().zip(b).fold((0.0f64, 0.0f64, 0.0f64), |acc, (x, y)| {
        let (x, y) = (*x as f64, *y as f64);
        (acc.0 + x * y, acc.1 + x * x, acc.2 + y * y)
    });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank corpus entries by similarity to `query`.
///
/// Only entries passing `filters` are considered. Each returned chunk has
/// `score` set to its similarity clamped into [0, 1]; the list is sorted by
/// descending score and cut at `limit`.
pub fn vector_search(
    entries: &[CorpusEntry],
    query: &[f32],
    filters: &RoundFilters,
    limit: usize,
) -> Vec<EvidenceChunk> {
    let mut scored: Vec<EvidenceChunk> = entries
        .iter()
        .filter(|entry| filters.accepts(&entry.chunk))
        .map(|entry| {
            let sim = cosine_similarity(&entry.embedding, query).clamp(0.0, 1.0);
            entry.chunk.clone().with_score(sim)
        })
        .collect();

    sort_by_score(&mut scored);
    scored.truncate(limit);
    scored
}

/// Merge hit lists from several query vectors into one entry per chunk id,
/// keeping the best score seen for each.
pub fn merge_best(hit_lists: Vec<Vec<EvidenceChunk>>) -> Vec<EvidenceChunk> {
    let mut best: HashMap<ChunkId, EvidenceChunk> = HashMap::new();
    for chunk in hit_lists.into_iter().flatten() {
        match best.get(&chunk.id) {
            Some(existing) if existing.score >= chunk.score => {}
            _ => {
                best.insert(chunk.id.clone(), chunk);
            }
        }
    }
    let mut merged: Vec<EvidenceChunk> = best.into_values().collect();
    sort_by_score(&mut merged);
    merged
}

/// Sort by descending score; ties break on id so ordering is deterministic.
pub fn sort_by_score(chunks: &mut [EvidenceChunk]) {
    chunks.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepdive_core::evidence::ChunkType;

    fn entry(id: &str, embedding: Vec<f32>) -> CorpusEntry {
        CorpusEntry {
            chunk: EvidenceChunk::text(id, format!("chunk {id}")),
            embedding,
        }
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn cosine_known_value() {
        // [1,1] . [1,0] = 1, |[1,1]| = sqrt(2)
        let sim = cosine_similarity(&[1.0, 1.0], &[1.0, 0.0]);
        assert!((sim - 0.7071).abs() < 0.001);
    }

    #[test]
    fn vector_search_ranks_by_similarity() {
        let entries = vec![
            entry("a", vec![0.0, 1.0, 0.0]),
            entry("b", vec![1.0, 0.0, 0.0]),
            entry("c", vec![0.5, 0.5, 0.0]),
        ];
        let results = vector_search(&entries, &[1.0, 0.0, 0.0], &RoundFilters::default(), 10);
        let ids: Vec<&str> = results.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn vector_search_clamps_negative_similarity() {
        let entries = vec![entry("opposite", vec![-1.0, 0.0])];
        let results = vector_search(&entries, &[1.0, 0.0], &RoundFilters::default(), 10);
        assert_eq!(results[0].score, 0.0);
    }

    #[test]
    fn vector_search_applies_filters_and_limit() {
        let entries: Vec<_> = (0..10)
            .map(|i| entry(&format!("e{i}"), vec![1.0, i as f32 * 0.1]))
            .collect();
        assert_eq!(vector_search(&entries, &[1.0, 0.0], &RoundFilters::default(), 3).len(), 3);

        let charts_only = RoundFilters {
            chunk_types: vec![ChunkType::Chart],
            ..Default::default()
        };
        assert!(vector_search(&entries, &[1.0, 0.0], &charts_only, 10).is_empty());
    }

    #[test]
    fn merge_best_keeps_highest_score_per_id() {
        let first = vec![
            EvidenceChunk::text("a", "A").with_score(0.4),
            EvidenceChunk::text("b", "B").with_score(0.9),
        ];
        let second = vec![
            EvidenceChunk::text("a", "A").with_score(0.8),
            EvidenceChunk::text("c", "C").with_score(0.5),
        ];
        let merged = merge_best(vec![first, second]);
        let ids: Vec<&str> = merged.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert!((merged[1].score - 0.8).abs() < 1e-6);
    }
}
