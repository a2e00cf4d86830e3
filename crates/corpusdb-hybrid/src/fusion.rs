//! Score normalisation and weighted fusion of the two candidate lists.

use std::collections::HashMap;

use corpusdb_core::types::{FusedResult, SearchHit};

/// Fusion weights. Intended, not required, to sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub keyword: f32,
    pub semantic: f32,
}

impl FusionWeights {
    pub const KEYWORD_ONLY: Self = Self { keyword: 1.0, semantic: 0.0 };
    pub const SEMANTIC_ONLY: Self = Self { keyword: 0.0, semantic: 1.0 };
}

/// Per-list min-max normalisation into `[0, 1]`.
///
/// A list whose scores are all equal (including a single score) maps to 1.0.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    let (min, max) = scores
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));
    let range = max - min;
    if !(range > f32::EPSILON) || !range.is_finite() {
        return vec![1.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / range).collect()
}

/// Best score per id; a side may repeat an id and only the best counts.
fn best_by_id(hits: &[SearchHit]) -> Vec<&SearchHit> {
    let mut best: HashMap<&str, &SearchHit> = HashMap::new();
    for h in hits {
        best.entry(h.id.as_str())
            .and_modify(|cur| {
                if h.score > cur.score {
                    *cur = h;
                }
            })
            .or_insert(h);
    }
    let mut out: Vec<&SearchHit> = best.into_values().collect();
    out.sort_by(|a, b| a.id.cmp(&b.id));
    out
}

/// Union both candidate sets by chunk id and score them as
/// `keyword * norm_kw + semantic * norm_sem`.
///
/// A side that did not retrieve a chunk contributes 0.0. Candidates found only
/// by a side whose weight is zero are dropped. Results are sorted by score
/// descending with ties broken by chunk id, then truncated to `top_k`.
pub fn fuse(keyword: &[SearchHit], vector: &[SearchHit], weights: FusionWeights, top_k: usize) -> Vec<FusedResult> {
    let keyword = best_by_id(keyword);
    let vector = best_by_id(vector);
    let kw_norm = min_max_normalize(&keyword.iter().map(|h| h.score).collect::<Vec<_>>());
    let vec_norm = min_max_normalize(&vector.iter().map(|h| h.score).collect::<Vec<_>>());

    let mut merged: HashMap<&str, FusedResult> = HashMap::new();
    for (hit, norm) in keyword.iter().zip(kw_norm) {
        merged.insert(
            hit.id.as_str(),
            FusedResult {
                id: hit.id.clone(),
                text: hit.text.clone(),
                metadata: hit.metadata.clone(),
                keyword_raw: Some(hit.score),
                vector_raw: None,
                keyword_norm: norm,
                vector_norm: 0.0,
                score: 0.0,
            },
        );
    }
    for (hit, norm) in vector.iter().zip(vec_norm) {
        merged
            .entry(hit.id.as_str())
            .and_modify(|r| {
                r.vector_raw = Some(hit.score);
                r.vector_norm = norm;
            })
            .or_insert_with(|| FusedResult {
                id: hit.id.clone(),
                text: hit.text.clone(),
                metadata: hit.metadata.clone(),
                keyword_raw: None,
                vector_raw: Some(hit.score),
                keyword_norm: 0.0,
                vector_norm: norm,
                score: 0.0,
            });
    }

    let mut results: Vec<FusedResult> = merged
        .into_values()
        .filter(|r| {
            (r.keyword_raw.is_some() && weights.keyword > 0.0) || (r.vector_raw.is_some() && weights.semantic > 0.0)
        })
        .map(|mut r| {
            r.score = weights.keyword * r.keyword_norm + weights.semantic * r.vector_norm;
            r
        })
        .collect();
    results.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    results.truncate(top_k);
    results
}
