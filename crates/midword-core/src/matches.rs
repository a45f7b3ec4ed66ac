//! Match-set scoring around the midpoint of two words.
//!
//! Every candidate near the midpoint is scored by all four [`MatchStrategy`]
//! variants up front. The resulting list is what the midpoint cache stores and
//! what rounds are seeded from.

use crate::consts::RRF_K;
use crate::error::{MidwordError, MwResult};
use crate::guess::overlaps_target;
use crate::types::{normalize_title, EmbeddingId, NamespaceId};
use crate::vector;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use strum_macros::{Display, EnumIter, EnumString};
use uuid::Uuid;

/// How a match list is ordered when seeding a round.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    Display,
    clap::ValueEnum,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Raw index similarity to the midpoint vector.
    Midpoint,
    /// Similarity to left times similarity to right.
    #[default]
    LeftTimesRight,
    /// Rank fusion over the overlap of both per-side lists.
    RankFusionOverlap,
    /// Rank fusion over the full per-side lists.
    RankFusionOverall,
}

impl MatchStrategy {
    pub fn score(&self, m: &ScoredMatch) -> f32 {
        match self {
            MatchStrategy::Midpoint => m.score,
            MatchStrategy::LeftTimesRight => m.lxr_score,
            MatchStrategy::RankFusionOverlap => m.rrf_score,
            MatchStrategy::RankFusionOverall => m.rrf_overall_score,
        }
    }
}

/// One hit returned by the nearest-neighbor index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Neighbor {
    pub embedding_id: EmbeddingId,
    pub title: String,
    pub score: f32,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredMatch {
    pub title: String,
    pub embedding_id: EmbeddingId,
    pub score: f32,
    pub left_score: f32,
    pub right_score: f32,
    pub lxr_score: f32,
    pub rrf_score: f32,
    pub rrf_overall_score: f32,
    pub left_rank: Option<usize>,
    pub right_rank: Option<usize>,
    pub left_overall_rank: Option<usize>,
    pub right_overall_rank: Option<usize>,
}

/// Cache key of a midpoint: `(namespace, left, right)` with titles normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MidpointKey {
    pub namespace_id: NamespaceId,
    pub left: String,
    pub right: String,
}

impl MidpointKey {
    pub fn new(namespace_id: NamespaceId, left: &str, right: &str) -> Self {
        Self {
            namespace_id,
            left: normalize_title(left),
            right: normalize_title(right),
        }
    }

    /// Deterministic content id of the key (hex SHA-256).
    pub fn cache_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.namespace_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.left.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.right.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Cached embeddings and scored matches for one [`MidpointKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Midpoint {
    /// Row id, kept across recomputes.
    pub id: Uuid,
    pub cache_id: String,
    pub namespace_id: NamespaceId,
    pub left: String,
    pub right: String,
    pub left_embedding: Vec<f32>,
    pub right_embedding: Vec<f32>,
    pub midpoint_embedding: Vec<f32>,
    /// Ordered by midpoint similarity.
    pub top_matches: Vec<ScoredMatch>,
    pub updated_at: DateTime<Utc>,
}

/// Ranked inputs for one match computation.
pub struct MatchQuery<'a> {
    pub left_title: &'a str,
    pub right_title: &'a str,
    pub left: &'a [f32],
    pub right: &'a [f32],
    /// Hits around the midpoint, descending similarity.
    pub around_midpoint: &'a [Neighbor],
    /// Hits around the left word, descending similarity.
    pub around_left: &'a [Neighbor],
    /// Hits around the right word, descending similarity.
    pub around_right: &'a [Neighbor],
}

#[inline]
pub fn rrf_contribution(rank: usize) -> f32 {
    1.0 / (RRF_K + rank as f32 + 1.0)
}

/// Scores up to `limit` midpoint candidates with every strategy.
///
/// Titles overlapping either target word are dropped from all three lists
/// before any rank is assigned.
pub fn score_matches(query: &MatchQuery<'_>, limit: usize) -> Vec<ScoredMatch> {
    let keep = |n: &&Neighbor| {
        !overlaps_target(&n.title, query.left_title) && !overlaps_target(&n.title, query.right_title)
    };

    let left_list: Vec<EmbeddingId> = query
        .around_left
        .iter()
        .filter(keep)
        .map(|n| n.embedding_id)
        .unique()
        .collect();
    let right_list: Vec<EmbeddingId> = query
        .around_right
        .iter()
        .filter(keep)
        .map(|n| n.embedding_id)
        .unique()
        .collect();

    let left_overall = positions(&left_list);
    let right_overall = positions(&right_list);

    let right_set: HashSet<EmbeddingId> = right_list.iter().copied().collect();
    let left_set: HashSet<EmbeddingId> = left_list.iter().copied().collect();
    let left_overlap = positions(
        &left_list
            .iter()
            .copied()
            .filter(|id| right_set.contains(id))
            .collect::<Vec<_>>(),
    );
    let right_overlap = positions(
        &right_list
            .iter()
            .copied()
            .filter(|id| left_set.contains(id))
            .collect::<Vec<_>>(),
    );

    query
        .around_midpoint
        .iter()
        .filter(keep)
        .unique_by(|n| n.embedding_id)
        .take(limit)
        .map(|n| {
            let left_score = vector::cosine(&n.vector, query.left);
            let right_score = vector::cosine(&n.vector, query.right);

            let left_rank = left_overlap.get(&n.embedding_id).copied();
            let right_rank = right_overlap.get(&n.embedding_id).copied();
            let rrf_score = match (left_rank, right_rank) {
                (Some(l), Some(r)) => rrf_contribution(l) + rrf_contribution(r),
                _ => 0.0,
            };

            let left_overall_rank = left_overall.get(&n.embedding_id).copied();
            let right_overall_rank = right_overall.get(&n.embedding_id).copied();
            let rrf_overall_score = left_overall_rank.map_or(0.0, rrf_contribution)
                + right_overall_rank.map_or(0.0, rrf_contribution);

            ScoredMatch {
                title: n.title.clone(),
                embedding_id: n.embedding_id,
                score: n.score,
                left_score,
                right_score,
                lxr_score: left_score * right_score,
                rrf_score,
                rrf_overall_score,
                left_rank,
                right_rank,
                left_overall_rank,
                right_overall_rank,
            }
        })
        .collect()
}

fn positions(ids: &[EmbeddingId]) -> HashMap<EmbeddingId, usize> {
    ids.iter().enumerate().map(|(i, id)| (*id, i)).collect()
}

/// Picks the first `count` embeddings of `matches` ordered by `strategy`.
///
/// The sort is stable, so equal scores keep midpoint order.
pub fn select_round_matches(
    matches: &[ScoredMatch],
    strategy: MatchStrategy,
    count: usize,
) -> MwResult<Vec<EmbeddingId>> {
    if matches.len() < count {
        return Err(MidwordError::Integrity(format!(
            "Only {} candidate matches available, a round needs {}",
            matches.len(),
            count
        )));
    }

    let ordered = matches
        .iter()
        .sorted_by(|a, b| strategy.score(b).total_cmp(&strategy.score(a)))
        .take(count)
        .map(|m| m.embedding_id)
        .collect();

    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn hit(id: EmbeddingId, title: &str, score: f32, vector: Vec<f32>) -> Neighbor {
        Neighbor {
            embedding_id: id,
            title: title.to_string(),
            score,
            vector,
        }
    }

    #[test]
    fn test_rrf_contribution() {
        assert!((rrf_contribution(0) - 1.0 / 61.0).abs() < 1e-9);
        assert!((rrf_contribution(2) - 1.0 / 63.0).abs() < 1e-9);
    }

    #[test]
    fn test_overlap_and_overall_ranks() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let left_v = vec![1.0, 0.0];
        let right_v = vec![0.0, 1.0];

        let mid = vec![
            hit(a, "a", 0.9, vec![0.7, 0.7]),
            hit(b, "b", 0.8, vec![1.0, 0.0]),
            hit(c, "c", 0.7, vec![0.0, 1.0]),
        ];
        // b only on the left, c only on the right, a on both
        let around_left = vec![hit(b, "b", 1.0, vec![]), hit(a, "a", 0.7, vec![])];
        let around_right = vec![hit(c, "c", 1.0, vec![]), hit(a, "a", 0.7, vec![])];

        let q = MatchQuery {
            left_title: "left",
            right_title: "right",
            left: &left_v,
            right: &right_v,
            around_midpoint: &mid,
            around_left: &around_left,
            around_right: &around_right,
        };
        let out = score_matches(&q, 10);
        assert_eq!(out.len(), 3);

        let ma = &out[0];
        assert_eq!(ma.left_rank, Some(0));
        assert_eq!(ma.right_rank, Some(0));
        assert_eq!(ma.left_overall_rank, Some(1));
        assert!((ma.rrf_score - 2.0 / 61.0).abs() < 1e-6);
        assert!((ma.rrf_overall_score - 2.0 / 62.0).abs() < 1e-6);

        let mb = &out[1];
        assert_eq!(mb.left_rank, None);
        assert_eq!(mb.rrf_score, 0.0);
        assert!((mb.rrf_overall_score - 1.0 / 61.0).abs() < 1e-6);
        assert!(mb.lxr_score.abs() < 1e-6);
    }

    #[test]
    fn test_targets_are_excluded() {
        let v = vec![1.0, 0.0];
        let mid = vec![
            hit(Uuid::new_v4(), "Happy", 1.0, v.clone()),
            hit(Uuid::new_v4(), "Unhappy", 0.9, v.clone()),
            hit(Uuid::new_v4(), "joy", 0.8, v.clone()),
        ];
        let q = MatchQuery {
            left_title: "happy",
            right_title: "sad",
            left: &v,
            right: &v,
            around_midpoint: &mid,
            around_left: &[],
            around_right: &[],
        };
        let out = score_matches(&q, 10);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "joy");
    }

    #[test]
    fn test_every_strategy_seeds_a_round() {
        use std::str::FromStr;
        use strum::IntoEnumIterator;

        let v = vec![1.0, 0.0];
        let mid: Vec<_> = (0..6)
            .map(|i| hit(Uuid::new_v4(), &format!("w{}", i), 1.0 - i as f32 * 0.1, v.clone()))
            .collect();
        let q = MatchQuery {
            left_title: "left",
            right_title: "right",
            left: &v,
            right: &v,
            around_midpoint: &mid,
            around_left: &mid,
            around_right: &mid,
        };
        let scored = score_matches(&q, 10);

        for strategy in MatchStrategy::iter() {
            let ids = select_round_matches(&scored, strategy, 5).unwrap();
            assert_eq!(ids.len(), 5, "{}", strategy);
            assert_eq!(ids[0], mid[0].embedding_id, "{}", strategy);
            assert_eq!(MatchStrategy::from_str(&strategy.to_string()).unwrap(), strategy);
        }
        assert!(select_round_matches(&scored, MatchStrategy::Midpoint, 7).is_err());
    }

    #[test]
    fn test_cache_id_is_stable_and_normalized() {
        let ns = Uuid::new_v4();
        let a = MidpointKey::new(ns, " Happy", "sad ");
        let b = MidpointKey::new(ns, "happy", "SAD");
        assert_eq!(a, b);
        assert_eq!(a.cache_id(), b.cache_id());
        assert_ne!(a.cache_id(), MidpointKey::new(ns, "sad", "happy").cache_id());
    }
}
