//! Rank-based evaluation for link prediction.
//!
//! Given a test triple (h, r, t), the ensemble produces one energy per global
//! entity for both open sides:
//! 1. **Tail prediction**: energies of (h, r, ?), rank the true tail
//! 2. **Head prediction**: energies of (?, r, t), rank the true head
//!
//! Energies are **lower is better**. Candidates that form another known true
//! triple are filtered out (the standard "filtered" setting), so correct
//! predictions that happen to be in train/valid data are not penalized.
//!
//! # Ties and missing scores
//!
//! A candidate outranks the target only if its energy is strictly lower.
//! A target with no score at all (`+inf`, no universe could judge it) is
//! placed behind every other unscored candidate.
//!
//! | Metric | Range | Description |
//! |--------|-------|-------------|
//! | MRR | (0, 1] | Mean Reciprocal Rank |
//! | MR | [1, n] | Mean Rank |
//! | Hits@k | [0, 1] | Fraction with rank <= k |

use std::collections::HashSet;

use paraverse_core::{EntityId, Triple};
use serde::{Deserialize, Serialize};

use crate::model::Direction;

/// Rank-based evaluation results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankMetrics {
    /// Mean Reciprocal Rank: E\[1/rank\]
    pub mrr: f64,
    /// Mean Rank: E\[rank\]
    pub mr: f64,
    /// Hits@1: P(rank = 1)
    pub hits_at_1: f64,
    /// Hits@3: P(rank <= 3)
    pub hits_at_3: f64,
    /// Hits@10: P(rank <= 10)
    pub hits_at_10: f64,
    /// Number of ranks aggregated
    pub num_ranks: usize,
}

impl RankMetrics {
    /// Compute metrics from a list of ranks.
    pub fn from_ranks(ranks: &[usize]) -> Self {
        if ranks.is_empty() {
            return Self::default();
        }

        let n = ranks.len() as f64;
        let hits = |k: usize| ranks.iter().filter(|&&r| r <= k).count() as f64 / n;

        Self {
            mrr: ranks.iter().map(|&r| 1.0 / r as f64).sum::<f64>() / n,
            mr: ranks.iter().map(|&r| r as f64).sum::<f64>() / n,
            hits_at_1: hits(1),
            hits_at_3: hits(3),
            hits_at_10: hits(10),
            num_ranks: ranks.len(),
        }
    }

    /// Weighted merge of metrics from disjoint query sets.
    pub fn merge(metrics: &[Self]) -> Self {
        let total: usize = metrics.iter().map(|m| m.num_ranks).sum();
        if total == 0 {
            return Self::default();
        }
        let weighted = |f: fn(&Self) -> f64| {
            metrics
                .iter()
                .map(|m| f(m) * m.num_ranks as f64)
                .sum::<f64>()
                / total as f64
        };

        Self {
            mrr: weighted(|m| m.mrr),
            mr: weighted(|m| m.mr),
            hits_at_1: weighted(|m| m.hits_at_1),
            hits_at_3: weighted(|m| m.hits_at_3),
            hits_at_10: weighted(|m| m.hits_at_10),
            num_ranks: total,
        }
    }

    /// Format as summary string.
    pub fn summary(&self) -> String {
        format!(
            "MRR: {:.4} | MR: {:.1} | H@1: {:.3} | H@3: {:.3} | H@10: {:.3} (n={})",
            self.mrr, self.mr, self.hits_at_1, self.hits_at_3, self.hits_at_10, self.num_ranks
        )
    }
}

/// Filtered link-prediction ranker over global entity scores.
///
/// # Example
///
/// ```rust
/// use paraverse_core::Triple;
/// use paraverse_kge::evaluation::RankingEvaluator;
/// use paraverse_kge::Direction;
///
/// let mut eval = RankingEvaluator::new();
/// eval.add_known_triples([Triple::new(0, 0, 1)]);
///
/// // tail energies for (0, 0, ?); candidate 1 is a known fact and is skipped
/// let scores = [5.0, 0.1, 0.3, 0.2];
/// assert_eq!(eval.rank(&Triple::new(0, 0, 3), Direction::TailBatch, &scores), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RankingEvaluator {
    /// All known true triples (train + valid + test).
    known_triples: HashSet<Triple>,
}

impl RankingEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add known triples for filtering.
    pub fn add_known_triples(&mut self, triples: impl IntoIterator<Item = Triple>) {
        self.known_triples.extend(triples);
    }

    /// Whether a triple is filtered.
    pub fn is_known(&self, triple: &Triple) -> bool {
        self.known_triples.contains(triple)
    }

    /// Number of filtered triples.
    pub fn num_known(&self) -> usize {
        self.known_triples.len()
    }

    /// Filtered rank of the query's open side.
    ///
    /// `scores[e]` is the energy of the query with global entity `e` on the
    /// open side of `direction`. Scores shorter than the target id count the
    /// target as unscored.
    pub fn rank(&self, query: &Triple, direction: Direction, scores: &[f32]) -> usize {
        let target = match direction {
            Direction::HeadBatch => query.head,
            Direction::TailBatch => query.tail,
        };
        let target_score = score_at(scores, target);

        let mut rank = 1;
        for (candidate, &score) in scores.iter().enumerate() {
            let candidate = candidate as EntityId;
            if candidate == target {
                continue;
            }
            let corrupted = match direction {
                Direction::HeadBatch => Triple::new(candidate, query.relation, query.tail),
                Direction::TailBatch => Triple::new(query.head, query.relation, candidate),
            };
            if self.known_triples.contains(&corrupted) {
                continue;
            }
            if outranks(score, target_score) {
                rank += 1;
            }
        }
        rank
    }

    /// Filtered ranks for both sides of every query: head rank, then tail rank.
    ///
    /// `scores_for(query, direction)` returns the global candidate energies.
    pub fn rank_all<F>(&self, queries: &[Triple], mut scores_for: F) -> Vec<usize>
    where
        F: FnMut(&Triple, Direction) -> Vec<f32>,
    {
        let mut ranks = Vec::with_capacity(queries.len() * 2);
        for query in queries {
            for direction in Direction::ALL {
                let scores = scores_for(query, direction);
                ranks.push(self.rank(query, direction, &scores));
            }
        }
        ranks
    }
}

fn score_at(scores: &[f32], id: EntityId) -> f32 {
    match scores.get(id as usize) {
        Some(s) if !s.is_nan() => *s,
        _ => f32::INFINITY,
    }
}

/// Whether `score` ranks ahead of `target`; unscored targets lose all ties.
fn outranks(score: f32, target: f32) -> bool {
    let score = if score.is_nan() { f32::INFINITY } else { score };
    score < target || (target == f32::INFINITY && score == f32::INFINITY)
}

/// Rank of `target` among `all_scores` (lower energy = better, strict).
pub fn compute_rank(target_score: f32, all_scores: &[f32]) -> usize {
    1 + all_scores.iter().filter(|&&s| outranks(s, target_score)).count()
}
