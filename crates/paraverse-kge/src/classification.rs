//! Triple classification.
//!
//! Decide whether a fully-bound triple is true by thresholding its energy:
//! `energy <= threshold` means "true". The threshold is fit on a labelled
//! validation set and then applied unchanged to the test set. Negatives are
//! made by corrupting one side of each positive.

use std::collections::HashSet;

use paraverse_core::{EntityId, Triple};
use rand::Rng;

/// A fitted decision threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    /// Largest energy still classified as true.
    pub threshold: f32,
    /// Accuracy on the data it was fit on.
    pub accuracy: f64,
}

/// Threshold maximizing accuracy over labelled energies.
///
/// Returns `None` when there is nothing to fit.
pub fn best_threshold(positive: &[f32], negative: &[f32]) -> Option<Threshold> {
    let n = positive.len() + negative.len();
    if n == 0 {
        return None;
    }

    let mut labelled: Vec<(f32, bool)> = positive
        .iter()
        .map(|&s| (s, true))
        .chain(negative.iter().map(|&s| (s, false)))
        .collect();
    labelled.sort_by(|a, b| a.0.total_cmp(&b.0));

    // everything rejected
    let mut best = Threshold {
        threshold: f32::NEG_INFINITY,
        accuracy: negative.len() as f64 / n as f64,
    };
    let mut correct = negative.len();

    for (i, &(score, is_positive)) in labelled.iter().enumerate() {
        if is_positive {
            correct += 1;
        } else {
            correct -= 1;
        }
        // only cut between distinct energies
        if labelled.get(i + 1).is_some_and(|next| next.0 == score) {
            continue;
        }
        let accuracy = correct as f64 / n as f64;
        if accuracy > best.accuracy {
            best = Threshold {
                threshold: score,
                accuracy,
            };
        }
    }
    Some(best)
}

/// Accuracy of a fixed threshold.
pub fn accuracy(threshold: f32, positive: &[f32], negative: &[f32]) -> f64 {
    let n = positive.len() + negative.len();
    if n == 0 {
        return 0.0;
    }
    let tp = positive.iter().filter(|&&s| s <= threshold).count();
    let tn = negative.iter().filter(|&&s| s > threshold).count();
    (tp + tn) as f64 / n as f64
}

/// One corrupted negative per triple, avoiding `known` facts.
///
/// Gives up on a triple (skipping it) after a bounded number of draws, which
/// only happens for entities related to nearly everything.
pub fn corrupt_triples<R: Rng + ?Sized>(
    triples: &[Triple],
    known: &HashSet<Triple>,
    num_entities: usize,
    rng: &mut R,
) -> Vec<Triple> {
    const MAX_DRAWS: usize = 32;
    if num_entities < 2 {
        return Vec::new();
    }

    let mut negatives = Vec::with_capacity(triples.len());
    for t in triples {
        for _ in 0..MAX_DRAWS {
            let e = rng.gen_range(0..num_entities) as EntityId;
            let candidate = if rng.gen_bool(0.5) {
                Triple::new(e, t.relation, t.tail)
            } else {
                Triple::new(t.head, t.relation, e)
            };
            if candidate != *t && !known.contains(&candidate) {
                negatives.push(candidate);
                break;
            }
        }
    }
    negatives
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_separable_threshold() {
        let best = best_threshold(&[0.1, 0.2, 0.3], &[0.8, 0.9]).unwrap();
        assert_eq!(best.threshold, 0.3);
        assert!((best.accuracy - 1.0).abs() < 1e-9);
        assert!((accuracy(best.threshold, &[0.1, 0.5], &[0.2, 0.9]) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_overlapping_threshold() {
        // pos 0.1 0.5 | neg 0.3 0.9: best cut keeps 3 of 4
        let best = best_threshold(&[0.1, 0.5], &[0.3, 0.9]).unwrap();
        assert!((best.accuracy - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_ties_are_not_split() {
        let best = best_threshold(&[0.5], &[0.5]).unwrap();
        assert!((best.accuracy - 0.5).abs() < 1e-9);
        assert_eq!(best.threshold, f32::NEG_INFINITY);
    }

    #[test]
    fn test_unscored_triples_are_negative() {
        let inf = f32::INFINITY;
        let best = best_threshold(&[0.2, inf], &[inf]).unwrap();
        assert_eq!(best.threshold, 0.2);
        assert!((best.accuracy - 2.0 / 3.0).abs() < 1e-9);
        assert!(best_threshold(&[], &[]).is_none());
    }

    #[test]
    fn test_corrupt_avoids_known() {
        let triples = [Triple::new(0, 0, 1), Triple::new(1, 0, 2)];
        let known: HashSet<Triple> = triples.iter().copied().collect();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let negs = corrupt_triples(&triples, &known, 5, &mut rng);
        assert_eq!(negs.len(), 2);
        for n in &negs {
            assert!(!known.contains(n));
        }
        assert!(corrupt_triples(&triples, &known, 1, &mut rng).is_empty());
    }
}
