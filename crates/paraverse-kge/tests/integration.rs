//! Integration tests for the single-universe pipeline.
//!
//! Build -> train -> rank, all in local ids, the way the ensemble drives one
//! universe.

use paraverse_core::Triple;
use paraverse_kge::evaluation::{RankMetrics, RankingEvaluator};
use paraverse_kge::{
    Direction, EmbeddingSpace, MarginTrainer, ModelFactory, Norm, TrainParams, Trainer,
    TrainingConfig, TransEFactory,
};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Two disjoint chains under one relation: 0→1→…→5 and 6→7→…→11.
fn two_chains() -> Vec<Triple> {
    let mut triples = Vec::new();
    for i in 0..5 {
        triples.push(Triple::new(i, 0, i + 1));
        triples.push(Triple::new(i + 6, 0, i + 7));
    }
    triples
}

#[test]
fn test_trained_transe_beats_untrained() {
    let triples = two_chains();
    let factory = TransEFactory::new(16, Norm::L1);
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let untrained = factory.build(12, 1, &mut rng).unwrap();
    let mut trained = untrained.clone();
    MarginTrainer::new(TrainingConfig::default().with_batch_size(4))
        .train(&mut trained, &triples, &TrainParams::new(200, 0.02, 2.0), &mut rng)
        .unwrap();

    let evaluator = RankingEvaluator::new();
    let mrr = |model: &paraverse_kge::TransE| {
        let ranks = evaluator.rank_all(&triples, |q, direction| {
            let fixed = match direction {
                Direction::HeadBatch => q.tail,
                Direction::TailBatch => q.head,
            };
            model.predict_batch(fixed, q.relation, direction)
        });
        RankMetrics::from_ranks(&ranks).mrr
    };

    let before = mrr(&untrained);
    let after = mrr(&trained);
    assert!(after > before, "MRR {before:.3} -> {after:.3}");
}

#[test]
fn test_filtering_uses_training_facts() {
    let triples = two_chains();
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let model = TransEFactory::new(8, Norm::L2).build(12, 1, &mut rng).unwrap();

    let raw = RankingEvaluator::new();
    let mut filtered = RankingEvaluator::new();
    filtered.add_known_triples(triples.iter().copied());

    for q in &triples {
        let scores = model.predict_batch(q.head, q.relation, Direction::TailBatch);
        assert!(
            filtered.rank(q, Direction::TailBatch, &scores)
                <= raw.rank(q, Direction::TailBatch, &scores)
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn batch_scores_match_pointwise(
        seed in any::<u64>(),
        entity in 0u32..6,
        relation in 0u32..3,
        p in 1u32..=2,
    ) {
        let factory = TransEFactory::with_p_norm(6, p).unwrap();
        let model = factory.build(6, 3, &mut ChaCha8Rng::seed_from_u64(seed)).unwrap();

        let tails = model.predict_batch(entity, relation, Direction::TailBatch);
        let heads = model.predict_batch(entity, relation, Direction::HeadBatch);
        prop_assert_eq!(tails.len(), 6);
        for c in 0..6u32 {
            prop_assert!((tails[c as usize] - model.score(entity, relation, c)).abs() < 1e-4);
            prop_assert!((heads[c as usize] - model.score(c, relation, entity)).abs() < 1e-4);
        }
    }

    #[test]
    fn rank_is_within_bounds(scores in prop::collection::vec(0.0f32..10.0, 1..40), target in 0usize..40) {
        let target = (target % scores.len()) as u32;
        let rank = RankingEvaluator::new().rank(&Triple::new(0, 0, target), Direction::TailBatch, &scores);
        prop_assert!(rank >= 1 && rank <= scores.len());
    }
}
