use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::services::errors::{EngineError, FieldErrorsBuilder};

#[derive(Debug, Clone)]
pub(crate) struct ManualItem {
    pub(crate) question_id: String,
    pub(crate) weight: f64,
    pub(crate) subtest_id: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct CategoryDraw {
    pub(crate) category_id: String,
    pub(crate) count: i32,
    pub(crate) weight: f64,
}

/// One row of an exam's committed question set.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CommittedQuestion {
    pub(crate) question_id: String,
    pub(crate) position: i32,
    pub(crate) weight: f64,
    pub(crate) subtest_id: Option<String>,
}

fn valid_weight(weight: f64) -> bool {
    weight.is_finite() && weight > 0.0
}

/// Every id must exist in the bank, appear once, and carry a positive weight.
/// Sub-test references must point at sub-tests of the same exam.
pub(crate) fn validate_manual(
    items: &[ManualItem],
    known_questions: &HashSet<String>,
    known_subtests: &HashSet<String>,
) -> Result<Vec<CommittedQuestion>, EngineError> {
    let mut errors = FieldErrorsBuilder::default();
    if items.is_empty() {
        errors.push("questions", "At least one question is required");
    }

    let mut seen = HashSet::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        if !known_questions.contains(&item.question_id) {
            errors.push(
                format!("questions.{index}.question_id"),
                format!("Question {} does not exist", item.question_id),
            );
        }
        if !seen.insert(item.question_id.as_str()) {
            errors.push(
                format!("questions.{index}.question_id"),
                format!("Question {} is listed more than once", item.question_id),
            );
        }
        if !valid_weight(item.weight) {
            errors.push(format!("questions.{index}.weight"), "Weight must be greater than zero");
        }
        if let Some(subtest_id) = &item.subtest_id {
            if !known_subtests.contains(subtest_id) {
                errors.push(
                    format!("questions.{index}.subtest_id"),
                    "Sub-test does not belong to this exam",
                );
            }
        }
    }
    errors.finish()?;

    Ok(items
        .iter()
        .enumerate()
        .map(|(index, item)| CommittedQuestion {
            question_id: item.question_id.clone(),
            position: index as i32 + 1,
            weight: item.weight,
            subtest_id: item.subtest_id.clone(),
        })
        .collect())
}

pub(crate) fn validate_rules(rules: &[CategoryDraw]) -> Result<(), EngineError> {
    let mut errors = FieldErrorsBuilder::default();
    if rules.is_empty() {
        errors.push("rules", "At least one category rule is required");
    }

    let mut seen = HashSet::with_capacity(rules.len());
    for (index, rule) in rules.iter().enumerate() {
        if !seen.insert(rule.category_id.as_str()) {
            errors.push(
                format!("rules.{index}.category_id"),
                "Each category may appear only once",
            );
        }
        if rule.count <= 0 {
            errors.push(format!("rules.{index}.count"), "Count must be at least 1");
        }
        if !valid_weight(rule.weight) {
            errors.push(format!("rules.{index}.weight"), "Weight must be greater than zero");
        }
    }

    errors.finish()
}

/// Draws `count` distinct questions per category without replacement. Requests larger
/// than the pool fail instead of being truncated.
pub(crate) fn draw_random<R: Rng + ?Sized>(
    rules: &[CategoryDraw],
    pools: &HashMap<String, Vec<String>>,
    rng: &mut R,
) -> Result<Vec<CommittedQuestion>, EngineError> {
    validate_rules(rules)?;

    let empty = Vec::new();
    for rule in rules {
        let available = pools.get(&rule.category_id).unwrap_or(&empty).len() as i64;
        if i64::from(rule.count) > available {
            return Err(EngineError::InsufficientQuestions {
                category_id: rule.category_id.clone(),
                requested: i64::from(rule.count),
                available,
            });
        }
    }

    let mut committed = Vec::new();
    let mut drawn = HashSet::new();
    for rule in rules {
        let pool = pools.get(&rule.category_id).unwrap_or(&empty);
        for question_id in pool.choose_multiple(rng, rule.count as usize) {
            if !drawn.insert(question_id.clone()) {
                continue;
            }
            committed.push(CommittedQuestion {
                question_id: question_id.clone(),
                position: committed.len() as i32 + 1,
                weight: rule.weight,
                subtest_id: None,
            });
        }
    }

    Ok(committed)
}

pub(crate) fn new_order_seed() -> i64 {
    rand::random::<i64>()
}

/// Per-attempt display order; membership is the committed set, only the order moves.
pub(crate) fn display_order(question_ids: &[String], seed: i64) -> Vec<String> {
    let mut ordered = question_ids.to_vec();
    let mut rng = StdRng::seed_from_u64(seed as u64);
    ordered.shuffle(&mut rng);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(prefix: &str, count: usize) -> Vec<String> {
        (1..=count).map(|n| format!("{prefix}{n}")).collect()
    }

    fn item(id: &str, weight: f64) -> ManualItem {
        ManualItem { question_id: id.to_string(), weight, subtest_id: None }
    }

    #[test]
    fn manual_assembly_keeps_order_and_weights() {
        let known: HashSet<String> = ids("q", 3).into_iter().collect();
        let committed =
            validate_manual(&[item("q2", 10.0), item("q1", 5.0)], &known, &HashSet::new())
                .expect("valid");

        assert_eq!(committed.len(), 2);
        assert_eq!(committed[0].question_id, "q2");
        assert_eq!(committed[0].position, 1);
        assert_eq!(committed[1].weight, 5.0);
    }

    #[test]
    fn manual_assembly_rejects_unknown_duplicate_and_weightless() {
        let known: HashSet<String> = ids("q", 2).into_iter().collect();
        let result = validate_manual(
            &[item("q1", 1.0), item("q1", 1.0), item("q9", 1.0), item("q2", 0.0)],
            &known,
            &HashSet::new(),
        );

        let Err(EngineError::Validation { fields, .. }) = result else {
            panic!("expected validation error");
        };
        assert!(fields.contains_key("questions.1.question_id"));
        assert!(fields.contains_key("questions.2.question_id"));
        assert!(fields.contains_key("questions.3.weight"));
    }

    #[test]
    fn manual_assembly_checks_subtest_ownership() {
        let known: HashSet<String> = ids("q", 1).into_iter().collect();
        let subtests: HashSet<String> = ["s1".to_string()].into_iter().collect();
        let mut foreign = item("q1", 1.0);
        foreign.subtest_id = Some("s2".to_string());

        assert!(validate_manual(&[foreign], &known, &subtests).is_err());
    }

    #[test]
    fn random_draw_fails_instead_of_truncating() {
        let pools = HashMap::from([("cat-a".to_string(), ids("a", 3))]);
        let rules = [CategoryDraw { category_id: "cat-a".into(), count: 5, weight: 1.0 }];
        let mut rng = StdRng::seed_from_u64(7);

        assert_eq!(
            draw_random(&rules, &pools, &mut rng),
            Err(EngineError::InsufficientQuestions {
                category_id: "cat-a".into(),
                requested: 5,
                available: 3,
            })
        );
    }

    #[test]
    fn random_draw_is_distinct_and_sized_per_category() {
        let pools = HashMap::from([
            ("cat-a".to_string(), ids("a", 10)),
            ("cat-b".to_string(), ids("b", 4)),
        ]);
        let rules = [
            CategoryDraw { category_id: "cat-a".into(), count: 6, weight: 2.0 },
            CategoryDraw { category_id: "cat-b".into(), count: 4, weight: 0.5 },
        ];

        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let committed = draw_random(&rules, &pools, &mut rng).expect("draw");
            assert_eq!(committed.len(), 10);

            let unique: HashSet<_> = committed.iter().map(|q| q.question_id.as_str()).collect();
            assert_eq!(unique.len(), 10);
            assert_eq!(committed.iter().filter(|q| q.question_id.starts_with('a')).count(), 6);
            assert!(committed
                .iter()
                .filter(|q| q.question_id.starts_with('b'))
                .all(|q| q.weight == 0.5));
            assert!(committed.iter().enumerate().all(|(i, q)| q.position == i as i32 + 1));
        }
    }

    #[test]
    fn missing_category_counts_as_empty_pool() {
        let rules = [CategoryDraw { category_id: "ghost".into(), count: 1, weight: 1.0 }];
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            draw_random(&rules, &HashMap::new(), &mut rng),
            Err(EngineError::InsufficientQuestions { available: 0, .. })
        ));
    }

    #[test]
    fn rules_reject_duplicates_and_bad_counts() {
        let rules = [
            CategoryDraw { category_id: "a".into(), count: 1, weight: 1.0 },
            CategoryDraw { category_id: "a".into(), count: 0, weight: -1.0 },
        ];
        let Err(EngineError::Validation { fields, .. }) = validate_rules(&rules) else {
            panic!("expected validation error");
        };
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn display_order_is_a_stable_permutation() {
        let questions = ids("q", 12);
        let first = display_order(&questions, 42);
        let second = display_order(&questions, 42);
        assert_eq!(first, second);

        let mut sorted = first.clone();
        sorted.sort();
        let mut expected = questions.clone();
        expected.sort();
        assert_eq!(sorted, expected);
    }
}
