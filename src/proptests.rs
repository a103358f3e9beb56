// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Model-based property tests: arbitrary workloads are replayed against a
//! plain `Vec` mirror, and the tree's structural invariants are re-checked
//! after every query.

use proptest::prelude::*;
use proptest_derive::Arbitrary;

use crate::test_utils::{check_query_path, check_tree, decode, encode, numeric_oracle};
use crate::Pope;

#[derive(Arbitrary, Clone, Debug)]
enum Action {
    Insert(#[proptest(strategy = "0u64..150")] u64),
    Range(
        #[proptest(strategy = "0u64..150")] u64,
        #[proptest(strategy = "0u64..150")] u64,
    ),
}

fn answered_values(tree: &mut Pope, lo: u64, hi: u64) -> Vec<u64> {
    let mut oracle = numeric_oracle();
    let mut values: Vec<u64> = tree
        .range(&encode(lo), &encode(hi), &mut oracle)
        .unwrap()
        .iter()
        .map(|ct| decode(ct.as_bytes()))
        .collect();
    values.sort_unstable();
    values
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_workloads_match_a_reference_model(
        actions in proptest::collection::vec(any::<Action>(), 1..60),
        fan_out in 1usize..6,
    ) {
        let mut tree = Pope::new(fan_out).unwrap();
        let mut mirror: Vec<u64> = Vec::new();

        for action in actions {
            match action {
                Action::Insert(value) => {
                    tree.insert(encode(value)).unwrap();
                    mirror.push(value);
                }
                Action::Range(a, b) => {
                    let (lo, hi) = (a.min(b), a.max(b));
                    let answered = answered_values(&mut tree, lo, hi);
                    let mut expected: Vec<u64> = mirror
                        .iter()
                        .copied()
                        .filter(|v| (lo..=hi).contains(v))
                        .collect();
                    expected.sort_unstable();
                    prop_assert_eq!(answered, expected);

                    check_tree(&tree);
                    check_query_path(&tree, lo, hi);
                }
            }

            // Conservation: every inserted ciphertext is in some buffer.
            let mut stored: Vec<u64> = tree.iter().map(|ct| decode(ct.as_bytes())).collect();
            stored.sort_unstable();
            let mut inserted = mirror.clone();
            inserted.sort_unstable();
            prop_assert_eq!(stored, inserted);
        }
    }

    #[test]
    fn insertion_order_does_not_change_answers(
        (original, shuffled) in proptest::collection::vec(0u64..100, 1..40)
            .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle())),
        queries in proptest::collection::vec((0u64..100, 0u64..100), 1..8),
        fan_out in 1usize..5,
    ) {
        let mut left = Pope::new(fan_out).unwrap();
        let mut right = Pope::new(fan_out).unwrap();
        for value in &original {
            left.insert(encode(*value)).unwrap();
        }
        for value in &shuffled {
            right.insert(encode(*value)).unwrap();
        }

        // Identical queries against permuted insertions answer identically,
        // even though the two trees may refine into different shapes.
        for (a, b) in queries {
            let (lo, hi) = (a.min(b), a.max(b));
            prop_assert_eq!(
                answered_values(&mut left, lo, hi),
                answered_values(&mut right, lo, hi)
            );
        }
        check_tree(&left);
        check_tree(&right);
    }

    #[test]
    fn inverted_bounds_answer_empty_without_mutating(
        values in proptest::collection::vec(0u64..100, 1..30),
        lo in 51u64..100,
        hi in 0u64..50,
        fan_out in 1usize..5,
    ) {
        let mut tree = Pope::new(fan_out).unwrap();
        for value in &values {
            tree.insert(encode(*value)).unwrap();
        }
        let before = tree.stats();
        prop_assert!(answered_values(&mut tree, lo, hi).is_empty());
        prop_assert_eq!(tree.stats(), before);
    }
}
