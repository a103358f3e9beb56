// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Common test utilities: a numeric stand-in oracle, structural checkers,
//! and mirror-model workload runners.
//!
//! Test "ciphertexts" are the decimal digits of a `u64`, so the key holder's
//! decoder is just a string parse and every ordering fact the oracle reveals
//! can be recomputed independently by the checkers below.

use crate::node::{Node, NodeKind};
use crate::oracle::Oracle;
use crate::{Ciphertext, CountingOracle, LocalOracle, Pope};
use duplicate::duplicate_item;
use rand::{rngs::StdRng, Rng, SeedableRng};

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Encodes a value as its decimal digits, the tests' stand-in ciphertext.
pub(crate) fn encode(value: u64) -> Ciphertext {
    Ciphertext::new(value.to_string().into_bytes())
}

/// The key holder's side of [`encode`].
pub(crate) fn decode(bytes: &[u8]) -> u64 {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

pub(crate) type NumericOracle = LocalOracle<u64, fn(&[u8]) -> u64>;
pub(crate) type CountingNumericOracle = CountingOracle<NumericOracle>;

pub(crate) fn numeric_oracle() -> NumericOracle {
    LocalOracle::new(decode as fn(&[u8]) -> u64)
}

/// An oracle a test can conjure from nothing.
pub(crate) trait TestOracle: Oracle {
    fn fresh() -> Self;
}

#[duplicate_item(
    oracle_type              constructor;
    [NumericOracle]          [numeric_oracle()];
    [CountingNumericOracle]  [CountingOracle::new(numeric_oracle())];
)]
impl TestOracle for oracle_type {
    fn fresh() -> Self {
        constructor
    }
}

/// Checks the structural and ordering invariants of the whole tree by
/// re-deriving every comparison from the decoded plaintexts: directory
/// shape, strictly increasing pivots, and the placement of every subtree
/// strictly inside its slot's interval (closed on the right, since
/// ciphertexts equal to a pivot ride with the child to the pivot's left).
pub(crate) fn check_tree(tree: &Pope) {
    check_node(tree.root(), tree.fan_out());
}

fn check_node(node: &Node, fan_out: usize) -> (Option<u64>, Option<u64>) {
    let buffered: Vec<u64> = node.buffer.iter().map(|ct| decode(ct.as_bytes())).collect();
    let mut lowest = buffered.iter().min().copied();
    let mut highest = buffered.iter().max().copied();

    if let NodeKind::Internal(dir) = &node.kind {
        assert_eq!(dir.children.len(), dir.pivots.len() + 1);
        assert!(!dir.pivots.is_empty());
        assert!(dir.pivots.len() <= fan_out);

        let pivots: Vec<u64> = dir.pivots.iter().map(|ct| decode(ct.as_bytes())).collect();
        assert!(
            pivots.windows(2).all(|w| w[0] < w[1]),
            "pivots must be strictly increasing: {pivots:?}"
        );

        for (slot, child) in dir.children.iter().enumerate() {
            let (child_low, child_high) = check_node(child, fan_out);
            if let (Some(child_low), Some(child_high)) = (child_low, child_high) {
                if slot > 0 {
                    assert!(
                        child_low > pivots[slot - 1],
                        "child {slot} leaks below pivot: {child_low} <= {}",
                        pivots[slot - 1]
                    );
                }
                if slot < pivots.len() {
                    assert!(
                        child_high <= pivots[slot],
                        "child {slot} leaks above pivot: {child_high} > {}",
                        pivots[slot]
                    );
                }
                lowest = Some(lowest.map_or(child_low, |v| v.min(child_low)));
                highest = Some(highest.map_or(child_high, |v| v.max(child_high)));
            }
        }
    }
    (lowest, highest)
}

/// Walks the boundary path a `[lo, hi]` query takes and asserts the leaf cap
/// on every leaf the query would have refined. An oversized leaf is tolerated
/// only when it is a single equality class, which no pivot can split.
pub(crate) fn check_query_path(tree: &Pope, lo: u64, hi: u64) {
    check_path_node(tree.root(), tree.fan_out(), lo, hi);
}

fn check_path_node(node: &Node, fan_out: usize, lo: u64, hi: u64) {
    match &node.kind {
        NodeKind::Leaf => {
            let values: Vec<u64> = node.buffer.iter().map(|ct| decode(ct.as_bytes())).collect();
            assert!(
                values.len() <= fan_out || values.windows(2).all(|w| w[0] == w[1]),
                "query-path leaf over capacity: {values:?}"
            );
        }
        NodeKind::Internal(dir) => {
            let pivots: Vec<u64> = dir.pivots.iter().map(|ct| decode(ct.as_bytes())).collect();
            let i_lo = pivots.partition_point(|p| *p < lo);
            let i_hi = pivots.partition_point(|p| *p < hi);
            check_path_node(&dir.children[i_lo], fan_out, lo, hi);
            if i_hi != i_lo {
                check_path_node(&dir.children[i_hi], fan_out, lo, hi);
            }
        }
    }
}

/// Every decoded pivot installed anywhere in the tree, sorted.
pub(crate) fn pivot_values(tree: &Pope) -> Vec<u64> {
    let mut values = Vec::new();
    collect_pivots(tree.root(), &mut values);
    values.sort_unstable();
    values
}

fn collect_pivots(node: &Node, out: &mut Vec<u64>) {
    if let NodeKind::Internal(dir) = &node.kind {
        out.extend(dir.pivots.iter().map(|ct| decode(ct.as_bytes())));
        for child in &dir.children {
            collect_pivots(child, out);
        }
    }
}

/// Asserts that the tree stores exactly the given multiset of values.
pub(crate) fn assert_same_values(tree: &Pope, expected: &[u64]) {
    let mut stored: Vec<u64> = tree.iter().map(|ct| decode(ct.as_bytes())).collect();
    let mut expected = expected.to_vec();
    stored.sort_unstable();
    expected.sort_unstable();
    assert_eq!(stored, expected);
}

/// Runs a seeded mix of inserts and range queries against a mirror `Vec`,
/// checking answers and invariants as it goes.
pub(crate) fn run_random_workload<O: TestOracle>(fan_out: usize, num_operations: u32, seed: u64) {
    init_logger();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut tree = Pope::new(fan_out).unwrap();
    let mut oracle = O::fresh();
    let mut mirror: Vec<u64> = Vec::new();

    for _ in 0..num_operations {
        if mirror.is_empty() || rng.gen_bool(0.7) {
            let value = rng.gen_range(0u64..200);
            tree.insert(encode(value)).unwrap();
            mirror.push(value);
        } else {
            let a = rng.gen_range(0u64..200);
            let b = rng.gen_range(0u64..200);
            let (lo, hi) = (a.min(b), a.max(b));

            let results = tree.range(&encode(lo), &encode(hi), &mut oracle).unwrap();
            let mut answered: Vec<u64> =
                results.iter().map(|ct| decode(ct.as_bytes())).collect();
            answered.sort_unstable();
            let mut expected: Vec<u64> = mirror
                .iter()
                .copied()
                .filter(|v| (lo..=hi).contains(v))
                .collect();
            expected.sort_unstable();
            assert_eq!(answered, expected, "range [{lo}, {hi}] answered wrongly");

            check_tree(&tree);
            check_query_path(&tree, lo, hi);
        }
        assert_same_values(&tree, &mirror);
    }
    assert_eq!(tree.size(), mirror.len());
}

macro_rules! create_workload_tests_for_oracle_type {
    ($oracle_type: ident) => {
        paste::paste! {
            #[test]
            fn [<random_workload_ $oracle_type:snake _fan_out_1>]() {
                run_random_workload::<$oracle_type>(1, 120, 7);
            }

            #[test]
            fn [<random_workload_ $oracle_type:snake _fan_out_2>]() {
                run_random_workload::<$oracle_type>(2, 150, 11);
            }

            #[test]
            fn [<random_workload_ $oracle_type:snake _fan_out_4>]() {
                run_random_workload::<$oracle_type>(4, 200, 13);
            }

            #[test]
            fn [<random_workload_ $oracle_type:snake _fan_out_32>]() {
                run_random_workload::<$oracle_type>(32, 250, 17);
            }
        }
    };
}

pub(crate) use create_workload_tests_for_oracle_type;
