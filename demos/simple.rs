// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A very simple demonstration of a POPE tree with an in-process oracle.

extern crate pope;

use pope::{Ciphertext, LocalOracle, Pope, PopeError};

fn encode(value: u64) -> Ciphertext {
    Ciphertext::new(value.to_be_bytes().to_vec())
}

fn decode(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw[..bytes.len().min(8)].copy_from_slice(&bytes[..bytes.len().min(8)]);
    u64::from_be_bytes(raw)
}

fn main() -> Result<(), PopeError> {
    let mut tree = Pope::new(4)?;
    for value in [83, 17, 5, 91, 42, 42, 63, 8] {
        tree.insert(encode(value))?;
    }

    let mut oracle = LocalOracle::new(decode as fn(&[u8]) -> u64);
    let matches = tree.range(&encode(10), &encode(60), &mut oracle)?;
    let mut values: Vec<u64> = matches.iter().map(|ct| decode(ct.as_bytes())).collect();
    values.sort_unstable();
    println!("{values:?}");
    Ok(())
}
