// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A simple interactive demonstration of a POPE tree.

use pope::{Ciphertext, LocalOracle, Pope};
use rustyline::DefaultEditor;

fn encode(value: u64) -> Ciphertext {
    Ciphertext::new(value.to_be_bytes().to_vec())
}

fn decode(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw[..bytes.len().min(8)].copy_from_slice(&bytes[..bytes.len().min(8)]);
    u64::from_be_bytes(raw)
}

fn parse_u64(
    prompt: &str,
    rl: &mut DefaultEditor,
) -> Result<u64, Box<dyn std::error::Error>> {
    Ok(loop {
        println!("{}", prompt);
        let readline: String = rl.readline("> ")?;
        match readline.trim().parse::<u64>() {
            Ok(number) => break number,
            Err(_) => {
                println!("Expected a u64. Try again.");
                continue;
            }
        }
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut rl = DefaultEditor::new()?;
    let mut oracle = LocalOracle::new(decode as fn(&[u8]) -> u64);

    println!("In this example, we interact with a POPE tree storing u64 keys.");
    let fan_out = parse_u64("Pick a fan-out (leaf capacity):", &mut rl)? as usize;
    let mut tree = Pope::new(fan_out.max(1))?;

    loop {
        let action = loop {
            println!("Enter an option (i, r or s):");
            println!("i) Insert");
            println!("r) Range query");
            println!("s) Stats");
            let action: String = rl.readline("> ")?;
            let action = action.trim().to_string();
            if (action != "i") & (action != "r") & (action != "s") {
                println!("Try again.");
                continue;
            }
            break action;
        };

        if action == "i" {
            let value = parse_u64("Value to insert?", &mut rl)?;
            tree.insert(encode(value))?;
            println!("Buffered {} at the root.", value);
        }

        if action == "r" {
            let low = parse_u64("Low end of the range?", &mut rl)?;
            let high = parse_u64("High end of the range?", &mut rl)?;
            let matches = tree.range(&encode(low), &encode(high), &mut oracle)?;
            let mut values: Vec<u64> = matches.iter().map(|ct| decode(ct.as_bytes())).collect();
            values.sort_unstable();
            println!("{} matches: {:?}", values.len(), values);
        }

        if action == "s" {
            println!("{:?}", tree.stats());
        }
    }
}
