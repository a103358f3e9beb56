// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A server-side implementation of Partial Order Preserving Encryption (POPE).
//!
//! A [`Pope`] tree stores opaque ciphertexts on behalf of a client and answers
//! encrypted range queries, consulting an external comparison [`Oracle`]
//! (co-located with the key holder) for every ordering decision. Insertions
//! are buffered and cost nothing; order is revealed to the server only where
//! range queries have demanded it, so heavily queried regions of the key space
//! become refined while untouched regions stay bulk-unsorted.
//!
//! The construction follows the POPE scheme of Roche, Apon, Choi and
//! Yerukhimovich (<https://eprint.iacr.org/2015/1106>).

#![warn(clippy::cargo, clippy::doc_markdown, missing_docs, rustdoc::all)]

use thiserror::Error;

/// The numeric type used for the tree's fan-out parameter: the leaf capacity
/// and the maximum number of pivots held by one internal node.
pub type FanOut = usize;

/// Errors arising from POPE server operations.
#[derive(Debug, Error)]
pub enum PopeError {
    /// The caller supplied an empty ciphertext.
    #[error("ciphertexts must be non-empty")]
    EmptyCiphertext,
    /// The fan-out parameter was rejected at construction.
    #[error("fan-out must be at least 1")]
    InvalidConfiguration,
    /// The comparison oracle could not be reached or failed mid-call.
    #[error("oracle failure: {0}")]
    Oracle(#[from] oracle::OracleError),
    /// The oracle's answers contradict order information it revealed earlier.
    #[error("oracle response contradicts previously revealed order")]
    InconsistentOracle,
}

mod ciphertext;
mod node;
pub mod oracle;
mod pope;

pub use ciphertext::Ciphertext;
pub use oracle::{CountingOracle, LocalOracle, Oracle, OracleError, Placement};
pub use pope::{Iter, Pope, TreeStats};

#[cfg(test)]
mod proptests;
#[cfg(test)]
mod test_utils;
