// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Comparison-oracle abstractions for the POPE server.
//!
//! The server holds no key and cannot order two ciphertexts on its own; every
//! ordering decision is delegated to an [`Oracle`] held by the key owner. The
//! trait requires only a pairwise [`Oracle::cmp`]; the batched
//! [`Oracle::sort`] and [`Oracle::partition`] entry points have correct
//! default implementations on top of `cmp` and exist so that a remote oracle
//! can amortize network round trips.

use crate::Ciphertext;
use duplicate::duplicate_item;
use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;

/// Transport-level failures produced by an oracle implementation.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The oracle could not be reached, or the connection dropped mid-call.
    #[error("comparison oracle unreachable: {0}")]
    Unreachable(String),
    /// The oracle answered with a truncated or undecodable response.
    #[error("malformed oracle response: {0}")]
    MalformedResponse(String),
}

/// Where a ciphertext lands relative to an ordered pivot list.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Placement {
    /// Strictly between pivots `i - 1` and `i` (with `-inf`/`+inf`
    /// sentinels), i.e. exactly `i` pivots compare strictly below the item.
    Interval(usize),
    /// Equal to pivot `i`.
    Pivot(usize),
}

/// The comparison capability the POPE server is built against.
///
/// Implementations take `&mut self` because a call may carry communication
/// state (a connection, transfer counters). The pivot list passed to
/// [`Oracle::partition`] must be strictly increasing in plaintext order;
/// the server only ever passes pivots it has previously installed.
pub trait Oracle {
    /// Compares the plaintexts of two ciphertexts.
    fn cmp(&mut self, a: &Ciphertext, b: &Ciphertext) -> Result<Ordering, OracleError>;

    /// Orders a multiset of ciphertexts by plaintext, preserving the relative
    /// order of equal elements.
    fn sort(&mut self, items: Vec<Ciphertext>) -> Result<Vec<Ciphertext>, OracleError> {
        merge_sort(items, &mut |a, b| self.cmp(a, b))
    }

    /// Places each item relative to a strictly increasing pivot list.
    fn partition(
        &mut self,
        items: &[Ciphertext],
        pivots: &[Ciphertext],
    ) -> Result<Vec<Placement>, OracleError> {
        let mut placements = Vec::with_capacity(items.len());
        for item in items {
            placements.push(place(item, pivots, &mut |a, b| self.cmp(a, b))?);
        }
        Ok(placements)
    }
}

#[duplicate_item(
    oracle_generics            oracle_ref;
    [ 'a, O: Oracle + ?Sized ] [ &'a mut O ];
    [ O: Oracle + ?Sized ]     [ Box<O> ];
)]
impl<oracle_generics> Oracle for oracle_ref {
    fn cmp(&mut self, a: &Ciphertext, b: &Ciphertext) -> Result<Ordering, OracleError> {
        (**self).cmp(a, b)
    }

    fn sort(&mut self, items: Vec<Ciphertext>) -> Result<Vec<Ciphertext>, OracleError> {
        (**self).sort(items)
    }

    fn partition(
        &mut self,
        items: &[Ciphertext],
        pivots: &[Ciphertext],
    ) -> Result<Vec<Placement>, OracleError> {
        (**self).partition(items, pivots)
    }
}

/// Stable, fallible merge sort; every comparison goes through `cmp` so that a
/// transport failure aborts cleanly.
fn merge_sort<F>(mut items: Vec<Ciphertext>, cmp: &mut F) -> Result<Vec<Ciphertext>, OracleError>
where
    F: FnMut(&Ciphertext, &Ciphertext) -> Result<Ordering, OracleError>,
{
    let n = items.len();
    if n <= 1 {
        return Ok(items);
    }
    let tail = items.split_off(n / 2);
    let left = merge_sort(items, cmp)?;
    let right = merge_sort(tail, cmp)?;

    let mut merged = Vec::with_capacity(n);
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => cmp(l, r)? == Ordering::Greater,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        let next = if take_right { right.next() } else { left.next() };
        merged.extend(next);
    }
    Ok(merged)
}

/// Binary search of one item against a strictly increasing pivot list.
fn place<F>(
    item: &Ciphertext,
    pivots: &[Ciphertext],
    cmp: &mut F,
) -> Result<Placement, OracleError>
where
    F: FnMut(&Ciphertext, &Ciphertext) -> Result<Ordering, OracleError>,
{
    let (mut lo, mut hi) = (0, pivots.len());
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match cmp(item, &pivots[mid])? {
            Ordering::Less => hi = mid,
            Ordering::Equal => return Ok(Placement::Pivot(mid)),
            Ordering::Greater => lo = mid + 1,
        }
    }
    Ok(Placement::Interval(lo))
}

/// A comparison oracle co-located with the key holder.
///
/// Decodes each ciphertext with the supplied decoder and compares the
/// resulting plaintexts directly. The batched entry points decode every
/// ciphertext exactly once.
pub struct LocalOracle<K, D> {
    decode: D,
    _plaintext: PhantomData<K>,
}

impl<K: Ord, D: FnMut(&[u8]) -> K> LocalOracle<K, D> {
    /// Creates an oracle around the key holder's decoding function.
    pub fn new(decode: D) -> Self {
        Self {
            decode,
            _plaintext: PhantomData,
        }
    }
}

impl<K: Ord, D: FnMut(&[u8]) -> K> Oracle for LocalOracle<K, D> {
    fn cmp(&mut self, a: &Ciphertext, b: &Ciphertext) -> Result<Ordering, OracleError> {
        Ok((self.decode)(a.as_bytes()).cmp(&(self.decode)(b.as_bytes())))
    }

    fn sort(&mut self, items: Vec<Ciphertext>) -> Result<Vec<Ciphertext>, OracleError> {
        let mut keyed: Vec<(K, Ciphertext)> = items
            .into_iter()
            .map(|ct| ((self.decode)(ct.as_bytes()), ct))
            .collect();
        keyed.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(keyed.into_iter().map(|(_, ct)| ct).collect())
    }

    fn partition(
        &mut self,
        items: &[Ciphertext],
        pivots: &[Ciphertext],
    ) -> Result<Vec<Placement>, OracleError> {
        let boundaries: Vec<K> = pivots.iter().map(|p| (self.decode)(p.as_bytes())).collect();
        debug_assert!(boundaries.windows(2).all(|w| w[0] < w[1]));
        let mut placements = Vec::with_capacity(items.len());
        for item in items {
            let key = (self.decode)(item.as_bytes());
            placements.push(match boundaries.binary_search_by(|probe| probe.cmp(&key)) {
                Ok(index) => Placement::Pivot(index),
                Err(index) => Placement::Interval(index),
            });
        }
        Ok(placements)
    }
}

impl<K, D> fmt::Debug for LocalOracle<K, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalOracle").finish_non_exhaustive()
    }
}

/// A delegating oracle that tallies communication with the key holder.
///
/// Counts one round per call plus the ciphertexts shipped in each direction,
/// so callers can watch the server amortize oracle work across queries.
#[derive(Debug)]
pub struct CountingOracle<O> {
    inner: O,
    rounds: u64,
    items_sent: u64,
    items_received: u64,
}

impl<O> CountingOracle<O> {
    /// Wraps `inner`, starting all tallies at zero.
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            rounds: 0,
            items_sent: 0,
            items_received: 0,
        }
    }

    /// The number of oracle calls made so far.
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Total ciphertexts shipped from the server to the oracle.
    pub fn items_sent(&self) -> u64 {
        self.items_sent
    }

    /// Total answers shipped back from the oracle to the server.
    pub fn items_received(&self) -> u64 {
        self.items_received
    }

    /// Resets every tally to zero.
    pub fn reset(&mut self) {
        self.rounds = 0;
        self.items_sent = 0;
        self.items_received = 0;
    }

    /// Consumes the wrapper, returning the inner oracle.
    pub fn into_inner(self) -> O {
        self.inner
    }
}

impl<O: Oracle> Oracle for CountingOracle<O> {
    fn cmp(&mut self, a: &Ciphertext, b: &Ciphertext) -> Result<Ordering, OracleError> {
        self.rounds += 1;
        self.items_sent += 2;
        self.items_received += 1;
        self.inner.cmp(a, b)
    }

    fn sort(&mut self, items: Vec<Ciphertext>) -> Result<Vec<Ciphertext>, OracleError> {
        self.rounds += 1;
        self.items_sent += items.len() as u64;
        self.items_received += items.len() as u64;
        self.inner.sort(items)
    }

    fn partition(
        &mut self,
        items: &[Ciphertext],
        pivots: &[Ciphertext],
    ) -> Result<Vec<Placement>, OracleError> {
        self.rounds += 1;
        self.items_sent += (items.len() + pivots.len()) as u64;
        self.items_received += items.len() as u64;
        self.inner.partition(items, pivots)
    }
}
