// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The POPE tree: a buffer tree over opaque ciphertexts that reveals order to
//! the server only as range queries demand it.

use crate::node::{subtree_from_chunks, Node, NodeKind};
use crate::oracle::{Oracle, Placement};
use crate::{Ciphertext, FanOut, PopeError};
use std::cmp::Ordering;

/// The server-side POPE data structure.
///
/// Insertions append to the root's buffer and never touch the oracle. A range
/// query walks from the root toward the queried interval, flushing each
/// buffer it crosses down one level (a bulk oracle partition against the
/// node's pivots) and promoting any oversized leaf it lands on into an
/// internal node (one bulk oracle sort). Regions no query has visited keep
/// their ciphertexts pooled in unsorted buffers.
///
/// The oracle capability is passed into each query by mutable reference; the
/// tree itself holds no key material and no connection state.
#[derive(Debug)]
pub struct Pope {
    root: Node,
    fan_out: FanOut,
}

/// Aggregate shape statistics for a [`Pope`] tree.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TreeStats {
    /// Total nodes, internal and leaf.
    pub nodes: usize,
    /// Leaf nodes.
    pub leaves: usize,
    /// Ciphertexts held in buffers; every stored ciphertext lives in one.
    pub buffered: usize,
    /// Installed pivots: the amount of order revealed to the server so far.
    pub pivots: usize,
    /// Longest root-to-leaf path; 0 while the root is still a leaf.
    pub height: usize,
}

impl Pope {
    /// Creates an empty tree with the given fan-out `L`: the leaf capacity
    /// and the maximum pivot count of an internal node.
    pub fn new(fan_out: FanOut) -> Result<Self, PopeError> {
        if fan_out == 0 {
            return Err(PopeError::InvalidConfiguration);
        }
        log::info!("Pope::new(fan_out = {fan_out})");
        Ok(Self {
            root: Node::new_leaf(),
            fan_out,
        })
    }

    /// The fan-out fixed at construction.
    pub fn fan_out(&self) -> FanOut {
        self.fan_out
    }

    /// Stores a ciphertext. Constant time, no oracle interaction: the
    /// ciphertext is appended to the root's buffer and descends only when a
    /// later query forces it down.
    pub fn insert(&mut self, ct: Ciphertext) -> Result<(), PopeError> {
        if ct.is_empty() {
            return Err(PopeError::EmptyCiphertext);
        }
        log::trace!("buffering one ciphertext at the root");
        self.root.buffer.push(ct);
        Ok(())
    }

    /// Returns every stored ciphertext whose plaintext lies in the closed
    /// interval `[low, high]`, consulting `oracle` for ordering decisions.
    ///
    /// On an oracle failure the query is abandoned with no partial result;
    /// any flushing or promotion already performed is a strict refinement
    /// that leaves the tree consistent and usable.
    pub fn range<O: Oracle>(
        &mut self,
        low: &Ciphertext,
        high: &Ciphertext,
        oracle: &mut O,
    ) -> Result<Vec<Ciphertext>, PopeError> {
        if low.is_empty() || high.is_empty() {
            return Err(PopeError::EmptyCiphertext);
        }
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let bounds = match oracle.cmp(low, high)? {
            Ordering::Greater => return Ok(Vec::new()),
            Ordering::Equal => vec![low.clone()],
            Ordering::Less => vec![low.clone(), high.clone()],
        };
        let mut results = Vec::new();
        Self::descend(&mut self.root, self.fan_out, &bounds, oracle, &mut results)?;
        log::debug!("range query returned {} ciphertexts", results.len());
        Ok(results)
    }

    /// The number of ciphertexts stored, computed by walking the tree.
    pub fn size(&self) -> usize {
        self.root.size()
    }

    /// Whether the tree stores nothing. Nothing is ever removed, so an
    /// internal root implies a non-empty tree.
    pub fn is_empty(&self) -> bool {
        self.root.is_leaf() && self.root.buffer.is_empty()
    }

    /// Longest root-to-leaf path; 0 while the root is still a leaf.
    pub fn height(&self) -> usize {
        self.root.height()
    }

    /// Total node count, internal and leaf.
    pub fn num_nodes(&self) -> usize {
        self.root.num_nodes()
    }

    /// Shape statistics for the whole tree.
    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        self.root.gather_stats(0, &mut stats);
        stats
    }

    /// Iterates over every stored ciphertext, in unspecified order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            front: Default::default(),
            stack: vec![&self.root],
        }
    }

    #[cfg(test)]
    pub(crate) fn root(&self) -> &Node {
        &self.root
    }

    /// One step of the range walk. Promotes an oversized leaf first, so the
    /// remainder of the step only ever sees a small leaf or an internal node.
    fn descend<O: Oracle>(
        node: &mut Node,
        fan_out: FanOut,
        bounds: &[Ciphertext],
        oracle: &mut O,
        out: &mut Vec<Ciphertext>,
    ) -> Result<(), PopeError> {
        if node.is_leaf() {
            if node.buffer.len() > fan_out {
                Self::promote_leaf(node, fan_out, oracle)?;
            }
            if node.is_leaf() {
                return Self::filter_leaf(&node.buffer, bounds, oracle, out);
            }
        }

        Self::flush(node, oracle)?;

        let dir = match &mut node.kind {
            NodeKind::Internal(dir) => dir,
            NodeKind::Leaf => return Ok(()),
        };

        let i_lo = Self::bisect(&dir.pivots, &bounds[0], oracle)?;
        let i_hi = if bounds.len() == 1 {
            i_lo
        } else {
            Self::bisect(&dir.pivots, &bounds[bounds.len() - 1], oracle)?
        };

        // Children strictly between the two boundary slots are entirely
        // in-range: collect them wholesale, without refining them.
        if i_lo + 1 < i_hi {
            for child in &dir.children[i_lo + 1..i_hi] {
                child.collect_into(out);
            }
        }

        Self::descend(&mut dir.children[i_lo], fan_out, bounds, oracle, out)?;
        if i_hi != i_lo {
            Self::descend(&mut dir.children[i_hi], fan_out, bounds, oracle, out)?;
        }
        Ok(())
    }

    /// Pushes an internal node's buffered ciphertexts down into its children
    /// with one bulk partition. Placements are validated in full before the
    /// first ciphertext moves, so a bad response mutates nothing.
    fn flush<O: Oracle>(node: &mut Node, oracle: &mut O) -> Result<(), PopeError> {
        let Node { buffer, kind } = node;
        let dir = match kind {
            NodeKind::Internal(dir) => dir,
            NodeKind::Leaf => return Ok(()),
        };
        if buffer.is_empty() {
            return Ok(());
        }

        let placements = oracle.partition(buffer, &dir.pivots)?;
        if placements.len() != buffer.len() {
            return Err(PopeError::InconsistentOracle);
        }
        let fence_count = dir.pivots.len();
        for placement in &placements {
            let in_bounds = match placement {
                Placement::Interval(i) => *i <= fence_count,
                Placement::Pivot(j) => *j < fence_count,
            };
            if !in_bounds {
                return Err(PopeError::InconsistentOracle);
            }
        }

        log::trace!(
            "flushing {} buffered ciphertexts across {} pivots",
            buffer.len(),
            fence_count
        );
        for (ct, placement) in buffer.drain(..).zip(placements) {
            let slot = match placement {
                Placement::Interval(i) => i,
                // Ciphertexts equal to a pivot ride with the child to the
                // pivot's left.
                Placement::Pivot(j) => j,
            };
            dir.children[slot].buffer.push(ct);
        }
        Ok(())
    }

    /// Index of the first pivot not below `key`: the number of pivots whose
    /// plaintext is strictly less than it.
    fn bisect<O: Oracle>(
        pivots: &[Ciphertext],
        key: &Ciphertext,
        oracle: &mut O,
    ) -> Result<usize, PopeError> {
        let (mut lo, mut hi) = (0, pivots.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if oracle.cmp(&pivots[mid], key)? == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    /// Emits the in-range ciphertexts of a small leaf with one bulk
    /// partition against the query bounds. The buffer itself stays unsorted.
    fn filter_leaf<O: Oracle>(
        buffer: &[Ciphertext],
        bounds: &[Ciphertext],
        oracle: &mut O,
        out: &mut Vec<Ciphertext>,
    ) -> Result<(), PopeError> {
        if buffer.is_empty() {
            return Ok(());
        }
        let placements = oracle.partition(buffer, bounds)?;
        if placements.len() != buffer.len() {
            return Err(PopeError::InconsistentOracle);
        }
        for (ct, placement) in buffer.iter().zip(placements) {
            let in_range = match placement {
                // The interval is closed: equality with either bound counts.
                Placement::Pivot(j) if j < bounds.len() => true,
                Placement::Interval(i) if i <= bounds.len() => bounds.len() == 2 && i == 1,
                _ => return Err(PopeError::InconsistentOracle),
            };
            if in_range {
                out.push(ct.clone());
            }
        }
        Ok(())
    }

    /// Converts an oversized leaf into an internal node, in place.
    ///
    /// One bulk oracle sort orders the whole buffer; the sorted sequence is
    /// then carved into chunks of at most `fan_out` elements and rebuilt into
    /// a subtree with no further oracle calls. A leaf holding a single run of
    /// oracle-equal ciphertexts cannot be split and is left alone.
    fn promote_leaf<O: Oracle>(
        node: &mut Node,
        fan_out: FanOut,
        oracle: &mut O,
    ) -> Result<(), PopeError> {
        debug_assert!(node.is_leaf() && node.buffer.len() > fan_out);
        let sorted = oracle.sort(node.buffer.clone())?;
        if !is_permutation(&node.buffer, &sorted) {
            return Err(PopeError::InconsistentOracle);
        }
        let chunks = Self::carve_chunks(&sorted, fan_out, oracle)?;
        if chunks.len() == 1 {
            return Ok(());
        }
        log::debug!(
            "promoting a leaf of {} ciphertexts into {} chunks",
            sorted.len(),
            chunks.len()
        );
        *node = subtree_from_chunks(chunks, fan_out);
        Ok(())
    }

    /// Carves an oracle-sorted sequence into chunks of at most `fan_out`
    /// elements whose boundaries never separate oracle-equal neighbors: a
    /// boundary landing inside an equality run retracts to the run's start,
    /// or swallows the whole run when the run begins the chunk. The last
    /// element of each chunk therefore compares strictly below its successor
    /// chunk, which makes the derived pivots strictly increasing.
    fn carve_chunks<O: Oracle>(
        sorted: &[Ciphertext],
        fan_out: FanOut,
        oracle: &mut O,
    ) -> Result<Vec<Vec<Ciphertext>>, PopeError> {
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < sorted.len() {
            let mut end = usize::min(start + fan_out, sorted.len());
            if end < sorted.len()
                && oracle.cmp(&sorted[end - 1], &sorted[end])? == Ordering::Equal
            {
                let mut run_start = end - 1;
                while run_start > start
                    && oracle.cmp(&sorted[run_start - 1], &sorted[run_start])? == Ordering::Equal
                {
                    run_start -= 1;
                }
                if run_start > start {
                    end = run_start;
                } else {
                    while end < sorted.len()
                        && oracle.cmp(&sorted[end - 1], &sorted[end])? == Ordering::Equal
                    {
                        end += 1;
                    }
                }
            }
            chunks.push(sorted[start..end].to_vec());
            start = end;
        }
        Ok(chunks)
    }
}

/// Byte-level multiset equality, used to validate that a sort response is a
/// permutation of the request.
fn is_permutation(a: &[Ciphertext], b: &[Ciphertext]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a_bytes: Vec<&[u8]> = a.iter().map(Ciphertext::as_bytes).collect();
    let mut b_bytes: Vec<&[u8]> = b.iter().map(Ciphertext::as_bytes).collect();
    a_bytes.sort_unstable();
    b_bytes.sort_unstable();
    a_bytes == b_bytes
}

/// Borrowed iterator over every ciphertext in a [`Pope`] tree, in
/// unspecified order.
#[derive(Debug)]
pub struct Iter<'a> {
    front: std::slice::Iter<'a, Ciphertext>,
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Ciphertext;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(ct) = self.front.next() {
                return Some(ct);
            }
            let node = self.stack.pop()?;
            self.front = node.buffer.iter();
            if let NodeKind::Internal(dir) = &node.kind {
                self.stack.extend(dir.children.iter());
            }
        }
    }
}

impl<'a> IntoIterator for &'a Pope {
    type Item = &'a Ciphertext;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
