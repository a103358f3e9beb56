// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The leaf/internal node variant making up a POPE tree.

use crate::pope::TreeStats;
use crate::Ciphertext;

/// One node of the tree. Every node owns an unsorted buffer of ciphertexts
/// that have not yet been pushed further down.
#[derive(Debug)]
pub(crate) struct Node {
    /// Unordered multiset of ciphertexts awaiting downward placement.
    pub(crate) buffer: Vec<Ciphertext>,
    pub(crate) kind: NodeKind,
}

#[derive(Debug)]
pub(crate) enum NodeKind {
    Leaf,
    Internal(Directory),
}

/// Pivots and child slots of an internal node, kept as a single record so the
/// `children.len() == pivots.len() + 1` invariant is structural.
///
/// Child `i` covers the half-open plaintext interval `(pivots[i - 1],
/// pivots[i]]`, with infinite sentinels at both ends; ciphertexts equal to a
/// pivot always ride with the child to the pivot's left.
#[derive(Debug)]
pub(crate) struct Directory {
    pub(crate) pivots: Vec<Ciphertext>,
    pub(crate) children: Vec<Node>,
}

impl Directory {
    pub(crate) fn new(pivots: Vec<Ciphertext>, children: Vec<Node>) -> Self {
        debug_assert_eq!(children.len(), pivots.len() + 1);
        debug_assert!(!pivots.is_empty());
        Self { pivots, children }
    }
}

impl Node {
    pub(crate) fn new_leaf() -> Self {
        Self {
            buffer: Vec::new(),
            kind: NodeKind::Leaf,
        }
    }

    pub(crate) fn leaf_with_buffer(buffer: Vec<Ciphertext>) -> Self {
        Self {
            buffer,
            kind: NodeKind::Leaf,
        }
    }

    pub(crate) fn internal(directory: Directory) -> Self {
        Self {
            buffer: Vec::new(),
            kind: NodeKind::Internal(directory),
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf)
    }

    /// Total ciphertexts stored in this subtree.
    pub(crate) fn size(&self) -> usize {
        let mut total = self.buffer.len();
        if let NodeKind::Internal(dir) = &self.kind {
            total += dir.children.iter().map(Node::size).sum::<usize>();
        }
        total
    }

    /// Longest downward path from this node; 0 for a leaf. Children promoted
    /// at different times may sit at different depths.
    pub(crate) fn height(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf => 0,
            NodeKind::Internal(dir) => {
                1 + dir
                    .children
                    .iter()
                    .map(Node::height)
                    .max()
                    .unwrap_or_default()
            }
        }
    }

    pub(crate) fn num_nodes(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf => 1,
            NodeKind::Internal(dir) => {
                1 + dir.children.iter().map(Node::num_nodes).sum::<usize>()
            }
        }
    }

    /// Clones every ciphertext stored in this subtree into `out`.
    pub(crate) fn collect_into(&self, out: &mut Vec<Ciphertext>) {
        out.extend(self.buffer.iter().cloned());
        if let NodeKind::Internal(dir) = &self.kind {
            for child in &dir.children {
                child.collect_into(out);
            }
        }
    }

    pub(crate) fn gather_stats(&self, depth: usize, stats: &mut TreeStats) {
        stats.nodes += 1;
        stats.buffered += self.buffer.len();
        stats.height = stats.height.max(depth);
        match &self.kind {
            NodeKind::Leaf => stats.leaves += 1,
            NodeKind::Internal(dir) => {
                stats.pivots += dir.pivots.len();
                for child in &dir.children {
                    child.gather_stats(depth + 1, stats);
                }
            }
        }
    }
}

/// Builds a subtree from consecutive chunks of an oracle-sorted sequence,
/// with no further oracle interaction.
///
/// The boundary between two adjacent chunks is the last element of the
/// earlier chunk, which becomes the pivot separating them; the caller
/// guarantees that boundaries never fall inside a run of oracle-equal
/// elements, so the derived pivots are strictly increasing. Internal nodes
/// take at most `fan_out` pivots (`fan_out + 1` children) per level.
pub(crate) fn subtree_from_chunks(mut chunks: Vec<Vec<Ciphertext>>, fan_out: usize) -> Node {
    debug_assert!(!chunks.is_empty());
    debug_assert!(chunks.iter().all(|chunk| !chunk.is_empty()));
    if chunks.len() == 1 {
        let only = chunks.pop().unwrap_or_default();
        return Node::leaf_with_buffer(only);
    }

    let mut separators: Vec<Ciphertext> = chunks[..chunks.len() - 1]
        .iter()
        .map(|chunk| chunk.last().cloned().unwrap_or_default())
        .collect();
    let mut nodes: Vec<Node> = chunks.into_iter().map(Node::leaf_with_buffer).collect();

    while nodes.len() > 1 {
        debug_assert_eq!(separators.len(), nodes.len() - 1);
        let mut next_nodes = Vec::new();
        let mut next_separators = Vec::new();
        let mut group_children: Vec<Node> = Vec::new();
        let mut group_pivots: Vec<Ciphertext> = Vec::new();

        let mut separators_iter = separators.into_iter();
        for node in nodes {
            group_children.push(node);
            match separators_iter.next() {
                Some(separator) => {
                    if group_children.len() == fan_out + 1 {
                        next_nodes.push(close_group(group_children, group_pivots));
                        next_separators.push(separator);
                        group_children = Vec::new();
                        group_pivots = Vec::new();
                    } else {
                        group_pivots.push(separator);
                    }
                }
                None => break,
            }
        }
        next_nodes.push(close_group(group_children, group_pivots));

        nodes = next_nodes;
        separators = next_separators;
    }

    nodes.pop().unwrap_or_else(Node::new_leaf)
}

/// A group of one node needs no wrapping; anything larger becomes an
/// internal node over its members.
fn close_group(mut children: Vec<Node>, pivots: Vec<Ciphertext>) -> Node {
    if pivots.is_empty() {
        debug_assert_eq!(children.len(), 1);
        return children.pop().unwrap_or_else(Node::new_leaf);
    }
    Node::internal(Directory::new(pivots, children))
}
