//! An efficiently-updatable double-array trie over byte-string keys.
//!
//! This crate provides [`Trie`], an in-memory key-to-value map supporting
//! incremental insertion and deletion, exact-match lookup, common-prefix
//! search, predictive enumeration, and a persistent on-disk image. The trie
//! is stored in two parallel integer arrays with the property that the
//! transition from node `p` on label `l` lands at `base[p] ^ l`, validated by
//! `check[base[p] ^ l] == p`. Unused slots are threaded into per-block empty
//! rings so that insertion can relocate a colliding family with minimal
//! perturbation.
//!
//! Values are 4-byte numerics ([`Value`]: `i32` or `f32`) stored in-band in
//! the node array. Lookup misses are reported through two sentinels,
//! [`Value::NO_VALUE`] (prefix exists, no value) and [`Value::NO_PATH`]
//! (no such prefix).
//!
//! # Quick start
//!
//! ```
//! use xortrie::Trie;
//!
//! let mut trie = Trie::new();
//! trie.update(b"cat", 1);
//! trie.update(b"car", 2);
//! trie.update(b"cart", 3);
//!
//! assert_eq!(trie.exact_match(b"cat"), 1);
//! assert_eq!(trie.exact_match(b"ca"), -1);  // prefix only: NO_VALUE
//! assert_eq!(trie.exact_match(b"cab"), -2); // no such path: NO_PATH
//!
//! let hits: Vec<_> = trie.common_prefix_search(b"carts").collect();
//! assert_eq!(hits.len(), 2); // "car", "cart"
//! assert!(trie.erase(b"car"));
//! ```
//!
//! # Concurrency
//!
//! A `Trie` is a plain owned structure (`Send`); it performs no internal
//! synchronization. Concurrent read-only queries are safe as long as no
//! writer runs; callers needing concurrent mutation wrap the handle in a
//! lock with writers exclusive.

mod alloc;
mod block;
mod insert;
mod node;
mod predict;
#[cfg(test)]
mod proptests;
mod search;
mod serial;
mod trie_ref;
mod value;
mod view;

use std::marker::PhantomData;

use thiserror::Error;

use crate::block::Block;
pub use crate::node::{Node, NodeInfo};
pub use crate::predict::PredictIter;
pub use crate::search::{CommonPrefixIter, Match};
pub use crate::trie_ref::TrieRef;
pub use crate::value::Value;

/// Errors surfaced by [`Trie::save`], [`Trie::open`], and
/// [`TrieRef::from_bytes`].
///
/// Lookup misses are not errors; they are reported through the
/// [`Value::NO_VALUE`] / [`Value::NO_PATH`] sentinels. Invariant violations
/// and exceeding the configured memory cap panic instead: the structure's
/// invariants span several arrays and a half-applied mutation cannot be
/// resumed.
#[derive(Debug, Error)]
pub enum TrieError {
    /// An underlying I/O operation failed.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    /// The image length is not a whole number of 256-slot blocks.
    #[error("image of {0} bytes is not a whole number of 256-slot blocks")]
    InvalidImage(u64),
    /// A borrowed buffer is not aligned for node records.
    #[error("buffer is not aligned for node records")]
    Misaligned,
    /// The image or sidecar is shorter than its own bookkeeping claims.
    #[error("truncated or corrupted image")]
    Truncated,
}

/// An efficiently-updatable double-array trie mapping byte strings to
/// 4-byte numeric values.
///
/// See the [crate docs](crate) for an overview of the slot layout. Addresses
/// are partitioned into 256-slot blocks; block 0 holds only the root and is
/// never allocated from.
#[derive(Clone, Debug)]
pub struct Trie<V: Value = i32> {
    pub(crate) nodes: Vec<Node>,
    pub(crate) infos: Vec<NodeInfo>,
    pub(crate) blocks: Vec<Block>,
    /// Per-occupancy lower bound on family sizes known to be unplaceable.
    pub(crate) reject: [i16; 257],
    pub(crate) head_full: i32,
    pub(crate) head_closed: i32,
    pub(crate) head_open: i32,
    /// Slots in use; always a multiple of 256 and at most `nodes.len()`.
    pub(crate) size: usize,
    /// Byte budget across all three arrays; 0 means unlimited.
    pub(crate) max_alloc: usize,
    /// Caller-pinned slot addresses, rewritten in place on relocation.
    pub(crate) tracked: Vec<usize>,
    pub(crate) _value: PhantomData<V>,
}

impl<V: Value> Trie<V> {
    /// Creates an empty trie: block 0 installed, the root at slot 0, and
    /// slots 1..=255 threaded into block 0's empty ring.
    pub fn new() -> Self {
        let mut nodes = vec![Node::default(); 256];
        nodes[0] = Node::new(-1, -1);
        for i in 1..256i32 {
            nodes[i as usize] = Node::new(
                if i == 1 { -255 } else { -(i - 1) },
                if i == 255 { -1 } else { -(i + 1) },
            );
        }
        let mut blocks = vec![Block::default()];
        blocks[0].ehead = 1;
        blocks[0].num = 255; // the root occupies slot 0

        let mut reject = [0i16; 257];
        for (num, r) in reject.iter_mut().enumerate() {
            *r = num as i16 + 1;
        }

        Self {
            nodes,
            infos: vec![NodeInfo::default(); 256],
            blocks,
            reject,
            head_full: 0,
            head_closed: 0,
            head_open: 0,
            size: 256,
            max_alloc: 0,
            tracked: Vec::new(),
            _value: PhantomData,
        }
    }

    /// Number of slots in use (a multiple of 256).
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of slots allocated.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Bytes occupied by the node array for the slots in use.
    #[inline]
    pub fn total_size(&self) -> usize {
        self.size * std::mem::size_of::<Node>()
    }

    /// Bytes per slot of the node array.
    #[inline]
    pub fn unit_size(&self) -> usize {
        std::mem::size_of::<Node>()
    }

    /// Number of live (non-empty) slots, the root excluded.
    pub fn nonzero_size(&self) -> usize {
        self.nodes[..self.size]
            .iter()
            .filter(|n| n.check >= 0)
            .count()
    }

    /// Number of keys currently stored.
    ///
    /// A slot holds a key's value iff it is the label-0 child of its parent
    /// and that parent is not the root (the root's label-0 child, when
    /// present, is the interior node for keys starting with byte `0x00`).
    pub fn num_keys(&self) -> usize {
        (0..self.size)
            .filter(|&to| {
                let parent = self.nodes[to].check;
                parent > 0 && self.nodes[parent as usize].base == to as i32
            })
            .count()
    }

    /// Caps the total byte budget of the three arrays. Growth beyond the cap
    /// panics. `0` removes the cap.
    pub fn set_max_alloc(&mut self, bytes: usize) {
        self.max_alloc = bytes;
    }

    /// Pins slot addresses so that relocations rewrite them in place.
    ///
    /// Use this for cursors (e.g. from [`Trie::traverse`]) held across
    /// updates; a pinned address is updated whenever the slot it names is
    /// moved by conflict resolution.
    pub fn set_tracked_slots(&mut self, slots: &[usize]) {
        self.tracked = slots.to_vec();
    }

    /// The pinned slot addresses, as rewritten by relocations.
    pub fn tracked_slots(&self) -> &[usize] {
        &self.tracked
    }

    /// Checks every structural invariant, panicking on the first violation:
    /// parent/child address consistency, strictly ascending sibling chains,
    /// per-block empty counts, and closure of every empty ring.
    ///
    /// Requires the info and block arrays (call [`Trie::restore`] first after
    /// a bare [`Trie::open`]).
    pub fn validate(&self) {
        assert!(self.infos.len() >= self.size, "info array not restored");
        assert!(self.blocks.len() >= self.size >> 8, "block array not restored");
        if self.nodes[0].base >= 0 {
            self.validate_node(0);
        }
        for bi in 0..(self.size >> 8) {
            let lo = bi << 8;
            let empties = (lo..lo + 256)
                .filter(|&i| i != 0 && self.nodes[i].check < 0)
                .count();
            let b = &self.blocks[bi];
            assert_eq!(
                empties, b.num as usize,
                "block {bi}: empty count {empties} != num {}",
                b.num
            );
            if b.num > 0 {
                let mut e = b.ehead;
                for _ in 0..b.num {
                    let at = e as usize;
                    assert!(
                        (lo..lo + 256).contains(&at),
                        "block {bi}: ring escapes the block at {at}"
                    );
                    assert!(self.nodes[at].check < 0, "block {bi}: live slot {at} in ring");
                    e = -self.nodes[at].check;
                }
                assert_eq!(e, b.ehead, "block {bi}: empty ring does not close");
            }
        }
    }

    fn validate_node(&self, from: usize) {
        let base = self.nodes[from].base;
        let mut c = self.infos[from].child;
        let mut prev: Option<u8> = None;
        loop {
            if let Some(p) = prev {
                assert!(c > p, "sibling chain out of order under {from}: {p} !< {c}");
            }
            let to = (base ^ i32::from(c)) as usize;
            assert!(to < self.size, "child {to} of {from} out of bounds");
            assert_eq!(
                self.nodes[to].check, from as i32,
                "check of {to} does not point at parent {from}"
            );
            // label 0 is the value slot, except under the root where it is
            // the interior node for keys starting with byte 0x00
            if (c != 0 || from == 0) && self.nodes[to].base >= 0 {
                self.validate_node(to);
            }
            prev = Some(c);
            c = self.infos[to].sibling;
            if c == 0 {
                break;
            }
        }
    }
}

impl<V: Value> Default for Trie<V> {
    fn default() -> Self {
        Self::new()
    }
}
