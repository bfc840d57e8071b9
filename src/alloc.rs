use tracing::trace;

use crate::block::{Block, BlockClass, MAX_TRIAL};
use crate::node::{Node, NodeInfo};
use crate::{Trie, Value};

/// Hard ceiling on the slot address space (i32 addressing).
const MAX_CAPACITY: usize = 1 << 31;

/// Bytes consumed by one 256-slot block across all three arrays.
const BYTES_PER_BLOCK: usize =
    256 * std::mem::size_of::<Node>() + 256 * std::mem::size_of::<NodeInfo>() + std::mem::size_of::<Block>();

impl<V: Value> Trie<V> {
    /// Grows the backing arrays. Doubles the capacity per request unless the
    /// `alloc-at-once` feature is enabled, in which case the first growth
    /// jumps straight to the configured memory cap.
    fn grow(&mut self) {
        #[cfg(not(feature = "alloc-at-once"))]
        let new_cap = {
            let mut want = (self.nodes.len() * 2).min(MAX_CAPACITY);
            if self.max_alloc != 0 && want / 256 * BYTES_PER_BLOCK > self.max_alloc {
                want = self.max_alloc / BYTES_PER_BLOCK * 256;
            }
            want
        };

        #[cfg(feature = "alloc-at-once")]
        let new_cap = {
            assert!(
                self.max_alloc != 0,
                "alloc-at-once requires a memory cap; call set_max_alloc first"
            );
            (self.max_alloc / BYTES_PER_BLOCK * 256).min(MAX_CAPACITY)
        };

        assert!(
            new_cap > self.size,
            "memory cap of {} bytes exhausted at {} slots",
            self.max_alloc,
            self.size
        );

        trace!(from = self.nodes.len(), to = new_cap, "growing arrays");
        self.nodes.resize(new_cap, Node::default());
        self.infos.resize(new_cap, NodeInfo::default());
        self.blocks.resize(new_cap >> 8, Block::default());
    }

    /// Appends one block: threads its 256 slots into a fresh empty ring and
    /// links it into the open class. Returns the new block index.
    pub(crate) fn add_block(&mut self) -> i32 {
        let size = self.size;
        if size == self.nodes.len() {
            self.grow();
        }
        let bi = (size >> 8) as i32;
        self.blocks[bi as usize].ehead = size as i32;
        self.nodes[size] = Node::new(-((size + 255) as i32), -((size + 1) as i32));
        for i in size + 1..size + 255 {
            self.nodes[i] = Node::new(-((i - 1) as i32), -((i + 1) as i32));
        }
        self.nodes[size + 255] = Node::new(-((size + 254) as i32), -(size as i32));
        self.push_block(bi, BlockClass::Open);
        self.size += 256;
        bi
    }

    /// Any free slot: the head of the closed class if one exists, else the
    /// head of the open class, else the first slot of a freshly appended
    /// block.
    pub(crate) fn find_place(&mut self) -> usize {
        if self.head_closed != 0 {
            return self.blocks[self.head_closed as usize].ehead as usize;
        }
        if self.head_open != 0 {
            return self.blocks[self.head_open as usize].ehead as usize;
        }
        (self.add_block() as usize) << 8
    }

    /// A free slot admitting the whole family `labels` (ascending, len >= 2):
    /// scans the open class for a slot `e` such that every sibling address
    /// `(e ^ labels[0]) ^ l` is empty. Failed blocks record the family size
    /// in their reject bound and are demoted to closed after `MAX_TRIAL`
    /// attempts. Appends a block when the whole class fails.
    pub(crate) fn find_place_for(&mut self, labels: &[u8]) -> usize {
        debug_assert!(labels.len() >= 2);
        debug_assert!(labels.windows(2).all(|w| w[0] < w[1]));
        if self.head_open != 0 {
            let stop = self.blocks[self.head_open as usize].prev;
            let nc = labels.len() as i16;
            let mut bi = self.head_open;
            loop {
                let b = self.blocks[bi as usize];
                if b.num >= nc && nc < b.reject {
                    let mut e = b.ehead;
                    loop {
                        let base = e ^ i32::from(labels[0]);
                        if labels[1..]
                            .iter()
                            .all(|&l| self.nodes[(base ^ i32::from(l)) as usize].is_empty())
                        {
                            self.blocks[bi as usize].ehead = e;
                            return e as usize;
                        }
                        e = -self.nodes[e as usize].check;
                        if e == b.ehead {
                            break;
                        }
                    }
                }
                let num = self.blocks[bi as usize].num as usize;
                self.blocks[bi as usize].reject = nc;
                if nc < self.reject[num] {
                    self.reject[num] = nc;
                }
                let next = self.blocks[bi as usize].next;
                self.blocks[bi as usize].trial += 1;
                if self.blocks[bi as usize].trial == MAX_TRIAL {
                    self.transfer_block(bi, BlockClass::Open, BlockClass::Closed);
                }
                if bi == stop {
                    break;
                }
                bi = next;
            }
        }
        (self.add_block() as usize) << 8
    }

    /// Takes an empty slot out of its ring and initializes it as a live child
    /// of `from` on `label`. With `base < 0` (first child) the slot comes
    /// from [`find_place`](Trie::find_place) and the parent's base is
    /// rewritten to reference the new family; otherwise the slot at
    /// `base ^ label` is claimed directly.
    pub(crate) fn pop_enode(&mut self, base: i32, label: u8, from: i32) -> usize {
        let e = if base < 0 {
            self.find_place()
        } else {
            (base ^ i32::from(label)) as usize
        };
        let bi = (e >> 8) as i32;
        debug_assert!(self.nodes[e].is_empty());

        self.blocks[bi as usize].num -= 1;
        if self.blocks[bi as usize].num == 0 {
            if bi != 0 {
                self.transfer_block(bi, BlockClass::Closed, BlockClass::Full);
            }
        } else {
            // unthread from the ring
            let n = self.nodes[e];
            self.nodes[(-n.base) as usize].check = n.check;
            self.nodes[(-n.check) as usize].base = n.base;
            if e as i32 == self.blocks[bi as usize].ehead {
                self.blocks[bi as usize].ehead = -n.check;
            }
            if bi != 0
                && self.blocks[bi as usize].num == 1
                && self.blocks[bi as usize].trial != MAX_TRIAL
            {
                self.transfer_block(bi, BlockClass::Open, BlockClass::Closed);
            }
        }

        // a fresh interior child has no children yet; a fresh value slot
        // starts at zero (label 0 under the root is interior: the node for
        // keys whose first byte is 0x00)
        self.nodes[e] = Node::new(if label != 0 || from == 0 { -1 } else { 0 }, from);
        if base < 0 {
            self.nodes[from as usize].base = e as i32 ^ i32::from(label);
        }
        e
    }

    /// Returns a slot to its block's empty ring as the new ring head and
    /// resets its traversal hints.
    pub(crate) fn push_enode(&mut self, e: i32) {
        debug_assert!(e > 0);
        let bi = (e >> 8) as i32;
        self.blocks[bi as usize].num += 1;
        let num = self.blocks[bi as usize].num;
        if num == 1 {
            self.blocks[bi as usize].ehead = e;
            self.nodes[e as usize] = Node::new(-e, -e);
            if bi != 0 {
                self.transfer_block(bi, BlockClass::Full, BlockClass::Closed);
            }
        } else {
            let prev = self.blocks[bi as usize].ehead;
            let next = -self.nodes[prev as usize].check;
            self.nodes[e as usize] = Node::new(-prev, -next);
            self.nodes[prev as usize].check = -e;
            self.nodes[next as usize].base = -e;
            self.blocks[bi as usize].ehead = e;
            if bi != 0 && (num == 2 || self.blocks[bi as usize].trial == MAX_TRIAL) {
                self.transfer_block(bi, BlockClass::Closed, BlockClass::Open);
            }
            self.blocks[bi as usize].trial = 0;
        }
        if self.blocks[bi as usize].reject < self.reject[num as usize] {
            self.blocks[bi as usize].reject = self.reject[num as usize];
        }
        self.infos[e as usize] = NodeInfo::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_block_extends_size_and_ring() {
        let mut t = Trie::<i32>::new();
        let bi = t.add_block();
        assert_eq!(bi, 1);
        assert_eq!(t.size(), 512);
        assert_eq!(t.blocks[1].num, 256);
        assert_eq!(t.blocks[1].ehead, 256);
        t.validate();
    }

    #[test]
    fn find_place_skips_the_root_block() {
        let mut t = Trie::<i32>::new();
        // block 0 belongs to no class, so the first request appends block 1
        let e = t.find_place();
        assert_eq!(e, 256);
    }

    #[test]
    fn pop_then_push_restores_the_ring() {
        let mut t = Trie::<i32>::new();
        let e = t.pop_enode(-1, b'x', 0);
        assert!(e >= 256);
        assert!(!t.nodes[e].is_empty());
        assert_eq!(t.nodes[e].check, 0);
        assert_eq!(t.nodes[0].base ^ i32::from(b'x'), e as i32);
        t.push_enode(e as i32);
        assert!(t.nodes[e].is_empty());
        t.nodes[0].base = -1;
        t.validate();
    }

    #[test]
    fn family_placement_leaves_all_siblings_empty() {
        let mut t = Trie::<i32>::new();
        t.add_block();
        let labels = [0u8, b'a', b'b', b'z'];
        let e = t.find_place_for(&labels);
        let base = e as i32 ^ i32::from(labels[0]);
        assert!(t.nodes[e].is_empty());
        for &l in &labels[1..] {
            assert!(t.nodes[(base ^ i32::from(l)) as usize].is_empty());
        }
    }

    #[test]
    fn full_alphabet_family_fits_one_block() {
        let mut t = Trie::<i32>::new();
        let labels: Vec<u8> = (0..=255).collect();
        let e = t.find_place_for(&labels);
        let block = e >> 8;
        let base = e as i32;
        for &l in &labels {
            assert_eq!(((base ^ i32::from(l)) as usize) >> 8, block);
        }
    }

    #[test]
    #[should_panic(expected = "memory cap")]
    fn growth_beyond_the_cap_panics() {
        let mut t = Trie::<i32>::new();
        t.set_max_alloc(1024);
        t.add_block();
    }
}
