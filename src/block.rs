use crate::{Trie, Value};

/// Number of relocation attempts after which an open block is demoted to
/// closed and stops being scanned for multi-child families.
pub(crate) const MAX_TRIAL: i32 = 1;

/// Metadata for one 256-slot aligned window of the arrays.
///
/// `num` counts the empty slots; `ehead` is the entry point into the block's
/// empty ring; `prev`/`next` link blocks of the same class into a doubly
/// linked ring; `trial` counts failed placement attempts; `reject` is a lower
/// bound on the family sizes known not to fit here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Block {
    pub(crate) prev: i32,
    pub(crate) next: i32,
    pub(crate) num: i16,
    pub(crate) reject: i16,
    pub(crate) trial: i32,
    pub(crate) ehead: i32,
}

impl Default for Block {
    fn default() -> Self {
        Self {
            prev: 0,
            next: 0,
            num: 256,
            reject: 257,
            trial: 0,
            ehead: 0,
        }
    }
}

/// The three block classes. Full blocks are ineligible for allocation,
/// closed blocks serve single-slot requests, open blocks serve families.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BlockClass {
    Full,
    Closed,
    Open,
}

impl<V: Value> Trie<V> {
    #[inline]
    pub(crate) fn class_head(&self, class: BlockClass) -> i32 {
        match class {
            BlockClass::Full => self.head_full,
            BlockClass::Closed => self.head_closed,
            BlockClass::Open => self.head_open,
        }
    }

    #[inline]
    fn set_class_head(&mut self, class: BlockClass, bi: i32) {
        match class {
            BlockClass::Full => self.head_full = bi,
            BlockClass::Closed => self.head_closed = bi,
            BlockClass::Open => self.head_open = bi,
        }
    }

    /// Links `bi` into `class`, making it the head of that class ring.
    pub(crate) fn push_block(&mut self, bi: i32, class: BlockClass) {
        let head = self.class_head(class);
        if head == 0 {
            self.blocks[bi as usize].prev = bi;
            self.blocks[bi as usize].next = bi;
        } else {
            let tail = self.blocks[head as usize].prev;
            self.blocks[bi as usize].prev = tail;
            self.blocks[bi as usize].next = head;
            self.blocks[tail as usize].next = bi;
            self.blocks[head as usize].prev = bi;
        }
        self.set_class_head(class, bi);
    }

    /// Unlinks `bi` from `class`.
    pub(crate) fn pop_block(&mut self, bi: i32, class: BlockClass) {
        if self.blocks[bi as usize].next == bi {
            // sole member
            self.set_class_head(class, 0);
        } else {
            let Block { prev, next, .. } = self.blocks[bi as usize];
            self.blocks[prev as usize].next = next;
            self.blocks[next as usize].prev = prev;
            if self.class_head(class) == bi {
                self.set_class_head(class, next);
            }
        }
    }

    /// Moves `bi` from one class ring to another. Block 0 never transfers;
    /// callers guard on `bi != 0`.
    pub(crate) fn transfer_block(&mut self, bi: i32, from: BlockClass, to: BlockClass) {
        debug_assert_ne!(bi, 0);
        self.pop_block(bi, from);
        self.push_block(bi, to);
    }
}
