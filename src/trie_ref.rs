#[cfg(not(target_endian = "little"))]
compile_error!("TrieRef zero-copy loading requires a little-endian platform");

use std::marker::PhantomData;
use std::mem;

use crate::search::CommonPrefixIter;
use crate::view::TrieView;
use crate::{Node, Trie, TrieError, Value};

/// A read-only trie borrowing its node array from an externally owned
/// buffer, e.g. a memory-mapped image produced by [`Trie::save`].
///
/// Unlike [`Trie::open`] this performs no copy and no allocation; the handle
/// never frees the buffer and never mutates it. Only the node-array queries
/// are available (no prediction, which needs the reconstructed info array —
/// convert via [`to_owned`](TrieRef::to_owned) for that).
pub struct TrieRef<'a, V: Value = i32> {
    nodes: &'a [Node],
    _value: PhantomData<V>,
}

impl<'a, V: Value> TrieRef<'a, V> {
    /// Adopts a raw little-endian image. The buffer must hold a whole number
    /// of 256-slot blocks and be aligned for node records.
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, TrieError> {
        if bytes.is_empty() || bytes.len() % (256 * mem::size_of::<Node>()) != 0 {
            return Err(TrieError::InvalidImage(bytes.len() as u64));
        }
        let ptr = bytes.as_ptr();
        if !(ptr as usize).is_multiple_of(mem::align_of::<Node>()) {
            return Err(TrieError::Misaligned);
        }
        let count = bytes.len() / mem::size_of::<Node>();
        // SAFETY:
        // - `Node` is `#[repr(C)]` with two `i32` fields: size 8, align 4,
        //   no padding, valid for any bit pattern
        // - length and alignment were verified above
        // - the lifetime ties the slice to the input buffer
        // - only little-endian platforms compile, so the in-memory layout
        //   matches the serialized format
        let nodes = unsafe { std::slice::from_raw_parts(ptr as *const Node, count) };
        Ok(Self {
            nodes,
            _value: PhantomData,
        })
    }

    /// Adopts an already-typed node array (a whole number of 256-slot
    /// blocks).
    pub fn from_nodes(nodes: &'a [Node]) -> Result<Self, TrieError> {
        if nodes.is_empty() || nodes.len() % 256 != 0 {
            return Err(TrieError::InvalidImage(
                (nodes.len() * mem::size_of::<Node>()) as u64,
            ));
        }
        Ok(Self {
            nodes,
            _value: PhantomData,
        })
    }

    #[inline]
    fn view(&self) -> TrieView<'a, V> {
        TrieView {
            nodes: self.nodes,
            _value: PhantomData,
        }
    }

    /// Number of slots in the image.
    #[inline]
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Number of keys stored in the image.
    pub fn num_keys(&self) -> usize {
        (0..self.nodes.len())
            .filter(|&to| {
                let parent = self.nodes[to].check;
                parent > 0 && self.nodes[parent as usize].base == to as i32
            })
            .count()
    }

    /// See [`Trie::exact_match`].
    pub fn exact_match(&self, key: &[u8]) -> V {
        if key.is_empty() {
            return V::NO_PATH;
        }
        let (mut from, mut pos) = (0, 0);
        V::from_bits(self.view().find(key, &mut from, &mut pos))
    }

    /// See [`Trie::traverse`].
    pub fn traverse(&self, key: &[u8], from: &mut usize, pos: &mut usize) -> V {
        V::from_bits(self.view().find(key, from, pos))
    }

    /// See [`Trie::common_prefix_search`].
    pub fn common_prefix_search(&self, key: &'a [u8]) -> CommonPrefixIter<'a, V> {
        CommonPrefixIter {
            view: self.view(),
            key,
            from: 0,
            pos: 0,
            done: false,
        }
    }

    /// See [`Trie::suffix`].
    pub fn suffix(&self, id: usize, len: usize) -> Vec<u8> {
        self.view().suffix(id, len)
    }

    /// Copies the image into an owned, updatable [`Trie`].
    pub fn to_owned(&self) -> Trie<V> {
        let mut reject = [0i16; 257];
        for (num, r) in reject.iter_mut().enumerate() {
            *r = num as i16 + 1;
        }
        Trie {
            nodes: self.nodes.to_vec(),
            infos: Vec::new(),
            blocks: Vec::new(),
            reject,
            head_full: 0,
            head_closed: 0,
            head_open: 0,
            size: self.nodes.len(),
            max_alloc: 0,
            tracked: Vec::new(),
            _value: PhantomData,
        }
    }
}
