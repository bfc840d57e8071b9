use crate::view::TrieView;
use crate::{Trie, Value};

/// One query hit: the stored value, the number of key bytes consumed, and
/// the slot id of the node whose terminal edge carries the value.
///
/// For [`Trie::common_prefix_search`] `len` is the matched prefix length; for
/// [`Trie::predict`] it is the suffix length below the queried prefix. `id`
/// feeds [`Trie::suffix`] to reconstruct key bytes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Match<V> {
    pub value: V,
    pub len: usize,
    pub id: usize,
}

impl<V: Value> Trie<V> {
    /// Looks up `key` exactly. Returns the stored value,
    /// [`Value::NO_VALUE`] when `key` is only a prefix of stored keys, or
    /// [`Value::NO_PATH`] when it is not present at all.
    pub fn exact_match(&self, key: &[u8]) -> V {
        if key.is_empty() {
            return V::NO_PATH;
        }
        let (mut from, mut pos) = (0, 0);
        V::from_bits(self.view().find(key, &mut from, &mut pos))
    }

    /// Resumable walk: consumes `key[*pos..]` starting from the node `*from`,
    /// leaving both cursors at the point reached. Returns the value stored at
    /// the end point, or a sentinel like [`exact_match`](Trie::exact_match).
    ///
    /// Slot cursors held across updates must be pinned with
    /// [`set_tracked_slots`](Trie::set_tracked_slots), since any insertion
    /// may relocate the node a cursor names.
    pub fn traverse(&self, key: &[u8], from: &mut usize, pos: &mut usize) -> V {
        V::from_bits(self.view().find(key, from, pos))
    }

    /// Enumerates every stored key that is a prefix of `key`, shortest
    /// first. The total number of matches is the iterator's count.
    pub fn common_prefix_search<'a>(&'a self, key: &'a [u8]) -> CommonPrefixIter<'a, V> {
        CommonPrefixIter {
            view: self.view(),
            key,
            from: 0,
            pos: 0,
            done: false,
        }
    }

    /// Reconstructs the `len`-byte key (or key suffix) whose walk ends at
    /// slot `id`, as reported by [`Match::id`] or a [`traverse`](Trie::traverse)
    /// cursor.
    ///
    /// # Panics
    ///
    /// Panics when `len` exceeds the depth of `id`.
    pub fn suffix(&self, id: usize, len: usize) -> Vec<u8> {
        self.view().suffix(id, len)
    }
}

/// Iterator over the stored keys that prefix a query, shortest first.
pub struct CommonPrefixIter<'a, V: Value> {
    pub(crate) view: TrieView<'a, V>,
    pub(crate) key: &'a [u8],
    pub(crate) from: usize,
    pub(crate) pos: usize,
    pub(crate) done: bool,
}

impl<V: Value> Iterator for CommonPrefixIter<'_, V> {
    type Item = Match<V>;

    fn next(&mut self) -> Option<Match<V>> {
        while !self.done && self.pos < self.key.len() {
            match self.view.step(self.from, self.key[self.pos]) {
                Some(to) => {
                    self.from = to;
                    self.pos += 1;
                }
                None => {
                    self.done = true;
                    return None;
                }
            }
            if let Some(bits) = self.view.value_bits(self.from) {
                return Some(Match {
                    value: V::from_bits(bits),
                    len: self.pos,
                    id: self.from,
                });
            }
        }
        None
    }
}
