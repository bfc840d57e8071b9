use crate::search::Match;
use crate::{Trie, Value};

impl<V: Value> Trie<V> {
    /// Descends to the leftmost leaf under `*from`, incrementing `*depth` per
    /// hop, and returns its value; `*from` ends at the leaf's node. Returns
    /// [`Value::NO_PATH`] when the subtree holds no key (in particular on an
    /// empty trie).
    ///
    /// Requires the info array; call [`restore`](Trie::restore) first after a
    /// bare [`open`](Trie::open). When starting from an interior node, pass
    /// that node's depth in `*depth`.
    pub fn begin(&self, from: &mut usize, depth: &mut usize) -> V {
        self.begin_at(from, depth).unwrap_or(V::NO_PATH)
    }

    /// From the leaf at `*from`, advances to the next leaf in ascending key
    /// order within the subtree rooted at `root`, or returns
    /// [`Value::NO_PATH`] when the subtree is exhausted. Call after
    /// [`begin`](Trie::begin).
    pub fn next(&self, from: &mut usize, depth: &mut usize, root: usize) -> V {
        self.next_at(from, depth, root).unwrap_or(V::NO_PATH)
    }

    fn begin_at(&self, from: &mut usize, depth: &mut usize) -> Option<V> {
        let mut c = self.infos[*from].child;
        if *from == 0 {
            if self.nodes[0].base < 0 {
                return None; // empty trie
            }
            if c == 0 {
                // under the root, label 0 is the interior node for keys
                // starting with byte 0x00: a real edge, descend through it
                *from = self.nodes[0].base as usize;
                *depth += 1;
                c = self.infos[*from].child;
            }
        }
        while c != 0 {
            *from = (self.nodes[*from].base ^ i32::from(c)) as usize;
            *depth += 1;
            c = self.infos[*from].child;
        }
        Some(V::from_bits(self.nodes[self.nodes[*from].base as usize].base))
    }

    fn next_at(&self, from: &mut usize, depth: &mut usize, root: usize) -> Option<V> {
        // the value slot's right sibling, else ascend until one exists
        let mut c = self.infos[self.nodes[*from].base as usize].sibling;
        while c == 0 && *from != root {
            c = self.infos[*from].sibling;
            *from = self.nodes[*from].check as usize;
            *depth -= 1;
        }
        if c == 0 {
            return None;
        }
        *from = (self.nodes[*from].base ^ i32::from(c)) as usize;
        *depth += 1;
        self.begin_at(from, depth)
    }

    /// Enumerates every stored key extending `prefix`, in ascending byte
    /// order of the suffixes. Each hit's `len` is the suffix length below
    /// `prefix` and its `id` feeds [`suffix`](Trie::suffix).
    pub fn predict(&mut self, prefix: &[u8]) -> PredictIter<'_, V> {
        self.ensure_restored();
        let mut from = 0usize;
        let mut found = true;
        for &label in prefix {
            match self.view().step(from, label) {
                Some(to) => from = to,
                None => {
                    found = false;
                    break;
                }
            }
        }
        PredictIter {
            trie: self,
            root: from,
            from,
            depth: 0,
            state: if found { IterState::Start } else { IterState::Done },
        }
    }

    /// Enumerates every stored key, in ascending byte-lexicographic order.
    pub fn iter(&mut self) -> PredictIter<'_, V> {
        self.predict(b"")
    }
}

enum IterState {
    Start,
    Running,
    Done,
}

/// Iterator over the keys below a prefix, produced by [`Trie::predict`].
pub struct PredictIter<'a, V: Value> {
    trie: &'a Trie<V>,
    root: usize,
    from: usize,
    depth: usize,
    state: IterState,
}

impl<V: Value> Iterator for PredictIter<'_, V> {
    type Item = Match<V>;

    fn next(&mut self) -> Option<Match<V>> {
        let value = match self.state {
            IterState::Done => None,
            IterState::Start => {
                self.state = IterState::Running;
                self.trie.begin_at(&mut self.from, &mut self.depth)
            }
            IterState::Running => self.trie.next_at(&mut self.from, &mut self.depth, self.root),
        };
        match value {
            Some(value) => Some(Match {
                value,
                len: self.depth,
                id: self.from,
            }),
            None => {
                self.state = IterState::Done;
                None
            }
        }
    }
}
