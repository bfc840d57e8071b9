use crate::node::Node;
use crate::{Trie, Value};

impl<V: Value> Trie<V> {
    /// Inserts `key`, adding `val` to the stored value (created as zero when
    /// absent), and returns a mutable reference to it. Overwrite by writing
    /// through the reference.
    ///
    /// # Panics
    ///
    /// Panics on a zero-length key, and when growth exceeds the configured
    /// memory cap.
    pub fn update(&mut self, key: &[u8], val: V) -> &mut V {
        self.update_with(key, val, |_, _| {})
    }

    /// Like [`update`](Trie::update), invoking `moved(old, new)` for every
    /// slot relocated by conflict resolution (the newcomer's own slot
    /// excepted). Callers keeping an external store keyed by slot address
    /// hook this to follow relocations.
    pub fn update_with<F>(&mut self, key: &[u8], val: V, mut moved: F) -> &mut V
    where
        F: FnMut(usize, usize),
    {
        assert!(!key.is_empty(), "zero-length keys cannot be inserted at the root");
        self.ensure_restored();
        let mut from = 0usize;
        for &label in key {
            from = self.follow(&mut from, label, &mut moved);
        }
        let to = self.follow(&mut from, 0, &mut moved);
        let new = V::from_bits(self.nodes[to].base).add(val);
        self.nodes[to].base = new.to_bits();
        // SAFETY: `V` is sealed to 4-byte plain-old-data types stored as the
        // raw bit pattern of this i32 field, which shares its size and
        // alignment.
        unsafe { &mut *(std::ptr::addr_of_mut!(self.nodes[to].base) as *mut V) }
    }

    /// Builds a trie by inserting `keys[i]` with `values[i]`. Keys may be
    /// unsorted; duplicates accumulate their values.
    pub fn build<K: AsRef<[u8]>>(keys: &[K], values: &[V]) -> Self {
        assert_eq!(keys.len(), values.len(), "keys and values must pair up");
        let mut trie = Self::new();
        for (key, &val) in keys.iter().zip(values) {
            trie.update(key.as_ref(), val);
        }
        trie
    }

    /// Removes `key`. Returns `false` when the key is not stored. Freed
    /// slots return to their empty rings for reuse; the array is not
    /// repacked.
    pub fn erase(&mut self, key: &[u8]) -> bool {
        if key.is_empty() {
            return false;
        }
        self.ensure_restored();
        let mut from = 0usize;
        for &label in key {
            let base = self.nodes[from].base;
            if base < 0 {
                return false;
            }
            let to = (base ^ i32::from(label)) as usize;
            if to >= self.size || self.nodes[to].check != from as i32 {
                return false;
            }
            from = to;
        }
        let base = self.nodes[from].base;
        if base < 0 || self.nodes[base as usize].check != from as i32 {
            return false; // prefix only, no value
        }
        self.erase_at(from);
        true
    }

    /// Frees the value slot under `from` and walks toward the root, freeing
    /// each now-childless ancestor, until one with another child remains;
    /// the erased label is un-threaded from that ancestor's sibling chain.
    fn erase_at(&mut self, mut from: usize) {
        let mut e = self.nodes[from].base; // ^ 0: the value slot
        loop {
            let base = self.nodes[from].base;
            let first = self.infos[from].child;
            let keep = self.infos[(base ^ i32::from(first)) as usize].sibling != 0 || from == 0;
            if keep {
                self.pop_sibling(from, base, (base ^ e) as u8);
            }
            self.push_enode(e);
            if keep {
                if from == 0 && self.infos[0].child == 0 && !self.root_has_zero_child() {
                    // the last key is gone; the root is childless again
                    self.nodes[0].base = -1;
                }
                return;
            }
            e = from as i32;
            from = self.nodes[from].check as usize;
        }
    }

    fn root_has_zero_child(&self) -> bool {
        let base = self.nodes[0].base;
        base >= 0 && self.nodes[base as usize].check == 0
    }

    /// Returns the child of `from` on `label`, creating it (possibly via
    /// relocation) when absent. `from` is rewritten if the conflict resolver
    /// relocates the parent itself.
    fn follow<F>(&mut self, from: &mut usize, label: u8, moved: &mut F) -> usize
    where
        F: FnMut(usize, usize),
    {
        let base = self.nodes[*from].base;
        if base < 0 {
            let to = self.pop_enode(base, label, *from as i32);
            self.push_sibling(*from, to as i32 ^ i32::from(label), label, false);
            return to;
        }
        let to = (base ^ i32::from(label)) as usize;
        if self.nodes[to].check < 0 {
            let to = self.pop_enode(base, label, *from as i32);
            self.push_sibling(*from, to as i32 ^ i32::from(label), label, true);
            to
        } else if self.nodes[to].check == *from as i32 {
            to
        } else {
            self.resolve(from, base, label, moved)
        }
    }

    /// Threads `label` into `from`'s ascending sibling chain. `base` is
    /// `from`'s (possibly just rewritten) base; `has_child` states whether
    /// the chain is non-empty.
    pub(crate) fn push_sibling(&mut self, from: usize, base: i32, label: u8, has_child: bool) {
        // the link to rewrite: the parent's child field, or the sibling field
        // of the predecessor inside the chain
        let mut link_slot = None;
        let mut next = self.infos[from].child;
        if has_child && label > next {
            loop {
                let slot = (base ^ i32::from(next)) as usize;
                next = self.infos[slot].sibling;
                if next == 0 || next >= label {
                    link_slot = Some(slot);
                    break;
                }
            }
        }
        self.infos[(base ^ i32::from(label)) as usize].sibling = next;
        match link_slot {
            Some(slot) => self.infos[slot].sibling = label,
            None => self.infos[from].child = label,
        }
    }

    /// Removes `label` from `from`'s sibling chain.
    fn pop_sibling(&mut self, from: usize, base: i32, label: u8) {
        let erased = self.infos[(base ^ i32::from(label)) as usize].sibling;
        let mut c = self.infos[from].child;
        if c == label {
            self.infos[from].child = erased;
            return;
        }
        loop {
            let slot = (base ^ i32::from(c)) as usize;
            let next = self.infos[slot].sibling;
            if next == label {
                self.infos[slot].sibling = erased;
                return;
            }
            debug_assert_ne!(next, 0, "label {label} missing from the chain of {from}");
            c = next;
        }
    }

    /// Decides which of the two colliding families relocates by walking both
    /// sibling chains in lock step. The shorter chain moves; ties move the
    /// newcomer.
    fn consult(&self, base_n: i32, base_p: i32, mut c_n: u8, mut c_p: u8) -> bool {
        loop {
            c_n = self.infos[(base_n ^ i32::from(c_n)) as usize].sibling;
            c_p = self.infos[(base_p ^ i32::from(c_p)) as usize].sibling;
            if c_n == 0 || c_p == 0 {
                return c_n == 0;
            }
        }
    }

    /// Collects a family's labels in ascending order, splicing in `extra`
    /// (the incoming label) when given.
    fn family_labels(&self, base: i32, first_child: u8, extra: Option<u8>) -> ([u8; 256], usize) {
        let mut out = [0u8; 256];
        let mut n = 0;
        let mut c = first_child;
        if c == 0 {
            out[n] = 0;
            n += 1;
            c = self.infos[base as usize].sibling; // base ^ 0
        }
        if let Some(label) = extra {
            while c != 0 && c < label {
                out[n] = c;
                n += 1;
                c = self.infos[(base ^ i32::from(c)) as usize].sibling;
            }
            out[n] = label;
            n += 1;
        }
        while c != 0 {
            out[n] = c;
            n += 1;
            c = self.infos[(base ^ i32::from(c)) as usize].sibling;
        }
        (out, n)
    }

    /// Two families collide at `base_n ^ label_n`. Moves the family chosen
    /// by [`consult`](Trie::consult) to a freshly found base, re-pointing
    /// every moved child's grandchildren, re-threading sibling links, and
    /// reporting each move through `moved`. Returns the newcomer's slot.
    fn resolve<F>(&mut self, from_n: &mut usize, base_n: i32, label_n: u8, moved: &mut F) -> usize
    where
        F: FnMut(usize, usize),
    {
        let to_pn = (base_n ^ i32::from(label_n)) as usize;
        let from_p = self.nodes[to_pn].check as usize;
        let base_p = self.nodes[from_p].base;

        let newcomer =
            self.consult(base_n, base_p, self.infos[*from_n].child, self.infos[from_p].child);
        let (buf, n_labels) = if newcomer {
            self.family_labels(base_n, self.infos[*from_n].child, Some(label_n))
        } else {
            self.family_labels(base_p, self.infos[from_p].child, None)
        };
        let labels = &buf[..n_labels];

        let e = if n_labels == 1 {
            self.find_place()
        } else {
            self.find_place_for(labels)
        };
        let base = e as i32 ^ i32::from(labels[0]);

        let from = if newcomer { *from_n } else { from_p };
        let base_old = if newcomer { base_n } else { base_p };
        if newcomer && labels[0] == label_n {
            self.infos[from].child = label_n;
        }
        self.nodes[from].base = base;

        for (i, &l) in labels.iter().enumerate() {
            let to = self.pop_enode(base, l, from as i32);
            let to_old = (base_old ^ i32::from(l)) as usize;
            self.infos[to].sibling = if i + 1 == n_labels { 0 } else { labels[i + 1] };
            if newcomer && to_old == to_pn {
                continue; // the newcomer's own slot carries nothing yet
            }
            moved(to_old, to);
            let nb = self.nodes[to_old].base;
            self.nodes[to].base = nb;
            // an interior child's children must re-point at the new address;
            // label 0 is interior only under the root
            if nb >= 0 && (l != 0 || from == 0) {
                let mut c = self.infos[to_old].child;
                self.infos[to].child = c;
                loop {
                    let gc = (nb ^ i32::from(c)) as usize;
                    self.nodes[gc].check = to as i32;
                    c = self.infos[gc].sibling;
                    if c == 0 {
                        break;
                    }
                }
            }
            if !newcomer && to_old == *from_n {
                *from_n = to; // the new branch's parent itself moved
            }
            if !newcomer && to_old == to_pn {
                // the collision slot frees up right here; hand it straight
                // to the newcomer
                self.push_sibling(*from_n, to_pn as i32 ^ i32::from(label_n), label_n, true);
                self.infos[to_old].child = 0;
                self.nodes[to_old] = Node::new(
                    if label_n != 0 || *from_n == 0 { -1 } else { 0 },
                    *from_n as i32,
                );
            } else {
                self.push_enode(to_old as i32);
            }
            for slot in self.tracked.iter_mut() {
                if *slot == to_old {
                    *slot = to;
                }
            }
        }
        if newcomer {
            (base ^ i32::from(label_n)) as usize
        } else {
            to_pn
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::{Trie, Value};

    #[test]
    fn insert_and_exact_match() {
        let mut t = Trie::new();
        t.update(b"cat", 1);
        t.update(b"car", 2);
        t.update(b"cart", 3);
        assert_eq!(t.exact_match(b"cat"), 1);
        assert_eq!(t.exact_match(b"car"), 2);
        assert_eq!(t.exact_match(b"cart"), 3);
        assert_eq!(t.exact_match(b"ca"), i32::NO_VALUE);
        assert_eq!(t.exact_match(b"cab"), i32::NO_PATH);
        t.validate();
    }

    #[test]
    fn update_accumulates_deltas() {
        let mut t = Trie::new();
        t.update(b"hits", 1);
        t.update(b"hits", 1);
        *t.update(b"hits", 1) += 10;
        assert_eq!(t.exact_match(b"hits"), 13);
    }

    #[test]
    fn update_overwrites_through_the_reference() {
        let mut t = Trie::new();
        t.update(b"k", 5);
        *t.update(b"k", 0) = 42;
        assert_eq!(t.exact_match(b"k"), 42);
    }

    #[test]
    #[should_panic(expected = "zero-length")]
    fn zero_length_key_panics() {
        Trie::<i32>::new().update(b"", 1);
    }

    #[test]
    fn prefix_chain_keys_coexist() {
        let mut t = Trie::new();
        for (i, key) in [&b"a"[..], b"aa", b"aaa", b"aaaa"].iter().enumerate() {
            t.update(key, i as i32 + 1);
        }
        assert_eq!(t.num_keys(), 4);
        for (i, key) in [&b"a"[..], b"aa", b"aaa", b"aaaa"].iter().enumerate() {
            assert_eq!(t.exact_match(key), i as i32 + 1);
        }
        t.validate();
    }

    #[test]
    fn inserting_a_prefix_of_an_existing_key_keeps_both() {
        let mut t = Trie::new();
        t.update(b"cart", 1);
        t.update(b"car", 2);
        assert_eq!(t.exact_match(b"cart"), 1);
        assert_eq!(t.exact_match(b"car"), 2);
    }

    #[test]
    fn full_byte_alphabet_as_single_byte_keys() {
        let mut t = Trie::new();
        for i in 0..=255u8 {
            t.update(&[i], i32::from(i));
        }
        assert_eq!(t.num_keys(), 256);
        for i in 0..=255u8 {
            assert_eq!(t.exact_match(&[i]), i32::from(i), "key {i:#04x}");
        }
        t.validate();
    }

    #[test]
    fn erase_then_reinsert() {
        let mut t = Trie::new();
        t.update(b"apple", 10);
        t.update(b"apply", 20);
        t.update(b"ape", 30);
        assert!(t.erase(b"apply"));
        assert_eq!(t.exact_match(b"apply"), i32::NO_PATH);
        assert_eq!(t.exact_match(b"apple"), 10);
        assert_eq!(t.exact_match(b"ape"), 30);
        t.update(b"apply", 99);
        assert_eq!(t.exact_match(b"apply"), 99);
        assert_eq!(t.exact_match(b"apple"), 10);
        assert_eq!(t.exact_match(b"ape"), 30);
        t.validate();
    }

    #[test]
    fn erase_misses_report_false() {
        let mut t = Trie::new();
        t.update(b"prefix-only", 1);
        assert!(!t.erase(b"prefix"));
        assert!(!t.erase(b"prefix-only-longer"));
        assert!(!t.erase(b"unrelated"));
        assert!(!t.erase(b""));
        assert!(t.erase(b"prefix-only"));
        assert_eq!(t.num_keys(), 0);
        t.validate();
    }

    #[test]
    fn erase_last_key_leaves_a_working_empty_trie() {
        let mut t = Trie::new();
        t.update(b"solo", 7);
        assert!(t.erase(b"solo"));
        assert_eq!(t.num_keys(), 0);
        assert_eq!(t.exact_match(b"solo"), i32::NO_PATH);
        t.validate();
        t.update(b"solo", 8);
        assert_eq!(t.exact_match(b"solo"), 8);
    }

    #[test]
    fn erase_reuses_slots_without_disturbing_survivors() {
        let mut t = Trie::new();
        let keys: Vec<Vec<u8>> = (0..300u32).map(|i| format!("key{i:03}").into_bytes()).collect();
        for (i, k) in keys.iter().enumerate() {
            t.update(k, i as i32);
        }
        for k in keys.iter().step_by(2) {
            assert!(t.erase(k));
        }
        for i in 0..50u32 {
            t.update(format!("fresh{i:02}").as_bytes(), i as i32);
        }
        for (i, k) in keys.iter().enumerate() {
            if i % 2 == 0 {
                assert_eq!(t.exact_match(k), i32::NO_PATH);
            } else {
                assert_eq!(t.exact_match(k), i as i32);
            }
        }
        t.validate();
    }

    #[test]
    fn nul_first_byte_keys_are_supported() {
        let mut t = Trie::new();
        t.update(b"\x00", 1);
        t.update(b"\x00a", 2);
        t.update(b"\x01", 3);
        assert_eq!(t.exact_match(b"\x00"), 1);
        assert_eq!(t.exact_match(b"\x00a"), 2);
        assert_eq!(t.exact_match(b"\x01"), 3);
        assert!(t.erase(b"\x00"));
        assert_eq!(t.exact_match(b"\x00"), i32::NO_VALUE); // still a prefix of "\x00a"
        assert_eq!(t.exact_match(b"\x00a"), 2);
        t.validate();
    }

    #[test]
    fn build_pairs_keys_with_values() {
        let keys = [&b"zeta"[..], b"alpha", b"mu"];
        let t = Trie::build(&keys, &[1, 2, 3]);
        assert_eq!(t.exact_match(b"zeta"), 1);
        assert_eq!(t.exact_match(b"alpha"), 2);
        assert_eq!(t.exact_match(b"mu"), 3);
    }

    #[test]
    fn float_values_round_trip() {
        let mut t = Trie::<f32>::new();
        t.update(b"pi", 3.25);
        t.update(b"neg", -8.5);
        assert_eq!(t.exact_match(b"pi"), 3.25);
        assert_eq!(t.exact_match(b"neg"), -8.5);
        assert!(t.exact_match(b"p").is_no_value());
        assert!(t.exact_match(b"q").is_no_path());
    }

    #[test]
    fn move_callback_keeps_an_external_index_valid() {
        let mut t = Trie::new();
        let keys: Vec<Vec<u8>> = (0..500u32).map(|i| format!("k{i:03}").into_bytes()).collect();
        let mut ids: HashMap<Vec<u8>, usize> = HashMap::new();
        for (i, k) in keys.iter().enumerate() {
            let mut moves = Vec::new();
            t.update_with(k, i as i32, |old, new| moves.push((old, new)));
            for (old, new) in moves {
                for id in ids.values_mut() {
                    if *id == old {
                        *id = new;
                    }
                }
            }
            let mut from = 0;
            let mut pos = 0;
            assert_eq!(t.traverse(k, &mut from, &mut pos), i as i32);
            ids.insert(k.clone(), from);
        }
        for k in &keys {
            assert_eq!(&t.suffix(ids[k], k.len()), k);
        }
    }

    #[test]
    fn tracked_slots_follow_relocations() {
        let mut t = Trie::new();
        t.update(b"alpha", 1);
        let mut from = 0;
        let mut pos = 0;
        t.traverse(b"alpha", &mut from, &mut pos);
        t.set_tracked_slots(&[from]);
        for i in 0..2000u32 {
            t.update(format!("x{i}").as_bytes(), i as i32);
        }
        let id = t.tracked_slots()[0];
        assert_eq!(t.suffix(id, 5), b"alpha");
    }

    #[test]
    fn dense_random_churn_stays_consistent() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut t = Trie::new();
        let mut keys = Vec::new();
        for i in 0..2000u32 {
            let len = rng.gen_range(1..=12);
            let key: Vec<u8> = (0..len).map(|_| rng.gen_range(1..=255u8)).collect();
            t.update(&key, i as i32);
            keys.push(key);
        }
        t.validate();
        for key in &keys {
            assert_ne!(t.exact_match(key), i32::NO_PATH);
        }
    }
}
