use std::collections::BTreeMap;

use proptest::prelude::*;
use proptest_derive::Arbitrary;

use crate::{Trie, Value};

/// Reference implementation: a BTreeMap with the same add-on-update
/// semantics.
#[derive(Default)]
struct Model {
    map: BTreeMap<Vec<u8>, i32>,
}

impl Model {
    fn update(&mut self, key: &[u8], val: i32) -> i32 {
        let slot = self.map.entry(key.to_vec()).or_insert(0);
        *slot = slot.wrapping_add(val);
        *slot
    }

    fn erase(&mut self, key: &[u8]) -> bool {
        self.map.remove(key).is_some()
    }
}

/// Key strategy: short byte strings over a small alphabet of non-zero bytes,
/// so that prefix sharing, family collisions, and relocations all occur
/// constantly.
#[derive(Debug, Clone)]
struct Key(Vec<u8>);

impl Arbitrary for Key {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            prop::collection::vec(1u8..=8, 1..6).prop_map(Key),
            prop::collection::vec(1u8..=255, 1..12).prop_map(Key),
            "[a-c]{1,5}".prop_map(|s| Key(s.into_bytes())),
        ]
        .boxed()
    }
}

#[derive(Arbitrary, Debug, Clone)]
enum Action {
    Update(Key, i16),
    Erase(Key),
    Lookup(Key),
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn behaves_like_a_btreemap(actions in prop::collection::vec(any::<Action>(), 1..300)) {
        let mut trie = Trie::new();
        let mut model = Model::default();
        for action in &actions {
            match action {
                Action::Update(Key(key), val) => {
                    let v = i32::from(*val);
                    let stored = *trie.update(key, v);
                    prop_assert_eq!(stored, model.update(key, v));
                }
                Action::Erase(Key(key)) => {
                    prop_assert_eq!(trie.erase(key), model.erase(key));
                }
                Action::Lookup(Key(key)) => {
                    match model.map.get(key.as_slice()) {
                        Some(&v) => prop_assert_eq!(trie.exact_match(key), v),
                        None => {
                            let got = trie.exact_match(key);
                            prop_assert!(got.is_no_value() || got.is_no_path());
                        }
                    }
                }
            }
        }
        prop_assert_eq!(trie.num_keys(), model.map.len());
        trie.validate();

        // full enumeration agrees with the model, in the same order
        let dumped: Vec<(Vec<u8>, i32)> = trie
            .iter()
            .map(|m| (m.id, m.len, m.value))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|(id, len, value)| (trie.suffix(id, len), value))
            .collect();
        let expected: Vec<(Vec<u8>, i32)> =
            model.map.iter().map(|(k, &v)| (k.clone(), v)).collect();
        prop_assert_eq!(dumped, expected);
    }

    #[test]
    fn save_open_round_trip_is_lossless(
        entries in prop::collection::btree_map(any::<Key>().prop_map(|k| k.0), 0i32..10_000, 1..100)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.dat");
        let mut trie = Trie::new();
        for (key, &val) in &entries {
            *trie.update(key, 0) = val;
        }
        trie.save(&path).unwrap();

        let mut loaded = Trie::<i32>::open(&path, 0, None).unwrap();
        loaded.restore();
        loaded.validate();
        prop_assert_eq!(loaded.num_keys(), entries.len());
        for (key, &val) in &entries {
            prop_assert_eq!(loaded.exact_match(key), val);
        }
    }
}

mod bulk {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::Trie;

    /// Ten thousand random keys dump back to exactly the input set.
    #[test]
    fn ten_thousand_random_keys_round_trip() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut keys = std::collections::BTreeSet::new();
        while keys.len() < 10_000 {
            let len = rng.gen_range(1..=32);
            let key: Vec<u8> = (0..len).map(|_| rng.gen_range(1..=255u8)).collect();
            keys.insert(key);
        }
        let mut trie = Trie::new();
        for (i, key) in keys.iter().enumerate() {
            *trie.update(key, 0) = i as i32;
        }
        assert_eq!(trie.num_keys(), keys.len());
        trie.validate();

        let dumped: Vec<Vec<u8>> = trie
            .iter()
            .map(|m| (m.id, m.len))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|(id, len)| trie.suffix(id, len))
            .collect();
        let expected: Vec<Vec<u8>> = keys.iter().cloned().collect();
        assert_eq!(dumped, expected);

        for (i, key) in keys.iter().enumerate() {
            assert_eq!(trie.exact_match(key), i as i32);
        }
    }
}
