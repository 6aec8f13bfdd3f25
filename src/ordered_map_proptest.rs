#![cfg(test)]

// Property tests for OrderedMap kept inside the crate so they can check
// the index, arena and modification counter directly.

use crate::config::StoreConfig;
use crate::ordered_map::OrderedMap;
use proptest::prelude::*;
use std::hash::{BuildHasher, Hasher};

// Pool-indexed operations: indices shrink to earlier keys, pool length
// shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Put(usize, i32),
    PutIfAbsent(usize, i32),
    Replace(usize, i32),
    Remove(usize),
    RemoveAt(usize),
    Update(usize, i32),
    Get(usize),
    CursorDrop(usize),
    Clear,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    // Mixed case so folding collapses some pool entries onto one key.
    proptest::collection::vec("[a-cA-C]{1,3}", 1..=8).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let op = prop_oneof![
            4 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Put(i, v)),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::PutIfAbsent(i, v)),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Replace(i, v)),
            2 => idx.clone().prop_map(OpI::Remove),
            1 => (0usize..10).prop_map(OpI::RemoveAt),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| OpI::Update(i, d)),
            1 => idx.clone().prop_map(OpI::Get),
            1 => (1usize..4).prop_map(OpI::CursorDrop),
            1 => Just(OpI::Clear),
        ];
        proptest::collection::vec(op, 1..60).prop_map(move |ops| (pool.clone(), ops))
    })
}

/// Reference model: entries in order, original casing kept, lookups folded.
#[derive(Default)]
struct Model {
    entries: Vec<(String, i32)>,
}

impl Model {
    fn position(&self, key: &str) -> Option<usize> {
        let folded = key.to_lowercase();
        self.entries
            .iter()
            .position(|(k, _)| k.to_lowercase() == folded)
    }

    fn get(&self, key: &str) -> Option<i32> {
        self.position(key).map(|i| self.entries[i].1)
    }

    fn put(&mut self, key: &str, value: i32) -> Option<i32> {
        match self.position(key) {
            Some(i) => {
                let (k, old) = self.entries.remove(i);
                self.entries.push((k, value));
                Some(old)
            }
            None => {
                self.entries.push((key.to_owned(), value));
                None
            }
        }
    }

    fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }
}

fn run_scenario<S: BuildHasher>(
    sut: OrderedMap<i32, S>,
    pool: &[String],
    ops: Vec<OpI>,
) -> Result<(), TestCaseError> {
    let mut model = Model::default();
    for op in ops {
        let before = sut.modification_count();
        let structural = match op {
            OpI::Put(i, v) => {
                let k = &pool[i];
                prop_assert_eq!(sut.put(k, v), model.put(k, v));
                true
            }
            OpI::PutIfAbsent(i, v) => {
                let k = &pool[i];
                let present = model.get(k);
                prop_assert_eq!(sut.put_if_absent(k, v), present);
                if present.is_none() {
                    model.put(k, v);
                }
                present.is_none()
            }
            OpI::Replace(i, v) => {
                let k = &pool[i];
                let present = model.get(k);
                prop_assert_eq!(sut.replace(k, v), present);
                if present.is_some() {
                    model.put(k, v);
                }
                present.is_some()
            }
            OpI::Remove(i) => {
                let k = &pool[i];
                let expected = model.position(k).map(|p| model.entries.remove(p).1);
                prop_assert_eq!(sut.remove(k), expected);
                expected.is_some()
            }
            OpI::RemoveAt(index) => {
                let res = sut.remove_at(index);
                if index < model.entries.len() {
                    let (k, v) = model.entries.remove(index);
                    let e = res.expect("in bounds");
                    prop_assert_eq!(e.key(), k.as_str());
                    prop_assert_eq!(*e.value(), v);
                    true
                } else {
                    prop_assert!(res.is_err());
                    false
                }
            }
            OpI::Update(i, d) => {
                let k = &pool[i];
                let got = sut.update_value(k, |v| {
                    *v = v.wrapping_add(d);
                    *v
                });
                let want = model.position(k).map(|p| {
                    let v = &mut model.entries[p].1;
                    *v = v.wrapping_add(d);
                    *v
                });
                prop_assert_eq!(got, want);
                false
            }
            OpI::Get(i) => {
                let k = &pool[i];
                prop_assert_eq!(sut.get(k), model.get(k));
                prop_assert_eq!(sut.contains_key(k), model.position(k).is_some());
                false
            }
            OpI::CursorDrop(stride) => {
                // Remove every `stride`-th entry through a single cursor.
                let mut cursor = sut.key_cursor();
                let mut n = 0usize;
                let mut kept = Vec::new();
                let mut removed_any = false;
                while let Some(k) = cursor.try_next().expect("no foreign mutation") {
                    if n % stride == 0 {
                        cursor.remove().expect("remove after next");
                        removed_any = true;
                    } else {
                        kept.push(k);
                    }
                    n += 1;
                }
                model.entries.retain(|(k, _)| kept.contains(k));
                removed_any
            }
            OpI::Clear => {
                sut.clear();
                model.entries.clear();
                true
            }
        };

        // Post-conditions after each op
        // 1) Order and bindings match the model.
        prop_assert_eq!(sut.keys(), model.keys());
        prop_assert_eq!(sut.len(), model.entries.len());
        prop_assert_eq!(sut.first_key(), model.entries.first().map(|(k, _)| k.clone()));
        prop_assert_eq!(sut.last_key(), model.entries.last().map(|(k, _)| k.clone()));
        // 2) Index and arena agree.
        prop_assert_eq!(sut.index_len(), model.entries.len());
        // 3) The counter moves exactly on structural changes.
        let after = sut.modification_count();
        prop_assert_eq!(after != before, structural);
    }
    Ok(())
}

// Property: state-machine equivalence against an ordered Vec model on a
// case-insensitive record map.
// - put relocates existing keys to the tail and keeps their first casing;
// - put_if_absent acts only on absence and never reorders; replace acts
//   only on presence and relocates like put;
// - removal by key, by position or through a cursor unlinks exactly one
//   entry and leaves order intact;
// - the modification counter changes on structural ops only.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        run_scenario(OrderedMap::new_record(), &pool, ops)?;
    }
}

// Collision variant using a constant hasher to stress key equality in the
// index under worst-case probing.
#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        let config = StoreConfig::record().with_shards(1);
        let sut = OrderedMap::with_config_and_hasher(config, ConstBuildHasher);
        run_scenario(sut, &pool, ops)?;
    }
}
