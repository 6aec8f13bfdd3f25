// OrderedMap property tests through the public API.
//
// Property 1: bindings decide equality and hash, order does not.
//  - Build two maps from the same distinct bindings in two permutations.
//  - Invariant: a == b and hash(a) == hash(b); keys() follow each
//    insertion order.
//
// Property 2: size, distinct keys and order length agree at every step.
//  - Operations: put, remove over a small mixed-case key pool on a
//    case-insensitive map.
//  - Invariant: len() == keys().len() == number of distinct folded keys
//    put and not since removed.
//
// Property 3: clones are independent after creation.
//  - Invariant: mutations of the clone never change the source's keys.
use proptest::prelude::*;
use record_store::OrderedMap;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

fn hash_of<T: Hash>(t: &T) -> u64 {
    let mut h = DefaultHasher::new();
    t.hash(&mut h);
    h.finish()
}

// Property 1: order-independent equality and hash.
proptest! {
    #[test]
    fn prop_equality_ignores_order(
        bindings in proptest::collection::btree_map("[a-z]{1,4}", any::<i32>(), 0..12)
            .prop_map(|m| m.into_iter().collect::<Vec<_>>())
            .prop_shuffle()
            .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
    ) {
        let (first, second) = bindings;
        let a: OrderedMap<i32> = first.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        let b: OrderedMap<i32> = second.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(hash_of(&a), hash_of(&b));
        let first_keys: Vec<String> = first.iter().map(|(k, _)| k.clone()).collect();
        prop_assert_eq!(a.keys(), first_keys);
    }
}

// Property 2: size parity with distinct folded keys.
proptest! {
    #[test]
    fn prop_size_matches_distinct_keys(
        ops in proptest::collection::vec((any::<bool>(), "[abAB]{1,2}"), 1..80)
    ) {
        let m: OrderedMap<u8> = OrderedMap::new_record();
        let mut live: BTreeSet<String> = BTreeSet::new();
        for (is_put, key) in ops {
            if is_put {
                m.put(&key, 0);
                live.insert(key.to_lowercase());
            } else {
                let removed = m.remove(&key).is_some();
                prop_assert_eq!(removed, live.remove(&key.to_lowercase()));
            }
            prop_assert_eq!(m.len(), live.len());
            prop_assert_eq!(m.keys().len(), live.len());
            let folded: BTreeSet<String> = m.keys().iter().map(|k| k.to_lowercase()).collect();
            prop_assert_eq!(&folded, &live);
        }
    }
}

// Property 3: clone independence.
proptest! {
    #[test]
    fn prop_clone_is_independent(
        base in proptest::collection::vec("[a-z]{1,3}", 0..10),
        extra in proptest::collection::vec("[A-Z]{1,3}", 1..5),
    ) {
        let src: OrderedMap<usize> =
            base.iter().enumerate().map(|(i, k)| (k.as_str(), i)).collect();
        let before = src.keys();
        let copy = src.clone();
        for k in &extra {
            copy.put(k, 0);
        }
        if let Some(first) = base.first() {
            copy.remove(first);
        }
        prop_assert_eq!(src.keys(), before);
    }
}
