// OrderedMap integration suite.
//
// Each test documents what behavior is being verified and which
// invariants are assumed or asserted. The core invariants exercised:
// - Order: put appends new keys and relocates existing ones to the tail;
//   len() never counts a key twice.
// - Copies: clone shares values by reference, duplicate copies composite
//   values, and both preserve keys and logical equality.
// - Equality/hash depend on bindings only, never on insertion order.
// - Cursors fail fast on foreign structural change.
// - Case-insensitive lookups fold keys but report original casing.
use record_store::{
    Duplicate, KeyValueStore, OrderedMap, StoreConfig, StoreError, Utf8KeyCodec, WireCodec,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread;

/// A stand-in for runtime values: scalars, shared records and implicit
/// runtime objects (such as lock state) that compare by identity and can
/// never be duplicated.
#[derive(Clone, Debug)]
enum Value {
    Str(Arc<str>),
    Record(Arc<OrderedMap<Value>>),
    Implicit(Arc<str>),
    Opaque,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Implicit(a), Value::Implicit(b)) => Arc::ptr_eq(a, b),
            (Value::Opaque, Value::Opaque) => true,
            _ => false,
        }
    }
}

impl Duplicate for Value {
    fn duplicate(&self) -> Option<Self> {
        match self {
            Value::Str(s) => Some(Value::Str(Arc::from(&**s))),
            Value::Record(r) => r.duplicate().map(|r| Value::Record(Arc::new(r))),
            Value::Implicit(_) => None,
            Value::Opaque => None,
        }
    }

    fn is_implicit(&self) -> bool {
        matches!(self, Value::Implicit(_))
    }
}

fn s(v: &str) -> Value {
    Value::Str(Arc::from(v))
}

fn hash_of<T: Hash>(t: &T) -> u64 {
    let mut h = DefaultHasher::new();
    t.hash(&mut h);
    h.finish()
}

const NUMBERS: [&str; 6] = ["One", "Two", "Three", "Four", "Five", "Six"];

// Test: clone shares values and is otherwise independent.
// Assumes: Clone on Arc-backed values copies the reference.
// Verifies: six shared values, then a put on the clone leaves the
// original untouched.
#[test]
fn clone_shares_values_and_diverges_on_put() {
    let original: OrderedMap<Arc<str>> = OrderedMap::new();
    for (i, k) in NUMBERS.iter().enumerate() {
        original.put(k, Arc::from(format!("value {i}")));
    }
    let copy = original.clone();
    assert_eq!(copy.len(), 6);
    for k in NUMBERS {
        assert!(Arc::ptr_eq(&copy.get(k).unwrap(), &original.get(k).unwrap()));
    }
    copy.put("John", Arc::from("Doe"));
    assert_eq!(original.len(), 6);
    assert_eq!(copy.len(), 7);
    assert!(!original.contains_key("John"));
    assert_eq!(copy.last_key().as_deref(), Some("John"));
}

// Test: duplicate copies composite values, clone does not.
// Verifies: same keys and logically equal values in both; only the
// clone's nested record is the same allocation.
#[test]
fn duplicate_copies_nested_records() {
    let inner: OrderedMap<Value> = OrderedMap::new_record();
    inner.put("city", s("Oslo"));
    let outer: OrderedMap<Value> = OrderedMap::new_record();
    outer.put("name", s("Ada"));
    outer.put("address", Value::Record(Arc::new(inner)));

    let cloned = outer.clone();
    let duped = outer.duplicate().unwrap();
    assert_eq!(cloned.keys(), outer.keys());
    assert_eq!(duped.keys(), outer.keys());
    assert_eq!(duped, outer);
    assert!(!duped.is_case_sensitive());

    let (Some(Value::Record(a)), Some(Value::Record(b)), Some(Value::Record(c))) = (
        outer.get("address"),
        cloned.get("address"),
        duped.get("ADDRESS"),
    ) else {
        panic!("address must be a record");
    };
    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(*a, *c);

    // Independent after the copy.
    c.put("zip", s("0150"));
    assert!(!a.contains_key("zip"));
}

// Test: deep copy policy for implicit and non-copyable values.
// Assumes: implicit values refuse duplication, so any attempt fails the copy.
// Verifies: implicit entries keep their key and are shared by reference;
// the copy has the same key set as a clone; one failing value fails the
// whole copy.
#[test]
fn duplicate_shares_implicit_values_and_fails_as_a_whole() {
    let m: OrderedMap<Value> = OrderedMap::new_record();
    m.put("a", s("1"));
    m.put("lock", Value::Implicit(Arc::from("orders")));
    let c = m.clone();
    let d = m.duplicate().unwrap();
    assert_eq!(d.keys(), c.keys());
    assert_eq!(d.keys(), ["a", "lock"]);
    let (Some(Value::Implicit(src)), Some(Value::Implicit(copied))) =
        (m.get("lock"), d.get("LOCK"))
    else {
        panic!("lock must stay implicit");
    };
    assert!(Arc::ptr_eq(&src, &copied));
    assert_eq!(d, m);

    m.put("handle", Value::Opaque);
    assert!(m.duplicate().is_none());
}

// Test: equality and hash ignore insertion order.
#[test]
fn equal_bindings_compare_and_hash_equal() {
    let a: OrderedMap<i32> = OrderedMap::new();
    let b: OrderedMap<i32> = OrderedMap::new();
    for (i, k) in NUMBERS.iter().enumerate() {
        a.put(k, i as i32);
    }
    for (i, k) in NUMBERS.iter().enumerate().rev() {
        b.put(k, i as i32);
    }
    assert_ne!(a.keys(), b.keys());
    assert_eq!(a, b);
    assert_eq!(hash_of(&a), hash_of(&b));

    b.remove("Six");
    assert_ne!(a, b);
}

// Test: relocation on re-put.
// Verifies: last key becomes the re-put key; size is unchanged.
#[test]
fn reput_relocates_without_duplicating() {
    let m: OrderedMap<i32> = NUMBERS.iter().map(|k| (*k, 0)).collect();
    m.put("Two", 2);
    assert_eq!(m.len(), 6);
    assert_eq!(m.last_key().as_deref(), Some("Two"));
    assert_eq!(m.keys(), ["One", "Three", "Four", "Five", "Six", "Two"]);
    assert_eq!(m.sequence(), m.keys());
}

// Test: case-insensitive record map.
// Verifies: folded lookups, single entry after re-put with other casing.
#[test]
fn case_insensitive_put_overwrites_single_entry() {
    let m: OrderedMap<&str> = OrderedMap::new_record();
    m.put("Key", "v");
    assert_eq!(m.get("key"), Some("v"));
    assert_eq!(m.get("KEY"), Some("v"));
    m.put("key", "w");
    assert_eq!(m.len(), 1);
    assert_eq!(m.get("Key"), Some("w"));
    assert_eq!(m.keys(), ["Key"]);
}

// Test: fail-fast cursor against a writer on another thread.
// Verifies: the cursor reports ConcurrentMutation after the writer's put.
#[test]
fn cursor_fails_after_put_from_another_thread() {
    let m: Arc<OrderedMap<i32>> = Arc::new(NUMBERS.iter().map(|k| (*k, 1)).collect());
    let mut keys = m.key_cursor();
    assert!(keys.try_next().unwrap().is_some());
    let writer = Arc::clone(&m);
    thread::spawn(move || {
        writer.put("Seven", 7);
    })
    .join()
    .unwrap();
    assert!(matches!(keys.try_next(), Err(StoreError::ConcurrentMutation)));
}

// Test: the map is usable through the shared store trait.
#[test]
fn usable_as_key_value_store() {
    fn fill(store: &dyn KeyValueStore<i32>) {
        store.put("a", 1);
        store.put("b", 2);
        store.put("A", 3);
    }
    let m: OrderedMap<i32> = OrderedMap::with_config(StoreConfig::record());
    fill(&m);
    assert_eq!(KeyValueStore::keys(&m), ["b", "a"]);
    assert!(KeyValueStore::remove_if(&m, "a", &3));
    assert_eq!(KeyValueStore::len(&m), 1);
}

// Test: concurrent writers keep the map consistent.
// Verifies: distinct keys from several threads all land exactly once.
#[test]
fn concurrent_puts_lose_nothing() {
    let m: Arc<OrderedMap<usize>> = Arc::new(OrderedMap::new());
    let workers: Vec<_> = (0..4)
        .map(|t| {
            let m = Arc::clone(&m);
            thread::spawn(move || {
                for i in 0..250 {
                    m.put(&format!("t{t}-{i}"), i);
                    m.put(&format!("shared-{}", i % 10), t);
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    assert_eq!(m.len(), 1000 + 10);
    assert_eq!(m.keys().len(), m.len());
}

fn write_str(out: &mut dyn Write, v: &String) -> io::Result<()> {
    record_store::wire::write_utf8(out, v)
}

fn read_str(input: &mut dyn Read) -> io::Result<String> {
    record_store::wire::read_utf8(input)
}

// Test: binary wire form through a caller-supplied codec.
// Verifies: bindings, order and case mode survive; count is big-endian.
#[test]
fn wire_round_trip_through_codec() {
    let codec = Utf8KeyCodec::new(write_str, read_str);
    let m: OrderedMap<String> = OrderedMap::new_record();
    for k in NUMBERS {
        m.put(k, k.to_lowercase());
    }
    m.put("one", "uno".into());

    let mut buf = Vec::new();
    m.write_to(&mut buf, &codec).unwrap();
    assert_eq!(&buf[..4], &[0, 0, 0, 6]);

    let back: OrderedMap<String> =
        OrderedMap::read_from(StoreConfig::record(), &mut buf.as_slice(), &codec).unwrap();
    assert_eq!(back.keys(), m.keys());
    assert_eq!(back.get("ONE").as_deref(), Some("uno"));
    assert_eq!(back, m);

    // Codecs are usable on their own, too.
    let mut key = Vec::new();
    WireCodec::<String>::write_key(&codec, &mut key, "Ab").unwrap();
    assert_eq!(key, [0, 0, 0, 2, b'A', b'b']);
}

// Test: serde form is an ordered JSON object.
#[test]
fn serde_json_keeps_order_and_yields_record_map() {
    let m: OrderedMap<i32> = OrderedMap::new();
    m.put("Zed", 1);
    m.put("Amy", 2);
    let json = serde_json::to_string(&m).unwrap();
    assert_eq!(json, r#"{"Zed":1,"Amy":2}"#);
    let back: OrderedMap<i32> = serde_json::from_str(&json).unwrap();
    assert_eq!(back.keys(), ["Zed", "Amy"]);
    assert_eq!(back.get("zed"), Some(1));
}
