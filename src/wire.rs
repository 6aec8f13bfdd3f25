//! Persisted forms of an `OrderedMap`.
//!
//! Binary: `[count: i32 big-endian][count x (key, value)]` in insertion
//! order, with key and value encodings supplied by a `WireCodec`. Reading
//! replays `put` in the written order, so both bindings and order survive
//! a round trip.
//!
//! serde: an ordered map of string keys. Deserialized maps are
//! case-insensitive record maps.

use core::fmt;
use core::hash::BuildHasher;
use core::marker::PhantomData;
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::io::{self, Read, Write};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::ordered_map::OrderedMap;

/// Key and value encodings for the binary form.
pub trait WireCodec<V> {
    fn write_key(&self, out: &mut dyn Write, key: &str) -> io::Result<()>;
    fn read_key(&self, input: &mut dyn Read) -> io::Result<String>;
    fn write_value(&self, out: &mut dyn Write, value: &V) -> io::Result<()>;
    fn read_value(&self, input: &mut dyn Read) -> io::Result<V>;
}

pub fn write_i32(out: &mut dyn Write, n: i32) -> io::Result<()> {
    out.write_all(&n.to_be_bytes())
}

pub fn read_i32(input: &mut dyn Read) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

/// Length-prefixed UTF-8: `[len: i32][bytes]`.
pub fn write_utf8(out: &mut dyn Write, s: &str) -> io::Result<()> {
    let len = i32::try_from(s.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "string too long"))?;
    write_i32(out, len)?;
    out.write_all(s.as_bytes())
}

pub fn read_utf8(input: &mut dyn Read) -> io::Result<String> {
    let len = read_i32(input)?;
    let len = usize::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "negative string length"))?;
    // Grow with the bytes actually read, not the declared length.
    let mut buf = Vec::new();
    input.take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "string shorter than its declared length",
        ));
    }
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Codec with `[len: i32][utf-8]` keys and caller-supplied value
/// functions.
pub struct Utf8KeyCodec<W, R> {
    write_value: W,
    read_value: R,
}

impl<W, R> Utf8KeyCodec<W, R> {
    pub fn new(write_value: W, read_value: R) -> Self {
        Self {
            write_value,
            read_value,
        }
    }
}

impl<V, W, R> WireCodec<V> for Utf8KeyCodec<W, R>
where
    W: Fn(&mut dyn Write, &V) -> io::Result<()>,
    R: Fn(&mut dyn Read) -> io::Result<V>,
{
    fn write_key(&self, out: &mut dyn Write, key: &str) -> io::Result<()> {
        write_utf8(out, key)
    }

    fn read_key(&self, input: &mut dyn Read) -> io::Result<String> {
        read_utf8(input)
    }

    fn write_value(&self, out: &mut dyn Write, value: &V) -> io::Result<()> {
        (self.write_value)(out, value)
    }

    fn read_value(&self, input: &mut dyn Read) -> io::Result<V> {
        (self.read_value)(input)
    }
}

impl<V, S> OrderedMap<V, S>
where
    V: Clone,
    S: BuildHasher,
{
    /// Write the binary form. Entries are snapshotted first; no I/O runs
    /// while the map is locked.
    pub fn write_to<C: WireCodec<V>>(&self, out: &mut dyn Write, codec: &C) -> Result<()> {
        let entries = self.entries();
        let count = i32::try_from(entries.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "too many entries for wire form")
        })?;
        write_i32(out, count)?;
        for entry in &entries {
            codec.write_key(out, entry.key())?;
            codec.write_value(out, entry.value())?;
        }
        Ok(())
    }

    /// Read the binary form into a fresh map built with `config` and `hasher`.
    pub fn read_from_with_hasher<C: WireCodec<V>>(
        config: StoreConfig,
        hasher: S,
        input: &mut dyn Read,
        codec: &C,
    ) -> Result<Self> {
        let count = read_i32(input)?;
        if count < 0 {
            return Err(StoreError::NegativeCount(count));
        }
        let map = Self::with_config_and_hasher(config, hasher);
        for _ in 0..count {
            let key = codec.read_key(input)?;
            let value = codec.read_value(input)?;
            map.put(&key, value);
        }
        Ok(map)
    }
}

impl<V: Clone> OrderedMap<V> {
    pub fn read_from<C: WireCodec<V>>(
        config: StoreConfig,
        input: &mut dyn Read,
        codec: &C,
    ) -> Result<Self> {
        Self::read_from_with_hasher(config, Default::default(), input, codec)
    }
}

impl<V, S> Serialize for OrderedMap<V, S>
where
    V: Serialize,
    S: BuildHasher,
{
    fn serialize<Ser: Serializer>(
        &self,
        serializer: Ser,
    ) -> std::result::Result<Ser::Ok, Ser::Error> {
        let order = self.lock();
        let mut map = serializer.serialize_map(Some(order.len()))?;
        for (_, node) in order.iter() {
            map.serialize_entry(&node.key, &node.value)?;
        }
        map.end()
    }
}

impl<'de, V> Deserialize<'de> for OrderedMap<V>
where
    V: Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

struct OrderedMapVisitor<V>(PhantomData<fn() -> V>);

impl<'de, V> Visitor<'de> for OrderedMapVisitor<V>
where
    V: Deserialize<'de>,
{
    type Value = OrderedMap<V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map with string keys")
    }

    fn visit_map<A: MapAccess<'de>>(
        self,
        mut access: A,
    ) -> std::result::Result<Self::Value, A::Error> {
        let config = StoreConfig::record().with_capacity(access.size_hint().unwrap_or(0));
        let map = OrderedMap::with_config(config);
        while let Some((key, value)) = access.next_entry::<String, V>()? {
            map.put(&key, value);
        }
        Ok(map)
    }
}
