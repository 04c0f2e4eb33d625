//!
//! Plain Native Value Trees
//!
//! `NativeValue` is a runtime-independent copy of a value: what a host hands
//! in as call arguments and what it gets back as a result. Converting in
//! either direction copies; no handle crosses into a `NativeValue`.
//!

use indexmap::IndexMap;
use indexmap::map::Entry;

use crate::exception::{KindId, NativeResult};
use crate::raise_fmt;
use crate::runtime::{Held, LockCell};
use crate::value::{Borrowed, DictEntries, Owned, Payload, SetEntries};

const MAX_NATIVE_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    None,
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<NativeValue>),
    List(Vec<NativeValue>),
    /// Entries in insertion order
    Dict(Vec<(NativeValue, NativeValue)>),
    Set(Vec<NativeValue>),
    Kind(KindId),
}

impl NativeValue {
    pub fn str(value: impl Into<String>) -> Self {
        NativeValue::Str(value.into())
    }

    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        NativeValue::Bytes(value.into())
    }

    pub fn list<T: Into<NativeValue>>(items: impl IntoIterator<Item = T>) -> Self {
        NativeValue::List(items.into_iter().map(Into::into).collect())
    }

    pub fn tuple<T: Into<NativeValue>>(items: impl IntoIterator<Item = T>) -> Self {
        NativeValue::Tuple(items.into_iter().map(Into::into).collect())
    }

    pub fn set<T: Into<NativeValue>>(items: impl IntoIterator<Item = T>) -> Self {
        NativeValue::Set(items.into_iter().map(Into::into).collect())
    }

    pub fn dict<K: Into<NativeValue>, V: Into<NativeValue>>(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        NativeValue::Dict(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            NativeValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            NativeValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            NativeValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, NativeValue::None)
    }
}

impl From<bool> for NativeValue {
    fn from(value: bool) -> Self {
        NativeValue::Bool(value)
    }
}

macro_rules! impl_native_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for NativeValue {
                fn from(value: $ty) -> Self {
                    NativeValue::Int(i128::from(value))
                }
            }
        )*
    };
}

impl_native_from_int!(i8, i16, i32, i64, i128, u8, u16, u32, u64);

impl From<f64> for NativeValue {
    fn from(value: f64) -> Self {
        NativeValue::Float(value)
    }
}

impl From<&str> for NativeValue {
    fn from(value: &str) -> Self {
        NativeValue::Str(value.to_string())
    }
}

impl From<String> for NativeValue {
    fn from(value: String) -> Self {
        NativeValue::Str(value)
    }
}

impl<T: Into<NativeValue>> From<Option<T>> for NativeValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(NativeValue::None, Into::into)
    }
}

impl Held<'_> {
    /// Build a runtime object from a native value tree.
    pub fn to_value(&self, value: &NativeValue) -> NativeResult<Owned> {
        match value {
            NativeValue::None => self.new_none(),
            NativeValue::Bool(b) => self.new_bool(*b),
            NativeValue::Int(i) => self.new_int(*i),
            NativeValue::Float(f) => self.new_float(*f),
            NativeValue::Str(s) => self.new_str(s.as_str()),
            NativeValue::Bytes(b) => self.new_bytes(b.as_slice()),
            NativeValue::Tuple(items) => {
                let items = self.to_values(items)?;
                self.new_tuple(items)
            }
            NativeValue::List(items) => {
                let items = self.to_values(items)?;
                self.new_list_from(items)
            }
            NativeValue::Set(items) => {
                let mut members: SetEntries = IndexMap::with_capacity(items.len());
                for item in items {
                    let item = self.to_value(item)?;
                    let hash = self.hash_key_of(item.borrowed())?;
                    members.entry(hash).or_insert(item);
                }
                self.alloc(Payload::Set(LockCell::new(self.runtime_id(), members)))
            }
            NativeValue::Dict(pairs) => {
                let mut entries: DictEntries = IndexMap::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let key = self.to_value(key)?;
                    let value = self.to_value(value)?;
                    let hash = self.hash_key_of(key.borrowed())?;
                    match entries.entry(hash) {
                        Entry::Occupied(mut entry) => entry.get_mut().1 = value,
                        Entry::Vacant(entry) => {
                            entry.insert((key, value));
                        }
                    }
                }
                self.alloc(Payload::Dict(LockCell::new(self.runtime_id(), entries)))
            }
            NativeValue::Kind(kind) => {
                if self.kind_name(*kind).is_none() {
                    return Err(raise_fmt!(self, KindId::VALUE_ERROR, "unknown error kind #{}", kind.index()));
                }
                self.alloc(Payload::Kind(*kind))
            }
        }
    }

    fn to_values(&self, items: &[NativeValue]) -> NativeResult<Vec<Owned>> {
        items.iter().map(|item| self.to_value(item)).collect()
    }

    /// Copy a runtime object into a native value tree.
    pub fn to_native<'a>(&self, obj: impl Into<Borrowed<'a>>) -> NativeResult<NativeValue> {
        self.to_native_at(obj.into(), 0)
    }

    fn to_native_at(&self, obj: Borrowed<'_>, depth: usize) -> NativeResult<NativeValue> {
        if depth >= MAX_NATIVE_DEPTH {
            return Err(self.raise_simple(
                KindId::RUNTIME_ERROR,
                "maximum recursion depth exceeded while converting to a native value",
            ));
        }
        self.check_owner(obj)?;
        Ok(match obj.payload() {
            Payload::None => NativeValue::None,
            Payload::Bool(b) => NativeValue::Bool(*b),
            Payload::Int(i) => NativeValue::Int(*i),
            Payload::Float(f) => NativeValue::Float(*f),
            Payload::Str(s) => NativeValue::Str(s.to_string()),
            Payload::Bytes(b) => NativeValue::Bytes(b.to_vec()),
            Payload::Kind(kind) => NativeValue::Kind(*kind),
            Payload::Tuple(items) => NativeValue::Tuple(self.to_natives(items, depth)?),
            Payload::List(cell) => NativeValue::List(self.to_natives(cell.get(self), depth)?),
            Payload::Set(cell) => {
                let members = cell.get(self);
                let mut out = Vec::with_capacity(members.len());
                for member in members.values() {
                    out.push(self.to_native_at(member.borrowed(), depth + 1)?);
                }
                NativeValue::Set(out)
            }
            Payload::Dict(cell) => {
                let entries = cell.get(self);
                let mut out = Vec::with_capacity(entries.len());
                for (key, value) in entries.values() {
                    out.push((
                        self.to_native_at(key.borrowed(), depth + 1)?,
                        self.to_native_at(value.borrowed(), depth + 1)?,
                    ));
                }
                NativeValue::Dict(out)
            }
            Payload::Iter(_) => {
                return Err(self.raise_simple(
                    KindId::TYPE_ERROR,
                    "iterator cannot be converted to a native value",
                ));
            }
        })
    }

    fn to_natives(&self, items: &[Owned], depth: usize) -> NativeResult<Vec<NativeValue>> {
        items
            .iter()
            .map(|item| self.to_native_at(item.borrowed(), depth + 1))
            .collect()
    }
}
