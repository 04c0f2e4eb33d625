//!
//! Runtime Value Representation
//!
//! Every runtime value is an `Object`: a payload behind an atomic reference
//! count, tagged with the runtime that allocated it. Native code never sees
//! an `Object` directly, only handles:
//!
//! - `Owned`: one counted reference. Move-only; dropping it releases the
//!   reference, and the object is freed when the last one goes away.
//! - `Borrowed<'a>`: a non-owning view valid for `'a`. It is `Copy`, cannot
//!   release anything, and must be turned into an `Owned` (`into_owned`)
//!   before it is stored beyond `'a`.
//!
//! Immutable payloads (numbers, str, bytes, tuples, kinds) are read directly.
//! Mutable containers (list, dict, set) keep their contents in a `LockCell`,
//! reachable only through the runtime's `Held` guard.
//!

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use indexmap::IndexMap;

use crate::exception::KindId;
use crate::runtime::{HeapAccount, LockCell, RuntimeId};

/// Type tags for runtime values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    None,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    Tuple,
    List,
    Dict,
    Set,
    Kind,
    Iterator,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::None => "NoneType",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Str => "str",
            ValueType::Bytes => "bytes",
            ValueType::Tuple => "tuple",
            ValueType::List => "list",
            ValueType::Dict => "dict",
            ValueType::Set => "set",
            ValueType::Kind => "kind",
            ValueType::Iterator => "iterator",
        }
    }

    /// Values that own references to other values
    pub fn is_container(self) -> bool {
        matches!(self, ValueType::Tuple | ValueType::List | ValueType::Dict | ValueType::Set)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key under which a value is stored in a dict or set.
///
/// Numbers that compare equal share a key, so `1`, `1.0` and `True` are
/// the same dict key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum HashKey {
    None,
    Int(i128),
    Float(u64),
    Str(Box<str>),
    Bytes(Box<[u8]>),
    Tuple(Box<[HashKey]>),
    Kind(KindId),
}

impl HashKey {
    fn from_float(value: f64) -> HashKey {
        let integral = value.is_finite()
            && value.fract() == 0.0
            && value >= i128::MIN as f64
            && value < i128::MAX as f64;
        if integral {
            HashKey::Int(value as i128)
        } else {
            HashKey::Float(value.to_bits())
        }
    }
}

pub(crate) type DictEntries = IndexMap<HashKey, (Owned, Owned)>;
pub(crate) type SetEntries = IndexMap<HashKey, Owned>;

/// Iteration state: the source being walked and the next position in it.
/// For str the position is a byte offset.
pub(crate) struct IterState {
    pub(crate) source: Owned,
    pub(crate) position: AtomicUsize,
}

pub(crate) enum Payload {
    None,
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(Box<str>),
    Bytes(Box<[u8]>),
    Tuple(Box<[Owned]>),
    List(LockCell<Vec<Owned>>),
    Dict(LockCell<DictEntries>),
    Set(LockCell<SetEntries>),
    Kind(KindId),
    Iter(IterState),
}

impl Payload {
    pub(crate) fn value_type(&self) -> ValueType {
        match self {
            Payload::None => ValueType::None,
            Payload::Bool(_) => ValueType::Bool,
            Payload::Int(_) => ValueType::Int,
            Payload::Float(_) => ValueType::Float,
            Payload::Str(_) => ValueType::Str,
            Payload::Bytes(_) => ValueType::Bytes,
            Payload::Tuple(_) => ValueType::Tuple,
            Payload::List(_) => ValueType::List,
            Payload::Dict(_) => ValueType::Dict,
            Payload::Set(_) => ValueType::Set,
            Payload::Kind(_) => ValueType::Kind,
            Payload::Iter(_) => ValueType::Iterator,
        }
    }

    /// Hash key for dict/set storage, `None` if the value is unhashable
    pub(crate) fn hash_key(&self) -> Option<HashKey> {
        Some(match self {
            Payload::None => HashKey::None,
            Payload::Bool(b) => HashKey::Int(i128::from(*b)),
            Payload::Int(i) => HashKey::Int(*i),
            Payload::Float(f) => HashKey::from_float(*f),
            Payload::Str(s) => HashKey::Str(s.clone()),
            Payload::Bytes(b) => HashKey::Bytes(b.clone()),
            Payload::Tuple(items) => HashKey::Tuple(
                items
                    .iter()
                    .map(|item| item.object().payload.hash_key())
                    .collect::<Option<Box<[HashKey]>>>()?,
            ),
            Payload::Kind(kind) => HashKey::Kind(*kind),
            Payload::List(_) | Payload::Dict(_) | Payload::Set(_) | Payload::Iter(_) => return None,
        })
    }
}

/// Header and payload of one heap value
pub(crate) struct Object {
    account: Arc<HeapAccount>,
    pub(crate) payload: Payload,
}

impl Object {
    pub(crate) fn new(account: Arc<HeapAccount>, payload: Payload) -> Self {
        Self { account, payload }
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        self.account.free();
    }
}

/// An owned reference to a runtime value.
pub struct Owned(Arc<Object>);

impl Owned {
    pub(crate) fn from_object(object: Object) -> Self {
        Owned(Arc::new(object))
    }

    pub(crate) fn object(&self) -> &Object {
        &self.0
    }

    /// Borrowed view tied to this handle
    pub fn borrowed(&self) -> Borrowed<'_> {
        Borrowed(&self.0)
    }

    /// Acquire another reference to the same value.
    pub fn clone_ref(&self, _held: &crate::runtime::Held<'_>) -> Owned {
        Owned(Arc::clone(&self.0))
    }

    pub fn value_type(&self) -> ValueType {
        self.0.payload.value_type()
    }

    /// Identity comparison
    pub fn is<'a>(&self, other: impl Into<Borrowed<'a>>) -> bool {
        Arc::ptr_eq(&self.0, other.into().0)
    }

    pub fn runtime_id(&self) -> RuntimeId {
        self.0.account.runtime
    }
}

impl fmt::Debug for Owned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Owned(<{} at {:p}>)", self.value_type(), Arc::as_ptr(&self.0))
    }
}

/// A borrowed, non-owning view of a runtime value.
#[derive(Clone, Copy)]
pub struct Borrowed<'a>(&'a Arc<Object>);

impl<'a> Borrowed<'a> {
    /// Acquire a reference of our own, so the value can outlive `'a`.
    pub fn into_owned(self) -> Owned {
        Owned(Arc::clone(self.0))
    }

    pub fn value_type(self) -> ValueType {
        self.0.payload.value_type()
    }

    pub fn is<'b>(self, other: impl Into<Borrowed<'b>>) -> bool {
        Arc::ptr_eq(self.0, other.into().0)
    }

    pub fn runtime_id(self) -> RuntimeId {
        self.0.account.runtime
    }

    pub(crate) fn payload(self) -> &'a Payload {
        &self.0.payload
    }

    pub(crate) fn strong_count(self) -> usize {
        Arc::strong_count(self.0)
    }

    /// Address of the object, for identity tracking during recursive walks
    pub(crate) fn addr(self) -> usize {
        Arc::as_ptr(self.0) as usize
    }
}

impl fmt::Debug for Borrowed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Borrowed(<{} at {:p}>)", self.value_type(), Arc::as_ptr(self.0))
    }
}

impl<'a> From<&'a Owned> for Borrowed<'a> {
    fn from(owned: &'a Owned) -> Self {
        owned.borrowed()
    }
}

/// Anything that can be turned into an owned reference: an `Owned` is moved,
/// a borrowed view acquires a new reference.
pub trait IntoOwned {
    fn into_owned(self) -> Owned;
}

impl IntoOwned for Owned {
    fn into_owned(self) -> Owned {
        self
    }
}

impl IntoOwned for &Owned {
    fn into_owned(self) -> Owned {
        Owned(Arc::clone(&self.0))
    }
}

impl IntoOwned for Borrowed<'_> {
    fn into_owned(self) -> Owned {
        Borrowed::into_owned(self)
    }
}
