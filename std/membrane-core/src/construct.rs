//!
//! Value Construction
//!
//! Every constructor returns a fresh `Owned` handle. Construction only fails
//! under resource exhaustion (the runtime's heap limit), which raises the
//! fatal `AllocationError`, or when a foreign object is handed to a
//! container constructor (`MisuseError`).
//!
//! Containers start empty; `containers.rs` holds the insert operations.
//!

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::error;

use crate::exception::{KindId, NativeResult, Raised};
use crate::runtime::{Held, LockCell};
use crate::value::{Borrowed, IntoOwned, Object, Owned, Payload};

impl Held<'_> {
    /// Allocate one object on this runtime's heap.
    pub(crate) fn alloc(&self, payload: Payload) -> NativeResult<Owned> {
        let account = self.account();
        if !account.reserve() {
            error!(
                runtime = self.runtime_id().get(),
                limit = ?account.limit(),
                "heap object limit exceeded"
            );
            return Err(self.raise_simple(KindId::ALLOCATION_ERROR, "heap object limit exceeded"));
        }
        Ok(Owned::from_object(Object::new(Arc::clone(account), payload)))
    }

    /// Raise `TypeError` naming the expected and the actual type.
    pub fn expected<'a>(&self, what: &str, obj: impl Into<Borrowed<'a>>) -> Raised {
        let obj = obj.into();
        crate::raise_fmt!(self, KindId::TYPE_ERROR, "expected {}, got {}", what, obj.value_type())
    }

    pub fn new_none(&self) -> NativeResult<Owned> {
        self.alloc(Payload::None)
    }

    pub fn new_bool(&self, value: bool) -> NativeResult<Owned> {
        self.alloc(Payload::Bool(value))
    }

    /// Any native integer up to 128 bits
    pub fn new_int(&self, value: impl Into<i128>) -> NativeResult<Owned> {
        self.alloc(Payload::Int(value.into()))
    }

    pub fn new_float(&self, value: f64) -> NativeResult<Owned> {
        self.alloc(Payload::Float(value))
    }

    pub fn new_str(&self, value: impl Into<String>) -> NativeResult<Owned> {
        self.alloc(Payload::Str(value.into().into_boxed_str()))
    }

    /// String rendered from format arguments, e.g. `format_args!("{}-{}", a, b)`
    pub fn new_str_fmt(&self, args: fmt::Arguments<'_>) -> NativeResult<Owned> {
        self.new_str(args.to_string())
    }

    pub fn new_bytes(&self, value: impl Into<Vec<u8>>) -> NativeResult<Owned> {
        self.alloc(Payload::Bytes(value.into().into_boxed_slice()))
    }

    /// Tuple taking ownership of `items`.
    pub fn new_tuple(&self, items: Vec<Owned>) -> NativeResult<Owned> {
        for item in &items {
            self.check_owner(item.borrowed())?;
        }
        self.alloc(Payload::Tuple(items.into_boxed_slice()))
    }

    /// Tuple acquiring a reference to each of `items`.
    pub fn tuple_pack(&self, items: &[Borrowed<'_>]) -> NativeResult<Owned> {
        let items = items.iter().map(|item| item.into_owned()).collect();
        self.new_tuple(items)
    }

    pub fn new_list(&self) -> NativeResult<Owned> {
        self.alloc(Payload::List(LockCell::new(self.runtime_id(), Vec::new())))
    }

    /// List taking ownership of `items`, in order.
    pub fn new_list_from<I>(&self, items: I) -> NativeResult<Owned>
    where
        I: IntoIterator,
        I::Item: IntoOwned,
    {
        let items: Vec<Owned> = items.into_iter().map(IntoOwned::into_owned).collect();
        for item in &items {
            self.check_owner(item.borrowed())?;
        }
        self.alloc(Payload::List(LockCell::new(self.runtime_id(), items)))
    }

    pub fn new_dict(&self) -> NativeResult<Owned> {
        self.alloc(Payload::Dict(LockCell::new(self.runtime_id(), IndexMap::new())))
    }

    pub fn new_set(&self) -> NativeResult<Owned> {
        self.alloc(Payload::Set(LockCell::new(self.runtime_id(), IndexMap::new())))
    }

    /// Concatenate two strings into a new one.
    pub fn str_concat<'a, 'b>(
        &self,
        left: impl Into<Borrowed<'a>>,
        right: impl Into<Borrowed<'b>>,
    ) -> NativeResult<Owned> {
        let (left, right) = (left.into(), right.into());
        match (left.payload(), right.payload()) {
            (Payload::Str(l), Payload::Str(r)) => {
                let mut joined = String::with_capacity(l.len() + r.len());
                joined.push_str(l);
                joined.push_str(r);
                self.new_str(joined)
            }
            (Payload::Str(_), _) => Err(self.expected("str", right)),
            _ => Err(self.expected("str", left)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::exception::KindId;
    use crate::runtime::{HeapLimits, Runtime};
    use crate::value::ValueType;

    #[test]
    fn test_constructors_return_fresh_objects() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let a = held.new_none().unwrap();
        let b = held.new_none().unwrap();
        assert_eq!(a.value_type(), ValueType::None);
        assert!(!a.is(&b));
        assert_eq!(held.live_objects(), 2);

        assert_eq!(held.new_int(u64::MAX).unwrap().value_type(), ValueType::Int);
        assert_eq!(held.new_float(2.5).unwrap().value_type(), ValueType::Float);
        assert_eq!(held.new_bytes(b"raw".to_vec()).unwrap().value_type(), ValueType::Bytes);
        assert_eq!(rt.total_allocations(), 5);
    }

    #[test]
    fn test_tuple_takes_ownership() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let first = held.new_int(1).unwrap();
        let second = held.new_str("two").unwrap();
        let alias = first.clone_ref(&held);
        let tuple = held.new_tuple(vec![first, second]).unwrap();
        assert_eq!(held.refcount(&alias), 2);

        drop(tuple);
        assert_eq!(held.refcount(&alias), 1);
        assert_eq!(held.live_objects(), 1);
    }

    #[test]
    fn test_tuple_pack_acquires() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let item = held.new_int(9).unwrap();
        let tuple = held.tuple_pack(&[item.borrowed(), item.borrowed()]).unwrap();
        assert_eq!(held.refcount(&item), 3);
        drop(tuple);
        assert_eq!(held.refcount(&item), 1);
    }

    #[test]
    fn test_foreign_object_in_tuple_is_misuse() {
        let other = Runtime::new();
        let foreign = other.with_held(|held| held.new_int(1).unwrap()).unwrap();

        let rt = Runtime::new();
        let held = rt.acquire().unwrap();
        assert!(held.new_tuple(vec![foreign]).is_err());
        assert_eq!(held.take_error().unwrap().kind(), KindId::MISUSE_ERROR);
        assert_eq!(other.live_objects(), 0);
    }

    #[test]
    fn test_str_concat() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let hello = held.new_str("Hello, ").unwrap();
        let name = held.new_str("World").unwrap();
        let joined = held.str_concat(&hello, &name).unwrap();
        assert_eq!(held.extract::<String>(&joined).unwrap(), "Hello, World");

        let number = held.new_int(1).unwrap();
        assert!(held.str_concat(&hello, &number).is_err());
        let exc = held.take_error().unwrap();
        assert_eq!(exc.kind(), KindId::TYPE_ERROR);
        assert_eq!(exc.message(), "expected str, got int");
    }

    #[test]
    fn test_allocation_error_is_fatal() {
        let rt = Runtime::with_limits(HeapLimits { max_objects: Some(0) });
        let held = rt.acquire().unwrap();

        assert!(held.new_list().is_err());
        let exc = held.take_error().unwrap();
        assert_eq!(exc.kind(), KindId::ALLOCATION_ERROR);
        assert!(exc.is_fatal());
        assert_eq!(held.live_objects(), 0);
    }
}
