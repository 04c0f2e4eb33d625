//!
//! Bound Arguments
//!
//! `Bindings` is the successful result of decoding: one `Bound` value per
//! schema slot, in slot order. `Bindings::extract` turns them into a Rust
//! tuple. The schema already guarantees the shape, so a mismatch between
//! the schema and the requested tuple type is a bug in the native function
//! and is raised as `SystemError`.
//!

use membrane_core::{Held, KindId, NativeResult, Owned};
use smallvec::SmallVec;
use thiserror::Error;

/// One decoded slot
#[derive(Debug)]
pub enum Bound {
    /// Optional slot left unset (`DefaultValue::NoValue`)
    NoValue,
    /// The runtime `None`
    None,
    Bool(bool),
    Int(i128),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Object(Owned),
    List(Vec<Bound>),
    Tuple(Vec<Bound>),
}

impl Bound {
    pub fn kind(&self) -> &'static str {
        match self {
            Bound::NoValue => "no value",
            Bound::None => "None",
            Bound::Bool(_) => "bool",
            Bound::Int(_) => "int",
            Bound::Float(_) => "float",
            Bound::Text(_) => "str",
            Bound::Bytes(_) => "bytes",
            Bound::Object(_) => "object",
            Bound::List(_) => "list",
            Bound::Tuple(_) => "tuple",
        }
    }

    pub fn is_set(&self) -> bool {
        !matches!(self, Bound::NoValue)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundMismatch {
    #[error("expected {expected}, bound {found}")]
    Kind {
        expected: &'static str,
        found: &'static str,
    },

    #[error("bound integer {value} does not fit {target}")]
    Range { value: i128, target: &'static str },

    #[error("expected {expected} bound values, have {found}")]
    Count { expected: usize, found: usize },
}

/// Conversion from one bound slot into a Rust value
pub trait FromBound: Sized {
    fn from_bound(bound: Bound) -> Result<Self, BoundMismatch>;
}

fn mismatch(expected: &'static str, bound: &Bound) -> BoundMismatch {
    BoundMismatch::Kind {
        expected,
        found: bound.kind(),
    }
}

impl FromBound for Bound {
    fn from_bound(bound: Bound) -> Result<Self, BoundMismatch> {
        Ok(bound)
    }
}

macro_rules! impl_from_bound_int {
    ($($ty:ty),*) => {
        $(
            impl FromBound for $ty {
                fn from_bound(bound: Bound) -> Result<Self, BoundMismatch> {
                    match bound {
                        Bound::Int(value) => <$ty>::try_from(value).map_err(|_| BoundMismatch::Range {
                            value,
                            target: stringify!($ty),
                        }),
                        other => Err(mismatch("int", &other)),
                    }
                }
            }
        )*
    };
}

impl_from_bound_int!(i32, i64, u32, u64, i128, usize);

impl FromBound for f64 {
    fn from_bound(bound: Bound) -> Result<Self, BoundMismatch> {
        match bound {
            Bound::Float(value) => Ok(value),
            other => Err(mismatch("float", &other)),
        }
    }
}

impl FromBound for bool {
    fn from_bound(bound: Bound) -> Result<Self, BoundMismatch> {
        match bound {
            Bound::Bool(value) => Ok(value),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl FromBound for String {
    fn from_bound(bound: Bound) -> Result<Self, BoundMismatch> {
        match bound {
            Bound::Text(value) => Ok(value),
            other => Err(mismatch("str", &other)),
        }
    }
}

impl FromBound for Vec<u8> {
    fn from_bound(bound: Bound) -> Result<Self, BoundMismatch> {
        match bound {
            Bound::Bytes(value) => Ok(value),
            other => Err(mismatch("bytes", &other)),
        }
    }
}

impl FromBound for Owned {
    fn from_bound(bound: Bound) -> Result<Self, BoundMismatch> {
        match bound {
            Bound::Object(value) => Ok(value),
            other => Err(mismatch("object", &other)),
        }
    }
}

/// Unset and `None` slots become `None`.
impl<T: FromBound> FromBound for Option<T> {
    fn from_bound(bound: Bound) -> Result<Self, BoundMismatch> {
        match bound {
            Bound::NoValue | Bound::None => Ok(None),
            other => T::from_bound(other).map(Some),
        }
    }
}

impl<T: FromBound> FromBound for Vec<T> {
    fn from_bound(bound: Bound) -> Result<Self, BoundMismatch> {
        match bound {
            Bound::List(items) => items.into_iter().map(T::from_bound).collect(),
            other => Err(mismatch("list", &other)),
        }
    }
}

macro_rules! impl_from_bound_tuple {
    ($len:expr => $($name:ident),+) => {
        impl<$($name: FromBound),+> FromBound for ($($name,)+) {
            fn from_bound(bound: Bound) -> Result<Self, BoundMismatch> {
                let items = match bound {
                    Bound::Tuple(items) => items,
                    other => return Err(mismatch("tuple", &other)),
                };
                if items.len() != $len {
                    return Err(BoundMismatch::Count { expected: $len, found: items.len() });
                }
                let mut items = items.into_iter();
                Ok(($($name::from_bound(next_bound(&mut items))?,)+))
            }
        }
    };
}

fn next_bound(items: &mut impl Iterator<Item = Bound>) -> Bound {
    items.next().unwrap_or(Bound::NoValue)
}

impl_from_bound_tuple!(2 => A, B);
impl_from_bound_tuple!(3 => A, B, C);
impl_from_bound_tuple!(4 => A, B, C, D);

/// Conversion from a full set of bindings into a Rust tuple
pub trait FromBindings: Sized {
    fn from_bindings(values: SmallVec<[Bound; 6]>) -> Result<Self, BoundMismatch>;
}

macro_rules! impl_from_bindings {
    ($len:expr => $($name:ident),*) => {
        impl<$($name: FromBound),*> FromBindings for ($($name,)*) {
            #[allow(unused_mut, unused_variables)]
            fn from_bindings(values: SmallVec<[Bound; 6]>) -> Result<Self, BoundMismatch> {
                if values.len() != $len {
                    return Err(BoundMismatch::Count { expected: $len, found: values.len() });
                }
                let mut values = values.into_iter();
                Ok(($($name::from_bound(next_bound(&mut values))?,)*))
            }
        }
    };
}

impl_from_bindings!(0 =>);
impl_from_bindings!(1 => A);
impl_from_bindings!(2 => A, B);
impl_from_bindings!(3 => A, B, C);
impl_from_bindings!(4 => A, B, C, D);
impl_from_bindings!(5 => A, B, C, D, E);
impl_from_bindings!(6 => A, B, C, D, E, F);

/// Decoded arguments of one call, in schema slot order
#[derive(Debug)]
pub struct Bindings {
    function: String,
    names: SmallVec<[String; 6]>,
    values: SmallVec<[Bound; 6]>,
}

impl Bindings {
    pub(crate) fn new(function: &str, names: SmallVec<[String; 6]>, values: SmallVec<[Bound; 6]>) -> Self {
        Self {
            function: function.to_string(),
            names,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Bound> {
        let index = self.names.iter().position(|n| n == name)?;
        self.values.get(index)
    }

    /// Whether the slot was supplied or received a default other than `NoValue`
    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some_and(Bound::is_set)
    }

    /// Remove a slot's value, leaving `NoValue` behind.
    pub fn take(&mut self, name: &str) -> Option<Bound> {
        let index = self.names.iter().position(|n| n == name)?;
        self.values.get_mut(index).map(|slot| std::mem::replace(slot, Bound::NoValue))
    }

    /// Convert every slot, in order, into a Rust tuple.
    pub fn extract<T: FromBindings>(self, held: &Held<'_>) -> NativeResult<T> {
        let function = self.function;
        T::from_bindings(self.values).map_err(|err| {
            tracing::error!(function = %function, %err, "bindings do not match the requested types");
            membrane_core::raise_fmt!(
                held,
                KindId::SYSTEM_ERROR,
                "{}(): bindings do not match the requested types: {}",
                function,
                err
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use membrane_core::Runtime;
    use smallvec::smallvec;

    fn bindings(values: SmallVec<[Bound; 6]>) -> Bindings {
        let names = (0..values.len()).map(|i| format!("arg{i}")).collect();
        Bindings::new("f", names, values)
    }

    #[test]
    fn test_extract_tuple() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let b = bindings(smallvec![Bound::Int(3), Bound::Float(2.5), Bound::Text("hi".into())]);
        let (i, d, s): (i32, f64, String) = b.extract(&held).unwrap();
        assert_eq!((i, d, s.as_str()), (3, 2.5, "hi"));
    }

    #[test]
    fn test_optional_slots() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let b = bindings(smallvec![Bound::NoValue, Bound::None, Bound::Int(1)]);
        assert!(!b.is_set("arg0"));
        assert!(b.is_set("arg1"));
        let (a, b, c): (Option<i64>, Option<String>, Option<u32>) = b.extract(&held).unwrap();
        assert_eq!((a, b, c), (None, None, Some(1)));
    }

    #[test]
    fn test_mismatch_is_system_error() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let b = bindings(smallvec![Bound::Text("x".into())]);
        assert!(b.extract::<(i32,)>(&held).is_err());
        let exc = held.take_error().unwrap();
        assert_eq!(exc.kind(), KindId::SYSTEM_ERROR);
        assert!(exc.message().contains("expected int, bound str"));

        let b = bindings(smallvec![Bound::Int(1)]);
        assert!(b.extract::<(i32, i32)>(&held).is_err());
        assert_eq!(held.take_error().unwrap().kind(), KindId::SYSTEM_ERROR);
    }

    #[test]
    fn test_nested_tuple_and_list() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let b = bindings(smallvec![
            Bound::Tuple(vec![Bound::Int(42), Bound::Text("test".into()), Bound::Float(2.5)]),
            Bound::List(vec![Bound::Int(1), Bound::Int(2)]),
        ]);
        let ((n, s, f), list): ((i32, String, f64), Vec<i64>) = b.extract(&held).unwrap();
        assert_eq!((n, s.as_str(), f, list), (42, "test", 2.5, vec![1, 2]));
    }

    #[test]
    fn test_take_leaves_no_value() {
        let mut b = bindings(smallvec![Bound::Int(7)]);
        assert!(matches!(b.take("arg0"), Some(Bound::Int(7))));
        assert!(!b.is_set("arg0"));
        assert!(b.take("missing").is_none());
    }
}
