//!
//! Decomposition Into Native Values
//!
//! `FromValue` reads a runtime object into a Rust value without taking
//! ownership of it. Numeric conversions follow the target representation
//! exactly: an out-of-range or negative-to-unsigned conversion fails instead
//! of wrapping. `Vec<T>` reads the elements of a list or tuple; the contents
//! of a `bytes` object are read with `Bytes`. `Held::extract` raises the failure as `TypeError` (or
//! `MisuseError` for an object of another runtime).
//!
//! Also here: structural equality (`equals`) and the `repr` rendering used in
//! error messages.
//!

use thiserror::Error;

use crate::exception::{KindId, NativeResult};
use crate::raise_fmt;
use crate::runtime::Held;
use crate::value::{Borrowed, Owned, Payload, ValueType};

/// Nesting limit for structural comparison; deeper structures are assumed
/// to be cyclic.
const MAX_COMPARE_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    #[error("expected {expected}, got {found}")]
    WrongType {
        expected: &'static str,
        found: ValueType,
    },

    #[error("value {value} out of range for {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("expected a tuple of length {expected}, got length {found}")]
    Arity { expected: usize, found: usize },

    #[error("object belongs to another runtime")]
    Foreign,
}

impl ConvertError {
    fn wrong_type(expected: &'static str, obj: Borrowed<'_>) -> Self {
        ConvertError::WrongType {
            expected,
            found: obj.value_type(),
        }
    }
}

/// Conversion from a runtime object to a native Rust value.
pub trait FromValue: Sized {
    fn from_value(held: &Held<'_>, obj: Borrowed<'_>) -> Result<Self, ConvertError>;
}

fn int_of(obj: Borrowed<'_>) -> Result<i128, ConvertError> {
    match obj.payload() {
        Payload::Int(i) => Ok(*i),
        Payload::Bool(b) => Ok(i128::from(*b)),
        _ => Err(ConvertError::wrong_type("int", obj)),
    }
}

macro_rules! impl_from_value_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(_held: &Held<'_>, obj: Borrowed<'_>) -> Result<Self, ConvertError> {
                    let wide = int_of(obj)?;
                    <$ty>::try_from(wide).map_err(|_| ConvertError::OutOfRange {
                        value: wide.to_string(),
                        target: stringify!($ty),
                    })
                }
            }
        )*
    };
}

impl_from_value_int!(i8, i16, i32, i64, i128, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(_held: &Held<'_>, obj: Borrowed<'_>) -> Result<Self, ConvertError> {
        match obj.payload() {
            Payload::Float(f) => Ok(*f),
            Payload::Int(i) => Ok(*i as f64),
            Payload::Bool(b) => Ok(f64::from(u8::from(*b))),
            _ => Err(ConvertError::wrong_type("float", obj)),
        }
    }
}

impl FromValue for bool {
    fn from_value(_held: &Held<'_>, obj: Borrowed<'_>) -> Result<Self, ConvertError> {
        match obj.payload() {
            Payload::Bool(b) => Ok(*b),
            _ => Err(ConvertError::wrong_type("bool", obj)),
        }
    }
}

impl FromValue for String {
    fn from_value(_held: &Held<'_>, obj: Borrowed<'_>) -> Result<Self, ConvertError> {
        match obj.payload() {
            Payload::Str(s) => Ok(s.to_string()),
            _ => Err(ConvertError::wrong_type("str", obj)),
        }
    }
}

/// Contents of a runtime `bytes` object
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl std::ops::Deref for Bytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Bytes> for Vec<u8> {
    fn from(bytes: Bytes) -> Self {
        bytes.0
    }
}

impl FromValue for Bytes {
    fn from_value(_held: &Held<'_>, obj: Borrowed<'_>) -> Result<Self, ConvertError> {
        match obj.payload() {
            Payload::Bytes(b) => Ok(Bytes(b.to_vec())),
            _ => Err(ConvertError::wrong_type("bytes", obj)),
        }
    }
}

impl FromValue for Owned {
    fn from_value(_held: &Held<'_>, obj: Borrowed<'_>) -> Result<Self, ConvertError> {
        Ok(obj.into_owned())
    }
}

/// The runtime `None` maps to `None`.
impl<T: FromValue> FromValue for Option<T> {
    fn from_value(held: &Held<'_>, obj: Borrowed<'_>) -> Result<Self, ConvertError> {
        match obj.payload() {
            Payload::None => Ok(None),
            _ => T::from_value(held, obj).map(Some),
        }
    }
}

/// Elements of a list or tuple.
impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(held: &Held<'_>, obj: Borrowed<'_>) -> Result<Self, ConvertError> {
        match obj.payload() {
            Payload::Tuple(items) => items.iter().map(|item| T::from_value(held, item.borrowed())).collect(),
            Payload::List(cell) => {
                if !cell.belongs_to(held.runtime_id()) {
                    return Err(ConvertError::Foreign);
                }
                cell.get(held)
                    .iter()
                    .map(|item| T::from_value(held, item.borrowed()))
                    .collect()
            }
            _ => Err(ConvertError::wrong_type("list or tuple", obj)),
        }
    }
}

macro_rules! impl_from_value_tuple {
    ($len:expr => $($name:ident : $idx:tt),+) => {
        impl<$($name: FromValue),+> FromValue for ($($name,)+) {
            fn from_value(held: &Held<'_>, obj: Borrowed<'_>) -> Result<Self, ConvertError> {
                let items = match obj.payload() {
                    Payload::Tuple(items) => items,
                    _ => return Err(ConvertError::wrong_type("tuple", obj)),
                };
                if items.len() != $len {
                    return Err(ConvertError::Arity { expected: $len, found: items.len() });
                }
                Ok(($($name::from_value(held, items[$idx].borrowed())?,)+))
            }
        }
    };
}

impl_from_value_tuple!(1 => A: 0);
impl_from_value_tuple!(2 => A: 0, B: 1);
impl_from_value_tuple!(3 => A: 0, B: 1, C: 2);
impl_from_value_tuple!(4 => A: 0, B: 1, C: 2, D: 3);

impl Held<'_> {
    /// Read `obj` as a native `T`, raising on mismatch.
    pub fn extract<'a, T: FromValue>(&self, obj: impl Into<Borrowed<'a>>) -> NativeResult<T> {
        let obj = obj.into();
        self.check_owner(obj)?;
        T::from_value(self, obj).map_err(|err| match err {
            ConvertError::Foreign => self.foreign_object(obj),
            other => self.raise_simple(KindId::TYPE_ERROR, other.to_string()),
        })
    }

    /// Structural equality. Numbers compare by value across int, float and
    /// bool; containers compare element by element.
    pub fn equals<'a, 'b>(&self, left: impl Into<Borrowed<'a>>, right: impl Into<Borrowed<'b>>) -> NativeResult<bool> {
        self.equals_at(left.into(), right.into(), 0)
    }

    fn equals_at(&self, left: Borrowed<'_>, right: Borrowed<'_>, depth: usize) -> NativeResult<bool> {
        if left.is(right) {
            return Ok(true);
        }
        if depth >= MAX_COMPARE_DEPTH {
            return Err(self.raise_simple(
                KindId::RUNTIME_ERROR,
                "maximum recursion depth exceeded in comparison",
            ));
        }
        self.check_owner(left)?;
        self.check_owner(right)?;

        Ok(match (left.payload(), right.payload()) {
            (Payload::None, Payload::None) => true,
            (Payload::Str(a), Payload::Str(b)) => a == b,
            (Payload::Bytes(a), Payload::Bytes(b)) => a == b,
            (Payload::Kind(a), Payload::Kind(b)) => a == b,
            (Payload::Tuple(a), Payload::Tuple(b)) => self.all_equal(a, b, depth)?,
            (Payload::List(a), Payload::List(b)) => self.all_equal(a.get(self), b.get(self), depth)?,
            (Payload::Set(a), Payload::Set(b)) => {
                let (a, b) = (a.get(self), b.get(self));
                a.len() == b.len() && a.keys().all(|key| b.contains_key(key))
            }
            (Payload::Dict(a), Payload::Dict(b)) => {
                let (a, b) = (a.get(self), b.get(self));
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (key, (_, value)) in a {
                    let Some((_, other)) = b.get(key) else {
                        return Ok(false);
                    };
                    if !self.equals_at(value.borrowed(), other.borrowed(), depth + 1)? {
                        return Ok(false);
                    }
                }
                true
            }
            (a, b) => numbers_equal(a, b),
        })
    }

    fn all_equal(&self, left: &[Owned], right: &[Owned], depth: usize) -> NativeResult<bool> {
        if left.len() != right.len() {
            return Ok(false);
        }
        for (a, b) in left.iter().zip(right) {
            if !self.equals_at(a.borrowed(), b.borrowed(), depth + 1)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Human-readable rendering, as shown in error messages.
    pub fn repr<'a>(&self, obj: impl Into<Borrowed<'a>>) -> String {
        let mut out = String::new();
        self.write_repr(obj.into(), &mut Vec::new(), &mut out);
        out
    }

    fn write_repr(&self, obj: Borrowed<'_>, active: &mut Vec<usize>, out: &mut String) {
        use std::fmt::Write;

        let foreign = obj.runtime_id() != self.runtime_id();
        match obj.payload() {
            Payload::None => out.push_str("None"),
            Payload::Bool(true) => out.push_str("True"),
            Payload::Bool(false) => out.push_str("False"),
            Payload::Int(i) => {
                let _ = write!(out, "{i}");
            }
            Payload::Float(f) => {
                let _ = write!(out, "{f:?}");
            }
            Payload::Str(s) => {
                let _ = write!(out, "'{}'", s.escape_debug());
            }
            Payload::Bytes(b) => {
                let _ = write!(out, "b'{}'", b.escape_ascii());
            }
            Payload::Kind(kind) => match self.kind_name(*kind) {
                Some(name) => {
                    let _ = write!(out, "<kind '{name}'>");
                }
                None => out.push_str("<kind>"),
            },
            Payload::Iter(_) => out.push_str("<iterator>"),
            _ if foreign => {
                let _ = write!(out, "<foreign {}>", obj.value_type());
            }
            _ if active.contains(&obj.addr()) => out.push_str(match obj.value_type() {
                ValueType::List => "[...]",
                ValueType::Tuple => "(...)",
                _ => "{...}",
            }),
            Payload::Tuple(items) => {
                active.push(obj.addr());
                out.push('(');
                self.write_items(items, active, out);
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
                active.pop();
            }
            Payload::List(cell) => {
                active.push(obj.addr());
                out.push('[');
                self.write_items(cell.get(self), active, out);
                out.push(']');
                active.pop();
            }
            Payload::Set(cell) => {
                let members = cell.get(self);
                if members.is_empty() {
                    out.push_str("set()");
                    return;
                }
                active.push(obj.addr());
                out.push('{');
                for (i, member) in members.values().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_repr(member.borrowed(), active, out);
                }
                out.push('}');
                active.pop();
            }
            Payload::Dict(cell) => {
                active.push(obj.addr());
                out.push('{');
                for (i, (key, value)) in cell.get(self).values().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_repr(key.borrowed(), active, out);
                    out.push_str(": ");
                    self.write_repr(value.borrowed(), active, out);
                }
                out.push('}');
                active.pop();
            }
        }
    }

    fn write_items(&self, items: &[Owned], active: &mut Vec<usize>, out: &mut String) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.write_repr(item.borrowed(), active, out);
        }
    }

    /// Raise `TypeError` unless `obj` is exactly of type `ty`.
    pub fn expect_type<'a>(&self, obj: impl Into<Borrowed<'a>>, ty: ValueType) -> NativeResult<()> {
        let obj = obj.into();
        if obj.value_type() == ty {
            Ok(())
        } else {
            Err(raise_fmt!(self, KindId::TYPE_ERROR, "expected {}, got {}", ty, obj.value_type()))
        }
    }
}

fn numbers_equal(left: &Payload, right: &Payload) -> bool {
    let as_number = |payload: &Payload| match payload {
        Payload::Bool(b) => Some(Number::Int(i128::from(*b))),
        Payload::Int(i) => Some(Number::Int(*i)),
        Payload::Float(f) => Some(Number::Float(*f)),
        _ => None,
    };
    match (as_number(left), as_number(right)) {
        (Some(Number::Int(a)), Some(Number::Int(b))) => a == b,
        (Some(Number::Float(a)), Some(Number::Float(b))) => a == b,
        (Some(Number::Int(i)), Some(Number::Float(f))) | (Some(Number::Float(f)), Some(Number::Int(i))) => {
            f.fract() == 0.0 && f >= i128::MIN as f64 && f < i128::MAX as f64 && f as i128 == i
        }
        _ => false,
    }
}

enum Number {
    Int(i128),
    Float(f64),
}
