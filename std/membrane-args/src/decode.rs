//!
//! Generic Argument Decoder
//!
//! `decode` binds an `ArgBundle` against a `Schema`. Checks run in a fixed
//! order and the first failure is raised, exactly once:
//!
//! 1. more positionals than slots: `ArityError`
//! 2. keywords passed to a schema without keyword support: `KeywordError`
//! 3. unknown keyword, or a slot given both by position and by name:
//!    `KeywordError`
//! 4. a required slot left unfilled: `ArityError` for positional-only
//!    schemas, `KeywordError` otherwise
//! 5. a value not convertible to its slot type: `TypeError`
//!
//! Nothing is bound until every check has passed, so a failed decode leaves
//! no partial bindings behind.
//!

use membrane_core::{Borrowed, Bytes, ConvertError, FromValue, Held, KindId, NativeResult, Owned, ValueType, raise_fmt};
use smallvec::SmallVec;
use thiserror::Error;
use tracing::trace;

use crate::bindings::{Bindings, Bound};
use crate::bundle::ArgBundle;
use crate::schema::{DefaultValue, Requirement, Schema, SlotType};

/// Why one value does not fit its slot
#[derive(Debug, Error)]
enum SlotError {
    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error("must be {expected}, not {found}")]
    WrongType { expected: String, found: ValueType },

    #[error("item {index} {source}")]
    Item { index: usize, source: Box<SlotError> },
}

/// Decode `args` against `schema`.
pub fn decode(held: &Held<'_>, schema: &Schema, args: &ArgBundle) -> NativeResult<Bindings> {
    let function = schema.function();
    let slots = schema.slots();
    let positional = args.args();

    for value in positional.iter().chain(args.kwargs().iter().map(|(_, v)| v)) {
        held.check_owner(value)?;
    }

    if positional.len() > slots.len() {
        return Err(raise_fmt!(
            held,
            KindId::ARITY_ERROR,
            "{}() takes {} {} positional argument{} ({} given)",
            function,
            if schema.required_count() == slots.len() { "exactly" } else { "at most" },
            slots.len(),
            if slots.len() == 1 { "" } else { "s" },
            positional.len()
        ));
    }

    if args.has_keywords() && !schema.accepts_keywords() {
        return Err(raise_fmt!(held, KindId::KEYWORD_ERROR, "{}() takes no keyword arguments", function));
    }

    let mut supplied: SmallVec<[Option<Borrowed<'_>>; 6]> =
        slots.iter().enumerate().map(|(i, _)| positional.get(i).map(Owned::borrowed)).collect();

    for (name, value) in args.kwargs() {
        let Some(index) = schema.slot_index(name) else {
            return Err(raise_fmt!(
                held,
                KindId::KEYWORD_ERROR,
                "'{}' is an invalid keyword argument for {}()",
                name,
                function
            ));
        };
        if supplied[index].is_some() {
            return Err(raise_fmt!(
                held,
                KindId::KEYWORD_ERROR,
                "{}() got multiple values for argument '{}'",
                function,
                name
            ));
        }
        supplied[index] = Some(value.borrowed());
    }

    if let Some(index) = slots.iter().zip(&supplied).position(|(slot, value)| slot.is_required() && value.is_none()) {
        let missing = &slots[index].name;
        return Err(if schema.accepts_keywords() {
            raise_fmt!(
                held,
                KindId::KEYWORD_ERROR,
                "{}() missing required argument '{}' (pos {})",
                function,
                missing,
                index + 1
            )
        } else {
            raise_fmt!(
                held,
                KindId::ARITY_ERROR,
                "{}() takes {} {} positional argument{} ({} given)",
                function,
                if schema.required_count() == slots.len() { "exactly" } else { "at least" },
                schema.required_count(),
                if schema.required_count() == 1 { "" } else { "s" },
                positional.len()
            )
        });
    }

    let mut values: SmallVec<[Bound; 6]> = SmallVec::with_capacity(slots.len());
    for (slot, value) in slots.iter().zip(&supplied) {
        let bound = match (value, &slot.requirement) {
            (Some(value), _) => bind(held, &slot.ty, *value).map_err(|err| {
                raise_fmt!(held, KindId::TYPE_ERROR, "{}() argument '{}' {}", function, slot.name, err)
            })?,
            (None, Requirement::Optional(default)) => bind_default(held, &slot.ty, default)?,
            (None, Requirement::Required) => unreachable_required(held, function, &slot.name)?,
        };
        values.push(bound);
    }

    trace!(function, bound = values.len(), "arguments decoded");
    let names = slots.iter().map(|slot| slot.name.clone()).collect();
    Ok(Bindings::new(function, names, values))
}

fn unreachable_required(held: &Held<'_>, function: &str, name: &str) -> NativeResult<Bound> {
    Err(raise_fmt!(held, KindId::SYSTEM_ERROR, "{}(): required argument '{}' was not bound", function, name))
}

fn bind(held: &Held<'_>, ty: &SlotType, value: Borrowed<'_>) -> Result<Bound, SlotError> {
    let found = value.value_type();
    let wrong = || SlotError::WrongType {
        expected: ty.to_string(),
        found,
    };

    Ok(match ty {
        SlotType::Int(width) => {
            if !matches!(found, ValueType::Int | ValueType::Bool) {
                return Err(wrong());
            }
            let wide = i128::from_value(held, value)?;
            if !width.fits(wide) {
                return Err(ConvertError::OutOfRange {
                    value: wide.to_string(),
                    target: width.name(),
                }
                .into());
            }
            Bound::Int(wide)
        }
        SlotType::Float => match found {
            ValueType::Float | ValueType::Int | ValueType::Bool => Bound::Float(f64::from_value(held, value)?),
            _ => return Err(wrong()),
        },
        SlotType::Text if found == ValueType::Str => Bound::Text(String::from_value(held, value)?),
        SlotType::Bytes if found == ValueType::Bytes => Bound::Bytes(Bytes::from_value(held, value)?.into_vec()),
        SlotType::Bool if found == ValueType::Bool => Bound::Bool(bool::from_value(held, value)?),
        SlotType::Object => Bound::Object(value.into_owned()),
        SlotType::Exact(kind) if found == kind.value_type() => Bound::Object(value.into_owned()),
        SlotType::ListOf(element) if found == ValueType::List => {
            let items = Vec::<Owned>::from_value(held, value)?;
            let mut bound = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let item = bind(held, element, item.borrowed()).map_err(|err| SlotError::Item {
                    index,
                    source: Box::new(err),
                })?;
                bound.push(item);
            }
            Bound::List(bound)
        }
        SlotType::Tuple(types) if found == ValueType::Tuple => {
            let items = Vec::<Owned>::from_value(held, value)?;
            if items.len() != types.len() {
                return Err(ConvertError::Arity {
                    expected: types.len(),
                    found: items.len(),
                }
                .into());
            }
            let mut bound = Vec::with_capacity(items.len());
            for (index, (item, ty)) in items.iter().zip(types).enumerate() {
                let item = bind(held, ty, item.borrowed()).map_err(|err| SlotError::Item {
                    index,
                    source: Box::new(err),
                })?;
                bound.push(item);
            }
            Bound::Tuple(bound)
        }
        _ => return Err(wrong()),
    })
}

/// Materialize the default of an unfilled optional slot.
fn bind_default(held: &Held<'_>, ty: &SlotType, default: &DefaultValue) -> NativeResult<Bound> {
    if let SlotType::Object = ty {
        let object = match default {
            DefaultValue::NoValue => return Ok(Bound::NoValue),
            DefaultValue::None => held.new_none()?,
            DefaultValue::Bool(b) => held.new_bool(*b)?,
            DefaultValue::Int(i) => held.new_int(*i)?,
            DefaultValue::Float(f) => held.new_float(*f)?,
            DefaultValue::Text(s) => held.new_str(s.as_str())?,
            DefaultValue::Bytes(b) => held.new_bytes(b.as_slice())?,
        };
        return Ok(Bound::Object(object));
    }

    Ok(match default {
        DefaultValue::NoValue => Bound::NoValue,
        DefaultValue::None => Bound::None,
        DefaultValue::Bool(b) => Bound::Bool(*b),
        DefaultValue::Int(i) if matches!(ty, SlotType::Float) => Bound::Float(*i as f64),
        DefaultValue::Int(i) => Bound::Int(*i),
        DefaultValue::Float(f) => Bound::Float(*f),
        DefaultValue::Text(s) => Bound::Text(s.clone()),
        DefaultValue::Bytes(b) => Bound::Bytes(b.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IntWidth;
    use membrane_core::Runtime;

    fn typed_schema() -> Schema {
        Schema::builder("typed_args")
            .required("i", SlotType::Int(IntWidth::I32))
            .required("d", SlotType::Float)
            .required("s", SlotType::Text)
            .build()
            .unwrap()
    }

    fn kw_schema() -> Schema {
        Schema::builder("kw_args")
            .required("x", SlotType::Object)
            .required("y", SlotType::Object)
            .optional("z", SlotType::Object, DefaultValue::None)
            .keywords(true)
            .build()
            .unwrap()
    }

    #[test]
    fn test_typed_bundle_binds() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let args = ArgBundle::positional(vec![
            held.new_int(3).unwrap(),
            held.new_float(2.5).unwrap(),
            held.new_str("hi").unwrap(),
        ]);
        let bindings = decode(&held, &typed_schema(), &args).unwrap();
        let (i, d, s): (i32, f64, String) = bindings.extract(&held).unwrap();
        assert_eq!((i, d, s.as_str()), (3, 2.5, "hi"));
    }

    #[test]
    fn test_missing_positional_is_arity_error() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let args = ArgBundle::positional(vec![held.new_int(3).unwrap(), held.new_float(2.5).unwrap()]);
        assert!(decode(&held, &typed_schema(), &args).is_err());
        let exc = held.take_error().unwrap();
        assert_eq!(exc.kind(), KindId::ARITY_ERROR);
        assert_eq!(exc.message(), "typed_args() takes exactly 3 positional arguments (2 given)");
    }

    #[test]
    fn test_wrong_type_is_type_error() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let args = ArgBundle::positional(vec![
            held.new_int(3).unwrap(),
            held.new_str("x").unwrap(),
            held.new_str("hi").unwrap(),
        ]);
        assert!(decode(&held, &typed_schema(), &args).is_err());
        let exc = held.take_error().unwrap();
        assert_eq!(exc.kind(), KindId::TYPE_ERROR);
        assert_eq!(exc.message(), "typed_args() argument 'd' must be float, not str");
        assert_eq!(held.overwritten_errors(), 0);
    }

    #[test]
    fn test_unsigned_slot_rejects_negative() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let schema = Schema::builder("fib").required("n", SlotType::Int(IntWidth::U64)).build().unwrap();
        let args = ArgBundle::positional(vec![held.new_int(-1).unwrap()]);
        assert!(decode(&held, &schema, &args).is_err());
        let exc = held.take_error().unwrap();
        assert_eq!(exc.kind(), KindId::TYPE_ERROR);
        assert_eq!(exc.message(), "fib() argument 'n' value -1 out of range for u64");
    }

    #[test]
    fn test_too_many_positionals() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let args = ArgBundle::positional((0..4).map(|n| held.new_int(n).unwrap()).collect());
        assert!(decode(&held, &kw_schema(), &args).is_err());
        let exc = held.take_error().unwrap();
        assert_eq!(exc.kind(), KindId::ARITY_ERROR);
        assert_eq!(exc.message(), "kw_args() takes at most 3 positional arguments (4 given)");
    }

    #[test]
    fn test_keywords_bind_by_name() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let args = ArgBundle::new()
            .with_keyword("z", held.new_int(3).unwrap())
            .with_keyword("x", held.new_int(1).unwrap())
            .with_keyword("y", held.new_int(2).unwrap());
        let bindings = decode(&held, &kw_schema(), &args).unwrap();
        let (x, y, z): (Owned, Owned, Owned) = bindings.extract(&held).unwrap();
        let values: Vec<i64> = [x, y, z].iter().map(|v| held.extract(v).unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn test_default_materializes_none() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let args = ArgBundle::positional(vec![held.new_int(1).unwrap(), held.new_int(2).unwrap()]);
        let (_, _, z): (Owned, Owned, Owned) = decode(&held, &kw_schema(), &args).unwrap().extract(&held).unwrap();
        assert_eq!(z.value_type(), ValueType::None);
    }

    #[test]
    fn test_keyword_errors() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let unknown = ArgBundle::positional(vec![held.new_int(1).unwrap(), held.new_int(2).unwrap()])
            .with_keyword("w", held.new_int(0).unwrap());
        assert!(decode(&held, &kw_schema(), &unknown).is_err());
        let exc = held.take_error().unwrap();
        assert_eq!(exc.kind(), KindId::KEYWORD_ERROR);
        assert_eq!(exc.message(), "'w' is an invalid keyword argument for kw_args()");

        let twice = ArgBundle::positional(vec![held.new_int(1).unwrap(), held.new_int(2).unwrap()])
            .with_keyword("x", held.new_int(0).unwrap());
        assert!(decode(&held, &kw_schema(), &twice).is_err());
        assert_eq!(
            held.take_error().unwrap().message(),
            "kw_args() got multiple values for argument 'x'"
        );

        let missing = ArgBundle::new().with_keyword("x", held.new_int(1).unwrap());
        assert!(decode(&held, &kw_schema(), &missing).is_err());
        let exc = held.take_error().unwrap();
        assert_eq!(exc.kind(), KindId::KEYWORD_ERROR);
        assert_eq!(exc.message(), "kw_args() missing required argument 'y' (pos 2)");

        let not_allowed = ArgBundle::new().with_keyword("i", held.new_int(1).unwrap());
        assert!(decode(&held, &typed_schema(), &not_allowed).is_err());
        assert_eq!(held.take_error().unwrap().kind(), KindId::KEYWORD_ERROR);
    }

    #[test]
    fn test_bytes_slot_reads_bytes_only() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let schema = Schema::builder("bytes_len").required("bytes", SlotType::Bytes).build().unwrap();
        let data = held.new_bytes(b"hello".to_vec()).unwrap();
        let (bytes,): (Vec<u8>,) = decode(&held, &schema, &ArgBundle::positional(vec![data]))
            .unwrap()
            .extract(&held)
            .unwrap();
        assert_eq!(bytes, b"hello");

        let ints = held
            .new_list_from(vec![held.new_int(104).unwrap(), held.new_int(105).unwrap()])
            .unwrap();
        assert!(decode(&held, &schema, &ArgBundle::positional(vec![ints])).is_err());
        assert_eq!(
            held.take_error().unwrap().message(),
            "bytes_len() argument 'bytes' must be bytes, not list"
        );
    }

    #[test]
    fn test_exact_container_is_strict() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let schema = Schema::builder("list_sum")
            .required("list", SlotType::Exact(crate::schema::ContainerKind::List))
            .build()
            .unwrap();
        let tuple = held.new_tuple(vec![held.new_int(1).unwrap()]).unwrap();
        assert!(decode(&held, &schema, &ArgBundle::positional(vec![tuple])).is_err());
        assert_eq!(
            held.take_error().unwrap().message(),
            "list_sum() argument 'list' must be list, not tuple"
        );
    }

    #[test]
    fn test_list_of_checks_elements() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let schema = Schema::builder("total")
            .required("values", SlotType::list_of(SlotType::Int(IntWidth::I64)))
            .build()
            .unwrap();
        let list = held
            .new_list_from(vec![held.new_int(1).unwrap(), held.new_str("two").unwrap()])
            .unwrap();
        assert!(decode(&held, &schema, &ArgBundle::positional(vec![list])).is_err());
        assert_eq!(
            held.take_error().unwrap().message(),
            "total() argument 'values' item 1 must be int, not str"
        );
    }

    #[test]
    fn test_nested_tuple_unpacks() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let schema = Schema::builder("tuple_unpack")
            .required(
                "t",
                SlotType::Tuple(vec![SlotType::Int(IntWidth::I32), SlotType::Text, SlotType::Float]),
            )
            .build()
            .unwrap();
        let tuple = held
            .new_tuple(vec![
                held.new_int(42).unwrap(),
                held.new_str("test").unwrap(),
                held.new_float(2.5).unwrap(),
            ])
            .unwrap();
        let ((a, b, c),): ((i32, String, f64),) = decode(&held, &schema, &ArgBundle::positional(vec![tuple]))
            .unwrap()
            .extract(&held)
            .unwrap();
        assert_eq!((a, b.as_str(), c), (42, "test", 2.5));
    }
}
