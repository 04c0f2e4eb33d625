//!
//! types_demo - building and reading the runtime's container and text types
//!

use membrane_args::{Bindings, ContainerKind, IntWidth, Schema, SlotType};
use membrane_core::{Held, KindId, NativeResult, Owned, raise_fmt};

use crate::registry::{MethodDef, ModuleDef, RegistrationError};

pub fn module() -> Result<ModuleDef, RegistrationError> {
    let list = || SlotType::Exact(ContainerKind::List);
    let dict = || SlotType::Exact(ContainerKind::Dict);

    Ok(ModuleDef::new("types_demo", "Runtime types through the native API")
        .method(MethodDef::no_args("list_demo", list_demo, "Create a list [1,2,3]"))
        .method(MethodDef::positional(
            Schema::builder("list_sum").required("list", list()).build()?,
            list_sum,
            "Sum list elements",
        ))
        .method(MethodDef::positional(
            Schema::builder("iter_list").required("iterable", SlotType::Object).build()?,
            iter_list,
            "Double each element",
        ))
        .method(MethodDef::no_args("dict_demo", dict_demo, "Create a dict"))
        .method(MethodDef::positional(
            Schema::builder("dict_get")
                .required("dict", dict())
                .required("key", SlotType::Text)
                .build()?,
            dict_get,
            "Get dict value by key",
        ))
        .method(MethodDef::positional(
            Schema::builder("iter_dict").required("dict", dict()).build()?,
            iter_dict,
            "Get dict items as list",
        ))
        .method(MethodDef::no_args("tuple_demo", tuple_demo, "Create a tuple"))
        .method(MethodDef::positional(
            Schema::builder("tuple_unpack")
                .required(
                    "t",
                    SlotType::Tuple(vec![SlotType::Int(IntWidth::I32), SlotType::Text, SlotType::Float]),
                )
                .build()?,
            tuple_unpack,
            "Unpack tuple",
        ))
        .method(MethodDef::no_args("set_demo", set_demo, "Create a set"))
        .method(MethodDef::positional(
            Schema::builder("set_contains")
                .required("set", SlotType::Object)
                .required("item", SlotType::Object)
                .build()?,
            set_contains,
            "Check set membership",
        ))
        .method(MethodDef::no_args("str_demo", str_demo, "Concat strings"))
        .method(MethodDef::positional(
            Schema::builder("str_format")
                .required("name", SlotType::Text)
                .required("age", SlotType::Int(IntWidth::I32))
                .build()?,
            str_format,
            "Format string",
        ))
        .method(MethodDef::no_args("bytes_demo", bytes_demo, "Create bytes"))
        .method(MethodDef::positional(
            Schema::builder("bytes_len").required("bytes", SlotType::Bytes).build()?,
            bytes_len,
            "Get bytes length",
        )))
}

fn list_demo(held: &mut Held<'_>) -> NativeResult {
    let list = held.new_list()?;
    for n in 1..=3 {
        let item = held.new_int(n)?;
        held.list_append(&list, item)?;
    }
    Ok(list)
}

fn list_sum(held: &mut Held<'_>, args: Bindings) -> NativeResult {
    let (list,): (Owned,) = args.extract(held)?;
    let mut sum: i64 = 0;
    for index in 0..held.len(&list)? {
        let item = held.extract::<i64>(held.list_get(&list, index)?)?;
        sum = match sum.checked_add(item) {
            Some(sum) => sum,
            None => return Err(held.raise_simple(KindId::OVERFLOW_ERROR, "list sum overflowed i64")),
        };
    }
    held.new_int(sum)
}

fn iter_list(held: &mut Held<'_>, args: Bindings) -> NativeResult {
    let (iterable,): (Owned,) = args.extract(held)?;
    let mut doubled = Vec::new();
    for item in held.iter_values(&iterable)? {
        let value = held.extract::<i64>(&item?)?;
        match value.checked_mul(2) {
            Some(value) => doubled.push(held.new_int(value)?),
            None => return Err(raise_fmt!(held, KindId::OVERFLOW_ERROR, "{} * 2 overflowed i64", value)),
        }
    }
    held.new_list_from(doubled)
}

fn dict_demo(held: &mut Held<'_>) -> NativeResult {
    let dict = held.new_dict()?;
    let name = held.new_str("Python")?;
    held.dict_set_str(&dict, "name", name)?;
    let version = held.new_int(3)?;
    held.dict_set_str(&dict, "version", version)?;
    Ok(dict)
}

fn dict_get(held: &mut Held<'_>, args: Bindings) -> NativeResult {
    let (dict, key): (Owned, String) = args.extract(held)?;
    match held.dict_get_str(&dict, &key)? {
        Some(value) => Ok(value.into_owned()),
        None => held.new_none(),
    }
}

fn iter_dict(held: &mut Held<'_>, args: Bindings) -> NativeResult {
    let (dict,): (Owned,) = args.extract(held)?;
    let mut pairs = Vec::new();
    let mut position = 0;
    while let Some((key, value)) = held.dict_next(&dict, &mut position)? {
        pairs.push(held.tuple_pack(&[key, value])?);
    }
    held.new_list_from(pairs)
}

#[allow(clippy::approx_constant)]
fn tuple_demo(held: &mut Held<'_>) -> NativeResult {
    let items = vec![held.new_int(1)?, held.new_str("hello")?, held.new_float(3.14)?];
    held.new_tuple(items)
}

fn tuple_unpack(held: &mut Held<'_>, args: Bindings) -> NativeResult {
    let ((a, b, c),): ((i32, String, f64),) = args.extract(held)?;

    let dict = held.new_dict()?;
    let a = held.new_int(a)?;
    held.dict_set_str(&dict, "int", a)?;
    let b = held.new_str(b)?;
    held.dict_set_str(&dict, "str", b)?;
    let c = held.new_float(c)?;
    held.dict_set_str(&dict, "float", c)?;
    Ok(dict)
}

fn set_demo(held: &mut Held<'_>) -> NativeResult {
    let set = held.new_set()?;
    for n in [1, 2, 2, 3] {
        let item = held.new_int(n)?;
        held.set_add(&set, item)?;
    }
    Ok(set)
}

fn set_contains(held: &mut Held<'_>, args: Bindings) -> NativeResult {
    let (set, item): (Owned, Owned) = args.extract(held)?;
    let found = held.set_contains(&set, &item)?;
    held.new_bool(found)
}

fn str_demo(held: &mut Held<'_>) -> NativeResult {
    let hello = held.new_str("Hello")?;
    let world = held.new_str(" World")?;
    held.str_concat(&hello, &world)
}

fn str_format(held: &mut Held<'_>, args: Bindings) -> NativeResult {
    let (name, age): (String, i32) = args.extract(held)?;
    held.new_str_fmt(format_args!("{name} is {age} years old"))
}

fn bytes_demo(held: &mut Held<'_>) -> NativeResult {
    held.new_bytes(b"hello bytes".to_vec())
}

fn bytes_len(held: &mut Held<'_>, args: Bindings) -> NativeResult {
    let (bytes,): (Vec<u8>,) = args.extract(held)?;
    held.new_int(bytes.len() as u64)
}
