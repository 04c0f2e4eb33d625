//!
//! args - one function per calling convention
//!
//! `no_args`, `single_arg`, `pos_args` and `kw_args` hand their arguments
//! straight back; `typed_args` converts to native types and builds a dict.
//!

use membrane_args::{Bindings, DefaultValue, IntWidth, Schema, SlotType};
use membrane_core::{Borrowed, Held, NativeResult, Owned};

use crate::registry::{MethodDef, ModuleDef, RegistrationError};

pub fn module() -> Result<ModuleDef, RegistrationError> {
    Ok(ModuleDef::new("args", "Argument parsing examples")
        .method(MethodDef::no_args("no_args", no_args, "No arguments"))
        .method(MethodDef::single("single_arg", single_arg, "Single argument"))
        .method(MethodDef::positional(
            Schema::builder("pos_args")
                .required("x", SlotType::Object)
                .required("y", SlotType::Object)
                .build()?,
            pos_args,
            "Positional arguments",
        ))
        .method(MethodDef::keywords(
            Schema::builder("kw_args")
                .required("x", SlotType::Object)
                .required("y", SlotType::Object)
                .optional("z", SlotType::Object, DefaultValue::None)
                .keywords(true)
                .build()?,
            kw_args,
            "Keyword arguments",
        ))
        .method(MethodDef::positional(
            Schema::builder("typed_args")
                .required("i", SlotType::Int(IntWidth::I32))
                .required("d", SlotType::Float)
                .required("s", SlotType::Text)
                .build()?,
            typed_args,
            "Typed arguments",
        )))
}

fn no_args(held: &mut Held<'_>) -> NativeResult {
    held.new_none()
}

fn single_arg(_held: &mut Held<'_>, arg: Borrowed<'_>) -> NativeResult {
    Ok(arg.into_owned())
}

fn pos_args(held: &mut Held<'_>, args: Bindings) -> NativeResult {
    let (x, y): (Owned, Owned) = args.extract(held)?;
    held.new_tuple(vec![x, y])
}

fn kw_args(held: &mut Held<'_>, args: Bindings) -> NativeResult {
    let (x, y, z): (Owned, Owned, Owned) = args.extract(held)?;
    held.new_tuple(vec![x, y, z])
}

fn typed_args(held: &mut Held<'_>, args: Bindings) -> NativeResult {
    let (i, d, s): (i32, f64, String) = args.extract(held)?;

    let dict = held.new_dict()?;
    let i = held.new_int(i)?;
    held.dict_set_str(&dict, "int", i)?;
    let d = held.new_float(d)?;
    held.dict_set_str(&dict, "double", d)?;
    let s = held.new_str(s)?;
    held.dict_set_str(&dict, "str", s)?;
    Ok(dict)
}
