//!
//! errors - raising builtin and custom error kinds
//!
//! The init routine registers `errors.FooError` and keeps it as the module
//! attribute `FooError`.
//!

use membrane_args::{Bindings, IntWidth, Schema, SlotType};
use membrane_core::{Held, KindId, NativeResult, raise_fmt};

use crate::registry::{MethodDef, ModuleDef, ModuleInit, RegistrationError};

const FOO_ERROR: &str = "errors.FooError";

pub fn module() -> Result<ModuleDef, RegistrationError> {
    Ok(ModuleDef::new("errors", "Exception handling examples")
        .method(MethodDef::no_args("raise_value_error", raise_value_error, ""))
        .method(MethodDef::no_args("raise_foo_error", raise_foo_error, ""))
        .method(MethodDef::positional(
            Schema::builder("raise_with_format")
                .required("code", SlotType::Int(IntWidth::I32))
                .build()?,
            raise_with_format,
            "",
        ))
        .method(MethodDef::positional(
            Schema::builder("divide")
                .required("a", SlotType::Float)
                .required("b", SlotType::Float)
                .build()?,
            divide,
            "Divide a by b",
        ))
        .with_init(init))
}

fn init(held: &mut Held<'_>, module: &mut ModuleInit<'_>) -> NativeResult<()> {
    module.add_kind(held, "FooError", None)?;
    Ok(())
}

fn raise_value_error(held: &mut Held<'_>) -> NativeResult {
    Err(held.raise_simple(KindId::VALUE_ERROR, "This is a ValueError"))
}

fn raise_foo_error(held: &mut Held<'_>) -> NativeResult {
    match held.lookup_kind(FOO_ERROR) {
        Some(kind) => Err(held.raise_simple(kind, "This is a custom FooError")),
        None => Err(raise_fmt!(held, KindId::SYSTEM_ERROR, "{} is not registered", FOO_ERROR)),
    }
}

fn raise_with_format(held: &mut Held<'_>, args: Bindings) -> NativeResult {
    let (code,): (i32,) = args.extract(held)?;
    Err(raise_fmt!(held, KindId::RUNTIME_ERROR, "Error code: {}", code))
}

fn divide(held: &mut Held<'_>, args: Bindings) -> NativeResult {
    let (a, b): (f64, f64) = args.extract(held)?;
    if b == 0.0 {
        return Err(held.raise_simple(KindId::ZERO_DIVISION_ERROR, "division by zero"));
    }
    held.new_float(a / b)
}
