//!
//! simple - greeting and integer arithmetic
//!

use membrane_args::{Bindings, IntWidth, Schema, SlotType};
use membrane_core::{Held, KindId, NativeResult, raise_fmt};

use crate::registry::{MethodDef, ModuleDef, RegistrationError};

pub fn module() -> Result<ModuleDef, RegistrationError> {
    Ok(ModuleDef::new("simple", "Simple example extension module.")
        .method(MethodDef::no_args("hello", hello, "hello() -> str\n\nReturn a greeting string."))
        .method(MethodDef::positional(
            Schema::builder("add")
                .required("a", SlotType::Int(IntWidth::I64))
                .required("b", SlotType::Int(IntWidth::I64))
                .build()?,
            add,
            "add(a, b) -> int\n\nAdd two integers.",
        ))
        .method(MethodDef::positional(
            Schema::builder("fib").required("n", SlotType::Int(IntWidth::U64)).build()?,
            fib,
            "fib(n) -> int\n\nCompute Fibonacci number.",
        )))
}

fn hello(held: &mut Held<'_>) -> NativeResult {
    held.new_str("Hello from C!")
}

fn add(held: &mut Held<'_>, args: Bindings) -> NativeResult {
    let (a, b): (i64, i64) = args.extract(held)?;
    match a.checked_add(b) {
        Some(sum) => held.new_int(sum),
        None => Err(held.raise_simple(KindId::OVERFLOW_ERROR, "integer addition overflowed i64")),
    }
}

fn fib(held: &mut Held<'_>, args: Bindings) -> NativeResult {
    let (n,): (u64,) = args.extract(held)?;
    let overflow = |held: &Held<'_>| raise_fmt!(held, KindId::OVERFLOW_ERROR, "fib({}) does not fit in u64", n);

    // One step ahead of the result, so run the sequence in u128.
    let (mut a, mut b) = (0u128, 1u128);
    for _ in 0..n {
        let Some(next) = a.checked_add(b) else {
            return Err(overflow(held));
        };
        a = std::mem::replace(&mut b, next);
    }
    match u64::try_from(a) {
        Ok(value) => held.new_int(value),
        Err(_) => Err(overflow(held)),
    }
}
