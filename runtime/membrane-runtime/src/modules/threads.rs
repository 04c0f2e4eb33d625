//!
//! threads - blocking and CPU-bound work with and without the lock
//!
//! `sleep_with_lock` blocks while holding the runtime lock, so every other
//! thread waits. `sleep_without_lock` and `fib_without_lock` run inside a
//! scoped release and let other threads make progress.
//!

use std::time::Duration;

use membrane_args::{Bindings, IntWidth, Schema, SlotType};
use membrane_core::{Held, KindId, NativeResult, raise_fmt};

use crate::registry::{MethodDef, ModuleDef, RegistrationError};

pub fn module() -> Result<ModuleDef, RegistrationError> {
    Ok(ModuleDef::new("threads", "Lock handling examples")
        .method(MethodDef::positional(
            Schema::builder("sleep_with_lock").required("seconds", SlotType::Float).build()?,
            sleep_with_lock,
            "Sleep holding the lock (blocks threads)",
        ))
        .method(MethodDef::positional(
            Schema::builder("sleep_without_lock").required("seconds", SlotType::Float).build()?,
            sleep_without_lock,
            "Sleep releasing the lock (allows threads)",
        ))
        .method(MethodDef::positional(
            Schema::builder("fib_without_lock")
                .required("n", SlotType::Int(IntWidth::U64))
                .build()?,
            fib_without_lock,
            "Fibonacci with the lock released",
        )))
}

fn duration(held: &Held<'_>, args: Bindings) -> NativeResult<Duration> {
    let (seconds,): (f64,) = args.extract(held)?;
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| raise_fmt!(held, KindId::VALUE_ERROR, "invalid sleep length: {}", seconds))
}

fn sleep_with_lock(held: &mut Held<'_>, args: Bindings) -> NativeResult {
    let length = duration(held, args)?;
    std::thread::sleep(length);
    held.new_none()
}

fn sleep_without_lock(held: &mut Held<'_>, args: Bindings) -> NativeResult {
    let length = duration(held, args)?;
    held.scoped_release(|_| std::thread::sleep(length));
    held.new_none()
}

fn fib_without_lock(held: &mut Held<'_>, args: Bindings) -> NativeResult {
    let (n,): (u64,) = args.extract(held)?;
    if n > 93 {
        return Err(raise_fmt!(held, KindId::OVERFLOW_ERROR, "fib({}) does not fit in u64", n));
    }
    let result = held.scoped_release(|_| fib(n));
    held.new_int(result)
}

/// Deliberately exponential; this is the CPU-bound workload.
fn fib(n: u64) -> u64 {
    if n < 2 { n } else { fib(n - 1) + fib(n - 2) }
}
