//!
//! Dispatcher
//!
//! `invoke` runs one native function under its calling convention and
//! `settle` consumes the pending-error slot afterwards. The slot is always
//! empty when `settle` returns, whatever the function did:
//!
//! | body returned | slot    | outcome                                  |
//! |---------------|---------|------------------------------------------|
//! | `Ok(value)`   | empty   | `Ok(value)`                              |
//! | `Err(Raised)` | pending | the pending error                        |
//! | `Err(Raised)` | empty   | `SystemError`: error return without exception set |
//! | `Ok(value)`   | pending | value dropped, `SystemError` naming the stray error |
//!

use membrane_args::{ArgBundle, decode};
use membrane_core::{Exception, Held, KindId, NativeResult, raise_fmt};
use tracing::{error, trace};

use crate::registry::{MethodDef, NativeFn};

/// Check the bundle against the convention, decode and run the body.
pub(crate) fn invoke(held: &mut Held<'_>, module: &str, method: &MethodDef, args: &ArgBundle) -> NativeResult {
    let name = method.name.as_str();
    trace!(module, function = name, convention = %method.convention(), args = args.len(), "dispatching native call");

    match (method.func, method.schema.as_ref()) {
        (NativeFn::NoArgs(func), _) => {
            reject_keywords(held, name, args)?;
            if !args.args().is_empty() {
                return Err(raise_fmt!(
                    held,
                    KindId::ARITY_ERROR,
                    "{}() takes no arguments ({} given)",
                    name,
                    args.args().len()
                ));
            }
            func(held)
        }
        (NativeFn::Single(func), _) => {
            reject_keywords(held, name, args)?;
            let [arg] = args.args() else {
                return Err(raise_fmt!(
                    held,
                    KindId::ARITY_ERROR,
                    "{}() takes exactly one argument ({} given)",
                    name,
                    args.args().len()
                ));
            };
            held.check_owner(arg)?;
            func(held, arg.borrowed())
        }
        (NativeFn::Positional(func) | NativeFn::Keywords(func), Some(schema)) => {
            let bindings = decode(held, schema, args)?;
            func(held, bindings)
        }
        (NativeFn::Positional(_) | NativeFn::Keywords(_), None) => Err(raise_fmt!(
            held,
            KindId::SYSTEM_ERROR,
            "{}.{}() has no argument schema",
            module,
            name
        )),
    }
}

fn reject_keywords(held: &Held<'_>, name: &str, args: &ArgBundle) -> NativeResult<()> {
    if args.has_keywords() {
        return Err(raise_fmt!(held, KindId::KEYWORD_ERROR, "{}() takes no keyword arguments", name));
    }
    Ok(())
}

/// Consume the pending-error slot after a native call.
pub(crate) fn settle<T>(held: &Held<'_>, name: &str, result: NativeResult<T>) -> Result<T, Exception> {
    let pending = held.take_error();
    let outcome = match (result, pending) {
        (Ok(value), None) => Ok(value),
        (Err(_), Some(exception)) => Err(exception),
        (Err(_), None) => Err(held.new_exception(
            KindId::SYSTEM_ERROR,
            format!("{name}(): error return without exception set"),
        )),
        (Ok(value), Some(stray)) => {
            drop(value);
            Err(held.new_exception(
                KindId::SYSTEM_ERROR,
                format!("{name}() returned a result with an exception set ({stray})"),
            ))
        }
    };

    match &outcome {
        Ok(_) => trace!(function = name, "native call returned"),
        Err(exception) if exception.is_fatal() => {
            error!(function = name, error = %exception, "native call failed with a fatal error");
        }
        Err(exception) => trace!(function = name, error = %exception, "native call raised"),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use membrane_core::Runtime;

    #[test]
    fn test_settle_passes_values_and_errors() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let value = held.new_int(7).unwrap();
        let out = settle(&held, "f", Ok(value)).unwrap();
        assert_eq!(held.extract::<i64>(&out).unwrap(), 7);

        let raised = held.raise_simple(KindId::VALUE_ERROR, "bad");
        let exc = settle::<()>(&held, "f", Err(raised)).unwrap_err();
        assert_eq!(exc.kind(), KindId::VALUE_ERROR);
        assert_eq!(exc.message(), "bad");
        assert!(held.error_occurred().is_none());
    }

    #[test]
    fn test_error_return_without_exception() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let raised = held.raise_simple(KindId::VALUE_ERROR, "swallowed");
        held.clear_error();
        let exc = settle::<()>(&held, "f", Err(raised)).unwrap_err();
        assert_eq!(exc.kind(), KindId::SYSTEM_ERROR);
        assert_eq!(exc.message(), "f(): error return without exception set");
    }

    #[test]
    fn test_value_with_pending_error_is_dropped() {
        let rt = Runtime::new();
        let held = rt.acquire().unwrap();

        let value = held.new_str("leaked?").unwrap();
        let _ = held.raise_simple(KindId::KEY_ERROR, "'k'");
        let exc = settle(&held, "f", Ok(value)).unwrap_err();
        assert_eq!(exc.kind(), KindId::SYSTEM_ERROR);
        assert_eq!(exc.message(), "f() returned a result with an exception set (KeyError: 'k')");
        assert_eq!(held.live_objects(), 0);
        assert!(held.error_occurred().is_none());
    }
}
