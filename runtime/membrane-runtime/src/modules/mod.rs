//!
//! Builtin Extension Modules
//!
//! Small native modules exercising the boundary end to end: greetings and
//! arithmetic, every calling convention, error raising with builtin and
//! custom kinds, lock release around blocking and CPU-bound work, and the
//! container and text types.
//!

pub mod simple;
pub mod args;
pub mod errors;
pub mod threads;
pub mod types_demo;

use crate::registry::{ModuleDef, RegistrationError};

/// Names of the builtin modules, in load order
pub const BUILTIN_MODULES: &[&str] = &["simple", "args", "errors", "threads", "types_demo"];

/// The registration table of builtin module `name`
pub fn builtin(name: &str) -> Option<Result<ModuleDef, RegistrationError>> {
    Some(match name {
        "simple" => simple::module(),
        "args" => args::module(),
        "errors" => errors::module(),
        "threads" => threads::module(),
        "types_demo" => types_demo::module(),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_builtin_table_is_valid() {
        for name in BUILTIN_MODULES {
            let def = builtin(name).unwrap().unwrap();
            assert_eq!(def.name, *name);
            def.validate().unwrap();
        }
        assert!(builtin("gil").is_none());
    }
}
