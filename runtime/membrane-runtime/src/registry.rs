//!
//! Registration Tables
//!
//! A `ModuleDef` is the ordered table of native functions one extension
//! module exposes, plus an optional init routine. Each `MethodDef` pairs a
//! name with a `NativeFn`; the variant of the function pointer decides the
//! calling convention:
//!
//! - `NoArgs`: no arguments at all
//! - `Single`: exactly one positional object, passed borrowed
//! - `Positional`: positional arguments decoded against a schema
//! - `Keywords`: positional and keyword arguments decoded against a schema
//!
//! Tables are validated once, when the module is loaded.
//!

use std::fmt;

use indexmap::IndexMap;
use membrane_args::{Bindings, Schema, SchemaError};
use membrane_core::{Borrowed, Held, KindId, NativeResult, Owned};
use thiserror::Error;

pub type NoArgsFn = fn(&mut Held<'_>) -> NativeResult;
pub type SingleFn = fn(&mut Held<'_>, Borrowed<'_>) -> NativeResult;
pub type BoundFn = fn(&mut Held<'_>, Bindings) -> NativeResult;
pub type InitFn = fn(&mut Held<'_>, &mut ModuleInit<'_>) -> NativeResult<()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallConvention {
    NoArgs,
    SingleObject,
    Positional,
    PositionalKeywords,
}

impl CallConvention {
    /// Whether functions of this convention decode their arguments with a schema
    pub fn uses_schema(self) -> bool {
        matches!(self, CallConvention::Positional | CallConvention::PositionalKeywords)
    }
}

impl fmt::Display for CallConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CallConvention::NoArgs => "no-arguments",
            CallConvention::SingleObject => "single-object",
            CallConvention::Positional => "positional",
            CallConvention::PositionalKeywords => "positional-keywords",
        })
    }
}

#[derive(Clone, Copy)]
pub enum NativeFn {
    NoArgs(NoArgsFn),
    Single(SingleFn),
    Positional(BoundFn),
    Keywords(BoundFn),
}

impl NativeFn {
    pub fn convention(&self) -> CallConvention {
        match self {
            NativeFn::NoArgs(_) => CallConvention::NoArgs,
            NativeFn::Single(_) => CallConvention::SingleObject,
            NativeFn::Positional(_) => CallConvention::Positional,
            NativeFn::Keywords(_) => CallConvention::PositionalKeywords,
        }
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFn({})", self.convention())
    }
}

/// One entry of a registration table
#[derive(Debug, Clone)]
pub struct MethodDef {
    pub name: String,
    pub func: NativeFn,
    pub schema: Option<Schema>,
    pub doc: String,
}

impl MethodDef {
    pub fn no_args(name: &str, func: NoArgsFn, doc: &str) -> Self {
        Self {
            name: name.to_string(),
            func: NativeFn::NoArgs(func),
            schema: None,
            doc: doc.to_string(),
        }
    }

    pub fn single(name: &str, func: SingleFn, doc: &str) -> Self {
        Self {
            name: name.to_string(),
            func: NativeFn::Single(func),
            schema: None,
            doc: doc.to_string(),
        }
    }

    pub fn positional(schema: Schema, func: BoundFn, doc: &str) -> Self {
        Self {
            name: schema.function().to_string(),
            func: NativeFn::Positional(func),
            schema: Some(schema),
            doc: doc.to_string(),
        }
    }

    pub fn keywords(schema: Schema, func: BoundFn, doc: &str) -> Self {
        Self {
            name: schema.function().to_string(),
            func: NativeFn::Keywords(func),
            schema: Some(schema),
            doc: doc.to_string(),
        }
    }

    pub fn convention(&self) -> CallConvention {
        self.func.convention()
    }
}

/// The registration table of one extension module
#[derive(Clone)]
pub struct ModuleDef {
    pub name: String,
    pub doc: String,
    pub methods: Vec<MethodDef>,
    pub init: Option<InitFn>,
}

impl fmt::Debug for ModuleDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDef")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .field("init", &self.init.is_some())
            .finish()
    }
}

impl ModuleDef {
    pub fn new(name: &str, doc: &str) -> Self {
        Self {
            name: name.to_string(),
            doc: doc.to_string(),
            methods: Vec::new(),
            init: None,
        }
    }

    pub fn method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    pub fn with_init(mut self, init: InitFn) -> Self {
        self.init = Some(init);
        self
    }

    /// Check the table: unique non-empty names and schemas matching the
    /// conventions that use them.
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.name.is_empty() || self.name.contains('.') {
            return Err(RegistrationError::InvalidModuleName { name: self.name.clone() });
        }

        for (index, method) in self.methods.iter().enumerate() {
            let convention = method.convention();
            if method.name.is_empty() {
                return Err(RegistrationError::EmptyName {
                    module: self.name.clone(),
                    index,
                });
            }
            if self.methods[..index].iter().any(|earlier| earlier.name == method.name) {
                return Err(RegistrationError::DuplicateMethod {
                    module: self.name.clone(),
                    name: method.name.clone(),
                });
            }

            match (&method.schema, convention.uses_schema()) {
                (None, true) => {
                    return Err(RegistrationError::MissingSchema {
                        module: self.name.clone(),
                        name: method.name.clone(),
                        convention,
                    });
                }
                (Some(_), false) => {
                    return Err(RegistrationError::UnexpectedSchema {
                        module: self.name.clone(),
                        name: method.name.clone(),
                        convention,
                    });
                }
                (Some(schema), true) => {
                    let takes_keywords = convention == CallConvention::PositionalKeywords;
                    if schema.accepts_keywords() != takes_keywords || schema.function() != method.name {
                        return Err(RegistrationError::SchemaMismatch {
                            module: self.name.clone(),
                            name: method.name.clone(),
                            convention,
                        });
                    }
                }
                (None, false) => {}
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("invalid module name '{name}'")]
    InvalidModuleName { name: String },

    #[error("{module}: method {index} has an empty name")]
    EmptyName { module: String, index: usize },

    #[error("{module}: duplicate method '{name}'")]
    DuplicateMethod { module: String, name: String },

    #[error("{module}.{name}: {convention} functions need a schema")]
    MissingSchema {
        module: String,
        name: String,
        convention: CallConvention,
    },

    #[error("{module}.{name}: {convention} functions take no schema")]
    UnexpectedSchema {
        module: String,
        name: String,
        convention: CallConvention,
    },

    #[error("{module}.{name}: schema does not fit the {convention} convention")]
    SchemaMismatch {
        module: String,
        name: String,
        convention: CallConvention,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Module state handed to an init routine.
pub struct ModuleInit<'m> {
    module: &'m str,
    attrs: &'m mut IndexMap<String, Owned>,
    kinds: Vec<KindId>,
}

impl<'m> ModuleInit<'m> {
    pub(crate) fn new(module: &'m str, attrs: &'m mut IndexMap<String, Owned>) -> Self {
        Self {
            module,
            attrs,
            kinds: Vec::new(),
        }
    }

    /// Kinds registered through `add_kind`, oldest first
    pub(crate) fn into_kinds(self) -> Vec<KindId> {
        self.kinds
    }

    pub fn module(&self) -> &str {
        self.module
    }

    /// Store a module attribute. The module keeps the reference for its
    /// lifetime.
    pub fn add_object(&mut self, name: &str, value: Owned) {
        self.attrs.insert(name.to_string(), value);
    }

    /// Register the error kind `<module>.<name>` and store it as attribute
    /// `name`.
    pub fn add_kind(&mut self, held: &mut Held<'_>, name: &str, parent: Option<KindId>) -> NativeResult<KindId> {
        let qualname = format!("{}.{}", self.module, name);
        let kind = held.register_kind(&qualname, parent)?;
        let id = held.kind_of(&kind)?;
        self.kinds.push(id);
        self.add_object(name, kind);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use membrane_args::SlotType;

    fn noop(held: &mut Held<'_>) -> NativeResult {
        held.new_none()
    }

    fn bound(held: &mut Held<'_>, _: Bindings) -> NativeResult {
        held.new_none()
    }

    fn echo(_: &mut Held<'_>, arg: Borrowed<'_>) -> NativeResult {
        Ok(arg.into_owned())
    }

    #[test]
    fn test_convention_follows_function() {
        let schema = Schema::builder("f").required("x", SlotType::Object).build().unwrap();
        assert_eq!(MethodDef::no_args("g", noop, "").convention(), CallConvention::NoArgs);
        assert_eq!(MethodDef::positional(schema, bound, "").convention(), CallConvention::Positional);
    }

    #[test]
    fn test_duplicate_method_rejected() {
        let def = ModuleDef::new("m", "")
            .method(MethodDef::no_args("f", noop, ""))
            .method(MethodDef::no_args("f", noop, ""));
        assert!(matches!(def.validate(), Err(RegistrationError::DuplicateMethod { ref name, .. }) if name == "f"));
    }

    #[test]
    fn test_schema_must_match_convention() {
        let mut method = MethodDef::no_args("f", noop, "");
        method.func = NativeFn::Positional(bound);
        let err = ModuleDef::new("m", "").method(method).validate().unwrap_err();
        assert_eq!(err.to_string(), "m.f: positional functions need a schema");

        let schema = Schema::builder("f").keywords(true).build().unwrap();
        let err = ModuleDef::new("m", "")
            .method(MethodDef::positional(schema, bound, ""))
            .validate()
            .unwrap_err();
        assert!(matches!(err, RegistrationError::SchemaMismatch { .. }));

        let mut method = MethodDef::single("g", echo, "");
        method.schema = Some(Schema::builder("g").build().unwrap());
        let err = ModuleDef::new("m", "").method(method).validate().unwrap_err();
        assert!(matches!(err, RegistrationError::UnexpectedSchema { .. }));
    }

    #[test]
    fn test_module_name_checked() {
        assert!(ModuleDef::new("a.b", "").validate().is_err());
        assert!(ModuleDef::new("", "").validate().is_err());
        assert!(ModuleDef::new("ok", "").validate().is_ok());
    }
}
