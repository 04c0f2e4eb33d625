//!
//! Loaded Modules
//!
//! `Module::load` validates a registration table, runs its init routine and
//! keeps the attributes the routine stored (custom error kinds, constants).
//! When init fails, the kinds it registered are retired so a later load can
//! register them again.
//! `Module::call` is the entry point the host uses for every native call.
//!

use indexmap::IndexMap;
use membrane_args::ArgBundle;
use membrane_core::{Exception, Held, KindId, Owned, ValueType};
use thiserror::Error;
use tracing::debug;

use crate::dispatch::{invoke, settle};
use crate::registry::{MethodDef, ModuleDef, ModuleInit, RegistrationError};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error("module '{module}' failed to initialize: {exception}")]
    Init { module: String, exception: Exception },
}

#[derive(Debug)]
pub struct Module {
    name: String,
    doc: String,
    methods: IndexMap<String, MethodDef>,
    attrs: IndexMap<String, Owned>,
}

impl Module {
    pub fn load(held: &mut Held<'_>, def: ModuleDef) -> Result<Module, LoadError> {
        def.validate()?;
        let ModuleDef {
            name,
            doc,
            methods,
            init,
        } = def;

        let mut attrs = IndexMap::new();
        if let Some(init) = init {
            let mut module_init = ModuleInit::new(&name, &mut attrs);
            let result = init(held, &mut module_init);
            let kinds = module_init.into_kinds();
            if let Err(exception) = settle(held, &name, result) {
                for kind in kinds {
                    held.retire_kind(kind);
                }
                debug!(module = %name, %exception, "module init failed");
                return Err(LoadError::Init { module: name, exception });
            }
        }

        debug!(module = %name, functions = methods.len(), attributes = attrs.len(), "module loaded");
        Ok(Module {
            methods: methods.into_iter().map(|m| (m.name.clone(), m)).collect(),
            name,
            doc,
            attrs,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    /// Registered functions, in table order
    pub fn functions(&self) -> impl Iterator<Item = &MethodDef> {
        self.methods.values()
    }

    pub fn function(&self, name: &str) -> Option<&MethodDef> {
        self.methods.get(name)
    }

    pub fn attr(&self, name: &str) -> Option<&Owned> {
        self.attrs.get(name)
    }

    /// The error kind stored in attribute `name`, if it holds one
    pub fn kind(&self, held: &Held<'_>, name: &str) -> Option<KindId> {
        let attr = self.attrs.get(name)?;
        if attr.value_type() != ValueType::Kind {
            return None;
        }
        held.kind_of(attr).ok()
    }

    /// Call function `name` with `args`. The pending-error slot is empty
    /// when this returns.
    pub fn call(&self, held: &mut Held<'_>, name: &str, args: &ArgBundle) -> Result<Owned, Exception> {
        let Some(method) = self.methods.get(name) else {
            return Err(held.new_exception(
                KindId::LOOKUP_ERROR,
                format!("module '{}' has no function '{}'", self.name, name),
            ));
        };
        let result = invoke(held, &self.name, method, args);
        settle(held, name, result)
    }
}
