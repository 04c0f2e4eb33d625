//!
//! Host
//!
//! A `Host` owns one `Runtime` and the modules loaded into it. It is the
//! managed side of the boundary: every call takes the runtime lock, turns
//! native argument values into runtime objects, dispatches, and copies the
//! result back out.
//!
//! A `Host` is `Sync`. Threads share it by reference and contend for the
//! runtime lock on every call; native functions that release the lock let
//! other calls proceed in the meantime.
//!

use std::path::Path;

use indexmap::IndexMap;
use membrane_args::ArgBundle;
use membrane_core::{Exception, Held, LockError, NativeValue, Runtime};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ConfigError, HostConfig};
use crate::logging::init_logging;
use crate::module::{LoadError, Module};
use crate::modules;
use crate::registry::{ModuleDef, RegistrationError};

#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("module '{name}' is not loaded")]
    UnknownModule { name: String },

    #[error("module '{name}' is already loaded")]
    DuplicateModule { name: String },

    /// The call raised; the consumed error is carried here.
    #[error(transparent)]
    Raised(#[from] Exception),
}

impl HostError {
    /// The runtime error behind a failed call, if that is what failed
    pub fn exception(&self) -> Option<&Exception> {
        match self {
            HostError::Raised(exception) => Some(exception),
            _ => None,
        }
    }
}

pub struct Host {
    // Modules hold objects of `runtime`; declared first so they drop first.
    modules: IndexMap<String, Module>,
    runtime: Runtime,
    config: HostConfig,
}

impl Host {
    /// Build a runtime from `config` and load its enabled builtin modules.
    ///
    /// Installs logging from `config.logging` first, unless disabled there.
    pub fn new(config: HostConfig) -> Result<Self, HostError> {
        config.validate()?;
        if config.logging.install {
            init_logging(&config.logging);
        }
        let mut host = Self {
            modules: IndexMap::new(),
            runtime: Runtime::with_limits(config.heap_limits()),
            config,
        };

        let enabled = host.config.modules.enabled.clone();
        for name in &enabled {
            let Some(def) = modules::builtin(name) else {
                return Err(ConfigError::UnknownModule { name: name.clone() }.into());
            };
            host.load(def?)?;
        }
        info!(modules = host.modules.len(), runtime = host.runtime.id().get(), "host ready");
        Ok(host)
    }

    /// Read `membrane.toml`-style configuration from `path` and build a host.
    pub fn from_config_path(path: &Path) -> Result<Self, HostError> {
        Self::new(HostConfig::from_path(path)?)
    }

    /// Load an additional module table.
    pub fn load(&mut self, def: ModuleDef) -> Result<(), HostError> {
        if self.modules.contains_key(&def.name) {
            return Err(HostError::DuplicateModule { name: def.name });
        }
        let mut held = self.runtime.acquire()?;
        let module = Module::load(&mut held, def)?;
        drop(held);
        debug!(module = module.name(), "registered module with host");
        self.modules.insert(module.name().to_string(), module);
        Ok(())
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Call `module.function` with positional arguments.
    pub fn call(&self, module: &str, function: &str, args: Vec<NativeValue>) -> Result<NativeValue, HostError> {
        self.call_kw(module, function, args, Vec::new())
    }

    /// Call `module.function` with positional and keyword arguments.
    pub fn call_kw(
        &self,
        module: &str,
        function: &str,
        args: Vec<NativeValue>,
        kwargs: Vec<(String, NativeValue)>,
    ) -> Result<NativeValue, HostError> {
        let Some(target) = self.modules.get(module) else {
            return Err(HostError::UnknownModule {
                name: module.to_string(),
            });
        };

        let mut held = self.runtime.acquire()?;
        let bundle = bundle(&held, &args, &kwargs).map_err(|_| raised(&held))?;
        let result = target.call(&mut held, function, &bundle)?;
        drop(bundle);
        held.to_native(&result).map_err(|_| raised(&held))
    }

    /// Run `f` with the runtime lock held and access to the loaded modules.
    pub fn with_held<T>(&self, f: impl FnOnce(&mut Held<'_>, &IndexMap<String, Module>) -> T) -> Result<T, HostError> {
        let mut held = self.runtime.acquire()?;
        Ok(f(&mut held, &self.modules))
    }
}

fn bundle(
    held: &Held<'_>,
    args: &[NativeValue],
    kwargs: &[(String, NativeValue)],
) -> membrane_core::NativeResult<ArgBundle> {
    let mut bundle = ArgBundle::new();
    for arg in args {
        bundle.push(held.to_value(arg)?);
    }
    for (name, value) in kwargs {
        bundle.push_keyword(name.as_str(), held.to_value(value)?);
    }
    Ok(bundle)
}

/// Consume the error raised while converting values at the boundary.
fn raised(held: &Held<'_>) -> HostError {
    match held.take_error() {
        Some(exception) => HostError::Raised(exception),
        None => HostError::Raised(held.new_exception(
            membrane_core::KindId::SYSTEM_ERROR,
            "conversion failed without exception set",
        )),
    }
}
