//!
//! membrane-runtime - Native Function Host
//!
//! Puts the core value model and the argument decoder behind a call
//! interface:
//!
//! - `registry`: registration tables and calling conventions
//! - `dispatch`: runs a native function and consumes the pending-error slot
//! - `module`: validated, initialized modules
//! - `host`: a runtime with its loaded modules, callable with native values
//! - `config` and `logging`: `membrane.toml` and the tracing subscriber
//! - `modules`: the builtin extension modules
//!

pub mod registry;
mod dispatch;
pub mod module;
pub mod config;
pub mod logging;
pub mod host;
pub mod modules;

pub use config::{ConfigError, HostConfig, LogConfig};
pub use host::{Host, HostError};
pub use logging::init_logging;
pub use module::{LoadError, Module};
pub use registry::{CallConvention, MethodDef, ModuleDef, ModuleInit, NativeFn, RegistrationError};
