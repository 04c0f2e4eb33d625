//!
//! membrane-core - Core Runtime Types
//!
//! This crate provides the pieces every native function touches when it
//! crosses the boundary into a managed runtime:
//!
//! - `Runtime` and `RuntimeLock`, the single token guarding a heap
//! - `Held`, the proof that the lock is owned; every value operation takes it
//! - `Owned` and `Borrowed` handles over reference-counted objects
//! - Containers (tuple, list, dict, set) and the iterator protocol
//! - Error kinds, the pending-error slot and the `Raised` sentinel
//! - Conversions between runtime objects and plain Rust values
//!
//! All objects use atomic reference counting. Mutable container state is
//! only reachable through the `Held` guard of the runtime that created it.
//!

pub mod lock;
pub mod runtime;
pub mod value;
pub mod exception;
pub mod construct;
pub mod containers;
pub mod iter;
pub mod convert;
pub mod native;

pub use lock::*;
pub use runtime::*;
pub use value::*;
pub use exception::*;
pub use iter::*;
pub use convert::*;
pub use native::*;
