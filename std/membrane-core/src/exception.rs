//!
//! Error Kinds and the Pending-Error Slot
//!
//! A failing native operation records an `Exception` in the pending-error
//! slot of the current `Held` guard and returns `Err(Raised)`. `Raised` is
//! the "no value" sentinel: it can only be produced by a raise, so a native
//! function cannot signal failure without recording why.
//!
//! The slot holds at most one error. Raising again before the dispatcher
//! consumes it overwrites the earlier error; the overwrite is counted and
//! logged, never merged.
//!
//! Builtin kinds (parent in brackets):
//! - Exception
//! - TypeError [Exception], ArityError [TypeError], KeywordError [TypeError]
//! - LookupError [Exception], IndexError [LookupError], KeyError [LookupError]
//! - ValueError [Exception]
//! - ArithmeticError [Exception], ZeroDivisionError [ArithmeticError],
//!   OverflowError [ArithmeticError]
//! - RuntimeError [Exception], MisuseError [RuntimeError]
//! - AllocationError [Exception] (fatal)
//! - SystemError [Exception]
//!
//! Extensions register their own kinds with `Held::register_kind`, naming
//! them `module.Name` and optionally hanging them under any existing kind.
//!

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::runtime::Held;
use crate::value::{Borrowed, Owned, Payload};

/// Result of a fallible native operation. `Err(Raised)` means the pending
/// error slot has been set.
pub type NativeResult<T = Owned> = Result<T, Raised>;

/// Identity of an error kind within a runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KindId(u32);

impl KindId {
    pub const EXCEPTION: KindId = KindId(0);
    pub const TYPE_ERROR: KindId = KindId(1);
    pub const ARITY_ERROR: KindId = KindId(2);
    pub const KEYWORD_ERROR: KindId = KindId(3);
    pub const LOOKUP_ERROR: KindId = KindId(4);
    pub const INDEX_ERROR: KindId = KindId(5);
    pub const KEY_ERROR: KindId = KindId(6);
    pub const VALUE_ERROR: KindId = KindId(7);
    pub const ARITHMETIC_ERROR: KindId = KindId(8);
    pub const ZERO_DIVISION_ERROR: KindId = KindId(9);
    pub const OVERFLOW_ERROR: KindId = KindId(10);
    pub const RUNTIME_ERROR: KindId = KindId(11);
    pub const MISUSE_ERROR: KindId = KindId(12);
    pub const ALLOCATION_ERROR: KindId = KindId(13);
    pub const SYSTEM_ERROR: KindId = KindId(14);

    pub fn index(self) -> u32 {
        self.0
    }
}

const BUILTIN_KINDS: &[(KindId, &str, Option<KindId>)] = &[
    (KindId::EXCEPTION, "Exception", None),
    (KindId::TYPE_ERROR, "TypeError", Some(KindId::EXCEPTION)),
    (KindId::ARITY_ERROR, "ArityError", Some(KindId::TYPE_ERROR)),
    (KindId::KEYWORD_ERROR, "KeywordError", Some(KindId::TYPE_ERROR)),
    (KindId::LOOKUP_ERROR, "LookupError", Some(KindId::EXCEPTION)),
    (KindId::INDEX_ERROR, "IndexError", Some(KindId::LOOKUP_ERROR)),
    (KindId::KEY_ERROR, "KeyError", Some(KindId::LOOKUP_ERROR)),
    (KindId::VALUE_ERROR, "ValueError", Some(KindId::EXCEPTION)),
    (KindId::ARITHMETIC_ERROR, "ArithmeticError", Some(KindId::EXCEPTION)),
    (KindId::ZERO_DIVISION_ERROR, "ZeroDivisionError", Some(KindId::ARITHMETIC_ERROR)),
    (KindId::OVERFLOW_ERROR, "OverflowError", Some(KindId::ARITHMETIC_ERROR)),
    (KindId::RUNTIME_ERROR, "RuntimeError", Some(KindId::EXCEPTION)),
    (KindId::MISUSE_ERROR, "MisuseError", Some(KindId::RUNTIME_ERROR)),
    (KindId::ALLOCATION_ERROR, "AllocationError", Some(KindId::EXCEPTION)),
    (KindId::SYSTEM_ERROR, "SystemError", Some(KindId::EXCEPTION)),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum KindError {
    #[error("error kind name must have the form 'module.Name', got '{0}'")]
    BadName(String),

    #[error("error kind '{0}' is already registered")]
    Duplicate(String),

    #[error("parent kind #{0} is not registered")]
    UnknownParent(u32),
}

struct KindEntry {
    qualname: String,
    parent: Option<KindId>,
}

/// Every error kind known to one runtime, builtins first
pub(crate) struct KindRegistry {
    entries: Vec<KindEntry>,
    by_name: HashMap<String, KindId>,
}

impl KindRegistry {
    pub(crate) fn with_builtins() -> Self {
        let mut registry = Self {
            entries: Vec::with_capacity(BUILTIN_KINDS.len()),
            by_name: HashMap::new(),
        };
        for &(kind, name, parent) in BUILTIN_KINDS {
            debug_assert_eq!(kind.0 as usize, registry.entries.len());
            registry.by_name.insert(name.to_string(), kind);
            registry.entries.push(KindEntry {
                qualname: name.to_string(),
                parent,
            });
        }
        registry
    }

    pub(crate) fn qualname(&self, kind: KindId) -> Option<&str> {
        self.entries.get(kind.0 as usize).map(|entry| entry.qualname.as_str())
    }

    pub(crate) fn parent(&self, kind: KindId) -> Option<KindId> {
        self.entries.get(kind.0 as usize).and_then(|entry| entry.parent)
    }

    pub(crate) fn lookup(&self, qualname: &str) -> Option<KindId> {
        self.by_name.get(qualname).copied()
    }

    /// Whether `kind` is `ancestor` or descends from it
    pub(crate) fn is_subkind(&self, kind: KindId, ancestor: KindId) -> bool {
        let mut current = Some(kind);
        while let Some(k) = current {
            if k == ancestor {
                return true;
            }
            current = self.parent(k);
        }
        false
    }

    pub(crate) fn register(
        &mut self,
        qualname: &str,
        parent: Option<KindId>,
    ) -> Result<KindId, KindError> {
        match qualname.rsplit_once('.') {
            Some((module, name)) if !module.is_empty() && !name.is_empty() => {}
            _ => return Err(KindError::BadName(qualname.to_string())),
        }
        if self.by_name.contains_key(qualname) {
            return Err(KindError::Duplicate(qualname.to_string()));
        }
        let parent = parent.unwrap_or(KindId::EXCEPTION);
        if self.qualname(parent).is_none() {
            return Err(KindError::UnknownParent(parent.0));
        }

        let kind = KindId(self.entries.len() as u32);
        self.entries.push(KindEntry {
            qualname: qualname.to_string(),
            parent: Some(parent),
        });
        self.by_name.insert(qualname.to_string(), kind);
        Ok(kind)
    }

    /// Free the name of a custom kind. Its id keeps resolving, so exceptions
    /// already carrying it still render and match.
    pub(crate) fn retire(&mut self, kind: KindId) -> bool {
        if (kind.0 as usize) < BUILTIN_KINDS.len() {
            return false;
        }
        let Some(entry) = self.entries.get(kind.0 as usize) else {
            return false;
        };
        if self.by_name.get(&entry.qualname) != Some(&kind) {
            return false;
        }
        self.by_name.remove(&entry.qualname);
        true
    }
}

/// A consumed error: what the dispatcher hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    kind: KindId,
    qualname: String,
    message: String,
    fatal: bool,
}

impl Exception {
    pub fn kind(&self) -> KindId {
        self.kind
    }

    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Fatal errors (resource exhaustion) cannot be handled by native code.
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.qualname, self.message)
    }
}

impl std::error::Error for Exception {}

/// Proof that the pending-error slot has been set.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a raised error must be returned so the dispatcher sees it"]
pub struct Raised {
    _private: (),
}

impl fmt::Display for Raised {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("error raised")
    }
}

/// The single pending-error slot of one execution context
#[derive(Debug, Default)]
pub(crate) struct ErrorSlot {
    pending: Option<Exception>,
    overwrites: u64,
}

impl ErrorSlot {
    fn set(&mut self, exception: Exception) -> Option<Exception> {
        let previous = self.pending.replace(exception);
        if previous.is_some() {
            self.overwrites += 1;
        }
        previous
    }

    pub(crate) fn take(&mut self) -> Option<Exception> {
        self.pending.take()
    }

    fn kind(&self) -> Option<KindId> {
        self.pending.as_ref().map(Exception::kind)
    }
}

impl Held<'_> {
    /// Build an exception value without raising it.
    pub fn new_exception(&self, kind: KindId, message: impl Into<String>) -> Exception {
        let kinds = self.runtime().kinds.get(self);
        let qualname = match kinds.qualname(kind) {
            Some(name) => name.to_string(),
            None => format!("<unknown kind #{}>", kind.0),
        };
        Exception {
            kind,
            qualname,
            message: message.into(),
            fatal: kinds.is_subkind(kind, KindId::ALLOCATION_ERROR),
        }
    }

    /// Set the pending error to `(kind, message)`, replacing any earlier one.
    pub fn raise_simple(&self, kind: KindId, message: impl Into<String>) -> Raised {
        let exception = self.new_exception(kind, message);
        self.restore_error(exception)
    }

    /// Like `raise_simple`, with the message rendered now from `args`.
    pub fn raise_formatted(&self, kind: KindId, args: fmt::Arguments<'_>) -> Raised {
        self.raise_simple(kind, args.to_string())
    }

    /// Put a previously consumed exception back into the slot.
    pub fn restore_error(&self, exception: Exception) -> Raised {
        let mut slot = self.errors.borrow_mut();
        if let Some(previous) = slot.set(exception) {
            debug!(
                previous = %previous,
                "pending error overwritten before it was consumed"
            );
        }
        Raised { _private: () }
    }

    /// Kind of the pending error, if any
    pub fn error_occurred(&self) -> Option<KindId> {
        self.errors.borrow().kind()
    }

    /// Consume the pending error.
    pub fn take_error(&self) -> Option<Exception> {
        self.errors.borrow_mut().take()
    }

    pub fn clear_error(&self) {
        self.errors.borrow_mut().pending = None;
    }

    /// How many pending errors were overwritten before being consumed
    pub fn overwritten_errors(&self) -> u64 {
        self.errors.borrow().overwrites
    }

    /// Register a custom error kind and return an owned handle to it.
    ///
    /// The caller keeps the handle alive for as long as the kind is in use;
    /// modules store it as an attribute.
    pub fn register_kind(&mut self, qualname: &str, parent: Option<KindId>) -> NativeResult<Owned> {
        let runtime = self.runtime();
        let outcome = runtime.kinds.get_mut(self).register(qualname, parent);
        let kind = match outcome {
            Ok(kind) => kind,
            Err(err) => return Err(self.raise_simple(KindId::VALUE_ERROR, err.to_string())),
        };
        debug!(kind = qualname, id = kind.0, "registered error kind");
        self.alloc(Payload::Kind(kind))
    }

    /// Withdraw the qualified name of a custom kind so it can be registered
    /// again. Builtin kinds are never retired.
    pub fn retire_kind(&mut self, kind: KindId) -> bool {
        let runtime = self.runtime();
        let retired = runtime.kinds.get_mut(self).retire(kind);
        if retired {
            debug!(id = kind.0, "retired error kind");
        }
        retired
    }

    pub fn lookup_kind(&self, qualname: &str) -> Option<KindId> {
        self.runtime().kinds.get(self).lookup(qualname)
    }

    pub fn kind_name(&self, kind: KindId) -> Option<String> {
        self.runtime().kinds.get(self).qualname(kind).map(str::to_string)
    }

    pub fn kind_parent(&self, kind: KindId) -> Option<KindId> {
        self.runtime().kinds.get(self).parent(kind)
    }

    pub fn is_subkind(&self, kind: KindId, ancestor: KindId) -> bool {
        self.runtime().kinds.get(self).is_subkind(kind, ancestor)
    }

    /// Whether `exception` is of `kind` or one of its descendants
    pub fn exception_matches(&self, exception: &Exception, kind: KindId) -> bool {
        self.is_subkind(exception.kind, kind)
    }

    /// The kind identity stored in a kind object
    pub fn kind_of<'a>(&self, obj: impl Into<Borrowed<'a>>) -> NativeResult<KindId> {
        let obj = obj.into();
        match obj.payload() {
            Payload::Kind(kind) => Ok(*kind),
            _ => Err(self.expected("error kind", obj)),
        }
    }
}

/// Raise with a message formatted at the call site.
///
/// ```ignore
/// return Err(raise_fmt!(held, KindId::RUNTIME_ERROR, "Error code: {}", code));
/// ```
#[macro_export]
macro_rules! raise_fmt {
    ($held:expr, $kind:expr, $($arg:tt)+) => {
        $held.raise_formatted($kind, ::std::format_args!($($arg)+))
    };
}
