//!
//! Runtime and the Held Guard
//!
//! A `Runtime` is one managed heap domain: the lock token, the object
//! account and the error-kind registry. Nothing inside it is reachable
//! without a `Held`, the guard returned by `Runtime::acquire`. A `Held` is
//! the proof that the calling thread owns the runtime lock:
//!
//! - read-only operations take `&Held`
//! - operations that mutate container state take `&mut Held`
//! - `Held::scoped_release` gives the lock up for the duration of a closure
//!   and takes it back on every exit path, including unwinding
//!
//! Because the scoped release borrows the guard mutably, no borrowed view and
//! no container access can survive into the released region. Work inside the
//! region that needs the runtime again goes through the `Released` token it
//! is handed; `Runtime::acquire` refuses a thread that is inside one of its
//! own released regions, and a guard taken through the token borrows it, so
//! it cannot outlive the region. Each `Held` also carries the pending-error
//! slot for its thread.
//!

use std::cell::{RefCell, UnsafeCell};
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tracing::{trace, warn};

use crate::exception::{ErrorSlot, KindId, KindRegistry, Raised};
use crate::lock::{LockError, LockState, LockStats, RuntimeLock};
use crate::value::Borrowed;

static NEXT_RUNTIME_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // Runtimes whose lock this thread gave up in `scoped_release`, innermost last.
    static RELEASED_REGIONS: RefCell<Vec<RuntimeId>> = const { RefCell::new(Vec::new()) };
}

fn in_released_region(runtime: RuntimeId) -> bool {
    RELEASED_REGIONS.with(|regions| regions.borrow().contains(&runtime))
}

fn enter_released_region(runtime: RuntimeId) {
    RELEASED_REGIONS.with(|regions| regions.borrow_mut().push(runtime));
}

fn leave_released_region(runtime: RuntimeId) {
    RELEASED_REGIONS.with(|regions| {
        let mut regions = regions.borrow_mut();
        if let Some(index) = regions.iter().rposition(|id| *id == runtime) {
            regions.remove(index);
        }
    });
}

/// Identity of one runtime. Objects remember the runtime that allocated them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeId(u64);

impl RuntimeId {
    fn next() -> Self {
        Self(NEXT_RUNTIME_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Resource limits for a runtime heap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapLimits {
    /// Maximum number of simultaneously live objects; `None` is unbounded
    pub max_objects: Option<usize>,
}

/// Live-object bookkeeping shared by a runtime and every object it allocated
pub(crate) struct HeapAccount {
    pub(crate) runtime: RuntimeId,
    live: AtomicUsize,
    allocated: AtomicU64,
    limit: Option<usize>,
}

impl HeapAccount {
    fn new(runtime: RuntimeId, limits: HeapLimits) -> Self {
        Self {
            runtime,
            live: AtomicUsize::new(0),
            allocated: AtomicU64::new(0),
            limit: limits.max_objects,
        }
    }

    /// Claim room for one object. Fails when the limit is reached.
    pub(crate) fn reserve(&self) -> bool {
        let previous = self.live.fetch_add(1, Ordering::Relaxed);
        if let Some(limit) = self.limit {
            if previous >= limit {
                self.live.fetch_sub(1, Ordering::Relaxed);
                return false;
            }
        }
        self.allocated.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub(crate) fn free(&self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    pub(crate) fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }

    pub(crate) fn limit(&self) -> Option<usize> {
        self.limit
    }
}

/// State that may only be touched while the runtime lock is held.
///
/// Reading requires `&Held` and writing requires `&mut Held` of the runtime
/// the cell belongs to. Since a runtime has at most one `Held` alive at a
/// time, these borrows follow the usual aliasing rules.
pub(crate) struct LockCell<T> {
    runtime: RuntimeId,
    value: UnsafeCell<T>,
}

// SAFETY: every access goes through a `Held` of `runtime`, and only one such
// guard exists at a time; it is `!Send`, so access never leaves its thread.
unsafe impl<T: Send> Sync for LockCell<T> {}

impl<T> LockCell<T> {
    pub(crate) fn new(runtime: RuntimeId, value: T) -> Self {
        Self {
            runtime,
            value: UnsafeCell::new(value),
        }
    }

    pub(crate) fn belongs_to(&self, runtime: RuntimeId) -> bool {
        self.runtime == runtime
    }

    /// Callers check `belongs_to` first; a mismatch here is a bug in this crate.
    pub(crate) fn get<'a>(&'a self, held: &'a Held<'_>) -> &'a T {
        assert_eq!(self.runtime, held.runtime_id(), "lock cell accessed with a foreign guard");
        // SAFETY: `held` proves the lock is owned and is borrowed for 'a, so no
        // `&mut Held` (and therefore no mutable access) can exist meanwhile.
        unsafe { &*self.value.get() }
    }

    /// Callers check `belongs_to` first; a mismatch here is a bug in this crate.
    pub(crate) fn get_mut<'a>(&'a self, held: &'a mut Held<'_>) -> &'a mut T {
        assert_eq!(self.runtime, held.runtime_id(), "lock cell accessed with a foreign guard");
        // SAFETY: the exclusive borrow of the only guard rules out any other
        // access to any cell of this runtime for 'a.
        unsafe { &mut *self.value.get() }
    }
}

pub struct Runtime {
    id: RuntimeId,
    lock: RuntimeLock,
    account: Arc<HeapAccount>,
    pub(crate) kinds: LockCell<KindRegistry>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_limits(HeapLimits::default())
    }

    pub fn with_limits(limits: HeapLimits) -> Self {
        let id = RuntimeId::next();
        Self {
            id,
            lock: RuntimeLock::new(),
            account: Arc::new(HeapAccount::new(id, limits)),
            kinds: LockCell::new(id, KindRegistry::with_builtins()),
        }
    }

    pub fn id(&self) -> RuntimeId {
        self.id
    }

    /// Block until the runtime lock is owned by the calling thread.
    ///
    /// Fails with `LockError::InReleasedRegion` inside a scoped release of
    /// this runtime on the calling thread; use the region's `Released` token.
    pub fn acquire(&self) -> Result<Held<'_>, LockError> {
        if in_released_region(self.id) {
            return Err(LockError::InReleasedRegion);
        }
        self.lock_guard()
    }

    fn lock_guard(&self) -> Result<Held<'_>, LockError> {
        self.lock.acquire()?;
        Ok(Held {
            runtime: self,
            errors: RefCell::new(ErrorSlot::default()),
            _not_send: PhantomData,
        })
    }

    /// Run `f` with the lock held, releasing it afterwards.
    pub fn with_held<T>(&self, f: impl FnOnce(&mut Held<'_>) -> T) -> Result<T, LockError> {
        let mut held = self.acquire()?;
        Ok(f(&mut held))
    }

    pub fn lock_state(&self) -> LockState {
        self.lock.state()
    }

    pub fn lock_stats(&self) -> LockStats {
        self.lock.stats()
    }

    /// Number of objects allocated by this runtime that are still alive
    pub fn live_objects(&self) -> usize {
        self.account.live()
    }

    /// Number of objects allocated over the lifetime of this runtime
    pub fn total_allocations(&self) -> u64 {
        self.account.allocated()
    }

    pub fn heap_limits(&self) -> HeapLimits {
        HeapLimits {
            max_objects: self.account.limit(),
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Handed to the work of `Held::scoped_release` while the lock is given up.
pub struct Released<'rt> {
    runtime: &'rt Runtime,
    _not_send: PhantomData<*const ()>,
}

impl Released<'_> {
    pub fn runtime_id(&self) -> RuntimeId {
        self.runtime.id
    }

    /// Take the lock back for part of the released region.
    ///
    /// The guard borrows this token and so ends before the region does:
    ///
    /// ```compile_fail
    /// use membrane_core::Runtime;
    ///
    /// let rt = Runtime::new();
    /// let mut held = rt.acquire().unwrap();
    /// let inner = held.scoped_release(|released| released.acquire().unwrap());
    /// ```
    pub fn acquire(&self) -> Result<Held<'_>, LockError> {
        self.runtime.lock_guard()
    }
}

/// Proof that the current thread owns a runtime's lock.
pub struct Held<'rt> {
    runtime: &'rt Runtime,
    pub(crate) errors: RefCell<ErrorSlot>,
    _not_send: PhantomData<*const ()>,
}

impl<'rt> Held<'rt> {
    pub fn runtime(&self) -> &'rt Runtime {
        self.runtime
    }

    pub fn runtime_id(&self) -> RuntimeId {
        self.runtime.id
    }

    pub(crate) fn account(&self) -> &Arc<HeapAccount> {
        &self.runtime.account
    }

    pub fn live_objects(&self) -> usize {
        self.runtime.account.live()
    }

    /// Current reference count of an object
    pub fn refcount<'a>(&self, obj: impl Into<Borrowed<'a>>) -> usize {
        obj.into().strong_count()
    }

    /// Give up the lock while `work` runs, then take it back.
    ///
    /// The lock is re-acquired when `work` returns or unwinds. Other threads
    /// may run managed code in the meantime; `work` itself must not touch
    /// runtime objects unless it re-acquires through the `Released` token.
    ///
    /// ```
    /// use membrane_core::{LockState, Runtime};
    ///
    /// let rt = Runtime::new();
    /// let mut held = rt.acquire().unwrap();
    /// let live = held.scoped_release(|released| {
    ///     assert_eq!(rt.lock_state(), LockState::Released);
    ///     let inner = released.acquire().unwrap();
    ///     inner.live_objects()
    /// });
    /// assert_eq!(live, 0);
    /// assert_eq!(rt.lock_state(), LockState::Held);
    /// ```
    pub fn scoped_release<T>(&mut self, work: impl FnOnce(&Released<'_>) -> T) -> T {
        struct Reacquire<'a>(&'a Runtime);

        impl Drop for Reacquire<'_> {
            fn drop(&mut self) {
                leave_released_region(self.0.id);
                if let Err(err) = self.0.lock.acquire() {
                    // Someone still holds a guard of this thread; resuming
                    // would leave two guards alive over one heap.
                    tracing::error!(%err, "failed to re-acquire runtime lock after scoped release");
                    std::process::abort();
                }
            }
        }

        let released = Released {
            runtime: self.runtime,
            _not_send: PhantomData,
        };
        if let Err(err) = self.runtime.lock.release() {
            // Unreachable while this guard exists; run in place rather than
            // re-acquiring a lock this thread never gave up.
            tracing::error!(%err, "scoped release entered without owning the runtime lock");
            return work(&released);
        }
        trace!(runtime = self.runtime.id.0, "entering scoped release");

        enter_released_region(self.runtime.id);
        let _reacquire = Reacquire(self.runtime);
        work(&released)
    }

    /// Raise `MisuseError` for an object that belongs to another runtime.
    pub(crate) fn foreign_object(&self, obj: Borrowed<'_>) -> Raised {
        self.raise_simple(
            KindId::MISUSE_ERROR,
            format!(
                "{} object belongs to runtime {}, not runtime {}",
                obj.value_type(),
                obj.runtime_id().0,
                self.runtime.id.0
            ),
        )
    }

    /// Check that `obj` was allocated by this runtime.
    pub fn check_owner<'a>(&self, obj: impl Into<Borrowed<'a>>) -> Result<(), Raised> {
        let obj = obj.into();
        if obj.runtime_id() == self.runtime.id {
            Ok(())
        } else {
            Err(self.foreign_object(obj))
        }
    }
}

impl Drop for Held<'_> {
    fn drop(&mut self) {
        if let Some(pending) = self.errors.get_mut().take() {
            warn!(error = %pending, "runtime lock released with an unconsumed pending error");
        }
        if let Err(err) = self.runtime.lock.release() {
            tracing::error!(%err, "failed to release runtime lock");
        }
    }
}
