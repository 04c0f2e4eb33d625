//! Lock behavior of the `threads` module when one host is shared by threads.

use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use membrane_args::{Bindings, IntWidth, Schema, SlotType};
use membrane_core::{Held, LockState, NativeResult, NativeValue};
use membrane_runtime::{Host, HostConfig, MethodDef, ModuleDef};

fn host() -> Host {
    Host::new(HostConfig::from_toml_str("[modules]\nenabled = [\"threads\"]").unwrap()).unwrap()
}

/// Run `function(arg)` on `threads` threads at once and return the wall time.
fn elapsed_in_parallel(host: &Host, function: &str, arg: NativeValue, threads: usize) -> Duration {
    let start = Instant::now();
    thread::scope(|scope| {
        for _ in 0..threads {
            let arg = arg.clone();
            scope.spawn(move || {
                let out = host.call("threads", function, vec![arg]).unwrap();
                assert_eq!(out, NativeValue::None);
            });
        }
    });
    start.elapsed()
}

#[test]
fn sleeping_without_the_lock_overlaps() {
    let host = host();
    let elapsed = elapsed_in_parallel(&host, "sleep_without_lock", NativeValue::Float(0.5), 2);
    assert!(elapsed < Duration::from_millis(900), "took {elapsed:?}");
    assert_eq!(host.runtime().lock_state(), LockState::Released);
}

#[test]
fn sleeping_with_the_lock_serializes() {
    let host = host();
    let elapsed = elapsed_in_parallel(&host, "sleep_with_lock", NativeValue::Float(0.2), 2);
    assert!(elapsed >= Duration::from_millis(400), "took {elapsed:?}");
}

#[test]
fn fib_without_lock_from_many_threads() {
    let host = host();
    let results: Vec<NativeValue> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let host = &host;
                scope.spawn(move || host.call("threads", "fib_without_lock", vec![NativeValue::Int(25)]).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results, vec![NativeValue::Int(75025); 4]);
    assert_eq!(host.runtime().live_objects(), 0);
    assert!(host.runtime().lock_stats().acquisitions >= 8);
}

/// Threads that arrive here wait until `CPU_WORKERS` of them are inside at once.
static ARRIVED: Mutex<usize> = Mutex::new(0);
static ALL_IN: Condvar = Condvar::new();
const CPU_WORKERS: usize = 3;

fn meet() -> bool {
    let mut arrived = ARRIVED.lock().unwrap();
    *arrived += 1;
    ALL_IN.notify_all();
    let (arrived, timeout) = ALL_IN
        .wait_timeout_while(arrived, Duration::from_secs(5), |n| *n < CPU_WORKERS)
        .unwrap();
    !timeout.timed_out() && *arrived >= CPU_WORKERS
}

fn fib(n: u64) -> u64 {
    if n < 2 { n } else { fib(n - 1) + fib(n - 2) }
}

/// CPU-bound work in a released region that only finishes once every worker
/// is inside its own region.
fn fib_together(held: &mut Held<'_>, args: Bindings) -> NativeResult {
    let (n,): (u64,) = args.extract(held)?;
    let (value, met) = held.scoped_release(|_| {
        let value = fib(n);
        (value, meet())
    });
    let items = vec![held.new_int(value)?, held.new_bool(met)?];
    held.new_tuple(items)
}

#[test]
fn cpu_work_in_released_regions_overlaps() {
    let mut host = Host::new(HostConfig::from_toml_str("[modules]\nenabled = []").unwrap()).unwrap();
    host.load(ModuleDef::new("cpu", "").method(MethodDef::positional(
        Schema::builder("fib_together")
            .required("n", SlotType::Int(IntWidth::U64))
            .build()
            .unwrap(),
        fib_together,
        "",
    )))
    .unwrap();

    let host = &host;
    let results: Vec<NativeValue> = thread::scope(|scope| {
        let handles: Vec<_> = (0..CPU_WORKERS)
            .map(|_| scope.spawn(move || host.call("cpu", "fib_together", vec![NativeValue::Int(22)]).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let expected = NativeValue::tuple([NativeValue::Int(17711), NativeValue::Bool(true)]);
    assert_eq!(results, vec![expected; CPU_WORKERS]);
    assert_eq!(host.runtime().lock_state(), LockState::Released);
}
