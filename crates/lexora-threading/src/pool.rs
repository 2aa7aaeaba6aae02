// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The fixed-size worker-thread pool.
//!
//! The pool owns N worker threads, a background work queue with its
//! not-empty signal, and a main-thread queue drained once per tick by the
//! host. It orchestrates the three submission operations:
//! [`run_in_background`](ThreadPool::run_in_background),
//! [`run_on_main_thread`](ThreadPool::run_on_main_thread) and
//! [`parallel_for`](ThreadPool::parallel_for).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::PoolConfig;
use crate::error::{describe_panic, ThreadingError};
use crate::platform::{default_worker_count, ThreadingMode};
use crate::queue::WorkQueue;
use crate::sync::WaitHandle;
use crate::task::{chunk_ranges, ParallelAction, TaskArena};

/// State shared between the pool handle and its worker threads.
struct PoolShared {
    /// Work executed by the workers.
    background: WorkQueue,
    /// Signaled on every background enqueue; idle workers block on it.
    queue_not_empty: WaitHandle,
    /// Work drained on the main context, once per external tick.
    main_thread: WorkQueue,
    /// Tells the worker loops to exit.
    stop: AtomicBool,
    /// Idle-wait bounds, copied from the pool configuration.
    backoff_floor: Duration,
    backoff_ceiling: Duration,
}

/// Worker bookkeeping, guarded by the pool's state mutex.
#[derive(Default)]
struct PoolState {
    workers: Vec<JoinHandle<()>>,
    initialized: bool,
}

/// A fixed-size worker-thread pool with main-thread marshaling and a
/// blocking chunked parallel-for.
///
/// Construction is cheap and spawns nothing; the workers are started
/// lazily by the first submission (or an explicit
/// [`initialize`](Self::initialize)). [`dispose`](Self::dispose) joins the
/// workers and returns the pool to the uninitialized state, from which a
/// later submission transparently re-starts it. Dropping the pool disposes
/// it.
///
/// On platforms without native threads — or after a worker spawn failure —
/// the pool operates in a synchronous fallback mode in which every
/// submission executes immediately on the calling thread with the same
/// observable results.
pub struct ThreadPool {
    /// Capability detected (or forced) at construction. Immutable.
    mode: ThreadingMode,
    /// Set when worker spawning failed; forces the synchronous path.
    degraded: AtomicBool,
    /// Lock-free mirror of `PoolState::initialized`, so the submission
    /// fast path does not serialize on the state mutex.
    started: AtomicBool,
    worker_count: usize,
    thread_name_prefix: String,
    shared: Arc<PoolShared>,
    state: Mutex<PoolState>,
    arena: TaskArena,
    /// Exclusivity check for the per-tick main-thread drain.
    draining: AtomicBool,
}

impl ThreadPool {
    /// Creates a pool with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Creates a pool with an explicit configuration, detecting the
    /// platform capability once.
    #[must_use]
    pub fn with_config(config: PoolConfig) -> Self {
        Self::with_mode(config, ThreadingMode::detect())
    }

    /// Creates a pool with an explicit capability mode.
    ///
    /// Passing [`ThreadingMode::SingleThreaded`] forces the synchronous
    /// fallback path for every submission regardless of what the platform
    /// supports.
    #[must_use]
    pub fn with_mode(config: PoolConfig, mode: ThreadingMode) -> Self {
        let worker_count = config
            .worker_count
            .unwrap_or_else(default_worker_count)
            .max(1);
        Self {
            mode,
            degraded: AtomicBool::new(false),
            started: AtomicBool::new(false),
            worker_count,
            shared: Arc::new(PoolShared {
                background: WorkQueue::new(),
                queue_not_empty: WaitHandle::new(mode),
                main_thread: WorkQueue::new(),
                stop: AtomicBool::new(false),
                backoff_floor: config.backoff_floor,
                backoff_ceiling: config.backoff_ceiling,
            }),
            thread_name_prefix: config.thread_name_prefix,
            state: Mutex::new(PoolState::default()),
            arena: TaskArena::new(mode),
            draining: AtomicBool::new(false),
        }
    }

    /// Number of worker threads the pool runs when native threading is
    /// available. Computed once at construction:
    /// `max(1, available_parallelism - 1)` unless overridden.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.worker_count
    }

    /// The capability mode the pool currently operates in.
    ///
    /// Reports [`ThreadingMode::SingleThreaded`] when construction-time
    /// detection said so, or when worker spawning failed and the pool
    /// degraded.
    #[must_use]
    pub fn threading_mode(&self) -> ThreadingMode {
        if self.is_threaded() {
            ThreadingMode::Native
        } else {
            ThreadingMode::SingleThreaded
        }
    }

    /// `true` while workers are spawned and not yet disposed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.lock().unwrap().initialized
    }

    fn is_threaded(&self) -> bool {
        self.mode.is_native() && !self.degraded.load(Ordering::Relaxed)
    }

    /// Spawns the worker threads if they are not already running.
    ///
    /// Idempotent; the submission operations call it lazily. A spawn
    /// failure stops and joins any workers already started, logs the error
    /// and degrades the pool to the synchronous fallback rather than
    /// leaving it half-alive.
    pub fn initialize(&self) {
        if !self.is_threaded() || self.started.load(Ordering::Acquire) {
            return;
        }
        let mut state = self.state.lock().unwrap();
        if state.initialized {
            return;
        }

        self.shared.stop.store(false, Ordering::SeqCst);
        for index in 0..self.worker_count {
            let name = format!("{}-worker-{index}", self.thread_name_prefix);
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(&shared));
            match spawned {
                Ok(handle) => state.workers.push(handle),
                Err(source) => {
                    let error = ThreadingError::Spawn { name, source };
                    log::error!("{error}; falling back to single-threaded execution");
                    self.degraded.store(true, Ordering::SeqCst);
                    self.stop_workers(&mut state);
                    return;
                }
            }
        }
        state.initialized = true;
        self.started.store(true, Ordering::Release);
        log::info!(
            "thread pool initialized with {} worker threads",
            self.worker_count
        );
    }

    /// Flips the stop flag, joins every worker that was spawned, and
    /// returns the pool to the uninitialized state so a later submission
    /// reinitializes it. Idempotent. Queued main-thread work survives and
    /// is picked up by the next drain.
    pub fn dispose(&self) {
        let mut state = self.state.lock().unwrap();
        if !state.initialized && state.workers.is_empty() {
            return;
        }
        self.stop_workers(&mut state);
        log::info!("thread pool disposed");
    }

    /// Stops and joins the workers, leaving the pool reusable.
    fn stop_workers(&self, state: &mut PoolState) {
        self.shared.stop.store(true, Ordering::SeqCst);
        // Wake sleepers so they observe the stop flag promptly instead of
        // timing out their current backoff interval.
        self.shared.queue_not_empty.set();
        for handle in state.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("worker thread panicked during shutdown");
            }
        }
        self.shared.stop.store(false, Ordering::SeqCst);
        self.shared.queue_not_empty.reset();
        state.initialized = false;
        self.started.store(false, Ordering::Release);
    }

    /// Enqueues `work` for execution on a worker thread and wakes the
    /// workers.
    ///
    /// Fire-and-forget: a panic inside `work` is caught and logged, never
    /// returned. In fallback mode `work` runs synchronously right here.
    pub fn run_in_background<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.initialize();
        if !self.is_threaded() {
            run_isolated(work);
            return;
        }
        self.shared.background.enqueue(Box::new(work));
        self.shared.queue_not_empty.set();
    }

    /// Enqueues `work` onto the main-thread queue, to be executed by the
    /// next [`drain_main_thread`](Self::drain_main_thread) tick.
    ///
    /// No worker is woken — the main-thread queue is drained by the
    /// external tick, not by the pool. In fallback mode `work` runs
    /// synchronously right here.
    pub fn run_on_main_thread<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.initialize();
        if !self.is_threaded() {
            run_isolated(work);
            return;
        }
        self.shared.main_thread.enqueue(Box::new(work));
    }

    /// Runs `action(i)` for every `i` in `[0, iterations)`, splitting the
    /// range into contiguous chunks executed on the worker threads, and
    /// blocks until every chunk has completed.
    ///
    /// Completion means every index was *attempted*: a panicking index is
    /// caught and logged, and the remaining indices still run. Without
    /// native threads the loop runs synchronously on the calling thread
    /// with identical observable results.
    ///
    /// Must not be called from one of the pool's own worker threads — the
    /// calling thread blocks without helping, so a worker calling it could
    /// starve the pool.
    pub fn parallel_for<F>(&self, iterations: usize, action: F)
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.initialize();
        if !self.is_threaded() {
            for index in 0..iterations {
                run_isolated(|| action(index));
            }
            return;
        }
        if iterations == 0 {
            return;
        }

        let chunk_size = (iterations / self.worker_count).clamp(1, iterations);
        let action: Arc<ParallelAction> = Arc::new(action);
        let task = self.arena.acquire();
        task.reset(iterations, chunk_size, action);

        for (start, end) in chunk_ranges(iterations, chunk_size) {
            let task = Arc::clone(&task);
            self.shared
                .background
                .enqueue(Box::new(move || task.run_chunk(start, end)));
            self.shared.queue_not_empty.set();
        }

        task.wait();
        self.arena.release(task);
    }

    /// Drains the main-thread queue: dequeues and runs items until the
    /// queue reports empty, preserving submission order for items enqueued
    /// from a single thread.
    ///
    /// Host contract: called exactly once per tick, from one thread. The
    /// call is synchronous and non-reentrant; concurrent drains trip a
    /// debug assertion. Item panics are caught and logged so a bad item
    /// cannot wedge the tick loop.
    pub fn drain_main_thread(&self) {
        let already_draining = self.draining.swap(true, Ordering::Acquire);
        debug_assert!(!already_draining, "drain_main_thread is non-reentrant");

        while let Some(item) = self.shared.main_thread.dequeue() {
            run_isolated(item);
        }

        self.draining.store(false, Ordering::Release);
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// The worker state machine: block on the not-empty signal with an
/// exponentially backing-off timeout, try to dequeue, execute with failure
/// isolation, exit once the stop flag is observed.
fn worker_loop(shared: &PoolShared) {
    let mut idle_wait = shared.backoff_floor;
    while !shared.stop.load(Ordering::Relaxed) {
        // A timed-out wait on an apparently empty queue backs off a little
        // further. The cheap is_empty re-check catches an enqueue whose
        // signal raced our timeout, so we do not sleep through it.
        if !shared.queue_not_empty.wait_timeout(idle_wait) && shared.background.is_empty() {
            idle_wait = (idle_wait * 2).min(shared.backoff_ceiling);
            continue;
        }

        let Some(item) = shared.background.dequeue() else {
            // The miss means the queue just drained; park until the next
            // enqueue signals again.
            shared.queue_not_empty.reset();
            continue;
        };

        idle_wait = shared.backoff_floor;
        run_isolated(item);
    }
}

/// Runs one work item, catching a panic and logging it instead of letting
/// it tear down the executing thread.
fn run_isolated(item: impl FnOnce()) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(item)) {
        let thread = thread::current();
        log::error!(
            "unhandled panic in work item on '{}': {}",
            thread.name().unwrap_or("<unnamed>"),
            describe_panic(payload.as_ref())
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    fn native_pool(workers: usize) -> ThreadPool {
        let config = PoolConfig {
            worker_count: Some(workers),
            ..PoolConfig::default()
        };
        ThreadPool::with_mode(config, ThreadingMode::Native)
    }

    fn fallback_pool() -> ThreadPool {
        ThreadPool::with_mode(PoolConfig::default(), ThreadingMode::SingleThreaded)
    }

    #[test]
    fn thread_count_is_at_least_one() {
        assert!(ThreadPool::new().thread_count() >= 1);
        assert_eq!(native_pool(3).thread_count(), 3);
    }

    #[test]
    fn run_in_background_executes_submitted_work() {
        let pool = native_pool(2);
        let (tx, rx) = flume::bounded(1);

        pool.run_in_background(move || {
            tx.send(42).expect("result channel closed");
        });

        assert_eq!(rx.recv_timeout(RECV_TIMEOUT), Ok(42));
        pool.dispose();
    }

    #[test]
    fn concurrent_submissions_each_execute_exactly_once() {
        const SUBMITTERS: usize = 8;
        const PER_SUBMITTER: usize = 50;
        const TOTAL: usize = SUBMITTERS * PER_SUBMITTER;

        let pool = Arc::new(native_pool(4));
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = flume::unbounded();

        let submitters: Vec<_> = (0..SUBMITTERS)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let counter = Arc::clone(&counter);
                let tx = tx.clone();
                thread::spawn(move || {
                    for _ in 0..PER_SUBMITTER {
                        let counter = Arc::clone(&counter);
                        let tx = tx.clone();
                        pool.run_in_background(move || {
                            counter.fetch_add(1, Ordering::SeqCst);
                            tx.send(()).expect("result channel closed");
                        });
                    }
                })
            })
            .collect();
        for submitter in submitters {
            submitter.join().expect("submitter panicked");
        }

        for received in 0..TOTAL {
            rx.recv_timeout(RECV_TIMEOUT)
                .unwrap_or_else(|_| panic!("lost a work item after {received} executions"));
        }
        assert_eq!(counter.load(Ordering::SeqCst), TOTAL);
        pool.dispose();
    }

    #[test]
    fn parallel_for_zero_iterations_is_a_no_op() {
        let pool = native_pool(2);
        let hits = Arc::new(AtomicUsize::new(0));

        let inner = Arc::clone(&hits);
        pool.parallel_for(0, move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        pool.dispose();
    }

    #[test]
    fn parallel_for_visits_every_index_exactly_once() {
        const ITERATIONS: usize = 1000;

        for workers in [1, 2, 3, 8] {
            let pool = native_pool(workers);
            let visits: Arc<Vec<AtomicUsize>> =
                Arc::new((0..ITERATIONS).map(|_| AtomicUsize::new(0)).collect());

            let inner = Arc::clone(&visits);
            pool.parallel_for(ITERATIONS, move |index| {
                inner[index].fetch_add(1, Ordering::SeqCst);
            });

            for (index, count) in visits.iter().enumerate() {
                assert_eq!(
                    count.load(Ordering::SeqCst),
                    1,
                    "index {index} with {workers} workers"
                );
            }
            pool.dispose();
        }
    }

    #[test]
    fn parallel_for_survives_a_panicking_index() {
        const ITERATIONS: usize = 100;
        const BAD_INDEX: usize = 37;

        let pool = native_pool(2);
        let visits: Arc<Vec<AtomicUsize>> =
            Arc::new((0..ITERATIONS).map(|_| AtomicUsize::new(0)).collect());

        let inner = Arc::clone(&visits);
        pool.parallel_for(ITERATIONS, move |index| {
            if index == BAD_INDEX {
                panic!("deliberate failure");
            }
            inner[index].fetch_add(1, Ordering::SeqCst);
        });

        // The call returned (no deadlock) and every sibling index ran once.
        for (index, count) in visits.iter().enumerate() {
            let expected = usize::from(index != BAD_INDEX);
            assert_eq!(count.load(Ordering::SeqCst), expected, "index {index}");
        }
        pool.dispose();
    }

    #[test]
    fn sequential_parallel_for_calls_recycle_cleanly() {
        let pool = native_pool(2);
        for round in 0..5 {
            let counter = Arc::new(AtomicUsize::new(0));
            let inner = Arc::clone(&counter);
            pool.parallel_for(64, move |_| {
                inner.fetch_add(1, Ordering::SeqCst);
            });
            assert_eq!(counter.load(Ordering::SeqCst), 64, "round {round}");
        }
        pool.dispose();
    }

    #[test]
    fn concurrent_parallel_for_calls_are_safe() {
        const CALLERS: usize = 4;
        const ITERATIONS: usize = 200;

        let pool = Arc::new(native_pool(4));
        let callers: Vec<_> = (0..CALLERS)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    let counter = Arc::new(AtomicUsize::new(0));
                    let inner = Arc::clone(&counter);
                    pool.parallel_for(ITERATIONS, move |_| {
                        inner.fetch_add(1, Ordering::SeqCst);
                    });
                    counter.load(Ordering::SeqCst)
                })
            })
            .collect();

        for caller in callers {
            assert_eq!(caller.join().expect("caller panicked"), ITERATIONS);
        }
        pool.dispose();
    }

    #[test]
    fn main_thread_items_drain_in_submission_order() {
        let pool = native_pool(2);
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            pool.run_on_main_thread(move || order.lock().unwrap().push(label));
        }

        // Nothing runs before the tick drains the queue.
        assert!(order.lock().unwrap().is_empty());
        pool.drain_main_thread();
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);

        // The next tick has nothing left to do.
        pool.drain_main_thread();
        assert_eq!(order.lock().unwrap().len(), 3);
        pool.dispose();
    }

    #[test]
    fn a_panicking_main_thread_item_does_not_wedge_the_tick() {
        let pool = native_pool(2);
        let order = Arc::new(Mutex::new(Vec::new()));

        pool.run_on_main_thread(|| panic!("bad main-thread item"));
        {
            let order = Arc::clone(&order);
            pool.run_on_main_thread(move || order.lock().unwrap().push("after"));
        }

        pool.drain_main_thread();
        assert_eq!(*order.lock().unwrap(), vec!["after"]);
        pool.dispose();
    }

    #[test]
    fn worker_survives_a_panicking_item() {
        // One worker: the same thread that caught the panic must keep
        // consuming items afterwards.
        let pool = native_pool(1);
        let (tx, rx) = flume::bounded(1);

        pool.run_in_background(|| panic!("deliberate failure"));
        pool.run_in_background(move || {
            tx.send(7).expect("result channel closed");
        });

        assert_eq!(rx.recv_timeout(RECV_TIMEOUT), Ok(7));
        pool.dispose();
    }

    #[test]
    fn dispose_joins_workers_and_a_later_submission_reinitializes() {
        let pool = native_pool(2);
        let (tx, rx) = flume::bounded(1);
        pool.run_in_background(move || tx.send(1).expect("result channel closed"));
        assert_eq!(rx.recv_timeout(RECV_TIMEOUT), Ok(1));
        assert!(pool.is_initialized());

        pool.dispose();
        assert!(!pool.is_initialized());

        let (tx, rx) = flume::bounded(1);
        pool.run_in_background(move || tx.send(2).expect("result channel closed"));
        assert!(pool.is_initialized());
        assert_eq!(rx.recv_timeout(RECV_TIMEOUT), Ok(2));
        pool.dispose();
    }

    #[test]
    fn lifecycle_calls_are_idempotent() {
        let pool = native_pool(2);
        pool.initialize();
        pool.initialize();
        assert!(pool.is_initialized());
        assert_eq!(pool.threading_mode(), ThreadingMode::Native);

        pool.dispose();
        pool.dispose();
        assert!(!pool.is_initialized());
    }

    #[test]
    fn drop_disposes_a_running_pool() {
        let (tx, rx) = flume::bounded(1);
        {
            let pool = native_pool(2);
            pool.run_in_background(move || tx.send(5).expect("result channel closed"));
            assert_eq!(rx.recv_timeout(RECV_TIMEOUT), Ok(5));
        }
        // Leaving the scope joined the workers without hanging.
    }

    #[test]
    fn fallback_mode_runs_everything_synchronously() {
        let pool = fallback_pool();
        let counter = Arc::new(AtomicUsize::new(0));

        let inner = Arc::clone(&counter);
        pool.run_in_background(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let inner = Arc::clone(&counter);
        pool.run_on_main_thread(move || {
            inner.fetch_add(10, Ordering::SeqCst);
        });
        // Executed immediately; no tick required.
        assert_eq!(counter.load(Ordering::SeqCst), 11);

        let inner = Arc::clone(&counter);
        pool.parallel_for(100, move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 111);

        assert!(!pool.is_initialized());
        assert_eq!(pool.threading_mode(), ThreadingMode::SingleThreaded);
    }

    #[test]
    fn fallback_parallel_for_matches_the_threaded_accumulation() {
        const ITERATIONS: usize = 500;
        let expected: usize = (0..ITERATIONS).sum();

        let threaded_sum = Arc::new(AtomicUsize::new(0));
        let threaded = native_pool(4);
        let inner = Arc::clone(&threaded_sum);
        threaded.parallel_for(ITERATIONS, move |index| {
            inner.fetch_add(index, Ordering::SeqCst);
        });
        threaded.dispose();

        let fallback_sum = Arc::new(AtomicUsize::new(0));
        let fallback = fallback_pool();
        let inner = Arc::clone(&fallback_sum);
        fallback.parallel_for(ITERATIONS, move |index| {
            inner.fetch_add(index, Ordering::SeqCst);
        });

        assert_eq!(threaded_sum.load(Ordering::SeqCst), expected);
        assert_eq!(fallback_sum.load(Ordering::SeqCst), expected);
    }

    #[test]
    fn fallback_parallel_for_swallows_index_panics_like_the_threaded_path() {
        let pool = fallback_pool();
        let counter = Arc::new(AtomicUsize::new(0));

        let inner = Arc::clone(&counter);
        pool.parallel_for(10, move |index| {
            if index == 3 {
                panic!("deliberate failure");
            }
            inner.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(counter.load(Ordering::SeqCst), 9);
    }
}
