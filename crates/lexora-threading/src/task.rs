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

//! Parallel-for task descriptors and chunk partitioning.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::error::describe_panic;
use crate::platform::ThreadingMode;
use crate::sync::WaitHandle;

/// The per-index callback of a chunked parallel-for invocation.
pub type ParallelAction = dyn Fn(usize) + Send + Sync;

/// Number of chunks of width `chunk_size` needed to cover `iterations`.
pub(crate) fn chunk_count(iterations: usize, chunk_size: usize) -> usize {
    debug_assert!(chunk_size > 0);
    iterations.div_ceil(chunk_size)
}

/// Contiguous `[start, end)` ranges of width `chunk_size` that exactly tile
/// `[0, iterations)` — no gaps, no overlaps, the final range possibly
/// shorter.
pub(crate) fn chunk_ranges(
    iterations: usize,
    chunk_size: usize,
) -> impl Iterator<Item = (usize, usize)> {
    debug_assert!(chunk_size > 0);
    (0..iterations)
        .step_by(chunk_size)
        .map(move |start| (start, (start + chunk_size).min(iterations)))
}

/// State of one in-flight chunked parallel-for invocation.
///
/// A descriptor is re-armed with [`reset`](Self::reset) before its chunks
/// are enqueued, advanced by each chunk through
/// [`run_chunk`](Self::run_chunk), and signals its finished handle when the
/// last chunk completes. Re-arming waits for the previous invocation to
/// finish first: two overlapping invocations writing the same counter would
/// corrupt the completion count.
pub struct ParallelTask {
    total_chunks: AtomicUsize,
    completed_chunks: AtomicUsize,
    action: RwLock<Option<Arc<ParallelAction>>>,
    finished: WaitHandle,
}

impl ParallelTask {
    /// Creates a descriptor whose finished handle starts Set, so the first
    /// `reset` proceeds without waiting.
    #[must_use]
    pub fn new(mode: ThreadingMode) -> Self {
        Self {
            total_chunks: AtomicUsize::new(0),
            completed_chunks: AtomicUsize::new(0),
            action: RwLock::new(None),
            finished: WaitHandle::new_set(mode),
        }
    }

    /// Re-arms the descriptor for a new invocation.
    ///
    /// Blocks until the previous invocation (if any) has signaled finished,
    /// then zeroes the completion counter, stores the callback, records the
    /// chunk total for `iterations` / `chunk_size`, and resets the finished
    /// handle.
    pub fn reset(&self, iterations: usize, chunk_size: usize, action: Arc<ParallelAction>) {
        self.finished.wait();
        self.completed_chunks.store(0, Ordering::SeqCst);
        *self.action.write().unwrap() = Some(action);
        self.total_chunks
            .store(chunk_count(iterations, chunk_size), Ordering::SeqCst);
        self.finished.reset();
    }

    /// Chunk total recorded by the last [`reset`](Self::reset).
    #[must_use]
    pub fn total_chunks(&self) -> usize {
        self.total_chunks.load(Ordering::SeqCst)
    }

    /// Runs the stored action over `[start, end)`, then records the chunk
    /// as completed.
    ///
    /// Every index is attempted: a panicking index is caught and logged and
    /// the remaining indices still run. The completion increment is
    /// unconditional, so a failing chunk cannot wedge the invocation.
    pub fn run_chunk(&self, start: usize, end: usize) {
        let action = self.action.read().unwrap().clone();
        if let Some(action) = action {
            for index in start..end {
                let outcome = catch_unwind(AssertUnwindSafe(|| action(index)));
                if let Err(payload) = outcome {
                    log::error!(
                        "parallel-for action panicked at index {index}: {}",
                        describe_panic(payload.as_ref())
                    );
                }
            }
        }
        self.complete_chunk();
    }

    /// Counts one finished chunk, signaling the finished handle when it was
    /// the last.
    fn complete_chunk(&self) {
        let completed = self.completed_chunks.fetch_add(1, Ordering::SeqCst) + 1;
        if completed >= self.total_chunks.load(Ordering::SeqCst) {
            self.finished.set();
        }
    }

    /// Blocks until every chunk of the current invocation has completed.
    pub fn wait(&self) {
        self.finished.wait();
    }
}

/// A recycling pool of descriptors, one handed out per parallel-for call.
///
/// Handing each call its own descriptor (instead of funneling every call
/// through one shared descriptor) removes the cross-call blocking the
/// wait-then-reset protocol would otherwise impose, so concurrent
/// parallel-for invocations on the same pool are safe without serializing
/// them. A descriptor re-enters the free list only after its finished
/// handle is set.
pub(crate) struct TaskArena {
    mode: ThreadingMode,
    free: Mutex<Vec<Arc<ParallelTask>>>,
}

impl TaskArena {
    pub(crate) fn new(mode: ThreadingMode) -> Self {
        Self {
            mode,
            free: Mutex::new(Vec::new()),
        }
    }

    /// Takes a recycled descriptor, or allocates one when every descriptor
    /// is in flight.
    pub(crate) fn acquire(&self) -> Arc<ParallelTask> {
        if let Some(task) = self.free.lock().unwrap().pop() {
            return task;
        }
        Arc::new(ParallelTask::new(self.mode))
    }

    /// Returns a descriptor whose invocation has finished.
    pub(crate) fn release(&self, task: Arc<ParallelTask>) {
        self.free.lock().unwrap().push(task);
    }
}
