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

//! Process-wide access to a shared [`ThreadPool`].
//!
//! Framework code that cannot plumb a pool handle through its call graph
//! installs one pool here and submits through the free functions, which
//! mirror the pool's own surface.

use std::sync::OnceLock;

use crate::error::ThreadingError;
use crate::pool::ThreadPool;

static GLOBAL: OnceLock<ThreadPool> = OnceLock::new();

/// Installs `pool` as the process-wide pool.
///
/// First installation wins. A later call reports
/// [`ThreadingError::AlreadyInstalled`] and leaves the existing pool in
/// place; the rejected pool is disposed by its `Drop`.
pub fn install(pool: ThreadPool) -> Result<(), ThreadingError> {
    GLOBAL.set(pool).map_err(|_| ThreadingError::AlreadyInstalled)
}

/// The process-wide pool, created with the default configuration on first
/// use if none was installed.
pub fn global() -> &'static ThreadPool {
    GLOBAL.get_or_init(ThreadPool::new)
}

/// [`ThreadPool::run_in_background`] on the process-wide pool.
pub fn run_in_background<F>(work: F)
where
    F: FnOnce() + Send + 'static,
{
    global().run_in_background(work);
}

/// [`ThreadPool::run_on_main_thread`] on the process-wide pool.
pub fn run_on_main_thread<F>(work: F)
where
    F: FnOnce() + Send + 'static,
{
    global().run_on_main_thread(work);
}

/// [`ThreadPool::parallel_for`] on the process-wide pool.
pub fn parallel_for<F>(iterations: usize, action: F)
where
    F: Fn(usize) + Send + Sync + 'static,
{
    global().parallel_for(iterations, action);
}

/// [`ThreadPool::drain_main_thread`] on the process-wide pool.
pub fn drain_main_thread() {
    global().drain_main_thread();
}
