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

//! Platform capability detection for the threading core.
//!
//! The capability is resolved exactly once when a pool is constructed.
//! Everything downstream branches on the stored [`ThreadingMode`] rather
//! than probing the environment again at each call site.

/// Whether the current platform can run native OS threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadingMode {
    /// OS threads are available; submitted work runs on pool workers.
    #[default]
    Native,
    /// No native threads (e.g. wasm targets, or a failed worker spawn).
    /// Every submission executes synchronously on the calling thread and
    /// wait handles degrade to plain flags.
    SingleThreaded,
}

impl ThreadingMode {
    /// Probes the platform once and returns its capability.
    #[must_use]
    pub fn detect() -> Self {
        if cfg!(target_family = "wasm") {
            ThreadingMode::SingleThreaded
        } else {
            ThreadingMode::Native
        }
    }

    /// Returns `true` when native threads are available.
    #[must_use]
    pub fn is_native(self) -> bool {
        matches!(self, ThreadingMode::Native)
    }
}

/// Default worker count: one thread per logical core, leaving one core to
/// the main context, and never fewer than one worker.
pub(crate) fn default_worker_count() -> usize {
    let cores = std::thread::available_parallelism().map_or(2, |count| count.get());
    cores.saturating_sub(1).max(1)
}
