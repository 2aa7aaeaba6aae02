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

//! Construction-time configuration for the thread pool.

use std::time::Duration;

/// Configuration for a [`ThreadPool`](crate::ThreadPool).
///
/// Captured once when the pool is built and immutable afterwards.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads. `None` selects
    /// `max(1, available_parallelism - 1)`.
    pub worker_count: Option<usize>,
    /// Shortest time an idle worker blocks on the queue signal before
    /// re-checking for work.
    pub backoff_floor: Duration,
    /// Longest idle wait. The per-worker wait doubles from the floor up to
    /// this bound while no work arrives, and snaps back to the floor as
    /// soon as an item is found. The 1ms → 8ms defaults are a
    /// responsiveness heuristic, not a contract.
    pub backoff_ceiling: Duration,
    /// Prefix for worker thread names (`<prefix>-worker-N`).
    pub thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            backoff_floor: Duration::from_millis(1),
            backoff_ceiling: Duration::from_millis(8),
            thread_name_prefix: "lexora".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_tuned_constants() {
        let config = PoolConfig::default();
        assert_eq!(config.worker_count, None);
        assert_eq!(config.backoff_floor, Duration::from_millis(1));
        assert_eq!(config.backoff_ceiling, Duration::from_millis(8));
        assert_eq!(config.thread_name_prefix, "lexora");
    }
}
