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

//! # Lexora Threading
//!
//! The concurrency core of the Lexora framework: a fixed-size pool of
//! worker threads that executes background work submitted from any thread,
//! marshals other work back onto a designated main execution context
//! (drained once per frame tick by the host), and provides a blocking,
//! chunked parallel-for with deterministic partitioning and completion
//! tracking.
//!
//! Platforms without native threads degrade to a synchronous
//! single-threaded mode, selected exactly once when the pool is built; the
//! submission surface behaves identically there, minus the parallelism.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod parallel;
pub mod platform;
pub mod pool;
pub mod queue;
pub mod sync;
pub mod task;

pub use config::PoolConfig;
pub use error::ThreadingError;
pub use platform::ThreadingMode;
pub use pool::ThreadPool;
pub use queue::{WorkItem, WorkQueue};
pub use sync::WaitHandle;
pub use task::ParallelTask;
