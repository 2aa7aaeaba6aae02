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

//! A binary Set/Reset signal with blocking waits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::platform::ThreadingMode;

/// A manual-reset binary signal.
///
/// The handle is either *Set* or *Reset*. Waiters block until it is Set;
/// setting it releases every current waiter, and every later wait returns
/// immediately until somebody resets it. `set` and `reset` are idempotent
/// and may race with waiters — a `set` racing a wait is never lost, because
/// the flag is read and written under the same mutex the condition variable
/// sleeps on. Concurrent `set`/`reset` calls have no mutual ordering; the
/// last writer wins.
///
/// On platforms without native threads the handle degrades to a plain flag
/// whose waits are non-blocking reads of the current state. That choice is
/// made once at construction via [`ThreadingMode`], never per call.
#[derive(Debug)]
pub struct WaitHandle {
    inner: Inner,
}

#[derive(Debug)]
enum Inner {
    Native { state: Mutex<bool>, cond: Condvar },
    Flag(AtomicBool),
}

impl WaitHandle {
    /// Creates a handle in the Reset state.
    #[must_use]
    pub fn new(mode: ThreadingMode) -> Self {
        Self::with_state(mode, false)
    }

    /// Creates a handle already in the Set state.
    #[must_use]
    pub fn new_set(mode: ThreadingMode) -> Self {
        Self::with_state(mode, true)
    }

    fn with_state(mode: ThreadingMode, set: bool) -> Self {
        let inner = match mode {
            ThreadingMode::Native => Inner::Native {
                state: Mutex::new(set),
                cond: Condvar::new(),
            },
            ThreadingMode::SingleThreaded => Inner::Flag(AtomicBool::new(set)),
        };
        Self { inner }
    }

    /// Moves the handle to the Set state, releasing all current waiters.
    pub fn set(&self) {
        match &self.inner {
            Inner::Native { state, cond } => {
                let mut set = state.lock().unwrap();
                *set = true;
                cond.notify_all();
            }
            Inner::Flag(flag) => flag.store(true, Ordering::SeqCst),
        }
    }

    /// Moves the handle back to the Reset state.
    pub fn reset(&self) {
        match &self.inner {
            Inner::Native { state, .. } => {
                *state.lock().unwrap() = false;
            }
            Inner::Flag(flag) => flag.store(false, Ordering::SeqCst),
        }
    }

    /// Reads the current state without waiting.
    #[must_use]
    pub fn is_set(&self) -> bool {
        match &self.inner {
            Inner::Native { state, .. } => *state.lock().unwrap(),
            Inner::Flag(flag) => flag.load(Ordering::SeqCst),
        }
    }

    /// Blocks until the handle is Set.
    ///
    /// Returns `true` once the handle was observed Set. In fallback mode
    /// this never blocks and simply reports the current state.
    pub fn wait(&self) -> bool {
        match &self.inner {
            Inner::Native { state, cond } => {
                let mut set = state.lock().unwrap();
                while !*set {
                    set = cond.wait(set).unwrap();
                }
                true
            }
            Inner::Flag(flag) => flag.load(Ordering::SeqCst),
        }
    }

    /// Blocks until the handle is Set or `timeout` elapses.
    ///
    /// Returns the state observed when the wait ended: `true` when Set,
    /// `false` on timeout. Fallback mode ignores the timeout and reports
    /// the current state immediately.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match &self.inner {
            Inner::Native { state, cond } => {
                let set = state.lock().unwrap();
                let (set, _result) = cond
                    .wait_timeout_while(set, timeout, |set| !*set)
                    .unwrap();
                *set
            }
            Inner::Flag(flag) => flag.load(Ordering::SeqCst),
        }
    }
}
