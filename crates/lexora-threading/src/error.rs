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

//! Error types for the threading core.
//!
//! Submission operations are fire-and-forget, so most failures surface
//! through logging rather than return values; the variants here cover the
//! few places where an error is worth handing back to the caller.

use std::any::Any;

use thiserror::Error;

/// Errors reported by the thread pool and its process-wide facade.
#[derive(Debug, Error)]
pub enum ThreadingError {
    /// The OS refused to spawn a worker thread. The pool recovers by
    /// degrading to synchronous single-threaded execution.
    #[error("failed to spawn worker thread '{name}': {source}")]
    Spawn {
        /// The name the worker thread would have carried.
        name: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A process-wide pool was already installed through the facade.
    #[error("a global thread pool is already installed")]
    AlreadyInstalled,
}

/// Renders a caught panic payload into something loggable.
///
/// Payloads are `Box<dyn Any>`; in practice they are almost always the
/// `&str` or `String` carried by `panic!`. Anything else is reported
/// opaquely rather than dropped.
pub(crate) fn describe_panic(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, panic_any};

    #[test]
    fn describe_panic_reports_str_payloads() {
        let payload = catch_unwind(|| panic!("plain message")).unwrap_err();
        assert_eq!(describe_panic(payload.as_ref()), "plain message");
    }

    #[test]
    fn describe_panic_reports_formatted_payloads() {
        let payload = catch_unwind(|| panic!("value was {}", 7)).unwrap_err();
        assert_eq!(describe_panic(payload.as_ref()), "value was 7");
    }

    #[test]
    fn describe_panic_tolerates_opaque_payloads() {
        let payload = catch_unwind(|| panic_any(42_u32)).unwrap_err();
        assert_eq!(describe_panic(payload.as_ref()), "<non-string panic payload>");
    }

    #[test]
    fn spawn_error_display_includes_thread_name() {
        let error = ThreadingError::Spawn {
            name: "lexora-worker-0".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "out of resources"),
        };
        let rendered = error.to_string();
        assert!(rendered.contains("lexora-worker-0"));
        assert!(rendered.contains("out of resources"));
    }
}
