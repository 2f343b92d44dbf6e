// Copyright 2025 The Drasi Authors.
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

//! In-memory collaborators for exercising the bridge without a real runtime.
//!
//! Not part of the supported API.

mod connection_point;
mod runtime;

pub use connection_point::{Fired, MockConnectionPoint};
pub use runtime::{MockConverter, MockRuntime, RecordedCall, DISPATCHER_METHOD};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock ignoring poisoning; a failed assertion on another thread should not
/// hide the state it left behind.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
