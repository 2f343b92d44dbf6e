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

//! Reporting of faults raised by the foreign runtime.
//!
//! A fault left pending on a thread poisons every later runtime call made on
//! it, and must never travel back into the native event source. Every fault is
//! therefore described into the log and cleared where it is first noticed.

use log::{log, Level};

use crate::foreign::{ForeignResult, ForeignRuntime};

/// Describe, log and clear the fault pending on the current thread.
///
/// Returns the description when a fault was pending.
pub fn clear_pending_fault(runtime: &dyn ForeignRuntime, context: &str) -> Option<String> {
    clear_pending_fault_at(runtime, context, Level::Warn)
}

pub fn clear_pending_fault_at(
    runtime: &dyn ForeignRuntime,
    context: &str,
    level: Level,
) -> Option<String> {
    if !runtime.exception_check() {
        return None;
    }
    let description = runtime
        .exception_describe()
        .unwrap_or_else(|| "<no description>".to_string());
    log!(level, "Foreign runtime fault while {context}: {description}");
    runtime.exception_clear();
    Some(description)
}

/// Swallow a failed runtime call: log it, clear the pending fault, return `None`.
pub fn swallow<T>(
    runtime: &dyn ForeignRuntime,
    context: &str,
    result: ForeignResult<T>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            if clear_pending_fault(runtime, context).is_none() {
                log::warn!("Foreign runtime call failed while {context}: {err}");
            }
            None
        }
    }
}
