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

//! Scoped attachment of native threads to the foreign runtime.
//!
//! Notifications arrive on whatever thread the event source picks. Some of
//! those threads have never been seen by the foreign runtime, others are
//! already registered with it (re-entrant calls coming from foreign code).
//! [`AttachGuard`] attaches only in the first case and detaches on drop only
//! what it attached itself, on every exit path.

use std::marker::PhantomData;

use log::debug;

use crate::error::{BridgeError, Result};
use crate::foreign::{AttachArgs, AttachStatus, ForeignRuntime};

/// Attachment of the current thread, relative to one guarded activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachState {
    Unattached,
    /// Another activation on this thread attached it before the guard was taken.
    AttachedByCaller,
    /// The guard performed the attachment and owns the matching detach.
    AttachedByThisCall,
}

/// RAII proof that the current thread is attached to the foreign runtime.
///
/// Not `Send`: the attachment belongs to the thread that acquired it.
pub struct AttachGuard<'rt> {
    runtime: &'rt dyn ForeignRuntime,
    state: AttachState,
    _thread_bound: PhantomData<*const ()>,
}

impl<'rt> AttachGuard<'rt> {
    pub fn acquire(runtime: &'rt dyn ForeignRuntime, args: &AttachArgs) -> Result<Self> {
        let state = match runtime.attach_status() {
            AttachStatus::Attached => AttachState::AttachedByCaller,
            AttachStatus::Detached => {
                runtime
                    .attach_current_thread(args)
                    .map_err(|e| BridgeError::attach_failed(e.message))?;
                debug!(
                    "Attached thread {:?} to the foreign runtime",
                    std::thread::current().id()
                );
                AttachState::AttachedByThisCall
            }
        };
        Ok(Self {
            runtime,
            state,
            _thread_bound: PhantomData,
        })
    }

    pub fn state(&self) -> AttachState {
        self.state
    }

    /// The runtime, usable for as long as the guard lives.
    pub fn runtime(&self) -> &'rt dyn ForeignRuntime {
        self.runtime
    }
}

impl Drop for AttachGuard<'_> {
    fn drop(&mut self) {
        if self.state == AttachState::AttachedByThisCall {
            self.runtime.detach_current_thread();
            self.state = AttachState::Unattached;
            debug!(
                "Detached thread {:?} from the foreign runtime",
                std::thread::current().id()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttachConfig;
    use crate::test_support::MockRuntime;

    fn args() -> AttachArgs {
        AttachConfig::default().to_args()
    }

    #[test]
    fn test_unseen_thread_is_attached_then_detached() {
        let runtime = MockRuntime::new();
        {
            let guard = AttachGuard::acquire(&runtime, &args()).unwrap();
            assert_eq!(guard.state(), AttachState::AttachedByThisCall);
            assert_eq!(runtime.attach_status(), AttachStatus::Attached);
        }
        assert_eq!(runtime.attach_status(), AttachStatus::Detached);
        assert_eq!(runtime.attach_count(), 1);
        assert_eq!(runtime.detach_count(), 1);
    }

    #[test]
    fn test_attached_thread_is_left_alone() {
        let runtime = MockRuntime::new();
        runtime.attach_current_thread(&args()).unwrap();
        {
            let guard = AttachGuard::acquire(&runtime, &args()).unwrap();
            assert_eq!(guard.state(), AttachState::AttachedByCaller);
        }
        assert_eq!(runtime.attach_status(), AttachStatus::Attached);
        assert_eq!(runtime.attach_count(), 1);
        assert_eq!(runtime.detach_count(), 0);
    }

    #[test]
    fn test_nested_guards_detach_once() {
        let runtime = MockRuntime::new();
        {
            let outer = AttachGuard::acquire(&runtime, &args()).unwrap();
            {
                let inner = AttachGuard::acquire(&runtime, &args()).unwrap();
                assert_eq!(inner.state(), AttachState::AttachedByCaller);
            }
            assert_eq!(runtime.attach_status(), AttachStatus::Attached);
            assert_eq!(outer.state(), AttachState::AttachedByThisCall);
        }
        assert_eq!(runtime.detach_count(), 1);
    }

    #[test]
    fn test_attach_failure() {
        let runtime = MockRuntime::new();
        runtime.set_fail_attach(true);
        let err = AttachGuard::acquire(&runtime, &args()).err().unwrap();
        assert!(matches!(err, BridgeError::AttachFailed { .. }));
        assert_eq!(runtime.detach_count(), 0);
    }

    #[test]
    fn test_attach_args_are_forwarded() {
        let runtime = MockRuntime::new();
        let config = AttachConfig {
            thread_name: Some("com-events".to_string()),
            ..AttachConfig::default()
        };
        let _guard = AttachGuard::acquire(&runtime, &config.to_args()).unwrap();
        let last = runtime.last_attach_args().unwrap();
        assert_eq!(last.thread_name.as_deref(), Some("com-events"));
        assert_eq!(last.version, config.version);
    }
}
