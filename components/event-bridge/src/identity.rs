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

//! Lifetime and identity of a bridge instance.
//!
//! [`SupportedInterfaces`] is the closed set of identities the bridge answers
//! to during interface negotiation. [`RefCount`] is the native reference
//! count; it is the only state of a bridge that many threads mutate.

use std::sync::atomic::{fence, AtomicU32, Ordering};

use drasi_dispatch_abi::{Guid, IID_IDISPATCH, IID_IUNKNOWN};

use crate::error::{BridgeError, Result};

/// Which of the supported identities a negotiation matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceKind {
    Unknown,
    Dispatch,
    /// The event interface the bridge was constructed for.
    Event,
}

/// The identities a bridge answers to: the two base introspection
/// identities plus exactly one event interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedInterfaces {
    event_iid: Guid,
}

impl SupportedInterfaces {
    pub fn new(event_iid: Guid) -> Self {
        Self { event_iid }
    }

    pub fn event_iid(&self) -> Guid {
        self.event_iid
    }

    pub fn negotiate(&self, iid: &Guid) -> Result<InterfaceKind> {
        if *iid == IID_IUNKNOWN {
            Ok(InterfaceKind::Unknown)
        } else if *iid == IID_IDISPATCH {
            Ok(InterfaceKind::Dispatch)
        } else if *iid == self.event_iid {
            Ok(InterfaceKind::Event)
        } else {
            Err(BridgeError::NoSuchInterface { iid: *iid })
        }
    }
}

/// Outcome of [`RefCount::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Other holders remain.
    Remaining(u32),
    /// The caller dropped the last reference and must tear the object down.
    LastReference,
    /// Teardown is already running; the call had no effect.
    Stabilized,
}

/// Count parked on an object whose teardown has started. Far above any real
/// count, so stray add_ref/release pairs from callbacks made during teardown
/// never bring it back to zero.
const STABILIZED: u32 = u32::MAX / 2;

/// Atomic native reference count.
#[derive(Debug)]
pub struct RefCount {
    count: AtomicU32,
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

impl RefCount {
    /// A new count starts at zero; the creator takes its reference explicitly.
    pub fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
        }
    }

    /// Returns the new count.
    pub fn add_ref(&self) -> u32 {
        self.count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn release(&self) -> Release {
        let previous = self.count.fetch_sub(1, Ordering::Release);
        if previous > STABILIZED / 2 {
            // Teardown owns the object; undo and ignore.
            self.count.fetch_add(1, Ordering::Relaxed);
            return Release::Stabilized;
        }
        debug_assert!(previous != 0, "reference count released below zero");
        if previous == 1 {
            // Observe every write made by the other holders before teardown.
            fence(Ordering::Acquire);
            self.count.store(STABILIZED, Ordering::Relaxed);
            return Release::LastReference;
        }
        Release::Remaining(previous - 1)
    }

    /// Current count as seen by native callers; zero once teardown has started.
    pub fn get(&self) -> u32 {
        let count = self.count.load(Ordering::Acquire);
        if count > STABILIZED / 2 {
            0
        } else {
            count
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const EVENT_IID: Guid = Guid::from_u128(0x4B0B_2D2E_0000_1111_2222_3333_4444_5555);

    #[test]
    fn test_negotiate_accepts_base_and_event_identities() {
        let supported = SupportedInterfaces::new(EVENT_IID);
        assert_eq!(
            supported.negotiate(&IID_IUNKNOWN).unwrap(),
            InterfaceKind::Unknown
        );
        assert_eq!(
            supported.negotiate(&IID_IDISPATCH).unwrap(),
            InterfaceKind::Dispatch
        );
        assert_eq!(supported.negotiate(&EVENT_IID).unwrap(), InterfaceKind::Event);
    }

    #[test]
    fn test_negotiate_rejects_everything_else() {
        let supported = SupportedInterfaces::new(EVENT_IID);
        let other = Guid::from_u128(0xDEAD_BEEF);
        match supported.negotiate(&other) {
            Err(BridgeError::NoSuchInterface { iid }) => assert_eq!(iid, other),
            other => panic!("Expected NoSuchInterface, got {other:?}"),
        }
    }

    #[test]
    fn test_add_ref_then_release_leaves_count_unchanged() {
        let refs = RefCount::new();
        assert_eq!(refs.add_ref(), 1);
        assert_eq!(refs.add_ref(), 2);
        assert_eq!(refs.release(), Release::Remaining(1));
        assert_eq!(refs.get(), 1);
    }

    #[test]
    fn test_last_release_happens_once() {
        let refs = RefCount::new();
        refs.add_ref();
        assert_eq!(refs.release(), Release::LastReference);
        assert_eq!(refs.get(), 0);

        // A callback made during teardown must not resurrect or re-trigger it.
        refs.add_ref();
        assert_eq!(refs.release(), Release::Stabilized);
        assert_eq!(refs.release(), Release::Stabilized);
        assert_eq!(refs.get(), 0);
    }

    #[test]
    fn test_concurrent_add_ref_release() {
        let refs = Arc::new(RefCount::new());
        refs.add_ref();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let refs = refs.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        refs.add_ref();
                        assert!(matches!(refs.release(), Release::Remaining(_)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(refs.get(), 1);
        assert_eq!(refs.release(), Release::LastReference);
    }
}
