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

//! Registration with the event source's connection point.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use drasi_dispatch_abi::{Cookie, HResult};

use crate::error::{BridgeError, Result};
use crate::sink::SinkRef;

/// The subscription mechanism of a native event source.
///
/// `advise` takes a counted reference to the sink and keeps it for as long as
/// the subscription lasts; `unadvise` gives it back.
pub trait ConnectionPoint: Send + Sync {
    fn advise(&self, sink: SinkRef) -> std::result::Result<Cookie, HResult>;
    fn unadvise(&self, cookie: Cookie) -> std::result::Result<(), HResult>;
}

/// Outcome of [`Subscription::disconnect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    Unsubscribed,
    AlreadyDisconnected,
    /// The connection point refused; the subscription is considered gone anyway.
    Failed(HResult),
}

/// Connected flag plus the cookie that is only meaningful while connected.
#[derive(Debug, Default)]
pub struct Subscription {
    connected: AtomicBool,
    cookie: AtomicU32,
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(
        &self,
        connection_point: &dyn ConnectionPoint,
        sink: SinkRef,
    ) -> Result<Cookie> {
        match connection_point.advise(sink) {
            Ok(cookie) => {
                self.cookie.store(cookie, Ordering::Relaxed);
                self.connected.store(true, Ordering::Release);
                Ok(cookie)
            }
            Err(hresult) => {
                self.connected.store(false, Ordering::Release);
                Err(BridgeError::SubscriptionFailure { hresult })
            }
        }
    }

    /// Unsubscribe if connected. Concurrent callers unsubscribe exactly once.
    pub fn disconnect(&self, connection_point: &dyn ConnectionPoint) -> Disconnect {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return Disconnect::AlreadyDisconnected;
        }
        let cookie = self.cookie.load(Ordering::Relaxed);
        match connection_point.unadvise(cookie) {
            Ok(()) => Disconnect::Unsubscribed,
            Err(hresult) => Disconnect::Failed(hresult),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::DispatchVtable;
    use crate::test_support::MockConnectionPoint;
    use drasi_dispatch_abi::{DispId, DispParams, FfiStr, Guid, InvokeFlags, Lcid, Variant};
    use std::ffi::c_void;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    // Minimal static sink whose reference count is observable.
    static REFS: AtomicU32 = AtomicU32::new(0);

    extern "C" fn qi(_: *mut c_void, _: *const Guid, _: *mut *const DispatchVtable) -> HResult {
        HResult::E_NOINTERFACE
    }
    extern "C" fn add_ref(_: *mut c_void) -> u32 {
        REFS.fetch_add(1, Ordering::SeqCst) + 1
    }
    extern "C" fn release(_: *mut c_void) -> u32 {
        REFS.fetch_sub(1, Ordering::SeqCst) - 1
    }
    extern "C" fn names(
        _: *const c_void,
        _: *const Guid,
        _: *const FfiStr,
        _: u32,
        _: Lcid,
        _: *mut DispId,
    ) -> HResult {
        HResult::E_UNEXPECTED
    }
    extern "C" fn invoke(
        _: *const c_void,
        _: DispId,
        _: *const Guid,
        _: Lcid,
        _: InvokeFlags,
        _: *mut DispParams<'static>,
        _: *mut Variant,
    ) -> HResult {
        HResult::S_OK
    }

    static VTABLE: DispatchVtable = DispatchVtable {
        state: std::ptr::null_mut(),
        query_interface_fn: qi,
        add_ref_fn: add_ref,
        release_fn: release,
        get_ids_of_names_fn: names,
        invoke_fn: invoke,
    };

    fn sink() -> SinkRef {
        unsafe { SinkRef::from_raw_borrowed(&VTABLE) }.unwrap()
    }

    #[test]
    fn test_connect_and_disconnect() {
        let cp = MockConnectionPoint::new();
        let subscription = Subscription::new();
        assert!(!subscription.is_connected());

        let cookie = subscription.connect(&cp, sink()).unwrap();
        assert!(subscription.is_connected());
        assert!(cookie >= 1);
        assert_eq!(cp.sink_count(), 1);

        assert_eq!(subscription.disconnect(&cp), Disconnect::Unsubscribed);
        assert_eq!(subscription.disconnect(&cp), Disconnect::AlreadyDisconnected);
        assert_eq!(cp.unadvise_count(), 1);
        assert_eq!(cp.sink_count(), 0);
    }

    #[test]
    fn test_connect_failure_reports_status() {
        let cp = MockConnectionPoint::new();
        cp.set_fail_advise(Some(HResult::CONNECT_E_ADVISELIMIT));
        let subscription = Subscription::new();

        let err = subscription.connect(&cp, sink()).unwrap_err();
        assert_eq!(err.to_hresult(), HResult::CONNECT_E_ADVISELIMIT);
        assert!(matches!(err, BridgeError::SubscriptionFailure { .. }));
        assert!(!subscription.is_connected());
        assert_eq!(subscription.disconnect(&cp), Disconnect::AlreadyDisconnected);
    }

    #[test]
    fn test_failed_unadvise_still_marks_disconnected() {
        let cp = MockConnectionPoint::new();
        let subscription = Subscription::new();
        subscription.connect(&cp, sink()).unwrap();

        cp.set_fail_unadvise(Some(HResult::E_FAIL));
        assert_eq!(
            subscription.disconnect(&cp),
            Disconnect::Failed(HResult::E_FAIL)
        );
        assert!(!subscription.is_connected());
        assert_eq!(subscription.disconnect(&cp), Disconnect::AlreadyDisconnected);
    }

    #[test]
    fn test_concurrent_disconnect_unsubscribes_once() {
        let cp = Arc::new(MockConnectionPoint::new());
        let subscription = Arc::new(Subscription::new());
        subscription.connect(cp.as_ref(), sink()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cp = cp.clone();
                let subscription = subscription.clone();
                std::thread::spawn(move || subscription.disconnect(cp.as_ref()))
            })
            .collect();
        let outcomes: Vec<Disconnect> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let unsubscribed = outcomes
            .iter()
            .filter(|o| **o == Disconnect::Unsubscribed)
            .count();
        assert_eq!(unsubscribed, 1);
        assert_eq!(cp.unadvise_count(), 1);
    }
}
