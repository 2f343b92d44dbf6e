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

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use drasi_dispatch_abi::{to_native_order, Cookie, DispId, HResult, InvokeFlags, Variant};

use super::lock;
use crate::sink::{DispatchVtable, SinkRef};
use crate::subscription::ConnectionPoint;

enum Advised {
    Counted(SinkRef),
    /// Interface pointer held without a reference.
    Raw(usize),
}

/// Outcome of delivering one notification to one sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Fired {
    pub hresult: HResult,
    /// Arguments after the call, in declaration order.
    pub args: Vec<Variant>,
    pub result: Variant,
}

/// An event source's connection point.
///
/// By default every advised sink is kept alive by a counted reference, as a
/// real event source does. [`MockConnectionPoint::non_retaining`] keeps bare
/// pointers instead so tests can drive a bridge to zero references while it
/// is still subscribed.
pub struct MockConnectionPoint {
    retain: bool,
    next_cookie: AtomicU32,
    sinks: Mutex<BTreeMap<Cookie, Advised>>,
    fail_advise: Mutex<Option<HResult>>,
    fail_unadvise: Mutex<Option<HResult>>,
    advise_count: AtomicUsize,
    unadvise_count: AtomicUsize,
}

impl Default for MockConnectionPoint {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnectionPoint {
    pub fn new() -> Self {
        Self::with_retention(true)
    }

    pub fn non_retaining() -> Self {
        Self::with_retention(false)
    }

    fn with_retention(retain: bool) -> Self {
        Self {
            retain,
            next_cookie: AtomicU32::new(1),
            sinks: Mutex::new(BTreeMap::new()),
            fail_advise: Mutex::new(None),
            fail_unadvise: Mutex::new(None),
            advise_count: AtomicUsize::new(0),
            unadvise_count: AtomicUsize::new(0),
        }
    }

    pub fn set_fail_advise(&self, hresult: Option<HResult>) {
        *lock(&self.fail_advise) = hresult;
    }

    pub fn set_fail_unadvise(&self, hresult: Option<HResult>) {
        *lock(&self.fail_unadvise) = hresult;
    }

    pub fn advise_count(&self) -> usize {
        self.advise_count.load(Ordering::SeqCst)
    }

    /// Successful unadvise calls.
    pub fn unadvise_count(&self) -> usize {
        self.unadvise_count.load(Ordering::SeqCst)
    }

    pub fn sink_count(&self) -> usize {
        lock(&self.sinks).len()
    }

    /// Take a counted reference to every advised sink.
    fn snapshot(&self) -> Vec<SinkRef> {
        lock(&self.sinks)
            .values()
            .filter_map(|advised| match advised {
                Advised::Counted(sink) => Some(sink.clone()),
                // Safety: a non-retaining source trusts the sink to unadvise
                // before it goes away.
                Advised::Raw(ptr) => unsafe {
                    SinkRef::from_raw_borrowed(*ptr as *const DispatchVtable)
                },
            })
            .collect()
    }

    /// Fire an event at every advised sink with arguments in declaration order.
    pub fn fire(&self, dispid: DispId, flags: InvokeFlags, args: Vec<Variant>) -> Vec<Fired> {
        self.snapshot()
            .into_iter()
            .map(|sink| {
                let mut native = to_native_order(args.clone());
                let mut result = Variant::Empty;
                let hresult = sink.invoke(dispid, flags, &mut native, Some(&mut result));
                Fired {
                    hresult,
                    args: to_native_order(native),
                    result,
                }
            })
            .collect()
    }

    /// Fire an event with arguments already in native order.
    pub fn fire_native(
        &self,
        dispid: DispId,
        flags: InvokeFlags,
        args: &mut [Variant],
        mut result: Option<&mut Variant>,
    ) -> Vec<HResult> {
        self.snapshot()
            .into_iter()
            .map(|sink| sink.invoke(dispid, flags, args, result.as_deref_mut()))
            .collect()
    }
}

impl ConnectionPoint for MockConnectionPoint {
    fn advise(&self, sink: SinkRef) -> Result<Cookie, HResult> {
        if let Some(hresult) = *lock(&self.fail_advise) {
            return Err(hresult);
        }
        let advised = if self.retain {
            Advised::Counted(sink)
        } else {
            Advised::Raw(sink.as_ptr() as usize)
        };
        let cookie = self.next_cookie.fetch_add(1, Ordering::SeqCst);
        lock(&self.sinks).insert(cookie, advised);
        self.advise_count.fetch_add(1, Ordering::SeqCst);
        Ok(cookie)
    }

    fn unadvise(&self, cookie: Cookie) -> Result<(), HResult> {
        if let Some(hresult) = *lock(&self.fail_unadvise) {
            return Err(hresult);
        }
        // Release outside the lock; the last release may re-enter.
        let removed = lock(&self.sinks).remove(&cookie);
        match removed {
            Some(_) => {
                self.unadvise_count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(HResult::CONNECT_E_NOCONNECTION),
        }
    }
}
