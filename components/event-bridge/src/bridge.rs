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

//! The event bridge: a native event sink that forwards to a foreign object.
//!
//! An [`EventBridge`] is created by the collaborator that discovered the event
//! source's outgoing interface. Construction pins the foreign sink object,
//! takes the owner's native reference and, as its last step, subscribes to
//! the connection point. From then on the event source calls the bridge
//! through its [`DispatchVtable`]; each call is resolved by id, forwarded to
//! the sink's dispatcher on an attached thread, and answered with a status
//! code only.
//!
//! # Lifetime
//!
//! The bridge lives on the heap behind its vtable and is destroyed when the
//! native reference count reaches zero. While subscribed, the event source
//! holds one of those references, so dropping the [`EventBridge`] owner
//! handle unsubscribes first and then releases the owner's reference.
//! Teardown unsubscribes (if still connected), releases the pinned sink
//! object through the foreign runtime, then frees the dispatch table.

use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use drasi_dispatch_abi::{DispId, DispParams, FfiStr, Guid, HResult, InvokeFlags, Lcid, Variant};
use log::{debug, error, trace, warn};

use crate::attach::AttachGuard;
use crate::config::BridgeConfig;
use crate::diagnostics::{clear_pending_fault, clear_pending_fault_at};
use crate::dispatch_table::DispatchTable;
use crate::error::{BridgeError, Result};
use crate::foreign::{ForeignRuntime, ObjectHandle, ValueConverter};
use crate::identity::{InterfaceKind, RefCount, Release, SupportedInterfaces};
use crate::marshal::{CallFrame, Forwarder};
use crate::sink::{DispatchVtable, SinkRef};
use crate::subscription::{ConnectionPoint, Disconnect, Subscription};

/// Heap state of one subscription. Reached only through its vtable.
struct BridgeInner {
    vtable: DispatchVtable,
    refs: RefCount,
    interfaces: SupportedInterfaces,
    table: DispatchTable,
    subscription: Subscription,
    subscription_error: OnceLock<HResult>,
    connection_point: Arc<dyn ConnectionPoint>,
    runtime: Arc<dyn ForeignRuntime>,
    converter: Arc<dyn ValueConverter>,
    /// Global reference to the foreign sink object.
    sink: ObjectHandle,
    config: BridgeConfig,
}

impl BridgeInner {
    /// # Safety
    /// `state` must be the state pointer of a live bridge vtable.
    unsafe fn from_state<'a>(state: *const c_void) -> &'a BridgeInner {
        &*(state as *const BridgeInner)
    }

    fn query_interface(&self, iid: &Guid) -> Result<InterfaceKind> {
        let kind = self.interfaces.negotiate(iid)?;
        let count = self.refs.add_ref();
        debug!("Handed out {kind:?} interface for {iid}, {count} reference(s)");
        Ok(kind)
    }

    fn invoke(
        &self,
        dispid: DispId,
        flags: InvokeFlags,
        args: &mut [Variant],
        result: Option<&mut Variant>,
    ) -> HResult {
        match self.forward(dispid, flags, args, result) {
            Ok(()) => HResult::S_OK,
            Err(err @ BridgeError::UnknownCallId { .. }) => {
                if self.config.trace_invocations {
                    trace!("Ignoring notification: {err}");
                }
                err.to_hresult()
            }
            Err(err @ BridgeError::UnsupportedCallKind { .. }) => {
                debug!("Rejecting notification {dispid}: {err}");
                err.to_hresult()
            }
            Err(err) => {
                // The event source must never see a foreign-side failure.
                warn!("Notification {dispid} was not delivered: {err}");
                HResult::S_OK
            }
        }
    }

    fn forward(
        &self,
        dispid: DispId,
        flags: InvokeFlags,
        args: &mut [Variant],
        result: Option<&mut Variant>,
    ) -> Result<()> {
        let method = self
            .table
            .resolve_name(dispid)
            .ok_or(BridgeError::UnknownCallId { dispid })?;
        if !flags.contains(InvokeFlags::METHOD) {
            return Err(BridgeError::UnsupportedCallKind { flags });
        }
        if self.config.trace_invocations {
            trace!(
                "Invoking '{method}' (dispid {dispid}) with {} argument(s) on {:?}",
                args.len(),
                std::thread::current().id()
            );
        }

        let guard = AttachGuard::acquire(self.runtime.as_ref(), &self.config.attach.to_args())?;
        let mut frame = CallFrame::new(dispid, method, args, result);
        Forwarder::new(
            guard.runtime(),
            self.converter.as_ref(),
            self.sink,
            &self.config.dispatcher,
        )
        .forward(&mut frame)
    }

    fn disconnect(&self) -> bool {
        match self.subscription.disconnect(self.connection_point.as_ref()) {
            Disconnect::Unsubscribed => {
                debug!(
                    "Unsubscribed from event interface {}",
                    self.interfaces.event_iid()
                );
                true
            }
            Disconnect::AlreadyDisconnected => false,
            Disconnect::Failed(hresult) => {
                // Best effort: the cookie is dropped either way.
                warn!(
                    "Unsubscribing from event interface {} failed with {hresult}",
                    self.interfaces.event_iid()
                );
                true
            }
        }
    }

    fn teardown(&self) {
        debug!(
            "Tearing down event bridge for {}",
            self.interfaces.event_iid()
        );
        self.disconnect();

        match AttachGuard::acquire(self.runtime.as_ref(), &self.config.attach.to_args()) {
            Ok(guard) => {
                guard.runtime().delete_global_ref(self.sink);
                clear_pending_fault(guard.runtime(), "releasing the sink object");
            }
            Err(err) => {
                error!("Leaking sink object {:?}: {err}", self.sink);
            }
        }
    }

    /// Run teardown and free the allocation.
    ///
    /// # Safety
    /// `state` must come from [`EventBridge::build`] and no reference may remain.
    unsafe fn destroy(state: *mut c_void) {
        let inner = Box::from_raw(state as *mut BridgeInner);
        if catch_unwind(AssertUnwindSafe(|| inner.teardown())).is_err() {
            error!("Panic during event bridge teardown");
        }
        drop(inner);
    }
}

// ============================================================================
// Vtable entry points
// ============================================================================

/// Run `f`, turning a panic into `E_UNEXPECTED` instead of unwinding into
/// the native caller.
fn catch_panic_hresult<F: FnOnce() -> HResult>(f: F) -> HResult {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(hr) => hr,
        Err(_) => {
            error!("Panic in event bridge callback");
            HResult::E_UNEXPECTED
        }
    }
}

extern "C" fn query_interface_fn(
    state: *mut c_void,
    iid: *const Guid,
    out: *mut *const DispatchVtable,
) -> HResult {
    catch_panic_hresult(|| {
        if iid.is_null() || out.is_null() {
            return HResult::E_POINTER;
        }
        let inner = unsafe { BridgeInner::from_state(state) };
        match inner.query_interface(unsafe { &*iid }) {
            Ok(_) => {
                unsafe { *out = &inner.vtable };
                HResult::S_OK
            }
            Err(err) => {
                unsafe { *out = std::ptr::null() };
                err.to_hresult()
            }
        }
    })
}

extern "C" fn add_ref_fn(state: *mut c_void) -> u32 {
    let inner = unsafe { BridgeInner::from_state(state) };
    inner.refs.add_ref()
}

extern "C" fn release_fn(state: *mut c_void) -> u32 {
    let inner = unsafe { BridgeInner::from_state(state) };
    match inner.refs.release() {
        Release::Remaining(count) => count,
        Release::Stabilized => 0,
        Release::LastReference => {
            unsafe { BridgeInner::destroy(state) };
            0
        }
    }
}

extern "C" fn get_ids_of_names_fn(
    _state: *const c_void,
    _iid: *const Guid,
    _names: *const FfiStr,
    _name_count: u32,
    _lcid: Lcid,
    _out: *mut DispId,
) -> HResult {
    // Event sources fire by id; name lookups are never expected.
    HResult::E_UNEXPECTED
}

extern "C" fn invoke_fn(
    state: *const c_void,
    dispid: DispId,
    _iid: *const Guid,
    _lcid: Lcid,
    flags: InvokeFlags,
    params: *mut DispParams<'static>,
    result: *mut Variant,
) -> HResult {
    catch_panic_hresult(|| {
        let inner = unsafe { BridgeInner::from_state(state) };
        let args: &mut [Variant] = match unsafe { params.as_mut() } {
            Some(params) => unsafe { params.args_mut() },
            None => &mut [],
        };
        let result = unsafe { result.as_mut() };
        inner.invoke(dispid, flags, args, result)
    })
}

// ============================================================================
// Owner handle
// ============================================================================

/// Builder for [`EventBridge`].
pub struct EventBridgeBuilder {
    runtime: Arc<dyn ForeignRuntime>,
    converter: Arc<dyn ValueConverter>,
    connection_point: Arc<dyn ConnectionPoint>,
    sink: Option<ObjectHandle>,
    event_iid: Option<Guid>,
    table: DispatchTable,
    config: BridgeConfig,
}

impl EventBridgeBuilder {
    /// The foreign object receiving notifications (a local reference; the
    /// bridge pins its own global reference).
    pub fn with_sink(mut self, sink: ObjectHandle) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The event interface identity the bridge answers to.
    pub fn with_event_interface(mut self, iid: Guid) -> Self {
        self.event_iid = Some(iid);
        self
    }

    pub fn with_dispatch_table(mut self, table: DispatchTable) -> Self {
        self.table = table;
        self
    }

    pub fn with_methods<I, S>(self, methods: I) -> Self
    where
        I: IntoIterator<Item = (S, DispId)>,
        S: Into<String>,
    {
        self.with_dispatch_table(DispatchTable::from_entries(methods))
    }

    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Create the bridge and subscribe it to the connection point.
    ///
    /// A failed subscription does not fail construction: the bridge is
    /// returned inert and [`EventBridge::subscription_error`] reports why.
    pub fn build(self) -> Result<EventBridge> {
        let sink = self
            .sink
            .ok_or_else(|| BridgeError::invalid_config("a sink object is required"))?;
        let event_iid = self
            .event_iid
            .ok_or_else(|| BridgeError::invalid_config("an event interface is required"))?;
        self.config.validate()?;

        let global = {
            let guard =
                AttachGuard::acquire(self.runtime.as_ref(), &self.config.attach.to_args())?;
            guard.runtime().new_global_ref(sink).inspect_err(|_| {
                clear_pending_fault(guard.runtime(), "pinning the sink object");
            })?
        };

        let inner = Box::new(BridgeInner {
            vtable: DispatchVtable {
                state: std::ptr::null_mut(),
                query_interface_fn,
                add_ref_fn,
                release_fn,
                get_ids_of_names_fn,
                invoke_fn,
            },
            refs: RefCount::new(),
            interfaces: SupportedInterfaces::new(event_iid),
            table: self.table,
            subscription: Subscription::new(),
            subscription_error: OnceLock::new(),
            connection_point: self.connection_point,
            runtime: self.runtime,
            converter: self.converter,
            sink: global,
            config: self.config,
        });
        let state = Box::into_raw(inner);
        // Safety: freshly allocated and not yet shared.
        let inner = unsafe {
            (*state).vtable.state = state as *mut c_void;
            &*state
        };

        // The owner's reference keeps the bridge alive while the event source
        // takes its own.
        inner.refs.add_ref();
        let owner = unsafe { SinkRef::from_raw(&inner.vtable) }
            .ok_or_else(|| anyhow::anyhow!("bridge vtable pointer is null"))?;

        debug!(
            "Created event bridge for {} with {} method(s)",
            event_iid,
            inner.table.len()
        );

        match inner
            .subscription
            .connect(inner.connection_point.as_ref(), owner.clone())
        {
            Ok(cookie) => debug!("Subscribed to {event_iid} with cookie {cookie}"),
            Err(err) => {
                let hresult = err.to_hresult();
                let _ = inner.subscription_error.set(hresult);
                error!("Event bridge for {event_iid} will receive no events: {err}");
                if let Ok(guard) =
                    AttachGuard::acquire(inner.runtime.as_ref(), &inner.config.attach.to_args())
                {
                    clear_pending_fault_at(guard.runtime(), "subscribing", log::Level::Error);
                }
            }
        }

        Ok(EventBridge { owner })
    }
}

/// Owner handle of a bridge instance.
///
/// Dropping it unsubscribes and releases the owner's native reference; the
/// bridge itself goes away once every other holder has released too.
pub struct EventBridge {
    owner: SinkRef,
}

impl EventBridge {
    pub fn builder(
        runtime: Arc<dyn ForeignRuntime>,
        converter: Arc<dyn ValueConverter>,
        connection_point: Arc<dyn ConnectionPoint>,
    ) -> EventBridgeBuilder {
        EventBridgeBuilder {
            runtime,
            converter,
            connection_point,
            sink: None,
            event_iid: None,
            table: DispatchTable::default(),
            config: BridgeConfig::default(),
        }
    }

    fn inner(&self) -> &BridgeInner {
        // Safety: the owner reference keeps the allocation alive.
        unsafe { BridgeInner::from_state(self.owner.vtable().state) }
    }

    /// The native interface pointer, as handed to event sources.
    pub fn sink(&self) -> &SinkRef {
        &self.owner
    }

    pub fn event_interface(&self) -> Guid {
        self.inner().interfaces.event_iid()
    }

    pub fn dispatch_table(&self) -> &DispatchTable {
        &self.inner().table
    }

    pub fn is_connected(&self) -> bool {
        self.inner().subscription.is_connected()
    }

    /// Status of the failed subscription attempt, if construction could not subscribe.
    pub fn subscription_error(&self) -> Option<HResult> {
        self.inner().subscription_error.get().copied()
    }

    /// Current native reference count (diagnostic only).
    pub fn ref_count(&self) -> u32 {
        self.inner().refs.get()
    }

    /// Stop receiving notifications. Idempotent; returns whether this call
    /// ended the subscription.
    pub fn disconnect(&self) -> bool {
        self.inner().disconnect()
    }

    /// Hand the owner's reference over to native code without unsubscribing.
    ///
    /// The bridge is then torn down (and unsubscribed) when the returned
    /// reference and every other native reference has been released.
    pub fn into_sink(self) -> SinkRef {
        let this = std::mem::ManuallyDrop::new(self);
        // Safety: `this` is never dropped, so the reference moves exactly once.
        unsafe { std::ptr::read(&this.owner) }
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        // The event source's share is only returned by unsubscribing.
        self.disconnect();
    }
}

impl std::fmt::Debug for EventBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBridge")
            .field("event_interface", &self.event_interface())
            .field("connected", &self.is_connected())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockConnectionPoint, MockConverter, MockRuntime};
    use drasi_dispatch_abi::{IID_IDISPATCH, IID_IUNKNOWN};

    const EVENT_IID: Guid = Guid::from_u128(0x0002_0400_0000_0000_c000_0000_0000_0046);

    struct Parts {
        runtime: Arc<MockRuntime>,
        connection_point: Arc<MockConnectionPoint>,
    }

    fn parts() -> Parts {
        crate::test_support::init_logging();
        Parts {
            runtime: Arc::new(MockRuntime::new()),
            connection_point: Arc::new(MockConnectionPoint::new()),
        }
    }

    fn builder(parts: &Parts) -> EventBridgeBuilder {
        EventBridge::builder(
            parts.runtime.clone(),
            Arc::new(MockConverter::new(parts.runtime.clone())),
            parts.connection_point.clone(),
        )
        .with_sink(parts.runtime.new_sink_object())
        .with_event_interface(EVENT_IID)
        .with_methods([("Click", 1), ("Close", 2)])
    }

    #[test]
    fn test_build_subscribes_and_pins_sink() {
        let parts = parts();
        let bridge = builder(&parts).build().unwrap();

        assert!(bridge.is_connected());
        assert_eq!(bridge.subscription_error(), None);
        assert_eq!(bridge.event_interface(), EVENT_IID);
        assert_eq!(bridge.dispatch_table().len(), 2);
        // Owner plus the connection point.
        assert_eq!(bridge.ref_count(), 2);
        assert_eq!(parts.runtime.live_global_refs(), 1);
        assert_eq!(parts.connection_point.sink_count(), 1);
    }

    #[test]
    fn test_build_requires_sink_and_interface() {
        let parts = parts();
        let no_sink = EventBridge::builder(
            parts.runtime.clone(),
            Arc::new(MockConverter::new(parts.runtime.clone())),
            parts.connection_point.clone(),
        )
        .with_event_interface(EVENT_IID)
        .build();
        assert!(matches!(no_sink, Err(BridgeError::InvalidConfig { .. })));

        let mut config = BridgeConfig::default();
        config.dispatcher.method_name = String::new();
        let bad_config = builder(&parts).with_config(config).build();
        assert!(matches!(bad_config, Err(BridgeError::InvalidConfig { .. })));

        assert_eq!(parts.connection_point.advise_count(), 0);
        assert_eq!(parts.runtime.live_global_refs(), 0);
    }

    #[test]
    fn test_query_interface_adds_reference_for_supported_identities() {
        let parts = parts();
        let bridge = builder(&parts).build().unwrap();
        let before = bridge.ref_count();

        for iid in [IID_IUNKNOWN, IID_IDISPATCH, EVENT_IID] {
            let other = bridge.sink().query_interface(&iid).unwrap();
            assert!(other.same_object(bridge.sink()));
            assert_eq!(bridge.ref_count(), before + 1);
        }
        assert_eq!(bridge.ref_count(), before);
    }

    #[test]
    fn test_query_interface_reports_matched_identity() {
        let parts = parts();
        let bridge = builder(&parts).build().unwrap();
        let before = bridge.ref_count();

        let inner = bridge.inner();
        assert_eq!(inner.query_interface(&IID_IUNKNOWN).unwrap(), InterfaceKind::Unknown);
        assert_eq!(inner.query_interface(&IID_IDISPATCH).unwrap(), InterfaceKind::Dispatch);
        assert_eq!(inner.query_interface(&EVENT_IID).unwrap(), InterfaceKind::Event);
        assert_eq!(bridge.ref_count(), before + 3);

        for _ in 0..3 {
            inner.refs.release();
        }
        assert_eq!(bridge.ref_count(), before);
    }

    #[test]
    fn test_add_ref_then_release_is_neutral() {
        let parts = parts();
        let bridge = builder(&parts).build().unwrap();
        let before = bridge.ref_count();

        let vt = bridge.sink().vtable();
        assert_eq!((vt.add_ref_fn)(vt.state), before + 1);
        assert_eq!((vt.release_fn)(vt.state), before);
        assert_eq!(bridge.ref_count(), before);
        assert_eq!(parts.runtime.global_refs_deleted(), 0);
    }

    #[test]
    fn test_query_interface_rejects_other_identities() {
        let parts = parts();
        let bridge = builder(&parts).build().unwrap();
        let before = bridge.ref_count();

        let unrelated = Guid::from_u128(0x1234_5678_9abc_def0_1234_5678_9abc_def0);
        assert_eq!(
            bridge.sink().query_interface(&unrelated).unwrap_err(),
            HResult::E_NOINTERFACE
        );
        assert_eq!(bridge.ref_count(), before);
    }

    #[test]
    fn test_query_interface_null_pointers() {
        let parts = parts();
        let bridge = builder(&parts).build().unwrap();
        let vt = bridge.sink().vtable();
        let hr = (vt.query_interface_fn)(vt.state, std::ptr::null(), std::ptr::null_mut());
        assert_eq!(hr, HResult::E_POINTER);
    }

    #[test]
    fn test_name_lookup_is_unexpected() {
        let parts = parts();
        let bridge = builder(&parts).build().unwrap();
        assert_eq!(
            bridge.sink().get_ids_of_names(&["Click"]).unwrap_err(),
            HResult::E_UNEXPECTED
        );
    }

    #[test]
    fn test_null_params_deliver_zero_arguments() {
        let parts = parts();
        let bridge = builder(&parts).build().unwrap();
        let vt = bridge.sink().vtable();
        let hr = (vt.invoke_fn)(
            vt.state,
            1,
            std::ptr::null(),
            0,
            InvokeFlags::METHOD,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        );
        assert_eq!(hr, HResult::S_OK);
        let calls = parts.runtime.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].args.is_empty());
    }

    #[test]
    fn test_panicking_dispatcher_is_contained() {
        let parts = parts();
        let bridge = builder(&parts).build().unwrap();
        parts.runtime.set_dispatcher(|_, _| panic!("dispatcher bug"));

        let fired = parts
            .connection_point
            .fire(1, InvokeFlags::METHOD, vec![]);
        assert_eq!(fired[0].hresult, HResult::E_UNEXPECTED);
        // The guard still detached the thread while unwinding.
        assert_eq!(parts.runtime.attach_count(), parts.runtime.detach_count());
        drop(bridge);
    }

    #[test]
    fn test_drop_unsubscribes_then_releases() {
        let parts = parts();
        let bridge = builder(&parts).build().unwrap();
        drop(bridge);

        assert_eq!(parts.connection_point.unadvise_count(), 1);
        assert_eq!(parts.connection_point.sink_count(), 0);
        assert_eq!(parts.runtime.live_global_refs(), 0);
        assert_eq!(parts.runtime.global_refs_deleted(), 1);
    }
}
