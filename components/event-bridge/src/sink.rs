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

//! The native callback interface and counted handles to it.
//!
//! [`DispatchVtable`] is the `#[repr(C)]` interface an event source calls
//! into. [`SinkRef`] wraps a pointer to such a vtable and owns one native
//! reference: cloning adds a reference, dropping releases it.

use std::ptr::NonNull;

use drasi_dispatch_abi::{
    refcounted_vtable, DispId, DispParams, FfiStr, Guid, HResult, InvokeFlags, Lcid, Variant,
    IID_NULL,
};

refcounted_vtable! {
    /// FFI-safe late-bound dispatch interface of an event sink.
    pub struct DispatchVtable {
        /// Map member names to call ids, writing one id per name into `out`.
        fn get_ids_of_names_fn(state: *const, iid: *const Guid, names: *const FfiStr, name_count: u32, lcid: Lcid, out: *mut DispId) -> HResult,

        /// Deliver a call. `params` holds arguments in reverse declaration
        /// order; `result` may be null when the caller wants no return value.
        fn invoke_fn(state: *const, dispid: DispId, iid: *const Guid, lcid: Lcid, flags: InvokeFlags, params: *mut DispParams<'static>, result: *mut Variant) -> HResult,
    }
}

/// Counted reference to a [`DispatchVtable`].
pub struct SinkRef {
    vtable: NonNull<DispatchVtable>,
}

// Safety: vtable functions are callable from any thread and the reference
// count they guard is atomic.
unsafe impl Send for SinkRef {}
unsafe impl Sync for SinkRef {}

impl SinkRef {
    /// Take ownership of one reference held by `ptr`.
    ///
    /// # Safety
    /// `ptr` must be null or point to a live vtable whose reference count
    /// includes the reference being adopted.
    pub unsafe fn from_raw(ptr: *const DispatchVtable) -> Option<Self> {
        NonNull::new(ptr as *mut DispatchVtable).map(|vtable| Self { vtable })
    }

    /// Add a reference to `ptr` and wrap it.
    ///
    /// # Safety
    /// `ptr` must be null or point to a live vtable.
    pub unsafe fn from_raw_borrowed(ptr: *const DispatchVtable) -> Option<Self> {
        let vtable = NonNull::new(ptr as *mut DispatchVtable)?;
        let vt = vtable.as_ref();
        (vt.add_ref_fn)(vt.state);
        Some(Self { vtable })
    }

    /// Give up ownership without releasing.
    pub fn into_raw(self) -> *const DispatchVtable {
        let ptr = self.vtable.as_ptr() as *const DispatchVtable;
        std::mem::forget(self);
        ptr
    }

    pub fn as_ptr(&self) -> *const DispatchVtable {
        self.vtable.as_ptr()
    }

    /// True when both handles reference the same interface pointer.
    pub fn same_object(&self, other: &SinkRef) -> bool {
        self.vtable == other.vtable
    }

    pub(crate) fn vtable(&self) -> &DispatchVtable {
        // Safety: the reference we own keeps the vtable alive.
        unsafe { self.vtable.as_ref() }
    }

    /// Ask for another interface of the same object.
    pub fn query_interface(&self, iid: &Guid) -> Result<SinkRef, HResult> {
        let vt = self.vtable();
        let mut out: *const DispatchVtable = std::ptr::null();
        let hr = (vt.query_interface_fn)(vt.state, iid, &mut out);
        hr.ok()?;
        // Safety: a successful negotiation hands out a new reference in `out`.
        unsafe { SinkRef::from_raw(out) }.ok_or(HResult::E_POINTER)
    }

    pub fn get_ids_of_names(&self, names: &[&str]) -> Result<Vec<DispId>, HResult> {
        let vt = self.vtable();
        let ffi_names: Vec<FfiStr> = names.iter().map(|n| FfiStr::from_str(n)).collect();
        let mut ids = vec![0 as DispId; names.len()];
        let hr = (vt.get_ids_of_names_fn)(
            vt.state,
            &IID_NULL,
            ffi_names.as_ptr(),
            ffi_names.len() as u32,
            0,
            ids.as_mut_ptr(),
        );
        hr.ok()?;
        Ok(ids)
    }

    /// Deliver a call with arguments already in native (reversed) order.
    pub fn invoke(
        &self,
        dispid: DispId,
        flags: InvokeFlags,
        args: &mut [Variant],
        result: Option<&mut Variant>,
    ) -> HResult {
        let vt = self.vtable();
        let mut params = DispParams::new(args);
        let params_ptr = (&mut params as *mut DispParams<'_>).cast::<DispParams<'static>>();
        let result_ptr = result.map_or(std::ptr::null_mut(), |slot| slot as *mut Variant);
        (vt.invoke_fn)(vt.state, dispid, &IID_NULL, 0, flags, params_ptr, result_ptr)
    }
}

impl Clone for SinkRef {
    fn clone(&self) -> Self {
        let vt = self.vtable();
        (vt.add_ref_fn)(vt.state);
        Self {
            vtable: self.vtable,
        }
    }
}

impl Drop for SinkRef {
    fn drop(&mut self) {
        // The last release frees the vtable; keep no borrow of it across the call.
        let (release_fn, state) = {
            let vt = self.vtable();
            (vt.release_fn, vt.state)
        };
        release_fn(state);
    }
}

impl std::fmt::Debug for SinkRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SinkRef").field(&self.vtable).finish()
    }
}
