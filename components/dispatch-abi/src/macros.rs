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

//! Declarative macro for generating reference-counted interface vtables.
//!
//! Every native interface starts with the same three slots: interface
//! negotiation, `add_ref` and `release`. [`refcounted_vtable!`] emits those
//! slots and appends the interface-specific methods, so each interface is
//! declared once as a method list.

/// Generate a `#[repr(C)]` vtable struct with `state`, the three lifetime
/// slots (`query_interface_fn`, `add_ref_fn`, `release_fn`) and a function
/// pointer for each declared method.
///
/// Methods receive the object state as their first argument, declared as
/// `state: *const` for calls that only read it or `state: *mut` for calls
/// that may mutate it. Further parameters and the return type are written as
/// in any `extern "C" fn`. The generated struct is `Send + Sync`.
///
/// # Example
///
/// ```rust
/// use drasi_dispatch_abi::*;
///
/// refcounted_vtable! {
///     /// A sink that is told when a document closes.
///     pub struct CloseSinkVtable {
///         fn document_name_fn(state: *const) -> FfiStr,
///         fn closed_fn(state: *mut, save_changes: bool) -> HResult,
///     }
/// }
/// ```
///
/// `CloseSinkVtable` then has the fields `state`, `query_interface_fn`,
/// `add_ref_fn`, `release_fn`, `document_name_fn` and `closed_fn`.
/// `query_interface_fn` writes the interface pointer it hands out into its
/// `out` parameter; `add_ref_fn` / `release_fn` return the new count.
#[macro_export]
macro_rules! refcounted_vtable {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$fn_meta:meta])*
                fn $method:ident ( state: *$mutability:ident $(, $param:ident : $param_ty:ty)* ) $(-> $ret:ty)?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(C)]
        pub struct $name {
            pub state: *mut ::std::ffi::c_void,
            pub query_interface_fn: extern "C" fn(
                state: *mut ::std::ffi::c_void,
                iid: *const $crate::Guid,
                out: *mut *const $name,
            ) -> $crate::HResult,
            pub add_ref_fn: extern "C" fn(state: *mut ::std::ffi::c_void) -> u32,
            pub release_fn: extern "C" fn(state: *mut ::std::ffi::c_void) -> u32,
            $(
                $(#[$fn_meta])*
                pub $method: extern "C" fn(
                    state: *$mutability ::std::ffi::c_void
                    $(, $param: $param_ty)*
                ) $(-> $ret)?,
            )*
        }

        unsafe impl Send for $name {}
        unsafe impl Sync for $name {}
    };
}

#[cfg(test)]
mod tests {
    use std::ffi::c_void;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::{Guid, HResult, IID_IUNKNOWN};

    refcounted_vtable! {
        /// Minimal interface used to exercise the generated layout.
        pub struct CounterVtable {
            fn value_fn(state: *const) -> u32,
        }
    }

    struct Counter {
        vtable: CounterVtable,
        refs: AtomicU32,
    }

    extern "C" fn query_interface_fn(
        state: *mut c_void,
        iid: *const Guid,
        out: *mut *const CounterVtable,
    ) -> HResult {
        let counter = unsafe { &*(state as *const Counter) };
        if unsafe { *iid } != IID_IUNKNOWN {
            return HResult::E_NOINTERFACE;
        }
        counter.refs.fetch_add(1, Ordering::Relaxed);
        unsafe { *out = &counter.vtable };
        HResult::S_OK
    }

    extern "C" fn add_ref_fn(state: *mut c_void) -> u32 {
        let counter = unsafe { &*(state as *const Counter) };
        counter.refs.fetch_add(1, Ordering::Relaxed) + 1
    }

    extern "C" fn release_fn(state: *mut c_void) -> u32 {
        let counter = unsafe { &*(state as *const Counter) };
        counter.refs.fetch_sub(1, Ordering::Relaxed) - 1
    }

    extern "C" fn value_fn(state: *const c_void) -> u32 {
        let counter = unsafe { &*(state as *const Counter) };
        counter.refs.load(Ordering::Relaxed)
    }

    #[test]
    fn test_generated_vtable_dispatches_through_state() {
        let mut counter = Box::new(Counter {
            vtable: CounterVtable {
                state: std::ptr::null_mut(),
                query_interface_fn,
                add_ref_fn,
                release_fn,
                value_fn,
            },
            refs: AtomicU32::new(1),
        });
        let state = &mut *counter as *mut Counter as *mut c_void;
        counter.vtable.state = state;
        let vt = &counter.vtable;

        assert_eq!((vt.add_ref_fn)(vt.state), 2);
        assert_eq!((vt.value_fn)(vt.state), 2);

        let mut out: *const CounterVtable = std::ptr::null();
        assert_eq!(
            (vt.query_interface_fn)(vt.state, &IID_IUNKNOWN, &mut out),
            HResult::S_OK
        );
        assert!(std::ptr::eq(out, vt));
        assert_eq!((vt.release_fn)(vt.state), 2);

        let other = Guid::from_u128(42);
        assert_eq!(
            (vt.query_interface_fn)(vt.state, &other, &mut out),
            HResult::E_NOINTERFACE
        );
        assert_eq!((vt.release_fn)(vt.state), 1);
    }
}
