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

//! `drasi-dispatch-abi`: FFI-safe types of the native dispatch object model.
//!
//! This crate provides the `#[repr(C)]` types and the vtable macro needed to
//! talk to native component-object event sources: interface identities,
//! status codes, the tagged native value and the argument block that event
//! sources hand to their subscribers.
//!
//! **No domain-specific dependencies**: this crate depends only on `std`.
//!
//! # Types
//!
//! - [`Guid`]: Interface identity, plus [`IID_IUNKNOWN`] / [`IID_IDISPATCH`]
//! - [`HResult`]: Native status code
//! - [`DispId`] / [`InvokeFlags`]: Call id and notification kind
//! - [`Variant`] / [`VarType`]: Native tagged value
//! - [`DispParams`]: Argument block delivered with a notification
//! - [`FfiStr`]: Borrowed string for name lookups
//!
//! # Macros
//!
//! - [`refcounted_vtable!`]: Generate reference-counted `#[repr(C)]` interface vtables

pub mod macros;
pub mod types;
pub mod variant;

pub use types::*;
pub use variant::*;
