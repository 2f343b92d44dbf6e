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

//! The foreign-runtime seam.
//!
//! The bridge never talks to a concrete virtual machine. Everything it needs
//! from the runtime that hosts the sink object is expressed by
//! [`ForeignRuntime`], and the conversion of single values between the two
//! type systems is delegated to a [`ValueConverter`]. Both are supplied by
//! the owning collaborator at construction time.

use std::fmt;
use std::num::NonZeroU64;

use drasi_dispatch_abi::Variant;

/// Opaque reference to an object owned by the foreign runtime.
///
/// Whether a handle is a local (call-scoped) or a global (pinned) reference is
/// decided by the runtime call that produced it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle(NonZeroU64);

impl ObjectHandle {
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn raw(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHandle({:#x})", self.0)
    }
}

/// Resolved method of a foreign class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodHandle(pub u64);

/// Whether the calling native thread is known to the foreign runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachStatus {
    Attached,
    Detached,
}

/// Arguments used when registering a native thread with the foreign runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachArgs {
    /// Interface version requested from the runtime.
    pub version: u32,
    pub thread_name: Option<String>,
    pub thread_group: Option<String>,
}

/// A fault raised by the foreign runtime.
///
/// Runtime faults are always pending on the calling thread until described
/// and cleared (see [`crate::diagnostics`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignError {
    pub message: String,
}

impl ForeignError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ForeignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ForeignError {}

pub type ForeignResult<T> = std::result::Result<T, ForeignError>;

/// Services the bridge requires from the runtime that hosts the sink.
///
/// Apart from the attachment calls, every method may only be called on a
/// thread that is currently attached; [`crate::attach::AttachGuard`] is the
/// only way the bridge obtains such a thread.
pub trait ForeignRuntime: Send + Sync {
    // Thread attachment
    fn attach_status(&self) -> AttachStatus;
    fn attach_current_thread(&self, args: &AttachArgs) -> ForeignResult<()>;
    fn detach_current_thread(&self);

    // References
    /// Pin `object` so it survives beyond the current native call.
    fn new_global_ref(&self, object: ObjectHandle) -> ForeignResult<ObjectHandle>;
    fn delete_global_ref(&self, object: ObjectHandle);
    fn delete_local_ref(&self, object: ObjectHandle);

    // Calls
    /// Resolve an instance method on the class of `target`.
    fn lookup_method(
        &self,
        target: ObjectHandle,
        name: &str,
        signature: &str,
    ) -> ForeignResult<MethodHandle>;
    fn new_string(&self, value: &str) -> ForeignResult<ObjectHandle>;
    /// Create an array of value objects with every element absent.
    fn new_value_array(&self, len: usize) -> ForeignResult<ObjectHandle>;
    fn set_array_element(
        &self,
        array: ObjectHandle,
        index: usize,
        value: Option<ObjectHandle>,
    ) -> ForeignResult<()>;
    fn get_array_element(
        &self,
        array: ObjectHandle,
        index: usize,
    ) -> ForeignResult<Option<ObjectHandle>>;
    fn call_object_method(
        &self,
        target: ObjectHandle,
        method: MethodHandle,
        args: &[ObjectHandle],
    ) -> ForeignResult<Option<ObjectHandle>>;

    // Pending faults
    fn exception_check(&self) -> bool;
    /// Human-readable description of the pending fault, if any.
    fn exception_describe(&self) -> Option<String>;
    fn exception_clear(&self);
}

/// Pairwise converter between native values and foreign value objects.
pub trait ValueConverter: Send + Sync {
    /// Build a foreign value object holding `value`. `None` is the absent object.
    fn to_foreign(&self, value: &Variant) -> ForeignResult<Option<ObjectHandle>>;

    /// Write the value held by `value` into `slot`. An absent object yields `Empty`.
    fn to_native(&self, value: Option<ObjectHandle>, slot: &mut Variant) -> ForeignResult<()>;
}
