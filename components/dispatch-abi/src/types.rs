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

//! Identity, status and string primitives for the native dispatch boundary.

use std::fmt;

// ============================================================================
// Interface identity
// ============================================================================

/// 128-bit interface identity, laid out the way the native object model
/// expects it (`Data1`, `Data2`, `Data3`, `Data4[8]`).
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    /// Build a GUID from its canonical 128-bit big-endian representation,
    /// e.g. `0x00020400_0000_0000_C000_000000000046`.
    pub const fn from_u128(value: u128) -> Self {
        Self {
            data1: (value >> 96) as u32,
            data2: (value >> 80) as u16,
            data3: (value >> 64) as u16,
            data4: (value as u64).to_be_bytes(),
        }
    }

    pub const fn zeroed() -> Self {
        Self::from_u128(0)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Base identity every native object answers to.
pub const IID_IUNKNOWN: Guid = Guid::from_u128(0x00000000_0000_0000_C000_000000000046);

/// Late-bound dispatch identity; event sinks are always reachable through it.
pub const IID_IDISPATCH: Guid = Guid::from_u128(0x00020400_0000_0000_C000_000000000046);

/// "No specific interface", passed as the `riid` of dispatch calls.
pub const IID_NULL: Guid = Guid::zeroed();

// ============================================================================
// Status codes
// ============================================================================

/// Native status code. Negative values are failures.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HResult(pub i32);

impl HResult {
    pub const S_OK: HResult = HResult(0);
    pub const E_NOINTERFACE: HResult = HResult(0x8000_4002_u32 as i32);
    pub const E_POINTER: HResult = HResult(0x8000_4003_u32 as i32);
    pub const E_FAIL: HResult = HResult(0x8000_4005_u32 as i32);
    pub const E_UNEXPECTED: HResult = HResult(0x8000_FFFF_u32 as i32);
    pub const CONNECT_E_NOCONNECTION: HResult = HResult(0x8004_0200_u32 as i32);
    pub const CONNECT_E_ADVISELIMIT: HResult = HResult(0x8004_0201_u32 as i32);

    pub const fn is_success(self) -> bool {
        self.0 >= 0
    }

    pub const fn is_failure(self) -> bool {
        self.0 < 0
    }

    /// Convert to a `Result`, keeping the failing code as the error.
    pub fn ok(self) -> Result<(), HResult> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0 as u32)
    }
}

impl fmt::Debug for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HResult({self})")
    }
}

// ============================================================================
// Dispatch call identifiers and kinds
// ============================================================================

/// Numeric identifier an event source uses to name the notification it fires.
pub type DispId = i32;

/// Locale identifier passed through dispatch calls; the bridge ignores it.
pub type Lcid = u32;

/// Subscription cookie handed out by a connection point.
pub type Cookie = u32;

/// Kind of dispatch call, as a bit set.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InvokeFlags(pub u16);

impl InvokeFlags {
    pub const METHOD: InvokeFlags = InvokeFlags(0x1);
    pub const PROPERTY_GET: InvokeFlags = InvokeFlags(0x2);
    pub const PROPERTY_PUT: InvokeFlags = InvokeFlags(0x4);
    pub const PROPERTY_PUT_REF: InvokeFlags = InvokeFlags(0x8);

    pub const fn bits(self) -> u16 {
        self.0
    }

    /// True when every bit of `other` is set in `self`.
    pub const fn contains(self, other: InvokeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for InvokeFlags {
    type Output = InvokeFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        InvokeFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for InvokeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        for (flag, name) in [
            (Self::METHOD, "METHOD"),
            (Self::PROPERTY_GET, "PROPERTY_GET"),
            (Self::PROPERTY_PUT, "PROPERTY_PUT"),
            (Self::PROPERTY_PUT_REF, "PROPERTY_PUT_REF"),
        ] {
            if self.contains(flag) {
                names.push(name);
            }
        }
        write!(f, "InvokeFlags({:#x}: {})", self.0, names.join(" | "))
    }
}

// ============================================================================
// Borrowed strings
// ============================================================================

/// A borrowed UTF-8 string crossing the FFI boundary.
/// Only valid for the duration of the call it is passed to.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FfiStr {
    pub ptr: *const u8,
    pub len: usize,
}

impl FfiStr {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        Self {
            ptr: s.as_ptr(),
            len: s.len(),
        }
    }

    pub const fn empty() -> Self {
        Self {
            ptr: std::ptr::null(),
            len: 0,
        }
    }

    /// # Safety
    /// `ptr` must reference `len` valid bytes for the lifetime of this call.
    pub unsafe fn to_string(&self) -> String {
        if self.ptr.is_null() || self.len == 0 {
            return String::new();
        }
        let bytes = std::slice::from_raw_parts(self.ptr, self.len);
        String::from_utf8_lossy(bytes).into_owned()
    }
}
