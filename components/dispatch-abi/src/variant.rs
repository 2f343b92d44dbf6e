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

//! The native tagged value and the argument block delivered with a call.

use std::marker::PhantomData;

use crate::types::DispId;

/// Type tag of a [`Variant`], using the numeric codes of the native object model.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarType {
    Empty = 0,
    Null = 1,
    I2 = 2,
    I4 = 3,
    R4 = 4,
    R8 = 5,
    Currency = 6,
    Date = 7,
    Bstr = 8,
    Dispatch = 9,
    Error = 10,
    Bool = 11,
    Ui1 = 17,
    Ui2 = 18,
    Ui4 = 19,
    I8 = 20,
    Ui8 = 21,
}

/// A native value as carried in an argument slot or a return slot.
///
/// Variants cross the boundary by pointer only (inside [`DispParams`] or as
/// the return slot of a dispatch call), so the Rust layout is authoritative.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    #[default]
    Empty,
    Null,
    I2(i16),
    I4(i32),
    I8(i64),
    R4(f32),
    R8(f64),
    /// Fixed-point currency scaled by 10 000.
    Currency(i64),
    /// OLE automation date (days since 1899-12-30).
    Date(f64),
    Bstr(String),
    /// Opaque interface pointer value; the bridge never dereferences it.
    Dispatch(usize),
    /// Status code carried as a value.
    Error(i32),
    Bool(bool),
    Ui1(u8),
    Ui2(u16),
    Ui4(u32),
    Ui8(u64),
}

impl Variant {
    pub fn var_type(&self) -> VarType {
        match self {
            Variant::Empty => VarType::Empty,
            Variant::Null => VarType::Null,
            Variant::I2(_) => VarType::I2,
            Variant::I4(_) => VarType::I4,
            Variant::I8(_) => VarType::I8,
            Variant::R4(_) => VarType::R4,
            Variant::R8(_) => VarType::R8,
            Variant::Currency(_) => VarType::Currency,
            Variant::Date(_) => VarType::Date,
            Variant::Bstr(_) => VarType::Bstr,
            Variant::Dispatch(_) => VarType::Dispatch,
            Variant::Error(_) => VarType::Error,
            Variant::Bool(_) => VarType::Bool,
            Variant::Ui1(_) => VarType::Ui1,
            Variant::Ui2(_) => VarType::Ui2,
            Variant::Ui4(_) => VarType::Ui4,
            Variant::Ui8(_) => VarType::Ui8,
        }
    }

    /// Replace the value with `Empty`, returning the previous value.
    pub fn take(&mut self) -> Variant {
        std::mem::take(self)
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Variant::I4(value)
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Bool(value)
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Variant::R8(value)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::Bstr(value.to_string())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::Bstr(value)
    }
}

/// Argument block of a dispatch call.
///
/// Event sources store positional arguments in **reverse** declaration
/// order: `args[arg_count - 1]` is the first declared parameter.
#[repr(C)]
pub struct DispParams<'a> {
    pub args: *mut Variant,
    pub arg_count: u32,
    /// Ids of named arguments; event sources fire positional calls only.
    pub named_args: *const DispId,
    pub named_arg_count: u32,
    _slots: PhantomData<&'a mut [Variant]>,
}

impl<'a> DispParams<'a> {
    /// Borrow `args` (already in native, reversed order) as an argument block.
    pub fn new(args: &'a mut [Variant]) -> Self {
        Self {
            args: args.as_mut_ptr(),
            arg_count: args.len() as u32,
            named_args: std::ptr::null(),
            named_arg_count: 0,
            _slots: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.arg_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.arg_count == 0
    }

    /// Recover the argument slots.
    ///
    /// # Safety
    /// `args` must point to `arg_count` initialised variants that stay valid
    /// and unaliased for the returned lifetime.
    pub unsafe fn args_mut(&mut self) -> &mut [Variant] {
        if self.args.is_null() || self.arg_count == 0 {
            return &mut [];
        }
        std::slice::from_raw_parts_mut(self.args, self.arg_count as usize)
    }
}

/// Reverse a declaration-ordered argument list into native delivery order.
pub fn to_native_order(mut declared: Vec<Variant>) -> Vec<Variant> {
    declared.reverse();
    declared
}
