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

//! Marshaling of one notification into a dispatcher call and back.
//!
//! The sink object exposes a single dispatcher method taking the event name
//! and an array of value objects. [`Forwarder::forward`] builds that call
//! from a [`CallFrame`], runs it, and copies the return value and every
//! (possibly mutated) argument back into the native slots.

use drasi_dispatch_abi::{DispId, Variant};

use crate::config::DispatcherConfig;
use crate::diagnostics::{clear_pending_fault, swallow};
use crate::error::Result;
use crate::foreign::{ForeignRuntime, ObjectHandle, ValueConverter};

/// State of one in-flight notification. Lives on the stack of the callback.
pub struct CallFrame<'a> {
    pub dispid: DispId,
    /// Resolved method name.
    pub method: &'a str,
    /// Native argument slots in delivery order (last declared parameter first).
    pub args: &'a mut [Variant],
    /// Native return slot, absent when the event source ignores results.
    pub result: Option<&'a mut Variant>,
}

impl<'a> CallFrame<'a> {
    pub fn new(
        dispid: DispId,
        method: &'a str,
        args: &'a mut [Variant],
        result: Option<&'a mut Variant>,
    ) -> Self {
        Self {
            dispid,
            method,
            args,
            result,
        }
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Native slot holding the declared parameter at `position`.
    pub fn native_index(&self, position: usize) -> usize {
        self.args.len() - 1 - position
    }
}

/// Local references created during a call, deleted when the scope ends.
struct LocalRefs<'rt> {
    runtime: &'rt dyn ForeignRuntime,
    refs: Vec<ObjectHandle>,
}

impl<'rt> LocalRefs<'rt> {
    fn new(runtime: &'rt dyn ForeignRuntime) -> Self {
        Self {
            runtime,
            refs: Vec::new(),
        }
    }

    fn keep(&mut self, handle: ObjectHandle) -> ObjectHandle {
        self.refs.push(handle);
        handle
    }
}

impl Drop for LocalRefs<'_> {
    fn drop(&mut self) {
        for handle in self.refs.drain(..) {
            self.runtime.delete_local_ref(handle);
        }
    }
}

/// Calls the sink's dispatcher on behalf of one notification.
///
/// Must only be used on an attached thread.
pub struct Forwarder<'a> {
    runtime: &'a dyn ForeignRuntime,
    converter: &'a dyn ValueConverter,
    sink: ObjectHandle,
    dispatcher: &'a DispatcherConfig,
}

impl<'a> Forwarder<'a> {
    pub fn new(
        runtime: &'a dyn ForeignRuntime,
        converter: &'a dyn ValueConverter,
        sink: ObjectHandle,
        dispatcher: &'a DispatcherConfig,
    ) -> Self {
        Self {
            runtime,
            converter,
            sink,
            dispatcher,
        }
    }

    /// Forward `frame` to the dispatcher.
    ///
    /// Fails only when the call could not be set up (dispatcher missing, name
    /// or array not constructible); every fault past that point, including one
    /// raised by the dispatcher itself, is logged and cleared, and the
    /// copy-back still runs. Copy-back skips positions that never made it
    /// into the array, so their native slots keep the value they arrived with.
    pub fn forward(&self, frame: &mut CallFrame<'_>) -> Result<()> {
        let runtime = self.runtime;
        let mut locals = LocalRefs::new(runtime);

        let method = self
            .runtime
            .lookup_method(
                self.sink,
                &self.dispatcher.method_name,
                &self.dispatcher.signature,
            )
            .inspect_err(|_| {
                clear_pending_fault(runtime, "resolving the dispatcher method");
            })?;

        let name = runtime
            .new_string(frame.method)
            .inspect_err(|_| {
                clear_pending_fault(runtime, "building the event name");
            })
            .map(|h| locals.keep(h))?;

        let count = frame.arg_count();
        let array = runtime
            .new_value_array(count)
            .inspect_err(|_| {
                clear_pending_fault(runtime, "allocating the argument array");
            })
            .map(|h| locals.keep(h))?;

        let mut marshaled = vec![false; count];
        for position in 0..count {
            let slot = &frame.args[frame.native_index(position)];
            let converted = self.converter.to_foreign(slot);
            let Some(value) = swallow(runtime, "converting an argument", converted) else {
                continue;
            };
            if let Some(value) = value {
                locals.keep(value);
            }
            let stored = swallow(
                runtime,
                "storing an argument",
                runtime.set_array_element(array, position, value),
            );
            marshaled[position] = stored.is_some();
        }

        let returned = swallow(
            runtime,
            "calling the dispatcher",
            runtime.call_object_method(self.sink, method, &[name, array]),
        )
        .flatten();
        // A dispatcher may report success and still leave a fault behind.
        clear_pending_fault(runtime, "calling the dispatcher");

        if let Some(returned) = returned {
            locals.keep(returned);
            if let Some(slot) = frame.result.as_deref_mut() {
                swallow(
                    runtime,
                    "converting the return value",
                    self.converter.to_native(Some(returned), slot),
                );
            }
        }

        for position in 0..count {
            if !marshaled[position] {
                continue;
            }
            let index = frame.native_index(position);
            let Some(element) = swallow(
                runtime,
                "reading back an argument",
                runtime.get_array_element(array, position),
            ) else {
                continue;
            };
            swallow(
                runtime,
                "copying back an argument",
                self.converter.to_native(element, &mut frame.args[index]),
            );
            if let Some(element) = element {
                runtime.delete_local_ref(element);
            }
        }
        Ok(())
    }
}
