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

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

use drasi_dispatch_abi::Variant;

use super::lock;
use crate::config::{DEFAULT_DISPATCHER_METHOD, DEFAULT_DISPATCHER_SIGNATURE};
use crate::foreign::{
    AttachArgs, AttachStatus, ForeignError, ForeignResult, ForeignRuntime, MethodHandle,
    ObjectHandle, ValueConverter,
};

/// Method handle returned for the dispatcher.
pub const DISPATCHER_METHOD: MethodHandle = MethodHandle(1);

type Dispatcher = dyn Fn(&str, &mut [Variant]) -> Result<Option<Variant>, String> + Send + Sync;

fn is_dispatcher(name: &str, signature: &str) -> bool {
    name == DEFAULT_DISPATCHER_METHOD && signature == DEFAULT_DISPATCHER_SIGNATURE
}

#[derive(Debug, Clone)]
enum MockObject {
    Sink,
    Str(String),
    Value(Variant),
    Array(Vec<Option<Variant>>),
}

/// One dispatcher invocation as seen by the sink object.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    /// Arguments in declaration order, as the dispatcher received them.
    pub args: Vec<Variant>,
    pub thread: ThreadId,
}

/// A [`ForeignRuntime`] over an in-memory object heap.
///
/// Thread attachment and pending faults are tracked per native thread, and
/// every object call made from a detached thread is counted as a violation.
pub struct MockRuntime {
    next_handle: AtomicU64,
    objects: Mutex<HashMap<u64, MockObject>>,
    locals: Mutex<HashSet<u64>>,
    globals: Mutex<HashSet<u64>>,
    attached: Mutex<HashSet<ThreadId>>,
    pending: Mutex<HashMap<ThreadId, String>>,
    dispatcher: Mutex<Option<Arc<Dispatcher>>>,
    calls: Mutex<Vec<RecordedCall>>,
    last_attach_args: Mutex<Option<AttachArgs>>,
    attach_count: AtomicUsize,
    detach_count: AtomicUsize,
    detached_use_count: AtomicUsize,
    global_refs_deleted: AtomicUsize,
    fail_attach: AtomicBool,
    fail_next_global_ref: AtomicBool,
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            objects: Mutex::new(HashMap::new()),
            locals: Mutex::new(HashSet::new()),
            globals: Mutex::new(HashSet::new()),
            attached: Mutex::new(HashSet::new()),
            pending: Mutex::new(HashMap::new()),
            dispatcher: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            last_attach_args: Mutex::new(None),
            attach_count: AtomicUsize::new(0),
            detach_count: AtomicUsize::new(0),
            detached_use_count: AtomicUsize::new(0),
            global_refs_deleted: AtomicUsize::new(0),
            fail_attach: AtomicBool::new(false),
            fail_next_global_ref: AtomicBool::new(false),
        }
    }

    fn alloc(&self, object: MockObject) -> ObjectHandle {
        let raw = self.next_handle.fetch_add(1, Ordering::Relaxed);
        lock(&self.objects).insert(raw, object);
        ObjectHandle::new(raw).unwrap_or_else(|| unreachable!("handles start at 1"))
    }

    fn alloc_local(&self, object: MockObject) -> ObjectHandle {
        let handle = self.alloc(object);
        lock(&self.locals).insert(handle.raw());
        handle
    }

    fn object(&self, handle: ObjectHandle) -> Option<MockObject> {
        lock(&self.objects).get(&handle.raw()).cloned()
    }

    fn check_attached(&self) {
        if self.attach_status() == AttachStatus::Detached {
            self.detached_use_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fail<T>(&self, message: impl Into<String>) -> ForeignResult<T> {
        let message = message.into();
        self.raise(message.clone());
        Err(ForeignError::new(message))
    }

    /// Create a sink object owned by the test (neither local nor global).
    pub fn new_sink_object(&self) -> ObjectHandle {
        self.alloc(MockObject::Sink)
    }

    /// Create a local value object.
    pub fn new_value(&self, value: Variant) -> ObjectHandle {
        self.alloc_local(MockObject::Value(value))
    }

    pub fn value_of(&self, handle: ObjectHandle) -> Option<Variant> {
        match self.object(handle)? {
            MockObject::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Leave a fault pending on the calling thread.
    pub fn raise(&self, message: impl Into<String>) {
        lock(&self.pending).insert(std::thread::current().id(), message.into());
    }

    /// Install the sink's dispatcher. It receives the event name and the
    /// arguments in declaration order; writes to `args` are visible to the
    /// caller. `Err` raises a fault with the given message.
    pub fn set_dispatcher<F>(&self, dispatcher: F)
    where
        F: Fn(&str, &mut [Variant]) -> Result<Option<Variant>, String> + Send + Sync + 'static,
    {
        *lock(&self.dispatcher) = Some(Arc::new(dispatcher));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn set_fail_attach(&self, fail: bool) {
        self.fail_attach.store(fail, Ordering::SeqCst);
    }

    pub fn fail_next_global_ref(&self) {
        self.fail_next_global_ref.store(true, Ordering::SeqCst);
    }

    pub fn last_attach_args(&self) -> Option<AttachArgs> {
        lock(&self.last_attach_args).clone()
    }

    pub fn attach_count(&self) -> usize {
        self.attach_count.load(Ordering::SeqCst)
    }

    pub fn detach_count(&self) -> usize {
        self.detach_count.load(Ordering::SeqCst)
    }

    /// Number of runtime calls made from a thread that was not attached.
    pub fn detached_use_count(&self) -> usize {
        self.detached_use_count.load(Ordering::SeqCst)
    }

    pub fn global_refs_deleted(&self) -> usize {
        self.global_refs_deleted.load(Ordering::SeqCst)
    }

    pub fn live_global_refs(&self) -> usize {
        lock(&self.globals).len()
    }

    pub fn live_local_refs(&self) -> usize {
        lock(&self.locals).len()
    }
}

impl ForeignRuntime for MockRuntime {
    fn attach_status(&self) -> AttachStatus {
        if lock(&self.attached).contains(&std::thread::current().id()) {
            AttachStatus::Attached
        } else {
            AttachStatus::Detached
        }
    }

    fn attach_current_thread(&self, args: &AttachArgs) -> ForeignResult<()> {
        *lock(&self.last_attach_args) = Some(args.clone());
        if self.fail_attach.load(Ordering::SeqCst) {
            return Err(ForeignError::new("attach refused"));
        }
        lock(&self.attached).insert(std::thread::current().id());
        self.attach_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn detach_current_thread(&self) {
        if lock(&self.attached).remove(&std::thread::current().id()) {
            self.detach_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn new_global_ref(&self, object: ObjectHandle) -> ForeignResult<ObjectHandle> {
        self.check_attached();
        if self.fail_next_global_ref.swap(false, Ordering::SeqCst) {
            return self.fail("OutOfMemoryError: global reference table full");
        }
        let Some(target) = self.object(object) else {
            return self.fail("NullPointerException: stale object handle");
        };
        let global = self.alloc(target);
        lock(&self.globals).insert(global.raw());
        Ok(global)
    }

    fn delete_global_ref(&self, object: ObjectHandle) {
        self.check_attached();
        if lock(&self.globals).remove(&object.raw()) {
            lock(&self.objects).remove(&object.raw());
            self.global_refs_deleted.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn delete_local_ref(&self, object: ObjectHandle) {
        self.check_attached();
        if lock(&self.locals).remove(&object.raw()) {
            lock(&self.objects).remove(&object.raw());
        }
    }

    fn lookup_method(
        &self,
        target: ObjectHandle,
        name: &str,
        signature: &str,
    ) -> ForeignResult<MethodHandle> {
        self.check_attached();
        match self.object(target) {
            Some(MockObject::Sink) if is_dispatcher(name, signature) => Ok(DISPATCHER_METHOD),
            Some(_) => self.fail(format!("NoSuchMethodError: {name}{signature}")),
            None => self.fail("NullPointerException: stale object handle"),
        }
    }

    fn new_string(&self, value: &str) -> ForeignResult<ObjectHandle> {
        self.check_attached();
        Ok(self.alloc_local(MockObject::Str(value.to_string())))
    }

    fn new_value_array(&self, len: usize) -> ForeignResult<ObjectHandle> {
        self.check_attached();
        Ok(self.alloc_local(MockObject::Array(vec![None; len])))
    }

    fn set_array_element(
        &self,
        array: ObjectHandle,
        index: usize,
        value: Option<ObjectHandle>,
    ) -> ForeignResult<()> {
        self.check_attached();
        let value = match value {
            Some(handle) => match self.value_of(handle) {
                Some(value) => Some(value),
                None => return self.fail("ArrayStoreException: not a value object"),
            },
            None => None,
        };
        let stored = match lock(&self.objects).get_mut(&array.raw()) {
            Some(MockObject::Array(elements)) if index < elements.len() => {
                elements[index] = value;
                true
            }
            _ => false,
        };
        if stored {
            Ok(())
        } else {
            self.fail("ArrayIndexOutOfBoundsException")
        }
    }

    fn get_array_element(
        &self,
        array: ObjectHandle,
        index: usize,
    ) -> ForeignResult<Option<ObjectHandle>> {
        self.check_attached();
        let element = match self.object(array) {
            Some(MockObject::Array(elements)) if index < elements.len() => elements[index].clone(),
            _ => return self.fail("ArrayIndexOutOfBoundsException"),
        };
        Ok(element.map(|value| self.new_value(value)))
    }

    fn call_object_method(
        &self,
        target: ObjectHandle,
        method: MethodHandle,
        args: &[ObjectHandle],
    ) -> ForeignResult<Option<ObjectHandle>> {
        self.check_attached();
        if method != DISPATCHER_METHOD || !matches!(self.object(target), Some(MockObject::Sink)) {
            return self.fail("IllegalArgumentException: not a dispatcher call");
        }
        let (name, array) = match args {
            [name, array] => (*name, *array),
            _ => return self.fail("IllegalArgumentException: wrong argument count"),
        };
        let (Some(MockObject::Str(method_name)), Some(MockObject::Array(elements))) =
            (self.object(name), self.object(array))
        else {
            return self.fail("IllegalArgumentException: wrong argument types");
        };

        let mut values: Vec<Variant> = elements
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect();
        let dispatcher = lock(&self.dispatcher).clone();
        let outcome = match dispatcher {
            Some(dispatcher) => dispatcher(&method_name, &mut values),
            None => Ok(None),
        };

        lock(&self.calls).push(RecordedCall {
            method: method_name,
            args: values.clone(),
            thread: std::thread::current().id(),
        });
        // The array is shared with the dispatcher; its writes stay visible.
        if let Some(MockObject::Array(elements)) = lock(&self.objects).get_mut(&array.raw()) {
            for (element, value) in elements.iter_mut().zip(values) {
                *element = Some(value);
            }
        }

        match outcome {
            Ok(returned) => Ok(returned.map(|value| self.new_value(value))),
            Err(message) => self.fail(message),
        }
    }

    fn exception_check(&self) -> bool {
        self.check_attached();
        lock(&self.pending).contains_key(&std::thread::current().id())
    }

    fn exception_describe(&self) -> Option<String> {
        self.check_attached();
        lock(&self.pending).get(&std::thread::current().id()).cloned()
    }

    fn exception_clear(&self) {
        self.check_attached();
        lock(&self.pending).remove(&std::thread::current().id());
    }
}

/// [`ValueConverter`] that wraps variants in [`MockRuntime`] value objects.
///
/// `Empty` maps to the absent object and back.
pub struct MockConverter {
    runtime: Arc<MockRuntime>,
}

impl MockConverter {
    pub fn new(runtime: Arc<MockRuntime>) -> Self {
        Self { runtime }
    }
}

impl ValueConverter for MockConverter {
    fn to_foreign(&self, value: &Variant) -> ForeignResult<Option<ObjectHandle>> {
        if matches!(value, Variant::Empty) {
            return Ok(None);
        }
        Ok(Some(self.runtime.new_value(value.clone())))
    }

    fn to_native(&self, value: Option<ObjectHandle>, slot: &mut Variant) -> ForeignResult<()> {
        *slot = match value {
            Some(handle) => match self.runtime.value_of(handle) {
                Some(value) => value,
                None => return self.runtime.fail("ClassCastException: not a value object"),
            },
            None => Variant::Empty,
        };
        Ok(())
    }
}
