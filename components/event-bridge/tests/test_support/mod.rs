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

use std::sync::Arc;

use drasi_event_bridge::abi::{DispId, Guid};
use drasi_event_bridge::test_support::{MockConnectionPoint, MockConverter, MockRuntime};
use drasi_event_bridge::{EventBridge, EventBridgeBuilder, ObjectHandle};

/// Event interface used by every fixture.
pub const EVENT_IID: Guid = Guid::from_u128(0x0002_0400_0000_0000_c000_0000_0000_0046);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A foreign runtime, a sink object living in it, and an event source.
pub struct Fixture {
    pub runtime: Arc<MockRuntime>,
    pub connection_point: Arc<MockConnectionPoint>,
    pub sink: ObjectHandle,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_connection_point(MockConnectionPoint::new())
    }

    pub fn with_connection_point(connection_point: MockConnectionPoint) -> Self {
        init_logging();
        let runtime = Arc::new(MockRuntime::new());
        let sink = runtime.new_sink_object();
        Self {
            runtime,
            connection_point: Arc::new(connection_point),
            sink,
        }
    }

    pub fn builder(&self) -> EventBridgeBuilder {
        EventBridge::builder(
            self.runtime.clone(),
            Arc::new(MockConverter::new(self.runtime.clone())),
            self.connection_point.clone(),
        )
        .with_sink(self.sink)
        .with_event_interface(EVENT_IID)
    }

    pub fn bridge(&self, methods: &[(&str, DispId)]) -> EventBridge {
        self.builder()
            .with_methods(methods.iter().copied())
            .build()
            .expect("bridge construction failed")
    }
}
