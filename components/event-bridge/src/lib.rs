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

//! # Drasi Event Bridge
//!
//! Forwards notifications raised by a native event source to an object that
//! lives in a foreign managed runtime.
//!
//! The event source sees an ordinary late-bound sink: it negotiates
//! interfaces, counts references, and fires events by numeric id with a
//! reversed argument list. The bridge resolves each id through its
//! [`DispatchTable`], makes sure the calling thread is attached to the
//! foreign runtime, and calls the foreign sink's dispatcher with the event
//! name and the arguments in declaration order. Values the dispatcher
//! writes back, and its return value, are copied into the native slots.
//!
//! Foreign faults never reach the event source: they are logged and cleared,
//! and the notification still completes with success.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use drasi_event_bridge::{BridgeConfig, EventBridge};
//!
//! let bridge = EventBridge::builder(runtime, converter, connection_point)
//!     .with_sink(sink_object)
//!     .with_event_interface(event_iid)
//!     .with_methods([("Click", 1), ("Close", 2)])
//!     .with_config(BridgeConfig::from_yaml_str(yaml)?)
//!     .build()?;
//!
//! if let Some(status) = bridge.subscription_error() {
//!     log::warn!("no events will arrive: {status}");
//! }
//!
//! // Unsubscribes and releases the owner's reference.
//! drop(bridge);
//! ```
//!
//! ## Modules
//!
//! - [`foreign`]: the runtime and value-conversion seams
//! - [`sink`]: the native callback interface and counted handles to it
//! - [`bridge`]: the bridge itself and its owner handle
//! - [`marshal`]: building the dispatcher call and copying results back
//! - [`attach`]: scoped thread attachment
//! - [`config`]: YAML configuration

pub mod attach;
pub mod bridge;
pub mod config;
pub mod diagnostics;
pub mod dispatch_table;
pub mod error;
pub mod foreign;
pub mod identity;
pub mod marshal;
pub mod sink;
pub mod subscription;

#[doc(hidden)]
pub mod test_support;

pub use bridge::{EventBridge, EventBridgeBuilder};
pub use config::{AttachConfig, BridgeConfig, DispatcherConfig};
pub use dispatch_table::{DispatchEntry, DispatchTable};
pub use error::{BridgeError, Result};
pub use foreign::{
    AttachArgs, AttachStatus, ForeignError, ForeignResult, ForeignRuntime, MethodHandle,
    ObjectHandle, ValueConverter,
};
pub use sink::{DispatchVtable, SinkRef};
pub use subscription::ConnectionPoint;

pub use drasi_dispatch_abi as abi;
