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

//! Error types for the event bridge.
//!
//! Structured errors use `thiserror`. Each variant knows the native status code
//! it is reported as ([`BridgeError::to_hresult`]) because the native event
//! source only ever sees status codes, never errors.

use drasi_dispatch_abi::{DispId, Guid, HResult, InvokeFlags};
use thiserror::Error;

use crate::foreign::ForeignError;

/// Main error type for event bridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Registering with the event source's connection point failed.
    #[error("Subscription to the event source failed: {hresult}")]
    SubscriptionFailure {
        /// Status returned by the connection point
        hresult: HResult,
    },

    /// Interface negotiation for an identity the bridge does not implement.
    #[error("Interface {iid} is not supported")]
    NoSuchInterface { iid: Guid },

    /// A notification kind other than a method call.
    #[error("Unsupported call kind {flags:?}")]
    UnsupportedCallKind { flags: InvokeFlags },

    /// The call id is not in the dispatch table. Not a failure for event sources.
    #[error("Unknown call id {dispid}")]
    UnknownCallId { dispid: DispId },

    /// The foreign runtime raised a fault.
    #[error("Foreign runtime fault: {0}")]
    Foreign(#[from] ForeignError),

    /// The calling thread could not be attached to the foreign runtime.
    #[error("Failed to attach thread to the foreign runtime: {reason}")]
    AttachFailed { reason: String },

    /// Invalid configuration or construction input.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Internal error - wraps underlying errors while preserving the error chain.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BridgeError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        BridgeError::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn attach_failed(reason: impl Into<String>) -> Self {
        BridgeError::AttachFailed {
            reason: reason.into(),
        }
    }

    /// Status code reported to a native caller for this error.
    ///
    /// Unknown call ids report success: event sources may fire ids the
    /// subscriber does not care about.
    pub fn to_hresult(&self) -> HResult {
        match self {
            BridgeError::SubscriptionFailure { hresult } => *hresult,
            BridgeError::NoSuchInterface { .. } => HResult::E_NOINTERFACE,
            BridgeError::UnsupportedCallKind { .. } => HResult::E_NOINTERFACE,
            BridgeError::UnknownCallId { .. } => HResult::S_OK,
            BridgeError::Foreign(_) => HResult::E_FAIL,
            BridgeError::AttachFailed { .. } => HResult::E_FAIL,
            BridgeError::InvalidConfig { .. } => HResult::E_FAIL,
            BridgeError::Internal(_) => HResult::E_UNEXPECTED,
        }
    }
}

/// Result type alias for event bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
