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

//! Bridge configuration.
//!
//! Every field has a default, so an empty document (or `BridgeConfig::default()`)
//! is a valid configuration.
//!
//! ```yaml
//! dispatcher:
//!   method_name: invoke
//!   signature: "(Ljava/lang/String;[Lorg/drasi/dispatch/Variant;)Lorg/drasi/dispatch/Variant;"
//! attach:
//!   version: 65538
//!   thread_name: com-events
//! trace_invocations: true
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::foreign::AttachArgs;

/// Name of the dispatcher method every sink object exposes.
pub const DEFAULT_DISPATCHER_METHOD: &str = "invoke";

/// Signature of the dispatcher method: `(String, Variant[]) -> Variant`.
pub const DEFAULT_DISPATCHER_SIGNATURE: &str =
    "(Ljava/lang/String;[Lorg/drasi/dispatch/Variant;)Lorg/drasi/dispatch/Variant;";

/// Runtime interface version requested when attaching a thread (1.2).
pub const DEFAULT_ATTACH_VERSION: u32 = 0x0001_0002;

/// Top-level configuration of an [`crate::EventBridge`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BridgeConfig {
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub attach: AttachConfig,
    /// Log every notification (resolution, argument count) at trace level.
    #[serde(default)]
    pub trace_invocations: bool,
}

/// Identifies the single dispatcher method on the sink object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatcherConfig {
    #[serde(default = "default_method_name")]
    pub method_name: String,
    #[serde(default = "default_signature")]
    pub signature: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            method_name: default_method_name(),
            signature: default_signature(),
        }
    }
}

/// How event-delivery threads register with the foreign runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttachConfig {
    #[serde(default = "default_attach_version")]
    pub version: u32,
    #[serde(default)]
    pub thread_name: Option<String>,
    #[serde(default)]
    pub thread_group: Option<String>,
}

impl Default for AttachConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_ATTACH_VERSION,
            thread_name: None,
            thread_group: None,
        }
    }
}

impl AttachConfig {
    pub fn to_args(&self) -> AttachArgs {
        AttachArgs {
            version: self.version,
            thread_name: self.thread_name.clone(),
            thread_group: self.thread_group.clone(),
        }
    }
}

fn default_method_name() -> String {
    DEFAULT_DISPATCHER_METHOD.to_string()
}

fn default_signature() -> String {
    DEFAULT_DISPATCHER_SIGNATURE.to_string()
}

fn default_attach_version() -> u32 {
    DEFAULT_ATTACH_VERSION
}

impl BridgeConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: BridgeConfig =
            serde_yaml::from_str(yaml).context("Failed to parse bridge configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dispatcher.method_name.trim().is_empty() {
            return Err(BridgeError::invalid_config(
                "dispatcher.method_name must not be empty",
            ));
        }
        if self.dispatcher.signature.trim().is_empty() {
            return Err(BridgeError::invalid_config(
                "dispatcher.signature must not be empty",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.dispatcher.method_name, "invoke");
        assert_eq!(config.dispatcher.signature, DEFAULT_DISPATCHER_SIGNATURE);
        assert_eq!(config.attach.version, DEFAULT_ATTACH_VERSION);
        assert!(config.attach.thread_name.is_none());
        assert!(!config.trace_invocations);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = BridgeConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
dispatcher:
  method_name: handleEvent
attach:
  thread_name: com-events
trace_invocations: true
"#;
        let config = BridgeConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.dispatcher.method_name, "handleEvent");
        assert_eq!(config.dispatcher.signature, DEFAULT_DISPATCHER_SIGNATURE);
        assert_eq!(config.attach.thread_name.as_deref(), Some("com-events"));
        assert_eq!(config.attach.version, DEFAULT_ATTACH_VERSION);
        assert!(config.trace_invocations);

        let args = config.attach.to_args();
        assert_eq!(args.thread_name.as_deref(), Some("com-events"));
        assert!(args.thread_group.is_none());
    }

    #[test]
    fn test_empty_method_name_rejected() {
        let err = BridgeConfig::from_yaml_str("dispatcher:\n  method_name: \"\"\n").unwrap_err();
        assert!(matches!(err, BridgeError::InvalidConfig { .. }));
    }

    #[test]
    fn test_malformed_yaml_is_internal_error() {
        let err = BridgeConfig::from_yaml_str("dispatcher: [").unwrap_err();
        assert!(matches!(err, BridgeError::Internal(_)));
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = BridgeConfig::default();
        config.attach.thread_group = Some("events".to_string());
        let json = serde_json::to_string(&config).unwrap();
        let parsed: BridgeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
