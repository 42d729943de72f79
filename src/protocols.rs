//! Protocol descriptors, keyed by the name a transport reports.
//!
//! The gateway ships descriptors for the common backends; `[[protocols]]`
//! entries in the config file add new ones or replace a built-in by name.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// What the gateway knows about one backend protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolInfo {
    pub name: String,
    /// Connection parameter names accepted by the protocol.
    #[serde(default)]
    pub parameters: Vec<String>,
    /// Parameters that may be overridden when a connection is shared.
    #[serde(default)]
    pub sharing_parameters: Vec<String>,
}

impl ProtocolInfo {
    /// Descriptor carrying only the name, for protocols nobody described.
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            sharing_parameters: Vec::new(),
        }
    }

    fn builtin(name: &str, parameters: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            parameters: parameters.iter().map(ToString::to_string).collect(),
            sharing_parameters: vec!["read-only".to_string()],
        }
    }
}

/// Source of protocol descriptors.
pub trait ProtocolProvider: Send + Sync {
    fn protocol(&self, name: &str) -> Option<ProtocolInfo>;
}

/// Descriptor table built from the built-ins plus configuration.
#[derive(Debug, Clone)]
pub struct ProtocolCatalog {
    protocols: HashMap<String, ProtocolInfo>,
}

impl ProtocolCatalog {
    pub fn with_builtins() -> Self {
        let builtins = [
            ProtocolInfo::builtin(
                "vnc",
                &["hostname", "port", "password", "color-depth", "read-only"],
            ),
            ProtocolInfo::builtin(
                "rdp",
                &[
                    "hostname", "port", "username", "password", "domain", "security",
                    "ignore-cert", "enable-drive", "drive-path",
                ],
            ),
            ProtocolInfo::builtin(
                "ssh",
                &["hostname", "port", "username", "password", "private-key", "font-size"],
            ),
            ProtocolInfo::builtin("telnet", &["hostname", "port", "username", "password"]),
            ProtocolInfo::builtin(
                "kubernetes",
                &["hostname", "port", "namespace", "pod", "container", "use-ssl"],
            ),
        ];
        Self {
            protocols: builtins.into_iter().map(|p| (p.name.clone(), p)).collect(),
        }
    }

    /// Built-ins overlaid with `overrides` (same name replaces).
    pub fn from_config(overrides: &[ProtocolInfo]) -> Self {
        let mut catalog = Self::with_builtins();
        for p in overrides {
            catalog.protocols.insert(p.name.clone(), p.clone());
        }
        catalog
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }
}

impl ProtocolProvider for ProtocolCatalog {
    fn protocol(&self, name: &str) -> Option<ProtocolInfo> {
        self.protocols.get(name).cloned()
    }
}
