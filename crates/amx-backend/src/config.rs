// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Backend configuration, loadable from TOML.
//!
//! ```toml
//! enabled = true
//! numa_strategy = "mirror"
//! mirror_nodes = [0, 1]
//! emulate_tiles = false
//! alignment = 64
//! ```

use crate::BackendError;
use memory_manager::{MirrorPolicy, NumaStrategy};
use std::path::Path;
use tensor_core::backend::TENSOR_ALIGNMENT;

/// Process-wide settings for the tile backend.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Runtime toggle for every accelerated path. Off by default.
    pub enabled: bool,
    /// NUMA placement policy; `mirror` replicates weight buffers per node.
    pub numa_strategy: NumaStrategy,
    /// Nodes to mirror onto. Discovered from sysfs when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror_nodes: Option<Vec<u32>>,
    /// Run the software tile unit when the OS refuses tile entitlement.
    pub emulate_tiles: bool,
    /// Base and tensor alignment of backend buffers, in bytes.
    pub alignment: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            numa_strategy: NumaStrategy::Disabled,
            mirror_nodes: None,
            emulate_tiles: false,
            alignment: 64,
        }
    }
}

impl BackendConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, BackendError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BackendError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, BackendError> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| BackendError::Config(format!("TOML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, BackendError> {
        toml::to_string_pretty(self)
            .map_err(|e| BackendError::Config(format!("TOML serialise error: {e}")))
    }

    /// Checks the alignment and the mirror node list.
    pub fn validate(&self) -> Result<(), BackendError> {
        if !self.alignment.is_power_of_two() || self.alignment < TENSOR_ALIGNMENT {
            return Err(BackendError::Config(format!(
                "alignment {} must be a power of two of at least {TENSOR_ALIGNMENT}",
                self.alignment
            )));
        }
        if let Some(nodes) = &self.mirror_nodes {
            MirrorPolicy::new(nodes.iter().copied())?;
        }
        Ok(())
    }

    /// The mirror policy implied by this configuration, if any.
    ///
    /// `discovered` supplies the node list when `mirror_nodes` is unset.
    pub fn mirror_policy(&self, discovered: &[u32]) -> Result<Option<MirrorPolicy>, BackendError> {
        if self.numa_strategy != NumaStrategy::Mirror {
            return Ok(None);
        }
        let nodes = match &self.mirror_nodes {
            Some(nodes) => nodes.clone(),
            None => discovered.to_vec(),
        };
        Ok(Some(MirrorPolicy::new(nodes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disabled() {
        let c = BackendConfig::default();
        assert!(!c.enabled);
        assert_eq!(c.numa_strategy, NumaStrategy::Disabled);
        assert_eq!(c.alignment, 64);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
enabled = true
numa_strategy = "mirror"
mirror_nodes = [1, 0]
emulate_tiles = true
"#;
        let c = BackendConfig::from_toml(toml).unwrap();
        assert!(c.enabled);
        assert!(c.emulate_tiles);
        assert_eq!(c.alignment, 64);
        let policy = c.mirror_policy(&[0]).unwrap().unwrap();
        assert_eq!(policy.nodes(), &[1, 0]);
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let c = BackendConfig {
            enabled: true,
            numa_strategy: NumaStrategy::Distribute,
            ..Default::default()
        };
        let back = BackendConfig::from_toml(&c.to_toml().unwrap()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_rejects_bad_alignment() {
        assert!(BackendConfig::from_toml("alignment = 48").is_err());
        assert!(BackendConfig::from_toml("alignment = 16").is_err());
    }

    #[test]
    fn test_rejects_unknown_strategy() {
        assert!(BackendConfig::from_toml("numa_strategy = \"scatter\"").is_err());
    }

    #[test]
    fn test_mirror_policy_uses_discovered_nodes() {
        let c = BackendConfig {
            numa_strategy: NumaStrategy::Mirror,
            ..Default::default()
        };
        assert_eq!(c.mirror_policy(&[0, 1, 2]).unwrap().unwrap().nodes(), &[0, 1, 2]);
        assert!(c.mirror_policy(&[]).is_err());

        let off = BackendConfig::default();
        assert!(off.mirror_policy(&[0, 1]).unwrap().is_none());
    }

    #[test]
    fn test_json_omits_unset_mirror_nodes() {
        let json = serde_json::to_value(BackendConfig::default()).unwrap();
        assert_eq!(json["numa_strategy"], "disabled");
        assert!(json.get("mirror_nodes").is_none());
    }
}
