// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! A point-in-time view of the platform's acceleration capabilities.

use crate::{CpuFeatures, NumaTopology, TileEntitlement};

/// Everything the backend needs to know about the host.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PlatformSnapshot {
    /// Instruction-set extensions.
    pub cpu: CpuFeatures,
    /// Memory domains.
    pub numa: NumaTopology,
    /// `None` if tile usage is granted, otherwise the reason it is not.
    pub entitlement_error: Option<String>,
}

impl PlatformSnapshot {
    /// Probes the host, requesting tile usage through `entitlement`.
    pub fn capture(entitlement: &dyn TileEntitlement) -> Self {
        Self {
            cpu: CpuFeatures::detect(),
            numa: NumaTopology::global().clone(),
            entitlement_error: entitlement.request().err().map(|e| e.to_string()),
        }
    }

    /// Whether hardware tile kernels may run in this process.
    pub fn tiles_available(&self) -> bool {
        self.entitlement_error.is_none()
    }

    /// Returns a one-line summary.
    pub fn summary(&self) -> String {
        format!(
            "CPU features: {} | NUMA nodes: {}{} | tiles: {}",
            self.cpu.describe(),
            self.numa.num_nodes(),
            if self.numa.discovered { "" } else { " (fallback)" },
            if self.tiles_available() {
                "entitled"
            } else {
                "unavailable"
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaticEntitlement;

    #[test]
    fn test_capture_with_static_entitlement() {
        let granted = PlatformSnapshot::capture(&StaticEntitlement(true));
        assert!(granted.tiles_available());
        assert!(granted.summary().contains("entitled"));

        let denied = PlatformSnapshot::capture(&StaticEntitlement(false));
        assert!(!denied.tiles_available());
        assert!(denied.summary().contains("unavailable"));
    }

    #[test]
    fn test_serialises() {
        let snap = PlatformSnapshot::capture(&StaticEntitlement(true));
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"numa\""));
    }
}
