// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! NUMA topology discovery from `/sys/devices/system/node/`.
//!
//! Reads:
//! - `online` — the list of online node ids (e.g. `"0-1"`);
//! - `node<N>/cpulist` — the logical CPUs of each node.
//!
//! Single-socket machines, containers without sysfs, and non-Linux hosts
//! degrade to one node `0` owning every CPU. The system topology is cached
//! in a `OnceLock` on first use.

use crate::sysfs::{parse_list, read_sysfs_file};
use crate::ProbeError;
use std::path::Path;
use std::sync::OnceLock;

/// Default sysfs root for NUMA nodes.
pub const NODE_ROOT: &str = "/sys/devices/system/node";

/// One memory domain.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NumaNode {
    /// Node id, as in `node<id>`.
    pub id: u32,
    /// Logical CPUs local to this node (empty if unknown).
    pub cpus: Vec<usize>,
}

/// The machine's memory domains.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NumaTopology {
    /// Nodes sorted by id.
    pub nodes: Vec<NumaNode>,
    /// `false` when this is the single-node fallback.
    pub discovered: bool,
}

impl NumaTopology {
    /// Reads the system topology, falling back to a single node.
    pub fn discover() -> Self {
        match Self::read_from(Path::new(NODE_ROOT)) {
            Ok(topology) => topology,
            Err(e) => {
                tracing::debug!(error = %e, "NUMA sysfs unavailable, assuming one node");
                Self::single_node()
            }
        }
    }

    /// The cached system topology.
    pub fn global() -> &'static Self {
        static TOPOLOGY: OnceLock<NumaTopology> = OnceLock::new();
        TOPOLOGY.get_or_init(Self::discover)
    }

    /// Reads a topology rooted at `root` (a directory shaped like
    /// `/sys/devices/system/node`).
    pub fn read_from(root: &Path) -> Result<Self, ProbeError> {
        let online_path = root.join("online");
        let online = read_sysfs_file(&online_path)?;
        let ids = parse_list(&online).ok_or_else(|| ProbeError::ParseError {
            path: online_path.display().to_string(),
            detail: format!("expected a node list, got '{online}'"),
        })?;
        if ids.is_empty() {
            return Err(ProbeError::ParseError {
                path: online_path.display().to_string(),
                detail: "no online nodes".into(),
            });
        }

        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            let cpulist_path = root.join(format!("node{id}")).join("cpulist");
            let cpus = match read_sysfs_file(&cpulist_path) {
                Ok(list) => parse_list(&list).ok_or_else(|| ProbeError::ParseError {
                    path: cpulist_path.display().to_string(),
                    detail: format!("expected a CPU list, got '{list}'"),
                })?,
                Err(ProbeError::NotAvailable { .. }) => Vec::new(),
                Err(e) => return Err(e),
            };
            nodes.push(NumaNode {
                id: id as u32,
                cpus,
            });
        }
        nodes.sort_by_key(|n| n.id);

        Ok(Self {
            nodes,
            discovered: true,
        })
    }

    /// One node `0` owning every available CPU.
    pub fn single_node() -> Self {
        let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self {
            nodes: vec![NumaNode {
                id: 0,
                cpus: (0..cpus).collect(),
            }],
            discovered: false,
        }
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Whether more than one memory domain exists.
    pub fn is_multi_node(&self) -> bool {
        self.nodes.len() > 1
    }

    /// Node ids in ascending order.
    pub fn node_ids(&self) -> Vec<u32> {
        self.nodes.iter().map(|n| n.id).collect()
    }

    /// The node a logical CPU belongs to.
    pub fn node_of_cpu(&self, cpu: usize) -> Option<u32> {
        self.nodes
            .iter()
            .find(|n| n.cpus.contains(&cpu))
            .map(|n| n.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn fake_sysfs(tag: &str, online: &str, nodes: &[(u32, &str)]) -> PathBuf {
        let root = std::env::temp_dir().join(format!("hw-probe-numa-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("online"), format!("{online}\n")).unwrap();
        for (id, cpus) in nodes {
            let dir = root.join(format!("node{id}"));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("cpulist"), format!("{cpus}\n")).unwrap();
        }
        root
    }

    #[test]
    fn test_two_socket_layout() {
        let root = fake_sysfs("two", "0-1", &[(0, "0-3,8-11"), (1, "4-7,12-15")]);
        let topo = NumaTopology::read_from(&root).unwrap();
        assert!(topo.discovered);
        assert!(topo.is_multi_node());
        assert_eq!(topo.node_ids(), vec![0, 1]);
        assert_eq!(topo.node_of_cpu(9), Some(0));
        assert_eq!(topo.node_of_cpu(12), Some(1));
        assert_eq!(topo.node_of_cpu(99), None);
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_missing_cpulist_is_empty() {
        let root = fake_sysfs("nocpu", "0", &[]);
        let topo = NumaTopology::read_from(&root).unwrap();
        assert_eq!(topo.num_nodes(), 1);
        assert!(topo.nodes[0].cpus.is_empty());
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_malformed_online() {
        let root = fake_sysfs("bad", "zero", &[]);
        assert!(matches!(
            NumaTopology::read_from(&root),
            Err(ProbeError::ParseError { .. })
        ));
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_missing_root_falls_back() {
        assert!(NumaTopology::read_from(Path::new("/nonexistent/node")).is_err());
        let single = NumaTopology::single_node();
        assert!(!single.discovered);
        assert_eq!(single.node_ids(), vec![0]);
        assert!(!single.nodes[0].cpus.is_empty());
    }

    #[test]
    fn test_global_has_at_least_one_node() {
        assert!(NumaTopology::global().num_nodes() >= 1);
    }
}
