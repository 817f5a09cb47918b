// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! NUMA placement policy and per-domain replica sets.
//!
//! A [`MirrorReplicas`] holds one full copy of a buffer per active memory
//! domain. The first replica is the *primary*: it is the logical base that
//! tensor offsets are measured from, and it is the only copy touched by
//! writes unless the set is read-only and has more than one replica.
//!
//! ```text
//!   logical base (primary) ─┐
//!                           ▼
//!   node 0: [ w0 | w1 | w2 | ... ]
//!   node 1: [ w0 | w1 | w2 | ... ]   same offsets, independent memory
//! ```
//!
//! Each replica of a multi-node set is bound to its node with
//! [`bind_to_node`](crate::placement::bind_to_node) right after allocation. A
//! refused binding is logged and the replica stays wherever the allocator put
//! it; contents are unaffected.
//!
//! Replicas only diverge from the primary while the set is mutable. Marking
//! the set read-only copies the primary into every other replica, so data
//! loaded before the marking is not lost to readers on other nodes.

use crate::placement::bind_to_node;
use crate::{AlignedBytes, MemoryError};

/// Upper bound on distinct memory domains tracked by one replica set.
pub const MAX_NUMA_NODES: usize = 8;

/// How tensor memory is spread across NUMA domains.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NumaStrategy {
    /// No NUMA awareness.
    #[default]
    Disabled,
    /// Spread execution across all nodes.
    Distribute,
    /// Stay on the node the process started on.
    Isolate,
    /// Defer to the CPU map supplied by `numactl`.
    Numactl,
    /// Replicate read-only weights on every active node.
    Mirror,
}

impl NumaStrategy {
    /// Returns the lowercase configuration label.
    pub fn as_str(self) -> &'static str {
        match self {
            NumaStrategy::Disabled => "disabled",
            NumaStrategy::Distribute => "distribute",
            NumaStrategy::Isolate => "isolate",
            NumaStrategy::Numactl => "numactl",
            NumaStrategy::Mirror => "mirror",
        }
    }
}

/// The set of memory domains a mirrored allocation replicates across.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorPolicy {
    nodes: Vec<u32>,
}

impl MirrorPolicy {
    /// Builds a policy from node ids, dropping duplicates but keeping order.
    ///
    /// # Errors
    /// Returns [`MemoryError::InvalidMirror`] for an empty list or more than
    /// [`MAX_NUMA_NODES`] distinct nodes.
    pub fn new(nodes: impl IntoIterator<Item = u32>) -> Result<Self, MemoryError> {
        let mut unique: Vec<u32> = Vec::new();
        for node in nodes {
            if !unique.contains(&node) {
                unique.push(node);
            }
        }
        if unique.is_empty() {
            return Err(MemoryError::InvalidMirror("no active nodes".into()));
        }
        if unique.len() > MAX_NUMA_NODES {
            return Err(MemoryError::InvalidMirror(format!(
                "{} nodes exceeds the limit of {MAX_NUMA_NODES}",
                unique.len()
            )));
        }
        Ok(Self { nodes: unique })
    }

    /// Returns the active node ids in replica order.
    pub fn nodes(&self) -> &[u32] {
        &self.nodes
    }
}

/// One identical-size allocation per active memory domain.
#[derive(Debug)]
pub struct MirrorReplicas {
    nodes: Vec<u32>,
    replicas: Vec<AlignedBytes>,
    size: usize,
    read_only: bool,
}

impl MirrorReplicas {
    /// Allocates `size` bytes on every node named by `policy`.
    ///
    /// The set starts writable; mark it read-only once it is known to hold
    /// weights.
    pub fn allocate(
        size: usize,
        alignment: usize,
        policy: &MirrorPolicy,
    ) -> Result<Self, MemoryError> {
        let bind = policy.nodes().len() > 1;
        let replicas = policy
            .nodes()
            .iter()
            .map(|&node| {
                let mut block = AlignedBytes::zeroed(size, alignment)?;
                if bind {
                    if let Err(e) = bind_to_node(&mut block, node) {
                        tracing::debug!(node, error = %e, "replica left unbound");
                    }
                }
                Ok(block)
            })
            .collect::<Result<Vec<_>, MemoryError>>()?;
        Ok(Self {
            nodes: policy.nodes().to_vec(),
            replicas,
            size,
            read_only: false,
        })
    }

    /// Number of replicas (one per active node).
    pub fn n_replicas(&self) -> usize {
        self.replicas.len()
    }

    /// Active node ids, in replica order.
    pub fn active_nodes(&self) -> &[u32] {
        &self.nodes
    }

    /// Size of each replica in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the contents are immutable after loading.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Marks the set read-only (weights) or mutable (caches, activations).
    ///
    /// Turning a mutable set read-only copies the primary into every other
    /// replica first, since writes so far reached the primary alone.
    pub fn set_read_only(&mut self, read_only: bool) {
        if read_only && !self.read_only {
            if let Some((primary, rest)) = self.replicas.split_first_mut() {
                for replica in rest {
                    replica.as_mut_slice().copy_from_slice(primary.as_slice());
                }
            }
        }
        self.read_only = read_only;
    }

    /// Writes fan out to every replica only for read-only sets with more than
    /// one replica; mutable replicas would otherwise diverge.
    pub fn should_replicate(&self) -> bool {
        self.replicas.len() > 1 && self.read_only
    }

    /// The node whose replica is the logical base.
    pub fn primary_node(&self) -> u32 {
        self.nodes[0]
    }

    /// The replica tensor offsets are measured from.
    pub fn primary(&self) -> &AlignedBytes {
        &self.replicas[0]
    }

    /// Mutable access to the primary replica.
    pub fn primary_mut(&mut self) -> &mut AlignedBytes {
        &mut self.replicas[0]
    }

    /// Returns the replica resident on `node`, if that node is active.
    pub fn replica_for_node(&self, node: u32) -> Option<&AlignedBytes> {
        self.nodes
            .iter()
            .position(|&n| n == node)
            .map(|i| &self.replicas[i])
    }

    /// Iterates `(node, replica)` pairs.
    pub fn replicas(&self) -> impl Iterator<Item = (u32, &AlignedBytes)> {
        self.nodes.iter().copied().zip(self.replicas.iter())
    }

    /// Iterates `(node, replica)` pairs mutably.
    pub fn replicas_mut(&mut self) -> impl Iterator<Item = (u32, &mut AlignedBytes)> {
        self.nodes.iter().copied().zip(self.replicas.iter_mut())
    }
}
