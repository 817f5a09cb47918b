// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The host allocator: aligned blocks, optionally mirrored across NUMA nodes.
//!
//! Allocation failures are returned to the caller, never retried here.

use crate::{AlignedBytes, AllocationStats, BufferStorage, MemoryError, MirrorPolicy, MirrorReplicas};
use std::sync::Mutex;

/// Produces [`BufferStorage`] for host-resident buffers.
///
/// # Example
/// ```
/// use memory_manager::{HostAllocator, MirrorPolicy};
///
/// let plain = HostAllocator::new(64).unwrap();
/// assert!(plain.allocate(4096).unwrap().mirror().is_none());
///
/// let mirrored = HostAllocator::new(64)
///     .unwrap()
///     .with_mirror(MirrorPolicy::new([0, 1]).unwrap());
/// let storage = mirrored.allocate(4096).unwrap();
/// assert_eq!(storage.mirror().unwrap().n_replicas(), 2);
/// ```
#[derive(Debug)]
pub struct HostAllocator {
    alignment: usize,
    mirror: Option<MirrorPolicy>,
    stats: Mutex<AllocationStats>,
}

impl HostAllocator {
    /// Creates an allocator that aligns every block to `alignment` bytes.
    pub fn new(alignment: usize) -> Result<Self, MemoryError> {
        if alignment == 0 || !alignment.is_power_of_two() {
            return Err(MemoryError::InvalidAlignment(alignment));
        }
        Ok(Self {
            alignment,
            mirror: None,
            stats: Mutex::new(AllocationStats::default()),
        })
    }

    /// Replicates every allocation across the nodes of `policy`.
    pub fn with_mirror(mut self, policy: MirrorPolicy) -> Self {
        self.mirror = Some(policy);
        self
    }

    /// Returns the block alignment.
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Returns the mirror policy, if mirroring is on.
    pub fn mirror_policy(&self) -> Option<&MirrorPolicy> {
        self.mirror.as_ref()
    }

    /// Allocates `size` zeroed bytes.
    pub fn allocate(&self, size: usize) -> Result<BufferStorage, MemoryError> {
        let result = match &self.mirror {
            Some(policy) => {
                MirrorReplicas::allocate(size, self.alignment, policy).map(BufferStorage::Mirror)
            }
            None => AlignedBytes::zeroed(size, self.alignment).map(BufferStorage::Plain),
        };

        if let Ok(mut stats) = self.stats.lock() {
            match &result {
                Ok(BufferStorage::Mirror(set)) => stats.record_mirror(size, set.n_replicas()),
                Ok(BufferStorage::Plain(_)) => stats.record_plain(size),
                Err(_) => stats.record_failure(),
            }
        }

        match &result {
            Ok(BufferStorage::Mirror(set)) => tracing::debug!(
                size,
                replicas = set.n_replicas(),
                nodes = ?set.active_nodes(),
                "allocated mirror replica set"
            ),
            Ok(BufferStorage::Plain(_)) => {
                tracing::trace!(size, alignment = self.alignment, "allocated host block")
            }
            Err(e) => tracing::warn!(size, error = %e, "host allocation failed"),
        }

        result
    }

    /// Returns a snapshot of the allocation statistics.
    pub fn stats(&self) -> AllocationStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}
