// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Allocation statistics for diagnostics.
//!
//! [`AllocationStats`] tracks cumulative metrics about host allocations,
//! separating logical bytes (what callers asked for) from physical bytes
//! (including every mirror replica).

/// Cumulative statistics about a [`HostAllocator`](crate::HostAllocator).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct AllocationStats {
    /// Total number of successful allocation requests.
    pub total_allocations: u64,
    /// Number of those that produced a mirror replica set.
    pub mirrored_allocations: u64,
    /// Number of allocation requests the system allocator refused.
    pub failed_allocations: u64,
    /// Sum of requested sizes.
    pub logical_bytes: u64,
    /// Sum of bytes actually reserved, counting every replica.
    pub physical_bytes: u64,
    /// Largest single request seen.
    pub largest_request_bytes: usize,
}

impl AllocationStats {
    /// Physical bytes per logical byte; `1.0` without mirroring.
    ///
    /// Returns `0.0` if nothing has been allocated.
    pub fn replication_factor(&self) -> f64 {
        if self.logical_bytes == 0 {
            return 0.0;
        }
        self.physical_bytes as f64 / self.logical_bytes as f64
    }

    /// Records a single-block allocation.
    pub(crate) fn record_plain(&mut self, size: usize) {
        self.total_allocations += 1;
        self.logical_bytes += size as u64;
        self.physical_bytes += size as u64;
        self.largest_request_bytes = self.largest_request_bytes.max(size);
    }

    /// Records a replica-set allocation of `size` bytes on `replicas` nodes.
    pub(crate) fn record_mirror(&mut self, size: usize, replicas: usize) {
        self.total_allocations += 1;
        self.mirrored_allocations += 1;
        self.logical_bytes += size as u64;
        self.physical_bytes += (size * replicas) as u64;
        self.largest_request_bytes = self.largest_request_bytes.max(size);
    }

    /// Records a refused allocation.
    pub(crate) fn record_failure(&mut self) {
        self.failed_allocations += 1;
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        let logical_mb = self.logical_bytes as f64 / (1024.0 * 1024.0);
        let physical_mb = self.physical_bytes as f64 / (1024.0 * 1024.0);
        format!(
            "Allocations: {} total ({} mirrored, {} failed), \
             {:.2} MB logical, {:.2} MB physical ({:.1}x)",
            self.total_allocations,
            self.mirrored_allocations,
            self.failed_allocations,
            logical_mb,
            physical_mb,
            self.replication_factor(),
        )
    }
}
