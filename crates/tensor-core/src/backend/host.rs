// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The host ("CPU") buffer type.

use crate::backend::{Buffer, BufferType, HostBufferInterface, TENSOR_ALIGNMENT};
use crate::TensorError;
use memory_manager::{AllocationStats, HostAllocator, MirrorPolicy};
use std::sync::{Arc, OnceLock};

/// Host memory buffers, optionally mirrored across NUMA nodes.
#[derive(Debug)]
pub struct HostBufferType {
    allocator: HostAllocator,
}

impl HostBufferType {
    /// Plain host buffers aligned to `alignment`.
    pub fn new(alignment: usize) -> Result<Self, TensorError> {
        Ok(Self {
            allocator: HostAllocator::new(alignment)?,
        })
    }

    /// Host buffers replicated on every node of `policy`.
    pub fn mirrored(alignment: usize, policy: MirrorPolicy) -> Result<Self, TensorError> {
        Ok(Self {
            allocator: HostAllocator::new(alignment)?.with_mirror(policy),
        })
    }

    /// Returns `true` if buffers of this type are replica sets.
    pub fn is_mirrored(&self) -> bool {
        self.allocator.mirror_policy().is_some()
    }

    /// Allocation statistics so far.
    pub fn stats(&self) -> AllocationStats {
        self.allocator.stats()
    }
}

impl BufferType for HostBufferType {
    fn name(&self) -> &'static str {
        "CPU"
    }

    fn alloc(&'static self, size: usize) -> Result<Buffer, TensorError> {
        let storage = self.allocator.allocate(size)?;
        Ok(Buffer::new(self, Arc::new(HostBufferInterface), storage))
    }

    fn alignment(&self) -> usize {
        self.allocator.alignment()
    }

    fn is_host(&self) -> bool {
        true
    }
}

/// The process-wide plain host buffer type.
pub fn cpu_buffer_type() -> &'static HostBufferType {
    static CPU: OnceLock<HostBufferType> = OnceLock::new();
    CPU.get_or_init(|| HostBufferType {
        allocator: HostAllocator::new(TENSOR_ALIGNMENT)
            .expect("TENSOR_ALIGNMENT is a power of two"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_singleton() {
        let a = cpu_buffer_type();
        let b = cpu_buffer_type();
        assert!(std::ptr::eq(a, b));
        assert_eq!(a.alignment(), TENSOR_ALIGNMENT);
        assert!(a.is_host());
        assert!(!a.is_mirrored());
    }

    #[test]
    fn test_alloc_is_aligned() {
        let buffer = cpu_buffer_type().alloc(100).unwrap();
        assert_eq!(buffer.base_addr().unwrap() % TENSOR_ALIGNMENT, 0);
        assert_eq!(buffer.size(), 100);
        assert!(buffer.is_of_type(cpu_buffer_type()));
    }

    #[test]
    fn test_alloc_failure_propagates() {
        assert!(cpu_buffer_type().alloc(usize::MAX / 2 + 1).is_err());
    }
}
