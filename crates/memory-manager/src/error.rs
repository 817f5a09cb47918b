// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for host memory management.

/// Errors that can occur while allocating or addressing host buffers.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// The system allocator could not satisfy the request.
    #[error("out of memory: requested {requested_bytes} bytes aligned to {alignment}")]
    OutOfMemory {
        requested_bytes: usize,
        alignment: usize,
    },

    /// The requested alignment is zero or not a power of two.
    #[error("invalid alignment {0}: must be a non-zero power of two")]
    InvalidAlignment(usize),

    /// A byte range falls outside the allocation.
    #[error("range of {len} bytes at offset {offset} out of bounds for allocation of {size} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },

    /// A mirror replica set was requested with no usable memory domains.
    #[error("invalid mirror policy: {0}")]
    InvalidMirror(String),

    /// The kernel refused to bind a block to a memory domain.
    #[error("failed to bind {len} bytes to NUMA node {node}: errno {errno}")]
    Placement { node: u32, len: usize, errno: i32 },
}
