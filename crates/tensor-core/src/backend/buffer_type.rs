// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The buffer type: factory and shared interface for a family of buffers.

use crate::backend::{Buffer, ExtraBufferType};
use crate::{Tensor, TensorError};

/// Minimum alignment of any tensor placed in a buffer.
pub const TENSOR_ALIGNMENT: usize = 32;

/// A family of buffers sharing one allocator and interface.
///
/// Buffer types are process-wide values (`&'static`); buffers keep a
/// reference to the type that created them.
pub trait BufferType: Send + Sync {
    /// Family name, e.g. `"CPU"`.
    fn name(&self) -> &'static str;

    /// Allocates a buffer of `size` bytes.
    ///
    /// # Errors
    /// Allocation failure is returned, never retried.
    fn alloc(&'static self, size: usize) -> Result<Buffer, TensorError>;

    /// Alignment of the base address and of every tensor offset.
    fn alignment(&self) -> usize;

    /// Largest single allocation this type supports.
    fn max_size(&self) -> usize {
        usize::MAX
    }

    /// Bytes a tensor occupies in a buffer of this type.
    fn alloc_size(&self, tensor: &Tensor) -> usize {
        tensor.nbytes()
    }

    /// Whether the CPU can address buffers of this type directly.
    fn is_host(&self) -> bool;

    /// Operator capability queries, for types that carry their own kernels.
    fn extra(&self) -> Option<&dyn ExtraBufferType> {
        None
    }
}

/// Identity comparison of two buffer types.
pub fn same_buffer_type(a: &dyn BufferType, b: &dyn BufferType) -> bool {
    std::ptr::addr_eq(a as *const dyn BufferType, b as *const dyn BufferType)
}
