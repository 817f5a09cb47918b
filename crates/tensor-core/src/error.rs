// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tensor, buffer and dispatch operations.

use crate::Shape;

/// Errors that can occur during tensor operations.
#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    /// The provided data size does not match the size the tensor expects.
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Two tensors have incompatible shapes for the requested operation.
    #[error("incompatible shapes for {op}: {lhs} vs {rhs}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Shape,
        rhs: Shape,
    },

    /// The requested data type is not supported for this operation.
    #[error("unsupported dtype {dtype:?} for operation {op}")]
    UnsupportedDType {
        op: &'static str,
        dtype: crate::DType,
    },

    /// A row length is not a whole number of quantization blocks.
    #[error("row of {cols} elements is not a multiple of the {dtype:?} block size {block}")]
    PartialBlock {
        dtype: crate::DType,
        cols: usize,
        block: usize,
    },

    /// The tensor has not been placed in a buffer.
    #[error("tensor '{0}' is not allocated in any buffer")]
    NotAllocated(String),

    /// A write could not be applied to the tensor's backing memory.
    #[error("invalid write to tensor '{tensor}': {detail}")]
    InvalidWrite { tensor: String, detail: String },

    /// The underlying host memory operation failed.
    #[error("memory error: {0}")]
    Memory(#[from] memory_manager::MemoryError),

    /// A buffer's storage lock was poisoned by a panicking writer.
    #[error("buffer storage lock poisoned")]
    LockPoisoned,

    /// A compute worker panicked.
    #[error("compute worker {0} panicked")]
    WorkerPanicked(usize),

    /// A dtype label could not be parsed.
    #[error("unknown dtype '{0}'")]
    UnknownDType(String),
}
