// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the tile backend.

use crate::tile::{TILE_K, TILE_N};
use tensor_core::DType;

/// Reasons weights cannot be converted to or from the packed tile layout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PackError {
    /// The element type has no packed layout.
    #[error("{0} has no packed tile layout")]
    Unsupported(DType),

    /// K or N is not a whole number of tiles.
    #[error("K = {k} and N = {n} must be multiples of {TILE_K} and {TILE_N}")]
    Misaligned { k: usize, n: usize },

    /// A source or destination slice has the wrong length.
    #[error("{what}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Errors raised by the tile backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Allocation or replica bookkeeping failed.
    #[error("memory error: {0}")]
    Memory(#[from] memory_manager::MemoryError),

    /// A tensor operation failed.
    #[error("tensor error: {0}")]
    Tensor(#[from] tensor_core::TensorError),

    /// Platform probing failed.
    #[error("probe error: {0}")]
    Probe(#[from] hw_probe::ProbeError),

    /// Weight packing failed.
    #[error("packing error: {0}")]
    Pack(#[from] PackError),

    /// The process-wide configuration was already installed or read.
    #[error("backend configuration is already fixed for this process")]
    AlreadyConfigured,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The backend cannot run in this process.
    #[error("tile backend unavailable: {0}")]
    Unavailable(String),

    /// The per-worker scratch is smaller than the work-size estimate.
    #[error("scratch of {available} bytes is smaller than the {needed} bytes required")]
    ScratchTooSmall { needed: usize, available: usize },
}
