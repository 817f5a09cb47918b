// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT


//! The capability object attached to tensors in tile buffers.

use crate::buffer::is_tile_buffer;
use crate::mmq;
use tensor_core::backend::{ComputeParams, TensorTraits, TraitsHandle};
use tensor_core::Tensor;
use tracing::warn;

/// Stateless tile-kernel compute implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct AmxTensorTraits;

static TRAITS: AmxTensorTraits = AmxTensorTraits;

/// The process-wide handle to [`AmxTensorTraits`].
pub fn tensor_traits() -> TraitsHandle {
    TraitsHandle::new(&TRAITS)
}

impl TensorTraits for AmxTensorTraits {
    fn work_size(&self, n_threads: usize, op: &Tensor) -> Option<usize> {
        if !mmq::eligible(op, is_tile_buffer) {
            return None;
        }
        mmq::work_size(n_threads, op)
    }

    fn compute_forward(&self, params: &mut ComputeParams<'_>, op: &Tensor) -> bool {
        if !mmq::eligible(op, is_tile_buffer) {
            return false;
        }
        match mmq::mul_mat(params, op) {
            Ok(handled) => handled,
            Err(e) => {
                warn!(op = op.name(), ith = params.ith, error = %e, "tile matmul failed, using the default path");
                false
            }
        }
    }
}
