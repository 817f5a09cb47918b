// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT


//! The buffer interface of tile buffers.
//!
//! Packable weights are stored in the tile layout and converted on the way
//! in and out; everything else is plain bytes. Writes reach every replica of
//! read-only mirror storage.

use crate::mirror;
use crate::pack;
use crate::traits::tensor_traits;
use tensor_core::backend::{Buffer, BufferInterface};
use tensor_core::{Tensor, TensorError};
use tracing::debug;

/// Name reported by tile buffers and their buffer type.
pub const AMX_BUFFER_NAME: &str = "AMX";

/// Interface installed on every buffer allocated by
/// [`AmxBufferType`](crate::AmxBufferType).
#[derive(Debug, Default, Clone, Copy)]
pub struct AmxBufferInterface;

/// Whether `buffer` holds tiles, judged by its installed interface.
pub(crate) fn is_tile_buffer(buffer: &Buffer) -> bool {
    buffer.interface_as::<AmxBufferInterface>().is_some()
}

fn invalid(tensor: &Tensor, detail: impl Into<String>) -> TensorError {
    TensorError::InvalidWrite {
        tensor: tensor.name().to_string(),
        detail: detail.into(),
    }
}

/// Packed tensors only move as a whole.
fn require_whole(tensor: &Tensor, offset: usize, len: usize) -> Result<(), TensorError> {
    if offset != 0 || len != tensor.nbytes() {
        return Err(invalid(
            tensor,
            format!(
                "packed tensors transfer whole: got {len} bytes at offset {offset}, expected {} at 0",
                tensor.nbytes()
            ),
        ));
    }
    Ok(())
}

impl BufferInterface for AmxBufferInterface {
    fn name(&self) -> &'static str {
        AMX_BUFFER_NAME
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn init_tensor(&self, _buffer: &Buffer, tensor: &mut Tensor) -> Result<(), TensorError> {
        tensor.set_extra(Some(tensor_traits()));
        Ok(())
    }

    fn set_tensor(
        &self,
        buffer: &Buffer,
        tensor: &Tensor,
        data: &[u8],
        offset: usize,
    ) -> Result<(), TensorError> {
        if !pack::is_packable(tensor) {
            mirror::replicate(buffer, tensor, offset, data.len(), |dst| {
                dst.copy_from_slice(data);
                Ok(())
            })?;
            return Ok(());
        }

        require_whole(tensor, offset, data.len())?;
        let (dtype, k, n) = (tensor.dtype(), tensor.shape().cols(), tensor.shape().rows());
        let copies = mirror::replicate(buffer, tensor, 0, tensor.region_size(), |dst| {
            pack::pack_weights(dtype, data, dst, k, n).map_err(|e| invalid(tensor, e.to_string()))
        })?;
        debug!(tensor = tensor.name(), %dtype, k, n, copies, "packed tensor");
        Ok(())
    }

    fn get_tensor(
        &self,
        buffer: &Buffer,
        tensor: &Tensor,
        offset: usize,
        len: usize,
    ) -> Result<Vec<u8>, TensorError> {
        if !pack::is_packable(tensor) {
            let start = tensor.region(offset, len)?;
            return Ok(buffer.read_storage()?.read_at(start, len)?.to_vec());
        }

        require_whole(tensor, offset, len)?;
        let start = tensor.region(0, tensor.region_size())?;
        let storage = buffer.read_storage()?;
        let packed = storage.read_at(start, tensor.region_size())?;
        pack::unpack_weights(tensor.dtype(), packed, tensor.shape().cols(), tensor.shape().rows())
            .map_err(|e| invalid(tensor, e.to_string()))
    }
}
