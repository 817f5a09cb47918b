// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT


//! Replicated tensor writes for NUMA mirror storage.
//!
//! A write to read-only mirror storage with more than one replica is
//! repeated at the same offset in every replica, each replica packed
//! independently. Any other storage gets one write into its primary. The
//! storage enum decides which case applies; see
//! [`BufferStorage::write_targets`](memory_manager::BufferStorage::write_targets).

use crate::buffer::is_tile_buffer;
use crate::pack;
use crate::BackendError;
use tensor_core::backend::Buffer;
use tensor_core::{Tensor, TensorError};
use tracing::debug;

/// Runs `write` on the `len` bytes at tensor byte `offset` of every copy a
/// write to `buffer` must reach. Returns the number of copies written.
///
/// # Errors
/// Fails on an out-of-region range or the first failing `write`. Copies
/// written before the failure keep their new contents.
pub fn replicate<F>(
    buffer: &Buffer,
    tensor: &Tensor,
    offset: usize,
    len: usize,
    mut write: F,
) -> Result<usize, TensorError>
where
    F: FnMut(&mut [u8]) -> Result<(), TensorError>,
{
    let start = tensor.region(offset, len)?;
    let mut storage = buffer.write_storage()?;
    let targets = storage.write_targets();
    let copies = targets.len();
    for (node, block) in targets {
        write(block.range_mut(start, len)?)?;
        if copies > 1 {
            debug!(tensor = tensor.name(), node, offset = start, len, "wrote replica");
        }
    }
    Ok(copies)
}

/// The tensor's contents as held by each replica, in generic layout.
///
/// Packed tensors are unpacked. Plain storage yields one entry with node
/// `None`.
pub fn replica_contents(
    buffer: &Buffer,
    tensor: &Tensor,
) -> Result<Vec<(Option<u32>, Vec<u8>)>, BackendError> {
    let start = tensor.region(0, tensor.region_size())?;
    let storage = buffer.read_storage()?;
    let copies: Vec<_> = match storage.mirror() {
        Some(set) => set.replicas().map(|(node, block)| (Some(node), block)).collect(),
        None => vec![(None, storage.primary())],
    };

    let shape = tensor.shape();
    let packed = is_tile_buffer(buffer) && pack::is_packable(tensor);
    copies
        .into_iter()
        .map(|(node, block)| {
            let bytes = block.range(start, tensor.region_size())?;
            let data = if packed {
                pack::unpack_weights(tensor.dtype(), bytes, shape.cols(), shape.rows())?
            } else {
                bytes.to_vec()
            };
            Ok((node, data))
        })
        .collect()
}
