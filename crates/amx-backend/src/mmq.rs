// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT


//! Matrix multiply through the tile kernels.
//!
//! Each worker quantizes the whole activation matrix into its own scratch,
//! computes its share of N-tiles into a private output block, and copies the
//! block into its disjoint output columns. Weights are read from the replica
//! local to the worker's NUMA node when the buffer replicates its writes, and
//! from the primary otherwise.

use crate::kernels::{self, Activations, KernelArgs, KernelKey};
use crate::pack;
use crate::tile::{TileContext, TILE_K, TILE_N};
use crate::BackendError;
use tensor_core::backend::{Buffer, ComputeParams};
use tensor_core::ops::balance211;
use tensor_core::quant::{quantize_row_q8_0, BlockQ8_0};
use tensor_core::{DType, OpKind, Tensor, TensorError};
use tracing::trace;

/// Weights are split in pairs of interleaved N-tiles.
pub const N_GRANULE: usize = 2 * TILE_N;

/// Alignment slack for carving the scratch into typed slices.
const SCRATCH_SLACK: usize = 64;

/// Whether `op` is a multiply the tile kernels take over.
///
/// `owns` decides whether a buffer belongs to the tile backend.
pub fn eligible(op: &Tensor, owns: impl Fn(&Buffer) -> bool) -> bool {
    if op.op() != OpKind::MulMat || op.dtype() != DType::F32 {
        return false;
    }
    let (Some(weight), Some(act)) = (op.src(0), op.src(1)) else {
        return false;
    };
    let flat = |t: &Tensor| t.shape().is_2d() && t.is_contiguous();
    let weight_kind = match weight.dtype() {
        DType::F16 | DType::BF16 => true,
        dtype => pack::tile_bytes(dtype).is_some() && pack::is_packable(weight),
    };

    flat(weight)
        && flat(op)
        && flat(act)
        && weight.buffer().is_some_and(|b| owns(b.as_ref()))
        && weight.shape().rows() % N_GRANULE == 0
        && weight_kind
        && act.dtype() == DType::F32
        && act.buffer().map_or(true, |b| b.is_host())
}

/// Scratch bytes one worker needs for `op` with `n_threads` workers.
///
/// Returns `None` when no kernel serves the operand kinds.
pub fn work_size(n_threads: usize, op: &Tensor) -> Option<usize> {
    let (weight, act) = (op.src(0)?, op.src(1)?);
    let (n, k, m) = (weight.shape().rows(), weight.shape().cols(), act.shape().rows());
    kernels::lookup(KernelKey::for_op(m, weight.dtype()))?;

    let blocks = activation_blocks(weight.dtype(), m, k);
    let tiles_per_thread = (n / TILE_N).div_ceil(n_threads.max(1));
    let outputs = m * tiles_per_thread * TILE_N;
    Some(scratch_bytes(blocks, outputs))
}

fn activation_blocks(weight: DType, m: usize, k: usize) -> usize {
    if weight.is_quantized() {
        m * (k / TILE_K)
    } else {
        0
    }
}

fn scratch_bytes(blocks: usize, outputs: usize) -> usize {
    blocks * std::mem::size_of::<BlockQ8_0>() + outputs * std::mem::size_of::<f32>() + SCRATCH_SLACK
}

/// Splits `wdata` into the activation blocks and the output block.
fn carve(
    wdata: &mut [u8],
    blocks: usize,
    outputs: usize,
) -> Result<(&mut [BlockQ8_0], &mut [f32]), BackendError> {
    let too_small = BackendError::ScratchTooSmall {
        needed: scratch_bytes(blocks, outputs),
        available: wdata.len(),
    };
    let (_, aligned, _) = bytemuck::pod_align_to_mut::<u8, BlockQ8_0>(wdata);
    if aligned.len() < blocks {
        return Err(too_small);
    }
    let (act, rest) = aligned.split_at_mut(blocks);
    let (_, out, _) = bytemuck::pod_align_to_mut::<u8, f32>(bytemuck::cast_slice_mut(rest));
    if out.len() < outputs {
        return Err(too_small);
    }
    Ok((act, &mut out[..outputs]))
}

/// Computes this worker's share of `op`.
///
/// Returns `Ok(false)` when the operand kinds have no kernel, so the caller
/// can fall back before anything was written.
pub fn mul_mat(params: &mut ComputeParams<'_>, op: &Tensor) -> Result<bool, BackendError> {
    let (Some(weight), Some(act)) = (op.src(0), op.src(1)) else {
        return Ok(false);
    };
    let (n, k, m) = (weight.shape().rows(), weight.shape().cols(), act.shape().rows());
    if k == 0 || n % TILE_N != 0 {
        return Ok(false);
    }
    let Some(kernel) = kernels::lookup(KernelKey::for_op(m, weight.dtype())) else {
        trace!(op = op.name(), dtype = %weight.dtype(), "no tile kernel");
        return Ok(false);
    };

    let tiles = balance211(n / TILE_N, params.nth, params.ith);
    if tiles.is_empty() {
        return Ok(true);
    }
    let width = tiles.len() * TILE_N;

    let x = act.to_f32_vec()?;
    let (blocks, out) = carve(params.wdata, activation_blocks(weight.dtype(), m, k), m * width)?;
    let activations = if weight.dtype().is_quantized() {
        let kb_count = k / TILE_K;
        for (row, dst) in x.chunks_exact(k).zip(blocks.chunks_exact_mut(kb_count)) {
            dst.copy_from_slice(&quantize_row_q8_0(row));
        }
        Activations::Q8_0(blocks)
    } else {
        Activations::F32(&x)
    };

    let ctx = params.worker.get_or_insert_with(TileContext::emulated);
    {
        let buffer = weight
            .buffer()
            .ok_or_else(|| TensorError::NotAllocated(weight.name().to_string()))?;
        let storage = buffer.read_storage()?;
        let bytes = storage
            .replica(params.numa_node)
            .range(weight.offset(), weight.region_size())?;
        let args = KernelArgs {
            weight: bytes,
            act: activations,
            m,
            k,
            tiles: tiles.clone(),
        };
        kernel(ctx, &args, out);
    }

    for (row, values) in out.chunks_exact(width).enumerate() {
        op.write_f32_at(row, tiles.start * TILE_N, values)?;
    }
    trace!(op = op.name(), ith = params.ith, tiles = ?tiles, m, "tile matmul done");
    Ok(true)
}
