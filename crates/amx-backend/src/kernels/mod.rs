// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-kind matmul kernels and their registry.
//!
//! A kernel is addressed by [`KernelKey`]: operation shape, weight kind and
//! activation kind. Kinds without an implementation have no entry, and
//! [`lookup`] returns `None` so the caller falls back to the default path.
//!
//! Every kernel computes `out[m][j] = Σ_k act[m][k] · W[n][k]` for the
//! N-tiles in [`KernelArgs::tiles`], where `j` indexes the covered outputs.

mod float;
mod gemm;
mod gemv;
pub mod vnni;

use crate::pack::{self, q4_0, q4_1, q8_0, vnni::VNNI_BYTES};
use crate::tile::{TileContext, TILE_N};
use std::ops::Range;
use tensor_core::quant::BlockQ8_0;
use tensor_core::DType;

/// Largest activation row count served by the vector kernels.
pub const GEMV_MAX_ROWS: usize = 4;

/// Matrix-vector or matrix-matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelShape {
    Gemv,
    Gemm,
}

impl KernelShape {
    /// The shape used for `m` activation rows.
    pub fn for_rows(m: usize) -> Self {
        if m <= GEMV_MAX_ROWS {
            KernelShape::Gemv
        } else {
            KernelShape::Gemm
        }
    }
}

/// Registry key of a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelKey {
    pub shape: KernelShape,
    pub weight: DType,
    pub activation: DType,
}

impl KernelKey {
    /// The key for `m` rows against weights of `weight`, with activations in
    /// the form those weights consume.
    pub fn for_op(m: usize, weight: DType) -> Self {
        Self {
            shape: KernelShape::for_rows(m),
            weight,
            activation: activation_kind(weight),
        }
    }
}

/// Quantized weights read Q8_0 activations; float weights read `f32`.
pub fn activation_kind(weight: DType) -> DType {
    if weight.is_quantized() {
        DType::Q8_0
    } else {
        DType::F32
    }
}

/// Activations in the form a kernel consumes, `m` rows.
#[derive(Debug, Clone, Copy)]
pub enum Activations<'a> {
    /// `m × K / 32` blocks, row-major.
    Q8_0(&'a [BlockQ8_0]),
    /// `m × K` values, row-major.
    F32(&'a [f32]),
}

/// Inputs of one kernel call.
#[derive(Debug, Clone)]
pub struct KernelArgs<'a> {
    /// The whole weight tensor: packed tiles for quantized kinds, generic
    /// rows for float kinds.
    pub weight: &'a [u8],
    pub act: Activations<'a>,
    /// Activation rows.
    pub m: usize,
    /// Reduction length.
    pub k: usize,
    /// N-tiles to compute, in units of `TILE_N` outputs.
    pub tiles: Range<usize>,
}

impl KernelArgs<'_> {
    /// Outputs per activation row covered by this call.
    pub fn width(&self) -> usize {
        self.tiles.len() * TILE_N
    }
}

/// A kernel. Writes `m × width` outputs row-major into the output slice.
pub type KernelFn = fn(&mut TileContext, &KernelArgs<'_>, &mut [f32]);

/// Finds the kernel for `key`.
pub fn lookup(key: KernelKey) -> Option<KernelFn> {
    use DType::{BF16, F16, F32, Q4_0, Q4_1, Q8_0};
    use KernelShape::{Gemm, Gemv};
    let kernel: KernelFn = match (key.shape, key.weight, key.activation) {
        (Gemv, Q4_0, Q8_0) => gemv::q4_0,
        (Gemv, Q4_1, Q8_0) => gemv::q4_1,
        (Gemv, Q8_0, Q8_0) => gemv::q8_0,
        (Gemm, Q4_0, Q8_0) => gemm::q4_0,
        (Gemm, Q4_1, Q8_0) => gemm::q4_1,
        (Gemm, Q8_0, Q8_0) => gemm::q8_0,
        (Gemv, F16, F32) => float::gemv_f16,
        (Gemv, BF16, F32) => float::gemv_bf16,
        (Gemm, F16, F32) => float::gemm_f16,
        (Gemm, BF16, F32) => float::gemm_bf16,
        _ => return None,
    };
    Some(kernel)
}

/// A packed quantized tile, decoded for the inner loops.
pub(crate) struct WeightTile {
    /// Quants in B-tile order.
    pub quants: [u8; VNNI_BYTES],
    pub scales: [f32; TILE_N],
    pub mins: [f32; TILE_N],
    pub comp: [i32; TILE_N],
}

impl WeightTile {
    pub fn decode(dtype: DType, tile: &[u8]) -> Self {
        let mut decoded = Self {
            quants: [0; VNNI_BYTES],
            scales: [0.0; TILE_N],
            mins: [0.0; TILE_N],
            comp: [0; TILE_N],
        };
        match dtype {
            DType::Q4_0 => {
                decoded.quants = q4_0::quants(tile);
                decoded.scales = q4_0::scales(tile);
            }
            DType::Q4_1 => {
                decoded.quants = q4_1::quants(tile);
                decoded.scales = q4_1::scales(tile);
                decoded.mins = q4_1::mins(tile);
            }
            DType::Q8_0 => {
                decoded.quants.copy_from_slice(q8_0::quants(tile));
                decoded.scales = q8_0::scales(tile);
                decoded.comp = q8_0::compensation_terms(tile);
            }
            DType::F32 | DType::F16 | DType::BF16 => {}
        }
        decoded
    }

    /// Dequantizes a raw integer product for output `n`.
    ///
    /// `raw` is `Σ q_w · q_a` with unsigned nibbles for 4-bit kinds and
    /// signed bytes for Q8_0. `sum_a` is the activation block's quant sum.
    pub fn dequant(&self, dtype: DType, n: usize, raw: i32, d_a: f32, sum_a: i32) -> f32 {
        match dtype {
            DType::Q4_0 => (self.scales[n] * d_a) * (raw - 8 * sum_a) as f32,
            DType::Q4_1 => (self.scales[n] * d_a) * raw as f32 + self.mins[n] * (d_a * sum_a as f32),
            _ => (self.scales[n] * d_a) * raw as f32,
        }
    }
}

/// Tile `(nb, kb)` of packed `dtype` weights with `kb_count` K-blocks.
pub(crate) fn weight_tile(dtype: DType, weight: &[u8], kb_count: usize, nb: usize, kb: usize) -> WeightTile {
    let bytes = pack::tile_bytes(dtype).unwrap_or(0);
    WeightTile::decode(dtype, pack::tile(weight, bytes, kb_count, nb, kb))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_matrix() {
        for shape in [KernelShape::Gemv, KernelShape::Gemm] {
            for w in [DType::Q4_0, DType::Q4_1, DType::Q8_0] {
                let key = KernelKey { shape, weight: w, activation: DType::Q8_0 };
                assert!(lookup(key).is_some(), "{key:?}");
                let f32_act = KernelKey { activation: DType::F32, ..key };
                assert!(lookup(f32_act).is_none(), "{f32_act:?}");
            }
            for w in [DType::F16, DType::BF16] {
                assert!(lookup(KernelKey { shape, weight: w, activation: DType::F32 }).is_some());
            }
            assert!(lookup(KernelKey { shape, weight: DType::F32, activation: DType::F32 }).is_none());
        }
    }

    #[test]
    fn test_shape_threshold() {
        assert_eq!(KernelShape::for_rows(1), KernelShape::Gemv);
        assert_eq!(KernelShape::for_rows(GEMV_MAX_ROWS), KernelShape::Gemv);
        assert_eq!(KernelShape::for_rows(GEMV_MAX_ROWS + 1), KernelShape::Gemm);
        assert_eq!(KernelKey::for_op(1, DType::F16).activation, DType::F32);
        assert_eq!(KernelKey::for_op(1, DType::Q4_1).activation, DType::Q8_0);
    }
}
