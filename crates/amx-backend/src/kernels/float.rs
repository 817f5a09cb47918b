// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Kernels for 16-bit float weights against `f32` activations.
//!
//! Weights keep their generic row layout. The vector kernel widens to `f32`
//! and reduces directly; the tile kernel rounds both operands to BF16 and
//! accumulates in `f32` with the BF16 pair product, so F16 weights lose
//! mantissa bits on that path.

use super::{Activations, KernelArgs};
use crate::tile::{TileConfig, TileContext, MAX_COLSB, MAX_ROWS, TILE_M, TILE_N};
use half::{bf16, f16};
use tensor_core::DType;

const TMM_B: usize = 0;
const TMM_A: usize = 2;
const TMM_C: usize = 4;
/// Reduction elements per BF16 tile step: 16 pairs.
const K_STEP: usize = 2 * MAX_ROWS;

pub(super) fn gemv_f16(_ctx: &mut TileContext, args: &KernelArgs<'_>, out: &mut [f32]) {
    gemv(DType::F16, args, out);
}

pub(super) fn gemv_bf16(_ctx: &mut TileContext, args: &KernelArgs<'_>, out: &mut [f32]) {
    gemv(DType::BF16, args, out);
}

pub(super) fn gemm_f16(ctx: &mut TileContext, args: &KernelArgs<'_>, out: &mut [f32]) {
    gemm(DType::F16, ctx, args, out);
}

pub(super) fn gemm_bf16(ctx: &mut TileContext, args: &KernelArgs<'_>, out: &mut [f32]) {
    gemm(DType::BF16, ctx, args, out);
}

fn weight_at(dtype: DType, weight: &[u8], idx: usize) -> f32 {
    let bytes = [weight[2 * idx], weight[2 * idx + 1]];
    match dtype {
        DType::BF16 => bf16::from_le_bytes(bytes).to_f32(),
        _ => f16::from_le_bytes(bytes).to_f32(),
    }
}

fn gemv(dtype: DType, args: &KernelArgs<'_>, out: &mut [f32]) {
    let Activations::F32(x) = args.act else {
        return;
    };
    let (k, width) = (args.k, args.width());
    for m in 0..args.m {
        let xr = &x[m * k..(m + 1) * k];
        for (j, n) in (args.tiles.start * TILE_N..args.tiles.end * TILE_N).enumerate() {
            out[m * width + j] = xr
                .iter()
                .enumerate()
                .map(|(kk, &v)| v * weight_at(dtype, args.weight, n * k + kk))
                .sum();
        }
    }
}

fn gemm(dtype: DType, ctx: &mut TileContext, args: &KernelArgs<'_>, out: &mut [f32]) {
    let Activations::F32(x) = args.act else {
        return;
    };
    ctx.ensure_configured(&TileConfig::bf16());
    let (k, width) = (args.k, args.width());
    let k_steps = k.div_ceil(K_STEP);

    for m0 in (0..args.m).step_by(TILE_M) {
        let rows = (args.m - m0).min(TILE_M);
        // A tiles: row r holds 32 consecutive BF16 activations.
        let a_tiles: Vec<[u8; TILE_M * MAX_COLSB]> = (0..k_steps)
            .map(|ks| {
                let mut a = [0u8; TILE_M * MAX_COLSB];
                for r in 0..rows {
                    for i in 0..K_STEP.min(k - ks * K_STEP) {
                        let v = bf16::from_f32(x[(m0 + r) * k + ks * K_STEP + i]);
                        a[r * MAX_COLSB + 2 * i..r * MAX_COLSB + 2 * i + 2].copy_from_slice(&v.to_le_bytes());
                    }
                }
                a
            })
            .collect();

        for (j, nb) in args.tiles.clone().enumerate() {
            ctx.unit().zero(TMM_C);
            for (ks, a) in a_tiles.iter().enumerate() {
                // B tile: row p holds the pair (2p, 2p + 1) for each of 16 outputs.
                let mut b = [0u8; MAX_ROWS * MAX_COLSB];
                for n in 0..TILE_N {
                    let row = nb * TILE_N + n;
                    for kk in 0..K_STEP.min(k - ks * K_STEP) {
                        let v = bf16::from_f32(weight_at(dtype, args.weight, row * k + ks * K_STEP + kk));
                        let at = (kk / 2) * MAX_COLSB + n * 4 + (kk % 2) * 2;
                        b[at..at + 2].copy_from_slice(&v.to_le_bytes());
                    }
                }
                let unit = ctx.unit();
                unit.load(TMM_A, a, MAX_COLSB);
                unit.load(TMM_B, &b, MAX_COLSB);
                unit.dpbf16ps(TMM_C, TMM_A, TMM_B);
            }
            let mut c = [0u8; TILE_M * MAX_COLSB];
            ctx.unit().store(TMM_C, &mut c, MAX_COLSB);
            for r in 0..rows {
                for n in 0..TILE_N {
                    let at = r * MAX_COLSB + n * 4;
                    out[(m0 + r) * width + j * TILE_N + n] =
                        f32::from_le_bytes([c[at], c[at + 1], c[at + 2], c[at + 3]]);
                }
            }
        }
    }
}
