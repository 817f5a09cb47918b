// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tile kernels for quantized weights.
//!
//! Per block of up to 16 activation rows and per K-block, the activation
//! quants go to an A tile (TMM2) and each weight tile to a B tile (TMM0); a
//! single INT8 tile product lands in an accumulator (TMM4), which is then
//! dequantized with the block's scales. Rows past `m` are zero padding.

use super::{weight_tile, Activations, KernelArgs};
use crate::tile::{TileConfig, TileContext, MAX_COLSB, TILE_K, TILE_M, TILE_N, VNNI_BLK};
use tensor_core::DType;

const TMM_B: usize = 0;
const TMM_A: usize = 2;
const TMM_C: usize = 4;

pub(super) fn q4_0(ctx: &mut TileContext, args: &KernelArgs<'_>, out: &mut [f32]) {
    quantized(DType::Q4_0, ctx, args, out);
}

pub(super) fn q4_1(ctx: &mut TileContext, args: &KernelArgs<'_>, out: &mut [f32]) {
    quantized(DType::Q4_1, ctx, args, out);
}

pub(super) fn q8_0(ctx: &mut TileContext, args: &KernelArgs<'_>, out: &mut [f32]) {
    quantized(DType::Q8_0, ctx, args, out);
}

fn quantized(dtype: DType, ctx: &mut TileContext, args: &KernelArgs<'_>, out: &mut [f32]) {
    let Activations::Q8_0(act) = args.act else {
        return;
    };
    ctx.ensure_configured(&TileConfig::int8());
    let kb_count = args.k / TILE_K;
    let width = args.width();
    out[..args.m * width].fill(0.0);

    for m0 in (0..args.m).step_by(TILE_M) {
        let rows = (args.m - m0).min(TILE_M);
        for kb in 0..kb_count {
            let mut a_tile = [0u8; TILE_M * TILE_K];
            let mut d_a = [0.0f32; TILE_M];
            let mut sum_a = [0i32; TILE_M];
            for r in 0..rows {
                let block = &act[(m0 + r) * kb_count + kb];
                a_tile[r * TILE_K..(r + 1) * TILE_K].copy_from_slice(bytemuck::cast_slice(&block.qs[..]));
                d_a[r] = block.d.to_f32();
                sum_a[r] = block.qsum();
            }
            ctx.unit().load(TMM_A, &a_tile, TILE_K);

            for (j, nb) in args.tiles.clone().enumerate() {
                let w = weight_tile(dtype, args.weight, kb_count, nb, kb);
                let unit = ctx.unit();
                unit.load(TMM_B, &w.quants, TILE_N * VNNI_BLK);
                unit.zero(TMM_C);
                if dtype == DType::Q8_0 {
                    unit.dpbssd(TMM_C, TMM_A, TMM_B);
                } else {
                    unit.dpbsud(TMM_C, TMM_A, TMM_B);
                }
                let mut c = [0u8; TILE_M * MAX_COLSB];
                unit.store(TMM_C, &mut c, MAX_COLSB);

                for r in 0..rows {
                    let dst = &mut out[(m0 + r) * width + j * TILE_N..(m0 + r) * width + (j + 1) * TILE_N];
                    for (n, o) in dst.iter_mut().enumerate() {
                        let at = r * MAX_COLSB + n * 4;
                        let raw = i32::from_le_bytes([c[at], c[at + 1], c[at + 2], c[at + 3]]);
                        *o += w.dequant(dtype, n, raw, d_a[r], sum_a[r]);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::{pack_weights, packed_tensor_size};
    use tensor_core::quant::{quantize_row, quantize_row_q8_0, vec_dot_q8_0};

    fn run(dtype: DType, m: usize, n: usize, k: usize) {
        let w: Vec<u8> = (0..n)
            .flat_map(|r| {
                let row: Vec<f32> = (0..k).map(|c| (((r * 3 + c * 11) % 29) as f32 - 14.0) * 0.1).collect();
                quantize_row(dtype, &row).unwrap()
            })
            .collect();
        let x: Vec<f32> = (0..m * k).map(|i| ((i * 5) % 23) as f32 * 0.05 - 0.5).collect();
        let act: Vec<_> = x.chunks(k).flat_map(quantize_row_q8_0).collect();
        let mut packed = vec![0u8; packed_tensor_size(dtype, k, n).unwrap()];
        pack_weights(dtype, &w, &mut packed, k, n).unwrap();

        // Second N-tile only.
        let args = KernelArgs {
            weight: &packed,
            act: Activations::Q8_0(&act),
            m,
            k,
            tiles: 1..2,
        };
        let mut ctx = TileContext::emulated();
        let mut out = vec![f32::NAN; m * TILE_N];
        quantized(dtype, &mut ctx, &args, &mut out);
        assert_eq!(ctx.reload_count(), 1);

        let row_bytes = dtype.row_size(k).unwrap();
        for (i, a) in act.chunks(k / TILE_K).enumerate() {
            for j in 0..TILE_N {
                let wr = &w[(TILE_N + j) * row_bytes..(TILE_N + j + 1) * row_bytes];
                let expected = vec_dot_q8_0(dtype, wr, a).unwrap();
                let got = out[i * TILE_N + j];
                assert!(
                    (got - expected).abs() <= 1e-4 * expected.abs().max(1.0),
                    "{dtype} [{i},{j}] {got} vs {expected}"
                );
            }
        }
    }

    #[test]
    fn test_q4_0_partial_row_block() {
        run(DType::Q4_0, 5, 32, 64);
    }

    #[test]
    fn test_q4_1_two_row_blocks() {
        run(DType::Q4_1, 20, 32, 64);
    }

    #[test]
    fn test_q8_0_uses_signed_product() {
        run(DType::Q8_0, 16, 32, 96);
    }
}
