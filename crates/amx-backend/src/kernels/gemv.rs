// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Vector kernels for quantized weights.
//!
//! Each activation row is reduced against a tile's 16 outputs at once with
//! the unsigned × signed lane product:
//! - 4-bit weights are the unsigned operand, activations the signed one;
//! - Q8_0 weights are signed, so the activations are offset by `0x80` to
//!   become the unsigned operand and the tile's compensation is subtracted.

use super::vnni::{broadcast, dpbusd};
use super::{weight_tile, Activations, KernelArgs};
use crate::pack::vnni::VNNI_ROW;
use crate::tile::{TileContext, TILE_K, TILE_N, VNNI_BLK};
use tensor_core::DType;

pub(super) fn q4_0(_ctx: &mut TileContext, args: &KernelArgs<'_>, out: &mut [f32]) {
    quantized(DType::Q4_0, args, out);
}

pub(super) fn q4_1(_ctx: &mut TileContext, args: &KernelArgs<'_>, out: &mut [f32]) {
    quantized(DType::Q4_1, args, out);
}

pub(super) fn q8_0(_ctx: &mut TileContext, args: &KernelArgs<'_>, out: &mut [f32]) {
    quantized(DType::Q8_0, args, out);
}

fn quantized(dtype: DType, args: &KernelArgs<'_>, out: &mut [f32]) {
    let Activations::Q8_0(act) = args.act else {
        return;
    };
    let kb_count = args.k / TILE_K;
    let width = args.width();
    out[..args.m * width].fill(0.0);

    for (j, nb) in args.tiles.clone().enumerate() {
        for kb in 0..kb_count {
            let w = weight_tile(dtype, args.weight, kb_count, nb, kb);
            for m in 0..args.m {
                let a = &act[m * kb_count + kb];
                let mut acc = [0i32; TILE_N];
                for kq in 0..TILE_K / VNNI_BLK {
                    let quad = &a.qs[kq * VNNI_BLK..(kq + 1) * VNNI_BLK];
                    let row = &w.quants[kq * VNNI_ROW..(kq + 1) * VNNI_ROW];
                    if dtype == DType::Q8_0 {
                        let shifted: [u8; VNNI_BLK] = std::array::from_fn(|i| quad[i] as u8 ^ 0x80);
                        dpbusd(&mut acc, &broadcast(&shifted), bytemuck::cast_slice(row));
                    } else {
                        dpbusd(&mut acc, row, &broadcast(quad));
                    }
                }
                let (d_a, sum_a) = (a.d.to_f32(), a.qsum());
                let dst = &mut out[m * width + j * TILE_N..m * width + (j + 1) * TILE_N];
                for (n, (o, raw)) in dst.iter_mut().zip(acc).enumerate() {
                    let raw = if dtype == DType::Q8_0 { raw - w.comp[n] } else { raw };
                    *o += w.dequant(dtype, n, raw, d_a, sum_a);
                }
            }
        }
    }
}
