// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Asymmetric 4-bit tiles.
//!
//! | bytes     | content                    |
//! |-----------|----------------------------|
//! | 0..256    | nibble-packed VNNI quants  |
//! | 256..288  | `d[16]` as `f16`           |
//! | 288..320  | `m[16]` as `f16`           |

use super::vnni::{self, NIBBLE_BYTES, VNNI_BYTES};
use super::{nibbles_to_qs, PackedTile};
use crate::tile::TILE_N;
use tensor_core::quant::BlockQ4_1;

const D_AT: usize = NIBBLE_BYTES;
const M_AT: usize = D_AT + TILE_N * 2;

/// Packed layout of Q4_1 weights.
pub struct Q4_1Tile;

impl PackedTile for Q4_1Tile {
    type Block = BlockQ4_1;
    const TILE_BYTES: usize = M_AT + TILE_N * 2;

    fn pack(rows: &[BlockQ4_1; TILE_N], dst: &mut [u8]) {
        let values = rows.map(|b| std::array::from_fn(|k| b.nibble(k)));
        dst[..D_AT].copy_from_slice(&vnni::pack_nibbles(&vnni::interleave(&values)));
        vnni::write_f16s(&mut dst[D_AT..M_AT], rows.iter().map(|b| b.d));
        vnni::write_f16s(&mut dst[M_AT..Self::TILE_BYTES], rows.iter().map(|b| b.m));
    }

    fn unpack(src: &[u8]) -> [BlockQ4_1; TILE_N] {
        let values = vnni::deinterleave(&vnni::unpack_nibbles(&src[..D_AT]));
        let d = vnni::read_f16s(&src[D_AT..]);
        let m = vnni::read_f16s(&src[M_AT..]);
        std::array::from_fn(|n| BlockQ4_1 {
            d: d[n],
            m: m[n],
            qs: nibbles_to_qs(&values[n]),
        })
    }
}

/// The tile's quants in B-tile order, one unsigned value per byte.
pub fn quants(tile: &[u8]) -> [u8; VNNI_BYTES] {
    vnni::unpack_nibbles(&tile[..D_AT])
}

/// Per-row scales.
pub fn scales(tile: &[u8]) -> [f32; TILE_N] {
    vnni::read_f16s(&tile[D_AT..]).map(|d| d.to_f32())
}

/// Per-row minimums.
pub fn mins(tile: &[u8]) -> [f32; TILE_N] {
    vnni::read_f16s(&tile[M_AT..]).map(|m| m.to_f32())
}
