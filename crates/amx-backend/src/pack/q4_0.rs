// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Symmetric 4-bit tiles.
//!
//! | bytes     | content                                   |
//! |-----------|-------------------------------------------|
//! | 0..256    | nibble-packed VNNI quants (unsigned 0..15) |
//! | 256..288  | `d[16]` as `f16`                          |

use super::vnni::{self, NIBBLE_BYTES, VNNI_BYTES};
use super::{nibbles_to_qs, PackedTile};
use crate::tile::TILE_N;
use tensor_core::quant::BlockQ4_0;

const D_AT: usize = NIBBLE_BYTES;

/// Packed layout of Q4_0 weights.
pub struct Q4_0Tile;

impl PackedTile for Q4_0Tile {
    type Block = BlockQ4_0;
    const TILE_BYTES: usize = D_AT + TILE_N * 2;

    fn pack(rows: &[BlockQ4_0; TILE_N], dst: &mut [u8]) {
        let values = rows.map(|b| std::array::from_fn(|k| b.nibble(k)));
        dst[..D_AT].copy_from_slice(&vnni::pack_nibbles(&vnni::interleave(&values)));
        vnni::write_f16s(&mut dst[D_AT..Self::TILE_BYTES], rows.iter().map(|b| b.d));
    }

    fn unpack(src: &[u8]) -> [BlockQ4_0; TILE_N] {
        let values = vnni::deinterleave(&vnni::unpack_nibbles(&src[..D_AT]));
        let d = vnni::read_f16s(&src[D_AT..]);
        std::array::from_fn(|n| BlockQ4_0 {
            d: d[n],
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

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;

    #[test]
    fn test_tile_size() {
        assert_eq!(Q4_0Tile::TILE_BYTES, 288);
    }

    #[test]
    fn test_scales_row_major() {
        let rows: [BlockQ4_0; TILE_N] = std::array::from_fn(|n| BlockQ4_0 {
            d: f16::from_f32(n as f32),
            qs: [n as u8; 16],
        });
        let mut tile = [0u8; 288];
        Q4_0Tile::pack(&rows, &mut tile);
        assert_eq!(scales(&tile)[7], 7.0);
        assert_eq!(Q4_0Tile::unpack(&tile), rows);
    }
}
