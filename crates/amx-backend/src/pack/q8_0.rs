// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Symmetric 8-bit tiles with signed-product compensation.
//!
//! | bytes     | content                         |
//! |-----------|---------------------------------|
//! | 0..512    | VNNI quants (signed)            |
//! | 512..544  | `d[16]` as `f16`                |
//! | 544..608  | `comp[16]` as `i32`             |
//!
//! The vector reduction multiplies an unsigned operand by a signed one. To
//! feed it signed activations they are offset by `0x80`, which adds
//! `128 · Σ_k B[n][k]` to output `n`; that sum is `comp[n]`, subtracted from
//! the raw accumulator during dequantization.

use super::vnni::{self, VNNI_BYTES, VNNI_ROW};
use super::PackedTile;
use crate::tile::{TILE_K, TILE_N, VNNI_BLK};
use tensor_core::quant::BlockQ8_0;

const D_AT: usize = VNNI_BYTES;
const COMP_AT: usize = D_AT + TILE_N * 2;

/// Packed layout of Q8_0 weights.
pub struct Q8_0Tile;

impl PackedTile for Q8_0Tile {
    type Block = BlockQ8_0;
    const TILE_BYTES: usize = COMP_AT + TILE_N * 4;

    fn pack(rows: &[BlockQ8_0; TILE_N], dst: &mut [u8]) {
        let values = rows.map(|b| b.qs.map(|q| q as u8));
        let v = vnni::interleave(&values);
        dst[..D_AT].copy_from_slice(&v);
        vnni::write_f16s(&mut dst[D_AT..COMP_AT], rows.iter().map(|b| b.d));
        for (n, chunk) in dst[COMP_AT..Self::TILE_BYTES].chunks_exact_mut(4).enumerate() {
            chunk.copy_from_slice(&compensation(&v, n).to_le_bytes());
        }
    }

    fn unpack(src: &[u8]) -> [BlockQ8_0; TILE_N] {
        let values = vnni::deinterleave(&src[..D_AT]);
        let d = vnni::read_f16s(&src[D_AT..]);
        std::array::from_fn(|n| BlockQ8_0 {
            d: d[n],
            qs: values[n].map(|q| q as i8),
        })
    }
}

/// `Σ_k 0x80 · B[n][k]`: the 0x80 vector reduced against output `n`.
fn compensation(vnni: &[u8], n: usize) -> i32 {
    (0..TILE_K / VNNI_BLK)
        .flat_map(|kq| {
            let at = kq * VNNI_ROW + n * VNNI_BLK;
            vnni[at..at + VNNI_BLK].iter().copied()
        })
        .map(|b| 0x80 * b as i8 as i32)
        .sum()
}

/// The tile's quants in B-tile order, as stored (signed bytes).
pub fn quants(tile: &[u8]) -> &[u8] {
    &tile[..D_AT]
}

/// Per-row scales.
pub fn scales(tile: &[u8]) -> [f32; TILE_N] {
    vnni::read_f16s(&tile[D_AT..]).map(|d| d.to_f32())
}

/// Per-row compensation terms.
pub fn compensation_terms(tile: &[u8]) -> [i32; TILE_N] {
    std::array::from_fn(|n| {
        let at = COMP_AT + 4 * n;
        i32::from_le_bytes([tile[at], tile[at + 1], tile[at + 2], tile[at + 3]])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;

    fn tile_of(q: i8) -> [u8; 608] {
        let rows = [BlockQ8_0 {
            d: f16::ONE,
            qs: [q; 32],
        }; TILE_N];
        let mut tile = [0u8; 608];
        Q8_0Tile::pack(&rows, &mut tile);
        tile
    }

    #[test]
    fn test_tile_size() {
        assert_eq!(Q8_0Tile::TILE_BYTES, 608);
    }

    #[test]
    fn test_compensation_boundaries() {
        assert_eq!(compensation_terms(&tile_of(0)), [0; 16]);
        assert_eq!(compensation_terms(&tile_of(-1)), [-4096; 16]);
        assert_eq!(compensation_terms(&tile_of(1)), [4096; 16]);
    }

    #[test]
    fn test_compensation_per_row() {
        let rows: [BlockQ8_0; TILE_N] = std::array::from_fn(|n| BlockQ8_0 {
            d: f16::ONE,
            qs: std::array::from_fn(|k| if k == 0 { n as i8 } else { 0 }),
        });
        let mut tile = [0u8; 608];
        Q8_0Tile::pack(&rows, &mut tile);
        let comp = compensation_terms(&tile);
        for (n, c) in comp.iter().enumerate() {
            assert_eq!(*c, 128 * n as i32);
        }
        assert_eq!(Q8_0Tile::unpack(&tile), rows);
    }
}
