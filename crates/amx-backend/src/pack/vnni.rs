// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Byte shuffles shared by the packed layouts.
//!
//! A weight tile covers 16 output rows × 32 reduction elements. The tile
//! instructions consume it "VNNI ordered": row `kq` of the B tile holds, for
//! each output `n`, the four consecutive elements `4·kq .. 4·kq + 4`. So
//!
//! ```text
//! vnni[kq * 64 + n * 4 + b] = rows[n][4 * kq + b]
//! ```
//!
//! which is an 8×8 transpose of 32-bit lanes, done once for rows 0..8 (at
//! byte 0 of each 64-byte row) and once for rows 8..16 (at byte 32).

use crate::tile::{TILE_K, TILE_N, VNNI_BLK};
use half::f16;

/// Bytes of one tile of 8-bit values in VNNI order.
pub const VNNI_BYTES: usize = TILE_N * TILE_K;
/// Bytes of one tile of 4-bit values after nibble packing.
pub const NIBBLE_BYTES: usize = VNNI_BYTES / 2;
/// Bytes per VNNI row (one 32-bit lane per output).
pub const VNNI_ROW: usize = TILE_N * VNNI_BLK;

const LANES: usize = 8;

/// Transposes an 8×8 matrix of 32-bit lanes.
pub fn transpose_8x8(m: &[[u32; LANES]; LANES]) -> [[u32; LANES]; LANES] {
    std::array::from_fn(|i| std::array::from_fn(|j| m[j][i]))
}

/// Reorders 16 rows of 32 values into VNNI order.
pub fn interleave(rows: &[[u8; TILE_K]; TILE_N]) -> [u8; VNNI_BYTES] {
    let mut out = [0u8; VNNI_BYTES];
    for half in 0..TILE_N / LANES {
        let lanes: [[u32; LANES]; LANES] = std::array::from_fn(|r| {
            let row = &rows[half * LANES + r];
            std::array::from_fn(|q| lane(&row[q * VNNI_BLK..]))
        });
        let t = transpose_8x8(&lanes);
        for (kq, quads) in t.iter().enumerate() {
            for (r, quad) in quads.iter().enumerate() {
                let at = kq * VNNI_ROW + half * (VNNI_ROW / 2) + r * VNNI_BLK;
                out[at..at + VNNI_BLK].copy_from_slice(&quad.to_le_bytes());
            }
        }
    }
    out
}

/// Inverse of [`interleave`].
pub fn deinterleave(vnni: &[u8]) -> [[u8; TILE_K]; TILE_N] {
    let mut rows = [[0u8; TILE_K]; TILE_N];
    for (n, row) in rows.iter_mut().enumerate() {
        for kq in 0..TILE_K / VNNI_BLK {
            let at = kq * VNNI_ROW + n * VNNI_BLK;
            row[kq * VNNI_BLK..(kq + 1) * VNNI_BLK].copy_from_slice(&vnni[at..at + VNNI_BLK]);
        }
    }
    rows
}

/// Packs pairs of VNNI rows into one row of nibbles: row `2p` fills the low
/// nibbles and row `2p + 1` the high nibbles of output row `p`.
pub fn pack_nibbles(vnni: &[u8; VNNI_BYTES]) -> [u8; NIBBLE_BYTES] {
    let mut out = [0u8; NIBBLE_BYTES];
    for (p, dst) in out.chunks_exact_mut(VNNI_ROW).enumerate() {
        let lo = &vnni[2 * p * VNNI_ROW..(2 * p + 1) * VNNI_ROW];
        let hi = &vnni[(2 * p + 1) * VNNI_ROW..(2 * p + 2) * VNNI_ROW];
        for ((d, &l), &h) in dst.iter_mut().zip(lo).zip(hi) {
            *d = (l & 0x0F) | (h << 4);
        }
    }
    out
}

/// Inverse of [`pack_nibbles`].
pub fn unpack_nibbles(packed: &[u8]) -> [u8; VNNI_BYTES] {
    let mut out = [0u8; VNNI_BYTES];
    for (p, src) in packed[..NIBBLE_BYTES].chunks_exact(VNNI_ROW).enumerate() {
        for (i, &byte) in src.iter().enumerate() {
            out[2 * p * VNNI_ROW + i] = byte & 0x0F;
            out[(2 * p + 1) * VNNI_ROW + i] = byte >> 4;
        }
    }
    out
}

/// Writes one `f16` per output row.
pub fn write_f16s(dst: &mut [u8], values: impl IntoIterator<Item = f16>) {
    for (chunk, v) in dst.chunks_exact_mut(2).zip(values) {
        chunk.copy_from_slice(&v.to_le_bytes());
    }
}

/// Reads one `f16` per output row.
pub fn read_f16s(src: &[u8]) -> [f16; TILE_N] {
    std::array::from_fn(|n| f16::from_le_bytes([src[2 * n], src[2 * n + 1]]))
}

fn lane(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rows() -> [[u8; TILE_K]; TILE_N] {
        std::array::from_fn(|n| std::array::from_fn(|k| (n * TILE_K + k) as u8))
    }

    #[test]
    fn test_interleave_places_quads() {
        let rows = sample_rows();
        let v = interleave(&rows);
        for kq in 0..8 {
            for n in 0..16 {
                for b in 0..4 {
                    assert_eq!(v[kq * 64 + n * 4 + b], rows[n][4 * kq + b]);
                }
            }
        }
    }

    #[test]
    fn test_deinterleave_inverts() {
        let rows = sample_rows();
        assert_eq!(deinterleave(&interleave(&rows)), rows);
    }

    #[test]
    fn test_transpose_is_involution() {
        let m: [[u32; 8]; 8] = std::array::from_fn(|i| std::array::from_fn(|j| (i * 8 + j) as u32));
        assert_eq!(transpose_8x8(&transpose_8x8(&m)), m);
        assert_eq!(transpose_8x8(&m)[2][5], m[5][2]);
    }

    #[test]
    fn test_nibble_pairs() {
        let mut v = [0u8; VNNI_BYTES];
        v[3] = 0x5;
        v[64 + 3] = 0xA;
        v[2 * 64] = 0xF;
        let p = pack_nibbles(&v);
        assert_eq!(p[3], 0xA5);
        assert_eq!(p[64], 0x0F);
        assert_eq!(unpack_nibbles(&p), v);
    }
}
