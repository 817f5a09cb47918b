// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The 64-byte tile configuration record.

use super::{MAX_COLSB, MAX_ROWS, NUM_TILES, TILE_K, TILE_M, TILE_N, VNNI_BLK};

/// Size of the serialised configuration.
pub const CONFIG_BYTES: usize = 64;

/// Palette, start row, and per-slot shape of the tile registers.
///
/// Serialised layout (little-endian):
/// - byte 0: palette id
/// - byte 1: start row
/// - bytes 2..16: reserved, zero
/// - bytes 16..48: `colsb[16]` as `u16`
/// - bytes 48..64: `rows[16]` as `u8`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileConfig {
    pub palette: u8,
    pub start_row: u8,
    pub colsb: [u16; 16],
    pub rows: [u8; 16],
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            palette: 0,
            start_row: 0,
            colsb: [0; 16],
            rows: [0; 16],
        }
    }
}

impl TileConfig {
    /// Layout for INT8 kernels.
    ///
    /// - TMM0, TMM1: weight tiles, `TILE_K / VNNI_BLK` rows × 64 bytes
    /// - TMM2, TMM3: activation tiles, 16 rows × `TILE_K` bytes
    /// - TMM4..TMM7: accumulators, 16 rows × 16 `i32`
    pub fn int8() -> Self {
        let mut config = Self {
            palette: 1,
            ..Self::default()
        };
        config.set(0, TILE_K / VNNI_BLK, TILE_N * VNNI_BLK);
        config.set(1, TILE_K / VNNI_BLK, TILE_N * VNNI_BLK);
        config.set(2, TILE_M, TILE_K);
        config.set(3, TILE_M, TILE_K);
        for t in 4..NUM_TILES {
            config.set(t, TILE_M, TILE_N * 4);
        }
        config
    }

    /// Layout for BF16 kernels: every slot 16 rows × 64 bytes.
    pub fn bf16() -> Self {
        let mut config = Self {
            palette: 1,
            ..Self::default()
        };
        for t in 0..NUM_TILES {
            config.set(t, MAX_ROWS, MAX_COLSB);
        }
        config
    }

    /// Sets slot `t` to `rows` × `colsb`.
    pub fn set(&mut self, t: usize, rows: usize, colsb: usize) {
        debug_assert!(rows <= MAX_ROWS && colsb <= MAX_COLSB);
        self.rows[t] = rows as u8;
        self.colsb[t] = colsb as u16;
    }

    /// Whether `self` and `other` describe the same layout for the slots the
    /// kernels use.
    pub fn same_layout(&self, other: &Self) -> bool {
        self.palette == other.palette
            && self.rows[..NUM_TILES] == other.rows[..NUM_TILES]
            && self.colsb[..NUM_TILES] == other.colsb[..NUM_TILES]
    }

    /// Serialises to the 64-byte hardware record.
    pub fn to_bytes(&self) -> [u8; CONFIG_BYTES] {
        let mut out = [0u8; CONFIG_BYTES];
        out[0] = self.palette;
        out[1] = self.start_row;
        for (i, c) in self.colsb.iter().enumerate() {
            out[16 + 2 * i..18 + 2 * i].copy_from_slice(&c.to_le_bytes());
        }
        out[48..64].copy_from_slice(&self.rows);
        out
    }

    /// Parses the 64-byte hardware record. Reserved bytes are ignored.
    pub fn from_bytes(bytes: &[u8; CONFIG_BYTES]) -> Self {
        let mut config = Self {
            palette: bytes[0],
            start_row: bytes[1],
            ..Self::default()
        };
        for (i, c) in config.colsb.iter_mut().enumerate() {
            *c = u16::from_le_bytes([bytes[16 + 2 * i], bytes[17 + 2 * i]]);
        }
        config.rows.copy_from_slice(&bytes[48..64]);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int8_layout_bytes() {
        let bytes = TileConfig::int8().to_bytes();
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[1], 0);
        assert!(bytes[2..16].iter().all(|&b| b == 0));
        // colsb: 64, 64, 32, 32, 64 × 4
        assert_eq!(&bytes[16..20], &[64, 0, 64, 0]);
        assert_eq!(&bytes[20..24], &[32, 0, 32, 0]);
        assert_eq!(&bytes[24..26], &[64, 0]);
        assert_eq!(&bytes[48..56], &[8, 8, 16, 16, 16, 16, 16, 16]);
        assert!(bytes[56..64].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_bytes_roundtrip() {
        let config = TileConfig::bf16();
        assert_eq!(TileConfig::from_bytes(&config.to_bytes()), config);
    }

    #[test]
    fn test_same_layout_ignores_unused_slots() {
        let a = TileConfig::int8();
        let mut b = a;
        b.set(12, 4, 4);
        assert!(a.same_layout(&b));
        b.set(3, 8, 32);
        assert!(!a.same_layout(&b));
        assert!(!a.same_layout(&TileConfig::bf16()));
        assert!(!TileConfig::default().same_layout(&a));
    }
}
