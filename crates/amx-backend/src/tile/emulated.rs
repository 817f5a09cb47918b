// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! A software model of the tile register file.
//!
//! Follows palette-1 semantics: eight tiles of up to 16 rows × 64 bytes,
//! shaped by the loaded configuration. Bytes beyond a tile's configured
//! rows and columns read as zero and are never written.

use super::{TileConfig, TileUnit, MAX_COLSB, MAX_ROWS, NUM_TILES};
use half::bf16;

const TILE_BYTES: usize = MAX_ROWS * MAX_COLSB;

/// Software tile registers.
#[derive(Clone)]
pub struct EmulatedTiles {
    regs: Vec<[u8; TILE_BYTES]>,
    config: TileConfig,
}

impl Default for EmulatedTiles {
    fn default() -> Self {
        Self::new()
    }
}

impl EmulatedTiles {
    /// An unconfigured register file.
    pub fn new() -> Self {
        Self {
            regs: vec![[0u8; TILE_BYTES]; NUM_TILES],
            config: TileConfig::default(),
        }
    }

    fn shape(&self, t: usize) -> (usize, usize) {
        (self.config.rows[t] as usize, self.config.colsb[t] as usize)
    }

    fn i32_at(&self, t: usize, m: usize, n: usize) -> i32 {
        let at = m * MAX_COLSB + n * 4;
        i32::from_le_bytes(self.regs[t][at..at + 4].try_into().unwrap_or([0; 4]))
    }

    fn set_i32(&mut self, t: usize, m: usize, n: usize, v: i32) {
        let at = m * MAX_COLSB + n * 4;
        self.regs[t][at..at + 4].copy_from_slice(&v.to_le_bytes());
    }

    fn dot_i8(&mut self, c: usize, a: usize, b: usize, a_signed: bool, b_signed: bool) {
        let widen = |v: u8, signed: bool| if signed { v as i8 as i32 } else { v as i32 };
        let (rows, c_cols) = self.shape(c);
        let (_, a_cols) = self.shape(a);
        let (b_rows, _) = self.shape(b);
        let steps = (a_cols / 4).min(b_rows);
        for m in 0..rows {
            for n in 0..c_cols / 4 {
                let mut acc = self.i32_at(c, m, n);
                for k in 0..steps {
                    for i in 0..4 {
                        let x = widen(self.regs[a][m * MAX_COLSB + 4 * k + i], a_signed);
                        let y = widen(self.regs[b][k * MAX_COLSB + 4 * n + i], b_signed);
                        acc = acc.wrapping_add(x * y);
                    }
                }
                self.set_i32(c, m, n, acc);
            }
        }
    }
}

impl TileUnit for EmulatedTiles {
    fn load_config(&mut self, config: &TileConfig) {
        self.config = *config;
        for reg in &mut self.regs {
            reg.fill(0);
        }
    }

    fn release(&mut self) {
        self.load_config(&TileConfig::default());
    }

    fn zero(&mut self, t: usize) {
        self.regs[t].fill(0);
    }

    fn load(&mut self, t: usize, src: &[u8], stride: usize) {
        let (rows, cols) = self.shape(t);
        for r in 0..rows {
            self.regs[t][r * MAX_COLSB..r * MAX_COLSB + cols]
                .copy_from_slice(&src[r * stride..r * stride + cols]);
        }
    }

    fn store(&self, t: usize, dst: &mut [u8], stride: usize) {
        let (rows, cols) = self.shape(t);
        for r in 0..rows {
            dst[r * stride..r * stride + cols]
                .copy_from_slice(&self.regs[t][r * MAX_COLSB..r * MAX_COLSB + cols]);
        }
    }

    fn dpbssd(&mut self, c: usize, a: usize, b: usize) {
        self.dot_i8(c, a, b, true, true);
    }

    fn dpbsud(&mut self, c: usize, a: usize, b: usize) {
        self.dot_i8(c, a, b, true, false);
    }

    fn dpbusd(&mut self, c: usize, a: usize, b: usize) {
        self.dot_i8(c, a, b, false, true);
    }

    fn dpbuud(&mut self, c: usize, a: usize, b: usize) {
        self.dot_i8(c, a, b, false, false);
    }

    fn dpbf16ps(&mut self, c: usize, a: usize, b: usize) {
        let half_at = |reg: &[u8; TILE_BYTES], at: usize| {
            bf16::from_le_bytes([reg[at], reg[at + 1]]).to_f32()
        };
        let (rows, c_cols) = self.shape(c);
        let (_, a_cols) = self.shape(a);
        let (b_rows, _) = self.shape(b);
        let steps = (a_cols / 4).min(b_rows);
        for m in 0..rows {
            for n in 0..c_cols / 4 {
                let mut acc = f32::from_bits(self.i32_at(c, m, n) as u32);
                for k in 0..steps {
                    for i in 0..2 {
                        let x = half_at(&self.regs[a], m * MAX_COLSB + 4 * k + 2 * i);
                        let y = half_at(&self.regs[b], k * MAX_COLSB + 4 * n + 2 * i);
                        acc += x * y;
                    }
                }
                self.set_i32(c, m, n, acc.to_bits() as i32);
            }
        }
    }
}

impl std::fmt::Debug for EmulatedTiles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmulatedTiles")
            .field("palette", &self.config.palette)
            .finish()
    }
}
