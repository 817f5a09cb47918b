// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tile registers: geometry, configuration, and the execution unit.
//!
//! A tile is a 2-D register of up to 16 rows × 64 bytes. Before any tile
//! instruction runs, a worker loads a [`TileConfig`] describing the shape of
//! each of the eight slots; [`TileContext`] tracks the last loaded layout so
//! the reload happens only when the layout changes.

mod config;
mod context;
mod emulated;

pub use config::TileConfig;
pub use context::TileContext;
pub use emulated::EmulatedTiles;

/// Rows of an activation (A) and accumulator (C) tile.
pub const TILE_M: usize = 16;
/// Output features covered by one weight (B) tile.
pub const TILE_N: usize = 16;
/// Reduction elements covered by one INT8 tile step.
pub const TILE_K: usize = 32;
/// Bytes reduced per 32-bit lane by the INT8 dot-product instructions.
pub const VNNI_BLK: usize = 4;
/// Tile slots addressed by the kernels.
pub const NUM_TILES: usize = 8;
/// Maximum rows in a tile.
pub const MAX_ROWS: usize = 16;
/// Maximum bytes per tile row.
pub const MAX_COLSB: usize = 64;

/// The instructions the kernels issue against tile registers.
///
/// Operand indices name tile slots `0..NUM_TILES`. The INT8 products
/// accumulate `C[m][n] += Σ A[m][4k + i] · B[k][4n + i]` over 32-bit lanes;
/// the letter pair in the name gives the signedness of A then B.
pub trait TileUnit: Send {
    /// Loads a palette configuration, zeroing every tile.
    fn load_config(&mut self, config: &TileConfig);
    /// Returns the tile state to its initial, unconfigured form.
    fn release(&mut self);
    /// Zeroes tile `t`.
    fn zero(&mut self, t: usize);
    /// Loads tile `t` from `src`, rows `stride` bytes apart.
    fn load(&mut self, t: usize, src: &[u8], stride: usize);
    /// Stores tile `t` to `dst`, rows `stride` bytes apart.
    fn store(&self, t: usize, dst: &mut [u8], stride: usize);
    /// Signed × signed INT8 product.
    fn dpbssd(&mut self, c: usize, a: usize, b: usize);
    /// Signed × unsigned INT8 product.
    fn dpbsud(&mut self, c: usize, a: usize, b: usize);
    /// Unsigned × signed INT8 product.
    fn dpbusd(&mut self, c: usize, a: usize, b: usize);
    /// Unsigned × unsigned INT8 product.
    fn dpbuud(&mut self, c: usize, a: usize, b: usize);
    /// BF16 pair product accumulated into `f32` lanes.
    fn dpbf16ps(&mut self, c: usize, a: usize, b: usize);
}
