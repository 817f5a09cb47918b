// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-worker tile state.

use super::{EmulatedTiles, TileConfig, TileUnit};

/// A worker's tile unit plus the layout it last loaded.
///
/// Lives in the worker's [`tensor_core::backend::WorkerState`] for the
/// worker's lifetime, so layouts are only reloaded when they change.
pub struct TileContext {
    unit: Box<dyn TileUnit>,
    loaded: Option<TileConfig>,
    reloads: u64,
}

impl TileContext {
    /// Wraps a tile unit. Nothing is loaded until the first
    /// [`ensure_configured`](Self::ensure_configured).
    pub fn new(unit: Box<dyn TileUnit>) -> Self {
        Self {
            unit,
            loaded: None,
            reloads: 0,
        }
    }

    /// A context over the software tile unit.
    pub fn emulated() -> Self {
        Self::new(Box::new(EmulatedTiles::new()))
    }

    /// Loads `config` unless the same layout is already loaded.
    pub fn ensure_configured(&mut self, config: &TileConfig) {
        if self.loaded.is_some_and(|l| l.same_layout(config)) {
            return;
        }
        self.unit.load_config(config);
        self.loaded = Some(*config);
        self.reloads += 1;
        tracing::debug!(reloads = self.reloads, "loaded tile configuration");
    }

    /// The layout currently loaded, if any.
    pub fn loaded(&self) -> Option<&TileConfig> {
        self.loaded.as_ref()
    }

    /// Number of hardware reloads so far.
    pub fn reload_count(&self) -> u64 {
        self.reloads
    }

    /// Releases the tile state; the next use reloads.
    pub fn release(&mut self) {
        if self.loaded.take().is_some() {
            self.unit.release();
        }
    }

    /// The tile unit, for issuing instructions.
    pub fn unit(&mut self) -> &mut dyn TileUnit {
        self.unit.as_mut()
    }
}

impl Drop for TileContext {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for TileContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileContext")
            .field("loaded", &self.loaded.map(|c| c.palette))
            .field("reloads", &self.reloads)
            .finish()
    }
}
