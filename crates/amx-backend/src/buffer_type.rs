// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT


//! The tile buffer type.
//!
//! Allocation is delegated to a host buffer type (plain or mirrored, per
//! configuration); the returned buffer is re-labelled with this type and
//! given [`AmxBufferInterface`] so packing and replication run on writes.

use crate::buffer::{AmxBufferInterface, AMX_BUFFER_NAME};
use crate::config::BackendConfig;
use crate::{mmq, pack, BackendError};
use hw_probe::{NumaTopology, TileEntitlement};
use memory_manager::AllocationStats;
use std::sync::Arc;
use tensor_core::backend::{
    Buffer, BufferType, ExtraBufferType, HostBufferType, TraitsHandle,
};
use tensor_core::{OpKind, Tensor, TensorError};
use tracing::{debug, info, warn};

/// Buffers whose packable weights are stored in the tile layout.
#[derive(Debug)]
pub struct AmxBufferType {
    host: HostBufferType,
    entitled: bool,
}

impl AmxBufferType {
    /// Builds the buffer type from `config`.
    ///
    /// # Errors
    /// [`BackendError::Unavailable`] when the configuration disables the
    /// backend, or when `entitlement` is refused and `emulate_tiles` is off.
    /// Configuration and allocator errors are passed through.
    pub fn new(config: &BackendConfig, entitlement: &dyn TileEntitlement) -> Result<Self, BackendError> {
        config.validate()?;
        if !config.enabled {
            return Err(BackendError::Unavailable("disabled by configuration".into()));
        }

        let entitled = match entitlement.request() {
            Ok(()) => true,
            Err(e) if config.emulate_tiles => {
                warn!(error = %e, "tile entitlement refused, running the software tile unit");
                false
            }
            Err(e) => return Err(BackendError::Unavailable(e.to_string())),
        };

        let host = match config.mirror_policy(&NumaTopology::global().node_ids())? {
            Some(policy) => HostBufferType::mirrored(config.alignment, policy)?,
            None => HostBufferType::new(config.alignment)?,
        };
        info!(
            alignment = config.alignment,
            mirrored = host.is_mirrored(),
            entitled,
            "tile buffer type ready"
        );
        Ok(Self { host, entitled })
    }

    /// Returns `true` if buffers are replicated per NUMA node.
    pub fn is_mirrored(&self) -> bool {
        self.host.is_mirrored()
    }

    /// Returns `true` if the OS granted tile register use.
    pub fn is_entitled(&self) -> bool {
        self.entitled
    }

    /// Allocation statistics so far.
    pub fn stats(&self) -> AllocationStats {
        self.host.stats()
    }
}

impl BufferType for AmxBufferType {
    fn name(&self) -> &'static str {
        AMX_BUFFER_NAME
    }

    fn alloc(&'static self, size: usize) -> Result<Buffer, TensorError> {
        let buffer = self
            .host
            .alloc(size)?
            .with_buffer_type(self)
            .with_interface(Arc::new(AmxBufferInterface));
        debug!(size, mirrored = buffer.is_mirrored(), "allocated tile buffer");
        Ok(buffer)
    }

    fn alignment(&self) -> usize {
        self.host.alignment()
    }

    fn alloc_size(&self, tensor: &Tensor) -> usize {
        if !pack::is_packable(tensor) {
            return tensor.nbytes();
        }
        let shape = tensor.shape();
        pack::packed_tensor_size(tensor.dtype(), shape.cols(), shape.rows()).unwrap_or(tensor.nbytes())
    }

    fn is_host(&self) -> bool {
        true
    }

    fn extra(&self) -> Option<&dyn ExtraBufferType> {
        Some(self)
    }
}

impl ExtraBufferType for AmxBufferType {
    fn supports_op(&self, op: &Tensor) -> bool {
        mmq::eligible(op, |buffer| buffer.is_of_type(self))
    }

    fn get_tensor_traits(&self, op: &Tensor) -> Option<TraitsHandle> {
        if op.op() != OpKind::MulMat {
            return None;
        }
        let weight = op.src(0)?;
        if !weight.buffer().is_some_and(|b| b.is_of_type(self)) {
            return None;
        }
        weight.extra()
    }
}
