// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT


//! # amx-backend
//!
//! A tile-accelerated matrix-multiply backend for quantized weights.
//!
//! Weights placed in an [`AmxBufferType`] buffer are repacked on write into
//! the tile layout ([`pack`]), replicated per NUMA node when the buffer is a
//! read-only mirror ([`mirror`]), and tagged with the [`AmxTensorTraits`]
//! capability handle. The generic dispatcher then offers every multiply
//! against those weights to the tile kernels ([`kernels`]), which decline
//! anything they cannot compute exactly so the default path runs instead.
//!
//! # Pipeline
//!
//! ```text
//!  gate::amx_buffer_type()            load phase             compute phase
//!        │                               │                         │
//!        ▼                               ▼                         ▼
//!  AmxBufferType::alloc ──► set_tensor: pack ─► replicate ──► compute_forward
//!   (packed alloc_size)        (per replica, same offset)     ├ eligible?
//!                                                             ├ quantize A
//!                                                             ├ TileContext
//!                                                             └ GEMV / GEMM
//! ```
//!
//! # Example
//! ```no_run
//! use amx_backend::{gate, BackendConfig};
//!
//! gate::configure(BackendConfig { enabled: true, ..Default::default() })?;
//! match gate::amx_buffer_type() {
//!     Some(buft) => println!("tile buffers, mirrored: {}", buft.is_mirrored()),
//!     None => println!("default path only"),
//! }
//! # Ok::<(), amx_backend::BackendError>(())
//! ```

mod buffer;
mod buffer_type;
pub mod config;
mod error;
pub mod gate;
pub mod kernels;
pub mod mirror;
pub mod mmq;
pub mod pack;
pub mod tile;
mod traits;

pub use buffer::{AmxBufferInterface, AMX_BUFFER_NAME};
pub use buffer_type::AmxBufferType;
pub use config::BackendConfig;
pub use error::{BackendError, PackError};
pub use traits::{tensor_traits, AmxTensorTraits};
