// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Buffers, buffer types and the capability extension point.
//!
//! # Object Model
//!
//! ```text
//!  BufferType (factory, 'static) ──alloc──► Buffer ──owns──► BufferStorage
//!       │                                     │
//!       │ extra()                             │ iface: Arc<dyn BufferInterface>
//!       ▼                                     ▼
//!  ExtraBufferType                     init_tensor ──► Tensor.extra = TraitsHandle
//!   supports_op / get_tensor_traits                         │
//!                                                           ▼
//!                                    dispatcher ──► TensorTraits::compute_forward
//! ```
//!
//! A backend opts into the generic dispatcher by attaching a
//! [`TraitsHandle`] to tensors it allocates. The dispatcher never knows which
//! backend it is talking to.

mod alloc;
mod buffer;
mod buffer_type;
mod host;
mod traits;

pub use alloc::alloc_tensors;
pub use buffer::{Buffer, BufferInterface, BufferUsage, HostBufferInterface};
pub use buffer_type::{same_buffer_type, BufferType, TENSOR_ALIGNMENT};
pub use host::{cpu_buffer_type, HostBufferType};
pub use traits::{
    capability_for, extra_compute_forward, extra_work_size, ComputeParams, ExtraBufferType,
    TensorTraits, TraitsHandle, WorkerState,
};
