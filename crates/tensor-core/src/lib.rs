// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! The generic tensor engine surface that compute backends plug into.
//!
//! This crate provides:
//! - [`DType`] and [`quant`] — element types and the quantization block
//!   layouts (`Q4_0`, `Q4_1`, `Q8_0`) with reference (de)quantization.
//! - [`Tensor`] / [`Shape`] — typed descriptors over buffer memory.
//! - [`backend`] — buffers, buffer types, and the tensor-traits capability
//!   mechanism backends use to take over operators.
//! - [`ops`] — the dispatcher and the default matmul it falls back to.
//! - [`ThreadedExecutor`] — runs an operator across worker threads, each
//!   with persistent state and private scratch.
//!
//! # Design Goals
//! - The dispatcher knows nothing about any backend; backends attach
//!   [`backend::TraitsHandle`]s to tensors they own.
//! - Declining is always safe: the default path reads weights through the
//!   owning buffer's interface, whatever layout they are stored in.
//! - Clean error types via `thiserror`.

pub mod backend;
mod dtype;
mod error;
mod exec;
pub mod ops;
pub mod quant;
mod shape;
mod tensor;

pub use dtype::DType;
pub use error::TensorError;
pub use exec::ThreadedExecutor;
pub use shape::Shape;
pub use tensor::{OpKind, Tensor};
