// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT


//! Subcommands and the helpers they share.

pub mod bench;
pub mod pack;
pub mod selftest;
pub mod status;

use amx_backend::{gate, AmxBufferType, BackendConfig};
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tensor_core::backend::{alloc_tensors, cpu_buffer_type, BufferType, BufferUsage};
use tensor_core::{DType, Shape, Tensor};
use tracing_subscriber::EnvFilter;

/// Installs the log subscriber. `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// The configuration file, or the defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<BackendConfig> {
    match path {
        Some(path) => BackendConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(BackendConfig::default()),
    }
}

/// Installs the configuration and returns the tile buffer type.
///
/// Without a configuration file the backend is switched on with the
/// software tile unit allowed, so the commands work on any host.
pub fn backend(path: Option<&Path>) -> anyhow::Result<&'static AmxBufferType> {
    let config = match path {
        Some(_) => load_config(path)?,
        None => BackendConfig {
            enabled: true,
            emulate_tiles: true,
            ..BackendConfig::default()
        },
    };
    gate::configure(config)?;
    gate::amx_buffer_type()
        .context("tile backend unavailable for this configuration; see `amx-rt status`")
}

/// Places an `n × k` weight tensor in `buft` and writes `data` into it.
pub fn weight_tensor(
    buft: &'static dyn BufferType,
    dtype: DType,
    n: usize,
    k: usize,
    data: &[u8],
) -> anyhow::Result<Arc<Tensor>> {
    let mut w = Tensor::new(format!("w.{dtype}"), dtype, Shape::matrix(n, k))?;
    let buffer = alloc_tensors(buft, &mut [&mut w])?;
    buffer.set_usage(BufferUsage::Weights)?;
    w.set_data(data)?;
    Ok(Arc::new(w))
}

/// Builds `x · wᵀ` with host activations and output.
pub fn matmul(weight: &Arc<Tensor>, m: usize, x: &[f32]) -> anyhow::Result<Tensor> {
    let mut act = Tensor::new("x", DType::F32, Shape::matrix(m, weight.shape().cols()))?;
    alloc_tensors(cpu_buffer_type(), &mut [&mut act])?;
    act.set_f32(x)?;
    let mut y = Tensor::mul_mat("y", Arc::clone(weight), Arc::new(act))?;
    alloc_tensors(cpu_buffer_type(), &mut [&mut y])?;
    Ok(y)
}

/// Deterministic values in `[-1, 1]`.
pub fn synthetic(len: usize, seed: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (((i * 31 + seed * 17) % 41) as f32 - 20.0) / 20.0)
        .collect()
}

/// Largest absolute difference between two equally long slices.
pub fn max_abs_diff(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f32::max)
}
