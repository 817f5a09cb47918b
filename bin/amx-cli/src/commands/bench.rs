// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT


//! `amx-rt bench` command: tile path against the reference path.
//!
//! The same weights are loaded into a tile buffer and a plain host buffer,
//! and the same multiply is timed through the dispatcher on both.

use super::{backend, matmul, max_abs_diff, synthetic, weight_tensor};
use anyhow::bail;
use std::path::Path;
use std::time::{Duration, Instant};
use tensor_core::backend::{cpu_buffer_type, ExtraBufferType};
use tensor_core::quant::quantize_row;
use tensor_core::{DType, Tensor, ThreadedExecutor};

pub fn execute(
    config: Option<&Path>,
    m: usize,
    k: usize,
    n: usize,
    dtype: DType,
    threads: usize,
    iterations: usize,
) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║            amx-rt · Matmul Benchmark                ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();
    println!("  Shape:      [{m} x {k}] · [{n} x {k}]ᵀ");
    println!("  Weights:    {dtype}");
    println!("  Threads:    {threads}");
    println!("  Iterations: {iterations}");
    println!();

    let buft = backend(config)?;
    let w = quantize_row(dtype, &synthetic(n * k, 3))?;
    let x = synthetic(m * k, 4);

    let tiled = matmul(&weight_tensor(buft, dtype, n, k, &w)?, m, &x)?;
    if !buft.supports_op(&tiled) {
        bail!("the tile backend does not accept this multiply (N must be a multiple of 32, K of 32 for quantized kinds)");
    }
    let reference = matmul(&weight_tensor(cpu_buffer_type(), dtype, n, k, &w)?, m, &x)?;

    let mut exec = ThreadedExecutor::new(threads);
    let tiled_time = time(&mut exec, &tiled, iterations)?;
    let reference_time = time(&mut exec, &reference, iterations)?;
    let diff = max_abs_diff(&tiled.to_f32_vec()?, &reference.to_f32_vec()?);

    // ── Results ────────────────────────────────────────────────
    let flops = 2.0 * (m * n * k) as f64;
    println!("  {:<12} {:>12} {:>10}", "Path", "ms / iter", "GFLOP/s");
    println!("  {}", "-".repeat(36));
    for (name, t) in [("tile", tiled_time), ("reference", reference_time)] {
        let secs = t.as_secs_f64();
        println!("  {:<12} {:>12.3} {:>10.2}", name, secs * 1e3, flops / secs / 1e9);
    }
    println!();
    println!(
        "  Speedup:    {:.2}x",
        reference_time.as_secs_f64() / tiled_time.as_secs_f64().max(f64::MIN_POSITIVE)
    );
    println!("  Max diff:   {diff:.3e}");
    Ok(())
}

/// Mean wall time of `op` after one warm-up run.
fn time(exec: &mut ThreadedExecutor, op: &Tensor, iterations: usize) -> anyhow::Result<Duration> {
    exec.compute(op)?;
    let iterations = iterations.max(1);
    let start = Instant::now();
    for _ in 0..iterations {
        exec.compute(op)?;
    }
    Ok(start.elapsed() / iterations as u32)
}
