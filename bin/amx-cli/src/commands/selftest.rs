// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT


//! `amx-rt selftest` command: every kernel against known answers.
//!
//! Runs the literal scenario (weights 1, activations 2, K = 256, expected
//! 512) for each quantized kind, then compares every kernel against the
//! reference path on synthetic data at GEMV and GEMM sizes. Replicas of
//! mirrored buffers are checked against the source after each load.

use super::{backend, matmul, max_abs_diff, synthetic, weight_tensor};
use amx_backend::{mirror, AmxBufferType};
use anyhow::bail;
use std::path::Path;
use tensor_core::backend::ExtraBufferType;
use tensor_core::ops::mul_mat_reference;
use tensor_core::quant::quantize_row;
use tensor_core::{DType, ThreadedExecutor};

const QUANTIZED: [DType; 3] = [DType::Q4_0, DType::Q4_1, DType::Q8_0];
const FLOAT: [DType; 2] = [DType::F16, DType::BF16];

/// Outcome of one check.
struct Check {
    name: String,
    max_err: f32,
    tolerance: f32,
    replicas_ok: bool,
}

impl Check {
    fn passed(&self) -> bool {
        self.max_err <= self.tolerance && self.replicas_ok
    }
}

pub fn execute(config: Option<&Path>, threads: usize) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║            amx-rt · Kernel Self-Test                ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let buft = backend(config)?;
    let mut exec = ThreadedExecutor::new(threads);
    let mut checks = Vec::new();

    for dtype in QUANTIZED {
        checks.push(literal(buft, &mut exec, dtype)?);
    }
    for dtype in QUANTIZED.into_iter().chain(FLOAT) {
        for m in [1, 24] {
            checks.push(against_reference(buft, &mut exec, dtype, m)?);
        }
    }

    // ── Results ────────────────────────────────────────────────
    println!("  {:<28} {:>12} {:>10} {:>9}", "Check", "Max error", "Tolerance", "Result");
    println!("  {}", "-".repeat(62));
    for check in &checks {
        println!(
            "  {:<28} {:>12.3e} {:>10.1e} {:>9}",
            check.name,
            check.max_err,
            check.tolerance,
            if check.passed() { "PASS" } else { "FAIL" },
        );
    }
    println!();

    let failed = checks.iter().filter(|c| !c.passed()).count();
    if failed > 0 {
        bail!("{failed} of {} checks failed", checks.len());
    }
    println!("  All {} checks passed.", checks.len());
    Ok(())
}

fn literal(buft: &'static AmxBufferType, exec: &mut ThreadedExecutor, dtype: DType) -> anyhow::Result<Check> {
    let (n, k) = (32, 256);
    let w = quantize_row(dtype, &vec![1.0; n * k])?;
    let weight = weight_tensor(buft, dtype, n, k, &w)?;
    let y = matmul(&weight, 1, &vec![2.0; k])?;
    if !buft.supports_op(&y) {
        bail!("{dtype} literal multiply was not accepted by the tile backend");
    }
    exec.compute(&y)?;

    let got = y.to_f32_vec()?;
    Ok(Check {
        name: format!("{dtype} literal (512)"),
        max_err: max_abs_diff(&got, &vec![512.0; n]),
        tolerance: 0.5,
        replicas_ok: replicas_match(&weight, &w)?,
    })
}

fn against_reference(
    buft: &'static AmxBufferType,
    exec: &mut ThreadedExecutor,
    dtype: DType,
    m: usize,
) -> anyhow::Result<Check> {
    let (n, k) = (64, 160);
    let w = quantize_row(dtype, &synthetic(n * k, 1))?;
    let weight = weight_tensor(buft, dtype, n, k, &w)?;
    let x = synthetic(m * k, 2);
    let y = matmul(&weight, m, &x)?;
    exec.compute(&y)?;

    let want = mul_mat_reference(dtype, &w, &x, k)?;
    let scale = want.iter().fold(1.0f32, |acc, v| acc.max(v.abs()));
    // Float weights go through BF16 tiles at GEMM sizes.
    let tolerance = (if dtype.is_quantized() || m <= 4 { 1e-4 } else { 1e-2 }) * scale;
    Ok(Check {
        name: format!("{dtype} m={m} vs reference"),
        max_err: max_abs_diff(&y.to_f32_vec()?, &want),
        tolerance,
        replicas_ok: replicas_match(&weight, &w)?,
    })
}

fn replicas_match(weight: &tensor_core::Tensor, source: &[u8]) -> anyhow::Result<bool> {
    let Some(buffer) = weight.buffer() else {
        return Ok(false);
    };
    Ok(mirror::replica_contents(buffer, weight)?
        .iter()
        .all(|(_, data)| data == source))
}
