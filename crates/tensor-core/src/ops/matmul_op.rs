// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Default matrix multiplication: `dst[M, N] = src1[M, K] · src0[N, K]ᵀ`.
//!
//! This is the path every operator falls back to. It reads weights through
//! the owning buffer's interface, so weights stored in a repacked layout come
//! back in the generic block layout. For quantized weights the activations
//! are quantized to Q8_0 first and the block dot products of
//! [`crate::quant::vec_dot_q8_0`] are used.

use crate::backend::ComputeParams;
use crate::ops::balance211;
use crate::quant::{quantize_row_q8_0, vec_dot_q8_0, BlockQ8_0};
use crate::{DType, OpKind, Shape, Tensor, TensorError};

/// The default kernel needs no dispatcher-provided scratch.
pub(crate) fn work_size(_op: &Tensor) -> usize {
    0
}

/// Computes output columns `balance211(N, nth, ith)` of a multiply.
///
/// # Errors
/// - [`TensorError::ShapeMismatch`] if the operands do not fit together.
/// - [`TensorError::UnsupportedDType`] if the activations are not `F32`.
pub fn mul_mat(params: &mut ComputeParams<'_>, op: &Tensor) -> Result<(), TensorError> {
    let (weight, act) = operands(op)?;
    let n = weight.shape().rows();
    let cols = balance211(n, params.nth, params.ith);
    if cols.is_empty() {
        return Ok(());
    }

    let w_bytes = weight.data()?;
    let x = act.to_f32_vec()?;
    let k = act.shape().cols();
    let row_bytes = weight.row_bytes();

    let result = mul_mat_reference(weight.dtype(), &w_bytes[cols.start * row_bytes..cols.end * row_bytes], &x, k)?;
    let width = cols.len();
    for (m, row) in result.chunks_exact(width).enumerate() {
        op.write_f32_at(m, cols.start, row)?;
    }
    Ok(())
}

/// Reference product of `weights` (rows in generic `dtype` layout) with `x`
/// (`M × K`, row-major). Returns `M × rows(weights)` values.
pub fn mul_mat_reference(
    dtype: DType,
    weights: &[u8],
    x: &[f32],
    k: usize,
) -> Result<Vec<f32>, TensorError> {
    let row_bytes = dtype.row_size(k)?;
    let m = if k == 0 { 0 } else { x.len() / k };
    let n = if row_bytes == 0 { 0 } else { weights.len() / row_bytes };
    let mut out = vec![0.0f32; m * n];

    if dtype.is_quantized() {
        let act: Vec<Vec<BlockQ8_0>> = x.chunks_exact(k).map(quantize_row_q8_0).collect();
        for (i, a) in act.iter().enumerate() {
            for (j, w) in weights.chunks_exact(row_bytes).enumerate() {
                out[i * n + j] = vec_dot_q8_0(dtype, w, a).ok_or(TensorError::UnsupportedDType {
                    op: "mul_mat",
                    dtype,
                })?;
            }
        }
    } else {
        let w = weights
            .chunks_exact(row_bytes)
            .map(|row| crate::quant::dequantize_row(dtype, row, k))
            .collect::<Result<Vec<_>, _>>()?;
        for (i, xr) in x.chunks_exact(k).enumerate() {
            for (j, wr) in w.iter().enumerate() {
                out[i * n + j] = xr.iter().zip(wr).map(|(a, b)| a * b).sum();
            }
        }
    }
    Ok(out)
}

fn operands(op: &Tensor) -> Result<(&Tensor, &Tensor), TensorError> {
    let (Some(weight), Some(act)) = (op.src(0), op.src(1)) else {
        return Err(TensorError::ShapeMismatch {
            op: "mul_mat",
            lhs: op.shape().clone(),
            rhs: Shape::new(vec![]),
        });
    };
    if op.op() != OpKind::MulMat || op.dtype() != DType::F32 {
        return Err(TensorError::UnsupportedDType {
            op: "mul_mat (output)",
            dtype: op.dtype(),
        });
    }
    if act.dtype() != DType::F32 {
        return Err(TensorError::UnsupportedDType {
            op: "mul_mat (activations)",
            dtype: act.dtype(),
        });
    }
    if weight.shape().cols() != act.shape().cols() || !weight.shape().is_2d() {
        return Err(TensorError::ShapeMismatch {
            op: "mul_mat",
            lhs: weight.shape().clone(),
            rhs: act.shape().clone(),
        });
    }
    Ok((weight.as_ref(), act.as_ref()))
}
