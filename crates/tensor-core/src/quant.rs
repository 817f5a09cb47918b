// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Quantization block layouts and reference routines.
//!
//! Each block covers [`QK`] consecutive elements of a row:
//!
//! ```text
//! BlockQ4_0  | d: f16 | qs: [u8; 16] |            x[j] = d * (nibble - 8)
//! BlockQ4_1  | d: f16 | m: f16 | qs: [u8; 16] |   x[j] = d * nibble + m
//! BlockQ8_0  | d: f16 | qs: [i8; 32] |            x[j] = d * q
//! ```
//!
//! In the 4-bit kinds byte `qs[j]` holds element `j` in its low nibble and
//! element `j + 16` in its high nibble.
//!
//! The `vec_dot_*` functions are the reference dot products against Q8_0
//! activations. They are written block by block with the same arithmetic
//! order the accelerated kernels use, so both paths agree to the last bit.

use crate::{DType, TensorError};
use bytemuck::{Pod, Zeroable};
use half::{bf16, f16};

/// Elements per quantization block.
pub const QK: usize = 32;

/// Symmetric 4-bit block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BlockQ4_0 {
    pub d: f16,
    pub qs: [u8; QK / 2],
}

/// Asymmetric 4-bit block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BlockQ4_1 {
    pub d: f16,
    pub m: f16,
    pub qs: [u8; QK / 2],
}

/// Symmetric 8-bit block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BlockQ8_0 {
    pub d: f16,
    pub qs: [i8; QK],
}

impl BlockQ4_0 {
    /// Returns element `j` as its unsigned nibble.
    pub fn nibble(&self, j: usize) -> u8 {
        if j < QK / 2 {
            self.qs[j] & 0x0F
        } else {
            self.qs[j - QK / 2] >> 4
        }
    }
}

impl BlockQ4_1 {
    /// Returns element `j` as its unsigned nibble.
    pub fn nibble(&self, j: usize) -> u8 {
        if j < QK / 2 {
            self.qs[j] & 0x0F
        } else {
            self.qs[j - QK / 2] >> 4
        }
    }
}

impl BlockQ8_0 {
    /// Sum of the quantized values.
    pub fn qsum(&self) -> i32 {
        self.qs.iter().map(|&q| q as i32).sum()
    }
}

/// Decodes a byte slice into blocks, tolerating any alignment.
///
/// Trailing bytes that do not fill a whole block are ignored.
pub fn blocks_from_bytes<T: Pod>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

/// Views blocks as their raw bytes.
pub fn blocks_as_bytes<T: Pod>(blocks: &[T]) -> &[u8] {
    bytemuck::cast_slice(blocks)
}

/// Quantizes a row to Q8_0 using round-to-nearest.
///
/// # Panics
/// Panics if `x.len()` is not a multiple of [`QK`].
pub fn quantize_row_q8_0(x: &[f32]) -> Vec<BlockQ8_0> {
    assert!(x.len() % QK == 0, "row length {} not a multiple of {QK}", x.len());
    x.chunks_exact(QK)
        .map(|chunk| {
            let amax = chunk.iter().fold(0.0f32, |m, &v| m.max(v.abs()));
            let d = amax / 127.0;
            let id = if d != 0.0 { 1.0 / d } else { 0.0 };
            let mut qs = [0i8; QK];
            for (q, &v) in qs.iter_mut().zip(chunk) {
                *q = (v * id).round() as i8;
            }
            BlockQ8_0 {
                d: f16::from_f32(d),
                qs,
            }
        })
        .collect()
}

/// Quantizes a row to Q4_0.
///
/// # Panics
/// Panics if `x.len()` is not a multiple of [`QK`].
pub fn quantize_row_q4_0(x: &[f32]) -> Vec<BlockQ4_0> {
    assert!(x.len() % QK == 0, "row length {} not a multiple of {QK}", x.len());
    x.chunks_exact(QK)
        .map(|chunk| {
            // The signed extreme maps to -8 so the full nibble range is used.
            let max = chunk
                .iter()
                .copied()
                .fold(0.0f32, |m, v| if v.abs() > m.abs() { v } else { m });
            let d = max / -8.0;
            let id = if d != 0.0 { 1.0 / d } else { 0.0 };
            let mut qs = [0u8; QK / 2];
            for j in 0..QK / 2 {
                let lo = ((chunk[j] * id + 8.5) as i32).clamp(0, 15) as u8;
                let hi = ((chunk[j + QK / 2] * id + 8.5) as i32).clamp(0, 15) as u8;
                qs[j] = lo | (hi << 4);
            }
            BlockQ4_0 {
                d: f16::from_f32(d),
                qs,
            }
        })
        .collect()
}

/// Quantizes a row to Q4_1.
///
/// # Panics
/// Panics if `x.len()` is not a multiple of [`QK`].
pub fn quantize_row_q4_1(x: &[f32]) -> Vec<BlockQ4_1> {
    assert!(x.len() % QK == 0, "row length {} not a multiple of {QK}", x.len());
    x.chunks_exact(QK)
        .map(|chunk| {
            let min = chunk.iter().copied().fold(f32::INFINITY, f32::min);
            let max = chunk.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let d = (max - min) / 15.0;
            let id = if d != 0.0 { 1.0 / d } else { 0.0 };
            let mut qs = [0u8; QK / 2];
            for j in 0..QK / 2 {
                let lo = (((chunk[j] - min) * id + 0.5) as i32).clamp(0, 15) as u8;
                let hi = (((chunk[j + QK / 2] - min) * id + 0.5) as i32).clamp(0, 15) as u8;
                qs[j] = lo | (hi << 4);
            }
            BlockQ4_1 {
                d: f16::from_f32(d),
                m: f16::from_f32(min),
                qs,
            }
        })
        .collect()
}

/// Quantizes a row of `f32` values into the raw bytes of `dtype`.
pub fn quantize_row(dtype: DType, x: &[f32]) -> Result<Vec<u8>, TensorError> {
    dtype.row_size(x.len())?;
    let bytes = match dtype {
        DType::F32 => blocks_as_bytes(x).to_vec(),
        DType::F16 => x.iter().flat_map(|&v| f16::from_f32(v).to_le_bytes()).collect(),
        DType::BF16 => x.iter().flat_map(|&v| bf16::from_f32(v).to_le_bytes()).collect(),
        DType::Q4_0 => blocks_as_bytes(&quantize_row_q4_0(x)).to_vec(),
        DType::Q4_1 => blocks_as_bytes(&quantize_row_q4_1(x)).to_vec(),
        DType::Q8_0 => blocks_as_bytes(&quantize_row_q8_0(x)).to_vec(),
    };
    Ok(bytes)
}

/// Expands one row of `dtype` bytes to `f32`.
///
/// # Errors
/// Returns [`TensorError::BufferSizeMismatch`] if `bytes` does not hold
/// exactly `cols` elements.
pub fn dequantize_row(dtype: DType, bytes: &[u8], cols: usize) -> Result<Vec<f32>, TensorError> {
    let expected = dtype.row_size(cols)?;
    if bytes.len() != expected {
        return Err(TensorError::BufferSizeMismatch {
            expected,
            actual: bytes.len(),
        });
    }
    let mut out = Vec::with_capacity(cols);
    match dtype {
        DType::F32 => out.extend(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
        ),
        DType::F16 => out.extend(
            bytes
                .chunks_exact(2)
                .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32()),
        ),
        DType::BF16 => out.extend(
            bytes
                .chunks_exact(2)
                .map(|c| bf16::from_le_bytes([c[0], c[1]]).to_f32()),
        ),
        DType::Q4_0 => {
            for b in blocks_from_bytes::<BlockQ4_0>(bytes) {
                let d = b.d.to_f32();
                out.extend((0..QK).map(|j| (b.nibble(j) as i32 - 8) as f32 * d));
            }
        }
        DType::Q4_1 => {
            for b in blocks_from_bytes::<BlockQ4_1>(bytes) {
                let (d, m) = (b.d.to_f32(), b.m.to_f32());
                out.extend((0..QK).map(|j| b.nibble(j) as f32 * d + m));
            }
        }
        DType::Q8_0 => {
            for b in blocks_from_bytes::<BlockQ8_0>(bytes) {
                let d = b.d.to_f32();
                out.extend(b.qs.iter().map(|&q| q as f32 * d));
            }
        }
    }
    Ok(out)
}

/// Reference dot product of one quantized weight row with Q8_0 activations.
///
/// Returns `None` for weight kinds that are not block-quantized.
pub fn vec_dot_q8_0(dtype: DType, weight_row: &[u8], act: &[BlockQ8_0]) -> Option<f32> {
    let mut sumf = 0.0f32;
    match dtype {
        DType::Q4_0 => {
            for (w, a) in blocks_from_bytes::<BlockQ4_0>(weight_row).iter().zip(act) {
                let sumi: i32 = (0..QK)
                    .map(|j| (w.nibble(j) as i32 - 8) * a.qs[j] as i32)
                    .sum();
                sumf += (w.d.to_f32() * a.d.to_f32()) * sumi as f32;
            }
        }
        DType::Q4_1 => {
            for (w, a) in blocks_from_bytes::<BlockQ4_1>(weight_row).iter().zip(act) {
                let sumi: i32 = (0..QK).map(|j| w.nibble(j) as i32 * a.qs[j] as i32).sum();
                let da = a.d.to_f32();
                sumf += (w.d.to_f32() * da) * sumi as f32 + w.m.to_f32() * (da * a.qsum() as f32);
            }
        }
        DType::Q8_0 => {
            for (w, a) in blocks_from_bytes::<BlockQ8_0>(weight_row).iter().zip(act) {
                let sumi: i32 = w.qs.iter().zip(&a.qs).map(|(&x, &y)| x as i32 * y as i32).sum();
                sumf += (w.d.to_f32() * a.d.to_f32()) * sumi as f32;
            }
        }
        DType::F32 | DType::F16 | DType::BF16 => return None,
    }
    Some(sumf)
}
