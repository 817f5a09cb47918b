// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Supported tensor element and quantization types.

use crate::TensorError;
use std::str::FromStr;

/// Enumerates the element types a [`crate::Tensor`] can hold.
///
/// Quantized kinds store rows as a sequence of fixed-size blocks, each block
/// covering [`block_size`](DType::block_size) consecutive elements of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// 32-bit IEEE 754 floating point.
    F32,
    /// 16-bit IEEE 754 floating point.
    F16,
    /// 16-bit brain floating point.
    BF16,
    /// Symmetric 4-bit blocks: `x = d * (q - 8)`.
    Q4_0,
    /// Asymmetric 4-bit blocks: `x = d * q + m`.
    Q4_1,
    /// Symmetric 8-bit blocks: `x = d * q`.
    Q8_0,
}

impl DType {
    /// Every supported type, in declaration order.
    pub const ALL: [DType; 6] = [
        DType::F32,
        DType::F16,
        DType::BF16,
        DType::Q4_0,
        DType::Q4_1,
        DType::Q8_0,
    ];

    /// Number of elements covered by one storage unit.
    pub fn block_size(self) -> usize {
        match self {
            DType::F32 | DType::F16 | DType::BF16 => 1,
            DType::Q4_0 | DType::Q4_1 | DType::Q8_0 => crate::quant::QK,
        }
    }

    /// Size of one storage unit (element or block) in bytes.
    pub fn type_size(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 | DType::BF16 => 2,
            DType::Q4_0 => std::mem::size_of::<crate::quant::BlockQ4_0>(),
            DType::Q4_1 => std::mem::size_of::<crate::quant::BlockQ4_1>(),
            DType::Q8_0 => std::mem::size_of::<crate::quant::BlockQ8_0>(),
        }
    }

    /// Returns `true` for block-quantized kinds.
    pub fn is_quantized(self) -> bool {
        self.block_size() > 1
    }

    /// Bytes occupied by a row of `cols` elements.
    ///
    /// # Errors
    /// Returns [`TensorError::PartialBlock`] if `cols` is not a whole number
    /// of blocks.
    pub fn row_size(self, cols: usize) -> Result<usize, TensorError> {
        let block = self.block_size();
        if cols % block != 0 {
            return Err(TensorError::PartialBlock {
                dtype: self,
                cols,
                block,
            });
        }
        Ok(cols / block * self.type_size())
    }

    /// Returns a human-readable label for this data type.
    pub fn as_str(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::Q4_0 => "q4_0",
            DType::Q4_1 => "q4_1",
            DType::Q8_0 => "q8_0",
        }
    }
}

impl FromStr for DType {
    type Err = TensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DType::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TensorError::UnknownDType(s.to_string()))
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
