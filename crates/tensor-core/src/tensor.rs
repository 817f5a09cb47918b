// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The generic tensor object.
//!
//! A [`Tensor`] is a typed descriptor over a region of some [`Buffer`]: it
//! never owns memory itself. Operator tensors (such as a matrix multiply)
//! additionally name their sources.
//!
//! Two fields are populated at different pipeline stages:
//! - placement (buffer, offset, region size) and the capability handle are
//!   set by [`Buffer::init_tensor`] when the tensor is allocated;
//! - sources are fixed when an operator tensor is built.

use crate::backend::{Buffer, TraitsHandle};
use crate::{DType, Shape, TensorError};
use std::sync::Arc;

/// The operation that produces a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// A leaf: weights, inputs or constants.
    None,
    /// `dst[M, N] = src1[M, K] · src0[N, K]ᵀ`.
    MulMat,
}

/// Where a tensor lives inside a buffer.
#[derive(Debug, Clone)]
struct Placement {
    buffer: Arc<Buffer>,
    offset: usize,
    size: usize,
}

/// A typed view over buffer memory.
#[derive(Debug, Clone)]
pub struct Tensor {
    name: String,
    dtype: DType,
    shape: Shape,
    /// Byte stride per dimension, outermost first.
    strides: Vec<usize>,
    op: OpKind,
    src: Vec<Arc<Tensor>>,
    placement: Option<Placement>,
    extra: Option<TraitsHandle>,
}

impl Tensor {
    /// Creates an unallocated leaf tensor with contiguous strides.
    ///
    /// # Errors
    /// Returns [`TensorError::PartialBlock`] if the row length is not a whole
    /// number of blocks of `dtype`.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{DType, Shape, Tensor};
    /// let w = Tensor::new("w", DType::Q4_0, Shape::matrix(32, 256)).unwrap();
    /// assert_eq!(w.nbytes(), 32 * 8 * 18);
    /// assert!(w.is_contiguous());
    /// ```
    pub fn new(name: impl Into<String>, dtype: DType, shape: Shape) -> Result<Self, TensorError> {
        let strides = contiguous_strides(dtype, &shape)?;
        Ok(Self {
            name: name.into(),
            dtype,
            shape,
            strides,
            op: OpKind::None,
            src: Vec::new(),
            placement: None,
            extra: None,
        })
    }

    /// Builds the output tensor of `act · weightᵀ`.
    ///
    /// `weight` is `[N, K]`, `act` is `[..., M, K]`, the result is an `F32`
    /// tensor `[..., M, N]`.
    pub fn mul_mat(
        name: impl Into<String>,
        weight: Arc<Tensor>,
        act: Arc<Tensor>,
    ) -> Result<Self, TensorError> {
        if weight.shape.cols() != act.shape.cols() || weight.shape.rank() < 2 {
            return Err(TensorError::ShapeMismatch {
                op: "mul_mat",
                lhs: weight.shape.clone(),
                rhs: act.shape.clone(),
            });
        }
        let mut dims = act.shape.dims().to_vec();
        if let Some(last) = dims.last_mut() {
            *last = weight.shape.rows();
        }
        let mut out = Self::new(name, DType::F32, Shape::new(dims))?;
        out.op = OpKind::MulMat;
        out.src = vec![weight, act];
        Ok(out)
    }

    /// Returns a view with the last two dimensions swapped.
    ///
    /// The view shares the placement of `self` and is not contiguous.
    pub fn transposed(&self) -> Self {
        let mut view = self.clone();
        let r = view.shape.rank();
        if r >= 2 {
            let mut dims = view.shape.dims().to_vec();
            dims.swap(r - 2, r - 1);
            view.shape = Shape::new(dims);
            view.strides.swap(r - 2, r - 1);
        }
        view.name = format!("{} (transposed)", self.name);
        view
    }

    /// Returns the tensor name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the element type.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the logical shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the byte stride of every dimension.
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Returns the producing operation.
    pub fn op(&self) -> OpKind {
        self.op
    }

    /// Returns source `i` of an operator tensor.
    pub fn src(&self, i: usize) -> Option<&Arc<Tensor>> {
        self.src.get(i)
    }

    /// Logical size in bytes of the tensor in its generic block layout.
    pub fn nbytes(&self) -> usize {
        self.shape.rows() * self.row_bytes()
    }

    /// Bytes per row in the generic block layout.
    pub fn row_bytes(&self) -> usize {
        // Row validity was checked at construction.
        self.shape.cols() / self.dtype.block_size() * self.dtype.type_size()
    }

    /// Returns `true` when rows are stored back to back with no gaps.
    pub fn is_contiguous(&self) -> bool {
        contiguous_strides(self.dtype, &self.shape)
            .map(|expected| expected == self.strides)
            .unwrap_or(false)
    }

    /// Returns the buffer the tensor lives in.
    pub fn buffer(&self) -> Option<&Arc<Buffer>> {
        self.placement.as_ref().map(|p| &p.buffer)
    }

    /// Byte offset of the tensor's region inside its buffer.
    pub fn offset(&self) -> usize {
        self.placement.as_ref().map_or(0, |p| p.offset)
    }

    /// Size of the tensor's region inside its buffer.
    ///
    /// This is the buffer type's allocation size, which may exceed
    /// [`nbytes`](Tensor::nbytes) for repacked layouts.
    pub fn region_size(&self) -> usize {
        self.placement.as_ref().map_or(0, |p| p.size)
    }

    /// Returns the capability handle attached at allocation time.
    pub fn extra(&self) -> Option<TraitsHandle> {
        self.extra
    }

    /// Attaches (or clears) the capability handle.
    pub fn set_extra(&mut self, extra: Option<TraitsHandle>) {
        self.extra = extra;
    }

    pub(crate) fn place(&mut self, buffer: Arc<Buffer>, offset: usize, size: usize) {
        self.placement = Some(Placement {
            buffer,
            offset,
            size,
        });
    }

    /// Resolves `offset..offset + len` within the tensor's region to an
    /// absolute buffer offset.
    pub fn region(&self, offset: usize, len: usize) -> Result<usize, TensorError> {
        let placement = self
            .placement
            .as_ref()
            .ok_or_else(|| TensorError::NotAllocated(self.name.clone()))?;
        match offset.checked_add(len) {
            Some(end) if end <= placement.size => Ok(placement.offset + offset),
            _ => Err(TensorError::InvalidWrite {
                tensor: self.name.clone(),
                detail: format!(
                    "{len} bytes at offset {offset} exceed the {}-byte region",
                    placement.size
                ),
            }),
        }
    }

    fn allocated_buffer(&self) -> Result<&Arc<Buffer>, TensorError> {
        self.buffer()
            .ok_or_else(|| TensorError::NotAllocated(self.name.clone()))
    }

    /// Writes the tensor's full contents in generic block layout.
    pub fn set_data(&self, data: &[u8]) -> Result<(), TensorError> {
        if data.len() != self.nbytes() {
            return Err(TensorError::BufferSizeMismatch {
                expected: self.nbytes(),
                actual: data.len(),
            });
        }
        self.allocated_buffer()?.set_tensor(self, data, 0)
    }

    /// Writes `f32` values into an `F32` tensor.
    pub fn set_f32(&self, values: &[f32]) -> Result<(), TensorError> {
        if self.dtype != DType::F32 {
            return Err(TensorError::UnsupportedDType {
                op: "set_f32",
                dtype: self.dtype,
            });
        }
        self.set_data(bytemuck::cast_slice(values))
    }

    /// Writes `values` into row `row` starting at column `col` of an `F32`
    /// tensor.
    pub fn write_f32_at(&self, row: usize, col: usize, values: &[f32]) -> Result<(), TensorError> {
        let offset = (row * self.shape.cols() + col) * DType::F32.type_size();
        self.allocated_buffer()?
            .set_tensor(self, bytemuck::cast_slice(values), offset)
    }

    /// Reads the full contents back in generic block layout.
    pub fn data(&self) -> Result<Vec<u8>, TensorError> {
        self.allocated_buffer()?.get_tensor(self, 0, self.nbytes())
    }

    /// Reads the contents and expands every element to `f32`.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>, TensorError> {
        let bytes = self.data()?;
        let mut out = Vec::with_capacity(self.shape.num_elements());
        for row in bytes.chunks_exact(self.row_bytes().max(1)) {
            out.extend(crate::quant::dequantize_row(self.dtype, row, self.shape.cols())?);
        }
        Ok(out)
    }
}

/// Row-major byte strides; the innermost stride is one storage unit.
fn contiguous_strides(dtype: DType, shape: &Shape) -> Result<Vec<usize>, TensorError> {
    let row = dtype.row_size(shape.cols())?;
    let rank = shape.rank();
    if rank == 0 {
        return Ok(Vec::new());
    }
    let mut strides = vec![0usize; rank];
    strides[rank - 1] = dtype.type_size();
    if rank >= 2 {
        strides[rank - 2] = row;
        for i in (0..rank - 2).rev() {
            strides[i] = strides[i + 1] * shape.dims()[i + 1];
        }
    }
    Ok(strides)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantized_strides() {
        let t = Tensor::new("w", DType::Q8_0, Shape::matrix(4, 64)).unwrap();
        assert_eq!(t.strides(), &[68, 34]);
        assert_eq!(t.nbytes(), 4 * 68);
    }

    #[test]
    fn test_partial_block_rejected() {
        assert!(Tensor::new("w", DType::Q4_0, Shape::matrix(4, 40)).is_err());
    }

    #[test]
    fn test_mul_mat_shape() {
        let w = Arc::new(Tensor::new("w", DType::Q4_0, Shape::matrix(64, 128)).unwrap());
        let x = Arc::new(Tensor::new("x", DType::F32, Shape::matrix(3, 128)).unwrap());
        let y = Tensor::mul_mat("y", w, x).unwrap();
        assert_eq!(y.shape(), &Shape::matrix(3, 64));
        assert_eq!(y.op(), OpKind::MulMat);
        assert_eq!(y.dtype(), DType::F32);
        assert_eq!(y.src(0).unwrap().name(), "w");
    }

    #[test]
    fn test_mul_mat_k_mismatch() {
        let w = Arc::new(Tensor::new("w", DType::F32, Shape::matrix(8, 16)).unwrap());
        let x = Arc::new(Tensor::new("x", DType::F32, Shape::matrix(2, 8)).unwrap());
        assert!(Tensor::mul_mat("y", w, x).is_err());
    }

    #[test]
    fn test_transposed_view_not_contiguous() {
        let t = Tensor::new("x", DType::F32, Shape::matrix(4, 8)).unwrap();
        assert!(t.is_contiguous());
        let v = t.transposed();
        assert_eq!(v.shape(), &Shape::matrix(8, 4));
        assert!(!v.is_contiguous());
    }

    #[test]
    fn test_unallocated_access_fails() {
        let t = Tensor::new("x", DType::F32, Shape::vector(4)).unwrap();
        assert!(matches!(t.data(), Err(TensorError::NotAllocated(_))));
        assert!(t.region(0, 4).is_err());
    }
}
