// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Placing a group of tensors in one buffer.

use crate::backend::{Buffer, BufferType};
use crate::{Tensor, TensorError};
use std::sync::Arc;

/// Allocates one buffer of `buft` sized for `tensors` and places each
/// tensor at the next aligned offset.
///
/// Sizes come from [`BufferType::alloc_size`], so repacked layouts get the
/// room they need.
pub fn alloc_tensors(
    buft: &'static dyn BufferType,
    tensors: &mut [&mut Tensor],
) -> Result<Arc<Buffer>, TensorError> {
    let alignment = buft.alignment();
    let mut offsets = Vec::with_capacity(tensors.len());
    let mut total = 0usize;
    for tensor in tensors.iter() {
        let offset = total.next_multiple_of(alignment);
        offsets.push(offset);
        total = offset + buft.alloc_size(tensor);
    }

    let buffer = Arc::new(buft.alloc(total)?);
    for (tensor, offset) in tensors.iter_mut().zip(offsets) {
        buffer.init_tensor(tensor, offset)?;
    }

    tracing::debug!(
        buffer_type = buft.name(),
        tensors = tensors.len(),
        bytes = total,
        "allocated tensor buffer"
    );
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::cpu_buffer_type;
    use crate::{DType, Shape};

    #[test]
    fn test_offsets_are_aligned() {
        let mut a = Tensor::new("a", DType::F32, Shape::vector(3)).unwrap();
        let mut b = Tensor::new("b", DType::F32, Shape::vector(5)).unwrap();
        let buffer = alloc_tensors(cpu_buffer_type(), &mut [&mut a, &mut b]).unwrap();
        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset(), 32);
        assert_eq!(buffer.size(), 52);
        assert_eq!(b.region_size(), 20);
    }
}
