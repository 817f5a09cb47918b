// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The generic compute dispatcher and its default kernels.
//!
//! [`compute_forward`] first offers an operator to the capability handle
//! attached to its tensors (see [`crate::backend::capability_for`]); only
//! if that declines, or none is attached, does it run the default kernel
//! from this module.

mod matmul_op;

pub use matmul_op::{mul_mat, mul_mat_reference};

use crate::backend::{extra_compute_forward, extra_work_size, ComputeParams};
use crate::{OpKind, Tensor, TensorError};
use std::ops::Range;

/// Splits `0..n` into `nth` nearly equal contiguous chunks and returns chunk
/// `ith`. Trailing workers may receive an empty range.
///
/// # Examples
/// ```
/// use tensor_core::ops::balance211;
/// assert_eq!(balance211(10, 4, 0), 0..3);
/// assert_eq!(balance211(10, 4, 3), 9..10);
/// assert_eq!(balance211(2, 4, 3), 2..2);
/// ```
pub fn balance211(n: usize, nth: usize, ith: usize) -> Range<usize> {
    let per = n.div_ceil(nth.max(1));
    let start = (ith * per).min(n);
    let end = (start + per).min(n);
    start..end
}

/// Computes worker `params.ith`'s share of `op`.
pub fn compute_forward(params: &mut ComputeParams<'_>, op: &Tensor) -> Result<(), TensorError> {
    if extra_compute_forward(params, op) {
        tracing::trace!(op = op.name(), ith = params.ith, "computed by tensor traits");
        return Ok(());
    }
    match op.op() {
        OpKind::MulMat => mul_mat(params, op),
        OpKind::None => Ok(()),
    }
}

/// Scratch bytes each worker needs for `op`, across both paths.
pub fn work_size(n_threads: usize, op: &Tensor) -> usize {
    let default = match op.op() {
        OpKind::MulMat => matmul_op::work_size(op),
        OpKind::None => 0,
    };
    default.max(extra_work_size(n_threads, op).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance211_covers_range() {
        for n in [0, 1, 7, 16, 33] {
            for nth in 1..6 {
                let mut covered = 0;
                let mut next = 0;
                for ith in 0..nth {
                    let r = balance211(n, nth, ith);
                    assert_eq!(r.start, next.min(n));
                    next = r.end;
                    covered += r.len();
                }
                assert_eq!(covered, n, "n={n} nth={nth}");
            }
        }
    }
}
