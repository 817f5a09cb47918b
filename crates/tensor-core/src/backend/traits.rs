// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor traits: the capability objects backends attach to tensors.
//!
//! # Lookup Order
//!
//! For an operator tensor `op` the dispatcher asks, in order:
//!
//! 1. `op.src[0].extra` — the weight operand, tagged when its buffer was
//!    initialised at load time;
//! 2. `op.extra` — the output tensor, tagged when the compute graph was
//!    allocated.
//!
//! The first handle found is the only one consulted. If it declines, the
//! dispatcher runs its default kernel.

use crate::Tensor;
use std::any::{Any, TypeId};
use std::collections::HashMap;

/// A backend's compute implementation for the operators it accelerates.
///
/// Implementations are stateless: everything per-thread lives in
/// [`ComputeParams::worker`].
pub trait TensorTraits: Send + Sync {
    /// Scratch bytes each worker needs for `op`, or `None` if this backend
    /// would not handle it.
    fn work_size(&self, n_threads: usize, op: &Tensor) -> Option<usize>;

    /// Computes this worker's share of `op`. Returns `false` to decline, in
    /// which case nothing has been written.
    fn compute_forward(&self, params: &mut ComputeParams<'_>, op: &Tensor) -> bool;
}

/// A reference to a process-wide [`TensorTraits`] implementation.
#[derive(Clone, Copy)]
pub struct TraitsHandle(&'static dyn TensorTraits);

impl TraitsHandle {
    /// Wraps a static capability object.
    pub fn new(traits: &'static dyn TensorTraits) -> Self {
        Self(traits)
    }

    /// Returns the capability object.
    pub fn get(self) -> &'static dyn TensorTraits {
        self.0
    }
}

impl PartialEq for TraitsHandle {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(
            self.0 as *const dyn TensorTraits,
            other.0 as *const dyn TensorTraits,
        )
    }
}

impl std::fmt::Debug for TraitsHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TraitsHandle({:p})", self.0 as *const dyn TensorTraits)
    }
}

/// Operator capability queries for a buffer type that carries kernels.
pub trait ExtraBufferType: Send + Sync {
    /// Whether this buffer type's kernels can compute `op`.
    fn supports_op(&self, op: &Tensor) -> bool;

    /// The capability handle for `op`, if its weight operand belongs to this
    /// buffer type.
    fn get_tensor_traits(&self, op: &Tensor) -> Option<TraitsHandle>;
}

/// Per-worker typed state that survives across compute calls.
///
/// Backends keep things like tile configuration here, keyed by type.
#[derive(Default)]
pub struct WorkerState {
    slots: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl WorkerState {
    /// Returns the `T` slot, creating it with `init` on first use.
    pub fn get_or_insert_with<T: Any + Send>(&mut self, init: impl FnOnce() -> T) -> &mut T {
        self.slots
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(init()))
            .downcast_mut::<T>()
            .expect("slot is keyed by its own TypeId")
    }

    /// Returns the `T` slot if it exists.
    pub fn get<T: Any + Send>(&self) -> Option<&T> {
        self.slots
            .get(&TypeId::of::<T>())
            .and_then(|slot| slot.downcast_ref::<T>())
    }

    /// Number of populated slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no backend has stored state yet.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl std::fmt::Debug for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerState")
            .field("slots", &self.slots.len())
            .finish()
    }
}

/// Everything one worker gets for one operator invocation.
pub struct ComputeParams<'a> {
    /// This worker's index, `0..nth`.
    pub ith: usize,
    /// Number of workers sharing the operator.
    pub nth: usize,
    /// Thread-local scratch sized by the work-size query.
    pub wdata: &'a mut [u8],
    /// Persistent per-worker state.
    pub worker: &'a mut WorkerState,
    /// NUMA node this worker runs on, when known.
    pub numa_node: Option<u32>,
}

/// Finds the capability handle for `op`: weight operand first, then output.
pub fn capability_for(op: &Tensor) -> Option<TraitsHandle> {
    op.src(0).and_then(|w| w.extra()).or_else(|| op.extra())
}

/// Offers `op` to its capability handle. Returns `true` if it was computed.
pub fn extra_compute_forward(params: &mut ComputeParams<'_>, op: &Tensor) -> bool {
    match capability_for(op) {
        Some(handle) => handle.get().compute_forward(params, op),
        None => false,
    }
}

/// Scratch size requested by `op`'s capability handle, if any.
pub fn extra_work_size(n_threads: usize, op: &Tensor) -> Option<usize> {
    capability_for(op).and_then(|handle| handle.get().work_size(n_threads, op))
}
