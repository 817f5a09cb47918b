// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! A minimal data-parallel executor for single operators.
//!
//! Each worker keeps its [`WorkerState`] across calls, so backend state such
//! as tile configuration is set up once per worker rather than once per
//! operator. Scratch memory is sized per call from [`ops::work_size`] and is
//! private to the worker.

use crate::backend::{ComputeParams, WorkerState};
use crate::{ops, Tensor, TensorError};

/// Runs operators on a fixed set of scoped worker threads.
#[derive(Debug)]
pub struct ThreadedExecutor {
    workers: Vec<WorkerState>,
    numa_nodes: Vec<Option<u32>>,
}

impl ThreadedExecutor {
    /// Creates an executor with `n_threads` workers (at least one).
    pub fn new(n_threads: usize) -> Self {
        let n = n_threads.max(1);
        Self {
            workers: (0..n).map(|_| WorkerState::default()).collect(),
            numa_nodes: vec![None; n],
        }
    }

    /// Pins worker `i` to NUMA node `nodes[i % nodes.len()]` for replica
    /// selection.
    pub fn with_numa_nodes(mut self, nodes: &[u32]) -> Self {
        if !nodes.is_empty() {
            for (i, slot) in self.numa_nodes.iter_mut().enumerate() {
                *slot = Some(nodes[i % nodes.len()]);
            }
        }
        self
    }

    /// Number of workers.
    pub fn n_threads(&self) -> usize {
        self.workers.len()
    }

    /// Read access to worker `ith`'s persistent state.
    pub fn worker(&self, ith: usize) -> Option<&WorkerState> {
        self.workers.get(ith)
    }

    /// Computes `op` with every worker and waits for all of them.
    pub fn compute(&mut self, op: &Tensor) -> Result<(), TensorError> {
        let nth = self.workers.len();
        let wsize = ops::work_size(nth, op);

        if nth == 1 {
            let mut wdata = vec![0u8; wsize];
            let mut params = ComputeParams {
                ith: 0,
                nth,
                wdata: &mut wdata,
                worker: &mut self.workers[0],
                numa_node: self.numa_nodes[0],
            };
            return ops::compute_forward(&mut params, op);
        }

        std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .workers
                .iter_mut()
                .zip(self.numa_nodes.iter().copied())
                .enumerate()
                .map(|(ith, (worker, numa_node))| {
                    scope.spawn(move || {
                        let mut wdata = vec![0u8; wsize];
                        let mut params = ComputeParams {
                            ith,
                            nth,
                            wdata: &mut wdata,
                            worker,
                            numa_node,
                        };
                        ops::compute_forward(&mut params, op)
                    })
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .try_for_each(|(ith, h)| h.join().map_err(|_| TensorError::WorkerPanicked(ith))?)
        })
    }
}
