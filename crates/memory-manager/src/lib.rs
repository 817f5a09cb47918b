// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # memory-manager
//!
//! Host memory for tensor buffers: aligned allocations and NUMA mirror
//! replica sets.
//!
//! # Key Components
//!
//! - [`AlignedBytes`] — an RAII aligned allocation, freed exactly once on drop.
//! - [`MirrorReplicas`] — one allocation per active NUMA node plus the
//!   read-only flag that decides whether writes fan out.
//! - [`BufferStorage`] — the closed set of storage shapes a buffer can have
//!   (`Plain` or `Mirror`).
//! - [`placement`] — binds replica pages to their NUMA node.
//! - [`HostAllocator`] — produces storage with a fixed alignment and an
//!   optional [`MirrorPolicy`], and keeps [`AllocationStats`].
//!
//! # Ownership Model
//!
//! ```text
//! HostAllocator::allocate(size)
//!       │
//!       ▼
//!   BufferStorage ──┬── Plain(AlignedBytes)
//!                   └── Mirror(MirrorReplicas ─► [AlignedBytes; n_nodes])
//!       │
//!       │  drop()
//!       ▼
//!   every AlignedBytes deallocates its own block
//! ```

mod aligned;
mod allocator;
mod error;
mod mirror;
pub mod placement;
mod stats;
mod storage;

pub use aligned::AlignedBytes;
pub use allocator::HostAllocator;
pub use error::MemoryError;
pub use mirror::{MirrorPolicy, MirrorReplicas, NumaStrategy, MAX_NUMA_NODES};
pub use stats::AllocationStats;
pub use storage::BufferStorage;
