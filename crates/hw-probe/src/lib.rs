// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # hw-probe
//!
//! Answers the three platform questions the tile backend asks before it
//! enables itself:
//!
//! - **Does the CPU have tile units?** — [`CpuFeatures`] from CPUID.
//! - **May this process use them?** — [`TileEntitlement`], the one-time
//!   `arch_prctl` request on Linux.
//! - **How many memory domains are there?** — [`NumaTopology`] from sysfs.
//!
//! # Graceful Degradation
//! Missing sysfs paths yield a single-node topology, and non-x86 hosts
//! report no features and no entitlement. Nothing here panics on an
//! unfamiliar platform.
//!
//! # Example
//! ```no_run
//! use hw_probe::{OsTileEntitlement, PlatformSnapshot};
//!
//! let snap = PlatformSnapshot::capture(&OsTileEntitlement);
//! println!("{}", snap.summary());
//! ```

mod cpu;
mod entitlement;
mod error;
mod numa;
mod snapshot;
mod sysfs;

pub use cpu::CpuFeatures;
pub use entitlement::{
    OsTileEntitlement, StaticEntitlement, TileEntitlement, ARCH_REQ_XCOMP_PERM,
    XFEATURE_XTILEDATA,
};
pub use error::ProbeError;
pub use numa::{NumaNode, NumaTopology, NODE_ROOT};
pub use snapshot::PlatformSnapshot;
pub use sysfs::parse_list;
