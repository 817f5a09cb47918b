// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Binding host allocations to NUMA memory domains.
//!
//! On Linux the whole pages inside a block are bound with `mbind(2)` and
//! `MPOL_BIND`; pages already faulted in are migrated. Elsewhere binding is a
//! no-op.

use crate::{AlignedBytes, MemoryError};

#[cfg(target_os = "linux")]
mod mempolicy {
    pub const MPOL_BIND: libc::c_int = 2;
    pub const MPOL_MF_MOVE: libc::c_uint = 1 << 1;
}

/// Binds the page-aligned interior of `block` to `node`.
///
/// A block that spans no whole page is left where it is; its bytes share
/// pages with unrelated allocations.
///
/// # Errors
/// Returns [`MemoryError::Placement`] with the OS error code if the kernel
/// rejects the policy, e.g. for a node that does not exist.
#[cfg(target_os = "linux")]
pub fn bind_to_node(block: &mut AlignedBytes, node: u32) -> Result<(), MemoryError> {
    // SAFETY: sysconf has no preconditions.
    let page = match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        p if p > 0 => p as usize,
        _ => 4096,
    };
    let Some((start, len)) = page_interior(block.addr(), block.len(), page) else {
        return Ok(());
    };

    let bits = libc::c_ulong::BITS as usize;
    let node_idx = node as usize;
    let mut nodemask: Vec<libc::c_ulong> = vec![0; node_idx / bits + 1];
    nodemask[node_idx / bits] |= 1 << (node_idx % bits);
    // The kernel reads `maxnode - 1` bits.
    let maxnode = nodemask.len() * bits + 1;

    // SAFETY: `start..start + len` lies inside the live allocation owned by
    // `block`, which is borrowed mutably for the duration of the call, and
    // `nodemask` outlives the syscall.
    let ret = unsafe {
        libc::syscall(
            libc::SYS_mbind,
            start as libc::c_ulong,
            len as libc::c_ulong,
            mempolicy::MPOL_BIND as libc::c_ulong,
            nodemask.as_ptr() as libc::c_ulong,
            maxnode as libc::c_ulong,
            mempolicy::MPOL_MF_MOVE as libc::c_ulong,
        )
    };
    if ret == 0 {
        Ok(())
    } else {
        Err(MemoryError::Placement {
            node,
            len,
            errno: std::io::Error::last_os_error().raw_os_error().unwrap_or(-1),
        })
    }
}

#[cfg(not(target_os = "linux"))]
pub fn bind_to_node(_block: &mut AlignedBytes, _node: u32) -> Result<(), MemoryError> {
    Ok(())
}

/// The largest page-aligned range inside `addr..addr + len`.
fn page_interior(addr: usize, len: usize, page: usize) -> Option<(usize, usize)> {
    let start = addr.checked_add(page - 1)? & !(page - 1);
    let end = addr.checked_add(len)? & !(page - 1);
    (end > start).then(|| (start, end - start))
}
