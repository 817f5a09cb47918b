// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The one-time request for tile-register usage rights.
//!
//! On Linux the tile data state (`XTILEDATA`, xsave component 18) is not
//! enabled for a process until it asks with
//! `arch_prctl(ARCH_REQ_XCOMP_PERM, XFEATURE_XTILEDATA)`. The grant is
//! process-wide and permanent, so the request is issued at most once and
//! its outcome cached.

use crate::{CpuFeatures, ProbeError};
use std::sync::OnceLock;

/// `arch_prctl` code requesting permission for an xsave feature.
pub const ARCH_REQ_XCOMP_PERM: i64 = 0x1023;
/// xsave feature number of the tile data registers.
pub const XFEATURE_XTILEDATA: i64 = 18;

/// Something that can grant this process the right to use tile registers.
pub trait TileEntitlement: Send + Sync {
    /// Requests the right. Must be idempotent.
    fn request(&self) -> Result<(), ProbeError>;
}

/// The operating system's entitlement, via `arch_prctl` on Linux x86-64.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsTileEntitlement;

impl TileEntitlement for OsTileEntitlement {
    fn request(&self) -> Result<(), ProbeError> {
        static OUTCOME: OnceLock<Result<(), String>> = OnceLock::new();
        OUTCOME
            .get_or_init(|| {
                let outcome = request_xtiledata();
                match &outcome {
                    Ok(()) => tracing::info!("tile register usage granted"),
                    Err(reason) => tracing::warn!(%reason, "tile register usage unavailable"),
                }
                outcome
            })
            .clone()
            .map_err(ProbeError::Entitlement)
    }
}

/// A fixed answer, for hosts where the outcome is known in advance.
#[derive(Debug, Clone, Copy)]
pub struct StaticEntitlement(pub bool);

impl TileEntitlement for StaticEntitlement {
    fn request(&self) -> Result<(), ProbeError> {
        if self.0 {
            Ok(())
        } else {
            Err(ProbeError::Entitlement("denied by static entitlement".into()))
        }
    }
}

fn request_xtiledata() -> Result<(), String> {
    let features = CpuFeatures::detect();
    if !features.has_amx_int8() {
        return Err("CPU does not implement AMX-TILE and AMX-INT8".into());
    }
    arch_request_xtiledata()
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
fn arch_request_xtiledata() -> Result<(), String> {
    const SYS_ARCH_PRCTL: i64 = 158;
    let ret: i64;
    // SAFETY: arch_prctl with ARCH_REQ_XCOMP_PERM only updates the calling
    // process's permitted xsave features; it reads no user memory.
    unsafe {
        std::arch::asm!(
            "syscall",
            inlateout("rax") SYS_ARCH_PRCTL => ret,
            in("rdi") ARCH_REQ_XCOMP_PERM,
            in("rsi") XFEATURE_XTILEDATA,
            lateout("rcx") _,
            lateout("r11") _,
            options(nostack),
        );
    }
    if ret == 0 {
        Ok(())
    } else {
        Err(format!("arch_prctl(ARCH_REQ_XCOMP_PERM) failed with errno {}", -ret))
    }
}

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
fn arch_request_xtiledata() -> Result<(), String> {
    Err("tile entitlement requires Linux on x86-64".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_entitlement() {
        assert!(StaticEntitlement(true).request().is_ok());
        assert!(matches!(
            StaticEntitlement(false).request(),
            Err(ProbeError::Entitlement(_))
        ));
    }

    #[test]
    fn test_os_entitlement_is_cached() {
        let first = OsTileEntitlement.request().is_ok();
        let second = OsTileEntitlement.request().is_ok();
        assert_eq!(first, second);
        if !CpuFeatures::detect().has_amx_int8() {
            assert!(!first);
        }
    }
}
