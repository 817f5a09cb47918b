// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! CPU instruction-set detection.
//!
//! Reads CPUID leaf 7 directly:
//! - `EBX[16]` AVX-512F, `ECX[11]` AVX-512 VNNI;
//! - `EDX[22]` AMX-BF16, `EDX[24]` AMX-TILE, `EDX[25]` AMX-INT8.
//!
//! CPUID only reports what the silicon implements. Whether the operating
//! system lets this process use tile registers is a separate question, see
//! [`crate::TileEntitlement`].

/// Matrix and vector extensions relevant to the tile kernels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CpuFeatures {
    pub avx512f: bool,
    pub avx512_vnni: bool,
    pub amx_tile: bool,
    pub amx_int8: bool,
    pub amx_bf16: bool,
}

impl CpuFeatures {
    /// Detects features of the running CPU. All `false` off x86-64.
    pub fn detect() -> Self {
        detect_impl()
    }

    /// Tile registers with INT8 dot products.
    pub fn has_amx_int8(&self) -> bool {
        self.amx_tile && self.amx_int8
    }

    /// Tile registers with BF16 dot products.
    pub fn has_amx_bf16(&self) -> bool {
        self.amx_tile && self.amx_bf16
    }

    /// Comma-separated names of the detected features.
    pub fn describe(&self) -> String {
        let names: Vec<&str> = [
            (self.avx512f, "avx512f"),
            (self.avx512_vnni, "avx512_vnni"),
            (self.amx_tile, "amx_tile"),
            (self.amx_int8, "amx_int8"),
            (self.amx_bf16, "amx_bf16"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect();
        if names.is_empty() {
            "none".to_string()
        } else {
            names.join(", ")
        }
    }
}

#[cfg(target_arch = "x86_64")]
#[allow(unused_unsafe)]
fn detect_impl() -> CpuFeatures {
    use std::arch::x86_64::{__cpuid, __cpuid_count};

    // SAFETY: CPUID exists on every x86-64 processor.
    let max_leaf = unsafe { __cpuid(0) }.eax;
    if max_leaf < 7 {
        return CpuFeatures::default();
    }
    // SAFETY: leaf 7 is supported, checked above.
    let leaf7 = unsafe { __cpuid_count(7, 0) };
    CpuFeatures {
        avx512f: leaf7.ebx & (1 << 16) != 0,
        avx512_vnni: leaf7.ecx & (1 << 11) != 0,
        amx_bf16: leaf7.edx & (1 << 22) != 0,
        amx_tile: leaf7.edx & (1 << 24) != 0,
        amx_int8: leaf7.edx & (1 << 25) != 0,
    }
}

#[cfg(not(target_arch = "x86_64"))]
fn detect_impl() -> CpuFeatures {
    CpuFeatures::default()
}
