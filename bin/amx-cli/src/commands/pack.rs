// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT


//! `amx-rt pack` command: convert a weight file to or from the tile layout.
//!
//! The input is memory-mapped; the output is written in one piece.

use amx_backend::pack;
use anyhow::Context;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tensor_core::DType;

pub fn execute(
    dtype: DType,
    k: usize,
    n: usize,
    input: &Path,
    output: &Path,
    unpack: bool,
) -> anyhow::Result<()> {
    let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    // SAFETY: the mapping is read-only and lives only for this call; the
    // file is not expected to change underneath it.
    let map = unsafe { Mmap::map(&file) }.with_context(|| format!("mapping {}", input.display()))?;

    let start = Instant::now();
    let bytes = if unpack {
        pack::unpack_weights(dtype, &map, k, n)?
    } else {
        let mut dst = vec![0u8; pack::packed_tensor_size(dtype, k, n)?];
        pack::pack_weights(dtype, &map, &mut dst, k, n)?;
        dst
    };
    let elapsed = start.elapsed();

    std::fs::write(output, &bytes).with_context(|| format!("writing {}", output.display()))?;
    println!(
        "  {} {dtype} [{n} x {k}]: {} -> {} bytes in {:.2} ms",
        if unpack { "Unpacked" } else { "Packed" },
        map.len(),
        bytes.len(),
        elapsed.as_secs_f64() * 1e3,
    );
    println!("  Output: {}", output.display());
    Ok(())
}
