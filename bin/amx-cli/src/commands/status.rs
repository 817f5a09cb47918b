// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT


//! `amx-rt status` command: platform capabilities and gate state.
//!
//! Probing never fails: a host without tile units or NUMA sysfs still gets a
//! report, with the backend shown as unavailable.

use amx_backend::{gate, BackendConfig};
use hw_probe::{OsTileEntitlement, PlatformSnapshot};
use std::path::Path;

pub fn execute(config: Option<&Path>) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║            amx-rt · Platform Status                 ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let snapshot = PlatformSnapshot::capture(&OsTileEntitlement);

    // ── CPU ────────────────────────────────────────────────────
    println!("  CPU");
    println!("   Features:     {}", snapshot.cpu.describe());
    println!("   INT8 tiles:   {}", yes_no(snapshot.cpu.has_amx_int8()));
    println!("   BF16 tiles:   {}", yes_no(snapshot.cpu.has_amx_bf16()));
    println!();

    // ── NUMA ───────────────────────────────────────────────────
    println!("  NUMA");
    if !snapshot.numa.discovered {
        println!("   (no sysfs topology, assuming one node)");
    }
    for node in &snapshot.numa.nodes {
        println!("   Node {:<3}      {} CPUs", node.id, node.cpus.len());
    }
    println!();

    // ── Entitlement ────────────────────────────────────────────
    println!("  Tile entitlement");
    match &snapshot.entitlement_error {
        None => println!("   Status:       granted"),
        Some(reason) => println!("   Status:       refused ({reason})"),
    }
    println!();

    // ── Backend ────────────────────────────────────────────────
    let settings: BackendConfig = super::load_config(config)?;
    gate::configure(settings)?;
    let settings = gate::settings();
    println!("  Backend");
    println!("   Enabled:      {}", yes_no(settings.enabled));
    println!("   NUMA policy:  {}", settings.numa_strategy.as_str());
    println!("   Alignment:    {} B", settings.alignment);
    match gate::amx_buffer_type() {
        Some(buft) => {
            println!("   Buffer type:  available");
            println!("   Mirrored:     {}", yes_no(buft.is_mirrored()));
            if !buft.is_entitled() {
                println!("   Tile unit:    software emulation");
            }
        }
        None => println!("   Buffer type:  unavailable (default path only)"),
    }
    println!();
    println!("{}", snapshot.summary());

    Ok(())
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}
