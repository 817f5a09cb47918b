// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT


//! # amx-rt
//!
//! Command-line interface for the tile-accelerated matmul backend.
//!
//! ## Usage
//! ```bash
//! # Platform capabilities and gate state
//! amx-rt status
//!
//! # Repack Q4_0 weights into the tile layout (and back)
//! amx-rt pack --dtype q4_0 --k 4096 --n 4096 --input raw.bin --output packed.bin
//! amx-rt pack --dtype q4_0 --k 4096 --n 4096 --input packed.bin --output raw.bin --unpack
//!
//! # Check every kernel against the reference path
//! amx-rt selftest
//!
//! # Time the tile path against the reference path
//! amx-rt bench --m 1 --k 4096 --n 4096 --dtype q4_0 --threads 4
//! ```

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tensor_core::DType;

#[derive(Parser)]
#[command(
    name = "amx-rt",
    about = "Tile-accelerated quantized matmul backend tools",
    version,
    author
)]
struct Cli {
    /// Path to a TOML backend configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show CPU features, NUMA nodes, tile entitlement and gate state.
    Status,

    /// Convert weights between the generic block layout and the tile layout.
    Pack {
        /// Weight kind: q4_0, q4_1 or q8_0.
        #[arg(short, long)]
        dtype: DType,

        /// Reduction length (columns).
        #[arg(short, long)]
        k: usize,

        /// Output features (rows).
        #[arg(short, long)]
        n: usize,

        /// Input file.
        #[arg(short, long)]
        input: PathBuf,

        /// Output file.
        #[arg(short, long)]
        output: PathBuf,

        /// Convert from the tile layout back to generic blocks.
        #[arg(long)]
        unpack: bool,
    },

    /// Run the literal scenarios and reference comparisons for every kernel.
    Selftest {
        /// Worker threads.
        #[arg(short, long, default_value_t = 2)]
        threads: usize,
    },

    /// Time the tile path against the reference path.
    Bench {
        /// Activation rows.
        #[arg(short, long, default_value_t = 1)]
        m: usize,

        /// Reduction length.
        #[arg(short, long, default_value_t = 4096)]
        k: usize,

        /// Output features.
        #[arg(short, long, default_value_t = 4096)]
        n: usize,

        /// Weight kind.
        #[arg(short, long, default_value = "q4_0")]
        dtype: DType,

        /// Worker threads.
        #[arg(short, long, default_value_t = 4)]
        threads: usize,

        /// Timed iterations per path.
        #[arg(long, default_value_t = 10)]
        iterations: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Status => commands::status::execute(config),
        Commands::Pack {
            dtype,
            k,
            n,
            input,
            output,
            unpack,
        } => commands::pack::execute(dtype, k, n, &input, &output, unpack),
        Commands::Selftest { threads } => commands::selftest::execute(config, threads),
        Commands::Bench {
            m,
            k,
            n,
            dtype,
            threads,
            iterations,
        } => commands::bench::execute(config, m, k, n, dtype, threads, iterations),
    }
}
