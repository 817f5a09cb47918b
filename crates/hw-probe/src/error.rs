// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for platform probing.

/// Errors that can occur when probing the platform.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProbeError {
    /// Failed to read a sysfs file.
    #[error("failed to read {path}: {detail}")]
    ReadError { path: String, detail: String },

    /// Failed to parse a value from a system file.
    #[error("failed to parse value from {path}: {detail}")]
    ParseError { path: String, detail: String },

    /// The expected sysfs path does not exist.
    #[error("sysfs path not found: {path}")]
    NotAvailable { path: String },

    /// The operating system refused tile-register usage, or the CPU has no
    /// tile unit.
    #[error("tile entitlement unavailable: {0}")]
    Entitlement(String),
}
