// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Shared helpers for reading Linux sysfs files.

use crate::ProbeError;
use std::path::Path;

/// Reads a sysfs file and returns its trimmed content.
pub(crate) fn read_sysfs_file(path: &Path) -> Result<String, ProbeError> {
    if !path.exists() {
        return Err(ProbeError::NotAvailable {
            path: path.display().to_string(),
        });
    }
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| ProbeError::ReadError {
            path: path.display().to_string(),
            detail: e.to_string(),
        })
}

/// Parses a kernel list string like `"0-3,8,10-11"` into its members.
///
/// Returns `None` on malformed input. An empty string is an empty list.
pub fn parse_list(s: &str) -> Option<Vec<usize>> {
    let mut out = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some((start, end)) = part.split_once('-') {
            let start: usize = start.trim().parse().ok()?;
            let end: usize = end.trim().parse().ok()?;
            if end < start {
                return None;
            }
            out.extend(start..=end);
        } else {
            out.push(part.parse().ok()?);
        }
    }
    Some(out)
}
