// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT


//! The process-wide runtime gate.
//!
//! Configuration is installed at most once, before first use. The first
//! call to [`settings`], [`is_enabled`] or [`amx_buffer_type`] fixes it (to
//! the defaults if nothing was installed); later installs fail with
//! [`BackendError::AlreadyConfigured`]. The buffer type is built once from
//! the fixed configuration, and a failure there is permanent for the
//! process.

use crate::buffer_type::AmxBufferType;
use crate::config::BackendConfig;
use crate::BackendError;
use hw_probe::OsTileEntitlement;
use std::sync::OnceLock;
use tracing::{info, warn};

static SETTINGS: OnceLock<BackendConfig> = OnceLock::new();
static BUFFER_TYPE: OnceLock<Option<AmxBufferType>> = OnceLock::new();

/// Installs the process-wide configuration.
///
/// # Errors
/// Fails if the configuration is invalid or already fixed.
pub fn configure(config: BackendConfig) -> Result<(), BackendError> {
    config.validate()?;
    let enabled = config.enabled;
    SETTINGS
        .set(config)
        .map_err(|_| BackendError::AlreadyConfigured)?;
    info!(enabled, "tile backend configured");
    Ok(())
}

/// Installs the default configuration with the toggle set to `enabled`.
pub fn set_enabled(enabled: bool) -> Result<(), BackendError> {
    configure(BackendConfig {
        enabled,
        ..BackendConfig::default()
    })
}

/// The fixed process-wide configuration.
pub fn settings() -> &'static BackendConfig {
    SETTINGS.get_or_init(BackendConfig::default)
}

/// Whether the accelerated path is switched on.
pub fn is_enabled() -> bool {
    settings().enabled
}

/// The process-wide tile buffer type, or `None` if the backend is disabled
/// or unavailable on this host.
pub fn amx_buffer_type() -> Option<&'static AmxBufferType> {
    BUFFER_TYPE
        .get_or_init(|| match AmxBufferType::new(settings(), &OsTileEntitlement) {
            Ok(buft) => Some(buft),
            Err(e) => {
                if is_enabled() {
                    warn!(reason = %e, "tile backend unavailable, using the default path");
                } else {
                    info!("tile backend disabled");
                }
                None
            }
        })
        .as_ref()
}
