// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! Logging bootstrap.

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. The configured level is the default
/// directive; `RUST_LOG` overrides it entirely when set.
pub fn init_logging(level: Option<&str>) {
    let default_directive = level.unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
