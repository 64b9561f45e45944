// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod config;
pub mod logging;

pub use config::{AdminConfig, Config, ConfigError, GeneralConfig, StoreConfig, XplConfig};
pub use logging::init_logging;
