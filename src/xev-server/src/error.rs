// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Config(#[from] xev_app::ConfigError),
    #[error("{0}")]
    Engine(#[from] xev_core::EngineError),
    #[error("{0}")]
    Rx(#[from] xev_core::RxError),
    #[error("{0}")]
    Store(#[from] xev_store::StoreError),
    #[error("receive thread stopped making progress")]
    WatchdogStall,
    #[error("aborting on script error: {0}")]
    ScriptAbort(String),
}
