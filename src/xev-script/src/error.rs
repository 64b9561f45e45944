// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// Lex or parse failure; compilation stops at the first one.
    #[error("parse error on line {line}: {msg}")]
    Parse { line: u32, msg: String },
    /// Execution failure; the run halts where the reason was set.
    #[error("{0}")]
    Runtime(String),
}

impl ScriptError {
    pub(crate) fn parse(line: u32, msg: impl Into<String>) -> Self {
        Self::Parse {
            line,
            msg: msg.into(),
        }
    }
}
