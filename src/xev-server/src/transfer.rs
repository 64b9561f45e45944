// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! Script transfer framing, shared by the admin server and the client
//! utilities.
//!
//! A script travels as `sb:<name>`, one `sl:<line>` per source line, then
//! `se:<name>`. The receive side is a small state machine that both ends
//! reuse; an `er:` line from the peer aborts the transfer.

/// Total upload size bound.
pub const MAX_SCRIPT: usize = 64 * 1024;

/// Per-line bound, prefix included.
pub const MAX_LINE: usize = 258;

const MIN_LINE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvState {
    Idle,
    WaitLine,
    Finished,
    Error,
}

/// Receive side of a script transfer.
pub struct ScriptReceiver {
    name: Option<String>,
    script: String,
    state: RecvState,
    error: Option<String>,
    limit: usize,
}

impl Default for ScriptReceiver {
    fn default() -> Self {
        Self::new(MAX_SCRIPT)
    }
}

impl ScriptReceiver {
    pub fn new(limit: usize) -> Self {
        Self {
            name: None,
            script: String::new(),
            state: RecvState::Idle,
            error: None,
            limit,
        }
    }

    /// Feed one line (without its trailing LF). Returns true once the
    /// transfer is complete, successfully or not.
    pub fn feed(&mut self, line: &str) -> bool {
        if matches!(self.state, RecvState::Finished | RecvState::Error) {
            return true;
        }

        let len = line.len();
        if !(MIN_LINE..=MAX_LINE).contains(&len) {
            return self.fail(format!("invalid line length: {len}"));
        }
        if let Some(reason) = line.strip_prefix("er:") {
            return self.fail(format!("receive terminated: {reason}"));
        }

        match self.state {
            RecvState::Idle => {
                if let Some(name) = line.strip_prefix("sb:") {
                    self.name = Some(name.to_string());
                    self.state = RecvState::WaitLine;
                }
                false
            }
            RecvState::WaitLine => {
                if line.starts_with("se:") {
                    self.state = RecvState::Finished;
                    return true;
                }
                if let Some(body) = line.strip_prefix("sl:") {
                    if self.script.len() + body.len() + 1 > self.limit {
                        return self.fail(format!(
                            "script size exceeds limit of {} bytes",
                            self.limit
                        ));
                    }
                    self.script.push_str(body);
                    self.script.push('\n');
                }
                false
            }
            RecvState::Finished | RecvState::Error => true,
        }
    }

    fn fail(&mut self, reason: String) -> bool {
        self.state = RecvState::Error;
        self.error = Some(reason);
        true
    }

    pub fn state(&self) -> RecvState {
        self.state
    }

    pub fn is_error(&self) -> bool {
        self.state == RecvState::Error
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn script(&self) -> &str {
        &self.script
    }
}

/// Frame a script for sending. Every element is a full line including the
/// trailing LF.
pub fn frame_script(name: &str, script: &str) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!("sb:{name}\n"));
    for line in script.lines() {
        lines.push(format!("sl:{line}\n"));
    }
    lines.push(format!("se:{name}\n"));
    lines
}
