// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! Script execution entry point shared by the trigger orchestrator, the
//! scheduler, and the admin `exec` command.

use tracing::debug;

use xev_core::Engine;
use xev_proto::{Message, ServiceTag};
use xev_script::{compile, CommandSink, Executor, ScriptError};
use xev_store::Store;

/// Sink that encodes through the engine and broadcasts.
pub struct EngineSink<'a> {
    pub engine: &'a mut Engine,
}

impl CommandSink for EngineSink<'_> {
    fn send(&mut self, msg: &Message) -> Result<(), String> {
        match self.engine.send(msg) {
            Ok(true) => Ok(()),
            Ok(false) => Err("message could not be sent".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Compile and run one script.
///
/// When `trigger` is present, `xplnvin` is seeded from the message body
/// and `xplin` carries `classtype` and `sourceaddress`. The return value
/// is whatever the script left in `result{subaddress}` (the `preprocess`
/// contract); most callers ignore it.
pub fn run_script(
    engine: &mut Engine,
    local_tag: &ServiceTag,
    store: &dyn Store,
    text: &str,
    trigger: Option<&Message>,
) -> Result<Option<String>, ScriptError> {
    let prog = compile(text)?;
    debug!(instrs = prog.len(), "script compiled");

    let mut sink = EngineSink { engine };
    let mut exec = Executor::new(local_tag.clone(), Some(store), &mut sink);
    if let Some(msg) = trigger {
        for (name, value) in msg.body.iter() {
            exec.seed("xplnvin", name, value)?;
        }
        exec.seed("xplin", "classtype", &msg.schema.to_string())?;
        exec.seed("xplin", "sourceaddress", &msg.source.to_string())?;
    }
    exec.run(&prog)?;
    Ok(exec.var("result", "subaddress"))
}

/// Compile only; used by the `--check` utility and upload validation.
pub fn check_script(text: &str) -> Result<(), ScriptError> {
    compile(text).map(|_| ())
}
