// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! Linear p-code interpreter.
//!
//! Executes one program against a [`HashScope`]. The interpreter tracks
//! the anchor and count of the current push run; any non-push opcode
//! resets the anchor while the count survives until the next run starts.
//! A failed test or absent key follows the instruction's `skip` index.
//! Runtime failures set a fail reason and halt the run; the program
//! itself is never mutated.

use tracing::{debug, trace};

use xev_proto::{Message, MessageKind, Schema, ServiceTag};
use xev_store::Store;

use crate::error::ScriptError;
use crate::hash::HashScope;
use crate::pcode::{Builtin, CmpOp, Op, Program, PushArg};

/// Where `xplcmd` messages go. The daemon installs a broadcasting sink;
/// syntax checks use [`NullSink`] and tests use [`CollectSink`].
pub trait CommandSink {
    fn send(&mut self, msg: &Message) -> Result<(), String>;
}

/// Discards messages after logging them; the dry-run sink.
pub struct NullSink;

impl CommandSink for NullSink {
    fn send(&mut self, msg: &Message) -> Result<(), String> {
        debug!(dest = ?msg.target, schema = %msg.schema, "dry run: command not sent");
        Ok(())
    }
}

/// Captures every message sent during a run.
#[derive(Default)]
pub struct CollectSink {
    pub sent: Vec<Message>,
}

impl CommandSink for CollectSink {
    fn send(&mut self, msg: &Message) -> Result<(), String> {
        self.sent.push(msg.clone());
        Ok(())
    }
}

/// Best-effort decimal coercion: the longest numeric prefix, 0.0 when
/// there is none. String operands in numeric tests compare this way.
fn coerce_num(s: &str) -> f64 {
    let t = s.trim_start();
    for end in (1..=t.len()).rev() {
        if let Ok(v) = t[..end].parse::<f64>() {
            return v;
        }
    }
    0.0
}

/// One script execution context: transient hashes, the store passthrough,
/// the command sink, and the service identity stamped onto outgoing
/// messages. Dropped as a whole when the run is over.
pub struct Executor<'a> {
    scope: HashScope<'a>,
    sink: &'a mut dyn CommandSink,
    source: ServiceTag,
    fail_reason: Option<String>,
}

impl<'a> Executor<'a> {
    pub fn new(
        source: ServiceTag,
        store: Option<&'a dyn Store>,
        sink: &'a mut dyn CommandSink,
    ) -> Self {
        Self {
            scope: HashScope::new(store),
            sink,
            source,
            fail_reason: None,
        }
    }

    /// Pre-populate a hash before the run (`xplnvin`, `xplin`).
    pub fn seed(&mut self, hash: &str, key: &str, value: &str) -> Result<(), ScriptError> {
        self.scope
            .set(hash, key, value)
            .map_err(|e| ScriptError::Runtime(e.to_string()))
    }

    /// Read a hash key after the run (`result{subaddress}`).
    pub fn var(&self, hash: &str, key: &str) -> Option<String> {
        self.scope.get(hash, key).ok().flatten()
    }

    fn fail(&mut self, reason: String) {
        debug!("script run failed: {reason}");
        self.fail_reason = Some(reason);
    }

    fn undef(&mut self, arg: &PushArg, line: u32) {
        self.fail(format!(
            "Variable '{}' undefined on line number {line}",
            arg.describe()
        ));
    }

    fn get_value(&mut self, arg: &PushArg) -> Option<String> {
        match arg {
            PushArg::Literal(lit) => Some(lit.to_text()),
            PushArg::HashRef(name) => Some(name.clone()),
            PushArg::HashKv(name, key) => match self.scope.get(name, key) {
                Ok(value) => value,
                Err(e) => {
                    self.fail(format!("state store read failed: {e}"));
                    None
                }
            },
        }
    }

    /// Run the program. `Err` carries the fail reason; side effects up to
    /// the failing instruction (sent commands, nvstate writes) stand.
    pub fn run(&mut self, prog: &Program) -> Result<(), ScriptError> {
        let mut pc = 0usize;
        let mut first_push: Option<usize> = None;
        let mut push_count = 0u32;

        while pc < prog.len() && self.fail_reason.is_none() {
            let instr = prog.get(pc);
            trace!(pc, op = ?instr.op, "exec");
            let mut next = pc + 1;

            if !matches!(instr.op, Op::Push(_)) {
                first_push = None;
            }

            match &instr.op {
                Op::Nop | Op::BlockBegin => {}

                Op::BlockEnd => {
                    if let Some(target) = instr.skip {
                        next = target + 1;
                    }
                }

                Op::Push(_) => {
                    if first_push.is_none() {
                        first_push = Some(pc);
                        push_count = 0;
                    }
                    push_count += 1;
                }

                Op::Assign => {
                    assert!(push_count == 2, "assign requires two pushes");
                    let src = push_arg(prog, pc - 1);
                    let dst = push_arg(prog, pc - 2);
                    let Some(value) = self.get_value(src) else {
                        if self.fail_reason.is_none() {
                            self.undef(src, instr.line);
                        }
                        break;
                    };
                    match dst {
                        PushArg::HashKv(name, key) => {
                            if let Err(e) = self.scope.set(name, key, &value) {
                                self.fail(format!("state store write failed: {e}"));
                            }
                        }
                        other => {
                            self.undef(other, instr.line);
                        }
                    }
                }

                Op::Test(op) => {
                    assert!(push_count == 2, "test requires two pushes");
                    let left_arg = push_arg(prog, pc - 2);
                    let right_arg = push_arg(prog, pc - 1);
                    let Some(left) = self.get_value(left_arg) else {
                        if self.fail_reason.is_none() {
                            self.undef(left_arg, instr.line);
                        }
                        break;
                    };
                    let Some(right) = self.get_value(right_arg) else {
                        if self.fail_reason.is_none() {
                            self.undef(right_arg, instr.line);
                        }
                        break;
                    };
                    let result = match op {
                        CmpOp::StrEq => left == right,
                        numeric => {
                            let l = coerce_num(&left);
                            let r = coerce_num(&right);
                            match numeric {
                                CmpOp::NumEq => l == r,
                                CmpOp::NumNe => l != r,
                                CmpOp::NumLt => l < r,
                                CmpOp::NumGt => l > r,
                                CmpOp::NumLe => l <= r,
                                CmpOp::NumGe => l >= r,
                                CmpOp::StrEq => unreachable!(),
                            }
                        }
                    };
                    if !result {
                        let target = instr.skip.unwrap_or_else(|| {
                            unreachable!("test at {pc} has no resolved skip target")
                        });
                        next = target + 1;
                    }
                }

                Op::Exists => {
                    assert!(push_count == 1, "exists requires one push");
                    let arg = push_arg(prog, pc - 1);
                    let present = self.get_value(arg).is_some();
                    if self.fail_reason.is_none() && !present {
                        let target = instr.skip.unwrap_or_else(|| {
                            unreachable!("exists at {pc} has no resolved skip target")
                        });
                        next = target + 1;
                    }
                }

                Op::Func(Builtin::XplCmd) => {
                    self.xplcmd(prog, pc, push_count, instr.line);
                }
            }

            pc = next;
        }

        match self.fail_reason.clone() {
            Some(reason) => Err(ScriptError::Runtime(reason)),
            None => Ok(()),
        }
    }

    /// `xplcmd(tag, kind, schema, hashref)`: build a targeted message from
    /// the named hash's entries (in stored order), send it, and drain the
    /// hash.
    fn xplcmd(&mut self, prog: &Program, pc: usize, push_count: u32, line: u32) {
        if push_count != 4 {
            self.fail(format!(
                "Incorrect number of arguments passed to xplcmd, requires 4, got {push_count}"
            ));
            return;
        }
        let args: Vec<&PushArg> = (1..=4).map(|back| push_arg(prog, pc - back)).collect();
        let (hash_arg, schema_arg, kind_arg, tag_arg) = (args[0], args[1], args[2], args[3]);

        let mut value_of = |arg: &PushArg| -> Option<String> {
            match self.get_value(arg) {
                Some(v) => Some(v),
                None => {
                    if self.fail_reason.is_none() {
                        self.undef(arg, line);
                    }
                    None
                }
            }
        };
        let Some(tag_s) = value_of(tag_arg) else { return };
        let Some(kind_s) = value_of(kind_arg) else { return };
        let Some(schema_s) = value_of(schema_arg) else { return };
        let Some(hash_name) = value_of(hash_arg) else { return };

        let Ok(target) = tag_s.parse::<ServiceTag>() else {
            self.fail(format!("Bad xPL Tag: {tag_s}"));
            return;
        };
        let Some(kind) = MessageKind::from_short(&kind_s) else {
            self.fail(format!("Bad message kind: {kind_s}"));
            return;
        };
        let Some(schema) = Schema::parse(&schema_s) else {
            self.fail(format!("Bad schema: {schema_s}"));
            return;
        };

        if !self.scope.table.has_hash(&hash_name) {
            self.undef(&PushArg::HashRef(hash_name), line);
            return;
        }

        let mut msg = Message::targeted(kind, self.source.clone(), target, schema);
        self.scope.table.walk(&hash_name, |k, v| {
            msg.body.push(k, v);
        });

        let sent = self.sink.send(&msg);
        // The output hash is drained whether or not the send worked.
        self.scope.table.clear(&hash_name);
        if let Err(e) = sent {
            self.fail(format!("xplcmd send failed: {e}"));
        }
    }
}

fn push_arg(prog: &Program, idx: usize) -> &PushArg {
    match &prog.get(idx).op {
        Op::Push(arg) => arg,
        other => unreachable!("expected push at {idx}, found {other:?}"),
    }
}
