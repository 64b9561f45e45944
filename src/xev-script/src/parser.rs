// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! Recursive-descent parser emitting p-code in execution order.
//!
//! Grammar:
//!
//! ```text
//! program   := stmt*
//! stmt      := cond_stmt | assign ';' | call ';'
//! assign    := hashkv '=' operand
//! call      := ident '(' operand (',' operand)* ')'
//! cond_stmt := cond block ('else' block)?
//! cond      := operand cmpop operand | 'exists' hashkv
//! block     := '{' stmt* '}'
//! operand   := int | float | string | '%' ident | '%' ident '{' key '}'
//! ```
//!
//! A conditional's test and its block-end instructions carry the same
//! nesting depth; jump resolution at block close walks the emitted stream
//! backwards to pair them up.

use crate::error::ScriptError;
use crate::lexer::{Lexer, Tok, Token};
use crate::pcode::{Builtin, CmpOp, Literal, Op, Program, PushArg};

/// Compile one script into its p-code program.
pub fn compile(src: &str) -> Result<Program, ScriptError> {
    let tokens = Lexer::new(src).tokens()?;
    Parser::new(tokens).parse()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: u32,
    prog: Program,
    line: u32,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            prog: Program::default(),
            line: 1,
        }
    }

    fn parse(mut self) -> Result<Program, ScriptError> {
        while self.peek().is_some() {
            self.statement()?;
        }
        Ok(self.prog)
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn next(&mut self) -> Result<Tok, ScriptError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| ScriptError::parse(self.line, "unexpected end of script"))?;
        self.pos += 1;
        self.line = token.line;
        Ok(token.tok)
    }

    fn expect(&mut self, want: &Tok, what: &str) -> Result<(), ScriptError> {
        let got = self.next()?;
        if &got == want {
            Ok(())
        } else {
            Err(ScriptError::parse(
                self.line,
                format!("expected {what}, found {got:?}"),
            ))
        }
    }

    fn emit(&mut self, op: Op) -> usize {
        self.prog.push(op, self.line, self.depth)
    }

    fn statement(&mut self) -> Result<(), ScriptError> {
        match self.peek() {
            Some(Tok::Exists) => {
                self.next()?;
                let arg = self.operand()?;
                if !matches!(arg, PushArg::HashKv(_, _)) {
                    return Err(ScriptError::parse(
                        self.line,
                        "'exists' takes a %hash{key} reference",
                    ));
                }
                self.emit(Op::Push(arg));
                self.emit(Op::Exists);
                self.conditional_tail()
            }
            Some(Tok::Ident(_)) => {
                self.call()?;
                self.expect(&Tok::Semi, "';' after call")
            }
            Some(_) => {
                let first = self.operand()?;
                match self.peek() {
                    Some(Tok::Assign) => {
                        if !matches!(first, PushArg::HashKv(_, _)) {
                            return Err(ScriptError::parse(
                                self.line,
                                "assignment target must be %hash{key}",
                            ));
                        }
                        self.next()?;
                        let value = self.operand()?;
                        self.emit(Op::Push(first));
                        self.emit(Op::Push(value));
                        self.emit(Op::Assign);
                        self.expect(&Tok::Semi, "';' after assignment")
                    }
                    Some(tok) if comparator(tok).is_some() => {
                        let op = comparator(tok).unwrap();
                        self.next()?;
                        let right = self.operand()?;
                        self.emit(Op::Push(first));
                        self.emit(Op::Push(right));
                        self.emit(Op::Test(op));
                        self.conditional_tail()
                    }
                    _ => Err(ScriptError::parse(
                        self.line,
                        "expected '=', a comparator, or a block after operand",
                    )),
                }
            }
            None => Ok(()),
        }
    }

    /// The block (and optional else-block) following an emitted test.
    fn conditional_tail(&mut self) -> Result<(), ScriptError> {
        self.block()?;
        if self.peek() == Some(&Tok::Else) {
            self.next()?;
            self.block()?;
            self.resolve_else();
        } else {
            self.resolve_if();
        }
        Ok(())
    }

    fn block(&mut self) -> Result<(), ScriptError> {
        self.expect(&Tok::LBrace, "'{'")?;
        let outer = self.depth;
        self.emit(Op::BlockBegin);
        self.depth = outer + 1;
        loop {
            match self.peek() {
                Some(Tok::RBrace) => break,
                Some(_) => self.statement()?,
                None => {
                    return Err(ScriptError::parse(self.line, "unterminated block"));
                }
            }
        }
        self.next()?; // consume '}'
        self.depth = outer;
        self.emit(Op::BlockEnd);
        Ok(())
    }

    fn call(&mut self) -> Result<(), ScriptError> {
        let name = match self.next()? {
            Tok::Ident(name) => name,
            other => {
                return Err(ScriptError::parse(
                    self.line,
                    format!("expected function name, found {other:?}"),
                ));
            }
        };
        let builtin = match name.as_str() {
            "xplcmd" => Builtin::XplCmd,
            other => {
                return Err(ScriptError::parse(
                    self.line,
                    format!("unknown function '{other}'"),
                ));
            }
        };
        self.expect(&Tok::LParen, "'(' after function name")?;
        loop {
            let arg = self.operand()?;
            self.emit(Op::Push(arg));
            match self.next()? {
                Tok::Comma => continue,
                Tok::RParen => break,
                other => {
                    return Err(ScriptError::parse(
                        self.line,
                        format!("expected ',' or ')', found {other:?}"),
                    ));
                }
            }
        }
        self.emit(Op::Func(builtin));
        Ok(())
    }

    fn operand(&mut self) -> Result<PushArg, ScriptError> {
        match self.next()? {
            Tok::Int(v) => Ok(PushArg::Literal(Literal::Int(v))),
            Tok::Float(v) => Ok(PushArg::Literal(Literal::Float(v))),
            Tok::Str(s) => Ok(PushArg::Literal(Literal::Str(s))),
            Tok::HashName(name) => {
                if self.peek() == Some(&Tok::LBrace) {
                    self.next()?;
                    let key = match self.next()? {
                        Tok::Ident(k) => k,
                        Tok::Str(k) => k,
                        Tok::Int(k) => k.to_string(),
                        other => {
                            return Err(ScriptError::parse(
                                self.line,
                                format!("expected hash key, found {other:?}"),
                            ));
                        }
                    };
                    self.expect(&Tok::RBrace, "'}' after hash key")?;
                    Ok(PushArg::HashKv(name, key))
                } else {
                    Ok(PushArg::HashRef(name))
                }
            }
            other => Err(ScriptError::parse(
                self.line,
                format!("expected operand, found {other:?}"),
            )),
        }
    }

    /// Plain `if`: point the test at the block end just emitted.
    fn resolve_if(&mut self) {
        let tail = self.prog.len() - 1;
        let depth = self.prog.get(tail).depth;
        let mut i = tail;
        loop {
            let instr = self.prog.get(i);
            if instr.depth == depth && matches!(instr.op, Op::Test(_) | Op::Exists) {
                self.prog.set_skip(i, tail);
                return;
            }
            assert!(i > 0, "conditional block without a test");
            i -= 1;
        }
    }

    /// `if/else`: hop the if-arm's end over the else arm, and point the
    /// test at the instruction opening the else arm.
    fn resolve_else(&mut self) {
        let tail = self.prog.len() - 1;
        let depth = self.prog.get(tail).depth;

        let mut i = tail - 1;
        let if_end = loop {
            let instr = self.prog.get(i);
            if instr.depth == depth && instr.op == Op::BlockEnd {
                break i;
            }
            assert!(i > 0, "else without a preceding block");
            i -= 1;
        };
        self.prog.set_skip(if_end, tail);

        let else_open = if_end + 1;
        let mut i = if_end;
        loop {
            let instr = self.prog.get(i);
            if instr.depth == depth && matches!(instr.op, Op::Test(_) | Op::Exists) {
                self.prog.set_skip(i, else_open);
                return;
            }
            assert!(i > 0, "conditional block without a test");
            i -= 1;
        }
    }
}

fn comparator(tok: &Tok) -> Option<CmpOp> {
    match tok {
        Tok::CmpEq => Some(CmpOp::NumEq),
        Tok::CmpNe => Some(CmpOp::NumNe),
        Tok::CmpLt => Some(CmpOp::NumLt),
        Tok::CmpGt => Some(CmpOp::NumGt),
        Tok::CmpLe => Some(CmpOp::NumLe),
        Tok::CmpGe => Some(CmpOp::NumGe),
        Tok::StrEq => Some(CmpOp::StrEq),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(prog: &Program) -> Vec<&Op> {
        prog.instrs().iter().map(|i| &i.op).collect()
    }

    #[test]
    fn assignment_emits_push_push_assign() {
        let prog = compile("%xplout{device} = \"lamp\";").unwrap();
        assert_eq!(
            ops(&prog),
            vec![
                &Op::Push(PushArg::HashKv("xplout".into(), "device".into())),
                &Op::Push(PushArg::Literal(Literal::Str("lamp".into()))),
                &Op::Assign,
            ]
        );
    }

    #[test]
    fn call_emits_args_in_order_then_func() {
        let prog = compile("xplcmd(\"a-b.c\", \"cmnd\", \"control.basic\", %xplout);").unwrap();
        let got = ops(&prog);
        assert_eq!(got.len(), 5);
        assert_eq!(
            got[0],
            &Op::Push(PushArg::Literal(Literal::Str("a-b.c".into())))
        );
        assert_eq!(got[3], &Op::Push(PushArg::HashRef("xplout".into())));
        assert_eq!(got[4], &Op::Func(Builtin::XplCmd));
    }

    #[test]
    fn if_block_jump_points_at_block_end() {
        let prog = compile("%a{k} == 1 { %b{x} = 2; }").unwrap();
        // push, push, test, begin, push, push, assign, end
        assert_eq!(prog.len(), 8);
        let test = prog.get(2);
        assert!(matches!(test.op, Op::Test(CmpOp::NumEq)));
        assert_eq!(test.skip, Some(7));
        assert!(matches!(prog.get(7).op, Op::BlockEnd));
        assert_eq!(prog.get(7).skip, None);
    }

    #[test]
    fn if_else_jumps_hop_over_else_arm() {
        let prog = compile("%a{k} == 1 { %b{x} = 2; } else { %b{x} = 3; }").unwrap();
        // 0:push 1:push 2:test 3:begin 4:push 5:push 6:assign 7:end
        // 8:begin 9:push 10:push 11:assign 12:end
        assert_eq!(prog.len(), 13);
        let test = prog.get(2);
        // False branch enters the else arm at its opening instruction.
        assert_eq!(test.skip, Some(8));
        // The if-arm's end hops over the whole else arm.
        let if_end = prog.get(7);
        assert!(matches!(if_end.op, Op::BlockEnd));
        assert_eq!(if_end.skip, Some(12));
    }

    #[test]
    fn block_end_skip_targets_point_forward() {
        let prog = compile(
            "%a{k} == 1 { %b{x} = 2; } else { %b{x} = 3; }\n\
             exists %a{j} { %b{y} = 4; } else { %b{y} = 5; }",
        )
        .unwrap();
        for (seq, instr) in prog.instrs().iter().enumerate() {
            if matches!(instr.op, Op::BlockEnd) {
                if let Some(target) = instr.skip {
                    assert!(target > seq, "skip at {seq} points backwards to {target}");
                }
            }
        }
    }

    #[test]
    fn nested_if_resolves_inner_test_first() {
        let prog = compile("%a{k} == 1 { %a{j} == 2 { %b{x} = 3; } }").unwrap();
        // outer: 0,1 push; 2 test; 3 begin
        // inner: 4,5 push; 6 test; 7 begin; 8,9,10 assign seq; 11 end
        // outer end: 12
        assert_eq!(prog.len(), 13);
        assert_eq!(prog.get(6).skip, Some(11));
        assert_eq!(prog.get(2).skip, Some(12));
        assert_eq!(prog.get(2).depth, 0);
        assert_eq!(prog.get(6).depth, 1);
    }

    #[test]
    fn sibling_ifs_resolve_independently() {
        let prog = compile("%a{k} == 1 { %b{x} = 2; }\n%a{k} == 2 { %b{x} = 3; }").unwrap();
        assert_eq!(prog.get(2).skip, Some(7));
        assert_eq!(prog.get(10).skip, Some(15));
    }

    #[test]
    fn exists_condition_compiles() {
        let prog = compile("exists %xplnvin{device} { %xplout{seen} = 1; }").unwrap();
        assert!(matches!(prog.get(1).op, Op::Exists));
        assert_eq!(prog.get(1).skip, Some(prog.len() - 1));
    }

    #[test]
    fn rejects_unknown_function() {
        assert!(matches!(
            compile("frobnicate(1);"),
            Err(ScriptError::Parse { .. })
        ));
    }

    #[test]
    fn rejects_literal_assignment_target() {
        assert!(compile("5 = 6;").is_err());
        assert!(compile("%a = 6;").is_err());
    }

    #[test]
    fn rejects_exists_on_literal() {
        assert!(compile("exists 5 { }").is_err());
    }

    #[test]
    fn rejects_missing_semicolon() {
        assert!(compile("%a{k} = 1").is_err());
    }

    #[test]
    fn parse_error_reports_line() {
        let err = compile("%a{k} = 1;\n%b{j} = ;").unwrap_err();
        match err {
            ScriptError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
