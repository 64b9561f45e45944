// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! Script tokenizer.
//!
//! Produces the token stream for one program; a fresh lexer is built per
//! compilation. `#` starts a comment running to end of line.

use crate::error::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    LBrace,
    RBrace,
    LParen,
    RParen,
    Semi,
    Comma,
    Assign,
    CmpEq,
    CmpNe,
    CmpLt,
    CmpGt,
    CmpLe,
    CmpGe,
    StrEq,
    Else,
    Exists,
    Ident(String),
    HashName(String),
    Str(String),
    Int(i64),
    Float(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: u32,
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    /// Lex the whole input.
    pub fn tokens(mut self) -> Result<Vec<Token>, ScriptError> {
        let mut out = Vec::new();
        while let Some(token) = self.next_token()? {
            out.push(token);
        }
        Ok(out)
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    fn skip_noise(&mut self) {
        while let Some(b) = self.peek() {
            match b {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.bump();
                }
                b'#' => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    fn number(&mut self, line: u32) -> Result<Tok, ScriptError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let mut saw_dot = false;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.pos += 1;
            } else if b == b'.' && !saw_dot {
                saw_dot = true;
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = String::from_utf8_lossy(&self.src[start..self.pos]);
        if saw_dot {
            text.parse::<f64>()
                .map(Tok::Float)
                .map_err(|_| ScriptError::parse(line, format!("bad float literal '{text}'")))
        } else {
            text.parse::<i64>()
                .map(Tok::Int)
                .map_err(|_| ScriptError::parse(line, format!("bad integer literal '{text}'")))
        }
    }

    fn string(&mut self, line: u32) -> Result<Tok, ScriptError> {
        // Opening quote already consumed.
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(b'"') => return Ok(Tok::Str(out)),
                Some(b'\n') | None => {
                    return Err(ScriptError::parse(line, "unterminated string literal"));
                }
                Some(b) => out.push(b as char),
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, ScriptError> {
        self.skip_noise();
        let line = self.line;
        let Some(b) = self.peek() else {
            return Ok(None);
        };

        let tok = match b {
            b'{' => {
                self.bump();
                Tok::LBrace
            }
            b'}' => {
                self.bump();
                Tok::RBrace
            }
            b'(' => {
                self.bump();
                Tok::LParen
            }
            b')' => {
                self.bump();
                Tok::RParen
            }
            b';' => {
                self.bump();
                Tok::Semi
            }
            b',' => {
                self.bump();
                Tok::Comma
            }
            b'=' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    Tok::CmpEq
                } else {
                    Tok::Assign
                }
            }
            b'!' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    Tok::CmpNe
                } else {
                    return Err(ScriptError::parse(line, "expected '=' after '!'"));
                }
            }
            b'<' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    Tok::CmpLe
                } else {
                    Tok::CmpLt
                }
            }
            b'>' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    Tok::CmpGe
                } else {
                    Tok::CmpGt
                }
            }
            b'"' => {
                self.bump();
                self.string(line)?
            }
            b'%' => {
                self.bump();
                let name = self.ident();
                if name.is_empty() {
                    return Err(ScriptError::parse(line, "expected hash name after '%'"));
                }
                Tok::HashName(name)
            }
            b'-' => self.number(line)?,
            b if b.is_ascii_digit() => self.number(line)?,
            b if b.is_ascii_alphabetic() || b == b'_' => {
                let word = self.ident();
                match word.as_str() {
                    "else" => Tok::Else,
                    "exists" => Tok::Exists,
                    "eq" => Tok::StrEq,
                    _ => Tok::Ident(word),
                }
            }
            other => {
                return Err(ScriptError::parse(
                    line,
                    format!("unexpected character '{}'", other as char),
                ));
            }
        };
        Ok(Some(Token { tok, line }))
    }
}
