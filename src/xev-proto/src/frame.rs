// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! Text frame codec.
//!
//! A frame is two blocks: the header block
//! (`xpl-cmnd|xpl-stat|xpl-trig` + `{hop,source,target}`) followed by the
//! schema block (`CLASS.TYPE` + the message body). The parser is a
//! character-at-a-time block scanner; errors carry the byte offset of the
//! failing character so a dropped packet can be diagnosed from the log.

use crate::error::{FrameError, ParseErrorKind};
use crate::message::{Message, MessageKind, Schema, Target};
use crate::nv::NvList;
use crate::tag::ServiceTag;

/// Datagram MTU budget: an encoded frame may not exceed this.
pub const MAX_FRAME: usize = 1500;

/// Names and values are each bounded to this many characters.
const MAX_ENTRY: usize = 31;

/// Block headers (`xpl-cmnd`, `CLASS.TYPE`) are bounded to this.
const MAX_BLOCK_HEADER: usize = 63;

/// Printable ASCII minus `{`, `}`, `=` and LF.
fn is_entry_char(b: u8) -> bool {
    (0x20..=0x7e).contains(&b) && b != b'{' && b != b'}' && b != b'='
}

fn is_header_char(b: u8) -> bool {
    (0x21..=0x7e).contains(&b) && b != b'{' && b != b'}'
}

struct Block {
    header: String,
    pairs: NvList,
}

enum ScanState {
    Header,
    OpenBrace,
    OpenNewline,
    Name,
    Value,
    CloseNewline,
}

/// Scan one block starting at `input[0]`. `base` is the offset of
/// `input[0]` in the whole frame, used for error positions. Returns the
/// block and the number of bytes consumed, or `None` when the remaining
/// input never starts a block (trailing stream garbage).
fn scan_block(input: &[u8], base: usize) -> Result<Option<(Block, usize)>, FrameError> {
    let mut state = ScanState::Header;
    let mut started = false;
    let mut header = String::new();
    let mut name = String::new();
    let mut value = String::new();
    let mut pairs = NvList::new();

    for (i, &b) in input.iter().enumerate() {
        let off = base + i;
        match state {
            ScanState::Header => {
                if b == b'\n' && started {
                    state = ScanState::OpenBrace;
                } else if !started && b <= 0x20 {
                    // leading junk before the block begins
                } else if is_header_char(b) {
                    started = true;
                    if header.len() >= MAX_BLOCK_HEADER {
                        return Err(FrameError::at(off, ParseErrorKind::HeaderOverflow));
                    }
                    header.push(b as char);
                } else {
                    return Err(FrameError::at(off, ParseErrorKind::BadHeaderChar));
                }
            }
            ScanState::OpenBrace => {
                if b == b'{' {
                    state = ScanState::OpenNewline;
                } else {
                    return Err(FrameError::at(off, ParseErrorKind::ExpectedBrace));
                }
            }
            ScanState::OpenNewline => {
                if b == b'\n' {
                    state = ScanState::Name;
                } else {
                    return Err(FrameError::at(off, ParseErrorKind::ExpectedNewline));
                }
            }
            ScanState::Name => {
                if b == b'=' {
                    state = ScanState::Value;
                } else if b == b'}' {
                    state = ScanState::CloseNewline;
                } else if is_entry_char(b) {
                    if name.len() >= MAX_ENTRY {
                        return Err(FrameError::at(off, ParseErrorKind::NameOverflow));
                    }
                    name.push(b as char);
                } else {
                    return Err(FrameError::at(off, ParseErrorKind::BadNameChar));
                }
            }
            ScanState::Value => {
                if b == b'\n' {
                    pairs.push(&name, &value);
                    name.clear();
                    value.clear();
                    state = ScanState::Name;
                } else if is_entry_char(b) {
                    if value.len() >= MAX_ENTRY {
                        return Err(FrameError::at(off, ParseErrorKind::ValueOverflow));
                    }
                    value.push(b as char);
                } else {
                    return Err(FrameError::at(off, ParseErrorKind::BadValueChar));
                }
            }
            ScanState::CloseNewline => {
                if b == b'\n' {
                    return Ok(Some((Block { header, pairs }, i + 1)));
                }
                return Err(FrameError::at(off, ParseErrorKind::ExpectedNewline));
            }
        }
    }

    if !started {
        return Ok(None);
    }
    Err(FrameError::at(base + input.len(), ParseErrorKind::Truncated))
}

/// Parse one datagram into a message.
pub fn parse(text: &str) -> Result<Message, FrameError> {
    let bytes = text.as_bytes();

    let (head, consumed) = scan_block(bytes, 0)?
        .ok_or_else(|| FrameError::at(0, ParseErrorKind::MissingBlock))?;

    let kind = match head.header.as_str() {
        "xpl-cmnd" => MessageKind::Command,
        "xpl-stat" => MessageKind::Status,
        "xpl-trig" => MessageKind::Trigger,
        other => {
            return Err(FrameError::at(0, ParseErrorKind::UnknownHeader(other.to_string())));
        }
    };

    let hop = head
        .pairs
        .get("hop")
        .ok_or_else(|| FrameError::at(0, ParseErrorKind::MissingHop))?
        .parse::<u32>()
        .ok()
        .filter(|h| *h >= 1)
        .ok_or_else(|| FrameError::at(0, ParseErrorKind::BadHop))?;

    let source: ServiceTag = head
        .pairs
        .get("source")
        .ok_or_else(|| FrameError::at(0, ParseErrorKind::MissingSource))?
        .parse()
        .map_err(|_| FrameError::at(0, ParseErrorKind::BadSource))?;

    let target = match head.pairs.get("target") {
        None => return Err(FrameError::at(0, ParseErrorKind::MissingTarget)),
        Some("*") => Target::Broadcast,
        Some(t) => Target::Unicast(
            t.parse()
                .map_err(|_| FrameError::at(0, ParseErrorKind::BadTarget))?,
        ),
    };

    let (body, _) = scan_block(&bytes[consumed..], consumed)?
        .ok_or_else(|| FrameError::at(consumed, ParseErrorKind::MissingBlock))?;

    let schema = Schema::parse(&body.header)
        .ok_or_else(|| FrameError::at(consumed, ParseErrorKind::BadSchema))?;

    Ok(Message {
        kind,
        hop,
        source,
        target,
        schema,
        body: body.pairs,
    })
}

fn put(out: &mut String, s: &str) -> Result<(), FrameError> {
    if out.len() + s.len() > MAX_FRAME {
        return Err(FrameError::Oversize(out.len() + s.len()));
    }
    out.push_str(s);
    Ok(())
}

/// Encode a message into its wire text. The hop count is always written as
/// 1 regardless of the message's own value.
pub fn encode(msg: &Message) -> Result<String, FrameError> {
    if msg.schema.class.is_empty() || msg.schema.typ.is_empty() {
        return Err(FrameError::MissingSchema);
    }

    let mut out = String::with_capacity(MAX_FRAME);
    put(&mut out, msg.kind.wire_header())?;
    put(&mut out, "\n{\nhop=1\nsource=")?;
    put(&mut out, &msg.source.to_string())?;
    put(&mut out, "\n")?;
    match &msg.target {
        Target::Broadcast => put(&mut out, "target=*")?,
        Target::Unicast(tag) => {
            put(&mut out, "target=")?;
            put(&mut out, &tag.to_string())?;
        }
    }
    put(&mut out, "\n}\n")?;
    put(&mut out, &msg.schema.class)?;
    put(&mut out, ".")?;
    put(&mut out, &msg.schema.typ)?;
    put(&mut out, "\n{\n")?;
    for (name, value) in msg.body.iter() {
        put(&mut out, name)?;
        put(&mut out, "=")?;
        put(&mut out, value)?;
        put(&mut out, "\n")?;
    }
    put(&mut out, "}\n")?;
    Ok(out)
}
