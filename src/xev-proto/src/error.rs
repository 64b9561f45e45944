// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

use thiserror::Error;

/// Validation errors for `vendor-device.instance` tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("tag is missing the '-' between vendor and device")]
    MissingDevice,
    #[error("tag is missing the '.' between device and instance")]
    MissingInstance,
    #[error("tag component is empty")]
    EmptyComponent,
    #[error("tag component exceeds its length limit")]
    TooLong,
    #[error("tag component contains an invalid character")]
    BadCharacter,
}

/// What went wrong at a given byte while scanning a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    BadHeaderChar,
    HeaderOverflow,
    ExpectedBrace,
    ExpectedNewline,
    BadNameChar,
    NameOverflow,
    BadValueChar,
    ValueOverflow,
    Truncated,
    MissingBlock,
    UnknownHeader(String),
    MissingHop,
    BadHop,
    MissingSource,
    BadSource,
    MissingTarget,
    BadTarget,
    BadSchema,
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadHeaderChar => write!(f, "invalid character in block header"),
            Self::HeaderOverflow => write!(f, "block header too long"),
            Self::ExpectedBrace => write!(f, "expected '{{' at start of block"),
            Self::ExpectedNewline => write!(f, "expected line feed"),
            Self::BadNameChar => write!(f, "invalid character in entry name"),
            Self::NameOverflow => write!(f, "entry name too long"),
            Self::BadValueChar => write!(f, "invalid character in entry value"),
            Self::ValueOverflow => write!(f, "entry value too long"),
            Self::Truncated => write!(f, "ran out of input inside a block"),
            Self::MissingBlock => write!(f, "expected a message block"),
            Self::UnknownHeader(h) => write!(f, "unknown message header '{h}'"),
            Self::MissingHop => write!(f, "header block is missing 'hop'"),
            Self::BadHop => write!(f, "'hop' is not a positive integer"),
            Self::MissingSource => write!(f, "header block is missing 'source'"),
            Self::BadSource => write!(f, "'source' is not a valid tag"),
            Self::MissingTarget => write!(f, "header block is missing 'target'"),
            Self::BadTarget => write!(f, "'target' is not '*' or a valid tag"),
            Self::BadSchema => write!(f, "schema block header is not CLASS.TYPE"),
        }
    }
}

/// Frame codec errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The message has an empty schema class or type; nothing was sent.
    #[error("message is missing its schema")]
    MissingSchema,
    /// The encoded frame would exceed the datagram budget.
    #[error("encoded frame of {0} bytes exceeds the frame limit")]
    Oversize(usize),
    /// The scanner rejected the input. `offset` is the failing byte.
    #[error("parse error at byte {offset}: {kind}")]
    Parse { offset: usize, kind: ParseErrorKind },
}

impl FrameError {
    pub(crate) fn at(offset: usize, kind: ParseErrorKind) -> Self {
        Self::Parse { offset, kind }
    }
}
