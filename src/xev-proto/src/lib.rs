// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! Wire-level types for the xPL protocol: service identity tags, the
//! message model, and the text frame codec.

pub mod error;
pub mod frame;
pub mod hash;
pub mod message;
pub mod nv;
pub mod tag;

pub use error::{FrameError, ParseErrorKind, TagError};
pub use frame::{encode, parse, MAX_FRAME};
pub use hash::oat_hash;
pub use message::{Message, MessageKind, Schema, Target};
pub use nv::NvList;
pub use tag::ServiceTag;
