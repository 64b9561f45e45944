// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! The in-memory message model: kind, hop, source, target, schema, body.

use std::fmt;

use crate::nv::NvList;
use crate::tag::ServiceTag;

/// The three xPL message kinds, in wire order `xpl-cmnd|xpl-stat|xpl-trig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Command,
    Status,
    Trigger,
}

impl MessageKind {
    pub fn wire_header(self) -> &'static str {
        match self {
            Self::Command => "xpl-cmnd",
            Self::Status => "xpl-stat",
            Self::Trigger => "xpl-trig",
        }
    }

    /// Short form accepted by the script `xplcmd` builtin.
    pub fn from_short(s: &str) -> Option<Self> {
        match s {
            "cmnd" => Some(Self::Command),
            "stat" => Some(Self::Status),
            "trig" => Some(Self::Trigger),
            _ => None,
        }
    }
}

/// Message destination: the broadcast wildcard or a specific endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Broadcast,
    Unicast(ServiceTag),
}

impl Target {
    pub fn is_broadcast(&self) -> bool {
        matches!(self, Self::Broadcast)
    }
}

/// `CLASS.TYPE` schema pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub class: String,
    pub typ: String,
}

impl Schema {
    pub fn new(class: &str, typ: &str) -> Self {
        Self {
            class: class.to_string(),
            typ: typ.to_string(),
        }
    }

    /// Splits `CLASS.TYPE` at the first dot; both halves must be non-empty.
    pub fn parse(s: &str) -> Option<Self> {
        let (class, typ) = s.split_once('.')?;
        if class.is_empty() || typ.is_empty() {
            return None;
        }
        Some(Self::new(class, typ))
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.typ)
    }
}

/// One xPL message, received or about to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub hop: u32,
    pub source: ServiceTag,
    pub target: Target,
    pub schema: Schema,
    pub body: NvList,
}

impl Message {
    /// A broadcast message from `source`. The schema must be set before the
    /// message can be encoded.
    pub fn broadcast(kind: MessageKind, source: ServiceTag, schema: Schema) -> Self {
        Self {
            kind,
            hop: 1,
            source,
            target: Target::Broadcast,
            schema,
            body: NvList::new(),
        }
    }

    /// A message addressed at a single endpoint.
    pub fn targeted(
        kind: MessageKind,
        source: ServiceTag,
        target: ServiceTag,
        schema: Schema,
    ) -> Self {
        Self {
            kind,
            hop: 1,
            source,
            target: Target::Unicast(target),
            schema,
            body: NvList::new(),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.target.is_broadcast()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_short_forms() {
        assert_eq!(MessageKind::from_short("cmnd"), Some(MessageKind::Command));
        assert_eq!(MessageKind::from_short("stat"), Some(MessageKind::Status));
        assert_eq!(MessageKind::from_short("trig"), Some(MessageKind::Trigger));
        assert_eq!(MessageKind::from_short("xpl-cmnd"), None);
    }

    #[test]
    fn schema_parse_requires_both_halves() {
        assert_eq!(
            Schema::parse("sensor.basic"),
            Some(Schema::new("sensor", "basic"))
        );
        assert_eq!(Schema::parse("sensorbasic"), None);
        assert_eq!(Schema::parse(".basic"), None);
        assert_eq!(Schema::parse("sensor."), None);
    }

    #[test]
    fn broadcast_constructor_sets_hop_one() {
        let src: ServiceTag = "acme-test.default".parse().unwrap();
        let msg = Message::broadcast(MessageKind::Status, src, Schema::new("hbeat", "app"));
        assert_eq!(msg.hop, 1);
        assert!(msg.is_broadcast());
    }
}
