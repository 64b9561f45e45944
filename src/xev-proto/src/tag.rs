// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! Service identity tags of the form `vendor-device.instance`.

use std::fmt;
use std::str::FromStr;

use crate::error::TagError;

const MAX_VENDOR: usize = 8;
const MAX_DEVICE: usize = 8;
const MAX_INSTANCE: usize = 16;

/// The `(vendor, device, instance)` triple that addresses an xPL endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceTag {
    pub vendor: String,
    pub device: String,
    pub instance: String,
}

impl ServiceTag {
    pub fn new(vendor: &str, device: &str, instance: &str) -> Result<Self, TagError> {
        check_component(vendor, MAX_VENDOR, &['-', '.'])?;
        check_component(device, MAX_DEVICE, &['.'])?;
        check_component(instance, MAX_INSTANCE, &[])?;
        Ok(Self {
            vendor: vendor.to_string(),
            device: device.to_string(),
            instance: instance.to_string(),
        })
    }

    /// True when all three components match, which is how a service decides
    /// a message is its own or is addressed to it.
    pub fn matches(&self, other: &ServiceTag) -> bool {
        self == other
    }
}

fn check_component(s: &str, max: usize, forbidden: &[char]) -> Result<(), TagError> {
    if s.is_empty() {
        return Err(TagError::EmptyComponent);
    }
    if s.len() > max {
        return Err(TagError::TooLong);
    }
    for c in s.chars() {
        if !c.is_ascii() || c.is_ascii_control() || c == ' ' || c == '*' {
            return Err(TagError::BadCharacter);
        }
        if forbidden.contains(&c) {
            return Err(TagError::BadCharacter);
        }
    }
    Ok(())
}

impl FromStr for ServiceTag {
    type Err = TagError;

    /// Splits at the first `-` and the first `.` after it.
    fn from_str(s: &str) -> Result<Self, TagError> {
        let (vendor, rest) = s.split_once('-').ok_or(TagError::MissingDevice)?;
        let (device, instance) = rest.split_once('.').ok_or(TagError::MissingInstance)?;
        ServiceTag::new(vendor, device, instance)
    }
}

impl fmt::Display for ServiceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}.{}", self.vendor, self.device, self.instance)
    }
}
