// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! Cron expression parsing and matching.
//!
//! An expression is either one of the `@` tokens or five whitespace
//! separated fields in the order minute, hour, mday, month, wday. Each
//! field supports `N`, `N,N,...`, `*` and `*/M`. Ranges and stepped
//! non-wildcards are rejected. The month field matches the zero-based
//! month number and wday counts from Sunday = 0.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronError {
    #[error("unrecognized '@' command '{0}'")]
    UnknownAtCommand(String),
    #[error("expected 5 cron fields, found {0}")]
    WrongFieldCount(usize),
    #[error("range expressions are not supported: '{0}'")]
    UnsupportedRange(String),
    #[error("bad cron field '{0}'")]
    BadField(String),
}

/// One of the five positional fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CronField {
    /// `*`
    Any,
    /// `*/M`, matching when the value is divisible by M.
    Step(u32),
    /// `N` or `N,N,...`
    List(Vec<u32>),
}

impl CronField {
    pub fn matches(&self, value: u32) -> bool {
        match self {
            Self::Any => true,
            Self::Step(m) => value % m == 0,
            Self::List(values) => values.contains(&value),
        }
    }

    fn parse(text: &str) -> Result<Self, CronError> {
        if text == "*" {
            return Ok(Self::Any);
        }
        if let Some(step) = text.strip_prefix("*/") {
            let m: u32 = step
                .parse()
                .map_err(|_| CronError::BadField(text.to_string()))?;
            if m == 0 {
                return Err(CronError::BadField(text.to_string()));
            }
            return Ok(Self::Step(m));
        }
        if text.contains('-') {
            return Err(CronError::UnsupportedRange(text.to_string()));
        }
        let values = text
            .split(',')
            .map(|n| n.parse::<u32>())
            .collect::<Result<Vec<u32>, _>>()
            .map_err(|_| CronError::BadField(text.to_string()))?;
        if values.is_empty() {
            return Err(CronError::BadField(text.to_string()));
        }
        Ok(Self::List(values))
    }
}

/// A parsed schedule expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CronSpec {
    /// Fires on the first evaluation after the scheduler starts.
    Startup,
    Dawn,
    Dusk,
    Sunrise,
    Sunset,
    /// minute, hour, mday, month (zero based), wday (Sunday = 0).
    Fields(Box<[CronField; 5]>),
}

impl CronSpec {
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let expr = expr.trim();
        if let Some(at) = expr.strip_prefix('@') {
            return match at {
                "startup" => Ok(Self::Startup),
                "dawn" => Ok(Self::Dawn),
                "dusk" => Ok(Self::Dusk),
                "sunrise" => Ok(Self::Sunrise),
                "sunset" => Ok(Self::Sunset),
                other => Err(CronError::UnknownAtCommand(other.to_string())),
            };
        }

        let parts: Vec<&str> = expr.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(CronError::WrongFieldCount(parts.len()));
        }
        let mut fields = Vec::with_capacity(5);
        for part in parts {
            fields.push(CronField::parse(part)?);
        }
        let fields: [CronField; 5] = fields
            .try_into()
            .unwrap_or_else(|_| unreachable!("five fields were just parsed"));
        Ok(Self::Fields(Box::new(fields)))
    }

    /// Evaluate the five-field form; `@` forms always return false here.
    pub fn matches_fields(
        &self,
        minute: u32,
        hour: u32,
        mday: u32,
        month0: u32,
        wday_sun0: u32,
    ) -> bool {
        match self {
            Self::Fields(f) => {
                f[0].matches(minute)
                    && f[1].matches(hour)
                    && f[2].matches(mday)
                    && f[3].matches(month0)
                    && f[4].matches(wday_sun0)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_at_commands() {
        assert_eq!(CronSpec::parse("@startup").unwrap(), CronSpec::Startup);
        assert_eq!(CronSpec::parse("@sunrise").unwrap(), CronSpec::Sunrise);
        assert_eq!(CronSpec::parse("@dusk").unwrap(), CronSpec::Dusk);
        assert!(matches!(
            CronSpec::parse("@midnight"),
            Err(CronError::UnknownAtCommand(_))
        ));
    }

    #[test]
    fn step_field_matches_divisible_minutes() {
        let spec = CronSpec::parse("*/5 * * * *").unwrap();
        assert!(spec.matches_fields(10, 3, 14, 6, 2));
        assert!(spec.matches_fields(0, 3, 14, 6, 2));
        assert!(!spec.matches_fields(11, 3, 14, 6, 2));
    }

    #[test]
    fn comma_list_matches_members_only() {
        let spec = CronSpec::parse("0,30 6,18 * * *").unwrap();
        assert!(spec.matches_fields(30, 6, 1, 0, 0));
        assert!(spec.matches_fields(0, 18, 1, 0, 0));
        assert!(!spec.matches_fields(15, 6, 1, 0, 0));
        assert!(!spec.matches_fields(30, 7, 1, 0, 0));
    }

    #[test]
    fn all_five_fields_must_match() {
        let spec = CronSpec::parse("0 12 25 11 *").unwrap();
        assert!(spec.matches_fields(0, 12, 25, 11, 5));
        assert!(!spec.matches_fields(0, 12, 25, 10, 5));
        assert!(!spec.matches_fields(0, 12, 24, 11, 5));
    }

    #[test]
    fn wday_field_counts_from_sunday() {
        let spec = CronSpec::parse("* * * * 0").unwrap();
        assert!(spec.matches_fields(0, 0, 1, 0, 0));
        assert!(!spec.matches_fields(0, 0, 1, 0, 1));
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(matches!(
            CronSpec::parse("* * * *"),
            Err(CronError::WrongFieldCount(4))
        ));
    }

    #[test]
    fn rejects_ranges_and_bad_steps() {
        assert!(matches!(
            CronSpec::parse("1-5 * * * *"),
            Err(CronError::UnsupportedRange(_))
        ));
        assert!(matches!(
            CronSpec::parse("*/0 * * * *"),
            Err(CronError::BadField(_))
        ));
        assert!(matches!(
            CronSpec::parse("x * * * *"),
            Err(CronError::BadField(_))
        ));
    }
}
