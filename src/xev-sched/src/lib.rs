// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! Minute-resolution scheduler with cron-like expressions extended by
//! `@startup` and the astronomical events `@dawn`, `@sunrise`, `@sunset`,
//! `@dusk`.

pub mod cron;
pub mod scheduler;
pub mod solar;

pub use cron::{CronError, CronField, CronSpec};
pub use scheduler::{AstroTimes, SchedAction, Scheduler, TickTime};
pub use solar::{civil_twilight, sun_rise_set};
