// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! The schedule walker.
//!
//! Polled at 1 Hz; acts only when the local minute changes. Astronomical
//! times for the current day are computed when the scheduler starts and
//! again at local midnight. Due entries come back as `(name, action)`
//! pairs for the caller to execute.

use chrono::{DateTime, Datelike, Local, NaiveDate, Timelike};
use tracing::{debug, warn};

use crate::cron::{CronError, CronSpec};
use crate::solar;

/// What to do when an entry fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedAction {
    RunScript(String),
}

/// A minute of local wall-clock time, as the cron fields see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickTime {
    pub minute: u32,
    pub hour: u32,
    pub mday: u32,
    /// Zero-based month, as matched by the month field.
    pub month0: u32,
    /// Day of week, Sunday = 0.
    pub wday_sun0: u32,
    pub date: NaiveDate,
}

impl TickTime {
    /// Split a local timestamp into tick fields plus the UTC offset in
    /// hours (daylight saving included).
    pub fn from_local(dt: &DateTime<Local>) -> (Self, f64) {
        let tick = Self {
            minute: dt.minute(),
            hour: dt.hour(),
            mday: dt.day(),
            month0: dt.month0(),
            wday_sun0: dt.weekday().num_days_from_sunday(),
            date: dt.date_naive(),
        };
        let offset_hours = f64::from(dt.offset().local_minus_utc()) / 3600.0;
        (tick, offset_hours)
    }
}

/// Dawn/dusk and sunrise/sunset as local `(hour, minute)`, when the sun
/// crosses the respective altitude at all that day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AstroTimes {
    pub dawn: Option<(u32, u32)>,
    pub dusk: Option<(u32, u32)>,
    pub sunrise: Option<(u32, u32)>,
    pub sunset: Option<(u32, u32)>,
}

fn to_local_hm(utc_hours: f64, offset_hours: f64) -> (u32, u32) {
    let local = (utc_hours + offset_hours).rem_euclid(24.0);
    let hour = local as u32;
    let minute = ((local - f64::from(hour)) * 60.0) as u32;
    (hour, minute)
}

impl AstroTimes {
    pub fn compute(date: NaiveDate, lat: f64, lon: f64, offset_hours: f64) -> Self {
        let year = date.year();
        let month = date.month();
        let day = date.day();

        let mut times = Self::default();
        match solar::civil_twilight(year, month, day, lon, lat) {
            Some((start, end)) => {
                times.dawn = Some(to_local_hm(start, offset_hours));
                times.dusk = Some(to_local_hm(end, offset_hours));
            }
            None => debug!("civil twilight times are not valid today"),
        }
        match solar::sun_rise_set(year, month, day, lon, lat) {
            Some((rise, set)) => {
                times.sunrise = Some(to_local_hm(rise, offset_hours));
                times.sunset = Some(to_local_hm(set, offset_hours));
            }
            None => debug!("sunrise and sunset times are not valid today"),
        }
        debug!(
            dawn = ?times.dawn,
            sunrise = ?times.sunrise,
            sunset = ?times.sunset,
            dusk = ?times.dusk,
            "astronomical times"
        );
        times
    }
}

struct Entry {
    name: String,
    spec: CronSpec,
    action: SchedAction,
    has_run: bool,
}

pub struct Scheduler {
    entries: Vec<Entry>,
    astro: AstroTimes,
    lat: f64,
    lon: f64,
    enabled: bool,
    prev_minute: Option<u32>,
}

impl Scheduler {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            entries: Vec::new(),
            astro: AstroTimes::default(),
            lat,
            lon,
            enabled: false,
            prev_minute: None,
        }
    }

    /// Add an entry. Bad expressions are rejected so the caller can log
    /// and skip the row.
    pub fn add(&mut self, name: &str, cron_expr: &str, action: SchedAction) -> Result<(), CronError> {
        let spec = CronSpec::parse(cron_expr)?;
        self.entries.push(Entry {
            name: name.to_string(),
            spec,
            action,
            has_run: false,
        });
        Ok(())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn astro(&self) -> &AstroTimes {
        &self.astro
    }

    /// Start evaluating: compute today's astronomical times and enable.
    pub fn start_at(&mut self, tick: &TickTime, offset_hours: f64) {
        self.astro = AstroTimes::compute(tick.date, self.lat, self.lon, offset_hours);
        self.enabled = true;
    }

    pub fn start(&mut self) {
        let (tick, offset) = TickTime::from_local(&Local::now());
        self.start_at(&tick, offset);
    }

    pub fn stop(&mut self) {
        self.enabled = false;
    }

    /// 1 Hz poll against the current local time.
    pub fn poll(&mut self) -> Vec<(String, SchedAction)> {
        let (tick, offset) = TickTime::from_local(&Local::now());
        self.poll_at(&tick, offset)
    }

    /// Evaluate one tick. Does nothing until the local minute changes.
    pub fn poll_at(&mut self, tick: &TickTime, offset_hours: f64) -> Vec<(String, SchedAction)> {
        if !self.enabled {
            return Vec::new();
        }
        if self.prev_minute == Some(tick.minute) {
            return Vec::new();
        }
        self.prev_minute = Some(tick.minute);

        // Midnight housekeeping: the sun moved to a new day.
        if tick.hour == 0 && tick.minute == 0 {
            self.astro = AstroTimes::compute(tick.date, self.lat, self.lon, offset_hours);
        }

        let mut due = Vec::new();
        for entry in &mut self.entries {
            let fire = match &entry.spec {
                CronSpec::Startup => {
                    if entry.has_run {
                        false
                    } else {
                        entry.has_run = true;
                        true
                    }
                }
                CronSpec::Dawn => at_matches(self.astro.dawn, tick),
                CronSpec::Dusk => at_matches(self.astro.dusk, tick),
                CronSpec::Sunrise => at_matches(self.astro.sunrise, tick),
                CronSpec::Sunset => at_matches(self.astro.sunset, tick),
                CronSpec::Fields(_) => entry.spec.matches_fields(
                    tick.minute,
                    tick.hour,
                    tick.mday,
                    tick.month0,
                    tick.wday_sun0,
                ),
            };
            if fire {
                debug!(entry = %entry.name, "schedule entry due");
                due.push((entry.name.clone(), entry.action.clone()));
            }
        }
        due
    }

    /// Load rows from the schedule table, skipping unparsable ones.
    pub fn load_rows<'r>(
        &mut self,
        rows: impl IntoIterator<Item = (&'r str, &'r str, &'r str)>,
    ) -> usize {
        let mut loaded = 0;
        for (name, cron_expr, script_name) in rows {
            match self.add(name, cron_expr, SchedAction::RunScript(script_name.to_string())) {
                Ok(()) => loaded += 1,
                Err(e) => warn!(entry = name, "skipping schedule row: {e}"),
            }
        }
        loaded
    }
}

fn at_matches(when: Option<(u32, u32)>, tick: &TickTime) -> bool {
    when == Some((tick.hour, tick.minute))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(date: NaiveDate, hour: u32, minute: u32) -> TickTime {
        TickTime {
            minute,
            hour,
            mday: date.day(),
            month0: date.month0(),
            wday_sun0: 0,
            date,
        }
    }

    fn june_21() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 6, 21).unwrap()
    }

    fn started(lat: f64, lon: f64, offset: f64) -> Scheduler {
        let mut sched = Scheduler::new(lat, lon);
        sched.start_at(&tick(june_21(), 3, 0), offset);
        sched
    }

    fn names(due: &[(String, SchedAction)]) -> Vec<&str> {
        due.iter().map(|(n, _)| n.as_str()).collect()
    }

    #[test]
    fn step_entry_fires_once_per_matching_minute() {
        let mut sched = started(33.0, -117.0, -7.0);
        sched
            .add("five", "*/5 * * * *", SchedAction::RunScript("s".into()))
            .unwrap();

        let date = june_21();
        // Minute 10 matches, and only fires once despite repeated polls.
        assert_eq!(names(&sched.poll_at(&tick(date, 9, 10), -7.0)), vec!["five"]);
        assert!(sched.poll_at(&tick(date, 9, 10), -7.0).is_empty());
        // Minute 11 does not match.
        assert!(sched.poll_at(&tick(date, 9, 11), -7.0).is_empty());
        // Minute 15 matches again.
        assert_eq!(names(&sched.poll_at(&tick(date, 9, 15), -7.0)), vec!["five"]);
    }

    #[test]
    fn startup_entry_fires_exactly_once() {
        let mut sched = started(33.0, -117.0, -7.0);
        sched
            .add("boot", "@startup", SchedAction::RunScript("s".into()))
            .unwrap();

        let date = june_21();
        assert_eq!(names(&sched.poll_at(&tick(date, 4, 1), -7.0)), vec!["boot"]);
        assert!(sched.poll_at(&tick(date, 4, 2), -7.0).is_empty());
        assert!(sched.poll_at(&tick(date, 4, 3), -7.0).is_empty());
    }

    #[test]
    fn sunrise_entry_fires_at_computed_minute_only() {
        let mut sched = started(33.0, -117.0, -7.0);
        sched
            .add("dawn_patrol", "@sunrise", SchedAction::RunScript("s".into()))
            .unwrap();

        let (hour, minute) = sched.astro().sunrise.unwrap();
        // Sanity: early morning for this date and place.
        assert_eq!(hour, 5);
        assert!((40..=44).contains(&minute), "sunrise minute {minute}");

        let date = june_21();
        let before = sched.poll_at(&tick(date, hour, minute - 1), -7.0);
        assert!(before.is_empty());
        let at = sched.poll_at(&tick(date, hour, minute), -7.0);
        assert_eq!(names(&at), vec!["dawn_patrol"]);
        let after = sched.poll_at(&tick(date, hour, minute + 1), -7.0);
        assert!(after.is_empty());
    }

    #[test]
    fn dusk_entry_uses_civil_twilight_end() {
        let mut sched = started(33.0, -117.0, -7.0);
        sched
            .add("lights", "@dusk", SchedAction::RunScript("s".into()))
            .unwrap();

        let (hour, minute) = sched.astro().dusk.unwrap();
        let sunset = sched.astro().sunset.unwrap();
        assert!((hour, minute) > sunset, "dusk must follow sunset");

        let date = june_21();
        let due = sched.poll_at(&tick(date, hour, minute), -7.0);
        assert_eq!(names(&due), vec!["lights"]);
    }

    #[test]
    fn midnight_recomputes_astro_times() {
        let mut sched = started(33.0, -117.0, -7.0);
        let before = *sched.astro();

        // Same date recompute is a no-op difference-wise, so fake a later
        // date at midnight and watch the times move.
        let december = NaiveDate::from_ymd_opt(2020, 12, 21).unwrap();
        sched.poll_at(&tick(december, 0, 0), -8.0);
        let after = *sched.astro();
        assert_ne!(before, after);
    }

    #[test]
    fn disabled_scheduler_stays_quiet() {
        let mut sched = Scheduler::new(33.0, -117.0);
        sched
            .add("five", "*/5 * * * *", SchedAction::RunScript("s".into()))
            .unwrap();
        assert!(sched.poll_at(&tick(june_21(), 9, 10), -7.0).is_empty());
    }

    #[test]
    fn load_rows_skips_bad_expressions() {
        let mut sched = Scheduler::new(33.0, -117.0);
        let loaded = sched.load_rows([
            ("good", "*/5 * * * *", "a"),
            ("bad", "1-5 * * * *", "b"),
            ("also_good", "@dusk", "c"),
        ]);
        assert_eq!(loaded, 2);
        assert_eq!(sched.len(), 2);
    }
}
