// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! Closed-form solar position (Schlyter's method).
//!
//! Computes sunrise/sunset (upper-limb crossing with standard refraction)
//! and civil twilight (disc center at -6 degrees) as UTC hours for a given
//! calendar date and position. Accuracy is a minute or two, which is all a
//! minute-resolution scheduler needs. Results may fall outside `[0, 24)`;
//! callers shift them into local time and wrap.

const DEG_RAD: f64 = std::f64::consts::PI / 180.0;
const RAD_DEG: f64 = 180.0 / std::f64::consts::PI;

fn sind(x: f64) -> f64 {
    (x * DEG_RAD).sin()
}

fn cosd(x: f64) -> f64 {
    (x * DEG_RAD).cos()
}

fn acosd(x: f64) -> f64 {
    x.acos() * RAD_DEG
}

fn atan2d(y: f64, x: f64) -> f64 {
    y.atan2(x) * RAD_DEG
}

/// Reduce an angle to `[0, 360)`.
fn revolution(x: f64) -> f64 {
    x - 360.0 * (x / 360.0).floor()
}

/// Reduce an angle to `[-180, 180)`.
fn rev180(x: f64) -> f64 {
    x - 360.0 * (x / 360.0 + 0.5).floor()
}

/// Days since 2000-01-00 (Gregorian). Month is 1..=12.
fn days_since_2000(year: i32, month: u32, day: u32) -> f64 {
    let m = month as i32;
    let d = day as i32;
    f64::from(367 * year - 7 * (year + (m + 9) / 12) / 4 + 275 * m / 9 + d - 730_530)
}

/// Greenwich mean sidereal time at 00h UT, in degrees.
fn gmst0(d: f64) -> f64 {
    revolution(180.0 + 356.0470 + 282.9404 + (0.985_600_258_5 + 4.709_35e-5) * d)
}

/// Sun's ecliptic longitude and distance.
fn sunpos(d: f64) -> (f64, f64) {
    let mean_anomaly = revolution(356.0470 + 0.985_600_258_5 * d);
    let perihelion = 282.9404 + 4.709_35e-5 * d;
    let eccentricity = 0.016709 - 1.151e-9 * d;

    let e_anomaly = mean_anomaly
        + eccentricity * RAD_DEG * sind(mean_anomaly) * (1.0 + eccentricity * cosd(mean_anomaly));
    let x = cosd(e_anomaly) - eccentricity;
    let y = (1.0 - eccentricity * eccentricity).sqrt() * sind(e_anomaly);
    let distance = (x * x + y * y).sqrt();
    let true_anomaly = atan2d(y, x);
    (revolution(true_anomaly + perihelion), distance)
}

/// Sun's right ascension, declination, and distance.
fn sun_ra_dec(d: f64) -> (f64, f64, f64) {
    let (lon, r) = sunpos(d);
    let x = r * cosd(lon);
    let y = r * sind(lon);

    let obliquity = 23.4393 - 3.563e-7 * d;
    let y_equat = y * cosd(obliquity);
    let z_equat = y * sind(obliquity);

    let ra = atan2d(y_equat, x);
    let dec = atan2d(z_equat, (x * x + y_equat * y_equat).sqrt());
    (ra, dec, r)
}

/// Core rise/set solver. `altitude` is the threshold in degrees (negative
/// below the mathematical horizon); with `upper_limb` the sun's apparent
/// radius is subtracted so the crossing tracks the disc's upper edge.
/// Returns `(rise, set)` as UTC hours, or `None` when the sun never
/// crosses the altitude that day (polar day or night).
fn rise_set(
    year: i32,
    month: u32,
    day: u32,
    lon: f64,
    lat: f64,
    altitude: f64,
    upper_limb: bool,
) -> Option<(f64, f64)> {
    let d = days_since_2000(year, month, day) + 0.5 - lon / 360.0;

    let sidtime = revolution(gmst0(d) + 180.0 + lon);
    let (ra, dec, dist) = sun_ra_dec(d);
    let t_south = 12.0 - rev180(sidtime - ra) / 15.0;

    let mut altit = altitude;
    if upper_limb {
        let apparent_radius = 0.2666 / dist;
        altit -= apparent_radius;
    }

    let cos_t = (sind(altit) - sind(lat) * sind(dec)) / (cosd(lat) * cosd(dec));
    if !(-1.0..=1.0).contains(&cos_t) {
        return None;
    }
    let diurnal_arc = acosd(cos_t) / 15.0;
    Some((t_south - diurnal_arc, t_south + diurnal_arc))
}

/// Sunrise and sunset: upper limb touching the horizon, including the
/// standard -35 arc-minute refraction term.
pub fn sun_rise_set(year: i32, month: u32, day: u32, lon: f64, lat: f64) -> Option<(f64, f64)> {
    rise_set(year, month, day, lon, lat, -35.0 / 60.0, true)
}

/// Civil twilight: disc center at -6 degrees.
pub fn civil_twilight(year: i32, month: u32, day: u32, lon: f64, lat: f64) -> Option<(f64, f64)> {
    rise_set(year, month, day, lon, lat, -6.0, false)
}
