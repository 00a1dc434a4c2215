//! Geospatial primitives: trace interpolation, distance and bearings
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// One position sample of a trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TracePoint {
    pub time: NaiveDateTime,
    pub lat: f64,
    pub lon: f64,
    pub bearing: f64,
    pub elevation: Option<f64>,
}

/// Position interpolated at an instant of a trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpolated {
    pub lat: f64,
    pub lon: f64,
    pub bearing: f64,
    pub elevation: Option<f64>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoError {
    #[error("GEO/EMPTY: trace has no points")]
    EmptyTrace,

    #[error("GEO/RANGE: {time} is outside the trace interval [{start}, {end}]")]
    OutOfRange {
        time: NaiveDateTime,
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
}

/// Seconds from `a` to `b`, microsecond resolution.
pub fn seconds_between(a: NaiveDateTime, b: NaiveDateTime) -> f64 {
    let delta = b - a;
    delta
        .num_microseconds()
        .map(|us| us as f64 / 1e6)
        .unwrap_or_else(|| delta.num_seconds() as f64)
}

/// Duration of `seconds`, rounded to the microsecond.
pub fn duration_from_secs(seconds: f64) -> Duration {
    Duration::microseconds((seconds * 1e6).round() as i64)
}

/// Wrap an angle in degrees into `[0, 360)`.
pub fn normalize_bearing(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Absolute difference of two headings, in `[0, 180]`.
pub fn bearing_difference(a: f64, b: f64) -> f64 {
    let d = normalize_bearing(a - b);
    if d > 180.0 {
        360.0 - d
    } else {
        d
    }
}

/// Great-circle distance in meters (haversine).
pub fn distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let to_rad = |deg: f64| deg.to_radians();
    let dlat = to_rad(lat2 - lat1);
    let dlon = to_rad(lon2 - lon1);
    let a = (dlat / 2.0).sin().powi(2)
        + to_rad(lat1).cos() * to_rad(lat2).cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial great-circle bearing from the first to the second position, `[0, 360)`.
pub fn initial_bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dlon = (lon2 - lon1).to_radians();
    let y = dlon.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlon.cos();
    normalize_bearing(y.atan2(x).to_degrees())
}

/// Interpolate position, bearing and elevation of `trace` at `time`.
///
/// `trace` must be sorted by strictly ascending time. Both ends are
/// inclusive; anything outside fails with [`GeoError::OutOfRange`].
pub fn interpolate(trace: &[TracePoint], time: NaiveDateTime) -> Result<Interpolated, GeoError> {
    let (first, last) = match (trace.first(), trace.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(GeoError::EmptyTrace),
    };
    if time < first.time || time > last.time {
        return Err(GeoError::OutOfRange {
            time,
            start: first.time,
            end: last.time,
        });
    }
    if trace.len() == 1 {
        return Ok(Interpolated {
            lat: first.lat,
            lon: first.lon,
            bearing: normalize_bearing(first.bearing),
            elevation: first.elevation,
        });
    }

    // First index whose time is after `time`; `time == last.time` uses the last segment
    let upper = trace.partition_point(|p| p.time <= time).min(trace.len() - 1);
    let before = &trace[upper - 1];
    let after = &trace[upper];

    let span = seconds_between(before.time, after.time);
    let weight = if span > 0.0 {
        seconds_between(before.time, time) / span
    } else {
        0.0
    };
    let lerp = |a: f64, b: f64| a + weight * (b - a);

    let bearing = if before.lat == after.lat && before.lon == after.lon {
        normalize_bearing(before.bearing)
    } else {
        initial_bearing(before.lat, before.lon, after.lat, after.lon)
    };
    let elevation = match (before.elevation, after.elevation) {
        (Some(a), Some(b)) => Some(lerp(a, b)),
        (a, b) => a.or(b),
    };

    Ok(Interpolated {
        lat: lerp(before.lat, after.lat),
        lon: lerp(before.lon, after.lon),
        bearing,
        elevation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(secs: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 5, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
            + Duration::seconds(secs)
    }

    fn point(secs: i64, lat: f64, lon: f64, elevation: Option<f64>) -> TracePoint {
        TracePoint {
            time: at(secs),
            lat,
            lon,
            bearing: 0.0,
            elevation,
        }
    }

    fn trace() -> Vec<TracePoint> {
        vec![
            point(0, 0.0, 0.0, Some(10.0)),
            point(10, 0.0, 0.001, Some(20.0)),
            point(20, 0.001, 0.001, None),
        ]
    }

    #[test]
    fn test_haversine_distance() {
        let dist = distance(0.0, 0.0, 0.0, 1.0);
        assert!((dist - 111_195.0).abs() < 200.0);
    }

    #[test]
    fn test_normalize_bearing() {
        assert_eq!(normalize_bearing(350.0 + 20.0), 10.0);
        assert_eq!(normalize_bearing(-90.0), 270.0);
        assert_eq!(normalize_bearing(360.0), 0.0);
        assert!(normalize_bearing(-1e-15) < 360.0);
    }

    #[test]
    fn test_bearing_difference_wraps() {
        assert_eq!(bearing_difference(359.0, 1.0), 2.0);
        assert_eq!(bearing_difference(90.0, 270.0), 180.0);
    }

    #[test]
    fn test_initial_bearing_cardinal() {
        assert!((initial_bearing(0.0, 0.0, 0.0, 1.0) - 90.0).abs() < 1e-9);
        assert!(initial_bearing(0.0, 0.0, 1.0, 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_interpolate_midpoint() {
        let result = interpolate(&trace(), at(5)).unwrap();
        assert!((result.lon - 0.0005).abs() < 1e-12);
        assert_eq!(result.lat, 0.0);
        assert!((result.bearing - 90.0).abs() < 1e-6);
        assert_eq!(result.elevation, Some(15.0));
    }

    #[test]
    fn test_interpolate_inclusive_bounds() {
        let trace = trace();
        let start = interpolate(&trace, at(0)).unwrap();
        assert_eq!((start.lat, start.lon), (0.0, 0.0));

        let end = interpolate(&trace, at(20)).unwrap();
        assert_eq!((end.lat, end.lon), (0.001, 0.001));
        assert!(end.bearing.abs() < 1e-6);
    }

    #[test]
    fn test_interpolate_one_microsecond_outside_fails() {
        let trace = trace();
        let before = at(0) - Duration::microseconds(1);
        let after = at(20) + Duration::microseconds(1);

        assert!(matches!(interpolate(&trace, before), Err(GeoError::OutOfRange { .. })));
        assert!(matches!(interpolate(&trace, after), Err(GeoError::OutOfRange { .. })));
    }

    #[test]
    fn test_interpolate_empty_trace() {
        assert_eq!(interpolate(&[], at(0)), Err(GeoError::EmptyTrace));
    }

    #[test]
    fn test_seconds_roundtrip() {
        assert_eq!(seconds_between(at(0), at(0) + duration_from_secs(1.25)), 1.25);
        assert_eq!(seconds_between(at(10), at(0)), -10.0);
    }
}
