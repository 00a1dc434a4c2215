//! Duplicate timestamp disambiguation
//!
//! Cameras often stamp capture time with one-second resolution while shooting
//! several frames per second. Runs of identical timestamps are spread evenly
//! over the interval up to the next distinct timestamp.
use crate::geo::{duration_from_secs, seconds_between};
use chrono::NaiveDateTime;

/// Spread runs of equal timestamps across their inferred capture interval.
///
/// `capture_times` must be sorted ascending. A run of `n` equal times `t`
/// followed by a distinct time `t + i` becomes `t, t + i/n, ..., t + (n-1)i/n`.
/// The last run reuses the interval of the run before it; when every input is
/// identical the interval is `n` seconds, i.e. one frame per second. Order
/// among ties is preserved. Fewer than two inputs are returned unchanged.
pub fn interpolate_timestamps(capture_times: &[NaiveDateTime]) -> Vec<NaiveDateTime> {
    if capture_times.len() < 2 {
        return capture_times.to_vec();
    }

    // (start time, run length)
    let mut runs: Vec<(NaiveDateTime, usize)> = Vec::new();
    for &t in capture_times {
        match runs.last_mut() {
            Some((start, count)) if *start == t => *count += 1,
            _ => runs.push((t, 1)),
        }
    }

    let intervals: Vec<f64> = if runs.len() == 1 {
        vec![runs[0].1 as f64]
    } else {
        let mut intervals: Vec<f64> = runs
            .windows(2)
            .map(|w| seconds_between(w[0].0, w[1].0))
            .collect();
        let last = intervals[intervals.len() - 1];
        intervals.push(last);
        intervals
    };

    let mut resolved = Vec::with_capacity(capture_times.len());
    for (&(start, count), interval) in runs.iter().zip(intervals) {
        for k in 0..count {
            let shift = k as f64 * interval / count as f64;
            resolved.push(start + duration_from_secs(shift));
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 8, 20)
            .unwrap()
            .and_hms_opt(7, 30, 0)
            .unwrap()
    }

    fn secs(s: f64) -> NaiveDateTime {
        t0() + duration_from_secs(s)
    }

    #[test]
    fn test_triple_spread_over_next_interval() {
        let input = vec![t0(), t0(), t0(), secs(6.0)];
        let resolved = interpolate_timestamps(&input);
        assert_eq!(resolved, vec![secs(0.0), secs(2.0), secs(4.0), secs(6.0)]);
    }

    #[test]
    fn test_last_run_uses_previous_interval() {
        let input = vec![t0(), secs(4.0), secs(4.0)];
        let resolved = interpolate_timestamps(&input);
        assert_eq!(resolved, vec![secs(0.0), secs(4.0), secs(6.0)]);
    }

    #[test]
    fn test_single_distinct_timestamp_assumes_one_per_second() {
        let input = vec![t0(); 3];
        let resolved = interpolate_timestamps(&input);
        assert_eq!(resolved, vec![secs(0.0), secs(1.0), secs(2.0)]);
    }

    #[test]
    fn test_short_input_unchanged() {
        assert!(interpolate_timestamps(&[]).is_empty());
        assert_eq!(interpolate_timestamps(&[t0()]), vec![t0()]);
    }

    #[test]
    fn test_distinct_input_unchanged() {
        let input = vec![t0(), t0() + Duration::seconds(1), t0() + Duration::seconds(3)];
        assert_eq!(interpolate_timestamps(&input), input);
    }

    #[test]
    fn test_output_strictly_increasing() {
        let input = vec![t0(), t0(), secs(1.0), secs(1.0), secs(1.0), secs(2.0)];
        let resolved = interpolate_timestamps(&input);
        assert!(resolved.windows(2).all(|w| w[0] < w[1]));
    }
}
