//! Time alignment between image clocks and trace clocks
use crate::geo::{seconds_between, TracePoint};
use chrono::NaiveDateTime;

/// Where the resolved offset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetSource {
    /// The caller-supplied constant
    Manual,
    /// Earliest image aligned with the first trace point
    TraceStart,
    /// Trace-start alignment was requested but no image had a capture time;
    /// the manual offset was kept
    NoCaptureTime,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeAlignment {
    /// Seconds subtracted from each raw capture time
    pub offset_seconds: f64,
    pub source: OffsetSource,
}

impl TimeAlignment {
    /// `raw - offset`, `None` when the result leaves the representable range.
    pub fn apply(&self, raw: NaiveDateTime) -> Option<NaiveDateTime> {
        raw.checked_sub_signed(crate::geo::duration_from_secs(self.offset_seconds))
    }

    pub fn is_degraded(&self) -> bool {
        self.source == OffsetSource::NoCaptureTime
    }
}

/// Resolve the offset to apply before interpolating against `trace`.
///
/// With `use_trace_start`, the difference between the earliest valid capture
/// time and the first trace point is added to `manual_offset`.
pub fn align_offset<'a, I>(
    manual_offset: f64,
    use_trace_start: bool,
    capture_times: I,
    trace: &[TracePoint],
) -> TimeAlignment
where
    I: IntoIterator<Item = &'a Option<NaiveDateTime>>,
{
    let manual = TimeAlignment {
        offset_seconds: manual_offset,
        source: OffsetSource::Manual,
    };
    if !use_trace_start {
        return manual;
    }

    let Some(trace_start) = trace.first().map(|p| p.time) else {
        return manual;
    };

    match capture_times.into_iter().flatten().min() {
        Some(&earliest) => {
            let offset_seconds = manual_offset + seconds_between(trace_start, earliest);
            tracing::info!(
                offset_seconds,
                "aligned to trace start time, same as using offset_time={}",
                offset_seconds
            );
            TimeAlignment {
                offset_seconds,
                source: OffsetSource::TraceStart,
            }
        }
        None => {
            tracing::warn!(
                offset_seconds = manual_offset,
                "no image has a capture time, cannot align to the trace start time"
            );
            TimeAlignment {
                offset_seconds: manual_offset,
                source: OffsetSource::NoCaptureTime,
            }
        }
    }
}
