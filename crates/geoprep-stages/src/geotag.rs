//! Geotag stage: capture time and position for every image
//!
//! Three sources feed the same commit path:
//!
//! ```text
//! EXIF (offset 0)  ─────────────────────────────┐
//! EXIF (offset≠0)  → trace from EXIF ─┐         ├→ StageTracker("geotag_process")
//! GPX / NMEA file  → TraceReader ─────┴→ align → interpolate
//! ```
//!
//! Per-image problems end up as failed records; only a misconfigured source
//! is returned as an error.
use crate::align::{align_offset, TimeAlignment};
use crate::geo::{initial_bearing, interpolate, normalize_bearing, GeoError, TracePoint};
use crate::source::{ExifReader, ExifTags, TraceFormat, TraceReader};
use chrono::NaiveDateTime;
use geoprep_core::{
    CompassHeading, GeotagOptions, GeotagPayload, ImageError, ProcessError, Stage, StageTracker,
};
use std::path::{Path, PathBuf};

/// One image that could not be geotagged.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFailure {
    pub image: String,
    pub reason: String,
}

/// Outcome counts of one geotag run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeotagReport {
    pub succeeded: usize,
    pub failed: Vec<ImageFailure>,
    /// Videos skipped because the camera did not move
    pub skipped_videos: Vec<PathBuf>,
    /// Videos with no matching frames or an unreadable trace
    pub failed_videos: Vec<PathBuf>,
}

impl GeotagReport {
    pub fn merge(&mut self, other: GeotagReport) {
        self.succeeded += other.succeeded;
        self.failed.extend(other.failed);
        self.skipped_videos.extend(other.skipped_videos);
        self.failed_videos.extend(other.failed_videos);
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.failed.len()
    }
}

pub struct GeotagOrchestrator<'a> {
    tracker: &'a StageTracker,
    exif: &'a dyn ExifReader,
    options: GeotagOptions,
}

impl<'a> GeotagOrchestrator<'a> {
    pub fn new(tracker: &'a StageTracker, exif: &'a dyn ExifReader, options: GeotagOptions) -> Self {
        Self {
            tracker,
            exif,
            options,
        }
    }

    pub fn options(&self) -> &GeotagOptions {
        &self.options
    }

    /// Images of `images` that still need `geotag_process`.
    pub fn pending(&self, images: &[String]) -> Result<Vec<String>, ProcessError> {
        Ok(self
            .tracker
            .pending(images, Stage::GeotagProcess, self.options.rerun)?)
    }

    /// Geotag from the images' own EXIF tags.
    ///
    /// Without a time offset every image keeps its recorded position. With an
    /// offset the batch's EXIF positions become a trace, and each image is
    /// re-positioned at its shifted capture time.
    pub fn geotag_from_exif(&self, images: &[String]) -> Result<GeotagReport, ProcessError> {
        let pending = self.pending(images)?;

        if self.options.offset_time == 0.0 {
            let mut report = GeotagReport::default();
            for image in &pending {
                let result = self.properties_from_exif(image);
                self.commit(image, result, &mut report);
            }
            tracing::info!(
                succeeded = report.succeeded,
                failed = report.failed.len(),
                "extracted gps data from image EXIF"
            );
            return Ok(report);
        }

        let trace = trace_from_exif(self.exif, &pending);
        if trace.is_empty() {
            return Err(ProcessError::EmptyExifTrace);
        }
        Ok(self.geotag_with_trace(&pending, &trace))
    }

    /// Geotag against a GPX or NMEA trace file.
    pub fn geotag_from_trace(
        &self,
        images: &[String],
        format: TraceFormat,
        path: Option<&Path>,
        reader: &dyn TraceReader,
    ) -> Result<GeotagReport, ProcessError> {
        let path = path.ok_or(ProcessError::SourceMissing {
            description: format.description(),
        })?;
        if !path.is_file() {
            return Err(ProcessError::InvalidSource {
                path: path.to_path_buf(),
                description: format.description(),
            });
        }

        if self.options.local_time {
            tracing::info!("trace timestamps are read as local time");
        } else {
            tracing::info!("image timestamps are assumed to be UTC, set local_time otherwise");
        }

        let pending = self.pending(images)?;
        let trace = match reader.read(format, path, self.options.local_time) {
            Ok(trace) if !trace.is_empty() => trace,
            Ok(_) => {
                tracing::error!(path = %path.display(), "trace has no points, images can not be geotagged");
                return Ok(self.fail_subset(&pending, "trace has no points"));
            }
            Err(e) => {
                tracing::error!(error = %e, "trace was not read, images can not be geotagged");
                return Ok(self.fail_subset(&pending, &e.to_string()));
            }
        };

        Ok(self.geotag_with_trace(&pending, &trace))
    }

    /// Interpolate every image of `images` on `trace` and commit the results.
    ///
    /// `images` is used as given; callers filter with [`Self::pending`].
    pub fn geotag_with_trace(&self, images: &[String], trace: &[TracePoint]) -> GeotagReport {
        let mut report = GeotagReport::default();

        let exif: Vec<Result<ExifTags, ImageError>> = images
            .iter()
            .map(|image| {
                self.exif.read(image).map_err(|e| ImageError::Exif {
                    image: image.clone(),
                    reason: e.to_string(),
                })
            })
            .collect();
        let captures: Vec<Option<NaiveDateTime>> = exif
            .iter()
            .map(|tags| tags.as_ref().ok().and_then(|t| t.capture_time))
            .collect();

        let alignment = align_offset(
            self.options.offset_time,
            self.options.use_trace_start_time,
            &captures,
            trace,
        );

        for (image, tags) in images.iter().zip(exif) {
            let result = tags.and_then(|tags| match tags.capture_time {
                Some(capture) => self.properties_from_trace(image, capture, trace, &alignment),
                None => Err(ImageError::MissingField {
                    image: image.clone(),
                    field: "capture time",
                }),
            });
            self.commit(image, result, &mut report);
        }

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed.len(),
            offset_seconds = alignment.offset_seconds,
            "inserted gps data from trace"
        );
        report
    }

    /// Geotag properties read straight from EXIF.
    pub fn properties_from_exif(&self, image: &str) -> Result<GeotagPayload, ImageError> {
        let tags = self.exif.read(image).map_err(|e| ImageError::Exif {
            image: image.to_string(),
            reason: e.to_string(),
        })?;

        let (latitude, longitude) = tags.position().ok_or_else(|| ImageError::MissingField {
            image: image.to_string(),
            field: "latitude or longitude",
        })?;
        let capture_time = tags.capture_time.ok_or_else(|| ImageError::MissingField {
            image: image.to_string(),
            field: "capture time",
        })?;

        if tags.altitude.is_none() {
            tracing::debug!(%image, "image altitude tag not in EXIF");
        }
        if tags.direction.is_none() {
            tracing::debug!(%image, "image direction tag not in EXIF");
        }
        let heading = normalize_bearing(tags.direction.unwrap_or(0.0) + self.options.offset_angle);

        Ok(GeotagPayload {
            latitude,
            longitude,
            capture_time,
            altitude: tags.altitude,
            compass_heading: Some(CompassHeading::uniform(heading)),
        })
    }

    /// Geotag properties interpolated on `trace` at the aligned capture time.
    pub fn properties_from_trace(
        &self,
        image: &str,
        capture_time: NaiveDateTime,
        trace: &[TracePoint],
        alignment: &TimeAlignment,
    ) -> Result<GeotagPayload, ImageError> {
        let effective = alignment
            .apply(capture_time)
            .ok_or_else(|| ImageError::Interpolation {
                image: image.to_string(),
                hint: format!(
                    "offset of {} s moves capture time {} out of the calendar range, check offset_time",
                    alignment.offset_seconds, capture_time
                ),
            })?;
        let position = interpolate(trace, effective).map_err(|e| ImageError::Interpolation {
            image: image.to_string(),
            hint: interpolation_hint(&e),
        })?;

        let heading = normalize_bearing(position.bearing + self.options.offset_angle);
        Ok(GeotagPayload {
            latitude: position.lat,
            longitude: position.lon,
            capture_time: effective,
            altitude: position.elevation,
            compass_heading: Some(CompassHeading::uniform(heading)),
        })
    }

    pub(crate) fn fail_subset(&self, images: &[String], reason: &str) -> GeotagReport {
        self.tracker.fail_all(images, Stage::GeotagProcess);
        GeotagReport {
            failed: images
                .iter()
                .map(|image| ImageFailure {
                    image: image.clone(),
                    reason: reason.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    fn commit(
        &self,
        image: &str,
        result: Result<GeotagPayload, ImageError>,
        report: &mut GeotagReport,
    ) {
        let reason = match result {
            Ok(payload) => match self.tracker.record_success(image, Stage::GeotagProcess, payload) {
                Ok(_) => {
                    report.succeeded += 1;
                    return;
                }
                Err(e) => ImageError::Store {
                    image: image.to_string(),
                    source: e,
                },
            },
            Err(e) => e,
        };

        tracing::error!(%image, "{}", reason);
        if let Err(e) = self.tracker.record_failure(image, Stage::GeotagProcess) {
            tracing::error!(%image, error = %e, "could not record geotag failure");
        }
        report.failed.push(ImageFailure {
            image: image.to_string(),
            reason: reason.to_string(),
        });
    }
}

fn interpolation_hint(error: &GeoError) -> String {
    match error {
        GeoError::EmptyTrace => "the trace has no points".to_string(),
        GeoError::OutOfRange { time, start, end } => format!(
            "capture time {} is outside the trace [{}, {}]. Try reading the trace \
             timestamps as local time, aligning with the trace start time, or \
             shifting the images with offset_time",
            time, start, end
        ),
    }
}

/// Build a trace from the EXIF positions of `images`.
///
/// Images lacking capture time or position are left out. Points are sorted
/// by time and keep only the first of equal timestamps; each bearing points
/// toward the next point, the last one repeats the previous bearing.
pub fn trace_from_exif(exif: &dyn ExifReader, images: &[String]) -> Vec<TracePoint> {
    let mut points: Vec<TracePoint> = images
        .iter()
        .filter_map(|image| match exif.read(image) {
            Ok(tags) => Some(tags),
            Err(e) => {
                tracing::warn!(%image, error = %e, "image left out of the EXIF trace");
                None
            }
        })
        .filter_map(|tags| {
            let (lat, lon) = tags.position()?;
            Some(TracePoint {
                time: tags.capture_time?,
                lat,
                lon,
                bearing: tags.direction.unwrap_or(0.0),
                elevation: tags.altitude,
            })
        })
        .collect();

    points.sort_by(|a, b| a.time.cmp(&b.time));
    points.dedup_by(|later, earlier| later.time == earlier.time);

    for i in 0..points.len().saturating_sub(1) {
        let (a, b) = (points[i], points[i + 1]);
        if a.lat != b.lat || a.lon != b.lon {
            points[i].bearing = initial_bearing(a.lat, a.lon, b.lat, b.lon);
        }
    }
    if points.len() >= 2 {
        let n = points.len();
        points[n - 1].bearing = points[n - 2].bearing;
    }
    points
}
