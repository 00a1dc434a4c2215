//! Sequence stage: split geotagged images into travel sequences
//!
//! ```text
//! geotag_process results → sort by time → spread duplicate timestamps
//!     → split on time/distance gaps → headings → duplicates
//!     → StageTracker("sequence_process")
//! ```
use crate::geo::{bearing_difference, distance, initial_bearing, normalize_bearing, seconds_between};
use crate::timestamps::interpolate_timestamps;
use chrono::NaiveDateTime;
use geoprep_core::{
    CompassHeading, ProcessError, SequenceOptions, SequencePayload, Stage, StagePayload,
    StageTracker,
};
use uuid::Uuid;

/// A successfully geotagged image, as seen by the segmenter.
#[derive(Debug, Clone, PartialEq)]
pub struct GeotagPoint {
    pub image: String,
    pub capture_time: NaiveDateTime,
    pub lat: f64,
    pub lon: f64,
    pub direction: f64,
}

/// Gap thresholds between consecutive images.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Cutoffs {
    /// Seconds; derived from the batch when `None`
    pub time: Option<f64>,
    /// Meters; no distance cuts when `None`
    pub distance: Option<f64>,
}

/// Contiguous run of images, index-aligned and ordered by time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sequence {
    pub file_list: Vec<String>,
    pub capture_times: Vec<NaiveDateTime>,
    pub latlons: Vec<(f64, f64)>,
    pub directions: Vec<f64>,
}

impl Sequence {
    fn starting_with(point: &GeotagPoint) -> Self {
        let mut sequence = Self::default();
        sequence.push(point);
        sequence
    }

    fn push(&mut self, point: &GeotagPoint) {
        self.file_list.push(point.image.clone());
        self.capture_times.push(point.capture_time);
        self.latlons.push((point.lat, point.lon));
        self.directions.push(point.direction);
    }

    pub fn len(&self) -> usize {
        self.file_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_list.is_empty()
    }
}

/// Total order used everywhere: capture time, then image identifier.
pub fn sort_points(points: &mut [GeotagPoint]) {
    points.sort_by(|a, b| {
        a.capture_time
            .cmp(&b.capture_time)
            .then_with(|| a.image.cmp(&b.image))
    });
}

/// `1.5 ×` the upper median of consecutive capture deltas of sorted `points`.
///
/// `None` when there are fewer than two points.
pub fn derive_cutoff_time(sorted: &[GeotagPoint]) -> Option<f64> {
    let mut deltas: Vec<f64> = sorted
        .windows(2)
        .map(|w| seconds_between(w[0].capture_time, w[1].capture_time))
        .collect();
    if deltas.is_empty() {
        return None;
    }
    deltas.sort_by(|a, b| a.total_cmp(b));
    Some(1.5 * deltas[deltas.len() / 2])
}

/// Partition `points` into sequences.
///
/// A new sequence starts at image `i + 1` when the time gap to image `i`
/// exceeds the time cutoff or the distance exceeds the distance cutoff. The
/// result only depends on the set of points, not on their order in `points`.
pub fn split_sequences(points: &[GeotagPoint], cutoffs: Cutoffs) -> Vec<Sequence> {
    let mut sorted = points.to_vec();
    sort_points(&mut sorted);

    let Some(first) = sorted.first() else {
        return Vec::new();
    };

    let cutoff_time = match cutoffs.time {
        Some(t) => Some(t),
        None => {
            let derived = derive_cutoff_time(&sorted);
            tracing::debug!(
                cutoff_time = ?derived,
                "sequence cut-off time derived from the median time delta"
            );
            derived
        }
    };

    let mut sequences = vec![Sequence::starting_with(first)];
    let mut cuts = 0;
    for pair in sorted.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        let dt = seconds_between(prev.capture_time, next.capture_time);
        let dd = distance(prev.lat, prev.lon, next.lat, next.lon);

        let cut_time = cutoff_time.map_or(false, |cutoff| dt > cutoff);
        let cut_distance = cutoffs.distance.map_or(false, |cutoff| dd > cutoff);

        if cut_time || cut_distance {
            cuts += 1;
            if cut_distance {
                tracing::debug!(cut = cuts, meters = dd, image = %next.image, "distance gap, new sequence");
            } else {
                tracing::debug!(cut = cuts, seconds = dt, image = %next.image, "time gap, new sequence");
            }
            sequences.push(Sequence::starting_with(next));
        } else if let Some(current) = sequences.last_mut() {
            current.push(next);
        }
    }
    sequences
}

/// Bearing from each image toward the next one of the same sequence.
///
/// The last image repeats the bearing before it; a single image keeps its
/// recorded direction. `offset_angle` is added and the result normalized.
pub fn interpolate_directions(sequence: &Sequence, offset_angle: f64) -> Vec<f64> {
    let n = sequence.len();
    if n < 2 {
        return sequence
            .directions
            .iter()
            .map(|d| normalize_bearing(d + offset_angle))
            .collect();
    }

    let mut bearings = Vec::with_capacity(n);
    for pair in sequence.latlons.windows(2) {
        let ((lat1, lon1), (lat2, lon2)) = (pair[0], pair[1]);
        let bearing = if (lat1, lon1) == (lat2, lon2) {
            // Standing still: keep the last known heading
            bearings
                .last()
                .copied()
                .unwrap_or(sequence.directions[bearings.len()])
        } else {
            initial_bearing(lat1, lon1, lat2, lon2)
        };
        bearings.push(bearing);
    }
    bearings.push(bearings[n - 2]);

    bearings
        .into_iter()
        .map(|b| normalize_bearing(b + offset_angle))
        .collect()
}

/// Flags images that add nothing over the last kept image of the sequence.
///
/// An image is a duplicate when it is closer than `max_distance` meters and
/// turned less than `max_angle` degrees relative to the last kept image.
pub fn find_duplicates(
    sequence: &Sequence,
    directions: &[f64],
    max_distance: f64,
    max_angle: f64,
) -> Vec<bool> {
    let mut flags = vec![false; sequence.len()];
    if sequence.is_empty() {
        return flags;
    }

    let (mut kept_latlon, mut kept_direction) = (sequence.latlons[0], directions[0]);
    for k in 1..sequence.len() {
        let (lat, lon) = sequence.latlons[k];
        let moved = distance(kept_latlon.0, kept_latlon.1, lat, lon);
        let turned = bearing_difference(directions[k], kept_direction);

        if moved < max_distance && turned < max_angle {
            flags[k] = true;
        } else {
            kept_latlon = (lat, lon);
            kept_direction = directions[k];
        }
    }
    flags
}

/// Outcome of one sequence run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceReport {
    pub sequences: usize,
    pub sequenced: usize,
    /// Images without a usable geotag result, or whose record could not be written
    pub failed: Vec<String>,
    pub duplicates: Vec<String>,
}

pub struct SequenceProcessor<'a> {
    tracker: &'a StageTracker,
    options: SequenceOptions,
}

impl<'a> SequenceProcessor<'a> {
    pub fn new(tracker: &'a StageTracker, options: SequenceOptions) -> Self {
        Self { tracker, options }
    }

    pub fn cutoffs(&self) -> Cutoffs {
        Cutoffs {
            time: self.options.cutoff_time,
            distance: self.options.cutoff_distance,
        }
    }

    /// Geotag points of the images that still need `sequence_process`.
    ///
    /// Images without a successful geotag result get a failed
    /// `sequence_process` record and are returned in the second list.
    /// Loaded images lose any earlier duplicate flag.
    pub fn load_geotag_points(
        &self,
        images: &[String],
    ) -> Result<(Vec<GeotagPoint>, Vec<String>), ProcessError> {
        let pending = self
            .tracker
            .pending(images, Stage::SequenceProcess, self.options.rerun)?;

        let mut points = Vec::with_capacity(pending.len());
        let mut failed = Vec::new();
        for image in pending {
            let geotag = match self.tracker.read_result(&image, Stage::GeotagProcess) {
                Ok(Some(StagePayload::Geotag(geotag))) => geotag,
                Ok(_) => {
                    tracing::warn!(
                        %image,
                        "geotag process failed for image, it is not included in the sequence processing"
                    );
                    self.fail(&image, &mut failed);
                    continue;
                }
                Err(e) => {
                    tracing::warn!(%image, error = %e, "geotag data not read for image");
                    self.fail(&image, &mut failed);
                    continue;
                }
            };

            if let Err(e) = self.tracker.clear_duplicate(&image) {
                tracing::warn!(%image, error = %e, "could not clear the duplicate flag");
            }
            points.push(GeotagPoint {
                capture_time: geotag.capture_time,
                lat: geotag.latitude,
                lon: geotag.longitude,
                direction: geotag.compass_heading.map_or(0.0, |h| h.true_heading),
                image,
            });
        }
        Ok((points, failed))
    }

    /// Run the whole sequence stage over `images`.
    pub fn process(&self, images: &[String]) -> Result<SequenceReport, ProcessError> {
        let (mut points, failed) = self.load_geotag_points(images)?;
        let mut report = SequenceReport {
            failed,
            ..Default::default()
        };
        if points.is_empty() {
            tracing::info!("no geotagged images to sequence");
            return Ok(report);
        }

        sort_points(&mut points);
        let raw: Vec<NaiveDateTime> = points.iter().map(|p| p.capture_time).collect();
        for (point, time) in points.iter_mut().zip(interpolate_timestamps(&raw)) {
            point.capture_time = time;
        }

        let sequences = split_sequences(&points, self.cutoffs());
        report.sequences = sequences.len();

        for sequence in &sequences {
            let sequence_uuid = Uuid::new_v4();
            let directions = if self.options.interpolate_directions {
                interpolate_directions(sequence, self.options.offset_angle)
            } else {
                sequence.directions.clone()
            };
            let duplicates = find_duplicates(
                sequence,
                &directions,
                self.options.duplicate_distance,
                self.options.duplicate_angle,
            );

            for (k, image) in sequence.file_list.iter().enumerate() {
                if duplicates[k] {
                    match self.tracker.mark_duplicate(image) {
                        Ok(()) => report.duplicates.push(image.clone()),
                        Err(e) => tracing::warn!(%image, error = %e, "could not flag duplicate"),
                    }
                }

                let payload = SequencePayload {
                    sequence_uuid,
                    capture_time: sequence.capture_times[k],
                    compass_heading: Some(CompassHeading::uniform(directions[k])),
                };
                match self.tracker.record_success(image, Stage::SequenceProcess, payload) {
                    Ok(_) => report.sequenced += 1,
                    Err(e) => {
                        tracing::error!(%image, error = %e, "could not record sequence result");
                        report.failed.push(image.clone());
                    }
                }
            }
        }

        tracing::info!(
            sequences = report.sequences,
            sequenced = report.sequenced,
            failed = report.failed.len(),
            duplicates = report.duplicates.len(),
            "sequence process finished"
        );
        Ok(report)
    }

    fn fail(&self, image: &str, failed: &mut Vec<String>) {
        if let Err(e) = self.tracker.record_failure(image, Stage::SequenceProcess) {
            tracing::error!(%image, error = %e, "could not record sequence failure");
        }
        failed.push(image.to_string());
    }
}
