//! Geotagging of frames sampled from videos
//!
//! Frames of `ride.mp4` are expected at `<import>/ride/ride_<n>.jpg`, and are
//! positioned on the trace recovered from that video's telemetry. Problems
//! with one video stay with that video.
use crate::geotag::{GeotagOrchestrator, GeotagReport};
use crate::source::VideoTelemetry;
use geoprep_core::ProcessError;
use std::ffi::OsStr;
use std::path::Path;

/// Frames of `images` sampled from the video whose file stem is `stem`.
pub fn frames_for_video(images: &[String], stem: &str) -> Vec<String> {
    let prefix = format!("{}_", stem);
    images
        .iter()
        .filter(|image| {
            let path = Path::new(image.as_str());
            let in_video_dir = path
                .parent()
                .and_then(Path::file_name)
                .map_or(false, |dir| dir == OsStr::new(stem));
            let named_after_video = path
                .file_name()
                .and_then(OsStr::to_str)
                .map_or(false, |name| name.starts_with(&prefix));
            in_video_dir && named_after_video
        })
        .cloned()
        .collect()
}

impl<'a> GeotagOrchestrator<'a> {
    /// Geotag video frames against each video's own telemetry trace.
    pub fn geotag_from_videos(
        &self,
        images: &[String],
        video_dir: Option<&Path>,
        telemetry: &dyn VideoTelemetry,
    ) -> Result<GeotagReport, ProcessError> {
        let video_dir = video_dir.ok_or(ProcessError::SourceMissing {
            description: "a video directory",
        })?;
        if !video_dir.is_dir() {
            return Err(ProcessError::NotADirectory(video_dir.to_path_buf()));
        }

        let videos = telemetry
            .list_videos(video_dir)
            .map_err(|_| ProcessError::InvalidSource {
                path: video_dir.to_path_buf(),
                description: "a readable video directory",
            })?;
        let pending = self.pending(images)?;

        let mut report = GeotagReport::default();
        for video in videos {
            let Some(stem) = video.file_stem().and_then(OsStr::to_str) else {
                tracing::warn!(video = %video.display(), "video file name is not valid UTF-8, skipping");
                report.failed_videos.push(video);
                continue;
            };
            let frames = frames_for_video(&pending, stem);

            let trace = match telemetry.extract(&video) {
                Ok(trace) => trace,
                Err(e) => {
                    tracing::error!(video = %video.display(), error = %e, "could not extract a trace from video");
                    report.merge(self.fail_subset(&frames, &e.to_string()));
                    report.failed_videos.push(video);
                    continue;
                }
            };

            if trace.stationary {
                tracing::warn!(video = %video.display(), "skipping stationary video");
                report.skipped_videos.push(video);
                continue;
            }

            if frames.is_empty() {
                tracing::error!(
                    video = %video.display(),
                    "no video frames extracted for this video in the import path"
                );
                report.failed_videos.push(video);
                continue;
            }

            if trace.points.is_empty() {
                tracing::error!(video = %video.display(), "video telemetry has no gps points");
                report.merge(self.fail_subset(&frames, "video telemetry has no gps points"));
                report.failed_videos.push(video);
                continue;
            }

            tracing::debug!(video = %video.display(), frames = frames.len(), "geotagging video frames");
            report.merge(self.geotag_with_trace(&frames, &trace.points));
        }

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed.len(),
            skipped_videos = report.skipped_videos.len(),
            failed_videos = report.failed_videos.len(),
            "video geotagging finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_match_by_directory_and_prefix() {
        let images: Vec<String> = [
            "import/ride/ride_000001.jpg",
            "import/ride/ride_000002.jpg",
            "import/ride2/ride2_000001.jpg",
            "import/ride/other_000001.jpg",
            "import/ride_000003.jpg",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        assert_eq!(
            frames_for_video(&images, "ride"),
            vec!["import/ride/ride_000001.jpg", "import/ride/ride_000002.jpg"]
        );
        assert_eq!(frames_for_video(&images, "ride2").len(), 1);
        assert!(frames_for_video(&images, "missing").is_empty());
    }
}
