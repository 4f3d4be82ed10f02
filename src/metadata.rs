//! Media metadata.
//!
//! [`MediaInfo`] is the metadata snapshot captured when a source is opened and
//! the record attached to a frame archive. It serializes as JSON (the archive
//! collaborator's metadata format and the CLI's `--json` output).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Frame rate used when neither the caller nor the source metadata supplies
/// one.
pub const DEFAULT_FPS: f64 = 30.0;

/// Declared frame count of a media source.
///
/// Sources that cannot report an exact count either declare themselves
/// unbounded (live or streaming inputs) or report nothing at all. The two
/// cases are kept apart because an unbounded declaration can still be
/// estimated from rate and duration, while an unknown one cannot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FrameCount {
    /// The source declared an exact frame count.
    Exact(u64),
    /// The source declared itself unbounded.
    Unbounded,
    /// The source declared nothing.
    #[default]
    Unknown,
}

/// Metadata snapshot for a media source or frame archive.
///
/// Captured once at open time and not affected by consuming frames. During a
/// decode operation the copy recorded into the archive is adjusted (frame rate
/// divided for interval skipping, frame count set to what was actually
/// written); the reader's own snapshot is left alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second, when the source reports one.
    pub fps: Option<f64>,
    /// Total duration in seconds, when the source reports one.
    pub duration: Option<f64>,
    /// Declared frame count.
    #[serde(default)]
    pub frame_count: FrameCount,
    /// Codec name (e.g. `"h264"`), when known.
    pub codec: Option<String>,
    /// Engine-specific passthrough metadata (container tags).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl MediaInfo {
    /// Create a metadata record carrying only dimensions.
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fps: None,
            duration: None,
            frame_count: FrameCount::Unknown,
            codec: None,
            extra: BTreeMap::new(),
        }
    }

    /// `(width, height)` pair.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Best-effort frame count.
    ///
    /// Returns the declared count when exact. An unbounded declaration is
    /// estimated as `round(fps * duration)` when both are known. `None` means
    /// the count cannot be derived; this never fails.
    pub fn estimated_frame_count(&self) -> Option<u64> {
        match self.frame_count {
            FrameCount::Exact(count) => Some(count),
            FrameCount::Unbounded => match (self.fps, self.duration) {
                (Some(fps), Some(duration)) if fps > 0.0 && duration.is_finite() => {
                    Some((fps * duration).round() as u64)
                }
                _ => None,
            },
            FrameCount::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> MediaInfo {
        MediaInfo::with_size(320, 240)
    }

    #[test]
    fn exact_count_is_returned_as_declared() {
        let mut info = info();
        info.frame_count = FrameCount::Exact(42);
        info.fps = Some(30.0);
        info.duration = Some(100.0);
        assert_eq!(info.estimated_frame_count(), Some(42));
    }

    #[test]
    fn unbounded_count_is_estimated_from_rate_and_duration() {
        let mut info = info();
        info.frame_count = FrameCount::Unbounded;
        info.fps = Some(29.97);
        info.duration = Some(10.0);
        assert_eq!(info.estimated_frame_count(), Some(300));
    }

    #[test]
    fn unbounded_without_rate_or_duration_is_unknown() {
        let mut info = info();
        info.frame_count = FrameCount::Unbounded;
        info.fps = Some(30.0);
        assert_eq!(info.estimated_frame_count(), None);

        info.fps = None;
        info.duration = Some(5.0);
        assert_eq!(info.estimated_frame_count(), None);
    }

    #[test]
    fn unknown_count_is_never_estimated() {
        let mut info = info();
        info.fps = Some(30.0);
        info.duration = Some(10.0);
        assert_eq!(info.estimated_frame_count(), None);
    }

    #[test]
    fn json_round_trip() {
        let mut info = info();
        info.fps = Some(24.0);
        info.frame_count = FrameCount::Exact(10);
        info.extra.insert("title".into(), "clip".into());

        let json = serde_json::to_string(&info).unwrap();
        let back: MediaInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }
}
