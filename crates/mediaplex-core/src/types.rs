// crates/mediaplex-core/src/types.rs
//
// Source/stream catalogue and the small enums that flow between
// mediaplex-engine and its consumer, kept free of anything FFmpeg-specific
// so codec parameters stay opaque to a decoder context inside
// mediaplex-engine; nothing here needs to link FFmpeg.

use std::path::PathBuf;

/// What kind of media a stream carries. `Other` covers subtitle/data streams
/// the demuxer enumerates but that this engine never selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Audio,
    Video,
    Other,
}

/// Rational time base a stream's timestamps are expressed in.
///
/// `pts_seconds = pts * num / den`, kept as a method here so every call site
/// computes it the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    pub fn new(num: i32, den: i32) -> Self {
        debug_assert!(den != 0, "TimeBase denominator must not be zero");
        Self { num, den }
    }

    /// Convert a raw presentation timestamp into seconds.
    pub fn pts_to_seconds(&self, pts: i64) -> f64 {
        pts as f64 * self.num as f64 / self.den as f64
    }

    /// Convert a timestamp in seconds back into this time base's raw units,
    /// rounding to the nearest integer tick.
    pub fn seconds_to_pts(&self, seconds: f64) -> i64 {
        (seconds * self.den as f64 / self.num as f64).round() as i64
    }
}

/// One stream as enumerated by the demuxer, reduced to what the engine
/// needs after `find_stream_info`.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub index: usize,
    pub kind: StreamKind,
    pub time_base: TimeBase,
    /// Container-advertised frame rate; video streams only.
    pub frame_rate: Option<f64>,
    /// Present for video streams.
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Present for audio streams.
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

/// An opened source's immutable catalogue.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub path: PathBuf,
    pub streams: Vec<StreamInfo>,
    pub duration_secs: f64,
}

impl SourceInfo {
    pub fn stream(&self, index: usize) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.index == index)
    }
}

/// Which kind of frame was most recently produced by a `FrameProvider`.
///
/// A three-way enum rather than `Option<StreamKind>` because "unknown" here
/// specifically means "finished or not yet pulled", not "this is a subtitle
/// stream".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameKind {
    #[default]
    Unknown,
    Audio,
    Video,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pts_round_trip_is_stable() {
        let tb = TimeBase::new(1, 44100);
        let secs = tb.pts_to_seconds(44100 * 5);
        assert!((secs - 5.0).abs() < 1e-9);
        assert_eq!(tb.seconds_to_pts(secs), 44100 * 5);
    }

    #[test]
    fn stream_lookup_by_index() {
        let info = SourceInfo {
            path: PathBuf::from("clip.mkv"),
            streams: vec![StreamInfo {
                index: 1,
                kind: StreamKind::Audio,
                time_base: TimeBase::new(1, 48000),
                frame_rate: None,
                width: None,
                height: None,
                sample_rate: Some(48000),
                channels: Some(2),
            }],
            duration_secs: 12.0,
        };
        assert!(info.stream(1).is_some());
        assert!(info.stream(0).is_none());
    }
}
