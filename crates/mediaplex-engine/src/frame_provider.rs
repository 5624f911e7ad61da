// crates/mediaplex-engine/src/frame_provider.rs
//
// Orchestrates one open source: construction, start/stop, seek, and the A/V
// interleaving policy ("prefer audio unless it's finished or video is
// strictly ahead") that `next_frame` implements below.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use mediaplex_core::{FrameKind, OpenError, PipelineError, SourceInfo, StreamKind};

use crate::config::PipelineConfig;
use crate::ffi::decoder::RawDecoder;
use crate::ffi::demux::DemuxContext;
use crate::ffi::frame::RawFrame;
use crate::frame_decoder::FrameDecoder;
use crate::packet_producer::{PacketProducer, PipelineShared};
use crate::seeker::Seeker;

/// A borrowed view onto the most recently decoded frame, valid until the
/// next `next_frame`/`next_audio_frame`/`next_video_frame` call drops it.
pub struct Frame<'a> {
    kind: FrameKind,
    pts: f64,
    raw: &'a RawFrame,
}

impl<'a> Frame<'a> {
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn pts(&self) -> f64 {
        self.pts
    }

    pub fn width(&self) -> u32 {
        self.raw.width()
    }

    pub fn height(&self) -> u32 {
        self.raw.height()
    }

    pub fn nb_samples(&self) -> usize {
        self.raw.nb_samples()
    }

    /// Raw plane data and its stride, indexed the way the container's pixel
    /// format/sample layout lays planes out (interleaved audio is plane 0).
    pub fn plane(&self, index: usize) -> (&[u8], usize) {
        self.raw.plane(index)
    }
}

pub struct FrameProvider {
    info: SourceInfo,
    audio_index: Option<usize>,
    video_index: Option<usize>,

    producer: PacketProducer,
    decoder: FrameDecoder,
    seeker: Seeker,

    current_kind: FrameKind,
    audio_pts: f64,
    video_pts: f64,
    audio_finished: bool,
    video_finished: bool,
    current_audio_frame: Option<RawFrame>,
    current_video_frame: Option<RawFrame>,

    decoder_running: bool,
}

impl FrameProvider {
    /// Synchronous, may fail. Does not start background tasks.
    pub fn open(path: &Path, config: &PipelineConfig) -> Result<Self, OpenError> {
        let (demux, info, selection) =
            DemuxContext::open(path, config.enable_audio, config.enable_video)?;

        let mut stream_indices = Vec::new();
        if let Some(i) = selection.audio_index {
            stream_indices.push(i);
        }
        if let Some(i) = selection.video_index {
            stream_indices.push(i);
        }

        let mut decoders: HashMap<usize, RawDecoder> = HashMap::new();
        for &idx in &stream_indices {
            let stream = info.stream(idx).expect("selected stream in catalogue");
            let codecpar = demux.codec_parameters_ptr(idx);
            let time_base = ffmpeg_the_third::ffi::AVRational {
                num: stream.time_base.num,
                den: stream.time_base.den,
            };
            let dec = RawDecoder::open(codecpar, time_base, stream.kind, idx, path)?;
            decoders.insert(idx, dec);
        }

        let shared = PipelineShared::new(demux, &stream_indices, config.queue_size);
        let producer = PacketProducer::new(Arc::clone(&shared));
        let decoder = FrameDecoder::new(Arc::clone(&shared), decoders);
        let seeker = Seeker::new(shared);

        Ok(Self {
            info,
            audio_index: selection.audio_index,
            video_index: selection.video_index,
            producer,
            decoder,
            seeker,
            current_kind: FrameKind::Unknown,
            audio_pts: 0.0,
            video_pts: 0.0,
            audio_finished: false,
            video_finished: false,
            current_audio_frame: None,
            current_video_frame: None,
            decoder_running: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.info.path
    }

    pub fn duration(&self) -> f64 {
        self.info.duration_secs
    }

    pub fn has_audio(&self) -> bool {
        self.audio_index.is_some()
    }

    pub fn has_video(&self) -> bool {
        self.video_index.is_some()
    }

    pub fn video_framerate(&self) -> Option<f64> {
        self.video_index.and_then(|i| self.info.stream(i)).and_then(|s| s.frame_rate)
    }

    pub fn video_size(&self) -> Option<(u32, u32)> {
        let s = self.info.stream(self.video_index?)?;
        Some((s.width?, s.height?))
    }

    pub fn audio_sample_rate(&self) -> Option<u32> {
        self.info.stream(self.audio_index?)?.sample_rate
    }

    pub fn audio_pts(&self) -> f64 {
        self.audio_pts
    }

    pub fn video_pts(&self) -> f64 {
        self.video_pts
    }

    pub fn current_kind(&self) -> FrameKind {
        self.current_kind
    }

    pub fn is_finished(&self) -> bool {
        let audio_done = self.audio_index.is_none() || self.audio_finished;
        let video_done = self.video_index.is_none() || self.video_finished;
        audio_done && video_done
    }

    pub fn take_error(&self) -> Option<PipelineError> {
        self.producer.take_error().or_else(|| self.decoder.take_error())
    }

    /// The frame `next_frame` (or a kind-specific variant) most recently
    /// produced, or `None` before the first pull or once that kind's
    /// buffer has been superseded.
    pub fn current_frame(&self) -> Option<Frame<'_>> {
        let (raw, pts) = match self.current_kind {
            FrameKind::Audio => (self.current_audio_frame.as_ref()?, self.audio_pts),
            FrameKind::Video => (self.current_video_frame.as_ref()?, self.video_pts),
            FrameKind::Unknown => return None,
        };
        Some(Frame {
            kind: self.current_kind,
            pts,
            raw,
        })
    }

    fn wait_seek_done(&mut self) {
        self.seeker.wait();
    }

    pub fn start_decoder(&mut self, async_: bool) {
        self.wait_seek_done();
        if !self.producer.is_running() {
            self.producer.start();
        } else {
            log::error!("packet producer is already running");
        }
        if !self.decoder.is_running() {
            self.decoder.start();
        } else {
            log::error!("packet decoder is already running");
        }
        self.decoder_running = true;
        if !async_ {
            self.producer.wait_fully_started();
            self.decoder.wait_fully_started();
        }
    }

    pub fn stop_decoder(&mut self, async_: bool) {
        self.wait_seek_done();
        self.decoder.request_interruption();
        self.producer.request_interruption();
        self.producer.clear();
        if !async_ {
            self.decoder.join();
            self.producer.join();
        }
        self.decoder_running = false;
    }

    /// `pts_us = round(seconds * 1e6)`, across all streams.
    pub fn seek(&mut self, seconds: f64, async_: bool) {
        log::debug!(
            "seeking {} to {}",
            self.info.path.display(),
            mediaplex_core::helpers::time::format_duration(seconds),
        );
        if self.decoder_running {
            self.stop_decoder(async_);
        }
        self.wait_seek_done();
        self.audio_finished = false;
        self.video_finished = false;
        let pts_us = (seconds * 1_000_000.0).round() as i64;
        if async_ {
            self.seeker.set_position(pts_us);
            self.seeker.start();
        } else {
            let shared = self.producer.shared();
            let mut state = shared.state.lock().unwrap();
            if let Err(e) = state.demux.seek(pts_us) {
                log::error!("inline seek failed: {e}");
            }
        }
    }

    fn next_kind_frame(&mut self, kind: StreamKind) -> bool {
        let (index, finished_flag, pts_field, slot) = match kind {
            StreamKind::Audio => (
                self.audio_index,
                &mut self.audio_finished,
                &mut self.audio_pts,
                &mut self.current_audio_frame,
            ),
            _ => (
                self.video_index,
                &mut self.video_finished,
                &mut self.video_pts,
                &mut self.current_video_frame,
            ),
        };

        let Some(stream_index) = index else {
            *finished_flag = true;
            return false;
        };

        *slot = None; // release the previous frame's buffers before pulling the next

        match self.decoder.get_frame(stream_index) {
            Ok(Some(frame)) => {
                let tb = self
                    .info
                    .stream(stream_index)
                    .map(|s| s.time_base)
                    .expect("selected stream stays in the catalogue");
                *pts_field = frame.pts().map(|p| tb.pts_to_seconds(p)).unwrap_or(*pts_field);
                *slot = Some(frame);
                self.current_kind = kind_to_frame_kind(kind);
                true
            }
            Ok(None) => {
                *finished_flag = true;
                self.current_kind = FrameKind::Unknown;
                false
            }
            Err(e) => {
                log::error!("stream {stream_index}: {e}");
                *finished_flag = true;
                self.current_kind = FrameKind::Unknown;
                false
            }
        }
    }

    pub fn next_audio_frame(&mut self) -> bool {
        self.next_kind_frame(StreamKind::Audio)
    }

    pub fn next_video_frame(&mut self) -> bool {
        self.next_kind_frame(StreamKind::Video)
    }

    /// The interleaving policy: prefer audio unless it's finished or
    /// strictly behind video; retry while the chosen pull is terminal but
    /// the other kind still has data.
    pub fn next_frame(&mut self) -> bool {
        loop {
            let decision = interleave_decision(
                self.audio_index,
                self.video_index,
                self.audio_finished,
                self.video_finished,
                self.audio_pts,
                self.video_pts,
            );

            let Some(kind) = decision else {
                self.current_kind = FrameKind::Unknown;
                return false;
            };

            let ok = match kind {
                StreamKind::Audio => self.next_audio_frame(),
                _ => self.next_video_frame(),
            };

            if ok {
                return true;
            }
            // the pulled kind just finished but the other still has data — retry
        }
    }
}

fn kind_to_frame_kind(kind: StreamKind) -> FrameKind {
    match kind {
        StreamKind::Audio => FrameKind::Audio,
        StreamKind::Video => FrameKind::Video,
        StreamKind::Other => FrameKind::Unknown,
    }
}

/// Which stream `next_frame` should pull from next, or `None` once both
/// present streams are finished. A stream with no selected index counts as
/// already finished rather than as "never ready" — a source with only one
/// kind of stream must still reach `None` once that one kind is exhausted.
fn interleave_decision(
    audio_index: Option<usize>,
    video_index: Option<usize>,
    audio_finished: bool,
    video_finished: bool,
    audio_pts: f64,
    video_pts: f64,
) -> Option<StreamKind> {
    let audio_done = audio_index.is_none() || audio_finished;
    let video_done = video_index.is_none() || video_finished;

    if audio_done && video_done {
        return None;
    }

    let pull_audio = !audio_done && (video_done || audio_pts < video_pts);
    Some(if pull_audio { StreamKind::Audio } else { StreamKind::Video })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_only_source_reports_done_once_its_stream_finishes() {
        // No video_index at all — the regression this guards against pulled
        // audio forever because `video_finished` never flips true on a
        // source that has no video stream to finish.
        assert_eq!(interleave_decision(Some(0), None, false, false, 0.0, 0.0), Some(StreamKind::Audio));
        assert_eq!(interleave_decision(Some(0), None, true, false, 0.0, 0.0), None);
    }

    #[test]
    fn video_only_source_reports_done_once_its_stream_finishes() {
        assert_eq!(interleave_decision(None, Some(0), false, false, 0.0, 0.0), Some(StreamKind::Video));
        assert_eq!(interleave_decision(None, Some(0), false, true, 0.0, 0.0), None);
    }

    #[test]
    fn prefers_audio_unless_finished_or_ahead_of_video() {
        assert_eq!(interleave_decision(Some(0), Some(1), false, false, 1.0, 2.0), Some(StreamKind::Audio));
        assert_eq!(interleave_decision(Some(0), Some(1), false, false, 2.0, 1.0), Some(StreamKind::Video));
        assert_eq!(interleave_decision(Some(0), Some(1), true, false, 0.0, 0.0), Some(StreamKind::Video));
    }

    #[test]
    fn both_streams_finished_is_done() {
        assert_eq!(interleave_decision(Some(0), Some(1), true, true, 0.0, 0.0), None);
        assert_eq!(interleave_decision(None, None, false, false, 0.0, 0.0), None);
    }
}

impl Drop for FrameProvider {
    fn drop(&mut self) {
        self.decoder.request_interruption();
        self.producer.request_interruption();
        self.decoder.join();
        self.producer.join();
    }
}
