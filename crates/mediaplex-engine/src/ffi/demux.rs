// crates/mediaplex-engine/src/ffi/demux.rs
//
// Raw AVFormatContext wiring: avio_alloc_context with read/seek trampolines,
// av_probe_input_format3 against a probe buffer, avformat_alloc_context +
// manual pb/iformat/flags, avformat_open_input, avformat_find_stream_info,
// then one pass over nb_streams picking the first video and first audio
// stream the enable flags allow.

use std::os::raw::c_void;
use std::path::Path;
use std::ptr;

use ffmpeg_the_third::ffi;

use mediaplex_core::{OpenError, PipelineError, SourceInfo, StreamInfo, StreamKind, TimeBase};

use super::strerror;
use crate::byte_source::{io_read_packet, io_seek, ByteSource};

const PROBE_BUFFER_SIZE: usize = 4096;
/// `avio_alloc_context` wants a buffer it (and libav) may reallocate; give it
/// room to grow past the probe size for ordinary reads.
const IO_BUFFER_SIZE: usize = 32 * 1024;

pub struct StreamSelection {
    pub audio_index: Option<usize>,
    pub video_index: Option<usize>,
}

/// Owns the AVFormatContext, its custom AVIOContext, and the `ByteSource`
/// the callbacks close over. Nothing else may touch `fmt_ctx` while a demux
/// pass or a seek is outstanding — enforced by whoever holds the pipeline
/// mutex that wraps this type.
pub struct DemuxContext {
    fmt_ctx: *mut ffi::AVFormatContext,
    avio_ctx: *mut ffi::AVIOContext,
    // Heap-boxed so the address handed to avio_alloc_context as `opaque`
    // stays stable even as this struct moves.
    _source: Box<ByteSource>,
}

// SAFETY: exactly one task touches `fmt_ctx` at a time per the pipeline's
// mutex discipline; the raw pointers themselves carry no thread affinity.
unsafe impl Send for DemuxContext {}

impl DemuxContext {
    pub fn open(
        path: &Path,
        enable_audio: bool,
        enable_video: bool,
    ) -> Result<(Self, SourceInfo, StreamSelection), OpenError> {
        let source = Box::new(ByteSource::open(path)?);

        let mut probe_buf = vec![0u8; PROBE_BUFFER_SIZE];
        let probe_read = source.read(&mut probe_buf).map_err(|e| OpenError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        source
            .seek(0, crate::byte_source::Whence::Set)
            .map_err(|e| OpenError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        let input_format = unsafe {
            let mut probe_data: ffi::AVProbeData = std::mem::zeroed();
            probe_data.buf = probe_buf.as_mut_ptr();
            probe_data.buf_size = probe_read as i32;
            let c_name = std::ffi::CString::new(path.to_string_lossy().as_bytes()).unwrap();
            probe_data.filename = c_name.as_ptr();
            let mut score = 0;
            ffi::av_probe_input_format3(&probe_data, 1, &mut score)
        };
        if input_format.is_null() {
            return Err(OpenError::UnsupportedFormat {
                path: path.to_path_buf(),
            });
        }

        let opaque = source.as_ref() as *const ByteSource as *mut c_void;
        let io_buffer = unsafe { ffi::av_malloc(IO_BUFFER_SIZE) as *mut u8 };
        if io_buffer.is_null() {
            return Err(OpenError::CodecOperationFailed {
                path: path.to_path_buf(),
                message: "av_malloc failed for AVIOContext buffer".into(),
            });
        }

        let avio_ctx = unsafe {
            ffi::avio_alloc_context(
                io_buffer,
                IO_BUFFER_SIZE as i32,
                0,
                opaque,
                Some(io_read_packet),
                None,
                Some(io_seek),
            )
        };
        if avio_ctx.is_null() {
            unsafe { ffi::av_free(io_buffer as *mut c_void) };
            return Err(OpenError::CodecOperationFailed {
                path: path.to_path_buf(),
                message: "avio_alloc_context failed".into(),
            });
        }

        let mut fmt_ctx = unsafe { ffi::avformat_alloc_context() };
        if fmt_ctx.is_null() {
            unsafe { ffi::avio_context_free(&mut (avio_ctx as *mut _)) };
            return Err(OpenError::CodecOperationFailed {
                path: path.to_path_buf(),
                message: "avformat_alloc_context failed".into(),
            });
        }
        unsafe {
            (*fmt_ctx).pb = avio_ctx;
            (*fmt_ctx).iformat = input_format as *mut _;
            (*fmt_ctx).flags |= ffi::AVFMT_FLAG_CUSTOM_IO as i32;
        }

        let open_rc =
            unsafe { ffi::avformat_open_input(&mut fmt_ctx, ptr::null(), ptr::null_mut(), ptr::null_mut()) };
        if open_rc < 0 {
            let message = strerror(open_rc);
            unsafe {
                // avformat_open_input frees fmt_ctx itself on failure, but
                // leaves our custom AVIOContext alone.
                free_avio(avio_ctx);
            }
            return Err(OpenError::CodecOperationFailed {
                path: path.to_path_buf(),
                message,
            });
        }

        let find_rc = unsafe { ffi::avformat_find_stream_info(fmt_ctx, ptr::null_mut()) };
        if find_rc < 0 {
            let message = strerror(find_rc);
            unsafe {
                ffi::avformat_close_input(&mut fmt_ctx);
                free_avio(avio_ctx);
            }
            return Err(OpenError::CodecOperationFailed {
                path: path.to_path_buf(),
                message,
            });
        }

        let (streams, selection) = unsafe { enumerate_streams(fmt_ctx, enable_audio, enable_video) };
        if selection.audio_index.is_none() && selection.video_index.is_none() {
            unsafe {
                ffi::avformat_close_input(&mut fmt_ctx);
                free_avio(avio_ctx);
            }
            return Err(OpenError::NoStream {
                path: path.to_path_buf(),
            });
        }

        let duration_secs = unsafe { (*fmt_ctx).duration as f64 / ffi::AV_TIME_BASE as f64 };
        let info = SourceInfo {
            path: path.to_path_buf(),
            streams,
            duration_secs: duration_secs.max(0.0),
        };

        Ok((
            Self {
                fmt_ctx,
                avio_ctx,
                _source: source,
            },
            info,
            selection,
        ))
    }

    pub fn stream_time_base(&self, index: usize) -> TimeBase {
        unsafe {
            let stream = *(*self.fmt_ctx).streams.add(index);
            let tb = (*stream).time_base;
            TimeBase::new(tb.num, tb.den)
        }
    }

    pub fn codec_parameters_ptr(&self, index: usize) -> *mut ffi::AVCodecParameters {
        unsafe {
            let stream = *(*self.fmt_ctx).streams.add(index);
            (*stream).codecpar
        }
    }

    pub fn as_ptr(&self) -> *mut ffi::AVFormatContext {
        self.fmt_ctx
    }

    /// Demux one packet. `Ok(None)` is EOF, the end-of-stream sentinel every
    /// queue in this pipeline uses.
    pub fn read_packet(&mut self) -> Result<Option<RawPacket>, PipelineError> {
        let mut packet = RawPacket::alloc()?;
        let rc = unsafe { ffi::av_read_frame(self.fmt_ctx, packet.as_mut_ptr()) };
        if super::is_eof(rc) {
            return Ok(None);
        }
        if rc < 0 {
            return Err(PipelineError::CodecOperationFailed(strerror(rc)));
        }
        Ok(Some(packet))
    }

    /// Backward-keyframe seek to an absolute `AV_TIME_BASE` (microsecond)
    /// timestamp, across all streams (`stream_index = -1`).
    pub fn seek(&mut self, pts_us: i64) -> Result<(), PipelineError> {
        let rc = unsafe { ffi::av_seek_frame(self.fmt_ctx, -1, pts_us, ffi::AVSEEK_FLAG_BACKWARD) };
        if rc < 0 {
            return Err(PipelineError::CodecOperationFailed(strerror(rc)));
        }
        Ok(())
    }
}

unsafe fn free_avio(avio_ctx: *mut ffi::AVIOContext) {
    if avio_ctx.is_null() {
        return;
    }
    // The buffer field may have been reallocated by libav since we handed
    // it the original av_malloc'd pointer — free whatever it holds now.
    ffi::av_freep(&mut (*avio_ctx).buffer as *mut _ as *mut c_void);
    let mut ctx = avio_ctx;
    ffi::avio_context_free(&mut ctx);
}

impl Drop for DemuxContext {
    fn drop(&mut self) {
        unsafe {
            if !self.fmt_ctx.is_null() {
                ffi::avformat_close_input(&mut self.fmt_ctx);
            }
            free_avio(self.avio_ctx);
        }
    }
}

unsafe fn enumerate_streams(
    fmt_ctx: *mut ffi::AVFormatContext,
    enable_audio: bool,
    enable_video: bool,
) -> (Vec<StreamInfo>, StreamSelection) {
    let nb = (*fmt_ctx).nb_streams as usize;
    let mut streams = Vec::with_capacity(nb);
    let mut audio_index = None;
    let mut video_index = None;

    for i in 0..nb {
        let stream = *(*fmt_ctx).streams.add(i);
        let par = (*stream).codecpar;
        if par.is_null() {
            log::warn!("stream #{i} has no codec parameters, skipping");
            continue;
        }
        let tb = (*stream).time_base;
        let time_base = TimeBase::new(if tb.den != 0 { tb.num } else { 1 }, if tb.den != 0 { tb.den } else { 1 });

        let kind = match (*par).codec_type {
            ffi::AVMediaType::AVMEDIA_TYPE_VIDEO => StreamKind::Video,
            ffi::AVMediaType::AVMEDIA_TYPE_AUDIO => StreamKind::Audio,
            _ => StreamKind::Other,
        };

        if kind == StreamKind::Video && enable_video && video_index.is_none() {
            video_index = Some(i);
        } else if kind == StreamKind::Audio && enable_audio && audio_index.is_none() {
            audio_index = Some(i);
        }

        let frame_rate = {
            let fr = (*stream).avg_frame_rate;
            if fr.num > 0 && fr.den > 0 {
                Some(fr.num as f64 / fr.den as f64)
            } else {
                None
            }
        };

        streams.push(StreamInfo {
            index: i,
            kind,
            time_base,
            frame_rate,
            width: (kind == StreamKind::Video).then_some((*par).width as u32),
            height: (kind == StreamKind::Video).then_some((*par).height as u32),
            sample_rate: (kind == StreamKind::Audio).then_some((*par).sample_rate as u32),
            channels: (kind == StreamKind::Audio).then_some((*par).ch_layout.nb_channels as u16),
        });
    }

    (streams, StreamSelection { audio_index, video_index })
}

/// Thin RAII wrapper over `*mut AVPacket`, used end to end (demux, queue,
/// decode) so exactly one free happens no matter which path releases it. A
/// packet is held by at most one party at a time.
pub struct RawPacket(*mut ffi::AVPacket);

impl RawPacket {
    fn alloc() -> Result<Self, PipelineError> {
        let ptr = unsafe { ffi::av_packet_alloc() };
        if ptr.is_null() {
            return Err(PipelineError::CodecOperationFailed(
                "av_packet_alloc failed".into(),
            ));
        }
        Ok(Self(ptr))
    }

    pub fn stream_index(&self) -> usize {
        unsafe { (*self.0).stream_index as usize }
    }

    pub fn as_mut_ptr(&mut self) -> *mut ffi::AVPacket {
        self.0
    }

    pub fn as_ptr(&self) -> *const ffi::AVPacket {
        self.0
    }
}

impl Drop for RawPacket {
    fn drop(&mut self) {
        unsafe { ffi::av_packet_free(&mut self.0) };
    }
}

// SAFETY: ownership moves with the value; never touched from two threads at
// the same time (it lives inside a mutex-guarded queue).
unsafe impl Send for RawPacket {}
