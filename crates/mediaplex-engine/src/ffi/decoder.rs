// crates/mediaplex-engine/src/ffi/decoder.rs
//
// Per-stream AVCodecContext: avcodec_find_decoder → avcodec_alloc_context3 →
// avcodec_parameters_to_context → pkt_timebase + thread_count/thread_type →
// avcodec_open2 under the process-wide codec-open lock, since libav
// documents a handful of entry points as non-reentrant and decoder open is
// one of them.

use ffmpeg_the_third::ffi;

use mediaplex_core::{OpenError, PipelineError, StreamKind};

use super::frame::RawFrame;
use super::{is_eagain, is_eof, strerror};
use crate::ffi::demux::RawPacket;

pub enum SendOutcome {
    Sent,
    TryAgain,
    /// The decoder returned EOF on send, unexpectedly — worth a warning, not
    /// a hard error.
    UnexpectedEof,
    Error(PipelineError),
}

pub enum ReceiveOutcome {
    Frame(RawFrame),
    TryAgain,
    Eof,
    Error(PipelineError),
}

pub struct RawDecoder {
    ctx: *mut ffi::AVCodecContext,
}

impl RawDecoder {
    pub fn open(
        codecpar: *mut ffi::AVCodecParameters,
        time_base: ffi::AVRational,
        kind: StreamKind,
        stream_index: usize,
        path: &std::path::Path,
    ) -> Result<Self, OpenError> {
        unsafe {
            let codec_id = (*codecpar).codec_id;
            let codec = ffi::avcodec_find_decoder(codec_id);
            if codec.is_null() {
                return Err(OpenError::CodecUnavailable {
                    path: path.to_path_buf(),
                    stream_index,
                });
            }

            let ctx = ffi::avcodec_alloc_context3(codec);
            if ctx.is_null() {
                return Err(OpenError::CodecOperationFailed {
                    path: path.to_path_buf(),
                    message: "avcodec_alloc_context3 failed".into(),
                });
            }

            let rc = ffi::avcodec_parameters_to_context(ctx, codecpar);
            if rc < 0 {
                let message = strerror(rc);
                let mut ctx = ctx;
                ffi::avcodec_free_context(&mut ctx);
                return Err(OpenError::CodecOperationFailed {
                    path: path.to_path_buf(),
                    message,
                });
            }

            (*ctx).pkt_timebase = time_base;
            (*ctx).thread_count = if kind == StreamKind::Video {
                num_cpus()
            } else {
                (num_cpus() / 2).max(1)
            };
            (*ctx).thread_type = ffi::FF_THREAD_FRAME as i32;

            let open_rc = {
                let _guard = crate::CODEC_OPEN_LOCK.lock().unwrap();
                ffi::avcodec_open2(ctx, codec, std::ptr::null_mut())
            };
            if open_rc < 0 {
                let message = strerror(open_rc);
                let mut ctx = ctx;
                ffi::avcodec_free_context(&mut ctx);
                return Err(OpenError::CodecOperationFailed {
                    path: path.to_path_buf(),
                    message,
                });
            }

            Ok(Self { ctx })
        }
    }

    pub fn flush(&mut self) {
        unsafe { ffi::avcodec_flush_buffers(self.ctx) };
    }

    /// `packet = None` sends the drain ("null packet") signal for the
    /// end-of-stream case.
    pub fn send_packet(&mut self, packet: Option<&RawPacket>) -> SendOutcome {
        let rc = unsafe {
            match packet {
                Some(p) => ffi::avcodec_send_packet(self.ctx, p.as_ptr()),
                None => ffi::avcodec_send_packet(self.ctx, std::ptr::null()),
            }
        };
        if rc >= 0 {
            SendOutcome::Sent
        } else if is_eagain(rc) {
            SendOutcome::TryAgain
        } else if is_eof(rc) {
            SendOutcome::UnexpectedEof
        } else {
            SendOutcome::Error(PipelineError::CodecOperationFailed(strerror(rc)))
        }
    }

    pub fn receive_frame(&mut self) -> ReceiveOutcome {
        let mut frame = match RawFrame::alloc() {
            Ok(f) => f,
            Err(e) => return ReceiveOutcome::Error(e),
        };
        let rc = unsafe { ffi::avcodec_receive_frame(self.ctx, frame.as_mut_ptr()) };
        if rc >= 0 {
            ReceiveOutcome::Frame(frame)
        } else if is_eagain(rc) {
            ReceiveOutcome::TryAgain
        } else if is_eof(rc) {
            ReceiveOutcome::Eof
        } else {
            ReceiveOutcome::Error(PipelineError::CodecOperationFailed(strerror(rc)))
        }
    }
}

impl Drop for RawDecoder {
    fn drop(&mut self) {
        unsafe { ffi::avcodec_free_context(&mut self.ctx) };
    }
}

// SAFETY: each RawDecoder is owned by exactly one FrameDecoder and accessed
// only under that task's mutex: each decoder context is touched by
// FrameDecoder's drain pass and by the consumer via `get_frame`, both under
// the FrameDecoder's own mutex.
unsafe impl Send for RawDecoder {}

fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(1)
}
