// crates/mediaplex-engine/src/ffi/frame.rs
//
// RAII wrapper over `*mut AVFrame`. Spec.md §3's Frame is "decoded sample
// buffer with a pts interpreted in the source stream's time_base" — this is
// that buffer, still opaque to everything above FrameDecoder.

use ffmpeg_the_third::ffi;

use mediaplex_core::PipelineError;

pub struct RawFrame(*mut ffi::AVFrame);

impl RawFrame {
    pub(crate) fn alloc() -> Result<Self, PipelineError> {
        let ptr = unsafe { ffi::av_frame_alloc() };
        if ptr.is_null() {
            return Err(PipelineError::CodecOperationFailed(
                "av_frame_alloc failed".into(),
            ));
        }
        Ok(Self(ptr))
    }

    pub fn as_mut_ptr(&mut self) -> *mut ffi::AVFrame {
        self.0
    }

    /// `None` when the decoder didn't stamp a pts (`AV_NOPTS_VALUE`).
    pub fn pts(&self) -> Option<i64> {
        let pts = unsafe { (*self.0).pts };
        if pts == ffi::AV_NOPTS_VALUE {
            None
        } else {
            Some(pts)
        }
    }

    pub fn width(&self) -> u32 {
        unsafe { (*self.0).width.max(0) as u32 }
    }

    pub fn height(&self) -> u32 {
        unsafe { (*self.0).height.max(0) as u32 }
    }

    pub fn nb_samples(&self) -> usize {
        unsafe { (*self.0).nb_samples.max(0) as usize }
    }

    /// Raw plane data and its stride, for the caller to copy out before the
    /// next decode overwrites this frame — mirrors `Video::data`/`::stride`
    /// in the safe wrapper, by hand.
    pub fn plane(&self, index: usize) -> (&[u8], usize) {
        unsafe {
            let stride = (*self.0).linesize[index].max(0) as usize;
            let height = if index == 0 {
                self.height().max(1) as usize
            } else {
                1
            };
            let ptr = (*self.0).data[index];
            if ptr.is_null() || stride == 0 {
                (&[], 0)
            } else {
                (std::slice::from_raw_parts(ptr, stride * height), stride)
            }
        }
    }
}

impl Drop for RawFrame {
    fn drop(&mut self) {
        unsafe { ffi::av_frame_free(&mut self.0) };
    }
}

// SAFETY: moves with the value; FrameDecoder hands exactly one owner the
// frame it just decoded.
unsafe impl Send for RawFrame {}
