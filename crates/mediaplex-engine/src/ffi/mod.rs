// crates/mediaplex-engine/src/ffi/mod.rs
//
// Everything in this module talks to libav* through raw pointers. The safe
// `ffmpeg_the_third` wrapper has no public constructor for a format context
// driven by custom I/O, so both the demuxer and the decoder are built by
// hand here rather than bridging into the safe wrapper partway through and
// leaving the ownership boundary between the two unclear.

pub mod decoder;
pub mod demux;
pub mod frame;

use std::ffi::CStr;
use std::os::raw::c_int;

use ffmpeg_the_third::ffi;

/// Render an `AVERROR` code the way the rest of the crate logs failures.
pub(crate) fn strerror(code: c_int) -> String {
    let mut buf = [0u8; ffi::AV_ERROR_MAX_STRING_SIZE as usize];
    let rc = unsafe { ffi::av_strerror(code, buf.as_mut_ptr() as *mut _, buf.len()) };
    if rc < 0 {
        return format!("unknown error {code}");
    }
    unsafe { CStr::from_ptr(buf.as_ptr() as *const _) }
        .to_string_lossy()
        .into_owned()
}

pub(crate) fn is_eof(code: c_int) -> bool {
    code == ffi::AVERROR_EOF
}

pub(crate) fn is_eagain(code: c_int) -> bool {
    code == -libc::EAGAIN
}
