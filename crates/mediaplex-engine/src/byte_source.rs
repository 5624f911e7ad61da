// crates/mediaplex-engine/src/byte_source.rs
//
// Thread-safe random-access read+seek over a local file, and the AVIOContext
// trampolines that let the demuxer drive it. The opaque pointer closes over
// `ByteSource` directly, the same shape as a libav custom-I/O callback pair
// closing over the owning reader.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::os::raw::{c_int, c_void};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ffmpeg_the_third::ffi;

use mediaplex_core::OpenError;

/// One of the four whence values `ByteSource::seek` accepts. Anything else
/// (in particular `AVSEEK_FORCE`) is masked off before it reaches this
/// type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
    /// Report total length; the cursor does not move.
    Size,
}

pub struct ByteSource {
    path: PathBuf,
    file: Mutex<File>,
    len: u64,
}

impl ByteSource {
    pub fn open(path: &Path) -> Result<Self, OpenError> {
        let file = File::open(path).map_err(|source| OpenError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let len = file
            .metadata()
            .map_err(|source| OpenError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    /// Read up to `buf.len()` bytes. `Ok(0)` is EOF.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut file = self.file.lock().unwrap();
        file.read(buf)
    }

    pub fn seek(&self, offset: i64, whence: Whence) -> io::Result<u64> {
        let mut file = self.file.lock().unwrap();
        match whence {
            Whence::Set => file.seek(SeekFrom::Start(offset.max(0) as u64)),
            Whence::Cur => file.seek(SeekFrom::Current(offset)),
            Whence::End => file.seek(SeekFrom::End(offset)),
            Whence::Size => Ok(self.len),
        }
    }
}

/// Mask any bits outside the four whence values the demuxer's custom-I/O
/// contract defines — `AVSEEK_FORCE` in particular is advisory and ignored.
fn decode_whence(raw: c_int) -> Option<Whence> {
    match raw & !ffi::AVSEEK_FORCE {
        x if x == ffi::AVSEEK_SIZE => Some(Whence::Size),
        libc::SEEK_SET => Some(Whence::Set),
        libc::SEEK_CUR => Some(Whence::Cur),
        libc::SEEK_END => Some(Whence::End),
        _ => None,
    }
}

/// `AVIOContext` read callback. `opaque` is a raw `*mut ByteSource` kept
/// alive for the lifetime of the owning `DemuxContext` (see ffi::demux).
pub(crate) unsafe extern "C" fn io_read_packet(
    opaque: *mut c_void,
    buf: *mut u8,
    buf_size: c_int,
) -> c_int {
    let source = &*(opaque as *const ByteSource);
    let out = std::slice::from_raw_parts_mut(buf, buf_size.max(0) as usize);
    match source.read(out) {
        Ok(0) => ffi::AVERROR_EOF,
        Ok(n) => n as c_int,
        Err(_) => -libc::EIO,
    }
}

/// `AVIOContext` seek callback.
pub(crate) unsafe extern "C" fn io_seek(
    opaque: *mut c_void,
    offset: i64,
    whence: c_int,
) -> i64 {
    let source = &*(opaque as *const ByteSource);
    match decode_whence(whence) {
        Some(w) => match source.seek(offset, w) {
            Ok(pos) => pos as i64,
            Err(_) => -(libc::EIO as i64),
        },
        None => -(libc::EINVAL as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn size_query_does_not_move_cursor() {
        let f = temp_file(b"0123456789");
        let source = ByteSource::open(f.path()).unwrap();
        source.seek(3, Whence::Set).unwrap();
        assert_eq!(source.seek(0, Whence::Size).unwrap(), 10);
        let mut buf = [0u8; 1];
        source.read(&mut buf).unwrap();
        assert_eq!(&buf, b"3");
    }

    #[test]
    fn read_reports_eof_as_zero() {
        let f = temp_file(b"ab");
        let source = ByteSource::open(f.path()).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(source.read(&mut buf).unwrap(), 2);
        assert_eq!(source.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn force_flag_is_masked_off() {
        assert_eq!(
            decode_whence(libc::SEEK_SET | ffi::AVSEEK_FORCE),
            Some(Whence::Set)
        );
        assert_eq!(decode_whence(ffi::AVSEEK_SIZE), Some(Whence::Size));
    }

    #[test]
    fn seek_cur_and_end() {
        let f = temp_file(b"0123456789");
        let source = ByteSource::open(f.path()).unwrap();
        assert_eq!(source.seek(0, Whence::End).unwrap(), 10);
        source.seek(0, Whence::Set).unwrap();
        source.seek(4, Whence::Cur).unwrap();
        let mut buf = [0u8; 1];
        source.read(&mut buf).unwrap();
        assert_eq!(&buf, b"4");
    }
}
