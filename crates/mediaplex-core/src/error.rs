// crates/mediaplex-core/src/error.rs
//
// Error taxonomy, turned into real types. Doc-comment style (one-line
// summary, an "Examples" list) follows streamkit-core::error — adapted to
// this domain's variants rather than copied.
//
// End-of-stream is deliberately absent from this taxonomy: it is not an
// error — it shows up as `bool` returns and `*_finished` flags on
// FrameProvider instead (see mediaplex-engine).

use std::path::PathBuf;

use thiserror::Error;

/// Failure opening a source. Recoverable — open-time errors never poison
/// anything beyond the attempt itself; the caller may choose another path.
#[derive(Debug, Error)]
pub enum OpenError {
    /// `ByteSource` could not read the file at all.
    ///
    /// Examples: file does not exist, permission denied, short read on the
    /// probe buffer.
    #[error("I/O error opening {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The demuxer's probe returned no matching container handler.
    #[error("unsupported container format: {path}")]
    UnsupportedFormat { path: PathBuf },

    /// Neither an audio nor a video stream was selected for the requested
    /// enable flags: an open fails when zero streams are selected.
    #[error("no audio or video stream found in {path}")]
    NoStream { path: PathBuf },

    /// A selected stream's codec has no available decoder implementation.
    #[error("no decoder available for stream {stream_index} in {path}")]
    CodecUnavailable { path: PathBuf, stream_index: usize },

    /// Any other hard failure from the external multimedia library at open
    /// time (`find_stream_info`, codec-context construction, codec open).
    #[error("codec operation failed opening {path}: {message}")]
    CodecOperationFailed { path: PathBuf, message: String },
}

/// A runtime failure inside a pipeline's background tasks.
///
/// Runtime errors in the background tasks terminate that pipeline and are
/// reported on the next consumer call. `FrameProvider` stores the first one
/// it observes and returns it from `take_error()`; `next_frame` still
/// degrades to the finished state so a fatal pipeline never blocks the A/V
/// interleaver forever.
#[derive(Debug, Error, Clone)]
pub enum PipelineError {
    /// `ByteSource::read`/`seek` failed mid-pipeline.
    #[error("I/O error: {0}")]
    Io(String),

    /// A `send_packet`/`receive_frame` call returned a hard error that
    /// isn't EAGAIN or EOF.
    #[error("codec operation failed: {0}")]
    CodecOperationFailed(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_error_messages_include_path() {
        let err = OpenError::NoStream {
            path: PathBuf::from("silent.mkv"),
        };
        assert!(err.to_string().contains("silent.mkv"));
    }

    #[test]
    fn pipeline_error_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: PipelineError = io.into();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
