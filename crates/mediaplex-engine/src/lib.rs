// crates/mediaplex-engine/src/lib.rs
//
// The pipeline: raw-FFmpeg demux/decode plumbing in `ffi`, the background
// tasks that drive it (`packet_producer`, `frame_decoder`, `seeker`), their
// per-source orchestrator (`frame_provider`), and the playlist manager that
// sits on top (`preloader`). `mediaplex-core` carries the plain data; this
// crate is the only one that links FFmpeg or spawns a thread.

mod byte_source;
mod config;
mod ffi;
mod frame_decoder;
mod frame_provider;
mod packet_producer;
mod packet_queue;
mod preloader;
mod seeker;
mod task;

pub use config::PipelineConfig;
pub use frame_provider::{Frame, FrameProvider};
pub use preloader::Preloader;

pub use mediaplex_core::{FrameKind, OpenError, PipelineError, SourceInfo, StreamInfo, StreamKind, TimeBase};

/// Serializes every `avcodec_open2` call process-wide. `ffmpeg_the_third`'s
/// own safe wrapper takes no such lock, but the underlying library is
/// documented as non-reentrant for a handful of entry points, codec open
/// among them.
pub(crate) static CODEC_OPEN_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
