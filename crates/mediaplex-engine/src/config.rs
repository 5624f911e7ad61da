// crates/mediaplex-engine/src/config.rs
//
// The pipeline's named defaults (queue_size, the enable flags) collected
// into one struct, the way velocut_core's EncodeSpec/ClipSpec bundle a job's
// parameters instead of threading loose arguments through every
// constructor.

/// Per-pipeline tuning. Passed to `FrameProvider::open`; the preload window
/// size lives on `Preloader` directly since it can change after
/// construction via `set_max_preload_count`.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bound on each selected stream's `PacketQueue` (default 32).
    pub queue_size: usize,
    pub enable_audio: bool,
    pub enable_video: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_size: 32,
            enable_audio: true,
            enable_video: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_both_kinds() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.queue_size, 32);
        assert!(cfg.enable_audio && cfg.enable_video);
    }
}
