//! Codec configuration.

use serde::{Deserialize, Serialize};

/// Tuning knobs for the three encoder pipelines.
///
/// The defaults reproduce the documented behavior; the only knob callers
/// typically set is [`target_chunk_kb`](Self::target_chunk_kb).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Bounding side of the image thumbnail.
    ///
    /// Default: 64
    pub thumb_side: u16,

    /// Frame count of the audio coarse track.
    ///
    /// Default: 2048
    pub coarse_frames: u32,

    /// Byte length of the binary coarse prefix.
    ///
    /// Default: 4096
    pub coarse_budget: u32,

    /// Target average chunk size in KiB.
    ///
    /// When set, the block count is derived as
    /// `max(4, round(residual_bytes / (target_kb · 1024)))`, clamped so it
    /// never exceeds the residual length. When unset, the per-mode fallback
    /// counts below apply.
    pub target_chunk_kb: Option<u32>,

    /// Block count for images when no target size is given.
    ///
    /// Default: 32
    pub image_blocks: u32,

    /// Block count for audio when no target size is given.
    ///
    /// Default: 16
    pub audio_blocks: u32,

    /// Block count for binary blobs when no target size is given.
    ///
    /// Default: 32
    pub binary_blocks: u32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            thumb_side: 64,
            coarse_frames: 2048,
            coarse_budget: 4096,
            target_chunk_kb: None,
            image_blocks: 32,
            audio_blocks: 16,
            binary_blocks: 32,
        }
    }
}

impl CodecConfig {
    /// Shorthand for a config with a chunk-size target.
    #[must_use]
    pub fn with_target_kb(target_chunk_kb: u32) -> Self {
        Self {
            target_chunk_kb: Some(target_chunk_kb),
            ..Self::default()
        }
    }

    /// Derive the block count for a residual of `n` elements occupying
    /// `residual_bytes` bytes, with `fallback` used when no target is set.
    ///
    /// The result is clamped to `[1, max(n, 1)]`; an empty residual still
    /// gets one (empty-sliced) chunk so the coarse payload has a carrier.
    #[must_use]
    pub fn block_count(&self, residual_bytes: u64, n: u64, fallback: u32) -> u32 {
        let raw = match self.target_chunk_kb {
            Some(kb) => {
                let target = u64::from(kb.max(1)) * 1024;
                let rounded = (residual_bytes + target / 2) / target;
                rounded.max(4)
            }
            None => u64::from(fallback),
        };
        #[allow(clippy::cast_possible_truncation)]
        {
            raw.clamp(1, n.max(1)).min(u64::from(u32::MAX)) as u32
        }
    }
}
