//! Codec error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::container::{ContainerError, Mode};

/// Errors surfaced by encode/decode operations.
///
/// Chunk-local problems (bad magic, truncation, failed inflate, header
/// disagreement) are handled inside the directory scan by skipping the
/// offending chunk; only directory-level and input-level conditions reach
/// the caller through this type.
#[derive(Debug, Error)]
pub enum CodecError {
    /// No chunk in the directory survived validation.
    #[error("no usable chunk in {dir}")]
    NoChunks {
        /// The scanned directory.
        dir: PathBuf,
    },

    /// Chunks of different modes coexist in one directory.
    #[error("mixed chunk modes in one directory: {first:?} and {second:?}")]
    MixedModes {
        /// Mode of the first parseable chunk.
        first: Mode,
        /// The disagreeing mode.
        second: Mode,
    },

    /// The input cannot be encoded (unreadable image, unsupported PCM, ...).
    #[error("unsupported input: {reason}")]
    UnsupportedInput {
        /// Human-readable cause.
        reason: String,
    },

    /// Zero-length input has no residual to distribute.
    #[error("empty input, nothing to encode")]
    EmptyInput,

    /// The surviving chunk set describes an impossible object.
    #[error("chunk geometry is inconsistent: {detail}")]
    InvalidGeometry {
        /// Human-readable cause.
        detail: String,
    },

    /// A zlib stream failed to inflate.
    #[error("deflate stream corrupt: {source}")]
    Deflate {
        /// Underlying I/O error from the decompressor.
        source: std::io::Error,
    },

    /// Container parse failure promoted to a fatal error.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// Image decode/encode failure.
    #[error("image codec: {0}")]
    Image(#[from] image::ImageError),

    /// WAV read/write failure.
    #[error("wav codec: {0}")]
    Wav(#[from] hound::Error),

    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// Convenience constructor for [`CodecError::UnsupportedInput`].
    pub(crate) fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedInput {
            reason: reason.into(),
        }
    }
}
