//! Holographic media codec.
//!
//! Transforms a single media object (RGB raster, PCM waveform, or opaque
//! byte blob) into `B` self-similar chunks. Every chunk carries a complete
//! coarse approximation of the whole object plus one interleaved slice of
//! the full-resolution residual, so that:
//! - any non-empty subset of chunks reconstructs a degraded but globally
//!   coherent version of the original,
//! - the full set reconstructs the original exactly (modulo integer clipping
//!   and the documented ingest narrowing).
//!
//! # Interleaving
//!
//! Residual positions are distributed across chunks through a single-cycle
//! permutation `π(i) = (i · s) mod N`, where `s` is the integer nearest
//! `(φ − 1) · N` that is coprime to `N`. Chunk `b` owns the positions
//! `{ π(b + k·B) }`, which scatters every chunk's slice quasi-uniformly over
//! the whole object — losing chunks loses fine detail everywhere instead of
//! whole regions.
//!
//! # Modes
//!
//! A closed set of three pipelines shares the interleaver and the chunk
//! container: [`image_pipeline`] (bicubic thumbnail coarse, PNG payload),
//! [`audio`] (downsampled track coarse, linear interpolation), and
//! [`binary`] (prefix coarse). [`dispatch`] routes by file extension on
//! encode and by chunk magic on decode.

#![forbid(unsafe_code)]

pub mod audio;
pub mod binary;
mod config;
pub mod container;
mod deflate;
pub mod dispatch;
mod error;
pub mod image_pipeline;
mod interleave;
pub mod stack;

pub use config::CodecConfig;
pub use container::{Chunk, ContainerError, Mode, ModeHeader, CHUNK_VERSION};
pub use dispatch::{
    chunk_file_name, chunk_paths, decode_dir, decode_dir_to, derive_output_path, detect_dir_mode,
    encode_path, encode_to_dir, mode_from_extension, HOLO_SUFFIX,
};
pub use error::CodecError;
pub use interleave::GoldenInterleaver;
