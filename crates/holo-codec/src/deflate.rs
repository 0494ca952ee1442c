//! Zlib helpers shared by the three pipelines.
//!
//! Payloads are opaque zlib streams: any compliant deflate at any level
//! produces a valid chunk because decoders only require a successful
//! inflate.

use std::io::Write;

use flate2::write::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;

use crate::error::CodecError;

/// Compress `data` into a zlib stream at the highest ratio.
pub(crate) fn deflate(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inflate a zlib stream.
pub(crate) fn inflate(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = ZlibDecoder::new(Vec::new());
    decoder
        .write_all(data)
        .and_then(|()| decoder.finish())
        .map_err(|source| CodecError::Deflate { source })
}

/// Serialize `i16` samples as little-endian bytes.
pub(crate) fn i16_to_le_bytes(values: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 2);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Parse little-endian bytes back into `i16` samples.
///
/// A trailing odd byte is dropped; slice lengths are validated against the
/// expected block size by the callers.
pub(crate) fn le_bytes_to_i16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
