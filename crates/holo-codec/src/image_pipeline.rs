//! Image pipeline.
//!
//! Coarse = bicubic (Catmull-Rom) thumbnail, stored once per chunk as PNG
//! bytes; residual = `original − upscale(thumbnail)` in 16-bit signed,
//! flattened row-major and scattered by the golden interleaver.
//!
//! Because the thumbnail travels losslessly and both sides upscale it with
//! the same kernel, decoding the full chunk set restores every sample
//! exactly: the residual was computed against the identical `coarse_up`.

use std::io::Cursor;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, ImageOutputFormat, RgbImage};

use crate::config::CodecConfig;
use crate::container::{Chunk, ModeHeader};
use crate::deflate::{deflate, i16_to_le_bytes, inflate, le_bytes_to_i16};
use crate::error::CodecError;
use crate::interleave::GoldenInterleaver;

/// Load a raster from disk as RGB, dropping any alpha channel.
pub fn load_rgb(path: &Path) -> Result<RgbImage, CodecError> {
    let img = image::open(path)
        .map_err(|e| CodecError::unsupported(format!("{}: {e}", path.display())))?;
    Ok(img.to_rgb8())
}

/// Save a raster, falling back to PNG when the extension names no format.
pub fn save_rgb(img: &RgbImage, path: &Path) -> Result<(), CodecError> {
    match ImageFormat::from_path(path) {
        Ok(_) => img.save(path)?,
        Err(_) => img.save_with_format(path, ImageFormat::Png)?,
    }
    Ok(())
}

/// Encode an RGB raster into `B` chunks.
///
/// # Errors
///
/// Returns [`CodecError::EmptyInput`] for a zero-pixel raster; PNG encoding
/// failures surface as [`CodecError::Image`].
pub fn encode_image(img: &RgbImage, cfg: &CodecConfig) -> Result<Vec<Chunk>, CodecError> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(CodecError::EmptyInput);
    }

    let thumb_side = thumb_side_for(width, height, cfg.thumb_side);
    let (tw, th) = thumb_dims(width, height, thumb_side);
    let thumb = imageops::resize(img, tw, th, FilterType::CatmullRom);

    let mut coarse = Vec::new();
    DynamicImage::ImageRgb8(thumb.clone())
        .write_to(&mut Cursor::new(&mut coarse), ImageOutputFormat::Png)?;

    let coarse_up = imageops::resize(&thumb, width, height, FilterType::CatmullRom);

    let n = u64::from(width) * u64::from(height) * 3;
    let residual: Vec<i16> = img
        .as_raw()
        .iter()
        .zip(coarse_up.as_raw())
        .map(|(&orig, &coarse)| i16::from(orig) - i16::from(coarse))
        .collect();

    let block_count = cfg.block_count(n * 2, n, cfg.image_blocks);
    let perm = GoldenInterleaver::new(n);
    tracing::debug!(
        width,
        height,
        thumb_side,
        block_count,
        step = perm.step(),
        "encoding image"
    );

    let header = ModeHeader::Image {
        width,
        height,
        channels: 3,
        thumb_side,
    };

    let mut chunks = Vec::with_capacity(block_count as usize);
    for block in 0..block_count {
        let slice: Vec<i16> = perm
            .block(block, block_count)
            .into_iter()
            .map(|pos| residual[usize::try_from(pos).expect("residual index fits usize")])
            .collect();
        chunks.push(Chunk {
            header: header.clone(),
            coarse: coarse.clone(),
            slice: deflate(&i16_to_le_bytes(&slice))?,
            block_index: block,
            block_count,
            n_total: n,
        });
    }
    Ok(chunks)
}

/// Decode an RGB raster from a consistent set of chunks.
///
/// Any subset reconstructs a coherent raster; missing slices leave their
/// residual positions at zero, degrading detail uniformly. Chunks whose
/// slice fails to inflate are skipped.
///
/// # Errors
///
/// Returns [`CodecError::NoChunks`]-adjacent conditions only via the
/// directory scanner; here an empty slice of chunks or a malformed header
/// geometry is [`CodecError::InvalidGeometry`].
pub fn decode_image(chunks: &[Chunk]) -> Result<RgbImage, CodecError> {
    let first = chunks.first().ok_or_else(|| CodecError::InvalidGeometry {
        detail: "no chunks to decode".into(),
    })?;
    let ModeHeader::Image {
        width,
        height,
        channels,
        ..
    } = first.header
    else {
        return Err(CodecError::InvalidGeometry {
            detail: format!("expected an image header, found {:?}", first.mode()),
        });
    };
    if channels != 3 {
        return Err(CodecError::InvalidGeometry {
            detail: format!("unsupported channel count {channels}"),
        });
    }

    let n = first.n_total;
    let block_count = first.block_count;
    if n != u64::from(width) * u64::from(height) * 3 || n == 0 || block_count == 0 {
        return Err(CodecError::InvalidGeometry {
            detail: format!("{width}x{height}x3 raster cannot hold {n} residual samples"),
        });
    }

    // Every chunk carries the same coarse payload; fall through to the
    // next chunk when one arrives corrupted.
    let mut thumb = None;
    for chunk in chunks {
        match image::load_from_memory(&chunk.coarse) {
            Ok(img) => {
                thumb = Some(img.to_rgb8());
                break;
            }
            Err(e) => {
                tracing::warn!(block = chunk.block_index, error = %e, "coarse payload undecodable, trying next chunk");
            }
        }
    }
    let Some(thumb) = thumb else {
        return Err(CodecError::InvalidGeometry {
            detail: "no chunk carries a decodable coarse payload".into(),
        });
    };
    let coarse_up = imageops::resize(&thumb, width, height, FilterType::CatmullRom);

    let residual = accumulate_residual_i16(chunks, n, block_count);

    let out: Vec<u8> = coarse_up
        .as_raw()
        .iter()
        .zip(&residual)
        .map(|(&coarse, &r)| clamp_u8(i32::from(coarse) + i32::from(r)))
        .collect();

    RgbImage::from_raw(width, height, out).ok_or_else(|| CodecError::InvalidGeometry {
        detail: "reconstructed buffer does not fill the raster".into(),
    })
}

/// Fill a flat `i16` residual from every usable chunk slice.
///
/// Shared by the image and audio decoders: each chunk owns a disjoint index
/// set, so accumulation order does not matter. Duplicate block indices and
/// undecodable slices are skipped with a warning.
pub(crate) fn accumulate_residual_i16(chunks: &[Chunk], n: u64, block_count: u32) -> Vec<i16> {
    let mut residual = vec![0i16; usize::try_from(n).expect("residual fits memory")];
    let perm = GoldenInterleaver::new(n);
    let mut seen = vec![false; block_count as usize];

    for chunk in chunks {
        let block = chunk.block_index;
        if block >= block_count {
            tracing::warn!(block, block_count, "block index out of range, skipping");
            continue;
        }
        if seen[block as usize] {
            tracing::debug!(block, "duplicate block, skipping");
            continue;
        }
        let values = match inflate(&chunk.slice) {
            Ok(bytes) => le_bytes_to_i16(&bytes),
            Err(e) => {
                tracing::warn!(block, error = %e, "slice failed to inflate, skipping");
                continue;
            }
        };
        seen[block as usize] = true;

        let positions = perm.block(block, block_count);
        if values.len() != positions.len() {
            tracing::warn!(
                block,
                expected = positions.len(),
                found = values.len(),
                "slice length disagrees with block size"
            );
        }
        for (&pos, &value) in positions.iter().zip(&values) {
            residual[usize::try_from(pos).expect("residual index fits usize")] = value;
        }
    }
    residual
}

/// Bounding thumbnail side: the configured side, capped by the smaller
/// raster dimension so tiny inputs are never upscaled.
fn thumb_side_for(width: u32, height: u32, configured: u16) -> u16 {
    let cap = width.min(height).min(u32::from(configured)).max(1);
    #[allow(clippy::cast_possible_truncation)]
    {
        cap as u16
    }
}

/// Thumbnail dimensions with the larger side bounded by `side`, aspect
/// ratio preserved.
fn thumb_dims(width: u32, height: u32, side: u16) -> (u32, u32) {
    let scale = f64::from(side) / f64::from(width.max(height));
    let scale = scale.min(1.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let dim = |d: u32| ((f64::from(d) * scale).round() as u32).max(1);
    (dim(width), dim(height))
}

fn clamp_u8(v: i32) -> u8 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        v.clamp(0, 255) as u8
    }
}
