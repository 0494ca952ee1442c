//! Audio pipeline.
//!
//! Coarse = `T` equally spaced frames of the track, stored once per chunk
//! as a deflated `int16` little-endian block; residual = difference against
//! the linear interpolation of the coarse track back to full length,
//! flattened frame-major and scattered by the golden interleaver.
//!
//! Both sides rebuild the interpolated coarse from `(frames, coarse_frames)`
//! with the same arithmetic, so the full chunk set restores every sample
//! exactly (up to the clip applied when the residual itself saturates).

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::config::CodecConfig;
use crate::container::{Chunk, ModeHeader};
use crate::deflate::{deflate, i16_to_le_bytes, inflate, le_bytes_to_i16};
use crate::error::CodecError;
use crate::image_pipeline::accumulate_residual_i16;
use crate::interleave::GoldenInterleaver;

/// An interleaved 16-bit PCM track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PcmTrack {
    /// Frame-major interleaved samples, `frames · channels` long.
    pub samples: Vec<i16>,
    /// Channels per frame.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl PcmTrack {
    /// Number of frames.
    #[must_use]
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// Read a WAV file as 16-bit PCM.
///
/// 16-bit samples pass through; 24-bit samples are narrowed by an
/// arithmetic shift right of 8 bits. Anything else is rejected.
pub fn read_wav(path: &Path) -> Result<PcmTrack, CodecError> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    if spec.sample_format != SampleFormat::Int {
        return Err(CodecError::unsupported(format!(
            "{}: float WAV is not supported",
            path.display()
        )));
    }

    let samples = match spec.bits_per_sample {
        16 => reader
            .samples::<i16>()
            .collect::<Result<Vec<i16>, hound::Error>>()?,
        24 => reader
            .samples::<i32>()
            .map(|s| s.map(narrow_24_to_16))
            .collect::<Result<Vec<i16>, hound::Error>>()?,
        bits => {
            return Err(CodecError::unsupported(format!(
                "{}: only 16/24-bit PCM WAV is supported, got {bits}-bit",
                path.display()
            )))
        }
    };

    Ok(PcmTrack {
        samples,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
    })
}

/// Write a track as 16-bit PCM WAV.
pub fn write_wav(track: &PcmTrack, path: &Path) -> Result<(), CodecError> {
    let spec = WavSpec {
        channels: track.channels,
        sample_rate: track.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in &track.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Encode a PCM track into `B` chunks.
///
/// # Errors
///
/// Returns [`CodecError::EmptyInput`] for a track with no frames.
pub fn encode_audio(track: &PcmTrack, cfg: &CodecConfig) -> Result<Vec<Chunk>, CodecError> {
    let frames = track.frames();
    if frames == 0 || track.channels == 0 {
        return Err(CodecError::EmptyInput);
    }
    let frames_u32 = u32::try_from(frames)
        .map_err(|_| CodecError::unsupported("waveform exceeds 2^32 frames"))?;
    let channels = track.channels as usize;

    let coarse_frames = (cfg.coarse_frames.max(1)).min(frames_u32);
    let coarse = sample_coarse(track, coarse_frames);
    let coarse_up = interpolate_coarse(&coarse, coarse_frames, frames_u32, track.channels);

    let residual: Vec<i16> = track
        .samples
        .iter()
        .zip(&coarse_up)
        .map(|(&orig, &coarse)| clamp_i16(i32::from(orig) - i32::from(coarse)))
        .collect();

    let n = (frames * channels) as u64;
    let block_count = cfg.block_count(n * 2, n, cfg.audio_blocks);
    let perm = GoldenInterleaver::new(n);
    tracing::debug!(
        frames,
        channels = track.channels,
        sample_rate = track.sample_rate,
        coarse_frames,
        block_count,
        "encoding audio"
    );

    let coarse_payload = deflate(&i16_to_le_bytes(&coarse))?;
    let header = ModeHeader::Audio {
        frames: frames_u32,
        channels: track.channels,
        sample_rate: track.sample_rate,
        coarse_frames,
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
            coarse: coarse_payload.clone(),
            slice: deflate(&i16_to_le_bytes(&slice))?,
            block_index: block,
            block_count,
            n_total: n,
        });
    }
    Ok(chunks)
}

/// Decode a PCM track from a consistent set of chunks.
pub fn decode_audio(chunks: &[Chunk]) -> Result<PcmTrack, CodecError> {
    let first = chunks.first().ok_or_else(|| CodecError::InvalidGeometry {
        detail: "no chunks to decode".into(),
    })?;
    let ModeHeader::Audio {
        frames,
        channels,
        sample_rate,
        coarse_frames,
    } = first.header
    else {
        return Err(CodecError::InvalidGeometry {
            detail: format!("expected an audio header, found {:?}", first.mode()),
        });
    };

    let n = first.n_total;
    let block_count = first.block_count;
    if channels == 0
        || coarse_frames == 0
        || coarse_frames > frames
        || block_count == 0
        || n != u64::from(frames) * u64::from(channels)
        || n == 0
    {
        return Err(CodecError::InvalidGeometry {
            detail: format!(
                "{frames} frames x {channels} channels cannot hold {n} residual samples"
            ),
        });
    }

    // Every chunk carries the same coarse payload; fall through to the
    // next chunk when one arrives corrupted or mis-sized.
    let expected_coarse = coarse_frames as usize * channels as usize;
    let mut coarse = None;
    for chunk in chunks {
        match inflate(&chunk.coarse) {
            Ok(bytes) => {
                let track = le_bytes_to_i16(&bytes);
                if track.len() == expected_coarse {
                    coarse = Some(track);
                    break;
                }
                tracing::warn!(
                    block = chunk.block_index,
                    found = track.len(),
                    expected = expected_coarse,
                    "coarse track has the wrong sample count, trying next chunk"
                );
            }
            Err(e) => {
                tracing::warn!(block = chunk.block_index, error = %e, "coarse payload undecodable, trying next chunk");
            }
        }
    }
    let Some(coarse) = coarse else {
        return Err(CodecError::InvalidGeometry {
            detail: "no chunk carries a decodable coarse track".into(),
        });
    };
    let coarse_up = interpolate_coarse(&coarse, coarse_frames, frames, channels);

    let residual = accumulate_residual_i16(chunks, n, block_count);

    let samples: Vec<i16> = coarse_up
        .iter()
        .zip(&residual)
        .map(|(&coarse, &r)| clamp_i16(i32::from(coarse) + i32::from(r)))
        .collect();

    Ok(PcmTrack {
        samples,
        channels,
        sample_rate,
    })
}

/// Extract `coarse_frames` equally spaced frames:
/// index `round(k · (F−1) / (T−1))` for `k = 0 … T−1` (index 0 when `T = 1`).
fn sample_coarse(track: &PcmTrack, coarse_frames: u32) -> Vec<i16> {
    let frames = track.frames() as u64;
    let channels = track.channels as usize;
    let t = u64::from(coarse_frames);
    let mut coarse = Vec::with_capacity(coarse_frames as usize * channels);
    for k in 0..t {
        let frame = if t >= 2 {
            // Integer rounding of k·(F−1)/(T−1).
            (k * (frames - 1) + (t - 1) / 2) / (t - 1)
        } else {
            0
        };
        let base = usize::try_from(frame).expect("frame index fits usize") * channels;
        coarse.extend_from_slice(&track.samples[base..base + channels]);
    }
    coarse
}

/// Linearly interpolate a coarse track back to `frames` frames per channel.
fn interpolate_coarse(coarse: &[i16], coarse_frames: u32, frames: u32, channels: u16) -> Vec<i16> {
    let channels = channels as usize;
    let t = coarse_frames as usize;
    let f = frames as usize;
    let mut out = Vec::with_capacity(f * channels);
    for j in 0..f {
        let pos = if f >= 2 {
            (j as f64) * ((t - 1) as f64) / ((f - 1) as f64)
        } else {
            0.0
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let k0 = (pos.floor() as usize).min(t - 1);
        let k1 = (k0 + 1).min(t - 1);
        let alpha = pos - pos.floor();
        for ch in 0..channels {
            let a = f64::from(coarse[k0 * channels + ch]);
            let b = f64::from(coarse[k1 * channels + ch]);
            let value = (1.0 - alpha) * a + alpha * b;
            #[allow(clippy::cast_possible_truncation)]
            out.push(value.round() as i16);
        }
    }
    out
}

fn narrow_24_to_16(sample: i32) -> i16 {
    #[allow(clippy::cast_possible_truncation)]
    {
        (sample >> 8) as i16
    }
}

fn clamp_i16(v: i32) -> i16 {
    #[allow(clippy::cast_possible_truncation)]
    {
        v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
    }
}
