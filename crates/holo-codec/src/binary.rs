//! Binary pipeline.
//!
//! Coarse = the leading `P` bytes of the input; residual = the remaining
//! `N = L − P` bytes, scattered across chunks by the golden interleaver.
//!
//! Unlike the perceptual modes there is no graceful degradation: with
//! chunks missing the output is a byte sequence of the correct length with
//! zeros in the unfilled positions, which for most formats is not a legal
//! file. Whether to attempt a partial decode is the caller's policy.

use crate::config::CodecConfig;
use crate::container::{Chunk, ModeHeader};
use crate::deflate::{deflate, inflate};
use crate::error::CodecError;
use crate::interleave::GoldenInterleaver;

/// Encode an opaque byte sequence into `B` chunks.
///
/// # Errors
///
/// Returns [`CodecError::EmptyInput`] for a zero-length input.
pub fn encode_binary(data: &[u8], cfg: &CodecConfig) -> Result<Vec<Chunk>, CodecError> {
    if data.is_empty() {
        return Err(CodecError::EmptyInput);
    }

    let total_len = data.len() as u64;
    let coarse_len = (cfg.coarse_budget as usize).min(data.len());
    let (prefix, rest) = data.split_at(coarse_len);
    let n = rest.len() as u64;

    let block_count = cfg.block_count(n, n, cfg.binary_blocks);
    tracing::debug!(total_len, coarse_len, block_count, "encoding binary blob");

    let coarse_payload = deflate(prefix)?;
    let header = ModeHeader::Binary {
        total_len,
        coarse_len: u32::try_from(coarse_len).expect("coarse budget fits u32"),
    };

    let mut chunks = Vec::with_capacity(block_count as usize);
    if n == 0 {
        // Everything fit in the prefix; one carrier chunk with an empty
        // slice still delivers the coarse payload.
        chunks.push(Chunk {
            header,
            coarse: coarse_payload,
            slice: deflate(&[])?,
            block_index: 0,
            block_count: 1,
            n_total: 0,
        });
        return Ok(chunks);
    }

    let perm = GoldenInterleaver::new(n);
    for block in 0..block_count {
        let slice: Vec<u8> = perm
            .block(block, block_count)
            .into_iter()
            .map(|pos| rest[usize::try_from(pos).expect("residual index fits usize")])
            .collect();
        chunks.push(Chunk {
            header: header.clone(),
            coarse: coarse_payload.clone(),
            slice: deflate(&slice)?,
            block_index: block,
            block_count,
            n_total: n,
        });
    }
    Ok(chunks)
}

/// Decode a byte sequence from a consistent set of chunks.
///
/// Always produces `total_len` bytes; positions owned by missing chunks
/// stay zero.
pub fn decode_binary(chunks: &[Chunk]) -> Result<Vec<u8>, CodecError> {
    let first = chunks.first().ok_or_else(|| CodecError::InvalidGeometry {
        detail: "no chunks to decode".into(),
    })?;
    let ModeHeader::Binary {
        total_len,
        coarse_len,
    } = first.header
    else {
        return Err(CodecError::InvalidGeometry {
            detail: format!("expected a binary header, found {:?}", first.mode()),
        });
    };

    let n = first.n_total;
    let block_count = first.block_count;
    if u64::from(coarse_len) + n != total_len || block_count == 0 {
        return Err(CodecError::InvalidGeometry {
            detail: format!(
                "prefix {coarse_len} + residual {n} does not add up to {total_len} bytes"
            ),
        });
    }

    // Every chunk carries the same coarse payload; fall through to the
    // next chunk when one arrives corrupted or mis-sized.
    let mut prefix = None;
    for chunk in chunks {
        match inflate(&chunk.coarse) {
            Ok(bytes) if bytes.len() == coarse_len as usize => {
                prefix = Some(bytes);
                break;
            }
            Ok(bytes) => {
                tracing::warn!(
                    block = chunk.block_index,
                    found = bytes.len(),
                    expected = coarse_len,
                    "coarse prefix has the wrong length, trying next chunk"
                );
            }
            Err(e) => {
                tracing::warn!(block = chunk.block_index, error = %e, "coarse payload undecodable, trying next chunk");
            }
        }
    }
    let Some(prefix) = prefix else {
        return Err(CodecError::InvalidGeometry {
            detail: "no chunk carries a decodable coarse prefix".into(),
        });
    };

    let mut out = prefix;
    out.resize(usize::try_from(total_len).expect("blob fits memory"), 0);
    if n == 0 {
        return Ok(out);
    }

    let rest = &mut out[coarse_len as usize..];
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
            Ok(bytes) => bytes,
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
            rest[usize::try_from(pos).expect("residual index fits usize")] = value;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deterministic_blob(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i.wrapping_mul(31) % 251) as u8).collect()
    }

    #[test]
    fn full_set_roundtrip_is_exact() {
        let data = deterministic_blob(100 * 1024);
        let chunks = encode_binary(&data, &CodecConfig::with_target_kb(2)).unwrap();
        assert!(chunks.len() > 16);
        assert_eq!(decode_binary(&chunks).unwrap(), data);
    }

    #[test]
    fn prefix_rides_in_every_chunk() {
        let data = deterministic_blob(10_000);
        let chunks = encode_binary(&data, &CodecConfig::default()).unwrap();
        for chunk in &chunks {
            assert_eq!(inflate(&chunk.coarse).unwrap(), data[..4096]);
        }
    }

    #[test]
    fn partial_decode_has_correct_length_and_prefix() {
        let data = deterministic_blob(20_000);
        let chunks = encode_binary(&data, &CodecConfig::default()).unwrap();
        let partial = decode_binary(&chunks[..5]).unwrap();
        assert_eq!(partial.len(), data.len());
        assert_eq!(&partial[..4096], &data[..4096]);
        assert_ne!(partial, data);
    }

    #[test]
    fn input_smaller_than_prefix_budget() {
        let data = deterministic_blob(1000);
        let chunks = encode_binary(&data, &CodecConfig::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].n_total, 0);
        assert_eq!(decode_binary(&chunks).unwrap(), data);
    }

    #[test]
    fn input_exactly_prefix_budget() {
        let data = deterministic_blob(4096);
        let chunks = encode_binary(&data, &CodecConfig::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(decode_binary(&chunks).unwrap(), data);
    }

    #[test]
    fn one_residual_byte() {
        let data = deterministic_blob(4097);
        let chunks = encode_binary(&data, &CodecConfig::default()).unwrap();
        assert_eq!(chunks.len(), 1); // B clamps to N = 1
        assert_eq!(decode_binary(&chunks).unwrap(), data);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            encode_binary(&[], &CodecConfig::default()),
            Err(CodecError::EmptyInput)
        ));
    }

    #[test]
    fn out_of_range_block_is_ignored() {
        let data = deterministic_blob(9000);
        let mut chunks = encode_binary(&data, &CodecConfig::default()).unwrap();
        chunks[2].block_index = 999;
        let decoded = decode_binary(&chunks).unwrap();
        assert_eq!(decoded.len(), data.len());
    }
}
