//! Mode dispatch and chunk-directory I/O.
//!
//! Encoding `<name>` produces `<name>.holo/` full of `chunk_XXXX.holo`
//! files; decoding `<name>.holo/` restores `<name>`. Mode is chosen by file
//! extension on encode and by chunk magic on decode.

use std::fs;
use std::path::{Path, PathBuf};

use crate::audio;
use crate::binary;
use crate::config::CodecConfig;
use crate::container::{Chunk, Mode};
use crate::error::CodecError;
use crate::image_pipeline;

/// Suffix shared by chunk files and chunk directories.
pub const HOLO_SUFFIX: &str = ".holo";

const CHUNK_PREFIX: &str = "chunk_";

const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff"];

/// Infer the codec mode from a file extension.
///
/// Raster extensions choose image mode, `wav` chooses audio, everything
/// else is opaque binary.
#[must_use]
pub fn mode_from_extension(path: &Path) -> Mode {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match ext.as_deref() {
        Some(e) if IMAGE_EXTENSIONS.contains(&e) => Mode::Image,
        Some("wav") => Mode::Audio,
        _ => Mode::Binary,
    }
}

/// Zero-padded chunk file name, `chunk_XXXX.holo`.
///
/// The index width grows with the block count so names keep sorting
/// lexicographically: `max(4, ⌈log₁₀ B⌉)` digits.
#[must_use]
pub fn chunk_file_name(block: u32, block_count: u32) -> String {
    let width = index_width(block_count);
    format!("{CHUNK_PREFIX}{block:0width$}{HOLO_SUFFIX}")
}

fn index_width(block_count: u32) -> usize {
    let digits = block_count.saturating_sub(1).max(1).ilog10() as usize + 1;
    digits.max(4)
}

/// Encode `input` into `<input>.holo/`, returning the directory path.
///
/// # Errors
///
/// Fatal input errors ([`CodecError::UnsupportedInput`],
/// [`CodecError::EmptyInput`], I/O) propagate; on failure no directory is
/// left behind.
pub fn encode_path(input: &Path, cfg: &CodecConfig) -> Result<PathBuf, CodecError> {
    let mut name = input
        .file_name()
        .ok_or_else(|| CodecError::unsupported("input path has no file name"))?
        .to_os_string();
    name.push(HOLO_SUFFIX);
    let out_dir = input.with_file_name(name);
    encode_to_dir(input, &out_dir, cfg)?;
    Ok(out_dir)
}

/// Encode `input` into a fresh chunk directory at `out_dir`.
///
/// Any stale directory of the same name is removed first so chunks from
/// distinct runs never mix. Returns the number of chunks written.
pub fn encode_to_dir(input: &Path, out_dir: &Path, cfg: &CodecConfig) -> Result<usize, CodecError> {
    let mode = mode_from_extension(input);
    tracing::info!(input = %input.display(), ?mode, "encoding");

    let chunks = match mode {
        Mode::Image => image_pipeline::encode_image(&image_pipeline::load_rgb(input)?, cfg)?,
        Mode::Audio => audio::encode_audio(&audio::read_wav(input)?, cfg)?,
        Mode::Binary => binary::encode_binary(&fs::read(input)?, cfg)?,
    };

    if out_dir.is_dir() {
        fs::remove_dir_all(out_dir)?;
    }
    fs::create_dir_all(out_dir)?;

    let result = write_chunks(out_dir, &chunks);
    if result.is_err() {
        let _ = fs::remove_dir_all(out_dir);
    }
    result?;
    tracing::info!(out_dir = %out_dir.display(), chunks = chunks.len(), "encoded");
    Ok(chunks.len())
}

fn write_chunks(out_dir: &Path, chunks: &[Chunk]) -> Result<(), CodecError> {
    for chunk in chunks {
        let path = out_dir.join(chunk_file_name(chunk.block_index, chunk.block_count));
        fs::write(path, chunk.to_bytes())?;
    }
    Ok(())
}

/// Decode a chunk directory, deriving the output path from its name:
/// `<name>.holo/` restores `<name>`, anything else gets a `_dec` suffix.
///
/// Returns the path of the reconstructed file.
pub fn decode_dir(dir: &Path) -> Result<PathBuf, CodecError> {
    let out = derive_output_path(dir);
    decode_dir_to(dir, &out)?;
    Ok(out)
}

/// The output path a chunk directory decodes to.
#[must_use]
pub fn derive_output_path(dir: &Path) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.strip_suffix(HOLO_SUFFIX) {
        Some(stem) if !stem.is_empty() => dir.with_file_name(stem),
        _ => dir.with_file_name(format!("{name}_dec")),
    }
}

/// Decode a chunk directory into `out`.
///
/// Chunk-local failures are skipped; the decode proceeds with the
/// majority-consistent set. On any fatal failure no output file is left
/// behind.
pub fn decode_dir_to(dir: &Path, out: &Path) -> Result<(), CodecError> {
    let chunks = scan_chunks(dir)?;
    let chunks = majority_consistent(chunks);
    let mode = chunks[0].mode();
    tracing::info!(
        dir = %dir.display(),
        ?mode,
        usable = chunks.len(),
        total = chunks[0].block_count,
        "decoding"
    );

    let write_result = match mode {
        Mode::Image => {
            let img = image_pipeline::decode_image(&chunks)?;
            image_pipeline::save_rgb(&img, out)
        }
        Mode::Audio => {
            let track = audio::decode_audio(&chunks)?;
            audio::write_wav(&track, out)
        }
        Mode::Binary => {
            let data = binary::decode_binary(&chunks)?;
            fs::write(out, data).map_err(CodecError::from)
        }
    };
    if write_result.is_err() {
        let _ = fs::remove_file(out);
    }
    write_result?;
    tracing::info!(out = %out.display(), "decoded");
    Ok(())
}

/// Peek at the magic of the first parseable chunk in a directory.
pub fn detect_dir_mode(dir: &Path) -> Result<Mode, CodecError> {
    for path in chunk_paths(dir)? {
        let Ok(bytes) = fs::read(&path) else { continue };
        if bytes.len() >= 4 {
            if let Some(mode) = Mode::from_magic([bytes[0], bytes[1], bytes[2], bytes[3]]) {
                return Ok(mode);
            }
        }
    }
    Err(CodecError::NoChunks {
        dir: dir.to_path_buf(),
    })
}

/// Sorted `chunk_*.holo` paths in a directory.
pub fn chunk_paths(dir: &Path) -> Result<Vec<PathBuf>, CodecError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy())
                .is_some_and(|n| n.starts_with(CHUNK_PREFIX) && n.ends_with(HOLO_SUFFIX))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Parse every chunk file in a directory, skipping the unparseable.
///
/// # Errors
///
/// [`CodecError::NoChunks`] when nothing parses;
/// [`CodecError::MixedModes`] when parseable chunks disagree on mode.
fn scan_chunks(dir: &Path) -> Result<Vec<Chunk>, CodecError> {
    let mut chunks = Vec::new();
    for path in chunk_paths(dir)? {
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable chunk, skipping");
                continue;
            }
        };
        match Chunk::parse(&bytes) {
            Ok(chunk) => chunks.push(chunk),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "invalid chunk, skipping");
            }
        }
    }

    let Some(first) = chunks.first() else {
        return Err(CodecError::NoChunks {
            dir: dir.to_path_buf(),
        });
    };
    let first_mode = first.mode();
    if let Some(other) = chunks.iter().find(|c| c.mode() != first_mode) {
        return Err(CodecError::MixedModes {
            first: first_mode,
            second: other.mode(),
        });
    }
    Ok(chunks)
}

/// Keep the largest identity-consistent group of chunks, dropping the rest.
///
/// Ties go to the group seen first; duplicate block indices within the
/// winning group are resolved later by the accumulators.
fn majority_consistent(chunks: Vec<Chunk>) -> Vec<Chunk> {
    let mut groups: Vec<(crate::container::ModeHeader, u32, u64, Vec<Chunk>)> = Vec::new();
    for chunk in chunks {
        let (header, block_count, n_total) = chunk.identity();
        match groups
            .iter_mut()
            .find(|(h, b, n, _)| *h == header && *b == block_count && *n == n_total)
        {
            Some((_, _, _, members)) => members.push(chunk),
            None => groups.push((header, block_count, n_total, vec![chunk])),
        }
    }

    if groups.is_empty() {
        return Vec::new();
    }
    let mut winner = 0;
    for (i, group) in groups.iter().enumerate().skip(1) {
        if group.3.len() > groups[winner].3.len() {
            winner = i;
        }
    }

    let dropped: usize = groups
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != winner)
        .map(|(_, (_, _, _, g))| g.len())
        .sum();
    if dropped > 0 {
        tracing::warn!(dropped, "dropped chunks outside the majority-consistent set");
    }
    groups.swap_remove(winner).3
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ModeHeader;
    use crate::deflate::deflate;

    #[test]
    fn extension_dispatch() {
        assert_eq!(mode_from_extension(Path::new("a.PNG")), Mode::Image);
        assert_eq!(mode_from_extension(Path::new("b.jpeg")), Mode::Image);
        assert_eq!(mode_from_extension(Path::new("c.wav")), Mode::Audio);
        assert_eq!(mode_from_extension(Path::new("d.flac")), Mode::Binary);
        assert_eq!(mode_from_extension(Path::new("noext")), Mode::Binary);
    }

    #[test]
    fn chunk_names_are_zero_padded() {
        assert_eq!(chunk_file_name(0, 32), "chunk_0000.holo");
        assert_eq!(chunk_file_name(31, 32), "chunk_0031.holo");
        assert_eq!(chunk_file_name(12_345, 20_000), "chunk_12345.holo");
        assert_eq!(index_width(1), 4);
        assert_eq!(index_width(9999), 4);
        assert_eq!(index_width(10_000), 4);
        assert_eq!(index_width(10_001), 5);
    }

    #[test]
    fn output_path_derivation() {
        assert_eq!(
            derive_output_path(Path::new("/data/photo.png.holo")),
            Path::new("/data/photo.png")
        );
        assert_eq!(
            derive_output_path(Path::new("plain_dir")),
            Path::new("plain_dir_dec")
        );
        // A trailing separator does not confuse the stem.
        assert_eq!(
            derive_output_path(Path::new("/data/track.wav.holo/")),
            Path::new("/data/track.wav")
        );
    }

    fn binary_chunk(block_index: u32, block_count: u32, n_total: u64) -> Chunk {
        Chunk {
            header: ModeHeader::Binary {
                total_len: n_total + 16,
                coarse_len: 16,
            },
            coarse: deflate(&[7u8; 16]).unwrap(),
            slice: deflate(&[]).unwrap(),
            block_index,
            block_count,
            n_total,
        }
    }

    #[test]
    fn scan_skips_garbage_and_detects_mode() {
        let dir = tempfile::tempdir().unwrap();
        let chunk = binary_chunk(0, 1, 64);
        fs::write(dir.path().join("chunk_0000.holo"), chunk.to_bytes()).unwrap();
        fs::write(dir.path().join("chunk_0001.holo"), b"not a chunk at all").unwrap();
        fs::write(dir.path().join("README.txt"), b"ignored").unwrap();

        let chunks = scan_chunks(dir.path()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(detect_dir_mode(dir.path()).unwrap(), Mode::Binary);
    }

    #[test]
    fn empty_directory_is_no_chunks() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            scan_chunks(dir.path()),
            Err(CodecError::NoChunks { .. })
        ));
        assert!(matches!(
            decode_dir(dir.path()),
            Err(CodecError::NoChunks { .. })
        ));
    }

    #[test]
    fn mixed_modes_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("chunk_0000.holo"),
            binary_chunk(0, 2, 64).to_bytes(),
        )
        .unwrap();
        let audio = Chunk {
            header: ModeHeader::Audio {
                frames: 10,
                channels: 1,
                sample_rate: 8000,
                coarse_frames: 10,
            },
            coarse: deflate(&[0u8; 20]).unwrap(),
            slice: deflate(&[]).unwrap(),
            block_index: 1,
            block_count: 2,
            n_total: 10,
        };
        fs::write(dir.path().join("chunk_0001.holo"), audio.to_bytes()).unwrap();

        assert!(matches!(
            scan_chunks(dir.path()),
            Err(CodecError::MixedModes { .. })
        ));
    }

    #[test]
    fn majority_group_wins() {
        // Three chunks agree on N = 100, one stray disagrees.
        let consistent: Vec<Chunk> = (0..3).map(|b| binary_chunk(b, 4, 100)).collect();
        let mut all = consistent.clone();
        all.insert(1, binary_chunk(3, 4, 999));

        let kept = majority_consistent(all);
        assert_eq!(kept.len(), 3);
        assert!(kept.iter().all(|c| c.n_total == 100));
    }

    #[test]
    fn tie_goes_to_first_group() {
        let a = binary_chunk(0, 2, 100);
        let b = binary_chunk(0, 2, 200);
        let kept = majority_consistent(vec![a.clone(), b]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].n_total, a.n_total);
    }
}
