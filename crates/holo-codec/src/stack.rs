//! Frame stacking utility.
//!
//! Averages same-sized RGB frames pixel-wise, the way a telescope
//! integrates light over time: more frames, deeper and less noisy image.
//! The averaged frame is then typically encoded holographically.

use std::path::Path;

use image::RgbImage;

use crate::error::CodecError;
use crate::image_pipeline::load_rgb;

/// Average frames pixel-wise: u8 → f32 mean → u8 with half-up rounding.
///
/// Frame paths that do not exist are skipped with a warning; a frame whose
/// dimensions disagree with the first usable frame is fatal, as is an empty
/// usable set.
pub fn stack_images_average(paths: &[impl AsRef<Path>]) -> Result<RgbImage, CodecError> {
    let mut acc: Vec<f32> = Vec::new();
    let mut dims: Option<(u32, u32)> = None;
    let mut count = 0u32;

    for path in paths {
        let path = path.as_ref();
        if !path.is_file() {
            tracing::warn!(path = %path.display(), "skipping missing frame");
            continue;
        }
        let frame = load_rgb(path)?;
        match dims {
            None => {
                dims = Some(frame.dimensions());
                acc = frame.as_raw().iter().map(|&v| f32::from(v)).collect();
            }
            Some(expected) => {
                if frame.dimensions() != expected {
                    return Err(CodecError::unsupported(format!(
                        "inconsistent frame shape: {} is {:?}, expected {:?}",
                        path.display(),
                        frame.dimensions(),
                        expected
                    )));
                }
                for (slot, &v) in acc.iter_mut().zip(frame.as_raw()) {
                    *slot += f32::from(v);
                }
            }
        }
        count += 1;
    }

    let Some((width, height)) = dims else {
        return Err(CodecError::unsupported("no valid frames to stack"));
    };
    tracing::info!(frames = count, width, height, "stacked frames");

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let pixels: Vec<u8> = acc
        .iter()
        .map(|&sum| (sum / count as f32 + 0.5).floor().clamp(0.0, 255.0) as u8)
        .collect();

    RgbImage::from_raw(width, height, pixels).ok_or_else(|| CodecError::InvalidGeometry {
        detail: "stacked buffer does not fill the raster".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::save_rgb;

    fn flat(width: u32, height: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, image::Rgb([value, value, value]))
    }

    #[test]
    fn mean_uses_half_up_rounding() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        save_rgb(&flat(4, 4, 10), &a).unwrap();
        save_rgb(&flat(4, 4, 11), &b).unwrap();

        // Mean 10.5 rounds half-up to 11.
        let stacked = stack_images_average(&[a, b]).unwrap();
        assert!(stacked.as_raw().iter().all(|&v| v == 11));
    }

    #[test]
    fn missing_frames_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        save_rgb(&flat(4, 4, 42), &a).unwrap();
        let ghost = dir.path().join("ghost.png");

        let stacked = stack_images_average(&[a, ghost]).unwrap();
        assert!(stacked.as_raw().iter().all(|&v| v == 42));
    }

    #[test]
    fn shape_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        save_rgb(&flat(4, 4, 1), &a).unwrap();
        save_rgb(&flat(5, 4, 1), &b).unwrap();

        assert!(matches!(
            stack_images_average(&[a, b]),
            Err(CodecError::UnsupportedInput { .. })
        ));
    }

    #[test]
    fn no_usable_frames_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let ghost = dir.path().join("ghost.png");
        assert!(matches!(
            stack_images_average(&[ghost]),
            Err(CodecError::UnsupportedInput { .. })
        ));
    }
}
