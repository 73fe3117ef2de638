//! Dark/color frame classification.
//!
//! Fixed cameras produce long runs of night frames (infrared or
//! underexposed) that reviewers want auto-flagged. Classification
//! samples a subset of pixels, estimates how many are dark and how many
//! are effectively grey, and reports a verdict the caller can threshold
//! against its own tolerance.

use serde::{Deserialize, Serialize};

use crate::types::Bitmap;

/// Only every Nth pixel is sampled; accuracy traded for throughput on
/// multi-megapixel frames.
pub const PIXEL_SAMPLE_STRIDE: usize = 20;

/// A pixel whose summed channel spreads `|R−G| + |G−B| + |B−R|` stay at
/// or below this is considered uncolored (grey).
const COLOR_SLOP: u16 = 40;

/// When fewer than this fraction of sampled pixels are uncolored, the
/// frame is judged a color image and dark detection is skipped.
const MIN_UNCOLORED_FRACTION: f64 = 0.9;

/// Luminosity channel weights. The green weight is 0.5876 rather than
/// the textbook 0.587; changing it would shift flagging on frames near
/// the dark threshold.
const LUMA_RED: f64 = 0.299;
const LUMA_GREEN: f64 = 0.5876;
const LUMA_BLUE: f64 = 0.114;

/// Verdict for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// `true` when the frame is greyscale and at least the configured
    /// fraction of sampled pixels fall at or below the dark luminosity.
    pub is_dark: bool,
    /// Fraction of sampled pixels that are dark. For a color frame this
    /// field is repurposed: it reports `1 − uncolored_fraction` as a
    /// color-confidence measure.
    pub dark_fraction: f64,
    /// `true` when the frame carries enough channel spread to be a
    /// color image (daylight capture).
    pub is_color: bool,
}

/// Classify a frame as dark, color, or neither.
///
/// Samples every [`PIXEL_SAMPLE_STRIDE`]th pixel. A sampled pixel is
/// dark when `round(0.299·R + 0.5876·G + 0.114·B) <= dark_luminosity`
/// (floating-point rounding, then byte comparison) and uncolored when
/// its summed channel spreads stay within the color slop.
///
/// A frame with visible color is never dark: greyscale night frames are
/// what the infrared illuminator produces, so channel spread alone
/// rules darkness out. Zero-pixel bitmaps classify as neither dark nor
/// color.
#[must_use]
pub fn classify(image: &Bitmap, dark_luminosity: u8, dark_fraction: f64) -> Classification {
    let format = image.format();
    let bpp = format.bytes_per_pixel;

    let mut sampled = 0usize;
    let mut dark = 0usize;
    let mut uncolored = 0usize;

    for pixel in image.data().chunks_exact(bpp).step_by(PIXEL_SAMPLE_STRIDE) {
        let red = pixel[format.red];
        let green = pixel[format.green];
        let blue = pixel[format.blue];

        let luminosity = LUMA_RED
            .mul_add(f64::from(red), LUMA_GREEN.mul_add(f64::from(green), LUMA_BLUE * f64::from(blue)))
            .round();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let luminosity = luminosity.min(255.0) as u8;
        if luminosity <= dark_luminosity {
            dark += 1;
        }

        let spread = u16::from(red.abs_diff(green))
            + u16::from(green.abs_diff(blue))
            + u16::from(blue.abs_diff(red));
        if spread <= COLOR_SLOP {
            uncolored += 1;
        }

        sampled += 1;
    }

    if sampled == 0 {
        return Classification {
            is_dark: false,
            dark_fraction: 0.0,
            is_color: false,
        };
    }

    #[allow(clippy::cast_precision_loss)]
    let uncolored_fraction = uncolored as f64 / sampled as f64;
    #[allow(clippy::cast_precision_loss)]
    let dark_sample_fraction = dark as f64 / sampled as f64;

    if uncolored_fraction < MIN_UNCOLORED_FRACTION {
        return Classification {
            is_dark: false,
            dark_fraction: 1.0 - uncolored_fraction,
            is_color: true,
        };
    }

    Classification {
        is_dark: dark_sample_fraction >= dark_fraction,
        dark_fraction: dark_sample_fraction,
        is_color: false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::types::{CacheConfig, PixelFormat};

    fn defaults() -> CacheConfig {
        CacheConfig::default()
    }

    fn classify_solid(rgb: [u8; 3]) -> Classification {
        let config = defaults();
        let image = Bitmap::solid(50, 40, PixelFormat::RGBA8, rgb);
        classify(&image, config.dark_luminosity, config.dark_fraction)
    }

    #[test]
    fn pure_black_is_dark() {
        let verdict = classify_solid([0, 0, 0]);
        assert!(verdict.is_dark);
        assert!(!verdict.is_color);
        assert_eq!(verdict.dark_fraction, 1.0);
    }

    #[test]
    fn pure_red_is_color() {
        let verdict = classify_solid([255, 0, 0]);
        assert!(verdict.is_color);
        assert!(!verdict.is_dark);
        // Repurposed field: full color confidence.
        assert_eq!(verdict.dark_fraction, 1.0);
    }

    #[test]
    fn mid_grey_is_neither() {
        let verdict = classify_solid([128, 128, 128]);
        assert!(!verdict.is_dark);
        assert!(!verdict.is_color);
        assert_eq!(verdict.dark_fraction, 0.0);
    }

    #[test]
    fn luminosity_at_threshold_counts_as_dark() {
        // round(60 * (0.299 + 0.5876 + 0.114)) = round(60.036) = 60.
        let verdict = classify_solid([60, 60, 60]);
        assert!(verdict.is_dark);
        assert_eq!(verdict.dark_fraction, 1.0);
    }

    #[test]
    fn luminosity_just_above_threshold_is_not_dark() {
        // round(61 * 1.0006) = round(61.04) = 61 > 60.
        let verdict = classify_solid([61, 61, 61]);
        assert!(!verdict.is_dark);
        assert_eq!(verdict.dark_fraction, 0.0);
    }

    #[test]
    fn channel_spread_within_slop_is_uncolored() {
        // |100-90| + |90-80| + |80-100| = 40, exactly at the slop.
        let verdict = classify_solid([100, 90, 80]);
        assert!(!verdict.is_color);
    }

    #[test]
    fn channel_spread_beyond_slop_is_color() {
        // |100-90| + |90-79| + |79-100| = 42 > 40.
        let verdict = classify_solid([100, 90, 79]);
        assert!(verdict.is_color);
    }

    #[test]
    fn only_sampled_pixels_decide_the_verdict() {
        // Bright pixels at every sampled offset, black elsewhere: the
        // stride must make classification see only the bright ones.
        let format = PixelFormat::RGBA8;
        let width = 100u32;
        let height = 20u32;
        let mut data = vec![0u8; (width * height) as usize * 4];
        for (i, pixel) in data.chunks_exact_mut(4).enumerate() {
            if i % PIXEL_SAMPLE_STRIDE == 0 {
                pixel.copy_from_slice(&[200, 200, 200, 255]);
            } else {
                pixel[3] = 255;
            }
        }
        let image = Bitmap::new(width, height, format, data).unwrap();
        let config = defaults();
        let verdict = classify(&image, config.dark_luminosity, config.dark_fraction);
        assert!(!verdict.is_dark);
        assert_eq!(verdict.dark_fraction, 0.0);
    }

    #[test]
    fn dark_fraction_respects_configured_ratio() {
        // Alternate sampled pixels between black and bright so half the
        // samples are dark.
        let format = PixelFormat::RGBA8;
        let mut data = vec![0u8; 40 * PIXEL_SAMPLE_STRIDE * 4];
        for (i, pixel) in data.chunks_exact_mut(4).enumerate() {
            let sample = i / PIXEL_SAMPLE_STRIDE;
            if i % PIXEL_SAMPLE_STRIDE == 0 && sample % 2 == 1 {
                pixel.copy_from_slice(&[200, 200, 200, 255]);
            } else {
                pixel[3] = 255;
            }
        }
        #[allow(clippy::cast_possible_truncation)]
        let width = (data.len() / 4) as u32;
        let image = Bitmap::new(width, 1, format, data).unwrap();

        let half = classify(&image, 60, 0.5);
        assert!(half.is_dark);
        assert_eq!(half.dark_fraction, 0.5);

        let strict = classify(&image, 60, 0.9);
        assert!(!strict.is_dark);
    }

    #[test]
    fn empty_bitmap_is_neither_dark_nor_color() {
        let image = Bitmap::new(0, 0, PixelFormat::RGBA8, Vec::new()).unwrap();
        let verdict = classify(&image, 60, 0.9);
        assert!(!verdict.is_dark);
        assert!(!verdict.is_color);
        assert_eq!(verdict.dark_fraction, 0.0);
    }

    #[test]
    fn classification_serde_round_trip() {
        let verdict = Classification {
            is_dark: true,
            dark_fraction: 0.95,
            is_color: false,
        };
        let json = serde_json::to_string(&verdict).unwrap();
        let back: Classification = serde_json::from_str(&json).unwrap();
        assert_eq!(verdict, back);
    }
}
