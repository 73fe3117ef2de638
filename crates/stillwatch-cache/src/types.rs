//! Shared types for the stillwatch cache and differencing engine.

use serde::{Deserialize, Serialize};

/// Opaque stable key identifying one reviewed record within the active,
/// externally-ordered selection.
///
/// The cache never interprets the value; it only needs equality and
/// hashing. The storage layer that supplies records decides what the
/// number means (database row id, file index, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(u64);

impl RecordId {
    /// Create a record id from its raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Byte layout of one pixel: stride and per-channel byte offsets.
///
/// The decode callback and the pixel algorithms agree on layout through
/// this descriptor rather than a fixed channel order, so BGRA sources
/// (common for Windows-originated capture tooling) work unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelFormat {
    /// Bytes per pixel.
    pub bytes_per_pixel: usize,
    /// Byte offset of the red channel within a pixel.
    pub red: usize,
    /// Byte offset of the green channel within a pixel.
    pub green: usize,
    /// Byte offset of the blue channel within a pixel.
    pub blue: usize,
    /// Byte offset of the alpha channel, if the format carries one.
    /// Alpha is forced opaque in all algorithm outputs.
    pub alpha: Option<usize>,
}

impl PixelFormat {
    /// 4 bytes per pixel, R G B A order.
    pub const RGBA8: Self = Self {
        bytes_per_pixel: 4,
        red: 0,
        green: 1,
        blue: 2,
        alpha: Some(3),
    };

    /// 4 bytes per pixel, B G R A order.
    pub const BGRA8: Self = Self {
        bytes_per_pixel: 4,
        red: 2,
        green: 1,
        blue: 0,
        alpha: Some(3),
    };

    /// 3 bytes per pixel, R G B order, no alpha.
    pub const RGB8: Self = Self {
        bytes_per_pixel: 3,
        red: 0,
        green: 1,
        blue: 2,
        alpha: None,
    };

    /// 3 bytes per pixel, B G R order, no alpha.
    pub const BGR8: Self = Self {
        bytes_per_pixel: 3,
        red: 2,
        green: 1,
        blue: 0,
        alpha: None,
    };
}

/// An owned, decoded raster pixel buffer.
///
/// Immutable after construction. Inside the cache each bitmap is owned
/// by the store slot holding it until evicted or invalidated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Bitmap {
    /// Create a bitmap from raw pixel bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::BufferLength`] when `data.len()` does not
    /// equal `width * height * bytes_per_pixel`.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, CacheError> {
        let expected = (width as usize) * (height as usize) * format.bytes_per_pixel;
        if data.len() != expected {
            return Err(CacheError::BufferLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Create a uniformly colored bitmap.
    ///
    /// `rgb` is the color as red/green/blue bytes; alpha, if the format
    /// carries one, is set opaque. Handy for placeholder frames and for
    /// synthesizing inputs in tests.
    #[must_use]
    pub fn solid(width: u32, height: u32, format: PixelFormat, rgb: [u8; 3]) -> Self {
        let bpp = format.bytes_per_pixel;
        let mut data = vec![0u8; (width as usize) * (height as usize) * bpp];
        for pixel in data.chunks_exact_mut(bpp) {
            pixel[format.red] = rgb[0];
            pixel[format.green] = rgb[1];
            pixel[format.blue] = rgb[2];
            if let Some(alpha) = format.alpha {
                pixel[alpha] = u8::MAX;
            }
        }
        Self {
            width,
            height,
            format,
            data,
        }
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Pixel byte layout.
    #[must_use]
    pub const fn format(&self) -> PixelFormat {
        self.format
    }

    /// Raw pixel bytes, row-major, `bytes_per_pixel` per pixel.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the bitmap and return the raw pixel bytes.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Total pixel count.
    #[must_use]
    pub const fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// `(width, height, format)` — the triple that must match for two
    /// bitmaps to be comparable pixel-by-pixel.
    #[must_use]
    pub const fn shape(&self) -> (u32, u32, PixelFormat) {
        (self.width, self.height, self.format)
    }
}

/// Outcome of a difference calculation.
///
/// These are ordinary values, not errors: mixed-resolution capture sets
/// and missing neighbors are expected review-time conditions, and the
/// display layer is required to handle every variant (falling back to
/// the unaltered image when a difference is not computable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffOutcome {
    /// The difference was computed and cached for the current mode.
    Success,
    /// The inputs cannot be compared (size/format mismatch, or the
    /// current difference mode has nothing to calculate).
    NotCalculable,
    /// The currently positioned record has no decoded bitmap.
    CurrentImageNotAvailable,
    /// The previous neighbor does not exist, is not displayable, or
    /// failed to decode.
    PreviousImageNotAvailable,
    /// The next neighbor does not exist, is not displayable, or failed
    /// to decode.
    NextImageNotAvailable,
}

/// Tuning knobs for the cache and its pixel algorithms.
///
/// All fields have defaults matching the review tool's stock behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of decoded bitmaps held simultaneously.
    ///
    /// Must be at least 1; construction asserts this.
    pub capacity: usize,

    /// Per-channel gate for the combined difference: a channel
    /// contributes only when it differs from *both* neighbors by more
    /// than this value.
    pub combined_threshold: u8,

    /// Luminosity at or below which a sampled pixel counts as dark.
    pub dark_luminosity: u8,

    /// Fraction of sampled pixels that must be dark for the frame to be
    /// flagged dark.
    pub dark_fraction: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 9,
            combined_threshold: 38,
            dark_luminosity: 60,
            dark_fraction: 0.9,
        }
    }
}

/// Errors that can occur inside the cache.
///
/// Expected review-time conditions (missing neighbors, mismatched
/// dimensions) are *not* errors; they surface as [`DiffOutcome`]
/// variants instead.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The external decode callback failed for a record.
    ///
    /// Never cached: the next access for the same id retries the
    /// decode. The caller decides whether to skip the record or mark it
    /// non-displayable.
    #[error("failed to decode record {id}")]
    Decode {
        /// The record whose decode failed.
        id: RecordId,
        /// The underlying decoder error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Pixel buffer length does not match `width * height * bytes_per_pixel`.
    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    BufferLength {
        /// Byte count implied by the dimensions and format.
        expected: usize,
        /// Byte count actually supplied.
        actual: usize,
    },
}
