//! Byte-level pixel differencing over raw bitmap buffers.
//!
//! Both operations walk the raw byte buffers in pixel-sized strides,
//! resolving channels through the bitmap's [`PixelFormat`] offsets.
//! Outputs are monochrome highlights: the computed magnitude is written
//! to all three color channels and alpha, when present, is forced
//! opaque.
//!
//! Numeric semantics are deliberate and exact: channel differences and
//! averages use truncating integer arithmetic, and the monochrome
//! collapse is the per-channel thirds sum `b/3 + g/3 + r/3` (not
//! `(b+g+r)/3` — the two round differently and consumers depend on the
//! former).

use crate::types::Bitmap;

/// Average three channel magnitudes with per-channel truncating thirds.
const fn thirds_average(blue: u8, green: u8, red: u8) -> u8 {
    blue / 3 + green / 3 + red / 3
}

/// Absolute per-pixel difference of two bitmaps, collapsed to a
/// monochrome highlight.
///
/// Each output pixel's blue/green/red channels are all set to
/// `|Δb|/3 + |Δg|/3 + |Δr|/3`. Returns `None` when the bitmaps differ
/// in width, height, or pixel format — mixed-resolution capture sets
/// are an expected condition, not a programming error.
#[must_use]
pub fn subtract(a: &Bitmap, b: &Bitmap) -> Option<Bitmap> {
    if a.shape() != b.shape() {
        return None;
    }

    let format = a.format();
    let bpp = format.bytes_per_pixel;
    let mut out = vec![0u8; a.data().len()];

    for ((pa, pb), po) in a
        .data()
        .chunks_exact(bpp)
        .zip(b.data().chunks_exact(bpp))
        .zip(out.chunks_exact_mut(bpp))
    {
        let db = pa[format.blue].abs_diff(pb[format.blue]);
        let dg = pa[format.green].abs_diff(pb[format.green]);
        let dr = pa[format.red].abs_diff(pb[format.red]);
        let magnitude = thirds_average(db, dg, dr);

        po[format.blue] = magnitude;
        po[format.green] = magnitude;
        po[format.red] = magnitude;
        if let Some(alpha) = format.alpha {
            po[alpha] = u8::MAX;
        }
    }

    Bitmap::new(a.width(), a.height(), format, out).ok()
}

/// Threshold-gated difference of a frame against both temporal
/// neighbors.
///
/// For each pixel and each color channel: `d1 = |unaltered − previous|`
/// and `d2 = |unaltered − next|`; the channel contributes `(d1 + d2) / 2`
/// only when *both* exceed `threshold`, else `0`. The three channel
/// results collapse to one monochrome value via the thirds average.
/// Requiring agreement with both neighbors surfaces regions that
/// changed consistently and filters one-sided noise (a bird in one
/// frame, sensor sparkle, wind-blown grass).
///
/// Returns `None` on any size or format mismatch among the three
/// inputs.
#[must_use]
pub fn combined_difference(
    unaltered: &Bitmap,
    previous: &Bitmap,
    next: &Bitmap,
    threshold: u8,
) -> Option<Bitmap> {
    if unaltered.shape() != previous.shape() || unaltered.shape() != next.shape() {
        return None;
    }

    let format = unaltered.format();
    let bpp = format.bytes_per_pixel;
    let mut out = vec![0u8; unaltered.data().len()];

    let gated = |u: u8, p: u8, n: u8| -> u8 {
        let d1 = u.abs_diff(p);
        let d2 = u.abs_diff(n);
        if d1 > threshold && d2 > threshold {
            // Sum of two bytes halves back into byte range.
            #[allow(clippy::cast_possible_truncation)]
            {
                ((u16::from(d1) + u16::from(d2)) / 2) as u8
            }
        } else {
            0
        }
    };

    for (((pu, pp), pn), po) in unaltered
        .data()
        .chunks_exact(bpp)
        .zip(previous.data().chunks_exact(bpp))
        .zip(next.data().chunks_exact(bpp))
        .zip(out.chunks_exact_mut(bpp))
    {
        let blue = gated(pu[format.blue], pp[format.blue], pn[format.blue]);
        let green = gated(pu[format.green], pp[format.green], pn[format.green]);
        let red = gated(pu[format.red], pp[format.red], pn[format.red]);
        let magnitude = thirds_average(blue, green, red);

        po[format.blue] = magnitude;
        po[format.green] = magnitude;
        po[format.red] = magnitude;
        if let Some(alpha) = format.alpha {
            po[alpha] = u8::MAX;
        }
    }

    Bitmap::new(unaltered.width(), unaltered.height(), format, out).ok()
}
