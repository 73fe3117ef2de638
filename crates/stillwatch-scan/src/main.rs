//! Scan a folder of fixed-camera captures in filename order: flag
//! likely-dark frames and optionally write neighbor-difference images
//! highlighting motion.

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use image::RgbaImage;
use stillwatch_cache::{
    Bitmap, BitmapDecoder, CacheConfig, DiffOutcome, ImageCache, PixelFormat, RecordId,
    RecordSequence, VecSequence,
};

/// Scan a capture folder: classify each frame as dark/color and write
/// difference images against its temporal neighbors.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Folder containing the capture sequence (read non-recursively,
    /// processed in filename order).
    folder: PathBuf,

    /// Where to write difference images; omit to only classify.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Which difference to compute for each frame.
    #[arg(long, value_enum, default_value = "combined")]
    mode: DiffMode,

    /// Per-channel gate for the combined difference: a channel counts
    /// only when it differs from both neighbors by more than this.
    #[arg(long, value_name = "0-255")]
    threshold: Option<u8>,

    /// Luminosity at or below which a sampled pixel counts as dark.
    #[arg(long, value_name = "0-255")]
    dark_luminosity: Option<u8>,

    /// Fraction of sampled pixels that must be dark to flag the frame.
    #[arg(long, value_name = "0.0-1.0")]
    dark_fraction: Option<f64>,

    /// Maximum number of decoded frames held in memory at once.
    #[arg(long)]
    capacity: Option<usize>,
}

/// Which difference image to produce per frame.
#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DiffMode {
    /// Absolute difference against one neighbor (previous when it
    /// exists, otherwise next).
    Subtract,
    /// Threshold-gated difference against both neighbors.
    Combined,
}

/// Decode callback over the collected frame paths, via the `image`
/// crate; everything is normalized to RGBA8 so frames from mixed
/// encoders stay comparable.
struct FolderDecoder {
    paths: Vec<PathBuf>,
}

impl BitmapDecoder for FolderDecoder {
    fn decode(
        &mut self,
        id: RecordId,
    ) -> Result<Bitmap, Box<dyn std::error::Error + Send + Sync>> {
        #[allow(clippy::cast_possible_truncation)]
        let path = self
            .paths
            .get(id.value() as usize)
            .ok_or_else(|| format!("record {id} is out of range"))?;
        let decoded = image::open(path)?.to_rgba8();
        let (width, height) = decoded.dimensions();
        Ok(Bitmap::new(
            width,
            height,
            PixelFormat::RGBA8,
            decoded.into_raw(),
        )?)
    }
}

/// Collect supported image files from `folder`, sorted by filename.
fn collect_frames(folder: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    const EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        let supported = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if path.is_file() && supported {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Write an RGBA8 bitmap as a PNG.
fn save_bitmap(bitmap: &Bitmap, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let raster = RgbaImage::from_raw(
        bitmap.width(),
        bitmap.height(),
        bitmap.data().to_vec(),
    )
    .ok_or("bitmap buffer does not match its dimensions")?;
    raster.save(path)?;
    Ok(())
}

/// Compute the configured difference for the current frame, returning
/// the outcome the cache reported.
fn calculate_difference(
    cache: &mut ImageCache<VecSequence, FolderDecoder>,
    mode: DiffMode,
    threshold: u8,
) -> DiffOutcome {
    match mode {
        DiffMode::Subtract => {
            cache.advance_difference();
            cache.try_calculate_difference()
        }
        DiffMode::Combined => {
            cache.advance_combined();
            cache.try_calculate_combined_difference(threshold)
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let paths = collect_frames(&args.folder)?;
    if paths.is_empty() {
        return Err(format!("no supported images found in {}", args.folder.display()).into());
    }
    eprintln!(
        "Found {} frames in {}",
        paths.len(),
        args.folder.display()
    );

    if let Some(ref output) = args.output {
        std::fs::create_dir_all(output)?;
    }

    let defaults = CacheConfig::default();
    let config = CacheConfig {
        capacity: args.capacity.unwrap_or(defaults.capacity),
        combined_threshold: args.threshold.unwrap_or(defaults.combined_threshold),
        dark_luminosity: args.dark_luminosity.unwrap_or(defaults.dark_luminosity),
        dark_fraction: args.dark_fraction.unwrap_or(defaults.dark_fraction),
    };
    let threshold = config.combined_threshold;

    let ids = (0..paths.len() as u64).map(RecordId::new).collect();
    let sequence = VecSequence::new(ids);
    let decoder = FolderDecoder {
        paths: paths.clone(),
    };
    let mut cache = ImageCache::new(sequence, decoder, config)?;

    let mut dark_frames = 0usize;
    let mut diffs_written = 0usize;
    let mut failures = 0usize;

    loop {
        let index = cache.sequence().position();
        let name = paths[index]
            .file_name()
            .map_or_else(|| paths[index].display().to_string(), |n| n.to_string_lossy().into_owned());

        if let Some(verdict) = cache.classify_current() {
            let label = if verdict.is_dark {
                dark_frames += 1;
                "dark"
            } else if verdict.is_color {
                "color"
            } else {
                "grey"
            };
            eprintln!("{name}: {label} ({:.0}%)", verdict.dark_fraction * 100.0);

            if args.output.is_some() {
                let outcome = calculate_difference(&mut cache, args.mode, threshold);
                match outcome {
                    DiffOutcome::Success => {
                        if let (Some(result), Some(output)) =
                            (cache.difference(), args.output.as_deref())
                        {
                            let target = output.join(format!("diff-{name}.png"));
                            save_bitmap(result, &target)?;
                            diffs_written += 1;
                        }
                    }
                    DiffOutcome::NotCalculable => {
                        eprintln!("{name}: difference not calculable (mixed resolutions?)");
                    }
                    DiffOutcome::CurrentImageNotAvailable
                    | DiffOutcome::PreviousImageNotAvailable
                    | DiffOutcome::NextImageNotAvailable => {
                        eprintln!("{name}: neighbor unavailable, skipping difference");
                    }
                }
            }
        }

        match cache.move_next() {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => {
                // Position advanced but the frame would not decode;
                // report it and keep scanning.
                failures += 1;
                eprintln!("warning: {err}");
            }
        }
    }

    eprintln!(
        "Done: {} frames, {dark_frames} dark, {diffs_written} differences written, {failures} unreadable",
        paths.len(),
    );
    Ok(())
}
