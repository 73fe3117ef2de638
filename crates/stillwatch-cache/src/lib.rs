//! stillwatch-cache: sequential image cache and differencing engine
//! (sans-IO).
//!
//! Supports reviewing long capture sequences from fixed cameras:
//! step record-by-record, compare each frame against its temporal
//! neighbors to surface motion, and auto-flag likely-dark frames.
//!
//! This crate has **no I/O dependencies** -- bitmaps arrive through an
//! externally supplied decode callback, positioning through an external
//! record sequence, and all pixel work happens on in-memory byte
//! buffers. File pickers, databases, rendering, and metadata handling
//! live with the caller.
//!
//! The moving parts, leaves first:
//! - [`RecencyIndex`]: fixed-capacity most-recently-used key tracker.
//! - [`BitmapStore`]: id-to-bitmap map with LRU eviction.
//! - [`diff`]/[`classify`]: stateless byte-level pixel algorithms.
//! - [`DifferenceStateMachine`]: which comparison is currently shown.
//! - [`ImageCache`]: composition root exposing the composed bitmap for
//!   the current position and difference mode.

pub mod cache;
pub mod classify;
pub mod diff;
pub mod recency;
pub mod state;
pub mod store;
pub mod types;

pub use cache::{BitmapDecoder, ImageCache, RecordSequence, VecSequence};
pub use classify::{Classification, classify};
pub use diff::{combined_difference, subtract};
pub use recency::RecencyIndex;
pub use state::{DifferenceState, DifferenceStateMachine, NeighborUsability};
pub use store::BitmapStore;
pub use types::{Bitmap, CacheConfig, CacheError, DiffOutcome, PixelFormat, RecordId};
