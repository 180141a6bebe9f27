//! Partial processing and synthesis for RBE
//!
//! Operations on collections of partials produced by analysis:
//! - Channelizer: label partials by harmonic number against a reference
//! - Distiller, Sieve, Collator: resolve partials that share a label
//! - Dilator: warp partial times to align features
//! - Morpher: interpolate between two labeled sounds
//! - Harmonifier, Resampler: frequency correction and uniform resampling
//! - Synth: bandwidth-enhanced oscillators and the partial synthesizer

mod channelizer;
mod collator;
mod dilator;
mod distiller;
mod error;
mod harmonifier;
mod morpher;
mod resampler;
mod sieve;
pub mod synth;

pub use channelizer::{channelize, Channelizer};
pub use collator::{collate, Collator};
pub use dilator::{dilate, Dilator};
pub use distiller::{distill, Distiller};
pub use error::{ProcessError, Result};
pub use harmonifier::{harmonify, Harmonifier};
pub use morpher::{interpolate_amplitude, morph, morph_with_references, Morpher};
pub use resampler::{resample, Resampler};
pub use sieve::{sift, Sieve};
pub use synth::{synthesize, FilteredNoise, NoiseGenerator, Oscillator, Synthesizer};
