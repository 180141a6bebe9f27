//! Bandwidth-enhanced additive synthesis
//!
//! - Noise: seedable gaussian source and its low-pass filtered form
//! - Oscillator: sinusoid with noise-modulated amplitude
//! - Synthesizer: renders whole partials with fades at both ends

mod noise;
mod oscillator;
mod synthesizer;

pub use noise::{FilteredNoise, NoiseGenerator};
pub use oscillator::Oscillator;
pub use synthesizer::{synthesize, Synthesizer};
