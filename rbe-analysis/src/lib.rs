//! Reassigned bandwidth-enhanced analysis for RBE
//!
//! Turns sampled sound into partials: Kaiser-windowed short-time spectra with
//! time-frequency reassignment, peak selection and thinning, bandwidth
//! association and frame-to-frame partial formation. Also builds frequency
//! reference envelopes and fundamental estimates from existing partials.

mod analyzer;
mod bandwidth;
mod builder;
mod error;
mod fundamental;
pub mod kaiser;
mod peaks;
mod reference;
mod spectrum;

pub use analyzer::Analyzer;
pub use bandwidth::BandwidthAssociation;
pub use builder::PartialBuilder;
pub use error::{AnalysisError, Result};
pub use fundamental::{
    create_f0_estimate, F0Estimate, CONFIDENCE_THRESHOLD, DEFAULT_AMP_FLOOR, DEFAULT_FREQ_CEILING,
    DEFAULT_PRECISION,
};
pub use peaks::{PeakSelector, SpectralPeak};
pub use reference::FrequencyReference;
pub use spectrum::ReassignedSpectrum;

use rbe_model::{LinearEnvelope, Partial};

/// Frequency reference envelope sampled `num_samples` times from the longest
/// partial whose loudest point lies in `[min_freq, max_freq]`
pub fn create_freq_reference(
    partials: &[Partial],
    min_freq: f64,
    max_freq: f64,
    num_samples: Option<usize>,
) -> Result<LinearEnvelope> {
    FrequencyReference::new(partials, min_freq, max_freq, num_samples).map(FrequencyReference::into_envelope)
}
