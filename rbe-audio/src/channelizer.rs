//! Channelization: labeling partials by harmonic number
//!
//! Each partial is assigned the integer nearest to the amplitude-weighted
//! average ratio of its frequency to a reference channel, where the reference
//! envelope tracks the channel numbered `reference_label`.

use crate::error::{ProcessError, Result};
use rbe_model::{Envelope, Partial};

pub struct Channelizer<E: Envelope> {
    reference: E,
    reference_label: i32,
}

impl<E: Envelope> Channelizer<E> {
    /// `reference` is the frequency of channel `reference_label`, which must be positive
    pub fn new(reference: E, reference_label: i32) -> Result<Self> {
        if reference_label <= 0 {
            return Err(ProcessError::InvalidArgument(format!(
                "channelizer reference label must be positive, got {reference_label}"
            )));
        }
        Ok(Self {
            reference,
            reference_label,
        })
    }

    /// Label of the channel a single partial belongs to
    pub fn channel_of(&self, partial: &Partial) -> i32 {
        let mut weighted = 0.0;
        let mut amp_sum = 0.0;
        for (t, bp) in partial {
            let a = bp.sinusoidal_amplitude();
            let channel_freq = self.reference.value_at(*t) / self.reference_label as f64;
            if channel_freq <= 0.0 {
                continue;
            }
            weighted += a * (bp.frequency / channel_freq);
            amp_sum += a;
        }
        if amp_sum > 0.0 {
            (weighted / amp_sum + 0.5) as i32
        } else {
            0
        }
    }

    /// Relabel every partial. Frequencies and amplitudes are not changed.
    pub fn channelize(&self, partials: &mut [Partial]) {
        for partial in partials.iter_mut() {
            let label = self.channel_of(partial);
            partial.set_label(label);
        }
        tracing::debug!(
            partials = partials.len(),
            labeled = partials.iter().filter(|p| p.label() > 0).count(),
            "channelized"
        );
    }
}

/// Label `partials` against a reference envelope for channel `reference_label`
pub fn channelize(partials: &mut [Partial], reference: &dyn Envelope, reference_label: i32) -> Result<()> {
    Channelizer::new(reference, reference_label)?.channelize(partials);
    Ok(())
}
