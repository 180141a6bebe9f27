//! Harmonic frequency correction for quiet breakpoints
//!
//! Frequencies of low-amplitude breakpoints are unreliable. Below a
//! threshold they are pulled toward the matching harmonic of a reference
//! partial, fading in the correction over a 10 dB range.

use crate::error::{ProcessError, Result};
use rbe_model::{Envelope, Partial};

const FADE_RANGE_DB: f64 = 10.0;

pub struct Harmonifier<'a> {
    reference: Partial,
    weight: Box<dyn Envelope + 'a>,
    threshold_db: f64,
}

impl<'a> Harmonifier<'a> {
    pub const DEFAULT_THRESHOLD_DB: f64 = -90.0;

    /// An unlabeled reference is taken to be the fundamental (label 1)
    pub fn new(reference: &Partial, threshold_db: f64) -> Result<Self> {
        Self::with_weight(reference, 1.0_f64, threshold_db)
    }

    /// Scale the correction by a time-varying `weight` in [0, 1]
    pub fn with_weight(
        reference: &Partial,
        weight: impl Envelope + 'a,
        threshold_db: f64,
    ) -> Result<Self> {
        if reference.is_empty() {
            return Err(ProcessError::InvalidArgument(
                "cannot harmonify with an empty reference partial".to_string(),
            ));
        }
        if !threshold_db.is_finite() {
            return Err(ProcessError::InvalidArgument(format!(
                "harmonifier threshold must be finite, got {threshold_db}"
            )));
        }
        let mut reference = reference.clone();
        if reference.label() == 0 {
            reference.set_label(1);
        }
        Ok(Self {
            reference,
            weight: Box::new(weight),
            threshold_db,
        })
    }

    pub fn threshold_db(&self) -> f64 {
        self.threshold_db
    }

    pub fn harmonify_partial(&self, partial: &mut Partial) {
        if partial.label() == 0 {
            return;
        }
        let begin_fade = 10f64.powf(0.05 * (self.threshold_db + FADE_RANGE_DB));
        let threshold = 10f64.powf(0.05 * self.threshold_db);
        let fscale = f64::from(partial.label()) / f64::from(self.reference.label());

        for (t, bp) in partial.iter_mut() {
            if bp.amplitude >= begin_fade {
                continue;
            }
            let alpha = ((begin_fade - bp.amplitude) / (begin_fade - threshold)).min(1.0)
                * self.weight.value_at(t);
            let harmonic = self.reference.frequency_at(t) * fscale;
            bp.frequency = alpha * harmonic + (1.0 - alpha) * bp.frequency;
        }
    }

    pub fn harmonify(&self, partials: &mut [Partial]) {
        for partial in partials.iter_mut() {
            self.harmonify_partial(partial);
        }
        tracing::debug!(partials = partials.len(), threshold_db = self.threshold_db, "harmonified");
    }
}

/// Harmonify `partials` against `reference` with a constant weight of 1
pub fn harmonify(partials: &mut [Partial], reference: &Partial, threshold_db: f64) -> Result<()> {
    Harmonifier::new(reference, threshold_db)?.harmonify(partials);
    Ok(())
}
