//! Resampling partial envelopes onto a uniform time grid

use crate::error::{ProcessError, Result};
use rbe_model::utils::fix_phase_after;
use rbe_model::Partial;

pub struct Resampler {
    interval: f64,
    phase_correct: bool,
}

impl Resampler {
    /// `interval` is the grid spacing in seconds and must be positive
    pub fn new(interval: f64) -> Result<Self> {
        if !(interval > 0.0) || !interval.is_finite() {
            return Err(ProcessError::InvalidArgument(format!(
                "resampling interval must be positive, got {interval}"
            )));
        }
        Ok(Self {
            interval,
            phase_correct: true,
        })
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Recompute phases from frequencies after resampling (on by default)
    pub fn set_phase_correct(&mut self, correct: bool) -> &mut Self {
        self.phase_correct = correct;
        self
    }

    pub fn resample_partial(&self, partial: &mut Partial) {
        if partial.is_empty() {
            return;
        }
        let first = (partial.start_time() / self.interval).round() as i64;
        let last = (partial.end_time() / self.interval).round() as i64;

        let mut resampled = Partial::with_label(partial.label());
        for k in first..=last {
            let t = k as f64 * self.interval;
            resampled.insert(t, partial.parameters_at(t));
        }
        if self.phase_correct {
            fix_phase_after(&mut resampled, 0);
        }
        *partial = resampled;
    }

    pub fn resample(&self, partials: &mut [Partial]) {
        for partial in partials.iter_mut() {
            self.resample_partial(partial);
        }
        tracing::debug!(partials = partials.len(), interval = self.interval, "resampled");
    }
}

/// Resample `partials` at `interval` with phase correction
pub fn resample(partials: &mut [Partial], interval: f64) -> Result<()> {
    Resampler::new(interval)?.resample(partials);
    Ok(())
}
