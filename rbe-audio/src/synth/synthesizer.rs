//! Rendering partials to samples

use super::oscillator::Oscillator;
use crate::error::{ProcessError, Result};
use rbe_model::{wrap_phase, Breakpoint, Partial};
use std::f64::consts::PI;

/// Renders partials with a bandwidth-enhanced oscillator.
///
/// Each partial fades in from silence over `fade_time` before its first
/// breakpoint and fades out over `fade_time` after its last.
pub struct Synthesizer {
    sample_rate: f64,
    fade_time: f64,
    oscillator: Oscillator,
}

impl Synthesizer {
    pub const DEFAULT_FADE_TIME: f64 = 0.001;

    pub fn new(sample_rate: f64) -> Result<Self> {
        if !(sample_rate > 0.0) || !sample_rate.is_finite() {
            return Err(ProcessError::InvalidArgument(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }
        Ok(Self {
            sample_rate,
            fade_time: Self::DEFAULT_FADE_TIME,
            oscillator: Oscillator::default(),
        })
    }

    pub fn with_fade_time(sample_rate: f64, fade_time: f64) -> Result<Self> {
        let mut synth = Self::new(sample_rate)?;
        synth.set_fade_time(fade_time)?;
        Ok(synth)
    }

    /// Use a specific oscillator, e.g. one with a seeded noise source
    pub fn with_oscillator(mut self, oscillator: Oscillator) -> Self {
        self.oscillator = oscillator;
        self
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn fade_time(&self) -> f64 {
        self.fade_time
    }

    pub fn set_fade_time(&mut self, fade_time: f64) -> Result<()> {
        if fade_time.is_nan() || fade_time < 0.0 {
            return Err(ProcessError::InvalidArgument(format!(
                "fade time must be non-negative, got {fade_time}"
            )));
        }
        self.fade_time = fade_time;
        Ok(())
    }

    /// Number of samples needed to hold a render ending at `end_time`
    pub fn buffer_len(&self, end_time: f64) -> usize {
        ((end_time.max(0.0) + self.fade_time) * self.sample_rate).ceil() as usize + 1
    }

    /// Render one partial, adding it into `buffer`. The buffer grows as needed.
    pub fn synthesize(&mut self, partial: &Partial, buffer: &mut Vec<f64>) {
        let srate = self.sample_rate;
        let Some(&(first_time, first)) = partial.first() else {
            return;
        };
        if partial.end_time() < 0.0 {
            return;
        }
        let needed = self.buffer_len(partial.end_time());
        if buffer.len() < needed {
            buffer.resize(needed, 0.0);
        }

        // state at the onset of the fade in
        let mut itime = first_time - self.fade_time;
        let mut ibp = Breakpoint::new(first.frequency, 0.0, first.bandwidth, 0.0);
        let mut next = 0;
        if itime < 0.0 {
            next = partial.find_after(0.0);
            ibp = if next == 0 {
                let alpha = -itime / self.fade_time;
                ibp.lerp(&first, alpha)
            } else {
                partial.parameters_at(0.0)
            };
            itime = 0.0;
        }

        let mut cur = (itime * srate).round() as usize;
        if let Some(&(t, bp)) = partial.get(next) {
            // extrapolate the phase back from the next breakpoint
            let favg = 0.5 * (ibp.frequency + bp.frequency);
            ibp.phase = wrap_phase(bp.phase - 2.0 * PI * favg * (t - cur as f64 / srate));
        }
        self.oscillator.reset_envelopes(&ibp, srate);

        for &(t, bp) in partial.iter().skip(next) {
            let target = ((t * srate).round() as usize).max(cur);
            self.oscillator.oscillate(&mut buffer[cur..target], &bp, srate);
            if self.oscillator.amplitude() == 0.0 {
                self.oscillator.set_phase(bp.phase);
            }
            cur = target;
        }

        let fade_samples = (self.fade_time * srate).round() as usize;
        let end = (cur + fade_samples).min(buffer.len());
        let last = partial.last().map_or(first, |&(_, bp)| bp);
        let silence = Breakpoint::new(last.frequency, 0.0, last.bandwidth, 0.0);
        self.oscillator.oscillate(&mut buffer[cur..end], &silence, srate);
    }

    /// Render every partial into a new buffer long enough for all of them
    pub fn synthesize_all(&mut self, partials: &[Partial]) -> Vec<f64> {
        let end = partials
            .iter()
            .filter(|p| !p.is_empty())
            .map(Partial::end_time)
            .fold(0.0, f64::max);
        let mut buffer = vec![0.0; self.buffer_len(end)];
        for partial in partials {
            self.synthesize(partial, &mut buffer);
        }
        tracing::debug!(
            partials = partials.len(),
            samples = buffer.len(),
            sample_rate = self.sample_rate,
            "synthesized"
        );
        buffer
    }
}

/// Render `partials` at `sample_rate` with the default fade time
pub fn synthesize(partials: &[Partial], sample_rate: f64) -> Result<Vec<f64>> {
    Ok(Synthesizer::new(sample_rate)?.synthesize_all(partials))
}
