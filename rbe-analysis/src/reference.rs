//! Frequency reference envelopes for tracking analysis and channelization

use crate::error::{AnalysisError, Result};
use rbe_model::{Envelope, LinearEnvelope, Partial};

/// Frequency envelope taken from the longest partial in a frequency range
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyReference {
    env: LinearEnvelope,
}

impl FrequencyReference {
    /// Build a reference from `partials`.
    ///
    /// Only partials whose frequency at their point of greatest sinusoidal
    /// amplitude lies in `[min_freq, max_freq]` are considered; the longest
    /// of them is sampled at `num_samples` evenly spaced interior times, or
    /// at every breakpoint when `num_samples` is `None`.
    pub fn new(
        partials: &[Partial],
        min_freq: f64,
        max_freq: f64,
        num_samples: Option<usize>,
    ) -> Result<Self> {
        let (min_freq, max_freq) = if max_freq < min_freq {
            (max_freq, min_freq)
        } else {
            (min_freq, max_freq)
        };
        if num_samples == Some(0) {
            return Err(AnalysisError::InvalidArgument(
                "a frequency reference needs a positive number of samples".into(),
            ));
        }

        let longest = longest_in_range(partials, min_freq, max_freq)
            .ok_or(AnalysisError::NoReferencePartial { min_freq, max_freq })?;

        let env: LinearEnvelope = match num_samples {
            Some(n) => {
                let dt = longest.duration() / (n + 1) as f64;
                (0..n)
                    .map(|i| {
                        let t = longest.start_time() + (i + 1) as f64 * dt;
                        (t, longest.frequency_at(t))
                    })
                    .collect()
            }
            None => longest.iter().map(|(t, bp)| (*t, bp.frequency)).collect(),
        };

        tracing::debug!(
            min_freq,
            max_freq,
            points = env.len(),
            duration = longest.duration(),
            "frequency reference built"
        );
        Ok(Self { env })
    }

    /// The sampled reference envelope
    pub fn envelope(&self) -> &LinearEnvelope {
        &self.env
    }

    pub fn into_envelope(self) -> LinearEnvelope {
        self.env
    }
}

impl Envelope for FrequencyReference {
    fn value_at(&self, time: f64) -> f64 {
        self.env.value_at(time)
    }
}

/// Time of the breakpoint with the greatest sinusoidal amplitude
fn time_of_peak_energy(partial: &Partial) -> Option<f64> {
    partial
        .iter()
        .fold(None, |best: Option<(f64, f64)>, (t, bp)| {
            let a = bp.sinusoidal_amplitude();
            match best {
                Some((_, max)) if a <= max => best,
                _ => Some((*t, a)),
            }
        })
        .map(|(t, _)| t)
}

fn longest_in_range(partials: &[Partial], min_freq: f64, max_freq: f64) -> Option<&Partial> {
    let mut longest: Option<&Partial> = None;
    for partial in partials {
        let Some(t) = time_of_peak_energy(partial) else {
            continue;
        };
        let f = partial.frequency_at(t);
        if f < min_freq || f > max_freq {
            continue;
        }
        if longest.map_or(true, |l| partial.duration() > l.duration()) {
            longest = Some(partial);
        }
    }
    longest
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbe_model::Breakpoint;

    fn steady(freq: f64, start: f64, end: f64) -> Partial {
        let mut p = Partial::new();
        p.insert(start, Breakpoint::new(freq, 0.1, 0.0, 0.0));
        p.insert(end, Breakpoint::new(freq * 1.01, 0.2, 0.0, 0.0));
        p
    }

    #[test]
    fn test_picks_longest_in_range() {
        let partials = vec![steady(100.0, 0.0, 0.5), steady(110.0, 0.0, 1.0), steady(300.0, 0.0, 2.0)];
        let reference = FrequencyReference::new(&partials, 90.0, 150.0, Some(9)).unwrap();
        assert_eq!(reference.envelope().len(), 9);
        // sampled strictly inside the span
        let times: Vec<f64> = reference.envelope().iter().map(|p| p.0).collect();
        assert!((times[0] - 0.1).abs() < 1e-12);
        assert!((times[8] - 0.9).abs() < 1e-12);
        assert!((reference.value_at(0.5) - 110.55).abs() < 1e-9);
    }

    #[test]
    fn test_reversed_bounds_and_all_breakpoints() {
        let partials = vec![steady(200.0, 0.0, 1.0)];
        let reference = FrequencyReference::new(&partials, 250.0, 150.0, None).unwrap();
        assert_eq!(reference.envelope().len(), 2);
    }

    #[test]
    fn test_no_partial_in_range() {
        let partials = vec![steady(200.0, 0.0, 1.0)];
        let err = FrequencyReference::new(&partials, 10.0, 20.0, None).unwrap_err();
        assert!(matches!(err, AnalysisError::NoReferencePartial { .. }));
        assert!(FrequencyReference::new(&partials, 100.0, 300.0, Some(0)).is_err());
    }
}
