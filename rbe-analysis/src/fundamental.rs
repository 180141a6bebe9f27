//! Fundamental frequency estimation from partials
//!
//! The estimate maximises a harmonic likelihood over candidate fundamentals
//! that are integer sub-multiples of the observed frequencies, then refines
//! the winner by a secant search for a zero of the likelihood derivative.

use crate::error::{AnalysisError, Result};
use rbe_model::{utils, LinearEnvelope, Partial};
use std::f64::consts::PI;

/// Partials quieter than this (dB) are ignored when estimating
pub const DEFAULT_AMP_FLOOR: f64 = -60.0;
/// Partials above this frequency (Hz) are ignored when estimating
pub const DEFAULT_FREQ_CEILING: f64 = 10000.0;
/// Target precision (Hz) of a refined estimate
pub const DEFAULT_PRECISION: f64 = 0.1;
/// Estimates with lower normalised confidence are discarded
pub const CONFIDENCE_THRESHOLD: f64 = 0.9;

const MAX_SECANT_ITERATIONS: usize = 20;

/// A single fundamental frequency estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct F0Estimate {
    /// Estimated fundamental in Hz
    pub frequency: f64,
    /// Normalised likelihood of the estimate, at most 1
    pub confidence: f64,
}

impl F0Estimate {
    /// Estimate the fundamental of a set of sinusoids.
    ///
    /// Returns `None` when no candidate lies in `[fmin, fmax]` or the
    /// amplitudes carry no energy.
    pub fn new(amps: &[f64], freqs: &[f64], fmin: f64, fmax: f64, precision: f64) -> Option<Self> {
        let (fmin, fmax) = if fmin > fmax { (fmax, fmin) } else { (fmin, fmax) };
        let fmin = fmin.max(1.0);

        let energy: f64 = amps.iter().map(|a| a * a).sum();
        if energy <= 0.0 {
            return None;
        }

        let candidates = candidate_frequencies(freqs, fmin, fmax);
        let q: Vec<f64> = candidates
            .iter()
            .map(|&f0| likelihood(amps, freqs, f0))
            .collect();
        let qmax = q.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let threshold = 0.85 * qmax;
        let pos = q.iter().rposition(|&v| v >= threshold)?;
        let candidate = candidates[pos];

        let refined = secant(amps, freqs, candidate, 0.98 * candidate, 0.5 * precision);
        let frequency = if refined.is_finite() && refined >= fmin && refined <= fmax {
            refined
        } else {
            candidate
        };

        Some(Self {
            frequency,
            confidence: likelihood(amps, freqs, frequency) / energy,
        })
    }
}

/// Integer sub-multiples of every frequency that fall in `[fmin, fmax]`, sorted
fn candidate_frequencies(freqs: &[f64], fmin: f64, fmax: f64) -> Vec<f64> {
    let mut out = Vec::new();
    for &peak in freqs {
        if peak < fmin {
            continue;
        }
        let mut div = ((peak / fmax).ceil()).max(1.0);
        let mut f = peak / div;
        while f >= fmin {
            if f <= fmax {
                out.push(f);
            }
            div += 1.0;
            f = peak / div;
        }
    }
    out.sort_by(f64::total_cmp);
    out
}

/// Harmonic likelihood `Σ a² cos(2π f / f0)`
fn likelihood(amps: &[f64], freqs: &[f64], f0: f64) -> f64 {
    amps.iter()
        .zip(freqs)
        .map(|(a, f)| a * a * (2.0 * PI * f / f0).cos())
        .sum()
}

/// Derivative of the likelihood with respect to `f0`
fn likelihood_slope(amps: &[f64], freqs: &[f64], f0: f64) -> f64 {
    amps.iter()
        .zip(freqs)
        .map(|(a, f)| {
            let arg = 2.0 * PI * f / f0;
            a * a * arg.sin() * arg / f0
        })
        .sum()
}

fn secant(amps: &[f64], freqs: &[f64], x0: f64, x1: f64, precision: f64) -> f64 {
    let (mut prev, mut x) = (x1, x0);
    let mut f_prev = likelihood_slope(amps, freqs, prev);
    for _ in 0..MAX_SECANT_ITERATIONS {
        let fx = likelihood_slope(amps, freqs, x);
        let denom = fx - f_prev;
        if denom == 0.0 {
            break;
        }
        let delta = fx * (x - prev) / denom;
        if !delta.is_finite() {
            break;
        }
        prev = x;
        f_prev = fx;
        x -= delta;
        if delta.abs() <= precision {
            break;
        }
    }
    x
}

/// Build an envelope of fundamental estimates sampled every `interval`
/// seconds across the span of `partials`.
///
/// Only estimates inside `(fmin, fmax)` with confidence above
/// [`CONFIDENCE_THRESHOLD`] are kept.
pub fn create_f0_estimate(
    partials: &[Partial],
    fmin: f64,
    fmax: f64,
    interval: f64,
) -> Result<LinearEnvelope> {
    if interval.is_nan() || interval <= 0.0 {
        return Err(AnalysisError::InvalidArgument(
            "estimate interval must be positive".into(),
        ));
    }
    if partials.is_empty() {
        return Err(AnalysisError::InvalidArgument(
            "cannot estimate a fundamental from no partials".into(),
        ));
    }
    let (fmin, fmax) = if fmin > fmax { (fmax, fmin) } else { (fmin, fmax) };
    if fmin >= fmax {
        return Err(AnalysisError::InvalidArgument(
            "fundamental range must not be empty".into(),
        ));
    }

    let amp_threshold = 10f64.powf(0.05 * DEFAULT_AMP_FLOOR);
    let (start, end) = utils::time_span(partials);
    let mut env = LinearEnvelope::new();
    let mut amps = Vec::new();
    let mut freqs = Vec::new();

    let mut step = 0u64;
    loop {
        let t = start + step as f64 * interval;
        if t > end {
            break;
        }
        step += 1;

        amps.clear();
        freqs.clear();
        for partial in partials {
            let a = partial.amplitude_at(t);
            let f = partial.frequency_at(t);
            if a > amp_threshold && f < DEFAULT_FREQ_CEILING {
                amps.push(a * (1.0 - partial.bandwidth_at(t)).max(0.0).sqrt());
                freqs.push(f);
            }
        }
        if amps.is_empty() {
            continue;
        }

        if let Some(est) = F0Estimate::new(&amps, &freqs, fmin, fmax, DEFAULT_PRECISION) {
            if est.frequency > fmin && est.frequency < fmax && est.confidence > CONFIDENCE_THRESHOLD {
                env.insert(t, est.frequency);
            }
        }
    }

    tracing::debug!(points = env.len(), fmin, fmax, "fundamental estimated");
    if env.is_empty() {
        return Err(AnalysisError::NoFundamental {
            min_freq: fmin,
            max_freq: fmax,
        });
    }
    Ok(env)
}
