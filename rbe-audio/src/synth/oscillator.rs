//! Bandwidth-enhanced sinusoidal oscillator

use super::noise::FilteredNoise;
use rbe_model::{wrap_phase, Breakpoint};
use std::f64::consts::PI;

/// A sinusoid whose amplitude is modulated by narrowband noise in
/// proportion to its bandwidth.
///
/// Frequency and phase are held in radians per sample and radians.
#[derive(Debug, Clone)]
pub struct Oscillator {
    frequency: f64,
    amplitude: f64,
    bandwidth: f64,
    phase: f64,
    modulator: FilteredNoise,
}

impl Oscillator {
    pub fn new(modulator: FilteredNoise) -> Self {
        Self {
            frequency: 0.0,
            amplitude: 0.0,
            bandwidth: 0.0,
            phase: 0.0,
            modulator,
        }
    }

    /// Jump to the state described by `bp` without rendering anything
    pub fn reset_envelopes(&mut self, bp: &Breakpoint, sample_rate: f64) {
        self.frequency = bp.frequency * 2.0 * PI / sample_rate;
        self.amplitude = if self.frequency > PI { 0.0 } else { bp.amplitude };
        self.bandwidth = bp.bandwidth.clamp(0.0, 1.0);
        self.phase = wrap_phase(bp.phase);
        self.modulator.reset();
    }

    /// Radian frequency per sample
    pub fn radian_frequency(&self) -> f64 {
        self.frequency
    }

    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn set_phase(&mut self, phase: f64) {
        self.phase = wrap_phase(phase);
    }

    /// Accumulate samples into `buffer`, ramping linearly from the current
    /// state to `target`. Components above Nyquist fade to silence.
    pub fn oscillate(&mut self, buffer: &mut [f64], target: &Breakpoint, sample_rate: f64) {
        let target_freq = target.frequency * 2.0 * PI / sample_rate;
        let target_amp = if target_freq > PI { 0.0 } else { target.amplitude };
        let target_bw = target.bandwidth.clamp(0.0, 1.0);
        let n = buffer.len();

        if self.amplitude == 0.0 && target_amp == 0.0 {
            // nothing to render, but keep the phase running
            self.phase = wrap_phase(self.phase + 0.5 * (self.frequency + target_freq) * n as f64);
        } else if n > 0 {
            let inv = 1.0 / n as f64;
            let dfreq = (target_freq - self.frequency) * inv;
            let damp = (target_amp - self.amplitude) * inv;
            let dbw = (target_bw - self.bandwidth) * inv;

            let (mut f, mut a, mut b, mut p) =
                (self.frequency, self.amplitude, self.bandwidth, self.phase);
            for sample in buffer.iter_mut() {
                let noise = self.modulator.next_sample();
                let modulation = (1.0 - b).sqrt() + noise * (2.0 * b).sqrt();
                *sample += modulation * a * p.cos();

                p += f;
                f += dfreq;
                a += damp;
                b = (b + dbw).max(0.0);
            }
            self.phase = wrap_phase(p);
        }

        self.frequency = target_freq;
        self.amplitude = target_amp;
        self.bandwidth = target_bw;
    }
}

impl Default for Oscillator {
    fn default() -> Self {
        Self::new(FilteredNoise::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 44100.0;

    #[test]
    fn test_pure_sinusoid() {
        let mut osc = Oscillator::default();
        let bp = Breakpoint::new(441.0, 0.5, 0.0, 0.25);
        osc.reset_envelopes(&bp, SR);
        let mut buffer = vec![0.0; 1000];
        osc.oscillate(&mut buffer, &bp, SR);

        let w = 2.0 * PI * 441.0 / SR;
        for (n, &s) in buffer.iter().enumerate() {
            let expected = 0.5 * (0.25 + w * n as f64).cos();
            assert!((s - expected).abs() < 1e-9, "sample {n}");
        }
        assert!((osc.phase() - wrap_phase(0.25 + w * 1000.0)).abs() < 1e-9);
    }

    #[test]
    fn test_accumulates_into_buffer() {
        let mut osc = Oscillator::default();
        let bp = Breakpoint::new(100.0, 0.1, 0.0, 0.0);
        osc.reset_envelopes(&bp, SR);
        let mut buffer = vec![1.0; 4];
        osc.oscillate(&mut buffer, &bp, SR);
        assert!((buffer[0] - 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_above_nyquist_is_silent() {
        let mut osc = Oscillator::default();
        let bp = Breakpoint::new(30000.0, 0.5, 0.0, 0.0);
        osc.reset_envelopes(&bp, SR);
        let mut buffer = vec![0.0; 256];
        osc.oscillate(&mut buffer, &bp, SR);
        assert!(buffer.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_silent_segment_advances_phase() {
        let mut osc = Oscillator::default();
        let bp = Breakpoint::new(441.0, 0.0, 0.0, 0.0);
        osc.reset_envelopes(&bp, SR);
        let mut buffer = vec![0.0; 10];
        osc.oscillate(&mut buffer, &bp, SR);
        assert!(buffer.iter().all(|&s| s == 0.0));
        let w = 2.0 * PI * 441.0 / SR;
        assert!((osc.phase() - 10.0 * w).abs() < 1e-12);
    }

    #[test]
    fn test_noisy_oscillator() {
        let mut osc = Oscillator::default();
        let bp = Breakpoint::new(1000.0, 0.5, 1.0, 0.0);
        osc.reset_envelopes(&bp, SR);
        let mut buffer = vec![0.0; 4410];
        osc.oscillate(&mut buffer, &bp, SR);
        assert!(buffer.iter().all(|s| s.is_finite()));
        assert!(buffer.iter().any(|&s| s.abs() > 1e-4));
        assert_eq!(osc.bandwidth(), 1.0);
    }

    #[test]
    fn test_bandwidth_is_clamped() {
        let mut osc = Oscillator::default();
        osc.reset_envelopes(&Breakpoint::new(100.0, 0.1, 1.5, 0.0), SR);
        assert_eq!(osc.bandwidth(), 1.0);
        osc.reset_envelopes(&Breakpoint::new(100.0, 0.1, -0.5, 0.0), SR);
        assert_eq!(osc.bandwidth(), 0.0);
    }
}
