//! Instantaneous partial state

use std::f64::consts::PI;

/// One sample of a partial's time-varying state.
///
/// Breakpoints carry no time of their own; the owning [`Partial`](crate::Partial)
/// keys them by time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Breakpoint {
    /// Frequency in Hz
    pub frequency: f64,
    /// Linear amplitude
    pub amplitude: f64,
    /// Noisiness, 0 (pure sinusoid) to 1 (pure noise)
    pub bandwidth: f64,
    /// Phase in radians
    pub phase: f64,
}

impl Breakpoint {
    /// Create a breakpoint from its four parameters
    pub fn new(frequency: f64, amplitude: f64, bandwidth: f64, phase: f64) -> Self {
        Self {
            frequency,
            amplitude,
            bandwidth,
            phase,
        }
    }

    /// Create a zero-amplitude breakpoint at the given frequency and phase
    pub fn null(frequency: f64, phase: f64) -> Self {
        Self::new(frequency, 0.0, 0.0, phase)
    }

    /// Add noise (bandwidth) energy to this breakpoint.
    ///
    /// The sinusoidal energy is preserved, the added energy is counted as noise,
    /// and the amplitude grows to account for the total.
    pub fn add_noise_energy(&mut self, enoise: f64) {
        let mut e = self.amplitude * self.amplitude;
        let n = e * self.bandwidth;
        if e < n {
            e = n;
        }

        if n + enoise > 0.0 {
            self.bandwidth = (n + enoise) / (e + enoise);
            self.amplitude = (e + enoise).sqrt();
        } else {
            self.bandwidth = 0.0;
            self.amplitude = (e - n).max(0.0).sqrt();
        }
    }

    /// Amplitude of the sinusoidal part only
    pub fn sinusoidal_amplitude(&self) -> f64 {
        self.amplitude * (1.0 - self.bandwidth.clamp(0.0, 1.0)).sqrt()
    }

    /// Total energy represented by this breakpoint
    pub fn energy(&self) -> f64 {
        self.amplitude * self.amplitude
    }

    /// Linearly interpolate all four parameters toward `other`.
    ///
    /// Phase is interpolated along the shortest path around the circle.
    pub fn lerp(&self, other: &Breakpoint, alpha: f64) -> Breakpoint {
        let mut dphase = other.phase - self.phase;
        dphase -= 2.0 * PI * (dphase / (2.0 * PI)).round();
        Breakpoint {
            frequency: self.frequency + alpha * (other.frequency - self.frequency),
            amplitude: self.amplitude + alpha * (other.amplitude - self.amplitude),
            bandwidth: self.bandwidth + alpha * (other.bandwidth - self.bandwidth),
            phase: wrap_phase(self.phase + alpha * dphase),
        }
    }
}

/// Wrap a phase into the range (-π, π].
pub fn wrap_phase(phase: f64) -> f64 {
    let two_pi = 2.0 * PI;
    let mut p = phase % two_pi;
    if p > PI {
        p -= two_pi;
    } else if p <= -PI {
        p += two_pi;
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_noise_energy_preserves_total() {
        let mut bp = Breakpoint::new(440.0, 0.5, 0.2, 0.0);
        let before = bp.energy();
        bp.add_noise_energy(0.1);
        assert!((bp.energy() - (before + 0.1)).abs() < 1e-12);
        // sinusoidal energy unchanged
        let sine_before = 0.25 * 0.8;
        let sine_after = bp.energy() * (1.0 - bp.bandwidth);
        assert!((sine_before - sine_after).abs() < 1e-12);
    }

    #[test]
    fn test_add_noise_energy_to_silent() {
        let mut bp = Breakpoint::new(100.0, 0.0, 0.0, 0.0);
        bp.add_noise_energy(0.04);
        assert!((bp.amplitude - 0.2).abs() < 1e-12);
        assert!((bp.bandwidth - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_add_zero_noise() {
        let mut bp = Breakpoint::new(100.0, 0.3, 0.0, 1.0);
        bp.add_noise_energy(0.0);
        assert_eq!(bp.bandwidth, 0.0);
        assert!((bp.amplitude - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_wrap_phase() {
        assert!((wrap_phase(3.0 * PI) - PI).abs() < 1e-9);
        assert!((wrap_phase(-3.0 * PI) - PI).abs() < 1e-9);
        assert!((wrap_phase(0.5) - 0.5).abs() < 1e-12);
        assert!((wrap_phase(2.0 * PI + 0.25) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_sinusoidal_amplitude() {
        let bp = Breakpoint::new(100.0, 1.0, 0.75, 0.0);
        assert!((bp.sinusoidal_amplitude() - 0.5).abs() < 1e-12);
    }
}
