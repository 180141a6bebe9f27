//! Reassigned short-time spectrum
//!
//! Alongside the ordinary windowed transform, a second transform is taken
//! with a complex window whose real part is the frequency-ramped window and
//! whose imaginary part is the time-ramped window. The two ramped transforms
//! are separated by conjugate symmetry, which yields both the frequency and
//! time reassignment of every bin for the cost of one extra FFT.

use rbe_model::wrap_phase;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f64::consts::PI;
use std::sync::Arc;

/// Short-time spectrum with time-frequency reassignment
pub struct ReassignedSpectrum {
    window: Vec<f64>,
    reassignment_window: Vec<Complex<f64>>,
    magnitude_scale: f64,
    fft: Arc<dyn Fft<f64>>,
    /// Transform of the windowed samples
    transform: Vec<Complex<f64>>,
    /// Transform of the samples under the reassignment window
    ra_transform: Vec<Complex<f64>>,
}

impl ReassignedSpectrum {
    /// Create a spectrum analyzer for the given (odd length) window
    pub fn new(window: Vec<f64>) -> Self {
        let winlen = window.len().max(1);
        let exponent = 1 + (winlen as f64).log2().ceil() as u32;
        let size = 1usize << exponent;

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);

        let reassignment_window = build_reassignment_window(&window, &mut planner);
        let winsum: f64 = window.iter().sum();
        let magnitude_scale = if winsum > 0.0 { 2.0 / winsum } else { 0.0 };

        tracing::debug!(
            window_len = window.len(),
            fft_len = size,
            magnitude_scale,
            "reassigned spectrum configured"
        );

        Self {
            window,
            reassignment_window,
            magnitude_scale,
            fft,
            transform: vec![Complex::new(0.0, 0.0); size],
            ra_transform: vec![Complex::new(0.0, 0.0); size],
        }
    }

    /// Transform length
    pub fn size(&self) -> usize {
        self.transform.len()
    }

    /// The analysis window
    pub fn window(&self) -> &[f64] {
        &self.window
    }

    /// Magnitude of bin `idx` of the ordinary transform (unscaled)
    pub fn magnitude(&self, idx: usize) -> f64 {
        self.transform[idx].norm()
    }

    /// Compute the spectra of `samples[begin..end]`, a window centred on
    /// `center`. The window is truncated where it would extend before the
    /// start of the buffer.
    pub fn transform(&mut self, samples: &[f64], begin: usize, center: usize, end: usize) {
        let half = self.window.len() / 2;
        let to_center = center - begin;
        let win_offset = half.saturating_sub(to_center);
        let size = self.size();
        let count = (end - begin).min(self.window.len() - win_offset).min(size);

        self.transform.fill(Complex::new(0.0, 0.0));
        self.ra_transform.fill(Complex::new(0.0, 0.0));

        // centre sample lands at index zero to give zero-phase frames
        for k in 0..count {
            let x = samples[begin + k];
            let dest = (k + size - to_center % size) % size;
            self.transform[dest] = Complex::new(x * self.window[win_offset + k], 0.0);
            self.ra_transform[dest] = self.reassignment_window[win_offset + k] * x;
        }

        self.fft.process(&mut self.transform);
        self.fft.process(&mut self.ra_transform);
    }

    fn flip(&self, idx: usize) -> usize {
        if idx > 0 {
            self.size() - idx
        } else {
            idx
        }
    }

    fn oversampling(&self) -> f64 {
        self.size() as f64 / self.window.len() as f64
    }

    /// Frequency correction in bins for bin `idx`
    pub fn frequency_correction(&self, idx: usize) -> f64 {
        let x = self.transform[idx];
        let mag_squared = x.norm_sqr();
        if mag_squared == 0.0 {
            return 0.0;
        }
        let fra = (self.ra_transform[idx] + self.ra_transform[self.flip(idx)].conj()) * 0.5;
        let num = x.re * fra.im - x.im * fra.re;
        -self.oversampling() * num / mag_squared
    }

    /// Time correction in samples, relative to the window centre, for bin `idx`
    pub fn time_correction(&self, idx: usize) -> f64 {
        let x = self.transform[idx];
        let mag_squared = x.norm_sqr();
        if mag_squared == 0.0 {
            return 0.0;
        }
        let tmp = self.ra_transform[idx] - self.ra_transform[self.flip(idx)].conj();
        let tra = Complex::new(0.5 * tmp.im, -0.5 * tmp.re);
        (x.re * tra.re + x.im * tra.im) / mag_squared
    }

    /// Reassigned frequency of bin `idx`, as a fractional bin number
    pub fn reassigned_frequency(&self, idx: usize) -> f64 {
        idx as f64 + self.frequency_correction(idx)
    }

    /// Reassigned time of bin `idx`, in samples from the window centre
    pub fn reassigned_time(&self, idx: usize) -> f64 {
        self.time_correction(idx)
    }

    /// Sinusoidal amplitude estimate for the peak at bin `idx`
    pub fn reassigned_magnitude(&self, idx: usize) -> f64 {
        self.magnitude_scale * self.transform[idx].norm()
    }

    /// Phase of bin `idx` advanced to the reassigned time
    pub fn reassigned_phase(&self, idx: usize, frac_bin: f64, time_correction: f64) -> f64 {
        let phase = self.transform[idx].arg()
            + time_correction * frac_bin * 2.0 * PI / self.size() as f64;
        wrap_phase(phase)
    }
}

/// Complex window: frequency ramp in the real part, time ramp in the imaginary part
fn build_reassignment_window(window: &[f64], planner: &mut FftPlanner<f64>) -> Vec<Complex<f64>> {
    let n = window.len();
    if n == 0 {
        return Vec::new();
    }

    let mut temp: Vec<Complex<f64>> = window.iter().map(|&w| Complex::new(w, 0.0)).collect();
    planner.plan_fft_forward(n).process(&mut temp);
    for (k, bin) in temp.iter_mut().enumerate() {
        let ramp = if k < n / 2 {
            k as f64
        } else {
            k as f64 - n as f64
        };
        *bin *= ramp;
    }
    planner.plan_fft_inverse(n).process(&mut temp);

    let offset = 0.5 * (n as f64 - 1.0);
    window
        .iter()
        .zip(&temp)
        .enumerate()
        .map(|(k, (&w, ramped))| Complex::new(-ramped.im / n as f64, w * (k as f64 - offset)))
        .collect()
}
