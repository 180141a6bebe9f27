//! Spectral peak selection and thinning

use crate::bandwidth::BandwidthAssociation;
use crate::spectrum::ReassignedSpectrum;
use rbe_model::Breakpoint;

/// A reassigned spectral peak: a breakpoint and its corrected time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralPeak {
    /// Reassigned time in seconds
    pub time: f64,
    pub breakpoint: Breakpoint,
}

/// Selection criteria for spectral peaks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakSelector {
    /// Absolute magnitude below which peaks only count as noise
    pub amp_threshold: f64,
    /// Lowest frequency (Hz) of a retained peak
    pub freq_floor: f64,
    /// Largest time correction (seconds) of a retained peak
    pub crop_time: f64,
    /// Minimum frequency spacing (Hz) between retained peaks
    pub freq_resolution: f64,
}

impl PeakSelector {
    /// Build a selector with the amplitude floor given in (negative) dB
    pub fn new(amp_floor_db: f64, freq_floor: f64, crop_time: f64, freq_resolution: f64) -> Self {
        Self {
            amp_threshold: 10f64.powf(0.05 * amp_floor_db),
            freq_floor,
            crop_time,
            freq_resolution,
        }
    }

    /// Collect the magnitude peaks of the spectrum, in increasing frequency.
    ///
    /// Peaks below the amplitude threshold are handed to the bandwidth
    /// association as noise instead of being returned.
    pub fn extract(
        &self,
        spectrum: &ReassignedSpectrum,
        frame_time: f64,
        sample_rate: f64,
        mut association: Option<&mut BandwidthAssociation>,
    ) -> Vec<SpectralPeak> {
        let bins_to_hz = sample_rate / spectrum.size() as f64;
        let max_correction = self.crop_time * sample_rate;
        let mut peaks = Vec::new();

        for j in 1..(spectrum.size() / 2).saturating_sub(1) {
            let mag = spectrum.magnitude(j);
            if mag <= spectrum.magnitude(j - 1) || mag <= spectrum.magnitude(j + 1) {
                continue;
            }

            let frac_bin = spectrum.reassigned_frequency(j);
            let freq = frac_bin * bins_to_hz;
            if freq < self.freq_floor {
                continue;
            }

            let correction = spectrum.reassigned_time(j);
            if correction.abs() > max_correction {
                continue;
            }

            let amp = spectrum.reassigned_magnitude(j);
            if amp < self.amp_threshold {
                if let Some(assoc) = association.as_deref_mut() {
                    assoc.accumulate_noise(freq, amp);
                }
                continue;
            }

            let phase = spectrum.reassigned_phase(j, frac_bin, correction);
            peaks.push(SpectralPeak {
                time: frame_time + correction / sample_rate,
                breakpoint: Breakpoint::new(freq, amp, 0.0, phase),
            });
        }
        peaks
    }

    /// Remove peaks that lie within the frequency resolution of a louder peak.
    ///
    /// Survivors are left sorted by decreasing amplitude.
    pub fn thin(
        &self,
        peaks: &mut Vec<SpectralPeak>,
        mut association: Option<&mut BandwidthAssociation>,
    ) {
        if peaks.len() < 2 {
            return;
        }
        peaks.sort_by(|a, b| b.breakpoint.amplitude.total_cmp(&a.breakpoint.amplitude));

        let mut kept: Vec<SpectralPeak> = Vec::with_capacity(peaks.len());
        for peak in peaks.drain(..) {
            let freq = peak.breakpoint.frequency;
            let (lower, upper) = (freq - self.freq_resolution, freq + self.freq_resolution);
            let masked = kept.iter().any(|louder| {
                let f = louder.breakpoint.frequency;
                louder.breakpoint.amplitude > 0.0 && f > lower && f < upper
            });
            if masked {
                if let Some(assoc) = association.as_deref_mut() {
                    assoc.accumulate_noise(freq, peak.breakpoint.amplitude);
                }
            } else {
                kept.push(peak);
            }
        }
        *peaks = kept;
    }
}
