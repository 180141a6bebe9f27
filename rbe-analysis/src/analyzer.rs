//! Reassigned bandwidth-enhanced analysis
//!
//! The analyzer is configured from two numbers, the frequency resolution and
//! the main lobe width of the analysis window, from which every other
//! parameter takes a default. Each parameter may then be changed on its own.

use crate::bandwidth::BandwidthAssociation;
use crate::builder::PartialBuilder;
use crate::error::{AnalysisError, Result};
use crate::kaiser::{build_window, kaiser_length, kaiser_shape};
use crate::peaks::PeakSelector;
use crate::spectrum::ReassignedSpectrum;
use rbe_model::{Envelope, PartialList};

/// Analyzer configuration and entry point
#[derive(Debug, Clone, PartialEq)]
pub struct Analyzer {
    freq_resolution: f64,
    window_width: f64,
    amp_floor: f64,
    sidelobe_level: f64,
    freq_floor: f64,
    freq_drift: f64,
    hop_time: f64,
    crop_time: f64,
    bw_region_width: f64,
    associate_bandwidth: bool,
}

macro_rules! positive_setter {
    ($(#[$doc:meta])* $name:ident, $field:ident, $what:literal) => {
        $(#[$doc])*
        pub fn $name(&mut self, value: f64) -> Result<()> {
            if value.is_nan() || value <= 0.0 {
                return Err(AnalysisError::InvalidArgument(format!(
                    concat!($what, " must be positive, got {}"),
                    value
                )));
            }
            self.$field = value;
            Ok(())
        }
    };
}

impl Analyzer {
    /// Analyzer whose window width equals the frequency resolution
    pub fn new(resolution: f64) -> Result<Self> {
        Self::with_window(resolution, resolution)
    }

    /// Analyzer with independent frequency resolution and window width (Hz)
    pub fn with_window(resolution: f64, window_width: f64) -> Result<Self> {
        let mut analyzer = Self {
            freq_resolution: 0.0,
            window_width: 0.0,
            amp_floor: 0.0,
            sidelobe_level: 0.0,
            freq_floor: 0.0,
            freq_drift: 0.0,
            hop_time: 0.0,
            crop_time: 0.0,
            bw_region_width: 0.0,
            associate_bandwidth: true,
        };
        analyzer.configure(resolution, window_width)?;
        Ok(analyzer)
    }

    /// Reset every parameter to the defaults derived from `resolution` and
    /// `window_width`
    pub fn configure(&mut self, resolution: f64, window_width: f64) -> Result<()> {
        if resolution.is_nan() || resolution <= 0.0 {
            return Err(AnalysisError::InvalidArgument(format!(
                "frequency resolution must be positive, got {resolution}"
            )));
        }
        if window_width.is_nan() || window_width <= 0.0 {
            return Err(AnalysisError::InvalidArgument(format!(
                "window width must be positive, got {window_width}"
            )));
        }

        self.freq_resolution = resolution;
        self.window_width = window_width;
        self.amp_floor = -90.0;
        self.sidelobe_level = 90.0;
        self.freq_floor = resolution;
        self.freq_drift = 0.5 * resolution;
        self.hop_time = 1.0 / window_width;
        self.crop_time = self.hop_time;
        self.bw_region_width = 2000.0;
        self.associate_bandwidth = true;
        Ok(())
    }

    pub fn freq_resolution(&self) -> f64 {
        self.freq_resolution
    }

    pub fn window_width(&self) -> f64 {
        self.window_width
    }

    /// Amplitude floor in (negative) dB relative to a full-scale sinusoid
    pub fn amp_floor(&self) -> f64 {
        self.amp_floor
    }

    /// Sidelobe rejection of the analysis window in positive dB
    pub fn sidelobe_level(&self) -> f64 {
        self.sidelobe_level
    }

    pub fn freq_floor(&self) -> f64 {
        self.freq_floor
    }

    pub fn freq_drift(&self) -> f64 {
        self.freq_drift
    }

    pub fn hop_time(&self) -> f64 {
        self.hop_time
    }

    pub fn crop_time(&self) -> f64 {
        self.crop_time
    }

    pub fn bw_region_width(&self) -> f64 {
        self.bw_region_width
    }

    pub fn associate_bandwidth(&self) -> bool {
        self.associate_bandwidth
    }

    positive_setter!(set_freq_resolution, freq_resolution, "frequency resolution");
    positive_setter!(set_window_width, window_width, "window width");
    positive_setter!(set_sidelobe_level, sidelobe_level, "sidelobe level");
    positive_setter!(set_freq_drift, freq_drift, "frequency drift");
    positive_setter!(set_hop_time, hop_time, "hop time");
    positive_setter!(set_crop_time, crop_time, "crop time");
    positive_setter!(
        /// Width of the bandwidth association regions in Hz
        set_bw_region_width,
        bw_region_width,
        "bandwidth region width"
    );

    /// Amplitude floor in dB, must be negative
    pub fn set_amp_floor(&mut self, db: f64) -> Result<()> {
        if db.is_nan() || db >= 0.0 {
            return Err(AnalysisError::InvalidArgument(format!(
                "amplitude floor must be negative dB, got {db}"
            )));
        }
        self.amp_floor = db;
        Ok(())
    }

    /// Lowest frequency (Hz) of retained spectral peaks
    pub fn set_freq_floor(&mut self, hz: f64) -> Result<()> {
        if hz.is_nan() || hz < 0.0 {
            return Err(AnalysisError::InvalidArgument(format!(
                "frequency floor must not be negative, got {hz}"
            )));
        }
        self.freq_floor = hz;
        Ok(())
    }

    pub fn set_associate_bandwidth(&mut self, enabled: bool) {
        self.associate_bandwidth = enabled;
    }

    /// Analyze a mono buffer. The returned partials are unlabeled.
    pub fn analyze(&self, samples: &[f64], sample_rate: f64) -> Result<PartialList> {
        self.run(samples, sample_rate, PartialBuilder::new(self.freq_drift))
    }

    /// Analyze a mono buffer, tracking partials relative to a reference
    /// frequency envelope
    pub fn analyze_with_reference(
        &self,
        samples: &[f64],
        sample_rate: f64,
        reference: &dyn Envelope,
    ) -> Result<PartialList> {
        self.run(
            samples,
            sample_rate,
            PartialBuilder::with_reference(self.freq_drift, reference),
        )
    }

    fn run<R: Envelope>(
        &self,
        samples: &[f64],
        sample_rate: f64,
        mut builder: PartialBuilder<R>,
    ) -> Result<PartialList> {
        if samples.is_empty() {
            return Err(AnalysisError::InvalidArgument("no samples to analyze".into()));
        }
        if sample_rate.is_nan() || sample_rate <= 0.0 {
            return Err(AnalysisError::InvalidArgument(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }

        let hop = (self.hop_time * sample_rate) as usize;
        if hop == 0 {
            return Err(AnalysisError::InvalidArgument(format!(
                "hop time {} is shorter than one sample",
                self.hop_time
            )));
        }

        let shape = kaiser_shape(self.sidelobe_level);
        let winlen = kaiser_length(self.window_width / sample_rate, shape);
        let mut spectrum = ReassignedSpectrum::new(build_window(winlen, shape));
        let first_half = winlen / 2;
        let second_half = (winlen - 1) / 2;

        let selector = PeakSelector::new(
            self.amp_floor,
            self.freq_floor,
            self.crop_time,
            self.freq_resolution,
        );
        let mut association = self
            .associate_bandwidth
            .then(|| BandwidthAssociation::new(self.bw_region_width, sample_rate));

        tracing::info!(
            samples = samples.len(),
            sample_rate,
            window = winlen,
            hop,
            "analyzing"
        );

        let mut frames = 0usize;
        let mut center = 0usize;
        while center < samples.len() {
            let frame_time = center as f64 / sample_rate;
            let begin = center.saturating_sub(first_half);
            let end = (center + second_half + 1).min(samples.len());
            spectrum.transform(samples, begin, center, end);

            let mut peaks = selector.extract(&spectrum, frame_time, sample_rate, association.as_mut());
            selector.thin(&mut peaks, association.as_mut());

            if let Some(assoc) = association.as_mut() {
                for peak in &peaks {
                    assoc.accumulate_sinusoid(peak.breakpoint.frequency, peak.breakpoint.amplitude);
                }
                for peak in peaks.iter_mut() {
                    assoc.associate(&mut peak.breakpoint);
                }
                assoc.reset();
            }

            builder.build_partials(&mut peaks, frame_time);
            frames += 1;
            center += hop;
        }

        let partials = builder.finish();
        tracing::info!(frames, partials = partials.len(), "analysis complete");
        Ok(partials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_default_configuration() {
        let a = Analyzer::with_window(100.0, 200.0).unwrap();
        assert_eq!(a.freq_resolution(), 100.0);
        assert_eq!(a.window_width(), 200.0);
        assert_eq!(a.amp_floor(), -90.0);
        assert_eq!(a.sidelobe_level(), 90.0);
        assert_eq!(a.freq_floor(), 100.0);
        assert_eq!(a.freq_drift(), 50.0);
        assert!((a.hop_time() - 0.005).abs() < 1e-15);
        assert_eq!(a.crop_time(), a.hop_time());
        assert_eq!(a.bw_region_width(), 2000.0);
        assert!(a.associate_bandwidth());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(Analyzer::new(0.0).is_err());
        assert!(Analyzer::with_window(100.0, -1.0).is_err());
        let mut a = Analyzer::new(100.0).unwrap();
        assert!(a.set_amp_floor(10.0).is_err());
        assert!(a.set_hop_time(0.0).is_err());
        assert!(a.set_freq_floor(-1.0).is_err());
        assert!(a.set_freq_drift(25.0).is_ok());
        assert_eq!(a.freq_drift(), 25.0);
    }

    #[test]
    fn test_empty_input() {
        let a = Analyzer::new(100.0).unwrap();
        assert!(a.analyze(&[], 44100.0).is_err());
        assert!(a.analyze(&[0.0; 16], 0.0).is_err());
    }

    #[test]
    fn test_silence_has_no_partials() {
        let a = Analyzer::new(100.0).unwrap();
        let partials = a.analyze(&vec![0.0; 4410], 44100.0).unwrap();
        assert!(partials.is_empty());
    }

    #[test]
    fn test_single_sinusoid() {
        let srate = 44100.0;
        let samples: Vec<f64> = (0..22050)
            .map(|n| 0.5 * (2.0 * PI * 440.0 * n as f64 / srate).cos())
            .collect();
        let a = Analyzer::new(100.0).unwrap();
        let partials = a.analyze(&samples, srate).unwrap();

        let longest = partials
            .iter()
            .max_by(|x, y| x.duration().total_cmp(&y.duration()))
            .unwrap();
        assert!(longest.duration() > 0.4);
        assert!((longest.frequency_at(0.25) - 440.0).abs() < 1.0);
        assert!((longest.amplitude_at(0.25) - 0.5).abs() < 0.02);
        assert!(partials.iter().all(|p| p.label() == 0));
    }
}
