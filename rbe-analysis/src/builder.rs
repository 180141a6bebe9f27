//! Partial formation
//!
//! Links the peaks of successive frames into partials. Peak frequencies are
//! divided by a reference envelope before matching, so partials that follow a
//! gliding fundamental are tracked with a drift limit relative to that
//! fundamental. With no reference the warping is the identity.

use crate::peaks::SpectralPeak;
use rbe_model::{Envelope, Partial, PartialList};

/// Frame-by-frame partial tracker
pub struct PartialBuilder<R: Envelope = f64> {
    freq_drift: f64,
    reference: R,
    collected: PartialList,
    /// Indices into `collected` of partials extended in the last frame,
    /// in increasing order of their last frequency
    eligible: Vec<usize>,
}

impl PartialBuilder<f64> {
    /// Tracker without frequency warping
    pub fn new(freq_drift: f64) -> Self {
        Self::with_reference(freq_drift, 1.0)
    }
}

impl<R: Envelope> PartialBuilder<R> {
    /// Tracker that matches peaks relative to a reference frequency envelope
    pub fn with_reference(freq_drift: f64, reference: R) -> Self {
        Self {
            freq_drift,
            reference,
            collected: PartialList::new(),
            eligible: Vec::new(),
        }
    }

    /// Number of partials started so far
    pub fn len(&self) -> usize {
        self.collected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collected.is_empty()
    }

    fn end_frequency(&self, slot: usize) -> f64 {
        self.collected[slot]
            .last()
            .map_or(0.0, |(_, bp)| bp.frequency)
    }

    fn distance(&self, slot: usize, freq: f64) -> f64 {
        (self.end_frequency(slot) - freq).abs()
    }

    /// Append one frame of peaks to the partials under construction
    pub fn build_partials(&mut self, peaks: &mut [SpectralPeak], frame_time: f64) {
        let ref_value = self.reference.value_at(frame_time);
        let drift = if ref_value > 0.0 {
            self.freq_drift / ref_value
        } else {
            self.freq_drift
        };

        for peak in peaks.iter_mut() {
            let warp = self.reference.value_at(peak.time);
            if warp > 0.0 {
                peak.breakpoint.frequency /= warp;
            }
        }
        peaks.sort_by(|a, b| a.breakpoint.frequency.total_cmp(&b.breakpoint.frequency));

        let mut newly_eligible = Vec::with_capacity(peaks.len());
        let mut matched = 0usize;
        let mut e = 0usize;
        for (i, peak) in peaks.iter().enumerate() {
            let freq = peak.breakpoint.frequency;

            // advance to the eligible partials bracketing this peak
            let mut next = e;
            if e < self.eligible.len() && self.end_frequency(self.eligible[e]) < freq {
                next += 1;
                while next < self.eligible.len() && self.end_frequency(self.eligible[next]) < freq {
                    next += 1;
                    e += 1;
                }
                if next < self.eligible.len()
                    && self.distance(self.eligible[next], freq) < self.distance(self.eligible[e], freq)
                {
                    e = next;
                }
            }

            let candidate = self.eligible.get(e).copied();
            let target = candidate.filter(|&slot| {
                let d = self.distance(slot, freq);
                let next_is_closer = peaks
                    .get(i + 1)
                    .is_some_and(|np| self.distance(slot, np.breakpoint.frequency) < d);
                d <= drift && !next_is_closer
            });

            match target {
                Some(slot) => {
                    self.collected[slot].insert(peak.time, peak.breakpoint);
                    newly_eligible.push(slot);
                    matched += 1;
                }
                None => {
                    let mut partial = Partial::new();
                    partial.insert(peak.time, peak.breakpoint);
                    self.collected.push(partial);
                    newly_eligible.push(self.collected.len() - 1);
                }
            }
            e = next;
        }

        tracing::trace!(
            frame_time,
            peaks = peaks.len(),
            matched,
            "frame linked"
        );
        self.eligible = newly_eligible;
    }

    /// Undo the frequency warping and hand over the collected partials
    pub fn finish(self) -> PartialList {
        let Self {
            reference,
            mut collected,
            ..
        } = self;
        for partial in collected.iter_mut() {
            for (t, bp) in partial.iter_mut() {
                bp.frequency *= reference.value_at(t);
            }
        }
        collected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbe_model::{Breakpoint, LinearEnvelope};

    fn frame(time: f64, freqs: &[f64]) -> Vec<SpectralPeak> {
        freqs
            .iter()
            .map(|&f| SpectralPeak {
                time,
                breakpoint: Breakpoint::new(f, 0.1, 0.0, 0.0),
            })
            .collect()
    }

    #[test]
    fn test_links_steady_peaks() {
        let mut builder = PartialBuilder::new(10.0);
        for k in 0..5 {
            let t = k as f64 * 0.01;
            builder.build_partials(&mut frame(t, &[440.0 + k as f64, 880.0 - k as f64]), t);
        }
        let partials = builder.finish();
        assert_eq!(partials.len(), 2);
        assert!(partials.iter().all(|p| p.len() == 5));
    }

    #[test]
    fn test_drift_limit_starts_new_partial() {
        let mut builder = PartialBuilder::new(10.0);
        builder.build_partials(&mut frame(0.0, &[440.0]), 0.0);
        builder.build_partials(&mut frame(0.01, &[460.0]), 0.01);
        let partials = builder.finish();
        assert_eq!(partials.len(), 2);
    }

    #[test]
    fn test_only_previous_frame_is_eligible() {
        let mut builder = PartialBuilder::new(10.0);
        builder.build_partials(&mut frame(0.0, &[440.0]), 0.0);
        builder.build_partials(&mut frame(0.01, &[]), 0.01);
        builder.build_partials(&mut frame(0.02, &[440.0]), 0.02);
        assert_eq!(builder.len(), 2);
    }

    #[test]
    fn test_closer_next_peak_wins() {
        let mut builder = PartialBuilder::new(20.0);
        builder.build_partials(&mut frame(0.0, &[450.0]), 0.0);
        builder.build_partials(&mut frame(0.01, &[440.0, 449.0]), 0.01);
        let partials = builder.finish();
        assert_eq!(partials.len(), 2);
        let long = partials.iter().find(|p| p.len() == 2);
        assert_eq!(long.and_then(|p| p.last()).map(|l| l.1.frequency), Some(449.0));
    }

    #[test]
    fn test_reference_warping_scales_drift() {
        // reference doubles: a peak moving from 100 to 200 Hz stays on one partial
        let reference: LinearEnvelope = [(0.0, 100.0), (0.01, 200.0)].into_iter().collect();
        let mut builder = PartialBuilder::with_reference(5.0, reference);
        builder.build_partials(&mut frame(0.0, &[100.0]), 0.0);
        builder.build_partials(&mut frame(0.01, &[200.0]), 0.01);
        let partials = builder.finish();
        assert_eq!(partials.len(), 1);
        let freqs: Vec<f64> = partials[0].iter().map(|(_, bp)| bp.frequency).collect();
        assert!((freqs[0] - 100.0).abs() < 1e-9);
        assert!((freqs[1] - 200.0).abs() < 1e-9);
    }
}
