//! Sound morphing by interpolation of partial parameters
//!
//! Partials of two distilled (or channelized) sounds are paired by label
//! and their frequency, amplitude, bandwidth and phase are interpolated
//! under the control of three weighting envelopes. A weight of 0 yields the
//! source sound and a weight of 1 the target.

use crate::error::{ProcessError, Result};
use rbe_model::{wrap_phase, Breakpoint, Envelope, Partial, PartialList};
use std::collections::{BTreeSet, HashSet};

/// Amplitudes below this (-60 dB) are too quiet to trust their frequency
const REFERENCE_THRESHOLD: f64 = 0.001;

pub struct Morpher<'a> {
    freq_function: Box<dyn Envelope + 'a>,
    amp_function: Box<dyn Envelope + 'a>,
    bw_function: Box<dyn Envelope + 'a>,
    amp_shape: f64,
    min_breakpoint_gap: f64,
    src_reference: Option<Partial>,
    tgt_reference: Option<Partial>,
}

/// One side of a morph evaluated at a single time
#[derive(Clone, Copy)]
struct Side {
    frequency: f64,
    amplitude: f64,
    bandwidth: f64,
    phase: f64,
}

impl From<Breakpoint> for Side {
    fn from(bp: Breakpoint) -> Self {
        Self {
            frequency: bp.frequency,
            amplitude: bp.amplitude,
            bandwidth: bp.bandwidth,
            phase: bp.phase,
        }
    }
}

impl<'a> Morpher<'a> {
    /// Shape giving a smooth, roughly logarithmic amplitude morph
    pub const DEFAULT_AMP_MORPH_SHAPE: f64 = 1.0e-5;
    /// Shape large enough that the amplitude morph is effectively linear
    pub const LINEAR_AMP_MORPH_SHAPE: f64 = 1.0e5;
    pub const DEFAULT_MIN_BREAKPOINT_GAP: f64 = 1.0e-4;

    pub fn new(
        freq_function: impl Envelope + 'a,
        amp_function: impl Envelope + 'a,
        bw_function: impl Envelope + 'a,
    ) -> Self {
        Self {
            freq_function: Box::new(freq_function),
            amp_function: Box::new(amp_function),
            bw_function: Box::new(bw_function),
            amp_shape: Self::DEFAULT_AMP_MORPH_SHAPE,
            min_breakpoint_gap: Self::DEFAULT_MIN_BREAKPOINT_GAP,
            src_reference: None,
            tgt_reference: None,
        }
    }

    /// Same weighting envelope for all three parameters
    pub fn uniform(weight: impl Envelope + Clone + 'a) -> Self {
        Self::new(weight.clone(), weight.clone(), weight)
    }

    pub fn amp_shape(&self) -> f64 {
        self.amp_shape
    }

    pub fn set_amp_shape(&mut self, shape: f64) -> Result<&mut Self> {
        if shape.is_nan() || shape <= 0.0 {
            return Err(ProcessError::InvalidArgument(format!(
                "amplitude morph shape must be positive, got {shape}"
            )));
        }
        self.amp_shape = shape;
        Ok(self)
    }

    pub fn min_breakpoint_gap(&self) -> f64 {
        self.min_breakpoint_gap
    }

    pub fn set_min_breakpoint_gap(&mut self, gap: f64) -> Result<&mut Self> {
        if gap.is_nan() || gap <= 0.0 {
            return Err(ProcessError::InvalidArgument(format!(
                "minimum breakpoint gap must be positive, got {gap}"
            )));
        }
        self.min_breakpoint_gap = gap;
        Ok(self)
    }

    /// Use `reference` for the frequencies of quiet source breakpoints
    pub fn set_source_reference(&mut self, reference: Partial) -> Result<&mut Self> {
        self.src_reference = Some(check_reference(reference)?);
        Ok(self)
    }

    /// Use `reference` for the frequencies of quiet target breakpoints
    pub fn set_target_reference(&mut self, reference: Partial) -> Result<&mut Self> {
        self.tgt_reference = Some(check_reference(reference)?);
        Ok(self)
    }

    /// Morph two sets of partials.
    ///
    /// Labeled partials are paired by label; a label present on only one
    /// side fades to or from silence. Unlabeled partials are cross-faded
    /// individually. Both sets must have at most one partial per non-zero
    /// label.
    pub fn morph(&self, src: &[Partial], tgt: &[Partial]) -> Result<PartialList> {
        check_distilled(src)?;
        check_distilled(tgt)?;

        let labels: BTreeSet<i32> = src
            .iter()
            .chain(tgt)
            .map(Partial::label)
            .filter(|&l| l != 0)
            .collect();

        let silent = Partial::new();
        let mut morphed = PartialList::new();
        for &label in &labels {
            let p0 = src.iter().find(|p| p.label() == label).unwrap_or(&silent);
            let p1 = tgt.iter().find(|p| p.label() == label).unwrap_or(&silent);
            morphed.push(self.morph_partial(p0, p1, label));
        }
        for p in src.iter().filter(|p| p.label() == 0) {
            morphed.push(self.morph_partial(p, &silent, 0));
        }
        for p in tgt.iter().filter(|p| p.label() == 0) {
            morphed.push(self.morph_partial(&silent, p, 0));
        }
        morphed.retain(|p| !p.is_empty());

        tracing::info!(
            sources = src.len(),
            targets = tgt.len(),
            morphed = morphed.len(),
            "morphed partials"
        );
        Ok(morphed)
    }

    /// Morph a single pair of partials, either of which may be empty
    pub fn morph_partial(&self, p0: &Partial, p1: &Partial, label: i32) -> Partial {
        let mut morphed = Partial::with_label(label);

        for &(t, bp) in p0.iter() {
            let s0 = self.fix_frequency(bp.into(), t, label, self.src_reference.as_ref());
            let s1 = self.side_at(p1, p0, t, label, self.tgt_reference.as_ref());
            morphed.insert(t, self.interpolate(s0, s1, t));
        }

        for &(t, bp) in p1.iter() {
            let crowded = morphed
                .find_nearest(t)
                .and_then(|i| morphed.get(i))
                .is_some_and(|&(near, _)| (near - t).abs() < self.min_breakpoint_gap);
            if crowded {
                continue;
            }
            let s0 = self.side_at(p0, p1, t, label, self.src_reference.as_ref());
            let s1 = self.fix_frequency(bp.into(), t, label, self.tgt_reference.as_ref());
            morphed.insert(t, self.interpolate(s0, s1, t));
        }
        morphed
    }

    /// Parameters of `partial` at `time`, or silence carrying the other
    /// partial's frequency and phase when `partial` is empty
    fn side_at(
        &self,
        partial: &Partial,
        other: &Partial,
        time: f64,
        label: i32,
        reference: Option<&Partial>,
    ) -> Side {
        let side = if partial.is_empty() {
            Side {
                amplitude: 0.0,
                ..Side::from(other.parameters_at(time))
            }
        } else {
            partial.parameters_at(time).into()
        };
        self.fix_frequency(side, time, label, reference)
    }

    fn fix_frequency(&self, mut side: Side, time: f64, label: i32, reference: Option<&Partial>) -> Side {
        if let Some(reference) = reference {
            if label != 0 && side.amplitude < REFERENCE_THRESHOLD {
                side.frequency =
                    reference.frequency_at(time) * f64::from(label) / f64::from(reference.label());
            }
        }
        side
    }

    fn interpolate(&self, s0: Side, s1: Side, time: f64) -> Breakpoint {
        let alpha_f = self.freq_function.value_at(time);
        let alpha_a = self.amp_function.value_at(time);
        let alpha_bw = self.bw_function.value_at(time);

        let phase = if alpha_f <= 0.0 {
            s0.phase
        } else if alpha_f >= 1.0 {
            s1.phase
        } else {
            wrap_phase(s0.phase + alpha_f * wrap_phase(s1.phase - s0.phase))
        };

        Breakpoint::new(
            (1.0 - alpha_f) * s0.frequency + alpha_f * s1.frequency,
            interpolate_amplitude(s0.amplitude, s1.amplitude, alpha_a, self.amp_shape),
            (1.0 - alpha_bw) * s0.bandwidth + alpha_bw * s1.bandwidth,
            phase,
        )
    }
}

/// Interpolate amplitudes in a log-like domain offset by `shape`.
///
/// Small shapes approach geometric interpolation, large shapes approach
/// linear interpolation. The endpoints are reproduced exactly.
pub fn interpolate_amplitude(a0: f64, a1: f64, alpha: f64, shape: f64) -> f64 {
    if alpha <= 0.0 {
        return a0;
    }
    if alpha >= 1.0 {
        return a1;
    }
    let log = (1.0 - alpha) * (a0 + shape).ln() + alpha * (a1 + shape).ln();
    (log.exp() - shape).max(0.0)
}

fn check_reference(reference: Partial) -> Result<Partial> {
    if reference.is_empty() {
        return Err(ProcessError::InvalidArgument(
            "morph reference partial is empty".to_string(),
        ));
    }
    if reference.label() == 0 {
        return Err(ProcessError::InvalidArgument(
            "morph reference partial must be labeled".to_string(),
        ));
    }
    Ok(reference)
}

fn check_distilled(partials: &[Partial]) -> Result<()> {
    let mut seen = HashSet::new();
    for label in partials.iter().map(Partial::label).filter(|&l| l != 0) {
        if !seen.insert(label) {
            return Err(ProcessError::NotDistilled(label));
        }
    }
    Ok(())
}

/// Morph `src` into `tgt` under the three weighting envelopes
pub fn morph(
    src: &[Partial],
    tgt: &[Partial],
    freq_function: &dyn Envelope,
    amp_function: &dyn Envelope,
    bw_function: &dyn Envelope,
) -> Result<PartialList> {
    Morpher::new(freq_function, amp_function, bw_function).morph(src, tgt)
}

/// Morph using the partials labeled `src_ref_label` and `tgt_ref_label` as
/// frequency references for quiet breakpoints. A reference label of 0
/// disables that reference.
pub fn morph_with_references(
    src: &[Partial],
    tgt: &[Partial],
    freq_function: &dyn Envelope,
    amp_function: &dyn Envelope,
    bw_function: &dyn Envelope,
    src_ref_label: i32,
    tgt_ref_label: i32,
) -> Result<PartialList> {
    let mut morpher = Morpher::new(freq_function, amp_function, bw_function);
    if src_ref_label != 0 {
        morpher.set_source_reference(find_labeled(src, src_ref_label)?)?;
    }
    if tgt_ref_label != 0 {
        morpher.set_target_reference(find_labeled(tgt, tgt_ref_label)?)?;
    }
    morpher.morph(src, tgt)
}

fn find_labeled(partials: &[Partial], label: i32) -> Result<Partial> {
    partials
        .iter()
        .find(|p| p.label() == label)
        .cloned()
        .ok_or_else(|| {
            ProcessError::InvalidArgument(format!("no partial labeled {label} to use as reference"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbe_model::LinearEnvelope;

    fn partial(label: i32, points: &[(f64, f64, f64)]) -> Partial {
        let mut p = Partial::with_label(label);
        for &(t, f, a) in points {
            p.insert(t, Breakpoint::new(f, a, 0.1, 0.3));
        }
        p
    }

    fn sounds() -> (PartialList, PartialList) {
        let src = vec![
            partial(1, &[(0.0, 100.0, 0.2), (0.5, 110.0, 0.3), (1.0, 100.0, 0.1)]),
            partial(2, &[(0.0, 200.0, 0.1), (1.0, 200.0, 0.1)]),
        ];
        let tgt = vec![partial(1, &[(0.0, 150.0, 0.4), (0.7, 160.0, 0.2)])];
        (src, tgt)
    }

    #[test]
    fn test_weight_zero_reproduces_source() {
        let (src, tgt) = sounds();
        let morphed = morph(&src, &tgt, &0.0_f64, &0.0_f64, &0.0_f64).unwrap();
        let p = morphed.iter().find(|p| p.label() == 1).unwrap();
        for &(t, bp) in src[0].iter() {
            let (_, m) = p.get(p.find_after(t)).unwrap();
            assert_eq!(m.frequency, bp.frequency);
            assert_eq!(m.amplitude, bp.amplitude);
            assert_eq!(m.bandwidth, bp.bandwidth);
        }
    }

    #[test]
    fn test_weight_one_reproduces_target() {
        let (src, tgt) = sounds();
        let morphed = morph(&src, &tgt, &1.0_f64, &1.0_f64, &1.0_f64).unwrap();
        let p = morphed.iter().find(|p| p.label() == 1).unwrap();
        for &(t, bp) in tgt[0].iter() {
            let (_, m) = p.get(p.find_after(t)).unwrap();
            assert_eq!(m.frequency, bp.frequency);
            assert_eq!(m.amplitude, bp.amplitude);
        }
        // label 2 exists only in the source and is faded out
        let faded = morphed.iter().find(|p| p.label() == 2).unwrap();
        assert!(faded.iter().all(|(_, bp)| bp.amplitude == 0.0));
    }

    #[test]
    fn test_breakpoints_from_both_partials() {
        let (src, tgt) = sounds();
        let morphed = morph(&src, &tgt, &0.5_f64, &0.5_f64, &0.5_f64).unwrap();
        let p = morphed.iter().find(|p| p.label() == 1).unwrap();
        let times: Vec<f64> = p.times().collect();
        assert_eq!(times, vec![0.0, 0.5, 0.7, 1.0]);
        let (_, bp) = p.get(0).unwrap();
        assert!((bp.frequency - 125.0).abs() < 1e-9);
    }

    #[test]
    fn test_close_breakpoints_are_skipped() {
        let src = vec![partial(1, &[(0.0, 100.0, 0.2), (1.0, 100.0, 0.2)])];
        let tgt = vec![partial(1, &[(0.00005, 100.0, 0.2), (1.0, 100.0, 0.2)])];
        let morphed = morph(&src, &tgt, &0.5_f64, &0.5_f64, &0.5_f64).unwrap();
        assert_eq!(morphed[0].len(), 2);
    }

    #[test]
    fn test_amplitude_shape() {
        let linear = interpolate_amplitude(0.1, 0.4, 0.5, Morpher::LINEAR_AMP_MORPH_SHAPE);
        assert!((linear - 0.25).abs() < 1e-6);
        let log = interpolate_amplitude(0.1, 0.4, 0.5, Morpher::DEFAULT_AMP_MORPH_SHAPE);
        assert!((log - 0.2).abs() < 1e-4);
        assert_eq!(interpolate_amplitude(0.1, 0.4, 0.0, 1e-5), 0.1);
        assert_eq!(interpolate_amplitude(0.1, 0.4, 1.0, 1e-5), 0.4);
        assert!(interpolate_amplitude(0.0, 0.0, 0.5, 1e-5) >= 0.0);
    }

    #[test]
    fn test_weight_envelope_varies_over_time() {
        let (src, tgt) = sounds();
        let ramp: LinearEnvelope = [(0.0, 0.0), (1.0, 1.0)].into_iter().collect();
        let morphed = Morpher::uniform(ramp).morph(&src, &tgt).unwrap();
        let p = morphed.iter().find(|p| p.label() == 1).unwrap();
        let (_, start) = p.get(0).unwrap();
        assert_eq!(start.frequency, 100.0);
        let (_, end) = p.last().unwrap();
        // target is held at 160 Hz past its last breakpoint
        assert!((end.frequency - 160.0).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let (mut src, tgt) = sounds();
        src.push(partial(2, &[(2.0, 200.0, 0.1), (3.0, 200.0, 0.1)]));
        let err = morph(&src, &tgt, &0.5_f64, &0.5_f64, &0.5_f64).unwrap_err();
        assert_eq!(err, ProcessError::NotDistilled(2));
    }

    #[test]
    fn test_unlabeled_are_crossfaded() {
        let src = vec![partial(0, &[(0.0, 300.0, 0.2), (1.0, 300.0, 0.2)])];
        let tgt = vec![partial(0, &[(0.0, 500.0, 0.2), (1.0, 500.0, 0.2)])];
        let morphed = morph(&src, &tgt, &0.0_f64, &0.0_f64, &0.0_f64).unwrap();
        assert_eq!(morphed.len(), 2);
        assert_eq!(morphed[0].amplitude_at(0.5), 0.2);
        assert_eq!(morphed[1].amplitude_at(0.5), 0.0);
        assert!(morphed.iter().all(|p| p.label() == 0));
    }

    #[test]
    fn test_reference_sets_quiet_frequencies() {
        let src = vec![
            partial(1, &[(0.0, 100.0, 0.5), (1.0, 100.0, 0.5)]),
            partial(3, &[(0.0, 290.0, 0.0), (1.0, 290.0, 0.5)]),
        ];
        let tgt = src.clone();
        let morphed =
            morph_with_references(&src, &tgt, &0.0_f64, &0.0_f64, &0.0_f64, 1, 0).unwrap();
        let third = morphed.iter().find(|p| p.label() == 3).unwrap();
        let (_, quiet) = third.get(0).unwrap();
        assert!((quiet.frequency - 300.0).abs() < 1e-9);
        let (_, loud) = third.get(1).unwrap();
        assert_eq!(loud.frequency, 290.0);
    }

    #[test]
    fn test_missing_reference_label() {
        let (src, tgt) = sounds();
        assert!(morph_with_references(&src, &tgt, &0.5_f64, &0.5_f64, &0.5_f64, 7, 0).is_err());
    }

    #[test]
    fn test_invalid_settings() {
        let mut morpher = Morpher::uniform(0.5_f64);
        assert!(morpher.set_amp_shape(0.0).is_err());
        assert!(morpher.set_min_breakpoint_gap(-1.0).is_err());
        assert!(morpher.set_source_reference(Partial::new()).is_err());
        assert!(morpher.set_amp_shape(Morpher::LINEAR_AMP_MORPH_SHAPE).is_ok());
    }
}
