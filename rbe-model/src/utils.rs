//! Whole-list partial transformations
//!
//! Scaling operations take any [`Envelope`] so a constant `f64` works as
//! well as a time-varying curve.

use crate::envelope::Envelope;
use crate::error::ModelError;
use crate::partial::{Partial, PartialList};
use std::f64::consts::PI;
use tracing::debug;

/// Remove breakpoints outside `[t1, t2]`.
///
/// A breakpoint is inserted at each boundary that cuts through a partial, so
/// the cropped envelope still starts and ends at the interpolated values.
/// Partials lying completely outside the span are left empty.
pub fn crop(partials: &mut [Partial], t1: f64, t2: f64) {
    let (t1, t2) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
    for partial in partials.iter_mut() {
        if partial.is_empty() {
            continue;
        }
        if partial.end_time() < t1 || partial.start_time() > t2 {
            partial.clear();
            continue;
        }
        if partial.start_time() < t1 {
            let bp = partial.parameters_at(t1);
            partial.insert(t1, bp);
        }
        if partial.end_time() > t2 {
            let bp = partial.parameters_at(t2);
            partial.insert(t2, bp);
        }
        partial.retain(|t, _| t >= t1 && t <= t2);
    }
}

/// Scale amplitudes by an envelope
pub fn scale_amplitude(partials: &mut [Partial], env: &dyn Envelope) {
    for partial in partials.iter_mut() {
        for (t, bp) in partial.iter_mut() {
            bp.amplitude *= env.value_at(t);
        }
    }
}

/// Fails on the first breakpoint time where `env` is negative
fn check_non_negative(partials: &[Partial], env: &dyn Envelope, what: &str) -> Result<(), ModelError> {
    let negative = partials
        .iter()
        .flat_map(|p| p.iter())
        .map(|&(t, _)| (t, env.value_at(t)))
        .find(|&(_, scale)| scale < 0.0);
    match negative {
        Some((t, scale)) => Err(ModelError::InvalidArgument(format!(
            "{what} scale must be non-negative, got {scale} at {t}"
        ))),
        None => Ok(()),
    }
}

/// Scale bandwidths by an envelope, clamping the result to [0, 1].
///
/// Partials are left untouched if the envelope is negative anywhere they
/// have a breakpoint.
pub fn scale_bandwidth(partials: &mut [Partial], env: &dyn Envelope) -> Result<(), ModelError> {
    check_non_negative(partials, env, "bandwidth")?;
    for partial in partials.iter_mut() {
        for (t, bp) in partial.iter_mut() {
            let scale = env.value_at(t);
            bp.bandwidth = (bp.bandwidth * scale).clamp(0.0, 1.0);
        }
    }
    Ok(())
}

/// Scale frequencies by an envelope
pub fn scale_frequency(partials: &mut [Partial], env: &dyn Envelope) {
    for partial in partials.iter_mut() {
        for (t, bp) in partial.iter_mut() {
            bp.frequency *= env.value_at(t);
        }
    }
}

/// Scale the ratio of noise to sinusoidal energy.
///
/// Breakpoints that are pure noise stay pure noise. As with
/// [`scale_bandwidth`], a negative envelope value is rejected before
/// anything changes.
pub fn scale_noise_ratio(partials: &mut [Partial], env: &dyn Envelope) -> Result<(), ModelError> {
    check_non_negative(partials, env, "noise ratio")?;
    for partial in partials.iter_mut() {
        for (t, bp) in partial.iter_mut() {
            let scale = env.value_at(t);
            if bp.bandwidth < 1.0 {
                let ratio = bp.bandwidth / (1.0 - bp.bandwidth) * scale;
                bp.bandwidth = ratio / (1.0 + ratio);
            } else {
                bp.bandwidth = 1.0;
            }
        }
    }
    Ok(())
}

/// Shift pitch by an envelope in cents
pub fn shift_pitch(partials: &mut [Partial], cents: &dyn Envelope) {
    for partial in partials.iter_mut() {
        for (t, bp) in partial.iter_mut() {
            bp.frequency *= 2.0_f64.powf(cents.value_at(t) / 1200.0);
        }
    }
}

/// Shift every breakpoint time by a constant offset
pub fn shift_time(partials: &mut [Partial], offset: f64) {
    for partial in partials.iter_mut() {
        let label = partial.label();
        let mut shifted: Partial = partial.iter().map(|&(t, bp)| (t + offset, bp)).collect();
        shifted.set_label(label);
        *partial = shifted;
    }
}

/// Earliest start and latest end over all non-empty partials
pub fn time_span(partials: &[Partial]) -> (f64, f64) {
    let mut span: Option<(f64, f64)> = None;
    for p in partials.iter().filter(|p| !p.is_empty()) {
        span = Some(match span {
            None => (p.start_time(), p.end_time()),
            Some((s, e)) => (s.min(p.start_time()), e.max(p.end_time())),
        });
    }
    span.unwrap_or((0.0, 0.0))
}

/// Stable sort by increasing label
pub fn sort_by_label(partials: &mut [Partial]) {
    partials.sort_by_key(Partial::label);
}

/// Copies of the partials having `label`
pub fn copy_labeled(partials: &[Partial], label: i32) -> PartialList {
    partials
        .iter()
        .filter(|p| p.label() == label)
        .cloned()
        .collect()
}

/// Move the partials having `label` out of `partials`
pub fn extract_labeled(partials: &mut PartialList, label: i32) -> PartialList {
    let (extracted, kept): (PartialList, PartialList) = std::mem::take(partials)
        .into_iter()
        .partition(|p| p.label() == label);
    *partials = kept;
    debug!(label, count = extracted.len(), "extracted labeled partials");
    extracted
}

/// Drop the partials having `label`
pub fn remove_labeled(partials: &mut PartialList, label: i32) {
    partials.retain(|p| p.label() != label);
}

/// Mean breakpoint amplitude
pub fn avg_amplitude(partial: &Partial) -> f64 {
    if partial.is_empty() {
        return 0.0;
    }
    partial.iter().map(|(_, bp)| bp.amplitude).sum::<f64>() / partial.len() as f64
}

/// Mean breakpoint frequency
pub fn avg_frequency(partial: &Partial) -> f64 {
    if partial.is_empty() {
        return 0.0;
    }
    partial.iter().map(|(_, bp)| bp.frequency).sum::<f64>() / partial.len() as f64
}

/// Amplitude-weighted mean frequency, falling back to the plain mean for silent partials
pub fn weighted_avg_frequency(partial: &Partial) -> f64 {
    let (num, den) = partial.iter().fold((0.0, 0.0), |(num, den), (_, bp)| {
        (num + bp.amplitude * bp.frequency, den + bp.amplitude)
    });
    if den > 0.0 {
        num / den
    } else {
        avg_frequency(partial)
    }
}

/// Recompute phases from `from` forward to `to` (inclusive) by integrating frequency
pub fn fix_phase_forward(partial: &mut Partial, from: usize, to: usize) {
    let to = to.min(partial.len().saturating_sub(1));
    for i in (from + 1)..=to {
        let (prev_t, prev) = match partial.get(i - 1) {
            Some(&(t, bp)) => (t, bp),
            None => return,
        };
        let Some(&(t, _)) = partial.get(i) else { return };
        if let Some(bp) = partial.get_mut(i) {
            let favg = 0.5 * (prev.frequency + bp.frequency);
            bp.phase = crate::wrap_phase(prev.phase + 2.0 * PI * favg * (t - prev_t));
        }
    }
}

/// Recompute phases after position `index`, keeping the phase at `index`
pub fn fix_phase_after(partial: &mut Partial, index: usize) {
    if !partial.is_empty() {
        fix_phase_forward(partial, index, partial.len() - 1);
    }
}

/// Recompute phases before position `index`, integrating backward
pub fn fix_phase_before(partial: &mut Partial, index: usize) {
    let index = index.min(partial.len().saturating_sub(1));
    for i in (0..index).rev() {
        let Some(&(next_t, next)) = partial.get(i + 1) else { return };
        let Some(&(t, _)) = partial.get(i) else { return };
        if let Some(bp) = partial.get_mut(i) {
            let favg = 0.5 * (next.frequency + bp.frequency);
            bp.phase = crate::wrap_phase(next.phase - 2.0 * PI * favg * (next_t - t));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Breakpoint, LinearEnvelope};

    fn partial(label: i32, times: &[f64], freq: f64) -> Partial {
        let mut p = Partial::with_label(label);
        for &t in times {
            p.insert(t, Breakpoint::new(freq, 0.5, 0.2, 0.0));
        }
        p
    }

    #[test]
    fn test_crop_inserts_boundaries() {
        let mut p = Partial::new();
        p.insert(0.0, Breakpoint::new(100.0, 0.0, 0.0, 0.0));
        p.insert(1.0, Breakpoint::new(200.0, 1.0, 0.0, 0.0));
        let mut list = vec![p, partial(0, &[5.0, 6.0], 50.0)];

        crop(&mut list, 0.25, 0.75);
        let times: Vec<f64> = list[0].times().collect();
        assert_eq!(times, vec![0.25, 0.75]);
        assert!((list[0].frequency_at(0.25) - 125.0).abs() < 1e-9);
        assert!((list[0].amplitude_at(0.75) - 0.75).abs() < 1e-9);
        assert!(list[1].is_empty());
    }

    #[test]
    fn test_scale_noise_ratio() {
        let mut list = vec![partial(1, &[0.0], 100.0)];
        scale_noise_ratio(&mut list, &2.0_f64).unwrap();
        // ratio 0.25 doubled to 0.5
        let bw = list[0].bandwidth_at(0.0);
        assert!((bw - 1.0 / 3.0).abs() < 1e-12);
        assert!(scale_noise_ratio(&mut list, &-1.0_f64).is_err());
    }

    #[test]
    fn test_scale_bandwidth_clamps() {
        let mut list = vec![partial(1, &[0.0], 100.0)];
        scale_bandwidth(&mut list, &10.0_f64).unwrap();
        assert_eq!(list[0].bandwidth_at(0.0), 1.0);
    }

    #[test]
    fn test_negative_scale_leaves_partials_unchanged() {
        // positive over the first partial, negative under the second
        let env: LinearEnvelope = [(0.0, 2.0), (2.0, -1.0)].into_iter().collect();
        let mut list = vec![partial(1, &[0.0, 0.5], 100.0), partial(2, &[2.0, 3.0], 200.0)];
        let before = list.clone();

        assert!(scale_bandwidth(&mut list, &env).is_err());
        assert_eq!(list, before);
        assert!(scale_noise_ratio(&mut list, &env).is_err());
        assert_eq!(list, before);
    }

    #[test]
    fn test_shift_pitch_octave() {
        let mut list = vec![partial(1, &[0.0, 1.0], 220.0)];
        shift_pitch(&mut list, &1200.0_f64);
        assert!((list[0].frequency_at(0.5) - 440.0).abs() < 1e-9);
    }

    #[test]
    fn test_scale_amplitude_with_envelope() {
        let mut list = vec![partial(1, &[0.0, 1.0], 220.0)];
        let env: LinearEnvelope = [(0.0, 0.0), (1.0, 2.0)].into_iter().collect();
        scale_amplitude(&mut list, &env);
        assert_eq!(list[0].amplitude_at(0.0), 0.0);
        assert!((list[0].amplitude_at(1.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_shift_time_and_span() {
        let mut list = vec![partial(2, &[0.0, 1.0], 100.0), partial(0, &[0.5, 3.0], 100.0)];
        shift_time(&mut list, 0.5);
        assert_eq!(list[0].label(), 2);
        assert_eq!(time_span(&list), (0.5, 3.5));
        assert_eq!(time_span(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_label_operations() {
        let mut list = vec![
            partial(2, &[0.0], 1.0),
            partial(1, &[0.0], 2.0),
            partial(2, &[0.0], 3.0),
            partial(0, &[0.0], 4.0),
        ];
        assert_eq!(copy_labeled(&list, 2).len(), 2);
        assert_eq!(list.len(), 4);

        sort_by_label(&mut list);
        let labels: Vec<i32> = list.iter().map(Partial::label).collect();
        assert_eq!(labels, vec![0, 1, 2, 2]);
        // stable: label-2 partials keep their relative order
        assert_eq!(list[2].frequency_at(0.0), 1.0);

        let twos = extract_labeled(&mut list, 2);
        assert_eq!(twos.len(), 2);
        assert_eq!(list.len(), 2);

        remove_labeled(&mut list, 0);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].label(), 1);
    }

    #[test]
    fn test_fix_phase_forward() {
        let mut p = partial(1, &[0.0, 0.25, 0.5], 1.0);
        fix_phase_after(&mut p, 0);
        let phases: Vec<f64> = p.iter().map(|(_, bp)| bp.phase).collect();
        assert!((phases[1] - PI / 2.0).abs() < 1e-9);
        assert!((phases[2] - PI).abs() < 1e-9);

        fix_phase_before(&mut p, 2);
        assert!(p.iter().next().map(|(_, bp)| bp.phase.abs() < 1e-9).unwrap_or(false));
    }

    #[test]
    fn test_weighted_avg_frequency() {
        let mut p = Partial::new();
        p.insert(0.0, Breakpoint::new(100.0, 1.0, 0.0, 0.0));
        p.insert(1.0, Breakpoint::new(200.0, 3.0, 0.0, 0.0));
        assert!((weighted_avg_frequency(&p) - 175.0).abs() < 1e-12);
        assert!((avg_frequency(&p) - 150.0).abs() < 1e-12);
        assert!((avg_amplitude(&p) - 2.0).abs() < 1e-12);
    }
}
