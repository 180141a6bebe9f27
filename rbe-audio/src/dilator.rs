//! Time dilation of partials and markers
//!
//! A piecewise-linear warp maps a set of initial time points onto a set of
//! target time points. Breakpoints are only ever stretched or compressed,
//! never reordered.

use crate::error::{ProcessError, Result};
use rbe_model::{Marker, Partial};

#[derive(Debug, Clone)]
pub struct Dilator {
    initial: Vec<f64>,
    target: Vec<f64>,
}

impl Dilator {
    /// Build a warp from parallel sequences of time points. Both are sorted.
    pub fn new(initial: &[f64], target: &[f64]) -> Result<Self> {
        if initial.len() != target.len() {
            return Err(ProcessError::InvalidArgument(format!(
                "dilation needs equal numbers of initial and target times, got {} and {}",
                initial.len(),
                target.len()
            )));
        }
        if initial.iter().chain(target).any(|t| !t.is_finite()) {
            return Err(ProcessError::InvalidArgument(
                "dilation time points must be finite".to_string(),
            ));
        }
        let mut initial = initial.to_vec();
        let mut target = target.to_vec();
        initial.sort_by(f64::total_cmp);
        target.sort_by(f64::total_cmp);
        Ok(Self { initial, target })
    }

    /// Add a pair of time points
    pub fn insert(&mut self, initial: f64, target: f64) {
        let pos = self.initial.partition_point(|&t| t < initial);
        self.initial.insert(pos, initial);
        let pos = self.target.partition_point(|&t| t < target);
        self.target.insert(pos, target);
    }

    pub fn is_empty(&self) -> bool {
        self.initial.is_empty()
    }

    /// Map a time through the warp
    pub fn warp_time(&self, time: f64) -> f64 {
        let n = self.initial.len();
        if n == 0 {
            return time;
        }
        let idx = self.initial.partition_point(|&t| t < time);
        if idx == 0 {
            // before every point: scale unless a point sits at zero
            if self.initial[0] != 0.0 {
                time * self.target[0] / self.initial[0]
            } else {
                self.target[0] + (time - self.initial[0])
            }
        } else if idx == n {
            self.target[n - 1] + (time - self.initial[n - 1])
        } else {
            let stretch = (self.target[idx] - self.target[idx - 1])
                / (self.initial[idx] - self.initial[idx - 1]);
            self.target[idx - 1] + (time - self.initial[idx - 1]) * stretch
        }
    }

    /// Warp one partial's breakpoint times.
    ///
    /// Breakpoints are added at every target time whose initial time lies
    /// within the partial, so partials stay in tune across the warp points.
    pub fn dilate_partial(&self, partial: &mut Partial) {
        if self.is_empty() || partial.is_empty() {
            return;
        }
        let mut warped = Partial::with_label(partial.label());
        for &(t, bp) in partial.iter() {
            warped.insert(self.warp_time(t), bp);
        }

        let (start, end) = (partial.start_time(), partial.end_time());
        for (&initial, &target) in self.initial.iter().zip(&self.target) {
            if initial < start {
                continue;
            }
            if initial > end {
                break;
            }
            warped.insert(target, partial.parameters_at(initial));
        }
        *partial = warped;
    }

    pub fn dilate(&self, partials: &mut [Partial]) {
        for partial in partials.iter_mut() {
            self.dilate_partial(partial);
        }
        tracing::debug!(partials = partials.len(), points = self.initial.len(), "dilated");
    }

    pub fn dilate_markers(&self, markers: &mut [Marker]) {
        for marker in markers.iter_mut() {
            marker.time = self.warp_time(marker.time);
        }
    }
}

/// Dilate `partials` so that the `initial` time points move to `target`
pub fn dilate(partials: &mut [Partial], initial: &[f64], target: &[f64]) -> Result<()> {
    Dilator::new(initial, target)?.dilate(partials);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbe_model::Breakpoint;

    fn ramp() -> Partial {
        let mut p = Partial::with_label(1);
        p.insert(0.0, Breakpoint::new(100.0, 0.0, 0.0, 0.0));
        p.insert(1.0, Breakpoint::new(200.0, 0.5, 0.0, 0.0));
        p.insert(2.0, Breakpoint::new(300.0, 0.0, 0.0, 0.0));
        p
    }

    #[test]
    fn test_warp_time_regions() {
        let d = Dilator::new(&[1.0, 2.0], &[2.0, 3.0]).unwrap();
        // before the first point: scaled
        assert!((d.warp_time(0.5) - 1.0).abs() < 1e-12);
        // between points: stretched
        assert!((d.warp_time(1.5) - 2.5).abs() < 1e-12);
        // after the last: shifted
        assert!((d.warp_time(4.0) - 5.0).abs() < 1e-12);

        let shifted = Dilator::new(&[0.0, 1.0], &[0.5, 1.0]).unwrap();
        assert!((shifted.warp_time(-1.0) - (-0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_identity_warp_keeps_breakpoints_and_adds_feature_times() {
        let mut partials = vec![ramp()];
        let original = partials[0].clone();
        dilate(&mut partials, &[0.5, 1.5], &[0.5, 1.5]).unwrap();
        let times: Vec<f64> = partials[0].times().collect();
        // breakpoints appear at the target times inside the partial
        assert_eq!(times, vec![0.0, 0.5, 1.0, 1.5, 2.0]);
        // every original breakpoint keeps its time and parameters
        for &(t, bp) in original.iter() {
            let (warped_t, warped) = partials[0].get(partials[0].find_after(t)).copied().unwrap();
            assert_eq!(warped_t, t);
            assert_eq!(warped, bp);
        }
    }

    #[test]
    fn test_stretch_moves_breakpoints() {
        let mut partials = vec![ramp()];
        dilate(&mut partials, &[1.0], &[3.0]).unwrap();
        let times: Vec<f64> = partials[0].times().collect();
        assert_eq!(times, vec![0.0, 3.0, 4.0]);
        assert!((partials[0].amplitude_at(3.0) - 0.5).abs() < 1e-12);
        assert_eq!(partials[0].label(), 1);
    }

    #[test]
    fn test_points_are_sorted() {
        let d = Dilator::new(&[2.0, 1.0], &[4.0, 2.0]).unwrap();
        assert!((d.warp_time(1.5) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_mismatched_counts() {
        assert!(matches!(
            Dilator::new(&[1.0, 2.0], &[1.0]),
            Err(ProcessError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_empty_points_are_noop() {
        let mut partials = vec![ramp()];
        dilate(&mut partials, &[], &[]).unwrap();
        assert_eq!(partials[0], ramp());
    }

    #[test]
    fn test_markers() {
        let d = Dilator::new(&[1.0], &[2.0]).unwrap();
        let mut markers = vec![Marker::new(0.5, "attack"), Marker::new(3.0, "release")];
        d.dilate_markers(&mut markers);
        assert!((markers[0].time - 1.0).abs() < 1e-12);
        assert!((markers[1].time - 4.0).abs() < 1e-12);
    }
}
