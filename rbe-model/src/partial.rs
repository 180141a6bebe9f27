//! Partials: labeled, time-ordered breakpoint envelopes

use crate::breakpoint::{wrap_phase, Breakpoint};
use std::f64::consts::PI;
use std::ops::Range;

/// Collection of partials produced and consumed by every pipeline stage
pub type PartialList = Vec<Partial>;

/// A single sinusoid-plus-noise component of the additive model.
///
/// Breakpoints are kept in strictly increasing time order. An empty
/// partial evaluates to zero for every parameter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partial {
    label: i32,
    points: Vec<(f64, Breakpoint)>,
}

impl Partial {
    /// Default fade for amplitude evaluation outside the breakpoint span
    pub const SHORTEST_SAFE_FADE_TIME: f64 = 1.0e-9;

    /// Create an empty, unlabeled partial
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty partial with a label
    pub fn with_label(label: i32) -> Self {
        Self {
            label,
            points: Vec::new(),
        }
    }

    pub fn label(&self) -> i32 {
        self.label
    }

    pub fn set_label(&mut self, label: i32) {
        self.label = label;
    }

    /// Number of breakpoints
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Insert a breakpoint at `time`, replacing one already at that exact time.
    ///
    /// Returns the position of the inserted breakpoint.
    pub fn insert(&mut self, time: f64, bp: Breakpoint) -> usize {
        let pos = self.find_after(time);
        match self.points.get_mut(pos) {
            Some(existing) if existing.0 == time => existing.1 = bp,
            _ => self.points.insert(pos, (time, bp)),
        }
        pos
    }

    /// Iterate over `(time, breakpoint)` pairs in time order
    pub fn iter(&self) -> std::slice::Iter<'_, (f64, Breakpoint)> {
        self.points.iter()
    }

    /// Iterate mutably over breakpoints; times cannot be changed this way
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (f64, &mut Breakpoint)> + '_ {
        self.points.iter_mut().map(|(t, bp)| (*t, bp))
    }

    /// Breakpoint times in order
    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.0)
    }

    pub fn first(&self) -> Option<&(f64, Breakpoint)> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&(f64, Breakpoint)> {
        self.points.last()
    }

    pub fn get(&self, index: usize) -> Option<&(f64, Breakpoint)> {
        self.points.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Breakpoint> {
        self.points.get_mut(index).map(|(_, bp)| bp)
    }

    /// Remove and return the breakpoint at `index`
    pub fn remove(&mut self, index: usize) -> Option<(f64, Breakpoint)> {
        (index < self.points.len()).then(|| self.points.remove(index))
    }

    /// Remove a range of breakpoint positions
    pub fn erase(&mut self, range: Range<usize>) {
        let end = range.end.min(self.points.len());
        let start = range.start.min(end);
        self.points.drain(start..end);
    }

    /// Remove every breakpoint
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Keep only the breakpoints for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(f64, &Breakpoint) -> bool) {
        self.points.retain(|(t, bp)| keep(*t, bp));
    }

    /// Position of the first breakpoint at or after `time` (may equal `len()`)
    pub fn find_after(&self, time: f64) -> usize {
        self.points.partition_point(|&(t, _)| t < time)
    }

    /// Position of the breakpoint nearest in time to `time`
    pub fn find_nearest(&self, time: f64) -> Option<usize> {
        if self.points.is_empty() {
            return None;
        }
        let pos = self.find_after(time);
        if pos == 0 {
            return Some(0);
        }
        if pos == self.points.len() {
            return Some(pos - 1);
        }
        let before = time - self.points[pos - 1].0;
        let after = self.points[pos].0 - time;
        Some(if before < after { pos - 1 } else { pos })
    }

    /// Time of the first breakpoint, 0 for an empty partial
    pub fn start_time(&self) -> f64 {
        self.points.first().map_or(0.0, |p| p.0)
    }

    /// Time of the last breakpoint, 0 for an empty partial
    pub fn end_time(&self) -> f64 {
        self.points.last().map_or(0.0, |p| p.0)
    }

    pub fn duration(&self) -> f64 {
        self.end_time() - self.start_time()
    }

    /// Positions of the breakpoints bracketing `time`.
    ///
    /// `Ok(i)` when `time` lies strictly between `i - 1` and `i`, or
    /// `Err(i)` when `time` is at or beyond an end (`i` is the end breakpoint).
    fn bracket(&self, time: f64) -> Result<usize, usize> {
        let pos = self.find_after(time);
        if pos == 0 {
            Err(0)
        } else if pos == self.points.len() {
            Err(pos - 1)
        } else {
            Ok(pos)
        }
    }

    fn alpha(&self, hi: usize, time: f64) -> f64 {
        let lo_t = self.points[hi - 1].0;
        let hi_t = self.points[hi].0;
        (time - lo_t) / (hi_t - lo_t)
    }

    /// Frequency at `time`, held constant beyond the ends
    pub fn frequency_at(&self, time: f64) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        match self.bracket(time) {
            Err(i) => self.points[i].1.frequency,
            Ok(hi) => {
                let alpha = self.alpha(hi, time);
                let lo = &self.points[hi - 1].1;
                let hi = &self.points[hi].1;
                lo.frequency + alpha * (hi.frequency - lo.frequency)
            }
        }
    }

    /// Bandwidth at `time`, held constant beyond the ends
    pub fn bandwidth_at(&self, time: f64) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        match self.bracket(time) {
            Err(i) => self.points[i].1.bandwidth,
            Ok(hi) => {
                let alpha = self.alpha(hi, time);
                let lo = &self.points[hi - 1].1;
                let hi = &self.points[hi].1;
                lo.bandwidth + alpha * (hi.bandwidth - lo.bandwidth)
            }
        }
    }

    /// Amplitude at `time` using the shortest safe fade beyond the ends
    pub fn amplitude_at(&self, time: f64) -> f64 {
        self.amplitude_at_faded(time, Self::SHORTEST_SAFE_FADE_TIME)
    }

    /// Amplitude at `time`, fading linearly to zero over `fade_time` beyond the ends
    pub fn amplitude_at_faded(&self, time: f64, fade_time: f64) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        match self.bracket(time) {
            Err(i) => {
                let (t, bp) = &self.points[i];
                let distance = (time - t).abs();
                let alpha = if distance == 0.0 {
                    1.0
                } else if fade_time > 0.0 {
                    (1.0 - distance / fade_time).max(0.0)
                } else {
                    0.0
                };
                alpha * bp.amplitude
            }
            Ok(hi) => {
                let alpha = self.alpha(hi, time);
                let lo = &self.points[hi - 1].1;
                let hi = &self.points[hi].1;
                lo.amplitude + alpha * (hi.amplitude - lo.amplitude)
            }
        }
    }

    /// Phase at `time`.
    ///
    /// Beyond the ends the phase advances at the end frequency. Between
    /// breakpoints it is unwrapped from the nearer neighbour using the average
    /// frequency over the interval.
    pub fn phase_at(&self, time: f64) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        match self.bracket(time) {
            Err(i) => {
                let (t, bp) = &self.points[i];
                wrap_phase(bp.phase + 2.0 * PI * (time - t) * bp.frequency)
            }
            Ok(hi) => {
                let alpha = self.alpha(hi, time);
                let (lo_t, lo) = &self.points[hi - 1];
                let (hi_t, hi) = &self.points[hi];
                let favg = alpha * hi.frequency + (1.0 - alpha) * lo.frequency;
                if alpha < 0.5 {
                    wrap_phase(lo.phase + 2.0 * PI * (time - lo_t) * favg)
                } else {
                    wrap_phase(hi.phase - 2.0 * PI * (hi_t - time) * favg)
                }
            }
        }
    }

    /// All four parameters at `time`
    pub fn parameters_at(&self, time: f64) -> Breakpoint {
        self.parameters_at_faded(time, Self::SHORTEST_SAFE_FADE_TIME)
    }

    /// All four parameters at `time`, with an explicit amplitude fade time
    pub fn parameters_at_faded(&self, time: f64, fade_time: f64) -> Breakpoint {
        Breakpoint::new(
            self.frequency_at(time),
            self.amplitude_at_faded(time, fade_time),
            self.bandwidth_at(time),
            self.phase_at(time),
        )
    }

    /// Absorb the energy of `other` as noise.
    ///
    /// Every breakpoint of this partial with nonzero amplitude that lies within
    /// the span of `other` gains the energy `other` has at that time.
    pub fn absorb(&mut self, other: &Partial) {
        if other.is_empty() {
            return;
        }
        let (start, end) = (other.start_time(), other.end_time());
        for (t, bp) in self.points.iter_mut() {
            if *t < start || *t > end || bp.amplitude <= 0.0 {
                continue;
            }
            let a = other.amplitude_at(*t);
            bp.add_noise_energy(a * a);
        }
    }

    /// Peak amplitude over all breakpoints
    pub fn peak_amplitude(&self) -> f64 {
        self.points
            .iter()
            .map(|(_, bp)| bp.amplitude)
            .fold(0.0, f64::max)
    }
}

impl<'a> IntoIterator for &'a Partial {
    type Item = &'a (f64, Breakpoint);
    type IntoIter = std::slice::Iter<'a, (f64, Breakpoint)>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

impl FromIterator<(f64, Breakpoint)> for Partial {
    fn from_iter<I: IntoIterator<Item = (f64, Breakpoint)>>(iter: I) -> Self {
        let mut partial = Partial::new();
        for (t, bp) in iter {
            partial.insert(t, bp);
        }
        partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Partial {
        let mut p = Partial::with_label(3);
        p.insert(0.0, Breakpoint::new(100.0, 0.0, 0.0, 0.0));
        p.insert(1.0, Breakpoint::new(200.0, 1.0, 0.5, 0.0));
        p
    }

    #[test]
    fn test_insert_orders_and_replaces() {
        let mut p = Partial::new();
        p.insert(0.5, Breakpoint::new(1.0, 0.0, 0.0, 0.0));
        p.insert(0.1, Breakpoint::new(2.0, 0.0, 0.0, 0.0));
        p.insert(0.5, Breakpoint::new(3.0, 0.0, 0.0, 0.0));
        assert_eq!(p.len(), 2);
        let times: Vec<f64> = p.times().collect();
        assert_eq!(times, vec![0.1, 0.5]);
        assert_eq!(p.last().map(|l| l.1.frequency), Some(3.0));
    }

    #[test]
    fn test_interpolation() {
        let p = ramp();
        assert!((p.frequency_at(0.5) - 150.0).abs() < 1e-12);
        assert!((p.amplitude_at(0.25) - 0.25).abs() < 1e-12);
        assert!((p.bandwidth_at(0.5) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_extrapolation() {
        let p = ramp();
        assert_eq!(p.frequency_at(-1.0), 100.0);
        assert_eq!(p.frequency_at(5.0), 200.0);
        assert_eq!(p.bandwidth_at(5.0), 0.5);
        // amplitude fades beyond the end
        assert_eq!(p.amplitude_at(1.0), 1.0);
        assert_eq!(p.amplitude_at(1.1), 0.0);
        assert!((p.amplitude_at_faded(1.05, 0.1) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_phase_extrapolates_at_constant_frequency() {
        let mut p = Partial::new();
        p.insert(1.0, Breakpoint::new(1.0, 1.0, 0.0, 0.0));
        // a quarter cycle earlier
        assert!((p.phase_at(0.75) + PI / 2.0).abs() < 1e-9);
        assert!((p.phase_at(1.25) - PI / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_phase_between_breakpoints() {
        let mut p = Partial::new();
        p.insert(0.0, Breakpoint::new(2.0, 1.0, 0.0, 0.0));
        p.insert(1.0, Breakpoint::new(2.0, 1.0, 0.0, 0.0));
        // 2 Hz for 0.125 s is a quarter cycle
        assert!((p.phase_at(0.125) - PI / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_partial_is_silent() {
        let p = Partial::new();
        assert_eq!(p.amplitude_at(0.0), 0.0);
        assert_eq!(p.frequency_at(0.0), 0.0);
        assert_eq!(p.duration(), 0.0);
        assert!(p.find_nearest(0.0).is_none());
    }

    #[test]
    fn test_find_nearest() {
        let p = ramp();
        assert_eq!(p.find_nearest(0.2), Some(0));
        assert_eq!(p.find_nearest(0.7), Some(1));
        assert_eq!(p.find_nearest(3.0), Some(1));
    }

    #[test]
    fn test_absorb() {
        let mut keeper = Partial::new();
        keeper.insert(0.0, Breakpoint::new(100.0, 0.5, 0.0, 0.0));
        keeper.insert(1.0, Breakpoint::new(100.0, 0.5, 0.0, 0.0));
        keeper.insert(2.0, Breakpoint::new(100.0, 0.5, 0.0, 0.0));

        let mut other = Partial::new();
        other.insert(0.5, Breakpoint::new(110.0, 0.1, 0.0, 0.0));
        other.insert(1.5, Breakpoint::new(110.0, 0.1, 0.0, 0.0));

        keeper.absorb(&other);
        let bps: Vec<&Breakpoint> = keeper.iter().map(|(_, bp)| bp).collect();
        assert_eq!(bps[0].bandwidth, 0.0);
        assert!(bps[1].bandwidth > 0.0);
        assert!((bps[1].energy() - (0.25 + 0.01)).abs() < 1e-12);
        assert_eq!(bps[2].bandwidth, 0.0);
    }

    #[test]
    fn test_erase_and_remove() {
        let mut p: Partial = (0..5)
            .map(|i| (i as f64, Breakpoint::new(1.0, 1.0, 0.0, 0.0)))
            .collect();
        p.erase(1..3);
        assert_eq!(p.times().collect::<Vec<_>>(), vec![0.0, 3.0, 4.0]);
        assert!(p.remove(10).is_none());
        assert_eq!(p.remove(0).map(|x| x.0), Some(0.0));
        assert_eq!(p.start_time(), 3.0);
    }
}
