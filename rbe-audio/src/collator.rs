//! Collation of unlabeled partials
//!
//! Unlabeled partials that do not overlap in time are joined into a small
//! number of composite partials, each given a fresh label, so they can be
//! morphed or stored as channels.

use crate::error::{ProcessError, Result};
use rbe_model::{Breakpoint, Partial, PartialList};

pub struct Collator {
    fade_time: f64,
    gap_time: f64,
}

impl Collator {
    pub const DEFAULT_FADE_TIME: f64 = 0.001;
    pub const DEFAULT_GAP_TIME: f64 = 0.0001;

    pub fn new(fade_time: f64, gap_time: f64) -> Result<Self> {
        if fade_time.is_nan() || fade_time < 0.0 {
            return Err(ProcessError::InvalidArgument(format!(
                "collator fade time must be non-negative, got {fade_time}"
            )));
        }
        if gap_time.is_nan() || gap_time < 0.0 {
            return Err(ProcessError::InvalidArgument(format!(
                "collator gap time must be non-negative, got {gap_time}"
            )));
        }
        Ok(Self {
            fade_time,
            gap_time,
        })
    }

    /// Collate the unlabeled partials, leaving labeled partials at the front
    /// in their original order.
    ///
    /// Returns the position of the first collated partial.
    pub fn collate(&self, partials: &mut PartialList) -> usize {
        let (labeled, unlabeled): (PartialList, PartialList) =
            partials.drain(..).partition(|p| p.label() != 0);
        let max_label = labeled.iter().map(Partial::label).max().unwrap_or(0);
        let before = unlabeled.len();

        let collated =
            collate_unlabeled(unlabeled, (max_label + 1).max(1), self.fade_time, self.gap_time);
        tracing::debug!(before, after = collated.len(), "collated unlabeled partials");

        partials.extend(labeled);
        let first = partials.len();
        partials.extend(collated);
        first
    }
}

impl Default for Collator {
    fn default() -> Self {
        Self {
            fade_time: Self::DEFAULT_FADE_TIME,
            gap_time: Self::DEFAULT_GAP_TIME,
        }
    }
}

/// Collate with default fade and gap times
pub fn collate(partials: &mut PartialList) -> usize {
    Collator::default().collate(partials)
}

/// Join non-overlapping partials and label the composites consecutively
/// from `start_label`. Empty partials are dropped.
pub(crate) fn collate_unlabeled(
    mut partials: PartialList,
    start_label: i32,
    fade_time: f64,
    gap_time: f64,
) -> PartialList {
    partials.retain(|p| !p.is_empty());
    partials.sort_by(|a, b| a.end_time().total_cmp(&b.end_time()));

    let clearance = 2.0 * fade_time + gap_time;
    let mut label = start_label;
    let mut collated: PartialList = Vec::with_capacity(partials.len());

    for mut addme in partials {
        let onset = addme.start_time();
        match collated
            .iter_mut()
            .find(|c| c.end_time() < onset - clearance)
        {
            Some(composite) => {
                let t1 = composite.end_time() + fade_time;
                let null1 = Breakpoint::new(
                    composite.frequency_at(t1),
                    0.0,
                    composite.bandwidth_at(t1),
                    composite.phase_at(t1),
                );
                composite.insert(t1, null1);

                let t2 = onset - fade_time;
                let null2 = Breakpoint::new(
                    addme.frequency_at(t2),
                    0.0,
                    addme.bandwidth_at(t2),
                    addme.phase_at(t2),
                );
                composite.insert(t2, null2);

                for &(t, bp) in addme.iter() {
                    composite.insert(t, bp);
                }
            }
            None => {
                addme.set_label(label);
                label += 1;
                collated.push(addme);
            }
        }
    }
    collated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(label: i32, start: f64, end: f64, freq: f64) -> Partial {
        let mut p = Partial::with_label(label);
        p.insert(start, Breakpoint::new(freq, 0.1, 0.0, 0.0));
        p.insert(end, Breakpoint::new(freq, 0.1, 0.0, 0.0));
        p
    }

    #[test]
    fn test_joins_disjoint_partials() {
        let mut partials = vec![
            segment(3, 0.0, 2.0, 300.0),
            segment(0, 0.0, 0.5, 100.0),
            segment(0, 0.6, 1.0, 200.0),
            segment(0, 0.2, 0.8, 150.0),
        ];
        let first = collate(&mut partials);
        assert_eq!(first, 1);
        assert_eq!(partials[0].label(), 3);
        // the 0.6-1.0 segment follows the 0.0-0.5 segment, the overlapping one cannot
        assert_eq!(partials.len(), 3);
        let labels: Vec<i32> = partials[1..].iter().map(Partial::label).collect();
        assert_eq!(labels, vec![4, 5]);
        let joined = partials[1..].iter().find(|p| p.len() > 2).unwrap();
        assert_eq!(joined.len(), 6);
        assert_eq!(joined.start_time(), 0.0);
        assert_eq!(joined.end_time(), 1.0);
        assert_eq!(joined.amplitude_at(0.55), 0.0);
    }

    #[test]
    fn test_never_joins_overlapping() {
        let mut partials = vec![segment(0, 0.0, 1.0, 100.0), segment(0, 0.5, 1.5, 200.0)];
        collate(&mut partials);
        assert_eq!(partials.len(), 2);
        assert_eq!(partials[0].label(), 1);
        assert_eq!(partials[1].label(), 2);
    }

    #[test]
    fn test_gap_must_fit_fades() {
        let mut partials = vec![segment(0, 0.0, 1.0, 100.0), segment(0, 1.001, 2.0, 100.0)];
        collate(&mut partials);
        assert_eq!(partials.len(), 2);
    }

    #[test]
    fn test_invalid_times() {
        assert!(Collator::new(-1.0, 0.0).is_err());
        assert!(Collator::new(0.001, -0.1).is_err());
    }
}
