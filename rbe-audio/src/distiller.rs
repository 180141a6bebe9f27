//! Distillation: one partial per label
//!
//! Partials that share a label are combined into a single partial. The
//! longest one is kept, and the others contribute wherever it is silent;
//! anything they cannot contribute is absorbed into it as noise energy.

use crate::collator::collate_unlabeled;
use crate::error::{ProcessError, Result};
use rbe_model::{wrap_phase, Breakpoint, Partial, PartialList};
use std::f64::consts::PI;

pub struct Distiller {
    fade_time: f64,
    gap_time: f64,
}

impl Distiller {
    pub const DEFAULT_FADE_TIME: f64 = 0.001;
    pub const DEFAULT_GAP_TIME: f64 = 0.0001;

    pub fn new(fade_time: f64, gap_time: f64) -> Result<Self> {
        if fade_time.is_nan() || fade_time < 0.0 {
            return Err(ProcessError::InvalidArgument(format!(
                "distiller fade time must be non-negative, got {fade_time}"
            )));
        }
        if gap_time.is_nan() || gap_time < 0.0 {
            return Err(ProcessError::InvalidArgument(format!(
                "distiller gap time must be non-negative, got {gap_time}"
            )));
        }
        Ok(Self {
            fade_time,
            gap_time,
        })
    }

    pub fn fade_time(&self) -> f64 {
        self.fade_time
    }

    pub fn gap_time(&self) -> f64 {
        self.gap_time
    }

    /// Distill `partials` so that each non-zero label appears once.
    ///
    /// Distilled partials come first in label order, followed by the
    /// collated unlabeled partials. Returns the position of the first
    /// collated partial (`partials.len()` when there are none).
    pub fn distill(&self, partials: &mut PartialList) -> usize {
        let before = partials.len();
        let mut all = std::mem::take(partials);
        all.sort_by_key(Partial::label);
        let max_label = all.last().map_or(0, Partial::label);

        let mut unlabeled = PartialList::new();
        let mut rest = all.into_iter().peekable();
        while let Some(first) = rest.next() {
            let label = first.label();
            let mut group = vec![first];
            while let Some(next) = rest.next_if(|p| p.label() == label) {
                group.push(next);
            }

            if label == 0 {
                unlabeled.append(&mut group);
            } else if group.len() == 1 {
                partials.append(&mut group);
            } else {
                tracing::debug!(label, count = group.len(), "distilling partials");
                partials.push(self.distill_one(group, label));
            }
        }

        let first_collated = partials.len();
        if !unlabeled.is_empty() {
            partials.extend(collate_unlabeled(
                unlabeled,
                (max_label + 1).max(1),
                self.fade_time,
                self.gap_time,
            ));
        }
        tracing::info!(before, after = partials.len(), "distilled partials");
        first_collated
    }

    fn distill_one(&self, mut group: PartialList, label: i32) -> Partial {
        // longest first; stable so equal durations keep their order
        group.sort_by(|a, b| b.duration().total_cmp(&a.duration()));
        let mut others = group.into_iter();
        let mut distilled = others.next().unwrap_or_default();
        distilled.set_label(label);

        for other in others {
            let (begin, end) =
                find_contribution(&other, &distilled, self.fade_time, self.gap_time);
            if begin == end {
                distilled.absorb(&other);
                continue;
            }
            if end != other.len() {
                let leftover: Partial = other.iter().skip(end - 1).copied().collect();
                distilled.absorb(&leftover);
            }
            let contribution: Partial = other.iter().take(end).skip(begin).copied().collect();
            self.merge(contribution, &mut distilled);
        }
        distilled
    }

    /// Splice `contribution` into `dest`, fading `dest` out and back in
    /// around it and removing whatever `dest` had in the spliced span.
    fn merge(&self, mut contribution: Partial, dest: &mut Partial) {
        let fade = self.fade_time;
        let clearance = self.fade_time + self.gap_time;
        contribution.absorb(dest);

        let mut remove_end_time = None;
        let after = dest.find_after(contribution.end_time() + clearance);
        if let Some(&(t, bp)) = dest.get(after) {
            if let Some(&(last_t, last)) = contribution.last() {
                if last.amplitude > 0.0 {
                    contribution.insert(last_t + fade, null_after(&last, fade));
                }
            }
            if bp.amplitude > 0.0 {
                dest.insert(t - fade, null_before(&bp, fade));
                remove_end_time = Some(t - fade);
            } else {
                remove_end_time = Some(t);
            }
        }

        let begin = dest.find_after(contribution.start_time() - clearance);
        let remove_begin_time = dest.get(begin).map(|p| p.0);
        if begin != 0 {
            if let Some(&(first_t, first)) = contribution.first() {
                if first.amplitude > 0.0 {
                    contribution.insert(first_t - fade, null_before(&first, fade));
                }
            }
            if let Some(&(t, bp)) = dest.get(begin - 1) {
                if bp.amplitude > 0.0 {
                    dest.insert(t + fade, null_after(&bp, fade));
                }
            }
        }

        let begin = remove_begin_time.map_or(dest.len(), |t| dest.find_after(t));
        let end = remove_end_time.map_or(dest.len(), |t| dest.find_after(t));
        dest.erase(begin..end);

        for &(t, bp) in contribution.iter() {
            dest.insert(t, bp);
        }
    }
}

impl Default for Distiller {
    fn default() -> Self {
        Self {
            fade_time: Self::DEFAULT_FADE_TIME,
            gap_time: Self::DEFAULT_GAP_TIME,
        }
    }
}

/// Distill with the default fade and gap times
pub fn distill(partials: &mut PartialList) -> usize {
    Distiller::default().distill(partials)
}

/// Range of breakpoint positions in `short` that fit where `long` is silent.
///
/// A breakpoint fits if `long` has zero amplitude at its time and again
/// `fade + gap` later. When any breakpoint fits, the range is extended back
/// to the start of `short` so that its onset is kept.
fn find_contribution(short: &Partial, long: &Partial, fade_time: f64, gap_time: f64) -> (usize, usize) {
    let clearance = fade_time + gap_time;
    let silent = |t: f64| long.amplitude_at(t) == 0.0 && long.amplitude_at(t + clearance) == 0.0;

    let times: Vec<f64> = short.times().collect();
    let begin = times.iter().position(|&t| silent(t)).unwrap_or(times.len());
    let end = times[begin..]
        .iter()
        .position(|&t| !silent(t))
        .map_or(times.len(), |n| begin + n);

    if begin != times.len() {
        (0, end)
    } else {
        (begin, end)
    }
}

fn null_before(bp: &Breakpoint, fade_time: f64) -> Breakpoint {
    let phase = wrap_phase(bp.phase - 2.0 * PI * fade_time * bp.frequency);
    Breakpoint {
        amplitude: 0.0,
        phase,
        ..*bp
    }
}

fn null_after(bp: &Breakpoint, fade_time: f64) -> Breakpoint {
    let phase = wrap_phase(bp.phase + 2.0 * PI * fade_time * bp.frequency);
    Breakpoint {
        amplitude: 0.0,
        phase,
        ..*bp
    }
}
