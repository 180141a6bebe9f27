//! Sifting: resolving time overlaps among partials sharing a label

use crate::error::{ProcessError, Result};
use rbe_model::Partial;

pub struct Sieve {
    fade_time: f64,
}

impl Sieve {
    pub const DEFAULT_FADE_TIME: f64 = 0.001;

    /// `fade_time` is the minimum silence required between same-label partials
    pub fn new(fade_time: f64) -> Result<Self> {
        if fade_time.is_nan() || fade_time < 0.0 {
            return Err(ProcessError::InvalidArgument(format!(
                "sieve fade time must be non-negative, got {fade_time}"
            )));
        }
        Ok(Self { fade_time })
    }

    /// Relabel as 0 every partial that overlaps a longer partial of its label.
    ///
    /// Of two partials with equal duration the one earlier in the list wins.
    /// The order of `partials` is not changed.
    pub fn sift(&self, partials: &mut [Partial]) {
        let mut order: Vec<usize> = (0..partials.len()).collect();
        // label ascending, then duration descending; stable keeps list order for ties
        order.sort_by(|&a, &b| {
            partials[a]
                .label()
                .cmp(&partials[b].label())
                .then(partials[b].duration().total_cmp(&partials[a].duration()))
        });

        let mut zapped = 0usize;
        let mut group_start = 0;
        while group_start < order.len() {
            let label = partials[order[group_start]].label();
            let group_end = order[group_start..]
                .iter()
                .position(|&i| partials[i].label() != label)
                .map_or(order.len(), |n| group_start + n);

            if label != 0 {
                for k in group_start..group_end {
                    let src = order[k];
                    let collides = order[group_start..k].iter().any(|&other| {
                        let o = &partials[other];
                        let s = &partials[src];
                        o.label() != 0
                            && s.start_time() <= o.end_time() + self.fade_time
                            && s.end_time() + self.fade_time >= o.start_time()
                            && s.duration() <= o.duration()
                    });
                    if collides {
                        partials[src].set_label(0);
                        zapped += 1;
                    }
                }
            }
            group_start = group_end;
        }
        tracing::debug!(partials = partials.len(), zapped, "sifted");
    }
}

impl Default for Sieve {
    fn default() -> Self {
        Self {
            fade_time: Self::DEFAULT_FADE_TIME,
        }
    }
}

/// Sift with the default fade time
pub fn sift(partials: &mut [Partial]) {
    Sieve::default().sift(partials);
}
