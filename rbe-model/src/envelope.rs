//! Time-varying control functions
//!
//! Envelopes drive everything that varies over time but is not itself a
//! partial: reference frequencies for channelization, morph weights, and
//! scaling curves.

/// A function of time
pub trait Envelope {
    /// Value of the envelope at `time` (seconds)
    fn value_at(&self, time: f64) -> f64;
}

impl Envelope for f64 {
    fn value_at(&self, _time: f64) -> f64 {
        *self
    }
}

impl<E: Envelope + ?Sized> Envelope for &E {
    fn value_at(&self, time: f64) -> f64 {
        (**self).value_at(time)
    }
}

impl<E: Envelope + ?Sized> Envelope for Box<E> {
    fn value_at(&self, time: f64) -> f64 {
        (**self).value_at(time)
    }
}

/// Piecewise-linear envelope with flat extrapolation beyond its end points
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearEnvelope {
    points: Vec<(f64, f64)>,
}

/// Older name for [`LinearEnvelope`]
pub type BreakpointEnvelope = LinearEnvelope;

impl LinearEnvelope {
    /// Create an empty envelope, which evaluates to zero everywhere
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Create an envelope with a single point at time zero
    pub fn with_value(value: f64) -> Self {
        let mut env = Self::new();
        env.insert(0.0, value);
        env
    }

    /// Insert a point, replacing any point at exactly the same time
    pub fn insert(&mut self, time: f64, value: f64) {
        let pos = self.points.partition_point(|&(t, _)| t < time);
        match self.points.get_mut(pos) {
            Some(existing) if existing.0 == time => existing.1 = value,
            _ => self.points.insert(pos, (time, value)),
        }
    }

    /// Alias of [`insert`](Self::insert)
    pub fn insert_breakpoint(&mut self, time: f64, value: f64) {
        self.insert(time, value);
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if the envelope has no points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Remove all points
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Iterate over `(time, value)` points in time order
    pub fn iter(&self) -> impl Iterator<Item = &(f64, f64)> + '_ {
        self.points.iter()
    }
}

impl Envelope for LinearEnvelope {
    fn value_at(&self, time: f64) -> f64 {
        let (first, last) = match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return 0.0,
        };
        if time <= first.0 {
            return first.1;
        }
        if time >= last.0 {
            return last.1;
        }

        let hi = self.points.partition_point(|&(t, _)| t <= time);
        let (t0, v0) = self.points[hi - 1];
        let (t1, v1) = self.points[hi];
        let alpha = (time - t0) / (t1 - t0);
        v0 + alpha * (v1 - v0)
    }
}

impl FromIterator<(f64, f64)> for LinearEnvelope {
    fn from_iter<I: IntoIterator<Item = (f64, f64)>>(iter: I) -> Self {
        let mut env = Self::new();
        for (t, v) in iter {
            env.insert(t, v);
        }
        env
    }
}
