//! Bandwidth association
//!
//! Spectral energy that is not represented by retained sinusoids (peaks below
//! the amplitude floor, peaks removed by thinning) is collected in overlapping
//! frequency regions and redistributed to the sinusoids in those regions as
//! noise energy.

use rbe_model::Breakpoint;

/// Regions below this index never contribute noise
const LOWEST_REGION: usize = 2;

/// Per-frame accumulator for sinusoidal weight and noise surplus
#[derive(Debug, Clone)]
pub struct BandwidthAssociation {
    weights: Vec<f64>,
    surplus: Vec<f64>,
    region_rate: f64,
}

impl BandwidthAssociation {
    /// Regions centred every `region_width / 2` Hz
    pub fn new(region_width: f64, sample_rate: f64) -> Self {
        let count = (sample_rate / region_width).max(0.0) as usize;
        Self {
            weights: vec![0.0; count],
            surplus: vec![0.0; count],
            region_rate: 2.0 / region_width,
        }
    }

    /// Record a retained sinusoid
    pub fn accumulate_sinusoid(&mut self, freq: f64, amp: f64) {
        if freq >= 0.0 {
            self.distribute(freq, amp, Region::Weights);
        }
    }

    /// Record energy that will not be represented by a sinusoid
    pub fn accumulate_noise(&mut self, freq: f64, amp: f64) {
        if freq > 0.0 {
            self.distribute(freq, amp * amp, Region::Surplus);
        }
    }

    /// Add the noise energy of the breakpoint's regions to it
    pub fn associate(&self, bp: &mut Breakpoint) {
        let noise = self.noise_energy(bp.frequency, bp.amplitude);
        bp.add_noise_energy(noise);
    }

    /// Clear all regions for the next frame
    pub fn reset(&mut self) {
        self.weights.fill(0.0);
        self.surplus.fill(0.0);
    }

    fn noise_energy(&self, freq: f64, amp: f64) -> f64 {
        if freq < 0.0 {
            return 0.0;
        }
        let bin = freq * self.region_rate;
        let Some(below) = self.region_below(bin) else {
            return 0.0;
        };
        let above = below + 1;
        let alpha = self.alpha(bin);

        let mut noise = 0.0;
        if above < self.surplus.len() && alpha != 0.0 && above >= LOWEST_REGION {
            noise += share(self.surplus[above], alpha * amp, self.weights[above]);
        }
        if below >= LOWEST_REGION {
            noise += share(self.surplus[below], (1.0 - alpha) * amp, self.weights[below]);
        }
        noise
    }

    fn distribute(&mut self, freq: f64, x: f64, which: Region) {
        let bin = freq * self.region_rate;
        let Some(below) = self.region_below(bin) else {
            return;
        };
        let alpha = self.alpha(bin);
        let regions = match which {
            Region::Weights => &mut self.weights,
            Region::Surplus => &mut self.surplus,
        };
        if let Some(r) = regions.get_mut(below + 1) {
            *r += alpha * x;
        }
        if let Some(r) = regions.get_mut(below) {
            *r += (1.0 - alpha) * x;
        }
    }

    fn region_below(&self, bin: f64) -> Option<usize> {
        if bin < 0.0 || self.surplus.is_empty() {
            return None;
        }
        Some((bin.floor() as usize).min(self.surplus.len() - 1))
    }

    fn alpha(&self, bin: f64) -> f64 {
        if bin > self.surplus.len() as f64 {
            0.0
        } else {
            bin - bin.floor()
        }
    }
}

#[derive(Clone, Copy)]
enum Region {
    Weights,
    Surplus,
}

fn share(surplus: f64, part: f64, weight: f64) -> f64 {
    if weight > 0.0 {
        surplus * part / weight
    } else {
        0.0
    }
}
