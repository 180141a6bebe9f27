//! Noise sources for bandwidth-enhanced oscillators
//!
//! - `NoiseGenerator`: seedable gaussian white noise
//! - `FilteredNoise`: gaussian noise through a narrow low-pass filter,
//!   used to modulate oscillator amplitude

/// Gaussian white noise with zero mean and unit variance
#[derive(Debug, Clone)]
pub struct NoiseGenerator {
    // PRNG state, never zero
    state: u64,
    // second value of the last polar pair
    spare: Option<f64>,
}

impl NoiseGenerator {
    pub const DEFAULT_SEED: u64 = 0x5DEE_CE66_D1CE_4E5B;

    /// Create a generator; a zero seed is replaced by the default seed
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { Self::DEFAULT_SEED } else { seed },
            spare: None,
        }
    }

    /// Restart the sequence from `seed`
    pub fn reseed(&mut self, seed: u64) {
        *self = Self::new(seed);
    }

    /// xorshift64, mapped to [0, 1)
    #[inline]
    fn next_uniform(&mut self) -> f64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        (self.state >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Next gaussian sample (polar form of the Box-Muller transform)
    pub fn next_gaussian(&mut self) -> f64 {
        if let Some(spare) = self.spare.take() {
            return spare;
        }
        loop {
            let v1 = 2.0 * self.next_uniform() - 1.0;
            let v2 = 2.0 * self.next_uniform() - 1.0;
            let r = v1 * v1 + v2 * v2;
            if r >= 1.0 || r == 0.0 {
                continue;
            }
            let fac = (-2.0 * r.ln() / r).sqrt();
            self.spare = Some(v1 * fac);
            return v2 * fac;
        }
    }
}

impl Default for NoiseGenerator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SEED)
    }
}

// Third-order Chebyshev low-pass, direct form II
const MA_COEFS: [f64; 4] = [1.0, 3.0, 3.0, 1.0];
const AR_COEFS: [f64; 3] = [2.9258684252, -2.8580608586, 0.9320209046];
const GAIN: f64 = 6.0 / 4.663939184e4;

/// Low-pass filtered gaussian noise
#[derive(Debug, Clone)]
pub struct FilteredNoise {
    source: NoiseGenerator,
    delay: [f64; 3],
}

impl FilteredNoise {
    pub fn new(source: NoiseGenerator) -> Self {
        Self {
            source,
            delay: [0.0; 3],
        }
    }

    /// Clear the filter state without touching the noise source
    pub fn reset(&mut self) {
        self.delay = [0.0; 3];
    }

    pub fn next_sample(&mut self) -> f64 {
        let input = self.source.next_gaussian();
        self.filter(input)
    }

    #[inline]
    fn filter(&mut self, input: f64) -> f64 {
        let wn = input
            + AR_COEFS
                .iter()
                .zip(&self.delay)
                .map(|(a, d)| a * d)
                .sum::<f64>();

        let out = MA_COEFS[0] * wn
            + MA_COEFS
                .iter()
                .skip(1)
                .zip(&self.delay)
                .map(|(b, d)| b * d)
                .sum::<f64>();

        self.delay = [wn, self.delay[0], self.delay[1]];
        out * GAIN
    }
}

impl Default for FilteredNoise {
    fn default() -> Self {
        Self::new(NoiseGenerator::default())
    }
}
