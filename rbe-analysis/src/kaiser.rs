//! Kaiser analysis window
//!
//! The shape parameter is chosen from the desired sidelobe rejection and the
//! length from the main lobe width, following Kaiser and Schafer.

use std::f64::consts::PI;

/// Kaiser shape parameter (alpha) for a sidelobe attenuation in positive dB
pub fn kaiser_shape(atten_db: f64) -> f64 {
    if atten_db > 60.0 {
        0.12438 * (atten_db + 6.3)
    } else if atten_db > 13.26 {
        0.76609 * (atten_db - 13.26).powf(0.4) + 0.09834 * (atten_db - 13.26)
    } else {
        0.0
    }
}

/// Window length in samples for a main lobe width given as a fraction of
/// the sample rate. The result is always odd.
pub fn kaiser_length(width: f64, alpha: f64) -> usize {
    let len = (1.0 + 2.0 * (PI * PI + alpha * alpha).sqrt() / (PI * width) + 0.5) as usize;
    if len % 2 == 0 {
        len + 1
    } else {
        len
    }
}

/// Build a Kaiser window of `len` samples with shape `alpha`
pub fn build_window(len: usize, alpha: f64) -> Vec<f64> {
    if len == 0 {
        return Vec::new();
    }
    if len == 1 {
        return vec![1.0];
    }
    let denom = bessel_i0(alpha);
    let offset = (len - 1) as f64 / 2.0;
    (0..len)
        .map(|i| {
            let x = (i as f64 - offset) / offset;
            let arg = alpha * (1.0 - x * x).max(0.0).sqrt();
            bessel_i0(arg) / denom
        })
        .collect()
}

/// Zeroth order modified Bessel function of the first kind, by power series
fn bessel_i0(x: f64) -> f64 {
    const EPSILON: f64 = 1.0e-21;
    let half = x / 2.0;
    let mut sum = 1.0;
    let mut term = 1.0;
    let mut k = 1.0;
    loop {
        term *= half / k;
        let sq = term * term;
        sum += sq;
        if sq < EPSILON * sum {
            break;
        }
        k += 1.0;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_regions() {
        assert_eq!(kaiser_shape(10.0), 0.0);
        assert!((kaiser_shape(90.0) - 0.12438 * 96.3).abs() < 1e-12);
        let mid = kaiser_shape(40.0);
        assert!(mid > 0.0 && mid < kaiser_shape(61.0));
    }

    #[test]
    fn test_length_is_odd() {
        for width in [0.001, 0.0023, 0.01, 0.05] {
            assert_eq!(kaiser_length(width, kaiser_shape(90.0)) % 2, 1);
        }
    }

    #[test]
    fn test_window_symmetric_and_peaked() {
        let w = build_window(101, kaiser_shape(90.0));
        assert_eq!(w.len(), 101);
        assert!((w[50] - 1.0).abs() < 1e-12);
        for i in 0..50 {
            assert!((w[i] - w[100 - i]).abs() < 1e-12);
        }
        assert!(w[0] < 1e-3);
    }

    #[test]
    fn test_bessel_i0() {
        assert!((bessel_i0(0.0) - 1.0).abs() < 1e-15);
        // I0(1) = 1.2660658777520082
        assert!((bessel_i0(1.0) - 1.266_065_877_752_008_2).abs() < 1e-12);
    }
}
