//! FFT and correlation kernels
//!
//! Provides the numeric cores behind the spectral modules:
//! - Forward DFT sized by [`next_fft_size`] (powers of two and `f·2^n` for
//!   `f ∈ {3, 5, 15}`)
//! - Normalised autocorrelation computed through the power spectrum
//! - Sliding cross-correlation of a shorter signal against a longer one

use rustfft::{num_complex::Complex, FftPlanner};

/// Smallest transform length ≥ `count` of the form `2^n` or `f·2^n` with
/// `f ∈ {3, 5, 15}` and `n ≥ 3`.
pub fn next_fft_size(count: usize) -> usize {
    if count <= 1 {
        return 1;
    }
    let mut best = count.next_power_of_two();
    for f in [3usize, 5, 15] {
        let mut b = 1usize;
        while f * b < count {
            b *= 2;
        }
        if b >= 8 && f * b < best {
            best = f * b;
        }
    }
    best
}

/// Reusable FFT planner.
pub struct FftAnalyzer {
    planner: FftPlanner<f64>,
}

impl FftAnalyzer {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Forward transform of `re + i·im`.
    ///
    /// Inputs are cut to their common length, then zero-padded to
    /// [`next_fft_size`]. Without an imaginary part only the first half of
    /// the spectrum is returned, since the rest mirrors it.
    pub fn forward(&mut self, re: &[f64], im: Option<&[f64]>) -> (Vec<f64>, Vec<f64>) {
        let count = match im {
            Some(im) => re.len().min(im.len()),
            None => re.len(),
        };
        if count == 0 {
            return (Vec::new(), Vec::new());
        }
        let size = next_fft_size(count);
        let mut buffer: Vec<Complex<f64>> = (0..size)
            .map(|i| {
                if i < count {
                    Complex::new(re[i], im.map_or(0.0, |im| im[i]))
                } else {
                    Complex::new(0.0, 0.0)
                }
            })
            .collect();

        self.planner.plan_fft_forward(size).process(&mut buffer);

        let keep = if im.is_some() { size } else { size / 2 };
        buffer
            .iter()
            .take(keep)
            .map(|c| (c.re, c.im))
            .unzip()
    }

    /// `C[n] = Σ_{p < N-n} y[n+p]·y[p] / (N - n)` for `n < N`.
    pub fn autocorrelate(&mut self, y: &[f64]) -> Vec<f64> {
        let n = y.len();
        if n == 0 {
            return Vec::new();
        }
        let size = (2 * n).next_power_of_two();
        let mut buffer: Vec<Complex<f64>> = y
            .iter()
            .map(|&v| Complex::new(v, 0.0))
            .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
            .take(size)
            .collect();

        self.planner.plan_fft_forward(size).process(&mut buffer);
        for c in &mut buffer {
            *c = Complex::new(c.norm_sqr(), 0.0);
        }
        self.planner.plan_fft_inverse(size).process(&mut buffer);

        let scale = size as f64;
        buffer
            .iter()
            .take(n)
            .enumerate()
            .map(|(lag, c)| c.re / scale / (n - lag) as f64)
            .collect()
    }
}

impl Default for FftAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Slide the shorter signal across the longer one.
///
/// `C[n] = Σ_p a[n+p]·b[p] / (len(a) - len(b))` for `n < len(a) - len(b)`,
/// where `a` is the longer input. Equal lengths give an empty result.
pub fn cross_correlate(first: &[f64], second: &[f64]) -> Vec<f64> {
    let (a, b) = if first.len() > second.len() {
        (first, second)
    } else {
        (second, first)
    };
    let range = a.len() - b.len();
    (0..range)
        .map(|n| {
            let sum: f64 = b.iter().zip(&a[n..]).map(|(x, y)| x * y).sum();
            sum / range as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_next_fft_size() {
        assert_eq!(next_fft_size(1), 1);
        assert_eq!(next_fft_size(8), 8);
        assert_eq!(next_fft_size(9), 16);
        assert_eq!(next_fft_size(20), 24);
        assert_eq!(next_fft_size(33), 40);
        assert_eq!(next_fft_size(100), 120);
        assert_eq!(next_fft_size(1000), 1024);
        assert_eq!(next_fft_size(1900), 1920);
    }

    #[test]
    fn test_forward_real_returns_half_spectrum() {
        let mut fft = FftAnalyzer::new();
        let n = 64;
        let signal: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * 4.0 * i as f64 / n as f64).cos())
            .collect();
        let (re, im) = fft.forward(&signal, None);
        assert_eq!(re.len(), 32);
        assert_eq!(im.len(), 32);
        let peak = re
            .iter()
            .zip(&im)
            .map(|(r, i)| (r * r + i * i).sqrt())
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            .unwrap();
        assert_eq!(peak.0, 4);
        assert!((peak.1 - 32.0).abs() < 1e-9);
    }

    #[test]
    fn test_forward_complex_keeps_full_spectrum() {
        let mut fft = FftAnalyzer::new();
        let re = vec![1.0; 10];
        let im = vec![0.0; 12];
        let (out_re, out_im) = fft.forward(&re, Some(&im));
        assert_eq!(out_re.len(), 16);
        assert_eq!(out_im.len(), 16);
        assert!((out_re[0] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_forward_empty() {
        let mut fft = FftAnalyzer::new();
        let (re, im) = fft.forward(&[], None);
        assert!(re.is_empty() && im.is_empty());
    }

    #[test]
    fn test_autocorrelation_matches_direct_sum() {
        let mut fft = FftAnalyzer::new();
        let y = [1.0, 2.0, -1.0, 0.5, 3.0];
        let result = fft.autocorrelate(&y);
        for (lag, value) in result.iter().enumerate() {
            let direct: f64 = (0..y.len() - lag).map(|p| y[lag + p] * y[p]).sum::<f64>()
                / (y.len() - lag) as f64;
            assert!((value - direct).abs() < 1e-9, "lag {}", lag);
        }
    }

    #[test]
    fn test_cross_correlation() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [1.0, 1.0];
        assert_eq!(cross_correlate(&a, &b), vec![1.5, 2.5]);
        assert_eq!(cross_correlate(&b, &a), vec![1.5, 2.5]);
        assert!(cross_correlate(&b, &b).is_empty());
    }
}
