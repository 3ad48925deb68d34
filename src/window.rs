//! Analysis window shapes.
//!
//! Documentation sources:
//! - Praat manual: Sound: Extract part... (window shapes and their formulas)
//! - Harris (1978): "On the use of windows for harmonic analysis with the
//!   discrete Fourier transform" (Hann/Hamming/Kaiser families)
//! - Abramowitz & Stegun §9.6 (modified Bessel function I0, power series)
//!
//! Key documented facts:
//! - Weights are a closed-form function of the relative sample position
//!   φ = (i + 0.5) / n, so every window is symmetric about the frame
//!   centre and matches the sample-centred time convention.
//! - The Gaussian windows are edge-normalized: the raw Gaussian value at
//!   the frame edge is subtracted and the result rescaled, so the weight
//!   actually reaches 0.0 at the edges.
//! - Gaussian and Kaiser shapes need twice the effective analysis width
//!   to reach their nominal frequency resolution; the physical window is
//!   2× the effective width for those shapes and 1× for all others.

use std::f64::consts::PI;

/// Window shape for frame extraction.
///
/// Each shape is a closed-form weighting function of sample position.
/// The five Gaussian variants differ only in the exponent factor
/// (−12·N² for GaussianN); the two Kaiser variants differ in the Bessel
/// parameter (2π for Kaiser1, 2π² + 0.5 for Kaiser2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowShape {
    /// No weighting; every sample contributes equally.
    Rectangular,
    /// Linear taper to zero at the edges.
    Triangular,
    /// Quadratic taper (Welch window).
    Parabolic,
    /// Raised cosine, zero at the edges.
    Hanning,
    /// Raised cosine on a pedestal (0.08 at the edges).
    Hamming,
    /// Gaussian, exponent −12(2φ−1)².
    Gaussian1,
    /// Gaussian, exponent −48(2φ−1)².
    Gaussian2,
    /// Gaussian, exponent −108(2φ−1)².
    Gaussian3,
    /// Gaussian, exponent −192(2φ−1)².
    Gaussian4,
    /// Gaussian, exponent −300(2φ−1)².
    Gaussian5,
    /// Kaiser window with parameter 2π.
    Kaiser1,
    /// Kaiser window with parameter 2π² + 0.5.
    Kaiser2,
}

impl WindowShape {
    /// Ratio of physical to effective analysis width for this shape.
    ///
    /// Gaussian and Kaiser windows concentrate their energy in the middle
    /// of the frame and are therefore sampled over twice the effective
    /// width; all other shapes use the effective width directly.
    pub fn physical_width_factor(self) -> f64 {
        match self {
            WindowShape::Rectangular
            | WindowShape::Triangular
            | WindowShape::Parabolic
            | WindowShape::Hanning
            | WindowShape::Hamming => 1.0,
            _ => 2.0,
        }
    }

    /// Compute the weight sequence for a frame of `n` samples.
    pub fn weights(self, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let phase = (i as f64 + 0.5) / n as f64;
                self.weight_at(phase)
            })
            .collect()
    }

    /// Weight at relative position `phase` in (0, 1).
    fn weight_at(self, phase: f64) -> f64 {
        let x = 2.0 * phase - 1.0; // -1 at left edge, +1 at right edge
        match self {
            WindowShape::Rectangular => 1.0,
            WindowShape::Triangular => 1.0 - x.abs(),
            WindowShape::Parabolic => 1.0 - x * x,
            WindowShape::Hanning => 0.5 * (1.0 - (2.0 * PI * phase).cos()),
            WindowShape::Hamming => 0.54 - 0.46 * (2.0 * PI * phase).cos(),
            WindowShape::Gaussian1 => gaussian(x, 12.0),
            WindowShape::Gaussian2 => gaussian(x, 48.0),
            WindowShape::Gaussian3 => gaussian(x, 108.0),
            WindowShape::Gaussian4 => gaussian(x, 192.0),
            WindowShape::Gaussian5 => gaussian(x, 300.0),
            WindowShape::Kaiser1 => kaiser(x, 2.0 * PI),
            WindowShape::Kaiser2 => kaiser(x, 2.0 * PI * PI + 0.5),
        }
    }
}

/// Edge-normalized Gaussian: (e^{-a·x²} − e^{-a}) / (1 − e^{-a}).
fn gaussian(x: f64, alpha: f64) -> f64 {
    let edge = (-alpha).exp();
    (((-alpha * x * x).exp()) - edge) / (1.0 - edge)
}

/// Kaiser window: I0(β·√(1−x²)) / I0(β), zero outside |x| ≤ 1.
fn kaiser(x: f64, beta: f64) -> f64 {
    let root = 1.0 - x * x;
    if root <= 0.0 {
        return 0.0;
    }
    bessel_i0(beta * root.sqrt()) / bessel_i0(beta)
}

/// Modified Bessel function of the first kind, order zero.
///
/// Power series Σ ((x/2)^{2k} / (k!)²), Abramowitz & Stegun 9.6.12.
/// Converges quickly for the arguments used here (|x| ≤ 2π² + 0.5).
fn bessel_i0(x: f64) -> f64 {
    let half_sq = 0.25 * x * x;
    let mut term = 1.0;
    let mut sum = 1.0;
    let mut k = 1.0;
    while term > 1e-14 * sum {
        term *= half_sq / (k * k);
        sum += term;
        k += 1.0;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ALL_SHAPES: [WindowShape; 12] = [
        WindowShape::Rectangular,
        WindowShape::Triangular,
        WindowShape::Parabolic,
        WindowShape::Hanning,
        WindowShape::Hamming,
        WindowShape::Gaussian1,
        WindowShape::Gaussian2,
        WindowShape::Gaussian3,
        WindowShape::Gaussian4,
        WindowShape::Gaussian5,
        WindowShape::Kaiser1,
        WindowShape::Kaiser2,
    ];

    #[test]
    fn weights_are_symmetric_and_bounded() {
        for shape in ALL_SHAPES {
            let w = shape.weights(63);
            for (i, &wi) in w.iter().enumerate() {
                assert!((0.0..=1.0).contains(&wi), "{shape:?} weight {wi} out of range");
                assert_relative_eq!(wi, w[w.len() - 1 - i], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn centre_weight_is_unity() {
        // Odd length puts a sample exactly at phase 0.5.
        for shape in ALL_SHAPES {
            let w = shape.weights(63);
            assert_relative_eq!(w[31], 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn hamming_pedestal_at_edges() {
        let w = WindowShape::Hamming.weights(1000);
        // phase -> 0 gives 0.54 - 0.46 = 0.08
        assert_relative_eq!(w[0], 0.08, epsilon = 1e-3);
    }

    #[test]
    fn gaussian_reaches_zero_at_edges() {
        let w = WindowShape::Gaussian2.weights(100001);
        assert!(w[0] < 1e-4);
    }

    #[test]
    fn physical_width_doubles_for_gaussian_and_kaiser() {
        assert_eq!(WindowShape::Hanning.physical_width_factor(), 1.0);
        assert_eq!(WindowShape::Rectangular.physical_width_factor(), 1.0);
        assert_eq!(WindowShape::Gaussian1.physical_width_factor(), 2.0);
        assert_eq!(WindowShape::Kaiser2.physical_width_factor(), 2.0);
    }

    #[test]
    fn bessel_i0_matches_reference_values() {
        // Abramowitz & Stegun table 9.8: I0(1) = 1.2660658..., I0(2) = 2.2795853...
        assert_relative_eq!(bessel_i0(1.0), 1.2660658777520084, epsilon = 1e-10);
        assert_relative_eq!(bessel_i0(2.0), 2.2795853023360673, epsilon = 1e-10);
        assert_relative_eq!(bessel_i0(0.0), 1.0, epsilon = 1e-15);
    }
}
