//! Robust location and scale estimation.
//!
//! Documentation sources:
//! - Huber (1981): "Robust Statistics", ch. 6 (Proposal 2: simultaneous
//!   M-estimation of location and scale by winsorization)
//! - Abramowitz & Stegun 7.1.26 (rational approximation of erf, used for
//!   the normal-consistency constant)
//!
//! Key documented facts:
//! - The winsorized sample replaces every value outside
//!   `[location - k·scale, location + k·scale]` by the nearest bound;
//!   location is then the winsorized mean and scale the winsorized RMS
//!   deviation, divided by the constant that makes the estimate consistent
//!   at the normal distribution:
//!   `β(k) = θ - 2k·φ(k) + k²(1-θ)` with `θ = 2Φ(k) - 1`.
//! - Starting values are the median and the scaled median absolute
//!   deviation (1.4826·MAD), which are themselves robust.
//! - The iteration is bounded: callers pass a maximum iteration count and
//!   a relative tolerance; the residual-refinement loop that calls this
//!   routine every iteration keeps the bound small (typically 5).

use std::f64::consts::PI;

/// Huber M-estimate of location and scale by iterated winsorization.
///
/// # Arguments
///
/// * `x` - Sample vector (unchanged)
/// * `location` - In/out location estimate; read as a fixed location when
///   `want_location` is false, overwritten otherwise
/// * `want_location` - Estimate the location (true) or keep it fixed
/// * `scale` - Out scale estimate (always recomputed when `want_scale`)
/// * `want_scale` - Estimate the scale
/// * `k_stdev` - Winsorization cutoff in standard deviations
/// * `tol` - Relative convergence tolerance on location and scale
/// * `max_iterations` - Upper bound on winsorization iterations
/// * `work` - Scratch buffer, at least `x.len()` values
///
/// # Panics
///
/// Panics if `work` is shorter than `x` (programming error in the caller,
/// which declares its scratch sizes at construction time).
#[allow(clippy::too_many_arguments)]
pub fn huber_statistics(
    x: &[f64],
    location: &mut f64,
    want_location: bool,
    scale: &mut f64,
    want_scale: bool,
    k_stdev: f64,
    tol: f64,
    max_iterations: usize,
    work: &mut [f64],
) {
    let n = x.len();
    if n == 0 {
        return;
    }
    let work = &mut work[..n];

    // Robust starting values: median and scaled MAD.
    work.copy_from_slice(x);
    work.sort_unstable_by(|a, b| a.partial_cmp(b).expect("sample values must be comparable"));
    if want_location {
        *location = median_of_sorted(work);
    }
    if want_scale {
        for (w, &v) in work.iter_mut().zip(x.iter()) {
            *w = (v - *location).abs();
        }
        work.sort_unstable_by(|a, b| a.partial_cmp(b).expect("sample values must be comparable"));
        *scale = 1.4826 * median_of_sorted(work);
        if *scale == 0.0 {
            // Degenerate sample: more than half the values coincide with
            // the location. Nothing to iterate on.
            return;
        }
    }

    let beta = winsorized_variance_factor(k_stdev);
    let n_scale = if want_location { n - 1 } else { n } as f64;

    for _ in 0..max_iterations {
        let location0 = *location;
        let scale0 = *scale;

        let low = location0 - k_stdev * scale0;
        let high = location0 + k_stdev * scale0;
        for (w, &v) in work.iter_mut().zip(x.iter()) {
            *w = v.clamp(low, high);
        }
        if want_location {
            *location = work.iter().sum::<f64>() / n as f64;
        }
        if want_scale {
            let sum2: f64 = work.iter().map(|&w| (w - *location) * (w - *location)).sum();
            *scale = (sum2 / (n_scale * beta)).sqrt();
        }

        let close_enough = (*location - location0).abs() <= tol * scale0
            && (*scale - scale0).abs() <= tol * scale0;
        if close_enough {
            break;
        }
    }
}

/// Median of an already-sorted slice.
fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    }
}

/// E[min(X, k)²] for standard normal X: the factor that makes the
/// winsorized RMS deviation consistent at the normal distribution.
fn winsorized_variance_factor(k: f64) -> f64 {
    let theta = 2.0 * gauss_cdf(k) - 1.0;
    theta - 2.0 * k * gauss_pdf(k) + k * k * (1.0 - theta)
}

/// Standard normal density.
fn gauss_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Standard normal cumulative distribution via the erf approximation of
/// Abramowitz & Stegun 7.1.26 (|error| < 1.5e-7).
fn gauss_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1.0 - poly * (-x * x).exp())
}
