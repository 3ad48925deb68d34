//! Compare the estimators on a synthetic second-order resonance.
//!
//! Builds x[t] = 1.5 x[t-1] - 0.8 x[t-2] + e[t] (a damped resonance
//! driven by noise) and prints the median coefficient estimate of every
//! method next to the true model.

use praatfan_lpc::{Lpc, Sound, WindowShape};

fn noise(state: &mut u64) -> f64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    ((*state >> 33) as f64 / (1u64 << 31) as f64) - 1.0
}

fn median_coefficients(lpc: &Lpc) -> (f64, f64) {
    let mut a0: Vec<f64> = lpc.frames().iter().map(|f| f.coefficients[0]).collect();
    let mut a1: Vec<f64> = lpc.frames().iter().map(|f| f.coefficients[1]).collect();
    a0.sort_unstable_by(|x, y| x.partial_cmp(y).unwrap());
    a1.sort_unstable_by(|x, y| x.partial_cmp(y).unwrap());
    (a0[a0.len() / 2], a1[a1.len() / 2])
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut state = 0x9e3779b97f4a7c15u64;
    let mut x = vec![0.0f64; 16200];
    for t in 2..x.len() {
        x[t] = 1.5 * x[t - 1] - 0.8 * x[t - 2] + noise(&mut state);
    }
    let sound = Sound::from_slice(&x[200..], 8000.0);

    println!("true model: a = [-1.500, 0.800]");
    let (order, width, step) = (2, 0.064, 0.016);
    let shape = WindowShape::Rectangular;

    let (a0, a1) = median_coefficients(&sound.to_lpc_autocorrelation(order, width, step, 0.0, shape)?);
    println!("autocorrelation: a = [{a0:.3}, {a1:.3}]");

    let (a0, a1) = median_coefficients(&sound.to_lpc_covariance(order, width, step, 0.0, shape)?);
    println!("covariance:      a = [{a0:.3}, {a1:.3}]");

    let (a0, a1) = median_coefficients(&sound.to_lpc_burg(order, width, step, 0.0, shape)?);
    println!("burg:            a = [{a0:.3}, {a1:.3}]");

    let (a0, a1) =
        median_coefficients(&sound.to_lpc_marple(order, width, step, 0.0, shape, 1e-9, 1e-9)?);
    println!("marple:          a = [{a0:.3}, {a1:.3}]");

    let (a0, a1) = median_coefficients(&sound.to_lpc_robust(
        order, width, step, 0.0, shape, 1.5, 25, 1e-6, 0.0, false,
    )?);
    println!("robust:          a = [{a0:.3}, {a1:.3}]");

    Ok(())
}
