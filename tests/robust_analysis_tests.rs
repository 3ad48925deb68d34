//! End-to-end tests of the robust refinement and the composite pipeline.

use approx::assert_relative_eq;

use praatfan_lpc::{
    sound_and_lpc_to_lpc_robust, sound_to_lpc_autocorrelation, sound_to_lpc_robust, Sound,
    WindowShape,
};

/// Deterministic white-ish noise in [-1, 1] (64-bit LCG).
fn noise(state: &mut u64) -> f64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    ((*state >> 33) as f64 / (1u64 << 31) as f64) - 1.0
}

/// An AR(2) sound, optionally peppered with gross outlier clicks.
fn ar2_sound(n: usize, rate: f64, outlier_every: usize) -> Sound {
    let mut state = 0x2545f4914f6cdd1du64;
    let mut x = vec![0.0f64; n + 200];
    for t in 2..x.len() {
        x[t] = 1.5 * x[t - 1] - 0.8 * x[t - 2] + noise(&mut state);
    }
    let mut samples = x[200..].to_vec();
    if outlier_every > 0 {
        for (i, v) in samples.iter_mut().enumerate() {
            if i % outlier_every == outlier_every / 2 {
                *v += 80.0; // a click far outside the signal range
            }
        }
    }
    Sound::from_slice(&samples, rate)
}

const K_STDEV: f64 = 1.5;
const ITERMAX: usize = 25;
const TOL: f64 = 1e-6;

#[test]
fn robust_analysis_recovers_the_ar2_model() {
    let sound = ar2_sound(16000, 8000.0, 0);
    let lpc = sound_to_lpc_robust(
        &sound,
        2,
        0.064,
        0.016,
        0.0,
        WindowShape::Rectangular,
        K_STDEV,
        ITERMAX,
        TOL,
        0.0,
        false,
    )
    .unwrap();
    let mut a0: Vec<f64> = lpc.frames().iter().map(|f| f.coefficients[0]).collect();
    let mut a1: Vec<f64> = lpc.frames().iter().map(|f| f.coefficients[1]).collect();
    a0.sort_unstable_by(|x, y| x.partial_cmp(y).unwrap());
    a1.sort_unstable_by(|x, y| x.partial_cmp(y).unwrap());
    assert_relative_eq!(a0[a0.len() / 2], -1.5, max_relative = 0.05);
    assert_relative_eq!(a1[a1.len() / 2], 0.8, max_relative = 0.05);
}

#[test]
fn composite_pipeline_matches_the_two_stage_run() {
    // The composite feeds a live per-frame autocorrelation estimate to
    // the refiner; running the two stages with a persisted intermediate
    // store must give the same frames.
    let sound = ar2_sound(12000, 8000.0, 997);
    let composite = sound_to_lpc_robust(
        &sound,
        4,
        0.032,
        0.008,
        0.0,
        WindowShape::Hanning,
        K_STDEV,
        ITERMAX,
        TOL,
        0.0,
        false,
    )
    .unwrap();
    let intermediate =
        sound_to_lpc_autocorrelation(&sound, 4, 0.032, 0.008, 0.0, WindowShape::Hanning).unwrap();
    let two_stage = sound_and_lpc_to_lpc_robust(
        &sound,
        &intermediate,
        0.032,
        0.0,
        WindowShape::Hanning,
        K_STDEV,
        ITERMAX,
        TOL,
        0.0,
        false,
    )
    .unwrap();
    assert_eq!(composite.n_frames(), two_stage.n_frames());
    for (a, b) in composite.frames().iter().zip(two_stage.frames()) {
        assert_eq!(a.order(), b.order());
        assert_eq!(a.diagnostic, b.diagnostic);
        for (ca, cb) in a.coefficients.iter().zip(&b.coefficients) {
            assert_relative_eq!(ca, cb, epsilon = 1e-12);
        }
    }
}

#[test]
fn refinement_beats_the_plain_estimate_under_clicks() {
    let sound = ar2_sound(16000, 8000.0, 401);
    let plain =
        sound_to_lpc_autocorrelation(&sound, 2, 0.064, 0.016, 0.0, WindowShape::Rectangular)
            .unwrap();
    let robust = sound_to_lpc_robust(
        &sound,
        2,
        0.064,
        0.016,
        0.0,
        WindowShape::Rectangular,
        K_STDEV,
        ITERMAX,
        TOL,
        0.0,
        false,
    )
    .unwrap();

    let median_error = |lpc: &praatfan_lpc::Lpc| {
        let mut errors: Vec<f64> = lpc
            .frames()
            .iter()
            .filter(|f| f.order() == 2)
            .map(|f| {
                let d0 = f.coefficients[0] + 1.5;
                let d1 = f.coefficients[1] - 0.8;
                (d0 * d0 + d1 * d1).sqrt()
            })
            .collect();
        errors.sort_unstable_by(|x, y| x.partial_cmp(y).unwrap());
        errors[errors.len() / 2]
    };
    let plain_error = median_error(&plain);
    let robust_error = median_error(&robust);
    assert!(
        robust_error < plain_error,
        "refinement did not help: robust {robust_error}, plain {plain_error}"
    );
}

#[test]
fn iteration_cap_is_reported_not_fatal() {
    let sound = ar2_sound(8000, 8000.0, 211);
    // One iteration with a tolerance the scale cannot reach: every frame
    // must still carry a usable estimate, flagged with code 3.
    let lpc = sound_to_lpc_robust(
        &sound,
        2,
        0.064,
        0.016,
        0.0,
        WindowShape::Rectangular,
        K_STDEV,
        1,
        1e-12,
        0.0,
        false,
    )
    .unwrap();
    for frame in lpc.frames() {
        assert_eq!(frame.order(), 2);
        assert!(frame.diagnostic == 0 || frame.diagnostic == 3);
        assert!(frame.coefficients.iter().all(|c| c.is_finite()));
    }
    let capped = lpc.frames().iter().filter(|f| f.diagnostic == 3).count();
    assert!(capped > 0, "no frame reported the iteration cap");
}

#[test]
fn converged_frames_are_not_flagged() {
    let sound = ar2_sound(8000, 8000.0, 0);
    let lpc = sound_to_lpc_robust(
        &sound,
        2,
        0.064,
        0.016,
        0.0,
        WindowShape::Rectangular,
        K_STDEV,
        50,
        1e-4,
        0.0,
        false,
    )
    .unwrap();
    let converged = lpc.frames().iter().filter(|f| f.diagnostic == 0).count();
    assert!(
        converged * 2 > lpc.n_frames(),
        "only {converged} of {} frames converged",
        lpc.n_frames()
    );
}

#[test]
fn silent_sound_passes_degenerate_frames_through() {
    let sound = Sound::from_slice(&vec![0.0; 8000], 8000.0);
    let lpc = sound_to_lpc_robust(
        &sound,
        4,
        0.025,
        0.01,
        0.0,
        WindowShape::Hanning,
        K_STDEV,
        ITERMAX,
        TOL,
        0.0,
        false,
    )
    .unwrap();
    for frame in lpc.frames() {
        assert_eq!(frame.order(), 0);
        assert_eq!(frame.diagnostic, 1);
    }
}
