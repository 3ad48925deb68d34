//! End-to-end tests of the four LPC drivers on synthetic signals.
//!
//! The reference signal throughout is a second-order autoregressive
//! process x[t] = 1.5 x[t-1] - 0.8 x[t-2] + e[t] with deterministic
//! innovations, whose prediction coefficients are [-1.5, 0.8] in this
//! crate's sign convention.

use approx::assert_relative_eq;

use praatfan_lpc::{Sound, WindowShape};

/// Deterministic white-ish noise in [-1, 1] (64-bit LCG).
fn noise(state: &mut u64) -> f64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    ((*state >> 33) as f64 / (1u64 << 31) as f64) - 1.0
}

/// An AR(2) sound of `n` samples at `rate` Hz.
fn ar2_sound(n: usize, rate: f64) -> Sound {
    let mut state = 0x853c49e6748fea9bu64;
    let mut x = vec![0.0f64; n + 200];
    for t in 2..x.len() {
        x[t] = 1.5 * x[t - 1] - 0.8 * x[t - 2] + noise(&mut state);
    }
    Sound::from_slice(&x[200..], rate)
}

#[test]
fn all_four_drivers_recover_the_ar2_model() {
    let sound = ar2_sound(16000, 8000.0);
    let analyses = [
        sound
            .to_lpc_autocorrelation(2, 0.064, 0.016, 0.0, WindowShape::Rectangular)
            .unwrap(),
        sound
            .to_lpc_covariance(2, 0.064, 0.016, 0.0, WindowShape::Rectangular)
            .unwrap(),
        sound
            .to_lpc_burg(2, 0.064, 0.016, 0.0, WindowShape::Rectangular)
            .unwrap(),
        sound
            .to_lpc_marple(2, 0.064, 0.016, 0.0, WindowShape::Rectangular, 1e-9, 1e-9)
            .unwrap(),
    ];
    for lpc in &analyses {
        assert!(lpc.n_frames() > 50);
        // Median coefficients across frames are within 5% of the model.
        let mut a0: Vec<f64> = lpc.frames().iter().map(|f| f.coefficients[0]).collect();
        let mut a1: Vec<f64> = lpc.frames().iter().map(|f| f.coefficients[1]).collect();
        a0.sort_unstable_by(|x, y| x.partial_cmp(y).unwrap());
        a1.sort_unstable_by(|x, y| x.partial_cmp(y).unwrap());
        assert_relative_eq!(a0[a0.len() / 2], -1.5, max_relative = 0.05);
        assert_relative_eq!(a1[a1.len() / 2], 0.8, max_relative = 0.05);
    }
}

#[test]
fn every_frame_has_positive_gain_and_full_order_on_clean_input() {
    let sound = ar2_sound(16000, 8000.0);
    let lpc = sound
        .to_lpc_burg(8, 0.025, 0.005, 0.0, WindowShape::Gaussian2)
        .unwrap();
    assert_eq!(lpc.n_flagged_frames(), 0);
    for frame in lpc.frames() {
        assert_eq!(frame.order(), 8);
        assert!(frame.gain > 0.0);
    }
}

#[test]
fn silent_sound_truncates_every_frame_to_order_zero() {
    let sound = Sound::from_slice(&vec![0.0; 8000], 8000.0);
    for lpc in [
        sound
            .to_lpc_autocorrelation(4, 0.025, 0.01, 0.0, WindowShape::Hanning)
            .unwrap(),
        sound
            .to_lpc_covariance(4, 0.025, 0.01, 0.0, WindowShape::Hanning)
            .unwrap(),
    ] {
        assert!(lpc.n_frames() > 0);
        for frame in lpc.frames() {
            assert_eq!(frame.order(), 0);
            assert_eq!(frame.diagnostic, 1);
            assert_eq!(frame.gain, 0.0);
        }
    }
}

#[test]
fn frame_placement_is_centred_and_regular() {
    let sound = ar2_sound(8000, 8000.0); // 1 s
    let lpc = sound
        .to_lpc_burg(4, 0.025, 0.01, 0.0, WindowShape::Hanning)
        .unwrap();
    let times = lpc.times();
    let n = times.len();
    // First and last frames are symmetric about the middle of the sound.
    assert_relative_eq!(times[0] + times[n - 1], sound.duration(), epsilon = 1e-9);
    for i in 1..n {
        assert_relative_eq!(times[i] - times[i - 1], 0.01, epsilon = 1e-9);
    }
}

#[test]
fn too_short_sound_fails_at_construction() {
    let sound = Sound::from_slice(&vec![0.1; 40], 8000.0); // 5 ms
    let err = sound
        .to_lpc_burg(4, 0.025, 0.01, 0.0, WindowShape::Hanning)
        .unwrap_err();
    let message = format!("{err}");
    assert!(message.contains("could not be created") || message.contains("too short"));
}

#[test]
fn order_that_does_not_fit_the_frame_fails_at_construction() {
    let sound = ar2_sound(8000, 8000.0);
    // 2 ms at 8 kHz is a 17-sample frame; order 40 cannot fit.
    assert!(sound
        .to_lpc_covariance(40, 0.002, 0.001, 0.0, WindowShape::Rectangular)
        .is_err());
}

#[test]
fn marple_tolerances_stop_the_recursion_early() {
    let sound = ar2_sound(16000, 8000.0);
    let lpc = sound
        .to_lpc_marple(20, 0.064, 0.016, 0.0, WindowShape::Rectangular, 1e-2, 1e-2)
        .unwrap();
    // The order-2 model explains the signal; with generous tolerances the
    // recursion stops early on an accepted code for most frames.
    let accepted = lpc
        .frames()
        .iter()
        .filter(|f| f.diagnostic == 4 || f.diagnostic == 5)
        .count();
    assert!(
        accepted * 2 > lpc.n_frames(),
        "only {accepted} of {} frames stopped early",
        lpc.n_frames()
    );
    for frame in lpc.frames() {
        if frame.diagnostic == 4 || frame.diagnostic == 5 {
            assert!(frame.order() < 20);
            assert!(frame.gain > 0.0);
        }
    }
}

#[test]
fn pre_emphasis_changes_the_low_order_model() {
    let sound = ar2_sound(16000, 8000.0);
    let plain = sound
        .to_lpc_burg(2, 0.025, 0.01, 0.0, WindowShape::Gaussian2)
        .unwrap();
    let emphasized = sound
        .to_lpc_burg(2, 0.025, 0.01, 50.0, WindowShape::Gaussian2)
        .unwrap();
    let delta: f64 = plain
        .frames()
        .iter()
        .zip(emphasized.frames())
        .map(|(a, b)| (a.coefficients[0] - b.coefficients[0]).abs())
        .sum();
    assert!(delta > 1e-6, "pre-emphasis had no effect");
}

#[test]
fn results_are_deterministic_across_runs() {
    // The parallel driver partitions frames across workers; the result
    // must not depend on the partitioning.
    let sound = ar2_sound(16000, 8000.0);
    let first = sound
        .to_lpc_burg(8, 0.025, 0.005, 50.0, WindowShape::Gaussian2)
        .unwrap();
    let second = sound
        .to_lpc_burg(8, 0.025, 0.005, 50.0, WindowShape::Gaussian2)
        .unwrap();
    assert_eq!(first.n_frames(), second.n_frames());
    for (a, b) in first.frames().iter().zip(second.frames()) {
        assert_eq!(a, b);
    }
}
