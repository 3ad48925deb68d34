//! Robust LPC refinement by iteratively reweighted least squares.
//!
//! Documentation sources:
//! - Lee (1988): "Robust linear prediction of speech", IEEE Trans.
//!   ASSP-36(5), pp. 642–650 (Huber-weighted reestimation of LPC)
//! - Huber (1981): "Robust Statistics" (the location/scale M-estimator,
//!   see [`crate::stats`])
//! - Golub & Van Loan: "Matrix Computations" (SVD solution of
//!   near-singular least-squares systems)
//!
//! The refiner takes an already-estimated LPC frame — from any method —
//! and iterates:
//!
//! 1. inverse-filter the windowed frame through the current coefficients
//!    to get the residual;
//! 2. estimate robust location and scale of the residual (Huber);
//! 3. turn residual deviations into per-sample weights (1 inside the
//!    cutoff, softly decaying outside);
//! 4. accumulate the weighted covariance matrix and right-hand side;
//! 5. re-solve for the coefficients by SVD, which keeps near-singular
//!    weighted systems tractable where direct elimination would not be.
//!
//! The loop stops when the scale settles (relative tolerance against
//! machine epsilon) or the iteration cap is reached; the cap is a
//! diagnostic (code 3), not an error. If the solver fails the frame falls
//! back to the unrefined input with code 2.
//!
//! The refiner can run against a persisted [`Lpc`] ("other input") or —
//! through [`RobustWorkspace`] — against the live per-frame output of an
//! internal autocorrelation estimator advancing in lock-step, with no
//! intermediate object ever materialized.

use nalgebra::{DMatrix, DVector};

use crate::error::{Error, Result};
use crate::lpc::{Lpc, LpcFrame};
use crate::pool::WorkvectorPool;
use crate::sound::Sound;
use crate::sound_to_lpc::{prepare_analysis, AutocorrelationWorkspace};
use crate::stats::huber_statistics;
use crate::window::WindowShape;
use crate::workspace::{
    run_partitioned, FrameAnalysis, OutputTarget, WorkspaceCore, MIN_FRAMES_PER_THREAD,
};

/// Robust refinement runs a multiple of the work per frame, so the
/// parallel driver assigns it half the usual frames per worker.
pub(crate) const MIN_FRAMES_PER_THREAD_ROBUST: usize = MIN_FRAMES_PER_THREAD / 2;

/// Inverse-filter `samples` in place: e[t] = x[t] + Σ a[k]·x[t-1-k].
///
/// `memory` holds the `a.len()` input samples preceding the slice and is
/// updated as the filter advances; zero it for a frame that starts from
/// silence.
pub(crate) fn filter_inverse_inplace(samples: &mut [f64], a: &[f64], memory: &mut [f64]) {
    debug_assert!(memory.len() >= a.len());
    for value in samples.iter_mut() {
        let x0 = *value;
        for (ak, mk) in a.iter().zip(memory.iter()) {
            *value += ak * mk;
        }
        for j in (1..a.len()).rev() {
            memory[j] = memory[j - 1];
        }
        if !a.is_empty() {
            memory[0] = x0;
        }
    }
}

/// Parameters of the robust refinement, fixed at construction.
#[derive(Debug, Clone, Copy)]
struct RobustParams {
    k_stdev: f64,
    max_iterations: usize,
    tol1: f64,
    svd_tolerance: f64,
    huber_iterations: usize,
    location: f64,
    want_location: bool,
}

/// Mutable per-frame refinement state.
///
/// Owned by the refinement workspace; resized when the inner prediction
/// order changes, reused otherwise.
#[derive(Debug)]
struct RobustState {
    error: Vec<f64>,
    sample_weights: Vec<f64>,
    coefficients: Vec<f64>,
    covariances: Vec<f64>,
    covariance_matrix: DMatrix<f64>,
    current_order: usize,
    location: f64,
    scale: f64,
    iterations: usize,
}

impl RobustState {
    fn empty() -> Self {
        Self {
            error: Vec::new(),
            sample_weights: Vec::new(),
            coefficients: Vec::new(),
            covariances: Vec::new(),
            covariance_matrix: DMatrix::zeros(0, 0),
            current_order: 0,
            location: 0.0,
            scale: 0.0,
            iterations: 0,
        }
    }

    /// Residual weights: 1 inside the cutoff, softly decaying outside.
    fn set_sample_weights(&mut self, k_stdev: f64) {
        let cutoff = k_stdev * self.scale;
        for (weight, &e) in self.sample_weights.iter_mut().zip(self.error.iter()) {
            let deviation = (e - self.location).abs();
            *weight = if deviation <= cutoff {
                1.0
            } else {
                cutoff / deviation
            };
        }
    }

    /// Weighted covariance matrix and right-hand side over samples p..n.
    fn set_covariances(&mut self, s: &[f64]) {
        let p = self.current_order;
        let n = s.len();
        for i in 1..=p {
            for j in i..=p {
                let mut cv = 0.0;
                for k in p..n {
                    cv += s[k - j] * s[k - i] * self.sample_weights[k];
                }
                self.covariance_matrix[(i - 1, j - 1)] = cv;
                self.covariance_matrix[(j - 1, i - 1)] = cv;
            }
            let mut cv = 0.0;
            for k in p..n {
                cv += s[k - i] * s[k] * self.sample_weights[k];
            }
            self.covariances[i - 1] = -cv;
        }
    }

    /// Solve `C a = -c` for the current order by SVD.
    ///
    /// Fails on SVD non-convergence or a non-finite solution; the caller
    /// falls back to the unrefined frame.
    fn solve_lpc(&mut self, svd_tolerance: f64) -> std::result::Result<(), ()> {
        let p = self.current_order;
        let matrix = self.covariance_matrix.view((0, 0), (p, p)).clone_owned();
        let svd = nalgebra::linalg::SVD::try_new(matrix, true, true, f64::EPSILON, 200)
            .ok_or(())?;
        let rhs = DVector::from_column_slice(&self.covariances[..p]);
        let solution = svd.solve(&rhs, svd_tolerance).map_err(|_| ())?;
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(());
        }
        self.coefficients.clear();
        self.coefficients.extend_from_slice(solution.as_slice());
        Ok(())
    }
}

/// Workspace refining LPC frames against a sound (IRLS + SVD).
///
/// The "other input" — the frames being refined — is either a persisted
/// [`Lpc`] or, inside the composite pipeline, a live per-frame reference
/// passed by the caller each frame.
pub struct RefinementWorkspace<'a> {
    pub(crate) core: WorkspaceCore<'a>,
    other_input: Option<&'a Lpc>,
    pool: WorkvectorPool,
    params: RobustParams,
    state: RobustState,
}

impl<'a> RefinementWorkspace<'a> {
    /// Create a refinement workspace.
    ///
    /// All three collaborators are optional: `input` (the sound),
    /// `other_input` (the frames to refine) and `output` (where refined
    /// frames go). A composite pipeline builds this with none of the
    /// three and wires frames through by hand.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        input: Option<&'a Sound>,
        other_input: Option<&'a Lpc>,
        output: Option<OutputTarget<'a>>,
        effective_analysis_width: f64,
        window_shape: WindowShape,
        k_stdev: f64,
        max_iterations: usize,
        tolerance: f64,
        location: f64,
        want_location: bool,
    ) -> Result<Self> {
        Self::build(
            input,
            other_input,
            output,
            effective_analysis_width,
            window_shape,
            k_stdev,
            max_iterations,
            tolerance,
            location,
            want_location,
        )
        .map_err(|e| Error::wrap("Robust LPC refinement workspace could not be created.", e))
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        input: Option<&'a Sound>,
        other_input: Option<&'a Lpc>,
        output: Option<OutputTarget<'a>>,
        effective_analysis_width: f64,
        window_shape: WindowShape,
        k_stdev: f64,
        max_iterations: usize,
        tolerance: f64,
        location: f64,
        want_location: bool,
    ) -> Result<Self> {
        if let (Some(sound), Some(other)) = (input, other_input) {
            let input_dx = sound.dx();
            if (input_dx - other.sampling_period()).abs() > 1e-12 * input_dx.abs() {
                return Err(Error::IncompatibleSampling {
                    input: input_dx,
                    output: other.sampling_period(),
                });
            }
        }
        let input_dx = input.map(|s| s.dx());
        let other_meta = other_input.map(|o| (o.sampling_period(), o.time_step(), o.max_coefficients()));
        let output_meta = output
            .as_ref()
            .map(|t| (t.sampling_period, t.time_step, t.max_coefficients));
        let core = WorkspaceCore::new(input, output, effective_analysis_width, window_shape)?;
        let mut me = Self {
            core,
            other_input,
            pool: WorkvectorPool::new(Vec::new()),
            params: RobustParams {
                k_stdev,
                max_iterations,
                tol1: tolerance,
                svd_tolerance: 1e-10,
                huber_iterations: 5,
                location,
                want_location,
            },
            state: RobustState::empty(),
        };
        // Any present collaborator can supply the phase it governs.
        let dependency = other_meta.or(output_meta);
        match (input_dx, dependency) {
            (Some(dx), Some((_, time_step, max))) => {
                me.init_input_dependency(dx, time_step)?;
                me.init_other_input_dependency(dx, max)?;
            }
            (Some(dx), None) => {
                let time_step = effective_analysis_width / 4.0;
                me.init_input_dependency(dx, time_step)?;
            }
            (None, Some((sampling_period, _, max))) => {
                me.init_other_input_dependency(sampling_period, max)?;
            }
            (None, None) => {}
        }
        Ok(me)
    }

    /// Input-dependent phase: frame buffers, residual and weight vectors.
    pub(crate) fn init_input_dependency(
        &mut self,
        sampling_period: f64,
        time_step: f64,
    ) -> Result<()> {
        self.core.init_input_dependency(sampling_period, time_step)?;
        self.state.error = vec![0.0; self.core.frame_size];
        self.state.sample_weights = vec![0.0; self.core.frame_size];
        Ok(())
    }

    /// Other-input-dependent phase: everything sized by the maximum
    /// prediction order, plus the scratch pool (filter memory and the
    /// Huber work vector).
    pub(crate) fn init_other_input_dependency(
        &mut self,
        sampling_period: f64,
        max_coefficients: usize,
    ) -> Result<()> {
        self.core
            .init_output_dependency(sampling_period, max_coefficients)?;
        self.state.current_order = max_coefficients;
        self.state.coefficients = Vec::with_capacity(max_coefficients);
        self.state.covariances = vec![0.0; max_coefficients];
        self.state.covariance_matrix = DMatrix::zeros(max_coefficients, max_coefficients);
        self.pool = WorkvectorPool::new(vec![max_coefficients, self.core.frame_size]);
        Ok(())
    }

    /// Iterations the most recent frame took.
    #[inline]
    pub fn iterations(&self) -> usize {
        self.state.iterations
    }

    /// Shrink the order-dependent state to a new inner order.
    fn resize_to_order(&mut self, order: usize) {
        if order == self.state.current_order {
            return;
        }
        debug_assert!(order <= self.core.max_coefficients);
        self.state.current_order = order;
    }

    /// Refine one frame given the inner estimate `other`.
    ///
    /// Writes the refined (or fallen-back) result into the working output
    /// frame and returns per-frame success.
    pub(crate) fn refine_from(&mut self, other: &LpcFrame) -> bool {
        let order = other.order();
        self.core.work_frame.copy_from(other);
        self.core.work_frame.diagnostic = 0;
        if order == 0 {
            // Nothing to refine; pass the degenerate frame through.
            return true;
        }
        self.resize_to_order(order);
        self.state.iterations = 0;
        self.state.scale = 1e308;
        self.state.location = self.params.location;
        let mut far_from_scale;
        loop {
            let previous_scale = self.state.scale;
            self.state.error.copy_from_slice(&self.core.sound_frame);
            {
                let memory = self.pool.zero_buffer(0, self.core.max_coefficients);
                filter_inverse_inplace(
                    &mut self.state.error,
                    &self.core.work_frame.coefficients,
                    memory,
                );
            }
            {
                let huber_work = self.pool.raw_buffer(1, self.core.frame_size);
                huber_statistics(
                    &self.state.error,
                    &mut self.state.location,
                    self.params.want_location,
                    &mut self.state.scale,
                    true,
                    self.params.k_stdev,
                    self.params.tol1,
                    self.params.huber_iterations,
                    huber_work,
                );
            }
            self.state.set_sample_weights(self.params.k_stdev);
            self.state.set_covariances(&self.core.sound_frame);
            if self.state.solve_lpc(self.params.svd_tolerance).is_err() {
                // No change could be made; keep the unrefined estimate.
                self.core.work_frame.copy_from(other);
                self.core.work_frame.diagnostic = 2;
                return false;
            }
            self.core
                .work_frame
                .coefficients
                .copy_from_slice(&self.state.coefficients);
            far_from_scale = (self.state.scale - previous_scale).abs()
                > f64::max(self.params.tol1 * self.state.scale.abs(), f64::EPSILON);
            self.state.iterations += 1;
            if self.state.iterations >= self.params.max_iterations || !far_from_scale {
                break;
            }
        }
        if far_from_scale {
            // Ran out of iterations before the scale settled; the last
            // estimate is still returned.
            self.core.work_frame.diagnostic = 3;
        }
        true
    }
}

impl FrameAnalysis for RefinementWorkspace<'_> {
    fn allocate_output_frames(&mut self) {
        self.core.allocate_output_frames();
    }

    fn prepare_input(&mut self, frame_index: usize) {
        self.core.prepare_input(frame_index);
    }

    fn estimate(&mut self) -> bool {
        match self.other_input {
            Some(other) => {
                let frame = &other.frames()[self.core.current_frame];
                self.refine_from(frame)
            }
            // Without a persisted other input the caller wires frames
            // through refine_from directly (composite pipeline).
            None => false,
        }
    }

    fn commit_output(&mut self) {
        self.core.commit_output();
    }
}

/// Composite workspace: an internal autocorrelation estimator feeding a
/// robust refiner, frame by frame.
///
/// Both stages advance in lock-step over the same frame index; the
/// refiner's "other input" is the inner stage's live working frame,
/// borrowed fresh every frame and never cached across frames.
pub struct RobustWorkspace<'a> {
    pub(crate) core: WorkspaceCore<'a>,
    sound_to_lpc: AutocorrelationWorkspace<'a>,
    sound_and_lpc_to_lpc: RefinementWorkspace<'a>,
}

impl<'a> RobustWorkspace<'a> {
    /// Create the composite robust analysis workspace.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        input: Option<&'a Sound>,
        output: Option<OutputTarget<'a>>,
        effective_analysis_width: f64,
        window_shape: WindowShape,
        k_stdev: f64,
        max_iterations: usize,
        tolerance: f64,
        location: f64,
        want_location: bool,
    ) -> Result<Self> {
        Self::build(
            input,
            output,
            effective_analysis_width,
            window_shape,
            k_stdev,
            max_iterations,
            tolerance,
            location,
            want_location,
        )
        .map_err(|e| Error::wrap("Robust LPC workspace could not be created.", e))
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        input: Option<&'a Sound>,
        output: Option<OutputTarget<'a>>,
        effective_analysis_width: f64,
        window_shape: WindowShape,
        k_stdev: f64,
        max_iterations: usize,
        tolerance: f64,
        location: f64,
        want_location: bool,
    ) -> Result<Self> {
        let input_dx = input.map(|s| s.dx());
        let output_meta = output
            .as_ref()
            .map(|t| (t.sampling_period, t.time_step, t.max_coefficients));
        if let (Some(dx), Some((output_dx, _, _))) = (input_dx, output_meta) {
            if (dx - output_dx).abs() > 1e-12 * dx.abs() {
                return Err(Error::IncompatibleSampling {
                    input: dx,
                    output: output_dx,
                });
            }
        }
        // The inner stages own no input and no other-input; the refiner
        // owns the external output.
        let sound_to_lpc =
            AutocorrelationWorkspace::new(None, None, effective_analysis_width, window_shape)?;
        let sound_and_lpc_to_lpc = RefinementWorkspace::new(
            None,
            None,
            output,
            effective_analysis_width,
            window_shape,
            k_stdev,
            max_iterations,
            tolerance,
            location,
            want_location,
        )?;
        let core = WorkspaceCore::new(input, None, effective_analysis_width, window_shape)?;
        let mut me = Self {
            core,
            sound_to_lpc,
            sound_and_lpc_to_lpc,
        };
        match (input_dx, output_meta) {
            (Some(dx), Some((_, time_step, max))) => {
                me.init_input_dependency(dx, time_step)?;
                me.init_output_dependency(dx, time_step, max)?;
            }
            (Some(dx), None) => {
                let time_step = effective_analysis_width / 4.0;
                me.init_input_dependency(dx, time_step)?;
            }
            (None, Some((sampling_period, time_step, max))) => {
                me.init_output_dependency(sampling_period, time_step, max)?;
            }
            (None, None) => {}
        }
        Ok(me)
    }

    fn init_input_dependency(&mut self, sampling_period: f64, time_step: f64) -> Result<()> {
        self.core.init_input_dependency(sampling_period, time_step)?;
        self.sound_to_lpc
            .init_input_dependency(sampling_period, time_step)?;
        self.sound_and_lpc_to_lpc
            .init_input_dependency(sampling_period, time_step)
    }

    fn init_output_dependency(
        &mut self,
        sampling_period: f64,
        time_step: f64,
        max_coefficients: usize,
    ) -> Result<()> {
        // The inner estimator needs an output phase of its own even
        // though it has no output object: its working frame is the
        // refiner's per-frame other input.
        if self.sound_to_lpc.core.frame_size == 0 {
            self.sound_to_lpc
                .init_input_dependency(sampling_period, time_step)?;
        }
        self.sound_to_lpc
            .init_output_dependency(sampling_period, max_coefficients)?;
        if self.sound_and_lpc_to_lpc.core.frame_size == 0 {
            self.sound_and_lpc_to_lpc
                .init_input_dependency(sampling_period, time_step)?;
        }
        self.sound_and_lpc_to_lpc
            .init_other_input_dependency(sampling_period, max_coefficients)?;
        self.core
            .init_output_dependency(sampling_period, max_coefficients)
    }
}

impl FrameAnalysis for RobustWorkspace<'_> {
    fn allocate_output_frames(&mut self) {
        self.sound_and_lpc_to_lpc.allocate_output_frames();
    }

    fn prepare_input(&mut self, frame_index: usize) {
        self.core.prepare_input(frame_index);
    }

    fn estimate(&mut self) -> bool {
        // Share this frame's windowed samples with both stages.
        self.sound_to_lpc
            .core
            .sound_frame
            .copy_from_slice(&self.core.sound_frame);
        self.sound_and_lpc_to_lpc
            .core
            .sound_frame
            .copy_from_slice(&self.core.sound_frame);
        self.sound_to_lpc.core.current_frame = self.core.current_frame;
        let step1 = self.sound_to_lpc.estimate();
        self.sound_and_lpc_to_lpc.core.current_frame = self.core.current_frame;
        let step2 = self
            .sound_and_lpc_to_lpc
            .refine_from(&self.sound_to_lpc.core.work_frame);
        if !step1 {
            // Keep the inner stage's verdict visible on the frame.
            self.sound_and_lpc_to_lpc.core.work_frame.diagnostic =
                self.sound_to_lpc.core.work_frame.diagnostic;
        }
        step1 && step2
    }

    fn commit_output(&mut self) {
        self.sound_and_lpc_to_lpc.commit_output();
    }
}

// ============================================================================
// Drivers
// ============================================================================

/// Robust LPC analysis of a sound: an internal autocorrelation estimate
/// refined per frame by iteratively reweighted least squares.
///
/// # Arguments
///
/// * `sound` - Input signal
/// * `prediction_order` - Maximum number of coefficients per frame
/// * `effective_analysis_width` - Effective window length in seconds
/// * `time_step` - Frame step in seconds (0 = auto: width / 4)
/// * `pre_emphasis_frequency` - Pre-emphasis from this frequency in Hz
///   (≤ 0 disables)
/// * `window_shape` - Analysis window shape
/// * `k_stdev` - Huber cutoff in standard deviations (1.5 is typical)
/// * `max_iterations` - Refinement iteration cap per frame
/// * `tolerance` - Relative scale-convergence tolerance
/// * `location` - Fixed residual location, used when `want_location` is
///   false
/// * `want_location` - Estimate the residual location per frame instead
///   of fixing it
#[allow(clippy::too_many_arguments)]
pub fn sound_to_lpc_robust(
    sound: &Sound,
    prediction_order: usize,
    effective_analysis_width: f64,
    time_step: f64,
    pre_emphasis_frequency: f64,
    window_shape: WindowShape,
    k_stdev: f64,
    max_iterations: usize,
    tolerance: f64,
    location: f64,
    want_location: bool,
) -> Result<Lpc> {
    let (emphasized, mut lpc) = prepare_analysis(
        sound,
        prediction_order,
        effective_analysis_width,
        time_step,
        pre_emphasis_frequency,
        window_shape,
    )?;
    run_partitioned(&mut lpc, MIN_FRAMES_PER_THREAD_ROBUST, |target| {
        RobustWorkspace::new(
            Some(&emphasized),
            Some(target),
            effective_analysis_width,
            window_shape,
            k_stdev,
            max_iterations,
            tolerance,
            location,
            want_location,
        )
    })?;
    Ok(lpc)
}

/// Refine a persisted LPC analysis against its sound.
///
/// The output store copies its frame placement from `lpc`; each frame of
/// `lpc` is refined against the matching windowed frame of `sound`.
/// Arguments otherwise as [`sound_to_lpc_robust`].
#[allow(clippy::too_many_arguments)]
pub fn sound_and_lpc_to_lpc_robust(
    sound: &Sound,
    lpc: &Lpc,
    effective_analysis_width: f64,
    pre_emphasis_frequency: f64,
    window_shape: WindowShape,
    k_stdev: f64,
    max_iterations: usize,
    tolerance: f64,
    location: f64,
    want_location: bool,
) -> Result<Lpc> {
    let mut emphasized = sound.clone();
    emphasized.pre_emphasize(pre_emphasis_frequency);
    let mut output = Lpc::new(
        lpc.n_frames(),
        lpc.t1(),
        lpc.time_step(),
        lpc.sampling_period(),
        lpc.max_coefficients(),
    );
    run_partitioned(&mut output, MIN_FRAMES_PER_THREAD_ROBUST, |target| {
        RefinementWorkspace::new(
            Some(&emphasized),
            Some(lpc),
            Some(target),
            effective_analysis_width,
            window_shape,
            k_stdev,
            max_iterations,
            tolerance,
            location,
            want_location,
        )
    })?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn inverse_filter_whitens_a_predictable_signal() {
        // x[t] = 0.9 x[t-1]: with a = [-0.9] the residual is zero after
        // the first sample.
        let mut x: Vec<f64> = vec![1.0; 32];
        for t in 1..x.len() {
            x[t] = 0.9 * x[t - 1];
        }
        let a = [-0.9];
        let mut memory = [0.0];
        filter_inverse_inplace(&mut x, &a, &mut memory);
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-12);
        for &e in &x[1..] {
            assert!(e.abs() < 1e-12);
        }
    }

    #[test]
    fn inverse_filter_with_empty_model_is_identity() {
        let mut x = vec![1.0, -2.0, 3.0];
        let a: [f64; 0] = [];
        let mut memory: [f64; 0] = [];
        filter_inverse_inplace(&mut x, &a, &mut memory);
        assert_eq!(x, vec![1.0, -2.0, 3.0]);
    }

    #[test]
    fn refinement_passes_order_zero_frames_through() {
        let sound = Sound::from_slice(&vec![0.0; 8000], 8000.0);
        let lpc = Lpc::new(10, 0.05, 0.01, sound.dx(), 4);
        let mut workspace = RefinementWorkspace::new(
            Some(&sound),
            Some(&lpc),
            None,
            0.025,
            WindowShape::Gaussian2,
            1.5,
            10,
            1e-6,
            0.0,
            false,
        )
        .unwrap();
        workspace.prepare_input(0);
        let degenerate = LpcFrame::allocated(0);
        assert!(workspace.refine_from(&degenerate));
        assert_eq!(workspace.core.work_frame.order(), 0);
        assert_eq!(workspace.core.work_frame.diagnostic, 0);
    }
}
