//! LPC coefficient store.
//!
//! One [`LpcFrame`] per analysis frame: a prediction order `p`, the `p`
//! filter coefficients, the prediction-error energy (gain), and a
//! diagnostic code left by the estimator that produced the frame. The
//! [`Lpc`] container pre-allocates every frame before analysis begins, so
//! parallel workers can commit results into disjoint slots without any
//! coordination.
//!
//! Sign convention: with coefficients `a[0..p]`, the prediction model is
//!
//! ```text
//! x̂[t] = -(a[0]·x[t-1] + a[1]·x[t-2] + ... + a[p-1]·x[t-p])
//! ```
//!
//! so the inverse (residual) filter is `e[t] = x[t] + Σ a[k]·x[t-1-k]`.

use ndarray::Array1;

/// LPC analysis result for a single frame.
///
/// The coefficient vector always has exactly `order()` entries: when a
/// recursion truncates the order mid-frame, the storage is resized to
/// match. A `gain` of zero marks a frame that never produced a valid
/// model (e.g. silence).
#[derive(Debug, Clone, PartialEq)]
pub struct LpcFrame {
    /// Filter coefficients; length equals the prediction order.
    pub coefficients: Vec<f64>,
    /// Prediction-error energy; positive for a valid frame.
    pub gain: f64,
    /// Diagnostic code set by the producing estimator; 0 means clean.
    ///
    /// Non-zero codes are estimator-specific (see the estimator docs) and
    /// mark frames whose order was truncated or whose refinement fell
    /// back, never a failure of the analysis as a whole.
    pub diagnostic: u8,
}

impl LpcFrame {
    /// Create a frame with `order` zeroed coefficients.
    pub fn allocated(order: usize) -> Self {
        Self {
            coefficients: vec![0.0; order],
            gain: 0.0,
            diagnostic: 0,
        }
    }

    /// Prediction order of this frame.
    #[inline]
    pub fn order(&self) -> usize {
        self.coefficients.len()
    }

    /// Reset to `order` zeroed coefficients, clearing gain and diagnostic.
    ///
    /// Reuses the existing allocation when possible.
    pub fn reset(&mut self, order: usize) {
        self.coefficients.clear();
        self.coefficients.resize(order, 0.0);
        self.gain = 0.0;
        self.diagnostic = 0;
    }

    /// Copy another frame's contents into this one, reusing storage.
    pub fn copy_from(&mut self, other: &LpcFrame) {
        self.coefficients.clear();
        self.coefficients.extend_from_slice(&other.coefficients);
        self.gain = other.gain;
        self.diagnostic = other.diagnostic;
    }

    /// Truncate the frame to `order` coefficients.
    #[inline]
    pub fn truncate(&mut self, order: usize) {
        self.coefficients.truncate(order);
    }

    /// Reflection coefficients of the model, by the step-down recursion.
    ///
    /// Returns `None` when the recursion hits a reflection coefficient of
    /// magnitude 1 (the step-down division degenerates). For a
    /// minimum-phase model every returned value has magnitude below 1.
    pub fn reflection_coefficients(&self) -> Option<Vec<f64>> {
        let p = self.order();
        let mut a = self.coefficients.clone();
        let mut rc = vec![0.0; p];
        for i in (0..p).rev() {
            let k = a[i];
            rc[i] = k;
            let denom = 1.0 - k * k;
            if denom == 0.0 {
                return None;
            }
            for j in 0..i.div_ceil(2) {
                let aj = a[j];
                let am = a[i - 1 - j];
                a[j] = (aj - k * am) / denom;
                a[i - 1 - j] = (am - k * aj) / denom;
            }
        }
        Some(rc)
    }
}

/// LPC coefficients over time, one frame per analysis step.
#[derive(Debug, Clone)]
pub struct Lpc {
    frames: Vec<LpcFrame>,
    t1: f64,
    time_step: f64,
    sampling_period: f64,
    max_coefficients: usize,
}

impl Lpc {
    /// Create a store with `n_frames` pre-allocated frames.
    ///
    /// Every frame starts at the maximum order with zeroed coefficients;
    /// the estimators overwrite (and possibly truncate) each frame as the
    /// analysis proceeds.
    pub fn new(
        n_frames: usize,
        t1: f64,
        time_step: f64,
        sampling_period: f64,
        max_coefficients: usize,
    ) -> Self {
        Self {
            frames: (0..n_frames)
                .map(|_| LpcFrame::allocated(max_coefficients))
                .collect(),
            t1,
            time_step,
            sampling_period,
            max_coefficients,
        }
    }

    /// The analysis frames.
    #[inline]
    pub fn frames(&self) -> &[LpcFrame] {
        &self.frames
    }

    /// Mutable access to the analysis frames.
    #[inline]
    pub fn frames_mut(&mut self) -> &mut [LpcFrame] {
        &mut self.frames
    }

    /// Number of frames.
    #[inline]
    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    /// Time of the first frame centre in seconds.
    #[inline]
    pub fn t1(&self) -> f64 {
        self.t1
    }

    /// Time between frame centres in seconds.
    #[inline]
    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    /// Sampling period of the analyzed signal in seconds.
    #[inline]
    pub fn sampling_period(&self) -> f64 {
        self.sampling_period
    }

    /// Maximum prediction order any frame can hold.
    #[inline]
    pub fn max_coefficients(&self) -> usize {
        self.max_coefficients
    }

    /// Time of frame `index` in seconds.
    #[inline]
    pub fn frame_time(&self, index: usize) -> f64 {
        self.t1 + index as f64 * self.time_step
    }

    /// Array of frame times.
    pub fn times(&self) -> Array1<f64> {
        Array1::from_iter((0..self.n_frames()).map(|i| self.frame_time(i)))
    }

    /// Array of per-frame gains.
    pub fn gain_values(&self) -> Array1<f64> {
        Array1::from_iter(self.frames.iter().map(|f| f.gain))
    }

    /// Array of per-frame prediction orders.
    pub fn order_values(&self) -> Array1<usize> {
        Array1::from_iter(self.frames.iter().map(|f| f.order()))
    }

    /// Number of frames carrying a non-zero diagnostic code.
    pub fn n_flagged_frames(&self) -> usize {
        self.frames.iter().filter(|f| f.diagnostic != 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn truncation_keeps_storage_in_step_with_order() {
        let mut frame = LpcFrame::allocated(10);
        assert_eq!(frame.order(), 10);
        frame.truncate(3);
        assert_eq!(frame.order(), 3);
        assert_eq!(frame.coefficients.len(), 3);
        frame.reset(10);
        assert_eq!(frame.order(), 10);
        assert_eq!(frame.gain, 0.0);
    }

    #[test]
    fn step_down_recovers_reflection_coefficients() {
        // Order-2 model built from known reflections k1, k2 by Levinson:
        // a = [k1·(1+k2), k2].
        let (k1, k2) = (-0.6, 0.4);
        let frame = LpcFrame {
            coefficients: vec![k1 * (1.0 + k2), k2],
            gain: 1.0,
            diagnostic: 0,
        };
        let rc = frame.reflection_coefficients().unwrap();
        assert_relative_eq!(rc[0], k1, epsilon = 1e-12);
        assert_relative_eq!(rc[1], k2, epsilon = 1e-12);
    }

    #[test]
    fn store_reports_timing_and_diagnostics() {
        let mut lpc = Lpc::new(3, 0.1, 0.01, 1e-4, 4);
        assert_eq!(lpc.n_frames(), 3);
        assert_relative_eq!(lpc.frame_time(2), 0.12, epsilon = 1e-12);
        lpc.frames_mut()[1].diagnostic = 2;
        assert_eq!(lpc.n_flagged_frames(), 1);
    }
}
