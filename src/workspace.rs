//! Workspace plumbing shared by all LPC estimators.
//!
//! A workspace ties together, for the lifetime of one analysis run:
//! an optional input [`Sound`], an optional output slice of pre-allocated
//! [`LpcFrame`] slots, the windowed-frame source, one working output
//! frame that is overwritten every frame, and the estimator's scratch
//! pool. Workspaces are built in up to three phases, mirroring the three
//! ways they are used:
//!
//! - **input-dependent**: the sampling period fixes the frame size, the
//!   window weights and the frame buffer; when an actual signal is
//!   attached, the frame placement too;
//! - **output-dependent**: the maximum prediction order fixes the working
//!   output frame and (per estimator) the scratch-pool sizes;
//! - both, for the ordinary signal-in/coefficients-out case; or neither,
//!   for transient estimators living inside a composite pipeline.
//!
//! Per-frame work goes through the [`FrameAnalysis`] contract:
//! `prepare_input` fetches the next windowed frame, `estimate` turns it
//! into coefficients (never failing the analysis — numerical trouble is a
//! per-frame diagnostic), `commit_output` copies the working frame into
//! its slot. Dispatch is static: the driver is generic over the concrete
//! workspace type, chosen once per analysis, never per frame.

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::frame::{frame_size_in_samples, FrameSource};
use crate::lpc::{Lpc, LpcFrame};
use crate::sound::Sound;
use crate::window::WindowShape;

/// Frames-per-worker floor for the parallel driver. Estimators whose
/// per-frame cost is much higher (the robust refinement) halve it.
pub(crate) const MIN_FRAMES_PER_THREAD: usize = 40;

/// A worker's disjoint, contiguous view of the output store.
///
/// Carries the store metadata by value so a workspace can finish its
/// output-dependent initialization without holding a borrow of the store
/// itself.
#[derive(Debug)]
pub struct OutputTarget<'a> {
    /// The frame slots this workspace may write.
    pub frames: &'a mut [LpcFrame],
    /// Global index of `frames[0]` in the full store.
    pub first_frame: usize,
    /// Sampling period the store was created for.
    pub sampling_period: f64,
    /// Time between frame centres in seconds.
    pub time_step: f64,
    /// Maximum prediction order of the store.
    pub max_coefficients: usize,
}

impl Lpc {
    /// View the whole store as a single output target.
    pub fn output_target(&mut self) -> OutputTarget<'_> {
        let sampling_period = self.sampling_period();
        let time_step = self.time_step();
        let max_coefficients = self.max_coefficients();
        OutputTarget {
            frames: self.frames_mut(),
            first_frame: 0,
            sampling_period,
            time_step,
            max_coefficients,
        }
    }
}

/// The four-operation frame-driver contract.
///
/// An external loop owns frame iteration and thread partitioning; the
/// workspace owns everything per-frame. `estimate` reports per-frame
/// success; failures are recorded as diagnostic codes on the committed
/// frame and never abort the run.
pub trait FrameAnalysis {
    /// Initialize every output frame this workspace is responsible for.
    fn allocate_output_frames(&mut self);
    /// Fetch the windowed samples for frame `frame_index`.
    fn prepare_input(&mut self, frame_index: usize);
    /// Compute coefficients from the current frame.
    fn estimate(&mut self) -> bool;
    /// Copy the working result into the output store (no-op without one).
    fn commit_output(&mut self);
}

/// Run one workspace over a contiguous frame range.
pub fn drive_frames<W: FrameAnalysis>(workspace: &mut W, first_frame: usize, n_frames: usize) {
    workspace.allocate_output_frames();
    for index in first_frame..first_frame + n_frames {
        workspace.prepare_input(index);
        let _usable = workspace.estimate();
        workspace.commit_output();
    }
}

/// Split `n_frames` into contiguous per-worker chunks.
///
/// Returns the chunk length. Every worker gets at least
/// `min_frames_per_thread` frames and there are never more chunks than
/// rayon threads; the result is purely a scheduling choice and does not
/// affect any frame's value.
pub(crate) fn frames_per_worker(n_frames: usize, min_frames_per_thread: usize) -> usize {
    let max_workers = rayon::current_num_threads().max(1);
    let workers = (n_frames / min_frames_per_thread.max(1)).clamp(1, max_workers);
    n_frames.div_ceil(workers)
}

/// Partition the store, build one workspace per chunk, and drive them in
/// parallel.
///
/// Workspace construction happens serially up front so configuration
/// errors surface before any analysis starts; the per-frame loop runs with
/// one independent workspace (and scratch pool) per worker.
pub(crate) fn run_partitioned<'s, W, F>(
    lpc: &'s mut Lpc,
    min_frames_per_thread: usize,
    make_workspace: F,
) -> Result<()>
where
    W: FrameAnalysis + Send,
    F: Fn(OutputTarget<'s>) -> Result<W>,
{
    let n_frames = lpc.n_frames();
    if n_frames == 0 {
        return Ok(());
    }
    let sampling_period = lpc.sampling_period();
    let time_step = lpc.time_step();
    let max_coefficients = lpc.max_coefficients();
    let chunk_len = frames_per_worker(n_frames, min_frames_per_thread);

    let all_frames: &'s mut [LpcFrame] = lpc.frames_mut();
    let mut workspaces = Vec::new();
    for (chunk_index, frames) in all_frames.chunks_mut(chunk_len).enumerate() {
        let n_chunk_frames = frames.len();
        let target = OutputTarget {
            frames,
            first_frame: chunk_index * chunk_len,
            sampling_period,
            time_step,
            max_coefficients,
        };
        let first_frame = target.first_frame;
        workspaces.push((make_workspace(target)?, first_frame, n_chunk_frames));
    }

    workspaces
        .into_par_iter()
        .for_each(|(mut workspace, first_frame, n_chunk_frames)| {
            drive_frames(&mut workspace, first_frame, n_chunk_frames);
        });
    Ok(())
}

/// State shared by every workspace variant.
#[derive(Debug)]
pub(crate) struct WorkspaceCore<'a> {
    pub(crate) input: Option<&'a Sound>,
    pub(crate) output: Option<OutputTarget<'a>>,
    pub(crate) effective_analysis_width: f64,
    pub(crate) window_shape: WindowShape,
    /// Windowed frame length in samples; 0 until the input phase ran.
    pub(crate) frame_size: usize,
    pub(crate) sound_frame: Vec<f64>,
    pub(crate) source: Option<FrameSource>,
    /// Maximum prediction order; 0 until the output phase ran.
    pub(crate) max_coefficients: usize,
    /// Working output frame, overwritten every frame.
    pub(crate) work_frame: LpcFrame,
    pub(crate) current_frame: usize,
}

impl<'a> WorkspaceCore<'a> {
    /// Minimal initialization; the factories run the dependent phases.
    pub(crate) fn new(
        input: Option<&'a Sound>,
        output: Option<OutputTarget<'a>>,
        effective_analysis_width: f64,
        window_shape: WindowShape,
    ) -> Result<Self> {
        if effective_analysis_width <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "effective analysis width must be positive, got {effective_analysis_width}"
            )));
        }
        if let (Some(sound), Some(target)) = (input, &output) {
            let input_dx = sound.dx();
            let output_dx = target.sampling_period;
            if (input_dx - output_dx).abs() > 1e-12 * input_dx.abs() {
                return Err(Error::IncompatibleSampling {
                    input: input_dx,
                    output: output_dx,
                });
            }
        }
        Ok(Self {
            input,
            output,
            effective_analysis_width,
            window_shape,
            frame_size: 0,
            sound_frame: Vec::new(),
            source: None,
            max_coefficients: 0,
            work_frame: LpcFrame::allocated(0),
            current_frame: 0,
        })
    }

    /// Input-dependent phase: frame size, window weights, frame buffer,
    /// and — when a signal is attached — frame placement.
    pub(crate) fn init_input_dependency(&mut self, sampling_period: f64, time_step: f64) -> Result<()> {
        if sampling_period <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "sampling period must be positive, got {sampling_period}"
            )));
        }
        let physical_width =
            self.effective_analysis_width * self.window_shape.physical_width_factor();
        self.frame_size = frame_size_in_samples(physical_width, sampling_period);
        self.sound_frame = vec![0.0; self.frame_size];
        if let Some(sound) = self.input {
            self.source = Some(FrameSource::new(
                sound,
                self.effective_analysis_width,
                time_step,
                self.window_shape,
            )?);
        }
        self.validate_order()
    }

    /// Output-dependent phase: the working output frame.
    pub(crate) fn init_output_dependency(
        &mut self,
        sampling_period: f64,
        max_coefficients: usize,
    ) -> Result<()> {
        if sampling_period <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "sampling period must be positive, got {sampling_period}"
            )));
        }
        if max_coefficients == 0 {
            return Err(Error::InvalidParameter(
                "prediction order must be at least 1".to_string(),
            ));
        }
        self.max_coefficients = max_coefficients;
        // One working frame is always needed, output store or not.
        self.work_frame = LpcFrame::allocated(max_coefficients);
        self.validate_order()
    }

    /// The prediction order must leave room in the analysis frame.
    fn validate_order(&self) -> Result<()> {
        if self.frame_size > 0
            && self.max_coefficients > 0
            && self.max_coefficients >= self.frame_size
        {
            return Err(Error::InvalidParameter(format!(
                "prediction order {} does not fit in an analysis frame of {} samples",
                self.max_coefficients, self.frame_size
            )));
        }
        Ok(())
    }

    /// Fetch the windowed frame for `frame_index` (no-op without input).
    pub(crate) fn prepare_input(&mut self, frame_index: usize) {
        self.current_frame = frame_index;
        if let (Some(sound), Some(source)) = (self.input, &self.source) {
            source.extract(sound, frame_index, &mut self.sound_frame);
        }
    }

    /// Initialize this workspace's output slots to the maximum order.
    pub(crate) fn allocate_output_frames(&mut self) {
        let max = self.max_coefficients;
        if let Some(target) = &mut self.output {
            for frame in target.frames.iter_mut() {
                frame.reset(max);
            }
        }
    }

    /// Copy the working frame into its output slot (no-op without output).
    pub(crate) fn commit_output(&mut self) {
        if let Some(target) = &mut self.output {
            let local = self.current_frame - target.first_frame;
            target.frames[local].copy_from(&self.work_frame);
        }
    }

    /// Restore the working frame to full order before a new estimate.
    pub(crate) fn reset_work_frame(&mut self) {
        let max = self.max_coefficients;
        self.work_frame.reset(max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_respects_the_frame_floor() {
        // Fewer frames than the floor: one worker takes everything.
        assert_eq!(frames_per_worker(30, 40), 30);
        // Plenty of frames: chunks never undercut the floor.
        let chunk = frames_per_worker(1000, 40);
        assert!(chunk >= 40);
    }

    #[test]
    fn incompatible_sampling_periods_are_fatal() {
        let sound = Sound::from_slice(&[0.0; 1000], 10000.0);
        let mut lpc = Lpc::new(5, 0.0, 0.01, 1.0 / 8000.0, 4);
        let result = WorkspaceCore::new(
            Some(&sound),
            Some(lpc.output_target()),
            0.025,
            WindowShape::Hanning,
        );
        assert!(matches!(
            result.unwrap_err(),
            Error::IncompatibleSampling { .. }
        ));
    }

    #[test]
    fn order_must_fit_in_the_frame() {
        let sound = Sound::from_slice(&[0.0; 4000], 8000.0);
        let mut core = WorkspaceCore::new(Some(&sound), None, 0.002, WindowShape::Rectangular)
            .unwrap();
        core.init_input_dependency(sound.dx(), 0.005).unwrap();
        // 0.002 s at 8 kHz is a 17-sample frame; order 40 cannot fit.
        assert!(core.init_output_dependency(sound.dx(), 40).is_err());
    }
}
