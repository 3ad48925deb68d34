//! Frame timing and windowed frame extraction.
//!
//! Documentation sources:
//! - Praat manual: Intro 3.1 (time step and window length of the standard
//!   short-term analyses)
//! - Standard short-term analysis conventions from the speech-processing
//!   literature (frames centred in the signal, zero padding at the edges)
//!
//! Key documented facts:
//! - The number of frames is `floor((duration - window) / step) + 1`, and
//!   the frames as a group are centred in the signal: the midpoint of the
//!   first and last frame centres coincides with the midpoint of the
//!   sound.
//! - The frame length in samples is the physical window width divided by
//!   the sampling period, rounded up to an odd number so each frame has a
//!   well-defined centre sample.
//! - Frame extraction subtracts the frame mean before windowing, so a DC
//!   offset in the recording does not leak into the prediction
//!   coefficients.

use crate::error::{Error, Result};
use crate::sound::Sound;
use crate::window::WindowShape;

/// Placement of analysis frames on the time axis.
#[derive(Debug, Clone, Copy)]
pub struct FrameTiming {
    /// Number of frames.
    pub n_frames: usize,
    /// Time of the first frame centre in seconds.
    pub t1: f64,
    /// Time between successive frame centres in seconds.
    pub time_step: f64,
}

impl FrameTiming {
    /// Compute frame placement for a short-term analysis.
    ///
    /// # Arguments
    ///
    /// * `duration` - Total duration of the signal in seconds
    /// * `window_duration` - Physical analysis window duration in seconds
    /// * `time_step` - Time between frame centres in seconds
    ///
    /// # Errors
    ///
    /// `Error::SoundTooShort` if not even one window fits,
    /// `Error::InvalidParameter` for non-positive inputs.
    pub fn short_term_analysis(
        duration: f64,
        window_duration: f64,
        time_step: f64,
    ) -> Result<FrameTiming> {
        if window_duration <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "window duration must be positive, got {window_duration}"
            )));
        }
        if time_step <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "time step must be positive, got {time_step}"
            )));
        }
        if duration < window_duration {
            return Err(Error::SoundTooShort {
                duration,
                window: window_duration,
            });
        }
        let n_frames = ((duration - window_duration) / time_step).floor() as usize + 1;
        let t1 = 0.5 * duration - 0.5 * (n_frames - 1) as f64 * time_step;
        Ok(FrameTiming {
            n_frames,
            t1,
            time_step,
        })
    }

    /// Time of frame `index` (0-based) in seconds.
    #[inline]
    pub fn frame_time(&self, index: usize) -> f64 {
        self.t1 + index as f64 * self.time_step
    }
}

/// Produces one windowed sample segment per analysis frame.
///
/// The source is built once per workspace: it owns the precomputed window
/// weights and the frame placement, and writes each requested frame into a
/// caller-provided buffer that is overwritten every frame. Which algorithm
/// consumes the frames is none of its business.
#[derive(Debug, Clone)]
pub struct FrameSource {
    timing: FrameTiming,
    frame_size: usize,
    window: Vec<f64>,
    subtract_mean: bool,
}

/// Physical frame length in samples: round up to an odd count.
pub(crate) fn frame_size_in_samples(physical_width: f64, sampling_period: f64) -> usize {
    let mut n = (physical_width / sampling_period).ceil() as usize;
    if n % 2 == 0 {
        n += 1;
    }
    n
}

impl FrameSource {
    /// Build a source for `sound` with the given window configuration.
    ///
    /// `effective_width` is the effective analysis width in seconds; the
    /// physical width follows from the window shape (doubled for Gaussian
    /// and Kaiser shapes).
    pub fn new(
        sound: &Sound,
        effective_width: f64,
        time_step: f64,
        shape: WindowShape,
    ) -> Result<FrameSource> {
        let physical_width = effective_width * shape.physical_width_factor();
        let timing = FrameTiming::short_term_analysis(sound.duration(), physical_width, time_step)?;
        let frame_size = frame_size_in_samples(physical_width, sound.dx());
        Ok(FrameSource {
            timing,
            frame_size,
            window: shape.weights(frame_size),
            subtract_mean: true,
        })
    }

    /// Frame placement on the time axis.
    #[inline]
    pub fn timing(&self) -> &FrameTiming {
        &self.timing
    }

    /// Number of frames the source will produce.
    #[inline]
    pub fn n_frames(&self) -> usize {
        self.timing.n_frames
    }

    /// Frame length in samples (always odd).
    #[inline]
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Extract frame `index` from `sound` into `out`.
    ///
    /// Samples outside the signal are taken as zero, the frame mean is
    /// subtracted, and the window weights are applied. `out` must have
    /// length [`FrameSource::frame_size`].
    pub fn extract(&self, sound: &Sound, index: usize, out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.frame_size);
        let samples = sound.samples();
        let n = samples.len() as isize;
        let time = self.timing.frame_time(index);
        let centre = ((time - sound.x1()) / sound.dx()).round() as isize;
        let first = centre - (self.frame_size as isize - 1) / 2;
        for (j, slot) in out.iter_mut().enumerate() {
            let idx = first + j as isize;
            *slot = if idx >= 0 && idx < n {
                samples[idx as usize]
            } else {
                0.0
            };
        }
        if self.subtract_mean {
            let mean = out.iter().sum::<f64>() / out.len() as f64;
            for v in out.iter_mut() {
                *v -= mean;
            }
        }
        for (v, w) in out.iter_mut().zip(self.window.iter()) {
            *v *= w;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn frame_count_and_centring() {
        let timing = FrameTiming::short_term_analysis(1.0, 0.05, 0.03).unwrap();
        assert_eq!(timing.n_frames, 32);
        // Frames as a group are centred in the signal.
        let last = timing.frame_time(timing.n_frames - 1);
        assert_relative_eq!(timing.t1 + last, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn too_short_sound_is_rejected() {
        let err = FrameTiming::short_term_analysis(0.01, 0.05, 0.01).unwrap_err();
        assert!(matches!(err, crate::error::Error::SoundTooShort { .. }));
    }

    #[test]
    fn frame_size_is_odd() {
        assert_eq!(frame_size_in_samples(0.025, 1.0 / 10000.0), 251);
        assert_eq!(frame_size_in_samples(0.02551, 1.0 / 10000.0), 257);
    }

    #[test]
    fn extraction_zero_pads_and_removes_mean() {
        // Constant signal: after mean subtraction an interior frame is all
        // zeros regardless of the window.
        let sound = Sound::from_slice(&vec![1.0; 1000], 1000.0);
        let source = FrameSource::new(&sound, 0.05, 0.01, WindowShape::Hanning).unwrap();
        let mut frame = vec![0.0; source.frame_size()];
        source.extract(&sound, source.n_frames() / 2, &mut frame);
        assert!(frame.iter().all(|&v| v.abs() < 1e-12));
    }
}
