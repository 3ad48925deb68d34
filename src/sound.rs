//! Sound - Audio samples with sample rate.
//!
//! This is the input type for all LPC analysis in praatfan-lpc.
//!
//! # Mono Audio Only
//!
//! Only mono audio is supported. Multi-channel files require explicit
//! channel selection via `from_file_channel()`.
//!
//! # Sample Format
//!
//! Audio samples are stored as 64-bit floating point values, normalized to
//! the range [-1.0, 1.0] for integer formats.
//!
//! # Time Convention
//!
//! Samples are centred at their time points: the first sample sits at
//! t = dx/2 rather than t = 0, so an analysis frame centred in the signal
//! is symmetric for even-length signals.

use std::path::Path;

use ndarray::Array1;

use crate::error::{Error, Result};
use crate::lpc::Lpc;
use crate::window::WindowShape;

/// Represents audio samples with sample rate.
///
/// # Example
///
/// ```no_run
/// use praatfan_lpc::Sound;
///
/// let sound = Sound::from_file("audio.wav").unwrap();
/// println!("Duration: {:.3}s", sound.duration());
/// ```
#[derive(Debug, Clone)]
pub struct Sound {
    /// Audio samples as a 1D array.
    samples: Array1<f64>,
    /// Sample rate in Hz.
    sample_rate: f64,
}

impl Sound {
    /// Create a Sound from samples and sample rate.
    pub fn new(samples: Array1<f64>, sample_rate: f64) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Create a Sound from a slice of samples.
    ///
    /// Convenience constructor that copies data from a slice. Use `new()`
    /// with an `Array1` to avoid copying if you already have one.
    pub fn from_slice(samples: &[f64], sample_rate: f64) -> Self {
        Self {
            samples: Array1::from_vec(samples.to_vec()),
            sample_rate,
        }
    }

    /// Load audio from a WAV file.
    ///
    /// Only mono files are supported; multi-channel files return
    /// [`Error::NotMono`]. Integer formats (8/16/24/32 bit) are normalized
    /// to [-1.0, 1.0]; float formats are loaded as-is.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        if spec.channels != 1 {
            return Err(Error::NotMono(spec.channels));
        }

        let sample_rate = spec.sample_rate as f64;
        let samples = read_samples(reader, spec)?;

        Ok(Self {
            samples: Array1::from_vec(samples),
            sample_rate,
        })
    }

    /// Load a specific channel from a WAV file.
    ///
    /// WAV files store interleaved samples; this extracts every Nth sample
    /// starting at index `channel` (0-based).
    pub fn from_file_channel<P: AsRef<Path>>(path: P, channel: usize) -> Result<Self> {
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let n_channels = spec.channels as usize;

        if channel >= n_channels {
            return Err(Error::InvalidParameter(format!(
                "Channel {} does not exist. File has {} channels.",
                channel, n_channels
            )));
        }

        let sample_rate = spec.sample_rate as f64;
        let all_samples = read_samples(reader, spec)?;

        let samples: Vec<f64> = all_samples
            .iter()
            .skip(channel)
            .step_by(n_channels)
            .copied()
            .collect();

        Ok(Self {
            samples: Array1::from_vec(samples),
            sample_rate,
        })
    }

    /// Get the audio samples.
    #[inline]
    pub fn samples(&self) -> &Array1<f64> {
        &self.samples
    }

    /// Get the sample rate in Hz.
    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Get the number of samples.
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    /// Get the total duration in seconds.
    #[inline]
    pub fn duration(&self) -> f64 {
        self.n_samples() as f64 / self.sample_rate
    }

    /// Get the sample period (1 / sample_rate) in seconds.
    #[inline]
    pub fn dx(&self) -> f64 {
        1.0 / self.sample_rate
    }

    /// Get the time of the first sample (centred on the sample).
    #[inline]
    pub fn x1(&self) -> f64 {
        0.5 * self.dx()
    }

    /// Apply first-order pre-emphasis in place.
    ///
    /// Boosts frequencies above `from_frequency` by 6 dB/octave to
    /// compensate for the spectral tilt of the glottal source:
    /// `x[i] -= alpha * x[i-1]` with `alpha = exp(-2π F Δt)`, applied from
    /// the end of the signal backwards so every update sees the original
    /// preceding sample. A frequency at or above the Nyquist frequency (or
    /// not positive) leaves the signal untouched.
    pub fn pre_emphasize(&mut self, from_frequency: f64) {
        if from_frequency <= 0.0 || from_frequency >= 0.5 * self.sample_rate {
            return;
        }
        let alpha = (-2.0 * std::f64::consts::PI * from_frequency * self.dx()).exp();
        for i in (1..self.samples.len()).rev() {
            self.samples[i] -= alpha * self.samples[i - 1];
        }
    }

    // ========== Analysis Methods ==========
    //
    // Convenience wrappers over the frame-wise LPC drivers. Each method
    // delegates to the function of the same name in the analysis modules.

    /// LPC analysis by the autocorrelation method (Levinson-Durbin).
    pub fn to_lpc_autocorrelation(
        &self,
        prediction_order: usize,
        effective_analysis_width: f64,
        time_step: f64,
        pre_emphasis_frequency: f64,
        window_shape: WindowShape,
    ) -> Result<Lpc> {
        crate::sound_to_lpc::sound_to_lpc_autocorrelation(
            self,
            prediction_order,
            effective_analysis_width,
            time_step,
            pre_emphasis_frequency,
            window_shape,
        )
    }

    /// LPC analysis by the covariance method.
    pub fn to_lpc_covariance(
        &self,
        prediction_order: usize,
        effective_analysis_width: f64,
        time_step: f64,
        pre_emphasis_frequency: f64,
        window_shape: WindowShape,
    ) -> Result<Lpc> {
        crate::sound_to_lpc::sound_to_lpc_covariance(
            self,
            prediction_order,
            effective_analysis_width,
            time_step,
            pre_emphasis_frequency,
            window_shape,
        )
    }

    /// LPC analysis by Burg's maximum-entropy method.
    pub fn to_lpc_burg(
        &self,
        prediction_order: usize,
        effective_analysis_width: f64,
        time_step: f64,
        pre_emphasis_frequency: f64,
        window_shape: WindowShape,
    ) -> Result<Lpc> {
        crate::sound_to_lpc::sound_to_lpc_burg(
            self,
            prediction_order,
            effective_analysis_width,
            time_step,
            pre_emphasis_frequency,
            window_shape,
        )
    }

    /// LPC analysis by Marple's fast recursive method.
    ///
    /// `tol1` stops the recursion when the prediction error drops below
    /// `tol1` times the frame energy; `tol2` stops it when the relative
    /// improvement per order falls below `tol2`.
    #[allow(clippy::too_many_arguments)]
    pub fn to_lpc_marple(
        &self,
        prediction_order: usize,
        effective_analysis_width: f64,
        time_step: f64,
        pre_emphasis_frequency: f64,
        window_shape: WindowShape,
        tol1: f64,
        tol2: f64,
    ) -> Result<Lpc> {
        crate::sound_to_lpc::sound_to_lpc_marple(
            self,
            prediction_order,
            effective_analysis_width,
            time_step,
            pre_emphasis_frequency,
            window_shape,
            tol1,
            tol2,
        )
    }

    /// Robust LPC analysis: an autocorrelation estimate refined per frame
    /// by iteratively reweighted least squares.
    #[allow(clippy::too_many_arguments)]
    pub fn to_lpc_robust(
        &self,
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
        crate::robust::sound_to_lpc_robust(
            self,
            prediction_order,
            effective_analysis_width,
            time_step,
            pre_emphasis_frequency,
            window_shape,
            k_stdev,
            max_iterations,
            tolerance,
            location,
            want_location,
        )
    }
}

fn read_samples(
    reader: hound::WavReader<std::io::BufReader<std::fs::File>>,
    spec: hound::WavSpec,
) -> Result<Vec<f64>> {
    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(|v| v as f64))
            .collect::<std::result::Result<Vec<f64>, _>>()?,
        hound::SampleFormat::Int => {
            // max_val = 2^(bits-1), e.g. 32768 for 16-bit audio
            let bits = spec.bits_per_sample;
            let max_val = (1i64 << (bits - 1)) as f64;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f64 / max_val))
                .collect::<std::result::Result<Vec<f64>, _>>()?
        }
    };
    Ok(samples)
}

impl std::fmt::Display for Sound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Sound({} samples, {} Hz, {:.3}s)",
            self.n_samples(),
            self.sample_rate,
            self.duration()
        )
    }
}
