//! # praatfan-lpc
//!
//! Frame-wise Linear Prediction (LPC) analysis for the praatfan family of
//! acoustic-analysis crates.
//!
//! The crate converts successive windowed segments of a sampled waveform
//! into autoregressive filter coefficients, using four competing
//! estimators plus a robust refinement loop:
//!
//! - **Autocorrelation** (Levinson-Durbin), Markel & Gray (1976)
//! - **Covariance**, Markel & Gray (1976)
//! - **Burg** (maximum entropy), Childers (1978)
//! - **Marple** (fast recursive), Marple (1980)
//! - **Robust**: any of the above refined per frame by iteratively
//!   reweighted least squares (Huber weights + SVD solve), Lee (1988)
//!
//! # Quick Start
//!
//! ```no_run
//! use praatfan_lpc::{Sound, WindowShape};
//!
//! let sound = Sound::from_file("audio.wav").unwrap();
//!
//! // Order-16 Burg analysis: 25 ms effective window, 5 ms step,
//! // pre-emphasis from 50 Hz.
//! let lpc = sound
//!     .to_lpc_burg(16, 0.025, 0.005, 50.0, WindowShape::Gaussian2)
//!     .unwrap();
//!
//! for (i, frame) in lpc.frames().iter().enumerate() {
//!     println!(
//!         "frame {i}: order {}, gain {:.6}, diagnostic {}",
//!         frame.order(),
//!         frame.gain,
//!         frame.diagnostic
//!     );
//! }
//! ```
//!
//! # Per-frame diagnostics, not errors
//!
//! Invalid configuration fails fast at workspace construction. Numerical
//! trouble inside a frame — silence, ill-conditioned recursions,
//! non-convergence — never aborts an analysis: the affected frame carries
//! a diagnostic code and a truncated (or fallen-back) estimate, and every
//! other frame is unaffected.
//!
//! # Module Organization
//!
//! - [`sound`]: the input signal type (WAV loading, pre-emphasis)
//! - [`window`]: the eleven analysis window shapes
//! - [`frame`]: frame placement and windowed-frame extraction
//! - [`lpc`]: the per-frame coefficient store
//! - [`pool`]: pre-sized scratch buffers for allocation-free frame loops
//! - [`workspace`]: the four-operation frame-driver contract and the
//!   parallel driving loop
//! - [`sound_to_lpc`]: the four frame estimators and their drivers
//! - [`robust`]: the IRLS refinement and the composite robust pipeline
//! - [`stats`]: Huber M-estimation of location and scale
//!
//! # Concurrency
//!
//! The driving loop partitions frames into disjoint contiguous ranges,
//! one independent workspace (and scratch pool) per worker. Per-frame
//! results depend only on that frame's windowed input, so the output is
//! deterministic and independent of the thread count.

pub mod error;
pub mod frame;
pub mod lpc;
pub mod pool;
pub mod robust;
pub mod sound;
pub mod sound_to_lpc;
pub mod stats;
pub mod window;
pub mod workspace;

pub use error::{Error, Result};
pub use frame::{FrameSource, FrameTiming};
pub use lpc::{Lpc, LpcFrame};
pub use pool::WorkvectorPool;
pub use robust::{
    sound_and_lpc_to_lpc_robust, sound_to_lpc_robust, RefinementWorkspace, RobustWorkspace,
};
pub use sound::Sound;
pub use sound_to_lpc::{
    sound_to_lpc_autocorrelation, sound_to_lpc_burg, sound_to_lpc_covariance, sound_to_lpc_marple,
    AutocorrelationWorkspace, BurgWorkspace, CovarianceWorkspace, MarpleWorkspace,
};
pub use stats::huber_statistics;
pub use window::WindowShape;
pub use workspace::{drive_frames, FrameAnalysis, OutputTarget};
