//! Error types for praatfan-lpc.
//!
//! Errors come in two tiers, and only the first one lives in this module:
//!
//! - **Construction-time errors**: invalid configuration (bad parameters,
//!   incompatible sampling periods, a sound shorter than the analysis
//!   window) is fatal and raised synchronously, wrapped with context that
//!   names the workspace that could not be created. No partially
//!   initialized workspace is ever returned.
//! - **Per-frame numerical conditions** (degenerate energy, ill-conditioned
//!   recursions, non-convergence) are *not* errors. They are recorded as a
//!   diagnostic code on the affected frame and analysis continues; see
//!   [`crate::lpc::LpcFrame`].

use thiserror::Error;

/// Result type alias using praatfan-lpc's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when loading audio or constructing an analysis
/// workspace.
#[derive(Error, Debug)]
pub enum Error {
    /// Error reading audio file.
    ///
    /// This wraps errors from the `hound` WAV library.
    #[error("Failed to read audio file: {0}")]
    AudioRead(#[from] hound::Error),

    /// General file system errors not specific to WAV reading.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Audio file must be mono.
    ///
    /// For multi-channel files, use `Sound::from_file_channel()` to
    /// explicitly select which channel to analyze. The parameter contains
    /// the actual number of channels.
    #[error("Audio must be mono (single channel), got {0} channels")]
    NotMono(u16),

    /// Invalid parameter value.
    ///
    /// Returned when a constructor receives a parameter outside the valid
    /// range: a non-positive analysis width, a prediction order of zero,
    /// an order that does not fit in the analysis frame, and so on.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The input signal and the output store disagree on the sampling
    /// period.
    ///
    /// A workspace connecting an input sound to an output coefficient
    /// store requires both to describe the same sampling grid.
    #[error("Incompatible sampling periods: input has {input} s, output expects {output} s")]
    IncompatibleSampling { input: f64, output: f64 },

    /// The sound is shorter than one physical analysis window, so not a
    /// single frame fits.
    #[error("Sound too short for analysis: duration {duration} s, window {window} s")]
    SoundTooShort { duration: f64, window: f64 },

    /// A workspace could not be created.
    ///
    /// Wraps the underlying configuration error with the name of the
    /// workspace variant, so the caller sees the full chain.
    #[error("{context}")]
    Construction {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Chain `source` below a construction-context message.
    pub(crate) fn wrap(context: impl Into<String>, source: Error) -> Error {
        Error::Construction {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
