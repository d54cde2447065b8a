//! Nivela Invert - correction filter synthesis
//!
//! The top layer of the nivela stack. Given a measured (and already
//! shaped) impulse response, these modules derive the FIR filter that
//! undoes it:
//!
//! - [`toeplitz`] - Levinson recursion for symmetric Toeplitz systems,
//!   the time-domain least-squares route
//! - [`kirkeby`] - regularized frequency-domain deconvolution, optionally
//!   frequency selective through an effort-shaping signal
//! - [`preecho`] - selective inversion of a minimum-phase / excess-phase
//!   pair that bounds the audible pre-echo the inverted excess-phase part
//!   would otherwise spread before the arrival
//!
//! All synthesis is offline and single threaded; transforms go through a
//! caller-supplied [`nivela_fft::Fft`] engine.

pub mod kirkeby;
pub mod preecho;
pub mod toeplitz;

pub use kirkeby::Effort;
pub use preecho::{EpInversion, Side, SlidingLowpass, Taper, TruncationPolicy};

use nivela_fft::FftError;
use nivela_spectral::SpectralError;
use thiserror::Error;

/// Errors from filter synthesis.
#[derive(Debug, Error)]
pub enum InvertError {
    /// Transform engine failure
    #[error(transparent)]
    Fft(#[from] FftError),

    /// Spectral shaping failure during excess-phase re-flattening
    #[error(transparent)]
    Spectral(#[from] SpectralError),

    /// The Toeplitz system is not positive definite; the prediction-error
    /// power went non-positive during the Levinson recursion
    #[error("system is not positive definite")]
    Indefinite,
}
