//! Nivela Spectral - cepstral decomposition and magnitude shaping
//!
//! The middle layer of the nivela correction-filter synthesis stack:
//!
//! - [`level`] - compensated-summation signal levels, band-limited
//!   weighted RMS, normalization
//! - [`homomorphic`] - decomposition of a real signal into minimum-phase
//!   and excess-phase (all-pass) components via cepstral or Hilbert
//!   processing
//! - [`shape`] - spectral magnitude shaping: dip/peak limiting with C¹
//!   continuity at the limit boundary and norm flattening, in
//!   linear-phase or minimum-phase mode
//!
//! Everything operates on plain `f64` sample buffers plus scalar
//! parameters; transforms go through a shared [`nivela_fft::Fft`] engine
//! passed by reference.

pub mod homomorphic;
pub mod level;
pub mod shape;

pub use homomorphic::Decomposition;
pub use level::{Band, NormMethod};
pub use shape::{Continuity, PhaseMode, PhaseStrategy};

use nivela_fft::FftError;
use thiserror::Error;

/// Errors from the spectral operations.
#[derive(Debug, Error)]
pub enum SpectralError {
    /// Transform engine failure (work buffer allocation)
    #[error(transparent)]
    Fft(#[from] FftError),

    /// A normalization base turned out non-positive, the signal cannot be
    /// scaled to the requested norm
    #[error("signal norm is not positive, cannot normalize")]
    DegenerateNorm,
}
