//! Nivela FFT - complex discrete Fourier transforms of arbitrary length
//!
//! The transform engine behind the nivela correction-filter synthesis
//! crates:
//!
//! - [`Fft`] - forward/inverse in-place complex transforms for any length,
//!   with a dedicated fast path for power-of-two sizes
//! - [`buffer`] - fallible work-buffer allocation shared by the higher
//!   level crates
//!
//! The engine is a mixed-radix Cooley-Tukey decomposition: each stage
//! splits by the smallest prime factor of the remaining length, radix-2
//! stages run as plain butterflies, larger radixes combine through
//! polynomial evaluation at the roots of unity. Prime lengths therefore
//! degrade gracefully to a direct O(n²) transform. Output reordering uses
//! a generalized digit-reversal permutation.
//!
//! The forward transform is unnormalized; the inverse divides by the
//! transform length, so `inverse(forward(x)) ≈ x`.
//!
//! # Example
//!
//! ```rust
//! use nivela_fft::{Fft, Complex64};
//!
//! let fft = Fft::new();
//! let mut buf: Vec<Complex64> = (0..6).map(|i| Complex64::new(i as f64, 0.0)).collect();
//! let orig = buf.clone();
//!
//! fft.forward(&mut buf).unwrap();
//! fft.inverse(&mut buf).unwrap();
//!
//! for (a, b) in orig.iter().zip(buf.iter()) {
//!     assert!((a - b).norm() < 1e-12);
//! }
//! ```

pub mod buffer;
mod engine;
mod oversample;

pub use buffer::try_buffer;
pub use engine::Fft;
pub use oversample::Oversampling;

/// Complex sample type used throughout the nivela crates.
pub use num_complex::Complex64;

use thiserror::Error;

/// Errors that can occur inside the transform engine.
///
/// Transforms are deterministic numeric code; the only failure mode is a
/// work buffer that cannot be obtained. Such a failure recurs identically
/// on identical input and is surfaced to the caller rather than retried.
#[derive(Debug, Error)]
pub enum FftError {
    /// A scratch buffer could not be allocated
    #[error("failed to allocate a work buffer of {len} elements")]
    Allocation {
        /// Requested buffer length in elements.
        len: usize,
    },
}
