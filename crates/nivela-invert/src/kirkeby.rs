//! Regularized frequency-domain deconvolution.
//!
//! Fast deconvolution after Kirkeby and Nelson: the inverse spectrum is
//! `conj(H) / (|H|² + β)` where the regularization term β keeps deep
//! nulls from exploding into unbounded gain. β scales with the squared
//! signal level so the effort factor stays dimensionless, and can be made
//! frequency selective by an effort-shaping signal whose spectral
//! magnitude decides where inversion effort is spent.

use nivela_fft::{Fft, Oversampling, try_buffer};
use nivela_spectral::level::rms;
use tracing::debug;

use crate::InvertError;

/// Regularization control for [`invert`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Effort<'a> {
    /// Dimensionless regularization amount; 0 disables regularization.
    pub factor: f64,
    /// Optional shaping signal. Where its spectral magnitude is at its
    /// peak the inversion is unregularized; where it falls off the
    /// regularization grows toward `factor` times the peak power.
    pub shape: Option<&'a [f64]>,
}

/// Derives an `inv_len`-tap inverse filter for `sig`.
///
/// The filter is extracted from the circular inverse centered so that the
/// result pairs with a delay of half the signal length, keeping the
/// extraction symmetric around the main arrival.
pub fn invert(
    fft: &Fft,
    sig: &[f64],
    inv_len: usize,
    effort: &Effort<'_>,
    os: Oversampling,
) -> Result<Vec<f64>, InvertError> {
    let mut sig_len = sig.len().max(inv_len);
    if let Some(shape) = effort.shape {
        sig_len = sig_len.max(shape.len());
    }
    let fs = os.transform_size(sig_len);

    let mut spectrum = fft.real_forward(sig, fs)?;
    let mut factor = effort.factor;

    let shaping = match effort.shape {
        Some(shape) => {
            let shape_spec = fft.real_forward(shape, fs)?;
            let emax = shape_spec.iter().map(|c| c.norm()).fold(0.0, f64::max);
            let emax_sqr = emax * emax;
            factor /= emax_sqr;
            Some((shape_spec, emax_sqr))
        }
        None => None,
    };

    let level = rms(sig);
    factor *= level * level;
    debug!(beta = factor, fs, "kirkeby fast deconvolution");

    match &shaping {
        Some((shape_spec, emax_sqr)) => {
            for (bin, e) in spectrum.iter_mut().zip(shape_spec.iter()) {
                *bin = bin.conj() / (bin.norm_sqr() + factor * (emax_sqr - e.norm_sqr()));
            }
        }
        None => {
            for bin in spectrum.iter_mut() {
                *bin = bin.conj() / (bin.norm_sqr() + factor);
            }
        }
    }

    fft.inverse(&mut spectrum)?;

    let mut out = try_buffer::<f64>(inv_len)?;
    let shift = (sig.len() as isize - inv_len as isize) / 2;
    let mut j = (2 * fs as isize - shift).rem_euclid(fs as isize) as usize;
    for o in out.iter_mut() {
        *o = spectrum[j].re;
        j = (j + 1) % fs;
    }
    Ok(out)
}
