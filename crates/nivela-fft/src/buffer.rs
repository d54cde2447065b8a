//! Fallible allocation of numeric work buffers.
//!
//! Every temporary buffer in the nivela crates (padded spectra, cepstra,
//! Toeplitz auxiliaries) is obtained through [`try_buffer`], so an
//! allocation failure surfaces as an [`FftError::Allocation`] instead of
//! an abort, and the caller decides what the failure is fatal to.

use crate::FftError;

/// Allocate a zero-initialized buffer of `len` elements, reporting
/// allocation failure as an error instead of aborting.
pub fn try_buffer<T: Clone + Default>(len: usize) -> Result<Vec<T>, FftError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| FftError::Allocation { len })?;
    buf.resize(len, T::default());
    Ok(buf)
}
